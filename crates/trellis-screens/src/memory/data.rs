//! In-memory persistence, data contexts and loaders

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, info};
use trellis_core::{
    deep_copy, key_of, Entity, EntityId, EntityKey, EntityRef, EventHub, MetaClass, Value,
};

use crate::data::{
    DataContext, DataError, EntityChangeEvent, EntityLoader, InstanceContainer, PostCommitEvent,
};

/// Entity storage standing in for a database
///
/// Stored graphs are copies; nothing handed out aliases the stored data.
#[derive(Default)]
pub struct MemoryStore {
    entities: RefCell<HashMap<EntityKey, EntityRef>>,
    commits: Cell<usize>,
    fail_next_commit: RefCell<Option<String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Store a copy of `entity` as persisted
    pub fn insert(&self, entity: &EntityRef) {
        let copy = deep_copy(entity);
        copy.borrow_mut().mark_persisted();
        let key = key_of(&copy);
        self.entities.borrow_mut().insert(key, copy);
    }

    /// Copy of the stored entity
    #[must_use]
    pub fn get(&self, key: &EntityKey) -> Option<EntityRef> {
        let stored = self.entities.borrow().get(key).cloned()?;
        Some(deep_copy(&stored))
    }

    #[must_use]
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entities.borrow().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.borrow().is_empty()
    }

    /// Number of successful commits
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.get()
    }

    /// Make the next commit fail with `reason`
    pub fn fail_next_commit(&self, reason: impl Into<String>) {
        *self.fail_next_commit.borrow_mut() = Some(reason.into());
    }

    fn commit(&self, saved: &[EntityRef], removed: &[EntityKey]) -> Result<(), DataError> {
        if let Some(reason) = self.fail_next_commit.borrow_mut().take() {
            return Err(DataError::CommitFailed(reason));
        }
        for entity in saved {
            self.insert(entity);
        }
        let mut entities = self.entities.borrow_mut();
        for key in removed {
            entities.remove(key);
        }
        drop(entities);
        self.commits.set(self.commits.get() + 1);
        Ok(())
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entities", &self.len())
            .field("commits", &self.commits.get())
            .finish_non_exhaustive()
    }
}

/// Data context backed by a [`MemoryStore`], or by a parent context when
/// nested
pub struct MemoryDataContext {
    store: Rc<MemoryStore>,
    parent: Option<Rc<dyn DataContext>>,
    instances: RefCell<HashMap<EntityKey, EntityRef>>,
    modified: RefCell<Vec<EntityKey>>,
    removed: RefCell<Vec<EntityKey>>,
    commit_calls: Cell<usize>,
    events: EventHub,
}

impl MemoryDataContext {
    #[must_use]
    pub fn new(store: &Rc<MemoryStore>) -> Rc<Self> {
        Rc::new(Self::with_parent(store, None))
    }

    /// Context committing into `parent`
    #[must_use]
    pub fn nested(store: &Rc<MemoryStore>, parent: Rc<dyn DataContext>) -> Rc<Self> {
        Rc::new(Self::with_parent(store, Some(parent)))
    }

    fn with_parent(store: &Rc<MemoryStore>, parent: Option<Rc<dyn DataContext>>) -> Self {
        Self {
            store: store.clone(),
            parent,
            instances: RefCell::new(HashMap::new()),
            modified: RefCell::new(Vec::new()),
            removed: RefCell::new(Vec::new()),
            commit_calls: Cell::new(0),
            events: EventHub::new(),
        }
    }

    /// Number of `commit` calls, successful or not
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commit_calls.get()
    }

    #[must_use]
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.instances.borrow().contains_key(key)
    }

    fn mark_modified(&self, key: EntityKey) {
        let mut modified = self.modified.borrow_mut();
        if !modified.contains(&key) {
            modified.push(key);
        }
    }

    fn instances_of(&self, keys: &[EntityKey]) -> Vec<EntityRef> {
        let instances = self.instances.borrow();
        keys.iter().filter_map(|key| instances.get(key).cloned()).collect()
    }

    /// Register every instance reachable from `root`, reusing tracked ones
    fn track_graph(&self, root: &EntityRef) -> EntityRef {
        let mut visited = HashSet::new();
        self.track(root, &mut visited)
    }

    fn track(&self, entity: &EntityRef, visited: &mut HashSet<EntityKey>) -> EntityRef {
        let key = key_of(entity);
        if !visited.insert(key.clone()) {
            return self.instances.borrow().get(&key).cloned().unwrap_or_else(|| entity.clone());
        }

        let existing = self.instances.borrow().get(&key).cloned();
        let tracked = match existing {
            Some(existing) if !Rc::ptr_eq(&existing, entity) => {
                let values = entity.borrow().values().clone();
                existing.borrow_mut().set_values(values);
                existing
            }
            Some(existing) => existing,
            None => {
                self.instances.borrow_mut().insert(key.clone(), entity.clone());
                if entity.borrow().is_new() {
                    self.mark_modified(key);
                }
                entity.clone()
            }
        };

        let values = tracked.borrow().values().clone();
        let mut relinked = values.clone();
        for (property, value) in &values {
            let value = value.map_refs(&mut |target| self.track(target, visited));
            relinked.insert(property.clone(), value);
        }
        tracked.borrow_mut().set_values(relinked);
        tracked
    }
}

impl DataContext for MemoryDataContext {
    fn find(&self, key: &EntityKey) -> Option<EntityRef> {
        self.instances.borrow().get(key).cloned()
    }

    fn merge(&self, entity: &EntityRef) -> EntityRef {
        let copy = deep_copy(entity);
        self.track_graph(&copy)
    }

    fn create(&self, meta: &Rc<MetaClass>) -> EntityRef {
        let entity = Entity::new(meta).into_ref();
        let key = key_of(&entity);
        self.instances.borrow_mut().insert(key.clone(), entity.clone());
        self.mark_modified(key);
        entity
    }

    fn set_value(&self, entity: &EntityRef, property: &str, value: Value) {
        let key = key_of(entity);
        self.instances
            .borrow_mut()
            .entry(key.clone())
            .or_insert_with(|| entity.clone());
        entity.borrow_mut().set_value(property, value);
        self.mark_modified(key);
        self.events.publish(&mut EntityChangeEvent {
            entity: entity.clone(),
            property: Some(property.to_string()),
        });
    }

    fn remove(&self, entity: &EntityRef) {
        let key = key_of(entity);
        self.modified.borrow_mut().retain(|modified| *modified != key);
        if entity.borrow().is_new() {
            self.instances.borrow_mut().remove(&key);
        } else {
            let mut removed = self.removed.borrow_mut();
            if !removed.contains(&key) {
                removed.push(key);
            }
        }
        self.events.publish(&mut EntityChangeEvent {
            entity: entity.clone(),
            property: None,
        });
    }

    fn is_modified(&self, entity: &EntityRef) -> bool {
        self.modified.borrow().contains(&key_of(entity))
    }

    fn is_removed(&self, entity: &EntityRef) -> bool {
        self.removed.borrow().contains(&key_of(entity))
    }

    fn set_modified(&self, entity: &EntityRef, modified: bool) {
        let key = key_of(entity);
        if modified {
            self.mark_modified(key);
            self.events.publish(&mut EntityChangeEvent {
                entity: entity.clone(),
                property: None,
            });
        } else {
            self.modified.borrow_mut().retain(|tracked| *tracked != key);
        }
    }

    fn modified(&self) -> Vec<EntityRef> {
        let keys = self.modified.borrow().clone();
        self.instances_of(&keys)
    }

    fn removed(&self) -> Vec<EntityRef> {
        let keys = self.removed.borrow().clone();
        self.instances_of(&keys)
    }

    fn commit(&self) -> Result<Vec<EntityRef>, DataError> {
        self.commit_calls.set(self.commit_calls.get() + 1);
        let saved = self.modified();
        let removed_keys = self.removed.borrow().clone();

        if let Some(parent) = &self.parent {
            for entity in &saved {
                let merged = parent.merge(entity);
                parent.set_modified(&merged, true);
            }
            for entity in self.removed() {
                let merged = parent.merge(&entity);
                parent.remove(&merged);
            }
            debug!(
                saved = saved.len(),
                removed = removed_keys.len(),
                "committed into parent context"
            );
        } else {
            self.store.commit(&saved, &removed_keys)?;
            for entity in &saved {
                entity.borrow_mut().mark_persisted();
            }
            info!(saved = saved.len(), removed = removed_keys.len(), "committed to store");
        }

        {
            let mut instances = self.instances.borrow_mut();
            for key in &removed_keys {
                instances.remove(key);
            }
        }
        self.modified.borrow_mut().clear();
        self.removed.borrow_mut().clear();

        self.events.publish(&mut PostCommitEvent {
            committed: saved.clone(),
        });
        Ok(saved)
    }

    fn evict_modified(&self) {
        let mut keys = std::mem::take(&mut *self.modified.borrow_mut());
        keys.append(&mut self.removed.borrow_mut());
        let mut instances = self.instances.borrow_mut();
        for key in &keys {
            instances.remove(key);
        }
        debug!(evicted = keys.len(), "evicted modified instances");
    }

    fn parent(&self) -> Option<Rc<dyn DataContext>> {
        self.parent.clone()
    }

    fn events(&self) -> &EventHub {
        &self.events
    }
}

impl fmt::Debug for MemoryDataContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDataContext")
            .field("instances", &self.instances.borrow().len())
            .field("modified", &self.modified.borrow())
            .field("removed", &self.removed.borrow())
            .field("nested", &self.parent.is_some())
            .finish_non_exhaustive()
    }
}

/// Loader reading a [`MemoryStore`] into a container through a data context
pub struct MemoryEntityLoader {
    store: Rc<MemoryStore>,
    context: Rc<dyn DataContext>,
    container: Rc<InstanceContainer>,
    entity_id: Cell<Option<EntityId>>,
    loads: Cell<usize>,
}

impl MemoryEntityLoader {
    #[must_use]
    pub fn new(
        store: &Rc<MemoryStore>,
        context: Rc<dyn DataContext>,
        container: &Rc<InstanceContainer>,
    ) -> Rc<Self> {
        Rc::new(Self {
            store: store.clone(),
            context,
            container: container.clone(),
            entity_id: Cell::new(None),
            loads: Cell::new(0),
        })
    }

    /// Number of successful loads
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.get()
    }
}

impl EntityLoader for MemoryEntityLoader {
    fn set_entity_id(&self, id: Option<EntityId>) {
        self.entity_id.set(id);
    }

    fn entity_id(&self) -> Option<EntityId> {
        self.entity_id.get()
    }

    fn load(&self) -> Result<(), DataError> {
        let id = self.entity_id.get().ok_or_else(|| DataError::NoEntityId {
            container: self.container.id().to_string(),
        })?;
        let key = EntityKey {
            entity_name: self.container.meta().name().to_string(),
            id,
        };
        let entity = self.store.get(&key).ok_or_else(|| DataError::NotFound(key.clone()))?;
        let tracked = self.context.merge(&entity);
        self.container.set_item(Some(tracked));
        self.loads.set(self.loads.get() + 1);
        debug!(entity = %key, "entity loaded");
        Ok(())
    }

    fn container(&self) -> &Rc<InstanceContainer> {
        &self.container
    }
}

impl fmt::Debug for MemoryEntityLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEntityLoader")
            .field("container", &self.container.id())
            .field("entity_id", &self.entity_id.get())
            .field("loads", &self.loads.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::MetaProperty;
    use uuid::Uuid;

    fn customer_meta() -> Rc<MetaClass> {
        MetaClass::new("Customer").with(MetaProperty::data("name")).build()
    }

    #[test]
    fn merged_new_entities_are_modified_without_a_change_event() {
        let store = MemoryStore::new();
        let context = MemoryDataContext::new(&store);
        let changes = Rc::new(Cell::new(0));
        let counter = changes.clone();
        context
            .events()
            .subscribe(move |_: &mut EntityChangeEvent| counter.set(counter.get() + 1));

        let tracked = context.merge(&Entity::new(&customer_meta()).into_ref());
        assert!(context.is_modified(&tracked));
        assert_eq!(changes.get(), 0);

        context.set_value(&tracked, "name", Value::from("Ada"));
        assert_eq!(changes.get(), 1);
    }

    #[test]
    fn commit_persists_and_clears_changes() {
        let store = MemoryStore::new();
        let context = MemoryDataContext::new(&store);
        let tracked = context.merge(&Entity::new(&customer_meta()).into_ref());
        context.set_value(&tracked, "name", Value::from("Ada"));

        let committed = context.commit().unwrap();
        assert_eq!(committed.len(), 1);
        assert!(!tracked.borrow().is_new());
        assert!(!context.has_changes());
        assert!(store.contains(&key_of(&tracked)));
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn failed_commit_keeps_changes() {
        let store = MemoryStore::new();
        let context = MemoryDataContext::new(&store);
        let tracked = context.merge(&Entity::new(&customer_meta()).into_ref());
        store.fail_next_commit("constraint violated");

        assert!(matches!(context.commit(), Err(DataError::CommitFailed(_))));
        assert!(context.is_modified(&tracked));
        assert_eq!(store.commit_count(), 0);
    }

    #[test]
    fn nested_commit_merges_into_parent() {
        let store = MemoryStore::new();
        let parent = MemoryDataContext::new(&store);
        let child = MemoryDataContext::nested(&store, parent.clone());
        let existing = Entity::existing(&customer_meta(), Uuid::from_u128(5)).into_ref();

        let tracked = child.merge(&existing);
        child.set_value(&tracked, "name", Value::from("Grace"));
        child.commit().unwrap();

        let in_parent = parent.find(&key_of(&tracked)).unwrap();
        assert!(parent.is_modified(&in_parent));
        assert_eq!(in_parent.borrow().text("name"), Some("Grace"));
        assert_eq!(store.commit_count(), 0);
    }

    #[test]
    fn loader_merges_stored_entity_into_container() {
        let store = MemoryStore::new();
        let meta = customer_meta();
        store.insert(
            &Entity::existing(&meta, Uuid::from_u128(42))
                .with_value("name", "A")
                .into_ref(),
        );

        let context = MemoryDataContext::new(&store);
        let container = Rc::new(InstanceContainer::new("customerDc", &meta));
        let loader = MemoryEntityLoader::new(&store, context.clone(), &container);
        assert!(matches!(loader.load(), Err(DataError::NoEntityId { .. })));

        loader.set_entity_id(Some(Uuid::from_u128(42)));
        loader.load().unwrap();
        let item = container.item().unwrap();
        assert_eq!(item.borrow().text("name"), Some("A"));
        assert!(!context.is_modified(&item));
        assert_eq!(loader.load_count(), 1);

        loader.set_entity_id(Some(Uuid::from_u128(7)));
        assert!(matches!(loader.load(), Err(DataError::NotFound(_))));
    }

    #[test]
    fn evict_forgets_modified_instances() {
        let store = MemoryStore::new();
        let context = MemoryDataContext::new(&store);
        let tracked =
            context.merge(&Entity::existing(&customer_meta(), Uuid::from_u128(1)).into_ref());
        context.set_value(&tracked, "name", Value::from("changed"));
        context.evict_modified();
        assert!(!context.has_changes());
        assert!(context.find(&key_of(&tracked)).is_none());
    }
}
