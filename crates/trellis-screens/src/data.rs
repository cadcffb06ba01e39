//! Data binding abstractions
//!
//! A screen edits entities through a [`DataContext`], the change-tracking
//! scope that collects modifications until commit, and shows them through
//! containers:
//! - [`InstanceContainer`]: holds at most one entity
//! - [`CollectionContainer`]: holds a list, either owned or read from a
//!   collection property of a master [`InstanceContainer`]
//!
//! [`ScreenData`] groups the context, containers and loaders of one screen.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;
use trellis_core::{
    key_of, EntityId, EntityKey, EntityRef, Event, EventHub, FetchPlan, MetaClass, Value,
};

/// Failures reported by data collaborators
#[derive(Debug, Error)]
pub enum DataError {
    #[error("entity {0} not found")]
    NotFound(EntityKey),

    #[error("loader of container '{container}' has no entity id")]
    NoEntityId { container: String },

    #[error("commit failed: {0}")]
    CommitFailed(String),
}

/// An entity tracked by a data context was changed
pub struct EntityChangeEvent {
    pub entity: EntityRef,
    /// Changed property, or `None` when the entity changed as a whole
    pub property: Option<String>,
}

impl Event for EntityChangeEvent {}

/// A data context finished a commit
pub struct PostCommitEvent {
    pub committed: Vec<EntityRef>,
}

impl Event for PostCommitEvent {}

/// Change-tracking scope for entities edited together
///
/// Contexts may be nested: committing a child context merges its changes
/// into [`DataContext::parent`] instead of persisting them. Implementations
/// publish [`EntityChangeEvent`] and [`PostCommitEvent`] through
/// [`DataContext::events`], and must not hold internal borrows while doing so.
pub trait DataContext {
    /// Instance tracked under `key`
    fn find(&self, key: &EntityKey) -> Option<EntityRef>;

    /// Track a copy of `entity` and return the tracked instance
    ///
    /// Merging a new entity marks it modified without publishing a change.
    fn merge(&self, entity: &EntityRef) -> EntityRef;

    /// Create and track a new entity
    fn create(&self, meta: &Rc<MetaClass>) -> EntityRef;

    /// Change a property of a tracked entity
    fn set_value(&self, entity: &EntityRef, property: &str, value: Value);

    fn remove(&self, entity: &EntityRef);

    fn is_modified(&self, entity: &EntityRef) -> bool;

    fn is_removed(&self, entity: &EntityRef) -> bool;

    fn set_modified(&self, entity: &EntityRef, modified: bool);

    fn modified(&self) -> Vec<EntityRef>;

    fn removed(&self) -> Vec<EntityRef>;

    fn has_changes(&self) -> bool {
        !self.modified().is_empty() || !self.removed().is_empty()
    }

    /// Persist (or, when nested, hand to the parent) every change
    ///
    /// # Errors
    ///
    /// Returns [`DataError::CommitFailed`] when the changes are rejected. The
    /// context keeps its changes in that case.
    fn commit(&self) -> Result<Vec<EntityRef>, DataError>;

    /// Forget every modified and removed instance
    fn evict_modified(&self);

    fn parent(&self) -> Option<Rc<dyn DataContext>>;

    fn events(&self) -> &EventHub;
}

/// Loads one entity by id into an [`InstanceContainer`]
pub trait EntityLoader {
    fn set_entity_id(&self, id: Option<EntityId>);

    fn entity_id(&self) -> Option<EntityId>;

    /// # Errors
    ///
    /// Fails when no id is set or the entity does not exist.
    fn load(&self) -> Result<(), DataError>;

    fn container(&self) -> &Rc<InstanceContainer>;
}

/// The item of a container changed
///
/// For a [`CollectionContainer`] this is the selected item.
pub struct ItemChangeEvent {
    pub previous: Option<EntityRef>,
    pub item: Option<EntityRef>,
}

impl Event for ItemChangeEvent {}

/// Container holding a single entity
pub struct InstanceContainer {
    id: String,
    meta: Rc<MetaClass>,
    fetch_plan: FetchPlan,
    item: RefCell<Option<EntityRef>>,
    events: EventHub,
}

impl InstanceContainer {
    #[must_use]
    pub fn new(id: impl Into<String>, meta: &Rc<MetaClass>) -> Self {
        Self {
            id: id.into(),
            meta: meta.clone(),
            fetch_plan: FetchPlan::new(),
            item: RefCell::new(None),
            events: EventHub::new(),
        }
    }

    /// Graph that must be loaded for the container's item
    #[must_use]
    pub fn with_fetch_plan(mut self, plan: FetchPlan) -> Self {
        self.fetch_plan = plan;
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn meta(&self) -> &Rc<MetaClass> {
        &self.meta
    }

    #[must_use]
    pub fn fetch_plan(&self) -> &FetchPlan {
        &self.fetch_plan
    }

    #[must_use]
    pub fn item(&self) -> Option<EntityRef> {
        self.item.borrow().clone()
    }

    /// Replace the item and publish [`ItemChangeEvent`]
    pub fn set_item(&self, item: Option<EntityRef>) {
        let previous = self.item.replace(item.clone());
        self.events.publish(&mut ItemChangeEvent { previous, item });
    }

    /// Value of `property` on the current item
    #[must_use]
    pub fn value(&self, property: &str) -> Option<Value> {
        let item = self.item()?;
        let value = item.borrow().value(property).cloned();
        value
    }

    #[must_use]
    pub fn events(&self) -> &EventHub {
        &self.events
    }
}

impl fmt::Debug for InstanceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceContainer")
            .field("id", &self.id)
            .field("entity", &self.meta.name())
            .field("item", &self.item().map(|item| key_of(&item)))
            .finish()
    }
}

enum Source {
    Owned(RefCell<Vec<EntityRef>>),
    Property {
        master: Rc<InstanceContainer>,
        property: String,
    },
}

/// Container holding a list of entities and a selection
pub struct CollectionContainer {
    id: String,
    meta: Rc<MetaClass>,
    source: Source,
    selected: RefCell<Option<EntityRef>>,
    events: EventHub,
}

impl CollectionContainer {
    /// Container owning its items
    #[must_use]
    pub fn new(id: impl Into<String>, meta: &Rc<MetaClass>) -> Self {
        Self {
            id: id.into(),
            meta: meta.clone(),
            source: Source::Owned(RefCell::new(Vec::new())),
            selected: RefCell::new(None),
            events: EventHub::new(),
        }
    }

    /// Container showing the collection `property` of `master`'s item
    #[must_use]
    pub fn property(
        id: impl Into<String>,
        meta: &Rc<MetaClass>,
        master: &Rc<InstanceContainer>,
        property: impl Into<String>,
    ) -> Self {
        Self {
            source: Source::Property {
                master: master.clone(),
                property: property.into(),
            },
            ..Self::new(id, meta)
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn meta(&self) -> &Rc<MetaClass> {
        &self.meta
    }

    /// Master container and property, for property-bound containers
    #[must_use]
    pub fn master(&self) -> Option<(&Rc<InstanceContainer>, &str)> {
        match &self.source {
            Source::Owned(_) => None,
            Source::Property { master, property } => Some((master, property.as_str())),
        }
    }

    #[must_use]
    pub fn items(&self) -> Vec<EntityRef> {
        match &self.source {
            Source::Owned(items) => items.borrow().clone(),
            Source::Property { master, property } => master
                .value(property)
                .map(|value| value.references())
                .unwrap_or_default(),
        }
    }

    /// Replace every item
    ///
    /// For a property-bound container this writes the master item's property
    /// directly; edits meant to be tracked go through the data context.
    pub fn set_items(&self, items: Vec<EntityRef>) {
        match &self.source {
            Source::Owned(owned) => *owned.borrow_mut() = items,
            Source::Property { master, property } => {
                if let Some(item) = master.item() {
                    item.borrow_mut().set_value(property.as_str(), Value::Refs(items));
                }
            }
        }
        let keep_selection = self
            .selected()
            .is_some_and(|selected| self.position(&key_of(&selected)).is_some());
        if !keep_selection {
            self.set_selected(None);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    #[must_use]
    pub fn position(&self, key: &EntityKey) -> Option<usize> {
        self.items().iter().position(|item| key_of(item) == *key)
    }

    /// Replace the item with the same identity as `entity`
    ///
    /// Returns `false` if no such item exists.
    pub fn replace_item(&self, entity: EntityRef) -> bool {
        let mut items = self.items();
        let Some(index) = items.iter().position(|item| key_of(item) == key_of(&entity)) else {
            return false;
        };
        items[index] = entity;
        self.store(items);
        true
    }

    /// Append `entity`
    pub fn insert_item(&self, entity: EntityRef) {
        let mut items = self.items();
        items.push(entity);
        self.store(items);
    }

    fn store(&self, items: Vec<EntityRef>) {
        match &self.source {
            Source::Owned(owned) => *owned.borrow_mut() = items,
            Source::Property { master, property } => {
                if let Some(item) = master.item() {
                    item.borrow_mut().set_value(property.as_str(), Value::Refs(items));
                }
            }
        }
    }

    #[must_use]
    pub fn selected(&self) -> Option<EntityRef> {
        self.selected.borrow().clone()
    }

    /// Change the selection and publish [`ItemChangeEvent`]
    pub fn set_selected(&self, item: Option<EntityRef>) {
        let previous = self.selected.replace(item.clone());
        let unchanged = match (&previous, &item) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        };
        if !unchanged {
            self.events.publish(&mut ItemChangeEvent { previous, item });
        }
    }

    #[must_use]
    pub fn events(&self) -> &EventHub {
        &self.events
    }
}

impl fmt::Debug for CollectionContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionContainer")
            .field("id", &self.id)
            .field("entity", &self.meta.name())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Data declared by one screen
pub struct ScreenData {
    context: Rc<dyn DataContext>,
    instances: BTreeMap<String, Rc<InstanceContainer>>,
    collections: BTreeMap<String, Rc<CollectionContainer>>,
    loaders: Vec<Rc<dyn EntityLoader>>,
}

impl ScreenData {
    pub fn new(context: Rc<dyn DataContext>) -> Self {
        Self {
            context,
            instances: BTreeMap::new(),
            collections: BTreeMap::new(),
            loaders: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_instance(mut self, container: Rc<InstanceContainer>) -> Self {
        self.instances.insert(container.id().to_string(), container);
        self
    }

    #[must_use]
    pub fn with_collection(mut self, container: Rc<CollectionContainer>) -> Self {
        self.collections.insert(container.id().to_string(), container);
        self
    }

    #[must_use]
    pub fn with_loader(mut self, loader: Rc<dyn EntityLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    #[must_use]
    pub fn data_context(&self) -> Rc<dyn DataContext> {
        self.context.clone()
    }

    #[must_use]
    pub fn instance(&self, id: &str) -> Option<Rc<InstanceContainer>> {
        self.instances.get(id).cloned()
    }

    #[must_use]
    pub fn collection(&self, id: &str) -> Option<Rc<CollectionContainer>> {
        self.collections.get(id).cloned()
    }

    /// Loader filling `container`, if one is declared
    #[must_use]
    pub fn loader_of(&self, container: &Rc<InstanceContainer>) -> Option<Rc<dyn EntityLoader>> {
        self.loaders
            .iter()
            .find(|loader| Rc::ptr_eq(loader.container(), container))
            .cloned()
    }
}

impl fmt::Debug for ScreenData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenData")
            .field("instances", &self.instances.keys().collect::<Vec<_>>())
            .field("collections", &self.collections.keys().collect::<Vec<_>>())
            .field("loaders", &self.loaders.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use trellis_core::{Entity, MetaProperty};

    fn order_meta() -> Rc<MetaClass> {
        MetaClass::new("Order")
            .with(MetaProperty::data("number"))
            .with(MetaProperty::composition("lines").many())
            .build()
    }

    fn line_meta() -> Rc<MetaClass> {
        MetaClass::new("OrderLine").with(MetaProperty::data("product")).build()
    }

    #[test]
    fn instance_container_publishes_item_changes() {
        let container = InstanceContainer::new("orderDc", &order_meta());
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        container.events().subscribe(move |event: &mut ItemChangeEvent| {
            assert!(event.previous.is_none());
            assert!(event.item.is_some());
            counter.set(counter.get() + 1);
        });
        container.set_item(Some(Entity::new(&order_meta()).into_ref()));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn property_container_reads_master_collection() {
        let master = Rc::new(InstanceContainer::new("orderDc", &order_meta()));
        let lines = CollectionContainer::property("linesDc", &line_meta(), &master, "lines");
        assert!(lines.is_empty());

        let line = Entity::new(&line_meta()).with_value("product", "Widget").into_ref();
        let order = Entity::new(&order_meta())
            .with_value("lines", Value::Refs(vec![line.clone()]))
            .into_ref();
        master.set_item(Some(order));
        assert_eq!(lines.len(), 1);
        assert!(lines.master().is_some());

        lines.insert_item(Entity::new(&line_meta()).into_ref());
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn replace_item_matches_by_identity() {
        let meta = line_meta();
        let container = CollectionContainer::new("linesDc", &meta);
        let original = Entity::new(&meta).with_value("product", "A").into_ref();
        container.set_items(vec![original.clone()]);

        let id = original.borrow().id();
        let updated = Entity::with_id(&meta, id).with_value("product", "B").into_ref();
        assert!(container.replace_item(updated.clone()));
        assert!(Rc::ptr_eq(&container.items()[0], &updated));
        assert!(!container.replace_item(Entity::new(&meta).into_ref()));
    }

    #[test]
    fn selection_changes_are_published_once() {
        let meta = line_meta();
        let container = CollectionContainer::new("linesDc", &meta);
        let item = Entity::new(&meta).into_ref();
        container.set_items(vec![item.clone()]);

        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        container
            .events()
            .subscribe(move |_: &mut ItemChangeEvent| counter.set(counter.get() + 1));
        container.set_selected(Some(item.clone()));
        container.set_selected(Some(item));
        assert_eq!(hits.get(), 1);

        container.set_items(Vec::new());
        assert!(container.selected().is_none());
        assert_eq!(hits.get(), 2);
    }
}
