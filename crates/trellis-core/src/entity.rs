//! Dynamic entity model
//!
//! Screens edit business entities described at runtime by a [`MetaClass`].
//! Entity instances are shared through [`EntityRef`] handles so that several
//! containers of the same data context observe the same instance. Reference
//! properties hold further handles, which means entity graphs may be cyclic;
//! every graph walk in Trellis carries an explicit visited set keyed by
//! [`EntityKey`].

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use uuid::Uuid;

/// Identifier of an entity instance
pub type EntityId = Uuid;

/// Shared handle to an entity instance
pub type EntityRef = Rc<RefCell<Entity>>;

/// What a property holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Plain value (text, number, flag)
    Data,
    /// Reference to independently owned entities
    Association,
    /// Reference to entities owned by the declaring entity
    Composition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    One,
    Many,
}

/// Metadata of one entity property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaProperty {
    pub name: String,
    pub kind: PropertyKind,
    pub cardinality: Cardinality,
    /// Mandatory attribute: must not be null (or empty, for collections)
    pub required: bool,
}

impl MetaProperty {
    fn with_kind(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            cardinality: Cardinality::One,
            required: false,
        }
    }

    #[must_use]
    pub fn data(name: impl Into<String>) -> Self {
        Self::with_kind(name, PropertyKind::Data)
    }

    #[must_use]
    pub fn association(name: impl Into<String>) -> Self {
        Self::with_kind(name, PropertyKind::Association)
    }

    #[must_use]
    pub fn composition(name: impl Into<String>) -> Self {
        Self::with_kind(name, PropertyKind::Composition)
    }

    /// Make the property collection-valued
    #[must_use]
    pub fn many(mut self) -> Self {
        self.cardinality = Cardinality::Many;
        self
    }

    /// Mark the property mandatory
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn is_composition(&self) -> bool {
        self.kind == PropertyKind::Composition
    }
}

/// Runtime description of an entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaClass {
    name: String,
    properties: Vec<MetaProperty>,
}

impl MetaClass {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Add a property
    #[must_use]
    pub fn with(mut self, property: MetaProperty) -> Self {
        self.properties.push(property);
        self
    }

    /// Finish building and share the metadata
    #[must_use]
    pub fn build(self) -> Rc<Self> {
        Rc::new(self)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn properties(&self) -> &[MetaProperty] {
        &self.properties
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&MetaProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn composition_properties(&self) -> impl Iterator<Item = &MetaProperty> {
        self.properties.iter().filter(|p| p.is_composition())
    }
}

/// Identity of an entity instance across data contexts
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    pub entity_name: String,
    pub id: EntityId,
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.entity_name, self.id)
    }
}

/// Property value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Ref(EntityRef),
    Refs(Vec<EntityRef>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Null, blank text or an empty collection
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.trim().is_empty(),
            Self::Refs(items) => items.is_empty(),
            _ => false,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Entities referenced by this value
    #[must_use]
    pub fn references(&self) -> Vec<EntityRef> {
        match self {
            Self::Ref(entity) => vec![entity.clone()],
            Self::Refs(entities) => entities.clone(),
            _ => Vec::new(),
        }
    }

    /// Copy of this value with every reference passed through `f`
    pub fn map_refs(&self, f: &mut dyn FnMut(&EntityRef) -> EntityRef) -> Value {
        match self {
            Self::Ref(entity) => Self::Ref(f(entity)),
            Self::Refs(entities) => Self::Refs(entities.iter().map(|e| f(e)).collect()),
            other => other.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        fn same(a: &EntityRef, b: &EntityRef) -> bool {
            Rc::ptr_eq(a, b) || a.borrow().key() == b.borrow().key()
        }
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => same(a, b),
            (Self::Refs(a), Self::Refs(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| same(a, b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(value) => write!(f, "Bool({value})"),
            Self::Int(value) => write!(f, "Int({value})"),
            Self::Text(value) => write!(f, "Text({value:?})"),
            Self::Ref(entity) => match entity.try_borrow() {
                Ok(entity) => write!(f, "Ref({})", entity.key()),
                Err(_) => f.write_str("Ref(<borrowed>)"),
            },
            Self::Refs(entities) => {
                let keys: Vec<String> = entities
                    .iter()
                    .map(|e| {
                        e.try_borrow()
                            .map_or_else(|_| "<borrowed>".to_string(), |e| e.key().to_string())
                    })
                    .collect();
                write!(f, "Refs({keys:?})")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<EntityRef> for Value {
    fn from(value: EntityRef) -> Self {
        Self::Ref(value)
    }
}

/// An entity instance
///
/// An entity is *new* until it has been persisted. Ids are assigned at
/// creation, so new entities already have a stable identity.
#[derive(Clone, PartialEq)]
pub struct Entity {
    meta: Rc<MetaClass>,
    id: EntityId,
    persisted: bool,
    values: BTreeMap<String, Value>,
}

impl Entity {
    /// A new, not yet persisted instance with a fresh id
    #[must_use]
    pub fn new(meta: &Rc<MetaClass>) -> Self {
        Self::with_id(meta, Uuid::new_v4())
    }

    /// A new, not yet persisted instance with the given id
    #[must_use]
    pub fn with_id(meta: &Rc<MetaClass>, id: EntityId) -> Self {
        Self {
            meta: meta.clone(),
            id,
            persisted: false,
            values: BTreeMap::new(),
        }
    }

    /// An instance of an already persisted entity
    #[must_use]
    pub fn existing(meta: &Rc<MetaClass>, id: EntityId) -> Self {
        Self {
            persisted: true,
            ..Self::with_id(meta, id)
        }
    }

    /// Builder-style property assignment
    #[must_use]
    pub fn with_value(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(property.into(), value.into());
        self
    }

    #[must_use]
    pub fn into_ref(self) -> EntityRef {
        Rc::new(RefCell::new(self))
    }

    #[must_use]
    pub fn key(&self) -> EntityKey {
        EntityKey {
            entity_name: self.meta.name().to_string(),
            id: self.id,
        }
    }

    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    #[must_use]
    pub fn entity_name(&self) -> &str {
        self.meta.name()
    }

    #[must_use]
    pub fn meta(&self) -> &Rc<MetaClass> {
        &self.meta
    }

    /// Whether the entity has no persisted identity yet
    #[must_use]
    pub fn is_new(&self) -> bool {
        !self.persisted
    }

    pub fn mark_persisted(&mut self) {
        self.persisted = true;
    }

    /// Value of a loaded property
    #[must_use]
    pub fn value(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }

    /// Text value of a property, if it holds text
    #[must_use]
    pub fn text(&self, property: &str) -> Option<&str> {
        self.value(property).and_then(Value::as_text)
    }

    pub fn set_value(&mut self, property: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(property.into(), value.into());
    }

    /// Whether the property was loaded into this instance
    #[must_use]
    pub fn is_loaded(&self, property: &str) -> bool {
        self.values.contains_key(property)
    }

    #[must_use]
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Replace every loaded value at once
    pub fn set_values(&mut self, values: BTreeMap<String, Value>) {
        self.values = values;
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("key", &self.key())
            .field("persisted", &self.persisted)
            .field("values", &self.values)
            .finish()
    }
}

/// Identity of the entity behind a handle
#[must_use]
pub fn key_of(entity: &EntityRef) -> EntityKey {
    entity.borrow().key()
}

/// Copy an entity graph into fresh instances
///
/// Shared and cyclic references are preserved: every distinct [`EntityKey`]
/// reachable from `entity` is copied exactly once.
#[must_use]
pub fn deep_copy(entity: &EntityRef) -> EntityRef {
    let mut copies = HashMap::new();
    copy_into(entity, &mut copies)
}

fn copy_into(source: &EntityRef, copies: &mut HashMap<EntityKey, EntityRef>) -> EntityRef {
    let key = key_of(source);
    if let Some(copy) = copies.get(&key) {
        return copy.clone();
    }

    let (shell, values) = {
        let source = source.borrow();
        let shell = Entity {
            meta: source.meta.clone(),
            id: source.id,
            persisted: source.persisted,
            values: BTreeMap::new(),
        };
        (shell, source.values.clone())
    };
    let copy = shell.into_ref();
    copies.insert(key, copy.clone());

    let mut copied = BTreeMap::new();
    for (property, value) in values {
        let value = value.map_refs(&mut |target| copy_into(target, copies));
        copied.insert(property, value);
    }
    copy.borrow_mut().values = copied;
    copy
}

/// Description of which part of an entity graph must be loaded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPlan {
    properties: BTreeMap<String, Option<FetchPlan>>,
}

impl FetchPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Include a property without descending into it
    #[must_use]
    pub fn add(mut self, property: impl Into<String>) -> Self {
        self.properties.insert(property.into(), None);
        self
    }

    /// Include a reference property and the plan for the referenced entities
    #[must_use]
    pub fn add_nested(mut self, property: impl Into<String>, plan: FetchPlan) -> Self {
        self.properties.insert(property.into(), Some(plan));
        self
    }

    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, Option<FetchPlan>> {
        &self.properties
    }

    /// Whether `entity` has every property of this plan loaded
    ///
    /// Recursion is bounded by the depth of the plan, so cyclic graphs are
    /// safe to check.
    #[must_use]
    pub fn is_satisfied_by(&self, entity: &EntityRef) -> bool {
        let entity = entity.borrow();
        self.properties.iter().all(|(property, nested)| {
            let Some(value) = entity.value(property) else {
                return false;
            };
            match nested {
                None => true,
                Some(plan) => value.references().iter().all(|e| plan.is_satisfied_by(e)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_meta() -> Rc<MetaClass> {
        MetaClass::new("Order")
            .with(MetaProperty::data("number").required())
            .with(MetaProperty::composition("lines").many())
            .with(MetaProperty::association("customer"))
            .build()
    }

    fn line_meta() -> Rc<MetaClass> {
        MetaClass::new("OrderLine")
            .with(MetaProperty::data("product"))
            .with(MetaProperty::association("order"))
            .build()
    }

    #[test]
    fn new_and_existing_entities() {
        let meta = order_meta();
        let fresh = Entity::new(&meta);
        assert!(fresh.is_new());
        let existing = Entity::existing(&meta, Uuid::from_u128(42));
        assert!(!existing.is_new());
        assert_eq!(existing.key().to_string(), format!("Order-{}", Uuid::from_u128(42)));
    }

    #[test]
    fn composition_properties_are_listed() {
        let meta = order_meta();
        let names: Vec<&str> = meta.composition_properties().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["lines"]);
    }

    #[test]
    fn deep_copy_preserves_cycles() {
        let order = Entity::new(&order_meta()).with_value("number", "A-1").into_ref();
        let line = Entity::new(&line_meta())
            .with_value("product", "Widget")
            .with_value("order", order.clone())
            .into_ref();
        order.borrow_mut().set_value("lines", Value::Refs(vec![line.clone()]));

        let copy = deep_copy(&order);
        assert!(!Rc::ptr_eq(&copy, &order));
        assert_eq!(key_of(&copy), key_of(&order));

        let copied_lines = copy.borrow().value("lines").unwrap().references();
        assert_eq!(copied_lines.len(), 1);
        assert!(!Rc::ptr_eq(&copied_lines[0], &line));
        let back = copied_lines[0].borrow().value("order").unwrap().references();
        assert!(Rc::ptr_eq(&back[0], &copy));
    }

    #[test]
    fn fetch_plan_checks_nested_properties() {
        let order = Entity::new(&order_meta()).with_value("number", "A-1").into_ref();
        let line = Entity::new(&line_meta()).with_value("order", order.clone()).into_ref();
        order.borrow_mut().set_value("lines", Value::Refs(vec![line.clone()]));

        let shallow = FetchPlan::new().add("number");
        assert!(shallow.is_satisfied_by(&order));

        let deep = FetchPlan::new()
            .add("number")
            .add_nested("lines", FetchPlan::new().add("product"));
        assert!(!deep.is_satisfied_by(&order));

        line.borrow_mut().set_value("product", "Widget");
        assert!(deep.is_satisfied_by(&order));
    }

    #[test]
    fn value_equality_uses_identity_for_references() {
        let meta = line_meta();
        let id = Uuid::new_v4();
        let a = Entity::with_id(&meta, id).with_value("product", "x").into_ref();
        let b = Entity::with_id(&meta, id).with_value("product", "y").into_ref();
        assert_eq!(Value::Ref(a), Value::Ref(b));
        assert!(Value::Text("  ".into()).is_empty());
        assert!(Value::Refs(Vec::new()).is_empty());
        assert!(!Value::Int(0).is_empty());
    }
}
