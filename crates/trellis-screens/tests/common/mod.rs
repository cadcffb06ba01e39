//! Shared fixtures for screen integration tests

#![allow(dead_code)]

use std::rc::Rc;

use trellis_core::{Entity, EntityRef, MetaClass, MetaProperty};
use trellis_screens::component::{Component, Field, ListAction, ListComponent, Window};
use trellis_screens::data::{
    CollectionContainer, DataContext, EntityLoader, InstanceContainer, ScreenData,
};
use trellis_screens::memory::{
    MemoryDataContext, MemoryEntityLoader, MemoryServices, MemoryStore,
};
use trellis_screens::{Screen, ScreenStack, StandardEditor};
use uuid::Uuid;

pub const ORDER_ID: u128 = 42;

pub fn order_id() -> Uuid {
    Uuid::from_u128(ORDER_ID)
}

pub fn line_meta() -> Rc<MetaClass> {
    MetaClass::new("OrderLine").with(MetaProperty::data("product")).build()
}

pub fn order_meta() -> Rc<MetaClass> {
    MetaClass::new("Order")
        .with(MetaProperty::data("number").required())
        .with(MetaProperty::data("note"))
        .with(MetaProperty::composition("lines").many().required())
        .build()
}

/// Persist order 42 with number `A-1` and no lines
pub fn seed_order(store: &Rc<MemoryStore>, meta: &Rc<MetaClass>) -> EntityRef {
    let order = Entity::existing(meta, order_id()).with_value("number", "A-1").into_ref();
    store.insert(&order);
    order
}

pub struct EditorFixture {
    pub meta: Rc<MetaClass>,
    pub context: Rc<MemoryDataContext>,
    pub container: Rc<InstanceContainer>,
    pub loader: Rc<MemoryEntityLoader>,
    pub screen: Rc<Screen>,
    pub editor: Rc<StandardEditor>,
    pub stack: Rc<ScreenStack>,
}

/// An order editor with `number`, `note` and a `lines` list
pub fn order_editor(
    store: &Rc<MemoryStore>,
    services: &MemoryServices,
    line_actions: Vec<ListAction>,
) -> EditorFixture {
    let meta = order_meta();
    let context = MemoryDataContext::new(store);
    let container = Rc::new(InstanceContainer::new("orderDc", &meta));
    let lines = Rc::new(CollectionContainer::property(
        "linesDc",
        &line_meta(),
        &container,
        "lines",
    ));
    let loader = MemoryEntityLoader::new(store, context.clone(), &container);

    let list = line_actions
        .into_iter()
        .fold(ListComponent::new(&lines), ListComponent::with_action);
    let window = Window::new(Component::group(
        "window",
        vec![
            Component::field("number", Field::bound("Number", &container, "number").required()),
            Component::field("note", Field::bound("Note", &container, "note")),
            Component::list("lines", list),
        ],
    ));

    let screen = Screen::new("order-edit", window);
    let loader_dyn: Rc<dyn EntityLoader> = loader.clone();
    let context_dyn: Rc<dyn DataContext> = context.clone();
    screen.set_extension(Rc::new(
        ScreenData::new(context_dyn)
            .with_instance(container.clone())
            .with_collection(lines)
            .with_loader(loader_dyn),
    ));
    let editor = StandardEditor::new(&screen, services.services(), "orderDc").unwrap();

    EditorFixture {
        meta,
        context,
        container,
        loader,
        screen,
        editor,
        stack: ScreenStack::new(),
    }
}
