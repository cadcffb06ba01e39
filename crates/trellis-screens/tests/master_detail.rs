//! Browse-and-edit screens: selection, edit mode, save, discard and close

use std::rc::Rc;

use chrono::Utc;
use trellis_core::{key_of, ComponentId, Entity, MetaClass, MetaProperty, Value};
use trellis_screens::component::{Component, Field, ListComponent, Window};
use trellis_screens::data::{
    CollectionContainer, DataContext, EntityLoader, InstanceContainer, ScreenData,
};
use trellis_screens::memory::{
    MemoryDataContext, MemoryEntityLoader, MemoryServices, MemoryStore,
};
use trellis_screens::validation::DISCARD;
use trellis_screens::{
    CloseAction, LifecyclePhase, LockState, MasterDetailLayout, MasterDetailScreen,
    NotificationType, Screen, ScreenError, ScreenStack,
};
use uuid::Uuid;

struct Fixture {
    store: Rc<MemoryStore>,
    context: Rc<MemoryDataContext>,
    browse: Rc<CollectionContainer>,
    edit: Rc<InstanceContainer>,
    loader: Rc<MemoryEntityLoader>,
    screen: Rc<Screen>,
    controller: Rc<MasterDetailScreen>,
}

fn id(name: &str) -> ComponentId {
    ComponentId::from(name)
}

fn customer_meta() -> Rc<MetaClass> {
    MetaClass::new("Customer")
        .with(MetaProperty::data("name").required())
        .build()
}

fn customers(services: &MemoryServices) -> Fixture {
    let meta = customer_meta();
    let store = MemoryStore::new();
    for (n, name) in [(1_u128, "Ada"), (2, "Grace")] {
        store.insert(
            &Entity::existing(&meta, Uuid::from_u128(n))
                .with_value("name", name)
                .into_ref(),
        );
    }

    let context = MemoryDataContext::new(&store);
    let browse = Rc::new(CollectionContainer::new("customersDc", &meta));
    browse.set_items(
        (1..=2_u128)
            .filter_map(|n| {
                store.get(&trellis_core::EntityKey {
                    entity_name: "Customer".into(),
                    id: Uuid::from_u128(n),
                })
            })
            .collect(),
    );
    let edit = Rc::new(InstanceContainer::new("customerDc", &meta));
    let loader = MemoryEntityLoader::new(&store, context.clone(), &edit);

    let window = Window::new(Component::group(
        "window",
        vec![
            Component::list("customers", ListComponent::new(&browse)),
            Component::group(
                "form",
                vec![Component::field("name", Field::bound("Name", &edit, "name").required())],
            ),
        ],
    ));
    let screen = Screen::new("customer-browse", window);
    let context_dyn: Rc<dyn DataContext> = context.clone();
    let loader_dyn: Rc<dyn EntityLoader> = loader.clone();
    screen.set_extension(Rc::new(
        ScreenData::new(context_dyn)
            .with_instance(edit.clone())
            .with_collection(browse.clone())
            .with_loader(loader_dyn),
    ));

    let controller = MasterDetailScreen::new(
        &screen,
        services.services(),
        MasterDetailLayout {
            browse_list: id("customers"),
            form: id("form"),
            edit_container: "customerDc".into(),
        },
    )
    .unwrap();
    ScreenStack::new().show(&screen).unwrap();

    Fixture {
        store,
        context,
        browse,
        edit,
        loader,
        screen,
        controller,
    }
}

fn select(fx: &Fixture, index: usize) {
    let item = fx.browse.items()[index].clone();
    fx.browse.set_selected(Some(item));
}

fn detail_name(fx: &Fixture) -> Option<String> {
    let item = fx.edit.item()?;
    let name = item.borrow().text("name").map(str::to_string);
    name
}

fn list_enabled(fx: &Fixture) -> bool {
    fx.screen.window().state(&id("customers")).unwrap().enabled
}

#[test]
fn selection_loads_a_read_only_detail() {
    let services = MemoryServices::new("alice");
    let fx = customers(&services);

    assert!(!fx.controller.is_editing());
    select(&fx, 0);
    assert_eq!(detail_name(&fx).as_deref(), Some("Ada"));
    assert_eq!(fx.loader.load_count(), 1);
    assert!(matches!(
        fx.screen.set_field_value(&id("name"), "Eve"),
        Err(ScreenError::ReadOnlyField(_))
    ));

    select(&fx, 1);
    assert_eq!(detail_name(&fx).as_deref(), Some("Grace"));
}

#[test]
fn editing_locks_the_row_and_saving_updates_the_list() {
    let services = MemoryServices::new("alice");
    let fx = customers(&services);
    select(&fx, 0);
    let key = Uuid::from_u128(1).to_string();

    assert!(fx.controller.edit_selected().is_success());
    assert!(fx.controller.is_editing());
    assert!(!fx.controller.is_creating());
    assert_eq!(fx.controller.lock_state(), LockState::Locked);
    assert_eq!(services.locks.holder("Customer", &key).as_deref(), Some("alice"));
    assert!(!list_enabled(&fx));
    assert!(!fx.controller.has_unsaved_changes());

    fx.screen.set_field_value(&id("name"), "Ada Lovelace").unwrap();
    assert!(fx.controller.has_unsaved_changes());

    assert!(fx.controller.save_changes().unwrap().is_success());
    assert!(!fx.controller.is_editing());
    assert!(list_enabled(&fx));
    assert_eq!(services.locks.holder("Customer", &key), None);
    assert_eq!(fx.browse.len(), 2);
    assert_eq!(fx.browse.items()[0].borrow().text("name"), Some("Ada Lovelace"));
    let selected = fx.browse.selected().unwrap();
    assert_eq!(key_of(&selected).id, Uuid::from_u128(1));

    let stored = fx.store.get(&key_of(&selected)).unwrap();
    assert_eq!(stored.borrow().value("name"), Some(&Value::from("Ada Lovelace")));
}

#[test]
fn created_rows_are_validated_and_appended() {
    let services = MemoryServices::new("alice");
    let fx = customers(&services);

    fx.controller.create().unwrap();
    assert!(fx.controller.is_creating());
    assert!(matches!(fx.controller.create(), Err(ScreenError::AlreadyEditing(_))));
    assert!(!fx.controller.has_unsaved_changes());
    assert_eq!(services.locks.lock_calls(), 0);

    assert!(fx.controller.save_changes().unwrap().is_fail());
    assert_eq!(services.notifications.last().unwrap().caption, "Validation failed");
    assert!(fx.controller.is_editing());

    fx.screen.set_field_value(&id("name"), "Barbara").unwrap();
    assert!(fx.controller.has_unsaved_changes());
    assert!(fx.controller.save_changes().unwrap().is_success());

    assert_eq!(fx.browse.len(), 3);
    assert_eq!(fx.store.len(), 3);
    let selected = fx.browse.selected().unwrap();
    assert_eq!(selected.borrow().text("name"), Some("Barbara"));
    assert!(!selected.borrow().is_new());
}

#[test]
fn lock_conflict_keeps_browse_mode() {
    let services = MemoryServices::new("alice");
    services
        .locks
        .acquire_as("bob", "Customer", &Uuid::from_u128(2).to_string(), Utc::now());
    let fx = customers(&services);
    select(&fx, 1);

    assert!(fx.controller.edit_selected().is_fail());
    assert!(!fx.controller.is_editing());
    assert_eq!(fx.controller.lock_state(), LockState::LockFailed);
    assert_eq!(services.notifications.last().unwrap().kind, NotificationType::Humanized);
    assert!(list_enabled(&fx));
}

#[test]
fn nothing_to_edit_without_a_selection() {
    let services = MemoryServices::new("alice");
    let fx = customers(&services);
    assert!(fx.controller.edit_selected().is_fail());
    assert!(matches!(fx.controller.save_changes(), Err(ScreenError::NotEditing(_))));
    assert!(matches!(fx.controller.discard_changes(), Err(ScreenError::NotEditing(_))));
}

#[test]
fn discard_reloads_the_selected_row() {
    let services = MemoryServices::new("alice");
    let fx = customers(&services);
    select(&fx, 1);
    assert!(fx.controller.edit_selected().is_success());
    fx.screen.set_field_value(&id("name"), "Grace Hopper").unwrap();

    fx.controller.discard_changes().unwrap();
    assert!(!fx.controller.is_editing());
    assert!(!fx.context.has_changes());
    assert_eq!(detail_name(&fx).as_deref(), Some("Grace"));
    assert_eq!(services.locks.unlock_calls(), 1);
    assert_eq!(fx.store.commit_count(), 0);
}

#[test]
fn closing_while_editing_asks_about_unsaved_changes() {
    let services = MemoryServices::new("alice");
    let fx = customers(&services);
    select(&fx, 0);
    assert!(fx.controller.edit_selected().is_success());
    fx.screen.set_field_value(&id("name"), "scratch").unwrap();

    let result = fx.screen.close(CloseAction::WindowClose);
    assert!(result.is_pending());
    assert_eq!(services.dialogs.pending_count(), 1);

    assert!(services.dialogs.choose(DISCARD));
    assert!(result.is_success());
    assert_eq!(fx.screen.phase(), LifecyclePhase::Detached);
    assert_eq!(fx.store.commit_count(), 0);
    assert_eq!(services.locks.holder("Customer", &Uuid::from_u128(1).to_string()), None);
}

#[test]
fn closing_in_browse_mode_needs_no_confirmation() {
    let services = MemoryServices::new("alice");
    let fx = customers(&services);
    select(&fx, 0);

    assert!(fx.screen.close(CloseAction::WindowClose).is_success());
    assert_eq!(services.dialogs.shown_count(), 0);
}
