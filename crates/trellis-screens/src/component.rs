//! Logical component tree of a screen window
//!
//! Rendering is left to the host. The tree only models what the lifecycle
//! needs: which fields are visible, enabled and editable, what they are bound
//! to, and which list actions the user can reach.
//!
//! Visibility, enablement and read-only mode are inherited: a component is
//! effectively visible only if it and every ancestor are visible, and so on.

use std::fmt;
use std::rc::Rc;

use trellis_core::{ComponentId, Value};

use crate::data::{CollectionContainer, InstanceContainer};
use crate::error::{ScreenError, ScreenResult};

/// Custom field check; `Err` carries the user-facing message
pub type FieldValidator = Box<dyn Fn(&Value) -> Result<(), String>>;

/// Where a field keeps its value
pub enum FieldBinding {
    /// Value held by the field itself
    Local(Value),
    /// Property of the item of an instance container
    Bound {
        container: Rc<InstanceContainer>,
        property: String,
    },
}

/// Input field
pub struct Field {
    caption: String,
    binding: FieldBinding,
    required: bool,
    editable: bool,
    validators: Vec<FieldValidator>,
}

impl Field {
    /// Unbound field starting out empty
    #[must_use]
    pub fn local(caption: impl Into<String>) -> Self {
        Self {
            caption: caption.into(),
            binding: FieldBinding::Local(Value::Null),
            required: false,
            editable: true,
            validators: Vec::new(),
        }
    }

    /// Field showing `property` of `container`'s item
    #[must_use]
    pub fn bound(
        caption: impl Into<String>,
        container: &Rc<InstanceContainer>,
        property: impl Into<String>,
    ) -> Self {
        Self {
            binding: FieldBinding::Bound {
                container: container.clone(),
                property: property.into(),
            },
            ..Self::local(caption)
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_validator(
        mut self,
        validator: impl Fn(&Value) -> Result<(), String> + 'static,
    ) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    #[must_use]
    pub fn caption(&self) -> &str {
        &self.caption
    }

    #[must_use]
    pub fn binding(&self) -> &FieldBinding {
        &self.binding
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn set_editable(&mut self, editable: bool) {
        self.editable = editable;
    }

    /// Current value; `Null` for a bound field whose container is empty
    #[must_use]
    pub fn value(&self) -> Value {
        match &self.binding {
            FieldBinding::Local(value) => value.clone(),
            FieldBinding::Bound { container, property } => {
                container.value(property).unwrap_or_default()
            }
        }
    }

    /// Messages of the custom validators rejecting the current value
    #[must_use]
    pub fn validator_messages(&self) -> Vec<String> {
        let value = self.value();
        self.validators
            .iter()
            .filter_map(|validator| validator(&value).err())
            .collect()
    }

    pub(crate) fn set_local_value(&mut self, value: Value) {
        if let FieldBinding::Local(current) = &mut self.binding {
            *current = value;
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("caption", &self.caption)
            .field("value", &self.value())
            .field("required", &self.required)
            .field("editable", &self.editable)
            .field("validators", &self.validators.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListActionKind {
    Create,
    Add,
    Edit,
    Remove,
    Exclude,
    Custom,
}

impl ListActionKind {
    /// Adds items to the list
    #[must_use]
    pub fn adds(self) -> bool {
        matches!(self, Self::Create | Self::Add)
    }

    /// Takes items out of the list
    #[must_use]
    pub fn removes(self) -> bool {
        matches!(self, Self::Remove | Self::Exclude)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListAction {
    pub id: String,
    pub kind: ListActionKind,
    pub enabled: bool,
}

impl ListAction {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ListActionKind) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: true,
        }
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Table or list showing a collection container
#[derive(Debug)]
pub struct ListComponent {
    container: Rc<CollectionContainer>,
    actions: Vec<ListAction>,
}

impl ListComponent {
    #[must_use]
    pub fn new(container: &Rc<CollectionContainer>) -> Self {
        Self {
            container: container.clone(),
            actions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_action(mut self, action: ListAction) -> Self {
        self.actions.push(action);
        self
    }

    #[must_use]
    pub fn container(&self) -> &Rc<CollectionContainer> {
        &self.container
    }

    #[must_use]
    pub fn actions(&self) -> &[ListAction] {
        &self.actions
    }

    pub fn set_action_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.actions.iter_mut().find(|action| action.id == id) {
            Some(action) => {
                action.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Whether an enabled action adds items, given the list's state
    #[must_use]
    pub fn can_add(&self, state: ComponentState) -> bool {
        state.is_interactive() && self.actions.iter().any(|a| a.enabled && a.kind.adds())
    }

    /// Whether an enabled action removes items, given the list's state
    #[must_use]
    pub fn can_remove(&self, state: ComponentState) -> bool {
        state.is_interactive() && self.actions.iter().any(|a| a.enabled && a.kind.removes())
    }
}

#[derive(Debug)]
pub enum ComponentKind {
    Group(Vec<Component>),
    Field(Field),
    List(ListComponent),
}

/// Effective state of a component after inheritance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentState {
    pub visible: bool,
    pub enabled: bool,
    pub read_only: bool,
}

impl ComponentState {
    const ROOT: Self = Self {
        visible: true,
        enabled: true,
        read_only: false,
    };

    fn inherit(self, component: &Component) -> Self {
        Self {
            visible: self.visible && component.visible,
            enabled: self.enabled && component.enabled,
            read_only: self.read_only || component.read_only,
        }
    }

    /// Visible, enabled and not read-only
    #[must_use]
    pub fn is_interactive(self) -> bool {
        self.visible && self.enabled && !self.read_only
    }
}

#[derive(Debug)]
pub struct Component {
    id: ComponentId,
    visible: bool,
    enabled: bool,
    read_only: bool,
    kind: ComponentKind,
}

impl Component {
    fn with_kind(id: impl Into<ComponentId>, kind: ComponentKind) -> Self {
        Self {
            id: id.into(),
            visible: true,
            enabled: true,
            read_only: false,
            kind,
        }
    }

    #[must_use]
    pub fn group(id: impl Into<ComponentId>, children: Vec<Component>) -> Self {
        Self::with_kind(id, ComponentKind::Group(children))
    }

    #[must_use]
    pub fn field(id: impl Into<ComponentId>, field: Field) -> Self {
        Self::with_kind(id, ComponentKind::Field(field))
    }

    #[must_use]
    pub fn list(id: impl Into<ComponentId>, list: ListComponent) -> Self {
        Self::with_kind(id, ComponentKind::List(list))
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    #[must_use]
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut ComponentKind {
        &mut self.kind
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    #[must_use]
    pub fn as_field(&self) -> Option<&Field> {
        match &self.kind {
            ComponentKind::Field(field) => Some(field),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&ListComponent> {
        match &self.kind {
            ComponentKind::List(list) => Some(list),
            _ => None,
        }
    }

    fn children(&self) -> &[Component] {
        match &self.kind {
            ComponentKind::Group(children) => children,
            _ => &[],
        }
    }

    fn find(&self, id: &ComponentId) -> Option<&Component> {
        if self.id == *id {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(id))
    }

    fn find_mut(&mut self, id: &ComponentId) -> Option<&mut Component> {
        if self.id == *id {
            return Some(self);
        }
        match &mut self.kind {
            ComponentKind::Group(children) => {
                children.iter_mut().find_map(|child| child.find_mut(id))
            }
            _ => None,
        }
    }

    fn state_of(&self, id: &ComponentId, parent: ComponentState) -> Option<ComponentState> {
        let state = parent.inherit(self);
        if self.id == *id {
            return Some(state);
        }
        self.children().iter().find_map(|child| child.state_of(id, state))
    }

    fn walk<'a>(
        &'a self,
        parent: ComponentState,
        visit: &mut dyn FnMut(&'a Component, ComponentState),
    ) {
        let state = parent.inherit(self);
        visit(self, state);
        for child in self.children() {
            child.walk(state, visit);
        }
    }
}

/// Root of a screen's component tree plus keyboard focus
#[derive(Debug)]
pub struct Window {
    root: Component,
    focused: Option<ComponentId>,
}

impl Window {
    #[must_use]
    pub fn new(root: Component) -> Self {
        Self { root, focused: None }
    }

    /// Window with an empty root group
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Component::group("window", Vec::new()))
    }

    #[must_use]
    pub fn root(&self) -> &Component {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Component {
        &mut self.root
    }

    #[must_use]
    pub fn find(&self, id: &ComponentId) -> Option<&Component> {
        self.root.find(id)
    }

    pub fn find_mut(&mut self, id: &ComponentId) -> Option<&mut Component> {
        self.root.find_mut(id)
    }

    /// Component `id` or [`ScreenError::ComponentNotFound`]
    ///
    /// # Errors
    ///
    /// Fails when no component has the id.
    pub fn component(&self, id: &ComponentId) -> ScreenResult<&Component> {
        self.find(id).ok_or_else(|| ScreenError::ComponentNotFound(id.clone()))
    }

    /// # Errors
    ///
    /// Fails when no component has the id.
    pub fn component_mut(&mut self, id: &ComponentId) -> ScreenResult<&mut Component> {
        self.find_mut(id).ok_or_else(|| ScreenError::ComponentNotFound(id.clone()))
    }

    /// # Errors
    ///
    /// Fails when the component does not exist or is not a field.
    pub fn field(&self, id: &ComponentId) -> ScreenResult<&Field> {
        self.component(id)?
            .as_field()
            .ok_or_else(|| ScreenError::NotAField(id.clone()))
    }

    /// # Errors
    ///
    /// Fails when the component does not exist or is not a list.
    pub fn list(&self, id: &ComponentId) -> ScreenResult<&ListComponent> {
        self.component(id)?
            .as_list()
            .ok_or_else(|| ScreenError::NotAList(id.clone()))
    }

    /// Effective state of `id`, if it exists
    #[must_use]
    pub fn state(&self, id: &ComponentId) -> Option<ComponentState> {
        self.root.state_of(id, ComponentState::ROOT)
    }

    /// Visit every component depth-first with its effective state
    pub fn for_each<'a>(&'a self, mut visit: impl FnMut(&'a Component, ComponentState)) {
        self.root.walk(ComponentState::ROOT, &mut visit);
    }

    /// # Errors
    ///
    /// Fails when no component has the id.
    pub fn focus(&mut self, id: &ComponentId) -> ScreenResult<()> {
        self.component(id)?;
        self.focused = Some(id.clone());
        Ok(())
    }

    #[must_use]
    pub fn focused(&self) -> Option<&ComponentId> {
        self.focused.as_ref()
    }

    /// # Errors
    ///
    /// Fails when no component has the id.
    pub fn set_read_only(&mut self, id: &ComponentId, read_only: bool) -> ScreenResult<()> {
        self.component_mut(id)?.set_read_only(read_only);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails when no component has the id.
    pub fn set_enabled(&mut self, id: &ComponentId, enabled: bool) -> ScreenResult<()> {
        self.component_mut(id)?.set_enabled(enabled);
        Ok(())
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::empty()
    }
}
