//! Validation error aggregation

use std::fmt;

/// Identifier of a UI component inside a screen's window
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(String);

impl ComponentId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ComponentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One blocking validation problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Component to focus for this problem, if any
    pub component: Option<ComponentId>,
    /// User-facing message
    pub description: String,
}

/// Ordered collection of validation problems
///
/// Empty means nothing blocks the operation being validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A collection holding a single problem
    #[must_use]
    pub fn once(component: Option<ComponentId>, description: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(component, description);
        errors
    }

    pub fn add(&mut self, component: Option<ComponentId>, description: impl Into<String>) {
        self.errors.push(ValidationError {
            component,
            description: description.into(),
        });
    }

    /// Add a problem attached to `component`
    pub fn add_for(&mut self, component: ComponentId, description: impl Into<String>) {
        self.add(Some(component), description);
    }

    /// Add a problem not attached to any component
    pub fn add_message(&mut self, description: impl Into<String>) {
        self.add(None, description);
    }

    /// Append every problem of `other`, keeping order
    pub fn add_all(&mut self, other: ValidationErrors) {
        self.errors.extend(other.errors);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.errors.iter()
    }

    #[must_use]
    pub fn all(&self) -> &[ValidationError] {
        &self.errors
    }

    /// The first component associated with a problem
    #[must_use]
    pub fn first_component(&self) -> Option<&ComponentId> {
        self.errors.iter().find_map(|e| e.component.as_ref())
    }

    /// Messages in order
    pub fn descriptions(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(|e| e.description.as_str())
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl Extend<ValidationError> for ValidationErrors {
    fn extend<T: IntoIterator<Item = ValidationError>>(&mut self, iter: T) {
        self.errors.extend(iter);
    }
}
