//! Localized message templates
//!
//! Templates are looked up by dotted message id and may contain `{name}`
//! placeholders. Built-in English texts can be overridden from the
//! `[messages]` configuration table.

use std::collections::BTreeMap;

use crate::config::ScreensConfig;

pub const ENTITY_LOCKED_CAPTION: &str = "entity-locked.caption";
pub const ENTITY_LOCKED_DESCRIPTION: &str = "entity-locked.description";
pub const VALIDATION_FAILED_CAPTION: &str = "validation-failed.caption";
pub const UNSAVED_CHANGES_CAPTION: &str = "unsaved-changes.caption";
pub const UNSAVED_CHANGES_MESSAGE: &str = "unsaved-changes.message";
pub const SAVE_CHANGES_CAPTION: &str = "save-changes.caption";
pub const SAVE_CHANGES_MESSAGE: &str = "save-changes.message";
pub const ACTION_SAVE: &str = "action.save";
pub const ACTION_DISCARD: &str = "action.discard";
pub const ACTION_CANCEL: &str = "action.cancel";
pub const COMMIT_FAILED_CAPTION: &str = "commit-failed.caption";
pub const FIELD_REQUIRED: &str = "field.required";
pub const NEW_ENTITY_CAPTION: &str = "editor.new-entity-caption";
pub const EDIT_ENTITY_CAPTION: &str = "editor.edit-entity-caption";

const DEFAULTS: &[(&str, &str)] = &[
    (ENTITY_LOCKED_CAPTION, "The record is locked"),
    (
        ENTITY_LOCKED_DESCRIPTION,
        "User {user} has locked this record at {since}",
    ),
    (VALIDATION_FAILED_CAPTION, "Validation failed"),
    (UNSAVED_CHANGES_CAPTION, "Unsaved changes"),
    (
        UNSAVED_CHANGES_MESSAGE,
        "You have unsaved changes. Do you want to discard them and close?",
    ),
    (SAVE_CHANGES_CAPTION, "Save changes"),
    (
        SAVE_CHANGES_MESSAGE,
        "Do you want to save changes before closing?",
    ),
    (ACTION_SAVE, "Save"),
    (ACTION_DISCARD, "Discard"),
    (ACTION_CANCEL, "Cancel"),
    (COMMIT_FAILED_CAPTION, "Changes could not be saved"),
    (FIELD_REQUIRED, "{caption} is required"),
    (NEW_ENTITY_CAPTION, "New {entity}"),
    (EDIT_ENTITY_CAPTION, "Edit {entity}"),
];

/// Message id to template lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCatalog {
    templates: BTreeMap<String, String>,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self {
            templates: DEFAULTS
                .iter()
                .map(|(key, text)| ((*key).to_string(), (*text).to_string()))
                .collect(),
        }
    }
}

impl MessageCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in templates with the configuration's overrides applied
    #[must_use]
    pub fn from_config(config: &ScreensConfig) -> Self {
        let mut catalog = Self::default();
        for (key, text) in &config.messages {
            catalog.set(key.clone(), text.clone());
        }
        catalog
    }

    pub fn set(&mut self, key: impl Into<String>, template: impl Into<String>) {
        self.templates.insert(key.into(), template.into());
    }

    /// Template for `key`; unknown ids resolve to the id itself
    #[must_use]
    pub fn get<'a>(&'a self, key: &'a str) -> &'a str {
        self.templates.get(key).map_or(key, String::as_str)
    }

    /// Template for `key` with `{name}` placeholders replaced
    ///
    /// Placeholders without a matching argument are left as written.
    #[must_use]
    pub fn format(&self, key: &str, args: &[(&str, &str)]) -> String {
        interpolate(self.get(key), args)
    }
}

fn interpolate(template: &str, args: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match args.iter().find(|(arg, _)| *arg == name) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
