//! Rule-based validation and static permissions

use std::collections::{HashMap, HashSet};
use std::fmt;

use trellis_core::{EntityRef, Value};

use crate::services::{AccessManager, ConstraintViolation, ValidationGroup, Validator};

type PropertyRule = Box<dyn Fn(&Value) -> Option<String>>;
type BeanRule = Box<dyn Fn(&EntityRef) -> Vec<ConstraintViolation>>;

/// Validator checking required properties from metadata plus registered
/// rules
///
/// Property rules are keyed by entity name and property. Bean rules belong
/// to a validation group and may report violations on nested paths.
#[derive(Default)]
pub struct RuleValidator {
    property_rules: HashMap<(String, String), Vec<PropertyRule>>,
    bean_rules: Vec<(String, ValidationGroup, BeanRule)>,
}

impl RuleValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rule on one property; returns a message when the value is invalid
    #[must_use]
    pub fn with_property_rule(
        mut self,
        entity: &str,
        property: &str,
        rule: impl Fn(&Value) -> Option<String> + 'static,
    ) -> Self {
        self.property_rules
            .entry((entity.to_string(), property.to_string()))
            .or_default()
            .push(Box::new(rule));
        self
    }

    /// Whole-entity rule in `group`
    #[must_use]
    pub fn with_bean_rule(
        mut self,
        entity: &str,
        group: ValidationGroup,
        rule: impl Fn(&EntityRef) -> Vec<ConstraintViolation> + 'static,
    ) -> Self {
        self.bean_rules.push((entity.to_string(), group, Box::new(rule)));
        self
    }
}

impl Validator for RuleValidator {
    fn validate_property(&self, entity: &EntityRef, property: &str) -> Vec<ConstraintViolation> {
        let entity = entity.borrow();
        let value = entity.value(property).cloned().unwrap_or_default();
        let mut violations = Vec::new();

        let required = entity
            .meta()
            .property(property)
            .is_some_and(|meta| meta.required);
        if required && value.is_empty() {
            violations.push(ConstraintViolation::property(property, "must not be empty"));
        }

        let key = (entity.entity_name().to_string(), property.to_string());
        if let Some(rules) = self.property_rules.get(&key) {
            violations.extend(
                rules
                    .iter()
                    .filter_map(|rule| rule(&value))
                    .map(|message| ConstraintViolation::property(property, message)),
            );
        }
        violations
    }

    fn validate(&self, entity: &EntityRef, group: ValidationGroup) -> Vec<ConstraintViolation> {
        let name = entity.borrow().entity_name().to_string();
        let mut violations = Vec::new();
        if group == ValidationGroup::Default {
            let properties: Vec<String> = entity
                .borrow()
                .meta()
                .properties()
                .iter()
                .map(|property| property.name.clone())
                .collect();
            for property in properties {
                violations.extend(self.validate_property(entity, &property));
            }
        }
        for (entity_name, rule_group, rule) in &self.bean_rules {
            if *entity_name == name && *rule_group == group {
                violations.extend(rule(entity));
            }
        }
        violations
    }
}

impl fmt::Debug for RuleValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleValidator")
            .field("property_rules", &self.property_rules.len())
            .field("bean_rules", &self.bean_rules.len())
            .finish()
    }
}

/// Access manager with a fixed set of read-only entities
#[derive(Debug, Default, Clone)]
pub struct StaticAccess {
    read_only: HashSet<String>,
}

impl StaticAccess {
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Revoke update permission on `entity`
    #[must_use]
    pub fn deny(mut self, entity: impl Into<String>) -> Self {
        self.read_only.insert(entity.into());
        self
    }
}

impl AccessManager for StaticAccess {
    fn can_edit(&self, entity_name: &str) -> bool {
        !self.read_only.contains(entity_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use trellis_core::{Entity, MetaClass, MetaProperty};

    fn period_meta() -> Rc<MetaClass> {
        MetaClass::new("Period")
            .with(MetaProperty::data("name").required())
            .with(MetaProperty::data("start"))
            .with(MetaProperty::data("end"))
            .build()
    }

    #[test]
    fn required_and_custom_property_rules_both_report() {
        let validator = RuleValidator::new().with_property_rule("Period", "start", |value| {
            (value.as_int().unwrap_or(0) < 0).then(|| "must not be negative".to_string())
        });
        let period = Entity::new(&period_meta()).with_value("start", -1_i64).into_ref();

        assert_eq!(validator.validate_property(&period, "name").len(), 1);
        assert_eq!(
            validator.validate_property(&period, "start"),
            vec![ConstraintViolation::property("start", "must not be negative")]
        );
        assert_eq!(validator.validate(&period, ValidationGroup::Default).len(), 2);
    }

    #[test]
    fn bean_rules_run_only_for_their_group() {
        let validator =
            RuleValidator::new().with_bean_rule("Period", ValidationGroup::UiCrossField, |entity| {
                let entity = entity.borrow();
                let start = entity.value("start").and_then(Value::as_int).unwrap_or(0);
                let end = entity.value("end").and_then(Value::as_int).unwrap_or(0);
                if start > end {
                    vec![ConstraintViolation::bean("start must precede end")]
                } else {
                    Vec::new()
                }
            });
        let period = Entity::new(&period_meta())
            .with_value("name", "Q1")
            .with_value("start", 5_i64)
            .with_value("end", 1_i64)
            .into_ref();

        assert!(validator.validate(&period, ValidationGroup::Default).is_empty());
        assert_eq!(validator.validate(&period, ValidationGroup::UiCrossField).len(), 1);
    }

    #[test]
    fn denied_entities_are_read_only() {
        let access = StaticAccess::allow_all().deny("Invoice");
        assert!(access.can_edit("Order"));
        assert!(!access.can_edit("Invoice"));
    }
}
