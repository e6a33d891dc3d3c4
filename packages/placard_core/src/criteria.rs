//! Store-side predicates shared by connections and search filters.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::ValidationErrors;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub value: String,
}

/// Conjunction of equality conditions plus the soft-delete gate.
///
/// The default excludes deleted entities; `include_deleted` is the only way to
/// see them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criteria {
    #[serde(default)]
    pub include_deleted: bool,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Criteria {
    pub fn active() -> Self {
        Self::default()
    }

    pub fn any_state() -> Self {
        Self {
            include_deleted: true,
            conditions: Vec::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Parse `field=value` pairs, as given on the command line.
    pub fn parse_pairs<'a>(
        pairs: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ValidationErrors> {
        let mut criteria = Self::active();
        let mut errors = ValidationErrors::new();
        for pair in pairs {
            match pair.split_once('=') {
                Some((field, value)) if !field.trim().is_empty() => {
                    criteria = criteria.with(field.trim(), value.trim());
                }
                _ => errors.push("filter", format!("expected field=value, got `{pair}`")),
            }
        }
        errors.into_result()?;
        Ok(criteria)
    }

    /// Every condition must name a filterable field of `E`.
    pub fn validate<E: Entity>(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for condition in &self.conditions {
            if !E::FILTER_FIELDS.contains(&condition.field.as_str()) {
                errors.push(
                    condition.field.clone(),
                    format!("is not a filterable {} field", E::KIND),
                );
            }
        }
        errors.into_result()
    }

    pub fn matches<E: Entity>(&self, entity: &E) -> bool {
        if entity.is_deleted() && !self.include_deleted {
            return false;
        }
        self.conditions
            .iter()
            .all(|c| entity.filter_value(&c.field).as_deref() == Some(c.value.as_str()))
    }
}
