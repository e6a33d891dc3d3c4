use serde::{Deserialize, Serialize};

use super::{Entity, EntityId, Record, optional_text, required_text};
use crate::error::ValidationErrors;

/// An ad slot on a publisher's property, rendered with a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    #[serde(flatten)]
    pub record: Record,
    pub name: String,
    pub publisher_id: EntityId,
    pub template_id: EntityId,
    pub topic_id: Option<EntityId>,
    /// Share of inventory held back, in `[0, 1]`.
    pub reserve_pct: Option<f64>,
}

/// Create payload, and update payload where `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacementInput {
    pub name: Option<String>,
    pub publisher_id: Option<String>,
    pub template_id: Option<String>,
    pub topic_id: Option<String>,
    pub reserve_pct: Option<f64>,
}

fn check_reserve_pct(errors: &mut ValidationErrors, pct: Option<f64>) -> Option<f64> {
    match pct {
        Some(p) if !(0.0..=1.0).contains(&p) => {
            errors.push("reserve_pct", "must be between 0 and 1");
            None
        }
        other => other,
    }
}

impl Entity for Placement {
    const KIND: &'static str = "placement";
    const FILTER_FIELDS: &'static [&'static str] =
        &["name", "publisher_id", "template_id", "topic_id"];

    type Draft = PlacementInput;
    type Patch = PlacementInput;

    fn from_draft(record: Record, draft: PlacementInput) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let name = required_text(&mut errors, "name", draft.name);
        let publisher_id = required_text(&mut errors, "publisher_id", draft.publisher_id);
        let template_id = required_text(&mut errors, "template_id", draft.template_id);
        let reserve_pct = check_reserve_pct(&mut errors, draft.reserve_pct);
        errors.into_result()?;

        match (name, publisher_id, template_id) {
            (Some(name), Some(publisher_id), Some(template_id)) => Ok(Self {
                record,
                name,
                publisher_id: publisher_id.into(),
                template_id: template_id.into(),
                topic_id: optional_text(draft.topic_id).map(EntityId::from),
                reserve_pct,
            }),
            _ => Err(ValidationErrors::single("placement", "incomplete payload")),
        }
    }

    fn apply(&mut self, patch: PlacementInput) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let name = patch
            .name
            .map(|n| required_text(&mut errors, "name", Some(n)));
        let publisher_id = patch
            .publisher_id
            .map(|p| required_text(&mut errors, "publisher_id", Some(p)));
        let template_id = patch
            .template_id
            .map(|t| required_text(&mut errors, "template_id", Some(t)));
        let reserve_pct = check_reserve_pct(&mut errors, patch.reserve_pct);
        errors.into_result()?;

        if let Some(Some(name)) = name {
            self.name = name;
        }
        if let Some(Some(publisher_id)) = publisher_id {
            self.publisher_id = publisher_id.into();
        }
        if let Some(Some(template_id)) = template_id {
            self.template_id = template_id.into();
        }
        if patch.topic_id.is_some() {
            self.topic_id = optional_text(patch.topic_id).map(EntityId::from);
        }
        if reserve_pct.is_some() {
            self.reserve_pct = reserve_pct;
        }
        Ok(())
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn filter_value(&self, field: &str) -> Option<String> {
        match field {
            "name" => Some(self.name.clone()),
            "publisher_id" => Some(self.publisher_id.to_string()),
            "template_id" => Some(self.template_id.to_string()),
            "topic_id" => self.topic_id.as_ref().map(ToString::to_string),
            _ => None,
        }
    }

    /// Name plus the referenced ids, so full search also finds a placement by
    /// its publisher, template, or topic. Autocomplete stays on `name`.
    fn search_text(&self) -> String {
        let mut text = format!("{} {} {}", self.name, self.publisher_id, self.template_id);
        if let Some(topic) = &self.topic_id {
            text.push(' ');
            text.push_str(topic.as_str());
        }
        text
    }
}
