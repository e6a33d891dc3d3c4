use serde::{Deserialize, Serialize};

use super::{Entity, Record, required_text};
use crate::error::ValidationErrors;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertiser {
    #[serde(flatten)]
    pub record: Record,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertiserInput {
    pub name: Option<String>,
}

impl Entity for Advertiser {
    const KIND: &'static str = "advertiser";
    const FILTER_FIELDS: &'static [&'static str] = &["name"];
    const UNIQUE_NAME: bool = true;

    type Draft = AdvertiserInput;
    type Patch = AdvertiserInput;

    fn from_draft(record: Record, draft: AdvertiserInput) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let name = required_text(&mut errors, "name", draft.name);
        errors.into_result()?;
        Ok(Self {
            record,
            name: name.unwrap_or_default(),
        })
    }

    fn apply(&mut self, patch: AdvertiserInput) -> Result<(), ValidationErrors> {
        if let Some(name) = patch.name {
            let mut errors = ValidationErrors::new();
            let name = required_text(&mut errors, "name", Some(name));
            errors.into_result()?;
            if let Some(name) = name {
                self.name = name;
            }
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
        (field == "name").then(|| self.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn name_is_required_and_trimmed() {
        let err = Advertiser::from_draft(
            Record::new(Utc::now()),
            AdvertiserInput {
                name: Some(" ".into()),
            },
        )
        .unwrap_err();
        assert_eq!(err.fields[0].field, "name");

        let a = Advertiser::from_draft(
            Record::new(Utc::now()),
            AdvertiserInput {
                name: Some(" Acme ".into()),
            },
        )
        .unwrap();
        assert_eq!(a.name, "Acme");
    }

    #[test]
    fn empty_patch_is_a_no_op() {
        let mut a = Advertiser::from_draft(
            Record::new(Utc::now()),
            AdvertiserInput {
                name: Some("Acme".into()),
            },
        )
        .unwrap();
        a.apply(AdvertiserInput::default()).unwrap();
        assert_eq!(a.name, "Acme");
    }
}
