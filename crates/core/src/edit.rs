use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entity_type::EntityType;
use crate::error::CoreError;
use crate::field_value::FieldValue;
use crate::ids::{EntityId, TenantId};

/// Identity of whoever issues a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub tenant_id: TenantId,
    pub display_name: String,
    /// Privileged callers skip conflict checking entirely.
    pub privileged: bool,
}

impl Caller {
    pub fn new(tenant_id: TenantId, display_name: impl Into<String>) -> Self {
        Self {
            tenant_id,
            display_name: display_name.into(),
            privileged: false,
        }
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }
}

/// Grouping attributes used by sibling ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderGroup {
    pub question_id: Option<EntityId>,
    pub section_id: Option<i64>,
    pub applicable: Option<EntityType>,
}

/// Form submission for one entity, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditPayload {
    pub name: String,
    pub text: String,
    pub fields: Vec<(String, FieldValue)>,
    /// Free-text answers keyed by question id.
    pub answers: Vec<(EntityId, String)>,
    /// Selected options keyed by question id.
    pub choices: Vec<(EntityId, Vec<EntityId>)>,
    pub group: OrderGroup,
}

impl EditPayload {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    pub fn with_answer(mut self, question_id: EntityId, text: impl Into<String>) -> Self {
        self.answers.push((question_id, text.into()));
        self
    }

    pub fn with_choices(mut self, question_id: EntityId, options: Vec<EntityId>) -> Self {
        self.choices.push((question_id, options));
        self
    }

    pub fn with_group(mut self, group: OrderGroup) -> Self {
        self.group = group;
        self
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

/// Field-level validation messages, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    New,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "NEW" => Ok(Self::New),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(CoreError::InvalidData(format!("unknown audit action: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Towards higher order values.
    Up,
    /// Towards lower order values.
    Down,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_accumulate_per_field() {
        let mut errors = FieldErrors::new();
        assert!(errors.is_empty());
        errors.add("name", "required");
        errors.add("name", "too long");
        errors.add("text", "bad markup");
        assert_eq!(errors.get("name").unwrap().len(), 2);
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["name", "text"]);
    }

    #[test]
    fn payload_survives_draft_encoding() {
        let payload = EditPayload::named("Ariel")
            .with_text("<p>storm</p>")
            .with_field("teaser", FieldValue::Text("spirit".into()))
            .with_answer(EntityId::new(3), "blue")
            .with_choices(EntityId::new(4), vec![EntityId::new(9)]);
        let restored = EditPayload::from_msgpack(&payload.to_msgpack().unwrap()).unwrap();
        assert_eq!(restored, payload);
    }
}
