use scriptdesk_core::{
    EditPayload, EntityId, EntityType, FieldErrors, FieldValue, QuestionKind, TenantId,
};
use scriptdesk_storage::{EntityAccess, EntityRecord, QUESTION_KIND_FIELD, StorageError};

use crate::messages::Locale;

pub const NAME_MAX_LEN: usize = 150;

/// Form key under which errors for a question's answer are reported.
pub fn question_field(question_id: EntityId) -> String {
    format!("q{question_id}")
}

/// Check a payload before it is persisted. An empty result means the payload
/// may be written as-is.
pub fn validate_payload(
    storage: &dyn EntityAccess,
    tenant_id: TenantId,
    entity_type: EntityType,
    payload: &EditPayload,
    locale: Locale,
) -> Result<FieldErrors, StorageError> {
    let mut errors = FieldErrors::new();

    let name = payload.name.trim();
    if name.is_empty() {
        errors.add("name", locale.required());
    } else if name.chars().count() > NAME_MAX_LEN {
        errors.add("name", locale.too_long(NAME_MAX_LEN));
    }

    match entity_type {
        EntityType::Question => {
            if payload.group.applicable.is_none() {
                errors.add("applicable", locale.required());
            }
            let kind = payload
                .fields
                .iter()
                .find(|(key, _)| key == QUESTION_KIND_FIELD)
                .and_then(|(_, value)| value.as_text())
                .map(QuestionKind::parse);
            match kind {
                None => errors.add(QUESTION_KIND_FIELD, locale.required()),
                Some(Err(_)) => errors.add(QUESTION_KIND_FIELD, locale.invalid_choice()),
                Some(Ok(_)) => {}
            }
        }
        EntityType::QuestionOption => match payload.group.question_id {
            None => errors.add("question", locale.required()),
            Some(question_id) => {
                if storage
                    .find_entity(tenant_id, EntityType::Question, question_id)?
                    .is_none()
                {
                    errors.add("question", locale.invalid_choice());
                }
            }
        },
        _ => {}
    }

    for (key, value) in &payload.fields {
        if let FieldValue::EntityRef(target) = value {
            let owned = storage
                .get_entity(*target)?
                .is_some_and(|e| e.tenant_id == tenant_id);
            if !owned {
                errors.add(key.clone(), locale.invalid_choice());
            }
        }
    }

    for (question_id, _) in &payload.answers {
        if form_question(storage, tenant_id, entity_type, *question_id)?.is_none() {
            errors.add(question_field(*question_id), locale.invalid_choice());
        }
    }

    for (question_id, options) in &payload.choices {
        let field = question_field(*question_id);
        let Some(question) = form_question(storage, tenant_id, entity_type, *question_id)? else {
            errors.add(field, locale.invalid_choice());
            continue;
        };
        let kind = storage
            .get_field(question.entity_id, QUESTION_KIND_FIELD)?
            .and_then(|v| v.as_text().and_then(|s| QuestionKind::parse(s).ok()));
        if kind == Some(QuestionKind::Single) && options.len() > 1 {
            errors.add(field.clone(), locale.single_choice_only());
        }
        for option_id in options {
            let belongs = storage
                .find_entity(tenant_id, EntityType::QuestionOption, *option_id)?
                .is_some_and(|o| o.group.question_id == Some(*question_id));
            if !belongs {
                errors.add(field.clone(), locale.invalid_choice());
                break;
            }
        }
    }

    Ok(errors)
}

/// A committed question of the tenant that applies to `entity_type`.
fn form_question(
    storage: &dyn EntityAccess,
    tenant_id: TenantId,
    entity_type: EntityType,
    question_id: EntityId,
) -> Result<Option<EntityRecord>, StorageError> {
    Ok(storage
        .find_entity(tenant_id, EntityType::Question, question_id)?
        .filter(|q| !q.temp && q.group.applicable == Some(entity_type)))
}
