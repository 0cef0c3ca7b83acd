//! Append-only text history of committed entities.

use scriptdesk_core::{BodySource, EntityId, QuestionKind};
use scriptdesk_storage::{
    EDGE_FACTION_MEMBER, EDGE_PLOT_CHARACTER, EDGE_RELATIONSHIP, EntityAccess, EntityRecord,
    QUESTION_KIND_FIELD, Storage, StorageError, VersionRecord,
};

/// Where a form question reads its value for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// A column or stored field of the entity itself.
    Attribute(&'static str),
    /// Names of entities linking to this one through the given edge type.
    Related(&'static str),
    /// The entity's free-text answer to the question.
    FreeText,
    /// Names of the options the entity selected for the question.
    Choices,
}

impl ValueSource {
    pub fn for_kind(kind: QuestionKind) -> Self {
        match kind {
            QuestionKind::Name => Self::Attribute("name"),
            QuestionKind::Teaser => Self::Attribute("teaser"),
            QuestionKind::Text => Self::Attribute("text"),
            QuestionKind::Title => Self::Attribute("title"),
            QuestionKind::Faction => Self::Related(EDGE_FACTION_MEMBER),
            QuestionKind::ShortText | QuestionKind::Paragraph | QuestionKind::Editor => {
                Self::FreeText
            }
            QuestionKind::Single | QuestionKind::Multiple => Self::Choices,
        }
    }

    pub fn extract(
        &self,
        storage: &dyn EntityAccess,
        entity: &EntityRecord,
        question_id: EntityId,
    ) -> Result<String, StorageError> {
        match self {
            Self::Attribute("name") => Ok(entity.name.clone()),
            Self::Attribute("text") => Ok(entity.text.clone()),
            Self::Attribute(key) => Ok(storage
                .get_field(entity.entity_id, key)?
                .map(|v| v.display_text())
                .unwrap_or_default()),
            Self::Related(edge_type) => {
                let mut names = Vec::new();
                for edge in storage.get_edges_to(entity.entity_id, edge_type)? {
                    if let Some(source) = storage.get_entity(edge.source_id)? {
                        names.push(source.name);
                    }
                }
                Ok(names.join(", "))
            }
            Self::FreeText => Ok(storage
                .get_answer(question_id, entity.entity_id)?
                .unwrap_or_default()),
            Self::Choices => Ok(storage
                .get_choice_names(question_id, entity.entity_id)?
                .join(", ")),
        }
    }
}

/// Remove markup and surrounding whitespace from rich text.
pub fn clean_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    let out = out
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Full text captured for one version of `entity`.
pub fn snapshot_text(
    storage: &dyn EntityAccess,
    entity: &EntityRecord,
) -> Result<String, StorageError> {
    let mut text = match entity.entity_type.body_source() {
        BodySource::Text => entity.text.clone(),
        BodySource::Form => form_text(storage, entity)?,
    };

    if entity.entity_type.has_relationships() {
        let lines = edge_lines(storage, entity.entity_id, EDGE_RELATIONSHIP)?;
        append_block(&mut text, "Relationships", &lines);
    }
    if entity.entity_type.has_characters() {
        let lines = edge_lines(storage, entity.entity_id, EDGE_PLOT_CHARACTER)?;
        append_block(&mut text, "Characters", &lines);
    }
    Ok(text)
}

fn form_text(storage: &dyn EntityAccess, entity: &EntityRecord) -> Result<String, StorageError> {
    let mut lines = Vec::new();
    for question in storage.get_questions(entity.tenant_id, entity.entity_type)? {
        let value = match question_value(storage, entity, &question) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    question = %question.entity_id,
                    entity_id = %entity.entity_id,
                    "field extraction failed, recording empty value: {e}"
                );
                String::new()
            }
        };
        let value = value.trim();
        if !value.is_empty() {
            lines.push(format!("{}: {value}", question.name));
        }
    }
    Ok(lines.join("\n"))
}

fn question_value(
    storage: &dyn EntityAccess,
    entity: &EntityRecord,
    question: &EntityRecord,
) -> Result<String, StorageError> {
    let kind = storage
        .get_field(question.entity_id, QUESTION_KIND_FIELD)?
        .and_then(|v| v.as_text().map(str::to_string))
        .unwrap_or_default();
    let kind = QuestionKind::parse(&kind)?;
    ValueSource::for_kind(kind).extract(storage, entity, question.entity_id)
}

fn edge_lines(
    storage: &dyn EntityAccess,
    entity_id: EntityId,
    edge_type: &str,
) -> Result<Vec<String>, StorageError> {
    let mut lines = Vec::new();
    for edge in storage.get_edges_from(entity_id, edge_type)? {
        let Some(target) = storage.get_entity(edge.target_id)? else {
            continue;
        };
        let text = clean_text(&edge.text);
        if text.is_empty() {
            lines.push(target.name);
        } else {
            lines.push(format!("{}: {text}", target.name));
        }
    }
    Ok(lines)
}

fn append_block(text: &mut String, title: &str, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    if !text.is_empty() {
        text.push_str("\n\n");
    }
    text.push_str(title);
    for line in lines {
        text.push('\n');
        text.push_str(line);
    }
}

pub struct VersionLedger {
    retry_limit: u32,
}

impl VersionLedger {
    pub fn new(retry_limit: u32) -> Self {
        Self { retry_limit }
    }

    /// Append the next version of `entity`. Must run inside the transaction
    /// that writes (or deletes) the entity.
    pub fn snapshot<S: Storage>(
        &self,
        storage: &mut S,
        entity: &EntityRecord,
        author: &str,
        is_deletion: bool,
        now: i64,
    ) -> Result<VersionRecord, StorageError> {
        let text = snapshot_text(&*storage, entity)?;
        let record = storage.append_version(
            entity.entity_type,
            entity.entity_id,
            author,
            &text,
            is_deletion,
            now,
            self.retry_limit,
        )?;
        tracing::info!(
            entity_type = %entity.entity_type,
            entity_id = %entity.entity_id,
            version = record.version,
            deleted = is_deletion,
            "version recorded"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptdesk_core::{EditPayload, EntityType, FieldValue, OrderGroup, TenantId};
    use scriptdesk_storage::SqliteStorage;

    const TENANT: TenantId = TenantId::new(1);

    fn insert(storage: &mut SqliteStorage, entity_type: EntityType, payload: EditPayload) -> EntityId {
        storage
            .insert_entity(TENANT, entity_type, &payload, false, 0, 0)
            .unwrap()
    }

    fn question(storage: &mut SqliteStorage, name: &str, kind: &str, order: i64) -> EntityId {
        let payload = EditPayload::named(name)
            .with_field(QUESTION_KIND_FIELD, FieldValue::Text(kind.into()))
            .with_group(OrderGroup {
                applicable: Some(EntityType::Character),
                ..OrderGroup::default()
            });
        storage
            .insert_entity(TENANT, EntityType::Question, &payload, false, order, 0)
            .unwrap()
    }

    #[test]
    fn clean_text_strips_markup() {
        assert_eq!(clean_text("  <p>Loves <b>Miranda</b></p>&nbsp;"), "Loves Miranda");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn clean_text_decodes_each_entity_once() {
        assert_eq!(clean_text("&amp;lt;b&amp;gt;"), "&lt;b&gt;");
        assert_eq!(clean_text("Fish &amp; chips &lt;3"), "Fish & chips <3");
    }

    #[test]
    fn text_entities_copy_body() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let id = insert(&mut storage, EntityType::Quest, EditPayload::named("Q").with_text("<p>Find it</p>"));
        let entity = storage.get_entity(id).unwrap().unwrap();
        assert_eq!(snapshot_text(&storage, &entity).unwrap(), "<p>Find it</p>");
    }

    #[test]
    fn form_entities_follow_question_order() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        question(&mut storage, "Name", "name", 0);
        let q_origin = question(&mut storage, "Origin", "paragraph", 1);
        let q_side = question(&mut storage, "Side", "multiple", 2);
        let q_empty = question(&mut storage, "Secret", "short_text", 3);
        let north = insert(
            &mut storage,
            EntityType::QuestionOption,
            EditPayload::named("North").with_group(OrderGroup {
                question_id: Some(q_side),
                ..OrderGroup::default()
            }),
        );
        let faction = insert(&mut storage, EntityType::Faction, EditPayload::named("Court"));

        let character = insert(
            &mut storage,
            EntityType::Character,
            EditPayload::named("Ariel")
                .with_answer(q_origin, "The island")
                .with_answer(q_empty, "")
                .with_choices(q_side, vec![north]),
        );
        storage.insert_edge(EDGE_FACTION_MEMBER, faction, character, "").unwrap();
        question(&mut storage, "Faction", "faction", 4);

        let entity = storage.get_entity(character).unwrap().unwrap();
        assert_eq!(
            snapshot_text(&storage, &entity).unwrap(),
            "Name: Ariel\nOrigin: The island\nSide: North\nFaction: Court"
        );
    }

    #[test]
    fn broken_question_yields_empty_value() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        question(&mut storage, "Name", "name", 0);
        question(&mut storage, "Mystery", "hieroglyphs", 1);
        let id = insert(&mut storage, EntityType::Character, EditPayload::named("Caliban"));
        let entity = storage.get_entity(id).unwrap().unwrap();
        assert_eq!(snapshot_text(&storage, &entity).unwrap(), "Name: Caliban");
    }

    #[test]
    fn relationship_and_character_blocks() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        question(&mut storage, "Name", "name", 0);
        let ferdinand = insert(&mut storage, EntityType::Character, EditPayload::named("Ferdinand"));
        let miranda = insert(&mut storage, EntityType::Character, EditPayload::named("Miranda"));
        storage
            .insert_edge(EDGE_RELATIONSHIP, ferdinand, miranda, "<p>Falls in love</p>")
            .unwrap();
        let plot = insert(&mut storage, EntityType::Plot, EditPayload::named("Wreck").with_text("A storm."));
        storage.insert_edge(EDGE_PLOT_CHARACTER, plot, ferdinand, "Survives").unwrap();
        storage.insert_edge(EDGE_PLOT_CHARACTER, plot, miranda, "").unwrap();

        let entity = storage.get_entity(ferdinand).unwrap().unwrap();
        assert_eq!(
            snapshot_text(&storage, &entity).unwrap(),
            "Name: Ferdinand\n\nRelationships\nMiranda: Falls in love"
        );
        let entity = storage.get_entity(plot).unwrap().unwrap();
        assert_eq!(
            snapshot_text(&storage, &entity).unwrap(),
            "A storm.\n\nCharacters\nFerdinand: Survives\nMiranda"
        );
    }

    #[test]
    fn sequential_snapshots_are_gapless() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let id = insert(&mut storage, EntityType::Handout, EditPayload::named("Map"));
        let entity = storage.get_entity(id).unwrap().unwrap();
        let ledger = VersionLedger::new(5);
        let versions: Vec<i64> = (0..5)
            .map(|_| ledger.snapshot(&mut storage, &entity, "Prospero", false, 0).unwrap().version)
            .collect();
        assert_eq!(versions, vec![1, 2, 3, 4, 5]);
    }
}
