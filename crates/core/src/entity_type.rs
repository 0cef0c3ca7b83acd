use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Kinds of written content that can be edited collaboratively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Character,
    Plot,
    Faction,
    Quest,
    QuestType,
    Trait,
    Prologue,
    Handout,
    SpeedLarp,
    Question,
    QuestionOption,
}

/// Where the body of a version snapshot comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodySource {
    /// The entity's own `text` column, copied verbatim.
    Text,
    /// The ordered question set applicable to the entity type.
    Form,
}

/// Attributes that partition siblings into independent ordering groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupAttr {
    Question,
    Section,
    Applicable,
}

impl GroupAttr {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Question => "question_id",
            Self::Section => "section_id",
            Self::Applicable => "applicable",
        }
    }
}

pub const ALL_ENTITY_TYPES: [EntityType; 11] = [
    EntityType::Character,
    EntityType::Plot,
    EntityType::Faction,
    EntityType::Quest,
    EntityType::QuestType,
    EntityType::Trait,
    EntityType::Prologue,
    EntityType::Handout,
    EntityType::SpeedLarp,
    EntityType::Question,
    EntityType::QuestionOption,
];

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Plot => "plot",
            Self::Faction => "faction",
            Self::Quest => "quest",
            Self::QuestType => "quest_type",
            Self::Trait => "trait",
            Self::Prologue => "prologue",
            Self::Handout => "handout",
            Self::SpeedLarp => "speed_larp",
            Self::Question => "question",
            Self::QuestionOption => "question_option",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        ALL_ENTITY_TYPES
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::UnknownEntityType(s.to_string()))
    }

    pub fn body_source(&self) -> BodySource {
        match self {
            Self::Character => BodySource::Form,
            _ => BodySource::Text,
        }
    }

    /// Character-like entities carry a "Relationships" block in snapshots.
    pub fn has_relationships(&self) -> bool {
        matches!(self, Self::Character)
    }

    /// Plot-like entities carry a "Characters" block in snapshots.
    pub fn has_characters(&self) -> bool {
        matches!(self, Self::Plot)
    }

    pub fn order_groups(&self) -> &'static [GroupAttr] {
        match self {
            Self::Question => &[GroupAttr::Applicable, GroupAttr::Section],
            Self::QuestionOption => &[GroupAttr::Question],
            _ => &[],
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a question stores its answer for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionKind {
    Name,
    Teaser,
    Text,
    Title,
    Faction,
    ShortText,
    Paragraph,
    Editor,
    Single,
    Multiple,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Teaser => "teaser",
            Self::Text => "text",
            Self::Title => "title",
            Self::Faction => "faction",
            Self::ShortText => "short_text",
            Self::Paragraph => "paragraph",
            Self::Editor => "editor",
            Self::Single => "single",
            Self::Multiple => "multiple",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "name" => Ok(Self::Name),
            "teaser" => Ok(Self::Teaser),
            "text" => Ok(Self::Text),
            "title" => Ok(Self::Title),
            "faction" => Ok(Self::Faction),
            "short_text" => Ok(Self::ShortText),
            "paragraph" => Ok(Self::Paragraph),
            "editor" => Ok(Self::Editor),
            "single" => Ok(Self::Single),
            "multiple" => Ok(Self::Multiple),
            _ => Err(CoreError::UnknownQuestionKind(s.to_string())),
        }
    }
}
