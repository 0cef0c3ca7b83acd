//! User-facing message catalog.

use serde::{Deserialize, Serialize};

use scriptdesk_core::EntityType;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    It,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::It => "it",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Self::En),
            "it" => Some(Self::It),
            _ => None,
        }
    }

    pub fn conflict_warning(&self, names: &[String]) -> String {
        let names = names.join(", ");
        match self {
            Self::En => format!(
                "Warning! Other users are editing this item: {names}. You cannot work on it at the same time: the work of one of you would be lost."
            ),
            Self::It => format!(
                "Attenzione! Altri utenti stanno modificando questo elemento: {names}. Non potete lavorarci contemporaneamente: il lavoro di uno di voi andrebbe perso."
            ),
        }
    }

    pub fn saved(&self, entity_type: EntityType, name: &str) -> String {
        match self {
            Self::En => format!("{} \"{name}\" saved", type_label(*self, entity_type)),
            Self::It => format!("{} \"{name}\" salvato", type_label(*self, entity_type)),
        }
    }

    pub fn deleted(&self, entity_type: EntityType, name: &str) -> String {
        match self {
            Self::En => format!("{} \"{name}\" deleted", type_label(*self, entity_type)),
            Self::It => format!("{} \"{name}\" eliminato", type_label(*self, entity_type)),
        }
    }

    pub fn not_found(&self) -> String {
        match self {
            Self::En => "The requested item does not exist.".into(),
            Self::It => "L'elemento richiesto non esiste.".into(),
        }
    }

    pub fn operation_failed(&self) -> String {
        match self {
            Self::En => "The operation could not be completed. Please try again.".into(),
            Self::It => "Impossibile completare l'operazione. Riprova.".into(),
        }
    }

    pub fn required(&self) -> String {
        match self {
            Self::En => "This field is required.".into(),
            Self::It => "Questo campo è obbligatorio.".into(),
        }
    }

    pub fn too_long(&self, max: usize) -> String {
        match self {
            Self::En => format!("Ensure this value has at most {max} characters."),
            Self::It => format!("Assicurati che questo valore non superi {max} caratteri."),
        }
    }

    pub fn invalid_choice(&self) -> String {
        match self {
            Self::En => "Select a valid choice.".into(),
            Self::It => "Seleziona una scelta valida.".into(),
        }
    }

    pub fn single_choice_only(&self) -> String {
        match self {
            Self::En => "Only one option can be selected.".into(),
            Self::It => "È possibile selezionare una sola opzione.".into(),
        }
    }
}

fn type_label(locale: Locale, entity_type: EntityType) -> &'static str {
    match (locale, entity_type) {
        (Locale::En, EntityType::Character) => "Character",
        (Locale::En, EntityType::Plot) => "Plot",
        (Locale::En, EntityType::Faction) => "Faction",
        (Locale::En, EntityType::Quest) => "Quest",
        (Locale::En, EntityType::QuestType) => "Quest type",
        (Locale::En, EntityType::Trait) => "Trait",
        (Locale::En, EntityType::Prologue) => "Prologue",
        (Locale::En, EntityType::Handout) => "Handout",
        (Locale::En, EntityType::SpeedLarp) => "Speed larp",
        (Locale::En, EntityType::Question) => "Question",
        (Locale::En, EntityType::QuestionOption) => "Option",
        (Locale::It, EntityType::Character) => "Personaggio",
        (Locale::It, EntityType::Plot) => "Trama",
        (Locale::It, EntityType::Faction) => "Fazione",
        (Locale::It, EntityType::Quest) => "Quest",
        (Locale::It, EntityType::QuestType) => "Tipo di quest",
        (Locale::It, EntityType::Trait) => "Tratto",
        (Locale::It, EntityType::Prologue) => "Prologo",
        (Locale::It, EntityType::Handout) => "Handout",
        (Locale::It, EntityType::SpeedLarp) => "Speed larp",
        (Locale::It, EntityType::Question) => "Domanda",
        (Locale::It, EntityType::QuestionOption) => "Opzione",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_warning_names_every_editor() {
        let msg = Locale::En.conflict_warning(&["Ada".into(), "Bo".into()]);
        assert!(msg.contains("Ada, Bo"));
        assert!(Locale::It.conflict_warning(&["Ada".into()]).starts_with("Attenzione!"));
    }

    #[test]
    fn locale_parse_is_case_insensitive() {
        assert_eq!(Locale::parse(" IT "), Some(Locale::It));
        assert_eq!(Locale::parse("fr"), None);
    }
}
