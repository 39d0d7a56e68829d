use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    TS,
    EnumString,
    Display,
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskType {
    #[default]
    #[sea_orm(string_value = "translate")]
    Translate,
    #[sea_orm(string_value = "review")]
    Review,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    TS,
    EnumString,
    Display,
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskState {
    #[default]
    #[sea_orm(string_value = "inprogress")]
    InProgress,
    #[sea_orm(string_value = "done")]
    Done,
    #[sea_orm(string_value = "closed")]
    Closed,
}

/// State of a single translation row. Keys with no translation row in a
/// language behave as `Untranslated` wherever states are filtered on.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    TS,
    EnumString,
    Display,
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TranslationState {
    #[default]
    #[sea_orm(string_value = "untranslated")]
    Untranslated,
    #[sea_orm(string_value = "translated")]
    Translated,
    #[sea_orm(string_value = "reviewed")]
    Reviewed,
    #[sea_orm(string_value = "disabled")]
    Disabled,
}

/// Granted per project member, stored as a JSON array on the membership row.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, TS, EnumString, Display,
)]
pub enum ProjectScope {
    #[serde(rename = "admin")]
    #[strum(serialize = "admin")]
    Admin,
    #[serde(rename = "tasks.view")]
    #[strum(serialize = "tasks.view")]
    TasksView,
    #[serde(rename = "tasks.edit")]
    #[strum(serialize = "tasks.edit")]
    TasksEdit,
    #[serde(rename = "translations.edit")]
    #[strum(serialize = "translations.edit")]
    TranslationsEdit,
    #[serde(rename = "translations.state-edit")]
    #[strum(serialize = "translations.state-edit")]
    TranslationsStateEdit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_type_round_trips_through_strings() {
        assert_eq!(TaskType::Review.to_string(), "review");
        assert_eq!("translate".parse::<TaskType>().unwrap(), TaskType::Translate);
    }

    #[test]
    fn project_scope_serializes_dotted() {
        let value = serde_json::to_value(ProjectScope::TranslationsStateEdit).unwrap();
        assert_eq!(value, serde_json::json!("translations.state-edit"));
        let parsed: ProjectScope = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, ProjectScope::TranslationsStateEdit);
    }

    #[test]
    fn translation_state_defaults_to_untranslated() {
        assert_eq!(TranslationState::default(), TranslationState::Untranslated);
    }
}
