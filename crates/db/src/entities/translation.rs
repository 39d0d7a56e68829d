use sea_orm::entity::prelude::*;

use crate::types::TranslationState;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "translations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub uuid: Uuid,
    pub key_id: i64,
    pub language_id: i64,
    pub text: Option<String>,
    pub state: TranslationState,
    pub outdated: bool,
    pub word_count: i32,
    pub character_count: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
