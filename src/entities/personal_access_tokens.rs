use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "personal_access_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub user_id: i64,

    pub name: String,

    /// First 12 characters of the plaintext, `pat_` included
    pub token_prefix: String,

    /// SHA-256 hex of the plaintext
    pub token_hash: String,

    /// JSON array of permission codes
    #[sea_orm(column_type = "Text")]
    pub permissions: String,

    /// active | disabled
    pub status: String,

    pub expires_at: Option<DateTimeUtc>,

    pub last_used_at: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
