use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Stored lowercased; uniqueness is case-insensitive.
    #[sea_orm(unique)]
    pub username: String,

    #[sea_orm(unique)]
    pub email: String,

    /// Argon2id PHC string (bcrypt accepted for legacy rows)
    pub password_hash: String,

    pub full_name: String,

    pub avatar: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub bio: Option<String>,

    /// active | inactive | banned
    pub status: String,

    pub totp_secret: Option<String>,

    pub totp_enabled: bool,

    /// JSON array of SHA-256 recovery code hashes
    #[sea_orm(column_type = "Text", nullable)]
    pub totp_recovery_hashes: Option<String>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,

    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
