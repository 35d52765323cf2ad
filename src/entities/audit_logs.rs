use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub created_at: DateTimeUtc,

    /// Null for anonymous events such as failed logins of unknown accounts
    pub user_id: Option<i64>,

    pub username: Option<String>,

    pub action: String,

    pub resource: String,

    pub resource_id: Option<String>,

    /// success | failure
    pub status: String,

    pub ip: Option<String>,

    pub user_agent: Option<String>,

    /// Free-form JSON object
    #[sea_orm(column_type = "Text", nullable)]
    pub details: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
