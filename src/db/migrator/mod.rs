use sea_orm_migration::prelude::*;

mod m20260301_000001_create_identity_tables;
mod m20260301_000002_create_admin_tables;
mod m20260301_000003_seed_rbac;
mod m20260301_000004_seed_settings_and_menus;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_identity_tables::Migration),
            Box::new(m20260301_000002_create_admin_tables::Migration),
            Box::new(m20260301_000003_seed_rbac::Migration),
            Box::new(m20260301_000004_seed_settings_and_menus::Migration),
        ]
    }
}
