use sea_orm_migration::MigratorTrait;

use crate::config::Config;
use crate::db::Store;
use crate::db::migrator::Migrator;

pub async fn cmd_migrate(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_url).await?;
    let applied = Migrator::get_applied_migrations(&store.conn).await?;

    println!("Database: {}", config.general.database_url);
    println!("Applied migrations ({}):", applied.len());
    for migration in applied {
        println!("  • {}", migration.name());
    }

    Ok(())
}
