//! Database connection for the persistent stores.

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr};

/// Pragmas applied to file-backed SQLite databases.
///
/// WAL lets readers proceed while a batch is being written, and the busy
/// timeout absorbs lock contention between concurrently running tasks.
const SQLITE_PRAGMAS: &[&str] = &[
    "PRAGMA journal_mode=WAL",
    "PRAGMA busy_timeout=5000",
    "PRAGMA synchronous=NORMAL",
];

/// Whether `database_url` names an on-disk SQLite database.
fn is_sqlite_file(database_url: &str) -> bool {
    database_url.starts_with("sqlite:")
        && !database_url.contains(":memory:")
        && !database_url.contains("mode=memory")
}

async fn configure_sqlite(db: &DatabaseConnection) -> Result<(), DbErr> {
    for pragma in SQLITE_PRAGMAS {
        db.execute_unprepared(pragma).await?;
    }
    tracing::debug!("Configured SQLite pragmas");
    Ok(())
}

/// Establish a connection to the database.
///
/// On-disk SQLite databases get WAL journaling, a 5 second busy timeout and
/// `synchronous=NORMAL`.
///
/// # Arguments
/// * `database_url` - e.g. `sqlite://tandem.db?mode=rwc` or `postgres:///tandem_dev`
///
/// # Errors
/// Returns `DbErr` if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(database_url).await?;
    if is_sqlite_file(database_url) {
        configure_sqlite(&db).await?;
    }
    Ok(db)
}

/// Establish a connection and apply every pending migration.
///
/// This is the recommended way to open the store: the schema of
/// `entity_mappings`, `sync_tasks`, `sync_results` and `sync_checkpoints` is
/// always current afterwards.
///
/// # Errors
/// Returns `DbErr` if the connection cannot be established or migrations fail.
///
/// # Example
/// ```ignore
/// let db = tandem::connect_and_migrate("sqlite::memory:").await?;
/// ```
#[cfg(feature = "migrate")]
pub async fn connect_and_migrate(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    use sea_orm_migration::MigratorTrait;

    let db = connect(database_url).await?;
    crate::migration::Migrator::up(&db, None).await?;
    Ok(db)
}
