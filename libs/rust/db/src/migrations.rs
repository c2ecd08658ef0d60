use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, Statement};

/// Schema version the code expects. [`run`] upgrades older databases to this
/// version, applying each migration exactly once.
pub const LATEST_VERSION: i32 = 2;

struct Migration {
    version: i32,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        statements: &["CREATE TABLE IF NOT EXISTS announced_proposals ( \
                id TEXT PRIMARY KEY, \
                announced_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP, \
                title TEXT, \
                status TEXT \
            )"],
    },
    Migration {
        version: 2,
        statements: &[
            "ALTER TABLE announced_proposals ADD COLUMN discord_message_id TEXT",
            "ALTER TABLE announced_proposals ADD COLUMN last_sync_at TIMESTAMP",
        ],
    },
];

/// Brings the schema up to [`LATEST_VERSION`]. The applied version is tracked
/// in a `schema_version` marker table, so reruns are no-ops. A database
/// written before the marker table existed has its version seeded from a
/// one-time column inspection, so pre-existing tables are adopted instead of
/// tripping over columns they already have.
pub async fn run(db: &DatabaseConnection) -> Result<(), DbErr> {
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
    ))
    .await?;

    let mut version = current_version(db).await?;
    if version == 0 {
        version = detect_unmarked_version(db).await?;
        if version > 0 {
            set_version(db, version).await?;
        }
    }

    for migration in MIGRATIONS {
        if migration.version <= version {
            continue;
        }
        for statement in migration.statements {
            db.execute(Statement::from_string(db.get_database_backend(), *statement))
                .await?;
        }
        set_version(db, migration.version).await?;
        version = migration.version;
    }

    Ok(())
}

/// Reads the schema version marker. A database without a marker row reports
/// version 0 and receives the full migration chain.
pub async fn current_version(db: &DatabaseConnection) -> Result<i32, DbErr> {
    let row = db
        .query_one(Statement::from_string(
            db.get_database_backend(),
            "SELECT version FROM schema_version LIMIT 1",
        ))
        .await?;

    match row {
        Some(row) => row.try_get("", "version"),
        None => Ok(0),
    }
}

/// Maps the columns of a pre-marker `announced_proposals` table onto the
/// migration version that produced them. A missing table is version 0; the
/// sync columns mark version 2, their absence version 1.
async fn detect_unmarked_version(db: &DatabaseConnection) -> Result<i32, DbErr> {
    let rows = db
        .query_all(Statement::from_string(
            db.get_database_backend(),
            "PRAGMA table_info(announced_proposals)",
        ))
        .await?;

    if rows.is_empty() {
        return Ok(0);
    }
    for row in &rows {
        let name: String = row.try_get("", "name")?;
        if name == "discord_message_id" {
            return Ok(2);
        }
    }
    Ok(1)
}

async fn set_version(db: &DatabaseConnection, version: i32) -> Result<(), DbErr> {
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "DELETE FROM schema_version",
    ))
    .await?;
    db.execute(Statement::from_string(
        db.get_database_backend(),
        format!("INSERT INTO schema_version (version) VALUES ({version})"),
    ))
    .await?;
    Ok(())
}
