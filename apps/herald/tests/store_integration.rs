use chrono::{TimeZone, Utc};
use herald::{
    models::{
        proposals::{Proposal, VoteBreakdown},
        status::ProposalStatus,
    },
    store::AnnouncementStore,
};
use herald_db::{migrations, models::announced_proposal};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, Statement,
};

async fn memory_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    migrations::run(&db).await.unwrap();
    db
}

fn proposal(id: &str, status: ProposalStatus) -> Proposal {
    Proposal {
        id: id.to_string(),
        title: format!("WIP-{id}: Example Proposal"),
        status,
        proposer_name: "Alice".to_string(),
        proposer_url: None,
        url: format!("https://www.tally.xyz/gov/wormhole/proposal/{id}"),
        created_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
        voting_ends_at: None,
        summary: "Does something useful....".to_string(),
        votes: VoteBreakdown::default(),
    }
}

#[tokio::test]
async fn migrations_bring_a_fresh_database_to_the_latest_version() {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();

    migrations::run(&db).await.unwrap();
    assert_eq!(
        migrations::current_version(&db).await.unwrap(),
        migrations::LATEST_VERSION
    );

    // Rerunning must be a no-op.
    migrations::run(&db).await.unwrap();
    assert_eq!(
        migrations::current_version(&db).await.unwrap(),
        migrations::LATEST_VERSION
    );
}

#[tokio::test]
async fn migrations_upgrade_a_version_one_database() {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();

    for sql in [
        "CREATE TABLE schema_version (version INTEGER NOT NULL)",
        "INSERT INTO schema_version (version) VALUES (1)",
        "CREATE TABLE announced_proposals ( \
            id TEXT PRIMARY KEY, \
            announced_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP, \
            title TEXT, \
            status TEXT \
        )",
    ] {
        db.execute(Statement::from_string(db.get_database_backend(), sql))
            .await
            .unwrap();
    }

    migrations::run(&db).await.unwrap();
    assert_eq!(
        migrations::current_version(&db).await.unwrap(),
        migrations::LATEST_VERSION
    );

    // The sync columns added in version two are usable.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "INSERT INTO announced_proposals (id, discord_message_id, last_sync_at) \
         VALUES ('1', 'msg-1', CURRENT_TIMESTAMP)",
    ))
    .await
    .unwrap();
}

#[tokio::test]
async fn migrations_adopt_a_fully_evolved_database_without_a_marker() {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();

    // The table layout the bot historically wrote, sync columns included,
    // with no schema_version marker anywhere.
    for sql in [
        "CREATE TABLE announced_proposals ( \
            id TEXT PRIMARY KEY, \
            announced_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP, \
            title TEXT, \
            status TEXT, \
            tally_id TEXT, \
            discord_message_id TEXT, \
            last_sync_at TIMESTAMP \
        )",
        "INSERT INTO announced_proposals (id, title, status, tally_id, discord_message_id) \
         VALUES ('1', 'Old Proposal', 'ACTIVE', '1', 'msg-1')",
    ] {
        db.execute(Statement::from_string(db.get_database_backend(), sql))
            .await
            .unwrap();
    }

    // Must not trip over the columns the table already has.
    migrations::run(&db).await.unwrap();
    assert_eq!(
        migrations::current_version(&db).await.unwrap(),
        migrations::LATEST_VERSION
    );

    // Pre-existing records stay visible through the store.
    let store = AnnouncementStore::new(db);
    let record = store.get("1").await.unwrap().unwrap();
    assert_eq!(record.title.as_deref(), Some("Old Proposal"));
    assert_eq!(record.discord_message_id.as_deref(), Some("msg-1"));
}

#[tokio::test]
async fn migrations_upgrade_an_unmarked_base_table() {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();

    // A base table without the sync columns and without a marker still gets
    // the version-two columns added.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "CREATE TABLE announced_proposals ( \
            id TEXT PRIMARY KEY, \
            announced_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP, \
            title TEXT, \
            status TEXT \
        )",
    ))
    .await
    .unwrap();

    migrations::run(&db).await.unwrap();
    assert_eq!(
        migrations::current_version(&db).await.unwrap(),
        migrations::LATEST_VERSION
    );

    db.execute(Statement::from_string(
        db.get_database_backend(),
        "INSERT INTO announced_proposals (id, discord_message_id, last_sync_at) \
         VALUES ('1', 'msg-1', CURRENT_TIMESTAMP)",
    ))
    .await
    .unwrap();
}

#[tokio::test]
async fn upsert_then_load_ids_round_trips() {
    let db = memory_db().await;
    let store = AnnouncementStore::new(db);

    store
        .upsert(&proposal("1", ProposalStatus::Active), Some("msg-1"))
        .await
        .unwrap();
    store
        .upsert(&proposal("2", ProposalStatus::Queued), None)
        .await
        .unwrap();

    let mut ids = store.load_ids().await.unwrap();
    ids.sort();
    assert_eq!(ids, ["1", "2"]);

    let record = store.get("1").await.unwrap().unwrap();
    assert_eq!(record.title.as_deref(), Some("WIP-1: Example Proposal"));
    assert_eq!(record.status.as_deref(), Some("ACTIVE"));
    assert_eq!(record.discord_message_id.as_deref(), Some("msg-1"));
    assert!(record.last_sync_at.is_some());
}

#[tokio::test]
async fn upsert_without_message_id_leaves_sync_fields_empty() {
    let db = memory_db().await;
    let store = AnnouncementStore::new(db);

    store
        .upsert(&proposal("1", ProposalStatus::Active), None)
        .await
        .unwrap();

    let record = store.get("1").await.unwrap().unwrap();
    assert_eq!(record.discord_message_id, None);
    assert_eq!(record.last_sync_at, None);
}

#[tokio::test]
async fn upsert_preserves_the_original_announce_time() {
    let db = memory_db().await;
    let store = AnnouncementStore::new(db.clone());

    store
        .upsert(&proposal("1", ProposalStatus::Active), Some("msg-1"))
        .await
        .unwrap();

    // Backdate the announce time so a clobbering upsert would be visible.
    let backdated = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().naive_utc();
    let mut record: announced_proposal::ActiveModel =
        store.get("1").await.unwrap().unwrap().into();
    record.announced_at = Set(backdated);
    record.update(&db).await.unwrap();

    store
        .upsert(&proposal("1", ProposalStatus::Queued), Some("msg-1"))
        .await
        .unwrap();

    let record = store.get("1").await.unwrap().unwrap();
    assert_eq!(record.announced_at, backdated);
    assert_eq!(record.status.as_deref(), Some("QUEUED"));
}

#[tokio::test]
async fn list_syncable_requires_a_message_id() {
    let db = memory_db().await;
    let store = AnnouncementStore::new(db);

    store
        .upsert(&proposal("1", ProposalStatus::Active), Some("msg-1"))
        .await
        .unwrap();
    store
        .upsert(&proposal("2", ProposalStatus::Active), None)
        .await
        .unwrap();

    let records = store.list_syncable().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "1");
}

#[tokio::test]
async fn update_sync_status_stamps_status_and_time() {
    let db = memory_db().await;
    let store = AnnouncementStore::new(db);

    store
        .upsert(&proposal("1", ProposalStatus::Active), Some("msg-1"))
        .await
        .unwrap();
    let before = store.get("1").await.unwrap().unwrap();

    store
        .update_sync_status("1", &ProposalStatus::Defeated)
        .await
        .unwrap();

    let after = store.get("1").await.unwrap().unwrap();
    assert_eq!(after.status.as_deref(), Some("DEFEATED"));
    assert!(after.last_sync_at.unwrap() >= before.last_sync_at.unwrap());
    // The announce time is untouched by sync stamps.
    assert_eq!(after.announced_at, before.announced_at);
}

#[tokio::test]
async fn clear_removes_every_record() {
    let db = memory_db().await;
    let store = AnnouncementStore::new(db);

    store
        .upsert(&proposal("1", ProposalStatus::Active), Some("msg-1"))
        .await
        .unwrap();
    store
        .upsert(&proposal("2", ProposalStatus::Active), Some("msg-2"))
        .await
        .unwrap();

    let removed = store.clear().await.unwrap();
    assert_eq!(removed, 2);
    assert!(store.load_ids().await.unwrap().is_empty());
}
