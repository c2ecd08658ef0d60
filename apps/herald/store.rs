use anyhow::{Context, Result};
use chrono::Utc;
use herald_db::{migrations, models::announced_proposal};
use sea_orm::{
    ActiveValue::Set,
    ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, QueryFilter,
    QuerySelect,
    sea_query::{Expr, OnConflict},
};
use tracing::{info, instrument};

use crate::models::{proposals::Proposal, status::ProposalStatus};

/// Persistent record of every announcement the bot has made, keyed by
/// proposal id.
#[derive(Clone)]
pub struct AnnouncementStore {
    db: DatabaseConnection,
}

impl AnnouncementStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Opens the database and brings its schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let mut opt = ConnectOptions::new(database_url.to_string());
        // One connection keeps every handle on the same database when the
        // url is sqlite::memory:.
        opt.max_connections(1).min_connections(1).sqlx_logging(false);

        let db = Database::connect(opt)
            .await
            .context("failed to connect to database")?;
        migrations::run(&db)
            .await
            .context("failed to run database migrations")?;
        info!(database_url = database_url, "Database ready");

        Ok(Self::new(db))
    }

    /// Ids of every proposal ever announced.
    #[instrument(name = "store_load_ids", skip(self))]
    pub async fn load_ids(&self) -> Result<Vec<String>> {
        let ids = announced_proposal::Entity::find()
            .select_only()
            .column(announced_proposal::Column::Id)
            .into_tuple::<String>()
            .all(&self.db)
            .await?;
        Ok(ids)
    }

    /// Inserts or refreshes a record. On conflict the original announce time
    /// is preserved. `last_sync_at` starts ticking only once the record
    /// carries a message id.
    #[instrument(name = "store_upsert", skip(self, proposal), fields(proposal_id = %proposal.id))]
    pub async fn upsert(&self, proposal: &Proposal, message_id: Option<&str>) -> Result<()> {
        let now = Utc::now().naive_utc();
        let model = announced_proposal::ActiveModel {
            id: Set(proposal.id.clone()),
            announced_at: Set(now),
            title: Set(Some(proposal.title.clone())),
            status: Set(Some(proposal.status.as_str().to_string())),
            discord_message_id: Set(message_id.map(str::to_string)),
            last_sync_at: Set(message_id.map(|_| now)),
        };

        announced_proposal::Entity::insert(model)
            .on_conflict(
                OnConflict::column(announced_proposal::Column::Id)
                    .update_columns([
                        announced_proposal::Column::Title,
                        announced_proposal::Column::Status,
                        announced_proposal::Column::DiscordMessageId,
                        announced_proposal::Column::LastSyncAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Records that still need their announcement kept in sync. Only records
    /// with a message id qualify; whether a record is due for an edit is
    /// decided against its stored status.
    #[instrument(name = "store_list_syncable", skip(self))]
    pub async fn list_syncable(&self) -> Result<Vec<announced_proposal::Model>> {
        let records = announced_proposal::Entity::find()
            .filter(announced_proposal::Column::DiscordMessageId.is_not_null())
            .all(&self.db)
            .await?;
        Ok(records)
    }

    /// Stamps a successful sync: fresh status and sync time.
    #[instrument(name = "store_update_sync_status", skip(self, status))]
    pub async fn update_sync_status(&self, id: &str, status: &ProposalStatus) -> Result<()> {
        let now = Utc::now().naive_utc();
        announced_proposal::Entity::update_many()
            .col_expr(announced_proposal::Column::LastSyncAt, Expr::value(now))
            .col_expr(
                announced_proposal::Column::Status,
                Expr::value(status.as_str().to_string()),
            )
            .filter(announced_proposal::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<announced_proposal::Model>> {
        let record = announced_proposal::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;
        Ok(record)
    }

    /// Deletes every record, returning how many were removed.
    #[instrument(name = "store_clear", skip(self))]
    pub async fn clear(&self) -> Result<u64> {
        let result = announced_proposal::Entity::delete_many()
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
