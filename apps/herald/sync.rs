use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_db::models::announced_proposal;
use thiserror::Error;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{error, info, instrument, warn};

use crate::{models::proposals::Proposal, store::AnnouncementStore, tally_api::TallyApi};

const DEFAULT_PAGE_LIMIT: usize = 20;
const DEFAULT_ANNOUNCE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_CYCLE_DEADLINE: Duration = Duration::from_secs(240);

/// Why a Discord delivery failed, as seen by the sync engine.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The target message no longer exists.
    #[error("message not found")]
    NotFound,
    #[error("transient delivery failure: {0}")]
    Transient(String),
    #[error("delivery failed: {0}")]
    Unknown(String),
}

/// Outbound side of the engine. Implemented by the Discord client; tests
/// substitute a recorder.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Posts a new announcement, returning the created message id.
    async fn post_announcement(&self, proposal: &Proposal) -> Result<String, NotifyError>;

    /// Rewrites an existing announcement with fresh proposal data.
    async fn edit_announcement(
        &self,
        message_id: &str,
        proposal: &Proposal,
    ) -> Result<(), NotifyError>;
}

/// Counters for one reconciliation cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub fetched: usize,
    pub announced: usize,
    pub updated: usize,
    pub finalized: usize,
    pub failed: usize,
}

/// Reconciles Tally's view of the organization's proposals with the Discord
/// channel. The engine owns the set of announced proposal ids; a proposal
/// enters it only after its announcement has been persisted, so a crash
/// between posting and recording resolves toward a duplicate announcement
/// rather than a silently missing one.
pub struct SyncEngine<N: Notifier> {
    api: TallyApi,
    notifier: N,
    store: AnnouncementStore,
    governor_slug: String,
    announced: HashSet<String>,
    page_limit: usize,
    announce_delay: Duration,
    cycle_deadline: Duration,
}

impl<N: Notifier> SyncEngine<N> {
    pub fn new(api: TallyApi, notifier: N, store: AnnouncementStore, governor_slug: String) -> Self {
        Self {
            api,
            notifier,
            store,
            governor_slug,
            announced: HashSet::new(),
            page_limit: DEFAULT_PAGE_LIMIT,
            announce_delay: DEFAULT_ANNOUNCE_DELAY,
            cycle_deadline: DEFAULT_CYCLE_DEADLINE,
        }
    }

    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit;
        self
    }

    pub fn with_announce_delay(mut self, delay: Duration) -> Self {
        self.announce_delay = delay;
        self
    }

    pub fn with_cycle_deadline(mut self, deadline: Duration) -> Self {
        self.cycle_deadline = deadline;
        self
    }

    /// Loads previously announced proposal ids so a restart does not
    /// re-announce them.
    pub async fn hydrate(&mut self) -> Result<()> {
        let ids = self
            .store
            .load_ids()
            .await
            .context("failed to load announced proposals")?;
        info!(count = ids.len(), "Loaded previously announced proposals");
        self.announced = ids.into_iter().collect();
        Ok(())
    }

    /// Runs one reconciliation cycle: fetch, announce new active proposals,
    /// refresh existing announcements. The deadline is checked between
    /// proposals, never mid-proposal, so a delivered message always gets its
    /// store record before remaining work is deferred to the next cycle.
    #[instrument(name = "sync_cycle", skip_all)]
    pub async fn run_cycle(&mut self) -> Result<CycleStats> {
        let deadline = Instant::now() + self.cycle_deadline;
        self.reconcile(deadline).await
    }

    /// Admin reset: wipes the store and the in-memory announced set.
    pub async fn clear(&mut self) -> Result<u64> {
        let removed = self
            .store
            .clear()
            .await
            .context("failed to clear announced proposals")?;
        self.announced.clear();
        info!(removed = removed, "Cleared announced proposal records");
        Ok(removed)
    }

    async fn reconcile(&mut self, deadline: Instant) -> Result<CycleStats> {
        let mut stats = CycleStats::default();

        // A failed fetch skips the cycle; the next tick retries from scratch.
        // The fetch has no partial state, so a hung one is safe to abandon at
        // the deadline.
        let fetch = timeout_at(deadline, self.api.fetch_proposals(None, self.page_limit));
        let raw = match fetch.await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                error!(error = %e, "Failed to fetch proposals, skipping cycle");
                return Ok(stats);
            }
            Err(_) => {
                warn!("Proposal fetch overran the cycle deadline, skipping cycle");
                return Ok(stats);
            }
        };

        let proposals: Vec<Proposal> = raw
            .iter()
            .map(|r| Proposal::from_raw(r, &self.governor_slug))
            .collect();
        stats.fetched = proposals.len();
        info!(count = proposals.len(), "Fetched proposals from Tally");

        // Snapshot the sync list before announcing so a proposal never gets
        // both its announcement and an update in the same cycle.
        let to_sync = self
            .store
            .list_syncable()
            .await
            .context("failed to load announcements pending sync")?;

        self.announce_new(&proposals, deadline, &mut stats).await;
        self.refresh_existing(&to_sync, &proposals, deadline, &mut stats)
            .await;

        info!(
            fetched = stats.fetched,
            announced = stats.announced,
            updated = stats.updated,
            finalized = stats.finalized,
            failed = stats.failed,
            "Sync cycle complete"
        );
        Ok(stats)
    }

    async fn announce_new(
        &mut self,
        proposals: &[Proposal],
        deadline: Instant,
        stats: &mut CycleStats,
    ) {
        let mut new_active: Vec<&Proposal> = proposals
            .iter()
            .filter(|p| p.status.is_announceable() && !self.announced.contains(&p.id))
            .collect();
        if new_active.is_empty() {
            return;
        }

        // Announce oldest first so the channel reads chronologically;
        // proposals without a creation date sort ahead of everything.
        new_active.sort_by_key(|p| p.created_at.unwrap_or(DateTime::<Utc>::MIN_UTC));
        info!(count = new_active.len(), "Found new active proposals to announce");

        for (i, proposal) in new_active.iter().enumerate() {
            if Instant::now() >= deadline {
                warn!(
                    deferred = new_active.len() - i,
                    "Cycle deadline reached, remaining announcements deferred to the next cycle"
                );
                break;
            }
            if i > 0 {
                sleep(self.announce_delay).await;
            }
            match self.announce(proposal).await {
                Ok(()) => stats.announced += 1,
                Err(e) => {
                    stats.failed += 1;
                    error!(proposal_id = %proposal.id, error = %e, "Failed to announce proposal");
                }
            }
        }
    }

    async fn announce(&mut self, proposal: &Proposal) -> Result<()> {
        info!(proposal_id = %proposal.id, title = %proposal.title, "Announcing new proposal");
        let message_id = self.notifier.post_announcement(proposal).await?;

        // The id joins the announced set only once the record is stored; a
        // failed write leaves the proposal eligible for the next cycle.
        self.store
            .upsert(proposal, Some(&message_id))
            .await
            .with_context(|| format!("failed to record announcement for proposal {}", proposal.id))?;
        self.announced.insert(proposal.id.clone());

        info!(proposal_id = %proposal.id, message_id = %message_id, "Announced proposal");
        Ok(())
    }

    async fn refresh_existing(
        &mut self,
        to_sync: &[announced_proposal::Model],
        proposals: &[Proposal],
        deadline: Instant,
        stats: &mut CycleStats,
    ) {
        if to_sync.is_empty() {
            return;
        }

        let by_id: HashMap<&str, &Proposal> =
            proposals.iter().map(|p| (p.id.as_str(), p)).collect();

        for record in to_sync {
            if Instant::now() >= deadline {
                warn!("Cycle deadline reached, remaining updates deferred to the next cycle");
                break;
            }
            // Records outside this cycle's fetch window are left untouched.
            let Some(proposal) = by_id.get(record.id.as_str()) else {
                continue;
            };
            let Some(message_id) = record.discord_message_id.as_deref() else {
                continue;
            };

            if proposal.status.is_syncable() {
                match self.refresh(message_id, proposal).await {
                    Ok(true) => stats.updated += 1,
                    Ok(false) => stats.failed += 1,
                    Err(e) => {
                        stats.failed += 1;
                        error!(proposal_id = %proposal.id, error = %e, "Failed to update announcement");
                    }
                }
            } else if record.status.as_deref() != Some(proposal.status.as_str()) {
                // One closing update when a proposal reaches its terminal
                // status. Once the stored status matches, edits stop.
                match self.refresh(message_id, proposal).await {
                    Ok(true) => {
                        stats.finalized += 1;
                        info!(
                            proposal_id = %proposal.id,
                            status = %proposal.status,
                            "Final update recorded, sync halted for proposal"
                        );
                    }
                    Ok(false) => stats.failed += 1,
                    Err(e) => {
                        stats.failed += 1;
                        error!(proposal_id = %proposal.id, error = %e, "Failed to apply final update");
                    }
                }
            }
        }
    }

    /// Edits the announcement, then records the fresh status. Returns false
    /// when the message has gone missing; the record stays untouched so the
    /// edit is retried next cycle.
    async fn refresh(&self, message_id: &str, proposal: &Proposal) -> Result<bool> {
        match self.notifier.edit_announcement(message_id, proposal).await {
            Ok(()) => {
                self.store
                    .update_sync_status(&proposal.id, &proposal.status)
                    .await
                    .with_context(|| {
                        format!("failed to record sync for proposal {}", proposal.id)
                    })?;
                info!(proposal_id = %proposal.id, status = %proposal.status, "Updated announcement");
                Ok(true)
            }
            Err(NotifyError::NotFound) => {
                warn!(
                    proposal_id = %proposal.id,
                    message_id = %message_id,
                    "Announcement message not found, edit will be retried"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
