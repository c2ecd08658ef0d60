use std::{env, time::Duration};

use anyhow::{Context, Result};
use tracing::{info, warn};

pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 5;
const DEFAULT_DATABASE_URL: &str = "sqlite://announced_proposals.db?mode=rwc";
const DEFAULT_ORGANIZATION_ID: &str = "2323517483434116775";
const DEFAULT_GOVERNOR_SLUG: &str = "wormhole";

/// Runtime configuration, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub tally_api_key: String,
    pub discord_token: String,
    pub proposals_channel_id: String,
    pub organization_id: String,
    /// Short-form governor slug used in tally.xyz links. The API reports a
    /// longer slug than the public site uses.
    pub governor_slug: String,
    pub database_url: String,
    pub sync_interval: Duration,
    /// Bearer token guarding the admin endpoints. Unset disables them.
    pub admin_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let tally_api_key = env::var("TALLY_API_KEY").context("TALLY_API_KEY is not set")?;
        let discord_token = env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?;
        let proposals_channel_id =
            env::var("PROPOSALS_CHANNEL_ID").context("PROPOSALS_CHANNEL_ID is not set")?;

        let organization_id =
            env::var("TALLY_ORG_ID").unwrap_or_else(|_| DEFAULT_ORGANIZATION_ID.to_string());
        let governor_slug =
            env::var("GOVERNOR_SLUG").unwrap_or_else(|_| DEFAULT_GOVERNOR_SLUG.to_string());
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let sync_interval_minutes = match env::var("SYNC_INTERVAL_MINUTES") {
            Ok(value) => match value.parse::<u64>() {
                Ok(minutes) if minutes > 0 => minutes,
                Ok(_) => {
                    warn!("SYNC_INTERVAL_MINUTES must be positive, using default");
                    DEFAULT_SYNC_INTERVAL_MINUTES
                }
                Err(err) => {
                    warn!(error = %err, "Failed to parse SYNC_INTERVAL_MINUTES, using default");
                    DEFAULT_SYNC_INTERVAL_MINUTES
                }
            },
            Err(_) => DEFAULT_SYNC_INTERVAL_MINUTES,
        };

        let admin_token = env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty());

        info!(
            organization_id = %organization_id,
            governor_slug = %governor_slug,
            sync_interval_minutes = sync_interval_minutes,
            admin_endpoints = admin_token.is_some(),
            "Configuration loaded"
        );

        Ok(Self {
            tally_api_key,
            discord_token,
            proposals_channel_id,
            organization_id,
            governor_slug,
            database_url,
            sync_interval: Duration::from_secs(sync_interval_minutes * 60),
            admin_token,
        })
    }
}
