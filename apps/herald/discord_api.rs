use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, Method, StatusCode,
    header::{AUTHORIZATION, RETRY_AFTER},
};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::{
    models::proposals::Proposal,
    sync::{Notifier, NotifyError},
};

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(2);

/// Purple used for all proposal announcement embeds.
pub const EMBED_COLOR: u32 = 0xB291DE;

/// REST client for posting and editing announcement messages in a single
/// Discord channel.
pub struct DiscordApi {
    client: Client,
    base_url: String,
    token: String,
    channel_id: String,
    max_retries: usize,
}

#[derive(Deserialize)]
struct MessageResponse {
    id: String,
}

impl DiscordApi {
    pub fn new(token: String, channel_id: String) -> Self {
        Self::new_with_config(
            DISCORD_API_BASE.to_string(),
            token,
            channel_id,
            DEFAULT_MAX_RETRIES,
        )
    }

    pub fn new_with_config(
        base_url: String,
        token: String,
        channel_id: String,
        max_retries: usize,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url,
            token,
            channel_id,
            max_retries,
        }
    }

    async fn execute_request(
        &self,
        method: Method,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<String, NotifyError> {
        let mut attempt = 0;
        let mut delay = DEFAULT_INITIAL_BACKOFF;

        loop {
            let request = self
                .client
                .request(method.clone(), url)
                .header(AUTHORIZATION, format!("Bot {}", self.token))
                .json(payload);

            match request.send().await {
                Ok(response) => match response.status() {
                    status if status.is_success() => {
                        return response.text().await.map_err(|e| {
                            NotifyError::Transient(format!("failed to read response: {e}"))
                        });
                    }
                    StatusCode::NOT_FOUND => {
                        return Err(NotifyError::NotFound);
                    }
                    StatusCode::TOO_MANY_REQUESTS => {
                        attempt += 1;
                        if attempt > self.max_retries {
                            error!(url = url, "Max retries reached. Last error: HTTP 429");
                            return Err(NotifyError::Transient("rate limited".to_string()));
                        }

                        let retry_after = Self::get_retry_after(&response, delay);
                        warn!(
                            url = url,
                            retry_after = ?retry_after,
                            "Rate limited (429). Waiting before retrying..."
                        );
                        sleep(retry_after).await;
                        delay = delay.max(retry_after) * 2;
                    }
                    status if status.is_server_error() => {
                        attempt += 1;
                        if attempt > self.max_retries {
                            error!(url = url, status = %status, "Max retries reached. Server error");
                            return Err(NotifyError::Transient(format!("server error: {status}")));
                        }

                        warn!(
                            url = url,
                            status = %status,
                            delay = ?delay,
                            "Server error. Waiting before retrying..."
                        );
                        sleep(delay).await;
                        delay *= 2;
                    }
                    status => {
                        let body = response.text().await.unwrap_or_default();
                        error!(url = url, status = %status, body = body, "Request failed");
                        return Err(NotifyError::Unknown(format!("status {status}: {body}")));
                    }
                },
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(url = url, error = %e, "Max retries reached");
                        return Err(NotifyError::Transient(e.to_string()));
                    }
                    warn!(url = url, error = %e, delay = ?delay, "Request error. Retrying...");
                    sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    fn get_retry_after(response: &reqwest::Response, default: Duration) -> Duration {
        response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(default)
    }
}

#[async_trait]
impl Notifier for DiscordApi {
    async fn post_announcement(&self, proposal: &Proposal) -> Result<String, NotifyError> {
        let url = format!("{}/channels/{}/messages", self.base_url, self.channel_id);
        let payload = serde_json::json!({ "embeds": [build_embed(proposal)] });

        let body = self.execute_request(Method::POST, &url, &payload).await?;
        let message: MessageResponse = serde_json::from_str(&body)
            .map_err(|e| NotifyError::Unknown(format!("unexpected message payload: {e}")))?;
        Ok(message.id)
    }

    async fn edit_announcement(
        &self,
        message_id: &str,
        proposal: &Proposal,
    ) -> Result<(), NotifyError> {
        let url = format!(
            "{}/channels/{}/messages/{}",
            self.base_url, self.channel_id, message_id
        );
        let payload = serde_json::json!({ "embeds": [build_embed(proposal)] });

        self.execute_request(Method::PATCH, &url, &payload).await?;
        Ok(())
    }
}

/// Renders the announcement embed: linked title, author, voting deadline,
/// status, summary, and the three vote bars. The footer carries the creation
/// date when one is known.
pub fn build_embed(proposal: &Proposal) -> serde_json::Value {
    let author = match &proposal.proposer_url {
        Some(url) => format!("[{}]({})", proposal.proposer_name, url),
        None => proposal.proposer_name.clone(),
    };

    let voting_ends = proposal
        .voting_ends_at
        .map(|t| t.format("%m/%d/%Y %H:%M UTC").to_string())
        .unwrap_or_else(|| "N/A".to_string());

    let voting = format!(
        "{}  –  {:.1}% FOR\n{}  –  {:.1}% AGAINST\n{}  –  {:.1}% ABSTAIN",
        vote_bar(proposal.votes.for_percent, "🟩"),
        proposal.votes.for_percent,
        vote_bar(proposal.votes.against_percent, "🟥"),
        proposal.votes.against_percent,
        vote_bar(proposal.votes.abstain_percent, "🟨"),
        proposal.votes.abstain_percent,
    );

    let mut embed = serde_json::json!({
        "title": proposal.title,
        "url": proposal.url,
        "color": EMBED_COLOR,
        "fields": [
            { "name": "Author", "value": author, "inline": true },
            { "name": "Voting Ends", "value": voting_ends, "inline": true },
            { "name": "Status", "value": proposal.status.display(), "inline": true },
            { "name": "Description", "value": proposal.summary, "inline": false },
            { "name": "Voting", "value": voting, "inline": false }
        ]
    });

    if let Some(created) = proposal.created_at {
        embed["footer"] = serde_json::json!({
            "text": format!("Created: {}", created.format("%m/%d/%Y %H:%M UTC"))
        });
    }

    embed
}

/// Ten-square progress bar. Each filled square stands for ten percent, with
/// halves rounding to the nearest even count.
fn vote_bar(percent: f64, filled: &str) -> String {
    let filled_count = (percent / 10.0).round_ties_even().clamp(0.0, 10.0) as usize;
    filled.repeat(filled_count) + &"⬜".repeat(10 - filled_count)
}
