use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
    models::status::ProposalStatus,
    rate_limiter::{RateLimiter, TALLY_MIN_INTERVAL},
};

pub const TALLY_GRAPHQL_ENDPOINT: &str = "https://api.tally.xyz/query";

/// Query for an organization's proposals, newest id first. Timestamps come
/// back as epoch milliseconds for on-chain blocks and as RFC 3339 strings for
/// blockless ones, so both inline fragments are requested.
const GOVERNANCE_PROPOSALS_QUERY: &str = r#"
query GovernanceProposals($input: ProposalsInput!) {
  proposals(input: $input) {
    nodes {
      ... on Proposal {
        id
        onchainId
        status
        createdAt
        metadata {
          title
          description
        }
        proposer {
          address
          name
          ens
        }
        governor {
          id
          name
          slug
        }
        start {
          ... on Block {
            timestamp
          }
          ... on BlocklessTimestamp {
            timestamp
          }
        }
        end {
          ... on Block {
            timestamp
          }
          ... on BlocklessTimestamp {
            timestamp
          }
        }
        block {
          timestamp
        }
        voteStats {
          votesCount
          percent
          type
          votersCount
        }
      }
    }
    pageInfo {
      firstCursor
      lastCursor
      count
    }
  }
}
"#;

/// Why a proposal fetch failed. `Api` covers GraphQL-level errors delivered
/// inside an HTTP 200 response.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("api error: {0}")]
    Api(String),
    #[error("invalid response payload: {0}")]
    Decode(#[from] serde_json::Error),
}

// Response structures for the Tally API. Fields the bot does not consume are
// left out; serde skips them.

/// A proposal node as returned by the API, before normalization.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawProposal {
    pub id: String,
    pub status: Option<String>,
    pub metadata: Option<RawMetadata>,
    pub proposer: Option<RawProposer>,
    pub end: Option<RawTimePoint>,
    pub block: Option<RawTimePoint>,
    pub vote_stats: Option<Vec<RawVoteStat>>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RawMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RawProposer {
    pub address: Option<String>,
    pub name: Option<String>,
    pub ens: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RawTimePoint {
    pub timestamp: Option<RawTimestamp>,
}

/// Block timestamps arrive as epoch milliseconds, blockless ones as RFC 3339
/// strings.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(f64),
    Iso(String),
}

impl RawTimestamp {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Millis(ms) => DateTime::from_timestamp_millis(*ms as i64),
            Self::Iso(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawVoteStat {
    #[serde(rename = "type")]
    pub vote_type: Option<String>,
    pub votes_count: Option<RawVoteCount>,
}

/// Vote tallies arrive as JSON numbers or numeric strings.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum RawVoteCount {
    Num(f64),
    Str(String),
}

impl RawVoteCount {
    /// Numeric value of the count. Unparseable strings count as zero.
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Num(n) => *n,
            Self::Str(s) => s.trim().parse().unwrap_or(0.0),
        }
    }
}

#[derive(Deserialize, Debug)]
struct GraphQlResponse {
    data: Option<ResponseData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize, Debug)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct ResponseData {
    proposals: ProposalsConnection,
}

#[derive(Deserialize, Debug)]
struct ProposalsConnection {
    nodes: Vec<RawProposal>,
}

/// Client for the Tally governance API. All requests pass through the shared
/// rate limiter.
pub struct TallyApi {
    client: Client,
    endpoint: String,
    api_key: String,
    organization_id: String,
    rate_limiter: RateLimiter,
}

impl TallyApi {
    pub fn new(api_key: String, organization_id: String) -> Self {
        Self::new_with_endpoint(TALLY_GRAPHQL_ENDPOINT.to_string(), api_key, organization_id)
    }

    pub fn new_with_endpoint(endpoint: String, api_key: String, organization_id: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
            organization_id,
            rate_limiter: RateLimiter::new(TALLY_MIN_INTERVAL),
        }
    }

    /// Fetches the organization's proposals, most recent id first. Pass a
    /// status to let the API filter server-side.
    #[instrument(name = "fetch_proposals", skip(self))]
    pub async fn fetch_proposals(
        &self,
        status_filter: Option<&ProposalStatus>,
        limit: usize,
    ) -> Result<Vec<RawProposal>, FetchError> {
        self.rate_limiter.wait_if_needed().await;

        let mut filters = serde_json::json!({ "organizationId": self.organization_id });
        if let Some(status) = status_filter {
            filters["status"] = serde_json::Value::String(status.as_str().to_string());
        }
        let variables = serde_json::json!({
            "input": {
                "filters": filters,
                "sort": { "sortBy": "id", "isDescending": true },
                "page": { "limit": limit }
            }
        });

        debug!(organization_id = %self.organization_id, limit = limit, "Fetching governance proposals");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Api-Key", &self.api_key)
            .json(&serde_json::json!({
                "query": GOVERNANCE_PROPOSALS_QUERY,
                "variables": variables,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(FetchError::Status { status, body });
        }

        let text = response.text().await?;
        let envelope: GraphQlResponse = serde_json::from_str(&text)?;

        if let Some(errors) = envelope.errors {
            if !errors.is_empty() {
                let message = errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(FetchError::Api(message));
            }
        }

        let data = envelope
            .data
            .ok_or_else(|| FetchError::Api("response carried no data".to_string()))?;

        debug!(count = data.proposals.nodes.len(), "Fetched proposals");
        Ok(data.proposals.nodes)
    }
}
