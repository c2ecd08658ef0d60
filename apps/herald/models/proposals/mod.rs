pub mod text;

use chrono::{DateTime, Utc};

use crate::{
    models::status::ProposalStatus,
    tally_api::{RawProposal, RawTimestamp, RawVoteStat},
};

/// A governance proposal normalized from the Tally API, ready for
/// announcement and display.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub id: String,
    pub title: String,
    pub status: ProposalStatus,
    pub proposer_name: String,
    pub proposer_url: Option<String>,
    pub url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub voting_ends_at: Option<DateTime<Utc>>,
    pub summary: String,
    pub votes: VoteBreakdown,
}

/// Vote percentages per choice, out of all votes cast.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VoteBreakdown {
    pub for_percent: f64,
    pub against_percent: f64,
    pub abstain_percent: f64,
}

impl Proposal {
    /// Normalizes a raw API proposal. `governor_slug` names the governor in
    /// generated tally.xyz URLs.
    pub fn from_raw(raw: &RawProposal, governor_slug: &str) -> Self {
        let base_title = raw
            .metadata
            .as_ref()
            .and_then(|m| m.title.clone())
            .unwrap_or_else(|| "N/A".to_string());
        let description = raw
            .metadata
            .as_ref()
            .and_then(|m| m.description.clone())
            .unwrap_or_else(|| "N/A".to_string());

        // The description often carries a numbering prefix the title lacks.
        let title = text::reconstruct_title(&base_title, &description);
        let summary = text::extract_summary(&description, &title);

        let proposer = raw.proposer.as_ref();
        let proposer_name = display_name(
            proposer.and_then(|p| p.name.as_deref()),
            proposer.and_then(|p| p.ens.as_deref()),
            proposer.and_then(|p| p.address.as_deref()),
        );
        let proposer_url = proposer
            .and_then(|p| p.address.as_deref())
            .filter(|a| !a.is_empty())
            .map(|a| proposer_profile_url(a, governor_slug));

        Self {
            url: proposal_url(governor_slug, &raw.id),
            id: raw.id.clone(),
            title,
            status: ProposalStatus::parse(raw.status.as_deref().unwrap_or("UNKNOWN")),
            proposer_name,
            proposer_url,
            created_at: raw
                .block
                .as_ref()
                .and_then(|b| b.timestamp.as_ref())
                .and_then(RawTimestamp::to_datetime),
            voting_ends_at: raw
                .end
                .as_ref()
                .and_then(|e| e.timestamp.as_ref())
                .and_then(RawTimestamp::to_datetime),
            summary,
            votes: VoteBreakdown::from_stats(raw.vote_stats.as_deref().unwrap_or(&[])),
        }
    }
}

impl VoteBreakdown {
    /// Derives percentages from raw vote stats, summing counts per choice.
    /// Unrecognized choices count toward the total but no named bucket. No
    /// votes at all yields all zeroes.
    pub fn from_stats(stats: &[RawVoteStat]) -> Self {
        let mut for_votes = 0.0;
        let mut against_votes = 0.0;
        let mut abstain_votes = 0.0;
        let mut total = 0.0;

        for stat in stats {
            let votes = stat.votes_count.as_ref().map_or(0.0, |c| c.as_f64());
            match stat
                .vote_type
                .as_deref()
                .unwrap_or("")
                .to_ascii_uppercase()
                .as_str()
            {
                "FOR" => for_votes += votes,
                "AGAINST" => against_votes += votes,
                "ABSTAIN" => abstain_votes += votes,
                _ => {}
            }
            total += votes;
        }

        if total == 0.0 {
            return Self::default();
        }

        Self {
            for_percent: for_votes / total * 100.0,
            against_percent: against_votes / total * 100.0,
            abstain_percent: abstain_votes / total * 100.0,
        }
    }
}

/// First non-empty of the proposer's display name, ENS name, and masked
/// address. "Unknown" when none are present.
pub fn display_name(name: Option<&str>, ens: Option<&str>, address: Option<&str>) -> String {
    name.filter(|n| !n.is_empty())
        .map(str::to_string)
        .or_else(|| ens.filter(|e| !e.is_empty()).map(str::to_string))
        .or_else(|| address.filter(|a| !a.is_empty()).map(mask_address))
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Shortens an address to its 0x1234...abcd form. Addresses under ten
/// characters are kept as-is.
pub fn mask_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() < 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

fn proposal_url(governor_slug: &str, id: &str) -> String {
    format!("https://www.tally.xyz/gov/{governor_slug}/proposal/{id}")
}

fn proposer_profile_url(address: &str, governor_slug: &str) -> String {
    format!("https://www.tally.xyz/profile/{address}?governanceId={governor_slug}")
}
