use std::fmt;

/// Lifecycle states reported by the Tally API. Statuses outside the known set
/// are carried through verbatim so they can still be stored and displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalStatus {
    Active,
    Queued,
    Canceled,
    Defeated,
    Executed,
    Expired,
    Succeeded,
    CrossChainExecuted,
    Other(String),
}

/// What the sync engine should do with a proposal in a given status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Voting is open; announce the proposal if it has not been announced.
    Active,
    /// Not yet terminal; keep the announcement's vote data fresh.
    Syncable,
    /// Terminal; after one closing update the announcement is left alone.
    Final,
}

impl ProposalStatus {
    /// Parses a raw API status string, case-insensitively.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "ACTIVE" => Self::Active,
            "QUEUED" => Self::Queued,
            "CANCELED" => Self::Canceled,
            "DEFEATED" => Self::Defeated,
            "EXECUTED" => Self::Executed,
            "EXPIRED" => Self::Expired,
            "SUCCEEDED" => Self::Succeeded,
            "CROSSCHAINEXECUTED" => Self::CrossChainExecuted,
            other => Self::Other(other.to_string()),
        }
    }

    /// Canonical uppercase form, as stored and as returned by the API.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "ACTIVE",
            Self::Queued => "QUEUED",
            Self::Canceled => "CANCELED",
            Self::Defeated => "DEFEATED",
            Self::Executed => "EXECUTED",
            Self::Expired => "EXPIRED",
            Self::Succeeded => "SUCCEEDED",
            Self::CrossChainExecuted => "CROSSCHAINEXECUTED",
            Self::Other(raw) => raw,
        }
    }

    pub fn classify(&self) -> StatusClass {
        match self {
            Self::Active | Self::Queued => StatusClass::Active,
            Self::Canceled
            | Self::Defeated
            | Self::Executed
            | Self::Expired
            | Self::Succeeded
            | Self::CrossChainExecuted => StatusClass::Final,
            Self::Other(_) => StatusClass::Syncable,
        }
    }

    /// Whether a first-time announcement should be posted for this status.
    pub fn is_announceable(&self) -> bool {
        self.classify() == StatusClass::Active
    }

    /// Terminal statuses halt synchronization after one closing update.
    pub fn is_final(&self) -> bool {
        self.classify() == StatusClass::Final
    }

    pub fn is_syncable(&self) -> bool {
        !self.is_final()
    }

    /// Human form for embeds, e.g. "Active" or "Crosschainexecuted".
    pub fn display(&self) -> String {
        let raw = self.as_str();
        if raw.is_empty() {
            return "Unknown".to_string();
        }
        title_case(raw)
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uppercases the first letter of each word and lowercases the rest. Any
/// non-alphabetic character starts a new word.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
                at_word_start = false;
            } else {
                out.extend(ch.to_lowercase());
            }
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(ProposalStatus::parse("active"), ProposalStatus::Active);
        assert_eq!(ProposalStatus::parse("Queued"), ProposalStatus::Queued);
        assert_eq!(
            ProposalStatus::parse("crosschainexecuted"),
            ProposalStatus::CrossChainExecuted
        );
    }

    #[test]
    fn unknown_statuses_are_preserved_uppercase() {
        let status = ProposalStatus::parse("pending");
        assert_eq!(status, ProposalStatus::Other("PENDING".to_string()));
        assert_eq!(status.as_str(), "PENDING");
    }

    #[test]
    fn active_and_queued_are_announceable() {
        assert!(ProposalStatus::Active.is_announceable());
        assert!(ProposalStatus::Queued.is_announceable());
        assert!(!ProposalStatus::parse("PENDING").is_announceable());
        assert!(!ProposalStatus::Succeeded.is_announceable());
    }

    #[test]
    fn terminal_statuses_are_final() {
        for raw in [
            "CANCELED",
            "DEFEATED",
            "EXECUTED",
            "EXPIRED",
            "SUCCEEDED",
            "CROSSCHAINEXECUTED",
        ] {
            let status = ProposalStatus::parse(raw);
            assert!(status.is_final(), "{raw} should be final");
            assert!(!status.is_syncable(), "{raw} should not be syncable");
        }
    }

    #[test]
    fn non_terminal_statuses_are_syncable() {
        assert!(ProposalStatus::Active.is_syncable());
        assert!(ProposalStatus::Queued.is_syncable());
        assert!(ProposalStatus::parse("PENDING").is_syncable());
        assert_eq!(
            ProposalStatus::parse("PENDING").classify(),
            StatusClass::Syncable
        );
    }

    #[test]
    fn display_title_cases_the_status() {
        assert_eq!(ProposalStatus::Active.display(), "Active");
        assert_eq!(
            ProposalStatus::CrossChainExecuted.display(),
            "Crosschainexecuted"
        );
        assert_eq!(ProposalStatus::Other(String::new()).display(), "Unknown");
    }
}
