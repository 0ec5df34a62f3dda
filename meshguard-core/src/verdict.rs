//! Verdicts returned to the mesh bridge

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Direction, SenderSnapshot, SignalCategory};

/// What the bridge should do with the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Allow,
    Flag,
    Block,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Allow => write!(f, "ALLOW"),
            Action::Flag => write!(f, "FLAG"),
            Action::Block => write!(f, "BLOCK"),
        }
    }
}

/// Why a verdict was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Spam,
    Scam,
    UrgencyAbuse,
    Impersonation,
    Blocklisted,
    RateLimited,
    Duplicate,
    LowReputation,
    /// Risk remembered from earlier messages; this one triggered nothing
    ElevatedRisk,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Spam => "spam",
            Reason::Scam => "scam",
            Reason::UrgencyAbuse => "urgency_abuse",
            Reason::Impersonation => "impersonation",
            Reason::Blocklisted => "blocklisted",
            Reason::RateLimited => "rate_limited",
            Reason::Duplicate => "duplicate",
            Reason::LowReputation => "low_reputation",
            Reason::ElevatedRisk => "elevated_risk",
        }
    }
}

impl From<SignalCategory> for Reason {
    fn from(category: SignalCategory) -> Self {
        match category {
            SignalCategory::Spam => Reason::Spam,
            SignalCategory::Scam => Reason::Scam,
            SignalCategory::UrgencyAbuse => Reason::UrgencyAbuse,
            SignalCategory::Impersonation => Reason::Impersonation,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of processing one message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// Action for the bridge
    pub action: Action,
    /// Sender risk after this message (1.0 for blocklisted senders)
    pub risk_score: f64,
    /// Aggregated signal of this message alone (0.0 when classification was skipped)
    pub signal: f64,
    /// Triggered reasons, most significant first
    pub reasons: Vec<Reason>,
    /// Direction the message was travelling
    pub direction: Direction,
    /// Sender state after processing, if the sender is known
    pub sender: Option<SenderSnapshot>,
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        self.action == Action::Allow
    }

    pub fn is_blocked(&self) -> bool {
        self.action == Action::Block
    }

    pub fn has_reason(&self, reason: Reason) -> bool {
        self.reasons.contains(&reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_ordering() {
        assert!(Action::Allow < Action::Flag);
        assert!(Action::Flag < Action::Block);
    }

    #[test]
    fn test_reason_serialization() {
        let json = serde_json::to_string(&Reason::RateLimited).unwrap();
        assert_eq!(json, "\"rate_limited\"");
        assert_eq!(
            serde_json::to_string(&Reason::ElevatedRisk).unwrap(),
            format!("\"{}\"", Reason::ElevatedRisk.as_str())
        );
        assert_eq!(Reason::from(SignalCategory::UrgencyAbuse), Reason::UrgencyAbuse);
    }

    #[test]
    fn test_action_serialization() {
        let json = serde_json::to_string(&Action::Block).unwrap();
        assert_eq!(json, "\"BLOCK\"");
    }
}
