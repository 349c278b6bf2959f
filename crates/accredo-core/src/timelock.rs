//! Timelock entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AccredoError;
use crate::params::add_secs;
use crate::proposal::ProposalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelockStatus {
    Scheduled,
    Executed,
    Canceled,
}

impl TimelockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelockStatus::Scheduled => "scheduled",
            TimelockStatus::Executed => "executed",
            TimelockStatus::Canceled => "canceled",
        }
    }
}

impl std::str::FromStr for TimelockStatus {
    type Err = crate::error::AccredoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(TimelockStatus::Scheduled),
            "executed" => Ok(TimelockStatus::Executed),
            "canceled" => Ok(TimelockStatus::Canceled),
            other => Err(crate::error::AccredoError::InvalidField {
                field: "timelock_status",
                reason: other.to_string(),
            }),
        }
    }
}

/// A proposal waiting out its mandatory delay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelockEntry {
    pub proposal_id: ProposalId,

    /// Earliest execution time
    pub eta: DateTime<Utc>,

    /// Latest execution time (`eta + grace_period`)
    pub grace_deadline: DateTime<Utc>,

    pub status: TimelockStatus,

    pub queued_at: DateTime<Utc>,
}

impl TimelockEntry {
    /// `InvalidParameter` if the grace deadline is not representable
    pub fn new(
        proposal_id: ProposalId,
        eta: DateTime<Utc>,
        grace_period_secs: u64,
        queued_at: DateTime<Utc>,
    ) -> Result<Self, AccredoError> {
        Ok(Self {
            proposal_id,
            eta,
            grace_deadline: add_secs(eta, "grace_period_secs", grace_period_secs)?,
            status: TimelockStatus::Scheduled,
            queued_at,
        })
    }

    /// `eta <= now <= grace_deadline`
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.eta && now <= self.grace_deadline
    }
}
