//! Governance parameters
//!
//! The values the proposal engine and timelock gate run with. They can be
//! changed at runtime only by executing an `UpdateParameters` proposal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AccredoError;

/// Default timelock delay: 2 days
pub const DEFAULT_TIMELOCK_DELAY_SECS: u64 = 172_800;

/// Default grace window after the eta: 14 days
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 1_209_600;

/// Upper bound on every delay and grace window: 10 years
pub const MAX_DURATION_SECS: u64 = 315_360_000;

/// Upper bound on the voting delay and the voting period
pub const MAX_BLOCK_SPAN: u64 = 100_000_000;

/// Upper bound on the block interval: 1 day
pub const MAX_BLOCK_TIME_SECS: u64 = 86_400;

/// `at + secs`, or `InvalidParameter` naming `field` if the result does not
/// fit the calendar
pub fn add_secs(at: DateTime<Utc>, field: &str, secs: u64) -> Result<DateTime<Utc>, AccredoError> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|d| at.checked_add_signed(d))
        .ok_or_else(|| AccredoError::InvalidParameter(format!("{field} of {secs}s is out of range")))
}

/// `height + span`, or `InvalidParameter` naming `field` on overflow
pub fn add_blocks(height: u64, field: &str, span: u64) -> Result<u64, AccredoError> {
    height
        .checked_add(span)
        .ok_or_else(|| AccredoError::InvalidParameter(format!("{field} overflows block height {height}")))
}

fn at_most(field: &str, value: u64, max: u64) -> Result<(), AccredoError> {
    if value > max {
        return Err(AccredoError::InvalidParameter(format!(
            "{field} ({value}) exceeds {max}"
        )));
    }
    Ok(())
}

/// Voting and timelock configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceParams {
    /// Blocks between proposal creation and the start of voting
    pub voting_delay_blocks: u64,

    /// Length of the voting window in blocks
    pub voting_period_blocks: u64,

    /// Minimum total participating weight (for + against + abstain)
    pub quorum: u64,

    /// Minimum voting weight needed to submit a proposal
    pub proposal_threshold: u64,

    /// Delay between queueing and earliest execution
    pub timelock_delay_secs: u64,

    /// Lower bound the timelock gate enforces on any eta
    pub minimum_delay_secs: u64,

    /// How long after the eta a queued proposal stays executable
    pub grace_period_secs: u64,

    /// Average block interval, used to derive block heights from time
    pub block_time_secs: u64,
}

impl Default for GovernanceParams {
    fn default() -> Self {
        Self {
            voting_delay_blocks: 1,
            voting_period_blocks: 50_400, // ~1 week of 12s blocks
            quorum: 10,
            proposal_threshold: 1,
            timelock_delay_secs: DEFAULT_TIMELOCK_DELAY_SECS,
            minimum_delay_secs: DEFAULT_TIMELOCK_DELAY_SECS,
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            block_time_secs: 12,
        }
    }
}

impl GovernanceParams {
    pub fn validate(&self) -> Result<(), AccredoError> {
        if self.voting_period_blocks == 0 {
            return Err(AccredoError::InvalidParameter(
                "voting_period_blocks must be positive".into(),
            ));
        }
        if self.grace_period_secs == 0 {
            return Err(AccredoError::InvalidParameter(
                "grace_period_secs must be positive".into(),
            ));
        }
        if self.block_time_secs == 0 {
            return Err(AccredoError::InvalidParameter(
                "block_time_secs must be positive".into(),
            ));
        }
        at_most("voting_delay_blocks", self.voting_delay_blocks, MAX_BLOCK_SPAN)?;
        at_most("voting_period_blocks", self.voting_period_blocks, MAX_BLOCK_SPAN)?;
        at_most("timelock_delay_secs", self.timelock_delay_secs, MAX_DURATION_SECS)?;
        at_most("minimum_delay_secs", self.minimum_delay_secs, MAX_DURATION_SECS)?;
        at_most("grace_period_secs", self.grace_period_secs, MAX_DURATION_SECS)?;
        at_most("block_time_secs", self.block_time_secs, MAX_BLOCK_TIME_SECS)?;
        if self.timelock_delay_secs < self.minimum_delay_secs {
            return Err(AccredoError::InvalidParameter(format!(
                "timelock_delay_secs ({}) is below minimum_delay_secs ({})",
                self.timelock_delay_secs, self.minimum_delay_secs
            )));
        }
        Ok(())
    }

    /// Apply an update, returning the validated result without mutating self
    pub fn apply(&self, update: &ParameterUpdate) -> Result<GovernanceParams, AccredoError> {
        if update.is_empty() {
            return Err(AccredoError::InvalidParameter(
                "parameter update changes nothing".into(),
            ));
        }

        let mut next = self.clone();
        if let Some(v) = update.voting_delay_blocks {
            next.voting_delay_blocks = v;
        }
        if let Some(v) = update.voting_period_blocks {
            next.voting_period_blocks = v;
        }
        if let Some(v) = update.quorum {
            next.quorum = v;
        }
        if let Some(v) = update.proposal_threshold {
            next.proposal_threshold = v;
        }
        if let Some(v) = update.timelock_delay_secs {
            next.timelock_delay_secs = v;
        }
        if let Some(v) = update.grace_period_secs {
            next.grace_period_secs = v;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial update carried by an `UpdateParameters` proposal.
///
/// `minimum_delay_secs` and `block_time_secs` are deployment constants and
/// cannot be changed through governance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voting_delay_blocks: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voting_period_blocks: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quorum: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_threshold: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timelock_delay_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_secs: Option<u64>,
}

impl ParameterUpdate {
    pub fn is_empty(&self) -> bool {
        self.voting_delay_blocks.is_none()
            && self.voting_period_blocks.is_none()
            && self.quorum.is_none()
            && self.proposal_threshold.is_none()
            && self.timelock_delay_secs.is_none()
            && self.grace_period_secs.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = GovernanceParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.timelock_delay_secs, 172_800);
    }

    #[test]
    fn test_apply_update() {
        let params = GovernanceParams::default();
        let update = ParameterUpdate {
            quorum: Some(25),
            ..Default::default()
        };

        let next = params.apply(&update).unwrap();
        assert_eq!(next.quorum, 25);
        assert_eq!(next.voting_period_blocks, params.voting_period_blocks);
    }

    #[test]
    fn test_delay_below_minimum_is_rejected() {
        let params = GovernanceParams::default();
        let update = ParameterUpdate {
            timelock_delay_secs: Some(60),
            ..Default::default()
        };
        assert!(matches!(
            params.apply(&update),
            Err(AccredoError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let params = GovernanceParams::default();
        let updates = [
            ParameterUpdate {
                grace_period_secs: Some(1 << 62),
                ..Default::default()
            },
            ParameterUpdate {
                timelock_delay_secs: Some(u64::MAX),
                ..Default::default()
            },
            ParameterUpdate {
                voting_period_blocks: Some(u64::MAX),
                ..Default::default()
            },
            ParameterUpdate {
                voting_delay_blocks: Some(MAX_BLOCK_SPAN + 1),
                ..Default::default()
            },
        ];
        for update in &updates {
            assert!(
                matches!(params.apply(update), Err(AccredoError::InvalidParameter(_))),
                "{update:?} was accepted"
            );
        }

        let edge = ParameterUpdate {
            grace_period_secs: Some(MAX_DURATION_SECS),
            voting_period_blocks: Some(MAX_BLOCK_SPAN),
            ..Default::default()
        };
        assert!(params.apply(&edge).is_ok());

        let stored = GovernanceParams {
            block_time_secs: u64::MAX,
            ..GovernanceParams::default()
        };
        assert!(stored.validate().is_err());
    }

    #[test]
    fn test_time_and_height_arithmetic_is_checked() {
        let now = Utc::now();
        assert_eq!(
            add_secs(now, "grace_period_secs", 60).unwrap(),
            now + Duration::seconds(60)
        );
        assert!(add_secs(now, "grace_period_secs", u64::MAX).is_err());
        assert!(add_secs(DateTime::<Utc>::MAX_UTC, "grace_period_secs", 1).is_err());

        assert_eq!(add_blocks(10, "voting_delay_blocks", 5).unwrap(), 15);
        assert!(matches!(
            add_blocks(u64::MAX, "voting_delay_blocks", 1),
            Err(AccredoError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_empty_update_is_rejected() {
        let params = GovernanceParams::default();
        assert!(params.apply(&ParameterUpdate::default()).is_err());
    }
}
