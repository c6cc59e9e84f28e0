use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockpulse_core::DomainError;

/// How often a shop wants to hear about low stock.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// One message per crossing, as it happens.
    Instant,
    /// One report per shop-local day at `daily_time`.
    #[default]
    Daily,
    /// One report per ISO week on `weekly_day` at `daily_time`.
    Weekly,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Instant => "instant",
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
        }
    }

    /// The batch cycle this cadence is served by, if any.
    pub fn batch_cycle(&self) -> Option<BatchCycle> {
        match self {
            Cadence::Instant => None,
            Cadence::Daily => Some(BatchCycle::Daily),
            Cadence::Weekly => Some(BatchCycle::Weekly),
        }
    }
}

impl core::fmt::Display for Cadence {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cadence {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instant" => Ok(Cadence::Instant),
            "daily" => Ok(Cadence::Daily),
            "weekly" => Ok(Cadence::Weekly),
            other => Err(DomainError::validation(format!("unknown cadence: {other}"))),
        }
    }
}

/// A scheduled batch notification cycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchCycle {
    Daily,
    Weekly,
}

impl BatchCycle {
    pub fn alert_kind(&self) -> AlertKind {
        match self {
            BatchCycle::Daily => AlertKind::DailyBatch,
            BatchCycle::Weekly => AlertKind::WeeklyBatch,
        }
    }
}

impl core::fmt::Display for BatchCycle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BatchCycle::Daily => f.write_str("daily"),
            BatchCycle::Weekly => f.write_str("weekly"),
        }
    }
}

/// Kind of notification attempt, as recorded in the audit log.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Instant,
    DailyBatch,
    WeeklyBatch,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Instant => "instant",
            AlertKind::DailyBatch => "daily_batch",
            AlertKind::WeeklyBatch => "weekly_batch",
        }
    }

    /// Subject line used for the delivered message.
    pub fn subject(&self) -> &'static str {
        match self {
            AlertKind::Instant => "Low Stock Alert",
            AlertKind::DailyBatch => "Daily Low Stock Report",
            AlertKind::WeeklyBatch => "Weekly Low Stock Report",
        }
    }
}

impl core::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
