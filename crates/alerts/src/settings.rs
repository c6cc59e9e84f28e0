use chrono::{DateTime, FixedOffset, NaiveTime, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};

use stockpulse_core::{DomainError, DomainResult, ShopId};

use crate::cadence::{BatchCycle, Cadence};

/// Largest accepted distance from UTC, in minutes (UTC-14:00 .. UTC+14:00).
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Per-shop notification settings and batch bookkeeping.
///
/// Exactly one per shop. Operator-facing fields change only through
/// [`AlertSettings::apply_update`]; `last_*_sent_at` change only through
/// [`AlertSettings::record_sent`] after a confirmed batch delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSettings {
    shop_id: ShopId,
    alert_email: Option<String>,
    cadence: Cadence,
    notifications_enabled: bool,
    daily_time: NaiveTime,
    weekly_day: Weekday,
    utc_offset_minutes: i32,
    last_daily_sent_at: Option<DateTime<Utc>>,
    last_weekly_sent_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl AlertSettings {
    /// Settings applied on first access: daily at 09:00, weekly on Monday.
    pub fn defaults_for(shop_id: ShopId, now: DateTime<Utc>) -> Self {
        Self {
            shop_id,
            alert_email: None,
            cadence: Cadence::Daily,
            notifications_enabled: true,
            daily_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            weekly_day: Weekday::Mon,
            utc_offset_minutes: 0,
            last_daily_sent_at: None,
            last_weekly_sent_at: None,
            updated_at: now,
        }
    }

    pub fn shop_id(&self) -> &ShopId {
        &self.shop_id
    }

    /// Recipient override; `None` falls back to the shop owner's address.
    pub fn alert_email(&self) -> Option<&str> {
        self.alert_email.as_deref()
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn notifications_enabled(&self) -> bool {
        self.notifications_enabled
    }

    pub fn daily_time(&self) -> NaiveTime {
        self.daily_time
    }

    pub fn weekly_day(&self) -> Weekday {
        self.weekly_day
    }

    pub fn utc_offset_minutes(&self) -> i32 {
        self.utc_offset_minutes
    }

    /// Shop-local offset used for "today", "this week" and `daily_time`.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    pub fn last_daily_sent_at(&self) -> Option<DateTime<Utc>> {
        self.last_daily_sent_at
    }

    pub fn last_weekly_sent_at(&self) -> Option<DateTime<Utc>> {
        self.last_weekly_sent_at
    }

    pub fn last_sent(&self, cycle: BatchCycle) -> Option<DateTime<Utc>> {
        match cycle {
            BatchCycle::Daily => self.last_daily_sent_at,
            BatchCycle::Weekly => self.last_weekly_sent_at,
        }
    }

    /// True when instant alerts should go out for this shop.
    pub fn wants_instant(&self) -> bool {
        self.notifications_enabled && self.cadence == Cadence::Instant
    }

    /// Advance batch bookkeeping after a completed cycle.
    pub fn record_sent(&mut self, cycle: BatchCycle, at: DateTime<Utc>) {
        match cycle {
            BatchCycle::Daily => self.last_daily_sent_at = Some(at),
            BatchCycle::Weekly => self.last_weekly_sent_at = Some(at),
        }
        self.updated_at = at;
    }

    /// Apply an operator update. Invalid input leaves the settings untouched.
    pub fn apply_update(&mut self, update: SettingsUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        let alert_email = normalize_email(update.alert_email)?;

        if let Some(minutes) = update.utc_offset_minutes {
            if !(-MAX_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES).contains(&minutes) {
                return Err(DomainError::validation(format!(
                    "utc offset out of range: {minutes} minutes"
                )));
            }
        }

        self.alert_email = alert_email;
        self.cadence = update.cadence;
        self.notifications_enabled = update.notifications_enabled;
        if let Some(t) = update.daily_time {
            self.daily_time = t;
        }
        if let Some(d) = update.weekly_day {
            self.weekly_day = d;
        }
        if let Some(minutes) = update.utc_offset_minutes {
            self.utc_offset_minutes = minutes;
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Operator settings change. Optional schedule fields keep their value when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    /// `None` or blank clears the override.
    pub alert_email: Option<String>,
    pub cadence: Cadence,
    pub notifications_enabled: bool,
    pub daily_time: Option<NaiveTime>,
    pub weekly_day: Option<Weekday>,
    pub utc_offset_minutes: Option<i32>,
}

impl SettingsUpdate {
    pub fn new(cadence: Cadence, notifications_enabled: bool) -> Self {
        Self {
            alert_email: None,
            cadence,
            notifications_enabled,
            daily_time: None,
            weekly_day: None,
            utc_offset_minutes: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.alert_email = Some(email.into());
        self
    }

    pub fn with_daily_time(mut self, time: NaiveTime) -> Self {
        self.daily_time = Some(time);
        self
    }

    pub fn with_weekly_day(mut self, day: Weekday) -> Self {
        self.weekly_day = Some(day);
        self
    }

    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = Some(minutes);
        self
    }
}

fn normalize_email(email: Option<String>) -> DomainResult<Option<String>> {
    let Some(raw) = email else {
        return Ok(None);
    };
    let email = raw.trim();
    if email.is_empty() {
        return Ok(None);
    }
    if !looks_like_address(email) {
        return Err(DomainError::validation(format!("invalid alert email: {email}")));
    }
    Ok(Some(email.to_string()))
}

fn looks_like_address(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
