//! Cadence scheduler.
//!
//! Decides, per shop, whether "now" is an eligible moment for a batch cycle.
//! A cycle is due only inside a tolerance window around the shop-local
//! `daily_time`. Missed windows are skipped, never queued: a tick that lands
//! outside the window reports `OutsideWindow` even if the previous window was
//! never served.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Utc};

use crate::cadence::{BatchCycle, Cadence};
use crate::settings::AlertSettings;

/// Why a shop is not due for a batch cycle right now.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Instant cadence has no scheduled cycle.
    InstantCadence,
    NotificationsDisabled,
    WrongWeekday,
    OutsideWindow,
    AlreadySentToday,
    AlreadySentThisWeek,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Due(BatchCycle),
    Skip(SkipReason),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CadenceScheduler {
    tolerance: Duration,
}

impl Default for CadenceScheduler {
    fn default() -> Self {
        Self {
            tolerance: Duration::minutes(5),
        }
    }
}

impl CadenceScheduler {
    pub fn new(tolerance: Duration) -> Self {
        Self { tolerance }
    }

    /// Evaluate the shop's configured cadence at `now`.
    pub fn eligibility(&self, settings: &AlertSettings, now: DateTime<Utc>) -> Eligibility {
        if !settings.notifications_enabled() {
            return Eligibility::Skip(SkipReason::NotificationsDisabled);
        }

        let local = now.with_timezone(&settings.offset());
        match settings.cadence() {
            Cadence::Instant => Eligibility::Skip(SkipReason::InstantCadence),
            Cadence::Daily => {
                if !self.within_window(settings, &local) {
                    return Eligibility::Skip(SkipReason::OutsideWindow);
                }
                if sent_on_same_day(settings.last_daily_sent_at(), &local) {
                    return Eligibility::Skip(SkipReason::AlreadySentToday);
                }
                Eligibility::Due(BatchCycle::Daily)
            }
            Cadence::Weekly => {
                if local.weekday() != settings.weekly_day() {
                    return Eligibility::Skip(SkipReason::WrongWeekday);
                }
                if !self.within_window(settings, &local) {
                    return Eligibility::Skip(SkipReason::OutsideWindow);
                }
                if sent_in_same_week(settings.last_weekly_sent_at(), &local) {
                    return Eligibility::Skip(SkipReason::AlreadySentThisWeek);
                }
                Eligibility::Due(BatchCycle::Weekly)
            }
        }
    }

    pub fn is_daily_due(&self, settings: &AlertSettings, now: DateTime<Utc>) -> bool {
        self.eligibility(settings, now) == Eligibility::Due(BatchCycle::Daily)
    }

    pub fn is_weekly_due(&self, settings: &AlertSettings, now: DateTime<Utc>) -> bool {
        self.eligibility(settings, now) == Eligibility::Due(BatchCycle::Weekly)
    }

    /// `daily_time` is anchored to the current local date; the window does
    /// not wrap across midnight.
    fn within_window(&self, settings: &AlertSettings, local: &DateTime<FixedOffset>) -> bool {
        let target = local.date_naive().and_time(settings.daily_time());
        let distance = (local.naive_local() - target).num_seconds().abs();
        distance <= self.tolerance.num_seconds()
    }
}

fn sent_on_same_day(last: Option<DateTime<Utc>>, local_now: &DateTime<FixedOffset>) -> bool {
    last.map(|at| at.with_timezone(local_now.offset()).date_naive())
        .is_some_and(|day| day == local_now.date_naive())
}

fn sent_in_same_week(last: Option<DateTime<Utc>>, local_now: &DateTime<FixedOffset>) -> bool {
    last.map(|at| at.with_timezone(local_now.offset()).iso_week())
        .is_some_and(|week| week == local_now.iso_week())
}
