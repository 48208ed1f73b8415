//! Date/time rule resolution — calendar policies to concrete instants.
//!
//! A `DateRule` selects trading days inside a horizon, a `TimeRule` expands
//! each selected day into one or more intraday instants. `resolve` is pure:
//! the same rule, horizon, and calendar always produce the same sequence.
//!
//! Early closes are not derivable from the session constants alone, so the
//! calendar carries a caller-supplied set of early-close dates. Close-relative
//! rules and intraday grids resolve against the early close on those dates.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which trading days inside the horizon a schedule fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateRule {
    EveryDay,
    /// First trading day of each ISO week.
    WeekStart,
    /// Last trading day of each ISO week.
    WeekEnd,
    /// First trading day of each month.
    MonthStart,
    /// Last trading day of each month.
    MonthEnd,
}

/// Which instants a schedule fires at on a selected day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRule {
    /// Session open plus an offset.
    MarketOpen { offset_minutes: i64 },
    /// Session close plus an offset (early close on flagged dates).
    MarketClose { offset_minutes: i64 },
    /// Every `interval` minutes from open through close.
    EveryMinutes { interval: u32 },
    /// Every minute of the calendar day, midnight to 23:59.
    EveryMinuteOfDay,
}

impl TimeRule {
    pub fn market_open(hours: i64, minutes: i64) -> Self {
        TimeRule::MarketOpen { offset_minutes: hours * 60 + minutes }
    }

    pub fn market_close(hours: i64, minutes: i64) -> Self {
        TimeRule::MarketClose { offset_minutes: hours * 60 + minutes }
    }

    pub fn every_minutes(interval: u32) -> Self {
        TimeRule::EveryMinutes { interval: interval.max(1) }
    }
}

/// Session times plus the holiday and early-close date sets.
///
/// Immutable once built; constructed at process start and passed explicitly
/// into the components that need it.
#[derive(Debug, Clone)]
pub struct TradingCalendar {
    open: NaiveTime,
    close: NaiveTime,
    early_close: NaiveTime,
    holidays: BTreeSet<NaiveDate>,
    early_closes: BTreeSet<NaiveDate>,
}

impl TradingCalendar {
    pub fn new(open: NaiveTime, close: NaiveTime, early_close: NaiveTime) -> Self {
        Self {
            open,
            close,
            early_close,
            holidays: BTreeSet::new(),
            early_closes: BTreeSet::new(),
        }
    }

    /// US equity session: open 09:30, close 16:00, early close 13:00.
    pub fn us_default() -> Self {
        Self::new(
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        )
    }

    pub fn with_holidays(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(dates);
        self
    }

    pub fn with_early_closes(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.early_closes.extend(dates);
        self
    }

    pub fn open_time(&self) -> NaiveTime {
        self.open
    }

    /// The close in effect on `date` — the early close if flagged.
    pub fn close_time_on(&self, date: NaiveDate) -> NaiveTime {
        if self.early_closes.contains(&date) {
            self.early_close
        } else {
            self.close
        }
    }

    pub fn is_early_close(&self, date: NaiveDate) -> bool {
        self.early_closes.contains(&date)
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// All trading days in `[start, end]`, ascending.
    pub fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut days = Vec::new();
        let mut day = start;
        while day <= end {
            if self.is_trading_day(day) {
                days.push(day);
            }
            day += Duration::days(1);
        }
        days
    }

    /// Closest trading day strictly before `date`.
    pub fn prev_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut day = date - Duration::days(1);
        while !self.is_trading_day(day) {
            day -= Duration::days(1);
        }
        day
    }

    /// Closest trading day strictly after `date`.
    pub fn next_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut day = date + Duration::days(1);
        while !self.is_trading_day(day) {
            day += Duration::days(1);
        }
        day
    }
}

/// Resolve a (DateRule, TimeRule) pair over `[start, end]` into concrete
/// instants, ascending. Instants outside the horizon endpoints are dropped.
pub fn resolve(
    date_rule: DateRule,
    time_rule: TimeRule,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    calendar: &TradingCalendar,
) -> Vec<DateTime<Utc>> {
    let days = calendar.trading_days(start.date_naive(), end.date_naive());

    let mut instants = Vec::new();
    for &day in &days {
        if !date_matches(date_rule, day, calendar) {
            continue;
        }
        expand_day(time_rule, day, calendar, &mut instants);
    }

    instants.retain(|t| *t >= start && *t <= end);
    instants
}

/// Whether `day` satisfies the date rule, judged against its neighboring
/// trading days on the full calendar (a Monday holiday makes Tuesday the
/// week start). The neighbors may lie outside the horizon: a horizon that
/// opens mid-week must not turn its first day into a week start.
fn date_matches(rule: DateRule, day: NaiveDate, calendar: &TradingCalendar) -> bool {
    match rule {
        DateRule::EveryDay => true,
        DateRule::WeekStart => calendar.prev_trading_day(day).iso_week() != day.iso_week(),
        DateRule::WeekEnd => calendar.next_trading_day(day).iso_week() != day.iso_week(),
        DateRule::MonthStart => calendar.prev_trading_day(day).month() != day.month(),
        DateRule::MonthEnd => calendar.next_trading_day(day).month() != day.month(),
    }
}

fn expand_day(
    rule: TimeRule,
    day: NaiveDate,
    calendar: &TradingCalendar,
    out: &mut Vec<DateTime<Utc>>,
) {
    let open = day.and_time(calendar.open_time()).and_utc();
    let close = day.and_time(calendar.close_time_on(day)).and_utc();
    match rule {
        TimeRule::MarketOpen { offset_minutes } => {
            out.push(open + Duration::minutes(offset_minutes));
        }
        TimeRule::MarketClose { offset_minutes } => {
            out.push(close + Duration::minutes(offset_minutes));
        }
        TimeRule::EveryMinutes { interval } => {
            let step = Duration::minutes(interval.max(1) as i64);
            let mut t = open;
            while t <= close {
                out.push(t);
                t += step;
            }
        }
        TimeRule::EveryMinuteOfDay => {
            let mut t = day.and_time(NaiveTime::from_hms_opt(0, 0, 0).unwrap()).and_utc();
            for _ in 0..(24 * 60) {
                out.push(t);
                t += Duration::minutes(1);
            }
        }
    }
}
