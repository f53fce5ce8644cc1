// Session calendar: two entry windows and a hard end-of-day close,
// all expressed in a configured local time zone.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::Window;
use crate::Result;

/// Calendar settings, times are local "HH:MM" (or "HH:MM:SS")
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CalendarConfig {
    pub timezone: String,
    pub window_a_start: String,
    pub window_a_end: String,
    pub window_b_start: String,
    pub window_b_end: String,
    pub forced_close: String,
    /// Minimum minutes left before the forced close for a new entry
    pub min_minutes_before_close: i64,
    /// Skip window B on days where window A already executed
    pub skip_window_b_after_a: bool,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            window_a_start: "09:00".to_string(),
            window_a_end: "12:30".to_string(),
            window_b_start: "14:00".to_string(),
            window_b_end: "17:00".to_string(),
            forced_close: "16:45".to_string(),
            min_minutes_before_close: 30,
            skip_window_b_after_a: true,
        }
    }
}

/// Local time-of-day interval, bounds inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TradingWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(Self::new(parse_time(start)?, parse_time(end)?))
    }

    /// A window whose start is after its end wraps past midnight
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

/// Maps UTC instants to session state in the configured zone
#[derive(Debug, Clone)]
pub struct TradingCalendar {
    tz: Tz,
    window_a: TradingWindow,
    window_b: TradingWindow,
    forced_close: NaiveTime,
}

impl TradingCalendar {
    pub fn new(tz: Tz, window_a: TradingWindow, window_b: TradingWindow, forced_close: NaiveTime) -> Self {
        Self {
            tz,
            window_a,
            window_b,
            forced_close,
        }
    }

    pub fn from_config(config: &CalendarConfig) -> Result<Self> {
        let tz: Tz = config
            .timezone
            .parse()
            .map_err(|_| CoreError::validation(format!("unknown time zone: {}", config.timezone)))?;

        Ok(Self::new(
            tz,
            TradingWindow::parse(&config.window_a_start, &config.window_a_end)?,
            TradingWindow::parse(&config.window_b_start, &config.window_b_end)?,
            parse_time(&config.forced_close)?,
        ))
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn forced_close_time(&self) -> NaiveTime {
        self.forced_close
    }

    pub fn local_time(&self, t: DateTime<Utc>) -> NaiveTime {
        t.with_timezone(&self.tz).time()
    }

    /// Trading day an instant belongs to (local calendar date)
    pub fn trading_day(&self, t: DateTime<Utc>) -> NaiveDate {
        t.with_timezone(&self.tz).date_naive()
    }

    /// First instant of the local trading day containing `t`
    pub fn session_start(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        self.resolve_local(self.trading_day(t).and_time(NaiveTime::default()))
    }

    pub fn is_trading_hours(&self, t: DateTime<Utc>) -> bool {
        self.current_window(t).is_some()
    }

    /// Window A is checked first when both match
    pub fn current_window(&self, t: DateTime<Utc>) -> Option<Window> {
        let local = self.local_time(t);
        if self.window_a.contains(local) {
            Some(Window::A)
        } else if self.window_b.contains(local) {
            Some(Window::B)
        } else {
            None
        }
    }

    pub fn should_force_close(&self, t: DateTime<Utc>) -> bool {
        self.local_time(t) >= self.forced_close
    }

    /// Time until the next forced-close instant, rolling to tomorrow once past today's
    pub fn time_until_forced_close(&self, t: DateTime<Utc>) -> Duration {
        let day = self.trading_day(t);
        let today = self.resolve_local(day.and_time(self.forced_close));
        if today >= t {
            return today - t;
        }

        let next = day
            .succ_opt()
            .map(|d| self.resolve_local(d.and_time(self.forced_close)))
            .unwrap_or(today);
        (next - t).max(Duration::zero())
    }

    pub fn is_valid_entry_time(&self, t: DateTime<Utc>, min_minutes: i64) -> bool {
        self.is_trading_hours(t) && self.time_until_forced_close(t) >= Duration::minutes(min_minutes)
    }

    fn resolve_local(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        // Wall-clock times skipped by a DST jump resolve to one hour later
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| self.tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
    }
}

/// Epoch milliseconds to a UTC instant
pub fn instant_from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| CoreError::validation(format!("timestamp out of range: {}", ms)))
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| CoreError::validation(format!("invalid time of day: {:?}", s)))
}
