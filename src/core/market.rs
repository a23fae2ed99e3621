//! Exchange trading sessions, used to decide how long a quote stays valid.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc, Weekday};

/// Continuous trading sessions as (start, end) minutes past local midnight.
const A_SHARE_SESSIONS: [(u32, u32); 2] = [(9 * 60 + 30, 11 * 60 + 30), (13 * 60, 15 * 60)];
const HONG_KONG_SESSIONS: [(u32, u32); 2] = [(9 * 60 + 30, 12 * 60), (13 * 60, 16 * 60)];
const US_SESSIONS: [(u32, u32); 1] = [(9 * 60 + 30, 16 * 60)];

/// Trading calendar of the exchange a quote comes from.
///
/// Exchange holidays are not modelled: a holiday weekday is treated as a trading day,
/// which only shortens quote caching on that day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarketSession {
    /// Shanghai, Shenzhen and Beijing, China Standard Time.
    #[default]
    AShare,
    /// Hong Kong, UTC+8 all year.
    HongKong,
    /// New York, US Eastern time with daylight saving.
    Us,
}

impl MarketSession {
    /// The market a quote symbol trades on, judged by its prefix.
    pub fn for_security(security_id: &str) -> Self {
        if security_id.starts_with("rt_hk") {
            MarketSession::HongKong
        } else if security_id.starts_with("gb_") {
            MarketSession::Us
        } else {
            MarketSession::AShare
        }
    }

    fn sessions(&self) -> &'static [(u32, u32)] {
        match self {
            MarketSession::AShare => &A_SHARE_SESSIONS,
            MarketSession::HongKong => &HONG_KONG_SESSIONS,
            MarketSession::Us => &US_SESSIONS,
        }
    }

    /// Local time minus UTC at the instant `at`.
    fn utc_offset(&self, at: DateTime<Utc>) -> Duration {
        match self {
            MarketSession::AShare | MarketSession::HongKong => Duration::hours(8),
            MarketSession::Us if is_us_daylight_saving(at) => Duration::hours(-4),
            MarketSession::Us => Duration::hours(-5),
        }
    }

    fn to_local(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.naive_utc() + self.utc_offset(now)
    }

    fn from_local(&self, local: NaiveDateTime) -> DateTime<Utc> {
        // Sessions never start near a daylight saving switch, so the offset at the
        // standard time guess is the offset in force.
        let guess = DateTime::from_naive_utc_and_offset(local, Utc);
        let offset = self.utc_offset(guess - self.utc_offset(guess));
        DateTime::from_naive_utc_and_offset(local - offset, Utc)
    }

    fn is_trading_day(date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = self.to_local(now);
        if !Self::is_trading_day(local.date()) {
            return false;
        }
        let minute = local.hour() * 60 + local.minute();
        self.sessions()
            .iter()
            .any(|(start, end)| minute >= *start && minute < *end)
    }

    /// The first session start strictly after `now`.
    pub fn next_open(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = self.to_local(now);
        let mut date = local.date();
        // A week always contains a trading day.
        for _ in 0..8 {
            if Self::is_trading_day(date) {
                for (start, _) in self.sessions() {
                    if let Some(open) = date.and_hms_opt(start / 60, start % 60, 0)
                        && open > local
                    {
                        return self.from_local(open);
                    }
                }
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        now + Duration::days(1)
    }

    /// How long a quote fetched at `now` may be reused.
    ///
    /// While the market is open this is the freshness window; otherwise prices cannot
    /// move until the next session, so the quote is kept until then.
    pub fn quote_ttl(&self, now: DateTime<Utc>, freshness: Duration) -> Duration {
        if self.is_open(now) {
            freshness
        } else {
            (self.next_open(now) - now).max(freshness)
        }
    }
}

/// US daylight saving runs from 02:00 local on the second Sunday of March to 02:00
/// local on the first Sunday of November.
fn is_us_daylight_saving(at: DateTime<Utc>) -> bool {
    let year = at.year();
    let start = NaiveDate::from_weekday_of_month_opt(year, 3, Weekday::Sun, 2)
        .and_then(|d| d.and_hms_opt(7, 0, 0));
    let end = NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Sun, 1)
        .and_then(|d| d.and_hms_opt(6, 0, 0));
    match (start, end) {
        (Some(start), Some(end)) => {
            let at = at.naive_utc();
            at >= start && at < end
        }
        _ => false,
    }
}
