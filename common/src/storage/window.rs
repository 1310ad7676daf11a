// Overlap query windows for daily, weekly and monthly reads

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Calendar period a read covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

/// Half-open window `[start, end)` in absolute time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window for `period` anchored at midnight of `date` in `date`'s own time zone
    pub fn for_period<Z: TimeZone>(period: Period, date: &DateTime<Z>) -> Self {
        match period {
            Period::Daily => Self::daily(date),
            Period::Weekly => Self::weekly(date),
            Period::Monthly => Self::monthly(date),
        }
    }

    /// Midnight of `date` plus 24 hours
    pub fn daily<Z: TimeZone>(date: &DateTime<Z>) -> Self {
        let start = start_of_day(date);
        Self::new(start, start + Duration::hours(24))
    }

    /// Midnight of `date` plus 7 × 24 hours
    pub fn weekly<Z: TimeZone>(date: &DateTime<Z>) -> Self {
        let start = start_of_day(date);
        Self::new(start, start + Duration::hours(7 * 24))
    }

    /// Midnight of `date` up to midnight of (month + 1, day + 1).
    ///
    /// The end date is normalized the way calendar arithmetic overflows:
    /// Jan 31 gives "Feb 32", which lands on Mar 4 (Mar 3 in a leap year).
    pub fn monthly<Z: TimeZone>(date: &DateTime<Z>) -> Self {
        let start = start_of_day(date);
        let local = date.date_naive();
        let first_of_month = local.with_day(1).unwrap_or(local);
        let end_date = first_of_month
            .checked_add_months(Months::new(1))
            .and_then(|next_month| {
                next_month.checked_add_days(chrono::Days::new(u64::from(local.day())))
            })
            .unwrap_or(NaiveDate::MAX);
        let end = local_midnight(&date.timezone(), end_date);
        Self::new(start, end)
    }

    /// Overlap predicate: boundary touches on either side do not count
    pub fn overlaps(&self, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> bool {
        starts_at < self.end && ends_at > self.start
    }
}

fn start_of_day<Z: TimeZone>(date: &DateTime<Z>) -> DateTime<Utc> {
    local_midnight(&date.timezone(), date.date_naive())
}

/// Resolve midnight of a local calendar date to an instant.
///
/// Ambiguous midnights take the earlier instant. Zones that skip midnight
/// (DST starting at 00:00) resolve to the first valid local time after it.
fn local_midnight<Z: TimeZone>(tz: &Z, day: NaiveDate) -> DateTime<Utc> {
    let midnight: NaiveDateTime = day.and_hms_opt(0, 0, 0).unwrap_or(NaiveDateTime::MIN);
    if let Some(resolved) = tz.from_local_datetime(&midnight).earliest() {
        return resolved.with_timezone(&Utc);
    }
    // Skipped local times never exceed a couple of hours
    (1..=180)
        .map(|minutes| midnight + Duration::minutes(minutes))
        .find_map(|candidate| tz.from_local_datetime(&candidate).earliest())
        .map(|resolved| resolved.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Tz;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_daily_window_starts_at_midnight() {
        let window = TimeWindow::daily(&utc(2024, 3, 10, 15, 45));
        assert_eq!(window.start, utc(2024, 3, 10, 0, 0));
        assert_eq!(window.end, utc(2024, 3, 11, 0, 0));
    }

    #[test]
    fn test_weekly_window_spans_seven_days() {
        let window = TimeWindow::weekly(&utc(2024, 3, 10, 15, 45));
        assert_eq!(window.start, utc(2024, 3, 10, 0, 0));
        assert_eq!(window.end, utc(2024, 3, 17, 0, 0));
    }

    #[test]
    fn test_monthly_window_adds_month_and_day() {
        let window = TimeWindow::monthly(&utc(2024, 1, 15, 8, 0));
        assert_eq!(window.start, utc(2024, 1, 15, 0, 0));
        assert_eq!(window.end, utc(2024, 2, 16, 0, 0));
    }

    #[test]
    fn test_monthly_window_normalizes_overflowing_day() {
        // Feb 32 in a non-leap year is Mar 4
        let window = TimeWindow::monthly(&utc(2023, 1, 31, 12, 0));
        assert_eq!(window.end, utc(2023, 3, 4, 0, 0));

        // ...and Mar 3 in a leap year
        let window = TimeWindow::monthly(&utc(2024, 1, 31, 12, 0));
        assert_eq!(window.end, utc(2024, 3, 3, 0, 0));
    }

    #[test]
    fn test_monthly_window_rolls_over_year() {
        let window = TimeWindow::monthly(&utc(2024, 12, 15, 23, 59));
        assert_eq!(window.start, utc(2024, 12, 15, 0, 0));
        assert_eq!(window.end, utc(2025, 1, 16, 0, 0));
    }

    #[test]
    fn test_daily_window_uses_local_midnight() {
        let tz: Tz = "Europe/Moscow".parse().unwrap();
        // 01:30 UTC on the 10th is 04:30 in Moscow (UTC+3)
        let date = utc(2024, 3, 10, 1, 30).with_timezone(&tz);
        let window = TimeWindow::daily(&date);
        assert_eq!(window.start, utc(2024, 3, 9, 21, 0));
        assert_eq!(window.end, utc(2024, 3, 10, 21, 0));
    }

    #[test]
    fn test_skipped_midnight_resolves_forward() {
        // Chile springs forward at 00:00 local, so midnight does not exist
        let tz: Tz = "America/Santiago".parse().unwrap();
        let date = utc(2023, 9, 3, 15, 0).with_timezone(&tz);
        let window = TimeWindow::daily(&date);
        let local_start = window.start.with_timezone(&tz);
        assert_eq!(local_start.date_naive(), date.date_naive());
        assert_eq!(local_start.format("%H:%M").to_string(), "01:00");
    }

    #[test]
    fn test_overlap_boundaries() {
        let window = TimeWindow::new(utc(2024, 3, 10, 0, 0), utc(2024, 3, 11, 0, 0));

        // Ends exactly at the window start
        assert!(!window.overlaps(utc(2024, 3, 9, 23, 0), utc(2024, 3, 10, 0, 0)));
        // Starts exactly at the window end
        assert!(!window.overlaps(utc(2024, 3, 11, 0, 0), utc(2024, 3, 11, 1, 0)));
        // Straddles the start
        assert!(window.overlaps(utc(2024, 3, 9, 23, 0), utc(2024, 3, 10, 0, 1)));
        // Covers the whole window
        assert!(window.overlaps(utc(2024, 3, 1, 0, 0), utc(2024, 3, 20, 0, 0)));
        // Inside
        assert!(window.overlaps(utc(2024, 3, 10, 9, 0), utc(2024, 3, 10, 10, 0)));
    }

    #[test]
    fn test_for_period_dispatch() {
        let date = utc(2024, 6, 1, 12, 0);
        assert_eq!(TimeWindow::for_period(Period::Daily, &date), TimeWindow::daily(&date));
        assert_eq!(TimeWindow::for_period(Period::Weekly, &date), TimeWindow::weekly(&date));
        assert_eq!(TimeWindow::for_period(Period::Monthly, &date), TimeWindow::monthly(&date));
    }
}
