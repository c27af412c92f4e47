//! Tenant-timezone boundary math
//!
//! Tenants configure an IANA timezone; every "today" / "this week" /
//! report-range boundary is resolved in that zone and converted to UTC
//! before it reaches a query. Sales crossing local midnight therefore
//! land on the tenant's calendar day, not the server's.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{AppError, AppResult};

fn parse_tz(tz_name: &str) -> AppResult<Tz> {
    tz_name
        .parse::<Tz>()
        .map_err(|_| AppError::invalid_argument("timezone", format!("unknown zone `{tz_name}`")))
}

fn local_midnight_utc(tz: Tz, date: NaiveDate) -> AppResult<DateTime<Utc>> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AppError::invalid_argument("date", "invalid date"))?;
    // DST gaps/folds at midnight: take the earliest valid instant.
    let local = match tz.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let shifted = midnight + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .ok_or_else(|| AppError::invalid_argument("date", "unresolvable local time"))?
        }
    };
    Ok(local.with_timezone(&Utc))
}

/// UTC bounds `[start, end)` of one local calendar day.
pub fn local_day_bounds(tz_name: &str, date: NaiveDate) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    let tz = parse_tz(tz_name)?;
    let start = local_midnight_utc(tz, date)?;
    let next = date
        .succ_opt()
        .ok_or_else(|| AppError::invalid_argument("date", "date out of range"))?;
    let end = local_midnight_utc(tz, next)?;
    Ok((start, end))
}

/// UTC bounds `[start, end)` of an inclusive local date range.
pub fn local_date_range_utc(
    tz_name: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    if to < from {
        return Err(AppError::invalid_argument(
            "range",
            "`to` precedes `from`",
        ));
    }
    let tz = parse_tz(tz_name)?;
    let start = local_midnight_utc(tz, from)?;
    let next = to
        .succ_opt()
        .ok_or_else(|| AppError::invalid_argument("to", "date out of range"))?;
    let end = local_midnight_utc(tz, next)?;
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn nairobi_day_is_offset_three_hours() {
        let (start, end) = local_day_bounds("Africa/Nairobi", d(2025, 3, 10)).unwrap();
        assert_eq!(start.to_rfc3339(), "2025-03-09T21:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2025-03-10T21:00:00+00:00");
    }

    #[test]
    fn late_evening_sale_lands_on_local_day() {
        // 23:30 Nairobi on the 10th is 20:30 UTC the same day; it must fall
        // inside the local 10th, not the UTC 11th.
        let (start, end) = local_day_bounds("Africa/Nairobi", d(2025, 3, 10)).unwrap();
        let sale = Utc.with_ymd_and_hms(2025, 3, 10, 20, 30, 0).unwrap();
        assert!(sale >= start && sale < end);
    }

    #[test]
    fn inclusive_range_covers_both_endpoints() {
        let (start, end) =
            local_date_range_utc("Africa/Nairobi", d(2025, 1, 1), d(2025, 1, 31)).unwrap();
        assert_eq!((end - start).num_days(), 31);
    }

    #[test]
    fn single_day_range() {
        let (start, end) =
            local_date_range_utc("UTC", d(2025, 6, 15), d(2025, 6, 15)).unwrap();
        assert_eq!((end - start).num_hours(), 24);
    }

    #[test]
    fn dst_gap_midnight_resolves() {
        // America/Santiago: 2024-09-08 DST starts at 00:00, local midnight
        // does not exist. The day must still resolve (shifted start).
        let res = local_day_bounds("America/Santiago", d(2024, 9, 8));
        assert!(res.is_ok());
        let (start, end) = res.unwrap();
        assert!(end > start);
    }

    #[test]
    fn unknown_zone_rejected() {
        assert!(local_day_bounds("Mars/Olympus", d(2025, 1, 1)).is_err());
    }

    #[test]
    fn inverted_range_rejected() {
        assert!(local_date_range_utc("UTC", d(2025, 2, 2), d(2025, 2, 1)).is_err());
    }
}
