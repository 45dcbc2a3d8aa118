//! Civil time of the schedule feed
//!
//! The feed's calendar lives in a fixed UTC+2 zone with a hardcoded DST
//! window, so this does not consult any timezone database.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, Utc};

const STANDARD_OFFSET_SECS: i32 = 2 * 3600;
const DST_OFFSET_SECS: i32 = 3 * 3600;

/// Midnight on the last Sunday of `month` in `year`
pub fn last_sunday(year: i32, month: u32) -> NaiveDateTime {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("first day of a month is always valid");

    let last_day = first_of_next - Duration::days(1);
    let back = last_day.weekday().num_days_from_sunday() as i64;
    (last_day - Duration::days(back))
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
}

/// First instant of daylight time in `year`
pub fn dst_start(year: i32) -> NaiveDateTime {
    last_sunday(year, 3)
}

/// First instant after daylight time in `year`
pub fn dst_end(year: i32) -> NaiveDateTime {
    last_sunday(year, 11)
}

/// Offset of the feed's civil zone at `date`: +3h inside the DST window, +2h otherwise
pub fn civil_offset(date: NaiveDateTime) -> FixedOffset {
    let year = date.year();
    let secs = if dst_start(year) <= date && date < dst_end(year) {
        DST_OFFSET_SECS
    } else {
        STANDARD_OFFSET_SECS
    };
    FixedOffset::east_opt(secs).expect("offset within a day")
}

/// `instant` expressed in the feed's civil zone.
///
/// The DST window is bounded in local standard time, so the offset is looked
/// up at UTC+2 rather than at the UTC wall clock.
pub fn to_civil(instant: DateTime<Utc>) -> DateTime<FixedOffset> {
    let standard = instant.naive_utc() + Duration::seconds(STANDARD_OFFSET_SECS as i64);
    instant.with_timezone(&civil_offset(standard))
}
