use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// Today's date in the local timezone, falling back to UTC when the local
/// offset cannot be determined.
pub fn today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

/// Format a date as `YYYY-MM-DD`.
pub fn iso_date(date: Date) -> String {
    let format = format_description!("[year]-[month]-[day]");
    date.format(&format).unwrap_or_else(|_| date.to_string())
}
