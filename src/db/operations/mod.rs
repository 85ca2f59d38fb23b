pub mod chat;
pub mod flashcards;
pub mod lectures;
pub mod notes;
pub mod quizzes;
pub mod subjects;
pub mod users;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn ms_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

pub fn datetime_to_ms(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

/// RFC 3339 with millisecond precision, e.g. `2024-03-10T12:00:00.000Z`.
pub fn format_ms(ms: i64) -> String {
    ms_to_datetime(ms)
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn format_opt_ms(ms: Option<i64>) -> Option<String> {
    ms.map(format_ms)
}

/// Treats blank strings as absent.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
