use chrono::{DateTime, FixedOffset, Utc};

/// JST is UTC+9
const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Fixed offset for Japan Standard Time.
pub fn jst_offset() -> FixedOffset {
    FixedOffset::east_opt(JST_OFFSET_SECS).expect("UTC+9 is a valid offset")
}

/// Current time in JST.
pub fn now_jst() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&jst_offset())
}

/// Convert a UTC instant to an RFC 3339 string in JST
pub fn to_jst_rfc3339(at: DateTime<Utc>) -> String {
    at.with_timezone(&jst_offset()).to_rfc3339()
}
