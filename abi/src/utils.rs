use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::Error;

/// The studio runs on KST (UTC+9), which has no daylight saving.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 9;

/// Build the studio's fixed offset from whole hours east of UTC.
pub fn studio_offset(hours: i32) -> Result<FixedOffset, Error> {
    FixedOffset::east_opt(hours * 3600)
        .ok_or_else(|| Error::Config(format!("utc offset out of range: {hours}h")))
}

/// The civil date an instant falls on in the studio's timezone. Date keys
/// are always derived through this, never from the host timezone.
pub fn civil_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}
