use crate::error::RangeError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

/// Nominal spacing between two captures in the catalog.
pub const CAPTURE_INTERVAL_MINUTES: i64 = 30;

/// One day's worth of captures at the nominal interval. The planner never asks
/// the catalog for fewer items than this.
pub const MIN_REQUEST_COUNT: u32 = 48;

/// An inclusive span of whole days. The start sits at 00:00 of its day and the
/// end at 23:59 of its day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, RangeError> {
        Self::from_instants(start.and_time(NaiveTime::MIN), end.and_time(NaiveTime::MIN))
    }

    /// Builds a range from arbitrary instants, snapping both to day boundaries.
    pub fn from_instants(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, RangeError> {
        let start = start.date().and_time(NaiveTime::MIN);
        let end = end.date().and_time(end_of_day());
        if start > end {
            return Err(RangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Day marker as it appears inside catalog suffixes, e.g. `21JUL2023`.
    pub fn start_marker(&self) -> String {
        self.start.format("%d%b%Y").to_string().to_uppercase()
    }

    /// Anchor date sent to the catalog, e.g. `2023-07-22`.
    pub fn end_date(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }

    /// Overestimated number of captures in the range. Actual cadence is
    /// irregular, so this never drops below a full day's allotment.
    pub fn estimated_count(&self) -> u32 {
        let slots = (self.end - self.start).num_minutes() / CAPTURE_INTERVAL_MINUTES;
        u32::try_from(slots)
            .unwrap_or(u32::MAX)
            .max(MIN_REQUEST_COUNT)
    }

    /// Short label used when naming runs, e.g. `21Jul2023_22Jul2023`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.start.format("%d%b%Y"), self.end.format("%d%b%Y"))
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::MIN + TimeDelta::minutes(23 * 60 + 59)
}
