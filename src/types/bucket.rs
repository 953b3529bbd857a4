//! Defines the calendar slots ("buckets") that repository files are keyed by,
//! and the granularities a dataset can be bucketed at.

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The time granularity a repository stores its files at.
///
/// Each repository file holds exactly one bucket of data. The granularity is a
/// per-dataset constant: it decides how bucket keys are aligned, how they step
/// backwards during an update, and how many date fields appear in a file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One file per calendar month, named `{prefix}_{YYYY}_{MM}`.
    Monthly,
    /// One file per six-hour forecast run (00, 06, 12, 18 UTC), named
    /// `{prefix}_{YYYY}_{MM}_{DD}_{HH}`.
    SixHourly,
}

const SIX_HOURS: i64 = 6;

impl Granularity {
    /// Number of calendar fields encoded in a file name for this granularity.
    pub(crate) fn field_count(&self) -> usize {
        match self {
            Granularity::Monthly => 2,
            Granularity::SixHourly => 4,
        }
    }

    /// Aligns an arbitrary moment to the bucket that contains it.
    pub fn bucket_of(&self, moment: NaiveDateTime) -> BucketKey {
        let date = moment.date();
        match self {
            Granularity::Monthly => BucketKey(first_of_month(date.year(), date.month(), date)),
            Granularity::SixHourly => {
                let hour = (moment.hour() / 6) * 6;
                BucketKey(date.and_hms_opt(hour, 0, 0).unwrap_or(moment))
            }
        }
    }

    /// Builds a bucket key from decoded file-name fields, rejecting values that do not
    /// form a valid, aligned bucket (month 13, hour 07, February 30th, ...).
    pub(crate) fn key_from_fields(&self, fields: &[u32]) -> Option<BucketKey> {
        if fields.len() != self.field_count() {
            return None;
        }
        let year = i32::try_from(fields[0]).ok()?;
        match self {
            Granularity::Monthly => NaiveDate::from_ymd_opt(year, fields[1], 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(BucketKey),
            Granularity::SixHourly => {
                if fields[3] % 6 != 0 {
                    return None;
                }
                NaiveDate::from_ymd_opt(year, fields[1], fields[2])
                    .and_then(|d| d.and_hms_opt(fields[3], 0, 0))
                    .map(BucketKey)
            }
        }
    }

    /// The calendar fields of `key` as they appear in a file name.
    pub(crate) fn fields_of(&self, key: BucketKey) -> Vec<u32> {
        let start = key.start();
        let year = start.year().max(0) as u32;
        match self {
            Granularity::Monthly => vec![year, start.month()],
            Granularity::SixHourly => vec![year, start.month(), start.day(), start.hour()],
        }
    }

    /// The bucket directly preceding `key`, or `None` when it falls off the calendar.
    pub fn previous(&self, key: BucketKey) -> Option<BucketKey> {
        self.step_back(key, 1)
    }

    /// The bucket directly following `key`.
    pub fn next(&self, key: BucketKey) -> Option<BucketKey> {
        match self {
            Granularity::Monthly => key.0.checked_add_months(Months::new(1)).map(BucketKey),
            Granularity::SixHourly => key
                .0
                .checked_add_signed(Duration::hours(SIX_HOURS))
                .map(BucketKey),
        }
    }

    /// The bucket `steps` units before `key`.
    pub fn step_back(&self, key: BucketKey, steps: u32) -> Option<BucketKey> {
        match self {
            Granularity::Monthly => key.0.checked_sub_months(Months::new(steps)).map(BucketKey),
            Granularity::SixHourly => key
                .0
                .checked_sub_signed(Duration::hours(SIX_HOURS * i64::from(steps)))
                .map(BucketKey),
        }
    }

    /// Exclusive end of the span covered by `key`.
    pub fn end_of(&self, key: BucketKey) -> NaiveDateTime {
        self.next(key).map(BucketKey::start).unwrap_or(NaiveDateTime::MAX)
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Granularity::Monthly => "monthly",
            Granularity::SixHourly => "six_hourly",
        }
    }
}

fn first_of_month(year: i32, month: u32, fallback: NaiveDate) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, 1)
        .unwrap_or(fallback)
        .and_time(chrono::NaiveTime::MIN)
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Identifies the calendar slot one repository file covers.
///
/// A key is the (UTC) start of its bucket, already aligned to the repository's
/// [`Granularity`]; keys are only produced through a granularity, so two keys of the
/// same repository always compare chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey(NaiveDateTime);

impl BucketKey {
    /// First moment covered by this bucket.
    pub fn start(self) -> NaiveDateTime {
        self.0
    }
    pub fn year(self) -> i32 {
        self.0.year()
    }
    pub fn month(self) -> u32 {
        self.0.month()
    }
    pub fn day(self) -> u32 {
        self.0.day()
    }
    pub fn hour(self) -> u32 {
        self.0.hour()
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}",
            self.year(),
            self.month(),
            self.day(),
            self.hour()
        )
    }
}
