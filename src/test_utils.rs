//! Fixtures shared by the in-crate test modules.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use polars::prelude::*;
use std::path::Path;

pub(crate) fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub(crate) fn naive(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

pub(crate) fn write_parquet(path: &Path, df: &mut DataFrame) {
    let file = std::fs::File::create(path).unwrap();
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Snappy)
        .finish(df)
        .unwrap();
}

/// A frame with one row per (moment, location) and a single `temperature` factor,
/// in the layout the formatter produces.
pub(crate) fn grid_frame(moments: &[NaiveDateTime], locations: &[(f64, f64)]) -> DataFrame {
    let mut time = Vec::new();
    let mut lat = Vec::new();
    let mut lon = Vec::new();
    let mut temperature = Vec::new();
    for (i, moment) in moments.iter().enumerate() {
        for (j, (la, lo)) in locations.iter().enumerate() {
            time.push(*moment);
            lat.push(*la);
            lon.push(*lo);
            temperature.push((i * 10 + j) as f64);
        }
    }
    let time = Series::new("time".into(), time)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .unwrap();
    DataFrame::new(vec![
        time.into(),
        Column::new("lat".into(), lat),
        Column::new("lon".into(), lon),
        Column::new("temperature".into(), temperature),
    ])
    .unwrap()
}
