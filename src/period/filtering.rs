use crate::types::location::LatLon;
use crate::update::formatter::{LAT_COLUMN, LON_COLUMN, TIME_COLUMN};
use chrono::NaiveDateTime;
use polars::prelude::{col, lit, DataType, Expr, LazyFrame, TimeUnit};

/// Grid coordinates closer than this are considered the same point.
const COORDINATE_TOLERANCE: f64 = 1e-6;

pub trait RepositoryFrameFilterExt {
    /// Keeps rows whose `time` lies in `[begin, end]` (both inclusive).
    fn filter_period(self, begin: NaiveDateTime, end: NaiveDateTime) -> LazyFrame;

    /// Keeps rows located at one of `locations`, which are expected to be grid points
    /// already. An empty slice keeps nothing.
    fn filter_locations(self, locations: &[LatLon]) -> LazyFrame;
}

fn around(column: &str, value: f64) -> Expr {
    col(column)
        .gt(lit(value - COORDINATE_TOLERANCE))
        .and(col(column).lt(lit(value + COORDINATE_TOLERANCE)))
}

impl RepositoryFrameFilterExt for LazyFrame {
    fn filter_period(self, begin: NaiveDateTime, end: NaiveDateTime) -> LazyFrame {
        self.filter(
            col(TIME_COLUMN)
                .cast(DataType::Datetime(TimeUnit::Milliseconds, None))
                .gt_eq(lit(begin))
                .and(
                    col(TIME_COLUMN)
                        .cast(DataType::Datetime(TimeUnit::Milliseconds, None))
                        .lt_eq(lit(end)),
                ),
        )
    }

    fn filter_locations(self, locations: &[LatLon]) -> LazyFrame {
        let predicate = locations
            .iter()
            .map(|location| around(LAT_COLUMN, location.lat()).and(around(LON_COLUMN, location.lon())))
            .reduce(|any, next| any.or(next))
            .unwrap_or_else(|| lit(false));
        self.filter(predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{grid_frame, naive};
    use polars::prelude::IntoLazy;

    #[test]
    fn period_bounds_are_inclusive() {
        let moments: Vec<_> = (0..6).map(|h| naive(2024, 1, 1, h)).collect();
        let df = grid_frame(&moments, &[(52.0, 5.0)]);

        let filtered = df
            .lazy()
            .filter_period(naive(2024, 1, 1, 1), naive(2024, 1, 1, 3))
            .collect()
            .unwrap();

        assert_eq!(filtered.height(), 3);
    }

    #[test]
    fn keeps_only_requested_grid_points() {
        let df = grid_frame(
            &[naive(2024, 1, 1, 0), naive(2024, 1, 1, 1)],
            &[(52.0, 5.0), (52.25, 5.0), (52.0, 5.25)],
        );

        let filtered = df
            .clone()
            .lazy()
            .filter_locations(&[LatLon(52.0, 5.0), LatLon(52.0, 5.25)])
            .collect()
            .unwrap();
        assert_eq!(filtered.height(), 4);

        let none = df.lazy().filter_locations(&[]).collect().unwrap();
        assert_eq!(none.height(), 0);
    }
}
