//! Turns a raw download into the layout every repository file shares: a `time`
//! column, `lat`/`lon` coordinates and the dataset's factors under their stored names.

use crate::config::dataset::{DatasetConfig, ReleaseMarkers};
use crate::types::factor::Factor;
use crate::types::lifecycle::LifecycleState;
use crate::update::error::FormatError;
use log::debug;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

pub const TIME_COLUMN: &str = "time";
pub const LAT_COLUMN: &str = "lat";
pub const LON_COLUMN: &str = "lon";

const COORDINATE_ALIASES: [(&str, &str); 2] = [("latitude", LAT_COLUMN), ("longitude", LON_COLUMN)];

/// Rewrites a downloaded file in place. Runs on the blocking pool.
pub trait DatasetFormatter: Send + Sync + 'static {
    fn format(&self, path: &Path, required: LifecycleState) -> Result<(), FormatError>;
}

pub struct FrameFormatter {
    factors: BTreeMap<String, Factor>,
    release: Option<ReleaseMarkers>,
}

impl FrameFormatter {
    pub fn new(factors: BTreeMap<String, Factor>, release: Option<ReleaseMarkers>) -> Self {
        Self { factors, release }
    }

    pub fn for_dataset(dataset: &DatasetConfig) -> Self {
        Self::new(dataset.factors.clone(), dataset.release.clone())
    }

    fn read(path: &Path) -> Result<DataFrame, FormatError> {
        let file =
            std::fs::File::open(path).map_err(|e| FormatError::FileOpen(path.to_path_buf(), e))?;
        ParquetReader::new(file)
            .finish()
            .map_err(|e| FormatError::ParquetRead(path.to_path_buf(), e))
    }

    fn write(path: &Path, df: &mut DataFrame) -> Result<(), FormatError> {
        let file = std::fs::File::create(path)
            .map_err(|e| FormatError::ParquetWriteIo(path.to_path_buf(), e))?;
        ParquetWriter::new(file)
            .with_compression(ParquetCompression::Snappy)
            .finish(df)
            .map_err(|e| FormatError::ParquetWritePolars(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Rows of `side` carrying at least one non-null factor value.
    fn populated_rows(
        df: &DataFrame,
        marker: &ReleaseMarkers,
        side: i64,
        factor_columns: &[&str],
        path: &Path,
    ) -> Result<DataFrame, FormatError> {
        let populated = factor_columns
            .iter()
            .map(|name| col(*name).is_not_null())
            .reduce(|acc, next| acc.or(next))
            .unwrap_or_else(|| lit(false));
        df.clone()
            .lazy()
            .filter(
                col(marker.column.as_str())
                    .cast(DataType::Int64)
                    .eq(lit(side))
                    .and(populated),
            )
            .collect()
            .map_err(|source| FormatError::Polars {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Drops the release padding of a download.
    ///
    /// Each time step must be populated by one side only; both sides at the same time
    /// step, or no data at all, fail the file. Time steps of the two sides are merged.
    /// A bucket that must become permanent only accepts permanent data.
    fn select_release(
        &self,
        df: DataFrame,
        required: LifecycleState,
        factor_columns: &[&str],
        path: &Path,
    ) -> Result<DataFrame, FormatError> {
        let Some(marker) = &self.release else {
            return Ok(df);
        };
        if df.column(marker.column.as_str()).is_err() {
            return Ok(df);
        }
        let polars_err = |source| FormatError::Polars {
            path: path.to_path_buf(),
            source,
        };

        let permanent = Self::populated_rows(&df, marker, marker.permanent, factor_columns, path)?;
        let provisional =
            Self::populated_rows(&df, marker, marker.provisional, factor_columns, path)?;

        if permanent.height() == 0 && provisional.height() == 0 {
            return Err(FormatError::EmptyRelease {
                path: path.to_path_buf(),
                column: marker.column.clone(),
            });
        }

        let overlap = permanent
            .clone()
            .lazy()
            .select([col(TIME_COLUMN)])
            .join(
                provisional.clone().lazy().select([col(TIME_COLUMN)]),
                [col(TIME_COLUMN)],
                [col(TIME_COLUMN)],
                JoinArgs::new(JoinType::Inner),
            )
            .collect()
            .map_err(polars_err)?;
        if overlap.height() > 0 {
            return Err(FormatError::AmbiguousRelease {
                path: path.to_path_buf(),
                column: marker.column.clone(),
            });
        }

        let found = if provisional.height() > 0 {
            LifecycleState::Provisional
        } else {
            LifecycleState::Permanent
        };
        if required == LifecycleState::Permanent && found != LifecycleState::Permanent {
            return Err(FormatError::ReleaseMismatch {
                path: path.to_path_buf(),
                required,
                found,
            });
        }

        let rows = permanent.vstack(&provisional).map_err(polars_err)?;
        debug!(
            "Kept {} rows of {:?} by '{}' ({} permanent, {} provisional)",
            rows.height(),
            path,
            marker.column,
            permanent.height(),
            provisional.height()
        );
        Ok(rows)
    }

    /// The column holding `name`, accepting its long alias.
    fn coordinate_source<'d>(df: &'d DataFrame, name: &'d str, path: &Path) -> Result<&'d str, FormatError> {
        let alias = COORDINATE_ALIASES
            .iter()
            .find(|(_, target)| *target == name)
            .map(|(alias, _)| *alias);
        [Some(name), alias]
            .into_iter()
            .flatten()
            .find(|candidate| df.column(candidate).is_ok())
            .ok_or_else(|| FormatError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })
    }

    pub(crate) fn format_frame(
        &self,
        df: DataFrame,
        required: LifecycleState,
        path: &Path,
    ) -> Result<DataFrame, FormatError> {
        if df.column(TIME_COLUMN).is_err() {
            return Err(FormatError::MissingColumn {
                path: path.to_path_buf(),
                column: TIME_COLUMN.to_string(),
            });
        }
        let lat_source = Self::coordinate_source(&df, LAT_COLUMN, path)?.to_string();
        let lon_source = Self::coordinate_source(&df, LON_COLUMN, path)?.to_string();

        let present: Vec<(&str, &Factor)> = self
            .factors
            .iter()
            .filter(|(raw, _)| df.column(raw.as_str()).is_ok())
            .map(|(raw, factor)| (raw.as_str(), factor))
            .collect();
        if present.is_empty() {
            return Err(FormatError::NoFactors(path.to_path_buf()));
        }
        let factor_columns: Vec<&str> = present.iter().map(|(raw, _)| *raw).collect();

        let df = self.select_release(df, required, &factor_columns, path)?;

        let mut columns = vec![
            col(TIME_COLUMN).cast(DataType::Datetime(TimeUnit::Milliseconds, None)),
            col(lat_source.as_str()).cast(DataType::Float64).alias(LAT_COLUMN),
            col(lon_source.as_str()).cast(DataType::Float64).alias(LON_COLUMN),
        ];
        columns.extend(
            present
                .iter()
                .map(|(raw, factor)| factor.conversion.apply(col(*raw)).alias(factor.name.as_str())),
        );

        df.lazy()
            .select(columns)
            .sort([TIME_COLUMN, LAT_COLUMN, LON_COLUMN], Default::default())
            .collect()
            .map_err(|source| FormatError::Polars {
                path: path.to_path_buf(),
                source,
            })
    }
}

impl DatasetFormatter for FrameFormatter {
    fn format(&self, path: &Path, required: LifecycleState) -> Result<(), FormatError> {
        let raw = Self::read(path)?;
        let mut formatted = self.format_frame(raw, required, path)?;
        debug!(
            "Formatted {:?} as {} ({} rows, {} columns)",
            path,
            required,
            formatted.height(),
            formatted.width()
        );
        Self::write(path, &mut formatted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{naive, write_parquet};
    use crate::types::factor::Conversion;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn formatter(release: Option<ReleaseMarkers>) -> FrameFormatter {
        let factors = [
            ("t2m".to_string(), Factor::converted("temperature", Conversion::Offset { offset: -273.15 })),
            ("tp".to_string(), Factor::renamed("precipitation")),
        ]
        .into();
        FrameFormatter::new(factors, release)
    }

    fn expver() -> Option<ReleaseMarkers> {
        Some(ReleaseMarkers {
            column: "expver".to_string(),
            permanent: 1,
            provisional: 5,
        })
    }

    fn raw_frame(expver: &[i64], t2m: &[Option<f64>]) -> DataFrame {
        let hours: Vec<u32> = (0..expver.len() as u32).map(|h| h % 24).collect();
        raw_frame_at(&hours, expver, t2m)
    }

    fn raw_frame_at(hours: &[u32], expver: &[i64], t2m: &[Option<f64>]) -> DataFrame {
        let n = expver.len();
        let time: Vec<_> = hours.iter().map(|h| naive(2024, 1, 1, *h)).collect();
        df!(
            "time" => time,
            "latitude" => vec![52.0f64; n],
            "longitude" => vec![5.0f64; n],
            "expver" => expver,
            "t2m" => t2m,
            "u10" => vec![1.0f64; n],
        )
        .unwrap()
    }

    fn path() -> PathBuf {
        PathBuf::from("X_2024_01_UNFORMATTED.parquet")
    }

    #[test]
    fn renames_converts_and_drops_unknown_columns() {
        let df = raw_frame(&[1, 1], &[Some(273.15), Some(283.15)]);

        let out = formatter(None)
            .format_frame(df, LifecycleState::Permanent, &path())
            .unwrap();

        let names: Vec<&str> = out.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["time", "lat", "lon", "temperature"]);
        assert_eq!(
            out.column("time").unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, None)
        );
        let temperature: Vec<Option<f64>> =
            out.column("temperature").unwrap().f64().unwrap().into_iter().collect();
        assert!((temperature[0].unwrap()).abs() < 1e-9);
        assert!((temperature[1].unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn picks_the_release_side_matching_the_required_state() {
        let df = raw_frame(&[1, 1, 5, 5], &[Some(280.0), Some(281.0), None, None]);
        let out = formatter(expver())
            .format_frame(df, LifecycleState::Permanent, &path())
            .unwrap();
        assert_eq!(out.height(), 2);

        let df = raw_frame(&[1, 1, 5, 5], &[None, None, Some(280.0), Some(281.0)]);
        let out = formatter(expver())
            .format_frame(df, LifecycleState::Provisional, &path())
            .unwrap();
        assert_eq!(out.height(), 2);
    }

    #[test]
    fn disjoint_release_sides_are_merged() {
        // Final data for the first hours of the month, provisional after that, each
        // padded with nulls on the other side.
        let df = raw_frame_at(
            &[0, 1, 2, 0, 1, 2],
            &[1, 1, 1, 5, 5, 5],
            &[Some(280.0), Some(281.0), None, None, None, Some(282.0)],
        );

        let out = formatter(expver())
            .format_frame(df.clone(), LifecycleState::Provisional, &path())
            .unwrap();
        assert_eq!(out.height(), 3);
        assert_eq!(out.column("temperature").unwrap().null_count(), 0);

        assert!(matches!(
            formatter(expver()).format_frame(df, LifecycleState::Permanent, &path()),
            Err(FormatError::ReleaseMismatch {
                found: LifecycleState::Provisional,
                ..
            })
        ));
    }

    #[test]
    fn final_data_is_accepted_for_a_provisional_bucket() {
        let df = raw_frame(&[1, 1, 5, 5], &[Some(280.0), Some(281.0), None, None]);

        let out = formatter(expver())
            .format_frame(df, LifecycleState::Provisional, &path())
            .unwrap();

        assert_eq!(out.height(), 2);
    }

    #[test]
    fn release_split_fails_loudly() {
        let both = raw_frame_at(&[0, 0], &[1, 5], &[Some(280.0), Some(281.0)]);
        assert!(matches!(
            formatter(expver()).format_frame(both, LifecycleState::Permanent, &path()),
            Err(FormatError::AmbiguousRelease { .. })
        ));

        let neither = raw_frame(&[1, 5], &[None, None]);
        assert!(matches!(
            formatter(expver()).format_frame(neither, LifecycleState::Permanent, &path()),
            Err(FormatError::EmptyRelease { .. })
        ));

        let only_provisional = raw_frame(&[5, 5], &[Some(280.0), Some(281.0)]);
        assert!(matches!(
            formatter(expver()).format_frame(only_provisional, LifecycleState::Permanent, &path()),
            Err(FormatError::ReleaseMismatch {
                required: LifecycleState::Permanent,
                found: LifecycleState::Provisional,
                ..
            })
        ));
    }

    #[test]
    fn aliases_resolve_when_the_release_column_is_absent() {
        let df = raw_frame(&[1, 1, 1], &[Some(280.0), Some(281.0), Some(282.0)])
            .drop("expver")
            .unwrap();

        let out = formatter(expver())
            .format_frame(df, LifecycleState::Provisional, &path())
            .unwrap();

        assert_eq!(out.height(), 3);
        let lat: Vec<Option<f64>> = out.column("lat").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(lat, vec![Some(52.0); 3]);
        assert!(out.column("latitude").is_err());
    }

    #[test]
    fn short_coordinate_names_pass_through() {
        let df = df!(
            "time" => [naive(2024, 1, 1, 0)],
            "lat" => [52.0f64],
            "lon" => [5.0f64],
            "tp" => [0.2f64]
        )
        .unwrap();

        let out = formatter(None)
            .format_frame(df, LifecycleState::Permanent, &path())
            .unwrap();

        let names: Vec<&str> = out.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["time", "lat", "lon", "precipitation"]);
    }

    #[test]
    fn requires_index_columns_and_a_factor() {
        let df = df!("time" => [naive(2024, 1, 1, 0)], "t2m" => [1.0f64]).unwrap();
        assert!(matches!(
            formatter(None).format_frame(df, LifecycleState::Permanent, &path()),
            Err(FormatError::MissingColumn { column, .. }) if column == "lat"
        ));

        let df = df!(
            "time" => [naive(2024, 1, 1, 0)],
            "lat" => [52.0f64],
            "lon" => [5.0f64],
            "swh" => [1.0f64]
        )
        .unwrap();
        assert!(matches!(
            formatter(None).format_frame(df, LifecycleState::Permanent, &path()),
            Err(FormatError::NoFactors(_))
        ));
    }

    #[test]
    fn format_rewrites_the_file_in_place() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("X_2024_01_UNFORMATTED.parquet");
        write_parquet(&file, &mut raw_frame(&[1], &[Some(280.0)]));

        formatter(None)
            .format(&file, LifecycleState::Permanent)
            .unwrap();

        let reread = FrameFormatter::read(&file).unwrap();
        assert_eq!(reread.width(), 4);
        assert!(reread.column("lat").is_ok());
        assert!(reread.column("expver").is_err());
    }
}
