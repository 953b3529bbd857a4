use crate::types::location::LatLon;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Maps requested coordinates onto the grid points a dataset is stored at.
pub trait GridSnapper {
    fn get_grid_coordinates(&self, locations: &[LatLon]) -> Vec<LatLon>;
}

/// A regular lat/lon grid: nodes sit at `origin + n * resolution` on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegularGrid {
    /// Node spacing as `(lat, lon)` degrees.
    pub resolution: (f64, f64),
    /// Any node of the grid, as `(lat, lon)`.
    pub origin: (f64, f64),
}

impl RegularGrid {
    pub fn new(resolution: (f64, f64), origin: (f64, f64)) -> Self {
        Self { resolution, origin }
    }

    fn node_index(value: f64, origin: f64, resolution: f64) -> i64 {
        ((value - origin) / resolution).round() as i64
    }

    fn node_value(index: i64, origin: f64, resolution: f64) -> f64 {
        index as f64 * resolution + origin
    }
}

impl GridSnapper for RegularGrid {
    /// Rounds every location to its nearest grid node. Locations that snap to the
    /// same node are returned once, in order of first appearance.
    fn get_grid_coordinates(&self, locations: &[LatLon]) -> Vec<LatLon> {
        let (lat_res, lon_res) = self.resolution;
        let (lat_origin, lon_origin) = self.origin;
        let mut seen = BTreeSet::new();
        locations
            .iter()
            .map(|location| {
                (
                    Self::node_index(location.lat(), lat_origin, lat_res),
                    Self::node_index(location.lon(), lon_origin, lon_res),
                )
            })
            .filter(|node| seen.insert(*node))
            .map(|(lat, lon)| {
                LatLon(
                    Self::node_value(lat, lat_origin, lat_res),
                    Self::node_value(lon, lon_origin, lon_res),
                )
            })
            .collect()
    }
}
