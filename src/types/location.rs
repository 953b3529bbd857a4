/// Represents a geographical coordinate using latitude and longitude (WGS84).
///
/// Latitude is the first element (index 0), and longitude is the second (index 1).
/// Both values are represented as `f64`.
///
/// # Examples
///
/// ```
/// use weather_repository::LatLon;
///
/// let de_bilt = LatLon(52.10, 5.18);
/// assert_eq!(de_bilt.0, 52.10); // Latitude
/// assert_eq!(de_bilt.1, 5.18); // Longitude
/// ```
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LatLon(pub f64, pub f64);

impl LatLon {
    pub fn lat(&self) -> f64 {
        self.0
    }
    pub fn lon(&self) -> f64 {
        self.1
    }
}
