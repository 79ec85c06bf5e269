//! Geographic primitives: great-circle distance and continent zones.

pub mod continent;

pub use continent::{
    calculate_geographic_spread_penalty, detect_continent, filter_to_dominant_continent,
    get_dominant_continent, validate_continent_consistency, Continent, ContinentValidation,
    ContinentZone, CONTINENT_ZONES,
};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two `(lat, lon)` points in degrees.
#[inline]
#[must_use]
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` a hair outside [0, 1] for antipodal points.
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();
    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_known_distances() {
        // Paris -> London, ~343.5 km.
        let d = haversine_m(48.8566, 2.3522, 51.5074, -0.1278);
        assert!((d - 343_500.0).abs() < 2_000.0, "{d}");

        // One degree of latitude, ~111.2 km.
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 10.0, "{d}");

        assert_eq!(haversine_m(37.8199, -122.4783, 37.8199, -122.4783), 0.0);
    }

    #[test]
    fn haversine_is_symmetric_and_bounded() {
        let ab = haversine_m(-33.86, 151.21, 40.71, -74.0);
        let ba = haversine_m(40.71, -74.0, -33.86, 151.21);
        assert!((ab - ba).abs() < 1e-6);
        let antipodal = haversine_m(0.0, 0.0, 0.0, 180.0);
        assert!((antipodal - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
    }
}
