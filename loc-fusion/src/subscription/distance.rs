//! Great-circle distance helper for the distance throttle.

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance in meters between two degree coordinates.
pub(crate) fn great_circle_distance_meters(
    lat1_deg: f64,
    lon1_deg: f64,
    lat2_deg: f64,
    lon2_deg: f64,
) -> f64 {
    let lat1 = lat1_deg.to_radians();
    let lat2 = lat2_deg.to_radians();
    let delta_lat = (lat2_deg - lat1_deg).to_radians();
    let delta_lon = (lon2_deg - lon1_deg).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}
