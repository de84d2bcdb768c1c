use crate::error::AppError;
use crate::models::location::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn validate_point(field: &str, point: &GeoPoint) -> Result<(), AppError> {
    if !point.lat.is_finite() || !(-90.0..=90.0).contains(&point.lat) {
        return Err(AppError::validation(
            field,
            format!("latitude {} is outside [-90, 90]", point.lat),
        ));
    }

    if !point.lng.is_finite() || !(-180.0..=180.0).contains(&point.lng) {
        return Err(AppError::validation(
            field,
            format!("longitude {} is outside [-180, 180]", point.lng),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{haversine_km, validate_point};
    use crate::models::location::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 12.9716,
            lng: 77.5946,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn bengaluru_to_chennai_is_around_290_km() {
        let bengaluru = GeoPoint {
            lat: 12.9716,
            lng: 77.5946,
        };
        let chennai = GeoPoint {
            lat: 13.0827,
            lng: 80.2707,
        };
        let distance = haversine_km(&bengaluru, &chennai);
        assert!((distance - 290.0).abs() < 5.0);
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let bad_lat = GeoPoint { lat: 91.0, lng: 0.0 };
        let bad_lng = GeoPoint {
            lat: 0.0,
            lng: -180.5,
        };
        let not_a_number = GeoPoint {
            lat: f64::NAN,
            lng: 0.0,
        };

        assert!(validate_point("pickup", &bad_lat).is_err());
        assert!(validate_point("pickup", &bad_lng).is_err());
        assert!(validate_point("pickup", &not_a_number).is_err());
        assert!(validate_point("pickup", &GeoPoint { lat: 12.9, lng: 77.6 }).is_ok());
    }
}
