//! Coordinates and the axis-aligned geofence used for candidate search.
//!
//! The geofence is deliberately low precision: a latitude/longitude rectangle
//! sized in degrees. Great-circle distance is provided for diagnostics only.

use crate::error::DispatchError;
use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 coordinate in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude, -90..=90
    pub lat: f64,
    /// Longitude, -180..=180
    pub lng: f64,
}

impl GeoPoint {
    /// Create a validated point.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidInput`] if either component is not
    /// finite or out of range.
    pub fn new(lat: f64, lng: f64) -> Result<Self, DispatchError> {
        let point = Self { lat, lng };
        point.validate()?;
        Ok(point)
    }

    /// Check that the coordinate is finite and within range.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidInput`] describing the bad component.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(DispatchError::InvalidInput(format!(
                "latitude out of range: {}",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(DispatchError::InvalidInput(format!(
                "longitude out of range: {}",
                self.lng
            )));
        }
        Ok(())
    }

    /// Great-circle distance to `other` in kilometres (haversine).
    #[must_use]
    pub fn haversine_km(&self, other: &Self) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }
}

/// Axis-aligned latitude/longitude rectangle (inclusive bounds).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Southern edge
    pub min_lat: f64,
    /// Northern edge
    pub max_lat: f64,
    /// Western edge
    pub min_lng: f64,
    /// Eastern edge
    pub max_lng: f64,
}

impl BoundingBox {
    /// Rectangle centred on `center` extending `half_width` degrees of
    /// longitude and `half_height` degrees of latitude in each direction.
    ///
    /// No antimeridian or pole wrapping is attempted.
    #[must_use]
    pub fn around(center: GeoPoint, half_width: f64, half_height: f64) -> Self {
        Self {
            min_lat: center.lat - half_height,
            max_lat: center.lat + half_height,
            min_lng: center.lng - half_width,
            max_lng: center.lng + half_width,
        }
    }

    /// Whether `point` lies inside the rectangle (edges included).
    #[must_use]
    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lng..=self.max_lng).contains(&point.lng)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(GeoPoint::new(91.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -181.0).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(32.08, 34.78).is_ok());
    }

    #[test]
    fn haversine_matches_known_distance() {
        // Tel Aviv to Jerusalem, roughly 54 km
        let tel_aviv = GeoPoint::new(32.0853, 34.7818).unwrap();
        let jerusalem = GeoPoint::new(31.7683, 35.2137).unwrap();
        let d = tel_aviv.haversine_km(&jerusalem);
        assert!((50.0..58.0).contains(&d), "distance was {d}");
        assert!(tel_aviv.haversine_km(&tel_aviv).abs() < 1e-9);
    }

    #[test]
    fn box_edges_are_inclusive() {
        let center = GeoPoint::new(10.0, 20.0).unwrap();
        let area = BoundingBox::around(center, 0.5, 0.25);
        assert!(area.contains(&GeoPoint { lat: 10.25, lng: 20.5 }));
        assert!(area.contains(&GeoPoint { lat: 9.75, lng: 19.5 }));
        assert!(!area.contains(&GeoPoint { lat: 10.26, lng: 20.0 }));
        assert!(!area.contains(&GeoPoint { lat: 10.0, lng: 20.51 }));
    }

    proptest! {
        #[test]
        fn box_contains_every_point_within_its_half_sizes(
            lat in -80.0f64..80.0,
            lng in -170.0f64..170.0,
            half_w in 0.01f64..2.0,
            half_h in 0.01f64..2.0,
            fx in -1.0f64..=1.0,
            fy in -1.0f64..=1.0,
        ) {
            let center = GeoPoint { lat, lng };
            let area = BoundingBox::around(center, half_w, half_h);
            let inside = GeoPoint { lat: lat + fy * half_h * 0.999, lng: lng + fx * half_w * 0.999 };
            prop_assert!(area.contains(&center));
            prop_assert!(area.contains(&inside));
        }

        #[test]
        fn widening_never_loses_points(
            lat in -80.0f64..80.0,
            lng in -170.0f64..170.0,
            dlat in -0.3f64..0.3,
            dlng in -0.3f64..0.3,
        ) {
            let center = GeoPoint { lat, lng };
            let narrow = BoundingBox::around(center, 0.2, 0.2);
            let wide = BoundingBox::around(center, 1.0, 1.0);
            let point = GeoPoint { lat: lat + dlat, lng: lng + dlng };
            prop_assert!(!narrow.contains(&point) || wide.contains(&point));
        }
    }
}
