//! JSON API handlers.
//!
//! Handlers are thin: they extract the caller's [`Identity`](crate::server::Identity),
//! validate the body, call one [`DispatchEngine`](crate::engine::DispatchEngine)
//! method and map its error through [`AppError`](crate::server::AppError).

pub mod driver;
pub mod matching;
pub mod rides;

use ride_dispatch_core::geo::GeoPoint;
use serde::Deserialize;

/// Coordinates as sent by clients.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lng: f64,
}

impl TryFrom<Coordinates> for GeoPoint {
    type Error = ride_dispatch_core::error::DispatchError;

    fn try_from(value: Coordinates) -> Result<Self, Self::Error> {
        Self::new(value.lat, value.lng)
    }
}
