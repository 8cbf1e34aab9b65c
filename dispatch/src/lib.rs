//! # Ride Dispatch
//!
//! Matches riders to nearby live drivers and drives each ride through its
//! lifecycle:
//!
//! ```text
//! offered → consented → enroute → onTrip → completed
//!    ↓
//! expired
//! ```
//!
//! - [`presence`]: driver heartbeats and liveness
//! - [`candidates`]: tiered bounding-box candidate search
//! - [`assignment`]: binds a request to the first free candidate
//! - [`lifecycle`]: the transition reducer
//! - [`expiry`]: lazy expiry plus the background sweeper
//! - [`engine`]: the facade the HTTP layer and tests drive
//! - [`server`] and [`api`]: the axum surface
//!
//! The one invariant that matters, at most one open ride per driver, is
//! owned by the [`RideStore`](ride_dispatch_core::store::RideStore). The
//! engine never assumes a read-then-write is safe.

#![forbid(unsafe_code)]

pub mod api;
pub mod assignment;
pub mod candidates;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod expiry;
pub mod lifecycle;
pub mod metrics;
pub mod presence;
pub mod server;

pub use assignment::{AssignOutcome, RideRequest};
pub use candidates::SearchTier;
pub use config::{Config, DispatchConfig};
pub use engine::{DispatchEngine, Stores};
pub use expiry::ExpirySweeper;
pub use server::{AppState, build_router};
