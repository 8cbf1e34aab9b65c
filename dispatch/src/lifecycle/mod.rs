//! Ride lifecycle state machine.
//!
//! ```text
//! offered → consented → enroute → ontrip → completed
//! offered → expired
//! ```
//!
//! The [`RideLifecycleReducer`] is a pure function over a loaded [`Ride`]:
//! it checks the actor, the deadline and the current status, mutates the ride
//! and returns the [`RideEvent`]s describing what changed. An empty event list
//! means the ride was already where the action wanted it, and nothing is
//! written. Persisting the result is the engine's job.
//!
//! [`Ride`]: ride_dispatch_core::ride::Ride

pub mod actions;
pub mod environment;
pub mod reducer;
#[cfg(test)]
mod tests;
pub mod types;

pub use actions::RideAction;
pub use environment::{LifecycleEnvironment, ProductionLifecycleEnvironment};
pub use reducer::RideLifecycleReducer;
pub use types::RideEvent;
