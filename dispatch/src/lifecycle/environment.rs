//! Environment trait for the ride lifecycle reducer.

use chrono::Duration;
use ride_dispatch_core::environment::Clock;
use std::sync::Arc;

/// Environment dependencies for the ride lifecycle reducer.
pub trait LifecycleEnvironment: Send + Sync {
    /// Clock for the current time.
    ///
    /// Production uses `SystemClock`, tests use `FixedClock` or `ManualClock`.
    fn clock(&self) -> &dyn Clock;

    /// How long after driver acceptance rider consent is granted
    /// automatically. `None` disables automatic consent.
    fn consent_grace(&self) -> Option<Duration>;
}

/// Production environment for the ride lifecycle.
#[derive(Clone)]
pub struct ProductionLifecycleEnvironment {
    clock: Arc<dyn Clock>,
    consent_grace: Option<Duration>,
}

impl ProductionLifecycleEnvironment {
    /// Create a new production environment.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, consent_grace: Option<Duration>) -> Self {
        Self {
            clock,
            consent_grace,
        }
    }
}

impl LifecycleEnvironment for ProductionLifecycleEnvironment {
    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn consent_grace(&self) -> Option<Duration> {
        self.consent_grace
    }
}
