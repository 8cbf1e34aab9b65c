//! Candidate selection.
//!
//! Live drivers inside a rectangle around the pickup, minus excluded and busy
//! drivers, most recently seen first. The search escalates through a bounded
//! list of [`SearchTier`]s and stops at the first tier that yields anyone.

use crate::metrics;
use chrono::{DateTime, Duration, Utc};
use ride_dispatch_core::environment::Clock;
use ride_dispatch_core::error::{DispatchError, Result};
use ride_dispatch_core::geo::{BoundingBox, GeoPoint};
use ride_dispatch_core::identity::UserId;
use ride_dispatch_core::presence::live_since;
use ride_dispatch_core::store::{PresenceStore, RideStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One search rectangle, in degrees from the pickup.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchTier {
    /// Degrees of longitude on each side of the pickup
    pub half_width: f64,
    /// Degrees of latitude on each side of the pickup
    pub half_height: f64,
}

impl SearchTier {
    /// Create a tier.
    #[must_use]
    pub const fn new(half_width: f64, half_height: f64) -> Self {
        Self {
            half_width,
            half_height,
        }
    }

    /// Rectangle this tier covers around `center`.
    #[must_use]
    pub fn area(&self, center: GeoPoint) -> BoundingBox {
        BoundingBox::around(center, self.half_width, self.half_height)
    }

    /// Both sizes finite and greater than zero.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.half_width.is_finite()
            && self.half_height.is_finite()
            && self.half_width > 0.0
            && self.half_height > 0.0
    }

    /// Wider and taller than `other`.
    #[must_use]
    pub fn strictly_contains(&self, other: &Self) -> bool {
        self.half_width > other.half_width && self.half_height > other.half_height
    }
}

/// Bounded search-radius escalation.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchPolicy {
    /// Rectangles to try in order, narrowest first
    pub tiers: Vec<SearchTier>,
    /// Cap on candidates returned from a tier
    pub max_candidates: usize,
}

/// Finds drivers that may be bound to a new ride.
#[derive(Clone)]
pub struct CandidateSelector {
    presence: Arc<dyn PresenceStore>,
    rides: Arc<dyn RideStore>,
    clock: Arc<dyn Clock>,
    liveness_window: Duration,
    policy: SearchPolicy,
}

impl CandidateSelector {
    /// Create a selector.
    #[must_use]
    pub fn new(
        presence: Arc<dyn PresenceStore>,
        rides: Arc<dyn RideStore>,
        clock: Arc<dyn Clock>,
        liveness_window: Duration,
        policy: SearchPolicy,
    ) -> Self {
        Self {
            presence,
            rides,
            clock,
            liveness_window,
            policy,
        }
    }

    /// The configured escalation policy.
    #[must_use]
    pub const fn policy(&self) -> &SearchPolicy {
        &self.policy
    }

    /// Candidates for a pickup at the current time.
    ///
    /// An empty list is the "no drivers nearby" outcome, not an error.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidInput`]: pickup out of range
    /// - [`DispatchError::Unavailable`]: a store failed
    pub async fn select_candidates(
        &self,
        pickup: GeoPoint,
        exclude: &[UserId],
    ) -> Result<Vec<UserId>> {
        pickup.validate()?;
        self.select_candidates_at(pickup, exclude, self.clock.now())
            .await
    }

    /// Candidates for a pickup, evaluating liveness and busy-ness at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unavailable`] if a store failed.
    pub async fn select_candidates_at(
        &self,
        pickup: GeoPoint,
        exclude: &[UserId],
        now: DateTime<Utc>,
    ) -> Result<Vec<UserId>> {
        let since = live_since(now, self.liveness_window);
        let mut previous: Option<BoundingBox> = None;

        for (index, tier) in self.policy.tiers.iter().enumerate() {
            let area = tier.area(pickup);

            if let Some(narrower) = previous {
                let live_anywhere = self
                    .presence
                    .count_live(since, None)
                    .await
                    .map_err(|e| selection_fault("presence.count_live", e.into()))?;
                tracing::warn!(
                    ?pickup,
                    ?narrower,
                    widened = ?area,
                    tier = index,
                    live_anywhere,
                    "No candidates in search area, widening"
                );
                metrics::record_search_widened();
            }

            let candidates = self.candidates_in(area, since, now, exclude).await?;
            if !candidates.is_empty() {
                tracing::debug!(tier = index, count = candidates.len(), "Candidates selected");
                return Ok(candidates);
            }
            previous = Some(area);
        }

        Ok(Vec::new())
    }

    async fn candidates_in(
        &self,
        area: BoundingBox,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
        exclude: &[UserId],
    ) -> Result<Vec<UserId>> {
        let live = self
            .presence
            .find_live_in_area(area, since)
            .await
            .map_err(|e| selection_fault("presence.find_live_in_area", e.into()))?;

        let mut ids: Vec<UserId> = live
            .into_iter()
            .map(|p| p.driver_id)
            .filter(|id| !exclude.contains(id))
            .collect();
        if ids.is_empty() {
            return Ok(ids);
        }

        let busy = self
            .rides
            .busy_drivers(ids.clone(), now)
            .await
            .map_err(|e| selection_fault("rides.busy_drivers", e.into()))?;

        ids.retain(|id| !busy.contains(id));
        ids.truncate(self.policy.max_candidates);
        Ok(ids)
    }
}

fn selection_fault(operation: &'static str, err: DispatchError) -> DispatchError {
    tracing::warn!(operation, error = %err, "Candidate selection failed");
    metrics::record_storage_fault(operation);
    err
}
