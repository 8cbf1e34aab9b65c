//! Storage faults surface as `Unavailable`, never as "no driver".

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

mod common;

use common::{World, tel_aviv};
use ride_dispatch::AssignOutcome;
use ride_dispatch_core::error::DispatchError;
use ride_dispatch_core::identity::{Actor, UserId};
use ride_dispatch_core::store::RideStore;
use ride_dispatch_testing::{FaultyRideStore, InMemoryRideStore};
use std::sync::Arc;

fn faulty_world() -> (World, Arc<FaultyRideStore>) {
    let rides = Arc::new(InMemoryRideStore::new());
    let faulty = Arc::new(FaultyRideStore::new(
        Arc::clone(&rides) as Arc<dyn RideStore>
    ));
    let world = World::with_ride_store(Arc::clone(&faulty) as Arc<dyn RideStore>, rides);
    (world, faulty)
}

async fn request(world: &World) -> Result<AssignOutcome, DispatchError> {
    world
        .engine
        .request_ride(&Actor::rider(UserId::new()), tel_aviv(), None, None)
        .await
}

#[tokio::test]
async fn outage_during_search_is_unavailable() {
    let (world, faulty) = faulty_world();
    world.live_driver(tel_aviv()).await;
    faulty.set_outage(true);

    let err = request(&world).await.unwrap_err();

    assert!(matches!(err, DispatchError::Unavailable(_)), "got {err:?}");
    assert_eq!(faulty.insert_attempts(), 0);
}

#[tokio::test]
async fn single_bind_fault_moves_on_to_next_candidate() {
    let (world, faulty) = faulty_world();
    world.live_driver(tel_aviv()).await;
    world.live_driver(tel_aviv()).await;
    faulty.fail_next_inserts(1);

    let outcome = request(&world).await.unwrap();

    assert!(matches!(outcome, AssignOutcome::Assigned(_)));
    assert_eq!(faulty.insert_attempts(), 2);
}

#[tokio::test]
async fn fault_on_only_candidate_is_not_reported_as_busy() {
    let (world, faulty) = faulty_world();
    world.live_driver(tel_aviv()).await;
    faulty.fail_next_inserts(1);

    let err = request(&world).await.unwrap_err();

    assert!(matches!(err, DispatchError::Unavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn fault_budget_stops_the_attempt() {
    let (world, faulty) = faulty_world();
    for _ in 0..5 {
        world.live_driver(tel_aviv()).await;
    }
    faulty.fail_next_inserts(5);

    let err = request(&world).await.unwrap_err();

    assert!(matches!(err, DispatchError::Unavailable(_)), "got {err:?}");
    assert_eq!(faulty.insert_attempts(), 3);
    assert!(world.rides.all().is_empty());
}

#[tokio::test]
async fn transition_during_outage_is_unavailable() {
    let (world, faulty) = faulty_world();
    let driver = world.live_driver(tel_aviv()).await;
    let (_, ride) = world.offer(tel_aviv()).await;
    faulty.set_outage(true);

    let err = world.engine.accept(&driver, ride.id).await.unwrap_err();

    assert!(err.is_retryable(), "got {err:?}");
}
