//! The one-open-ride-per-driver invariant under concurrent assignment.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

mod common;

use common::{World, tel_aviv};
use futures::future::join_all;
use proptest::prelude::*;
use ride_dispatch::AssignOutcome;
use ride_dispatch_core::identity::{Actor, UserId};
use ride_dispatch_core::store::RideStore;
use ride_dispatch_testing::{GatedRideStore, InMemoryRideStore};
use std::sync::Arc;

async fn race(world: &World, riders: usize) -> Vec<AssignOutcome> {
    let tasks = (0..riders).map(|_| {
        let engine = Arc::clone(&world.engine);
        tokio::spawn(async move {
            engine
                .request_ride(&Actor::rider(UserId::new()), tel_aviv(), None, None)
                .await
        })
    });

    join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect()
}

fn assigned(outcomes: &[AssignOutcome]) -> usize {
    outcomes
        .iter()
        .filter(|o| matches!(o, AssignOutcome::Assigned(_)))
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_riders_one_driver() {
    const RIDERS: usize = 16;

    let rides = Arc::new(InMemoryRideStore::new());
    let gated = Arc::new(GatedRideStore::new(
        Arc::clone(&rides) as Arc<dyn RideStore>,
        RIDERS,
    ));
    let world = World::with_ride_store(gated, Arc::clone(&rides));
    let driver = world.live_driver(tel_aviv()).await;

    let outcomes = race(&world, RIDERS).await;

    assert_eq!(assigned(&outcomes), 1);
    assert!(
        outcomes
            .iter()
            .filter(|o| !matches!(o, AssignOutcome::Assigned(_)))
            .all(|o| *o == AssignOutcome::AllCandidatesBusy)
    );
    assert_eq!(rides.open_ride_count(driver.user_id), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_riders_few_drivers() {
    let world = World::new();
    let mut drivers = Vec::new();
    for _ in 0..3 {
        drivers.push(world.live_driver(tel_aviv()).await);
    }

    let outcomes = race(&world, 12).await;

    assert_eq!(assigned(&outcomes), 3);
    for driver in &drivers {
        assert_eq!(world.rides.open_ride_count(driver.user_id), 1);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn every_driver_holds_at_most_one_open_ride(drivers in 1usize..5, riders in 1usize..10) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let world = World::new();
            let mut ids = Vec::new();
            for _ in 0..drivers {
                ids.push(world.live_driver(tel_aviv()).await.user_id);
            }

            let outcomes = race(&world, riders).await;

            prop_assert_eq!(assigned(&outcomes), drivers.min(riders));
            for id in ids {
                prop_assert!(world.rides.open_ride_count(id) <= 1);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
