//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable
//! Given-When-Then syntax, covering both accepted and refused actions.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use ride_dispatch_core::reducer::Reducer;
use std::fmt::Debug;

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for event assertion functions
type EventAssertion<V> = Box<dyn FnOnce(&[V])>;

/// Type alias for error assertion functions
type ErrorAssertion<X> = Box<dyn FnOnce(&X)>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use ride_dispatch_testing::ReducerTest;
///
/// ReducerTest::new(RideLifecycleReducer::new())
///     .with_env(env_at(0))
///     .given_state(offered_ride())
///     .when_action(RideAction::Accept { actor, payment_ready: true })
///     .then_state(|ride| assert_eq!(ride.status, RideStatus::Consented))
///     .then_events(|events| assert_eq!(events.len(), 1))
///     .run();
/// ```
///
/// A refused action is asserted with [`ReducerTest::then_error`]; the state
/// is then also checked to be untouched.
pub struct ReducerTest<R>
where
    R: Reducer,
{
    reducer: R,
    environment: Option<R::Environment>,
    initial_state: Option<R::State>,
    action: Option<R::Action>,
    state_assertions: Vec<StateAssertion<R::State>>,
    event_assertions: Vec<EventAssertion<R::Event>>,
    error_assertion: Option<ErrorAssertion<R::Error>>,
}

impl<R> ReducerTest<R>
where
    R: Reducer,
    R::State: Clone + PartialEq + Debug,
    R::Event: Debug,
    R::Error: Debug,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            action: None,
            state_assertions: Vec::new(),
            event_assertions: Vec::new(),
            error_assertion: None,
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: R::Environment) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: R::Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the emitted events (Then)
    #[must_use]
    pub fn then_events<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[R::Event]) + 'static,
    {
        self.event_assertions.push(Box::new(assertion));
        self
    }

    /// Expect the action to be refused, and check the refusal (Then)
    #[must_use]
    pub fn then_error<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::Error) + 'static,
    {
        self.error_assertion = Some(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set, if the
    /// outcome (accepted or refused) is not the expected one, or if any
    /// assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let action = self.action.expect("Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        let before = state.clone();
        let result = self.reducer.reduce(&mut state, action, &env);

        match (result, self.error_assertion) {
            (Ok(events), None) => {
                for assertion in self.state_assertions {
                    assertion(&state);
                }
                for assertion in self.event_assertions {
                    assertion(&events);
                }
            }
            (Err(error), Some(assertion)) => {
                assert_eq!(state, before, "a refused action must leave the state untouched");
                assertion(&error);
            }
            (Ok(events), Some(_)) => {
                panic!("Expected the action to be refused, but it produced {events:?}");
            }
            (Err(error), None) => {
                panic!("Expected the action to be accepted, but it failed with {error:?}");
            }
        }
    }
}

/// Helper assertions for events
pub mod assertions {
    /// Assert that no events were emitted (an idempotent retry)
    ///
    /// # Panics
    ///
    /// Panics if events is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_events<V: std::fmt::Debug>(events: &[V]) {
        assert!(
            events.is_empty(),
            "Expected no events, but found {}: {:?}",
            events.len(),
            events
        );
    }

    /// Assert the number of events
    ///
    /// # Panics
    ///
    /// Panics if the number of events doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_events_count<V>(events: &[V], expected: usize) {
        assert_eq!(
            events.len(),
            expected,
            "Expected {} events, but found {}",
            expected,
            events.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ride_dispatch_core::{SmallVec, smallvec};

    #[derive(Clone, Debug, PartialEq)]
    struct Seats {
        free: u32,
    }

    #[derive(Clone, Debug)]
    enum SeatAction {
        Take,
        Release,
    }

    #[derive(Debug, PartialEq)]
    enum SeatEvent {
        Taken,
        Released,
    }

    struct SeatReducer;

    impl Reducer for SeatReducer {
        type State = Seats;
        type Action = SeatAction;
        type Environment = ();
        type Event = SeatEvent;
        type Error = &'static str;

        fn reduce(
            &self,
            state: &mut Seats,
            action: SeatAction,
            _env: &(),
        ) -> Result<SmallVec<[SeatEvent; 2]>, &'static str> {
            match action {
                SeatAction::Take if state.free == 0 => Err("sold out"),
                SeatAction::Take => {
                    state.free -= 1;
                    Ok(smallvec![SeatEvent::Taken])
                }
                SeatAction::Release => {
                    state.free += 1;
                    Ok(smallvec![SeatEvent::Released])
                }
            }
        }
    }

    #[test]
    fn accepted_action_runs_state_and_event_assertions() {
        ReducerTest::new(SeatReducer)
            .with_env(())
            .given_state(Seats { free: 1 })
            .when_action(SeatAction::Take)
            .then_state(|seats| assert_eq!(seats.free, 0))
            .then_events(|events| assert_eq!(events, [SeatEvent::Taken]))
            .run();
    }

    #[test]
    fn refused_action_runs_error_assertion() {
        ReducerTest::new(SeatReducer)
            .with_env(())
            .given_state(Seats { free: 0 })
            .when_action(SeatAction::Take)
            .then_error(|error| assert_eq!(*error, "sold out"))
            .run();
    }

    #[test]
    #[should_panic(expected = "Expected the action to be refused")]
    fn accepted_action_fails_an_error_expectation() {
        ReducerTest::new(SeatReducer)
            .with_env(())
            .given_state(Seats { free: 3 })
            .when_action(SeatAction::Release)
            .then_error(|_| {})
            .run();
    }

    #[test]
    fn test_assertions_events_count() {
        assertions::assert_events_count(&[SeatEvent::Taken], 1);
        assertions::assert_no_events::<SeatEvent>(&[]);
    }
}
