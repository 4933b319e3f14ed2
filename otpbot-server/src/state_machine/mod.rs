//! Explicit state machine for the phone verification lifecycle.
//!
//! This module implements a pure functional state machine for managing
//! subscriber verification. The design separates:
//! - **State**: What the system knows (`SubscriberState`)
//! - **Events**: What happened (`Event`)
//! - **Effects**: What to do (`Effect`)
//! - **Transition**: Pure function `(State, Event, Policy) -> (State, Vec<Effect>)`
//!
//! The interpreter executes effects against real APIs and returns result
//! events, and the store runs the loop while keeping state durable.

pub mod effect;
pub mod event;
pub mod interpreter;
pub mod policy;
pub mod repository;
pub mod state;
pub mod store;
pub mod transition;

pub use effect::*;
pub use event::*;
pub use interpreter::*;
pub use policy::*;
pub use repository::*;
pub use state::*;
pub use store::*;
pub use transition::*;
