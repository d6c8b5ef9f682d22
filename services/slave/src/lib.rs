//! Slave: the side of the synchronized acquisition session that reacts
//! to the Master's trigger and serves its retained dataset on request.

pub mod config;
pub mod persist;
pub mod retained;
pub mod state_machine;
pub mod transport;

pub use state_machine::{run, SessionOutcome};
