//! Master: the side of the synchronized acquisition session that owns
//! timing (triggers the run, waits for the Slave's files, runs the
//! synchronization engine).

pub mod config;
pub mod file_receiver;
pub mod persist;
pub mod state_machine;
pub mod transport;

pub use state_machine::{run, SessionOutcome};
