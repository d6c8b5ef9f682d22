//! Shared test fakes for the acquisition/synchronization suite: a
//! scripted Time Controller, a scripted DLT, peer-link socket helpers,
//! and synthetic channel data generators.

pub mod fake_dlt;
pub mod fake_peer;
pub mod fake_tc;
mod line_server;
pub mod synthetic;

pub use fake_dlt::FakeDltBehavior;
pub use line_server::FakeLineServer;
