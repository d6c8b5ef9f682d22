//! SCPI command encoding for the Time Controller, and the DLT's JSON
//! command/reply protocol.
//!
//! Extracted for shared use across the Master and Slave acquisition
//! pipelines: both peers configure their own TC and talk to their own
//! co-located DLT the same way.

pub mod dlt;
pub mod scpi;

pub use dlt::DltError;
pub use scpi::TcError;
