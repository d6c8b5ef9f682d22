//! The per-host acquisition, fallback, and synchronization core shared
//! by the Master and Slave services.
//!
//! Transport-facing traits ([`pipeline::TcLink`], [`pipeline::DltLink`],
//! [`pipeline::StreamSourceFactory`]) are generic rather than `dyn`:
//! callers supply concrete TCP-backed implementations in production and
//! in-memory fakes in tests.

pub mod fallback;
pub mod io;
pub mod models;
pub mod net;
pub mod pipeline;
pub mod supervision;
pub mod sync_engine;
pub mod workers;
