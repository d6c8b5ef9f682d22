//! Workspace root: houses the cross-service integration test suites
//! under `tests/integration/`. The actual Master and Slave binaries
//! live in `services/master` and `services/slave`; this crate has no
//! runtime code of its own.
