//! The Slave's "latest dataset" (spec.md §5, §9): a mutex-protected
//! record read by the command worker and written once by the
//! acquisition worker, modelled after the receiver's `StreamCounts`
//! store.

use std::sync::{Arc, Mutex};

use sync_core::models::{ChannelRecord, PartialSample};

#[derive(Debug, Clone, Default)]
struct RetainedDataset {
    full: Option<Vec<ChannelRecord>>,
    partial: Option<Vec<ChannelRecord>>,
}

/// Cheaply cloned handle to the Slave's retained dataset.
#[derive(Clone, Default)]
pub struct Retained(Arc<Mutex<RetainedDataset>>);

impl Retained {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a freshly completed acquisition's full records, deriving
    /// the 10%-floor-10 partial sample at the same time (spec.md §4.4.4).
    pub fn store(&self, full: Vec<ChannelRecord>) {
        let partial = PartialSample::from_full(&full, 0.10).0;
        let mut inner = self.0.lock().unwrap();
        inner.full = Some(full);
        inner.partial = Some(partial);
    }

    #[must_use]
    pub fn full(&self) -> Option<Vec<ChannelRecord>> {
        self.0.lock().unwrap().full.clone()
    }

    #[must_use]
    pub fn partial(&self) -> Option<Vec<ChannelRecord>> {
        self.0.lock().unwrap().partial.clone()
    }
}
