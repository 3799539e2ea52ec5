//! Explicit run context (spec §9: "Global singletons → explicit context").
//!
//! One immutable bundle threaded through every component for the run's
//! lifetime: nothing downstream constructs its own `Store` or oracle client.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::RunConfig;
use crate::oracle::Oracle;
use crate::store::Store;

/// Abstracts `Utc::now()` so pipeline-run metadata (start/end timestamps,
/// run ids) can be reproduced in tests without real wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone)]
pub struct RunContext {
    pub store: Arc<Store>,
    pub oracle: Arc<dyn Oracle>,
    pub config: Arc<RunConfig>,
    pub clock: Arc<dyn Clock>,
}

impl RunContext {
    pub fn new(store: Arc<Store>, oracle: Arc<dyn Oracle>, config: Arc<RunConfig>) -> Self {
        RunContext {
            store,
            oracle,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
