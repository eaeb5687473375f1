use std::sync::Arc;

use crate::generator::ArtifactGenerator;
use crate::ledger::RunLedger;
use crate::store::RunStore;
use crate::tasks::TaskService;

/// Request defaults applied by the run endpoint.
#[derive(Debug, Clone)]
pub struct RunDefaults {
    pub window_size: usize,
    pub run_key: String,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            window_size: shared_types::DEFAULT_WINDOW_SIZE,
            run_key: shared_types::DEFAULT_RUN_KEY.to_string(),
        }
    }
}

pub struct AppState {
    pub ledger: RunLedger,
    pub tasks: TaskService,
    pub defaults: RunDefaults,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RunStore>,
        generator: Arc<dyn ArtifactGenerator>,
        defaults: RunDefaults,
    ) -> Self {
        Self {
            ledger: RunLedger::new(Arc::clone(&store), generator),
            tasks: TaskService::new(store),
            defaults,
        }
    }
}
