// src/server/context.rs

use crate::config::Config;
use crate::core::accounting::AccountingStore;
use crate::core::rpc::ControllerHandle;
use crate::core::scheduler::SchedulerDriver;
use crate::core::select::{ConsRes, Selector, Topology3d};
use crate::core::state::ControllerState;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the controller's
/// background agents and RPC surface.
pub struct ControllerContext {
    pub config: Config,
    pub state: Arc<ControllerState>,
    pub accounting_store: Arc<dyn AccountingStore>,
    pub handle: Arc<ControllerHandle>,
    pub driver: Arc<SchedulerDriver>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    pub log_reload_handle: Arc<tracing_subscriber::reload::Handle<tracing_subscriber::EnvFilter, tracing_subscriber::Registry>>,
}

/// Builds the `Selector` named by `config.select_type` (§6.4, §12).
/// `Serial` reuses the consumable-resource algorithm: exclusive-node
/// scheduling is a sharing-policy property of the partition, not a
/// different placement algorithm.
pub fn build_selector(config: &Config) -> Arc<dyn Selector> {
    match config.select_type {
        crate::config::SelectType::ConsRes | crate::config::SelectType::Serial => Arc::new(ConsRes::default()),
        crate::config::SelectType::Topology3d => {
            let (x, y, z) = config.topology_dims;
            Arc::new(Topology3d::new(crate::core::select::topology3d::Dims { x, y, z }))
        }
    }
}
