//! Runmode registry and entry points
//!
//! The host selects one of three named runmodes (`single`, `autofp`,
//! `workers`). Each entry point reads `ipc.server` from the configuration,
//! builds the shared acquisition configuration, performs idempotent engine
//! initialization, and stands up the thread graph. All failures here are
//! fatal to startup; the engine never processes traffic with a partially
//! valid configuration.

pub mod builder;
pub mod topology;

pub use builder::{ThreadGraph, ThreadGraphBuilder};
pub use topology::{ThreadRole, Topology};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

use once_cell::sync::Lazy;
use tracing::{debug, info};

use crate::acquisition::server_list::parse_server_list;
use crate::acquisition::shared::AcquisitionConfig;
use crate::acquisition::transport::CaptureTransport;
use crate::config::Config;
use crate::errors::{ConfigError, RuntimeError};

/// One registry row per runmode
#[derive(Debug, Clone, Copy)]
pub struct RunModeInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub topology: Topology,
}

static REGISTRY: Lazy<Vec<RunModeInfo>> = Lazy::new(|| {
    [Topology::Single, Topology::AutoFp, Topology::Workers]
        .into_iter()
        .map(|topology| RunModeInfo {
            name: topology.name(),
            description: topology.description(),
            topology,
        })
        .collect()
});

/// Registered runmodes, in registration order
pub fn registered_runmodes() -> &'static [RunModeInfo] {
    &REGISTRY
}

/// Default mode used when the host requests none
pub fn default_mode() -> Topology {
    Topology::DEFAULT
}

static ENGINE_INIT: Once = Once::new();
static LIVE_TIME_MODE: AtomicBool = AtomicBool::new(false);

/// Idempotent engine-runtime initialization. Entry points may call this
/// more than once on one startup path; repeat calls are harmless no-ops.
fn initialize_engine() {
    ENGINE_INIT.call_once(|| {
        debug!("engine runtime initialized");
    });
}

/// Switch packet timestamping to live mode. Idempotent.
fn set_live_time_mode() {
    if !LIVE_TIME_MODE.swap(true, Ordering::AcqRel) {
        debug!("time mode set to live");
    }
}

/// Whether the engine timestamps packets against the live clock
pub fn is_live_time_mode() -> bool {
    LIVE_TIME_MODE.load(Ordering::Acquire)
}

/// Bound host configuration plus transport: the runmode entry surface
pub struct Runmode {
    config: Config,
    transport: Arc<dyn CaptureTransport>,
}

impl Runmode {
    pub fn new(config: Config, transport: Arc<dyn CaptureTransport>) -> Self {
        Self { config, transport }
    }

    /// Single threaded ipc mode
    pub fn run_single(&self) -> Result<ThreadGraph, RuntimeError> {
        self.run(Topology::Single)
    }

    /// Multi threaded ipc mode with flow-pinned detection
    pub fn run_autofp(&self) -> Result<ThreadGraph, RuntimeError> {
        self.run(Topology::AutoFp)
    }

    /// Workers mode, each thread does all tasks from acquisition to logging
    pub fn run_workers(&self) -> Result<ThreadGraph, RuntimeError> {
        self.run(Topology::Workers)
    }

    /// Start the requested topology
    pub fn run(&self, topology: Topology) -> Result<ThreadGraph, RuntimeError> {
        let raw = self
            .config
            .ipc
            .server
            .as_deref()
            .ok_or(ConfigError::MissingKey("ipc.server"))?;
        info!(servers = raw, "ipc acquisition using servers");

        let servers = parse_server_list(raw)?;
        let acquisition = AcquisitionConfig::new(servers, self.config.ipc.allocation_batch)?;

        initialize_engine();
        set_live_time_mode();

        let graph = ThreadGraphBuilder::new(topology, Arc::clone(&self.transport))
            .detect_threads(self.config.runmode.detect_threads)
            .queue_depth(self.config.runmode.queue_depth)
            .build(acquisition)?;

        info!(mode = %topology, "runmode initialised");
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::transport::ScriptedTransport;

    fn config_with_servers(servers: Option<&str>) -> Config {
        let mut config = Config::default();
        config.ipc.server = servers.map(str::to_owned);
        config
    }

    #[test]
    fn test_registry_lists_three_modes_with_descriptions() {
        let modes = registered_runmodes();
        assert_eq!(modes.len(), 3);
        let names: Vec<_> = modes.iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["single", "autofp", "workers"]);
        assert!(modes.iter().all(|m| !m.description.is_empty()));
    }

    #[test]
    fn test_default_mode_is_autofp() {
        assert_eq!(default_mode(), Topology::AutoFp);
    }

    #[test]
    fn test_missing_server_key_is_fatal() {
        let runmode = Runmode::new(
            config_with_servers(None),
            Arc::new(ScriptedTransport::new()),
        );
        let err = runmode.run_workers().unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Config(ConfigError::MissingKey("ipc.server"))
        ));
    }

    #[test]
    fn test_blank_server_list_is_fatal() {
        let runmode = Runmode::new(
            config_with_servers(Some(" , ,")),
            Arc::new(ScriptedTransport::new()),
        );
        let err = runmode.run_workers().unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Config(ConfigError::EmptyServerList)
        ));
    }

    #[test]
    fn test_initialization_is_idempotent() {
        initialize_engine();
        initialize_engine();
        set_live_time_mode();
        set_live_time_mode();
        assert!(is_live_time_mode());
    }

    #[test]
    fn test_run_starts_and_stops_graph() {
        let mut config = config_with_servers(Some("s1,s2"));
        config.runmode.detect_threads = Some(1);
        let transport = Arc::new(
            ScriptedTransport::new()
                .script("s1", vec![])
                .script("s2", vec![]),
        );
        let runmode = Runmode::new(config, transport);

        let graph = runmode.run_workers().unwrap();
        assert_eq!(graph.topology(), Topology::Workers);
        assert_eq!(graph.acquisition().thread_count(), 2);
        let snapshot = graph.stop().unwrap();
        assert_eq!(snapshot.workers_started, 2);
        assert_eq!(snapshot.workers_finished, 2);
    }
}
