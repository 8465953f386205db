use std::sync::Arc;

use aris_core::api::{AppConfig, InterruptCoordinator, ProcessExecutor, TurnExecutor};

use crate::backend::ClaudeFlagPlanner;

/// Everything one interactive session needs, wired from a single config.
pub struct Runtime {
    pub executor: Arc<ProcessExecutor>,
    pub coordinator: Arc<InterruptCoordinator>,
    pub turns: TurnExecutor,
    /// Flags appended to every assistant invocation.
    pub flags: Vec<String>,
}

pub fn build_executor(cfg: &AppConfig) -> Arc<ProcessExecutor> {
    Arc::new(ProcessExecutor::from_config(&cfg.executor))
}

pub fn build_coordinator(cfg: &AppConfig) -> Arc<InterruptCoordinator> {
    InterruptCoordinator::from_config(&cfg.interrupt)
}

pub fn build_flags(cfg: &AppConfig) -> Vec<String> {
    ClaudeFlagPlanner::new(cfg.assistant.clone()).plan()
}

pub fn build_runtime(cfg: &AppConfig) -> Runtime {
    let executor = build_executor(cfg);
    let coordinator = build_coordinator(cfg);
    let turns = TurnExecutor::new(executor.clone(), coordinator.clone());
    tracing::debug!(
        target: "aris.plugins",
        cli_path = %executor.cli_path(),
        "runtime built"
    );
    Runtime {
        executor,
        coordinator,
        turns,
        flags: build_flags(cfg),
    }
}
