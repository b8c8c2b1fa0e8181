#![allow(dead_code)]

use std::{path::Path, time::Duration};

use scratchpad::{config::SandboxConfig, Orchestrator, Sandbox};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

pub fn config_in(session_dir: &Path) -> SandboxConfig {
    let mut config = SandboxConfig::default();
    config.session.session_dir = session_dir.to_path_buf();
    config
}

pub fn short_timeout_config(millis: u64) -> SandboxConfig {
    let mut config = SandboxConfig::default();
    config.security.max_execution_time = Duration::from_millis(millis);
    config
}

pub fn orchestrator() -> Orchestrator {
    Orchestrator::new(SandboxConfig::default()).unwrap()
}

pub fn sandbox_in(session_dir: &Path) -> Sandbox {
    Sandbox::new(config_in(session_dir)).unwrap()
}
