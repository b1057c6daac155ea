use std::path::PathBuf;
use std::time::Duration;

use alk_runtime::{InitialState, RuntimeConfig, VerifyPolicy};
use serde::Deserialize;

/// Launch (and attach) configuration sent by the client.
///
/// Everything except `mainFile` overrides `alk.toml` and the defaults only when present.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArgs {
    pub main_file: PathBuf,
    pub interpreter: Option<PathBuf>,
    pub metadata: Option<bool>,
    pub precision: Option<u32>,
    pub symbolic_execution: Option<bool>,
    pub initial_state: Option<InitialState>,
    pub request_timeout_ms: Option<u64>,
    pub verify_breakpoints: Option<VerifyPolicy>,
}

impl LaunchArgs {
    pub fn apply(&self, mut config: RuntimeConfig) -> RuntimeConfig {
        if let Some(interpreter) = &self.interpreter {
            config.interpreter = interpreter.clone();
        }
        if let Some(metadata) = self.metadata {
            config.options.metadata = metadata;
        }
        if self.precision.is_some() {
            config.options.precision = self.precision;
        }
        if let Some(symbolic) = self.symbolic_execution {
            config.options.symbolic_execution = symbolic;
        }
        if self.initial_state.is_some() {
            config.options.initial_state = self.initial_state.clone();
        }
        if let Some(ms) = self.request_timeout_ms {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(policy) = self.verify_breakpoints {
            config.verify_policy = policy;
        }
        config
    }
}
