use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use itertools::Itertools;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::breakpoint::VerifyPolicy;
use crate::error::{Error, Result};

/// Name of the optional per-project configuration file, looked up next to the program.
pub const CONFIG_FILE_NAME: &str = "alk.toml";
/// Environment variable that overrides the interpreter location.
pub const INTERPRETER_ENV: &str = "ALK_INTERPRETER";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PROMPT_ATTEMPTS: usize = 5;
const WINDOWS_BANNER_LINES: usize = 4;

/// How the interpreter is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Interactive debugging with the marker protocol enabled.
    Debug,
    /// Plain execution; output is streamed as-is.
    Run { exhaustive: bool },
    /// Symbol query service used by the language server.
    LanguageServer,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InitialState {
    /// Variable bindings in the order given, rendered as `name |-> value`.
    Text(#[serde(deserialize_with = "ordered_bindings")] Vec<(String, String)>),
    /// State text handed to the interpreter unchanged.
    Raw(String),
    /// A state file; relative paths resolve against the program's directory.
    File(PathBuf),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BindingValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for BindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingValue::Text(text) => f.write_str(text),
            BindingValue::Integer(value) => write!(f, "{value}"),
            BindingValue::Float(value) => write!(f, "{value}"),
            BindingValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

/// Reads a table of bindings keeping the order the entries were written in.
fn ordered_bindings<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Bindings;

    impl<'de> Visitor<'de> for Bindings {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a table of variable bindings")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut bindings = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, value)) = map.next_entry::<String, BindingValue>()? {
                bindings.push((name, value.to_string()));
            }
            Ok(bindings)
        }
    }

    deserializer.deserialize_map(Bindings)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendOptions {
    pub metadata: bool,
    pub precision: Option<u32>,
    pub symbolic_execution: bool,
    pub initial_state: Option<InitialState>,
}

impl BackendOptions {
    fn args(&self, program: &Path) -> Vec<OsString> {
        let mut args = Vec::new();

        if self.metadata {
            args.push("-m".into());
        }
        if let Some(precision) = self.precision {
            args.push("-p".into());
            args.push(precision.to_string().into());
        }
        if self.symbolic_execution {
            args.push("-s".into());
            args.push("-smt=Z3".into());
        }
        match &self.initial_state {
            Some(InitialState::Text(bindings)) if !bindings.is_empty() => {
                args.push("-i".into());
                args.push(
                    bindings
                        .iter()
                        .map(|(name, value)| format!("{name} |-> {value}"))
                        .join(" ")
                        .into(),
                );
            }
            Some(InitialState::Raw(text)) if !text.trim().is_empty() => {
                args.push("-i".into());
                args.push(text.into());
            }
            Some(InitialState::File(path)) => {
                let path = if path.is_absolute() {
                    path.clone()
                } else {
                    program.parent().unwrap_or(Path::new(".")).join(path)
                };
                args.push("-i".into());
                args.push(path.into_os_string());
            }
            _ => {}
        }

        args
    }
}

/// Program and argument vector for one interpreter process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl BackendCommand {
    /// Shell launchers are not directly executable on every system, so they run through bash.
    fn new(interpreter: &Path, args: Vec<OsString>) -> Self {
        if interpreter.extension().is_some_and(|ext| ext == "sh") {
            let mut full = vec![interpreter.as_os_str().to_os_string()];
            full.extend(args);
            Self {
                program: PathBuf::from("/bin/bash"),
                args: full,
            }
        } else {
            Self {
                program: interpreter.to_path_buf(),
                args,
            }
        }
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.to_string_lossy())
            .chain(self.args.iter().map(|arg| arg.to_string_lossy()))
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub interpreter: PathBuf,
    pub options: BackendOptions,
    /// Longest silence tolerated from the interpreter while a command is outstanding.
    pub request_timeout: Duration,
    pub max_prompt_attempts: usize,
    pub verify_policy: VerifyPolicy,
    /// Lines printed by the launcher before the interpreter starts talking.
    pub banner_lines: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            options: BackendOptions::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_prompt_attempts: DEFAULT_PROMPT_ATTEMPTS,
            verify_policy: VerifyPolicy::default(),
            banner_lines: if cfg!(windows) { WINDOWS_BANNER_LINES } else { 0 },
        }
    }
}

fn default_interpreter() -> PathBuf {
    std::env::var_os(INTERPRETER_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(if cfg!(windows) { "alki.bat" } else { "alki.sh" }))
}

/// Contents of `alk.toml`. Every key is optional and overrides the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigFile {
    pub interpreter: Option<PathBuf>,
    pub request_timeout_ms: Option<u64>,
    pub max_prompt_attempts: Option<usize>,
    pub verify_breakpoints: Option<VerifyPolicy>,
    pub banner_lines: Option<usize>,
    #[serde(default)]
    pub backend: Option<BackendOptions>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

impl RuntimeConfig {
    /// Layer `alk.toml` from the program's directory over `self`, if one exists.
    pub fn discover(self, program: &Path) -> Result<Self> {
        let candidate = program
            .parent()
            .unwrap_or(Path::new("."))
            .join(CONFIG_FILE_NAME);

        if !candidate.is_file() {
            return Ok(self);
        }

        debug!(path = %candidate.display(), "Loading configuration file");
        Ok(self.merge(ConfigFile::load(&candidate)?))
    }

    pub fn merge(mut self, file: ConfigFile) -> Self {
        if let Some(interpreter) = file.interpreter {
            self.interpreter = interpreter;
        }
        if let Some(ms) = file.request_timeout_ms {
            self.request_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = file.max_prompt_attempts {
            self.max_prompt_attempts = attempts;
        }
        if let Some(policy) = file.verify_breakpoints {
            self.verify_policy = policy;
        }
        if let Some(lines) = file.banner_lines {
            self.banner_lines = lines;
        }
        if let Some(options) = file.backend {
            self.options = options;
        }
        self
    }

    pub fn backend_command(&self, mode: LaunchMode, program: Option<&Path>) -> BackendCommand {
        let mut args: Vec<OsString> = Vec::new();

        if let Some(program) = program.filter(|_| mode != LaunchMode::LanguageServer) {
            args.push("-a".into());
            args.push(program.as_os_str().to_os_string());

            if mode == LaunchMode::Debug {
                args.push("-d".into());
                args.push("-dm".into());
            }

            args.extend(self.options.args(program));

            if let LaunchMode::Run { exhaustive: true } = mode {
                args.push("-e".into());
            }
        }

        BackendCommand::new(&self.interpreter, args)
    }
}
