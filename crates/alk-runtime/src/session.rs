//! Debugging operations over one interpreter at a time.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::breakpoint::{
    Breakpoint, BreakpointRegistry, CLEAR_COMMAND, Verification, VerifyPolicy, break_command,
};
use crate::checkpoint::{CheckpointNavigator, Navigation};
use crate::config::{LaunchMode, RuntimeConfig};
use crate::dispatcher::{Dispatcher, DispatcherOptions, Transport};
use crate::error::{DispatchError, Error, Result};
use crate::event::{
    CURRENT_LINE, DebugEvent, EventReceiver, EventSender, ExecutionCommand, execution_events,
};
use crate::frontend::Frontend;
use crate::supervisor;

const BACKTRACE_COMMAND: &str = "backtrace";
const FRAME_SEPARATOR: &str = " at line ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub index: usize,
    pub name: String,
    /// One-based source line.
    pub line: usize,
}

/// Reads a `backtrace` answer; lines that are not frames are skipped.
pub fn parse_backtrace(lines: &[String]) -> Vec<StackFrame> {
    lines
        .iter()
        .filter_map(|line| {
            let (name, rest) = line.split_once(FRAME_SEPARATOR)?;
            let digits: String = rest
                .trim_start()
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            Some((name.trim().to_string(), digits.parse().ok()?))
        })
        .enumerate()
        .map(|(index, (name, line))| StackFrame { index, name, line })
        .collect()
}

/// Canonical form used to key breakpoints, falling back to the path as given.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[derive(Clone)]
struct Attached {
    dispatcher: Dispatcher,
    program: PathBuf,
}

pub struct DebugSession {
    config: Mutex<RuntimeConfig>,
    frontend: Arc<dyn Frontend>,
    events: EventSender,
    breakpoints: Mutex<BreakpointRegistry>,
    attached: Mutex<Option<Attached>>,
    /// Held for the whole of every operation that talks to the interpreter.
    dispatch: tokio::sync::Mutex<()>,
}

impl DebugSession {
    pub fn new(config: RuntimeConfig, frontend: Arc<dyn Frontend>) -> (Self, EventReceiver) {
        let (events, receiver) = EventSender::channel();
        (
            Self {
                config: Mutex::new(config),
                frontend,
                events,
                breakpoints: Mutex::new(BreakpointRegistry::default()),
                attached: Mutex::new(None),
                dispatch: tokio::sync::Mutex::new(()),
            },
            receiver,
        )
    }

    pub fn config(&self) -> RuntimeConfig {
        self.config.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Applies to the next launch.
    pub fn set_config(&self, config: RuntimeConfig) {
        if let Ok(mut current) = self.config.lock() {
            *current = config;
        }
    }

    pub fn program(&self) -> Option<PathBuf> {
        self.attached().map(|attached| attached.program)
    }

    pub fn is_running(&self) -> bool {
        self.attached()
            .is_some_and(|attached| attached.dispatcher.is_alive())
    }

    fn attached(&self) -> Option<Attached> {
        self.attached.lock().ok().and_then(|attached| attached.clone())
    }

    fn dispatcher(&self) -> std::result::Result<Dispatcher, DispatchError> {
        self.attached()
            .map(|attached| attached.dispatcher)
            .ok_or(DispatchError::NotAttached)
    }

    fn replace_attached(&self, next: Option<Attached>) {
        let previous = match self.attached.lock() {
            Ok(mut attached) => std::mem::replace(&mut *attached, next),
            Err(_) => None,
        };
        if let Some(previous) = previous {
            previous.dispatcher.detach();
        }
    }

    /// Starts the interpreter on `program` in debug mode.
    pub async fn launch(&self, program: &Path) -> Result<()> {
        let config = self.config();
        let command = config.backend_command(LaunchMode::Debug, Some(program));

        let (transport, stderr) = match supervisor::spawn(&command) {
            Ok(spawned) => spawned,
            Err(e) => {
                error!(error = %e, "Failed to launch");
                self.events.send(DebugEvent::Terminated);
                return Err(e);
            }
        };
        if let Some(stderr) = stderr {
            supervisor::forward_stderr(stderr, self.events.clone());
        }

        self.attach(program, transport).await.map(|_| ())
    }

    /// Starts a session over an already running interpreter.
    pub async fn attach<R, W>(
        &self,
        program: &Path,
        transport: Transport<R, W>,
    ) -> Result<JoinHandle<()>>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let _guard = self.dispatch.lock().await;
        let program = normalize_path(program);
        let options = DispatcherOptions::from(&self.config());

        let (dispatcher, handle) =
            Dispatcher::spawn(transport, options, self.frontend.clone(), self.events.clone());
        self.replace_attached(Some(Attached {
            dispatcher: dispatcher.clone(),
            program: program.clone(),
        }));
        info!(program = %program.display(), "Debug session started");

        self.resync_breakpoints(&dispatcher, &program).await?;
        self.events.send(DebugEvent::SessionStarted);
        Ok(handle)
    }

    async fn resync_breakpoints(&self, dispatcher: &Dispatcher, program: &Path) -> Result<()> {
        let breakpoints = self.registry(|registry| registry.breakpoints(program));
        let policy = self.config().verify_policy;

        for breakpoint in breakpoints {
            let block = dispatcher.issue(&break_command(breakpoint.line)).await?;
            if policy == VerifyPolicy::BackendResponse {
                self.record(program, breakpoint.id, Verification::from_response(&block));
            }
        }
        Ok(())
    }

    /// Restarts the current program, keeping its breakpoints.
    pub async fn restart(&self) -> Result<()> {
        let program = self.program().ok_or(Error::NoProgram)?;
        self.launch(&program).await
    }

    pub async fn execute(&self, command: ExecutionCommand) -> Result<()> {
        let dispatcher = self.dispatcher()?;
        let _guard = self.dispatch.lock().await;

        let block = dispatcher.issue(command.as_str()).await?;
        for event in execution_events(command, &block) {
            self.events.send(event);
        }
        Ok(())
    }

    pub async fn next(&self) -> Result<()> {
        self.execute(ExecutionCommand::Next).await
    }

    pub async fn step_in(&self) -> Result<()> {
        self.execute(ExecutionCommand::StepIn).await
    }

    pub async fn step_out(&self) -> Result<()> {
        self.execute(ExecutionCommand::StepOut).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.execute(ExecutionCommand::Continue).await
    }

    /// Goes back to a checkpoint chosen by the user.
    pub async fn step_back(&self) -> Result<Navigation> {
        let dispatcher = self.dispatcher()?;
        let _guard = self.dispatch.lock().await;

        let navigation = CheckpointNavigator::new(
            &dispatcher,
            self.frontend.as_ref(),
            self.config().max_prompt_attempts,
        )
        .step_back()
        .await?;

        self.events.send(DebugEvent::Step);
        Ok(navigation)
    }

    pub async fn stack_trace(&self) -> Result<Vec<StackFrame>> {
        let dispatcher = self.dispatcher()?;
        let _guard = self.dispatch.lock().await;

        let block = dispatcher.issue(BACKTRACE_COMMAND).await?;
        Ok(parse_backtrace(&block.lines))
    }

    /// Value printed by the interpreter for `expression`, if it printed one.
    pub async fn evaluate(&self, expression: &str) -> Result<Option<String>> {
        let dispatcher = self.dispatcher()?;
        let _guard = self.dispatch.lock().await;

        let block = dispatcher
            .issue(&format!("print {}", expression.trim()))
            .await?;
        Ok(block
            .lines
            .into_iter()
            .find(|line| !line.contains(CURRENT_LINE)))
    }

    /// Records a breakpoint and, when `file` is being debugged, sends it to the interpreter.
    pub async fn set_breakpoint(&self, file: &Path, line: usize) -> Result<Breakpoint> {
        let file = normalize_path(file);
        let policy = self.config().verify_policy;
        let mut breakpoint = self.registry(|registry| registry.allocate(&file, line));

        let target = self
            .attached()
            .filter(|attached| attached.program == file && attached.dispatcher.is_alive())
            .map(|attached| attached.dispatcher);

        let verification = match (policy, target) {
            (VerifyPolicy::Optimistic, target) => {
                self.record(&file, breakpoint.id, Verification::Verified);
                if let Some(dispatcher) = target {
                    let _guard = self.dispatch.lock().await;
                    dispatcher.issue(&break_command(line)).await?;
                }
                return Ok(Breakpoint {
                    verification: Verification::Verified,
                    ..breakpoint
                });
            }
            (VerifyPolicy::BackendResponse, Some(dispatcher)) => {
                let _guard = self.dispatch.lock().await;
                let block = dispatcher.issue(&break_command(line)).await?;
                Verification::from_response(&block)
            }
            (VerifyPolicy::BackendResponse, None) => Verification::Pending,
        };

        breakpoint.verification = verification;
        self.record(&file, breakpoint.id, verification);
        Ok(breakpoint)
    }

    /// Removes every breakpoint from the interpreter. The registry is left untouched.
    pub async fn clear_breakpoints(&self) -> Result<()> {
        let Ok(dispatcher) = self.dispatcher() else {
            return Ok(());
        };
        let _guard = self.dispatch.lock().await;
        dispatcher.issue(CLEAR_COMMAND).await?;
        Ok(())
    }

    /// Replaces the whole breakpoint set of `file`, as front ends send it.
    pub async fn replace_breakpoints(&self, file: &Path, lines: &[usize]) -> Result<Vec<Breakpoint>> {
        let normalized = normalize_path(file);
        let removed = self.registry(|registry| registry.remove_file(&normalized));
        debug!(file = %normalized.display(), removed = removed.len(), "Replacing breakpoints");

        if self.program().as_deref() == Some(normalized.as_path()) {
            self.clear_breakpoints().await?;
        }

        let mut breakpoints = Vec::with_capacity(lines.len());
        for &line in lines {
            breakpoints.push(self.set_breakpoint(&normalized, line).await?);
        }
        Ok(breakpoints)
    }

    pub fn breakpoints(&self, file: &Path) -> Vec<Breakpoint> {
        self.registry(|registry| registry.breakpoints(&normalize_path(file)))
    }

    /// Stops the interpreter. Pending operations fail with [`DispatchError::Terminated`].
    pub fn terminate(&self) {
        if let Some(attached) = self.attached() {
            info!(program = %attached.program.display(), "Terminating debug session");
            attached.dispatcher.terminate();
        }
    }

    fn registry<T>(&self, f: impl FnOnce(&mut BreakpointRegistry) -> T) -> T {
        match self.breakpoints.lock() {
            Ok(mut registry) => f(&mut registry),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn record(&self, file: &Path, id: u64, verification: Verification) {
        if let Some(changed) = self.registry(|registry| registry.update(file, id, verification)) {
            self.events.send(DebugEvent::BreakpointChanged(changed));
        }
    }
}

/// Runs `program` to completion without the debugging protocol.
pub fn spawn_run(
    config: &RuntimeConfig,
    program: &Path,
    exhaustive: bool,
    frontend: Arc<dyn Frontend>,
) -> Result<(Dispatcher, JoinHandle<()>, EventReceiver)> {
    let (events, receiver) = EventSender::channel();
    let command = config.backend_command(LaunchMode::Run { exhaustive }, Some(program));
    let (dispatcher, handle) =
        supervisor::start(&command, DispatcherOptions::from(config), frontend, events)?;
    Ok((dispatcher, handle, receiver))
}
