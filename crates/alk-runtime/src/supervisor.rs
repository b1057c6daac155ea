use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::BackendCommand;
use crate::dispatcher::{Dispatcher, DispatcherOptions, Transport};
use crate::error::{Error, Result};
use crate::event::{EventSender, OutputCategory};
use crate::frontend::Frontend;

/// Spawns the interpreter with piped stdio. The process is killed when its handle is dropped.
pub fn spawn(
    command: &BackendCommand,
) -> Result<(Transport<ChildStdout, ChildStdin>, Option<ChildStderr>)> {
    info!(command = %command.display(), "Starting interpreter");

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| Error::Spawn {
            program: command.program.clone(),
            source,
        })?;

    let missing = |stream: &str| Error::Spawn {
        program: command.program.clone(),
        source: std::io::Error::other(format!("{stream} is not piped")),
    };
    let writer = child.stdin.take().ok_or_else(|| missing("stdin"))?;
    let reader = child.stdout.take().ok_or_else(|| missing("stdout"))?;
    let stderr = child.stderr.take();

    debug!(pid = child.id(), "Interpreter started");

    Ok((
        Transport {
            reader,
            writer,
            child: Some(child),
        },
        stderr,
    ))
}

/// Forwards interpreter diagnostics chunk by chunk.
pub fn forward_stderr(mut stderr: ChildStderr, events: EventSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            match stderr.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => events.output(
                    OutputCategory::Stderr,
                    String::from_utf8_lossy(&buf[..n]).into_owned(),
                ),
                Err(e) => {
                    debug!(error = %e, "Interpreter stderr closed");
                    break;
                }
            }
        }
    })
}

/// Spawns the interpreter and attaches a dispatcher to it.
pub fn start(
    command: &BackendCommand,
    options: DispatcherOptions,
    frontend: Arc<dyn Frontend>,
    events: EventSender,
) -> Result<(Dispatcher, JoinHandle<()>)> {
    let (transport, stderr) = spawn(command)?;

    if let Some(stderr) = stderr {
        forward_stderr(stderr, events.clone());
    }

    Ok(Dispatcher::spawn(transport, options, frontend, events))
}
