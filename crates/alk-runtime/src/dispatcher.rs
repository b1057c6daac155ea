//! The stream-owning actor.
//!
//! One task owns the interpreter's stdin and stdout. It writes commands, feeds
//! every output line through the [`Demultiplexer`], queues completed blocks by
//! name and answers choice prompts, so commands are serialized by construction.
//! [`Dispatcher`] is the cloneable handle used to talk to it.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::demux::{Demultiplexer, Frame, OutputBlock};
use crate::error::DispatchError;
use crate::event::{DebugEvent, EventSender, OutputCategory};
use crate::frontend::Frontend;
use crate::prompt::{ChoicePrompt, PromptResolver};

const EXIT_GRACE: Duration = Duration::from_secs(2);
/// Unclaimed blocks kept per name; older ones are dropped first.
pub const MAX_QUEUED_BLOCKS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherOptions {
    pub request_timeout: Duration,
    pub max_prompt_attempts: usize,
    pub banner_lines: usize,
}

impl From<&RuntimeConfig> for DispatcherOptions {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            request_timeout: config.request_timeout,
            max_prompt_attempts: config.max_prompt_attempts,
            banner_lines: config.banner_lines,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Stop the interpreter and report the session as terminated.
    Terminate,
    /// Stop the interpreter quietly; another one is taking its place.
    Detach,
}

/// The byte streams of one interpreter, plus its process when there is one.
pub struct Transport<R, W> {
    pub reader: R,
    pub writer: W,
    pub child: Option<Child>,
}

enum Request {
    Issue {
        command: String,
        payload: Option<String>,
        reply: oneshot::Sender<Result<OutputBlock, DispatchError>>,
    },
    Write {
        text: String,
        reply: oneshot::Sender<Result<(), DispatchError>>,
    },
}

impl Request {
    fn fail(self, error: DispatchError) {
        match self {
            Request::Issue { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Request::Write { reply, .. } => {
                let _ = reply.send(Err(error));
            }
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    requests: mpsc::UnboundedSender<Request>,
    shutdown: Arc<watch::Sender<Option<Shutdown>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl Dispatcher {
    /// Starts the actor for `transport`. Must be called within a tokio runtime.
    pub fn spawn<R, W>(
        transport: Transport<R, W>,
        options: DispatcherOptions,
        frontend: Arc<dyn Frontend>,
        events: EventSender,
    ) -> (Self, JoinHandle<()>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(None);

        let actor = Actor {
            lines: LineReader::new(transport.reader),
            writer: transport.writer,
            child: transport.child,
            demux: Demultiplexer::new(options.banner_lines),
            queues: HashMap::new(),
            stale: HashMap::new(),
            requests: requests_rx,
            shutdown: shutdown_rx,
            resolver: PromptResolver::new(frontend, options.max_prompt_attempts),
            events,
            request_timeout: options.request_timeout,
        };
        let handle = tokio::spawn(actor.run());

        (
            Self {
                requests: requests_tx,
                shutdown: Arc::new(shutdown_tx),
            },
            handle,
        )
    }

    /// Sends `command` and waits for the block carrying its name.
    pub async fn issue(&self, command: &str) -> Result<OutputBlock, DispatchError> {
        self.send_issue(command, None).await
    }

    /// Like [`Dispatcher::issue`], with `payload` written right after the command line.
    pub async fn issue_with_payload(
        &self,
        command: &str,
        payload: impl Into<String>,
    ) -> Result<OutputBlock, DispatchError> {
        self.send_issue(command, Some(payload.into())).await
    }

    async fn send_issue(
        &self,
        command: &str,
        payload: Option<String>,
    ) -> Result<OutputBlock, DispatchError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Issue {
                command: command.to_string(),
                payload,
                reply,
            })
            .map_err(|_| DispatchError::Terminated)?;
        response.await.unwrap_or(Err(DispatchError::Terminated))
    }

    /// Writes a line that gets no response block.
    pub async fn write_raw(&self, text: &str) -> Result<(), DispatchError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Write {
                text: text.to_string(),
                reply,
            })
            .map_err(|_| DispatchError::Terminated)?;
        response.await.unwrap_or(Err(DispatchError::Terminated))
    }

    /// Kills the interpreter and fails every pending call.
    pub fn terminate(&self) {
        self.stop(Shutdown::Terminate);
    }

    /// Kills the interpreter without emitting a terminated event.
    pub fn detach(&self) {
        self.stop(Shutdown::Detach);
    }

    fn stop(&self, kind: Shutdown) {
        self.shutdown.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(kind);
                true
            } else {
                false
            }
        });
    }

    pub fn is_alive(&self) -> bool {
        !self.requests.is_closed()
    }
}

/// Line assembly that survives being cancelled mid-line.
struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::new(),
        }
    }

    async fn next_line(&mut self) -> io::Result<Option<String>> {
        let read = self.inner.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Ok(Some(line))
    }
}

struct Actor<R, W> {
    lines: LineReader<R>,
    writer: W,
    child: Option<Child>,
    demux: Demultiplexer,
    queues: HashMap<String, VecDeque<OutputBlock>>,
    /// Blocks still owed for calls that timed out, by command.
    stale: HashMap<String, usize>,
    requests: mpsc::UnboundedReceiver<Request>,
    shutdown: watch::Receiver<Option<Shutdown>>,
    resolver: PromptResolver,
    events: EventSender,
    request_timeout: Duration,
}

/// First word of a command, the name some interpreters put on its block.
fn command_word(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or(command)
}

impl<R, W> Actor<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn run(mut self) {
        let reason = self.serve().await;
        self.finish(reason).await;
    }

    async fn serve(&mut self) -> DispatchError {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => return DispatchError::Terminated,
                request = self.requests.recv() => {
                    let Some(request) = request else {
                        return DispatchError::Terminated;
                    };
                    if let Err(e) = self.handle(request).await {
                        return e;
                    }
                }
                line = self.lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Err(e) = self.on_line(&line).await {
                            return e;
                        }
                    }
                    Ok(None) => {
                        info!("Interpreter closed its output");
                        return DispatchError::Terminated;
                    }
                    Err(e) => return e.into(),
                },
            }
        }
    }

    /// Returns an error only when the stream can no longer be used.
    async fn handle(&mut self, request: Request) -> Result<(), DispatchError> {
        let fatal = match request {
            Request::Issue {
                command,
                payload,
                reply,
            } => {
                let result = self.issue(&command, payload.as_deref()).await;
                let fatal = result.as_ref().err().filter(|e| e.is_fatal()).cloned();
                let _ = reply.send(result);
                fatal
            }
            Request::Write { text, reply } => {
                let result = self.write_line(&text).await;
                let fatal = result.as_ref().err().filter(|e| e.is_fatal()).cloned();
                let _ = reply.send(result);
                fatal
            }
        };

        fatal.map_or(Ok(()), Err)
    }

    async fn issue(
        &mut self,
        command: &str,
        payload: Option<&str>,
    ) -> Result<OutputBlock, DispatchError> {
        let key = command.trim().to_string();
        debug!(command = %key, "Issuing command");

        self.write_line(&key).await?;
        if let Some(payload) = payload {
            self.write_text(payload).await?;
        }

        let mut deadline = Instant::now() + self.request_timeout;
        loop {
            if let Some(block) = self.take_block(&key) {
                return Ok(block);
            }

            let line = tokio::select! {
                biased;
                _ = self.shutdown.changed() => return Err(DispatchError::Terminated),
                line = self.lines.next_line() => line?,
                _ = sleep_until(deadline) => {
                    warn!(command = %key, timeout = ?self.request_timeout, "Interpreter did not answer");
                    *self.stale.entry(key.clone()).or_default() += 1;
                    return Err(DispatchError::Unresponsive {
                        command: key,
                        timeout: self.request_timeout,
                    });
                }
            };

            let Some(line) = line else {
                info!(command = %key, "Interpreter closed its output while a command was pending");
                return Err(DispatchError::Terminated);
            };
            self.on_line(&line).await?;
            deadline = Instant::now() + self.request_timeout;
        }
    }

    fn take_block(&mut self, key: &str) -> Option<OutputBlock> {
        [key, command_word(key)]
            .into_iter()
            .find_map(|name| self.queues.get_mut(name).and_then(VecDeque::pop_front))
    }

    async fn on_line(&mut self, line: &str) -> Result<(), DispatchError> {
        for frame in self.demux.push_line(line) {
            match frame {
                Frame::Block(block) => self.enqueue(block),
                Frame::Prompt(prompt) => self.resolve_prompt(prompt).await?,
                Frame::Highlight(line) => self.resolver.frontend().highlight(&[line], line),
                Frame::Output(text) => self.events.output(OutputCategory::Stdout, text),
                Frame::Framing(error) => warn!(%error, "Resynchronizing interpreter output"),
            }
        }
        Ok(())
    }

    fn enqueue(&mut self, block: OutputBlock) {
        let owed = self
            .stale
            .iter_mut()
            .find(|(command, count)| {
                **count > 0 && (command.as_str() == block.name || command_word(command) == block.name)
            })
            .map(|(_, count)| count);

        if let Some(count) = owed {
            *count -= 1;
            debug!(command = %block.name, "Discarding late response");
            return;
        }

        debug!(command = %block.name, lines = block.lines.len(), "Response complete");
        let queue = self.queues.entry(block.name.clone()).or_default();
        while queue.len() >= MAX_QUEUED_BLOCKS {
            let Some(dropped) = queue.pop_front() else {
                break;
            };
            warn!(command = %dropped.name, lines = dropped.lines.len(), "Dropping unclaimed response");
        }
        queue.push_back(block);
    }

    async fn resolve_prompt(&mut self, prompt: ChoicePrompt) -> Result<(), DispatchError> {
        info!(options = prompt.options.len(), "Waiting for a choice");

        let resolver = self.resolver.clone();
        let resolution = tokio::select! {
            biased;
            _ = self.shutdown.changed() => return Err(DispatchError::Terminated),
            resolution = resolver.resolve(&prompt) => resolution,
        };

        match resolution.reply() {
            Some(reply) => self.write_line(reply).await,
            None => {
                warn!(title = %prompt.title, "Choice abandoned");
                Err(DispatchError::PromptAbandoned)
            }
        }
    }

    async fn write_line(&mut self, text: &str) -> Result<(), DispatchError> {
        if text.ends_with('\n') {
            self.write_text(text).await
        } else {
            self.write_text(&format!("{text}\n")).await
        }
    }

    async fn write_text(&mut self, text: &str) -> Result<(), DispatchError> {
        debug!(text = %text.trim_end(), "Writing to interpreter");

        let writer = &mut self.writer;
        let write = async {
            writer.write_all(text.as_bytes()).await?;
            writer.flush().await
        };

        tokio::select! {
            biased;
            _ = self.shutdown.changed() => Err(DispatchError::Terminated),
            result = write => result.map_err(DispatchError::from),
        }
    }

    async fn finish(mut self, reason: DispatchError) {
        info!(%reason, "Stopping interpreter session");

        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            request.fail(reason.clone());
        }

        if let Some(error) = self.demux.finish() {
            warn!(%error, "Interpreter output ended mid-block");
        }

        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "Interpreter already gone");
            }
            match timeout(EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => info!(%status, "Interpreter exited"),
                Ok(Err(e)) => warn!(error = %e, "Failed to reap interpreter"),
                Err(_) => warn!("Interpreter did not exit after being killed"),
            }
        }

        let detached = matches!(*self.shutdown.borrow(), Some(Shutdown::Detach));
        if !detached {
            self.events.send(DebugEvent::Terminated);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use tokio::io::{DuplexStream, Lines, ReadHalf, WriteHalf};

    use super::*;
    use crate::event::EventReceiver;

    pub const STEP: Duration = Duration::from_secs(5);

    /// The far end of a dispatcher, scripted by the test.
    pub struct FakeInterpreter {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl FakeInterpreter {
        pub fn new(stream: DuplexStream) -> Self {
            let (reader, writer) = tokio::io::split(stream);
            Self {
                lines: BufReader::new(reader).lines(),
                writer,
            }
        }

        pub async fn read_line(&mut self) -> String {
            timeout(STEP, self.lines.next_line())
                .await
                .expect("no command written in time")
                .unwrap()
                .expect("dispatcher closed its input")
        }

        /// Asserts nothing is written for a short while.
        pub async fn expect_silence(&mut self) {
            let next = timeout(Duration::from_millis(100), self.lines.next_line()).await;
            assert!(
                !matches!(next, Ok(Ok(Some(_)))),
                "unexpected write: {next:?}"
            );
        }

        pub async fn send(&mut self, lines: &[&str]) {
            for line in lines {
                self.writer.write_all(line.as_bytes()).await.unwrap();
                self.writer.write_all(b"\n").await.unwrap();
            }
            self.writer.flush().await.unwrap();
        }

        pub async fn respond(&mut self, name: &str, lines: &[&str]) {
            let begin = format!("--- begin <{name}> ---");
            let end = format!("--- end <{name}> ---");
            let mut all = vec![begin.as_str()];
            all.extend_from_slice(lines);
            all.push(end.as_str());
            self.send(&all).await;
        }

        /// Simulates the interpreter exiting.
        pub fn close(self) {}
    }

    pub fn options(request_timeout: Duration) -> DispatcherOptions {
        DispatcherOptions {
            request_timeout,
            max_prompt_attempts: 3,
            banner_lines: 0,
        }
    }

    pub fn connect_with(
        frontend: Arc<dyn Frontend>,
        options: DispatcherOptions,
    ) -> (Dispatcher, JoinHandle<()>, EventReceiver, FakeInterpreter) {
        let (near, far) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(near);
        let (events, receiver) = EventSender::channel();

        let (dispatcher, handle) = Dispatcher::spawn(
            Transport {
                reader,
                writer,
                child: None,
            },
            options,
            frontend,
            events,
        );

        (
            dispatcher,
            handle,
            receiver,
            FakeInterpreter::new(far),
        )
    }

    pub fn connect(
        frontend: Arc<dyn Frontend>,
    ) -> (Dispatcher, JoinHandle<()>, EventReceiver, FakeInterpreter) {
        connect_with(frontend, options(STEP))
    }

    pub fn drain(receiver: &mut EventReceiver) -> Vec<DebugEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }
}
