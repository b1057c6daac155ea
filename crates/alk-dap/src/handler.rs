use std::io::Write;
use std::sync::{Arc, Mutex};

use alk_runtime::{CANCEL_ANSWER, Frontend, Pick, PickRequest};
use async_trait::async_trait;
use dap::events::{Event, OutputEventBody};
use dap::server::ServerOutput;
use dap::types::OutputEventCategory;
use tokio::sync::oneshot;
use tracing::{debug, error};

pub type SharedOutput<W> = Arc<Mutex<ServerOutput<W>>>;

pub fn send_event<W: Write>(output: &SharedOutput<W>, event: Event) {
    match output.lock() {
        Ok(mut output) => {
            if let Err(e) = output.send_event(event) {
                error!(error = %e, "Failed to send event");
            }
        }
        Err(_) => error!("Client output is poisoned"),
    }
}

pub fn console_event(text: impl Into<String>, category: OutputEventCategory) -> Event {
    Event::Output(OutputEventBody {
        output: text.into(),
        category: Some(category),
        group: None,
        variables_reference: None,
        source: None,
        line: None,
        column: None,
        data: None,
    })
}

fn render_request(request: &PickRequest) -> String {
    let mut text = format!("{}\n", request.title);
    for (index, option) in request.options.iter().enumerate() {
        let marker = if request.focus == Some(index) { '>' } else { ' ' };
        text.push_str(&format!("{marker} [{index}] {option}\n"));
    }
    text.push_str(&format!(
        "Evaluate a number to choose, or `{CANCEL_ANSWER}`.\n"
    ));
    text
}

/// Asks the user through the debug console; answers come back as evaluate requests.
pub struct DapFrontend<W: Write> {
    output: SharedOutput<W>,
    pending: Mutex<Option<oneshot::Sender<Pick>>>,
}

impl<W: Write> DapFrontend<W> {
    pub fn new(output: SharedOutput<W>) -> Self {
        Self {
            output,
            pending: Mutex::new(None),
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.pending
            .lock()
            .map(|pending| pending.is_some())
            .unwrap_or(false)
    }

    /// Delivers `text` to the pending choice. Returns `None` when nothing is waiting.
    pub fn answer(&self, text: &str) -> Option<Pick> {
        let sender = self.pending.lock().ok()?.take()?;
        let pick = Pick::from_answer(text);
        debug!(?pick, "Answer from debug console");
        sender.send(pick).ok()?;
        Some(pick)
    }

    /// Cancels a pending choice, if any.
    pub fn cancel(&self) {
        if let Some(sender) = self.pending.lock().ok().and_then(|mut p| p.take()) {
            let _ = sender.send(Pick::Cancelled);
        }
    }
}

#[async_trait]
impl<W: Write + Send + 'static> Frontend for DapFrontend<W> {
    async fn pick(&self, request: PickRequest) -> Pick {
        let (tx, rx) = oneshot::channel();
        match self.pending.lock() {
            Ok(mut pending) => *pending = Some(tx),
            Err(_) => return Pick::Cancelled,
        }

        send_event(
            &self.output,
            console_event(render_request(&request), OutputEventCategory::Important),
        );

        rx.await.unwrap_or(Pick::Cancelled)
    }

    fn highlight(&self, lines: &[usize], focus: usize) {
        debug!(?lines, focus, "Highlight");
        let others = lines
            .iter()
            .filter(|&&line| line != focus)
            .map(|line| (line + 1).to_string())
            .collect::<Vec<_>>();

        let mut text = format!("-> line {}", focus + 1);
        if !others.is_empty() {
            text.push_str(&format!(" (also lines {})", others.join(", ")));
        }
        text.push('\n');

        let Event::Output(mut body) = console_event(text, OutputEventCategory::Console) else {
            return;
        };
        body.line = Some((focus + 1) as i64);
        send_event(&self.output, Event::Output(body));
    }

    fn notify(&self, message: &str) {
        send_event(
            &self.output,
            console_event(format!("{message}\n"), OutputEventCategory::Console),
        );
    }
}
