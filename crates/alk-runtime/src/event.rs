use tokio::sync::mpsc;
use tracing::debug;

use crate::breakpoint::Breakpoint;
use crate::demux::OutputBlock;

/// Prefix of the location line the interpreter prints after every step.
pub const CURRENT_LINE: &str = "Current line -> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCategory {
    Stdout,
    Stderr,
    /// Messages from the runtime itself.
    Console,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    SessionStarted,
    Step,
    BreakpointHit,
    Output {
        category: OutputCategory,
        text: String,
    },
    BreakpointChanged(Breakpoint),
    Terminated,
}

pub type EventReceiver = mpsc::UnboundedReceiver<DebugEvent>;

#[derive(Debug, Clone)]
pub struct EventSender(mpsc::UnboundedSender<DebugEvent>);

impl EventSender {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    pub fn send(&self, event: DebugEvent) {
        if self.0.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }

    pub fn output(&self, category: OutputCategory, text: impl Into<String>) {
        self.send(DebugEvent::Output {
            category,
            text: text.into(),
        });
    }
}

/// Commands that move execution forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionCommand {
    Next,
    StepIn,
    Continue,
    StepOut,
}

impl ExecutionCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionCommand::Next => "next",
            ExecutionCommand::StepIn => "step",
            ExecutionCommand::Continue => "continue",
            ExecutionCommand::StepOut => "finish",
        }
    }

    pub fn stop_event(&self) -> DebugEvent {
        match self {
            ExecutionCommand::Continue => DebugEvent::BreakpointHit,
            _ => DebugEvent::Step,
        }
    }
}

/// Events for a completed execution command: the program output it carried, then the stop.
pub fn execution_events(command: ExecutionCommand, block: &OutputBlock) -> Vec<DebugEvent> {
    block
        .lines
        .iter()
        .filter(|line| !line.contains(CURRENT_LINE))
        .map(|line| DebugEvent::Output {
            category: OutputCategory::Stdout,
            text: line.clone(),
        })
        .chain(std::iter::once(command.stop_event()))
        .collect()
}

/// Zero-based line named by a `Current line -> N` location, if present.
pub fn current_line(text: &str) -> Option<usize> {
    let start = text.find(CURRENT_LINE)? + CURRENT_LINE.len();
    let digits: String = text[start..]
        .chars()
        .skip_while(|c| c.is_whitespace())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse::<usize>().ok()?.checked_sub(1)
}
