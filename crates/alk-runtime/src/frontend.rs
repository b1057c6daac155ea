use async_trait::async_trait;
use tracing::{debug, warn};

/// A list of choices put in front of the user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PickRequest {
    pub title: String,
    pub options: Vec<String>,
    /// Option to preselect, if the front end supports it.
    pub focus: Option<usize>,
}

/// Typed answer that refuses a choice.
pub const CANCEL_ANSWER: &str = "cancel";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    Selected(usize),
    /// Closed without choosing. The request may be repeated.
    Dismissed,
    /// The user refuses to choose.
    Cancelled,
}

impl Pick {
    /// Reads a typed answer: an option index, optionally in brackets, or [`CANCEL_ANSWER`].
    pub fn from_answer(text: &str) -> Self {
        let text = text.trim();
        if text.eq_ignore_ascii_case(CANCEL_ANSWER) {
            return Pick::Cancelled;
        }
        text.trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .map_or(Pick::Dismissed, Pick::Selected)
    }
}

/// User-facing side of a debugging session.
#[async_trait]
pub trait Frontend: Send + Sync {
    async fn pick(&self, request: PickRequest) -> Pick;

    /// Marks zero-based source lines, `focus` being the most relevant one.
    fn highlight(&self, _lines: &[usize], _focus: usize) {}

    fn clear_highlights(&self) {}

    fn notify(&self, _message: &str) {}
}

/// Front end that never answers, for sessions where no choice can be offered.
#[derive(Debug, Default, Clone, Copy)]
pub struct Headless;

#[async_trait]
impl Frontend for Headless {
    async fn pick(&self, request: PickRequest) -> Pick {
        warn!(title = %request.title, "No front end available to answer a choice");
        Pick::Cancelled
    }
}

/// Asks until an in-range option is selected, at most `attempts` times.
pub async fn pick_bounded(
    frontend: &dyn Frontend,
    request: &PickRequest,
    attempts: usize,
) -> Option<usize> {
    for attempt in 1..=attempts.max(1) {
        match frontend.pick(request.clone()).await {
            Pick::Selected(index) if index < request.options.len() => return Some(index),
            Pick::Selected(index) => {
                warn!(index, options = request.options.len(), "Selection out of range")
            }
            Pick::Dismissed => debug!(attempt, "Selection dismissed"),
            Pick::Cancelled => return None,
        }
    }
    None
}
