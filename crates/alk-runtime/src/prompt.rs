use std::sync::Arc;

use tracing::{debug, info};

use crate::frontend::{Frontend, PickRequest, pick_bounded};

/// Option the interpreter appends when more values are available.
pub const MORE_OPTION: &str = "Use \"more\" to see the next";
/// Continuation command asking for the next page of values.
pub const MORE_COMMAND: &str = "more";

const DEFAULT_TITLE: &str = "Choose a value";

/// A non-deterministic choice the interpreter needs answered before it can continue.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChoicePrompt {
    pub title: String,
    pub options: Vec<String>,
    /// Zero-based source line the choice belongs to.
    pub highlight: Option<usize>,
}

impl ChoicePrompt {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_highlight(mut self, line: usize) -> Self {
        self.highlight = Some(line);
        self
    }

    fn request(&self) -> PickRequest {
        PickRequest {
            title: if self.title.is_empty() {
                DEFAULT_TITLE.to_string()
            } else {
                self.title.clone()
            },
            options: self.options.clone(),
            focus: None,
        }
    }
}

/// Index token sent back for a chosen option: the text before its first `.`.
pub fn index_token(option: &str) -> &str {
    option
        .split_once('.')
        .map_or(option, |(index, _)| index)
        .trim()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Line to write back to the interpreter.
    Answer(String),
    /// The user asked for more values; a fresh prompt follows.
    More,
    /// Cancelled or out of attempts.
    Abandoned,
}

impl Resolution {
    pub fn reply(&self) -> Option<&str> {
        match self {
            Resolution::Answer(token) => Some(token),
            Resolution::More => Some(MORE_COMMAND),
            Resolution::Abandoned => None,
        }
    }
}

#[derive(Clone)]
pub struct PromptResolver {
    frontend: Arc<dyn Frontend>,
    max_attempts: usize,
}

impl PromptResolver {
    pub fn new(frontend: Arc<dyn Frontend>, max_attempts: usize) -> Self {
        Self {
            frontend,
            max_attempts,
        }
    }

    pub fn frontend(&self) -> &dyn Frontend {
        self.frontend.as_ref()
    }

    pub async fn resolve(&self, prompt: &ChoicePrompt) -> Resolution {
        if prompt.options.is_empty() {
            info!(title = %prompt.title, "Choice without options");
            return Resolution::Abandoned;
        }

        let request = prompt.request();
        let Some(index) = pick_bounded(self.frontend.as_ref(), &request, self.max_attempts).await
        else {
            self.frontend.clear_highlights();
            return Resolution::Abandoned;
        };

        let option = &prompt.options[index];
        debug!(option = %option, "Choice resolved");

        if option.contains(MORE_OPTION) {
            Resolution::More
        } else {
            self.frontend.clear_highlights();
            Resolution::Answer(index_token(option).to_string())
        }
    }
}
