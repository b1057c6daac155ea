//! Line classification for the interpreter's output stream.
//!
//! The interpreter answers every command inside a pair of markers,
//! `--- begin <name> ---` and `--- end <name> ---`. Interactive choices use the
//! reserved name `choose` and may open in the middle of another block, so the
//! demultiplexer keeps the interrupted block aside until the prompt closes.
//! Everything else seen outside a block is program output.

use std::mem;

use crate::error::FramingError;
use crate::prompt::ChoicePrompt;

/// Block name reserved for interactive choices.
pub const CHOOSE: &str = "choose";

const ENTERED_FUNCTION: &str = "Entered function ";
const EXITED_FUNCTION: &str = "Exited function ";
const CHOICE_HINT: &str = "Select the index of the value you want for \"";
const HINT_LINE: &str = "on line ";
const MARKER_ESCAPE: char = '\\';

/// Lines answering one command, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputBlock {
    pub name: String,
    pub lines: Vec<String>,
}

impl OutputBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: Vec::new(),
        }
    }

    pub fn first_line(&self) -> Option<&str> {
        self.lines.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker<'a> {
    Begin(&'a str),
    End(&'a str),
}

/// Recognizes a marker occupying the whole line. The name may be bare or in angle brackets.
pub fn parse_marker(line: &str) -> Option<Marker<'_>> {
    let body = line.trim().strip_prefix("--- ")?.strip_suffix(" ---")?;
    let (kind, name) = body.split_once(' ')?;
    let name = name.trim();
    let name = name
        .strip_prefix('<')
        .and_then(|n| n.strip_suffix('>'))
        .unwrap_or(name);

    if name.is_empty() {
        return None;
    }

    match kind {
        "begin" => Some(Marker::Begin(name)),
        "end" => Some(Marker::End(name)),
        _ => None,
    }
}

/// Function entry/exit traces the interpreter prints in debug mode.
pub fn is_trace_noise(line: &str) -> bool {
    line.contains(ENTERED_FUNCTION) || line.contains(EXITED_FUNCTION)
}

/// Zero-based source line named by a choice hint.
pub fn parse_hint(line: &str) -> Option<usize> {
    let start = line.find(CHOICE_HINT)?;
    let rest = &line[start..];
    let number = &rest[rest.find(HINT_LINE)? + HINT_LINE.len()..];
    let digits: String = number.chars().take_while(char::is_ascii_digit).collect();
    digits.parse::<usize>().ok()?.checked_sub(1)
}

/// What a single line turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Block(OutputBlock),
    Prompt(ChoicePrompt),
    /// A choice is about to be requested for this zero-based line.
    Highlight(usize),
    Output(String),
    Framing(FramingError),
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    InBlock(OutputBlock),
    InPrompt {
        prompt: ChoicePrompt,
        suspended: Option<OutputBlock>,
    },
}

#[derive(Debug)]
pub struct Demultiplexer {
    state: State,
    banner_lines: usize,
    hint: Option<(String, usize)>,
}

impl Default for Demultiplexer {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Demultiplexer {
    /// `banner_lines` leading lines are discarded before classification starts.
    pub fn new(banner_lines: usize) -> Self {
        Self {
            state: State::Idle,
            banner_lines,
            hint: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    pub fn push_line(&mut self, line: &str) -> Vec<Frame> {
        let line = line.trim_end_matches(['\n', '\r']);

        if self.banner_lines > 0 {
            self.banner_lines -= 1;
            return Vec::new();
        }

        if let Some(line_number) = parse_hint(line) {
            self.hint = Some((line.trim().to_string(), line_number));
            return vec![Frame::Highlight(line_number)];
        }

        if let Some(literal) = line
            .strip_prefix(MARKER_ESCAPE)
            .filter(|rest| parse_marker(rest).is_some())
        {
            return self.text(literal).into_iter().collect();
        }

        match parse_marker(line) {
            Some(Marker::Begin(name)) => self.begin(name),
            Some(Marker::End(name)) => self.end(name),
            None => self.text(line).into_iter().collect(),
        }
    }

    /// Flushes the state at end of stream.
    pub fn finish(&mut self) -> Option<FramingError> {
        match mem::take(&mut self.state) {
            State::Idle => None,
            State::InBlock(block) => Some(FramingError::Truncated(block.name)),
            State::InPrompt { .. } => Some(FramingError::Truncated(CHOOSE.to_string())),
        }
    }

    fn new_prompt(&mut self) -> ChoicePrompt {
        match self.hint.take() {
            Some((title, line)) => ChoicePrompt::new(title).with_highlight(line),
            None => ChoicePrompt::default(),
        }
    }

    fn begin(&mut self, name: &str) -> Vec<Frame> {
        let mut frames = Vec::new();

        self.state = match (mem::take(&mut self.state), name) {
            (State::Idle, CHOOSE) => State::InPrompt {
                prompt: self.new_prompt(),
                suspended: None,
            },
            (State::InBlock(block), CHOOSE) => State::InPrompt {
                prompt: self.new_prompt(),
                suspended: Some(block),
            },
            (State::InPrompt { suspended, .. }, CHOOSE) => {
                frames.push(Frame::Framing(FramingError::Interrupted {
                    open: CHOOSE.to_string(),
                    next: CHOOSE.to_string(),
                }));
                State::InPrompt {
                    prompt: self.new_prompt(),
                    suspended,
                }
            }
            (State::Idle, name) => State::InBlock(OutputBlock::new(name)),
            (State::InBlock(block), name) => {
                frames.push(Frame::Framing(FramingError::Interrupted {
                    open: block.name,
                    next: name.to_string(),
                }));
                State::InBlock(OutputBlock::new(name))
            }
            (State::InPrompt { .. }, name) => {
                frames.push(Frame::Framing(FramingError::Interrupted {
                    open: CHOOSE.to_string(),
                    next: name.to_string(),
                }));
                State::InBlock(OutputBlock::new(name))
            }
        };

        frames
    }

    fn end(&mut self, name: &str) -> Vec<Frame> {
        let (state, frames) = match (mem::take(&mut self.state), name) {
            (State::InPrompt { prompt, suspended }, CHOOSE) => (
                suspended.map_or(State::Idle, State::InBlock),
                vec![Frame::Prompt(prompt)],
            ),
            (State::InBlock(block), name) if block.name == name => {
                (State::Idle, vec![Frame::Block(block)])
            }
            (State::InBlock(block), name) => (
                State::Idle,
                vec![Frame::Framing(FramingError::Mismatched {
                    open: block.name,
                    found: name.to_string(),
                })],
            ),
            // A prompt left open by the interpreter still lets the block around it complete.
            (
                State::InPrompt {
                    suspended: Some(block),
                    ..
                },
                name,
            ) if block.name == name => (
                State::Idle,
                vec![
                    Frame::Framing(FramingError::Mismatched {
                        open: CHOOSE.to_string(),
                        found: name.to_string(),
                    }),
                    Frame::Block(block),
                ],
            ),
            (State::InPrompt { .. }, name) => (
                State::Idle,
                vec![Frame::Framing(FramingError::Mismatched {
                    open: CHOOSE.to_string(),
                    found: name.to_string(),
                })],
            ),
            (State::Idle, name) => (
                State::Idle,
                vec![Frame::Framing(FramingError::Unopened(name.to_string()))],
            ),
        };

        self.state = state;
        frames
    }

    fn text(&mut self, line: &str) -> Option<Frame> {
        if is_trace_noise(line) {
            return None;
        }

        match &mut self.state {
            State::Idle => Some(Frame::Output(line.to_string())),
            State::InBlock(block) => {
                block.lines.push(line.to_string());
                None
            }
            State::InPrompt { prompt, .. } => {
                prompt.options.push(line.to_string());
                None
            }
        }
    }
}
