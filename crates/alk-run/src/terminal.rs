//! Choices answered on the terminal during a plain run.

use alk_runtime::{CANCEL_ANSWER, Frontend, Pick, PickRequest};
use async_trait::async_trait;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

fn render(request: &PickRequest) -> String {
    let mut text = format!("{}\n", request.title.bold());
    for (index, option) in request.options.iter().enumerate() {
        let line = format!("  [{index}] {option}");
        if request.focus == Some(index) {
            text.push_str(&format!("{}\n", line.cyan()));
        } else {
            text.push_str(&format!("{line}\n"));
        }
    }
    text.push_str(&format!("Choose an index, or `{CANCEL_ANSWER}`: "));
    text
}

/// Reads answers line by line from `R`. End of input cancels.
pub struct TerminalFrontend<R> {
    input: Mutex<Lines<BufReader<R>>>,
}

impl TerminalFrontend<Stdin> {
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }
}

impl<R: AsyncRead + Unpin> TerminalFrontend<R> {
    pub fn new(reader: R) -> Self {
        Self {
            input: Mutex::new(BufReader::new(reader).lines()),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> Frontend for TerminalFrontend<R> {
    async fn pick(&self, request: PickRequest) -> Pick {
        eprint!("{}", render(&request));

        match self.input.lock().await.next_line().await {
            Ok(Some(answer)) => Pick::from_answer(&answer),
            Ok(None) | Err(_) => Pick::Cancelled,
        }
    }

    fn highlight(&self, _lines: &[usize], focus: usize) {
        eprintln!("{}", format!("(line {})", focus + 1).dimmed());
    }

    fn notify(&self, message: &str) {
        eprintln!("{}", message.yellow());
    }
}
