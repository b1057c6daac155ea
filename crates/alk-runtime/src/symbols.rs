//! Queries answered by the interpreter's language-server mode.

use std::path::Path;
use std::sync::Arc;

use itertools::Itertools;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::{LaunchMode, RuntimeConfig};
use crate::dispatcher::{Dispatcher, DispatcherOptions};
use crate::error::{DispatchError, Result};
use crate::event::{EventReceiver, EventSender};
use crate::frontend::Headless;
use crate::supervisor;

const NO_FUNCTION: &str = "No function";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Variable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
}

/// `name(a, b)` as printed for a `function` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub label: String,
    pub parameters: Vec<String>,
}

impl FunctionSignature {
    pub fn parse(label: &str) -> Self {
        let label = label.trim().to_string();
        let parameters = label
            .split_once('(')
            .map(|(_, rest)| rest.split(')').next().unwrap_or_default())
            .map(|inner| {
                inner
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self { label, parameters }
    }
}

/// Zero-based position in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

fn parse_line_number(text: &str) -> Option<usize> {
    text.split_whitespace().next()?.parse::<usize>().ok()?.checked_sub(1)
}

fn parse_location(text: &str) -> Option<SourceLocation> {
    let (line, column) = text.split_whitespace().collect_tuple()?;
    Some(SourceLocation {
        line: line.parse::<usize>().ok()?.checked_sub(1)?,
        column: column.parse().ok()?,
    })
}

/// Typed access to the symbol queries. Lines passed in are zero-based.
#[derive(Debug, Clone)]
pub struct SymbolClient {
    dispatcher: Dispatcher,
}

impl SymbolClient {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Starts the interpreter in language-server mode. Nothing there asks the user anything.
    pub fn start(config: &RuntimeConfig) -> Result<(Self, JoinHandle<()>, EventReceiver)> {
        let (events, receiver) = EventSender::channel();
        let command = config.backend_command(LaunchMode::LanguageServer, None);
        let (dispatcher, handle) = supervisor::start(
            &command,
            DispatcherOptions::from(config),
            Arc::new(Headless),
            events,
        )?;
        Ok((Self::new(dispatcher), handle, receiver))
    }

    pub fn shutdown(&self) {
        self.dispatcher.terminate();
    }

    /// Sends the current text of `path`: its line count, then every line.
    pub async fn load(&self, path: &Path, text: &str) -> std::result::Result<(), DispatchError> {
        let lines: Vec<&str> = text.split('\n').collect();
        let payload = std::iter::once(lines.len().to_string())
            .chain(lines.iter().map(|line| line.trim_end_matches('\r').to_string()))
            .map(|line| line + "\n")
            .collect::<String>();

        debug!(path = %path.display(), lines = lines.len(), "Loading document");
        self.dispatcher
            .issue_with_payload(&format!("load {}", path.display()), payload)
            .await
            .map(|_| ())
    }

    /// Names visible at `line`.
    pub async fn all_symbols(&self, line: usize) -> std::result::Result<Vec<String>, DispatchError> {
        let block = self
            .dispatcher
            .issue(&format!("all-symbols {}", line + 1))
            .await?;

        Ok(block
            .lines
            .into_iter()
            .skip(1)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect())
    }

    /// Visible names, each classified by asking for its signature.
    pub async fn completions(&self, line: usize) -> std::result::Result<Vec<Symbol>, DispatchError> {
        let mut symbols = Vec::new();
        for name in self.all_symbols(line).await? {
            let kind = match self.function(&name).await? {
                Some(_) => SymbolKind::Function,
                None => SymbolKind::Variable,
            };
            symbols.push(Symbol { name, kind });
        }
        Ok(symbols)
    }

    pub async fn function(
        &self,
        name: &str,
    ) -> std::result::Result<Option<FunctionSignature>, DispatchError> {
        let block = self.dispatcher.issue(&format!("function {name}")).await?;

        Ok(block
            .first_line()
            .filter(|line| !line.trim().is_empty() && !line.starts_with(NO_FUNCTION))
            .map(FunctionSignature::parse))
    }

    /// Line where function `name` is defined.
    pub async fn where_function(&self, name: &str) -> std::result::Result<Option<usize>, DispatchError> {
        let block = self.dispatcher.issue(&format!("where-f {name}")).await?;
        Ok(block.first_line().and_then(parse_line_number))
    }

    /// Line where the variable `name` seen from `line` is defined.
    pub async fn where_variable(
        &self,
        line: usize,
        name: &str,
    ) -> std::result::Result<Option<usize>, DispatchError> {
        // This query takes the zero-based line, unlike the others.
        let block = self
            .dispatcher
            .issue(&format!("where-v {line} {name}"))
            .await?;
        Ok(block.first_line().and_then(parse_line_number))
    }

    pub async fn references(
        &self,
        line: usize,
        name: &str,
        is_function: bool,
    ) -> std::result::Result<Vec<SourceLocation>, DispatchError> {
        let mut command = format!("all-references {} {name}", line + 1);
        if is_function {
            command.push_str(" 1");
        }
        let block = self.dispatcher.issue(&command).await?;

        Ok(block
            .lines
            .iter()
            .skip(1)
            .filter_map(|line| parse_location(line))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use rstest::rstest;

    use super::*;
    use crate::dispatcher::testing::{FakeInterpreter, connect};

    fn client() -> (SymbolClient, FakeInterpreter) {
        let (dispatcher, _handle, _events, backend) = connect(Arc::new(Headless));
        (SymbolClient::new(dispatcher), backend)
    }

    #[rstest]
    #[case::two("add(a, b)", &["a", "b"])]
    #[case::none("main()", &[])]
    #[case::spaced(" f( x ,y ) ", &["x", "y"])]
    #[case::no_parens("f", &[])]
    fn test_parse_signature(#[case] label: &str, #[case] expected: &[&str]) {
        let signature = FunctionSignature::parse(label);
        assert_eq!(signature.label, label.trim());
        assert_eq!(signature.parameters, expected);
    }

    #[rstest]
    #[case::valid("3 7", Some(SourceLocation { line: 2, column: 7 }))]
    #[case::zero_line("0 1", None)]
    #[case::missing_column("3", None)]
    #[case::extra("3 7 9", None)]
    fn test_parse_location(#[case] text: &str, #[case] expected: Option<SourceLocation>) {
        assert_eq!(parse_location(text), expected);
    }

    #[tokio::test]
    async fn test_load_sends_line_count_and_lines() {
        let (client, mut backend) = client();
        let call = tokio::spawn(async move {
            client
                .load(&PathBuf::from("/w/a.alk"), "x = 1;\r\ny = 2;")
                .await
        });

        assert_eq!(backend.read_line().await, "load /w/a.alk");
        assert_eq!(backend.read_line().await, "2");
        assert_eq!(backend.read_line().await, "x = 1;");
        assert_eq!(backend.read_line().await, "y = 2;");
        backend.respond("load /w/a.alk", &[]).await;

        call.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_completions_classify_symbols() {
        let (client, mut backend) = client();
        let call = tokio::spawn(async move { client.completions(4).await });

        assert_eq!(backend.read_line().await, "all-symbols 5");
        backend
            .respond("all-symbols 5", &["Symbols:", "add", "x"])
            .await;
        assert_eq!(backend.read_line().await, "function add");
        backend.respond("function add", &["add(a, b)"]).await;
        assert_eq!(backend.read_line().await, "function x");
        backend
            .respond("function x", &["No function named x"])
            .await;

        assert_eq!(
            call.await.unwrap().unwrap(),
            vec![
                Symbol {
                    name: "add".to_string(),
                    kind: SymbolKind::Function,
                },
                Symbol {
                    name: "x".to_string(),
                    kind: SymbolKind::Variable,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_definitions() {
        let (client, mut backend) = client();
        let client = Arc::new(client);

        let function = {
            let client = client.clone();
            tokio::spawn(async move { client.where_function("add").await })
        };
        assert_eq!(backend.read_line().await, "where-f add");
        backend.respond("where-f add", &["12"]).await;
        assert_eq!(function.await.unwrap().unwrap(), Some(11));

        let variable = {
            let client = client.clone();
            tokio::spawn(async move { client.where_variable(6, "x").await })
        };
        assert_eq!(backend.read_line().await, "where-v 6 x");
        backend.respond("where-v 6 x", &["not found"]).await;
        assert_eq!(variable.await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn test_references() {
        let (client, mut backend) = client();
        let call = tokio::spawn(async move { client.references(0, "add", true).await });

        assert_eq!(backend.read_line().await, "all-references 1 add 1");
        backend
            .respond("all-references 1 add 1", &["References:", "1 4", "9 12"])
            .await;

        assert_eq!(
            call.await.unwrap().unwrap(),
            vec![
                SourceLocation { line: 0, column: 4 },
                SourceLocation { line: 8, column: 12 },
            ]
        );
    }
}
