use std::path::PathBuf;
use std::sync::Arc;

use alk_runtime::{DebugEvent, EventReceiver, RuntimeConfig, SymbolClient};
use dashmap::DashMap;
use tracing::{debug, info, warn};
use url::Url;

use crate::{capabilities, completions, goto_definition, hover, references, signature_help};
use tower_lsp_server::{Client, LanguageServer, LspService, Server, jsonrpc, ls_types};

fn to_path(uri: &ls_types::Uri) -> PathBuf {
    Url::parse(&uri.to_string())
        .ok()
        .and_then(|url| url.to_file_path().ok())
        .unwrap_or_else(|| PathBuf::from(uri.to_string()))
}

#[derive(Debug)]
struct Backend {
    client: Client,
    symbols: SymbolClient,
    text_map: DashMap<String, Arc<String>>,
}

impl LanguageServer for Backend {
    async fn initialize(&self, _: ls_types::InitializeParams) -> jsonrpc::Result<ls_types::InitializeResult> {
        self.client
            .log_message(ls_types::MessageType::INFO, "Server initialized")
            .await;
        Ok(ls_types::InitializeResult {
            capabilities: capabilities::server_capabilities(),
            ..Default::default()
        })
    }

    async fn shutdown(&self) -> jsonrpc::Result<()> {
        self.symbols.shutdown();
        Ok(())
    }

    async fn did_open(&self, params: ls_types::DidOpenTextDocumentParams) {
        self.on_change(&params.text_document.uri, params.text_document.text)
            .await;
    }

    async fn did_change(&self, mut params: ls_types::DidChangeTextDocumentParams) {
        if let Some(change) = params.content_changes.pop() {
            self.on_change(&params.text_document.uri, change.text).await;
        }
    }

    async fn did_close(&self, params: ls_types::DidCloseTextDocumentParams) {
        self.text_map.remove(&params.text_document.uri.to_string());
    }

    async fn completion(
        &self,
        params: ls_types::CompletionParams,
    ) -> jsonrpc::Result<Option<ls_types::CompletionResponse>> {
        let position = params.text_document_position.position;
        Ok(completions::response(&self.symbols, position).await)
    }

    async fn completion_resolve(&self, item: ls_types::CompletionItem) -> jsonrpc::Result<ls_types::CompletionItem> {
        Ok(completions::resolve(&self.symbols, item).await)
    }

    async fn hover(&self, params: ls_types::HoverParams) -> jsonrpc::Result<Option<ls_types::Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let Some(text) = self.text(&uri) else {
            return Ok(None);
        };
        Ok(hover::response(&self.symbols, &text, position).await)
    }

    async fn signature_help(
        &self,
        params: ls_types::SignatureHelpParams,
    ) -> jsonrpc::Result<Option<ls_types::SignatureHelp>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let Some(text) = self.text(&uri) else {
            return Ok(None);
        };
        Ok(signature_help::response(&self.symbols, &text, position).await)
    }

    async fn goto_definition(
        &self,
        params: ls_types::GotoDefinitionParams,
    ) -> jsonrpc::Result<Option<ls_types::GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let Some(text) = self.text(&uri) else {
            return Ok(None);
        };
        Ok(goto_definition::response(&self.symbols, uri, &text, position).await)
    }

    async fn references(&self, params: ls_types::ReferenceParams) -> jsonrpc::Result<Option<Vec<ls_types::Location>>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let Some(text) = self.text(&uri) else {
            return Ok(None);
        };
        Ok(references::response(&self.symbols, uri, &text, position).await)
    }
}

impl Backend {
    fn new(client: Client, symbols: SymbolClient) -> Self {
        Self {
            client,
            symbols,
            text_map: DashMap::new(),
        }
    }

    fn text(&self, uri: &ls_types::Uri) -> Option<Arc<String>> {
        self.text_map.get(&uri.to_string()).map(|text| Arc::clone(&text))
    }

    /// Keeps the latest text and hands it to the interpreter.
    async fn on_change(&self, uri: &ls_types::Uri, text: String) {
        let text = Arc::new(text);
        self.text_map.insert(uri.to_string(), Arc::clone(&text));

        if text.trim().is_empty() {
            return;
        }

        let path = to_path(uri);
        if let Err(e) = self.symbols.load(&path, &text).await {
            warn!(error = %e, path = %path.display(), "Failed to load document");
            self.client
                .log_message(
                    ls_types::MessageType::WARNING,
                    format!("Failed to load {}: {e}", path.display()),
                )
                .await;
        }
    }
}

async fn log_events(mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        match event {
            DebugEvent::Output { category, text } => debug!(?category, %text, "Interpreter output"),
            DebugEvent::Terminated => warn!("Interpreter terminated"),
            event => debug!(?event, "Ignoring event"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LspConfig {
    runtime: RuntimeConfig,
}

impl LspConfig {
    /// Creates a new LspConfig.
    ///
    /// # Arguments
    ///
    /// * `runtime` - How to start the interpreter. It runs in language-server mode for the
    ///   lifetime of the server and answers every symbol query.
    pub fn new(runtime: RuntimeConfig) -> Self {
        Self { runtime }
    }
}

pub async fn start(config: LspConfig) -> alk_runtime::Result<()> {
    let (symbols, _interpreter, events) = SymbolClient::start(&config.runtime)?;
    tokio::spawn(log_events(events));
    info!(interpreter = %config.runtime.interpreter.display(), "Starting alk-lsp");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let (service, socket) = LspService::new(|client| Backend::new(client, symbols));

    Server::new(stdin, stdout, socket).serve(service).await;
    Ok(())
}
