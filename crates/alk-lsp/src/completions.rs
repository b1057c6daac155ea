use alk_runtime::{SymbolClient, SymbolKind};
use tower_lsp_server::ls_types::{
    CompletionItem, CompletionItemKind, CompletionResponse, Documentation, MarkupContent,
    MarkupKind, Position,
};
use tracing::warn;

pub async fn response(symbols: &SymbolClient, position: Position) -> Option<CompletionResponse> {
    let found = match symbols.completions(position.line as usize).await {
        Ok(found) => found,
        Err(e) => {
            warn!(error = %e, "Completion query failed");
            return None;
        }
    };

    Some(CompletionResponse::Array(
        found
            .into_iter()
            .map(|symbol| CompletionItem {
                label: symbol.name,
                kind: Some(match symbol.kind {
                    SymbolKind::Function => CompletionItemKind::FUNCTION,
                    SymbolKind::Variable => CompletionItemKind::VARIABLE,
                }),
                ..Default::default()
            })
            .collect(),
    ))
}

/// Adds the signature to a function item.
pub async fn resolve(symbols: &SymbolClient, mut item: CompletionItem) -> CompletionItem {
    if item.kind == Some(CompletionItemKind::VARIABLE) {
        return item;
    }

    match symbols.function(&item.label).await {
        Ok(Some(signature)) => {
            item.documentation = Some(Documentation::MarkupContent(MarkupContent {
                kind: MarkupKind::Markdown,
                value: format!("```alk\n{}\n```", signature.label),
            }));
            item.detail = Some(signature.label);
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, name = %item.label, "Signature query failed"),
    }
    item
}
