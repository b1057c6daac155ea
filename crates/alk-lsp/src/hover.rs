use alk_runtime::SymbolClient;
use tower_lsp_server::ls_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position, Range};
use tracing::warn;

use crate::document;

/// Shows the signature of a function at a call site. Variables have no hover.
pub async fn response(symbols: &SymbolClient, text: &str, position: Position) -> Option<Hover> {
    let line = document::line_at(text, position.line)?;
    let word = document::word_at(line, position.character as usize)?;
    if !word.is_function {
        return None;
    }

    let signature = match symbols.function(&word.name).await {
        Ok(signature) => signature?,
        Err(e) => {
            warn!(error = %e, name = %word.name, "Hover query failed");
            return None;
        }
    };

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: format!("```alk\n{}\n```", signature.label),
        }),
        range: Some(Range::new(
            Position::new(position.line, word.start as u32),
            Position::new(position.line, word.end() as u32),
        )),
    })
}
