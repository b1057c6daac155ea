use alk_runtime::SymbolClient;
use tower_lsp_server::ls_types::{GotoDefinitionResponse, Location, Position, Range, Uri};
use tracing::warn;

use crate::document;

pub async fn response(
    symbols: &SymbolClient,
    uri: Uri,
    text: &str,
    position: Position,
) -> Option<GotoDefinitionResponse> {
    let line = document::line_at(text, position.line)?;
    let word = document::word_at(line, position.character as usize)?;

    let found = if word.is_function {
        symbols.where_function(&word.name).await
    } else {
        symbols
            .where_variable(position.line as usize, &word.name)
            .await
    };
    let definition = match found {
        Ok(definition) => definition?,
        Err(e) => {
            warn!(error = %e, name = %word.name, "Definition query failed");
            return None;
        }
    };

    let name_len = document::line_at(text, definition as u32)
        .map(|line| document::definition_name(line).chars().count())
        .unwrap_or_default();

    Some(GotoDefinitionResponse::Scalar(Location {
        uri,
        range: Range::new(
            Position::new(definition as u32, 0),
            Position::new(definition as u32, name_len as u32),
        ),
    }))
}
