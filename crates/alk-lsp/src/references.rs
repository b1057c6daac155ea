use alk_runtime::SymbolClient;
use tower_lsp_server::ls_types::{Location, Position, Range, Uri};
use tracing::warn;

use crate::document;

pub async fn response(
    symbols: &SymbolClient,
    uri: Uri,
    text: &str,
    position: Position,
) -> Option<Vec<Location>> {
    let line = document::line_at(text, position.line)?;
    let word = document::word_at(line, position.character as usize)?;
    let width = word.name.chars().count() as u32;

    let found = match symbols
        .references(position.line as usize, &word.name, word.is_function)
        .await
    {
        Ok(found) => found,
        Err(e) => {
            warn!(error = %e, name = %word.name, "References query failed");
            return None;
        }
    };

    let locations = found
        .into_iter()
        .map(|location| {
            let line = location.line as u32;
            let column = location.column as u32;
            Location {
                uri: uri.clone(),
                range: Range::new(Position::new(line, column), Position::new(line, column + width)),
            }
        })
        .collect::<Vec<_>>();

    if locations.is_empty() {
        None
    } else {
        Some(locations)
    }
}
