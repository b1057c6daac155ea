use alk_runtime::SymbolClient;
use tower_lsp_server::ls_types::{
    ParameterInformation, ParameterLabel, Position, SignatureHelp, SignatureInformation,
};
use tracing::warn;

use crate::document;

/// Signature of the call around the cursor, with the parameter being typed highlighted.
pub async fn response(
    symbols: &SymbolClient,
    text: &str,
    position: Position,
) -> Option<SignatureHelp> {
    let line = document::line_at(text, position.line)?;
    let (name, commas) = document::enclosing_call(line, position.character as usize)?;

    let signature = match symbols.function(&name).await {
        Ok(signature) => signature?,
        Err(e) => {
            warn!(error = %e, %name, "Signature query failed");
            return None;
        }
    };

    let active = commas.min(signature.parameters.len().saturating_sub(1)) as u32;
    let parameters = signature
        .parameters
        .into_iter()
        .map(|parameter| ParameterInformation {
            label: ParameterLabel::Simple(parameter),
            documentation: None,
        })
        .collect();

    Some(SignatureHelp {
        signatures: vec![SignatureInformation {
            label: signature.label,
            documentation: None,
            parameters: Some(parameters),
            active_parameter: None,
        }],
        active_signature: Some(0),
        active_parameter: Some(active),
    })
}
