use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alk_runtime::dispatcher::{DispatcherOptions, Transport};
use alk_runtime::event::EventSender;
use alk_runtime::{Dispatcher, Headless, SymbolClient};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// A symbol client backed by an interpreter that answers from a fixed table.
/// Commands missing from the table, and payload lines, get no answer.
pub fn scripted_symbols(answers: &[(&str, &[&str])]) -> SymbolClient {
    let (near, far) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(near);
    let (events, _) = EventSender::channel();
    let (dispatcher, _) = Dispatcher::spawn(
        Transport {
            reader,
            writer,
            child: None,
        },
        DispatcherOptions {
            request_timeout: Duration::from_millis(500),
            max_prompt_attempts: 1,
            banner_lines: 0,
        },
        Arc::new(Headless),
        events,
    );

    let answers: HashMap<String, Vec<String>> = answers
        .iter()
        .map(|(command, lines)| {
            (
                command.to_string(),
                lines.iter().map(|line| line.to_string()).collect(),
            )
        })
        .collect();

    tokio::spawn(async move {
        let (far_reader, mut far_writer) = tokio::io::split(far);
        let mut lines = BufReader::new(far_reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let command = line.trim();
            let Some(reply) = answers.get(command) else {
                continue;
            };
            let mut block = format!("--- begin <{command}> ---\n");
            for line in reply {
                block.push_str(line);
                block.push('\n');
            }
            block.push_str(&format!("--- end <{command}> ---\n"));
            if far_writer.write_all(block.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    SymbolClient::new(dispatcher)
}
