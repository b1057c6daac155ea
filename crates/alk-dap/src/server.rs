use dap::prelude::*;
use std::borrow::Cow;
use std::io::{self, BufReader, BufWriter};
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::adapter::AlkAdapter;
use crate::error::AlkAdapterError;
use crate::handler::{console_event, send_event};
use crate::log::DebugConsoleWriter;

type DynResult<T> = miette::Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub fn start() -> DynResult<()> {
    let (debug_writer, log_rx) = DebugConsoleWriter::new();

    #[cfg(debug_assertions)]
    let default_filter = "alk_dap=debug,alk_runtime=debug";
    #[cfg(not(debug_assertions))]
    let default_filter = "alk_dap=info,alk_runtime=info";

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_ansi(false)
        .with_writer(debug_writer)
        .init();

    info!("Starting alk-dap debug adapter");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let reader = BufReader::new(io::stdin());
    let writer = BufWriter::new(io::stdout());
    let mut server = Server::new(reader, writer);

    // First, the client sends an initialize request
    let req = match server.poll_request()? {
        Some(req) => req,
        None => {
            return Err(Box::new(AlkAdapterError::ProtocolError(Cow::Borrowed(
                "Missing initialize request",
            ))));
        }
    };

    if let Command::Initialize(_) = &req.command {
        let capabilities = types::Capabilities {
            supports_configuration_done_request: Some(true),
            supports_evaluate_for_hovers: Some(true),
            support_terminate_debuggee: Some(true),
            supports_terminate_request: Some(true),
            supports_breakpoint_locations_request: Some(true),
            supports_stepping_granularity: Some(true),
            supports_step_back: Some(true),
            ..Default::default()
        };
        let rsp = req.success(ResponseBody::Initialize(capabilities));
        server.respond(rsp)?;
        server.send_event(Event::Initialized)?;
    } else {
        return Err(Box::new(AlkAdapterError::ProtocolError(Cow::Borrowed(
            "Expected initialize request",
        ))));
    }

    let output = server.output.clone();
    std::thread::spawn({
        let output = output.clone();
        move || {
            for message in log_rx.iter() {
                send_event(
                    &output,
                    console_event(message, types::OutputEventCategory::Console),
                );
            }
        }
    });

    let mut adapter = AlkAdapter::new(output, runtime.handle().clone());

    loop {
        debug!("Waiting for next request");
        match server.poll_request()? {
            Some(req) => {
                if let Err(e) = adapter.handle_request(req) {
                    if matches!(e, AlkAdapterError::Shutdown) {
                        break;
                    }
                    error!(error = %e, "Failed to handle DAP request");
                }
            }
            None => {
                info!("Client disconnected or stream ended");
                break;
            }
        }
    }

    adapter.shutdown();
    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(())
}
