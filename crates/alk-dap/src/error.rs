use std::borrow::Cow;

use dap::prelude::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlkAdapterError {
    #[error("Unhandled command: {0:?}")]
    UnhandledCommand(Box<Command>),
    #[error("Protocol error: {0}")]
    ProtocolError(Cow<'static, str>),
    #[error("Failed to deserialize launch arguments: {0}")]
    LaunchArgumentsError(serde_json::Error),
    #[error("Missing launch arguments")]
    MissingLaunchArguments,
    #[error(transparent)]
    Runtime(#[from] alk_runtime::Error),
    /// The client asked to end the session.
    #[error("Shutdown")]
    Shutdown,
}
