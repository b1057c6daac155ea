//! Runtime for driving the Alk interpreter over its standard streams.
//!
//! The interpreter answers every command with a block framed by
//! `--- begin <name> ---` and `--- end <name> ---` lines, and may interleave
//! choice prompts, highlight hints, trace noise and program output. This crate
//! owns the child process and that stream, and exposes typed operations on top:
//!
//! - [`DebugSession`]: launch, step, step back, breakpoints, stack and evaluation.
//! - [`SymbolClient`]: the language-server queries (symbols, definitions, references).
//! - [`spawn_run`]: a plain run that only streams output and prompts.
//!
//! Front ends plug in through the [`Frontend`] trait and consume [`DebugEvent`]s.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use alk_runtime::{DebugSession, Headless, RuntimeConfig};
//!
//! # async fn example() -> alk_runtime::Result<()> {
//! let (session, mut events) = DebugSession::new(RuntimeConfig::default(), Arc::new(Headless));
//! session.set_breakpoint(Path::new("main.alk"), 3).await?;
//! session.launch(Path::new("main.alk")).await?;
//! session.resume().await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```
pub mod breakpoint;
pub mod checkpoint;
pub mod config;
pub mod demux;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod frontend;
pub mod prompt;
pub mod session;
pub mod supervisor;
pub mod symbols;

pub use breakpoint::{Breakpoint, Verification, VerifyPolicy};
pub use checkpoint::{Checkpoint, Navigation};
pub use config::{BackendOptions, InitialState, LaunchMode, RuntimeConfig};
pub use diagnostics::{RunError, collect_errors};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, Error, FramingError, Result};
pub use event::{DebugEvent, EventReceiver, ExecutionCommand, OutputCategory};
pub use frontend::{CANCEL_ANSWER, Frontend, Headless, Pick, PickRequest};
pub use session::{DebugSession, StackFrame, spawn_run};
pub use symbols::{FunctionSignature, SourceLocation, Symbol, SymbolClient, SymbolKind};
