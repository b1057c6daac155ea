//! Debug Adapter Protocol server for the Alk interpreter.
pub mod adapter;
pub mod error;
pub mod handler;
pub mod log;
pub mod protocol;
pub mod server;

pub use server::start;
