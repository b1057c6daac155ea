pub mod cli;
pub mod terminal;

pub use cli::Cli;
