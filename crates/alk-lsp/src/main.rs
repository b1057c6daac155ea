use alk_lsp::LspConfig;
use alk_runtime::RuntimeConfig;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("alk_lsp=info")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    alk_lsp::start(LspConfig::new(RuntimeConfig::default()))
        .await
        .into_diagnostic()
}
