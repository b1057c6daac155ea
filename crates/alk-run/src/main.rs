use clap::Parser;

fn main() -> miette::Result<()> {
    alk_run::Cli::parse().run()
}
