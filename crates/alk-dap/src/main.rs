use miette::miette;

fn main() -> miette::Result<()> {
    alk_dap::start().map_err(|e| miette!(e.to_string()))
}
