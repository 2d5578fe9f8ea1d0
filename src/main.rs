use anyhow::Result;

fn main() -> Result<()> {
    aurora_chat::cli::run_cli()
}
