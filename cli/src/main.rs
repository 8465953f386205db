use clap::Parser;
mod app;
mod commands;
mod logging;
use aris_core::api::{load_default, load_from};
use commands::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    let mut cfg = match args.config.as_deref() {
        Some(path) => load_from(path)?,
        None => load_default()?,
    };
    args.apply_to(&mut cfg);

    let log_guard = logging::init(&cfg.logging)?;

    let exit = app::run_app(args, cfg).await?;
    drop(log_guard);
    std::process::exit(exit);
}
