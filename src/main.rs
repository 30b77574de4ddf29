use clap::Parser;
use smtp_user_enum::cli::Cli;
use smtp_user_enum::engine::shutdown::Shutdown;
use smtp_user_enum::engine::Engine;
use smtp_user_enum::output::OutputChannel;
use std::process::ExitCode;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .init();

    match run(cli).await {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::from(EXIT_INTERRUPTED),
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the run was cut short by the operator.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let cfg = cli.into_config()?;

    let interrupt = Shutdown::new();
    let on_signal = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight requests");
            on_signal.trigger();
        }
    });

    let sink = OutputChannel::new(cfg.output.clone())?;
    let mut engine = Engine::new(cfg, sink.clone(), interrupt.clone());
    let result = engine.run().await;
    sink.shutdown().await?;
    result?;

    Ok(interrupt.is_triggered())
}
