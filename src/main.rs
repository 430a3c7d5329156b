// src/main.rs — futhark-tool entry point

use clap::Parser;
use tokio::io::BufReader;

use futhark_tool::cli::{self, Cli};
use futhark_tool::core::{Dispatcher, ToolIdentity};
use futhark_tool::infra::config::Config;
use futhark_tool::infra::logger;
use futhark_tool::problems::ModuleRegistry;
use futhark_tool::worker::FutharkBuilder;

const TOOL_NAME: &str = "futhark";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout belongs to the protocol
    logger::init_logging(&cli.log_level);

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    };

    // A blocking stdin read cannot be cancelled; exit without waiting on it
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    cli.apply(&mut config);

    let identity = ToolIdentity {
        tool: TOOL_NAME.to_string(),
        config: Some(cli::start_config(&config)),
    };
    tracing::info!(
        "Starting {} adapter (backend: {}, sources: {})",
        TOOL_NAME,
        config.futhark.effective_backend(),
        config.futhark.source_dir.display()
    );

    let builder = FutharkBuilder::from_config(&config);
    let mut dispatcher = Dispatcher::new(identity, Box::new(builder), ModuleRegistry::builtin());

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    let result = tokio::select! {
        result = dispatcher.run(stdin, stdout) => result,
        signal = shutdown_signal() => {
            tracing::info!("Received {}, shutting down", signal);
            Ok(())
        }
    };

    // Workers must not outlive the adapter, whatever ended the loop
    dispatcher.shutdown().await;
    result?;
    Ok(())
}

/// Resolves when the process is asked to terminate.
#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            tracing::warn!("Could not install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "Ctrl-C"
}
