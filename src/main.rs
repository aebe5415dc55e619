use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;

use fluxbot::commands::CommandRegistry;
use fluxbot::config::Config;
use fluxbot::gateway::Client;
use fluxbot::interpreter::FunctionRegistry;

#[derive(Parser)]
#[command(name = "fluxbot", version, about = "Macro-scripted bot client for the Fluxer gateway")]
struct Cli {
    /// Directory of command definition files (overrides FLUXBOT_COMMANDS_PATH)
    #[arg(long)]
    commands: Option<PathBuf>,
    /// Verbose logging (overrides FLUXBOT_DEBUG)
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(commands) = cli.commands {
        config.commands_path = commands;
    }
    if cli.debug {
        config.debug = true;
    }

    let default_filter = if config.debug {
        "fluxbot=debug"
    } else {
        "fluxbot=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    print_banner(&config);

    let commands = match CommandRegistry::load(&config.commands_path).await {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            tracing::warn!(
                path = %config.commands_path.display(),
                "failed to load commands, starting with none: {e}"
            );
            Arc::new(CommandRegistry::empty(&config.commands_path))
        }
    };

    // SIGHUP reloads command definitions without dropping the session.
    #[cfg(unix)]
    {
        let registry = Arc::clone(&commands);
        tokio::spawn(async move {
            let mut hup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
                Ok(hup) => hup,
                Err(e) => {
                    tracing::warn!("failed to install SIGHUP handler: {e}");
                    return;
                }
            };
            while hup.recv().await.is_some() {
                if let Err(e) = registry.reload().await {
                    tracing::error!("command reload failed: {e}");
                }
            }
        });
    }

    let client = Client::new(config, commands, FunctionRegistry::with_builtins());
    if let Err(e) = client.run(shutdown_signal()).await {
        tracing::error!("gateway session ended: {e}");
        std::process::exit(1);
    }
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");

    eprintln!();
    eprintln!("  \x1b[1;36mfluxbot\x1b[0m \x1b[2mv{version}\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mgateway\x1b[0m      {}", config.gateway_url);
    eprintln!("  \x1b[2mapi\x1b[0m          {}", config.api_url);
    eprintln!("  \x1b[2mprefix\x1b[0m       {}", config.prefix);
    eprintln!("  \x1b[2mcommands\x1b[0m     {}", config.commands_path.display());

    if config.debug {
        eprintln!();
        eprintln!("  \x1b[33m! debug logging enabled\x1b[0m");
    }

    eprintln!();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
