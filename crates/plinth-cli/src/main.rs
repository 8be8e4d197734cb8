//! Plinth CLI: the `plinth` command.

mod builtin;
mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("--complete") {
        let config = support::load_config_or_exit(false, None);
        let publisher = support::open_publisher_or_exit(config);
        commands::complete::run(&publisher, &args[2..]);
        return;
    }

    let cli = Cli::parse();
    let mut config = support::load_config_or_exit(cli.global, cli.registry.clone());
    init_tracing(cli.verbose, config.log.as_deref());
    if !cli.global && cli.registry.is_none() {
        let app = match &cli.command {
            Commands::App(tokens) => tokens.first(),
            Commands::Getapp { name } => Some(name),
            _ => None,
        };
        if let Some(app) = app {
            support::discover_registry_or_exit(&mut config, app);
        }
    }
    let publisher = support::open_publisher_or_exit(config);
    let json = cli.json;

    match cli.command {
        Commands::Add {
            name,
            target,
            no_cli,
            no_network,
            args,
        } => commands::app::run_add(
            &publisher,
            commands::app::AddArgs {
                name,
                target,
                no_cli,
                no_network,
                args,
            },
            json,
        ),

        Commands::Remove { name } => commands::app::run_remove(&publisher, &name, json),

        Commands::List => commands::app::run_list(&publisher, json),

        Commands::Getapp { name } => commands::app::run_getapp(&publisher, &name, json),

        Commands::Savestate { path } => commands::state::run_save(&publisher, path, json),

        Commands::Loadstate { path, skip_missing } => {
            commands::state::run_load(&publisher, path, skip_missing, json)
        }

        Commands::Serve { bind } => commands::serve::run(&publisher, bind),

        Commands::Describe { app } => commands::describe::run(&publisher, app),

        Commands::App(tokens) => commands::call::run(&publisher, &tokens, json),
    }
}

/// `--verbose` wins, then `PLINTH_LOG` (already folded into the config
/// `log` key), then `warn`.
fn init_tracing(verbose: bool, configured: Option<&str>) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        configured
            .and_then(|directive| EnvFilter::try_new(directive).ok())
            .unwrap_or_else(|| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();
}
