//! Good Spirits CLI - log drink check-ins from the terminal
//!
//! Every device keeps its own store; `export` and `merge` carry check-ins
//! between them.

mod cli;
mod commands;
mod config;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::list::ListOptions;
use crate::config::CliConfig;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = EnvFilter::from_default_env();
    for directive in ["spirits=info", "spirits_core=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Completions { shell, output } = &cli.command {
        return commands::completions::run_completions(*shell, output.as_deref());
    }

    let config = CliConfig::load().map_err(CliError::Config)?;
    let db_path = config.resolve_db_path(cli.db_path).map_err(CliError::Config)?;

    match cli.command {
        Commands::Add { drink } => commands::add::run_add(&drink, &db_path, &config).await?,
        Commands::List {
            days,
            from,
            to,
            deleted,
            pending,
            since,
            json,
        } => {
            let options = ListOptions {
                days,
                from: from.as_deref(),
                to: to.as_deref(),
                include_deleted: deleted,
                include_pending: pending,
                since: since.as_deref(),
                as_json: json,
            };
            commands::list::run_list(&options, &db_path, &config).await?;
        }
        Commands::Edit { id, drink } => {
            commands::edit::run_edit(&id, &drink, &db_path, &config).await?;
        }
        Commands::Delete { id } => {
            commands::delete::run_delete(&id, &db_path, &config).await?;
        }
        Commands::Import { external_id, drink } => {
            commands::import::run_import(external_id, &drink, &db_path, &config).await?;
        }
        Commands::Approve { id, revoke } => {
            commands::approve::run_approve(&id, revoke, &db_path, &config).await?;
        }
        Commands::Merge { file } => {
            commands::merge::run_merge(&file, &db_path, &config).await?;
        }
        Commands::Export {
            format,
            output,
            deleted,
        } => {
            commands::export::run_export(format, output.as_deref(), deleted, &db_path, &config)
                .await?;
        }
        Commands::Log { since, json } => {
            commands::log::run_log(since.as_deref(), json, &db_path, &config).await?;
        }
        Commands::Site => commands::site::run_site(&db_path, &config).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
