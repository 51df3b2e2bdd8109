//! Tally CLI - push commands to and pull changes from a Tally sync server

mod cli;
mod client;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::client::ApiClient;
use crate::commands::checkpoints::run_checkpoints;
use crate::commands::first_sync::run_first_sync;
use crate::commands::health::run_health;
use crate::commands::pull::run_pull;
use crate::commands::records::{
    add_command, delete_command, run_commands, run_push, update_command, RecordFields,
};
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

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tally=warn".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    let client = || ApiClient::new(cli.api_url.clone(), cli.access_token.clone());

    match cli.command {
        Commands::Add {
            ref name,
            ref temp_id,
            ref icon,
            ref color,
            ref currency,
        } => {
            let fields = RecordFields {
                name: Some(name.clone()),
                icon: icon.clone(),
                color: color.clone(),
                currency: currency.clone(),
                ..RecordFields::default()
            };
            run_commands(&client()?, vec![add_command(fields, temp_id.clone())]).await?;
        }
        Commands::Update {
            ref id,
            ref name,
            ref icon,
            ref color,
            ref currency,
            order,
            archived,
            favorite,
        } => {
            let fields = RecordFields {
                name: name.clone(),
                icon: icon.clone(),
                color: color.clone(),
                currency: currency.clone(),
                order,
                archived,
                favorite,
            };
            run_commands(&client()?, vec![update_command(id, fields)?]).await?;
        }
        Commands::Delete { ref id } => {
            run_commands(&client()?, vec![delete_command(id)?]).await?;
        }
        Commands::Push { ref file } => run_push(&client()?, file.as_deref()).await?,
        Commands::Pull {
            ref token,
            ref resource_types,
        } => run_pull(&client()?, token, resource_types.clone()).await?,
        Commands::FirstSync { mode, ref file } => {
            run_first_sync(&client()?, mode, file.as_deref()).await?;
        }
        Commands::Health => run_health(&client()?).await?,
        Commands::Checkpoints {
            ref db_path,
            ref user,
            limit,
            json,
        } => run_checkpoints(db_path, user, limit, json).await?,
    }

    Ok(())
}
