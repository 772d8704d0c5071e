use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod codec;
mod components;
mod config;
mod controllers;
mod crypto;
mod errors;
mod extractors;
mod flash;
mod form;
mod middleware;
mod models;
mod routes;
mod seed;
mod store;

use config::{Backend, Cli, Command};
use models::ProjectContext;
use store::{Datastore, EmulatorClient, MemoryStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let store = create_store(&cli).await?;
    let default_ctx = ProjectContext::new(&cli.project);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Seed => {
            let count =
                seed::seed(store.as_ref(), &default_ctx, now()).await?;
            println!(
                "Created {count} sample entities in project {}",
                default_ctx.project_id
            );
        }
        Command::Serve => {
            let state = models::AppState {
                store,
                config: Arc::new(cli.app_config()),
            };
            let app = routes::build_app(state);
            tracing::info!("listening on http://{}", cli.listen);
            axum::Server::bind(&cli.listen)
                .serve(app.into_make_service())
                .await?;
        }
    }

    Ok(())
}

fn now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

async fn create_store(cli: &Cli) -> Result<Arc<dyn Datastore>> {
    Ok(match cli.backend {
        Backend::Emulator => {
            tracing::info!(
                host = %cli.emulator_host,
                project = %cli.project,
                "using the datastore emulator"
            );
            Arc::new(EmulatorClient::new(&cli.emulator_host))
        }
        Backend::Memory => {
            let store = MemoryStore::new();
            // Nothing persists, so start with something to look at.
            seed::seed(&store, &ProjectContext::new(&cli.project), now())
                .await?;
            Arc::new(store)
        }
    })
}
