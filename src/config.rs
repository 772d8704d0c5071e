//! Runtime configuration comes from the command line, with every flag also
//! readable from the environment (and so from `.env`). The handful of
//! hard-coded knobs live here too.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 500;
/// How much of a blob's base64 we show before cutting it off with `...`.
pub const BLOB_PREVIEW_CHARS: usize = 100;
/// Table cells are truncated to this many characters.
pub const CELL_PREVIEW_CHARS: usize = 80;
/// Blank "add a property" rows on the create form. The edit form gets one.
pub const NEW_PROPERTY_ROWS: usize = 5;

#[derive(Debug, Parser)]
#[command(name = "datastore-browser")]
#[command(about = "Browse and edit entities in a Datastore emulator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Address the web UI listens on
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:8000")]
    pub listen: SocketAddr,

    /// host:port of the Datastore emulator
    #[arg(long, env = "DATASTORE_EMULATOR_HOST", default_value = "localhost:8081")]
    pub emulator_host: String,

    /// Project used when the browser hasn't picked one
    #[arg(long, env = "GOOGLE_CLOUD_PROJECT", default_value = "test-project")]
    pub project: String,

    /// Other projects offered in the project switcher, comma separated
    #[arg(long, env = "DATASTORE_PROJECTS", value_delimiter = ',')]
    pub projects: Vec<String>,

    #[arg(long, env = "DATASTORE_BACKEND", value_enum, default_value_t = Backend::Emulator)]
    pub backend: Backend,

    /// Key for signing flash-message cookies
    #[arg(long, env = "SESSION_SECRET", hide_env_values = true)]
    pub session_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum Command {
    /// Run the web UI (the default)
    Serve,
    /// Write the sample User/Product/Order/Settings entities
    Seed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Talk to the Datastore emulator over HTTP
    Emulator,
    /// Keep everything in process memory, pre-loaded with sample data
    Memory,
}

/// The part of the configuration request handlers need.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub default_project: String,
    /// Always starts with `default_project`.
    pub projects: Vec<String>,
    pub flash_secret: Vec<u8>,
}

impl Cli {
    pub fn app_config(&self) -> AppConfig {
        let flash_secret = match &self.session_secret {
            Some(secret) if !secret.is_empty() => secret.clone().into_bytes(),
            _ => {
                tracing::warn!(
                    "SESSION_SECRET is not set; flash messages will not survive a restart"
                );
                uuid::Uuid::new_v4().as_bytes().to_vec()
            }
        };
        AppConfig::new(&self.project, &self.projects, flash_secret)
    }
}

impl AppConfig {
    pub fn new(
        default_project: &str,
        extra_projects: &[String],
        flash_secret: Vec<u8>,
    ) -> Self {
        let mut projects = vec![default_project.to_string()];
        for p in extra_projects {
            let p = p.trim();
            if !p.is_empty() && !projects.iter().any(|known| known == p) {
                projects.push(p.to_string());
            }
        }
        Self {
            default_project: default_project.to_string(),
            projects,
            flash_secret,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_list_dedupes_and_leads_with_default() {
        let config = AppConfig::new(
            "test-project",
            &[
                "other".to_string(),
                " test-project ".to_string(),
                "".to_string(),
                "other".to_string(),
            ],
            b"secret".to_vec(),
        );
        assert_eq!(config.projects, vec!["test-project", "other"]);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["datastore-browser"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.backend, Backend::Emulator);
    }

    #[test]
    fn test_cli_seed_with_projects() {
        let cli = Cli::try_parse_from([
            "datastore-browser",
            "--projects",
            "a,b",
            "--backend",
            "memory",
            "seed",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Command::Seed)));
        assert_eq!(cli.projects, vec!["a", "b"]);
        assert_eq!(cli.backend, Backend::Memory);
    }
}
