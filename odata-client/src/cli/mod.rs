//! Command-line front end
//!
//! ```bash
//! odata-cli url Products --key 5 --nav Category
//! odata-cli get Products --select Name,Price --top 10 --format csv
//! odata-cli count Products --filter "Price gt 5"
//! ```

pub mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use crate::api::ODataClient;
use crate::config::{SERVICE_ROOT_ENV, Settings};
use commands::resource::ResourceCommands;
use commands::resource::handler::handle_resource_command;

#[derive(Parser)]
#[command(name = "odata-cli")]
#[command(version)]
#[command(about = "Build and run OData requests from the command line")]
pub struct Cli {
    #[command(subcommand)]
    pub command: ResourceCommands,

    /// Settings file (defaults to <config_dir>/odata-client/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Service root URL; overrides the settings file
    #[arg(long, global = true)]
    pub root: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Settings from the file, falling back to a bare root URL when no file exists
fn load_settings(config: Option<PathBuf>, root: Option<String>) -> Result<Settings> {
    let path = config.or_else(|| Settings::default_path().filter(|p| p.exists()));
    let mut settings = match path {
        Some(path) => Settings::load(Some(&path))?,
        None => {
            let root = root
                .clone()
                .or_else(|| std::env::var(SERVICE_ROOT_ENV).ok())
                .with_context(|| {
                    format!(
                        "No settings file found; pass --config, --root or set {}",
                        SERVICE_ROOT_ENV
                    )
                })?;
            Settings::builder(root).build()?
        }
    };
    if let Some(root) = root {
        settings.service_root_url = root;
        settings = settings.normalized()?;
    }
    Ok(settings)
}

pub async fn run(cli: Cli) -> Result<()> {
    if cli.no_color {
        colored::control::set_override(false);
    }

    let settings = load_settings(cli.config, cli.root)?;
    let client = ODataClient::with_http(settings).context("Failed to create OData client")?;
    handle_resource_command(&client, cli.command).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_get() {
        let cli = Cli::try_parse_from([
            "odata-cli", "get", "Products", "--key", "5", "--format", "csv", "--root",
            "https://example.org/odata",
        ])
        .unwrap();
        assert_eq!(cli.root.as_deref(), Some("https://example.org/odata"));
        match cli.command {
            ResourceCommands::Get { resource, format, .. } => {
                assert_eq!(resource.entity_set, "Products");
                assert_eq!(resource.key.as_deref(), Some("5"));
                assert_eq!(format, commands::resource::OutputFormat::Csv);
            }
            _ => panic!("expected get"),
        }
    }

    #[test]
    fn test_load_settings_reads_file_and_root_override() {
        let path = std::env::temp_dir().join(format!("odata-cli-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "service_root_url = \"https://a.example/svc\"\n").unwrap();

        let settings = load_settings(Some(path.clone()), None).unwrap();
        assert_eq!(settings.service_root_url, "https://a.example/svc/");

        let settings = load_settings(Some(path.clone()), Some("https://b.example".to_string())).unwrap();
        assert_eq!(settings.service_root_url, "https://b.example/");
        std::fs::remove_file(path).unwrap();
    }
}
