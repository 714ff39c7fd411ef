pub mod handler;

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum ResourceCommands {
    /// Print the request URL for a resource without sending anything
    Url {
        #[command(flatten)]
        resource: ResourceArgs,
    },
    /// Fetch a resource and print the result
    Get {
        #[command(flatten)]
        resource: ResourceArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Follow next links and return every page
        #[arg(long)]
        all: bool,

        /// Write the result to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the server-side count of a collection
    Count {
        #[command(flatten)]
        resource: ResourceArgs,
    },
}

/// Flags describing one resource
#[derive(Args, Debug, Clone, Default)]
pub struct ResourceArgs {
    /// Entity set name, e.g. Products
    pub entity_set: String,

    /// Entity type; defaults to the type configured for the entity set
    #[arg(short = 't', long = "type")]
    pub type_name: Option<String>,

    /// Entity key as JSON (5, "abc", {"OrderID":1,"LineNo":2}); bare text is a string key
    #[arg(short, long)]
    pub key: Option<String>,

    /// Navigation property to follow from the keyed entity (repeatable)
    #[arg(short, long)]
    pub nav: Vec<String>,

    /// Comma-separated fields
    #[arg(short, long)]
    pub select: Option<String>,

    /// Filter expression, raw or as a JSON filter object
    #[arg(long)]
    pub filter: Option<String>,

    /// Search expression
    #[arg(long)]
    pub search: Option<String>,

    /// Order by, e.g. "Name desc"
    #[arg(long)]
    pub order_by: Option<String>,

    /// Expand, raw or as a JSON expand object
    #[arg(short, long)]
    pub expand: Option<String>,

    #[arg(long)]
    pub top: Option<u64>,

    #[arg(long)]
    pub skip: Option<u64>,

    /// Custom query parameter as name=value (repeatable)
    #[arg(short, long = "param")]
    pub params: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    JsonCompact,
    Csv,
}
