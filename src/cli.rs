// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "guvnor")]
#[command(about = "A deployment tool for a simpler time")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the guvnor configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the directory containing service configs
    #[arg(long, global = true)]
    pub service_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy a new generation of a service
    Deploy {
        /// Service to deploy (defaults to the only service)
        service: Option<String>,

        /// Image tag to deploy, overriding the configured tags
        #[arg(long)]
        tag: Option<String>,
    },

    /// Show the deployment state of a service
    Status {
        /// Service to inspect (defaults to the only service)
        service: Option<String>,
    },

    /// Remove containers left over from previous deployments
    Cleanup {
        /// Service to clean up (defaults to the only service)
        service: Option<String>,
    },

    /// Remove every guvnor-managed container and all persisted state
    Purge {
        /// Confirm that everything should be removed
        #[arg(long)]
        confirm: bool,
    },

    /// Run a task defined by a service
    Run {
        /// Service name, or the task name when only one argument is given
        service: String,

        /// Task to run
        task: Option<String>,
    },

    /// Open a service configuration in $EDITOR and validate it
    Edit {
        /// Service to edit
        service: String,
    },

    /// Create a starter service configuration
    Init {
        /// Name for the new service
        #[arg(default_value = "sample")]
        service: String,
    },
}
