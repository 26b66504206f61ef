use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

mod commands;
mod context;
mod logging;

use commands::{bootstrap, decide, inspect, validate};

/// rbacctl - Command line interface for role-based access control
#[derive(Parser)]
#[command(name = "rbacctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the YAML configuration
    #[arg(short, long, global = true, env = "RBAC_CONFIG", default_value = "rbac.yaml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write daily rolling log files to this directory
    #[arg(long, global = true, env = "RBAC_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the predefined policy file and admin users to the store
    Bootstrap {
        /// Keep running and reapply the policy file when it changes
        #[arg(long)]
        watch: bool,
    },

    /// Decide whether a user holds a permission
    Decide {
        /// User entity reference, e.g. user:default/tom
        user: String,

        /// Permission name
        permission: String,

        /// Resource type of a resource permission
        #[arg(short, long)]
        resource_type: Option<String>,

        /// Permission action (defaults to "use")
        #[arg(short, long)]
        action: Option<String>,

        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List policies and role assignments
    Policies {
        /// Only rules for this subject or member
        #[arg(short, long)]
        subject: Option<String>,

        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List role metadata
    Roles {
        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check a predefined policy file without applying it
    Validate {
        /// Policy file to check
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let _guard = match logging::init_logging(cli.verbose, cli.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let outcome = match cli.command {
        Commands::Bootstrap { watch } => bootstrap::execute(&cli.config, watch).await,
        Commands::Decide {
            user,
            permission,
            resource_type,
            action,
            format,
        } => decide::execute(&cli.config, user, permission, resource_type, action, format).await,
        Commands::Policies { subject, format } => {
            inspect::policies(&cli.config, subject, format).await
        }
        Commands::Roles { format } => inspect::roles(&cli.config, format).await,
        Commands::Validate { file } => validate::execute(&file),
    };

    if let Err(e) = outcome {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}
