// ABOUTME: Entry point for the guvnor CLI application.
// ABOUTME: Parses arguments and dispatches to the deployment engine.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use guvnor::caddy::AdminClient;
use guvnor::config::{DEFAULT_CONFIG_PATH, EngineConfig};
use guvnor::engine::{CleanupArgs, DeployArgs, Engine, RunTaskArgs, StatusArgs};
use guvnor::error::{Error, Result};
use guvnor::runtime::BollardRuntime;
use guvnor::service::ServiceConfig;
use guvnor::state::{DeploymentStatus, FileBasedStore};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    if let Err(e) = run(cli).await {
        handle_error(e);
    }
}

/// Print the error with a hint where one helps, then exit non-zero.
fn handle_error(e: Error) -> ! {
    match &e {
        Error::ConfigNotFound(path) => {
            eprintln!("Error: configuration file not found at {}", path.display());
            eprintln!("       Tip: pass --config or create {}", DEFAULT_CONFIG_PATH);
        }
        Error::NoService => {
            eprintln!("Error: {e}");
            eprintln!("       Tip: run 'guvnor init' to create a service config");
        }
        Error::MultipleServices => {
            eprintln!("Error: {e}");
            eprintln!("       Tip: name the service explicitly");
        }
        _ => {
            eprintln!("Error: {e}");
        }
    }
    std::process::exit(1);
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = EngineConfig::load(&path)?;

    if let Some(ref root) = cli.service_root {
        config.paths.config = root.clone();
    }

    Ok(config)
}

fn build_engine(
    config: EngineConfig,
) -> Result<Engine<BollardRuntime, AdminClient, FileBasedStore>> {
    let docker = BollardRuntime::connect()?;
    let admin = AdminClient::new();
    let state = FileBasedStore::new(config.paths.state.clone());
    Ok(Engine::new(config, docker, admin, state))
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Deploy { service, tag } => {
            let engine = build_engine(config)?;
            let result = engine
                .deploy(DeployArgs {
                    service_name: service,
                    tag,
                })
                .await?;
            println!(
                "Deployed {} (deployment {})",
                result.service_name, result.deployment_id
            );
            Ok(())
        }
        Commands::Status { service } => {
            let engine = build_engine(config)?;
            let status = engine
                .status(StatusArgs {
                    service_name: service,
                })
                .await?;

            println!("Deployment: {}", status.deployment_id);
            if let Some(at) = status.last_deployed_at {
                println!("Last deployed: {}", at.to_rfc3339());
            }
            match status.deployment_status {
                Some(DeploymentStatus::Success) => println!("Status: SUCCESS"),
                Some(DeploymentStatus::Failure) => println!("Status: FAILURE"),
                None => println!("Status: never deployed"),
            }

            for (name, process) in &status.processes {
                println!();
                println!(
                    "{} ({}/{} replicas)",
                    name,
                    process
                        .containers
                        .iter()
                        .filter(|c| c.state == "running")
                        .count(),
                    process.want_replicas
                );
                for container in &process.containers {
                    println!("  {} [{}] {}", container.name, container.state, container.id);
                }
            }
            Ok(())
        }
        Commands::Cleanup { service } => {
            let engine = build_engine(config)?;
            engine
                .cleanup(CleanupArgs {
                    service_name: service,
                })
                .await?;
            println!("Cleanup complete");
            Ok(())
        }
        Commands::Purge { confirm } => {
            if !confirm {
                return Err(Error::Configuration(
                    "purge removes all managed containers and state; pass --confirm".to_string(),
                ));
            }
            let engine = build_engine(config)?;
            engine.purge().await?;
            println!("Purge complete");
            Ok(())
        }
        Commands::Run { service, task } => {
            // With a single argument it names the task, and the service is
            // resolved to the default.
            let (service_name, task_name) = match task {
                Some(task) => (Some(service), task),
                None => (None, service),
            };

            let engine = build_engine(config)?;
            engine
                .run_task(RunTaskArgs {
                    service_name,
                    task_name,
                })
                .await
        }
        Commands::Edit { service } => edit_service(&config, &service).await,
        Commands::Init { service } => init_service(&config, &service),
    }
}

/// Open the service file in the user's editor, then re-validate it.
async fn edit_service(config: &EngineConfig, service: &str) -> Result<()> {
    let path = config.paths.config.join(format!("{}.yaml", service));
    if !path.exists() {
        return Err(Error::ConfigNotFound(path));
    }

    let editor = std::env::var("VISUAL")
        .or_else(|_| std::env::var("EDITOR"))
        .unwrap_or_else(|_| "vi".to_string());

    let status = tokio::process::Command::new(editor)
        .arg(&path)
        .status()
        .await?;
    if !status.success() {
        return Err(Error::Configuration("editor exited with an error".to_string()));
    }

    ServiceConfig::load(&config.paths.config, service)?;
    println!("{} is valid", path.display());
    Ok(())
}

fn init_service(config: &EngineConfig, service: &str) -> Result<()> {
    let dir = &config.paths.config;
    std::fs::create_dir_all(dir)?;

    let path = dir.join(format!("{}.yaml", service));
    if path.exists() {
        return Err(Error::Configuration(format!(
            "service config already exists at {}",
            path.display()
        )));
    }

    std::fs::write(&path, starter_service_yaml(service))?;
    println!("Created {}", path.display());
    Ok(())
}

fn starter_service_yaml(service: &str) -> String {
    format!(
        r#"# Service configuration for {service}
defaults:
  image: nginx
  imageTag: latest

processes:
  web:
    quantity: 1
    caddy:
      hostnames:
        - {service}.example.com
    readyCheck:
      frequency: 1s
      maximum: 30
      http:
        path: /
        expectedStatus: 200

tasks: {{}}
"#
    )
}
