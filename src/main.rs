//! ptero-hub command line
//!
//! Loads the panels file, builds a registry and runs one subcommand against it.
//! The registry is always closed before exit, including on Ctrl-C.

use anyhow::{anyhow, Result};

use ptero_hub::config::{self, Command};
use ptero_hub::logger::{self, log};
use ptero_hub::{outcome_to_wire, ClientServer, HubConfig, PanelRegistry};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Install ring as the default crypto provider for rustls
    // This must be done before any TLS operations
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    // Parse CLI arguments
    let cli = config::CliArgs::parse_args();
    cli.validate()?;

    // Initialize logger
    logger::init_logger(&cli.log_mode);

    let hub_config = HubConfig::load(&cli.config_file)?;
    log::info!(
        config_file = %cli.config_file.display(),
        panels = hub_config.panels.len(),
        "Starting ptero-hub"
    );

    let registry = PanelRegistry::from_config(&hub_config, cli.transport_settings())?;

    let result = tokio::select! {
        result = run(&registry, &cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, shutting down...");
            Ok(())
        }
    };

    registry.close().await;
    result
}

async fn run(registry: &PanelRegistry, command: &Command) -> Result<()> {
    match command {
        Command::Servers { fast } => {
            let servers = registry.get_servers(*fast).await;
            for server in &servers {
                print_server(server);
            }
            log::info!(count = servers.len(), fast = *fast, "Servers listed");
        }
        Command::Server { id } => {
            let server = registry
                .get_server(id)
                .await?
                .ok_or_else(|| anyhow!("Server {} not found on any panel", id))?;
            print_server(&server);
            if let Some(node) = server.node() {
                println!("  node:  {} ({})", node.name, node.fqdn);
            }
            if let Some(owner) = server.owner() {
                println!("  owner: {} <{}>", owner.username, owner.email);
            }
            for allocation in server.allocations() {
                println!("  allocation: {}:{}", allocation.ip, allocation.port);
            }
        }
        Command::Command {
            id,
            command,
            timeout,
        } => {
            let server = registry
                .get_server(id)
                .await?
                .ok_or_else(|| anyhow!("Server {} not found on any panel", id))?;
            let (response, outcome) = server.capture_command(command, *timeout).await?;
            log::info!(
                panel = %server.panel_id(),
                server = %server.identifier(),
                status = response.status.as_u16(),
                "Command sent"
            );
            println!("{}", outcome_to_wire(&outcome));
        }
        Command::Nodes { panel } => {
            let api = registry.application_api(panel)?;
            for node in api.list_nodes().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    node.panel_id, node.id, node.name, node.fqdn
                );
            }
        }
    }
    Ok(())
}

fn print_server(server: &ClientServer) {
    let state = server
        .resources()
        .map(|r| r.current_state.as_str())
        .unwrap_or("-");
    println!(
        "{}@{}\t{}\t{}",
        server.identifier(),
        server.panel_id(),
        server.name(),
        state
    );
}
