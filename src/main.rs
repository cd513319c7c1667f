mod app;
mod auth;
mod events;
mod keys;
mod paths;
mod server;
mod shell;
mod telemetry;
mod terminal;

use std::sync::Arc;

use clap::Parser;
use russh::SshId;
use russh::server::Server as _;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::app::{App, DeployConfig};
use crate::auth::CredentialPolicy;
use crate::paths::PathManager;
use crate::server::HoneypotServer;
use crate::shell::{CommandEngine, ResponseStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::builder()
        .parse_env(env_logger::Env::default())
        .filter_level(log::LevelFilter::Debug)
        .filter_module("russh", log::LevelFilter::Info)
        .init();

    let app = App::parse();
    let paths = PathManager::new();
    paths.log_paths();

    let config_file = app.config_file.clone().unwrap_or_else(|| paths.config_file());
    let deploy = DeployConfig::load(&config_file)?;

    log::info!("Current config:");
    for interface in &app.interfaces {
        log::info!("Interface: {}", interface);
    }
    log::info!("Hostname: {}", deploy.hostname);
    log::info!("Canned responses: {}", app.static_dir.display());
    log::info!("Max connections: {}", app.max_connections);

    let store = match ResponseStore::load(&app.static_dir) {
        Ok(store) => {
            if store.is_empty() {
                log::warn!("No canned responses found in {}", app.static_dir.display());
            }
            store
        }
        Err(err) => {
            log::warn!(
                "Failed to load canned responses from {}: {}. Every supported command will fault",
                app.static_dir.display(), err
            );
            ResponseStore::default()
        }
    };
    let engine = CommandEngine::new(Arc::new(store));

    let key_folder = app.key_folder.clone().unwrap_or_else(|| paths.key_dir.clone());
    let keys = keys::load_or_generate_keys(&key_folder);

    // Set up the SSH server configuration
    let config = russh::server::Config {
        inactivity_timeout: Some(std::time::Duration::from_secs(1800)),
        auth_rejection_time: std::time::Duration::from_secs(3),
        auth_rejection_time_initial: Some(std::time::Duration::from_secs(0)),
        server_id: SshId::Standard(String::from("SSH-2.0-OpenSSH_8.2p1 Ubuntu-4ubuntu0.4")), // Mimic a real SSH server
        keys: vec![keys.ed25519, keys.rsa],
        ..Default::default()
    };
    let config = Arc::new(config);

    // One HTTP client, shared by both telemetry consumers
    let client = reqwest::Client::builder().use_rustls_tls().build()?;
    let telemetry = telemetry::spawn(client, deploy.collector_config());

    let credentials = CredentialPolicy::new(deploy.user.clone(), deploy.password.clone());
    let connection_limit = Arc::new(Semaphore::new(app.max_connections));

    log::info!("Reporting authentication attempts and commands to the collector");

    let mut tasks = Vec::new();

    for interface in app.interfaces {
        let conf = config.clone();
        let mut server_handler = HoneypotServer::new(
            credentials.clone(),
            deploy.hostname.clone(),
            app.authentication_banner.clone(),
            engine.clone(),
            telemetry.clone(),
            connection_limit.clone(),
        );
        tasks.push(tokio::spawn(async move {
            // Start the SSH server
            log::info!("Starting SSH honeypot on {}", interface);
            match server_handler.run_on_address(conf, interface).await {
                Ok(_) => {}
                Err(err) => {
                    // Without a listener the honeypot has no purpose
                    log::error!("Failed to start server on interface {}: {:?}", interface, err);
                    std::process::exit(1);
                }
            };
        }))
    }

    // Ctrl+C handler for graceful shutdown
    let handle = tokio::task::spawn(async move {
        log::info!("Waiting for shutdown signal");
        #[cfg(unix)]
        {
            let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("Failed to listen for SIGTERM");
            tokio::select! {
                _ = sig.recv() => {},
                _ = tokio::signal::ctrl_c() => {},
            }
        }
        #[cfg(windows)]
        tokio::signal::ctrl_c().await.expect("Failed to listen for ctrl+c");

        log::info!("Shutting down honeypot...");
        // Queued telemetry that has not been flushed yet is discarded
        tasks.into_iter().for_each(|task: JoinHandle<()>| task.abort());
    });

    match handle.await {
        Ok(_) => {},
        Err(err) => {
            log::error!("Failed to run ctrl+c listener or failed: {:?}", err);
        }
    }

    log::info!("Honeypot server shut down successfully");
    Ok(())
}
