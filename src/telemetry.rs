use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::events::{AuthAttempt, CommandEvent};

/// Per-queue capacity. Bounded so a dead collector cannot grow memory
/// without limit; when a queue is full the newest event is dropped and a
/// warning logged. Producers never wait.
const QUEUE_CAPACITY: usize = 1024;

/// Everything the consumers need to talk to the collector. Injected at
/// construction; no ambient globals.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// POST endpoint for authentication attempts. None disables delivery.
    pub bruteforce_url: Option<String>,
    /// POST endpoint for captured command lines. None disables delivery.
    pub commands_url: Option<String>,
    /// Identity metadata reported with every bruteforce event.
    pub service: String,
    pub honeypot_ip: String,
    pub honeypot_location: String,
    pub honeypot_provider: String,
}

/// Cloneable producer side of the telemetry pipeline. Handed to every
/// session; submission is non-blocking and infallible from the caller's
/// point of view.
#[derive(Clone)]
pub struct TelemetryHandle {
    auth_tx: mpsc::Sender<AuthAttempt>,
    command_tx: mpsc::Sender<CommandEvent>,
}

impl TelemetryHandle {
    pub fn report_auth(&self, attempt: AuthAttempt) {
        match self.auth_tx.try_send(attempt) {
            Ok(()) => log::trace!("Queued auth attempt"),
            Err(TrySendError::Full(attempt)) => {
                log::warn!("Auth telemetry queue full, dropping attempt from {}", attempt.ip);
            }
            Err(TrySendError::Closed(attempt)) => {
                log::error!("Auth telemetry consumer gone, dropping attempt from {}", attempt.ip);
            }
        }
    }

    pub fn report_command(&self, event: CommandEvent) {
        match self.command_tx.try_send(event) {
            Ok(()) => log::trace!("Queued command event"),
            Err(TrySendError::Full(event)) => {
                log::warn!("Command telemetry queue full, dropping event from {}", event.ip);
            }
            Err(TrySendError::Closed(event)) => {
                log::error!("Command telemetry consumer gone, dropping event from {}", event.ip);
            }
        }
    }
}

/// Starts the two consumer tasks and returns the producer handle. Each queue
/// has exactly one consumer; a failed delivery is logged and the event
/// dropped, and the consumer moves on to the next one. There is no retry.
pub fn spawn(client: reqwest::Client, config: CollectorConfig) -> TelemetryHandle {
    let (auth_tx, auth_rx) = mpsc::channel(QUEUE_CAPACITY);
    let (command_tx, command_rx) = mpsc::channel(QUEUE_CAPACITY);

    let config = Arc::new(config);

    tokio::spawn(drain_auth_attempts(client.clone(), config.clone(), auth_rx));
    tokio::spawn(drain_commands(client, config, command_rx));

    TelemetryHandle { auth_tx, command_tx }
}

async fn drain_auth_attempts(
    client: reqwest::Client,
    config: Arc<CollectorConfig>,
    mut rx: mpsc::Receiver<AuthAttempt>,
) {
    while let Some(attempt) = rx.recv().await {
        let Some(url) = config.bruteforce_url.as_deref() else {
            log::debug!("No bruteforce collector configured, discarding attempt from {}", attempt.ip);
            continue;
        };

        let form = [
            ("ip", attempt.ip.as_str()),
            ("service", config.service.as_str()),
            ("type", "bruteforce"),
            ("honeypot_ip", config.honeypot_ip.as_str()),
            ("honeypot_location", config.honeypot_location.as_str()),
            ("honeypot_provider", config.honeypot_provider.as_str()),
        ];

        deliver(&client, url, &form, "bruteforce").await;
    }
    log::trace!("Auth telemetry consumer stopped");
}

async fn drain_commands(
    client: reqwest::Client,
    config: Arc<CollectorConfig>,
    mut rx: mpsc::Receiver<CommandEvent>,
) {
    while let Some(event) = rx.recv().await {
        let Some(url) = config.commands_url.as_deref() else {
            log::debug!("No command collector configured, discarding event from {}", event.ip);
            continue;
        };

        let form = [("ip", event.ip.as_str()), ("cmd", event.line.as_str())];

        deliver(&client, url, &form, "command").await;
    }
    log::trace!("Command telemetry consumer stopped");
}

/// Producer handle backed by bare channels, for exercising emission without
/// consumers or a collector.
#[cfg(test)]
pub(crate) fn test_handle(
    capacity: usize,
) -> (TelemetryHandle, mpsc::Receiver<AuthAttempt>, mpsc::Receiver<CommandEvent>) {
    let (auth_tx, auth_rx) = mpsc::channel(capacity);
    let (command_tx, command_rx) = mpsc::channel(capacity);
    (TelemetryHandle { auth_tx, command_tx }, auth_rx, command_rx)
}

async fn deliver(client: &reqwest::Client, url: &str, form: &[(&str, &str)], kind: &str) {
    match client.post(url).form(form).send().await {
        Ok(response) if response.status() == reqwest::StatusCode::OK => {
            log::trace!("Delivered {} event", kind);
        }
        Ok(response) => {
            log::error!("{} collector returned HTTP {}, event dropped", kind, response.status());
        }
        Err(err) => {
            log::error!("Failed to deliver {} event: {}", kind, err);
        }
    }
}
