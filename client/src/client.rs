//! Client context, batch delivery loop, and feedback collector.
//!
//! The legacy gateway never acknowledges a notification. It reports a
//! failure asynchronously with a 6-byte error response naming the failed
//! notification by identifier, then closes the socket. The delivery loop
//! therefore watches the read side while writing, and after an error
//! reconnects and resumes the batch right after the reported identifier.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::time::Duration;

use apns_wire::{
    ApnsStatus, BinaryMessage, DeviceToken, ErrorResponse, Payload, WireError,
    ERROR_RESPONSE_SIZE, FEEDBACK_RECORD_SIZE,
};
use bitflags::bitflags;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, timeout};

use crate::credentials::{self, Credentials};
use crate::error::{ApnsError, SendError};
use crate::gateway::Mode;
use crate::logging::{LogCallback, LogLevel, Logger};
use crate::transport::{self, Connection};

/// How long one multiplex wait may last before it is retried
const SEND_WAIT: Duration = Duration::from_secs(10);

/// How long to wait after the last write for a late error response
const DRAIN_WAIT: Duration = Duration::from_secs(1);

/// Idle timeout that terminates feedback collection
const FEEDBACK_WAIT: Duration = Duration::from_secs(3);

/// Pause between closing a failed connection and reconnecting
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

bitflags! {
    /// Client behavior options
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Options: u32 {
        /// Reconnect and resume the batch after a recoverable send error
        const RECONNECT_ON_ERROR = 1 << 0;
        /// Copy enabled log messages to stderr
        const LOG_TO_STDERR = 1 << 1;
    }
}

/// Callback invoked once for every token the gateway rejects during a send
pub type InvalidTokenCallback = Box<dyn Fn(&str, u32) + Send + Sync>;

/// Outcome of one inner send pass over the token list
enum PassOutcome {
    /// Every remaining notification was written and no error response
    /// arrived within the drain window
    Delivered,
    /// The pass stopped at `index`
    Failed { error: ApnsError, index: u32 },
}

/// A connection to the Apple Push Notification Service.
///
/// A client owns at most one connection, to either the delivery gateway or
/// the feedback endpoint of the configured [`Mode`]. It is not a pooled or
/// shared handle: every method takes `&mut self`, so a single owner drives
/// connect, send, and close in sequence.
pub struct Client {
    credentials: Option<Credentials>,
    ca_file: Option<PathBuf>,
    mode: Mode,
    options: Options,
    logger: Logger,
    invalid_token_callback: Option<InvalidTokenCallback>,
    connection: Option<Connection>,
    feedback: bool,
    endpoint: Option<(String, u16)>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Create a client with production mode, error-level logging, and no
    /// credentials.
    pub fn new() -> Self {
        crate::library_init();
        Self {
            credentials: None,
            ca_file: None,
            mode: Mode::Production,
            options: Options::empty(),
            logger: Logger::new(),
            invalid_token_callback: None,
            connection: None,
            feedback: false,
            endpoint: None,
        }
    }

    /// Use a PEM certificate and private key, with an optional key password
    pub fn set_certificate(
        &mut self,
        certificate: impl AsRef<Path>,
        key: impl AsRef<Path>,
        key_password: Option<&str>,
    ) {
        self.credentials = Some(Credentials::Pem {
            certificate: certificate.as_ref().to_path_buf(),
            key: key.as_ref().to_path_buf(),
            key_password: key_password.map(str::to_string),
        });
    }

    /// Use a PKCS#12 bundle; the password is required
    pub fn set_pkcs12(&mut self, path: impl AsRef<Path>, password: &str) {
        self.credentials = Some(Credentials::Pkcs12 {
            path: path.as_ref().to_path_buf(),
            password: password.to_string(),
        });
    }

    /// Trust additional CA certificates from a PEM file, on top of the
    /// bundled Mozilla roots. Useful against private gateways.
    pub fn set_ca_certificate(&mut self, path: impl AsRef<Path>) {
        self.ca_file = Some(path.as_ref().to_path_buf());
    }

    /// Select sandbox or production endpoints
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Set the behavior options
    pub fn set_behavior(&mut self, options: Options) {
        self.options = options;
        self.logger.to_stderr = options.contains(Options::LOG_TO_STDERR);
    }

    /// Set the log level bitmask
    pub fn set_log_level(&mut self, level: LogLevel) {
        self.logger.level = level;
    }

    /// Set the log callback
    pub fn set_log_callback(&mut self, callback: LogCallback) {
        self.logger.callback = Some(callback);
    }

    /// Set the callback invoked for every token the gateway rejects
    pub fn set_invalid_token_callback(&mut self, callback: InvalidTokenCallback) {
        self.invalid_token_callback = Some(callback);
    }

    /// Current mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current behavior options
    pub fn behavior(&self) -> Options {
        self.options
    }

    /// Current log level bitmask
    pub fn log_level(&self) -> LogLevel {
        self.logger.level
    }

    /// Path of the configured PEM certificate, if any
    pub fn certificate(&self) -> Option<&Path> {
        match &self.credentials {
            Some(Credentials::Pem { certificate, .. }) => Some(certificate),
            _ => None,
        }
    }

    /// Path of the configured PEM private key, if any
    pub fn private_key(&self) -> Option<&Path> {
        match &self.credentials {
            Some(Credentials::Pem { key, .. }) => Some(key),
            _ => None,
        }
    }

    /// Whether a connection is currently open
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Connect to the delivery gateway of the configured mode.
    ///
    /// Idempotent while a connection is open.
    pub async fn connect(&mut self) -> Result<(), ApnsError> {
        let endpoint = self.mode.gateway();
        self.open_connection(endpoint.host, endpoint.port, false)
            .await
    }

    /// Connect to the feedback endpoint of the configured mode.
    ///
    /// Idempotent while a connection is open. An open connection keeps the
    /// direction it was opened with: calling this while the delivery gateway
    /// connection is open is a no-op, and [`Client::feedback`] will still be
    /// rejected until the gateway connection is closed and a feedback one is
    /// opened.
    pub async fn feedback_connect(&mut self) -> Result<(), ApnsError> {
        let endpoint = self.mode.feedback();
        self.open_connection(endpoint.host, endpoint.port, true)
            .await
    }

    async fn open_connection(
        &mut self,
        host: &str,
        port: u16,
        feedback: bool,
    ) -> Result<(), ApnsError> {
        if self.connection.is_some() {
            // The open connection keeps its direction; a feedback_connect
            // while the gateway connection is open (or vice versa) does not
            // retarget it. Close first to switch endpoints.
            self.logger.debug("Connection already opened");
            return Ok(());
        }
        self.logger.info(&format!("Connecting to {host}:{port}..."));

        let Some(credentials) = &self.credentials else {
            let error = ApnsError::CertificateNotSet;
            self.logger
                .error(&format!("Certificate file not set (errno: {})", error.code()));
            return Err(error);
        };
        if let Credentials::Pem {
            certificate, key, ..
        } = credentials
        {
            if certificate.as_os_str().is_empty() {
                let error = ApnsError::CertificateNotSet;
                self.logger
                    .error(&format!("Certificate file not set (errno: {})", error.code()));
                return Err(error);
            }
            if key.as_os_str().is_empty() {
                let error = ApnsError::PrivateKeyNotSet;
                self.logger
                    .error(&format!("Private key file not set (errno: {})", error.code()));
                return Err(error);
            }
        }

        let config = credentials::build_client_config(credentials, self.ca_file.as_deref())
            .inspect_err(|error| {
                self.logger
                    .error(&format!("{error} (errno: {})", error.code()));
            })?;

        let connection = transport::open(host, port, config, &self.logger).await?;
        self.connection = Some(connection);
        self.feedback = feedback;
        self.endpoint = Some((host.to_string(), port));
        Ok(())
    }

    /// Reconnect to the endpoint of the previous connection
    async fn reopen(&mut self) -> Result<(), ApnsError> {
        let Some((host, port)) = self.endpoint.clone() else {
            return Err(ApnsError::NotConnected);
        };
        let feedback = self.feedback;
        self.open_connection(&host, port, feedback).await
    }

    /// Close the connection.
    ///
    /// Performs a best-effort TLS shutdown and releases the socket. Safe to
    /// call on a closed client.
    pub async fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            self.logger.info("Connection closing...");
            connection.shutdown(&self.logger).await;
            self.feedback = false;
            self.logger.info("Connection closed");
        }
    }

    /// Deliver one payload to every token in the list.
    ///
    /// Requires an open gateway connection and a non-empty token list
    /// (panics on an empty one). Tokens are 64-character hex strings;
    /// notifications are written in list order with the token index as the
    /// notification identifier.
    ///
    /// On success, returns the tokens the gateway rejected as invalid; the
    /// rest were delivered. With [`Options::RECONNECT_ON_ERROR`] set, an
    /// invalid token, a closed connection, or a service shutdown triggers a
    /// reconnect and the batch resumes right after the failed index. On
    /// failure, the returned [`SendError`] still carries the invalid tokens
    /// collected so far.
    pub async fn send(
        &mut self,
        payload: &Payload,
        tokens: &[String],
    ) -> Result<Vec<String>, SendError> {
        assert!(!tokens.is_empty(), "token list must not be empty");

        let fail = |error: ApnsError| SendError {
            error,
            invalid_tokens: Vec::new(),
        };

        if self.connection.is_none() || self.feedback {
            self.logger.error("Connection was not opened");
            return Err(fail(ApnsError::NotConnected));
        }

        self.logger.info("Creating binary message from payload...");
        let mut message = match BinaryMessage::from_payload(payload) {
            Ok(message) => message,
            Err(error) => {
                let error = ApnsError::from(error);
                self.logger.error(&format!(
                    "Unable to create binary message: {error} (errno: {})",
                    error.code()
                ));
                return Err(fail(error));
            }
        };

        let decoded = match tokens
            .iter()
            .map(|token| DeviceToken::from_hex(token))
            .collect::<Result<Vec<_>, WireError>>()
        {
            Ok(decoded) => decoded,
            Err(error) => {
                self.logger
                    .error(&format!("Malformed device token: {error}"));
                return Err(fail(ApnsError::TokenInvalid));
            }
        };

        self.logger.info(&format!(
            "Sending notification to {} device(s)...",
            tokens.len()
        ));

        let count = tokens.len() as u32;
        let mut invalid_tokens: Vec<String> = Vec::new();
        let mut start_index: u32 = 0;
        let mut auto_reconnect = false;

        loop {
            if auto_reconnect {
                self.logger.info("Reconnecting...");
                self.close().await;
                sleep(RECONNECT_DELAY).await;
                if let Err(error) = self.reopen().await {
                    return Err(SendError {
                        error,
                        invalid_tokens,
                    });
                }
            }

            let (error, failed_index) =
                match self.send_pass(&mut message, tokens, &decoded, start_index).await {
                    PassOutcome::Delivered => return Ok(invalid_tokens),
                    PassOutcome::Failed { error, index } => (error, index),
                };

            if error == ApnsError::TokenInvalid {
                // The identifier comes off the wire; ignore one that does not
                // name a notification of this batch.
                if let Some(token) = tokens.get(failed_index as usize) {
                    self.logger
                        .error(&format!("Invalid token: {token} (index: {failed_index})"));
                    invalid_tokens.push(token.clone());
                    if let Some(callback) = &self.invalid_token_callback {
                        callback(token, failed_index);
                    }
                }
            }
            self.logger.error(&format!(
                "Could not send notification: {error} (errno: {})",
                error.code()
            ));

            let next_start = if error == ApnsError::TokenInvalid {
                failed_index + 1
            } else {
                failed_index
            };

            let recoverable = matches!(
                error,
                ApnsError::ConnectionClosed | ApnsError::ServiceShutdown | ApnsError::TokenInvalid
            );
            if next_start < count
                && self.options.contains(Options::RECONNECT_ON_ERROR)
                && recoverable
            {
                start_index = failed_index + 1;
                auto_reconnect = true;
            } else if next_start >= count && error == ApnsError::TokenInvalid {
                // The batch is exhausted and the only failure was a rejected
                // token, which is already reported through invalid_tokens.
                return Ok(invalid_tokens);
            } else {
                return Err(SendError {
                    error,
                    invalid_tokens,
                });
            }
        }
    }

    /// One pass over `tokens[start_index..]`: write each notification while
    /// watching for an error response, then drain for a late one.
    async fn send_pass(
        &mut self,
        message: &mut BinaryMessage,
        tokens: &[String],
        decoded: &[DeviceToken],
        start_index: u32,
    ) -> PassOutcome {
        let logger = &self.logger;
        let Some(connection) = self.connection.as_mut() else {
            return PassOutcome::Failed {
                error: ApnsError::NotConnected,
                index: start_index,
            };
        };

        let reader = &mut connection.reader;
        let writer = &mut connection.writer;
        let mut response = [0u8; ERROR_RESPONSE_SIZE];
        let count = tokens.len() as u32;

        let mut i = start_index;
        while i < count {
            message.set_id(i);
            message.set_token(&decoded[i as usize]);
            logger.info(&format!(
                "Sending notification to device with token {}...",
                tokens[i as usize]
            ));

            let frame = message.as_bytes();
            let mut write = pin!(async {
                writer.write_all(frame).await?;
                writer.flush().await
            });

            loop {
                tokio::select! {
                    biased;

                    // An error response can arrive at any point; the gateway
                    // closes the socket right after sending it.
                    read = reader.read(&mut response) => {
                        return match read {
                            Ok(0) => {
                                logger.error("Unable to read data from socket: connection was closed");
                                PassOutcome::Failed { error: ApnsError::ConnectionClosed, index: i }
                            }
                            Ok(n) => {
                                logger.debug(&format!("{n} byte(s) has been read from socket"));
                                classify_response(logger, &response[..n], i)
                            }
                            Err(error) => {
                                let error = transport::map_read_error(error);
                                logger.error(&format!(
                                    "Unable to read data from socket: {error} (errno: {})",
                                    error.code()
                                ));
                                PassOutcome::Failed { error, index: i }
                            }
                        };
                    }

                    written = &mut write => {
                        match written {
                            Ok(()) => break,
                            Err(error) => {
                                let error = transport::map_write_error(error);
                                logger.error(&format!(
                                    "Unable to write data to socket: {error} (errno: {})",
                                    error.code()
                                ));
                                return PassOutcome::Failed { error, index: i };
                            }
                        }
                    }

                    () = sleep(SEND_WAIT) => {
                        logger.debug("Socket not ready, continuing to wait");
                    }
                }
            }

            logger.info("Notification has been sent");
            i += 1;
        }

        // The gateway may report an error for the last notifications only
        // after everything was written.
        logger.debug("Waiting for a late gateway response...");
        match timeout(DRAIN_WAIT, reader.read(&mut response)).await {
            Err(_elapsed) => PassOutcome::Delivered,
            Ok(Ok(0)) => {
                logger.error("Unable to read data from socket: connection was closed");
                PassOutcome::Failed {
                    error: ApnsError::ConnectionClosed,
                    index: i,
                }
            }
            Ok(Ok(n)) => {
                logger.debug(&format!("{n} byte(s) has been read from socket"));
                classify_response(logger, &response[..n], i)
            }
            Ok(Err(error)) => {
                let error = transport::map_read_error(error);
                logger.error(&format!(
                    "Unable to read data from socket: {error} (errno: {})",
                    error.code()
                ));
                PassOutcome::Failed { error, index: i }
            }
        }
    }

    /// Collect device tokens from the Feedback Service.
    ///
    /// Requires an open feedback connection. Drains records until the stream
    /// is idle for 3 seconds or the service closes it, then returns the hex
    /// tokens of devices the service believes are permanently undeliverable.
    pub async fn feedback(&mut self) -> Result<Vec<String>, ApnsError> {
        let logger = &self.logger;
        let connection = match self.connection.as_mut() {
            Some(connection) if self.feedback => connection,
            _ => {
                logger.error("Connection to the feedback service was not opened");
                return Err(ApnsError::NotConnectedFeedback);
            }
        };

        let mut tokens = Vec::new();
        let mut record = [0u8; FEEDBACK_RECORD_SIZE];

        loop {
            let read = timeout(FEEDBACK_WAIT, async {
                let n = connection.reader.read(&mut record).await?;
                if n == 0 {
                    return Ok(0);
                }
                if n < FEEDBACK_RECORD_SIZE {
                    connection.reader.read_exact(&mut record[n..]).await?;
                }
                Ok::<usize, io::Error>(FEEDBACK_RECORD_SIZE)
            })
            .await;

            match read {
                Err(_elapsed) => {
                    logger.debug("Feedback stream idle");
                    break;
                }
                Ok(Ok(0)) => {
                    logger.debug("Feedback stream closed by peer");
                    break;
                }
                Ok(Ok(_)) => {
                    let parsed = apns_wire::FeedbackRecord::parse(&record)
                        .map_err(|_| ApnsError::TlsReadFailed)?;
                    tokens.push(parsed.token.to_hex());
                }
                Ok(Err(error)) => {
                    let error = transport::map_read_error(error);
                    logger.error(&format!(
                        "Unable to read data from socket: {error} (errno: {})",
                        error.code()
                    ));
                    return Err(error);
                }
            }
        }

        Ok(tokens)
    }
}

/// Interpret bytes read while sending as a gateway error response.
///
/// The reported identifier is trusted only for an invalid-token status; for
/// everything else the failure index is the notification that was being
/// processed when the response was detected.
fn classify_response(logger: &Logger, bytes: &[u8], read_index: u32) -> PassOutcome {
    logger.debug("Parsing Apple response...");
    if bytes.len() < ERROR_RESPONSE_SIZE {
        logger.error(&format!(
            "Truncated response from gateway ({} byte(s))",
            bytes.len()
        ));
        return PassOutcome::Failed {
            error: ApnsError::TlsReadFailed,
            index: read_index,
        };
    }
    match ErrorResponse::parse(bytes) {
        Ok(response) => {
            logger.error(&format!("Apple returned error code {}", response.status));
            let error = ApnsError::from_status(response.status);
            let index = if response.known_status() == Some(ApnsStatus::InvalidToken) {
                response.identifier
            } else {
                read_index
            };
            PassOutcome::Failed { error, index }
        }
        Err(WireError::Command(command)) => {
            logger.error(&format!("Unexpected response command {command} from gateway"));
            PassOutcome::Failed {
                error: ApnsError::Unknown,
                index: read_index,
            }
        }
        Err(error) => {
            logger.error(&format!("Malformed response from gateway: {error}"));
            PassOutcome::Failed {
                error: ApnsError::Unknown,
                index: read_index,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use apns_wire::{ERROR_RESPONSE_COMMAND, NOTIFICATION_COMMAND, TOKEN_BINARY_SIZE};
    use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
    use tokio::io::AsyncRead;
    use tokio::net::TcpListener;
    use tokio_rustls::TlsAcceptor;

    struct TestPki {
        // Keeps the credential files alive for the duration of a test
        _dir: tempfile::TempDir,
        ca_path: PathBuf,
        cert_path: PathBuf,
        key_path: PathBuf,
        acceptor: TlsAcceptor,
    }

    fn test_pki() -> TestPki {
        crate::library_init();

        let ca_key = rcgen::KeyPair::generate().unwrap();
        let mut ca_params = rcgen::CertificateParams::default();
        ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let server_key = rcgen::KeyPair::generate().unwrap();
        let mut server_params = rcgen::CertificateParams::default();
        server_params
            .subject_alt_names
            .push(rcgen::SanType::IpAddress("127.0.0.1".parse().unwrap()));
        let server_cert = server_params
            .signed_by(&server_key, &ca_cert, &ca_key)
            .unwrap();

        let client_key = rcgen::KeyPair::generate().unwrap();
        let client_cert = rcgen::CertificateParams::default()
            .signed_by(&client_key, &ca_cert, &ca_key)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let ca_path = dir.path().join("ca.pem");
        let cert_path = dir.path().join("client.pem");
        let key_path = dir.path().join("client-key.pem");
        std::fs::write(&ca_path, ca_cert.pem()).unwrap();
        std::fs::write(&cert_path, client_cert.pem()).unwrap();
        std::fs::write(&key_path, client_key.serialize_pem()).unwrap();

        let server_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(
                vec![server_cert.der().clone()],
                PrivateKeyDer::from(PrivatePkcs8KeyDer::from(server_key.serialize_der())),
            )
            .unwrap();

        TestPki {
            _dir: dir,
            ca_path,
            cert_path,
            key_path,
            acceptor: TlsAcceptor::from(Arc::new(server_config)),
        }
    }

    async fn bind() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    async fn connected_client(
        pki: &TestPki,
        port: u16,
        options: Options,
        feedback: bool,
    ) -> Client {
        let mut client = Client::new();
        client.set_certificate(&pki.cert_path, &pki.key_path, None);
        client.set_ca_certificate(&pki.ca_path);
        client.set_behavior(options);
        client.open_connection("127.0.0.1", port, feedback).await.unwrap();
        client
    }

    fn sample_payload() -> Payload {
        let mut payload = Payload::new();
        payload.set_alert("test message");
        payload
    }

    fn hex_tokens(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("{i:02x}").repeat(32)).collect()
    }

    /// What the mock gateway does with one accepted connection
    #[derive(Clone, Copy)]
    enum Script {
        /// Record notification identifiers until the client hangs up
        AcceptAll,
        /// Record `frames` notifications, send an error response, close
        ErrorAfter { frames: usize, status: u8, id: u32 },
    }

    async fn run_gateway(
        listener: TcpListener,
        acceptor: TlsAcceptor,
        scripts: Vec<Script>,
    ) -> Vec<Vec<u32>> {
        let mut seen = Vec::new();
        for script in scripts {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut stream = acceptor.accept(tcp).await.unwrap();
            let mut ids = Vec::new();
            match script {
                Script::AcceptAll => {
                    while let Some(id) = read_notification(&mut stream).await {
                        ids.push(id);
                    }
                }
                Script::ErrorAfter { frames, status, id } => {
                    for _ in 0..frames {
                        match read_notification(&mut stream).await {
                            Some(seen_id) => ids.push(seen_id),
                            None => break,
                        }
                    }
                    let mut frame = [0u8; ERROR_RESPONSE_SIZE];
                    frame[0] = ERROR_RESPONSE_COMMAND;
                    frame[1] = status;
                    frame[2..6].copy_from_slice(&id.to_be_bytes());
                    stream.write_all(&frame).await.unwrap();
                    stream.flush().await.unwrap();
                    stream.shutdown().await.ok();
                    // Keep the socket alive (discarding in-flight frames)
                    // until the client hangs up, so its writes are not reset.
                    while read_notification(&mut stream).await.is_some() {}
                }
            }
            seen.push(ids);
        }
        seen
    }

    /// Read one notification frame and return its identifier
    async fn read_notification<S: AsyncRead + Unpin>(stream: &mut S) -> Option<u32> {
        let mut head = [0u8; 5];
        stream.read_exact(&mut head).await.ok()?;
        assert_eq!(head[0], NOTIFICATION_COMMAND);
        let frame_len = u32::from_be_bytes(head[1..5].try_into().unwrap()) as usize;
        let mut body = vec![0u8; frame_len];
        stream.read_exact(&mut body).await.ok()?;

        let mut offset = 0;
        while offset + 3 <= body.len() {
            let item = body[offset];
            let len = u16::from_be_bytes(body[offset + 1..offset + 3].try_into().unwrap()) as usize;
            offset += 3;
            if item == 3 {
                return Some(u32::from_be_bytes(body[offset..offset + 4].try_into().unwrap()));
            }
            offset += len;
        }
        panic!("notification frame without identifier item");
    }

    async fn run_feedback(
        listener: TcpListener,
        acceptor: TlsAcceptor,
        tokens: Vec<[u8; TOKEN_BINARY_SIZE]>,
    ) {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut stream = acceptor.accept(tcp).await.unwrap();
        for token in tokens {
            let mut record = [0u8; FEEDBACK_RECORD_SIZE];
            record[0..4].copy_from_slice(&1_700_000_000u32.to_be_bytes());
            record[4..6].copy_from_slice(&(TOKEN_BINARY_SIZE as u16).to_be_bytes());
            record[6..].copy_from_slice(&token);
            stream.write_all(&record).await.unwrap();
        }
        stream.flush().await.unwrap();
        // Stall until the client hangs up.
        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf).await;
    }

    #[tokio::test]
    async fn test_delivers_batch_in_order() {
        let pki = test_pki();
        let (listener, addr) = bind().await;
        let gateway = tokio::spawn(run_gateway(
            listener,
            pki.acceptor.clone(),
            vec![Script::AcceptAll],
        ));

        let mut client = connected_client(&pki, addr.port(), Options::empty(), false).await;
        let tokens = vec!["a".repeat(64), "b".repeat(64), "c".repeat(64)];
        let invalid = client.send(&sample_payload(), &tokens).await.unwrap();
        assert!(invalid.is_empty());
        client.close().await;

        assert_eq!(gateway.await.unwrap(), vec![vec![0, 1, 2]]);
    }

    #[tokio::test]
    async fn test_invalid_token_resumes_after_reconnect() {
        let pki = test_pki();
        let (listener, addr) = bind().await;
        let gateway = tokio::spawn(run_gateway(
            listener,
            pki.acceptor.clone(),
            vec![
                Script::ErrorAfter {
                    frames: 3,
                    status: 8,
                    id: 2,
                },
                Script::AcceptAll,
            ],
        ));

        let mut client =
            connected_client(&pki, addr.port(), Options::RECONNECT_ON_ERROR, false).await;
        let rejected = Arc::new(Mutex::new(Vec::new()));
        let sink = rejected.clone();
        client.set_invalid_token_callback(Box::new(move |token, index| {
            sink.lock().unwrap().push((token.to_string(), index));
        }));

        let tokens = hex_tokens(4);
        let invalid = client.send(&sample_payload(), &tokens).await.unwrap();
        assert_eq!(invalid, vec![tokens[2].clone()]);
        assert_eq!(*rejected.lock().unwrap(), vec![(tokens[2].clone(), 2)]);
        client.close().await;

        // No retransmission of the acknowledged prefix: the second
        // connection carries only the notification after the failed index.
        assert_eq!(gateway.await.unwrap(), vec![vec![0, 1, 2], vec![3]]);
    }

    #[tokio::test]
    async fn test_invalid_token_at_last_index_needs_no_reconnect() {
        let pki = test_pki();
        let (listener, addr) = bind().await;
        let gateway = tokio::spawn(run_gateway(
            listener,
            pki.acceptor.clone(),
            vec![Script::ErrorAfter {
                frames: 2,
                status: 8,
                id: 1,
            }],
        ));

        let mut client = connected_client(&pki, addr.port(), Options::empty(), false).await;
        let tokens = hex_tokens(2);
        let invalid = client.send(&sample_payload(), &tokens).await.unwrap();
        assert_eq!(invalid, vec![tokens[1].clone()]);
        client.close().await;

        assert_eq!(gateway.await.unwrap(), vec![vec![0, 1]]);
    }

    #[tokio::test]
    async fn test_service_shutdown_without_reconnect_fails() {
        let pki = test_pki();
        let (listener, addr) = bind().await;
        let gateway = tokio::spawn(run_gateway(
            listener,
            pki.acceptor.clone(),
            vec![Script::ErrorAfter {
                frames: 2,
                status: 10,
                id: 1,
            }],
        ));

        let mut client = connected_client(&pki, addr.port(), Options::empty(), false).await;
        let tokens = hex_tokens(5);
        let error = client.send(&sample_payload(), &tokens).await.unwrap_err();
        assert_eq!(error.error, ApnsError::ServiceShutdown);
        assert!(error.invalid_tokens.is_empty());
        client.close().await;

        // The gateway stopped reading after two frames; nothing past index 1
        // was consumed.
        assert_eq!(gateway.await.unwrap()[0], vec![0, 1]);
    }

    #[tokio::test]
    async fn test_feedback_drains_records_until_idle() {
        let pki = test_pki();
        let (listener, addr) = bind().await;
        let feedback = tokio::spawn(run_feedback(
            listener,
            pki.acceptor.clone(),
            vec![[0xaa; TOKEN_BINARY_SIZE], [0xbb; TOKEN_BINARY_SIZE]],
        ));

        let mut client = connected_client(&pki, addr.port(), Options::empty(), true).await;
        let tokens = client.feedback().await.unwrap();
        assert_eq!(tokens, vec!["aa".repeat(32), "bb".repeat(32)]);
        client.close().await;
        feedback.await.unwrap();
    }

    #[tokio::test]
    async fn test_feedback_with_no_data_returns_empty_after_idle_window() {
        let pki = test_pki();
        let (listener, addr) = bind().await;
        let feedback = tokio::spawn(run_feedback(listener, pki.acceptor.clone(), Vec::new()));

        let mut client = connected_client(&pki, addr.port(), Options::empty(), true).await;
        let started = Instant::now();
        let tokens = client.feedback().await.unwrap();
        assert!(tokens.is_empty());
        assert!(started.elapsed() >= FEEDBACK_WAIT);
        client.close().await;
        feedback.await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_credentials_leave_transport_closed() {
        let mut client = Client::new();
        client.set_certificate("missing.pem", "missing-key.pem", None);
        let error = client.connect().await.unwrap_err();
        assert_eq!(error, ApnsError::BadCertificate);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_connect_preconditions() {
        let mut client = Client::new();
        assert_eq!(
            client.connect().await.unwrap_err(),
            ApnsError::CertificateNotSet
        );

        client.set_certificate("cert.pem", "", None);
        assert_eq!(
            client.connect().await.unwrap_err(),
            ApnsError::PrivateKeyNotSet
        );
    }

    #[tokio::test]
    async fn test_send_requires_gateway_connection() {
        let mut client = Client::new();
        let tokens = hex_tokens(1);
        let error = client.send(&sample_payload(), &tokens).await.unwrap_err();
        assert_eq!(error.error, ApnsError::NotConnected);
    }

    #[tokio::test]
    async fn test_send_rejected_on_feedback_connection() {
        let pki = test_pki();
        let (listener, addr) = bind().await;
        let feedback = tokio::spawn(run_feedback(listener, pki.acceptor.clone(), Vec::new()));

        let mut client = connected_client(&pki, addr.port(), Options::empty(), true).await;
        let tokens = hex_tokens(1);
        let error = client.send(&sample_payload(), &tokens).await.unwrap_err();
        assert_eq!(error.error, ApnsError::NotConnected);
        client.close().await;
        feedback.await.unwrap();
    }

    #[tokio::test]
    async fn test_feedback_requires_feedback_connection() {
        let pki = test_pki();
        let (listener, addr) = bind().await;
        let gateway = tokio::spawn(run_gateway(
            listener,
            pki.acceptor.clone(),
            vec![Script::AcceptAll],
        ));

        let mut client = connected_client(&pki, addr.port(), Options::empty(), false).await;
        assert_eq!(
            client.feedback().await.unwrap_err(),
            ApnsError::NotConnectedFeedback
        );
        client.close().await;
        gateway.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let pki = test_pki();
        let (listener, addr) = bind().await;
        let gateway = tokio::spawn(run_gateway(
            listener,
            pki.acceptor.clone(),
            vec![Script::AcceptAll],
        ));

        let mut client = connected_client(&pki, addr.port(), Options::empty(), false).await;
        client.close().await;
        assert!(!client.is_connected());
        client.close().await;
        assert!(!client.is_connected());

        // Close on a client that never connected is a no-op too.
        let mut fresh = Client::new();
        fresh.close().await;

        gateway.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_while_open() {
        let pki = test_pki();
        let (listener, addr) = bind().await;
        let gateway = tokio::spawn(run_gateway(
            listener,
            pki.acceptor.clone(),
            vec![Script::AcceptAll],
        ));

        let mut client = connected_client(&pki, addr.port(), Options::empty(), false).await;
        // A second connect while open is a no-op and must not touch the
        // Apple endpoints even though no mock is listening there.
        client.connect().await.unwrap();
        assert!(client.is_connected());
        client.close().await;
        gateway.await.unwrap();
    }

    #[tokio::test]
    async fn test_feedback_connect_while_gateway_open_keeps_direction() {
        let pki = test_pki();
        let (listener, addr) = bind().await;
        let gateway = tokio::spawn(run_gateway(
            listener,
            pki.acceptor.clone(),
            vec![Script::AcceptAll],
        ));

        let mut client = connected_client(&pki, addr.port(), Options::empty(), false).await;
        // The open connection is to the gateway; a feedback_connect is a
        // no-op that does not retarget it, so feedback is still rejected.
        client.feedback_connect().await.unwrap();
        assert!(client.is_connected());
        assert_eq!(
            client.feedback().await.unwrap_err(),
            ApnsError::NotConnectedFeedback
        );
        client.close().await;
        gateway.await.unwrap();
    }

    #[test]
    fn test_empty_token_list_is_a_caller_bug() {
        let result = std::panic::catch_unwind(|| {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            runtime.block_on(async {
                let mut client = Client::new();
                let _ = client.send(&sample_payload(), &[]).await;
            });
        });
        assert!(result.is_err());
    }
}
