//! TCP and TLS transport for gateway connections.
//!
//! Connection establishment resolves the gateway hostname to IPv4 addresses
//! and tries them in order, then performs the TLS handshake. The established
//! connection is split into independent read and write halves so the
//! delivery loop can watch for an error frame while a write is in flight.

use std::io;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{lookup_host, TcpStream};
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::ApnsError;
use crate::logging::Logger;

pub(crate) type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// An established gateway connection, split for concurrent read/write
pub(crate) struct Connection {
    pub(crate) reader: ReadHalf<TlsStream>,
    pub(crate) writer: WriteHalf<TlsStream>,
}

impl Connection {
    /// Best-effort graceful shutdown: send the TLS close_notify and shut the
    /// socket down. Failures are logged and swallowed; close never fails.
    pub(crate) async fn shutdown(&mut self, logger: &Logger) {
        if let Err(error) = self.writer.shutdown().await {
            logger.debug(&format!("TLS shutdown incomplete: {error}"));
        }
    }
}

/// Open a TCP connection to the endpoint and perform the TLS handshake.
pub(crate) async fn open(
    host: &str,
    port: u16,
    config: ClientConfig,
    logger: &Logger,
) -> Result<Connection, ApnsError> {
    logger.debug("Resolving server hostname...");
    let addrs: Vec<_> = match lookup_host((host, port)).await {
        Ok(addrs) => addrs.filter(|addr| addr.is_ipv4()).collect(),
        Err(error) => {
            logger.error(&format!("Unable to resolve hostname: {error}"));
            return Err(ApnsError::CouldNotInitializeConnection);
        }
    };

    let mut tcp = None;
    for addr in addrs {
        logger.info(&format!("Trying to connect to {addr}..."));
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                tcp = Some(stream);
                break;
            }
            Err(error) => {
                logger.error(&format!("Could not connect to {addr}: {error}"));
            }
        }
    }
    let Some(tcp) = tcp else {
        logger.error("Unable to establish connection");
        return Err(ApnsError::CouldNotInitializeConnection);
    };

    logger.info("Connection has been established");
    logger.info("Initializing TLS connection...");

    let server_name = ServerName::try_from(host.to_string()).map_err(|_| {
        logger.error(&format!("Invalid server name: {host}"));
        ApnsError::CouldNotInitializeSslConnection
    })?;

    let connector = TlsConnector::from(Arc::new(config));
    let stream = match connector.connect(server_name, tcp).await {
        Ok(stream) => stream,
        Err(error) => {
            logger.error(&format!("Could not initialize TLS connection: {error}"));
            return Err(ApnsError::CouldNotInitializeSslConnection);
        }
    };

    let (_, session) = stream.get_ref();
    if let (Some(version), Some(suite)) =
        (session.protocol_version(), session.negotiated_cipher_suite())
    {
        logger.info(&format!(
            "TLS connection has been established ({:?}, {:?})",
            version,
            suite.suite()
        ));
    }
    log_peer_certificate(session, logger);

    let (reader, writer) = tokio::io::split(stream);
    Ok(Connection { reader, writer })
}

fn log_peer_certificate(session: &rustls::ClientConnection, logger: &Logger) {
    let Some(cert) = session.peer_certificates().and_then(|certs| certs.first()) else {
        return;
    };
    match x509_parser::parse_x509_certificate(cert.as_ref()) {
        Ok((_, parsed)) => {
            logger.info(&format!("Certificate subject name: {}", parsed.subject()));
            logger.info(&format!("Certificate issuer name: {}", parsed.issuer()));
        }
        Err(error) => {
            debug!("failed to parse peer certificate: {error:?}");
        }
    }
}

/// Map a read-side I/O error into the local taxonomy
pub(crate) fn map_read_error(error: io::Error) -> ApnsError {
    match error.kind() {
        io::ErrorKind::BrokenPipe => ApnsError::NetworkUnreachable,
        io::ErrorKind::TimedOut => ApnsError::ConnectionTimedOut,
        io::ErrorKind::UnexpectedEof => ApnsError::ConnectionClosed,
        _ => ApnsError::TlsReadFailed,
    }
}

/// Map a write-side I/O error into the local taxonomy
pub(crate) fn map_write_error(error: io::Error) -> ApnsError {
    match error.kind() {
        io::ErrorKind::BrokenPipe => ApnsError::NetworkUnreachable,
        io::ErrorKind::TimedOut => ApnsError::ConnectionTimedOut,
        io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero => ApnsError::ConnectionClosed,
        _ => ApnsError::TlsWriteFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            map_write_error(io::Error::from(io::ErrorKind::BrokenPipe)),
            ApnsError::NetworkUnreachable
        );
        assert_eq!(
            map_write_error(io::Error::from(io::ErrorKind::TimedOut)),
            ApnsError::ConnectionTimedOut
        );
        assert_eq!(
            map_write_error(io::Error::from(io::ErrorKind::WriteZero)),
            ApnsError::ConnectionClosed
        );
        assert_eq!(
            map_write_error(io::Error::from(io::ErrorKind::Other)),
            ApnsError::TlsWriteFailed
        );
        assert_eq!(
            map_read_error(io::Error::from(io::ErrorKind::UnexpectedEof)),
            ApnsError::ConnectionClosed
        );
        assert_eq!(
            map_read_error(io::Error::from(io::ErrorKind::ConnectionReset)),
            ApnsError::TlsReadFailed
        );
    }

    #[tokio::test]
    async fn test_connect_refused_maps_to_connection_error() {
        let logger = Logger::new();
        // Bind a listener to learn a free port, then drop it so nothing is
        // listening there.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        crate::library_init();
        let config = ClientConfig::builder()
            .with_root_certificates(rustls::RootCertStore::empty())
            .with_no_client_auth();

        let result = open("127.0.0.1", port, config, &logger).await;
        assert!(matches!(
            result,
            Err(ApnsError::CouldNotInitializeConnection)
        ));
    }
}
