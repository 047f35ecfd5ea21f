use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;
use tracing::debug;

use crate::errors::BridgeError;

/// Any byte stream a line channel can run on.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

pub type BoxedTransport = Box<dyn Transport>;

/// Where a remote lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Tls { host: String, port: u16 },
    Unix(PathBuf),
}

impl Endpoint {
    /// Player endpoint: a host starting with `/` names a Unix socket.
    pub fn player(host: &str, port: u16) -> Self {
        if host.starts_with('/') {
            Endpoint::Unix(PathBuf::from(host))
        } else {
            Endpoint::Tcp {
                host: host.to_string(),
                port,
            }
        }
    }

    pub fn chat(host: &str, port: u16, tls: bool) -> Self {
        let host = host.to_string();
        if tls {
            Endpoint::Tls { host, port }
        } else {
            Endpoint::Tcp { host, port }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Tls { host, port } => write!(f, "tls://{}:{}", host, port),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Opens the endpoint, giving up after `timeout`.
pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<BoxedTransport, BridgeError> {
    match tokio::time::timeout(timeout, open(endpoint)).await {
        Ok(result) => result,
        Err(_) => Err(BridgeError::ConnectTimeout(endpoint.to_string())),
    }
}

async fn open(endpoint: &Endpoint) -> Result<BoxedTransport, BridgeError> {
    match endpoint {
        Endpoint::Tcp { host, port } => {
            let stream = tcp_connect(host, *port).await?;
            Ok(Box::new(stream))
        }
        Endpoint::Tls { host, port } => {
            let stream = tcp_connect(host, *port).await?;
            let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                .map_err(|e| BridgeError::tls(format!("invalid server name {}: {}", host, e)))?;
            let connector = TlsConnector::from(Arc::new(tls_client_config()));
            let stream = connector
                .connect(server_name, stream)
                .await
                .map_err(BridgeError::tls)?;
            debug!(%host, port, "TLS session established");
            Ok(Box::new(stream))
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path).await?;
            Ok(Box::new(stream))
        }
        #[cfg(not(unix))]
        Endpoint::Unix(path) => Err(BridgeError::Resolve(format!(
            "unix sockets are not supported here: {}",
            path.display()
        ))),
    }
}

async fn tcp_connect(host: &str, port: u16) -> Result<TcpStream, BridgeError> {
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| BridgeError::Resolve(format!("{}:{} ({})", host, port, e)))?
        .peekable();
    if addrs.peek().is_none() {
        return Err(BridgeError::Resolve(format!("{}:{}", host, port)));
    }

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => {
                debug!(%addr, "Connect failed: {}", err);
                last_err = Some(err);
            }
        }
    }
    Err(last_err
        .map(BridgeError::Io)
        .unwrap_or_else(|| BridgeError::Resolve(format!("{}:{}", host, port))))
}

fn tls_client_config() -> rustls::ClientConfig {
    // Déjà installé au deuxième appel : l'erreur ne compte pas
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}
