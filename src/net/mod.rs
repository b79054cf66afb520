//! Connection management
//!
//! A `Connection` is one TCP session to the crawled host, optionally wrapped
//! in TLS. DNS resolution picks the first IPv4/stream result; the port is 80
//! or 443 unless the host itself carries an explicit `host:port`. The TLS
//! connector is built once per process and reused for every session,
//! including mid-crawl upgrades.

use crate::buf::Buf;
use crate::{ReaperError, Result};
use native_tls::{Protocol, TlsConnector, TlsStream};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::OnceLock;

const HTTP_PORT: u16 = 80;
const HTTPS_PORT: u16 = 443;

static TLS_CONNECTOR: OnceLock<TlsConnector> = OnceLock::new();

/// Process-wide TLS client context, TLSv1.2 minimum, system trust store.
fn tls_connector() -> Result<&'static TlsConnector> {
    if let Some(connector) = TLS_CONNECTOR.get() {
        return Ok(connector);
    }
    let built = TlsConnector::builder()
        .min_protocol_version(Some(Protocol::Tlsv12))
        .build()?;
    Ok(TLS_CONNECTOR.get_or_init(|| built))
}

enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Read for Stream {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Stream::Plain(s) => s.read(out),
            Stream::Tls(s) => s.read(out),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        match self {
            Stream::Plain(s) => s.write(data),
            Stream::Tls(s) => s.write(data),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Plain(s) => s.flush(),
            Stream::Tls(s) => s.flush(),
        }
    }
}

/// One live TCP (and optionally TLS) session with the remote host.
pub struct Connection {
    stream: Option<Stream>,
    host: String,
    secure: bool,
    /// Resolved peer address, kept for the dashboard.
    pub host_ipv4: String,
}

impl Connection {
    /// Resolves `host` and connects, on port 443 when `secure` or a port
    /// embedded in the host itself, port 80 otherwise.
    pub fn open(host: &str, secure: bool) -> Result<Self> {
        let addr = resolve(host, secure)?;
        tracing::debug!(%host, %addr, secure, "connecting");

        let tcp = TcpStream::connect(addr)?;
        let stream = if secure {
            let connector = tls_connector()?;
            let tls = connector
                .connect(host_without_port(host), tcp)
                .map_err(|e| ReaperError::TlsHandshake {
                    host: host.to_string(),
                    message: e.to_string(),
                })?;
            Stream::Tls(Box::new(tls))
        } else {
            Stream::Plain(tcp)
        };

        Ok(Self {
            stream: Some(stream),
            host: host.to_string(),
            secure,
            host_ipv4: addr.ip().to_string(),
        })
    }

    /// The host this connection was opened to.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Shuts the session down. Safe to call on an already closed connection.
    pub fn close(&mut self) {
        match self.stream.take() {
            Some(Stream::Plain(s)) => {
                let _ = s.shutdown(std::net::Shutdown::Both);
            }
            Some(Stream::Tls(mut s)) => {
                let _ = s.shutdown();
                let _ = s.get_ref().shutdown(std::net::Shutdown::Both);
            }
            None => {}
        }
    }

    /// Drops the current session and opens a fresh one to `host` with the
    /// same security mode.
    pub fn reconnect(&mut self, host: &str) -> Result<()> {
        self.close();
        *self = Connection::open(host, self.secure)?;
        Ok(())
    }

    /// Closes the plain session and reopens the same host over TLS.
    pub fn upgrade_to_tls(&mut self) -> Result<()> {
        self.close();
        let host = self.host.clone();
        tracing::info!(%host, "upgrading connection to TLS");
        *self = Connection::open(&host, true)?;
        Ok(())
    }

    /// Writes the whole buffer to the peer.
    pub fn send(&mut self, buf: &Buf) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(ReaperError::NotConnected)?;
        buf.write_to(stream)?;
        stream.flush()?;
        Ok(())
    }

    /// Reads up to `max` bytes from the peer into `buf`'s tail.
    /// Returns the byte count; zero means the peer closed the session.
    pub fn recv_into(&mut self, buf: &mut Buf, max: usize) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(ReaperError::NotConnected)?;
        Ok(buf.read_from(stream, max)?)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// First IPv4 stream address for `host`, honouring an embedded port.
fn resolve(host: &str, secure: bool) -> Result<SocketAddr> {
    let target = if host.contains(':') {
        host.to_string()
    } else {
        let port = if secure { HTTPS_PORT } else { HTTP_PORT };
        format!("{host}:{port}")
    };

    target
        .to_socket_addrs()
        .map_err(|_| ReaperError::Dns(host.to_string()))?
        .find(|a| a.is_ipv4())
        .ok_or_else(|| ReaperError::NoAddress(host.to_string()))
}

fn host_without_port(host: &str) -> &str {
    match host.rfind(':') {
        Some(i) => &host[..i],
        None => host,
    }
}
