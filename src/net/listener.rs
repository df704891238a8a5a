//! Listener capability and the default socket binder.
//!
//! # Responsibilities
//! - Abstract "accept next connection" over TCP, Unix and decorated listeners
//! - Bind configured network/address pairs, honouring reuse-port
//! - Let callers decorate a bound listener (adapters, TLS)
//!
//! # Design Decisions
//! - Accepted connections are handed out as [`PendingIo`]: transport setup
//!   such as a TLS handshake finishes on the connection task, never on the
//!   accept loop
//! - Binding races the soft shutdown signal and gives up when it fires

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use futures_util::future::{self, BoxFuture};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket};
use tokio_util::sync::CancellationToken;

/// Byte stream a connection is served over.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedIo = Box<dyn Io>;

/// An accepted connection whose transport may still need setting up.
pub struct PendingIo(BoxFuture<'static, io::Result<BoxedIo>>);

impl PendingIo {
    /// A connection that is usable as-is.
    pub fn ready(io: impl Io) -> Self {
        Self(Box::pin(future::ready(Ok(Box::new(io) as BoxedIo))))
    }

    /// A connection that becomes usable once `setup` completes.
    pub fn new<F>(setup: F) -> Self
    where
        F: Future<Output = io::Result<BoxedIo>> + Send + 'static,
    {
        Self(Box::pin(setup))
    }

    /// Finish transport setup.
    pub async fn establish(self) -> io::Result<BoxedIo> {
        self.0.await
    }
}

impl fmt::Debug for PendingIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PendingIo")
    }
}

/// Local or peer address of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(SocketAddr),
    /// Unnamed Unix sockets (typical for clients) carry no path.
    Unix(Option<PathBuf>),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "{addr}"),
            Endpoint::Unix(Some(path)) => write!(f, "unix:{}", path.display()),
            Endpoint::Unix(None) => f.write_str("unix:(unnamed)"),
        }
    }
}

/// A source of inbound connections.
pub trait Accept: Send + 'static {
    /// Wait for the next connection.
    fn accept(&mut self) -> BoxFuture<'_, io::Result<(PendingIo, Endpoint)>>;

    /// The address this listener is bound to.
    fn local_addr(&self) -> io::Result<Endpoint>;
}

pub type Listener = Box<dyn Accept>;

/// Transforms a bound listener before it is served, e.g. to unwrap a proxy
/// protocol header on plaintext connections.
pub trait ListenerAdapter: Send + Sync {
    fn adapt(&self, listener: Listener) -> Listener;
}

impl<F> ListenerAdapter for F
where
    F: Fn(Listener) -> Listener + Send + Sync,
{
    fn adapt(&self, listener: Listener) -> Listener {
        self(listener)
    }
}

/// TCP listener.
#[derive(Debug)]
pub struct TcpAcceptor {
    inner: TcpListener,
}

impl TcpAcceptor {
    pub fn new(inner: TcpListener) -> Self {
        Self { inner }
    }
}

impl Accept for TcpAcceptor {
    fn accept(&mut self) -> BoxFuture<'_, io::Result<(PendingIo, Endpoint)>> {
        Box::pin(async move {
            let (stream, peer) = self.inner.accept().await?;
            if let Err(e) = stream.set_nodelay(true) {
                tracing::trace!(peer_addr = %peer, error = %e, "Failed to set TCP_NODELAY");
            }
            Ok((PendingIo::ready(stream), Endpoint::Tcp(peer)))
        })
    }

    fn local_addr(&self) -> io::Result<Endpoint> {
        self.inner.local_addr().map(Endpoint::Tcp)
    }
}

/// Unix domain socket listener.
///
/// Removes the socket file it was bound to when dropped, so the same path
/// can be bound again.
#[cfg(unix)]
#[derive(Debug)]
pub struct UnixAcceptor {
    inner: tokio::net::UnixListener,
    path: PathBuf,
}

#[cfg(unix)]
impl UnixAcceptor {
    pub fn bind(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let inner = tokio::net::UnixListener::bind(&path)?;
        Ok(Self { inner, path })
    }
}

#[cfg(unix)]
impl Drop for UnixAcceptor {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %e, "Failed to remove unix socket file");
        }
    }
}

#[cfg(unix)]
impl Accept for UnixAcceptor {
    fn accept(&mut self) -> BoxFuture<'_, io::Result<(PendingIo, Endpoint)>> {
        Box::pin(async move {
            let (stream, peer) = self.inner.accept().await?;
            let peer = Endpoint::Unix(peer.as_pathname().map(|p| p.to_path_buf()));
            Ok((PendingIo::ready(stream), peer))
        })
    }

    fn local_addr(&self) -> io::Result<Endpoint> {
        let addr = self.inner.local_addr()?;
        Ok(Endpoint::Unix(addr.as_pathname().map(|p| p.to_path_buf())))
    }
}

/// Produces bound listeners.
pub trait SocketBinder: Send + Sync {
    /// Bind `address` on `network`. Implementations should give up once
    /// `cancel` fires.
    fn bind<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        network: &'a str,
        address: &'a str,
    ) -> BoxFuture<'a, io::Result<Listener>>;
}

/// Default [`SocketBinder`].
///
/// With `reuse_port` several processes may bind the same TCP port, so a
/// replacement process can start listening before the old one lets go.
/// Unix sockets have no equivalent; a bound path stays exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenConfig {
    pub reuse_port: bool,
    pub backlog: u32,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            reuse_port: true,
            backlog: 1024,
        }
    }
}

impl ListenConfig {
    async fn bind_network(&self, network: &str, address: &str) -> io::Result<Listener> {
        match network {
            "tcp" | "tcp4" | "tcp6" => self.bind_tcp(network, address).await,
            #[cfg(unix)]
            "unix" => Ok(Box::new(UnixAcceptor::bind(address)?)),
            other => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported network: {other}"),
            )),
        }
    }

    async fn bind_tcp(&self, network: &str, address: &str) -> io::Result<Listener> {
        // ":port" means every interface
        let address = match address.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => address.to_string(),
        };

        let mut last_error = None;
        for addr in tokio::net::lookup_host(address.as_str()).await? {
            let wanted = match network {
                "tcp4" => addr.is_ipv4(),
                "tcp6" => addr.is_ipv6(),
                _ => true,
            };
            if !wanted {
                continue;
            }

            match self.bind_socket(addr) {
                Ok(listener) => {
                    tracing::debug!(address = %addr, reuse_port = self.reuse_port, "Listener bound");
                    return Ok(Box::new(TcpAcceptor::new(listener)));
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no {network} address found for {address}"),
            )
        }))
    }

    fn bind_socket(&self, addr: SocketAddr) -> io::Result<TcpListener> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        set_reuse_port(&socket, self.reuse_port)?;
        socket.bind(addr)?;
        socket.listen(self.backlog)
    }
}

impl SocketBinder for ListenConfig {
    fn bind<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        network: &'a str,
        address: &'a str,
    ) -> BoxFuture<'a, io::Result<Listener>> {
        Box::pin(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(io::Error::new(io::ErrorKind::Interrupted, "listen canceled")),
                result = self.bind_network(network, address) => result,
            }
        })
    }
}

#[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos", target_os = "cygwin"))))]
fn set_reuse_port(socket: &TcpSocket, enabled: bool) -> io::Result<()> {
    if enabled {
        socket.set_reuseport(true)?;
    }
    Ok(())
}

#[cfg(not(all(unix, not(any(target_os = "solaris", target_os = "illumos", target_os = "cygwin")))))]
fn set_reuse_port(_socket: &TcpSocket, _enabled: bool) -> io::Result<()> {
    Ok(())
}
