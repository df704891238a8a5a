//! TLS configuration and the TLS-terminating listener.

use std::io;
use std::path::Path;

use axum_server::accept::Accept as _;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use futures_util::future::BoxFuture;

use crate::net::listener::{Accept, BoxedIo, Endpoint, Listener, PendingIo};

/// Load TLS configuration from certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, io::Error> {
    if !cert_path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Certificate file not found: {:?}", cert_path),
        ));
    }
    if !key_path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Private key file not found: {:?}", key_path),
        ));
    }

    RustlsConfig::from_pem_file(cert_path, key_path).await
}

/// Terminates TLS on connections accepted by an inner listener.
///
/// The handshake runs when the connection is established, on the
/// connection's own task.
pub struct TlsListener {
    inner: Listener,
    acceptor: RustlsAcceptor,
}

impl TlsListener {
    pub fn new(inner: Listener, config: RustlsConfig) -> Self {
        Self {
            inner,
            acceptor: RustlsAcceptor::new(config),
        }
    }
}

impl Accept for TlsListener {
    fn accept(&mut self) -> BoxFuture<'_, io::Result<(PendingIo, Endpoint)>> {
        Box::pin(async move {
            let (pending, peer) = self.inner.accept().await?;
            let acceptor = self.acceptor.clone();
            let handshake_peer = peer.clone();
            let pending = PendingIo::new(async move {
                let plain = pending.establish().await?;
                match acceptor.accept(plain, ()).await {
                    Ok((stream, ())) => Ok(Box::new(stream) as BoxedIo),
                    Err(e) => {
                        tracing::debug!(peer_addr = %handshake_peer, error = %e, "TLS handshake failed");
                        Err(e)
                    }
                }
            });
            Ok((pending, peer))
        })
    }

    fn local_addr(&self) -> io::Result<Endpoint> {
        self.inner.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_certificate_is_not_found() {
        let err = load_tls_config(Path::new("/nonexistent/cert.pem"), Path::new("/nonexistent/key.pem"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("Certificate"));
    }
}
