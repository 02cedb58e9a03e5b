//! Gateway - TCP listeners that accept incoming connections.
//!
//! One listener is bound per enabled IP family on the single configured
//! port. The IPv6 listener is opened without dual-stack so IPv4 traffic is
//! handled exclusively by the IPv4 listener. TLS is per-server: when it is
//! enabled, every accepted socket is wrapped by the shared acceptor.

use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info};

use crate::config::{Config, TlsConfig};
use crate::network::session;
use crate::server::Server;

/// The Gateway accepts incoming TCP connections and spawns session tasks.
pub struct Gateway {
    listeners: Vec<TcpListener>,
    acceptor: Option<TlsAcceptor>,
    server: Arc<Server>,
}

impl Gateway {
    /// Bind the configured listeners and build the TLS acceptor if enabled.
    pub async fn bind(config: &Config, server: Arc<Server>) -> anyhow::Result<Gateway> {
        let acceptor = if config.tls.enabled {
            let acceptor = build_acceptor(&config.tls)?;
            info!("SSL is enabled");
            Some(acceptor)
        } else {
            info!("SSL is disabled");
            None
        };

        let port = config.server.port;
        let mut listeners = Vec::new();

        if config.server.use_ipv4 {
            let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
            listeners.push(
                TcpListener::bind(addr)
                    .await
                    .with_context(|| format!("failed to bind {addr}"))?,
            );
            info!(port, "Listening for IPv4 connections");
        }

        if config.server.use_ipv6 {
            listeners.push(bind_v6_only(port)?);
            info!(port, "Listening for IPv6 connections");
        }

        Ok(Gateway {
            listeners,
            acceptor,
            server,
        })
    }

    /// Accept connections until shutdown is signalled.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut shutdown_rx = self.server.shutdown.subscribe();

        for listener in self.listeners {
            let server = Arc::clone(&self.server);
            let acceptor = self.acceptor.clone();
            let mut shutdown_rx = self.server.shutdown.subscribe();

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        accepted = listener.accept() => match accepted {
                            Ok((stream, addr)) => {
                                let server = Arc::clone(&server);
                                let acceptor = acceptor.clone();
                                tokio::spawn(async move {
                                    match acceptor {
                                        Some(acceptor) => {
                                            session::run_tls(stream, addr, acceptor, server).await
                                        }
                                        None => session::run_plain(stream, addr, server).await,
                                    }
                                });
                            }
                            Err(e) => {
                                error!(error = %e, "Failed to accept connection");
                            }
                        },
                        _ = shutdown_rx.recv() => break,
                    }
                }
            });
        }

        let _ = shutdown_rx.recv().await;
        Ok(())
    }
}

/// Bind an IPv6 listener with dual-stack disabled.
fn bind_v6_only(port: u16) -> anyhow::Result<TcpListener> {
    let addr = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0));
    let socket = Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP))
        .context("failed to create the IPv6 socket")?;
    socket
        .set_only_v6(true)
        .context("failed to disable dual-stack on the IPv6 socket")?;
    socket.set_nonblocking(true)?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("failed to bind {addr}"))?;
    socket.listen(128)?;
    TcpListener::from_std(socket.into()).context("failed to register the IPv6 listener")
}

/// Build the shared TLS acceptor from the PEM certificate and key files.
/// Password-protected private keys are not supported.
fn build_acceptor(tls: &TlsConfig) -> anyhow::Result<TlsAcceptor> {
    let cert_path = tls
        .certificate
        .as_ref()
        .context("ssl.certificate is not set")?;
    let key_path = tls
        .private_key
        .as_ref()
        .context("ssl.private_key is not set")?;

    let cert_file = std::fs::File::open(cert_path)
        .with_context(|| format!("failed to open the SSL certificate {}", cert_path.display()))?;
    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse the SSL certificate")?;

    let key_file = std::fs::File::open(key_path)
        .with_context(|| format!("failed to open the SSL private key {}", key_path.display()))?;
    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_file))
        .context("failed to parse the SSL private key")?
        .context("your SSL private key must not be password-protected")?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid SSL certificate/key pair")?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
