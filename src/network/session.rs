//! Per-connection session task.
//!
//! Each accepted socket runs one task that owns both directions of the
//! stream plus the client's single deadline timer:
//!
//! ```text
//!   accept (schedule the registration deadline)
//!     -> optional TLS handshake (no ERROR farewell before it completes)
//!     -> attach to the registry
//!     -> select loop: framed reads / mailbox drain / deadline / shutdown
//! ```
//!
//! The timer traverses one state machine: awaiting registration, awaiting
//! identify, idle (next PING due), awaiting PONG. Only one deadline exists
//! at a time; re-arming replaces the previous one, and a firing that lost
//! the race against a transition observes the new deadline and stands down.

use futures_util::StreamExt;
use parking_lot::Mutex;
use roster_proto::{IrcCodec, ProtocolError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::server::Server;

/// Seconds a client has to complete NICK+USER after connecting.
pub const REGISTRATION_TIMEOUT: u64 = 120;
/// Seconds a client with a reserved nickname has to identify.
pub const IDENTIFY_TIMEOUT: u64 = 240;
/// Seconds of idle time before the server sends a PING.
pub const PING_INTERVAL: u64 = 120;
/// Seconds a pinged client has to answer with PONG.
pub const PING_TIMEOUT: u64 = 60;

/// Which deadline the session timer is currently tracking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerPhase {
    /// Waiting for NICK+USER; expiry reason "Nick timeout".
    AwaitRegistration,
    /// Waiting for a successful IDENTIFY.
    AwaitIdentify,
    /// Registered and healthy; expiry sends a PING.
    Idle,
    /// PING sent, waiting for the PONG.
    AwaitPong,
}

impl TimerPhase {
    fn duration(self) -> Duration {
        let secs = match self {
            TimerPhase::AwaitRegistration => REGISTRATION_TIMEOUT,
            TimerPhase::AwaitIdentify => IDENTIFY_TIMEOUT,
            TimerPhase::Idle => PING_INTERVAL,
            TimerPhase::AwaitPong => PING_TIMEOUT,
        };
        Duration::from_secs(secs)
    }
}

/// The one reusable deadline timer of a session, shared between the session
/// task (which sleeps on it) and the handlers (which re-arm it).
pub struct SessionTimer {
    state: Mutex<(TimerPhase, Instant)>,
}

impl SessionTimer {
    /// A fresh timer with the registration deadline armed.
    pub fn new() -> SessionTimer {
        let phase = TimerPhase::AwaitRegistration;
        SessionTimer {
            state: Mutex::new((phase, Instant::now() + phase.duration())),
        }
    }

    /// Replace the current deadline with the one for `phase`.
    pub fn arm(&self, phase: TimerPhase) {
        *self.state.lock() = (phase, Instant::now() + phase.duration());
    }

    /// The phase and deadline currently armed.
    pub fn snapshot(&self) -> (TimerPhase, Instant) {
        *self.state.lock()
    }
}

impl Default for SessionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a framing error onto the disconnect reason the peers will see.
fn read_error_reason(err: &ProtocolError) -> String {
    match err {
        ProtocolError::MessageTooLong { .. } => "Message too long".to_string(),
        ProtocolError::InvalidMessage { .. } => "Invalid message".to_string(),
        ProtocolError::Io(e) => e.to_string(),
    }
}

/// Run a plaintext session.
pub async fn run_plain(stream: TcpStream, addr: SocketAddr, server: Arc<Server>) {
    let timer = Arc::new(SessionTimer::new());
    serve(stream, addr, server, timer).await;
}

/// Run a TLS session: handshake first, then the regular loop. Until the
/// handshake completes the session is not initialized, so teardown happens
/// without any ERROR farewell and without touching the registry.
pub async fn run_tls(
    stream: TcpStream,
    addr: SocketAddr,
    acceptor: TlsAcceptor,
    server: Arc<Server>,
) {
    let timer = Arc::new(SessionTimer::new());
    let mut shutdown_rx = server.shutdown.subscribe();

    let (_, deadline) = timer.snapshot();
    let handshake = tokio::select! {
        result = acceptor.accept(stream) => result,
        _ = tokio::time::sleep_until(deadline) => {
            debug!(%addr, "TLS handshake did not complete before the registration deadline");
            return;
        }
        _ = shutdown_rx.recv() => return,
    };

    match handshake {
        Ok(tls_stream) => serve(tls_stream, addr, server, timer).await,
        Err(e) => {
            // Also triggered by clients connecting without TLS enabled.
            debug!(%addr, error = %e, "TLS handshake failed");
        }
    }
}

async fn serve<S>(stream: S, addr: SocketAddr, server: Arc<Server>, timer: Arc<SessionTimer>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Arc<String>>();
    let id = server.attach_session(tx, Arc::clone(&timer));
    info!(%addr, id, "Client connected");

    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut framed = FramedRead::new(read_half, IrcCodec::new());
    let mut shutdown_rx = server.shutdown.subscribe();

    // Once the client has been removed from the registry, only the mailbox
    // is drained; reads and deadlines no longer matter.
    let mut detached = false;

    loop {
        let (_, deadline) = timer.snapshot();
        tokio::select! {
            item = framed.next(), if !detached => {
                match item {
                    Some(Ok(msg)) => {
                        detached = !server.handle_message(id, msg);
                    }
                    Some(Err(e)) => {
                        warn!(id, error = %e, "Read error");
                        server.drop_session(id, &read_error_reason(&e));
                        detached = true;
                    }
                    None => {
                        server.drop_session(id, "Connection reset by peer");
                        detached = true;
                    }
                }
            }

            line = rx.recv() => {
                match line {
                    Some(line) => {
                        let write = async {
                            write_half.write_all(line.as_bytes()).await?;
                            write_half.write_all(b"\r\n").await
                        };
                        if write.await.is_err() {
                            server.drop_session(id, "Broken pipe");
                            break;
                        }
                    }
                    // The registry entry is gone and every pending line has
                    // been written; the session is over.
                    None => break,
                }
            }

            _ = tokio::time::sleep_until(deadline), if !detached => {
                detached = !server.handle_deadline(id);
            }

            _ = shutdown_rx.recv(), if !detached => {
                server.drop_session(id, "Server shutting down");
                detached = true;
            }
        }
    }

    let _ = write_half.shutdown().await;
    info!(%addr, id, "Client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_phases_have_their_deadlines() {
        let timer = SessionTimer::new();
        let (phase, deadline) = timer.snapshot();
        assert_eq!(phase, TimerPhase::AwaitRegistration);
        assert_eq!(deadline - Instant::now(), Duration::from_secs(120));

        timer.arm(TimerPhase::AwaitIdentify);
        let (phase, deadline) = timer.snapshot();
        assert_eq!(phase, TimerPhase::AwaitIdentify);
        assert_eq!(deadline - Instant::now(), Duration::from_secs(240));

        timer.arm(TimerPhase::Idle);
        assert_eq!(
            timer.snapshot().1 - Instant::now(),
            Duration::from_secs(120)
        );

        timer.arm(TimerPhase::AwaitPong);
        assert_eq!(timer.snapshot().1 - Instant::now(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_replaces_the_deadline() {
        let timer = SessionTimer::new();
        timer.arm(TimerPhase::Idle);
        let first = timer.snapshot().1;

        tokio::time::advance(Duration::from_secs(30)).await;
        timer.arm(TimerPhase::Idle);
        let second = timer.snapshot().1;
        assert_eq!(second - first, Duration::from_secs(30));
    }
}
