//! TCP accept loop: binds the fixed registry endpoint, enforces the
//! configured connection cap, spawns a thread per accepted connection, and
//! runs the periodic maintenance sweep. The Rust counterpart of
//! `connection_manager.py`'s `ConnectionManager`.

use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use socket2::{Domain, Socket, Type};
use tracing::{debug, error, info, warn};

use crate::config;
use crate::ServerState;

/// How often `accept()` is polled for a new connection while idle. Plays
/// the role of `connection_manager.py`'s `socket.settimeout(0.5)`.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Builds the listening socket with `SO_REUSEADDR` set before bind, as
/// `connection_manager.py` does via `setsockopt(SO_REUSEADDR)` — without
/// it a restart can fail to rebind the port while the prior socket lingers
/// in `TIME_WAIT`.
fn bind_listener() -> anyhow::Result<TcpListener> {
    let ip: IpAddr = config::TCP_HOST.parse()?;
    let addr = SocketAddr::from((ip, config::TCP_PORT));
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;
    Ok(socket.into())
}

/// Runs the accept loop until `shutdown` is set. Returns once the
/// listening socket is torn down.
pub fn run(state: Arc<ServerState>, shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = bind_listener()?;
    listener.set_nonblocking(true)?;
    info!(host = config::TCP_HOST, port = config::TCP_PORT, "listening for registry connections");

    let maintenance_interval = Duration::from_secs_f64(state.config.maintenance_interval);
    let mut last_maintenance = Instant::now();

    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => accept_connection(stream, addr, &state),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                error!(error = %e, "accept failed");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }

        if last_maintenance.elapsed() >= maintenance_interval {
            run_maintenance(&state);
            last_maintenance = Instant::now();
        }
    }

    info!("acceptor shutting down");
    Ok(())
}

fn accept_connection(stream: TcpStream, addr: SocketAddr, state: &Arc<ServerState>) {
    let live = state.sessions.len();
    if live >= state.config.max_connections {
        warn!(peer = %addr, live, max = state.config.max_connections, "connection limit reached, rejecting");
        let _ = stream.shutdown(std::net::Shutdown::Both);
        return;
    }

    let state = Arc::clone(state);
    let spawned = thread::Builder::new()
        .name(format!("session-{addr}"))
        .spawn(move || crate::session::run_session(stream, addr, state));
    if let Err(e) = spawned {
        error!(peer = %addr, error = %e, "failed to spawn session thread");
    }
}

/// Prunes stale session-table entries and logs table size. Mirrors
/// `cleanup_disconnected_clients`, run on the same cadence as
/// `main.py`'s maintenance loop.
fn run_maintenance(state: &Arc<ServerState>) {
    let pruned = state.sessions.prune_disconnected();
    if pruned > 0 {
        debug!(pruned, "maintenance pruned stale sessions");
    }
    debug!(active_sessions = state.sessions.len(), "maintenance pass complete");
}
