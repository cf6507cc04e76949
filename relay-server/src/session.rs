//! Per-connection state machine: handshake, framed receive loop, and the
//! shared `SessionHandle`/`SessionTable` bookkeeping other connections use
//! to address this one. The Rust counterpart of `client_handler.py` and
//! `connection_manager.py`'s `clients` table.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use relay_proto::{encode_frame, DeviceType, FrameExtractor, Packet};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::ServerState;

/// Per-session identity and client-count bookkeeping, updated as
/// `registry.register`/`registry.update` invokes arrive. Held behind a
/// single mutex since reads/writes are infrequent relative to packet I/O.
#[derive(Default)]
struct Identity {
    device_id: Option<String>,
    device_name: String,
    device_type: Option<DeviceType>,
    app_id: String,
    slot_id: i16,
    current_clients: i16,
    max_clients: i16,
    /// Mirrors the original's `paired_slot_id` attribute: referenced by
    /// the relay capacity check but never assigned by any handler, so it
    /// is always `None` here too. See DESIGN.md.
    paired_slot_id: Option<i16>,
}

/// What other sessions (and the acceptor's maintenance sweep) use to
/// address and inspect this connection.
pub struct SessionHandle {
    key: String,
    peer_addr: SocketAddr,
    writer: Mutex<TcpStream>,
    identity: Mutex<Identity>,
    connected: AtomicBool,
}

impl SessionHandle {
    pub(crate) fn new(key: String, peer_addr: SocketAddr, writer: TcpStream) -> Self {
        SessionHandle {
            key,
            peer_addr,
            writer: Mutex::new(writer),
            identity: Mutex::new(Identity { max_clients: 1, ..Identity::default() }),
            connected: AtomicBool::new(true),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Flips `connected` from `true` to `false` exactly once. Returns
    /// `Err` on every call after the first, so the disconnect path (slot
    /// free, registry unregister, broadcast) only ever runs once per
    /// session even if both the session thread and a maintenance sweep
    /// race to clean it up.
    pub fn mark_disconnected_once(&self) -> Result<(), ()> {
        self.connected
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| ())
    }

    pub fn send_packet(&self, packet: &Packet) {
        let frame = match encode_frame(packet) {
            Ok(f) => f,
            Err(e) => {
                warn!(peer = %self.peer_addr, error = %e, "failed to encode outgoing packet");
                return;
            }
        };
        let mut w = self.writer.lock().unwrap();
        if let Err(e) = w.write_all(&frame) {
            debug!(peer = %self.peer_addr, error = %e, "failed to write outgoing packet");
        }
    }

    pub fn set_identity(&self, device_id: String, device_name: String, device_type: DeviceType, app_id: String, slot_id: i16) {
        let mut id = self.identity.lock().unwrap();
        id.device_id = Some(device_id);
        id.device_name = device_name;
        id.device_type = Some(device_type);
        id.app_id = app_id;
        id.slot_id = slot_id;
    }

    pub fn set_clients(&self, current: i16, max: i16) {
        let mut id = self.identity.lock().unwrap();
        id.current_clients = current;
        id.max_clients = if max > 0 { max } else { 1 };
    }

    pub fn device_id(&self) -> Option<String> {
        self.identity.lock().unwrap().device_id.clone()
    }

    pub fn device_name(&self) -> String {
        self.identity.lock().unwrap().device_name.clone()
    }

    pub fn device_type(&self) -> Option<DeviceType> {
        self.identity.lock().unwrap().device_type
    }

    pub fn app_id(&self) -> String {
        self.identity.lock().unwrap().app_id.clone()
    }

    pub fn slot_id(&self) -> i16 {
        self.identity.lock().unwrap().slot_id
    }

    /// `(slot_id, current_clients, max_clients)`, as overlaid onto a
    /// registry listing for this device.
    pub fn live_counts(&self) -> (i16, i16, i16) {
        let id = self.identity.lock().unwrap();
        (id.slot_id, id.current_clients, id.max_clients)
    }

    pub fn paired_slot_id(&self) -> Option<i16> {
        self.identity.lock().unwrap().paired_slot_id
    }

    /// `registry.update`'s merge: `slot_id` overwrites only when non-zero;
    /// `current_clients`/`max_clients` overwrite only when the incoming
    /// info actually carried a clients tuple (which on the wire only
    /// happens when its own `slot_id` was positive).
    pub fn merge_update(&self, slot_id: i16, clients: Option<(i16, i16)>) {
        let mut id = self.identity.lock().unwrap();
        if slot_id != 0 {
            id.slot_id = slot_id;
        }
        if let Some((current, max)) = clients {
            id.current_clients = current;
            if max != 0 {
                id.max_clients = max;
            }
        }
    }
}

/// The live session table, keyed by `"host:port"` exactly as
/// `connection_manager.py`'s `clients` dict is.
#[derive(Default)]
pub struct SessionTable {
    sessions: Mutex<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionTable {
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn insert(&self, handle: Arc<SessionHandle>) {
        self.sessions.lock().unwrap().insert(handle.key().to_string(), handle);
    }

    pub fn remove(&self, key: &str) {
        self.sessions.lock().unwrap().remove(key);
    }

    pub fn snapshot(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.lock().unwrap().values().cloned().collect()
    }

    pub fn find_by_device_id(&self, device_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions
            .lock()
            .unwrap()
            .values()
            .find(|h| h.device_id().as_deref() == Some(device_id))
            .cloned()
    }

    /// Removes any entry whose handle has already run its disconnect
    /// path, covering the case where a session's own cleanup couldn't
    /// remove itself from the table (e.g. the handler thread panicked
    /// before reaching it). Mirrors `cleanup_disconnected_clients`.
    pub fn prune_disconnected(&self) -> usize {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|_, h| h.is_connected());
        before - sessions.len()
    }
}

/// Reads the 12-byte client preamble (if the client sends one) in a short
/// non-blocking peek, then switches the socket to blocking mode with the
/// configured read timeout and writes our own version handshake. Mirrors
/// `_handle_handshake`: a `BlockingIOError`/`WouldBlock` here is the normal
/// case (most clients don't send anything before our handshake), not a
/// failure.
fn perform_handshake(stream: &TcpStream, read_timeout: Duration) -> Result<(), SessionError> {
    stream.set_nonblocking(true)?;
    let mut preamble = [0u8; 12];
    let peek_result = (&*stream).read(&mut preamble);
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(read_timeout))?;

    match peek_result {
        Ok(0) => return Err(SessionError::Handshake("peer closed before handshake".into())),
        Ok(n) if n < 12 => {
            return Err(SessionError::Handshake(format!("short client preamble ({n} bytes)")))
        }
        Ok(_) => debug!("client sent a version preamble, ignoring its contents"),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
        Err(e) => return Err(SessionError::Io(e)),
    }

    let mut buf = Vec::new();
    {
        let mut ser = relay_proto::protocol::io::IoSerializer(&mut buf);
        relay_proto::write_handshake(&mut ser, relay_proto::PROTOCOL_VERSION, relay_proto::PROTOCOL_VERSION)?;
    }
    (&*stream).write_all(&buf)?;
    Ok(())
}

/// Runs a single accepted connection to completion: handshake, register
/// in the session table, read-dispatch loop, then the disconnect path.
/// Always returns `Ok`; errors are logged internally since this runs on
/// its own thread with no caller to propagate to.
pub fn run_session(stream: TcpStream, peer_addr: SocketAddr, state: Arc<ServerState>) {
    let timeout = Duration::from_secs_f64(state.config.connection_timeout);

    if let Err(e) = perform_handshake(&stream, timeout) {
        warn!(peer = %peer_addr, error = %e, "handshake failed");
        return;
    }

    let writer = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            warn!(peer = %peer_addr, error = %e, "failed to clone socket for writer half");
            return;
        }
    };

    let key = peer_addr.to_string();
    let handle = Arc::new(SessionHandle::new(key.clone(), peer_addr, writer));
    state.sessions.insert(Arc::clone(&handle));
    info!(peer = %peer_addr, "session accepted");

    let result = receive_loop(stream, &handle, &state);
    match &result {
        Ok(()) => {}
        Err(e) if e.is_expected_disconnect() => {
            debug!(peer = %peer_addr, "session disconnected: {e}")
        }
        Err(e) => warn!(peer = %peer_addr, error = %e, "session ended with an error"),
    }

    crate::dispatch::cleanup_session(&handle, &state);
}

fn receive_loop(mut stream: TcpStream, handle: &Arc<SessionHandle>, state: &Arc<ServerState>) -> Result<(), SessionError> {
    let mut extractor = FrameExtractor::new();
    let mut buf = vec![0u8; state.config.buffer_size];

    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(SessionError::Eof);
        }

        // Raw 8- or 12-byte reads are keepalive pings or a mirrored
        // version handshake the client echoed back; neither is framed
        // data, so they're dropped rather than fed to the extractor.
        if n == 8 || n == 12 {
            continue;
        }

        extractor.feed(&buf[..n]);
        loop {
            match extractor.next_frame(state.config.max_packet_size) {
                Ok(Some(body)) => match relay_proto::decode_frame(&body) {
                    Ok(packet) => crate::dispatch::dispatch_packet(packet, handle, state),
                    Err(e) => warn!(peer = %handle.peer_addr(), error = %e, "dropping undecodable frame"),
                },
                Ok(None) => break,
                Err(e) => return Err(SessionError::from(e)),
            }
        }
    }
}
