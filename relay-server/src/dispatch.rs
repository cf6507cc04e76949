//! Message dispatch: the four `registry.*` invokes plus `ping`, and the
//! list-building/relay logic they share. The Rust counterpart of the
//! handler methods on `server.py`'s `Server` class.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use relay_proto::{Array, Device, DeviceType, FlashDevice, Invoke, Packet, PacketType, Parameter, RegistryInfo, TaggedObject};
use tracing::{info, warn};

use crate::registry::RegisteredDevice;
use crate::session::SessionHandle;
use crate::ServerState;

/// Milliseconds since the Unix epoch, the unit `Packet::timestamp` is in.
fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

/// Entry point for every decoded frame. `Ping`-typed packets are routed
/// directly; everything else is dispatched by its `Invoke`'s method name,
/// exactly as `_handle_parsed_packet`/`_route_message` do.
pub fn dispatch_packet(packet: Packet, handle: &Arc<SessionHandle>, state: &Arc<ServerState>) {
    if packet.packet_type == PacketType::Ping {
        handle_ping(handle, state);
        return;
    }

    match packet.message {
        Some(TaggedObject::Invoke(invoke)) => dispatch_invoke(*invoke, handle, state),
        Some(_) => {}
        None => {}
    }
}

fn dispatch_invoke(invoke: Invoke, handle: &Arc<SessionHandle>, state: &Arc<ServerState>) {
    match invoke.method.as_str() {
        "registry.register" => handle_register(invoke, handle, state),
        "registry.list" => handle_list(invoke, handle, state),
        "registry.relay" => handle_relay(invoke, handle, state),
        "registry.update" => handle_update(invoke, handle, state),
        other => warn!(method = other, peer = %handle.peer_addr(), "unknown method, dropping invoke"),
    }
}

// --- extraction helpers -----------------------------------------------

fn registry_info_of(param: &Parameter) -> Option<RegistryInfo> {
    match param {
        Parameter::Object(Some(TaggedObject::RegistryInfo(info))) => Some((**info).clone()),
        _ => None,
    }
}

fn invoke_of(param: &Parameter) -> Option<Invoke> {
    match param {
        Parameter::Object(Some(TaggedObject::Invoke(invoke))) => Some((**invoke).clone()),
        _ => None,
    }
}

fn flash_device_of(obj: &TaggedObject) -> Option<Device> {
    match obj {
        TaggedObject::FlashDevice(FlashDevice(device)) => Some(device.clone()),
        _ => None,
    }
}

// --- outgoing packet construction --------------------------------------

fn server_identity(state: &ServerState) -> FlashDevice {
    FlashDevice::server_identity(
        state.server_device_id.clone(),
        "Registry".to_string(),
        state.server_address.clone(),
    )
}

fn build_registry_info(device: &RegisteredDevice, slot_id: i16, current: i16, max: i16) -> RegistryInfo {
    let with_address = Device {
        device_type: device.device_type,
        device_id: device.device_id.clone(),
        device_name: device.device_name.clone(),
        address: Some(device.address.clone()),
    };
    RegistryInfo {
        device: TaggedObject::FlashDevice(FlashDevice(with_address)),
        app_id: device.app_id.clone(),
        slot_id,
        clients: if slot_id > 0 { Some((current, max)) } else { None },
    }
}

/// Sends `method(params)` as an `Invoke` wrapped in a server-identity
/// `Packet`, the shape every outgoing message in this module shares
/// (`send_invoke_packet_to_socket` in the original).
fn send_invoke(handle: &SessionHandle, state: &ServerState, method: &str, sequence: i32, params: Vec<Parameter>) {
    let invoke = Invoke::new(sequence, method).with_params(params);
    let packet = Packet::new(
        sequence,
        PacketType::Data,
        DeviceType::Server,
        state.server_device_id.clone(),
        "Registry".to_string(),
        Some(TaggedObject::Invoke(Box::new(invoke))),
    );
    handle.send_packet(&packet);
}

/// Builds and sends the filtered device list this session should see:
/// every device for a game, games only for a controller. Dedupes by
/// `device_id`, and overlays the requesting device's own live slot/client
/// counts from whichever session currently holds that `device_id`.
fn send_list_to(handle: &SessionHandle, state: &ServerState, viewer_is_game: bool) {
    let mut seen = std::collections::HashSet::new();
    let mut params = Vec::new();
    for device in state.registry.all() {
        if !viewer_is_game && !device.device_type.is_game() {
            continue;
        }
        if !seen.insert(device.device_id.clone()) {
            continue;
        }
        let (slot_id, current, max) = state
            .sessions
            .find_by_device_id(&device.device_id)
            .map(|h| h.live_counts())
            .unwrap_or((0, 0, 0));
        let info = build_registry_info(&device, slot_id, current, max);
        params.push(Parameter::object(TaggedObject::RegistryInfo(Box::new(info))));
    }
    send_invoke(handle, state, "onList", 2, vec![Parameter::object(TaggedObject::Array(Array(params)))]);
}

/// Sends the current filtered list to every session except `exclude_key`
/// (pass `""` to exclude none). Mirrors `_broadcast_device_list_update`.
fn broadcast_list(state: &ServerState, exclude_key: &str) {
    for other in state.sessions.snapshot() {
        if other.key() == exclude_key {
            continue;
        }
        let viewer_is_game = other.device_type().map(DeviceType::is_game).unwrap_or(false);
        send_list_to(&other, state, viewer_is_game);
    }
}

// --- handlers ------------------------------------------------------------

fn handle_register(invoke: Invoke, handle: &Arc<SessionHandle>, state: &Arc<ServerState>) {
    let Some(info) = invoke.params.first().and_then(registry_info_of) else {
        warn!(peer = %handle.peer_addr(), "registry.register missing a RegistryInfo parameter");
        return;
    };
    let Some(device) = flash_device_of(&info.device) else {
        warn!(peer = %handle.peer_addr(), "registry.register device payload was not a device object");
        return;
    };
    let address = device.address.clone().unwrap_or_else(|| state.server_address.clone());
    let is_game = device.device_type.is_game();
    let slot_id = if is_game { state.slots.allocate() as i16 } else { 0 };
    let (current, max) = info.clients.unwrap_or((0, 1));

    handle.set_identity(device.device_id.clone(), device.device_name.clone(), device.device_type, info.app_id.clone(), slot_id);
    handle.set_clients(current, max);

    state.registry.unregister(&device.device_id);
    state.registry.register(RegisteredDevice {
        device_id: device.device_id.clone(),
        device_name: device.device_name.clone(),
        device_type: device.device_type,
        address,
        app_id: info.app_id.clone(),
    });

    info!(peer = %handle.peer_addr(), device_id = %device.device_id, slot_id, is_game, "device registered");

    let return_method = if invoke.return_method.is_empty() { "onRegister" } else { invoke.return_method.as_str() };
    let server_info = RegistryInfo {
        device: TaggedObject::FlashDevice(server_identity(state)),
        app_id: "Registry".to_string(),
        slot_id: 0,
        clients: None,
    };
    send_invoke(
        handle,
        state,
        return_method,
        invoke.id,
        vec![Parameter::object(TaggedObject::RegistryInfo(Box::new(server_info)))],
    );

    if is_game {
        let registered = state.registry.get(&device.device_id).expect("just registered");
        let host_info = build_registry_info(&registered, slot_id, current, max);
        send_invoke(
            handle,
            state,
            "onHostConnected",
            1,
            vec![Parameter::object(TaggedObject::RegistryInfo(Box::new(host_info)))],
        );
    }

    send_list_to(handle, state, is_game);
    broadcast_list(state, handle.key());
}

fn handle_list(_invoke: Invoke, handle: &Arc<SessionHandle>, state: &Arc<ServerState>) {
    let viewer_is_game = handle.device_type().map(DeviceType::is_game).unwrap_or(false);
    send_list_to(handle, state, viewer_is_game);
}

fn handle_update(invoke: Invoke, handle: &Arc<SessionHandle>, state: &Arc<ServerState>) {
    if let Some(info) = invoke.params.first().and_then(registry_info_of) {
        handle.merge_update(info.slot_id, info.clients);
    } else {
        warn!(peer = %handle.peer_addr(), "registry.update missing a RegistryInfo parameter");
    }

    broadcast_list(state, "");

    let return_method = if invoke.return_method.is_empty() { "onRegister" } else { invoke.return_method.as_str() };
    send_invoke(handle, state, return_method, invoke.id, vec![Parameter::bool(true)]);
}

fn handle_relay(invoke: Invoke, handle: &Arc<SessionHandle>, state: &Arc<ServerState>) {
    if invoke.params.len() < 2 {
        warn!(peer = %handle.peer_addr(), "registry.relay needs a target and a message parameter");
        return;
    }

    let Some(target_info) = registry_info_of(&invoke.params[0]) else {
        warn!(peer = %handle.peer_addr(), "registry.relay target parameter was not a RegistryInfo");
        return;
    };
    let Some(target_device) = flash_device_of(&target_info.device) else {
        warn!(peer = %handle.peer_addr(), "registry.relay target device payload was not a device object");
        return;
    };
    let Some(payload) = invoke_of(&invoke.params[1]) else {
        warn!(peer = %handle.peer_addr(), "registry.relay message parameter was not an Invoke");
        return;
    };

    let Some(target) = state.sessions.find_by_device_id(&target_device.device_id) else {
        warn!(peer = %handle.peer_addr(), target = %target_device.device_id, "registry.relay target not connected");
        return;
    };

    let sender_is_game = handle.device_type().map(DeviceType::is_game).unwrap_or(false);
    if !sender_is_game {
        let (target_slot, current, max) = target.live_counts();
        if target_slot > 0 {
            let max = if max > 0 { max } else { 1 };
            let already_paired = handle.paired_slot_id() == Some(target_slot);
            if current >= max && !already_paired {
                warn!(
                    peer = %handle.peer_addr(),
                    target = %target_device.device_id,
                    slot_id = target_slot,
                    current,
                    max,
                    "registry.relay dropped: target slot at capacity"
                );
                return;
            }
        }
    }

    let (sender_id, sender_name, sender_type) = match (handle.device_id(), handle.device_type()) {
        (Some(id), Some(ty)) => (id, handle.device_name(), ty),
        _ => (state.server_device_id.clone(), "Registry".to_string(), DeviceType::Server),
    };

    let relay_packet = Packet::new(
        payload.id,
        PacketType::Data,
        sender_type,
        sender_id,
        sender_name,
        Some(TaggedObject::Invoke(Box::new(payload))),
    )
    .with_timestamp(now_ms());
    target.send_packet(&relay_packet);
}

fn handle_ping(handle: &Arc<SessionHandle>, state: &Arc<ServerState>) {
    let packet = Packet::new(
        1,
        PacketType::Ping,
        DeviceType::Server,
        state.server_device_id.clone(),
        "Registry".to_string(),
        Some(TaggedObject::FlashDevice(server_identity(state))),
    );
    handle.send_packet(&packet);
}

/// The disconnect path: free the slot (if any), drop the device from the
/// registry, remove the session from the table, and broadcast the
/// resulting list to everyone left. Idempotent via `SessionHandle`'s
/// connected flag, matching `_on_client_disconnected`'s single-fire
/// guard.
pub fn cleanup_session(handle: &Arc<SessionHandle>, state: &Arc<ServerState>) {
    if handle
        .mark_disconnected_once()
        .is_err()
    {
        return;
    }

    state.sessions.remove(handle.key());

    let slot_id = handle.slot_id();
    if slot_id > 0 {
        state.slots.free(slot_id as u16);
    }
    if let Some(device_id) = handle.device_id() {
        state.registry.unregister(&device_id);
    }

    broadcast_list(state, "");
    info!(peer = %handle.peer_addr(), "session closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    use relay_proto::{DeviceAddress, FrameExtractor};

    use crate::config::Config;
    use crate::registry::{Registry, SlotAllocator};
    use crate::session::SessionTable;

    /// A connected loopback pair: `server` is handed to a `SessionHandle`
    /// as its writer; `client` is read from in assertions.
    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    fn make_handle(key: &str, writer: TcpStream) -> Arc<SessionHandle> {
        let peer_addr = writer.peer_addr().unwrap();
        Arc::new(SessionHandle::new(key.to_string(), peer_addr, writer))
    }

    fn test_state() -> Arc<ServerState> {
        Arc::new(ServerState {
            registry: Registry::new(),
            slots: SlotAllocator::new(),
            sessions: SessionTable::default(),
            server_device_id: "srv".to_string(),
            server_address: DeviceAddress { host: "0.0.0.0".into(), port: 8088 },
            config: Config::default(),
        })
    }

    /// Reads and decodes the next whole frame off `client`, or `None` if
    /// nothing arrives within the timeout (used to assert "no message").
    fn try_read_packet(client: &mut TcpStream) -> Option<Packet> {
        client.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
        let mut extractor = FrameExtractor::new();
        let mut buf = [0u8; 4096];
        loop {
            if let Ok(Some(body)) = extractor.next_frame(1024 * 1024) {
                return relay_proto::decode_frame(&body).ok();
            }
            match client.read(&mut buf) {
                Ok(0) => return None,
                Ok(n) => extractor.feed(&buf[..n]),
                Err(_) => return None,
            }
        }
    }

    fn register_device(state: &ServerState, id: &str, device_type: DeviceType, slot_id: i16, current: i16, max: i16) -> Arc<SessionHandle> {
        let (client, server) = loopback_pair();
        std::mem::forget(client);
        let handle = make_handle(&format!("{id}-key"), server);
        handle.set_identity(id.to_string(), format!("{id}-name"), device_type, "app".to_string(), slot_id);
        handle.set_clients(current, max);
        state.sessions.insert(Arc::clone(&handle));
        state.registry.register(RegisteredDevice {
            device_id: id.to_string(),
            device_name: format!("{id}-name"),
            device_type,
            address: DeviceAddress { host: "127.0.0.1".into(), port: 9000 },
            app_id: "app".to_string(),
        });
        handle
    }

    fn registry_info_target(device_id: &str) -> RegistryInfo {
        RegistryInfo {
            device: TaggedObject::FlashDevice(FlashDevice(Device {
                device_type: DeviceType::Android,
                device_id: device_id.to_string(),
                device_name: String::new(),
                address: None,
            })),
            app_id: String::new(),
            slot_id: 0,
            clients: None,
        }
    }

    #[test]
    fn controller_list_only_contains_games() {
        let state = test_state();
        register_device(&state, "g1", DeviceType::Flash, 1, 0, 1);
        register_device(&state, "g2", DeviceType::Unity, 2, 0, 1);
        register_device(&state, "a1", DeviceType::Android, 0, 0, 0);
        register_device(&state, "a2", DeviceType::IPhone, 0, 0, 0);

        let (mut client, server) = loopback_pair();
        let viewer = make_handle("viewer", server);
        send_list_to(&viewer, &state, false);

        let packet = try_read_packet(&mut client).expect("onList packet");
        let Some(TaggedObject::Invoke(invoke)) = packet.message else {
            panic!("expected an Invoke payload");
        };
        assert_eq!(invoke.method, "onList");
        let Parameter::Object(Some(TaggedObject::Array(Array(params)))) = &invoke.params[0] else {
            panic!("expected an Array parameter");
        };
        assert_eq!(params.len(), 2);
        for p in params {
            let Parameter::Object(Some(TaggedObject::RegistryInfo(info))) = p else {
                panic!("expected RegistryInfo elements");
            };
            let TaggedObject::FlashDevice(FlashDevice(device)) = &info.device else {
                panic!("expected a device payload");
            };
            assert!(device.device_type.is_game());
        }
    }

    #[test]
    fn game_list_contains_every_device() {
        let state = test_state();
        register_device(&state, "g1", DeviceType::Flash, 1, 0, 1);
        register_device(&state, "a1", DeviceType::Android, 0, 0, 0);

        let (mut client, server) = loopback_pair();
        let viewer = make_handle("viewer", server);
        send_list_to(&viewer, &state, true);

        let packet = try_read_packet(&mut client).expect("onList packet");
        let Some(TaggedObject::Invoke(invoke)) = packet.message else {
            panic!("expected an Invoke payload");
        };
        let Parameter::Object(Some(TaggedObject::Array(Array(params)))) = &invoke.params[0] else {
            panic!("expected an Array parameter");
        };
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn relay_is_dropped_when_target_slot_is_at_capacity() {
        let state = test_state();
        let (mut target_client, target_server) = loopback_pair();
        let target = make_handle("game-key", target_server);
        target.set_identity("game".into(), "game-name".into(), DeviceType::Flash, "app".into(), 3);
        target.set_clients(2, 2);
        state.sessions.insert(Arc::clone(&target));
        state.registry.register(RegisteredDevice {
            device_id: "game".into(),
            device_name: "game-name".into(),
            device_type: DeviceType::Flash,
            address: DeviceAddress { host: "127.0.0.1".into(), port: 9000 },
            app_id: "app".into(),
        });

        let (_ctrl_client, ctrl_server) = loopback_pair();
        let controller = make_handle("ctrl-key", ctrl_server);
        controller.set_identity("ctrl".into(), "ctrl-name".into(), DeviceType::Android, "app".into(), 0);

        let invoke = Invoke::new(1, "registry.relay").with_params(vec![
            Parameter::object(TaggedObject::RegistryInfo(Box::new(registry_info_target("game")))),
            Parameter::object(TaggedObject::Invoke(Box::new(Invoke::new(7, "input")))),
        ]);
        handle_relay(invoke, &controller, &state);

        assert!(try_read_packet(&mut target_client).is_none());
    }

    #[test]
    fn relay_from_a_game_bypasses_the_capacity_check() {
        let state = test_state();
        let (mut target_client, target_server) = loopback_pair();
        let target = make_handle("game-key", target_server);
        target.set_identity("game".into(), "game-name".into(), DeviceType::Flash, "app".into(), 3);
        target.set_clients(2, 2);
        state.sessions.insert(Arc::clone(&target));
        state.registry.register(RegisteredDevice {
            device_id: "game".into(),
            device_name: "game-name".into(),
            device_type: DeviceType::Flash,
            address: DeviceAddress { host: "127.0.0.1".into(), port: 9000 },
            app_id: "app".into(),
        });

        let (_sender_client, sender_server) = loopback_pair();
        let sender = make_handle("sender-key", sender_server);
        sender.set_identity("other-game".into(), "other-game".into(), DeviceType::Unity, "app".into(), 9);

        let invoke = Invoke::new(1, "registry.relay").with_params(vec![
            Parameter::object(TaggedObject::RegistryInfo(Box::new(registry_info_target("game")))),
            Parameter::object(TaggedObject::Invoke(Box::new(Invoke::new(7, "input")))),
        ]);
        handle_relay(invoke, &sender, &state);

        let packet = try_read_packet(&mut target_client).expect("relayed packet despite full capacity");
        assert_eq!(packet.device_id, "other-game");
        assert_eq!(packet.packet_type, PacketType::Data);
    }
}
