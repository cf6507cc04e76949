//! The device table and slot allocator: the Rust counterpart of
//! `bm_protocol/registry.py`'s `Registry` class. Unlike the original, this
//! keeps a single map rather than splitting "flash devices" from "other
//! devices" into two dicts — that split was never externally observable
//! (`get_all_devices()` just concatenates them back together), so one
//! table keyed by `device_id` is equivalent and simpler.

use std::collections::HashMap;
use std::sync::Mutex;

use relay_proto::{DeviceAddress, DeviceType};

/// A registered device's identity, as handed to us by `registry.register`.
/// Live bookkeeping (slot id, connected client counts) lives on the
/// session instead, and is overlaid onto this when building a list.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredDevice {
    pub device_id: String,
    pub device_name: String,
    pub device_type: DeviceType,
    pub address: DeviceAddress,
    pub app_id: String,
}

/// The device table. One entry per currently-registered `device_id`,
/// guarded by a single mutex (single-writer semantics, as `server.py`'s own
/// `_devices_lock` implements).
#[derive(Default)]
pub struct Registry {
    devices: Mutex<HashMap<String, RegisteredDevice>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register(&self, device: RegisteredDevice) {
        self.devices.lock().unwrap().insert(device.device_id.clone(), device);
    }

    pub fn unregister(&self, device_id: &str) -> Option<RegisteredDevice> {
        self.devices.lock().unwrap().remove(device_id)
    }

    pub fn get(&self, device_id: &str) -> Option<RegisteredDevice> {
        self.devices.lock().unwrap().get(device_id).cloned()
    }

    /// A snapshot of every registered device, in no particular order.
    pub fn all(&self) -> Vec<RegisteredDevice> {
        self.devices.lock().unwrap().values().cloned().collect()
    }
}

/// Allocates the smallest positive integer not already in use as a slot
/// id, matching `allocate_slot_id`/`free_slot_id` in `server.py`. Slot `0`
/// means "no slot" and is never handed out by `allocate`.
#[derive(Default)]
pub struct SlotAllocator {
    used: Mutex<std::collections::BTreeSet<u16>>,
}

impl SlotAllocator {
    pub fn new() -> Self {
        SlotAllocator::default()
    }

    pub fn allocate(&self) -> u16 {
        let mut used = self.used.lock().unwrap();
        let mut candidate: u16 = 1;
        while used.contains(&candidate) {
            candidate += 1;
        }
        used.insert(candidate);
        candidate
    }

    pub fn free(&self, slot_id: u16) {
        self.used.lock().unwrap().remove(&slot_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str) -> RegisteredDevice {
        RegisteredDevice {
            device_id: id.to_string(),
            device_name: "name".to_string(),
            device_type: DeviceType::Flash,
            address: DeviceAddress { host: "1.2.3.4".into(), port: 1111 },
            app_id: "app".to_string(),
        }
    }

    #[test]
    fn register_then_get_round_trips() {
        let registry = Registry::new();
        registry.register(device("a"));
        assert_eq!(registry.get("a").unwrap().device_id, "a");
        assert!(registry.get("b").is_none());
    }

    #[test]
    fn reregistering_replaces_the_prior_entry() {
        let registry = Registry::new();
        registry.register(device("a"));
        let mut updated = device("a");
        updated.device_name = "renamed".to_string();
        registry.register(updated);
        assert_eq!(registry.all().len(), 1);
        assert_eq!(registry.get("a").unwrap().device_name, "renamed");
    }

    #[test]
    fn unregister_removes_and_returns_the_entry() {
        let registry = Registry::new();
        registry.register(device("a"));
        let removed = registry.unregister("a");
        assert_eq!(removed.unwrap().device_id, "a");
        assert!(registry.get("a").is_none());
        assert!(registry.unregister("a").is_none());
    }

    #[test]
    fn slot_allocator_hands_out_the_smallest_free_positive_slot() {
        let slots = SlotAllocator::new();
        assert_eq!(slots.allocate(), 1);
        assert_eq!(slots.allocate(), 2);
        assert_eq!(slots.allocate(), 3);
        slots.free(2);
        assert_eq!(slots.allocate(), 2);
        assert_eq!(slots.allocate(), 4);
    }

    #[test]
    fn freeing_an_unallocated_slot_is_harmless() {
        let slots = SlotAllocator::new();
        slots.free(5);
        assert_eq!(slots.allocate(), 1);
    }
}
