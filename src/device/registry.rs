//! Open devices keyed by bus address

use crate::device::{Device, DeviceAddress, DeviceOptions};
use crate::error::DeviceError;
use crate::transport::Transport;

use std::collections::BTreeMap;

/// Set of open device handles, at most one per address
pub struct DeviceRegistry<T: Transport> {
    devices: BTreeMap<DeviceAddress, Device<T>>,
}

impl<T: Transport> Default for DeviceRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> DeviceRegistry<T> {
    pub fn new() -> Self {
        Self {
            devices: BTreeMap::new(),
        }
    }

    /// Open a device at `address`; a second open of the same address fails
    pub fn open(
        &mut self,
        address: DeviceAddress,
        transport: T,
        options: DeviceOptions,
    ) -> Result<&mut Device<T>, DeviceError> {
        if self.devices.contains_key(&address) {
            return Err(DeviceError::AlreadyOpen(address));
        }
        let device = Device::open(address, transport, options)?;
        Ok(self.devices.entry(address).or_insert(device))
    }

    pub fn get(&self, address: DeviceAddress) -> Result<&Device<T>, DeviceError> {
        self.devices
            .get(&address)
            .ok_or(DeviceError::DeviceNotOpen(address))
    }

    pub fn get_mut(&mut self, address: DeviceAddress) -> Result<&mut Device<T>, DeviceError> {
        self.devices
            .get_mut(&address)
            .ok_or(DeviceError::DeviceNotOpen(address))
    }

    /// Close the device and hand back its transport
    pub fn close(&mut self, address: DeviceAddress) -> Result<T, DeviceError> {
        self.devices
            .remove(&address)
            .map(Device::close)
            .ok_or(DeviceError::DeviceNotOpen(address))
    }

    /// Open addresses in ascending order
    pub fn addresses(&self) -> Vec<DeviceAddress> {
        self.devices.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    #[test]
    fn test_open_get_close() {
        let mut registry = DeviceRegistry::new();
        let a = DeviceAddress::new(1, 0x40);
        let b = DeviceAddress::new(0, 0x41);

        registry
            .open(a, MockTransport::new().0, DeviceOptions::default())
            .unwrap();
        registry
            .open(b, MockTransport::new().0, DeviceOptions::default())
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.addresses(), vec![b, a]);
        assert_eq!(registry.get(a).unwrap().address(), a);
        assert!(registry.get_mut(b).unwrap().ping(&[1]).is_ok());

        registry.close(a).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(matches!(
            registry.get(a),
            Err(DeviceError::DeviceNotOpen(addr)) if addr == a
        ));
    }

    #[test]
    fn test_duplicate_open_rejected() {
        let mut registry = DeviceRegistry::new();
        let addr = DeviceAddress::new(2, 0x50);
        registry
            .open(addr, MockTransport::new().0, DeviceOptions::default())
            .unwrap();

        let (transport, handle) = MockTransport::new();
        assert!(matches!(
            registry.open(addr, transport, DeviceOptions::default()),
            Err(DeviceError::AlreadyOpen(_))
        ));
        // The rejected transport was never touched.
        assert_eq!(handle.requests_seen(), 0);
    }

    #[test]
    fn test_close_unknown_address() {
        let mut registry: DeviceRegistry<MockTransport> = DeviceRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.close(DeviceAddress::new(0, 0x10)),
            Err(DeviceError::DeviceNotOpen(_))
        ));
    }
}
