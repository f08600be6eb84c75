//! Bluetooth device enumeration for serial peripherals

use anyhow::Result;
use bluer::{Adapter, Address, Device, Uuid};
use spp_link_shared::DeviceInfo;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// Serial Port Profile service class UUID
pub const SPP_UUID: Uuid = Uuid::from_u128(0x0000_1101_0000_1000_8000_0080_5f9b_34fb);

/// Configuration for Bluetooth device enumeration
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfig {
    /// Also run an active inquiry for this long (paired devices only when `None`)
    pub scan_duration: Option<Duration>,
    /// Accept discovered devices whose name starts with this prefix
    pub name_prefix: Option<String>,
}

/// A device found during active discovery
#[derive(Debug, Clone)]
struct Candidate {
    info: DeviceInfo,
    rssi: Option<i16>,
}

/// Bluetooth device enumeration service
pub struct BtDiscovery {
    config: DiscoveryConfig,
}

impl BtDiscovery {
    /// Create a new discovery service
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Get the default Bluetooth adapter
    pub async fn get_adapter() -> Result<Adapter> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        Ok(adapter)
    }

    /// Paired devices, plus discovered serial devices when configured
    pub async fn scan(&self, adapter: &Adapter) -> Result<Vec<DeviceInfo>> {
        let mut devices = self.paired_devices(adapter).await?;

        if self.config.scan_duration.is_some() {
            let mut seen: HashSet<String> = devices.iter().map(|d| d.address.clone()).collect();
            for candidate in self.discover(adapter).await? {
                if seen.insert(candidate.info.address.clone()) {
                    devices.push(candidate.info);
                }
            }
        }

        Ok(devices)
    }

    /// List devices the adapter is paired with
    pub async fn paired_devices(&self, adapter: &Adapter) -> Result<Vec<DeviceInfo>> {
        let mut devices = Vec::new();
        for addr in adapter.device_addresses().await? {
            let device = adapter.device(addr)?;
            if !device.is_paired().await.unwrap_or(false) {
                continue;
            }
            let name = device.name().await.ok().flatten();
            devices.push(DeviceInfo::new(name, addr.to_string()));
        }
        debug!("[BT] {} paired device(s)", devices.len());
        Ok(devices)
    }

    /// Run an inquiry and collect serial-capable devices, strongest first
    async fn discover(&self, adapter: &Adapter) -> Result<Vec<Candidate>> {
        let Some(scan_duration) = self.config.scan_duration else {
            return Ok(Vec::new());
        };

        let mut found = Vec::new();
        let mut seen: HashSet<Address> = HashSet::new();

        let discover = adapter.discover_devices().await?;
        tokio::pin!(discover);

        let scan_result = timeout(scan_duration, async {
            use futures::StreamExt;
            while let Some(evt) = discover.next().await {
                if let bluer::AdapterEvent::DeviceAdded(addr) = evt {
                    if !seen.insert(addr) {
                        continue;
                    }

                    if let Ok(device) = adapter.device(addr) {
                        if self.is_serial_device(&device).await {
                            found.push(Candidate {
                                info: DeviceInfo::new(device.name().await.ok().flatten(), addr.to_string()),
                                rssi: device.rssi().await.ok().flatten(),
                            });
                        }
                    }
                }
            }
        })
        .await;

        // Timeout is expected, not an error
        if scan_result.is_err() {
            info!("[BT] Discovery scan completed");
        }

        found.sort_by(|a, b| {
            let rssi_a = a.rssi.unwrap_or(i16::MIN);
            let rssi_b = b.rssi.unwrap_or(i16::MIN);
            rssi_b.cmp(&rssi_a)
        });

        Ok(found)
    }

    /// Check if a device offers SPP or matches the configured name prefix
    async fn is_serial_device(&self, device: &Device) -> bool {
        if let Ok(Some(uuids)) = device.uuids().await {
            if uuids.contains(&SPP_UUID) {
                return true;
            }
        }

        if let Some(ref prefix) = self.config.name_prefix {
            if let Ok(Some(name)) = device.name().await {
                if name.starts_with(prefix) {
                    return true;
                }
            }
        }

        false
    }
}
