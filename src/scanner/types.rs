//! Scanner configuration and result types.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Classification of a responding host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum DeviceType {
    /// Port 502 answered and discovery identified a known device family.
    ModbusVerified,
    /// Port open but identification skipped, failed, or returned an unknown
    /// device-type code.
    ModbusUnverified,
    /// Port 8000 open; dongles refuse speculative probes, so protocol
    /// verification is out of scope.
    DongleCandidate,
}

/// Scan parameters. The defaults probe the standard Modbus and dongle ports
/// with verification enabled and MAC lookup off.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Single IP, CIDR, or dash range (private networks only).
    pub ip_range: String,
    pub ports: Vec<u16>,
    /// Per-probe connect timeout in seconds.
    pub timeout: f64,
    /// Maximum concurrently outstanding probes.
    pub concurrency: usize,
    /// Identify responders on port 502 through a discovery read.
    pub verify_modbus: bool,
    /// Enrich results with an ARP/OUI vendor hint (best effort).
    pub lookup_mac: bool,
}

impl ScanConfig {
    pub fn new(ip_range: impl Into<String>) -> Self {
        Self {
            ip_range: ip_range.into(),
            ports: vec![502, 8000],
            timeout: 0.5,
            concurrency: 50,
            verify_modbus: true,
            lookup_mac: false,
        }
    }
}

/// One discovered endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub device_type: DeviceType,
    pub serial: Option<String>,
    pub model_family: Option<String>,
    pub device_type_code: Option<u16>,
    pub firmware_version: Option<String>,
    pub mac_address: Option<String>,
    pub mac_vendor: Option<String>,
    pub error: Option<String>,
    pub response_time_ms: f64,
}

impl ScanResult {
    pub(crate) fn new(ip: Ipv4Addr, port: u16, device_type: DeviceType) -> Self {
        Self {
            ip,
            port,
            device_type,
            serial: None,
            model_family: None,
            device_type_code: None,
            firmware_version: None,
            mac_address: None,
            mac_vendor: None,
            error: None,
            response_time_ms: 0.0,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.device_type == DeviceType::ModbusVerified
    }

    pub fn is_dongle_candidate(&self) -> bool {
        self.device_type == DeviceType::DongleCandidate
    }

    /// Human-readable one-liner for CLI output.
    pub fn display_label(&self) -> String {
        match self.device_type {
            DeviceType::ModbusVerified => {
                let family = self.model_family.as_deref().unwrap_or("EG4");
                let serial = self.serial.as_deref().unwrap_or("unknown");
                format!("{family} ({serial}) @ {}:{}", self.ip, self.port)
            }
            DeviceType::DongleCandidate => {
                let vendor = self.mac_vendor.as_deref().unwrap_or("Unknown vendor");
                format!("Dongle candidate @ {}:{} (MAC: {vendor})", self.ip, self.port)
            }
            DeviceType::ModbusUnverified => {
                format!("Modbus device @ {}:{} (unverified)", self.ip, self.port)
            }
        }
    }
}

/// Periodic progress snapshot handed to the scan callback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub total_hosts: usize,
    pub scanned: usize,
    pub found: usize,
}

impl ScanProgress {
    pub fn percent(&self) -> f64 {
        if self.total_hosts == 0 {
            100.0
        } else {
            self.scanned as f64 / self.total_hosts as f64 * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScanConfig::new("192.168.1.0/24");
        assert_eq!(config.ports, vec![502, 8000]);
        assert_eq!(config.timeout, 0.5);
        assert_eq!(config.concurrency, 50);
        assert!(config.verify_modbus);
        assert!(!config.lookup_mac);
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(DeviceType::ModbusVerified.to_string(), "modbus_verified");
        assert_eq!(DeviceType::ModbusUnverified.to_string(), "modbus_unverified");
        assert_eq!(DeviceType::DongleCandidate.to_string(), "dongle_candidate");
    }

    #[test]
    fn test_result_classification() {
        let ip: Ipv4Addr = "192.168.1.50".parse().unwrap();
        let verified = ScanResult::new(ip, 502, DeviceType::ModbusVerified);
        let unverified = ScanResult::new(ip, 502, DeviceType::ModbusUnverified);
        let dongle = ScanResult::new(ip, 8000, DeviceType::DongleCandidate);

        assert!(verified.is_verified());
        assert!(!unverified.is_verified());
        assert!(!dongle.is_verified());
        assert!(dongle.is_dongle_candidate());
        assert!(!verified.is_dongle_candidate());
    }

    #[test]
    fn test_display_labels() {
        let ip: Ipv4Addr = "192.168.1.100".parse().unwrap();
        let mut verified = ScanResult::new(ip, 502, DeviceType::ModbusVerified);
        verified.serial = Some("4512345678".to_string());
        verified.model_family = Some("PV_SERIES".to_string());
        assert_eq!(
            verified.display_label(),
            "PV_SERIES (4512345678) @ 192.168.1.100:502"
        );

        let mut bare = ScanResult::new(ip, 502, DeviceType::ModbusVerified);
        bare.serial = Some("4512345678".to_string());
        assert_eq!(bare.display_label(), "EG4 (4512345678) @ 192.168.1.100:502");

        let mut dongle = ScanResult::new(ip, 8000, DeviceType::DongleCandidate);
        dongle.mac_vendor = Some("Espressif".to_string());
        assert_eq!(
            dongle.display_label(),
            "Dongle candidate @ 192.168.1.100:8000 (MAC: Espressif)"
        );

        let unverified = ScanResult::new(ip, 502, DeviceType::ModbusUnverified);
        assert_eq!(
            unverified.display_label(),
            "Modbus device @ 192.168.1.100:502 (unverified)"
        );
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(ScanProgress { total_hosts: 100, scanned: 50, found: 5 }.percent(), 50.0);
        assert_eq!(ScanProgress { total_hosts: 0, scanned: 0, found: 0 }.percent(), 100.0);
        assert_eq!(ScanProgress { total_hosts: 254, scanned: 254, found: 10 }.percent(), 100.0);
        assert_eq!(ScanProgress { total_hosts: 254, scanned: 0, found: 0 }.percent(), 0.0);
    }
}
