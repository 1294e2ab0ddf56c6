//! Best-effort MAC address and vendor lookup via the OS ARP table.
//!
//! A one-shot ping nudges the kernel into resolving the neighbour first;
//! everything here degrades to `None` rather than failing a scan.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use once_cell::sync::Lazy;
use tokio::process::Command;
use tracing::debug;

/// OUI prefixes of hardware commonly found inside EG4/Luxpower equipment
/// and the gateways around it.
static OUI_VENDORS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("A4:CF:12", "Espressif"),
        ("24:6F:28", "Espressif"),
        ("30:AE:A4", "Espressif"),
        ("8C:AA:B5", "Espressif"),
        ("C8:2B:96", "Espressif"),
        ("EC:FA:BC", "Espressif"),
        ("98:D8:63", "Shanghai High-Flying"),
        ("AC:CF:23", "Hi-Flying"),
        ("00:95:69", "LuxpowerTek"),
        ("B8:27:EB", "Raspberry Pi Foundation"),
        ("DC:A6:32", "Raspberry Pi Trading"),
        ("00:E0:4C", "Realtek"),
    ])
});

/// Vendor hint for a MAC address from its OUI prefix.
pub fn get_oui_vendor(mac: &str) -> Option<&'static str> {
    let prefix = mac.get(0..8)?.to_ascii_uppercase();
    OUI_VENDORS.get(prefix.as_str()).copied()
}

/// Look up the MAC address for an IP from the OS ARP table, pinging once
/// first so the entry exists. Returns `None` on any failure.
pub async fn lookup_mac_address(ip: Ipv4Addr) -> Option<String> {
    // One echo request with a one-second ceiling; we only care about the
    // ARP side effect.
    let _ = Command::new("ping")
        .args(["-c", "1", "-W", "1", &ip.to_string()])
        .output()
        .await;

    if let Some(mac) = lookup_proc_arp(ip).await {
        return Some(mac);
    }
    lookup_arp_command(ip).await
}

async fn lookup_proc_arp(ip: Ipv4Addr) -> Option<String> {
    let contents = tokio::fs::read_to_string("/proc/net/arp").await.ok()?;
    parse_proc_arp(&contents, ip)
}

async fn lookup_arp_command(ip: Ipv4Addr) -> Option<String> {
    let output = Command::new("arp")
        .args(["-n", &ip.to_string()])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    parse_arp_output(&text)
}

fn parse_proc_arp(contents: &str, ip: Ipv4Addr) -> Option<String> {
    let needle = ip.to_string();
    for line in contents.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 4 && fields[0] == needle {
            let mac = fields[3].to_ascii_uppercase();
            if mac != "00:00:00:00:00:00" {
                debug!(%ip, mac = %mac, "resolved MAC from /proc/net/arp");
                return Some(mac);
            }
        }
    }
    None
}

fn parse_arp_output(text: &str) -> Option<String> {
    for token in text.split_whitespace() {
        if token.len() == 17 && token.bytes().filter(|&b| b == b':').count() == 5 {
            let mac = token.to_ascii_uppercase();
            if mac != "00:00:00:00:00:00" {
                return Some(mac);
            }
        }
    }
    None
}
