//! Identity of the machine this agent runs on

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use sysinfo::Networks;
use tracing::debug;

/// Hostname, primary address and MAC address, resolved once per process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentity {
    pub hostname: String,
    pub ip: String,
    pub mac: Option<String>,
}

impl HostIdentity {
    /// Inspect the local machine
    pub fn detect() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|s| s.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let ip = primary_ip()
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .to_string();

        let mac = primary_mac();

        debug!(%hostname, %ip, mac = mac.as_deref().unwrap_or("-"), "Host identity detected");

        Self { hostname, ip, mac }
    }

    /// Fixed identity, for tests and for hosts where detection is undesirable
    pub fn new(hostname: impl Into<String>, ip: impl Into<String>, mac: Option<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ip: ip.into(),
            mac,
        }
    }

    /// Stable per-host seed material for scheduling jitter
    pub fn seed_material(&self, purpose: &str) -> String {
        format!("{}{}{}", self.hostname, self.ip, purpose)
    }
}

fn primary_ip() -> Option<IpAddr> {
    let from_interfaces = if_addrs::get_if_addrs().ok().and_then(|ifs| {
        ifs.into_iter()
            .filter(|ifa| !ifa.is_loopback())
            .map(|ifa| ifa.ip())
            .find(IpAddr::is_ipv4)
    });

    // Fall back to the address the kernel would route external traffic from
    from_interfaces.or_else(|| {
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        socket.local_addr().ok().map(|addr| addr.ip())
    })
}

fn primary_mac() -> Option<String> {
    let networks = Networks::new_with_refreshed_list();

    let mut candidates: Vec<(String, String)> = networks
        .iter()
        .filter(|(name, _)| name.as_str() != "lo")
        .map(|(name, data)| (name.clone(), data.mac_address()))
        .filter(|(_, mac)| !mac.is_unspecified())
        .map(|(name, mac)| (name, mac.to_string().to_uppercase()))
        .collect();

    // Interface order from the OS is not stable; pick deterministically
    candidates.sort();
    candidates.into_iter().next().map(|(_, mac)| mac)
}
