//! IP-range parsing and scan sizing helpers.

use std::net::Ipv4Addr;

use crate::error::{Error, Result};

/// Safety cap on hosts per scan: a /20. Anything bigger is almost certainly
/// a typo and would hammer the network.
pub const MAX_SAFE_HOSTS: u32 = 4094;

/// How many /24 boundaries a dash range may bridge.
const MAX_SUBNET_SPAN: u32 = 1;

fn is_private(ip: Ipv4Addr) -> bool {
    // RFC1918 plus CGN 100.64/10 (Tailscale and carrier NAT).
    let octets = ip.octets();
    ip.is_private() || (octets[0] == 100 && (64..128).contains(&octets[1]))
}

fn parse_ipv4(text: &str) -> Result<Ipv4Addr> {
    if text.contains(':') {
        return Err(Error::config("IPv6 scanning is not supported"));
    }
    text.parse()
        .map_err(|_| Error::config(format!("Invalid IP range: {text:?}")))
}

fn require_private(ip: Ipv4Addr) -> Result<()> {
    if is_private(ip) {
        Ok(())
    } else {
        Err(Error::config(format!(
            "Only private IP ranges are allowed (RFC1918 or 100.64/10), got {ip}"
        )))
    }
}

/// Parse a single IP, CIDR block, or dash range into a concrete host list.
/// Whitespace around components is tolerated. CIDR blocks exclude network
/// and broadcast addresses; /31 and /32 return their hosts verbatim.
pub fn parse_ip_range(range: &str) -> Result<Vec<Ipv4Addr>> {
    let range = range.trim();
    if range.is_empty() {
        return Err(Error::config("Invalid IP range: empty string"));
    }
    if range.contains(':') {
        return Err(Error::config("IPv6 scanning is not supported"));
    }

    if range.contains('/') {
        parse_cidr(range)
    } else if range.contains('-') {
        parse_dash_range(range)
    } else {
        let ip = parse_ipv4(range)?;
        require_private(ip)?;
        Ok(vec![ip])
    }
}

fn parse_cidr(range: &str) -> Result<Vec<Ipv4Addr>> {
    let (base, prefix) = range
        .split_once('/')
        .ok_or_else(|| Error::config(format!("Invalid IP range: {range:?}")))?;
    let base = parse_ipv4(base.trim())?;
    let prefix: u32 = prefix
        .trim()
        .parse()
        .ok()
        .filter(|p| *p <= 32)
        .ok_or_else(|| Error::config(format!("Invalid IP range: bad prefix in {range:?}")))?;

    require_private(base)?;

    if prefix >= 31 {
        // Degenerate blocks have no network/broadcast to exclude.
        let base_u32 = u32::from(base);
        let hosts = if prefix == 32 {
            vec![base]
        } else {
            vec![base, Ipv4Addr::from(base_u32 | 1)]
        };
        return Ok(hosts);
    }

    let host_count = 2u32.pow(32 - prefix) - 2;
    if host_count > MAX_SAFE_HOSTS {
        return Err(Error::config(format!(
            "Subnet {range} contains {host_count} hosts (maximum {MAX_SAFE_HOSTS})"
        )));
    }

    let mask = !((1u32 << (32 - prefix)) - 1);
    let network = u32::from(base) & mask;
    let broadcast = network | !mask;

    Ok(((network + 1)..broadcast).map(Ipv4Addr::from).collect())
}

fn parse_dash_range(range: &str) -> Result<Vec<Ipv4Addr>> {
    let (start, end) = range
        .split_once('-')
        .ok_or_else(|| Error::config(format!("Invalid IP range: {range:?}")))?;
    let start: Ipv4Addr = start
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("Invalid IP in range: {range:?}")))?;
    let end: Ipv4Addr = end
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("Invalid IP in range: {range:?}")))?;

    require_private(start)?;
    require_private(end)?;

    let start_u32 = u32::from(start);
    let end_u32 = u32::from(end);
    if start_u32 > end_u32 {
        return Err(Error::config("Start IP must be <= end IP"));
    }

    // A range bridging more than one /24 boundary is likely a typo; the
    // bridge tolerance covers sites straddling two adjacent subnets.
    let subnet_span = (end_u32 >> 8) - (start_u32 >> 8);
    if subnet_span > MAX_SUBNET_SPAN {
        return Err(Error::config(format!(
            "Dash range spans multiple subnets ({} /24 boundaries)",
            subnet_span
        )));
    }

    let host_count = end_u32 - start_u32 + 1;
    if host_count > MAX_SAFE_HOSTS {
        return Err(Error::config(format!(
            "Range contains {host_count} hosts (maximum {MAX_SAFE_HOSTS})"
        )));
    }

    Ok((start_u32..=end_u32).map(Ipv4Addr::from).collect())
}

/// Worst-case scan duration under the batch model: every probe in a batch
/// waits out its timeout.
pub fn estimate_scan_duration(
    host_count: usize,
    ports_per_host: usize,
    timeout: f64,
    concurrency: usize,
) -> f64 {
    let probes = host_count * ports_per_host;
    if probes == 0 || concurrency == 0 {
        return 0.0;
    }
    let batches = probes.div_ceil(concurrency);
    batches as f64 * timeout
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ip(text: &str) -> Ipv4Addr {
        text.parse().unwrap()
    }

    #[test]
    fn test_single_ip() {
        assert_eq!(parse_ip_range("192.168.1.50").unwrap(), vec![ip("192.168.1.50")]);
    }

    #[test]
    fn test_whitespace_tolerated() {
        assert_eq!(parse_ip_range("  192.168.1.50  ").unwrap(), vec![ip("192.168.1.50")]);
        assert_eq!(
            parse_ip_range("192.168.1.1 - 192.168.1.3").unwrap(),
            vec![ip("192.168.1.1"), ip("192.168.1.2"), ip("192.168.1.3")]
        );
    }

    #[test]
    fn test_cidr_slash24() {
        let hosts = parse_ip_range("192.168.1.0/24").unwrap();
        assert_eq!(hosts.len(), 254);
        assert!(hosts.contains(&ip("192.168.1.1")));
        assert!(hosts.contains(&ip("192.168.1.254")));
        assert!(!hosts.contains(&ip("192.168.1.0")));
        assert!(!hosts.contains(&ip("192.168.1.255")));
    }

    #[rstest]
    #[case("192.168.1.0/30", 2)]
    #[case("192.168.1.0/28", 14)]
    #[case("10.0.0.0/29", 6)]
    #[case("172.16.0.0/28", 14)]
    #[case("100.64.0.0/28", 14)]
    fn test_cidr_host_counts(#[case] range: &str, #[case] expected: usize) {
        assert_eq!(parse_ip_range(range).unwrap().len(), expected);
    }

    #[test]
    fn test_cidr_slash32() {
        assert_eq!(parse_ip_range("192.168.1.50/32").unwrap(), vec![ip("192.168.1.50")]);
    }

    #[test]
    fn test_cidr_at_cap() {
        assert_eq!(parse_ip_range("192.168.0.0/20").unwrap().len(), MAX_SAFE_HOSTS as usize);
    }

    #[test]
    fn test_cidr_over_cap() {
        let err = parse_ip_range("192.168.0.0/19").unwrap_err().to_string();
        assert!(err.contains("hosts"), "{err}");
        let err = parse_ip_range("192.168.0.0/16").unwrap_err().to_string();
        assert!(err.contains("hosts"), "{err}");
    }

    #[test]
    fn test_dash_range() {
        let hosts = parse_ip_range("192.168.1.1-192.168.1.5").unwrap();
        assert_eq!(hosts.len(), 5);
        assert_eq!(hosts[0], ip("192.168.1.1"));
        assert_eq!(hosts[4], ip("192.168.1.5"));
    }

    #[test]
    fn test_dash_range_single_host() {
        assert_eq!(
            parse_ip_range("192.168.1.100-192.168.1.100").unwrap(),
            vec![ip("192.168.1.100")]
        );
    }

    #[test]
    fn test_dash_range_reversed() {
        let err = parse_ip_range("192.168.1.20-192.168.1.10").unwrap_err().to_string();
        assert!(err.contains("Start IP must be <= end IP"), "{err}");
    }

    #[test]
    fn test_dash_range_adjacent_subnets_allowed() {
        let hosts = parse_ip_range("192.168.1.250-192.168.2.5").unwrap();
        assert_eq!(hosts.len(), 12);
        assert_eq!(hosts[0], ip("192.168.1.250"));
        assert_eq!(hosts[11], ip("192.168.2.5"));
    }

    #[test]
    fn test_dash_range_wide_span_rejected() {
        let err = parse_ip_range("192.168.1.1-192.168.10.254").unwrap_err().to_string();
        assert!(err.contains("spans multiple subnets"), "{err}");
    }

    #[test]
    fn test_public_ranges_rejected() {
        for range in ["8.8.8.0/24", "8.8.8.8", "8.8.8.1-8.8.8.10"] {
            let err = parse_ip_range(range).unwrap_err().to_string();
            assert!(err.contains("Only private IP ranges are allowed"), "{range}: {err}");
        }
    }

    #[test]
    fn test_ipv6_rejected() {
        for range in ["fe80::/64", "fe80::1", "::1"] {
            let err = parse_ip_range(range).unwrap_err().to_string();
            assert!(err.contains("IPv6"), "{range}: {err}");
        }
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_ip_range("").is_err());
        assert!(parse_ip_range("not.an.ip.address").is_err());
        assert!(parse_ip_range("192.168.1.0/99").is_err());
        assert!(parse_ip_range("192.168.1.1-not.an.ip").is_err());
    }

    #[rstest]
    #[case(1, 1, 1.0, 10, 1.0)]
    #[case(10, 2, 0.5, 5, 2.0)]
    #[case(100, 2, 1.0, 500, 1.0)]
    #[case(50, 2, 0.5, 10, 5.0)]
    #[case(25, 2, 1.0, 10, 5.0)]
    #[case(254, 2, 0.5, 50, 5.5)]
    #[case(0, 2, 1.0, 10, 0.0)]
    #[case(100, 0, 1.0, 10, 0.0)]
    #[case(5, 2, 1.0, 1, 10.0)]
    #[case(10, 1, 0.25, 5, 0.5)]
    fn test_estimate_scan_duration(
        #[case] hosts: usize,
        #[case] ports: usize,
        #[case] timeout: f64,
        #[case] concurrency: usize,
        #[case] expected: f64,
    ) {
        assert_eq!(estimate_scan_duration(hosts, ports, timeout, concurrency), expected);
    }
}
