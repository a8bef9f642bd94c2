//! Address extraction from free-form service responses
//!
//! "What is my IP" services do not all answer with a bare address; some wrap
//! it in prose or HTML. Bodies are scanned for candidates and the first one
//! that is a valid address wins.

use regex::Regex;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use crate::task::IpVersion;

static IPV4_CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}").expect("IPv4 pattern is valid")
});

static IPV6_CANDIDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9A-Fa-f:]{2,39}").expect("IPv6 pattern is valid"));

/// Extract the first address of `version` found in `text`
pub fn extract_address(text: &str, version: IpVersion) -> Option<IpAddr> {
    match version {
        IpVersion::V4 => extract_ipv4(text).map(IpAddr::V4),
        IpVersion::V6 => extract_ipv6(text).map(IpAddr::V6),
    }
}

/// Extract the first dotted-quad IPv4 address in `text`
///
/// Candidates glued to further digits or dotted digits (`1234.1.1.1`,
/// `1.2.3.4.5`) and candidates with an octet above 255 are skipped. A dot
/// that only ends a sentence does not count as glue.
pub fn extract_ipv4(text: &str) -> Option<Ipv4Addr> {
    IPV4_CANDIDATE
        .find_iter(text)
        .filter(|m| standalone(text, m.start(), m.end()))
        .find_map(|m| parse_octets(m.as_str()))
}

/// Extract the first IPv6 address in `text`
pub fn extract_ipv6(text: &str) -> Option<Ipv6Addr> {
    IPV6_CANDIDATE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|candidate| candidate.matches(':').count() >= 2)
        .find_map(|candidate| candidate.parse::<Ipv6Addr>().ok())
}

fn standalone(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    if before.is_some_and(|c| c.is_ascii_digit() || c == '.') {
        return false;
    }

    let rest = &text[end..];
    match rest.chars().next() {
        Some(c) if c.is_ascii_digit() => false,
        Some('.') => !rest[1..].starts_with(|c: char| c.is_ascii_digit()),
        _ => true,
    }
}

fn parse_octets(candidate: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    for (slot, part) in octets.iter_mut().zip(candidate.split('.')) {
        let value: u16 = part.parse().ok()?;
        *slot = u8::try_from(value).ok()?;
    }
    Some(Ipv4Addr::from(octets))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_ipv4() {
        assert_eq!(extract_ipv4("1.2.3.4\n"), Some(Ipv4Addr::new(1, 2, 3, 4)));
    }

    #[test]
    fn ipv4_embedded_in_text() {
        assert_eq!(
            extract_ipv4("当前 IP：203.0.113.5  来自于：示例 电信"),
            Some(Ipv4Addr::new(203, 0, 113, 5))
        );
        assert_eq!(
            extract_ipv4("<html><body>Current IP Address: 203.0.113.5</body></html>"),
            Some(Ipv4Addr::new(203, 0, 113, 5))
        );
        assert_eq!(
            extract_ipv4("Your IP is 203.0.113.5."),
            Some(Ipv4Addr::new(203, 0, 113, 5))
        );
        assert_eq!(
            extract_ipv4("IP: 203.0.113.5..."),
            Some(Ipv4Addr::new(203, 0, 113, 5))
        );
    }

    #[test]
    fn octet_above_255_rejected() {
        assert_eq!(extract_ipv4("999.1.1.1"), None);
        assert_eq!(extract_ipv4("1.2.3.256"), None);
    }

    #[test]
    fn invalid_candidate_does_not_hide_a_later_valid_one() {
        assert_eq!(
            extract_ipv4("999.1.1.1 then 10.0.0.1"),
            Some(Ipv4Addr::new(10, 0, 0, 1))
        );
    }

    #[test]
    fn glued_digits_are_not_a_candidate() {
        assert_eq!(extract_ipv4("1234.1.1.1"), None);
        assert_eq!(extract_ipv4("1.2.3.4.5"), None);
    }

    #[test]
    fn ipv6_extraction() {
        assert_eq!(
            extract_ipv6("2001:db8::1\n"),
            Some("2001:db8::1".parse().unwrap())
        );
        assert_eq!(
            extract_ipv6("Your IPv6 is 2001:db8:85a3::8a2e:370:7334."),
            Some("2001:db8:85a3::8a2e:370:7334".parse().unwrap())
        );
        assert_eq!(extract_ipv6("no address here"), None);
        assert_eq!(extract_ipv6("12:30"), None);
    }

    #[test]
    fn family_dispatch() {
        assert_eq!(
            extract_address("addr=198.51.100.7", IpVersion::V4),
            Some("198.51.100.7".parse().unwrap())
        );
        assert_eq!(extract_address("198.51.100.7", IpVersion::V6), None);
    }
}
