//! DCC CTCP message parser.
//!
//! Parses `DCC CHAT chat <ip> <port>` offers received via CTCP. The address
//! is normally a decimal IPv4 integer (network byte order); clients that
//! speak IPv6 send a literal address instead.

use std::net::{IpAddr, Ipv4Addr};

/// A parsed DCC CHAT offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DccOffer {
    pub ip: IpAddr,
    pub port: u16,
}

/// Parse a DCC CHAT CTCP string into a [`DccOffer`].
pub fn parse_dcc_chat(ctcp: &str) -> Option<DccOffer> {
    let content = ctcp.trim().strip_prefix("DCC CHAT ")?;
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 3 || !parts[0].eq_ignore_ascii_case("chat") {
        return None;
    }

    let ip = match parts[1].parse::<u32>() {
        Ok(decimal) => IpAddr::V4(Ipv4Addr::from(decimal)),
        Err(_) => parts[1].parse().ok()?,
    };
    let port: u16 = parts[2].parse().ok()?;
    if port == 0 {
        return None;
    }

    Some(DccOffer { ip, port })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_address_is_decoded() {
        let offer = parse_dcc_chat("DCC CHAT chat 2130706433 5000").unwrap();
        assert_eq!(offer.ip, IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
        assert_eq!(offer.port, 5000);
    }

    #[test]
    fn literal_addresses_are_accepted() {
        let offer = parse_dcc_chat("DCC CHAT chat ::1 6000").unwrap();
        assert_eq!(offer.ip, "::1".parse::<IpAddr>().unwrap());
        let offer = parse_dcc_chat("DCC CHAT CHAT 10.0.0.2 6001").unwrap();
        assert_eq!(offer.ip, "10.0.0.2".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn malformed_offers_are_ignored() {
        assert_eq!(parse_dcc_chat("DCC SEND file 2130706433 5000 10"), None);
        assert_eq!(parse_dcc_chat("DCC CHAT chat 2130706433"), None);
        assert_eq!(parse_dcc_chat("DCC CHAT chat nowhere 5000"), None);
        assert_eq!(parse_dcc_chat("DCC CHAT chat 2130706433 0"), None);
        assert_eq!(parse_dcc_chat("hello"), None);
    }
}
