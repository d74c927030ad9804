//! Address parsing and the order-preserving storage key.
//!
//! Keys are one family byte (`4` or `6`) followed by the big-endian octets.
//! SQLite compares BLOBs with `memcmp`, so key order is address order within
//! a family and every IPv4 key sorts before every IPv6 key.

use std::net::IpAddr;

use crate::error_handling::LookupError;

const FAMILY_V4: u8 = 4;
const FAMILY_V6: u8 = 6;

/// Parses caller input into an address.
///
/// Surrounding whitespace is ignored. IPv4-mapped IPv6 addresses are
/// canonicalized to IPv4 so they hit the IPv4 ranges.
pub fn parse_ip(input: &str) -> Result<IpAddr, LookupError> {
    let trimmed = input.trim();
    trimmed
        .parse::<IpAddr>()
        .map(|ip| ip.to_canonical())
        .map_err(|_| LookupError::InvalidAddress(trimmed.to_string()))
}

/// Order-preserving binary key for `ip`.
pub fn address_key(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => {
            let mut key = Vec::with_capacity(5);
            key.push(FAMILY_V4);
            key.extend_from_slice(&v4.octets());
            key
        }
        IpAddr::V6(v6) => {
            let mut key = Vec::with_capacity(17);
            key.push(FAMILY_V6);
            key.extend_from_slice(&v6.octets());
            key
        }
    }
}

/// Smallest key of the family of `ip`; lookups never cross below it.
pub fn family_floor(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(_) => vec![FAMILY_V4],
        IpAddr::V6(_) => vec![FAMILY_V6],
    }
}
