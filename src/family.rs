//! Address families and their record geometry.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::country::COUNTRY_CODE_LEN;

/// Address family of a database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// 4-byte addresses, 6-byte records
    V4,
    /// 16-byte addresses, 18-byte records
    V6,
}

impl AddressFamily {
    /// Both families, in output order.
    pub const ALL: [AddressFamily; 2] = [AddressFamily::V4, AddressFamily::V6];

    /// Family of a parsed address.
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    /// Width of a packed address.
    pub const fn address_len(self) -> usize {
        match self {
            AddressFamily::V4 => 4,
            AddressFamily::V6 => 16,
        }
    }

    /// Width of a whole record.
    pub const fn stride(self) -> usize {
        self.address_len() + COUNTRY_CODE_LEN
    }

    /// File suffix, also the extension appended to an output prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressFamily::V4 => "v4",
            AddressFamily::V6 => "v6",
        }
    }

    /// Rebuild an address from its packed form.
    ///
    /// Returns `None` if `bytes` has the wrong width for this family.
    pub fn unpack(self, bytes: &[u8]) -> Option<IpAddr> {
        match self {
            AddressFamily::V4 => {
                let octets: [u8; 4] = bytes.try_into().ok()?;
                Some(IpAddr::V4(Ipv4Addr::from(octets)))
            }
            AddressFamily::V6 => {
                let octets: [u8; 16] = bytes.try_into().ok()?;
                Some(IpAddr::V6(Ipv6Addr::from(octets)))
            }
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => f.write_str("IPv4"),
            AddressFamily::V6 => f.write_str("IPv6"),
        }
    }
}

/// Write the network byte order form of `addr` into `buf`, returning its width.
pub fn pack(addr: &IpAddr, buf: &mut [u8; 16]) -> usize {
    match addr {
        IpAddr::V4(v4) => {
            buf[..4].copy_from_slice(&v4.octets());
            4
        }
        IpAddr::V6(v6) => {
            buf.copy_from_slice(&v6.octets());
            16
        }
    }
}

/// The next address in the same family, `None` at the top of the space.
pub fn successor(addr: &IpAddr) -> Option<IpAddr> {
    match addr {
        IpAddr::V4(v4) => u32::from(*v4)
            .checked_add(1)
            .map(|n| IpAddr::V4(Ipv4Addr::from(n))),
        IpAddr::V6(v6) => u128::from(*v6)
            .checked_add(1)
            .map(|n| IpAddr::V6(Ipv6Addr::from(n))),
    }
}
