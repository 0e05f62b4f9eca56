//! Fixed-stride record format.
//!
//! Each address family is stored in its own file. A file is nothing but
//! consecutive records sorted ascending by address; there is no header,
//! footer, magic or length prefix.
//!
//! ```text
//! IPv4 record (6 bytes)           IPv6 record (18 bytes)
//! +----------------+-------+      +----------------------+-------+
//! | address (4 BE) | cc(2) |      | address (16 BE)      | cc(2) |
//! +----------------+-------+      +----------------------+-------+
//! ```
//!
//! A record covers every address from its own start up to, but excluding,
//! the start of the next record. The last record extends to the end of the
//! address space.

use std::ffi::OsString;
use std::io::Write;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::country::CountryCode;
use crate::family::{pack, AddressFamily};
use crate::{Error, Result};

/// Record stride of IPv4 files.
pub const V4_STRIDE: usize = AddressFamily::V4.stride();

/// Record stride of IPv6 files.
pub const V6_STRIDE: usize = AddressFamily::V6.stride();

/// A decoded database record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    /// First address of the range
    pub address: IpAddr,
    /// Country the range belongs to
    pub country: CountryCode,
}

impl Record {
    pub fn new(address: IpAddr, country: CountryCode) -> Self {
        Self { address, country }
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.address)
    }

    /// Decode one record of `family` from exactly one stride of bytes.
    pub fn decode(family: AddressFamily, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != family.stride() {
            return None;
        }
        let (addr, cc) = bytes.split_at(family.address_len());
        let address = family.unpack(addr)?;
        let country = CountryCode::from_bytes([cc[0], cc[1]]);
        Some(Self { address, country })
    }

    /// Append the packed record to `out`.
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        let mut addr = [0u8; 16];
        let n = pack(&self.address, &mut addr);
        out.write_all(&addr[..n])?;
        out.write_all(self.country.as_bytes())
    }
}

/// Number of whole records in a file of `len` bytes.
///
/// Fails closed when the length is not a multiple of the stride.
pub fn record_count(family: AddressFamily, len: usize) -> Result<usize> {
    let stride = family.stride();
    if len % stride != 0 {
        return Err(Error::InvalidDatabase {
            family,
            len,
            stride,
        });
    }
    Ok(len / stride)
}

/// `<prefix>.v4` or `<prefix>.v6`.
///
/// The suffix is appended, so a prefix that already has an extension keeps it.
pub fn output_path(prefix: &Path, family: AddressFamily) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(".");
    name.push(family.as_str());
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cc(s: &str) -> CountryCode {
        CountryCode::parse(s).unwrap()
    }

    #[test]
    fn test_stride_constants() {
        assert_eq!(V4_STRIDE, 6);
        assert_eq!(V6_STRIDE, 18);
    }

    #[test]
    fn test_v4_record_layout() {
        let mut out = Vec::new();
        Record::new("1.2.3.4".parse().unwrap(), cc("AU"))
            .write_to(&mut out)
            .unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, b'A', b'U']);
    }

    #[test]
    fn test_v6_record_layout() {
        let mut out = Vec::new();
        Record::new("2001:db8::ff".parse().unwrap(), cc("NL"))
            .write_to(&mut out)
            .unwrap();
        assert_eq!(out.len(), V6_STRIDE);
        assert_eq!(&out[..2], &[0x20, 0x01]);
        assert_eq!(out[15], 0xff);
        assert_eq!(&out[16..], b"NL");
    }

    #[test]
    fn test_decode() {
        let record = Record::decode(AddressFamily::V4, &[8, 8, 8, 0, b'U', b'S']).unwrap();
        assert_eq!(record.address, "8.8.8.0".parse::<IpAddr>().unwrap());
        assert_eq!(record.country, cc("US"));
        assert_eq!(record.family(), AddressFamily::V4);

        assert!(Record::decode(AddressFamily::V4, &[8, 8, 8, 0, b'U']).is_none());
        assert!(Record::decode(AddressFamily::V6, &[8, 8, 8, 0, b'U', b'S']).is_none());
    }

    #[test]
    fn test_record_count() {
        assert_eq!(record_count(AddressFamily::V4, 0).unwrap(), 0);
        assert_eq!(record_count(AddressFamily::V4, 12).unwrap(), 2);
        assert_eq!(record_count(AddressFamily::V6, 36).unwrap(), 2);
        assert!(matches!(
            record_count(AddressFamily::V4, 13),
            Err(Error::InvalidDatabase { len: 13, stride: 6, .. })
        ));
        assert!(record_count(AddressFamily::V6, 12).is_err());
    }

    #[test]
    fn test_output_path() {
        assert_eq!(
            output_path(Path::new("out/dbip"), AddressFamily::V4),
            PathBuf::from("out/dbip.v4")
        );
        assert_eq!(
            output_path(Path::new("dbip.2024"), AddressFamily::V6),
            PathBuf::from("dbip.2024.v6")
        );
    }
}
