//! Fixed-stride record writer.

use std::io::{BufWriter, Write};
use std::net::IpAddr;

use crate::country::CountryCode;
use crate::family::{pack, AddressFamily};
use crate::format::Record;
use crate::{Error, Result};

/// Streams records of one address family to an output.
///
/// Records are written in the order they are pushed; nothing is buffered
/// beyond the underlying `BufWriter`.
pub struct RecordWriter<W: Write> {
    family: AddressFamily,
    out: BufWriter<W>,
    count: u64,
    last: Option<[u8; 16]>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(family: AddressFamily, out: W) -> Self {
        Self {
            family,
            out: BufWriter::new(out),
            count: 0,
            last: None,
        }
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Number of records written so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Whether `addr` sorts strictly before the last pushed address.
    pub fn goes_backwards(&self, addr: &IpAddr) -> bool {
        let Some(last) = self.last else {
            return false;
        };
        let mut packed = [0u8; 16];
        let n = pack(addr, &mut packed);
        packed[..n] < last[..n]
    }

    /// Append one record.
    pub fn push(&mut self, addr: IpAddr, country: CountryCode) -> Result<()> {
        let actual = AddressFamily::of(&addr);
        if actual != self.family {
            return Err(Error::FamilyMismatch {
                expected: self.family,
                actual,
            });
        }

        Record::new(addr, country).write_to(&mut self.out)?;

        let mut packed = [0u8; 16];
        pack(&addr, &mut packed);
        self.last = Some(packed);
        self.count += 1;
        Ok(())
    }

    /// Flush and return the underlying output.
    pub fn finish(self) -> Result<W> {
        self.out
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }
}
