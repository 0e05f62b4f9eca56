//! Bisection lookup over fixed-stride database files.

use memmap2::Mmap;
use std::fs::File;
use std::io::ErrorKind;
use std::net::IpAddr;
use std::ops::Deref;
use std::path::Path;

use crate::country::CountryCode;
use crate::family::{pack, AddressFamily};
use crate::format::{output_path, record_count, Record};
use crate::{Error, Result};

/// Backing bytes of a table.
enum Storage {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Storage {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Storage::Mapped(mmap) => &mmap[..],
            Storage::Owned(data) => &data[..],
        }
    }
}

/// The range a lookup answer applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeEntry {
    /// First address of the range (inclusive)
    pub start: IpAddr,
    /// First address of the following range (exclusive), `None` for the last record
    pub next_start: Option<IpAddr>,
    /// Country of the range
    pub country: CountryCode,
}

impl RangeEntry {
    /// Whether `addr` lies in `[start, next_start)`.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        if AddressFamily::of(addr) != AddressFamily::of(&self.start) || *addr < self.start {
            return false;
        }
        match self.next_start {
            Some(next) => *addr < next,
            None => true,
        }
    }
}

/// Sorted records of one address family.
///
/// Lookups are read-only; a table can be shared across threads.
pub struct RecordTable {
    family: AddressFamily,
    data: Storage,
    len: usize,
}

impl RecordTable {
    /// Memory-map a database file.
    ///
    /// An empty file gives an empty table. A file whose size is not a
    /// multiple of the stride is rejected.
    pub fn open(path: &Path, family: AddressFamily) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len() as usize;
        record_count(family, size)?;

        let data = if size == 0 {
            Storage::Owned(Vec::new())
        } else {
            Storage::Mapped(unsafe { Mmap::map(&file)? })
        };
        Self::from_storage(family, data)
    }

    /// Build a table over in-memory bytes.
    pub fn from_bytes(data: Vec<u8>, family: AddressFamily) -> Result<Self> {
        Self::from_storage(family, Storage::Owned(data))
    }

    fn from_storage(family: AddressFamily, data: Storage) -> Result<Self> {
        let len = record_count(family, data.len())?;
        Ok(Self { family, data, len })
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw bytes of the table.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Decode record `i`.
    pub fn record(&self, i: usize) -> Option<Record> {
        if i >= self.len {
            return None;
        }
        let stride = self.family.stride();
        let offset = i * stride;
        Record::decode(self.family, &self.data[offset..offset + stride])
    }

    /// All records in file order.
    pub fn iter(&self) -> impl Iterator<Item = Record> + '_ {
        (0..self.len).filter_map(move |i| self.record(i))
    }

    /// Country of the greatest start address not above `addr`.
    ///
    /// Returns `None` when `addr` is below the first record, when the table
    /// is empty, or when `addr` belongs to the other family.
    pub fn lookup(&self, addr: IpAddr) -> Option<CountryCode> {
        let i = self.position(&addr)?;
        self.record(i).map(|r| r.country)
    }

    /// Like [`RecordTable::lookup`], also returning the range the answer covers.
    pub fn lookup_entry(&self, addr: IpAddr) -> Option<RangeEntry> {
        let i = self.position(&addr)?;
        let record = self.record(i)?;
        Some(RangeEntry {
            start: record.address,
            next_start: self.record(i + 1).map(|r| r.address),
            country: record.country,
        })
    }

    fn address_at(&self, i: usize) -> &[u8] {
        let offset = i * self.family.stride();
        &self.data[offset..offset + self.family.address_len()]
    }

    /// Index of the last record whose address is <= `addr`.
    fn position(&self, addr: &IpAddr) -> Option<usize> {
        if AddressFamily::of(addr) != self.family {
            return None;
        }

        let mut key = [0u8; 16];
        let n = pack(addr, &mut key);
        let key = &key[..n];

        // Big-endian bytes compare the same as the numbers they encode
        let (mut lo, mut hi) = (0, self.len);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.address_at(mid) <= key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        lo.checked_sub(1)
    }
}

/// Country database made of one table per address family.
///
/// A family whose file is absent is unavailable: lookups in it return `None`.
#[derive(Default)]
pub struct CountryDb {
    v4: Option<RecordTable>,
    v6: Option<RecordTable>,
}

impl CountryDb {
    /// Open `<prefix>.v4` and `<prefix>.v6`.
    pub fn open(prefix: &Path) -> Result<Self> {
        Ok(Self {
            v4: open_optional(prefix, AddressFamily::V4)?,
            v6: open_optional(prefix, AddressFamily::V6)?,
        })
    }

    /// Build a database from in-memory file contents.
    pub fn from_bytes(v4: Vec<u8>, v6: Vec<u8>) -> Result<Self> {
        Ok(Self {
            v4: Some(RecordTable::from_bytes(v4, AddressFamily::V4)?),
            v6: Some(RecordTable::from_bytes(v6, AddressFamily::V6)?),
        })
    }

    pub fn from_tables(v4: Option<RecordTable>, v6: Option<RecordTable>) -> Self {
        Self { v4, v6 }
    }

    /// The table of `family`, if available.
    pub fn table(&self, family: AddressFamily) -> Option<&RecordTable> {
        match family {
            AddressFamily::V4 => self.v4.as_ref(),
            AddressFamily::V6 => self.v6.as_ref(),
        }
    }

    /// Total records across both families.
    pub fn record_count(&self) -> usize {
        AddressFamily::ALL
            .iter()
            .filter_map(|f| self.table(*f))
            .map(RecordTable::len)
            .sum()
    }

    /// Look up the country of an address.
    pub fn lookup(&self, addr: IpAddr) -> Option<CountryCode> {
        self.table(AddressFamily::of(&addr))?.lookup(addr)
    }

    /// Look up the country of an address and the range it falls in.
    pub fn lookup_entry(&self, addr: IpAddr) -> Option<RangeEntry> {
        self.table(AddressFamily::of(&addr))?.lookup_entry(addr)
    }

    /// Parse and look up an address.
    pub fn lookup_str(&self, addr: &str) -> Result<Option<CountryCode>> {
        let addr: IpAddr = addr
            .trim()
            .parse()
            .map_err(|_| Error::InvalidIpAddress(addr.to_string()))?;
        Ok(self.lookup(addr))
    }
}

fn open_optional(prefix: &Path, family: AddressFamily) -> Result<Option<RecordTable>> {
    let path = output_path(prefix, family);
    match RecordTable::open(&path, family) {
        Ok(table) => {
            log::debug!("Opened {:?}: {} {} records", path, table.len(), family);
            Ok(Some(table))
        }
        Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
            log::debug!("No {} database at {:?}", family, path);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn cc(s: &str) -> CountryCode {
        CountryCode::parse(s).unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn build(family: AddressFamily, records: &[(&str, &str)]) -> RecordTable {
        let mut data = Vec::new();
        for (addr, country) in records {
            Record::new(ip(addr), cc(country))
                .write_to(&mut data)
                .unwrap();
        }
        RecordTable::from_bytes(data, family).unwrap()
    }

    fn sample_v4() -> RecordTable {
        build(
            AddressFamily::V4,
            &[("0.0.0.0", "AA"), ("10.0.0.0", "BB"), ("20.0.0.0", "CC")],
        )
    }

    #[test]
    fn test_lookup_classification() {
        let table = sample_v4();

        assert_eq!(table.lookup(ip("15.0.0.0")), Some(cc("BB")));
        assert_eq!(table.lookup(ip("5.0.0.0")), Some(cc("AA")));
        assert_eq!(table.lookup(ip("25.0.0.0")), Some(cc("CC")));
        assert_eq!(table.lookup(ip("0.0.0.0")), Some(cc("AA")));
    }

    #[test]
    fn test_lookup_boundaries() {
        let table = sample_v4();

        assert_eq!(table.lookup(ip("9.255.255.255")), Some(cc("AA")));
        assert_eq!(table.lookup(ip("10.0.0.0")), Some(cc("BB")));
        assert_eq!(table.lookup(ip("19.255.255.255")), Some(cc("BB")));
        assert_eq!(table.lookup(ip("20.0.0.0")), Some(cc("CC")));
        assert_eq!(table.lookup(ip("255.255.255.255")), Some(cc("CC")));
    }

    #[test]
    fn test_below_first_record_is_unknown() {
        let table = build(AddressFamily::V4, &[("1.0.0.0", "AU")]);

        assert_eq!(table.lookup(ip("0.0.0.0")), None);
        assert_eq!(table.lookup(ip("0.255.255.255")), None);
        assert_eq!(table.lookup(ip("1.0.0.0")), Some(cc("AU")));
    }

    #[test]
    fn test_empty_table_is_unknown() {
        let table = RecordTable::from_bytes(Vec::new(), AddressFamily::V4).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.lookup(ip("8.8.8.8")), None);
    }

    #[test]
    fn test_other_family_is_unknown() {
        let table = sample_v4();
        assert_eq!(table.lookup(ip("::1")), None);
    }

    #[test]
    fn test_truncated_table_rejected() {
        let mut data = sample_v4().as_bytes().to_vec();
        data.pop();

        let result = RecordTable::from_bytes(data, AddressFamily::V4);
        assert!(matches!(result, Err(Error::InvalidDatabase { len: 17, .. })));

        // Two v4 records (12 bytes) are not a whole v6 record
        let data = sample_v4().as_bytes()[..12].to_vec();
        assert!(matches!(
            RecordTable::from_bytes(data, AddressFamily::V6),
            Err(Error::InvalidDatabase { len: 12, stride: 18, .. })
        ));
    }

    #[test]
    fn test_v6_lookup() {
        let table = build(
            AddressFamily::V6,
            &[("::", "ZZ"), ("2001:db8::", "NL"), ("2001:db9::", "DE")],
        );

        assert_eq!(table.lookup(ip("::1")), Some(cc("ZZ")));
        assert_eq!(table.lookup(ip("2001:db8::")), Some(cc("NL")));
        assert_eq!(table.lookup(ip("2001:db8:ffff::1")), Some(cc("NL")));
        assert_eq!(table.lookup(ip("2001:db9::1")), Some(cc("DE")));
        assert_eq!(table.lookup(ip("1.2.3.4")), None);
    }

    #[test]
    fn test_lookup_entry_range() {
        let table = sample_v4();

        let entry = table.lookup_entry(ip("15.0.0.0")).unwrap();
        assert_eq!(entry.start, ip("10.0.0.0"));
        assert_eq!(entry.next_start, Some(ip("20.0.0.0")));
        assert_eq!(entry.country, cc("BB"));
        assert!(entry.contains(&ip("10.0.0.0")));
        assert!(!entry.contains(&ip("20.0.0.0")));
        assert!(!entry.contains(&ip("::1")));

        let last = table.lookup_entry(ip("200.0.0.0")).unwrap();
        assert_eq!(last.next_start, None);
        assert!(last.contains(&ip("255.255.255.255")));
    }

    #[test]
    fn test_duplicate_starts_use_last() {
        let table = build(
            AddressFamily::V4,
            &[("1.0.0.0", "AU"), ("1.0.0.0", "NZ"), ("2.0.0.0", "FR")],
        );
        assert_eq!(table.lookup(ip("1.0.0.1")), Some(cc("NZ")));
    }

    #[test]
    fn test_iter_and_record() {
        let table = sample_v4();
        let records: Vec<Record> = table.iter().collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].address, ip("10.0.0.0"));
        assert_eq!(table.record(2).unwrap().country, cc("CC"));
        assert!(table.record(3).is_none());
    }

    #[test]
    fn test_matches_linear_scan() {
        let starts: Vec<String> = (0..64u32)
            .map(|i| std::net::Ipv4Addr::from(i * 0x0400_0000 + 7).to_string())
            .collect();
        let countries = ["AA", "BB", "CC", "DD"];
        let records: Vec<(&str, &str)> = starts
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), countries[i % 4]))
            .collect();
        let table = build(AddressFamily::V4, &records);

        for probe in (0..=255u32).map(|i| i * 0x0100_0000 + 3) {
            let addr = IpAddr::V4(std::net::Ipv4Addr::from(probe));
            let expected = table
                .iter()
                .filter(|r| r.address <= addr)
                .last()
                .map(|r| r.country);
            assert_eq!(table.lookup(addr), expected, "probe {}", addr);
        }
    }

    #[test]
    fn test_country_db_open() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("dbip");
        std::fs::write(
            output_path(&prefix, AddressFamily::V4),
            sample_v4().as_bytes(),
        )
        .unwrap();

        // Missing v6 file: IPv6 is unknown, not an error
        let db = CountryDb::open(&prefix).unwrap();
        assert!(db.table(AddressFamily::V6).is_none());
        assert_eq!(db.lookup(ip("15.0.0.0")), Some(cc("BB")));
        assert_eq!(db.lookup(ip("2001:db8::1")), None);
        assert_eq!(db.record_count(), 3);
    }

    #[test]
    fn test_country_db_open_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("dbip");
        std::fs::write(output_path(&prefix, AddressFamily::V6), b"").unwrap();

        let db = CountryDb::open(&prefix).unwrap();
        assert!(db.table(AddressFamily::V6).unwrap().is_empty());
        assert_eq!(db.lookup(ip("::1")), None);
    }

    #[test]
    fn test_country_db_open_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("dbip");
        std::fs::write(output_path(&prefix, AddressFamily::V4), [1, 2, 3, 4, 5]).unwrap();

        assert!(matches!(
            CountryDb::open(&prefix),
            Err(Error::InvalidDatabase {
                family: AddressFamily::V4,
                ..
            })
        ));
    }

    #[test]
    fn test_lookup_str() {
        let db = CountryDb::from_tables(Some(sample_v4()), None);
        assert_eq!(db.lookup_str(" 15.1.2.3 ").unwrap(), Some(cc("BB")));
        assert!(matches!(
            db.lookup_str("15.1.2"),
            Err(Error::InvalidIpAddress(_))
        ));
    }

    #[test]
    fn test_concurrent_lookups() {
        let db = Arc::new(CountryDb::from_tables(Some(sample_v4()), None));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        assert_eq!(db.lookup(ip("15.0.0.0")), Some(cc("BB")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
