//! Streaming encoder from a range-to-country feed to fixed-stride files.
//!
//! The feed is a headerless CSV with `start,end,country` rows, ordered
//! ascending by start address within each family. Every row with a
//! parsable start address becomes one record in the file of its family,
//! in input order. The `end` column is not stored: a record's range ends
//! where the next record's range starts.
//!
//! The encoder never sorts. With `check_order` enabled (the default) a
//! start address that goes backwards aborts the run instead.

mod source;
pub mod writer;


use std::io::{Read, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::country::CountryCode;
use crate::family::{successor, AddressFamily};
use crate::format::output_path;
use crate::{Error, Result};

pub use source::{is_gzip, open_source};
pub use writer::RecordWriter;

/// Encoder configuration.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Require two ASCII letters per country code (folded to uppercase).
    /// When disabled, any two ASCII bytes are written verbatim.
    pub strict_country: bool,
    /// Abort when a start address is lower than the previous one of its family.
    pub check_order: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            strict_country: true,
            check_order: true,
        }
    }
}

impl EncoderConfig {
    pub fn with_strict_country(mut self, strict: bool) -> Self {
        self.strict_country = strict;
        self
    }

    pub fn with_order_check(mut self, check: bool) -> Self {
        self.check_order = check;
        self
    }
}

/// Counters reported after a complete encoding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeStats {
    /// Records written to the IPv4 output
    pub v4_records: u64,
    /// Records written to the IPv6 output
    pub v6_records: u64,
    /// Rows dropped because the start address did not parse
    pub skipped_address: u64,
    /// Rows dropped because the country code was unusable
    pub skipped_country: u64,
    /// Rows starting after the successor of the previous row's end
    pub gaps: u64,
    /// Rows starting at or before the previous row's end
    pub overlaps: u64,
}

impl EncodeStats {
    /// Total rows dropped.
    pub fn skipped(&self) -> u64 {
        self.skipped_address + self.skipped_country
    }

    /// Total records written.
    pub fn records(&self) -> u64 {
        self.v4_records + self.v6_records
    }
}

/// Range feed encoder.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    config: EncoderConfig,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encode an uncompressed feed into two outputs.
    ///
    /// Both outputs are flushed before returning. On error they may hold a
    /// partial prefix of the records.
    pub fn encode<R: Read, W: Write>(&self, input: R, v4: W, v6: W) -> Result<EncodeStats> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(input);

        let mut v4 = RecordWriter::new(AddressFamily::V4, v4);
        let mut v6 = RecordWriter::new(AddressFamily::V6, v6);
        let mut prev_end: [Option<IpAddr>; 2] = [None, None];
        let mut stats = EncodeStats::default();

        let mut row = csv::StringRecord::new();
        while rdr.read_record(&mut row)? {
            let line = row.position().map(|p| p.line()).unwrap_or(0);
            // Exactly start, end, country
            if row.len() != 3 {
                return Err(Error::MalformedRow {
                    line,
                    fields: row.len(),
                });
            }

            let Ok(start) = row[0].parse::<IpAddr>() else {
                log::trace!("line {}: unparsable start address {:?}", line, &row[0]);
                stats.skipped_address += 1;
                continue;
            };
            let Some(country) = self.parse_country(&row[2]) else {
                log::trace!("line {}: unusable country code {:?}", line, &row[2]);
                stats.skipped_country += 1;
                continue;
            };

            let family = AddressFamily::of(&start);
            let (writer, prev_end) = match family {
                AddressFamily::V4 => (&mut v4, &mut prev_end[0]),
                AddressFamily::V6 => (&mut v6, &mut prev_end[1]),
            };

            if self.config.check_order && writer.goes_backwards(&start) {
                return Err(Error::UnsortedInput { line, family });
            }

            track_continuity(prev_end, &start, &row[1], &mut stats);
            writer.push(start, country)?;
        }

        stats.v4_records = v4.count();
        stats.v6_records = v6.count();
        v4.finish()?;
        v6.finish()?;

        if stats.skipped() > 0 {
            log::warn!(
                "Skipped {} rows ({} bad start address, {} bad country code)",
                stats.skipped(),
                stats.skipped_address,
                stats.skipped_country
            );
        }
        if stats.gaps > 0 || stats.overlaps > 0 {
            log::warn!(
                "Feed is not contiguous: {} gaps, {} overlaps",
                stats.gaps,
                stats.overlaps
            );
        }
        log::info!(
            "Encoded {} IPv4 and {} IPv6 records",
            stats.v4_records,
            stats.v6_records
        );

        Ok(stats)
    }

    /// Encode a feed file into `<out_prefix>.v4` and `<out_prefix>.v6`.
    ///
    /// The source is opened (and its compression detected) before any output
    /// is touched. Outputs are written to temporary files next to the
    /// destination and renamed into place only after the whole feed has been
    /// consumed, so a failed run leaves existing files untouched.
    pub fn encode_file(&self, input: &Path, out_prefix: &Path) -> Result<EncodeStats> {
        let source = open_source(input)?;

        let dir = match out_prefix.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut v4_tmp = NamedTempFile::new_in(&dir)?;
        let mut v6_tmp = NamedTempFile::new_in(&dir)?;

        let stats = self.encode(source, &mut v4_tmp, &mut v6_tmp)?;

        for (tmp, family) in [(v4_tmp, AddressFamily::V4), (v6_tmp, AddressFamily::V6)] {
            let file = tmp.as_file();
            file.sync_all()?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(std::fs::Permissions::from_mode(0o644))?;
            }

            let path = output_path(out_prefix, family);
            tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
            log::info!("Wrote {:?}", path);
        }

        Ok(stats)
    }

    fn parse_country(&self, s: &str) -> Option<CountryCode> {
        let parsed = if self.config.strict_country {
            CountryCode::parse(s)
        } else {
            CountryCode::from_ascii(s)
        };
        parsed.ok()
    }
}

/// Encode a feed file with the default configuration.
pub fn encode_file(input: &Path, out_prefix: &Path) -> Result<EncodeStats> {
    Encoder::new().encode_file(input, out_prefix)
}

/// Compare a row's start against the previous row's end in the same family.
fn track_continuity(
    prev_end: &mut Option<IpAddr>,
    start: &IpAddr,
    end: &str,
    stats: &mut EncodeStats,
) {
    if let Some(prev) = prev_end.take() {
        match successor(&prev) {
            Some(expected) if *start == expected => {}
            Some(expected) if *start > expected => stats.gaps += 1,
            _ => stats.overlaps += 1,
        }
    }

    *prev_end = end
        .parse::<IpAddr>()
        .ok()
        .filter(|e| AddressFamily::of(e) == AddressFamily::of(start));
}
