//! Geobisect - compact IP-to-country tables with bisection lookup.
//!
//! An address-range feed (`start,end,country` CSV, optionally gzip
//! compressed) is encoded into two headerless files of fixed-size records,
//! one per address family:
//!
//! - `<prefix>.v4`: 6-byte records (4-byte big-endian address + 2-byte code)
//! - `<prefix>.v6`: 18-byte records (16-byte big-endian address + 2-byte code)
//!
//! A record marks the start of a range that extends up to the next record.
//! Lookup binary-searches for the greatest start at or below the queried
//! address.
//!
//! # Quick Start
//!
//! ```ignore
//! use geobisect::{encode_file, CountryDb};
//! use std::path::Path;
//!
//! // Produces dbip.v4 and dbip.v6
//! let stats = encode_file(Path::new("dbip-country.csv.gz"), Path::new("dbip"))?;
//! println!("skipped {} rows", stats.skipped());
//!
//! let db = CountryDb::open(Path::new("dbip"))?;
//! if let Some(country) = db.lookup("1.1.1.1".parse()?) {
//!     println!("{}", country);
//! }
//! ```
//!
//! # Distribution
//!
//! Encoded tables are published under versioned keys
//! (`geoip/<yyyy>/<epochMs>/dbip.v4`) with [`publish()`], and consumed by
//! [`RemoteCountryDb`], which checks for updates, downloads new versions into
//! a local cache and hot-reloads them:
//!
//! ```ignore
//! use geobisect::RemoteCountryDb;
//! use std::path::Path;
//!
//! let mut db = RemoteCountryDb::new("https://dist.example.com", Path::new("/tmp/geoip"));
//! db.init()?;
//! let country = db.lookup("2001:db8::1".parse()?);
//! ```

mod error;
mod global;

pub mod cached_reader;
pub mod country;
pub mod encoder;
pub mod family;
pub mod format;
pub mod metadata;
pub mod publish;
pub mod reader;
pub mod remote;
pub mod version;

// Re-export core types
pub use country::CountryCode;
pub use error::{Error, Result};
pub use family::AddressFamily;
pub use format::Record;

// Encoding
pub use encoder::{encode_file, EncodeStats, Encoder, EncoderConfig};

// Lookup
pub use cached_reader::{CacheStats, CachedCountryDb, CachedReaderConfig};
pub use reader::{CountryDb, RangeEntry, RecordTable};

// Re-export global API functions
pub use global::{init_country_db, init_country_db_from_bytes, is_initialized, lookup_country};

// Versioning and distribution
pub use metadata::UpdateMetadata;
pub use publish::{publish, Manifest};
pub use remote::RemoteCountryDb;
pub use version::{should_update, Version};
