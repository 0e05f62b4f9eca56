//! Remote country database: update checks, downloads and hot reload.
//!
//! The distribution endpoint exposes two routes:
//! - `GET <base>/update/geoip?tstamp=<ms>` answers
//!   `{"version":"1","update":"true","latest":1655832359111}`
//! - `GET <base>/geoip/<ms>?v4` (or `?v6`) serves the raw table of one
//!   family, gzip compressed when `gzipped` is requested.
//!
//! Downloads land in a cache directory as `dbip.v4` / `dbip.v6` next to a
//! `geoip.meta` sidecar. Both tables are validated before either replaces
//! the cached copy.

use flate2::read::GzDecoder;
use serde::Deserialize;
use std::fs;
use std::io::{Read, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::NamedTempFile;

use crate::cached_reader::{CachedCountryDb, CachedReaderConfig};
use crate::country::CountryCode;
use crate::encoder::is_gzip;
use crate::family::AddressFamily;
use crate::format::{output_path, record_count};
use crate::metadata::UpdateMetadata;
use crate::version::{should_update, Version};
use crate::{Error, Result};

/// Stem of the cached tables: `dbip.v4`, `dbip.v6`.
const CACHE_STEM: &str = "dbip";
const METADATA_FILE: &str = "geoip.meta";
/// Upper bound on a single downloaded table.
const MAX_ARTIFACT_SIZE: u64 = 256 * 1024 * 1024;

/// Answer of the update endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheck {
    /// Whether the server advises an update
    pub update: bool,
    /// Newest published version, if the server named a valid one
    pub latest: Option<Version>,
}

#[derive(Deserialize)]
struct UpdateResponse {
    update: Flag,
    latest: Option<Stamp>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Stamp {
    Number(u64),
    Text(String),
}

impl UpdateCheck {
    /// Parse the JSON body of the update endpoint.
    ///
    /// `update` may be a boolean or the strings `"true"`/`"false"`;
    /// `latest` may be a number or a string in either version form.
    pub fn parse(body: &str) -> Result<Self> {
        let resp: UpdateResponse = serde_json::from_str(body)?;
        let update = match resp.update {
            Flag::Bool(b) => b,
            Flag::Text(s) => s.trim().eq_ignore_ascii_case("true"),
        };
        let latest = match resp.latest {
            Some(Stamp::Number(ms)) => Version::from_millis(ms).ok(),
            Some(Stamp::Text(s)) => s.parse().ok(),
            None => None,
        };
        Ok(Self { update, latest })
    }
}

/// Country database kept in sync with a distribution endpoint.
///
/// # Example
///
/// ```ignore
/// use geobisect::RemoteCountryDb;
/// use std::path::Path;
///
/// let mut db = RemoteCountryDb::new("https://dist.example.com", Path::new("/var/cache/geoip"));
///
/// // Load from cache, or download the latest version
/// db.init()?;
///
/// let country = db.lookup("1.1.1.1".parse()?);
///
/// // Periodically
/// if db.update_if_needed()? {
///     println!("Now at {:?}", db.version());
/// }
/// ```
pub struct RemoteCountryDb {
    base_url: String,
    cache_dir: PathBuf,
    db: Option<CachedCountryDb>,
    /// Installed version, if known
    version: Option<Version>,
    reader_config: CachedReaderConfig,
    update_interval: Duration,
    /// Ask the server for gzip compressed artifacts
    gzipped: bool,
    agent: ureq::Agent,
    metadata_path: PathBuf,
}

impl RemoteCountryDb {
    /// Create a manager for `base_url`, caching into `cache_dir`.
    pub fn new(base_url: &str, cache_dir: &Path) -> Self {
        Self::with_config(base_url, cache_dir, CachedReaderConfig::default())
    }

    /// Create with custom lookup cache configuration.
    pub fn with_config(base_url: &str, cache_dir: &Path, reader_config: CachedReaderConfig) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            cache_dir: cache_dir.to_path_buf(),
            db: None,
            version: None,
            reader_config,
            update_interval: Duration::from_secs(86400), // 1 day default
            gzipped: true,
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(60))
                .build(),
            metadata_path: cache_dir.join(METADATA_FILE),
        }
    }

    /// Set the minimum time between update checks in `update_if_needed`.
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Request plain instead of gzip compressed artifacts.
    pub fn with_gzip(mut self, gzipped: bool) -> Self {
        self.gzipped = gzipped;
        self
    }

    fn cache_prefix(&self) -> PathBuf {
        self.cache_dir.join(CACHE_STEM)
    }

    /// Cached table of `family`.
    pub fn table_path(&self, family: AddressFamily) -> PathBuf {
        output_path(&self.cache_prefix(), family)
    }

    /// URL of the update check for the installed version.
    pub fn update_url(&self) -> String {
        let tstamp = self
            .version
            .as_ref()
            .map(Version::bare)
            .unwrap_or_else(|| "0".to_string());
        format!("{}/update/geoip?tstamp={}", self.base_url, tstamp)
    }

    /// URL of one family's table for `version`.
    pub fn artifact_url(&self, version: &Version, family: AddressFamily) -> String {
        let mut url = format!(
            "{}/geoip/{}?{}",
            self.base_url,
            version.bare(),
            family.as_str()
        );
        if self.gzipped {
            url.push_str("&gzipped");
        }
        url
    }

    /// Load the cached tables, or download the latest version if there are
    /// none (or they are unusable).
    pub fn init(&mut self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        if let Ok(meta) = UpdateMetadata::load(&self.metadata_path) {
            self.version = meta.version;
        }

        let cached = AddressFamily::ALL
            .iter()
            .any(|f| self.table_path(*f).exists());
        if cached {
            match self.load_cached() {
                Ok(()) => {
                    log::info!("Loaded country database from cache: {:?}", self.cache_dir);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("Failed to load cached country database, will download: {}", e);
                    self.version = None;
                }
            }
        }

        let check = self.check_update()?;
        match check.latest {
            Some(latest) => self.download(&latest),
            None => Err(Error::Download(
                "update endpoint did not name a version".to_string(),
            )),
        }
    }

    /// Ask the endpoint whether a newer version exists.
    pub fn check_update(&self) -> Result<UpdateCheck> {
        let url = self.update_url();
        let body = self
            .get(&url)?
            .into_string()
            .map_err(|e| Error::Download(format!("Failed to read response: {}", e)))?;
        let check = UpdateCheck::parse(&body)?;
        log::debug!(
            "Update check: update={} latest={:?} installed={:?}",
            check.update,
            check.latest,
            self.version
        );
        Ok(check)
    }

    /// Check for a newer version and install it.
    ///
    /// Returns `true` if a new version was installed.
    pub fn update(&mut self) -> Result<bool> {
        let check = self.check_update()?;

        let latest = match check.latest {
            Some(latest) if check.update && should_update(Some(&latest), self.version.as_ref()) => {
                latest
            }
            _ => {
                UpdateMetadata::now_with_version(self.version).save(&self.metadata_path)?;
                return Ok(false);
            }
        };

        self.download(&latest)?;
        Ok(true)
    }

    /// Whether the update interval has elapsed since the last check.
    pub fn needs_update(&self) -> bool {
        let meta = UpdateMetadata::load(&self.metadata_path).unwrap_or_default();
        meta.needs_update(self.update_interval)
    }

    /// `update()`, but only once the update interval has elapsed.
    pub fn update_if_needed(&mut self) -> Result<bool> {
        if self.needs_update() {
            self.update()
        } else {
            Ok(false)
        }
    }

    /// Time of the last successful check or download.
    pub fn last_updated(&self) -> Option<SystemTime> {
        UpdateMetadata::load(&self.metadata_path)
            .ok()
            .and_then(|m| m.last_updated)
    }

    /// Download both tables of `version`, replace the cache and reload.
    ///
    /// Both tables are downloaded and validated before either is renamed
    /// into place, so a failed or invalid download leaves the cache as it
    /// was. The two renames themselves are separate: if the second one
    /// fails the cache holds the new v4 table next to the old v6 table, and
    /// the error is returned without reloading or recording the version.
    pub fn download(&mut self, version: &Version) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        let mut staged = Vec::with_capacity(AddressFamily::ALL.len());
        for family in AddressFamily::ALL {
            let url = self.artifact_url(version, family);
            let mut raw = Vec::new();
            self.get(&url)?
                .into_reader()
                .take(MAX_ARTIFACT_SIZE)
                .read_to_end(&mut raw)
                .map_err(|e| Error::Download(format!("Failed to read {}: {}", url, e)))?;
            let raw_len = raw.len();

            let data = decode_artifact(family, raw)?;
            log::info!(
                "Downloaded {} table {}: {} bytes ({} on the wire)",
                family,
                version,
                data.len(),
                raw_len
            );

            let mut tmp = NamedTempFile::new_in(&self.cache_dir)?;
            tmp.write_all(&data)?;
            tmp.as_file().sync_all()?;
            staged.push((family, tmp));
        }

        for (family, tmp) in staged {
            tmp.persist(self.table_path(family))
                .map_err(|e| Error::Io(e.error))?;
        }

        self.version = Some(*version);
        UpdateMetadata::now_with_version(self.version).save(&self.metadata_path)?;
        self.load_cached()
    }

    fn get(&self, url: &str) -> Result<ureq::Response> {
        self.agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => Error::Download(format!("HTTP {} from {}", code, url)),
            ureq::Error::Transport(t) => Error::Download(format!("Transport error: {}", t)),
        })
    }

    fn load_cached(&mut self) -> Result<()> {
        let prefix = self.cache_prefix();
        match self.db {
            Some(ref db) => db.reload(&prefix)?,
            None => {
                self.db = Some(CachedCountryDb::open_with_config(
                    &prefix,
                    self.reader_config.clone(),
                )?);
            }
        }
        Ok(())
    }

    /// Look up an address. Returns `None` before initialization.
    pub fn lookup(&self, addr: IpAddr) -> Option<CountryCode> {
        self.db.as_ref().and_then(|db| db.lookup(addr))
    }

    /// The loaded database, if initialized.
    pub fn db(&self) -> Option<&CachedCountryDb> {
        self.db.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.db.is_some()
    }

    /// Installed version, if known.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// Decompress a downloaded table if needed and check it holds whole records.
fn decode_artifact(family: AddressFamily, raw: Vec<u8>) -> Result<Vec<u8>> {
    let data = if is_gzip(&raw) {
        let mut data = Vec::new();
        GzDecoder::new(&raw[..])
            .take(MAX_ARTIFACT_SIZE)
            .read_to_end(&mut data)
            .map_err(|e| Error::Download(format!("Gzip decompression failed: {}", e)))?;
        data
    } else {
        raw
    };
    record_count(family, data.len())?;
    Ok(data)
}
