//! Publishing encoded databases into a versioned object-store layout.
//!
//! ```text
//! <store>/geoip/latest                      full version of the newest build
//! <store>/geoip/<yyyy>/<epochMs>/dbip.v4
//! <store>/geoip/<yyyy>/<epochMs>/dbip.v6
//! <store>/geoip/<yyyy>/<epochMs>/manifest.json
//! ```
//!
//! Published versions are immutable. A version directory is staged next to
//! its final location and renamed into place once complete.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::family::AddressFamily;
use crate::format::{output_path, record_count};
use crate::version::Version;
use crate::{Error, Result};

/// Top-level directory of the layout.
pub const GEOIP_DIR: &str = "geoip";
/// Pointer file holding the newest published version.
pub const LATEST_FILE: &str = "latest";
pub const MANIFEST_FILE: &str = "manifest.json";

/// File name of a family's artifact inside a version directory.
pub fn artifact_name(family: AddressFamily) -> &'static str {
    match family {
        AddressFamily::V4 => "dbip.v4",
        AddressFamily::V6 => "dbip.v6",
    }
}

/// Object key of an artifact, e.g. `geoip/2022/1655832359111/dbip.v4`.
pub fn object_key(version: &Version, family: AddressFamily) -> String {
    format!("{}/{}/{}", GEOIP_DIR, version, artifact_name(family))
}

/// Directory holding all artifacts of `version`.
pub fn version_dir(store_root: &Path, version: &Version) -> PathBuf {
    store_root
        .join(GEOIP_DIR)
        .join(version.year().to_string())
        .join(version.bare())
}

/// Description of a published version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: Version,
    pub files: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    /// `v4` or `v6`
    pub family: String,
    pub size: u64,
    pub records: u64,
    /// Lowercase hex SHA-256 of the file contents
    pub sha256: String,
}

impl Manifest {
    /// Read the manifest of a published version.
    pub fn load(store_root: &Path, version: &Version) -> Result<Self> {
        let content = fs::read_to_string(version_dir(store_root, version).join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn entry(&self, family: AddressFamily) -> Option<&ManifestEntry> {
        self.files.iter().find(|f| f.family == family.as_str())
    }
}

/// Publish `<out_prefix>.v4` / `<out_prefix>.v6` as `version`.
///
/// Both files must exist and hold whole records. On success the `latest`
/// pointer is moved to `version` unless it already names a newer one.
pub fn publish(out_prefix: &Path, store_root: &Path, version: &Version) -> Result<Manifest> {
    let dest = version_dir(store_root, version);
    if dest.exists() {
        return Err(Error::VersionExists(version.to_string()));
    }

    let mut artifacts = Vec::with_capacity(AddressFamily::ALL.len());
    let mut files = Vec::with_capacity(AddressFamily::ALL.len());
    for family in AddressFamily::ALL {
        let data = fs::read(output_path(out_prefix, family))?;
        let records = record_count(family, data.len())?;
        files.push(ManifestEntry {
            name: artifact_name(family).to_string(),
            family: family.as_str().to_string(),
            size: data.len() as u64,
            records: records as u64,
            sha256: format!("{:x}", Sha256::digest(&data)),
        });
        artifacts.push((family, data));
    }
    let manifest = Manifest {
        version: *version,
        files,
    };

    let parent = match dest.parent() {
        Some(p) => p,
        None => return Err(Error::InvalidVersion(version.to_string())),
    };
    fs::create_dir_all(parent)?;

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(parent)?;
    for (family, data) in &artifacts {
        fs::write(staging.path().join(artifact_name(*family)), data)?;
    }
    fs::write(
        staging.path().join(MANIFEST_FILE),
        serde_json::to_string_pretty(&manifest)?,
    )?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(staging.path(), fs::Permissions::from_mode(0o755))?;
    }

    if dest.exists() {
        return Err(Error::VersionExists(version.to_string()));
    }
    fs::rename(staging.path(), &dest)?;
    log::info!("Published {} to {:?}", version, dest);

    match latest(store_root) {
        Ok(Some(current)) if current > *version => {
            log::info!("Keeping latest at newer version {}", current);
        }
        _ => set_latest(store_root, version)?,
    }

    Ok(manifest)
}

/// The version named by the `latest` pointer, if any.
pub fn latest(store_root: &Path) -> Result<Option<Version>> {
    let path = store_root.join(GEOIP_DIR).join(LATEST_FILE);
    match fs::read_to_string(&path) {
        Ok(content) => Ok(Some(content.parse::<Version>()?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn set_latest(store_root: &Path, version: &Version) -> Result<()> {
    let dir = store_root.join(GEOIP_DIR);
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    writeln!(tmp, "{}", version)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(LATEST_FILE))
        .map_err(|e| Error::Io(e.error))?;
    Ok(())
}
