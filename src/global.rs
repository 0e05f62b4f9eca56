//! Process-wide country database.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use crate::country::CountryCode;
use crate::error::Result;
use crate::reader::CountryDb;

/// Global country database
static GLOBAL_DB: Lazy<RwLock<Option<Arc<CountryDb>>>> = Lazy::new(|| RwLock::new(None));

/// Load (or replace) the global database from `<prefix>.v4` / `<prefix>.v6`.
pub fn init_country_db(prefix: &Path) -> Result<()> {
    let db = CountryDb::open(prefix)?;
    log::debug!(
        "Initialized global country database from {:?} ({} records)",
        prefix,
        db.record_count()
    );
    set_global(db);
    Ok(())
}

/// Load (or replace) the global database from in-memory file contents.
pub fn init_country_db_from_bytes(v4: Vec<u8>, v6: Vec<u8>) -> Result<()> {
    set_global(CountryDb::from_bytes(v4, v6)?);
    Ok(())
}

fn set_global(db: CountryDb) {
    let mut guard = GLOBAL_DB.write();
    *guard = Some(Arc::new(db));
}

/// Check if the global database is loaded.
pub fn is_initialized() -> bool {
    GLOBAL_DB.read().is_some()
}

/// Look up the country of an address in the global database.
///
/// Returns `None` for uncovered addresses and before initialization.
///
/// # Examples
/// ```ignore
/// use geobisect::{init_country_db, lookup_country};
///
/// init_country_db(Path::new("dbip"))?;
/// if let Some(country) = lookup_country("1.1.1.1".parse()?) {
///     println!("{}", country);
/// }
/// ```
pub fn lookup_country(addr: IpAddr) -> Option<CountryCode> {
    let db = GLOBAL_DB.read().as_ref().map(Arc::clone)?;
    db.lookup(addr)
}
