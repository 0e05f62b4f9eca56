//! Two-letter country codes as stored in database records.

use std::fmt;

use crate::{Error, Result};

/// Width of an encoded country code.
pub const COUNTRY_CODE_LEN: usize = 2;

/// An ISO 3166-1 alpha-2 country code, stored as two raw ASCII bytes.
///
/// Codes built with [`CountryCode::parse`] are always uppercase letters.
/// Codes read back from a database keep whatever bytes the producer wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CountryCode([u8; COUNTRY_CODE_LEN]);

impl CountryCode {
    /// Parse a country code, folding lowercase to uppercase.
    ///
    /// Only two ASCII letters are accepted.
    pub fn parse(s: &str) -> Result<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != COUNTRY_CODE_LEN || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(Error::InvalidCountryCode(s.to_string()));
        }
        Ok(Self([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
        ]))
    }

    /// Accept any two ASCII bytes verbatim.
    pub fn from_ascii(s: &str) -> Result<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != COUNTRY_CODE_LEN || !bytes.is_ascii() {
            return Err(Error::InvalidCountryCode(s.to_string()));
        }
        Ok(Self([bytes[0], bytes[1]]))
    }

    /// Wrap bytes read from a database record.
    pub const fn from_bytes(bytes: [u8; COUNTRY_CODE_LEN]) -> Self {
        Self(bytes)
    }

    /// The raw record bytes.
    pub fn as_bytes(&self) -> &[u8; COUNTRY_CODE_LEN] {
        &self.0
    }

    /// The code as text, if the stored bytes are ASCII.
    pub fn as_str(&self) -> Option<&str> {
        if self.0.is_ascii() {
            std::str::from_utf8(&self.0).ok()
        } else {
            None
        }
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => f.write_str(s),
            None => write!(f, "\\x{:02x}\\x{:02x}", self.0[0], self.0[1]),
        }
    }
}

impl std::str::FromStr for CountryCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
