//! Opening the source feed.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::bufread::GzDecoder;

use crate::{Error, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Open a source feed for reading, decompressing gzip content.
///
/// Compression is detected from the content, not the file name. A `.gz`
/// file that does not start with the gzip magic is rejected up front.
pub fn open_source(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let head = reader.fill_buf()?;
    if is_gzip(head) {
        log::debug!("Reading gzip source {:?}", path);
        return Ok(Box::new(GzDecoder::new(reader)));
    }

    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        return Err(Error::InvalidSource(format!(
            "{} is not a gzip file",
            path.display()
        )));
    }

    log::debug!("Reading plain text source {:?}", path);
    Ok(Box::new(reader))
}

/// Check if data starts with the gzip magic bytes.
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[..2] == GZIP_MAGIC
}
