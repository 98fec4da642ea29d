use std::fs;
use std::io;
use std::path::Path;

use zip::ZipArchive;

/// Structural validation of a downloaded archive: the central directory must
/// be readable and every entry must decompress cleanly (the CRC check runs
/// as a side effect of the full read). Any failure is just "invalid" -- a
/// truncated or corrupt file carries no useful error detail for the caller.
pub fn is_zip_valid(path: &Path) -> bool {
    let Ok(file) = fs::File::open(path) else {
        return false;
    };
    let Ok(mut archive) = ZipArchive::new(file) else {
        return false;
    };
    for i in 0..archive.len() {
        let Ok(mut entry) = archive.by_index(i) else {
            return false;
        };
        if entry.is_dir() {
            continue;
        }
        if io::copy(&mut entry, &mut io::sink()).is_err() {
            return false;
        }
    }
    true
}

pub fn local_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|meta| meta.len())
}
