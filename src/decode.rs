use std::fs;

use camino::Utf8Path;
use encoding_rs::WINDOWS_1252;

use crate::error::LoaderError;

/// Streams the decoded rows of one source file: semicolon-delimited, no
/// header, legacy single-byte encoding. Every field stays TEXT and empty
/// fields stay empty strings -- the dataset's own typing is unreliable, so
/// no coercion happens here. Rows are padded or truncated to `width` so the
/// insert arity always matches the declared schema.
pub fn read_rows(
    path: &Utf8Path,
    width: usize,
) -> Result<impl Iterator<Item = Result<Vec<String>, LoaderError>>, LoaderError> {
    let file = fs::File::open(path.as_std_path())
        .map_err(|err| LoaderError::Filesystem(format!("open {path}: {err}")))?;
    let reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let path = path.to_owned();
    Ok(reader.into_byte_records().map(move |record| {
        let record = record.map_err(|err| LoaderError::Decode {
            path: path.to_string(),
            reason: err.to_string(),
        })?;
        let mut row: Vec<String> = record.iter().map(decode_field).collect();
        row.resize(width, String::new());
        Ok(row)
    }))
}

/// The files are published in Latin-1; Windows-1252 is its practical
/// superset and decodes every byte, so a stray control byte cannot fail a
/// multi-gigabyte shard.
fn decode_field(raw: &[u8]) -> String {
    let (text, _, _) = WINDOWS_1252.decode(raw);
    text.into_owned()
}
