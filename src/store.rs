use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::LoaderError;

pub const DEFAULT_ZIP_DIR: &str = "dados-publicos-zip";
pub const DEFAULT_DATA_DIR: &str = "dados-publicos";
const DB_FILENAME: &str = "cnpj.db";

/// On-disk layout: one directory for downloaded archives, one for decoded
/// working files plus the SQLite base.
#[derive(Debug, Clone)]
pub struct Store {
    zip_dir: Utf8PathBuf,
    data_dir: Utf8PathBuf,
}

impl Store {
    pub fn new(zip_dir: Utf8PathBuf, data_dir: Utf8PathBuf) -> Self {
        Self { zip_dir, data_dir }
    }

    pub fn default_layout() -> Self {
        Self::new(
            Utf8PathBuf::from(DEFAULT_ZIP_DIR),
            Utf8PathBuf::from(DEFAULT_DATA_DIR),
        )
    }

    pub fn zip_dir(&self) -> &Utf8Path {
        &self.zip_dir
    }

    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    pub fn db_path(&self) -> Utf8PathBuf {
        self.data_dir.join(DB_FILENAME)
    }

    pub fn archive_path(&self, filename: &str) -> Utf8PathBuf {
        self.zip_dir.join(filename)
    }

    /// Sidecar for an in-flight download; renamed into place only after the
    /// archive validates.
    pub fn part_path(&self, filename: &str) -> Utf8PathBuf {
        self.zip_dir.join(format!("{filename}.part"))
    }

    /// Creates both directories without touching existing files.
    pub fn ensure_dirs(&self) -> Result<(), LoaderError> {
        fs::create_dir_all(self.zip_dir.as_std_path())
            .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        fs::create_dir_all(self.data_dir.as_std_path())
            .map_err(|err| LoaderError::Filesystem(err.to_string()))
    }

    /// All `*.zip` archives in the download directory, sorted by name.
    pub fn list_archives(&self) -> Result<Vec<Utf8PathBuf>, LoaderError> {
        self.list_matching(&self.zip_dir, ".zip")
    }

    /// Decoded files in the data directory whose name matches `pattern`,
    /// sorted by name.
    pub fn find_decoded(&self, pattern: &str) -> Result<Vec<Utf8PathBuf>, LoaderError> {
        self.list_matching(&self.data_dir, pattern)
    }

    fn list_matching(
        &self,
        dir: &Utf8Path,
        pattern: &str,
    ) -> Result<Vec<Utf8PathBuf>, LoaderError> {
        let entries =
            fs::read_dir(dir.as_std_path()).map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        let mut matched = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| LoaderError::Filesystem(err.to_string()))?;
            let path = Utf8PathBuf::from_path_buf(entry.path())
                .map_err(|path| LoaderError::Filesystem(format!("non-utf8 path {}", path.display())))?;
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name() else {
                continue;
            };
            if matches_pattern(name, pattern) {
                matched.push(path);
            }
        }
        matched.sort();
        Ok(matched)
    }
}

/// Filename match against a declared extension pattern. A trailing `.*`
/// means "contains the prefix" (the `.SIMPLES.CSV.*` shards carry a date
/// suffix); anything else is a plain suffix match. Case-sensitive, as the
/// dataset's filenames are.
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    match pattern.strip_suffix(".*") {
        Some(prefix) => name.contains(&format!("{prefix}.")),
        None => name.ends_with(pattern),
    }
}
