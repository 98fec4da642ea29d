use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::CountMismatchPolicy;
use crate::error::LoaderError;
use crate::store::{DEFAULT_DATA_DIR, DEFAULT_ZIP_DIR};

pub const DEFAULT_BASE_URL: &str =
    "https://arquivos.receitafederal.gov.br/cnpj/dados_abertos_cnpj/";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Archive count of a current full release.
pub const DEFAULT_EXPECTED_ARCHIVES: usize = 37;

/// Optional on-disk config, `cnpj-loader.json`. Every field has a default
/// so the tool runs with no arguments and no file at all.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub zip_dir: Option<String>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub expected_archives: Option<usize>,
    #[serde(default)]
    pub on_count_mismatch: Option<CountMismatchPolicy>,
    #[serde(default)]
    pub delete_after_use: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub zip_dir: Utf8PathBuf,
    pub data_dir: Utf8PathBuf,
    pub max_attempts: u32,
    pub expected_archives: usize,
    pub on_count_mismatch: CountMismatchPolicy,
    pub delete_after_use: bool,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Explicit path: the file must exist. No path: `cnpj-loader.json` is
    /// used when present, otherwise defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<Settings, LoaderError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("cnpj-loader.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Self::resolve_file(ConfigFile::default()));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| LoaderError::ConfigRead(config_path.clone()))?;
        let config: ConfigFile = serde_json::from_str(&content)
            .map_err(|err| LoaderError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_file(config))
    }

    pub fn resolve_file(config: ConfigFile) -> Settings {
        Settings {
            base_url: config
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            zip_dir: Utf8PathBuf::from(
                config.zip_dir.unwrap_or_else(|| DEFAULT_ZIP_DIR.to_string()),
            ),
            data_dir: Utf8PathBuf::from(
                config
                    .data_dir
                    .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            ),
            max_attempts: config.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            expected_archives: config
                .expected_archives
                .unwrap_or(DEFAULT_EXPECTED_ARCHIVES),
            on_count_mismatch: config
                .on_count_mismatch
                .unwrap_or(CountMismatchPolicy::Abort),
            delete_after_use: config.delete_after_use.unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let settings = ConfigLoader::resolve_file(ConfigFile::default());
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.expected_archives, 37);
        assert_eq!(settings.on_count_mismatch, CountMismatchPolicy::Abort);
        assert!(settings.delete_after_use);
    }

    #[test]
    fn file_overrides_defaults() {
        let config: ConfigFile = serde_json::from_str(
            r#"{"max_attempts": 5, "on_count_mismatch": "proceed", "delete_after_use": false}"#,
        )
        .unwrap();
        let settings = ConfigLoader::resolve_file(config);
        assert_eq!(settings.max_attempts, 5);
        assert_eq!(settings.on_count_mismatch, CountMismatchPolicy::Proceed);
        assert!(!settings.delete_after_use);
        assert_eq!(settings.zip_dir, Utf8PathBuf::from(DEFAULT_ZIP_DIR));
    }
}
