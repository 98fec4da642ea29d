use std::fs;
use std::io;
use std::path::Path;

use tracing::{info, warn};
use zip::ZipArchive;

use crate::db::Db;
use crate::domain::CountMismatchPolicy;
use crate::error::LoaderError;
use crate::store::Store;

pub const EXTRACT_STAGE: &str = "descompactar";

/// Answers yes/no questions from the operator. The stdin implementation
/// lives in the binary; tests inject canned answers.
pub trait Confirmer {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Refuses everything; the default for non-interactive runs.
pub struct DenyAll;

impl Confirmer for DenyAll {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}

/// Expands every archive into the data directory as one ledger stage:
/// either all archives extract and the stage is marked, or the whole stage
/// reruns on the next invocation. An unexpected archive count usually means
/// an incomplete download set, so it is surfaced before any extraction.
pub fn extract_all(
    store: &Store,
    db: &Db,
    expected_count: usize,
    policy: CountMismatchPolicy,
    confirmer: &dyn Confirmer,
) -> Result<(), LoaderError> {
    if db.is_complete(EXTRACT_STAGE)? {
        info!("stage already complete: {EXTRACT_STAGE}, skipping");
        return Ok(());
    }

    let archives = store.list_archives()?;
    if archives.len() != expected_count {
        match policy {
            CountMismatchPolicy::Abort => {
                return Err(LoaderError::ArchiveCount {
                    expected: expected_count,
                    found: archives.len(),
                });
            }
            CountMismatchPolicy::Confirm => {
                let prompt = format!(
                    "{} should contain {expected_count} zip archives, found {}. Proceed?",
                    store.zip_dir(),
                    archives.len()
                );
                if !confirmer.confirm(&prompt) {
                    return Err(LoaderError::Aborted);
                }
            }
            CountMismatchPolicy::Proceed => {
                warn!(
                    "expected {expected_count} archives, found {}; proceeding by policy",
                    archives.len()
                );
            }
        }
    }

    for archive in &archives {
        info!("extracting {archive}");
        extract_zip(archive.as_std_path(), store.data_dir().as_std_path())?;
    }

    db.mark_complete(EXTRACT_STAGE)?;
    Ok(())
}

fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<(), LoaderError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        LoaderError::Filesystem(format!("open zip {}: {err}", zip_path.display()))
    })?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| LoaderError::Filesystem(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(LoaderError::Filesystem(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
    }
    Ok(())
}
