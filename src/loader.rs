use std::fs;

use camino::Utf8Path;
use tracing::{info, warn};

use crate::db::Db;
use crate::decode;
use crate::domain::TableSchema;
use crate::error::LoaderError;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Ran,
    Skipped,
}

/// Loads one code/description lookup table, stage `codigo_<name>`. The
/// destination table is replaced wholesale and indexed on the code column,
/// so rerunning an interrupted stage can never duplicate rows.
pub fn load_lookup(
    store: &Store,
    db: &Db,
    name: &str,
    extension: &str,
    delete_after_use: bool,
) -> Result<StageStatus, LoaderError> {
    let stage = format!("codigo_{name}");
    if db.is_complete(&stage)? {
        info!("stage already complete: {stage}, skipping");
        return Ok(StageStatus::Skipped);
    }

    let files = store.find_decoded(extension)?;
    let file = files
        .first()
        .ok_or_else(|| LoaderError::MissingSource(extension.to_string()))?;

    info!("loading lookup table {name} from {file}");
    db.drop_table(name)?;
    db.create_text_table(name, &["codigo", "descricao"])?;
    let inserted = db.append_rows(name, 2, decode::read_rows(file, 2)?)?;
    db.create_index(name, "codigo")?;
    info!("{name}: {inserted} codes");

    if delete_after_use {
        remove_source(file)?;
    }
    db.mark_complete(&stage)?;
    Ok(StageStatus::Ran)
}

/// Loads one fact table from all of its decoded shards, stage
/// `carga_<name>`. The table is dropped and recreated before any shard is
/// read: partial rows from a crashed run are discarded, never appended to.
/// The stage is marked only after the last shard commits.
pub fn load_fact(
    store: &Store,
    db: &Db,
    schema: &TableSchema,
    delete_after_use: bool,
) -> Result<StageStatus, LoaderError> {
    let stage = format!("carga_{}", schema.name);
    if db.is_complete(&stage)? {
        info!("stage already complete: {stage}, skipping");
        return Ok(StageStatus::Skipped);
    }

    db.drop_table(schema.name)?;
    db.create_text_table(schema.name, schema.columns)?;

    let shards = store.find_decoded(schema.pattern)?;
    if shards.is_empty() {
        // Zero matching shards is treated as an empty input set, not an
        // error; the warning is the only trace of a missing source file.
        warn!(
            "no decoded file matches {} for table {}, leaving it empty",
            schema.pattern, schema.name
        );
    }

    let width = schema.columns.len();
    let mut total = 0u64;
    for shard in &shards {
        info!("importing {shard} into {}", schema.name);
        total += db.append_rows(schema.name, width, decode::read_rows(shard, width)?)?;
        if delete_after_use {
            remove_source(shard)?;
        }
    }
    info!("{}: {total} rows from {} shards", schema.name, shards.len());

    db.mark_complete(&stage)?;
    Ok(StageStatus::Ran)
}

fn remove_source(path: &Utf8Path) -> Result<(), LoaderError> {
    fs::remove_file(path.as_std_path())
        .map_err(|err| LoaderError::Filesystem(format!("remove {path}: {err}")))
}
