use serde::Serialize;
use tracing::info;

use crate::db::Db;
use crate::discovery::ReleaseDiscovery;
use crate::domain::{CountMismatchPolicy, FACT_TABLES, FetchOutcome, LOOKUP_TABLES};
use crate::error::LoaderError;
use crate::extract::{self, Confirmer};
use crate::fetch::{Fetcher, RemoteSource, TransferObserver};
use crate::loader::{self, StageStatus};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub base_url: String,
    pub expected_archives: usize,
    pub on_count_mismatch: CountMismatchPolicy,
    pub delete_after_use: bool,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub discovered: usize,
    pub skipped: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub stages_run: usize,
    pub stages_skipped: usize,
}

/// Sequences the whole run: discovery, per-file fetch, extraction, lookup
/// loads, fact loads. Per-file fetch failures are counted and the run
/// continues on whatever is locally valid; only ledger/database errors and
/// the count-mismatch precondition abort.
pub struct Pipeline<D, S> {
    store: Store,
    db: Db,
    discovery: D,
    fetcher: Fetcher<S>,
    options: PipelineOptions,
}

impl<D: ReleaseDiscovery, S: RemoteSource> Pipeline<D, S> {
    pub fn new(
        store: Store,
        db: Db,
        discovery: D,
        fetcher: Fetcher<S>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            db,
            discovery,
            fetcher,
            options,
        }
    }

    pub fn run(
        &self,
        observer: &dyn TransferObserver,
        confirmer: &dyn Confirmer,
    ) -> Result<RunSummary, LoaderError> {
        self.store.ensure_dirs()?;
        let mut summary = RunSummary::default();

        let files = self.discovery.latest_release(&self.options.base_url)?;
        summary.discovered = files.len();
        info!("{} archives listed", files.len());

        for file in &files {
            match self.fetcher.fetch(file, &self.store, observer) {
                FetchOutcome::Skipped => summary.skipped += 1,
                FetchOutcome::Downloaded { .. } => summary.downloaded += 1,
                FetchOutcome::Failed(_) => summary.failed += 1,
            }
        }
        info!(
            "fetch phase: {} ok, {} failed",
            summary.skipped + summary.downloaded,
            summary.failed
        );

        extract::extract_all(
            &self.store,
            &self.db,
            self.options.expected_archives,
            self.options.on_count_mismatch,
            confirmer,
        )?;

        for &(name, extension) in LOOKUP_TABLES {
            let status = loader::load_lookup(
                &self.store,
                &self.db,
                name,
                extension,
                self.options.delete_after_use,
            )?;
            summary.record(status);
        }

        for schema in FACT_TABLES {
            let status =
                loader::load_fact(&self.store, &self.db, schema, self.options.delete_after_use)?;
            summary.record(status);
        }

        info!(
            "run finished: {} stages run, {} skipped",
            summary.stages_run, summary.stages_skipped
        );
        Ok(summary)
    }

    pub fn db(&self) -> &Db {
        &self.db
    }
}

impl RunSummary {
    fn record(&mut self, status: StageStatus) {
        match status {
            StageStatus::Ran => self.stages_run += 1,
            StageStatus::Skipped => self.stages_skipped += 1,
        }
    }
}
