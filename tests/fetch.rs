use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use cnpj_loader::domain::{FetchFailure, FetchOutcome, RemoteFile, RemoteSize};
use cnpj_loader::error::LoaderError;
use cnpj_loader::fetch::{Fetcher, NopObserver, RemoteSource, TransferObserver};
use cnpj_loader::store::Store;
use cnpj_loader::verify::is_zip_valid;

fn zip_bytes(entry: &str, content: &[u8]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file(entry, zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(content).unwrap();
    writer.finish().unwrap().into_inner()
}

fn test_store(dir: &Path) -> Store {
    let store = Store::new(
        Utf8PathBuf::from_path_buf(dir.join("zip")).unwrap(),
        Utf8PathBuf::from_path_buf(dir.join("data")).unwrap(),
    );
    store.ensure_dirs().unwrap();
    store
}

fn remote() -> RemoteFile {
    RemoteFile::from_url("https://example.org/cnpj/20240101/K3241.K03200Y0.D40412.EMPRECSV.zip")
        .unwrap()
}

/// Serves a fixed probe answer and a scripted sequence of download bodies;
/// the last body repeats once the script runs out.
struct MockSource {
    size: Result<RemoteSize, String>,
    bodies: Mutex<Vec<Vec<u8>>>,
    downloads: Mutex<u32>,
}

impl MockSource {
    fn new(size: Result<RemoteSize, String>, bodies: Vec<Vec<u8>>) -> Self {
        Self {
            size,
            bodies: Mutex::new(bodies),
            downloads: Mutex::new(0),
        }
    }

    fn download_count(&self) -> u32 {
        *self.downloads.lock().unwrap()
    }
}

impl RemoteSource for MockSource {
    fn probe_size(&self, url: &str) -> Result<RemoteSize, LoaderError> {
        self.size.clone().map_err(|reason| LoaderError::Probe {
            url: url.to_string(),
            reason,
        })
    }

    fn download(
        &self,
        _url: &str,
        dest: &Path,
        observer: &dyn TransferObserver,
    ) -> Result<u64, LoaderError> {
        *self.downloads.lock().unwrap() += 1;
        let mut bodies = self.bodies.lock().unwrap();
        assert!(!bodies.is_empty(), "unexpected download call");
        let body = if bodies.len() > 1 {
            bodies.remove(0)
        } else {
            bodies[0].clone()
        };
        fs::write(dest, &body).map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        observer.on_chunk(body.len() as u64, RemoteSize::Known(body.len() as u64));
        Ok(body.len() as u64)
    }
}

#[test]
fn valid_local_archive_skips_transfer() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(temp.path());
    let remote = remote();

    let body = zip_bytes("data.EMPRECSV", b"11111111;empresa\n");
    fs::write(store.archive_path(&remote.filename).as_std_path(), &body).unwrap();

    let source = MockSource::new(Ok(RemoteSize::Known(body.len() as u64)), Vec::new());
    let fetcher = Fetcher::new(source, 3);
    let outcome = fetcher.fetch(&remote, &store, &NopObserver);

    assert_eq!(outcome, FetchOutcome::Skipped);
    assert_eq!(fetcher.source().download_count(), 0);
}

#[test]
fn corrupt_local_archive_is_redownloaded() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(temp.path());
    let remote = remote();

    let body = zip_bytes("data.EMPRECSV", b"11111111;empresa\n");
    // Right size, wrong bytes: passes the size check, fails validation.
    let garbage = vec![0u8; body.len()];
    let dest = store.archive_path(&remote.filename);
    fs::write(dest.as_std_path(), &garbage).unwrap();

    let source = MockSource::new(Ok(RemoteSize::Known(body.len() as u64)), vec![body]);
    let fetcher = Fetcher::new(source, 3);
    let outcome = fetcher.fetch(&remote, &store, &NopObserver);

    assert_eq!(outcome, FetchOutcome::Downloaded { attempts: 1 });
    assert_eq!(fetcher.source().download_count(), 1);
    assert!(is_zip_valid(dest.as_std_path()));
}

#[test]
fn size_mismatch_retries_until_valid() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(temp.path());
    let remote = remote();

    let body = zip_bytes("data.EMPRECSV", b"11111111;empresa\n");
    let short = body[..body.len() / 2].to_vec();
    let source = MockSource::new(
        Ok(RemoteSize::Known(body.len() as u64)),
        vec![short, body],
    );
    let fetcher = Fetcher::new(source, 3);
    let outcome = fetcher.fetch(&remote, &store, &NopObserver);

    assert_eq!(outcome, FetchOutcome::Downloaded { attempts: 2 });
    assert_eq!(fetcher.source().download_count(), 2);
}

#[test]
fn exhausted_retries_leave_no_artifact() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(temp.path());
    let remote = remote();

    let body = zip_bytes("data.EMPRECSV", b"11111111;empresa\n");
    // Every attempt yields the right size but a corrupt archive.
    let garbage = vec![0u8; body.len()];
    let source = MockSource::new(Ok(RemoteSize::Known(body.len() as u64)), vec![garbage]);
    let fetcher = Fetcher::new(source, 3);
    let outcome = fetcher.fetch(&remote, &store, &NopObserver);

    assert_eq!(
        outcome,
        FetchOutcome::Failed(FetchFailure::Exhausted { attempts: 3 })
    );
    assert_eq!(fetcher.source().download_count(), 3);
    assert!(!store.archive_path(&remote.filename).as_std_path().exists());
    assert!(!store.part_path(&remote.filename).as_std_path().exists());
}

#[test]
fn unreachable_probe_fails_without_attempts() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(temp.path());

    let source = MockSource::new(Err("connection refused".to_string()), Vec::new());
    let fetcher = Fetcher::new(source, 3);
    let outcome = fetcher.fetch(&remote(), &store, &NopObserver);

    assert_matches!(outcome, FetchOutcome::Failed(FetchFailure::Unreachable(_)));
    assert_eq!(fetcher.source().download_count(), 0);
}

#[test]
fn unknown_remote_size_fails_without_attempts() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(temp.path());

    let source = MockSource::new(Ok(RemoteSize::Unknown), Vec::new());
    let fetcher = Fetcher::new(source, 3);
    let outcome = fetcher.fetch(&remote(), &store, &NopObserver);

    assert_eq!(outcome, FetchOutcome::Failed(FetchFailure::SizeUnknown));
    assert_eq!(fetcher.source().download_count(), 0);
}

#[test]
fn stale_file_is_replaced_not_appended() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(temp.path());
    let remote = remote();

    let body = zip_bytes("data.EMPRECSV", b"11111111;empresa\n");
    let dest = store.archive_path(&remote.filename);
    fs::write(dest.as_std_path(), b"tiny stale leftover").unwrap();

    let source = MockSource::new(Ok(RemoteSize::Known(body.len() as u64)), vec![body.clone()]);
    let fetcher = Fetcher::new(source, 3);
    let outcome = fetcher.fetch(&remote, &store, &NopObserver);

    assert_eq!(outcome, FetchOutcome::Downloaded { attempts: 1 });
    assert_eq!(fs::read(dest.as_std_path()).unwrap(), body);
}
