use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info, warn};

use crate::domain::{FetchFailure, FetchOutcome, RemoteFile, RemoteSize};
use crate::error::LoaderError;
use crate::store::Store;
use crate::verify::{is_zip_valid, local_size};

const CHUNK_SIZE: usize = 8192;
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Observer for transfer progress; the CLI hooks a logging reporter in here.
pub trait TransferObserver {
    fn on_chunk(&self, transferred: u64, total: RemoteSize);
}

pub struct NopObserver;

impl TransferObserver for NopObserver {
    fn on_chunk(&self, _transferred: u64, _total: RemoteSize) {}
}

/// The remote side of a fetch, kept behind a trait so tests can run the full
/// retry/validate loop without a network.
pub trait RemoteSource {
    /// Declared length of the resource, without transferring the body.
    /// `Err` means the remote was unreachable; `Ok(Unknown)` means it
    /// answered but declared no length.
    fn probe_size(&self, url: &str) -> Result<RemoteSize, LoaderError>;

    /// Streams the body to `dest`, reporting progress per chunk. Returns the
    /// number of bytes written.
    fn download(
        &self,
        url: &str,
        dest: &Path,
        observer: &dyn TransferObserver,
    ) -> Result<u64, LoaderError>;
}

#[derive(Clone)]
pub struct HttpRemoteSource {
    client: Client,
}

impl HttpRemoteSource {
    pub fn new() -> Result<Self, LoaderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("cnpj-loader/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| LoaderError::Http(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|err| LoaderError::Http(err.to_string()))?;

        Ok(Self { client })
    }
}

impl RemoteSource for HttpRemoteSource {
    fn probe_size(&self, url: &str) -> Result<RemoteSize, LoaderError> {
        let response = self
            .client
            .head(url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .map_err(|err| LoaderError::Probe {
                url: url.to_string(),
                reason: err.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(LoaderError::Probe {
                url: url.to_string(),
                reason: format!("status {}", response.status().as_u16()),
            });
        }
        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .map(RemoteSize::Known)
            .unwrap_or(RemoteSize::Unknown);
        Ok(size)
    }

    fn download(
        &self,
        url: &str,
        dest: &Path,
        observer: &dyn TransferObserver,
    ) -> Result<u64, LoaderError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| LoaderError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(LoaderError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let total = response
            .content_length()
            .map(RemoteSize::Known)
            .unwrap_or(RemoteSize::Unknown);

        let mut file =
            fs::File::create(dest).map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        let mut buf = [0u8; CHUNK_SIZE];
        let mut transferred = 0u64;
        loop {
            let read = response
                .read(&mut buf)
                .map_err(|err| LoaderError::Http(err.to_string()))?;
            if read == 0 {
                break;
            }
            file.write_all(&buf[..read])
                .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
            transferred += read as u64;
            observer.on_chunk(transferred, total);
        }
        file.flush()
            .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        Ok(transferred)
    }
}

/// Download-with-validation loop. Per-file errors never escape as `Err`;
/// every path collapses into a [`FetchOutcome`] so one bad archive cannot
/// abort the run.
pub struct Fetcher<S> {
    source: S,
    max_attempts: u32,
}

impl<S: RemoteSource> Fetcher<S> {
    pub fn new(source: S, max_attempts: u32) -> Self {
        Self {
            source,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn fetch(
        &self,
        remote: &RemoteFile,
        store: &Store,
        observer: &dyn TransferObserver,
    ) -> FetchOutcome {
        let expected = match self.source.probe_size(&remote.url) {
            Ok(RemoteSize::Known(len)) => len,
            Ok(RemoteSize::Unknown) => {
                warn!("{}: remote declared no content length", remote.filename);
                return FetchOutcome::Failed(FetchFailure::SizeUnknown);
            }
            Err(err) => {
                warn!("{}: size probe failed: {err}", remote.filename);
                return FetchOutcome::Failed(FetchFailure::Unreachable(err.to_string()));
            }
        };

        let dest = store.archive_path(&remote.filename);
        if dest.as_std_path().exists() {
            if local_size(dest.as_std_path()) == Some(expected)
                && is_zip_valid(dest.as_std_path())
            {
                info!("{} already valid, skipping", remote.filename);
                return FetchOutcome::Skipped;
            }
            warn!("{} incomplete or corrupt, restarting download", remote.filename);
            let _ = fs::remove_file(dest.as_std_path());
        }

        let part = store.part_path(&remote.filename);
        let _ = fs::remove_file(part.as_std_path());

        for attempt in 1..=self.max_attempts {
            info!(
                "attempt {attempt}/{} for {}",
                self.max_attempts, remote.filename
            );
            match self.source.download(&remote.url, part.as_std_path(), observer) {
                Ok(transferred) => {
                    debug!("{}: transferred {transferred} bytes", remote.filename);
                    if local_size(part.as_std_path()) == Some(expected)
                        && is_zip_valid(part.as_std_path())
                        && fs::rename(part.as_std_path(), dest.as_std_path()).is_ok()
                    {
                        info!("{} validated", remote.filename);
                        return FetchOutcome::Downloaded { attempts: attempt };
                    }
                    warn!(
                        "{}: size mismatch or corrupt archive after attempt {attempt}",
                        remote.filename
                    );
                    let _ = fs::remove_file(part.as_std_path());
                }
                Err(err) => {
                    warn!("{}: attempt {attempt} failed: {err}", remote.filename);
                    let _ = fs::remove_file(part.as_std_path());
                }
            }
        }

        warn!(
            "{}: giving up after {} attempts",
            remote.filename, self.max_attempts
        );
        FetchOutcome::Failed(FetchFailure::Exhausted {
            attempts: self.max_attempts,
        })
    }
}
