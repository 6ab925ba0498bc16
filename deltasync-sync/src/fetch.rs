//! Concurrent archive fetcher.
//!
//! Every distinct archive is requested up front so the summed
//! `Content-Length` is known before any body is read. Bodies are then drained
//! on a pool of at most [`MAX_CONCURRENT_FETCHES`] workers, each piping its
//! stream straight into an extraction subprocess. A url listed more than once
//! is downloaded and extracted once but still ticks once per listing. The
//! first failure stops the pool from starting further archives and fails the
//! whole fetch.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use deltasync_core::{ByteProgress, ProgressTracker};

use crate::error::{io_err, SyncError};
use crate::http;

/// Upper bound on simultaneous archive transfers.
pub const MAX_CONCURRENT_FETCHES: usize = 3;

/// Header carrying the access token on archive requests.
pub const TOKEN_HEADER: &str = "OSF-TOKEN";

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Materializes commits from prepackaged archives.
pub trait ArchiveSource: Sync {
    /// Fetch and extract every url into `dest`, ticking `progress` once per
    /// listed url.
    fn fetch_all(
        &self,
        urls: &[String],
        dest: &Path,
        progress: &ProgressTracker,
    ) -> Result<(), SyncError>;
}

/// Unpacks one archive stream into a directory.
pub trait Extract: Send + Sync {
    /// `source` names the archive for error messages.
    fn extract(&self, source: &str, archive: &mut dyn Read, dest: &Path)
        -> Result<(), SyncError>;
}

// ---------------------------------------------------------------------------
// tar extractor
// ---------------------------------------------------------------------------

/// Pipes the archive into `tar -xjf - -C <dest>`.
#[derive(Debug, Clone)]
pub struct TarExtractor {
    program: PathBuf,
    prefix_args: Vec<String>,
}

impl Default for TarExtractor {
    fn default() -> Self {
        Self::with_program("tar")
    }
}

impl TarExtractor {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }

    /// Arguments placed before the extraction flags.
    pub fn with_prefix_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix_args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl Extract for TarExtractor {
    fn extract(
        &self,
        source: &str,
        archive: &mut dyn Read,
        dest: &Path,
    ) -> Result<(), SyncError> {
        fs::create_dir_all(dest).map_err(|e| io_err(dest, e))?;

        let mut child = Command::new(&self.program)
            .args(&self.prefix_args)
            .args(["-xjf", "-", "-C"])
            .arg(dest)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SyncError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let copied = match child.stdin.take() {
            Some(mut stdin) => io::copy(archive, &mut stdin),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "extractor stdin unavailable",
            )),
        };

        let output = child
            .wait_with_output()
            .map_err(|e| io_err(&self.program, e))?;
        let status = format!("{} exited with {}", self.program.display(), output.status);

        // A broken pipe means the extractor quit early; its exit status says why.
        if let Err(e) = &copied {
            if e.kind() != io::ErrorKind::BrokenPipe {
                return Err(SyncError::Transfer {
                    url: source.to_string(),
                    reason: format!("stream interrupted: {e} ({status})"),
                });
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SyncError::Extraction {
                source_url: source.to_string(),
                reason: format!("{status}: {}", stderr.trim()),
            });
        }

        match copied {
            Ok(bytes) => {
                debug!(source, bytes, "archive extracted");
                Ok(())
            }
            Err(e) => Err(SyncError::Transfer {
                url: source.to_string(),
                reason: format!("stream interrupted: {e}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Byte counting
// ---------------------------------------------------------------------------

/// Forwards reads and reports every chunk to a shared [`ByteProgress`].
pub struct CountingReader<'a, R> {
    inner: R,
    progress: &'a ByteProgress,
}

impl<'a, R: Read> CountingReader<'a, R> {
    pub fn new(inner: R, progress: &'a ByteProgress) -> Self {
        Self { inner, progress }
    }
}

impl<R: Read> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.progress.advance(n as u64);
        }
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// HTTP fetcher
// ---------------------------------------------------------------------------

type Stream = Box<dyn Read + Send + Sync + 'static>;

/// What one [`ArchiveFetcher::fetch`] call moved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    /// Distinct archives downloaded.
    pub archives: usize,
    /// Sum of the announced `Content-Length` values.
    pub total_bytes: u64,
    pub received_bytes: u64,
    /// Highest 5% threshold announced; `None` when no total was known.
    pub last_percent: Option<u64>,
}

/// An opened archive waiting for a worker.
struct PendingArchive<'a> {
    url: &'a str,
    listings: usize,
    stream: Stream,
}

/// Fetches archives over HTTP with the access token attached.
pub struct ArchiveFetcher {
    agent: ureq::Agent,
    token: String,
    extractor: Box<dyn Extract>,
    concurrency: usize,
}

impl ArchiveFetcher {
    pub fn new(agent: ureq::Agent, token: impl Into<String>, extractor: Box<dyn Extract>) -> Self {
        Self {
            agent,
            token: token.into(),
            extractor,
            concurrency: MAX_CONCURRENT_FETCHES,
        }
    }

    /// Lower the worker count; values above the cap are clamped.
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.clamp(1, MAX_CONCURRENT_FETCHES);
        self
    }

    /// Issue the request for `url` and return its length and body stream.
    fn open(&self, url: &str) -> Result<(u64, Stream), SyncError> {
        let request = self.agent.get(url).set(TOKEN_HEADER, &self.token);
        let response = http::call(request, url)?;
        let length = match response
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            Some(length) => length,
            None => {
                warn!(url, "archive response has no usable Content-Length");
                0
            }
        };
        Ok((length, response.into_reader()))
    }

    /// Download and extract every url into `dest` and report the bytes moved.
    pub fn fetch(
        &self,
        urls: &[String],
        dest: &Path,
        progress: &ProgressTracker,
    ) -> Result<FetchReport, SyncError> {
        let listings = distinct_listings(urls);
        if listings.is_empty() {
            return Ok(FetchReport::default());
        }
        if listings.len() < urls.len() {
            debug!(
                listed = urls.len(),
                distinct = listings.len(),
                "repeated archive urls are fetched once"
            );
        }

        let mut total_bytes = 0u64;
        let mut pending = Vec::with_capacity(listings.len());
        for (url, count) in listings {
            let (length, stream) = self.open(url)?;
            total_bytes += length;
            pending.push(PendingArchive {
                url,
                listings: count,
                stream,
            });
        }
        let archives = pending.len();
        info!(archives, total_bytes, "downloading archives");

        let bytes = ByteProgress::new(total_bytes);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency.min(archives))
            .thread_name(|i| format!("archive-fetch-{i}"))
            .build()?;

        pool.install(|| {
            pending.into_par_iter().try_for_each(|archive| {
                let mut reader = CountingReader::new(archive.stream, &bytes);
                self.extractor.extract(archive.url, &mut reader, dest)?;
                for _ in 0..archive.listings {
                    progress.tick(format_args!("extracted {}", archive.url));
                }
                Ok::<(), SyncError>(())
            })
        })?;

        Ok(FetchReport {
            archives,
            total_bytes,
            received_bytes: bytes.received(),
            last_percent: bytes.last_announced(),
        })
    }
}

impl ArchiveSource for ArchiveFetcher {
    fn fetch_all(
        &self,
        urls: &[String],
        dest: &Path,
        progress: &ProgressTracker,
    ) -> Result<(), SyncError> {
        let report = self.fetch(urls, dest, progress)?;
        info!(
            archives = report.archives,
            received_bytes = report.received_bytes,
            "archives extracted"
        );
        Ok(())
    }
}

/// Distinct urls in first-listed order, with how often each was listed.
fn distinct_listings(urls: &[String]) -> Vec<(&str, usize)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut listings: Vec<(&str, usize)> = Vec::new();
    for url in urls {
        match index.get(url.as_str()) {
            Some(&at) => listings[at].1 += 1,
            None => {
                index.insert(url.as_str(), listings.len());
                listings.push((url.as_str(), 1));
            }
        }
    }
    listings
}
