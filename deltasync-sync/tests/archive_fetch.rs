//! Archive fetching against a local HTTP mock.

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

use deltasync_core::{ByteProgress, ProgressTracker};
use deltasync_sync::fetch::{CountingReader, TOKEN_HEADER};
use deltasync_sync::{http, ArchiveFetcher, ArchiveSource, Extract, SyncError};
use tempfile::TempDir;

/// Drains each archive and remembers how many bytes it held.
#[derive(Default, Clone)]
struct RecordingExtractor {
    seen: Arc<Mutex<Vec<(String, u64)>>>,
}

impl Extract for RecordingExtractor {
    fn extract(
        &self,
        source: &str,
        archive: &mut dyn Read,
        _dest: &Path,
    ) -> Result<(), SyncError> {
        let n = io::copy(archive, &mut io::sink()).map_err(|e| SyncError::Transfer {
            url: source.to_string(),
            reason: e.to_string(),
        })?;
        self.seen.lock().unwrap().push((source.to_string(), n));
        Ok(())
    }
}

fn fetcher(token: &str, extractor: RecordingExtractor) -> ArchiveFetcher {
    ArchiveFetcher::new(http::agent(None), token, Box::new(extractor))
}

#[test]
fn fetches_every_archive_with_token_and_ticks_once_each() {
    let mut server = mockito::Server::new();
    let sizes = [1200usize, 3400, 560];
    let mocks: Vec<_> = sizes
        .iter()
        .enumerate()
        .map(|(i, size)| {
            server
                .mock("GET", format!("/archive-{i}.tar.bz2").as_str())
                .match_header(TOKEN_HEADER, "s3cret")
                .with_status(200)
                .with_body(vec![b'x'; *size])
                .create()
        })
        .collect();
    let urls: Vec<String> = (0..sizes.len())
        .map(|i| format!("{}/archive-{i}.tar.bz2", server.url()))
        .collect();

    let extractor = RecordingExtractor::default();
    let progress = ProgressTracker::new(4);
    let dest = TempDir::new().unwrap();

    fetcher("s3cret", extractor.clone())
        .fetch_all(&urls, dest.path(), &progress)
        .expect("fetch");

    for m in &mocks {
        m.assert();
    }
    assert_eq!(progress.completed(), 3);

    let mut seen = extractor.seen.lock().unwrap().clone();
    seen.sort();
    let mut want: Vec<(String, u64)> = urls
        .iter()
        .cloned()
        .zip(sizes.iter().map(|s| *s as u64))
        .collect();
    want.sort();
    assert_eq!(seen, want);
}

#[test]
fn repeated_url_is_fetched_once_but_ticked_per_listing() {
    let mut server = mockito::Server::new();
    let m = server
        .mock("GET", "/c.tar.bz2")
        .with_status(200)
        .with_body(vec![b'c'; 900])
        .expect(1)
        .create();
    let url = format!("{}/c.tar.bz2", server.url());
    let urls = vec![url.clone(), url.clone()];

    let extractor = RecordingExtractor::default();
    let progress = ProgressTracker::new(3);
    let dest = TempDir::new().unwrap();
    let report = fetcher("tok", extractor.clone())
        .fetch(&urls, dest.path(), &progress)
        .expect("fetch");

    m.assert();
    assert_eq!(progress.completed(), 2, "one tick per listing");
    assert_eq!(report.archives, 1);
    assert_eq!(report.total_bytes, 900);
    assert_eq!(*extractor.seen.lock().unwrap(), vec![(url, 900)]);
}

#[test]
fn byte_total_is_the_sum_of_content_lengths() {
    let mut server = mockito::Server::new();
    let sizes = [4_000usize, 2_500, 3_500];
    let _mocks: Vec<_> = sizes
        .iter()
        .enumerate()
        .map(|(i, size)| {
            server
                .mock("GET", format!("/part-{i}.tar.bz2").as_str())
                .with_body(vec![b'p'; *size])
                .create()
        })
        .collect();
    let urls: Vec<String> = (0..sizes.len())
        .map(|i| format!("{}/part-{i}.tar.bz2", server.url()))
        .collect();

    let progress = ProgressTracker::new(4);
    let dest = TempDir::new().unwrap();
    let report = fetcher("tok", RecordingExtractor::default())
        .fetch(&urls, dest.path(), &progress)
        .expect("fetch");

    assert_eq!(report.archives, 3);
    assert_eq!(report.total_bytes, 10_000);
    assert_eq!(report.received_bytes, 10_000);
    assert_eq!(report.last_percent, Some(100));
}

#[test]
fn missing_content_length_announces_no_percentages() {
    let mut server = mockito::Server::new();
    let _m = server
        .mock("GET", "/stream.tar.bz2")
        .with_chunked_body(|w| w.write_all(&[b's'; 2_048]))
        .create();
    let urls = vec![format!("{}/stream.tar.bz2", server.url())];

    let progress = ProgressTracker::new(2);
    let dest = TempDir::new().unwrap();
    let report = fetcher("tok", RecordingExtractor::default())
        .fetch(&urls, dest.path(), &progress)
        .expect("fetch");

    assert_eq!(report.total_bytes, 0);
    assert_eq!(report.received_bytes, 2_048);
    assert_eq!(report.last_percent, None);
    assert_eq!(progress.completed(), 1);
}

#[test]
fn non_success_status_fails_the_whole_fetch() {
    let mut server = mockito::Server::new();
    let _ok = server
        .mock("GET", "/good.tar.bz2")
        .with_status(200)
        .with_body("ok")
        .create();
    let _denied = server
        .mock("GET", "/denied.tar.bz2")
        .with_status(403)
        .with_body("forbidden")
        .create();
    let urls = vec![
        format!("{}/good.tar.bz2", server.url()),
        format!("{}/denied.tar.bz2", server.url()),
    ];

    let extractor = RecordingExtractor::default();
    let progress = ProgressTracker::new(3);
    let dest = TempDir::new().unwrap();
    let err = fetcher("tok", extractor.clone())
        .fetch_all(&urls, dest.path(), &progress)
        .unwrap_err();

    match err {
        SyncError::Transfer { url, reason } => {
            assert!(url.ends_with("/denied.tar.bz2"));
            assert!(reason.contains("403"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(extractor.seen.lock().unwrap().is_empty(), "no extraction starts");
    assert_eq!(progress.completed(), 0);
}

#[test]
fn extraction_failure_propagates() {
    struct FailingExtractor;
    impl Extract for FailingExtractor {
        fn extract(&self, source: &str, _: &mut dyn Read, _: &Path) -> Result<(), SyncError> {
            Err(SyncError::Extraction {
                source_url: source.to_string(),
                reason: "tar exited with 2".into(),
            })
        }
    }

    let mut server = mockito::Server::new();
    let _m = server.mock("GET", "/a.tar.bz2").with_body("data").create();
    let urls = vec![format!("{}/a.tar.bz2", server.url())];

    let fetcher = ArchiveFetcher::new(http::agent(None), "tok", Box::new(FailingExtractor));
    let progress = ProgressTracker::new(2);
    let dest = TempDir::new().unwrap();
    let err = fetcher.fetch_all(&urls, dest.path(), &progress).unwrap_err();
    assert!(matches!(err, SyncError::Extraction { .. }));
    assert_eq!(progress.completed(), 0);
}

#[test]
fn byte_progress_across_concurrent_streams_reaches_one_hundred() {
    let sizes = [10_000usize, 7_531, 2_469];
    let total: u64 = sizes.iter().map(|s| *s as u64).sum();
    let bytes = ByteProgress::new(total);

    let announced: Vec<u64> = thread::scope(|scope| {
        let handles: Vec<_> = sizes
            .iter()
            .map(|&size| {
                let bytes = &bytes;
                scope.spawn(move || {
                    let mut seen = Vec::new();
                    let mut left = size as u64;
                    while left > 0 {
                        let chunk = left.min(333);
                        seen.extend(bytes.advance(chunk));
                        left -= chunk;
                    }
                    seen
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    assert_eq!(bytes.received(), total);
    assert_eq!(bytes.percent(), 100);

    let mut sorted = announced.clone();
    sorted.sort_unstable();
    let want: Vec<u64> = (1..=20).map(|n| n * 5).collect();
    assert_eq!(sorted, want, "every threshold announced exactly once");
}

#[test]
fn counting_reader_drains_stream_into_shared_progress() {
    let bytes = ByteProgress::new(4_096);
    let data = vec![1u8; 4_096];
    let mut reader = CountingReader::new(&data[..], &bytes);
    let mut buf = [0u8; 100];
    while reader.read(&mut buf).unwrap() > 0 {}
    assert_eq!(bytes.percent(), 100);
    assert!(bytes.advance(0).is_empty(), "nothing left to announce");
}

#[test]
fn byte_thresholds_are_announced_once_and_in_order() {
    let bytes = ByteProgress::new(1_000);
    let mut announced = Vec::new();
    for chunk in [30u64, 30, 200, 1, 1, 500, 238] {
        announced.extend(bytes.advance(chunk));
    }
    let want: Vec<u64> = (1..=20).map(|n| n * 5).collect();
    assert_eq!(announced, want);
    assert!(announced.windows(2).all(|w| w[0] < w[1]));
}
