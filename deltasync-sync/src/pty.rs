//! Line-oriented progress adapter for tools that only report progress on a
//! terminal.
//!
//! The child runs attached to a pseudo-terminal. Raw output is split on
//! `\r` and `\n`; lines carrying [`RECEIVING_MARKER`] are normalized and
//! re-emitted. Everything else is suppressed, but the last
//! [`DIAGNOSTIC_TAIL_LINES`] of it are kept for error reports.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::path::Path;

use portable_pty::{native_pty_system, CommandBuilder, PtySize};

/// Substring identifying a transfer progress line.
pub const RECEIVING_MARKER: &str = "Receiving objects";

/// Suppressed lines retained for [`PullProgress::diagnostics`].
pub const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// Localized percent glyphs some terminals render in place of `%`.
const PERCENT_GLYPHS: [char; 3] = ['\u{FF05}', '\u{066A}', '\u{FE6A}'];

/// Wide enough that progress lines are not wrapped.
const PTY_SIZE: PtySize = PtySize {
    rows: 24,
    cols: 200,
    pixel_width: 0,
    pixel_height: 0,
};

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Accumulates raw terminal bytes and yields normalized progress lines.
#[derive(Debug, Default)]
pub struct PullProgress {
    label: String,
    partial: Vec<u8>,
    emitted: usize,
    tail: VecDeque<String>,
}

impl PullProgress {
    /// `label` prefixes every emitted line (typically the commit id).
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Number of progress lines emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// The most recent suppressed lines, oldest first, joined by newlines.
    ///
    /// The terminal merges stdout and stderr, so this is where a failing
    /// tool's error text ends up.
    pub fn diagnostics(&self) -> String {
        self.tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }

    /// Consume a chunk of output; returns the progress lines it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\r' || byte == b'\n' {
                let raw = std::mem::take(&mut self.partial);
                if let Some(line) = self.accept(&raw) {
                    lines.push(line);
                }
            } else {
                self.partial.push(byte);
            }
        }
        lines
    }

    /// Flush a trailing line that never saw a terminator.
    pub fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.partial);
        self.accept(&raw)
    }

    fn accept(&mut self, raw: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(raw);
        match normalize_line(&text) {
            Some(line) => {
                self.emitted += 1;
                tracing::info!(target: "deltasync::pull", "{}: {line}", self.label);
                Some(line)
            }
            None => {
                self.remember(text.trim());
                None
            }
        }
    }

    fn remember(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        if self.tail.len() == DIAGNOSTIC_TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(line.to_string());
    }
}

/// Normalize a progress line, or `None` when it carries no marker.
pub fn normalize_line(line: &str) -> Option<String> {
    if !line.contains(RECEIVING_MARKER) {
        return None;
    }
    let normalized: String = line
        .trim()
        .chars()
        .map(|c| if PERCENT_GLYPHS.contains(&c) { '%' } else { c })
        .collect();
    Some(normalized)
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

/// Outcome of a pty-attached run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtyExit {
    pub success: bool,
    pub code: u32,
}

/// Run `program args…` on a pseudo-terminal, feeding its output to `progress`
/// until the child closes the terminal, then wait for it.
pub fn run_attached(
    program: &Path,
    args: &[String],
    progress: &mut PullProgress,
) -> io::Result<PtyExit> {
    let pair = native_pty_system()
        .openpty(PTY_SIZE)
        .map_err(|e| io::Error::other(format!("openpty: {e}")))?;

    let mut cmd = CommandBuilder::new(program);
    cmd.args(args);
    if let Ok(cwd) = std::env::current_dir() {
        cmd.cwd(cwd);
    }
    let mut child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| io::Error::other(format!("spawn {}: {e}", program.display())))?;
    // Only the child may hold the slave side, or the reader never sees EOF.
    drop(pair.slave);

    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| io::Error::other(format!("pty reader: {e}")))?;

    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                progress.feed(&buf[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // Linux reports EIO on the master once the child side is closed.
            Err(e) => {
                tracing::debug!(error = %e, "pty read finished");
                break;
            }
        }
    }
    progress.finish();

    let status = child.wait()?;
    Ok(PtyExit {
        success: status.success(),
        code: status.exit_code(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_lines_are_normalized() {
        let line = normalize_line("  Receiving objects: 45\u{FF05} (90/200) 1.2 MB/s\r").unwrap();
        assert_eq!(line, "Receiving objects: 45% (90/200) 1.2 MB/s");
    }

    #[test]
    fn other_lines_are_suppressed() {
        assert!(normalize_line("Receiving metadata objects: 3/(estimating)").is_none());
        assert!(normalize_line("").is_none());
    }

    #[test]
    fn carriage_return_updates_split_into_lines() {
        let mut p = PullProgress::new("sha-B");
        let lines = p.feed(b"Receiving objects: 10% (1/10)\rReceiving objects: 20% (2/10)\r");
        assert_eq!(
            lines,
            vec![
                "Receiving objects: 10% (1/10)".to_string(),
                "Receiving objects: 20% (2/10)".to_string(),
            ]
        );
        assert_eq!(p.emitted(), 2);
    }

    #[test]
    fn multibyte_glyph_split_across_chunks_survives() {
        let mut p = PullProgress::new("sha-B");
        let raw = "Receiving objects: 99\u{FF05}\n".as_bytes();
        let cut = raw.len() - 2;
        assert!(p.feed(&raw[..cut]).is_empty());
        assert_eq!(p.feed(&raw[cut..]), vec!["Receiving objects: 99%".to_string()]);
    }

    #[test]
    fn output_without_marker_emits_nothing() {
        let mut p = PullProgress::new("sha-A");
        assert!(p.feed(b"GPG verification disabled\r\n3 metadata, 12 content objects fetched\r\n").is_empty());
        assert!(p.finish().is_none());
        assert_eq!(p.emitted(), 0);
    }

    #[test]
    fn suppressed_lines_are_kept_as_diagnostics() {
        let mut p = PullProgress::new("sha-B");
        p.feed(b"Receiving objects: 50% (1/2)\r\nerror: No such branch: sha-B\n");
        assert_eq!(p.emitted(), 1);
        assert_eq!(p.diagnostics(), "error: No such branch: sha-B");
    }

    #[test]
    fn diagnostics_keep_only_the_latest_lines() {
        let mut p = PullProgress::new("sha-B");
        for i in 0..DIAGNOSTIC_TAIL_LINES + 5 {
            p.feed(format!("line {i}\n").as_bytes());
        }
        let kept: Vec<String> = p.diagnostics().lines().map(str::to_string).collect();
        assert_eq!(kept.len(), DIAGNOSTIC_TAIL_LINES);
        assert_eq!(kept[0], "line 5");
        assert_eq!(
            kept.last().map(String::as_str),
            Some(format!("line {}", DIAGNOSTIC_TAIL_LINES + 4).as_str())
        );
    }

    #[test]
    fn unterminated_tail_is_flushed() {
        let mut p = PullProgress::new("sha-A");
        assert!(p.feed(b"Receiving objects: 100% (5/5)").is_empty());
        assert_eq!(p.finish().as_deref(), Some("Receiving objects: 100% (5/5)"));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn attached_child_output_is_scraped() {
        let mut p = PullProgress::new("pty");
        let args = vec![
            "-c".to_string(),
            "printf 'starting\\nReceiving objects: 50%% (1/2)\\r'; exit 0".to_string(),
        ];
        let exit = run_attached(Path::new("/bin/sh"), &args, &mut p).expect("run");
        assert!(exit.success);
        assert_eq!(p.emitted(), 1);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn attached_child_exit_code_is_reported() {
        let mut p = PullProgress::new("pty");
        let args = vec!["-c".to_string(), "exit 4".to_string()];
        let exit = run_attached(Path::new("/bin/sh"), &args, &mut p).expect("run");
        assert!(!exit.success);
        assert_eq!(exit.code, 4);
        assert_eq!(p.emitted(), 0);
    }
}
