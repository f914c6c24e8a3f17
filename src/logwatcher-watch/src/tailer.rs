//! Tailer — incremental reads, rotation handling, partial-line deferral.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::time::Instant;

use logwatcher_core::FileState;

use crate::error::WatchError;

#[cfg(unix)]
fn file_identity(metadata: &std::fs::Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (metadata.dev(), metadata.ino())
}

#[cfg(not(unix))]
fn file_identity(_metadata: &std::fs::Metadata) -> (u64, u64) {
    // No portable inode equivalent; rotation is still caught by the
    // truncation check in `FileState::is_rotated`.
    (0, 0)
}

/// Reads new bytes for one file, splits complete lines, and advances the
/// file's tailing state. A trailing chunk without a newline terminator is
/// held in `state.partial` and re-read on the next pass — it is never
/// emitted as a line.
pub struct Tailer {
    read_chunk_size: usize,
}

impl Tailer {
    pub fn new(read_chunk_size: usize) -> Self {
        Self {
            read_chunk_size: read_chunk_size.max(1),
        }
    }

    /// Process one `FileChanged` event for `state`. Returns the complete
    /// lines read, oldest first. On any error, `state` is left unchanged
    /// except for `last_error`/`error_count`, and no lines are returned.
    pub fn poll(&self, state: &mut FileState) -> Result<Vec<String>, WatchError> {
        let metadata = std::fs::metadata(&state.path).map_err(|source| WatchError::Io {
            path: state.path.clone(),
            source,
        })?;
        let (dev, inode) = file_identity(&metadata);
        let size = metadata.len();

        if state.is_rotated(dev, inode, size) {
            state.rotate(dev, inode);
        }

        let mut file = File::open(&state.path).map_err(|source| WatchError::Io {
            path: state.path.clone(),
            source,
        })?;
        file.seek(SeekFrom::Start(state.offset))
            .map_err(|source| WatchError::Io {
                path: state.path.clone(),
                source,
            })?;

        let mut fresh = Vec::new();
        let mut buf = vec![0u8; self.read_chunk_size];
        loop {
            let n = file.read(&mut buf).map_err(|source| WatchError::Io {
                path: state.path.clone(),
                source,
            })?;
            if n == 0 {
                break;
            }
            fresh.extend_from_slice(&buf[..n]);
        }
        let bytes_read = fresh.len() as u64;

        let mut combined = std::mem::take(&mut state.partial);
        combined.extend_from_slice(&fresh);

        let ends_with_newline = combined.last() == Some(&b'\n');
        let mut parts: Vec<&[u8]> = combined.split(|&b| b == b'\n').collect();
        // `split` always yields a trailing empty slice when the buffer ends
        // with the delimiter; drop it so it isn't mistaken for a partial line.
        if ends_with_newline {
            parts.pop();
        } else {
            state.partial = parts.pop().unwrap_or(&[]).to_vec();
        }

        let mut lines = Vec::with_capacity(parts.len());
        for part in parts {
            let part = strip_trailing_cr(part);
            match std::str::from_utf8(part) {
                Ok(line) => lines.push(line.to_string()),
                Err(_) => {
                    return Err(WatchError::InvalidUtf8 {
                        path: state.path.clone(),
                    })
                }
            }
        }

        state.offset += bytes_read;
        state.record_read(size, Instant::now());
        Ok(lines)
    }
}

fn strip_trailing_cr(bytes: &[u8]) -> &[u8] {
    match bytes.last() {
        Some(b'\r') => &bytes[..bytes.len() - 1],
        _ => bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn reads_complete_lines_and_defers_partial() {
        let dir = tempdir().unwrap();
        let path = write_file(&dir, "a.log", "line one\nline two\npartial");
        let mut state = FileState::new(path);
        let tailer = Tailer::new(4096);

        let lines = tailer.poll(&mut state).unwrap();
        assert_eq!(lines, vec!["line one", "line two"]);
        assert_eq!(state.partial, b"partial");
    }

    #[test]
    fn second_pass_completes_deferred_partial() {
        let dir = tempdir().unwrap();
        let path = write_file(&dir, "a.log", "line one\npartial");
        let mut state = FileState::new(path.clone());
        let tailer = Tailer::new(4096);

        let lines = tailer.poll(&mut state).unwrap();
        assert_eq!(lines, vec!["line one"]);

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b" line\nmore\n").unwrap();

        let lines = tailer.poll(&mut state).unwrap();
        assert_eq!(lines, vec!["partial line", "more"]);
        assert!(state.partial.is_empty());
    }

    #[test]
    fn detects_truncation_as_rotation_and_restarts_from_zero() {
        let dir = tempdir().unwrap();
        let path = write_file(&dir, "a.log", "aaaaaaaaaaaaaaaaaaaa\n");
        let mut state = FileState::new(path.clone());
        let tailer = Tailer::new(4096);
        tailer.poll(&mut state).unwrap();
        assert!(state.offset > 0);

        let mut f = File::create(&path).unwrap();
        f.write_all(b"new\n").unwrap();
        drop(f);

        let lines = tailer.poll(&mut state).unwrap();
        assert_eq!(lines, vec!["new"]);
        assert_eq!(state.offset, 4);
    }

    #[test]
    fn offset_does_not_advance_on_invalid_utf8() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.log");
        let mut f = File::create(&path).unwrap();
        f.write_all(&[0xff, 0xfe, b'\n']).unwrap();
        drop(f);

        let mut state = FileState::new(path);
        let tailer = Tailer::new(4096);
        let err = tailer.poll(&mut state).unwrap_err();
        assert!(matches!(err, WatchError::InvalidUtf8 { .. }));
        assert_eq!(state.offset, 0);
    }
}
