//! Line-oriented routing table file.
//!
//! ## Format
//!
//! ```text
//! <key> <value>\n
//! ```
//!
//! One entry per line, no header. The key is the text before the first
//! whitespace; only that token is compared when a key is removed. Lines are
//! handled as bytes, so a line that is not UTF-8 is still copied through.
//!
//! ## Rewrites
//!
//! 1. Stream the new content into `<path>.mapway.tmp` (same directory, same filesystem).
//! 2. Rename the temp file over `<path>` (atomic on POSIX).
//! 3. On any failure the temp file is removed and `<path>` is left untouched.

use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use mapway_core::types::RoutingEntry;

use crate::error::{io_err, TableError};

const TMP_SUFFIX: &str = "mapway.tmp";

/// Handle on the routing table file. Holds only the path; every call opens
/// the file afresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFile {
    path: PathBuf,
}

impl TableFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<path>.mapway.tmp`, the staging file for rewrites.
    pub fn tmp_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.{TMP_SUFFIX}", self.path.display()))
    }

    // -----------------------------------------------------------------------
    // append
    // -----------------------------------------------------------------------

    /// Append one `key value` line, creating the file if it does not exist.
    pub fn append(&self, entry: &RoutingEntry) -> Result<(), TableError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| io_err(&self.path, e))?;
        let line = format!("{}\n", entry.to_line());
        file.write_all(line.as_bytes())
            .map_err(|e| io_err(&self.path, e))?;
        file.flush().map_err(|e| io_err(&self.path, e))?;

        tracing::debug!(path = %self.path.display(), key = %entry.key, "appended table entry");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // remove
    // -----------------------------------------------------------------------

    /// Rewrite the file without the lines whose leading token equals `key`.
    ///
    /// Returns the number of lines dropped. Every other line is copied through
    /// unchanged and in order. A missing file is [`TableError::Missing`].
    pub fn remove(&self, key: &str) -> Result<usize, TableError> {
        self.remove_with_tmp(key, &self.tmp_path())
    }

    fn remove_with_tmp(&self, key: &str, tmp: &Path) -> Result<usize, TableError> {
        let source = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(TableError::Missing {
                    path: self.path.clone(),
                })
            }
            Err(err) => return Err(io_err(&self.path, err)),
        };

        let dropped = match copy_without_key(&self.path, source, tmp, key) {
            Ok(dropped) => dropped,
            Err(err) => {
                let _ = fs::remove_file(tmp);
                return Err(err);
            }
        };

        if let Err(e) = fs::rename(tmp, &self.path) {
            let _ = fs::remove_file(tmp);
            return Err(io_err(&self.path, e));
        }

        tracing::debug!(
            path = %self.path.display(),
            key,
            dropped,
            "rewrote table file without key",
        );
        Ok(dropped)
    }

    // -----------------------------------------------------------------------
    // write_all
    // -----------------------------------------------------------------------

    /// Replace the whole file with `entries`, one line each, in iteration order.
    ///
    /// Returns the number of lines written.
    pub fn write_all<'a, I>(&self, entries: I) -> Result<usize, TableError>
    where
        I: IntoIterator<Item = &'a RoutingEntry>,
    {
        self.write_all_with_tmp(entries, &self.tmp_path())
    }

    fn write_all_with_tmp<'a, I>(&self, entries: I, tmp: &Path) -> Result<usize, TableError>
    where
        I: IntoIterator<Item = &'a RoutingEntry>,
    {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }

        let count = match write_snapshot(tmp, entries) {
            Ok(count) => count,
            Err(err) => {
                let _ = fs::remove_file(tmp);
                return Err(err);
            }
        };

        if let Err(e) = fs::rename(tmp, &self.path) {
            let _ = fs::remove_file(tmp);
            return Err(io_err(&self.path, e));
        }

        tracing::info!(path = %self.path.display(), entries = count, "wrote table file");
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // read
    // -----------------------------------------------------------------------

    /// Parse every line that holds an entry. A missing file reads as empty.
    ///
    /// Bytes that are not UTF-8 are replaced with U+FFFD, so such an entry
    /// never matches a stored key and a reconciliation pass drops it.
    pub fn read_entries(&self) -> Result<Vec<RoutingEntry>, TableError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_err(&self.path, err)),
        };

        let mut entries = Vec::new();
        for (idx, line) in BufReader::new(file).split(b'\n').enumerate() {
            let line = line.map_err(|e| io_err(&self.path, e))?;
            let text = String::from_utf8_lossy(&line);
            if let Cow::Owned(_) = text {
                tracing::warn!(
                    path = %self.path.display(),
                    line = idx + 1,
                    "table file line is not valid UTF-8",
                );
            }
            if let Some(entry) = RoutingEntry::from_line(&text) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

fn copy_without_key(
    path: &Path,
    source: File,
    tmp: &Path,
    key: &str,
) -> Result<usize, TableError> {
    let out = File::create(tmp).map_err(|e| io_err(tmp, e))?;
    let mut writer = BufWriter::new(out);
    let mut dropped = 0usize;

    for line in BufReader::new(source).split(b'\n') {
        let line = line.map_err(|e| io_err(path, e))?;
        if leading_token(&line) == key.as_bytes() {
            dropped += 1;
            continue;
        }
        writer
            .write_all(&line)
            .and_then(|()| writer.write_all(b"\n"))
            .map_err(|e| io_err(tmp, e))?;
    }

    let out = writer
        .into_inner()
        .map_err(|e| io_err(tmp, e.into_error()))?;
    out.sync_all().map_err(|e| io_err(tmp, e))?;
    Ok(dropped)
}

fn write_snapshot<'a, I>(tmp: &Path, entries: I) -> Result<usize, TableError>
where
    I: IntoIterator<Item = &'a RoutingEntry>,
{
    let out = File::create(tmp).map_err(|e| io_err(tmp, e))?;
    let mut writer = BufWriter::new(out);
    let mut count = 0usize;
    for entry in entries {
        writer
            .write_all(entry.to_line().as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .map_err(|e| io_err(tmp, e))?;
        count += 1;
    }

    let out = writer
        .into_inner()
        .map_err(|e| io_err(tmp, e.into_error()))?;
    out.sync_all().map_err(|e| io_err(tmp, e))?;
    Ok(count)
}

/// Bytes before the first ASCII whitespace.
fn leading_token(line: &[u8]) -> &[u8] {
    match line.iter().position(u8::is_ascii_whitespace) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
