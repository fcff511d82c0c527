//! Tracing setup and size-based rotation for the agent log file.
//!
//! When `log_path` is configured, the log is rotated once it exceeds 10 MiB,
//! keeping at most 5 rotated copies:
//!   mapway.log → mapway.log.1 → mapway.log.2 → … → mapway.log.5

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use mapway_core::Config;

use crate::error::{io_err, DaemonError};

/// Maximum log file size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated backup files to keep.
pub const MAX_ROTATED_FILES: usize = 5;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default `info` filter. Output goes to stdout
/// unless `log_path` is set. Calling this twice is harmless; the second
/// subscriber is ignored.
pub fn init_tracing(config: &Config) -> Result<(), DaemonError> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.log_path {
        Some(path) => {
            let writer = RotatingLog::open(path, MAX_LOG_BYTES, MAX_ROTATED_FILES)
                .map_err(|e| io_err(path, e))?;
            let builder = fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(writer));
            if config.log_json {
                let _ = builder.json().try_init();
            } else {
                let _ = builder.try_init();
            }
        }
        None => {
            let builder = fmt().with_env_filter(filter).with_target(false);
            if config.log_json {
                let _ = builder.json().try_init();
            } else {
                let _ = builder.try_init();
            }
        }
    }
    Ok(())
}

/// Append-only log file that rotates itself once it grows past `max_bytes`.
#[derive(Debug)]
pub struct RotatingLog {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    max_files: usize,
}

impl RotatingLog {
    pub fn open(path: &Path, max_bytes: u64, max_files: usize) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        rotate_if_needed(path, max_bytes, max_files)?;
        let file = open_append(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written,
            max_bytes,
            max_files,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if rotate_if_needed(&self.path, self.max_bytes, self.max_files)? {
            self.file = open_append(&self.path)?;
            self.written = 0;
        }
        Ok(())
    }
}

impl Write for RotatingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written >= self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Rotate `log_path` if its size exceeds `max_bytes`.
///
/// Returns `true` if rotation occurred, `false` if the file was under the
/// threshold (or did not exist yet).
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    if size < max_bytes {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }

    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }

    fs::rename(log_path, numbered_path(log_path, 1))?;
    OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(log_path)?;

    Ok(true)
}

/// Path of the `n`-th rotated copy of `base` (e.g. `mapway.log.2`).
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("mapway.log");
    base.with_file_name(format!("{name}.{n}"))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
