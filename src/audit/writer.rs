//! Rotating JSONL writer for the audit trail.
//!
//! One record per line. Rotation is size-based; rotated files are gzip
//! compressed and pruned beyond a retention count.

use super::AuditRecord;
use crate::error::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// File rotation policy.
#[derive(Clone, Copy, Debug)]
pub enum RotationPolicy {
    /// Rotate when the file exceeds this many bytes
    BySize(u64),
    /// No rotation
    Never,
}

#[derive(Clone, Debug)]
pub struct AuditWriterConfig {
    /// Directory for audit files
    pub base_dir: PathBuf,
    pub rotation: RotationPolicy,
    /// Gzip rotated files
    pub compress_rotated: bool,
    /// Rotated files kept before pruning
    pub max_rotated_files: usize,
    /// Flush after every record instead of buffering
    pub immediate_flush: bool,
}

impl Default for AuditWriterConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/var/log/fleet-sentinel"),
            rotation: RotationPolicy::BySize(100 * 1024 * 1024),
            compress_rotated: true,
            max_rotated_files: 10,
            immediate_flush: false,
        }
    }
}

struct AuditFile {
    writer: BufWriter<File>,
    bytes_written: u64,
}

/// Thread-safe rotating writer.
pub struct AuditWriter {
    config: AuditWriterConfig,
    current: Mutex<Option<AuditFile>>,
}

const ACTIVE_FILE: &str = "audit.jsonl";

impl AuditWriter {
    pub fn new(config: AuditWriterConfig) -> Result<Self> {
        fs::create_dir_all(&config.base_dir)?;
        Ok(Self {
            config,
            current: Mutex::new(None),
        })
    }

    fn active_path(&self) -> PathBuf {
        self.config.base_dir.join(ACTIVE_FILE)
    }

    /// Append one record, rotating first if the active file is over the
    /// size limit.
    pub fn write_record(&self, record: &AuditRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;

        let mut guard = self.current.lock();

        if let (Some(file), RotationPolicy::BySize(limit)) = (guard.as_ref(), self.config.rotation)
        {
            if file.bytes_written + line.len() as u64 + 1 > limit {
                self.rotate(&mut guard)?;
            }
        }

        if guard.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.active_path())?;
            let bytes_written = file.metadata()?.len();
            *guard = Some(AuditFile {
                writer: BufWriter::new(file),
                bytes_written,
            });
        }

        let file = guard.as_mut().expect("opened above");
        file.writer.write_all(line.as_bytes())?;
        file.writer.write_all(b"\n")?;
        file.bytes_written += line.len() as u64 + 1;

        if self.config.immediate_flush {
            file.writer.flush()?;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        if let Some(file) = self.current.lock().as_mut() {
            file.writer.flush()?;
        }
        Ok(())
    }

    /// Close the active file, move it aside (gzipped when configured) and
    /// prune rotated files past the retention count.
    fn rotate(&self, guard: &mut Option<AuditFile>) -> Result<()> {
        if let Some(mut file) = guard.take() {
            file.writer.flush()?;
        }

        let active = self.active_path();
        if !active.exists() {
            return Ok(());
        }

        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f");
        if self.config.compress_rotated {
            let rotated = self
                .config
                .base_dir
                .join(format!("audit-{}.jsonl.gz", stamp));
            compress_file(&active, &rotated)?;
            fs::remove_file(&active)?;
        } else {
            let rotated = self.config.base_dir.join(format!("audit-{}.jsonl", stamp));
            fs::rename(&active, rotated)?;
        }

        self.prune_rotated()?;
        Ok(())
    }

    fn prune_rotated(&self) -> Result<()> {
        let mut rotated: Vec<PathBuf> = fs::read_dir(&self.config.base_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("audit-"))
                    .unwrap_or(false)
            })
            .collect();

        if rotated.len() <= self.config.max_rotated_files {
            return Ok(());
        }

        // Timestamped names sort chronologically
        rotated.sort();
        let excess = rotated.len() - self.config.max_rotated_files;
        for path in rotated.into_iter().take(excess) {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn compress_file(src: &Path, dst: &Path) -> Result<()> {
    let mut input = File::open(src)?;
    let output = File::create(dst)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    let mut buf = Vec::new();
    input.read_to_end(&mut buf)?;
    encoder.write_all(&buf)?;
    encoder.finish()?;
    Ok(())
}
