// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// dump.rs:

use crate::block::BlockId;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct BlockRow {
    pub id: BlockId,
    pub offset: usize,
    pub size: usize,
    pub free: bool,
    pub type_tag: String,
    pub value: Option<String>,
    pub refs: i64,
}

/// Arena utilisation and every block at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Milliseconds since the epoch, strictly increasing per heap.
    pub stamp: i64,
    pub taken_at: DateTime<Utc>,
    pub capacity: usize,
    pub used: usize,
    pub blocks: Vec<BlockRow>,
}

impl Snapshot {
    pub fn percent_used(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.used as f64 * 100.0 / self.capacity as f64
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "memory dump {}",
            self.taken_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        )?;
        writeln!(f, "capacity: {} bytes", self.capacity)?;
        writeln!(f, "used:     {} bytes ({:.2}%)", self.used, self.percent_used())?;
        writeln!(f, "blocks:   {}", self.blocks.len())?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>8}  {:>12}  {:>10}  {:<8}  {:<10}  {:<24}  {:>6}",
            "id", "offset", "size", "status", "type", "value", "refs"
        )?;
        for row in &self.blocks {
            writeln!(
                f,
                "{:>8}  {:>12}  {:>10}  {:<8}  {:<10}  {:<24}  {:>6}",
                row.id,
                row.offset,
                row.size,
                if row.free { "free" } else { "occupied" },
                row.type_tag,
                if row.free {
                    ""
                } else {
                    row.value.as_deref().unwrap_or("")
                },
                row.refs
            )?;
        }
        Ok(())
    }
}

// D U M P S

pub trait Dumps: Send + Sync {
    fn record(&self, snapshot: &Snapshot) -> Result<()>;
}

/// One text file per snapshot, named `<stamp>.txt`.
#[derive(Debug)]
pub struct DirDumps {
    dir: PathBuf,
}

impl DirDumps {
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("cannot create dump folder {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, snapshot: &Snapshot) -> PathBuf {
        self.dir.join(format!("{}.txt", snapshot.stamp))
    }
}

impl Dumps for DirDumps {
    fn record(&self, snapshot: &Snapshot) -> Result<()> {
        let path = self.path(snapshot);
        std::fs::write(&path, snapshot.to_string())
            .with_context(|| format!("cannot write dump {}", path.display()))
    }
}

/// Keeps snapshots in memory.
#[derive(Debug, Default)]
pub struct MemoryDumps {
    records: Mutex<Vec<Snapshot>>,
}

impl MemoryDumps {
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<Snapshot> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn records(&self) -> Vec<Snapshot> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Dumps for MemoryDumps {
    fn record(&self, snapshot: &Snapshot) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(snapshot.clone());
        Ok(())
    }
}

/// Discards snapshots.
#[derive(Debug, Default)]
pub struct NoDumps;

impl Dumps for NoDumps {
    fn record(&self, _snapshot: &Snapshot) -> Result<()> {
        Ok(())
    }
}

// W R I T E R

#[derive(Clone)]
pub struct DumpWriter {
    sink: Arc<dyn Dumps>,
}

impl DumpWriter {
    pub fn new(sink: Arc<dyn Dumps>) -> Self {
        Self { sink }
    }

    /// Records the snapshot; failures are logged and never reach the caller.
    pub fn write(&self, snapshot: &Snapshot) {
        if let Err(err) = self.sink.record(snapshot) {
            warn!(stamp = snapshot.stamp, "dump not written: {err:#}");
        }
    }
}

impl fmt::Debug for DumpWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DumpWriter").finish_non_exhaustive()
    }
}
