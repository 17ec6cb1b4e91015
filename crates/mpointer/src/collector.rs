// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// collector.rs:

use crate::block::BlockId;
use crate::service::MemoryService;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

// R E F E R E N C E   C O U N T S

/// Live reference counts. An entry exists only for occupied blocks.
#[derive(Debug, Default)]
pub struct RefCounts {
    counts: HashMap<BlockId, i64>,
}

impl RefCounts {
    pub fn seed(&mut self, id: BlockId) {
        self.counts.insert(id, 1);
    }

    pub fn get(&self, id: BlockId) -> Option<i64> {
        self.counts.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn increase(&mut self, id: BlockId) -> i64 {
        let count = self.counts.entry(id).or_insert(0);
        *count += 1;
        *count
    }

    /// Returns the new count, clamped at zero. The entry is dropped once the
    /// count reaches zero; a missing entry counts as zero.
    pub fn decrease(&mut self, id: BlockId) -> i64 {
        match self.counts.get_mut(&id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                *count
            }
            _ => {
                self.counts.remove(&id);
                0
            }
        }
    }

    pub fn remove(&mut self, id: BlockId) {
        self.counts.remove(&id);
    }

    #[cfg(test)]
    pub(crate) fn force(&mut self, id: BlockId, count: i64) {
        self.counts.insert(id, count);
    }
}

// S W E E P E R

/// Background task running [`MemoryService::sweep`] on a fixed interval.
pub struct Sweeper {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// `interval` must be non-zero; [`Server`](crate::server::Server) checks
    /// it before serving.
    pub fn spawn(service: MemoryService, interval: Duration) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick fires immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        service.sweep();
                    }
                }
            }
            debug!("sweep task stopped");
        });
        Self {
            stop: Some(stop),
            handle,
        }
    }

    /// Signals the task and waits until it has exited; no sweep runs after
    /// this returns.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(err) = self.handle.await {
            warn!("sweep task failed: {err}");
        }
    }
}
