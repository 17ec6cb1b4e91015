// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// service.rs:

use crate::arena::Arena;
use crate::block::BlockId;
use crate::codec::Value;
use crate::dump::{DumpWriter, Dumps, Snapshot};
use crate::heap::{Heap, MemoryError};
use crate::message::{
    CreateResponse, GetResponse, RefCountResponse, Request, Response, SetResponse,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// The five memory operations plus the sweep, serialised through one lock
/// around the [`Heap`]. Dumps are written after the lock is released, from a
/// snapshot taken while it was held.
#[derive(Debug, Clone)]
pub struct MemoryService {
    heap: Arc<Mutex<Heap>>,
    dumps: DumpWriter,
}

impl MemoryService {
    pub fn new(arena: Arena, dumps: Arc<dyn Dumps>) -> Self {
        Self {
            heap: Arc::new(Mutex::new(Heap::new(arena))),
            dumps: DumpWriter::new(dumps),
        }
    }

    // Heap methods validate before they mutate, so a panic cannot leave a
    // half-applied change behind the poisoned lock.
    fn lock(&self) -> MutexGuard<'_, Heap> {
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `op` under the lock and, if it succeeds, dumps the resulting state.
    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Heap) -> Result<T, MemoryError>,
    ) -> Result<T, MemoryError> {
        let (result, snapshot) = {
            let mut heap = self.lock();
            let result = op(&mut heap)?;
            (result, heap.snapshot())
        };
        self.dumps.write(&snapshot);
        Ok(result)
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn create(&self, size: u32, type_tag: &str) -> Result<BlockId, MemoryError> {
        let id = self.mutate(|heap| heap.create(size as usize, type_tag))?;
        debug!(%id, size, type_tag, "created");
        Ok(id)
    }

    pub fn set(&self, id: BlockId, value: &str) -> Result<(), MemoryError> {
        self.mutate(|heap| heap.set(id, value))?;
        debug!(%id, value, "set");
        Ok(())
    }

    pub fn get(&self, id: BlockId) -> Result<String, MemoryError> {
        self.lock().get(id)
    }

    pub fn increase_ref_count(&self, id: BlockId) -> Result<i64, MemoryError> {
        let count = self.lock().increase_ref(id)?;
        debug!(%id, count, "reference added");
        Ok(count)
    }

    pub fn decrease_ref_count(&self, id: BlockId) -> Result<i64, MemoryError> {
        let count = self.mutate(|heap| heap.decrease_ref(id))?;
        if count == 0 {
            debug!(%id, "last reference dropped, block freed");
        } else {
            debug!(%id, count, "reference dropped");
        }
        Ok(count)
    }

    /// Frees occupied blocks that have no live references, dumping the
    /// state once if anything was freed.
    pub fn sweep(&self) -> Vec<BlockId> {
        let (freed, snapshot) = {
            let mut heap = self.lock();
            let freed = heap.sweep();
            let snapshot = (!freed.is_empty()).then(|| heap.snapshot());
            (freed, snapshot)
        };
        if let Some(snapshot) = snapshot {
            info!(?freed, "sweep reclaimed unreferenced blocks");
            self.dumps.write(&snapshot);
        }
        freed
    }

    /// Value decoded from the arena bytes rather than the cached text.
    pub fn inspect(&self, id: BlockId) -> Result<Value, MemoryError> {
        self.lock().inspect(id)
    }

    pub fn ref_count(&self, id: BlockId) -> Option<i64> {
        self.lock().ref_count(id)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot()
    }

    pub fn handle(&self, request: Request) -> Response {
        match request {
            Request::Create(req) => {
                Response::Create(CreateResponse::from(self.create(req.size, &req.type_tag)))
            }
            Request::Set(req) => {
                Response::Set(SetResponse::from(self.set(req.id.into(), &req.value)))
            }
            Request::Get(req) => Response::Get(GetResponse::from(self.get(req.id.into()))),
            Request::IncreaseRefCount(req) => Response::IncreaseRefCount(RefCountResponse::from(
                self.increase_ref_count(req.id.into()),
            )),
            Request::DecreaseRefCount(req) => Response::DecreaseRefCount(RefCountResponse::from(
                self.decrease_ref_count(req.id.into()),
            )),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_heap<R>(&self, op: impl FnOnce(&mut Heap) -> R) -> R {
        op(&mut self.lock())
    }
}
