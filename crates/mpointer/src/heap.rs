// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// heap.rs:

use crate::arena::{Arena, OutOfBounds};
use crate::block::{BlockId, BlockTable};
use crate::codec::{encode, CodecError, TypeTag, Value};
use crate::collector::RefCounts;
use crate::dump::{BlockRow, Snapshot};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum MemoryError {
    #[error("out of memory: {requested} bytes requested, arena holds {capacity}")]
    OutOfMemory { requested: usize, capacity: usize },
    #[error("block {0} does not exist")]
    UnknownBlock(BlockId),
    #[error("block {0} is free")]
    FreeBlock(BlockId),
    #[error("unsupported type `{0}`")]
    UnsupportedType(String),
    #[error("`{text}` is not a valid {tag}")]
    MalformedValue { tag: TypeTag, text: String },
    #[error("{tag} needs {needed} bytes but block {id} holds {size}")]
    ValueTooLarge {
        id: BlockId,
        tag: TypeTag,
        needed: usize,
        size: usize,
    },
    #[error("block {0} has never been written")]
    Uninitialized(BlockId),
    #[error("zero-sized allocation")]
    ZeroSize,
    #[error("arena corrupted: {0}")]
    Corrupted(String),
}

impl MemoryError {
    /// The id names no occupied block: never allocated, or freed since.
    pub fn is_unknown_or_free(&self) -> bool {
        matches!(self, MemoryError::UnknownBlock(_) | MemoryError::FreeBlock(_))
    }
}

impl From<CodecError> for MemoryError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnsupportedType(tag) => MemoryError::UnsupportedType(tag),
            CodecError::Malformed { tag, text } => MemoryError::MalformedValue { tag, text },
            err @ CodecError::ShortBuffer { .. } => MemoryError::Corrupted(err.to_string()),
        }
    }
}

impl From<OutOfBounds> for MemoryError {
    fn from(err: OutOfBounds) -> Self {
        MemoryError::Corrupted(err.to_string())
    }
}

// H E A P

/// Arena, block table and reference counts. Every mutation of one of them
/// goes through this type, and callers hold it behind a single lock.
#[derive(Debug)]
pub struct Heap {
    pub(crate) arena: Arena,
    pub(crate) blocks: BlockTable,
    pub(crate) refs: RefCounts,
    last_stamp: i64,
}

impl Heap {
    pub fn new(arena: Arena) -> Self {
        let blocks = BlockTable::new(arena.capacity());
        Self {
            arena,
            blocks,
            refs: RefCounts::default(),
            last_stamp: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    pub fn blocks(&self) -> &BlockTable {
        &self.blocks
    }

    pub fn ref_count(&self, id: BlockId) -> Option<i64> {
        self.refs.get(id)
    }

    pub fn create(&mut self, size: usize, type_tag: &str) -> Result<BlockId, MemoryError> {
        let id = self.blocks.allocate(size, type_tag)?;
        self.refs.seed(id);
        Ok(id)
    }

    pub fn set(&mut self, id: BlockId, text: &str) -> Result<(), MemoryError> {
        let block = self.blocks.occupied(id)?;
        let tag: TypeTag = block.type_tag.parse()?;
        let value = Value::parse(tag, text)?;
        let bytes = value.to_le_bytes();
        if bytes.len() > block.size {
            return Err(MemoryError::ValueTooLarge {
                id,
                tag,
                needed: bytes.len(),
                size: block.size,
            });
        }
        let offset = block.offset;
        self.arena.write(offset, &bytes)?;
        self.blocks.occupied_mut(id)?.last_value = Some(encode(&value));
        Ok(())
    }

    pub fn get(&self, id: BlockId) -> Result<String, MemoryError> {
        self.blocks
            .occupied(id)?
            .last_value
            .clone()
            .ok_or(MemoryError::Uninitialized(id))
    }

    /// Decodes the value straight from the arena bytes of the block.
    pub fn inspect(&self, id: BlockId) -> Result<Value, MemoryError> {
        let block = self.blocks.occupied(id)?;
        if block.last_value.is_none() {
            return Err(MemoryError::Uninitialized(id));
        }
        let tag: TypeTag = block.type_tag.parse()?;
        let bytes = self.arena.slice(block.offset, block.size)?;
        Ok(Value::from_le_bytes(tag, bytes)?)
    }

    pub fn increase_ref(&mut self, id: BlockId) -> Result<i64, MemoryError> {
        self.blocks.occupied(id)?;
        Ok(self.refs.increase(id))
    }

    /// Decrements the count; at zero the block is freed and its entry
    /// removed. The returned count is never negative.
    pub fn decrease_ref(&mut self, id: BlockId) -> Result<i64, MemoryError> {
        self.blocks.occupied(id)?;
        let count = self.refs.decrease(id);
        if count == 0 {
            self.blocks.release(id)?;
        }
        Ok(count)
    }

    /// Frees every occupied block without a positive reference count.
    pub fn sweep(&mut self) -> Vec<BlockId> {
        let orphans: Vec<BlockId> = self
            .blocks
            .iter()
            .filter(|block| !block.free)
            .filter(|block| self.refs.get(block.id).map_or(true, |count| count <= 0))
            .map(|block| block.id)
            .collect();
        for &id in &orphans {
            self.refs.remove(id);
            // ids were just read from the table as occupied
            let _ = self.blocks.release(id);
        }
        orphans
    }

    /// Captures the current state for the dump writer. Stamps strictly
    /// increase, so records sort in the order the states occurred.
    pub fn snapshot(&mut self) -> Snapshot {
        let taken_at = Utc::now();
        let stamp = taken_at.timestamp_millis().max(self.last_stamp + 1);
        self.last_stamp = stamp;
        Snapshot {
            stamp,
            taken_at,
            capacity: self.capacity(),
            used: self.blocks.used(),
            blocks: self
                .blocks
                .iter()
                .map(|block| BlockRow {
                    id: block.id,
                    offset: block.offset,
                    size: block.size,
                    free: block.free,
                    type_tag: block.type_tag.clone(),
                    value: block.last_value.clone(),
                    refs: if block.free {
                        0
                    } else {
                        self.refs.get(block.id).unwrap_or(0)
                    },
                })
                .collect(),
        }
    }
}
