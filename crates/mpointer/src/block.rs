// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// block.rs:

use crate::heap::MemoryError;
use serde::{Deserialize, Serialize};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(u64);

impl BlockId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for BlockId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<BlockId> for u64 {
    fn from(id: BlockId) -> Self {
        id.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// B L O C K

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,
    pub offset: usize,
    pub size: usize,
    pub free: bool,
    pub type_tag: String,
    /// Canonical text of the last value written, `None` until the first Set.
    pub last_value: Option<String>,
}

impl Block {
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }
}

// B L O C K   T A B L E

/// Blocks in table order. Blocks are appended at the high watermark and
/// merges only join neighbours, so table order is also offset order and ids
/// are strictly increasing along the table.
#[derive(Debug)]
pub struct BlockTable {
    pub(crate) blocks: Vec<Block>,
    pub(crate) next_id: u64,
    pub(crate) watermark: usize,
    pub(crate) capacity: usize,
}

impl BlockTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: Vec::new(),
            next_id: 1,
            watermark: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn watermark(&self) -> usize {
        self.watermark
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// Sum of the sizes of occupied blocks.
    pub fn used(&self) -> usize {
        self.blocks
            .iter()
            .filter(|block| !block.free)
            .map(|block| block.size)
            .sum()
    }

    fn position(&self, id: BlockId) -> Option<usize> {
        self.blocks.binary_search_by_key(&id, |block| block.id).ok()
    }

    /// Any block with this id, free or not.
    pub fn lookup(&self, id: BlockId) -> Option<&Block> {
        self.position(id).map(|index| &self.blocks[index])
    }

    pub fn occupied(&self, id: BlockId) -> Result<&Block, MemoryError> {
        match self.lookup(id) {
            Some(block) if !block.free => Ok(block),
            Some(_) => Err(MemoryError::FreeBlock(id)),
            None => Err(MemoryError::UnknownBlock(id)),
        }
    }

    pub fn occupied_mut(&mut self, id: BlockId) -> Result<&mut Block, MemoryError> {
        let index = self.position(id).ok_or(MemoryError::UnknownBlock(id))?;
        let block = &mut self.blocks[index];
        if block.free {
            Err(MemoryError::FreeBlock(id))
        } else {
            Ok(block)
        }
    }

    /// Marks an occupied block free. The range stays in the table for reuse.
    pub fn release(&mut self, id: BlockId) -> Result<(), MemoryError> {
        let block = self.occupied_mut(id)?;
        block.free = true;
        block.last_value = None;
        Ok(())
    }
}
