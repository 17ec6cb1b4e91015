// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// allocator.rs:

//! Free-space strategy over the block table, tried in order:
//!
//! 1. best fit: the smallest free block that still holds the request,
//!    reused whole (no splitting, the block keeps its size and id);
//! 2. bump: a new block at the high watermark;
//! 3. coalescing: neighbouring free blocks are merged until one holds the
//!    request.
//!
//! Occupied data never moves.

use crate::block::{Block, BlockId, BlockTable};
use crate::heap::MemoryError;
use tracing::trace;

impl BlockTable {
    pub fn allocate(&mut self, size: usize, type_tag: &str) -> Result<BlockId, MemoryError> {
        if size == 0 {
            return Err(MemoryError::ZeroSize);
        }
        if size > self.capacity {
            return Err(self.out_of_memory(size));
        }

        if let Some(index) = self.best_fit(size) {
            trace!(size, index, "reusing free block");
            return Ok(self.occupy(index, type_tag));
        }
        if let Some(id) = self.bump(size, type_tag) {
            trace!(size, %id, "bump allocated");
            return Ok(id);
        }
        if let Some(index) = self.coalesce(size) {
            trace!(size, index, "coalesced free blocks");
            return Ok(self.occupy(index, type_tag));
        }
        Err(self.out_of_memory(size))
    }

    fn out_of_memory(&self, requested: usize) -> MemoryError {
        MemoryError::OutOfMemory {
            requested,
            capacity: self.capacity,
        }
    }

    fn best_fit(&self, size: usize) -> Option<usize> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| block.free && block.size >= size)
            .min_by_key(|(_, block)| block.size)
            .map(|(index, _)| index)
    }

    fn occupy(&mut self, index: usize, type_tag: &str) -> BlockId {
        let block = &mut self.blocks[index];
        block.free = false;
        block.type_tag = type_tag.trim().to_string();
        block.last_value = None;
        block.id
    }

    fn bump(&mut self, size: usize, type_tag: &str) -> Option<BlockId> {
        let end = self.watermark.checked_add(size)?;
        if end > self.capacity {
            return None;
        }
        let id = BlockId::new(self.next_id);
        self.blocks.push(Block {
            id,
            offset: self.watermark,
            size,
            free: false,
            type_tag: type_tag.trim().to_string(),
            last_value: None,
        });
        self.next_id += 1;
        self.watermark = end;
        Some(id)
    }

    /// Merges each free block with the free block following it in the table,
    /// as long as their ranges touch. Returns the index of the first merged
    /// block large enough for `size`. Merges that do not reach `size` are
    /// kept.
    fn coalesce(&mut self, size: usize) -> Option<usize> {
        let mut index = 0;
        while index + 1 < self.blocks.len() {
            let (first, second) = (&self.blocks[index], &self.blocks[index + 1]);
            if first.free && second.free && first.end() == second.offset {
                let absorbed = self.blocks.remove(index + 1);
                let merged = &mut self.blocks[index];
                merged.size += absorbed.size;
                if merged.size >= size {
                    return Some(index);
                }
                // the grown block may also touch the next one
                continue;
            }
            index += 1;
        }
        None
    }
}
