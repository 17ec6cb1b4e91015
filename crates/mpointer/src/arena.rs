// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// arena.rs:

use std::collections::TryReserveError;
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("range {start}..{end} outside arena of {capacity} bytes")]
pub struct OutOfBounds {
    pub start: usize,
    pub end: usize,
    pub capacity: usize,
}

#[derive(Debug, Error)]
pub enum ReserveError {
    #[error("an arena of {megabytes} MB does not fit in the address space")]
    Overflow { megabytes: usize },
    #[error("cannot reserve {capacity} bytes: {source}")]
    Alloc {
        capacity: usize,
        #[source]
        source: TryReserveError,
    },
}

/// The single fixed-size reservation all blocks are carved from. Blocks are
/// addressed by `(offset, size)` ranges, never by pointers.
pub struct Arena {
    data: Box<[u8]>,
}

impl Arena {
    pub const MEGABYTE: usize = 1024 * 1024;

    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
        }
    }

    /// Like [`Arena::new`], but reports a failed reservation instead of
    /// aborting.
    pub fn try_new(capacity: usize) -> Result<Self, ReserveError> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|source| ReserveError::Alloc { capacity, source })?;
        data.resize(capacity, 0);
        Ok(Self {
            data: data.into_boxed_slice(),
        })
    }

    pub fn with_megabytes(megabytes: usize) -> Result<Self, ReserveError> {
        let capacity = megabytes
            .checked_mul(Self::MEGABYTE)
            .ok_or(ReserveError::Overflow { megabytes })?;
        Self::try_new(capacity)
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    fn range(&self, offset: usize, len: usize) -> Result<Range<usize>, OutOfBounds> {
        let capacity = self.capacity();
        match offset.checked_add(len) {
            Some(end) if end <= capacity => Ok(offset..end),
            _ => Err(OutOfBounds {
                start: offset,
                end: offset.saturating_add(len),
                capacity,
            }),
        }
    }

    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8], OutOfBounds> {
        let range = self.range(offset, len)?;
        Ok(&self.data[range])
    }

    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), OutOfBounds> {
        let range = self.range(offset, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .finish()
    }
}
