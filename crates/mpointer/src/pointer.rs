// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// pointer.rs:

use crate::block::BlockId;
use crate::client::ClientError;
use crate::codec::{encode, CodecError, Primitive, Value};
use crate::connection;
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, warn};

/// A counted reference to a remote block holding one `T`.
///
/// Every live handle owns one server-side reference. Copies go through
/// [`MPointer::try_clone`] or [`MPointer::assign`] since both talk to the
/// server and may fail.
pub struct MPointer<T: Primitive> {
    id: BlockId,
    _marker: PhantomData<T>,
}

impl<T: Primitive> MPointer<T> {
    /// Allocates a block wide enough for `T`.
    pub fn new() -> Result<Self, ClientError> {
        let id = connection::current()?.create(T::TAG.size() as u32, T::TAG.name())?;
        Ok(Self::bound(id))
    }

    /// Takes a new reference to an existing block.
    pub fn attach(id: BlockId) -> Result<Self, ClientError> {
        connection::current()?.increase_ref_count(id)?;
        Ok(Self::bound(id))
    }

    fn bound(id: BlockId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn try_clone(&self) -> Result<Self, ClientError> {
        Self::attach(self.id)
    }

    /// Points this handle at `other`'s block. Handles already sharing a
    /// block are left alone.
    pub fn assign(&mut self, other: &MPointer<T>) -> Result<(), ClientError> {
        if self.id == other.id {
            return Ok(());
        }
        let client = connection::current()?;
        client.increase_ref_count(other.id)?;
        let old = std::mem::replace(&mut self.id, other.id);
        release(old)?;
        Ok(())
    }

    pub fn address(&self) -> BlockId {
        self.id
    }

    pub fn access(&self) -> Reference<'_, T> {
        Reference { pointer: self }
    }

    pub fn read(&self) -> Result<T, ClientError> {
        self.access().read()
    }

    pub fn write(&self, value: T) -> Result<(), ClientError> {
        self.access().write(value)
    }
}

impl<T: Primitive> Drop for MPointer<T> {
    fn drop(&mut self) {
        if let Err(err) = release(self.id) {
            warn!(id = %self.id, "reference not released: {err}");
        }
    }
}

impl<T: Primitive> fmt::Debug for MPointer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MPointer<{}>({})", T::TAG, self.id)
    }
}

fn release(id: BlockId) -> Result<i64, ClientError> {
    match connection::current()?.decrease_ref_count(id) {
        Err(err) if err.is_unknown_or_free() => {
            debug!(%id, "already released: {err}");
            Ok(0)
        }
        result => result,
    }
}

// R E F E R E N C E

/// Read/write access to the value behind an [`MPointer`].
pub struct Reference<'a, T: Primitive> {
    pointer: &'a MPointer<T>,
}

impl<T: Primitive> Reference<'_, T> {
    pub fn read(&self) -> Result<T, ClientError> {
        let text = connection::current()?.get(self.pointer.id)?;
        let value = Value::parse(T::TAG, &text)?;
        T::from_value(value).ok_or(ClientError::Codec(CodecError::Malformed {
            tag: T::TAG,
            text,
        }))
    }

    pub fn write(&self, value: T) -> Result<(), ClientError> {
        let text = encode(&value.into_value());
        connection::current()?.set(self.pointer.id, &text)
    }
}
