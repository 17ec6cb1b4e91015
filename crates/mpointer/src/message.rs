// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// message.rs:

//! Request/response pairs of the memory protocol and their framing: a
//! big-endian `u32` length followed by a postcard payload.

use crate::block::BlockId;
use crate::heap::MemoryError;
use bytes::BytesMut;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed frame: {0}")]
    Encoding(#[from] postcard::Error),
    #[error("frame of {size} bytes exceeds the maximum of {max}")]
    TooLarge { size: usize, max: usize },
    #[error("connection closed after {got} of {expected} bytes")]
    Truncated { expected: usize, got: usize },
    #[error("connection closed")]
    Closed,
}

// R E Q U E S T S

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub size: u32,
    pub type_tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRequest {
    pub id: u64,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetRequest {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefCountRequest {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Create(CreateRequest),
    Set(SetRequest),
    Get(GetRequest),
    IncreaseRefCount(RefCountRequest),
    DecreaseRefCount(RefCountRequest),
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Create(_) => "Create",
            Request::Set(_) => "Set",
            Request::Get(_) => "Get",
            Request::IncreaseRefCount(_) => "IncreaseRefCount",
            Request::DecreaseRefCount(_) => "DecreaseRefCount",
        }
    }
}

// R E S P O N S E S

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateResponse {
    pub id: u64,
    pub success: bool,
    pub error: Option<MemoryError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetResponse {
    pub success: bool,
    pub error: Option<MemoryError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetResponse {
    pub value: String,
    pub success: bool,
    pub error: Option<MemoryError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefCountResponse {
    pub count: i64,
    pub success: bool,
    pub error: Option<MemoryError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Create(CreateResponse),
    Set(SetResponse),
    Get(GetResponse),
    IncreaseRefCount(RefCountResponse),
    DecreaseRefCount(RefCountResponse),
}

/// A response that reports failure without saying why.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("server reported failure without an error")]
pub struct UnexplainedFailure;

fn outcome<T>(
    success: bool,
    error: Option<MemoryError>,
    payload: T,
) -> Result<Result<T, MemoryError>, UnexplainedFailure> {
    match (success, error) {
        (true, _) => Ok(Ok(payload)),
        (false, Some(error)) => Ok(Err(error)),
        (false, None) => Err(UnexplainedFailure),
    }
}

impl From<Result<BlockId, MemoryError>> for CreateResponse {
    fn from(result: Result<BlockId, MemoryError>) -> Self {
        match result {
            Ok(id) => Self {
                id: id.get(),
                success: true,
                error: None,
            },
            Err(error) => Self {
                id: 0,
                success: false,
                error: Some(error),
            },
        }
    }
}

impl CreateResponse {
    pub fn into_result(self) -> Result<Result<BlockId, MemoryError>, UnexplainedFailure> {
        outcome(self.success, self.error, BlockId::new(self.id))
    }
}

impl From<Result<(), MemoryError>> for SetResponse {
    fn from(result: Result<(), MemoryError>) -> Self {
        Self {
            success: result.is_ok(),
            error: result.err(),
        }
    }
}

impl SetResponse {
    pub fn into_result(self) -> Result<Result<(), MemoryError>, UnexplainedFailure> {
        outcome(self.success, self.error, ())
    }
}

impl From<Result<String, MemoryError>> for GetResponse {
    fn from(result: Result<String, MemoryError>) -> Self {
        match result {
            Ok(value) => Self {
                value,
                success: true,
                error: None,
            },
            Err(error) => Self {
                value: String::new(),
                success: false,
                error: Some(error),
            },
        }
    }
}

impl GetResponse {
    pub fn into_result(self) -> Result<Result<String, MemoryError>, UnexplainedFailure> {
        outcome(self.success, self.error, self.value)
    }
}

impl From<Result<i64, MemoryError>> for RefCountResponse {
    fn from(result: Result<i64, MemoryError>) -> Self {
        match result {
            Ok(count) => Self {
                count,
                success: true,
                error: None,
            },
            Err(error) => Self {
                count: 0,
                success: false,
                error: Some(error),
            },
        }
    }
}

impl RefCountResponse {
    pub fn into_result(self) -> Result<Result<i64, MemoryError>, UnexplainedFailure> {
        outcome(self.success, self.error, self.count)
    }
}

// F R A M E S

/// Reads one frame. `Ok(None)` means the peer closed the stream cleanly
/// between frames.
pub async fn read_frame<T>(
    mut reader: impl AsyncRead + Unpin,
    buffer: &mut BytesMut,
) -> Result<Option<T>, FrameError>
where
    T: DeserializeOwned,
{
    let size = match reader.read_u32().await {
        Ok(size) => size as usize,
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if size > MAX_MESSAGE_SIZE {
        return Err(FrameError::TooLarge {
            size,
            max: MAX_MESSAGE_SIZE,
        });
    }
    buffer.clear();
    buffer.reserve(size);
    let mut reader = reader.take(size as u64);
    while buffer.len() < size {
        if reader.read_buf(buffer).await? == 0 {
            return Err(FrameError::Truncated {
                expected: size,
                got: buffer.len(),
            });
        }
    }
    let frame = buffer.split_to(size).freeze();
    Ok(Some(postcard::from_bytes(&frame)?))
}

pub async fn write_frame<T>(mut writer: impl AsyncWrite + Unpin, message: &T) -> Result<(), FrameError>
where
    T: Serialize,
{
    let payload = postcard::to_stdvec(message)?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(FrameError::TooLarge {
            size: payload.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}
