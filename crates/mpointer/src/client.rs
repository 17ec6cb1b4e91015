// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// client.rs:

use crate::block::BlockId;
use crate::codec::CodecError;
use crate::heap::MemoryError;
use crate::message::{
    read_frame, write_frame, CreateRequest, FrameError, GetRequest, RefCountRequest, Request,
    Response, SetRequest, UnexplainedFailure,
};
use crate::service::MemoryService;
use bytes::BytesMut;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no memory service connection has been initialized")]
    NotInitialized,
    #[error("transport failure: {0}")]
    Transport(#[from] FrameError),
    #[error(transparent)]
    Remote(#[from] MemoryError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}

impl ClientError {
    pub fn is_unknown_or_free(&self) -> bool {
        matches!(self, ClientError::Remote(err) if err.is_unknown_or_free())
    }
}

// T R A N S P O R T

/// Carries one request to a memory service and returns its response.
pub trait Transport: Send + Sync {
    fn call(&self, request: Request) -> Result<Response, ClientError>;
}

/// In-process transport: the service answers directly.
impl Transport for MemoryService {
    fn call(&self, request: Request) -> Result<Response, ClientError> {
        Ok(self.handle(request))
    }
}

struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Connection {
    async fn open(address: &str) -> Result<Self, FrameError> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        debug!(address, "connected to memory service");
        Ok(Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
        })
    }

    async fn exchange(&mut self, request: &Request) -> Result<Response, FrameError> {
        write_frame(&mut self.stream, request).await?;
        read_frame(&mut self.stream, &mut self.buffer)
            .await?
            .ok_or(FrameError::Closed)
    }
}

/// Framed requests over TCP. Calls block the current thread; they must not
/// be made from inside an async runtime.
///
/// A stream that failed mid-exchange may hold half a frame, so it is
/// dropped and the next call dials again.
pub struct TcpTransport {
    runtime: Runtime,
    connection: Mutex<Option<Connection>>,
    address: String,
}

impl TcpTransport {
    pub fn connect(address: &str) -> Result<Self, ClientError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(FrameError::from)?;
        let connection = runtime.block_on(Connection::open(address))?;
        Ok(Self {
            runtime,
            connection: Mutex::new(Some(connection)),
            address: address.to_string(),
        })
    }
}

impl Transport for TcpTransport {
    fn call(&self, request: Request) -> Result<Response, ClientError> {
        let mut slot = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let response = self.runtime.block_on(async {
            let mut connection = match slot.take() {
                Some(connection) => connection,
                None => Connection::open(&self.address).await?,
            };
            let response = connection.exchange(&request).await?;
            *slot = Some(connection);
            Ok::<_, FrameError>(response)
        })?;
        Ok(response)
    }
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("address", &self.address)
            .finish()
    }
}

// C L I E N T

/// Typed front end to the five memory operations.
#[derive(Clone)]
pub struct MemoryClient {
    transport: Arc<dyn Transport>,
}

impl MemoryClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn connect(address: &str) -> Result<Self, ClientError> {
        Ok(Self::new(Arc::new(TcpTransport::connect(address)?)))
    }

    pub fn create(&self, size: u32, type_tag: &str) -> Result<BlockId, ClientError> {
        let request = Request::Create(CreateRequest {
            size,
            type_tag: type_tag.to_string(),
        });
        match self.transport.call(request)? {
            Response::Create(response) => settle("Create", response.into_result()),
            _ => Err(ClientError::UnexpectedResponse("Create")),
        }
    }

    pub fn set(&self, id: BlockId, value: &str) -> Result<(), ClientError> {
        let request = Request::Set(SetRequest {
            id: id.get(),
            value: value.to_string(),
        });
        match self.transport.call(request)? {
            Response::Set(response) => settle("Set", response.into_result()),
            _ => Err(ClientError::UnexpectedResponse("Set")),
        }
    }

    pub fn get(&self, id: BlockId) -> Result<String, ClientError> {
        let request = Request::Get(GetRequest { id: id.get() });
        match self.transport.call(request)? {
            Response::Get(response) => settle("Get", response.into_result()),
            _ => Err(ClientError::UnexpectedResponse("Get")),
        }
    }

    pub fn increase_ref_count(&self, id: BlockId) -> Result<i64, ClientError> {
        let request = Request::IncreaseRefCount(RefCountRequest { id: id.get() });
        match self.transport.call(request)? {
            Response::IncreaseRefCount(response) => {
                settle("IncreaseRefCount", response.into_result())
            }
            _ => Err(ClientError::UnexpectedResponse("IncreaseRefCount")),
        }
    }

    pub fn decrease_ref_count(&self, id: BlockId) -> Result<i64, ClientError> {
        let request = Request::DecreaseRefCount(RefCountRequest { id: id.get() });
        match self.transport.call(request)? {
            Response::DecreaseRefCount(response) => {
                settle("DecreaseRefCount", response.into_result())
            }
            _ => Err(ClientError::UnexpectedResponse("DecreaseRefCount")),
        }
    }
}

fn settle<T>(
    operation: &'static str,
    outcome: Result<Result<T, MemoryError>, UnexplainedFailure>,
) -> Result<T, ClientError> {
    match outcome {
        Ok(result) => Ok(result?),
        Err(UnexplainedFailure) => Err(ClientError::UnexpectedResponse(operation)),
    }
}

impl fmt::Debug for MemoryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryClient").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::dump::NoDumps;
    use crate::message::SetResponse;
    use std::io::{Read, Write};
    use std::thread;

    fn client() -> MemoryClient {
        let service = MemoryService::new(Arena::new(1024), Arc::new(NoDumps));
        MemoryClient::new(Arc::new(service))
    }

    #[test]
    fn test_in_process_round_trip() -> Result<(), ClientError> {
        let client = client();
        let id = client.create(8, "double")?;
        client.set(id, "0.125")?;
        assert_eq!(client.get(id)?, "0.125");
        assert_eq!(client.increase_ref_count(id)?, 2);
        assert_eq!(client.decrease_ref_count(id)?, 1);
        assert_eq!(client.decrease_ref_count(id)?, 0);
        assert!(client.get(id).unwrap_err().is_unknown_or_free());
        Ok(())
    }

    #[test]
    fn test_remote_errors_surface() {
        let client = client();
        assert!(matches!(
            client.create(4096, "int"),
            Err(ClientError::Remote(MemoryError::OutOfMemory { .. }))
        ));
        assert!(matches!(
            client.set(BlockId::new(5), "1"),
            Err(ClientError::Remote(MemoryError::UnknownBlock(_)))
        ));
    }

    struct Confused;

    impl Transport for Confused {
        fn call(&self, _request: Request) -> Result<Response, ClientError> {
            Ok(Response::Set(SetResponse::from(Ok(()))))
        }
    }

    #[test]
    fn test_mismatched_response() {
        let client = MemoryClient::new(Arc::new(Confused));
        assert!(matches!(
            client.get(BlockId::new(1)),
            Err(ClientError::UnexpectedResponse("Get"))
        ));
    }

    #[test]
    fn test_connect_refused() {
        // port 1 on loopback is not listening in test environments
        assert!(matches!(
            MemoryClient::connect("127.0.0.1:1"),
            Err(ClientError::Transport(FrameError::Io(_)))
        ));
    }

    fn read_request(stream: &mut std::net::TcpStream) -> anyhow::Result<Request> {
        let mut size = [0u8; 4];
        stream.read_exact(&mut size)?;
        let mut body = vec![0u8; u32::from_be_bytes(size) as usize];
        stream.read_exact(&mut body)?;
        Ok(postcard::from_bytes(&body)?)
    }

    #[test]
    fn test_redials_after_broken_frame() -> anyhow::Result<()> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let address = listener.local_addr()?.to_string();
        let peer = thread::spawn(move || -> anyhow::Result<()> {
            // first connection answers with garbage, then hangs up
            let (mut first, _) = listener.accept()?;
            read_request(&mut first)?;
            first.write_all(&[0, 0, 0, 3, 0xff, 0xff, 0xff])?;
            drop(first);

            let (mut second, _) = listener.accept()?;
            read_request(&mut second)?;
            let body = postcard::to_stdvec(&Response::Set(SetResponse::from(Ok(()))))?;
            second.write_all(&(body.len() as u32).to_be_bytes())?;
            second.write_all(&body)?;
            Ok(())
        });

        let client = MemoryClient::connect(&address)?;
        assert!(matches!(
            client.set(BlockId::new(1), "1"),
            Err(ClientError::Transport(FrameError::Encoding(_)))
        ));
        client.set(BlockId::new(1), "1")?;
        peer.join().expect("peer thread panicked")?;
        Ok(())
    }
}
