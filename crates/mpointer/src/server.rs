// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// server.rs:

use crate::arena::Arena;
use crate::collector::Sweeper;
use crate::config::ServerConfig;
use crate::dump::DirDumps;
use crate::message::{read_frame, write_frame, Request, Response, MAX_MESSAGE_SIZE};
use crate::service::MemoryService;
use anyhow::{Context, Result};
use bytes::BytesMut;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub struct Server {
    listener: TcpListener,
    service: MemoryService,
    sweep_interval: Duration,
}

impl Server {
    /// Reserves the arena, prepares the dump folder and binds the listener.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let dumps = DirDumps::create(&config.dump_folder)?;
        let arena = Arena::with_megabytes(config.memsize_mb)?;
        info!(
            capacity = arena.capacity(),
            dump_folder = %dumps.dir().display(),
            "arena reserved"
        );
        let service = MemoryService::new(arena, Arc::new(dumps));
        Self::with_service(config.address(), service, config.sweep_interval).await
    }

    pub async fn with_service(
        address: SocketAddr,
        service: MemoryService,
        sweep_interval: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(!sweep_interval.is_zero(), "sweep interval must be positive");
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("cannot listen on {address}"))?;
        Ok(Self {
            listener,
            service,
            sweep_interval,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn service(&self) -> &MemoryService {
        &self.service
    }

    /// Accepts connections until `shutdown` resolves. On return the sweep
    /// task has exited and no connection task is still running.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let Server {
            listener,
            service,
            sweep_interval,
        } = self;
        info!(address = %listener.local_addr()?, "memory service listening");

        let sweeper = Sweeper::spawn(service.clone(), sweep_interval);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted connection");
                        connections.spawn(handle_connection(stream, peer, service.clone()));
                    }
                    Err(err) => warn!("accept failed: {err}"),
                },
                Some(joined) = connections.join_next() => match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!("connection failed: {err:#}"),
                    Err(err) => warn!("connection task failed: {err}"),
                },
            }
        }

        info!("shutting down");
        drop(listener);
        sweeper.stop().await;
        connections.shutdown().await;
        drop(service);
        Ok(())
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    service: MemoryService,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let mut buffer = BytesMut::with_capacity(MAX_MESSAGE_SIZE);
    while let Some(request) = read_frame::<Request>(&mut stream, &mut buffer).await? {
        debug!(%peer, op = request.name(), "request");
        // dumps are written to disk, so operations run off the async workers
        let service = service.clone();
        let response: Response = tokio::task::spawn_blocking(move || service.handle(request))
            .await
            .context("request handler failed")?;
        write_frame(&mut stream, &response).await?;
    }
    debug!(%peer, "connection closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockId;
    use crate::dump::MemoryDumps;
    use crate::heap::MemoryError;
    use crate::message::{CreateRequest, CreateResponse, GetRequest, GetResponse, SetRequest};
    use std::net::Ipv4Addr;
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    async fn call(stream: &mut TcpStream, buffer: &mut BytesMut, request: Request) -> Response {
        write_frame(&mut *stream, &request).await.expect("send");
        read_frame(&mut *stream, buffer)
            .await
            .expect("receive")
            .expect("a response")
    }

    #[tokio::test]
    async fn test_serve_and_shutdown() -> Result<()> {
        let dumps = Arc::new(MemoryDumps::default());
        let service = MemoryService::new(Arena::new(1024), dumps.clone());
        let server = Server::with_service(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            service,
            Duration::from_millis(20),
        )
        .await?;
        let address = server.local_addr()?;
        let (stop, stopped) = oneshot::channel::<()>();
        let running = tokio::spawn(server.serve(async {
            let _ = stopped.await;
        }));

        let mut stream = TcpStream::connect(address).await?;
        let mut buffer = BytesMut::new();
        let created = call(
            &mut stream,
            &mut buffer,
            Request::Create(CreateRequest {
                size: 4,
                type_tag: "int".into(),
            }),
        )
        .await;
        let Response::Create(created) = created else {
            panic!("unexpected response {created:?}");
        };
        let id = created.into_result()??;
        assert_eq!(id, BlockId::new(1));

        call(
            &mut stream,
            &mut buffer,
            Request::Set(SetRequest {
                id: id.get(),
                value: "1234".into(),
            }),
        )
        .await;
        let got = call(&mut stream, &mut buffer, Request::Get(GetRequest { id: id.get() })).await;
        assert_eq!(
            got,
            Response::Get(GetResponse {
                value: "1234".into(),
                success: true,
                error: None
            })
        );

        let _ = stop.send(());
        running.await??;
        assert_eq!(dumps.len(), 2);
        // the listener is gone once serve has returned
        assert!(TcpStream::connect(address).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_bind_prepares_dump_folder() -> Result<()> {
        let tmp = TempDir::new()?;
        let config = ServerConfig {
            port: 0,
            memsize_mb: 1,
            dump_folder: tmp.path().join("dumps"),
            sweep_interval: Duration::from_millis(50),
        };
        let server = Server::bind(&config).await?;
        assert!(config.dump_folder.is_dir());
        assert_eq!(server.service().capacity(), Arena::MEGABYTE);

        let id = server.service().create(8, "double")?;
        server.service().set(id, "1.5")?;
        let files = std::fs::read_dir(&config.dump_folder)?.count();
        assert_eq!(files, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_frame_drops_only_that_connection() -> Result<()> {
        use tokio::io::AsyncWriteExt;

        let service = MemoryService::new(Arena::new(64), Arc::new(MemoryDumps::default()));
        let server = Server::with_service(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            service.clone(),
            Duration::from_secs(60),
        )
        .await?;
        let address = server.local_addr()?;
        let (stop, stopped) = oneshot::channel::<()>();
        let running = tokio::spawn(server.serve(async {
            let _ = stopped.await;
        }));

        let mut bad = TcpStream::connect(address).await?;
        bad.write_u32(3).await?;
        bad.write_all(&[0xff, 0xff, 0xff]).await?;

        let mut good = TcpStream::connect(address).await?;
        let mut buffer = BytesMut::new();
        let response = call(
            &mut good,
            &mut buffer,
            Request::Create(CreateRequest {
                size: 128,
                type_tag: "int".into(),
            }),
        )
        .await;
        assert_eq!(
            response,
            Response::Create(CreateResponse::from(Err(MemoryError::OutOfMemory {
                requested: 128,
                capacity: 64
            })))
        );

        let _ = stop.send(());
        running.await??;
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_sweep_interval_rejected() {
        let service = MemoryService::new(Arena::new(64), Arc::new(MemoryDumps::default()));
        let bound = Server::with_service(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            service,
            Duration::ZERO,
        )
        .await;
        let err = bound.err().expect("zero interval accepted");
        assert!(err.to_string().contains("sweep interval"), "{err:#}");
    }

    #[tokio::test]
    async fn test_oversized_arena_is_an_error() -> Result<()> {
        let tmp = TempDir::new()?;
        let config = ServerConfig {
            port: 0,
            memsize_mb: usize::MAX,
            dump_folder: tmp.path().join("dumps"),
            sweep_interval: Duration::from_secs(1),
        };
        assert!(Server::bind(&config).await.is_err());
        Ok(())
    }
}
