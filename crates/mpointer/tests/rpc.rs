// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// rpc.rs:

use mpointer::dump::MemoryDumps;
use mpointer::{
    connection, Arena, ClientError, MPointer, MemoryClient, MemoryError, MemoryService, Server,
};
use serial_test::serial;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::oneshot;

struct Running {
    address: SocketAddr,
    service: MemoryService,
    stop: oneshot::Sender<()>,
    thread: JoinHandle<()>,
}

impl Running {
    fn start(capacity: usize) -> Self {
        let service = MemoryService::new(Arena::new(capacity), Arc::new(MemoryDumps::default()));
        let (ready, address) = mpsc::channel();
        let (stop, stopped) = oneshot::channel::<()>();
        let served = service.clone();
        let thread = thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .expect("server runtime");
            runtime.block_on(async move {
                let server = Server::with_service(
                    SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
                    served,
                    Duration::from_millis(50),
                )
                .await
                .expect("bind");
                ready.send(server.local_addr().expect("address")).expect("ready");
                server
                    .serve(async {
                        let _ = stopped.await;
                    })
                    .await
                    .expect("serve");
            });
        });
        let address = address.recv().expect("server address");
        Self {
            address,
            service,
            stop,
            thread,
        }
    }

    fn stop(self) {
        let _ = self.stop.send(());
        self.thread.join().expect("server thread");
    }
}

#[test]
fn test_client_scenario() -> Result<(), ClientError> {
    let server = Running::start(1024);
    let client = MemoryClient::connect(&server.address.to_string())?;

    let id = client.create(4, "int")?;
    client.set(id, "1234")?;
    assert_eq!(client.get(id)?, "1234");
    assert_eq!(client.increase_ref_count(id)?, 2);
    assert_eq!(client.decrease_ref_count(id)?, 1);
    assert_eq!(client.decrease_ref_count(id)?, 0);
    let err = client.get(id).unwrap_err();
    assert!(err.is_unknown_or_free(), "{err}");

    let reused = client.create(4, "float")?;
    assert_eq!(reused, id);
    client.set(reused, "0.5")?;
    assert_eq!(server.service.inspect(reused)?, mpointer::Value::F32(0.5));

    server.stop();
    Ok(())
}

#[test]
fn test_out_of_memory_over_the_wire() -> Result<(), ClientError> {
    let server = Running::start(1024);
    let client = MemoryClient::connect(&server.address.to_string())?;
    assert!(matches!(
        client.create(2048, "int"),
        Err(ClientError::Remote(MemoryError::OutOfMemory {
            requested: 2048,
            capacity: 1024
        }))
    ));
    assert!(matches!(
        client.set(mpointer::BlockId::new(77), "1"),
        Err(ClientError::Remote(MemoryError::UnknownBlock(_)))
    ));
    server.stop();
    Ok(())
}

#[test]
fn test_clients_share_blocks() -> Result<(), ClientError> {
    let server = Running::start(4096);
    let address = server.address.to_string();
    let first = MemoryClient::connect(&address)?;
    let id = first.create(8, "long")?;
    first.set(id, "-42")?;

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let address = address.clone();
            thread::spawn(move || -> Result<(), ClientError> {
                let client = MemoryClient::connect(&address)?;
                for _ in 0..25 {
                    client.increase_ref_count(id)?;
                    assert_eq!(client.get(id)?, "-42");
                    client.decrease_ref_count(id)?;
                }
                Ok(())
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked")?;
    }
    assert_eq!(server.service.ref_count(id), Some(1));
    server.stop();
    Ok(())
}

#[test]
#[serial]
fn test_pointers_over_tcp() -> Result<(), ClientError> {
    let server = Running::start(1024);
    connection::init(&server.address.to_string())?;

    let a = MPointer::<i32>::new()?;
    let b = MPointer::<i32>::new()?;
    a.write(1234)?;
    b.write(12345)?;
    assert_eq!(a.read()?, 1234);
    assert_eq!(b.read()?, 12345);

    let ids = (a.address(), b.address());
    drop(a);
    drop(b);
    assert_eq!(server.service.ref_count(ids.0), None);
    assert_eq!(server.service.ref_count(ids.1), None);

    assert!(connection::shutdown());
    server.stop();
    Ok(())
}
