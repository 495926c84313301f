//! TCP bus server: accept loop, per-connection tasks, and broker wiring.
//!
//! Each connection task reads call frames, checks them against the export
//! route table, and forwards them to the manager over the shared call
//! channel; the reply comes back on a per-call oneshot. Lifecycle signals
//! fan out to every connection through the handle's broadcast channel.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use berth_core::{ApplicationStore, BerthError, BusConfig, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::handle::BusHandle;
use crate::manager::{BusCall, InstalledManager};
use crate::protocol::{read_frame, write_frame, BusMessage};

/// Handle to a running bus server. Dropping shuts down the server.
pub struct BusServerHandle {
    pub addr: SocketAddr,
    pub port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl BusServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and signal active ones to close.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
    }
}

impl Drop for BusServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Bus server that listens for client connections.
pub struct BusServer;

impl BusServer {
    /// Start listening on `host:port` (port 0 = auto-assign).
    pub async fn start(
        host: &str,
        port: u16,
        bus: BusHandle,
        calls: mpsc::UnboundedSender<BusCall>,
    ) -> Result<BusServerHandle> {
        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| BerthError::InvalidArgument {
                message: format!("invalid bind address {host}:{port}: {e}"),
            })?;
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        info!("bus server listening on {}", addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
        let active_connections = Arc::new(AtomicUsize::new(0));

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            bus,
            calls,
            shutdown_rx,
            conn_shutdown_rx,
            active_connections,
        ));

        Ok(BusServerHandle {
            addr,
            port: addr.port(),
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop(
        listener: TcpListener,
        bus: BusHandle,
        calls: mpsc::UnboundedSender<BusCall>,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
        active_connections: Arc<AtomicUsize>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("bus server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let current = active_connections.load(Ordering::Relaxed);
                            if current >= BusConfig::MAX_CONNECTIONS {
                                warn!(
                                    "rejecting bus connection from {}: at max capacity ({})",
                                    peer_addr,
                                    BusConfig::MAX_CONNECTIONS
                                );
                                continue;
                            }

                            active_connections.fetch_add(1, Ordering::Relaxed);
                            let bus = bus.clone();
                            let calls = calls.clone();
                            let conns = active_connections.clone();
                            let mut conn_shutdown = conn_shutdown_rx.clone();

                            tokio::spawn(async move {
                                debug!("bus connection from {}", peer_addr);
                                if let Err(e) =
                                    handle_connection(stream, bus, calls, &mut conn_shutdown).await
                                {
                                    debug!("bus connection {} ended: {}", peer_addr, e);
                                }
                                conns.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("bus accept error: {}", e);
                        }
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    bus: BusHandle,
    calls: mpsc::UnboundedSender<BusCall>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<()> {
    let mut signals = bus.subscribe();
    let (mut reader, mut writer) = stream.split();

    loop {
        let frame = tokio::select! {
            result = read_frame(&mut reader) => {
                match result? {
                    Some(f) => f,
                    None => return Ok(()), // clean disconnect
                }
            }
            signal = signals.recv() => {
                match signal {
                    Ok(message) => {
                        write_frame(&mut writer, &message).await?;
                        continue;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("connection lagged, dropped {} signal(s)", missed);
                        continue;
                    }
                    Err(RecvError::Closed) => return Ok(()),
                }
            }
            _ = shutdown_rx.changed() => {
                return Ok(()); // server shutting down
            }
        };

        let BusMessage::Call {
            id,
            path,
            interface,
            method,
            args,
        } = frame
        else {
            debug!("ignoring non-call frame from peer");
            continue;
        };

        // Route before dispatch: calls to unexported members never reach the
        // manager, they answer with a transport-level error.
        if let Err(e) = bus.resolve(&path, &interface, &method) {
            write_frame(&mut writer, &BusMessage::error(id, &e)).await?;
            continue;
        }

        let (responder, response) = oneshot::channel();
        let forwarded = calls.send(BusCall {
            id,
            path,
            interface,
            method,
            args,
            responder,
        });
        if forwarded.is_err() {
            write_frame(
                &mut writer,
                &BusMessage::error(id, &BerthError::ConnectionClosed),
            )
            .await?;
            continue;
        }

        match response.await {
            Ok(message) => write_frame(&mut writer, &message).await?,
            Err(_) => {
                write_frame(
                    &mut writer,
                    &BusMessage::error(id, &BerthError::ConnectionClosed),
                )
                .await?;
            }
        }
    }
}

/// Everything a running broker consists of.
pub struct BrokerHandle {
    pub server: BusServerHandle,
    pub bus: BusHandle,
    manager_task: tokio::task::JoinHandle<()>,
}

impl BrokerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.server.addr()
    }

    pub fn shutdown(&mut self) {
        self.server.shutdown();
        self.manager_task.abort();
    }
}

impl Drop for BrokerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Wire a store, manager, and server together and start serving.
pub async fn start_broker<S: ApplicationStore + Send + 'static>(
    store: S,
    host: &str,
    port: u16,
) -> Result<BrokerHandle> {
    let bus = BusHandle::new();
    let (call_tx, call_rx) = mpsc::unbounded_channel();

    let manager = InstalledManager::new(store, bus.clone());
    let manager_task = tokio::spawn(manager.run(call_rx));

    let server = BusServer::start(host, port, bus.clone(), call_tx).await?;

    Ok(BrokerHandle {
        server,
        bus,
        manager_task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::MemoryStore;

    #[tokio::test]
    async fn test_broker_starts_and_shuts_down() {
        let mut broker = start_broker(MemoryStore::new(), "127.0.0.1", 0)
            .await
            .unwrap();

        assert!(broker.addr().port() > 0);
        assert_eq!(broker.addr().ip(), std::net::Ipv4Addr::LOCALHOST);

        broker.shutdown();
    }

    #[tokio::test]
    async fn test_bind_to_bad_address_fails() {
        let result = start_broker(MemoryStore::new(), "not an address", 0).await;
        assert!(result.is_err());
    }
}
