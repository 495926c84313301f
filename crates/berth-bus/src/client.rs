//! Bus client for embedding hosts and tests.
//!
//! One TCP connection; calls are correlated by id. Signal frames that arrive
//! while waiting for a reply are queued and handed out by [`BusClient::next_signal`].

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use berth_core::{BerthError, BusConfig, Result};
use serde_json::Value;
use tokio::net::TcpStream;
use tracing::debug;

use crate::protocol::{read_frame, write_frame, BusMessage};

/// A lifecycle signal observed on the connection.
#[derive(Debug, Clone)]
pub struct SignalEvent {
    pub path: String,
    pub interface: String,
    pub member: String,
    pub body: Value,
}

/// Client side of one bus connection.
pub struct BusClient {
    stream: TcpStream,
    pending_signals: VecDeque<SignalEvent>,
    next_id: u64,
}

impl BusClient {
    /// Connect to a broker.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = tokio::time::timeout(BusConfig::CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| BerthError::ConnectionClosed)??;

        Ok(Self {
            stream,
            pending_signals: VecDeque::new(),
            next_id: 1,
        })
    }

    /// Invoke `interface.method` on the object at `path`.
    ///
    /// Remote failures come back as [`BerthError::Bus`] carrying the named
    /// error domain and message.
    pub async fn call(
        &mut self,
        path: &str,
        interface: &str,
        method: &str,
        args: Value,
    ) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let call = BusMessage::Call {
            id,
            path: path.to_string(),
            interface: interface.to_string(),
            method: method.to_string(),
            args,
        };

        let (mut reader, mut writer) = self.stream.split();
        write_frame(&mut writer, &call).await?;

        loop {
            let Some(frame) = read_frame(&mut reader).await? else {
                return Err(BerthError::ConnectionClosed);
            };
            match frame {
                BusMessage::Reply {
                    id: reply_id,
                    result,
                } if reply_id == id => return Ok(result),
                BusMessage::Error {
                    id: reply_id,
                    name,
                    message,
                } if reply_id == id => return Err(BerthError::Bus { name, message }),
                BusMessage::Signal {
                    path,
                    interface,
                    member,
                    body,
                } => {
                    self.pending_signals.push_back(SignalEvent {
                        path,
                        interface,
                        member,
                        body,
                    });
                }
                other => {
                    return Err(BerthError::Protocol {
                        message: format!("unexpected frame while waiting for reply: {other:?}"),
                    })
                }
            }
        }
    }

    /// Next lifecycle signal, waiting up to `timeout` if none is queued.
    pub async fn next_signal(&mut self, timeout: Duration) -> Option<SignalEvent> {
        if let Some(signal) = self.pending_signals.pop_front() {
            return Some(signal);
        }

        let (mut reader, _writer) = self.stream.split();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let frame = tokio::time::timeout_at(deadline, read_frame(&mut reader))
                .await
                .ok()?
                .ok()??;
            match frame {
                BusMessage::Signal {
                    path,
                    interface,
                    member,
                    body,
                } => {
                    return Some(SignalEvent {
                        path,
                        interface,
                        member,
                        body,
                    });
                }
                other => debug!("ignoring non-signal frame while waiting for signals: {other:?}"),
            }
        }
    }
}
