//! Client side of a relay connection.
//!
//! A background task owns the read half and sorts incoming frames: relay
//! pushes go to an event channel, everything else to the response channel of
//! whichever request cycle currently holds the exchange lock.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lanchat_proto::{Command, Frame, FrameReader, FrameWriter, ProtocolError};

use crate::error::SessionError;

/// Something the relay did on its own initiative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Mandate(Command),
    /// The relay sent `DISCONNECTION_REQUEST`.
    DisconnectRequested,
    /// The stream ended or failed.
    Closed,
}

struct Exchange {
    writer: FrameWriter,
    responses: mpsc::UnboundedReceiver<Frame>,
}

pub struct Transport {
    exchange: Mutex<Exchange>,
    reader: JoinHandle<()>,
    released: AtomicBool,
    read_timeout: Duration,
}

impl Transport {
    pub async fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Event>), SessionError> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| SessionError::Timeout)?
            .map_err(|source| SessionError::Connect { addr, source })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        info!(addr = %addr, "Connected to relay");
        Ok(Self::from_stream(stream, read_timeout))
    }

    pub fn from_stream<S>(stream: S, read_timeout: Duration) -> (Self, mpsc::UnboundedReceiver<Event>)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (rd, wr) = tokio::io::split(stream);
        let (response_tx, responses) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        let reader = tokio::spawn(demux(FrameReader::new(rd), response_tx, event_tx));
        let transport = Self {
            exchange: Mutex::new(Exchange {
                writer: FrameWriter::new(wr),
                responses,
            }),
            reader,
            released: AtomicBool::new(false),
            read_timeout,
        };
        (transport, events)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Take the exchange lock for one request cycle.
    ///
    /// Responses left over from an abandoned earlier cycle are discarded.
    pub async fn exchange(&self) -> Result<ExchangeGuard<'_>, SessionError> {
        if self.is_released() {
            return Err(SessionError::Closed);
        }
        let mut inner = self.exchange.lock().await;
        while let Ok(stale) = inner.responses.try_recv() {
            debug!(frame = %stale.describe(), "Discarding stale response");
        }
        Ok(ExchangeGuard {
            inner,
            read_timeout: self.read_timeout,
        })
    }

    /// Stop the reader and shut down the write direction. Runs once; later
    /// calls return immediately.
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.reader.abort();
        let mut inner = self.exchange.lock().await;
        if let Err(e) = inner.writer.close().await {
            debug!(error = %e, "Stream already gone while closing");
        }
        inner.responses.close();
        info!("Connection released");
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// One request cycle's exclusive use of the connection.
pub struct ExchangeGuard<'a> {
    inner: MutexGuard<'a, Exchange>,
    read_timeout: Duration,
}

impl ExchangeGuard<'_> {
    pub async fn send_command(&mut self, cmd: Command) -> Result<(), SessionError> {
        Ok(self.inner.writer.send_command(cmd).await?)
    }

    pub async fn send_payload<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SessionError> {
        Ok(self.inner.writer.send_payload(value).await?)
    }

    /// Next response frame, bounded by the read timeout.
    pub async fn next_frame(&mut self) -> Result<Frame, SessionError> {
        tokio::time::timeout(self.read_timeout, self.inner.responses.recv())
            .await
            .map_err(|_| SessionError::Timeout)?
            .ok_or(SessionError::Disconnected)
    }

    pub async fn expect(&mut self, expected: Command) -> Result<(), SessionError> {
        match self.next_frame().await? {
            Frame::Command(cmd) if cmd == expected => Ok(()),
            other => Err(ProtocolError::UnexpectedFrame {
                expected: expected.to_string(),
                got: other.describe(),
            }
            .into()),
        }
    }

    pub async fn read_payload<T: DeserializeOwned>(&mut self) -> Result<T, SessionError> {
        Ok(self.next_frame().await?.decode()?)
    }
}

async fn demux(
    mut reader: FrameReader,
    responses: mpsc::UnboundedSender<Frame>,
    events: mpsc::UnboundedSender<Event>,
) {
    loop {
        let event = match reader.next_frame().await {
            Ok(Some(Frame::Command(cmd))) if cmd.is_mandate() => Event::Mandate(cmd),
            // A client never receives this as a reply.
            Ok(Some(Frame::Command(Command::DisconnectionRequest))) => Event::DisconnectRequested,
            Ok(Some(frame @ Frame::Unknown(_))) => {
                warn!(frame = %frame.describe(), "Ignoring unknown frame");
                continue;
            }
            Ok(Some(frame)) => {
                if responses.send(frame).is_err() {
                    break;
                }
                continue;
            }
            Ok(None) => {
                debug!("Relay closed the stream");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Read from relay failed");
                break;
            }
        };
        if events.send(event).is_err() {
            debug!("Event receiver gone");
        }
    }
    let _ = events.send(Event::Closed);
}
