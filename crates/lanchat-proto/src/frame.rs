//! Line framing over a byte stream.
//!
//! One line is one frame: either a catalog tag or one JSON value. Reader and
//! writer halves are boxed so TCP halves and in-memory duplex pipes share
//! one type.

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use crate::command::Command;
use crate::error::ProtocolError;

/// Default upper bound for a single line.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// A classified line read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Command(Command),
    /// Raw JSON text, decoded on demand.
    Payload(String),
    /// Neither a known tag nor JSON.
    Unknown(String),
}

impl Frame {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if let Ok(cmd) = line.parse::<Command>() {
            return Self::Command(cmd);
        }
        if serde_json::from_str::<IgnoredAny>(line).is_ok() {
            return Self::Payload(line.to_string());
        }
        Self::Unknown(line.to_string())
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        match self {
            Self::Payload(raw) => Ok(serde_json::from_str(raw)?),
            other => Err(ProtocolError::UnexpectedFrame {
                expected: "payload".to_string(),
                got: other.describe(),
            }),
        }
    }

    /// Short label for logs and errors. Payload bodies are not echoed.
    pub fn describe(&self) -> String {
        match self {
            Self::Command(cmd) => cmd.to_string(),
            Self::Payload(_) => "payload".to_string(),
            Self::Unknown(line) => {
                let head: String = line.chars().take(32).collect();
                format!("unknown frame {head:?}")
            }
        }
    }
}

/// Read half of a framed connection.
pub struct FrameReader {
    inner: FramedRead<BoxedRead, LinesCodec>,
}

impl FrameReader {
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::with_max_length(reader, MAX_FRAME_BYTES)
    }

    pub fn with_max_length<R>(reader: R, max_frame_bytes: usize) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let boxed: BoxedRead = Box::new(reader);
        Self {
            inner: FramedRead::new(boxed, LinesCodec::new_with_max_length(max_frame_bytes)),
        }
    }

    /// Next frame, or `None` once the peer closed the stream.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        match self.inner.next().await {
            Some(Ok(line)) => Ok(Some(Frame::parse(&line))),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Next frame, treating end of stream as an error.
    pub async fn read_frame(&mut self) -> Result<Frame, ProtocolError> {
        self.next_frame().await?.ok_or(ProtocolError::Closed)
    }

    pub async fn expect_command(&mut self, expected: Command) -> Result<(), ProtocolError> {
        match self.read_frame().await? {
            Frame::Command(cmd) if cmd == expected => Ok(()),
            other => Err(ProtocolError::UnexpectedFrame {
                expected: expected.to_string(),
                got: other.describe(),
            }),
        }
    }

    pub async fn read_payload<T: DeserializeOwned>(&mut self) -> Result<T, ProtocolError> {
        self.read_frame().await?.decode()
    }
}

/// Write half of a framed connection.
pub struct FrameWriter {
    inner: FramedWrite<BoxedWrite, LinesCodec>,
}

impl FrameWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let boxed: BoxedWrite = Box::new(writer);
        Self {
            inner: FramedWrite::new(boxed, LinesCodec::new_with_max_length(MAX_FRAME_BYTES)),
        }
    }

    pub async fn send_command(&mut self, cmd: Command) -> Result<(), ProtocolError> {
        self.inner.send(cmd.as_str()).await?;
        Ok(())
    }

    /// Serialize `value` as a single JSON line. `serde_json` escapes embedded
    /// newlines, so one value always occupies exactly one line.
    pub async fn send_payload<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<(), ProtocolError> {
        let line = serde_json::to_string(value)?;
        self.inner.send(line).await?;
        Ok(())
    }

    /// Flush and shut down the write direction.
    pub async fn close(&mut self) -> Result<(), ProtocolError> {
        SinkExt::<String>::close(&mut self.inner).await?;
        Ok(())
    }
}
