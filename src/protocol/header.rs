use std::fmt;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};
use crate::protocol::wire::{self, HEADER_LEN};
use crate::protocol::OpCode;

/// The fixed 16-byte header every wire message starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgHeader {
    /// Total message size in bytes, including this header.
    pub message_length: i32,
    /// Identifier of this message.
    pub request_id: i32,
    /// RequestID of the message being responded to; zero on requests.
    pub response_to: i32,
    pub op_code: OpCode,
    /// Raw remainder of the frame (`message_length - 16` bytes) once
    /// `read_body` has run; kept verbatim so opaque forwarding is
    /// byte-identical.
    pub body: Bytes,
}

impl Default for MsgHeader {
    fn default() -> Self {
        Self {
            message_length: HEADER_LEN,
            request_id: 0,
            response_to: 0,
            op_code: OpCode::Unknown(0),
            body: Bytes::new(),
        }
    }
}

impl MsgHeader {
    /// Decode the four header fields. EOF on the very first byte is
    /// `EndOfStream`; a header cut short after that is `Truncated`.
    pub async fn read_from<R>(r: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let message_length = wire::read_i32(r).await?;
        let request_id = wire::read_i32(r).await.map_err(wire::mid_frame)?;
        let response_to = wire::read_i32(r).await.map_err(wire::mid_frame)?;
        let op_code = wire::read_i32(r).await.map_err(wire::mid_frame)?;

        if message_length < HEADER_LEN {
            return Err(Error::InvalidMessageLength(message_length));
        }

        Ok(Self {
            message_length,
            request_id,
            response_to,
            op_code: OpCode::from_i32(op_code),
            body: Bytes::new(),
        })
    }

    pub fn body_len(&self) -> usize {
        (self.message_length - HEADER_LEN) as usize
    }

    /// Read the raw body of the frame into the header.
    pub async fn read_body<R>(&mut self, r: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; self.body_len()];
        wire::read_full(r, &mut buf).await.map_err(wire::mid_frame)?;
        self.body = buf.into();
        Ok(())
    }

    /// Emit the four header fields as-is; the caller owns `message_length`.
    pub async fn write_to<W>(&self, w: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        wire::write_i32(w, self.message_length).await?;
        wire::write_i32(w, self.request_id).await?;
        wire::write_i32(w, self.response_to).await?;
        wire::write_i32(w, self.op_code.as_i32()).await?;
        Ok(())
    }
}

impl fmt::Display for MsgHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "opCode:{} ({}) msgLen:{} reqID:{} respID:{}",
            self.op_code,
            self.op_code.as_i32(),
            self.message_length,
            self.request_id,
            self.response_to,
        )
    }
}
