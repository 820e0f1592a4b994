use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::protocol::wire::{self, HEADER_LEN};
use crate::protocol::{Document, MsgHeader, OpCode};

/// OP_REPLY: the server's response to an OP_QUERY or OP_GET_MORE.
#[derive(Debug, Clone, PartialEq)]
pub struct OpReply {
    pub header: MsgHeader,
    /// Bit vector of response options.
    pub response_flags: i32,
    /// Cursor id for follow-up get more's; zero when exhausted.
    pub cursor_id: i64,
    /// Position in the cursor this reply starts from.
    pub starting_from: i32,
    pub number_returned: i32,
    pub documents: Vec<Document>,
}

impl OpReply {
    /// Parse an OP_REPLY body; reads exactly `number_returned` documents.
    pub async fn read_from<R>(header: MsgHeader, r: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let response_flags = wire::read_i32(r).await?;
        let cursor_id = wire::read_i64(r).await?;
        let starting_from = wire::read_i32(r).await?;
        let number_returned = wire::read_i32(r).await?;

        let mut documents = Vec::new();
        for _ in 0..number_returned {
            documents.push(wire::read_document(r).await?);
        }

        Ok(Self {
            header,
            response_flags,
            cursor_id,
            starting_from,
            number_returned,
            documents,
        })
    }

    /// A reply frame for `request`: `response_to` is the request's id,
    /// `request_id` is chosen by the synthesizing stage.
    pub fn reply_to(request: &MsgHeader, request_id: i32) -> Self {
        Self {
            header: MsgHeader {
                message_length: HEADER_LEN,
                request_id,
                response_to: request.request_id,
                op_code: OpCode::Reply,
                body: Bytes::new(),
            },
            response_flags: 0,
            cursor_id: 0,
            starting_from: 0,
            number_returned: 0,
            documents: Vec::new(),
        }
    }

    /// Serialize `value` to BSON and append it, keeping `number_returned`
    /// consistent with the document count.
    pub fn push_document<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let raw = bson::to_vec(value)?;
        self.documents.push(Document::from_bytes(raw));
        self.number_returned = self.documents.len() as i32;
        Ok(())
    }

    fn body_len(&self) -> usize {
        4 + 8 + 4 + 4 + self.documents.iter().map(Document::len).sum::<usize>()
    }

    /// Emit the full frame, recomputing `message_length` first.
    pub async fn write_to<W>(&self, w: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut header = self.header.clone();
        header.message_length = HEADER_LEN + self.body_len() as i32;
        header.write_to(w).await?;
        self.write_body(w).await
    }

    pub async fn write_body<W>(&self, w: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        wire::write_i32(w, self.response_flags).await?;
        wire::write_i64(w, self.cursor_id).await?;
        wire::write_i32(w, self.starting_from).await?;
        wire::write_i32(w, self.number_returned).await?;
        for doc in &self.documents {
            wire::write_full(w, doc.as_bytes()).await?;
        }
        Ok(())
    }

    pub fn op_code(&self) -> OpCode {
        OpCode::Reply
    }
}

impl fmt::Display for OpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "opReply - returned:{} cursor:{}",
            self.number_returned, self.cursor_id,
        )
    }
}
