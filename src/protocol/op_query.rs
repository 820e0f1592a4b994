use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};
use crate::protocol::wire::{self, HEADER_LEN};
use crate::protocol::{CString, Document, MsgHeader, OpCode};

/// OP_QUERY: query the database for documents in a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct OpQuery {
    pub header: MsgHeader,
    /// Bit vector of query options.
    pub flags: i32,
    /// "dbname.collectionname"
    pub full_collection_name: CString,
    pub number_to_skip: i32,
    pub number_to_return: i32,
    pub query: Document,
    /// Optional projection selector; zero-length when absent on the wire.
    pub return_fields_selector: Document,
}

impl OpQuery {
    /// Parse an OP_QUERY body. The selector is genuinely optional: EOF at a
    /// clean document boundary there means the field was never sent.
    pub async fn read_from<R>(header: MsgHeader, r: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let flags = wire::read_i32(r).await?;
        let full_collection_name = wire::read_cstring(r).await?;
        let number_to_skip = wire::read_i32(r).await?;
        let number_to_return = wire::read_i32(r).await?;
        let query = wire::read_document(r).await?;
        let return_fields_selector = match wire::read_document(r).await {
            Ok(doc) => doc,
            Err(Error::EndOfStream) => Document::default(),
            Err(e) => return Err(e),
        };

        Ok(Self {
            header,
            flags,
            full_collection_name,
            number_to_skip,
            number_to_return,
            query,
            return_fields_selector,
        })
    }

    fn body_len(&self) -> usize {
        4 + self.full_collection_name.len()
            + 4
            + 4
            + self.query.len()
            + self.return_fields_selector.len()
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
        wire::write_i32(w, self.flags).await?;
        wire::write_full(w, self.full_collection_name.as_bytes()).await?;
        wire::write_i32(w, self.number_to_skip).await?;
        wire::write_i32(w, self.number_to_return).await?;
        wire::write_full(w, self.query.as_bytes()).await?;
        wire::write_full(w, self.return_fields_selector.as_bytes()).await?;
        Ok(())
    }

    pub fn op_code(&self) -> OpCode {
        OpCode::Query
    }
}

impl fmt::Display for OpQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "opQuery - collection: {} q: {} p: {} skip:{} limit:{}",
            self.full_collection_name,
            self.query,
            self.return_fields_selector,
            self.number_to_skip,
            self.number_to_return,
        )
    }
}
