//! MongoDB legacy wire protocol codec.
//!
//! Headers and the OP_QUERY / OP_REPLY operations decode into typed values;
//! every other opcode travels as an opaque header + raw body so forwarding
//! stays byte-identical.

use std::fmt;

use bytes::Bytes;
use tokio::io::AsyncWrite;

use crate::error::Result;

pub mod header;
pub mod op_query;
pub mod op_reply;
pub mod wire;

pub use header::MsgHeader;
pub use op_query::OpQuery;
pub use op_reply::OpReply;
pub use wire::{copy_message, HEADER_LEN};

/// Operation code of a wire message.
///
/// The known request opcodes of the legacy protocol; anything else is carried
/// as `Unknown` and still forwardable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Reply,
    Message,
    Update,
    Insert,
    Reserved,
    Query,
    GetMore,
    Delete,
    KillCursors,
    Unknown(i32),
}

impl OpCode {
    pub fn from_i32(v: i32) -> Self {
        match v {
            1 => OpCode::Reply,
            1000 => OpCode::Message,
            2001 => OpCode::Update,
            2002 => OpCode::Insert,
            2003 => OpCode::Reserved,
            2004 => OpCode::Query,
            2005 => OpCode::GetMore,
            2006 => OpCode::Delete,
            2007 => OpCode::KillCursors,
            other => OpCode::Unknown(other),
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            OpCode::Reply => 1,
            OpCode::Message => 1000,
            OpCode::Update => 2001,
            OpCode::Insert => 2002,
            OpCode::Reserved => 2003,
            OpCode::Query => 2004,
            OpCode::GetMore => 2005,
            OpCode::Delete => 2006,
            OpCode::KillCursors => 2007,
            OpCode::Unknown(v) => v,
        }
    }

    /// Whether the operation mutates data. These can be followed up by a
    /// getLastError.
    pub fn is_mutation(self) -> bool {
        matches!(self, OpCode::Update | OpCode::Insert | OpCode::Delete)
    }

    /// Whether the server sends a reply for this operation.
    pub fn has_response(self) -> bool {
        matches!(self, OpCode::Query | OpCode::GetMore)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpCode::Reply => "REPLY",
            OpCode::Message => "MESSAGE",
            OpCode::Update => "UPDATE",
            OpCode::Insert => "INSERT",
            OpCode::Reserved => "RESERVED",
            OpCode::Query => "QUERY",
            OpCode::GetMore => "GET_MORE",
            OpCode::Delete => "DELETE",
            OpCode::KillCursors => "KILL_CURSORS",
            OpCode::Unknown(_) => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// NUL-terminated byte string; the trailing NUL is part of the wire form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CString(Bytes);

impl CString {
    pub fn from_bytes(b: impl Into<Bytes>) -> Self {
        Self(b.into())
    }

    /// Wire bytes, trailing NUL included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for CString {
    fn from(s: &str) -> Self {
        let mut buf = Vec::with_capacity(s.len() + 1);
        buf.extend_from_slice(s.as_bytes());
        buf.push(0);
        Self(buf.into())
    }
}

impl fmt::Display for CString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        f.write_str(&String::from_utf8_lossy(&self.0[..self.0.len() - 1]))
    }
}

/// Self-framed BSON blob: a leading little-endian i32 total size followed by
/// opaque content. Zero-length means "absent optional document".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document(Bytes);

impl Document {
    pub fn from_bytes(b: impl Into<Bytes>) -> Self {
        Self(b.into())
    }

    pub fn from_bson(doc: &bson::Document) -> Result<Self> {
        Ok(Self(bson::to_vec(doc)?.into()))
    }

    /// Wire bytes, size prefix included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value-level view for middleware that inspects fields.
    pub fn to_bson(&self) -> Result<bson::Document> {
        Ok(bson::Document::from_reader(self.0.as_ref())?)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("{}");
        }
        match self.to_bson() {
            Ok(doc) => write!(f, "{}", doc),
            Err(_) => f.write_str("<invalid bson>"),
        }
    }
}

/// One decoded wire message.
///
/// `Opaque` keeps the original body bytes verbatim; the typed variants exist
/// for middleware that inspects or synthesizes messages.
#[derive(Debug, Clone)]
pub enum Message {
    Opaque(MsgHeader),
    Query(OpQuery),
    Reply(OpReply),
}

impl Message {
    /// Build a message from a fully-read header. With `typed` set, OP_QUERY
    /// and OP_REPLY bodies decode into their variants; everything else (and
    /// everything, when unset) stays opaque.
    pub async fn decode(header: MsgHeader, typed: bool) -> Result<Self> {
        if !typed {
            return Ok(Message::Opaque(header));
        }

        match header.op_code {
            OpCode::Query => {
                let body = header.body.clone();
                let mut r = body.as_ref();
                Ok(Message::Query(OpQuery::read_from(header, &mut r).await?))
            }
            OpCode::Reply => {
                let body = header.body.clone();
                let mut r = body.as_ref();
                Ok(Message::Reply(OpReply::read_from(header, &mut r).await?))
            }
            _ => Ok(Message::Opaque(header)),
        }
    }

    pub fn op_code(&self) -> OpCode {
        match self {
            Message::Opaque(h) => h.op_code,
            Message::Query(_) => OpCode::Query,
            Message::Reply(_) => OpCode::Reply,
        }
    }

    pub fn header(&self) -> &MsgHeader {
        match self {
            Message::Opaque(h) => h,
            Message::Query(q) => &q.header,
            Message::Reply(r) => &r.header,
        }
    }

    /// Emit the full frame, recomputing `message_length` first.
    pub async fn write_to<W>(&self, w: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match self {
            Message::Opaque(h) => {
                let mut hdr = h.clone();
                hdr.message_length = HEADER_LEN + h.body.len() as i32;
                hdr.write_to(w).await?;
                wire::write_full(w, &h.body).await
            }
            Message::Query(q) => q.write_to(w).await,
            Message::Reply(r) => r.write_to(w).await,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Opaque(h) => write!(f, "{}", h),
            Message::Query(q) => write!(f, "{}", q),
            Message::Reply(r) => write!(f, "{}", r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_code_display() {
        let cases = [
            (OpCode::Unknown(0), "UNKNOWN"),
            (OpCode::Reply, "REPLY"),
            (OpCode::Message, "MESSAGE"),
            (OpCode::Update, "UPDATE"),
            (OpCode::Insert, "INSERT"),
            (OpCode::Reserved, "RESERVED"),
            (OpCode::Query, "QUERY"),
            (OpCode::GetMore, "GET_MORE"),
            (OpCode::Delete, "DELETE"),
            (OpCode::KillCursors, "KILL_CURSORS"),
        ];
        for (op, name) in cases {
            assert_eq!(op.to_string(), name);
        }
    }

    #[test]
    fn test_op_code_tags_round_trip() {
        for tag in [1, 1000, 2001, 2002, 2003, 2004, 2005, 2006, 2007, 31337] {
            assert_eq!(OpCode::from_i32(tag).as_i32(), tag);
        }
    }

    #[test]
    fn test_op_code_predicates() {
        for op in [OpCode::Update, OpCode::Insert, OpCode::Delete] {
            assert!(op.is_mutation());
            assert!(!op.has_response());
        }
        for op in [OpCode::Query, OpCode::GetMore] {
            assert!(op.has_response());
            assert!(!op.is_mutation());
        }
        assert!(!OpCode::Reply.is_mutation());
        assert!(!OpCode::Unknown(0).has_response());
    }

    #[test]
    fn test_cstring_display_drops_nul() {
        assert_eq!(CString::from("test.bar").to_string(), "test.bar");
        assert_eq!(CString::default().to_string(), "");
        assert_eq!(CString::from("").as_bytes(), &[0]);
    }

    #[test]
    fn test_document_bson_round_trip() {
        let doc = bson::doc! { "qux": "foo" };
        let wire = Document::from_bson(&doc).unwrap();
        assert_eq!(wire.to_bson().unwrap(), doc);
        assert_eq!(
            i32::from_le_bytes(wire.as_bytes()[..4].try_into().unwrap()) as usize,
            wire.len(),
        );
    }

    #[tokio::test]
    async fn test_opaque_write_recomputes_length() {
        let mut h = MsgHeader::default();
        h.op_code = OpCode::Insert;
        h.message_length = 0x7fffffff; // stale; write_to must not trust it
        h.body = bytes::Bytes::from_static(&[1, 2, 3, 4]);

        let msg = Message::Opaque(h);
        let mut w = Vec::new();
        msg.write_to(&mut w).await.unwrap();
        assert_eq!(w.len(), 20);
        assert_eq!(i32::from_le_bytes(w[..4].try_into().unwrap()), 20);
    }
}
