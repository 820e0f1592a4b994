use async_trait::async_trait;
use bson::doc;

use crate::error::Result;
use crate::middleware::{Middleware, Next, Stream, SYNTHETIC_REQUEST_ID};
use crate::protocol::{Message, OpReply};

/// Result of a write operation, synthesized in place of the server's answer.
#[derive(Debug, Clone)]
pub struct WriteResult {
    pub n: i32,
    pub write_errors: Vec<WriteError>,
}

#[derive(Debug, Clone)]
pub struct WriteError {
    pub index: i32,
    pub code: i32,
    pub errmsg: String,
}

impl WriteResult {
    pub fn to_document(&self) -> bson::Document {
        let mut doc = doc! { "n": self.n };
        if !self.write_errors.is_empty() {
            let errors: Vec<bson::Document> = self
                .write_errors
                .iter()
                .map(|e| doc! { "index": e.index, "code": e.code, "errmsg": e.errmsg.as_str() })
                .collect();
            doc.insert("writeErrors", errors);
        }
        doc.insert("ok", 1.0);
        doc
    }
}

/// Intercepts inserts into the guarded collection and answers them with a
/// write error, without the upstream ever seeing the command.
pub struct SchemaMiddleware;

#[async_trait]
impl Middleware for SchemaMiddleware {
    fn wants_decoded(&self) -> bool {
        true
    }

    async fn handle(
        &self,
        msg: &Message,
        client: &mut dyn Stream,
        server: &mut dyn Stream,
        next: Next<'_>,
    ) -> Result<()> {
        if let Message::Query(query) = msg {
            if query.full_collection_name.to_string() == "test.$cmd" {
                let command = query.query.to_bson()?;
                if command.get_str("insert") == Ok("foo") {
                    let result = WriteResult {
                        n: 1,
                        write_errors: vec![WriteError {
                            index: 0,
                            code: 42,
                            errmsg: "foo bar".to_string(),
                        }],
                    };

                    let mut reply = OpReply::reply_to(&query.header, SYNTHETIC_REQUEST_ID);
                    reply.push_document(&result.to_document())?;
                    return reply.write_to(client).await;
                }
            }
        }

        next.run(msg, client, server).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Chain;
    use crate::protocol::{MsgHeader, OpCode, OpQuery};
    use tokio::io::AsyncReadExt;

    async fn dispatch(collection: &str, command: bson::Document) -> (Vec<u8>, Vec<u8>) {
        let mut header = MsgHeader::default();
        header.op_code = OpCode::Query;
        header.request_id = 153;

        let query = OpQuery {
            header,
            flags: 0,
            full_collection_name: collection.into(),
            number_to_skip: 0,
            number_to_return: -1,
            query: crate::protocol::Document::from_bson(&command).unwrap(),
            return_fields_selector: crate::protocol::Document::default(),
        };

        let chain = Chain::new().with_stage(SchemaMiddleware);
        let (mut client, mut client_far) = tokio::io::duplex(1024);
        let (mut server, mut server_far) = tokio::io::duplex(1024);

        // canned upstream reply so the delegation path has something to copy
        let mut canned = OpReply::reply_to(&query.header, 9000);
        canned.push_document(&doc! { "ok": 1.0 }).unwrap();
        canned.write_to(&mut server_far).await.unwrap();

        chain
            .handle(&Message::Query(query), &mut client, &mut server)
            .await
            .unwrap();

        drop(client);
        drop(server);
        let mut client_bytes = Vec::new();
        client_far.read_to_end(&mut client_bytes).await.unwrap();
        let mut server_bytes = Vec::new();
        server_far.read_to_end(&mut server_bytes).await.unwrap();
        (client_bytes, server_bytes)
    }

    #[tokio::test]
    async fn test_short_circuits_guarded_insert() {
        let (client_bytes, server_bytes) =
            dispatch("test.$cmd", doc! { "insert": "foo" }).await;

        // upstream saw zero bytes for this round
        assert!(server_bytes.is_empty());

        let mut r: &[u8] = &client_bytes;
        let header = MsgHeader::read_from(&mut r).await.unwrap();
        assert_eq!(header.op_code, OpCode::Reply);
        assert_eq!(header.response_to, 153);
        assert_eq!(header.request_id, SYNTHETIC_REQUEST_ID);

        let reply = OpReply::read_from(header, &mut r).await.unwrap();
        assert_eq!(reply.number_returned, 1);
        let result = reply.documents[0].to_bson().unwrap();
        assert_eq!(result.get_i32("n"), Ok(1));
        let errors = result.get_array("writeErrors").unwrap();
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test]
    async fn test_delegates_everything_else() {
        // different collection: falls through to the forwarder, which relays
        // the canned upstream reply
        let (client_bytes, server_bytes) =
            dispatch("other.$cmd", doc! { "insert": "foo" }).await;
        assert!(!server_bytes.is_empty());

        let mut r: &[u8] = &client_bytes;
        let header = MsgHeader::read_from(&mut r).await.unwrap();
        assert_eq!(header.request_id, 9000);
    }
}
