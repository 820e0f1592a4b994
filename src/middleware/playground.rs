use async_trait::async_trait;
use bson::doc;

use crate::error::Result;
use crate::middleware::{Middleware, Next, Stream, SYNTHETIC_REQUEST_ID};
use crate::protocol::{Message, OpReply};

/// Debugging stage: logs every decoded query and answers queries against
/// `test.foo` with a canned document instead of asking upstream.
pub struct PlaygroundMiddleware;

#[async_trait]
impl Middleware for PlaygroundMiddleware {
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
            tracing::debug!(query = %query, "playground");

            if query.full_collection_name.to_string() == "test.foo" {
                let mut reply = OpReply::reply_to(&query.header, SYNTHETIC_REQUEST_ID);
                reply.push_document(&doc! { "foo": "bar" })?;
                return reply.write_to(client).await;
            }
        }

        next.run(msg, client, server).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Chain;
    use crate::protocol::{Document, MsgHeader, OpCode, OpQuery};
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_answers_playground_collection() {
        let mut header = MsgHeader::default();
        header.op_code = OpCode::Query;
        header.request_id = 21;

        let query = OpQuery {
            header,
            flags: 0,
            full_collection_name: "test.foo".into(),
            number_to_skip: 0,
            number_to_return: 1,
            query: Document::from_bson(&doc! {}).unwrap(),
            return_fields_selector: Document::default(),
        };

        let chain = Chain::new().with_stage(PlaygroundMiddleware);
        let (mut client, mut client_far) = tokio::io::duplex(1024);
        let (mut server, mut server_far) = tokio::io::duplex(1024);

        chain
            .handle(&Message::Query(query), &mut client, &mut server)
            .await
            .unwrap();

        drop(server);
        let mut server_bytes = Vec::new();
        server_far.read_to_end(&mut server_bytes).await.unwrap();
        assert!(server_bytes.is_empty());

        let header = MsgHeader::read_from(&mut client_far).await.unwrap();
        assert_eq!(header.response_to, 21);
        let reply = OpReply::read_from(header, &mut client_far).await.unwrap();
        assert_eq!(
            reply.documents[0].to_bson().unwrap().get_str("foo"),
            Ok("bar"),
        );
    }
}
