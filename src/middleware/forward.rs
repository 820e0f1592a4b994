use crate::error::Result;
use crate::middleware::Stream;
use crate::protocol::{copy_message, Message};

/// Terminal stage of every chain: forwards the message to the upstream
/// server and, for opcodes that respond, copies exactly one reply frame back
/// to the client.
pub struct Forwarder;

impl Forwarder {
    pub(crate) async fn handle(
        &self,
        msg: &Message,
        client: &mut dyn Stream,
        server: &mut dyn Stream,
    ) -> Result<()> {
        msg.write_to(server).await?;

        if msg.op_code().has_response() {
            copy_message(server, client).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MsgHeader, OpCode, OpReply};
    use bytes::Bytes;
    use tokio::io::AsyncReadExt;

    fn query_message(request_id: i32, body: &'static [u8]) -> Message {
        let mut header = MsgHeader::default();
        header.op_code = OpCode::Query;
        header.request_id = request_id;
        header.body = Bytes::from_static(body);
        header.message_length = 16 + body.len() as i32;
        Message::Opaque(header)
    }

    #[tokio::test]
    async fn test_forwards_and_copies_one_reply() {
        let (mut client, mut client_far) = tokio::io::duplex(1024);
        let (mut server, mut server_far) = tokio::io::duplex(1024);

        // canned upstream reply, buffered before the exchange
        let request = query_message(9, &[0xaa, 0xbb]);
        let mut reply = OpReply::reply_to(request.header(), 500);
        reply.push_document(&bson::doc! { "ok": 1.0 }).unwrap();
        reply.write_to(&mut server_far).await.unwrap();

        Forwarder
            .handle(&request, &mut client, &mut server)
            .await
            .unwrap();

        // upstream received the request frame
        let mut frame = [0u8; 18];
        server_far.read_exact(&mut frame).await.unwrap();
        assert_eq!(&frame[16..], &[0xaa, 0xbb]);

        // the client received the reply, byte-identical
        let header = MsgHeader::read_from(&mut client_far).await.unwrap();
        assert_eq!(header.op_code, OpCode::Reply);
        assert_eq!(header.response_to, 9);
    }

    #[tokio::test]
    async fn test_no_reply_copy_for_mutations() {
        let (mut client, mut client_far) = tokio::io::duplex(1024);
        let (mut server, mut server_far) = tokio::io::duplex(1024);

        let mut header = MsgHeader::default();
        header.op_code = OpCode::Insert;
        header.body = Bytes::from_static(&[1]);
        header.message_length = 17;

        Forwarder
            .handle(&Message::Opaque(header), &mut client, &mut server)
            .await
            .unwrap();

        let mut frame = [0u8; 17];
        server_far.read_exact(&mut frame).await.unwrap();

        // nothing flows back to the client
        drop(client);
        let mut seen = Vec::new();
        client_far.read_to_end(&mut seen).await.unwrap();
        assert!(seen.is_empty());
    }
}
