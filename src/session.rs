//! Per-connection serve loop: one session per accepted client, owning the
//! client socket and a companion upstream connection.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

use crate::error::{Error, Result};
use crate::middleware::{Chain, Stream};
use crate::protocol::{Message, MsgHeader};

/// Shared, read-only session parameters.
pub(crate) struct SessionCtx {
    pub mongo_addr: String,
    pub client_idle_timeout: Duration,
    pub message_timeout: Duration,
    pub chain: Arc<Chain>,
}

/// Serve one client until it disconnects, a deadline fires, a stage fails,
/// or the proxy shuts down. Both sockets close on every exit path.
pub(crate) async fn serve_client(
    ctx: Arc<SessionCtx>,
    mut client: Box<dyn Stream>,
    peer: SocketAddr,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut server = match connect_upstream(&ctx.mongo_addr).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(peer = %peer, error = %e, "upstream unavailable");
            return Err(e);
        }
    };

    loop {
        let mut header =
            match idle_read_header(&mut *client, &mut shutdown, ctx.client_idle_timeout).await {
                Ok(h) => h,
                Err(Error::NormalClose) => return Ok(()),
                Err(e) => return Err(e),
            };

        // body read, decode, and the whole dispatch share one message budget
        let dispatched = timeout(ctx.message_timeout, async {
            header.read_body(&mut *client).await?;
            let msg = Message::decode(header, ctx.chain.wants_decoded()).await?;
            tracing::debug!(peer = %peer, header = %msg.header(), "handling message");
            ctx.chain.handle(&msg, &mut *client, &mut server).await
        })
        .await;

        match dispatched {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_elapsed) => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "message deadline exceeded",
                )));
            }
        }
    }
}

/// Wait up to `idle` for the next header. The read races the shutdown
/// broadcast; losing the race drops the pending read, which is what unblocks
/// an idling session promptly on stop.
async fn idle_read_header(
    client: &mut dyn Stream,
    shutdown: &mut broadcast::Receiver<()>,
    idle: Duration,
) -> Result<MsgHeader> {
    tokio::select! {
        res = timeout(idle, MsgHeader::read_from(client)) => match res {
            Ok(Ok(header)) => Ok(header),
            // client hung up between messages
            Ok(Err(Error::EndOfStream)) => Err(Error::NormalClose),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Err(Error::ClientReadTimeout),
        },
        _ = shutdown.recv() => Err(Error::NormalClose),
    }
}

/// Open a connection to the upstream server. Retries 7 times, doubling the
/// sleep each time starting at 50ms, so the last wait is 3.2s and the total
/// is 6.35s before giving up.
pub(crate) async fn connect_upstream(addr: &str) -> Result<TcpStream> {
    let mut retry_sleep = Duration::from_millis(50);
    for _ in 0..7 {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => tracing::error!(addr = %addr, error = %e, "upstream dial failed"),
        }

        sleep(retry_sleep).await;
        retry_sleep *= 2;
    }

    Err(Error::UpstreamUnavailable(addr.to_string()))
}
