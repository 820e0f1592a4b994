//! The middleware chain every message dispatches through.
//!
//! Stages are held as a plain ordered list and invoked by index through
//! [`Next`]; a stage either short-circuits (writes its own reply to the
//! client and returns without calling `next`), delegates, or fails. The
//! built-in [`Forwarder`] terminates every chain.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::protocol::Message;

mod forward;
mod playground;
mod schema;

pub use forward::Forwarder;
pub use playground::PlaygroundMiddleware;
pub use schema::{SchemaMiddleware, WriteError, WriteResult};

/// Request id stamped on replies synthesized by a stage (rather than echoed
/// from upstream).
pub(crate) const SYNTHETIC_REQUEST_ID: i32 = 1111111;

/// The socket seam a stage reads and writes through.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// A single stage in the chain.
///
/// `client` is the channel to the originating client; `server` the channel to
/// the upstream database. Only the terminal forwarder reads from `server`.
/// Any error returned here is fatal to the session.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        msg: &Message,
        client: &mut dyn Stream,
        server: &mut dyn Stream,
        next: Next<'_>,
    ) -> Result<()>;

    /// Whether this stage needs typed OP_QUERY / OP_REPLY variants. The
    /// session decodes bodies iff some stage in the chain asks; a pure
    /// forwarding chain carries opaque messages end-to-end.
    fn wants_decoded(&self) -> bool {
        false
    }
}

/// Ordered stages terminating in the proxy forwarder. Shared read-only by
/// every session.
pub struct Chain {
    stages: Vec<Box<dyn Middleware>>,
    forwarder: Forwarder,
}

impl Chain {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            forwarder: Forwarder,
        }
    }

    pub fn with_stage(mut self, stage: impl Middleware + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn wants_decoded(&self) -> bool {
        self.stages.iter().any(|s| s.wants_decoded())
    }

    pub async fn handle(
        &self,
        msg: &Message,
        client: &mut dyn Stream,
        server: &mut dyn Stream,
    ) -> Result<()> {
        Next {
            chain: self,
            index: 0,
        }
        .run(msg, client, server)
        .await
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle on the remainder of the chain, passed into each stage.
pub struct Next<'a> {
    chain: &'a Chain,
    index: usize,
}

impl Next<'_> {
    /// Delegate to the next stage, or to the terminal forwarder once the
    /// stages are exhausted.
    pub async fn run(
        self,
        msg: &Message,
        client: &mut dyn Stream,
        server: &mut dyn Stream,
    ) -> Result<()> {
        match self.chain.stages.get(self.index) {
            Some(stage) => {
                let next = Next {
                    chain: self.chain,
                    index: self.index + 1,
                };
                stage.handle(msg, client, server, next).await
            }
            None => self.chain.forwarder.handle(msg, client, server).await,
        }
    }
}
