//! Channel abstraction — transport-agnostic message I/O.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::engine::turn::TurnReply;
use crate::error::ChannelError;

/// An inbound turn event from a transport.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub channel: String,
    pub user_id: String,
    pub text: String,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: &str, text: &str) -> Self {
        Self {
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            text: text.to_string(),
        }
    }
}

/// Stream of inbound messages produced by a running channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A message transport: produces inbound turns, delivers outbound prompts.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start the channel and return its inbound message stream.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Deliver the engine's reply for a received message.
    async fn respond(&self, msg: &IncomingMessage, reply: TurnReply) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
