//! Outbound delivery contract.

use std::future::Future;

use jid::Jid;

/// A chat message bound for the routing fabric.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Address the message appears to come from
    pub from: Jid,
    /// Recipient address
    pub to: Jid,
    /// Optional subject line
    pub subject: Option<String>,
    /// Message text
    pub body: String,
    /// Conversation thread carried across the exchange
    pub thread: Option<String>,
}

/// Result of one delivery attempt.
///
/// Ordinary delivery failure (unreachable recipient, transport error) is
/// `Failed`, never a panic or an `Err`, so failure handling stays visible
/// at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The message was handed to the fabric for delivery
    Delivered,
    /// The message could not be delivered
    Failed,
}

impl SendOutcome {
    /// Whether the send succeeded.
    pub fn is_delivered(self) -> bool {
        matches!(self, SendOutcome::Delivered)
    }
}

/// Sends one outbound message through the routing fabric.
///
/// Implementations must be safe for concurrent invocation from multiple
/// tasks; the echo handlers and the broadcast tick share one sender.
pub trait PacketSender: Send + Sync + 'static {
    /// Attempt to deliver a message. Exactly one attempt, no retries.
    fn send(&self, message: OutboundMessage) -> impl Future<Output = SendOutcome> + Send;
}
