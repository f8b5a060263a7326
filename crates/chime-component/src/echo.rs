//! Echo service: replies to every inbound message and remembers the
//! sender for time-signal broadcasts.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use crate::registry::{AddressInfo, AddressRegistry};
use crate::sender::{OutboundMessage, PacketSender, SendOutcome};
use crate::stanza::{InboundMessage, InboundPresence};
use crate::Component;

const DESCRIPTION: &str =
    "This service echoes user's messages back to sender and sends time signal messages.";

/// The echo-and-register component.
///
/// Invoked concurrently by the runtime's worker pool; the shared
/// [`AddressRegistry`] is the only mutable state.
pub struct EchoResponder<S: PacketSender> {
    name: String,
    sender: Arc<S>,
    registry: Arc<AddressRegistry>,
}

impl<S: PacketSender> EchoResponder<S> {
    /// Create a new echo responder.
    pub fn new(name: String, sender: Arc<S>, registry: Arc<AddressRegistry>) -> Self {
        Self {
            name,
            sender,
            registry,
        }
    }

    /// The shared registry of remembered correspondents.
    pub fn registry(&self) -> &Arc<AddressRegistry> {
        &self.registry
    }
}

impl<S: PacketSender> Component for EchoResponder<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn handle_message(&self, message: InboundMessage) -> impl Future<Output = ()> + Send {
        async move {
            info!(
                from = %message.from,
                to = %message.to,
                body = %message.body,
                "Received a message"
            );

            let reply = OutboundMessage {
                from: message.to.clone(),
                to: message.from.clone(),
                subject: message.subject.clone(),
                body: message.body.clone(),
                thread: message.thread.clone(),
            };

            match self.sender.send(reply).await {
                SendOutcome::Delivered => {
                    self.registry.insert_if_absent(AddressInfo::new(
                        message.from,
                        message.to,
                        message.thread,
                    ));
                }
                SendOutcome::Failed => {
                    warn!(to = %message.from, "Failed to send echo reply");
                }
            }
        }
    }

    fn handle_presence(&self, presence: InboundPresence) -> impl Future<Output = ()> + Send {
        async move {
            // Observability only; presence never touches the registry.
            let to = presence.to.as_ref().map(|j| j.to_string());
            let show = presence.show.map(|s| s.to_string());
            info!(
                from = %presence.from,
                to = to.as_deref(),
                id = presence.id.as_deref(),
                show = show.as_deref(),
                status = presence.status.as_deref(),
                priority = presence.priority,
                "Received a presence update"
            );
        }
    }
}
