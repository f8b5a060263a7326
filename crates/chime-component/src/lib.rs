//! # chime-component
//!
//! Echo / time-signal XMPP external component library.
//!
//! The service plugs into an XMPP server over XEP-0114, echoes every
//! inbound chat message back to its sender, remembers every sender it has
//! successfully echoed to, and periodically broadcasts a timestamped time
//! signal to all of them, pruning recipients that become unreachable.
//!
//! ## Architecture
//!
//! - **Session task**: owns the component connection (`tokio-xmpp`) and
//!   multiplexes reads against write requests
//! - **Worker pool**: bounded queue plus semaphore-gated handler tasks
//!   deliver notifications to a [`Component`] concurrently
//! - **Registry**: `DashMap`-backed concurrent bookkeeping of known
//!   correspondents
//! - **Broadcast schedule**: per-instance cancellable task, hour-aligned
//!   fixed-rate ticks

pub mod broadcast;
pub mod config;
pub mod echo;
pub mod registry;
pub mod runtime;
pub mod sender;
pub mod stanza;

mod error;

pub use broadcast::TimeSignalBroadcaster;
pub use config::{ServiceSettings, Settings, DEFAULT_COMPONENT_PORT};
pub use echo::EchoResponder;
pub use error::ComponentError;
pub use registry::{AddressInfo, AddressRegistry};
pub use runtime::{ChannelPacketSender, ComponentRuntime};
pub use sender::{OutboundMessage, PacketSender, SendOutcome};
pub use stanza::{InboundEvent, InboundMessage, InboundPresence, PresenceShow};

use std::future::Future;

/// Capability set the runtime invokes on a service component.
///
/// A narrow interface instead of an inheritance hierarchy: anything that
/// can handle message and presence notifications and describe itself can
/// be driven by [`runtime::ComponentRuntime`]. Handlers run concurrently
/// on the worker pool, so implementations hold their mutable state in
/// concurrency-safe containers.
pub trait Component: Send + Sync + 'static {
    /// The service name; doubles as the component's subdomain.
    fn name(&self) -> &str;

    /// Human-readable description of the service.
    fn description(&self) -> &str;

    /// React to one inbound message notification.
    fn handle_message(&self, message: InboundMessage) -> impl Future<Output = ()> + Send;

    /// React to one inbound presence notification.
    fn handle_presence(&self, presence: InboundPresence) -> impl Future<Output = ()> + Send;
}
