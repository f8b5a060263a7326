//! Component runtime: the authenticated fabric session, the bounded
//! inbound queue, and the worker pool that invokes a [`Component`].
//!
//! One task owns the XEP-0114 connection and multiplexes reads against
//! outbound write requests; a dispatcher pulls parsed notifications from
//! the bounded queue and runs handlers concurrently, gated by a semaphore
//! sized to the configured pool.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use minidom::Element;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::ComponentError;
use crate::sender::{OutboundMessage, PacketSender, SendOutcome};
use crate::stanza::{self, InboundEvent};
use crate::Component;

/// Depth of the channel between packet senders and the session task.
const OUTBOUND_QUEUE_DEPTH: usize = 64;

struct OutboundRequest {
    stanza: Element,
    done: oneshot::Sender<bool>,
}

/// [`PacketSender`] backed by the runtime's session task.
///
/// Cheap to clone; every clone feeds the same connection. A send resolves
/// once the session task has written the stanza (or failed to).
#[derive(Clone)]
pub struct ChannelPacketSender {
    tx: mpsc::Sender<OutboundRequest>,
}

impl PacketSender for ChannelPacketSender {
    fn send(&self, message: OutboundMessage) -> impl Future<Output = SendOutcome> + Send {
        let tx = self.tx.clone();
        async move {
            let stanza = stanza::message_element(&message);
            let (done, ack) = oneshot::channel();
            if tx.send(OutboundRequest { stanza, done }).await.is_err() {
                return SendOutcome::Failed;
            }
            match ack.await {
                Ok(true) => SendOutcome::Delivered,
                _ => SendOutcome::Failed,
            }
        }
    }
}

/// Runtime for one service instance.
///
/// [`connect`](Self::connect) establishes the authenticated session (fatal
/// on failure), [`start`](Self::start) begins concurrent delivery to the
/// component, and [`stop`](Self::stop) cancels the instance and waits for
/// in-flight handlers.
pub struct ComponentRuntime {
    service_name: String,
    pool_size: usize,
    queue_size: usize,
    connection: Option<tokio_xmpp::tcp::TcpComponent>,
    outbound_tx: mpsc::Sender<OutboundRequest>,
    outbound_rx: Option<mpsc::Receiver<OutboundRequest>>,
    shutdown: CancellationToken,
    session: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl ComponentRuntime {
    /// Establish the authenticated component session with the routing
    /// fabric. The service addresses itself as `<name>.<host>`.
    pub async fn connect(settings: &Settings, service_name: &str) -> Result<Self, ComponentError> {
        let service = settings.service(service_name)?;
        let component_jid = format!("{}.{}", service_name, settings.host);

        let connection = tokio_xmpp::tcp::TcpComponent::new(
            &component_jid,
            &service.secret_key,
            format!("{}:{}", settings.host, settings.port),
        )
        .await
        .map_err(map_connect_error)?;

        info!(
            host = %settings.host,
            port = settings.port,
            jid = %component_jid,
            "Component session established"
        );

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);

        Ok(Self {
            service_name: service_name.to_string(),
            pool_size: service.max_threadpool_size,
            queue_size: service.max_queue_size,
            connection: Some(connection),
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            shutdown: CancellationToken::new(),
            session: None,
            dispatcher: None,
        })
    }

    /// A sender feeding this instance's connection.
    pub fn packet_sender(&self) -> ChannelPacketSender {
        ChannelPacketSender {
            tx: self.outbound_tx.clone(),
        }
    }

    /// Token cancelled when this instance stops. Broadcast schedules and
    /// other per-instance tasks hang off child tokens of this.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Begin delivering inbound notifications to the component.
    pub fn start<C: Component>(&mut self, component: Arc<C>) {
        let (connection, outbound_rx) = match (self.connection.take(), self.outbound_rx.take()) {
            (Some(connection), Some(outbound_rx)) => (connection, outbound_rx),
            _ => {
                warn!(name = %self.service_name, "Runtime already started");
                return;
            }
        };

        let (inbound_tx, inbound_rx) = mpsc::channel(self.queue_size);

        self.session = Some(tokio::spawn(session_loop(
            connection,
            outbound_rx,
            inbound_tx,
            self.shutdown.clone(),
        )));
        self.dispatcher = Some(tokio::spawn(dispatch_loop(
            inbound_rx,
            component,
            self.pool_size,
            self.shutdown.clone(),
        )));

        info!(name = %self.service_name, "Component started");
    }

    /// Stop the instance: cancel the session and all per-instance tasks,
    /// then wait for in-flight handlers to complete.
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.session.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.await;
        }
        info!(name = %self.service_name, "Component stopped");
    }
}

fn map_connect_error(error: tokio_xmpp::Error) -> ComponentError {
    let message = error.to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("auth") || lower.contains("handshake") || lower.contains("not-authorized") {
        ComponentError::auth(message)
    } else {
        ComponentError::connection(message)
    }
}

/// Own the fabric connection: write outbound requests, parse inbound
/// stanzas into the bounded queue.
async fn session_loop(
    mut connection: tokio_xmpp::tcp::TcpComponent,
    mut outbound_rx: mpsc::Receiver<OutboundRequest>,
    inbound_tx: mpsc::Sender<InboundEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Session task stopping");
                break;
            }
            request = outbound_rx.recv() => {
                let Some(OutboundRequest { stanza, done }) = request else {
                    break;
                };
                let delivered = match connection.send_stanza(stanza).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "Failed to write a stanza to the fabric");
                        false
                    }
                };
                let _ = done.send(delivered);
            }
            stanza = connection.next() => {
                let Some(elem) = stanza else {
                    warn!("Fabric stream closed");
                    break;
                };
                if !enqueue_inbound(&inbound_tx, &elem) {
                    break;
                }
            }
        }
    }
}

/// Parse one raw stanza and queue it for dispatch. A full queue drops the
/// stanza; only a gone dispatcher stops the session (returns false).
fn enqueue_inbound(inbound_tx: &mpsc::Sender<InboundEvent>, elem: &Element) -> bool {
    let Some(event) = stanza::parse_stanza(elem) else {
        return true;
    };
    match inbound_tx.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("Inbound queue full, dropping stanza");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Pull notifications off the queue and run handlers concurrently, at most
/// `pool_size` at a time. On shutdown, waits for in-flight handlers.
async fn dispatch_loop<C: Component>(
    mut inbound_rx: mpsc::Receiver<InboundEvent>,
    component: Arc<C>,
    pool_size: usize,
    shutdown: CancellationToken,
) {
    let permits = Arc::new(Semaphore::new(pool_size));

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = inbound_rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let permit = match Arc::clone(&permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let component = Arc::clone(&component);
        tokio::spawn(async move {
            match event {
                InboundEvent::Message(message) => component.handle_message(message).await,
                InboundEvent::Presence(presence) => component.handle_presence(presence).await,
            }
            drop(permit);
        });
    }

    // Drain: every handler holds a permit, so reacquiring the full pool
    // means all in-flight work has finished.
    if let Ok(all) = permits.acquire_many(pool_size as u32).await {
        drop(all);
    }
    debug!("Dispatcher stopped");
}
