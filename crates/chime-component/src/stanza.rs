//! Stanza conversion: raw `minidom::Element`s to and from typed
//! notifications.
//!
//! Components receive stanzas qualified by the `jabber:component:accept`
//! stream namespace rather than `jabber:client`, so children are looked up
//! by name regardless of namespace instead of going through client-side
//! typed parsers.

use jid::Jid;
use minidom::Element;
use tracing::debug;

use crate::sender::OutboundMessage;

/// Stream namespace for XEP-0114 component connections.
pub const NS_COMPONENT_ACCEPT: &str = "jabber:component:accept";

/// Client stream namespace, accepted on input for tolerance.
pub const NS_CLIENT: &str = "jabber:client";

/// An inbound chat message notification.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Original sender
    pub from: Jid,
    /// Original recipient (an address of this service)
    pub to: Jid,
    /// Optional subject line
    pub subject: Option<String>,
    /// Message text
    pub body: String,
    /// Conversation thread
    pub thread: Option<String>,
}

/// Presence `show` value (RFC 6121 §4.7.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceShow {
    /// Away
    Away,
    /// Free for chat
    Chat,
    /// Do not disturb
    Dnd,
    /// Extended away
    Xa,
}

impl PresenceShow {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "away" => Some(Self::Away),
            "chat" => Some(Self::Chat),
            "dnd" => Some(Self::Dnd),
            "xa" => Some(Self::Xa),
            _ => None,
        }
    }
}

impl std::fmt::Display for PresenceShow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Away => "away",
            Self::Chat => "chat",
            Self::Dnd => "dnd",
            Self::Xa => "xa",
        };
        f.write_str(s)
    }
}

/// An inbound presence notification. Logged for observability only.
#[derive(Debug, Clone)]
pub struct InboundPresence {
    /// Sender
    pub from: Jid,
    /// Recipient, when addressed
    pub to: Option<Jid>,
    /// Stanza id
    pub id: Option<String>,
    /// Show mode; `None` means unspecified
    pub show: Option<PresenceShow>,
    /// Free-form status text
    pub status: Option<String>,
    /// Presence priority
    pub priority: i8,
}

/// A typed inbound notification.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// A conversational message with a body
    Message(InboundMessage),
    /// A presence update
    Presence(InboundPresence),
}

/// Text content of the first child with the given name, any namespace.
fn child_text(elem: &Element, name: &str) -> Option<String> {
    elem.children().find(|c| c.name() == name).map(|c| c.text())
}

fn attr_jid(elem: &Element, name: &str) -> Option<Jid> {
    elem.attr(name).and_then(|v| v.parse().ok())
}

/// Parse a raw stanza into a typed notification.
///
/// Returns `None` for stanzas the component does not react to: IQs,
/// error-type messages, and messages without a body (chat states and the
/// like).
pub fn parse_stanza(elem: &Element) -> Option<InboundEvent> {
    match elem.name() {
        "message" => parse_message(elem).map(InboundEvent::Message),
        "presence" => parse_presence(elem).map(InboundEvent::Presence),
        other => {
            debug!(stanza = other, "Ignoring unhandled stanza");
            None
        }
    }
}

fn parse_message(elem: &Element) -> Option<InboundMessage> {
    if elem.attr("type") == Some("error") {
        debug!("Ignoring error-type message");
        return None;
    }

    let from = attr_jid(elem, "from")?;
    let to = attr_jid(elem, "to")?;
    // Messages without a body (chat states, receipts) produce no echo.
    let body = child_text(elem, "body")?;

    Some(InboundMessage {
        from,
        to,
        subject: child_text(elem, "subject"),
        body,
        thread: child_text(elem, "thread"),
    })
}

fn parse_presence(elem: &Element) -> Option<InboundPresence> {
    let from = attr_jid(elem, "from")?;

    Some(InboundPresence {
        from,
        to: attr_jid(elem, "to"),
        id: elem.attr("id").map(str::to_string),
        show: child_text(elem, "show").and_then(|s| PresenceShow::parse(&s)),
        status: child_text(elem, "status"),
        priority: child_text(elem, "priority")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(0),
    })
}

/// Build the wire element for an outbound chat message.
pub fn message_element(message: &OutboundMessage) -> Element {
    let mut builder = Element::builder("message", NS_COMPONENT_ACCEPT)
        .attr("from", message.from.to_string())
        .attr("to", message.to.to_string())
        .attr("type", "chat")
        .append(
            Element::builder("body", NS_COMPONENT_ACCEPT)
                .append(message.body.as_str())
                .build(),
        );

    if let Some(subject) = &message.subject {
        builder = builder.append(
            Element::builder("subject", NS_COMPONENT_ACCEPT)
                .append(subject.as_str())
                .build(),
        );
    }
    if let Some(thread) = &message.thread {
        builder = builder.append(
            Element::builder("thread", NS_COMPONENT_ACCEPT)
                .append(thread.as_str())
                .build(),
        );
    }

    builder.build()
}
