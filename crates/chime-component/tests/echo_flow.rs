//! Cross-component flows: echo, registration, broadcast, pruning, and
//! concurrent access, driven through a recording fake sender.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

use jid::Jid;

use chime_component::{
    AddressInfo, AddressRegistry, Component, EchoResponder, InboundMessage, OutboundMessage,
    PacketSender, SendOutcome, TimeSignalBroadcaster,
};

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<OutboundMessage>>,
    fail_to: Mutex<HashSet<String>>,
}

impl RecordingSender {
    fn fail_for(&self, jid: &str) {
        self.fail_to.lock().unwrap().insert(jid.to_string());
    }

    fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl PacketSender for RecordingSender {
    fn send(&self, message: OutboundMessage) -> impl Future<Output = SendOutcome> + Send {
        let outcome = if self.fail_to.lock().unwrap().contains(&message.to.to_string()) {
            SendOutcome::Failed
        } else {
            self.sent.lock().unwrap().push(message);
            SendOutcome::Delivered
        };
        async move { outcome }
    }
}

fn service() -> (
    Arc<EchoResponder<RecordingSender>>,
    Arc<RecordingSender>,
    Arc<AddressRegistry>,
) {
    let sender = Arc::new(RecordingSender::default());
    let registry = Arc::new(AddressRegistry::new());
    let responder = Arc::new(EchoResponder::new(
        "echo".to_string(),
        Arc::clone(&sender),
        Arc::clone(&registry),
    ));
    (responder, sender, registry)
}

fn message(from: &str, thread: Option<&str>, body: &str) -> InboundMessage {
    InboundMessage {
        from: from.parse().unwrap(),
        to: "echo.example.com".parse().unwrap(),
        subject: None,
        body: body.to_string(),
        thread: thread.map(str::to_string),
    }
}

#[tokio::test]
async fn echo_round_trip_registers_the_sender() {
    let (responder, sender, registry) = service();

    responder
        .handle_message(message("carol@example.com/desk", None, "Hello."))
        .await;

    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].from.to_string(), "echo.example.com");
    assert_eq!(sent[0].to.to_string(), "carol@example.com/desk");
    assert_eq!(sent[0].body, "Hello.");

    let carol: Jid = "carol@example.com/desk".parse().unwrap();
    assert!(registry.contains(&carol));
}

#[tokio::test]
async fn reregistration_keeps_the_first_conversation_token() {
    let (responder, _sender, registry) = service();

    responder
        .handle_message(message("carol@example.com/desk", Some("t-first"), "one"))
        .await;
    responder
        .handle_message(message("carol@example.com/desk", Some("t-second"), "two"))
        .await;

    assert_eq!(registry.len(), 1);
    let carol: Jid = "carol@example.com/desk".parse().unwrap();
    let info = registry.get(&carol).unwrap();
    assert_eq!(info.thread.as_deref(), Some("t-first"));
}

#[tokio::test]
async fn broadcast_reaches_every_registered_correspondent() {
    let (responder, sender, registry) = service();

    for user in ["c1", "c2", "c3"] {
        responder
            .handle_message(message(&format!("{}@example.com/home", user), None, "hi"))
            .await;
    }
    let echoes = sender.sent().len();
    assert_eq!(echoes, 3);

    let broadcaster = TimeSignalBroadcaster::new(registry, Arc::clone(&sender), 10);
    broadcaster.broadcast_once().await;

    let signals: Vec<OutboundMessage> = sender.sent().split_off(echoes);
    assert_eq!(signals.len(), 3);
    let recipients: HashSet<String> = signals.iter().map(|m| m.to.to_string()).collect();
    for user in ["c1", "c2", "c3"] {
        assert!(recipients.contains(&format!("{}@example.com/home", user)));
    }
    for signal in &signals {
        assert!(signal.body.starts_with("* Time signal: "));
        assert_eq!(signal.subject.as_deref(), Some("Time signal"));
    }
}

#[tokio::test]
async fn unreachable_correspondent_is_pruned_and_can_reregister() {
    let (responder, sender, registry) = service();

    for user in ["c1", "c2", "c3"] {
        responder
            .handle_message(message(&format!("{}@example.com/home", user), None, "hi"))
            .await;
    }

    let c2: Jid = "c2@example.com/home".parse().unwrap();
    sender.fail_for("c2@example.com/home");

    let broadcaster =
        TimeSignalBroadcaster::new(Arc::clone(&registry), Arc::clone(&sender), 10);

    assert!(registry.contains(&c2));
    broadcaster.broadcast_once().await;
    assert!(!registry.contains(&c2));
    assert_eq!(registry.len(), 2);

    // The next tick does not attempt the pruned correspondent.
    let before = sender.sent().len();
    broadcaster.broadcast_once().await;
    let second_pass: Vec<OutboundMessage> = sender.sent().split_off(before);
    assert_eq!(second_pass.len(), 2);
    assert!(second_pass.iter().all(|m| m.to != c2));

    // A fresh successful echo re-registers the pruned correspondent.
    sender.fail_to.lock().unwrap().clear();
    responder
        .handle_message(message("c2@example.com/home", None, "back"))
        .await;
    assert!(registry.contains(&c2));
    assert_eq!(registry.len(), 3);
}

#[tokio::test]
async fn concurrent_echoes_and_broadcast_leave_one_entry_per_sender() {
    const SENDERS: usize = 32;

    let (responder, sender, registry) = service();
    let broadcaster =
        TimeSignalBroadcaster::new(Arc::clone(&registry), Arc::clone(&sender), 10);

    // Seed one entry so the concurrent tick has work to do.
    registry.insert_if_absent(AddressInfo::new(
        "seed@example.com/home".parse().unwrap(),
        "echo.example.com".parse().unwrap(),
        None,
    ));

    let mut tasks = Vec::new();
    for n in 0..SENDERS {
        let responder = Arc::clone(&responder);
        tasks.push(tokio::spawn(async move {
            responder
                .handle_message(message(&format!("user{}@example.com/home", n), None, "hi"))
                .await;
        }));
    }
    let tick = tokio::spawn(async move { broadcaster.broadcast_once().await });

    for task in tasks {
        task.await.unwrap();
    }
    tick.await.unwrap();

    // No sends were induced to fail, so nothing was pruned.
    assert_eq!(registry.len(), SENDERS + 1);
    for n in 0..SENDERS {
        let jid: Jid = format!("user{}@example.com/home", n).parse().unwrap();
        assert!(registry.contains(&jid));
    }
}
