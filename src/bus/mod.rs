// In-process stand-in for the wire-level message bus described by the
// appliance: `Topic` (many publishers, many subscribers, prefix-matching on
// the publisher's own identity) and `Queue` (many senders, one receiver,
// exact-match dispatch). Framing is kept as multipart byte strings even
// though the transport is a `crossbeam_channel` rather than a socket, so the
// shape of a message on the wire is still visible in the types.

pub mod transport;

use crossbeam_channel::{Receiver, Sender};

/// A multipart message: one frame per part, ASCII byte strings.
pub type Message = Vec<Vec<u8>>;

pub fn frame(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

fn frame_str(part: &[u8]) -> String {
    String::from_utf8_lossy(part).into_owned()
}

/// High-water mark applied to every `Topic` subscriber queue. Once a
/// subscriber's backlog reaches this many messages, further publishes to it
/// are dropped rather than blocking the publisher.
const TOPIC_HWM: usize = 10;

struct Subscription {
    sender: Sender<Message>,
}

/// Many-to-many publish/subscribe channel. Each publisher prepends its own
/// identity as the first frame; subscribers register a prefix and receive
/// every message whose identity frame starts with it.
#[derive(Default)]
pub struct Topic {
    subscriptions: Vec<(String, Subscription)>,
}

impl Topic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber matching publisher identities starting with
    /// `prefix` (empty prefix matches everything). Returns the receiving end.
    pub fn subscribe(&mut self, prefix: impl Into<String>) -> Receiver<Message> {
        let (tx, rx) = crossbeam_channel::bounded(TOPIC_HWM);
        self.subscriptions
            .push((prefix.into(), Subscription { sender: tx }));
        rx
    }

    /// Publish `payload` frames under the identity `sender`. The identity is
    /// prepended as the first frame, matching the wire format.
    pub fn publish(&self, sender: &str, mut payload: Message) {
        let mut full = Vec::with_capacity(payload.len() + 1);
        full.push(frame(sender));
        full.append(&mut payload);

        for (prefix, sub) in &self.subscriptions {
            if sender.starts_with(prefix.as_str()) {
                // Bounded send: a full subscriber queue drops the message
                // rather than stalling the publisher, matching the
                // high-water-mark drop policy.
                let _ = sub.sender.try_send(full.clone());
            }
        }
    }
}

/// Many-to-one push/pull channel. Senders push named commands; the single
/// receiver dispatches by exact equality of the first frame.
pub struct Queue {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
}

impl Queue {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    pub fn sender(&self) -> Sender<Message> {
        self.sender.clone()
    }

    pub fn receiver(&self) -> Receiver<Message> {
        self.receiver.clone()
    }

    /// Convenience: push a named command with a JSON-encoded payload frame.
    pub fn send_command(&self, name: &str, payload: Option<Vec<u8>>) -> Result<(), crossbeam_channel::SendError<Message>> {
        let mut msg = vec![frame(name)];
        if let Some(p) = payload {
            msg.push(p);
        }
        self.sender.send(msg)
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the first frame of a message decoded as a `String`, i.e. the
/// event/command name (`Queue`) or the publisher identity (`Topic`).
pub fn message_name(msg: &Message) -> String {
    msg.first().map(|f| frame_str(f)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_prefix_matching_on_publisher_identity() {
        let mut topic = Topic::new();
        let player_only = topic.subscribe("player");
        let everything = topic.subscribe("");

        topic.publish("player", vec![frame("state")]);
        topic.publish("ripper", vec![frame("state")]);

        let msg = player_only.try_recv().unwrap();
        assert_eq!(message_name(&msg), "player");
        assert!(player_only.try_recv().is_err());

        assert_eq!(everything.try_recv().unwrap()[0], frame("player"));
        assert_eq!(everything.try_recv().unwrap()[0], frame("ripper"));
    }

    #[test]
    fn queue_is_exact_match_single_receiver() {
        let queue = Queue::new();
        queue.send_command("start", None).unwrap();
        let msg = queue.receiver().try_recv().unwrap();
        assert_eq!(message_name(&msg), "start");
    }

    #[test]
    fn late_subscriber_does_not_see_past_messages() {
        let mut topic = Topic::new();
        topic.publish("player", vec![frame("state")]);
        let late = topic.subscribe("player");
        topic.publish("player", vec![frame("state2")]);
        let msg = late.try_recv().unwrap();
        assert_eq!(msg[1], frame("state2"));
        assert!(late.try_recv().is_err());
    }
}
