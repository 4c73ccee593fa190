use crate::Bus;
use dbus::{channel::Sender, Message, MessageType};
use parking_lot::Mutex;
use std::sync::Arc;

/// Keeps every message sent through it.
#[derive(Default)]
pub(crate) struct RecordingBus {
    sent: Mutex<Vec<Message>>,
}

#[derive(Clone)]
pub(crate) struct Recorded(Arc<RecordingBus>);

impl RecordingBus {
    pub(crate) fn new() -> (Bus, Recorded) {
        let rec = Arc::new(RecordingBus::default());
        let bus: Bus = rec.clone();
        (bus, Recorded(rec))
    }
}

impl Sender for RecordingBus {
    fn send(&self, msg: Message) -> Result<u32, ()> {
        let mut sent = self.sent.lock();
        sent.push(msg);
        Ok(sent.len() as u32)
    }
}

impl Recorded {
    pub(crate) fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.0.sent.lock())
    }

    /// Signals named `member` sent so far, draining everything.
    pub(crate) fn signals(&self, member: &str) -> Vec<Message> {
        self.take()
            .into_iter()
            .filter(|m| m.msg_type() == MessageType::Signal && m.member().as_deref() == Some(member))
            .collect()
    }
}
