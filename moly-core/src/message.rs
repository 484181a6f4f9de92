//! # Message Module
//!
//! The record the analysis task hands to the synthesizer once per cycle.
//!
//! The handoff is a capacity-one `crossbeam-channel` slot. The writer drops
//! any message the reader has not picked up yet and publishes the new one,
//! so the reader always receives the latest fully populated record and
//! never a partially written one. Neither side blocks or allocates.

use crossbeam_channel::{Receiver, Sender, TryRecvError};

/// What the synthesizer should do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    /// Nothing new.
    #[default]
    None,
    /// Keep playing with the updated period and volume.
    Continue,
    /// A new note has started.
    Trigger,
}

/// One analysis result.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Message {
    pub kind: MessageKind,
    /// Period in samples, 0 means silence.
    pub lambda: f32,
    /// Volume after optional compression.
    pub volume: f32,
    /// Volume as measured.
    pub volume_raw: f32,
}

impl Message {
    pub fn silence() -> Self {
        Self {
            kind: MessageKind::Continue,
            ..Self::default()
        }
    }

    pub fn is_silence(&self) -> bool {
        self.lambda == 0.0
    }
}

/// Creates the writer and reader ends of the handoff slot.
pub fn mailbox() -> (Outbox, Inbox) {
    let (sender, receiver) = crossbeam_channel::bounded(1);
    let outbox = Outbox {
        sender,
        stale: receiver.clone(),
    };
    (outbox, Inbox { receiver })
}

/// Writer end, owned by the analysis task.
#[derive(Debug)]
pub struct Outbox {
    sender: Sender<Message>,
    stale: Receiver<Message>,
}

impl Outbox {
    /// Replaces whatever is in the slot with `message`.
    pub fn publish(&self, message: Message) {
        // Only this side ever fills the slot, so once drained the send cannot find it full.
        while self.stale.try_recv().is_ok() {}
        let _ = self.sender.try_send(message);
    }
}

/// Reader end, owned by the synthesizer.
#[derive(Debug)]
pub struct Inbox {
    receiver: Receiver<Message>,
}

impl Inbox {
    /// Takes the pending message, if any. A taken message is gone.
    pub fn take(&self) -> Option<Message> {
        match self.receiver.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn continue_with(lambda: f32) -> Message {
        Message {
            kind: MessageKind::Continue,
            lambda,
            volume: 0.1,
            volume_raw: 0.1,
        }
    }

    #[test]
    fn reader_sees_each_message_once() {
        let (outbox, inbox) = mailbox();
        assert_eq!(inbox.take(), None);
        outbox.publish(continue_with(200.0));
        assert_eq!(inbox.take(), Some(continue_with(200.0)));
        assert_eq!(inbox.take(), None);
    }

    #[test]
    fn latest_message_wins() {
        let (outbox, inbox) = mailbox();
        outbox.publish(continue_with(200.0));
        outbox.publish(continue_with(300.0));
        outbox.publish(Message::silence());
        assert_eq!(inbox.take(), Some(Message::silence()));
        assert_eq!(inbox.take(), None);
    }

    #[test]
    fn handoff_across_threads_delivers_whole_messages() {
        let (outbox, inbox) = mailbox();
        let writer = std::thread::spawn(move || {
            for i in 1..=10_000 {
                let value = i as f32;
                outbox.publish(Message {
                    kind: MessageKind::Continue,
                    lambda: value,
                    volume: value,
                    volume_raw: value,
                });
            }
        });

        let check = |message: Message, last: f32| {
            assert_eq!(message.lambda, message.volume);
            assert_eq!(message.volume, message.volume_raw);
            assert!(message.lambda > last);
            message.lambda
        };

        let mut last = 0.0;
        loop {
            let finished = writer.is_finished();
            match inbox.take() {
                Some(message) => last = check(message, last),
                None if finished => break,
                None => std::thread::yield_now(),
            }
        }
        writer.join().unwrap();
        if let Some(message) = inbox.take() {
            last = check(message, last);
        }
        assert_eq!(last, 10_000.0);
    }

    #[test]
    fn silence_message_shape() {
        let message = Message::silence();
        assert_eq!(message.kind, MessageKind::Continue);
        assert!(message.is_silence());
        assert_eq!(message.volume, 0.0);
        assert_eq!(Message::default().kind, MessageKind::None);
    }
}
