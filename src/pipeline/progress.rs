use std::sync::mpsc::{
    self,
    Receiver,
    Sender,
};

/// Events the pipeline emits while a build runs. The sending side never
/// blocks; whoever holds the receiver decides when to drain and render, so
/// pipeline throughput is decoupled from redraw cost.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Log { message: String },
    Progress { percent: f32, message: String },
}

#[derive(Debug, Clone)]
pub struct ProgressSender {
    sender: Sender<ProgressEvent>,
}

impl ProgressSender {
    pub fn log(&self, message: impl Into<String>) {
        let _ = self.sender.send(ProgressEvent::Log { message: message.into() });
    }

    pub fn progress(&self, percent: f32, message: impl Into<String>) {
        let _ = self.sender.send(ProgressEvent::Progress { percent, message: message.into() });
    }
}

/// Queue + drain pair: the pipeline enqueues, the caller drains.
pub fn progress_channel() -> (ProgressSender, Receiver<ProgressEvent>) {
    let (sender, receiver) = mpsc::channel();
    (ProgressSender { sender }, receiver)
}

/// Collect everything currently queued without blocking.
pub fn drain(receiver: &Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_queue_until_drained() {
        let (sender, receiver) = progress_channel();
        sender.log("starting");
        sender.progress(50.0, "halfway");

        let events = drain(&receiver);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ProgressEvent::Log { message } if message == "starting"));
        assert!(
            matches!(&events[1], ProgressEvent::Progress { percent, .. } if *percent == 50.0)
        );
    }

    #[test]
    fn sending_into_a_dropped_receiver_is_harmless() {
        let (sender, receiver) = progress_channel();
        drop(receiver);
        sender.log("nobody listening");
    }
}
