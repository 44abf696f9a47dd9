use crossbeam_channel::Sender;

/// Lifecycle notifications, delivered synchronously on the thread that
/// triggers them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemEvent {
    EncodeStarted,
    EncodeEnded,
    PlayStarted,
    PlayEnded,
    RecordStarted,
    RecordEnded,
}

pub trait EventListener: Send + Sync {
    fn on_event(&self, event: ModemEvent);
}

/// Listener that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl EventListener for NoopListener {
    fn on_event(&self, _event: ModemEvent) {}
}

impl EventListener for Sender<ModemEvent> {
    fn on_event(&self, event: ModemEvent) {
        // receiver gone means nobody is interested any more
        let _ = self.send(event);
    }
}
