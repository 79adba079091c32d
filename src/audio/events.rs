use tokio::sync::broadcast;

/// Eventos para oyentes pasivos (p. ej. el mensaje de "now playing")
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Cambió el actual, la cola o el historial
    QueueUpdate,
    /// La sesión terminó
    Stop,
}

/// Broadcast hub owned by a session's listings.
///
/// Receivers see `RecvError::Closed` once every clone of the hub is dropped,
/// which happens when the session is destroyed.
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: SessionEvent) {
        // Sin suscriptores no es un error
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(32)
    }
}
