use tokio::sync::mpsc;

#[derive(Debug)]
pub(super) struct SessionEntry {
    pub(super) sender: mpsc::Sender<String>,
}

impl SessionEntry {
    pub(super) fn new(sender: mpsc::Sender<String>) -> Self {
        Self { sender }
    }
}

/// Handles returned to the transport for one open connection. The session id is
/// also the player's identity.
pub struct SessionIo {
    pub session_id: String,
    pub outbound_rx: mpsc::Receiver<String>,
}
