//! Registry of live sessions.
//!
//! Each entry pairs a session runtime's command queue with its broadcast
//! fan-out. Clients attach by code, getting their own subscription; the
//! broadcast channel is bounded per subscriber, so one slow or dead client
//! lags (and is dropped by its writer task) without stalling the group.

use crate::protocol::ServerEvent;
use crate::runtime::SessionCommand;
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc, RwLock};

/// Outbound queue depth per attached client. Overflow marks the client
/// disconnected rather than blocking the session.
pub const CLIENT_BUFFER: usize = 256;

/// Live channel endpoints of one session runtime.
#[derive(Clone)]
pub struct SessionHandle {
    pub commands: mpsc::UnboundedSender<SessionCommand>,
    pub events: broadcast::Sender<ServerEvent>,
}

impl SessionHandle {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionCommand>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(CLIENT_BUFFER);
        (Self { commands, events }, command_rx)
    }
}

/// Registry keyed by 4-digit session code.
pub struct SessionHub {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, code: &str, handle: SessionHandle) {
        self.sessions
            .write()
            .await
            .insert(code.to_string(), handle);
        tracing::info!(code, "session registered");
    }

    /// Explicit cleanup; entries otherwise live until shutdown.
    pub async fn remove(&self, code: &str) {
        self.sessions.write().await.remove(code);
    }

    /// Join the session's fan-out group. `None` means no such session.
    pub async fn attach(
        &self,
        code: &str,
    ) -> Option<(SessionHandle, broadcast::Receiver<ServerEvent>)> {
        let sessions = self.sessions.read().await;
        let handle = sessions.get(code)?;
        Some((handle.clone(), handle.events.subscribe()))
    }

    /// Best-effort delivery to every attached client of a session.
    /// Returns false when the code is unknown.
    pub async fn broadcast(&self, code: &str, event: ServerEvent) -> bool {
        let sessions = self.sessions.read().await;
        match sessions.get(code) {
            Some(handle) => {
                // No receivers is fine; send only errs when nobody listens.
                let _ = handle.events.send(event);
                true
            }
            None => false,
        }
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_attach_unknown_code() {
        let hub = SessionHub::new();
        assert!(hub.attach("0000").await.is_none());
        assert!(!hub.broadcast("0000", ServerEvent::GameStarted {}).await);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers_in_order() {
        let hub = SessionHub::new();
        let (handle, _rx) = SessionHandle::new();
        hub.register("0042", handle).await;

        let (_, mut a) = hub.attach("0042").await.unwrap();
        let (_, mut b) = hub.attach("0042").await.unwrap();

        hub.broadcast("0042", ServerEvent::GameStarted {}).await;
        hub.broadcast("0042", ServerEvent::Countdown { count: 3 }).await;

        for rx in [&mut a, &mut b] {
            assert!(matches!(rx.recv().await.unwrap(), ServerEvent::GameStarted {}));
            assert!(matches!(
                rx.recv().await.unwrap(),
                ServerEvent::Countdown { count: 3 }
            ));
        }
    }

    #[tokio::test]
    async fn test_detach_is_dropping_the_receiver() {
        let hub = SessionHub::new();
        let (handle, _rx) = SessionHandle::new();
        hub.register("0042", handle).await;

        let (_, rx) = hub.attach("0042").await.unwrap();
        drop(rx);
        // Remaining subscribers are unaffected.
        let (_, mut other) = hub.attach("0042").await.unwrap();
        hub.broadcast("0042", ServerEvent::GameStarted {}).await;
        assert!(matches!(
            other.recv().await.unwrap(),
            ServerEvent::GameStarted {}
        ));
    }

    #[tokio::test]
    async fn test_remove_unregisters() {
        let hub = SessionHub::new();
        let (handle, _rx) = SessionHandle::new();
        hub.register("7777", handle).await;
        assert!(hub.attach("7777").await.is_some());

        hub.remove("7777").await;
        assert!(hub.attach("7777").await.is_none());
    }
}
