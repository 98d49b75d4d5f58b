//! Sign-in notifications for browsers waiting on an email confirmation.
//!
//! The register page keeps an SSE stream open on `/auth/events`. The
//! confirmation link must be opened in the same browser: the auth callback
//! publishes `SignedIn` only when the request carries the pending-signup
//! cookie, and every waiting page for that address moves on.

use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn { email: String },
}

#[derive(Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl AuthEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn publish(&self, event: AuthEvent) {
        // No receivers is the common case
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Case-insensitive email match for a pending sign-up
pub fn is_for(event: &AuthEvent, email: &str) -> bool {
    match event {
        AuthEvent::SignedIn { email: e } => e.eq_ignore_ascii_case(email),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let hub = AuthEvents::new();
        let mut rx = hub.subscribe();
        hub.publish(AuthEvent::SignedIn {
            email: "Maria@Example.org".into(),
        });

        let got = rx.recv().await.unwrap();
        assert!(is_for(&got, "maria@example.org"));
        assert!(!is_for(&got, "luca@example.org"));
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        AuthEvents::new().publish(AuthEvent::SignedIn {
            email: "a@b.it".into(),
        });
    }
}
