use crate::domain::model::PhoneNumber;
use crate::domain::ports::Notifier;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Fire-and-forget front for a [`Notifier`].
///
/// Each text or call runs on its own task; outcomes are logged there and never
/// reach the caller.
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    in_flight: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            in_flight: JoinSet::new(),
        }
    }

    pub fn text(&mut self, contact: &PhoneNumber, message: impl Into<String>) {
        self.reap();
        let notifier = Arc::clone(&self.notifier);
        let contact = contact.clone();
        let message = message.into();
        tracing::debug!("Texting {}: {}", contact, message);
        self.in_flight.spawn(async move {
            match notifier.send_text(&message, &contact).await {
                Ok(id) => tracing::info!("Message sent to {}: {}", contact, id.0),
                Err(e) => tracing::warn!("Failed to send message to {}: {}", contact, e),
            }
        });
    }

    pub fn call(&mut self, contact: &PhoneNumber) {
        self.reap();
        let notifier = Arc::clone(&self.notifier);
        let contact = contact.clone();
        tracing::debug!("Calling {}", contact);
        self.in_flight.spawn(async move {
            match notifier.place_call(&contact).await {
                Ok(id) => tracing::info!("Call initiated to {}: {}", contact, id.0),
                Err(e) => tracing::warn!("Failed to initiate call to {}: {}", contact, e),
            }
        });
    }

    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// Drops bookkeeping for dispatches that already finished.
    fn reap(&mut self) {
        while let Some(result) = self.in_flight.try_join_next() {
            if let Err(e) = result {
                tracing::warn!("Notification task aborted: {}", e);
            }
        }
    }

    /// Waits up to `grace` for outstanding dispatches; whatever is left is aborted.
    pub async fn flush(&mut self, grace: Duration) {
        let drain = async {
            while let Some(result) = self.in_flight.join_next().await {
                if let Err(e) = result {
                    tracing::warn!("Notification task aborted: {}", e);
                }
            }
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            tracing::warn!(
                "Gave up on {} notification(s) after {:?}",
                self.in_flight.len(),
                grace
            );
            self.in_flight.abort_all();
        }
    }
}
