//! Live sync client for the reviewing side.
//!
//! One poll loop runs at a time, bound to the selected patient. Selecting
//! a patient cancels the previous loop by dropping its cancellation
//! handle, then debounces before the first fetch so rapid re-selection
//! collapses into a single loop. Fetched artifacts are fingerprinted and
//! a notification fires only when the fingerprint actually changed.

use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tokio::time::sleep;

use super::cache::FingerprintCache;
use crate::backend::ClinicBackend;
use crate::config::SyncConfig;
use crate::events::{ConnectionState, EventBus, SyncEvent};

/// Handle to the running poll loop. Dropping the sender cancels the loop
/// that holds the receiver.
struct ActiveLoop {
    patient_id: String,
    _cancel: oneshot::Sender<()>,
}

#[derive(Clone)]
pub struct LiveSyncClient {
    backend: Arc<dyn ClinicBackend>,
    cache: Arc<FingerprintCache>,
    events: EventBus<SyncEvent>,
    config: Arc<SyncConfig>,
    active: Arc<Mutex<Option<ActiveLoop>>>,
}

impl LiveSyncClient {
    pub fn new(
        backend: Arc<dyn ClinicBackend>,
        events: EventBus<SyncEvent>,
        config: SyncConfig,
    ) -> Self {
        let cache = Arc::new(FingerprintCache::new(config.cache_ttl));
        Self {
            backend,
            cache,
            events,
            config: Arc::new(config),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Switch the poll loop to another patient, or stop it with `None`.
    /// The previous loop is cancelled either way.
    pub async fn select_patient(&self, patient_id: Option<String>) {
        let mut active = self.active.lock().await;
        // Dropping the old handle fires the old loop's cancel branch; the
        // old patient's fingerprint goes with it so reopening them later
        // notifies afresh.
        if let Some(previous) = active.take() {
            self.cache.invalidate(&previous.patient_id);
        }

        let Some(patient_id) = patient_id else {
            tracing::debug!("Patient deselected, polling stopped");
            return;
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        *active = Some(ActiveLoop {
            patient_id: patient_id.clone(),
            _cancel: cancel_tx,
        });

        let client = self.clone();
        tokio::spawn(async move {
            client.poll_loop(patient_id, cancel_rx).await;
        });
    }

    /// Stop the current poll loop, if any.
    pub async fn shutdown(&self) {
        if let Some(previous) = self.active.lock().await.take() {
            self.cache.invalidate(&previous.patient_id);
        }
    }

    pub fn events(&self) -> &EventBus<SyncEvent> {
        &self.events
    }

    async fn poll_loop(&self, patient_id: String, mut cancel: oneshot::Receiver<()>) {
        self.events.send(SyncEvent::ConnectionChanged {
            state: ConnectionState::Connecting,
        });

        // Absorb rapid re-selection before the first fetch
        tokio::select! {
            _ = &mut cancel => return,
            _ = sleep(self.config.debounce) => {}
        }

        tracing::debug!(patient_id, "Poll loop started");
        let mut last_state = ConnectionState::Connecting;
        loop {
            let fetched = tokio::select! {
                _ = &mut cancel => break,
                result = self.backend.get_artifact(&patient_id) => result,
            };

            match fetched {
                Ok(artifact) => {
                    self.set_connection(&mut last_state, ConnectionState::Connected);
                    if let Some(artifact) = artifact {
                        let fingerprint = artifact.fingerprint();
                        if self.cache.get(&patient_id).as_deref() != Some(fingerprint.as_str()) {
                            self.cache.put(&patient_id, &fingerprint);
                            tracing::debug!(patient_id, fingerprint, "Artifact changed");
                            self.events.send(SyncEvent::NoteUpdated {
                                patient_id: patient_id.clone(),
                                artifact,
                            });
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(patient_id, error = %e, "Artifact fetch failed");
                    self.set_connection(&mut last_state, ConnectionState::Error);
                }
            }

            tokio::select! {
                _ = &mut cancel => break,
                _ = sleep(self.config.poll_interval) => {}
            }
        }
        tracing::debug!(patient_id, "Poll loop stopped");
    }

    /// Emit the connection indicator only when it changes.
    fn set_connection(&self, last: &mut ConnectionState, state: ConnectionState) {
        if *last != state {
            *last = state;
            self.events.send(SyncEvent::ConnectionChanged { state });
        }
    }
}
