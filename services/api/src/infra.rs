use metrics_exporter_prometheus::PrometheusHandle;
use semreg::config::RegistrySettings;
use semreg::workflows::registration::{Email, InMemoryStore, MailError, Mailer, Registry};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Mail transport that records outbound messages in the log stream.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: Email) -> Result<(), MailError> {
        if !email.to.contains('@') {
            return Err(MailError::InvalidRecipient(email.to));
        }
        info!(from = %email.from, to = %email.to, subject = %email.subject, "email dispatched");
        Ok(())
    }
}

/// Registry wired to the in-memory store, which doubles as the notification sink.
pub(crate) fn in_memory_registry(
    settings: RegistrySettings,
    mailer: Arc<dyn Mailer>,
) -> Arc<Registry> {
    let store = Arc::new(InMemoryStore::new());
    Arc::new(Registry::new(store.clone(), store, mailer, settings))
}
