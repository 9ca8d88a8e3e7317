use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

use crate::model::ServerConfig;

/// The result a single in-flight discovery eventually resolves to. The error
/// side is flattened to a string so the outcome can be cloned and handed to
/// every waiter that joined the same lookup.
pub type DiscoveryOutcome = Result<Vec<ServerConfig>, String>;

type SharedOutcome = Shared<BoxFuture<'static, DiscoveryOutcome>>;

/// Collapses concurrent discovery requests for the same domain into one
/// in-flight lookup. The first caller for a domain does the work and calls
/// [`complete`](Self::complete); every other caller observes the same
/// in-flight future and receives the same result once it resolves.
pub struct PendingDiscoveryTracker {
    pending: DashMap<String, SharedOutcome>,
    senders: DashMap<String, oneshot::Sender<DiscoveryOutcome>>,
}

impl PendingDiscoveryTracker {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            senders: DashMap::new(),
        }
    }

    /// Returns `(is_first, future)`. `is_first` callers must eventually call
    /// [`complete`](Self::complete), [`fail`](Self::fail), or
    /// [`cancel`](Self::cancel) for this domain so followers don't hang
    /// forever.
    pub fn get_or_create(&self, domain: &str) -> (bool, SharedOutcome) {
        if let Some(existing) = self.pending.get(domain) {
            return (false, existing.clone());
        }

        let (tx, rx) = oneshot::channel::<DiscoveryOutcome>();
        let shared: SharedOutcome = rx
            .map(|result| result.unwrap_or_else(|_| Err("discovery task dropped without completing".to_string())))
            .boxed()
            .shared();

        match self.pending.entry(domain.to_string()) {
            Entry::Occupied(entry) => (false, entry.get().clone()),
            Entry::Vacant(entry) => {
                entry.insert(shared.clone());
                self.senders.insert(domain.to_string(), tx);
                (true, shared)
            }
        }
    }

    /// Fulfills and clears the pending entry for `domain`. A no-op if no
    /// lookup is in flight for it (e.g. called twice).
    pub fn complete(&self, domain: &str, outcome: DiscoveryOutcome) {
        self.pending.remove(domain);
        if let Some((_, tx)) = self.senders.remove(domain) {
            let _ = tx.send(outcome);
        }
    }

    pub fn fail(&self, domain: &str, message: impl Into<String>) {
        self.complete(domain, Err(message.into()));
    }

    pub fn cancel(&self, domain: &str) {
        self.complete(domain, Err("discovery lookup cancelled".to_string()));
    }

    pub fn in_flight_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for PendingDiscoveryTracker {
    fn default() -> Self {
        Self::new()
    }
}
