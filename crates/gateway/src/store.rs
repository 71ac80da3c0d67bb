//! `PolicyStore`: the collaborator that persists each project's active
//! policy, plus an in-memory archiving implementation.

use std::sync::Arc;

use dashmap::DashMap;
use gateway_core::InfraFault;
use policy::Policy;

/// Persists the active policy per project. Implementations must apply
/// `put` atomically with respect to concurrent `get` calls (§5).
pub trait PolicyStore: Send + Sync {
    /// Fetch the active policy for `project_id`, or `None` if the project
    /// has never had one configured.
    ///
    /// # Errors
    /// Returns [`InfraFault`] if the backend is unavailable.
    fn get(&self, project_id: &str) -> Result<Option<Arc<Policy>>, InfraFault>;

    /// Replace the active policy for `project_id`, archiving the prior one.
    ///
    /// # Errors
    /// Returns [`InfraFault`] if the backend is unavailable.
    fn put(&self, project_id: &str, policy: Policy) -> Result<(), InfraFault>;
}

/// An in-process [`PolicyStore`] that keeps every prior version per project
/// (newest last), useful for tests and as the default local backend.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    active: DashMap<String, Arc<Policy>>,
    archive: DashMap<String, Vec<Arc<Policy>>>,
}

impl InMemoryPolicyStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of archived (superseded) versions retained for `project_id`.
    #[must_use]
    pub fn archive_len(&self, project_id: &str) -> usize {
        self.archive.get(project_id).map(|v| v.len()).unwrap_or(0)
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn get(&self, project_id: &str) -> Result<Option<Arc<Policy>>, InfraFault> {
        Ok(self.active.get(project_id).map(|entry| entry.clone()))
    }

    fn put(&self, project_id: &str, policy: Policy) -> Result<(), InfraFault> {
        let incoming = Arc::new(policy);
        if let Some((_, prior)) = self.active.remove(project_id) {
            self.archive.entry(project_id.to_string()).or_default().push(prior);
        }
        self.active.insert(project_id.to_string(), incoming);
        Ok(())
    }
}
