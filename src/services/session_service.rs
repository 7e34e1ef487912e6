/// Session lifecycle coordination: create/load/save/delete plus exclusive
/// run ownership.
///
/// A conversation run must hold the session's lease before mutating it; a
/// second acquisition of the same session fails with `SessionBusy` instead
/// of silently racing. `save` takes the lease by reference, so concurrent
/// writers are rejected at the type level rather than interleaved.
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{instrument, warn};

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::{ConversationState, DataRef};
use crate::domain::ports::SessionRepository;

/// Exclusive logical ownership of one session for the duration of a run.
///
/// Dropping the lease releases ownership.
#[derive(Debug)]
pub struct SessionLease {
    session_id: String,
    leases: Arc<Mutex<HashSet<String>>>,
}

impl SessionLease {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.leases
            .lock()
            .expect("lease set lock poisoned")
            .remove(&self.session_id);
    }
}

pub struct SessionService {
    repo: Arc<dyn SessionRepository>,
    leases: Arc<Mutex<HashSet<String>>>,
}

impl SessionService {
    pub fn new(repo: Arc<dyn SessionRepository>) -> Self {
        Self {
            repo,
            leases: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claim exclusive ownership of a session.
    ///
    /// # Errors
    /// `SessionBusy` if another run currently owns it.
    pub fn acquire(&self, session_id: &str) -> DomainResult<SessionLease> {
        let mut leases = self.leases.lock().expect("lease set lock poisoned");
        if !leases.insert(session_id.to_string()) {
            warn!(session_id, "Rejected concurrent ownership of session");
            return Err(OrchestratorError::SessionBusy(session_id.to_string()));
        }
        Ok(SessionLease {
            session_id: session_id.to_string(),
            leases: Arc::clone(&self.leases),
        })
    }

    /// Load the session if it exists, otherwise create and persist a fresh
    /// conversation for the query. Requires the caller to hold the lease.
    #[instrument(skip(self, lease, query, data_ref), fields(session_id = lease.session_id()), err)]
    pub async fn load_or_create(
        &self,
        lease: &SessionLease,
        query: &str,
        data_ref: Option<DataRef>,
    ) -> DomainResult<ConversationState> {
        if let Some(state) = self.repo.get(lease.session_id()).await? {
            return Ok(state);
        }

        let state = ConversationState::new(
            lease.session_id().to_string(),
            query.to_string(),
            data_ref,
        );
        self.repo.create(&state).await?;
        Ok(state)
    }

    /// Load an existing session's last saved snapshot.
    ///
    /// # Errors
    /// `SessionNotFound` if no snapshot exists.
    pub async fn load(&self, session_id: &str) -> DomainResult<ConversationState> {
        self.repo
            .get(session_id)
            .await?
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))
    }

    /// Persist the full snapshot. The lease proves this caller is the
    /// session's single writer.
    #[instrument(skip(self, state, lease), fields(session_id = %state.session_id), err)]
    pub async fn save(
        &self,
        state: &ConversationState,
        lease: &SessionLease,
    ) -> DomainResult<()> {
        if lease.session_id() != state.session_id {
            return Err(OrchestratorError::SessionBusy(state.session_id.clone()));
        }
        self.repo.save(state).await
    }

    /// Delete a stored session. Rejected while a run owns it.
    pub async fn delete(&self, session_id: &str) -> DomainResult<()> {
        if self
            .leases
            .lock()
            .expect("lease set lock poisoned")
            .contains(session_id)
        {
            return Err(OrchestratorError::SessionBusy(session_id.to_string()));
        }
        self.repo.delete(session_id).await
    }

    pub async fn list(&self, limit: usize) -> DomainResult<Vec<ConversationState>> {
        self.repo.list(limit).await
    }

    pub async fn exists(&self, session_id: &str) -> DomainResult<bool> {
        self.repo.exists(session_id).await
    }
}
