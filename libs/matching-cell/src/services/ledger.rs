use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::MatchingError;
use crate::models::{MatchRequest, MatchStatus, Party, RelationshipSnapshot};
use crate::services::lifecycle::MatchLifecycle;
use crate::services::memory::InMemoryMatchStore;
use crate::services::store::MatchStore;
use crate::services::watch::{RelationshipStream, SubscriberRegistry};

const ACTIVE: [MatchStatus; 2] = [MatchStatus::Pending, MatchStatus::Accepted];

/// Authoritative view of match requests, layered over a [`MatchStore`].
///
/// The store guarantees the one-active-request rule and guards every status change with
/// the status it was checked against. Commits made through one ledger are also serialized
/// by its commit lock, which numbers them and publishes their snapshots in order.
pub struct MatchLedger {
    store: Arc<dyn MatchStore>,
    /// Sequence of the last commit seen by this ledger.
    commits: Mutex<u64>,
    subscribers: Arc<SubscriberRegistry>,
}

impl Default for MatchLedger {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl MatchLedger {
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        Self {
            store,
            commits: Mutex::new(0),
            subscribers: Arc::new(SubscriberRegistry::default()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryMatchStore::new()))
    }

    /// Open a Pending request. Fails with `Conflict` while the patient already has an
    /// active request, whichever doctor it targets.
    pub async fn create(&self, patient_id: Uuid, doctor_id: Uuid) -> Result<MatchRequest, MatchingError> {
        if patient_id == doctor_id {
            return Err(MatchingError::Validation(
                "A patient cannot request themselves".to_string(),
            ));
        }

        let mut sequence = self.commits.lock().await;

        let now = Utc::now();
        let request = MatchRequest {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            status: MatchStatus::Pending,
            created_at: now,
            status_changed_at: now,
        };

        let request = match self.store.insert_pending(request).await {
            Ok(request) => request,
            Err(err @ MatchingError::Conflict(_)) => {
                warn!(
                    "Patient {} already has an active request, refusing new request to doctor {}",
                    patient_id, doctor_id
                );
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        *sequence += 1;
        info!(
            "Request {} opened by patient {} for doctor {} (seq {})",
            request.id, patient_id, doctor_id, *sequence
        );

        self.publish(*sequence, &request).await;
        Ok(request)
    }

    pub async fn accept(&self, request_id: Uuid, doctor_id: Uuid) -> Result<MatchRequest, MatchingError> {
        self.transition(request_id, MatchStatus::Accepted, |request| {
            MatchLifecycle::authorize_doctor(request, doctor_id)
        })
        .await
    }

    pub async fn reject(&self, request_id: Uuid, doctor_id: Uuid) -> Result<MatchRequest, MatchingError> {
        self.transition(request_id, MatchStatus::Rejected, |request| {
            MatchLifecycle::authorize_doctor(request, doctor_id)
        })
        .await
    }

    /// Withdraw a Pending request or end an Accepted relationship.
    pub async fn cancel(&self, request_id: Uuid, acting_user_id: Uuid) -> Result<MatchRequest, MatchingError> {
        self.transition(request_id, MatchStatus::Cancelled, |request| {
            MatchLifecycle::authorize_participant(request, acting_user_id)
        })
        .await
    }

    /// Checks run in order: existence, authorization, then the transition table.
    ///
    /// When another writer changes the status between the check and the write, the
    /// checks run again against the new status. Every status has finitely many
    /// successors, so this ends.
    async fn transition<F>(
        &self,
        request_id: Uuid,
        next: MatchStatus,
        authorize: F,
    ) -> Result<MatchRequest, MatchingError>
    where
        F: Fn(&MatchRequest) -> Result<(), MatchingError>,
    {
        let mut sequence = self.commits.lock().await;

        let (previous, updated) = loop {
            let request = self
                .store
                .get(request_id)
                .await?
                .ok_or_else(|| MatchingError::NotFound(format!("Request {}", request_id)))?;

            authorize(&request)?;
            MatchLifecycle::validate_transition(request_id, request.status, next)?;

            match self
                .store
                .compare_and_set_status(request_id, request.status, next, Utc::now())
                .await?
            {
                Some(updated) => break (request.status, updated),
                None => debug!("Request {} changed under us, checking again", request_id),
            }
        };

        *sequence += 1;
        info!(
            "Request {} moved {} -> {} (seq {})",
            request_id, previous, next, *sequence
        );

        self.publish(*sequence, &updated).await;
        Ok(updated)
    }

    async fn snapshot(&self, party: Party, sequence: u64) -> Result<RelationshipSnapshot, MatchingError> {
        let requests = match party {
            Party::Patient(patient_id) => self
                .store
                .active_for_patient(patient_id)
                .await?
                .into_iter()
                .collect(),
            Party::Doctor(doctor_id) => self.store.list_for_doctor(doctor_id, &ACTIVE).await?,
        };

        Ok(RelationshipSnapshot {
            party,
            sequence,
            requests,
            observed_at: Utc::now(),
        })
    }

    /// Called with the commit lock held. A party whose snapshot cannot be read loses its
    /// subscriptions rather than silently missing a commit.
    async fn publish(&self, sequence: u64, request: &MatchRequest) {
        for party in [Party::Patient(request.patient_id), Party::Doctor(request.doctor_id)] {
            if !self.subscribers.has_subscribers(&party) {
                continue;
            }
            match self.snapshot(party, sequence).await {
                Ok(snapshot) => {
                    debug!("Publishing seq {} to {}", sequence, party);
                    self.subscribers.publish(&snapshot);
                }
                Err(err) => {
                    error!("Failed to build snapshot for {} at seq {}: {}", party, sequence, err);
                    self.subscribers.close_party(&party);
                }
            }
        }
    }

    pub async fn get(&self, request_id: Uuid) -> Result<MatchRequest, MatchingError> {
        self.store
            .get(request_id)
            .await?
            .ok_or_else(|| MatchingError::NotFound(format!("Request {}", request_id)))
    }

    pub async fn get_active_for_patient(&self, patient_id: Uuid) -> Result<Option<MatchRequest>, MatchingError> {
        self.store.active_for_patient(patient_id).await
    }

    /// Accepted relationships of a doctor, earliest acceptance first.
    pub async fn list_accepted_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<MatchRequest>, MatchingError> {
        let mut accepted = self
            .store
            .list_for_doctor(doctor_id, &[MatchStatus::Accepted])
            .await?;
        accepted.sort_by_key(|r| r.status_changed_at);
        Ok(accepted)
    }

    /// Requests awaiting the doctor's answer, oldest first.
    pub async fn list_pending_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<MatchRequest>, MatchingError> {
        self.store.list_for_doctor(doctor_id, &[MatchStatus::Pending]).await
    }

    /// Every request a patient has made, oldest first.
    pub async fn history_for_patient(&self, patient_id: Uuid) -> Result<Vec<MatchRequest>, MatchingError> {
        self.store.list_for_patient(patient_id).await
    }

    /// Subscribe to a party's relationships. The commit lock keeps writers out until the
    /// initial snapshot is queued, so no commit is skipped or seen twice.
    pub async fn subscribe(&self, party: Party) -> Result<RelationshipStream, MatchingError> {
        let sequence = self.commits.lock().await;
        let initial = self.snapshot(party, *sequence).await?;
        debug!("New subscription for {} at seq {}", party, initial.sequence);
        Ok(self.subscribers.register(party, initial))
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
