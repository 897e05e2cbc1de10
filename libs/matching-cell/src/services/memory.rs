use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::MatchingError;
use crate::models::{MatchRequest, MatchStatus};
use crate::services::store::MatchStore;

#[derive(Default)]
struct Requests {
    by_id: HashMap<Uuid, MatchRequest>,
    /// Patient id to the id of its single Pending or Accepted request.
    active_by_patient: HashMap<Uuid, Uuid>,
    /// Request ids in creation order.
    order: Vec<Uuid>,
}

impl Requests {
    fn ordered(&self) -> impl Iterator<Item = &MatchRequest> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }
}

/// Process-local match store used for development and tests.
#[derive(Default)]
pub struct InMemoryMatchStore {
    requests: RwLock<Requests>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatchStore for InMemoryMatchStore {
    async fn insert_pending(&self, request: MatchRequest) -> Result<MatchRequest, MatchingError> {
        let mut requests = self.requests.write().await;

        if let Some(existing) = requests.active_by_patient.get(&request.patient_id) {
            debug!("Patient {} already holds active request {}", request.patient_id, existing);
            return Err(MatchingError::Conflict(
                "You already have a pending or active request".to_string(),
            ));
        }

        requests.active_by_patient.insert(request.patient_id, request.id);
        requests.order.push(request.id);
        requests.by_id.insert(request.id, request.clone());
        Ok(request)
    }

    async fn compare_and_set_status(
        &self,
        request_id: Uuid,
        expected: MatchStatus,
        next: MatchStatus,
        changed_at: DateTime<Utc>,
    ) -> Result<Option<MatchRequest>, MatchingError> {
        let mut requests = self.requests.write().await;

        let updated = match requests.by_id.get_mut(&request_id) {
            Some(request) if request.status == expected => {
                request.status = next;
                request.status_changed_at = changed_at.max(request.created_at);
                request.clone()
            }
            _ => return Ok(None),
        };

        if !next.is_active() {
            requests.active_by_patient.remove(&updated.patient_id);
        }
        Ok(Some(updated))
    }

    async fn get(&self, request_id: Uuid) -> Result<Option<MatchRequest>, MatchingError> {
        Ok(self.requests.read().await.by_id.get(&request_id).cloned())
    }

    async fn active_for_patient(&self, patient_id: Uuid) -> Result<Option<MatchRequest>, MatchingError> {
        let requests = self.requests.read().await;
        Ok(requests
            .active_by_patient
            .get(&patient_id)
            .and_then(|id| requests.by_id.get(id))
            .cloned())
    }

    async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        statuses: &[MatchStatus],
    ) -> Result<Vec<MatchRequest>, MatchingError> {
        let requests = self.requests.read().await;
        Ok(requests
            .ordered()
            .filter(|r| r.doctor_id == doctor_id && statuses.contains(&r.status))
            .cloned()
            .collect())
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<MatchRequest>, MatchingError> {
        let requests = self.requests.read().await;
        Ok(requests
            .ordered()
            .filter(|r| r.patient_id == patient_id)
            .cloned()
            .collect())
    }
}
