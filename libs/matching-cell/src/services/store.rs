use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::MatchingError;
use crate::models::{MatchRequest, MatchStatus};

/// Persistence for match requests. Requests are never deleted; terminal ones stay as history.
///
/// Implementations enforce the one-active-request-per-patient rule themselves, so that
/// the check and the write cannot be separated even across processes.
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Store a new Pending request, or fail with `Conflict` when the patient already has
    /// a Pending or Accepted one.
    async fn insert_pending(&self, request: MatchRequest) -> Result<MatchRequest, MatchingError>;

    /// Move a request from `expected` to `next`. Yields `None` when the stored status is
    /// no longer `expected`.
    async fn compare_and_set_status(
        &self,
        request_id: Uuid,
        expected: MatchStatus,
        next: MatchStatus,
        changed_at: DateTime<Utc>,
    ) -> Result<Option<MatchRequest>, MatchingError>;

    async fn get(&self, request_id: Uuid) -> Result<Option<MatchRequest>, MatchingError>;

    async fn active_for_patient(&self, patient_id: Uuid) -> Result<Option<MatchRequest>, MatchingError>;

    /// Requests addressed to a doctor whose status is one of `statuses`, oldest first.
    async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        statuses: &[MatchStatus],
    ) -> Result<Vec<MatchRequest>, MatchingError>;

    /// Every request a patient has made, oldest first.
    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<MatchRequest>, MatchingError>;
}
