use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::error::MatchingError;
use crate::models::{MatchRequest, MatchStatus};
use crate::services::store::MatchStore;

const MATCH_REQUESTS: &str = "/rest/v1/match_requests";

/// Match requests kept in the hosted document store's `match_requests` table.
///
/// The insert is only conditional if the table carries the partial unique index below;
/// PostgREST then answers a second active request for a patient with 409.
///
/// ```sql
/// create unique index match_requests_one_active_per_patient
///     on match_requests (patient_id)
///     where status in ('pending', 'accepted');
/// ```
pub struct SupabaseMatchStore {
    supabase: SupabaseClient,
    service_token: String,
}

impl SupabaseMatchStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            service_token: config.supabase_anon_key.clone(),
        }
    }

    /// Reads skip rows that do not decode, so one bad row cannot hide the rest.
    async fn fetch_rows(&self, path: &str) -> Result<Vec<MatchRequest>, MatchingError> {
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(&self.service_token), None)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value(row) {
                Ok(request) => Some(request),
                Err(e) => {
                    warn!("Skipping malformed match request row at {}: {}", path, e);
                    None
                }
            })
            .collect())
    }

    async fn write_rows(&self, method: Method, path: &str, body: Value) -> Result<Vec<MatchRequest>, MatchingError> {
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                method,
                path,
                Some(&self.service_token),
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| MatchingError::Internal(format!("Malformed match request row: {}", e)))
            })
            .collect()
    }
}

fn status_filter(statuses: &[MatchStatus]) -> String {
    let list: Vec<String> = statuses.iter().map(ToString::to_string).collect();
    format!("in.({})", list.join(","))
}

#[async_trait]
impl MatchStore for SupabaseMatchStore {
    async fn insert_pending(&self, request: MatchRequest) -> Result<MatchRequest, MatchingError> {
        debug!("Inserting match request {}", request.id);
        let body = serde_json::to_value(&request).map_err(|e| MatchingError::Internal(e.to_string()))?;

        self.write_rows(Method::POST, MATCH_REQUESTS, body)
            .await
            .map_err(|e| match e {
                MatchingError::Conflict(_) => {
                    MatchingError::Conflict("You already have a pending or active request".to_string())
                }
                other => other,
            })?
            .into_iter()
            .next()
            .ok_or_else(|| MatchingError::Internal(format!("Insert of request {} returned no row", request.id)))
    }

    async fn compare_and_set_status(
        &self,
        request_id: Uuid,
        expected: MatchStatus,
        next: MatchStatus,
        changed_at: DateTime<Utc>,
    ) -> Result<Option<MatchRequest>, MatchingError> {
        debug!("Moving match request {} from {} to {}", request_id, expected, next);

        // The status filter makes the update a no-op when another writer got there first.
        let rows = self
            .write_rows(
                Method::PATCH,
                &format!("{}?id=eq.{}&status=eq.{}", MATCH_REQUESTS, request_id, expected),
                json!({ "status": next, "status_changed_at": changed_at }),
            )
            .await?;

        Ok(rows.into_iter().next())
    }

    async fn get(&self, request_id: Uuid) -> Result<Option<MatchRequest>, MatchingError> {
        Ok(self
            .fetch_rows(&format!("{}?id=eq.{}", MATCH_REQUESTS, request_id))
            .await?
            .into_iter()
            .next())
    }

    async fn active_for_patient(&self, patient_id: Uuid) -> Result<Option<MatchRequest>, MatchingError> {
        Ok(self
            .fetch_rows(&format!(
                "{}?patient_id=eq.{}&status={}",
                MATCH_REQUESTS,
                patient_id,
                status_filter(&[MatchStatus::Pending, MatchStatus::Accepted])
            ))
            .await?
            .into_iter()
            .next())
    }

    async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        statuses: &[MatchStatus],
    ) -> Result<Vec<MatchRequest>, MatchingError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_rows(&format!(
            "{}?doctor_id=eq.{}&status={}&order=created_at.asc",
            MATCH_REQUESTS,
            doctor_id,
            status_filter(statuses)
        ))
        .await
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<MatchRequest>, MatchingError> {
        self.fetch_rows(&format!("{}?patient_id=eq.{}&order=created_at.asc", MATCH_REQUESTS, patient_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_filter_uses_stored_names() {
        assert_eq!(
            status_filter(&[MatchStatus::Pending, MatchStatus::Accepted]),
            "in.(pending,accepted)"
        );
    }
}
