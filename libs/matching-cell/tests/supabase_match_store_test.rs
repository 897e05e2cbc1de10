use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use matching_cell::{MatchLedger, MatchRequest, MatchStatus, MatchStore, MatchingError, SupabaseMatchStore};
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn store(mock_server: &MockServer) -> SupabaseMatchStore {
    SupabaseMatchStore::new(&TestConfig::with_supabase(&mock_server.uri()).to_app_config())
}

fn pending(patient_id: Uuid, doctor_id: Uuid) -> MatchRequest {
    let now = Utc::now();
    MatchRequest {
        id: Uuid::new_v4(),
        patient_id,
        doctor_id,
        status: MatchStatus::Pending,
        created_at: now,
        status_changed_at: now,
    }
}

#[tokio::test]
async fn test_insert_posts_row_and_returns_representation() {
    let mock_server = MockServer::start().await;
    let request = pending(Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("POST"))
        .and(path("/rest/v1/match_requests"))
        .and(header("Prefer", "return=representation"))
        .and(header("apikey", "test-anon-key"))
        .and(body_partial_json(json!({ "id": request.id, "status": "pending" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::match_request_row(request.id, request.patient_id, request.doctor_id, "pending")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let stored = store(&mock_server).insert_pending(request.clone()).await.unwrap();

    assert_eq!(stored.id, request.id);
    assert_eq!(stored.status, MatchStatus::Pending);
}

#[tokio::test]
async fn test_unique_index_violation_is_conflict() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/match_requests"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::error_response(
                "duplicate key value violates unique constraint \"match_requests_one_active_per_patient\"",
                "23505",
            ),
        ))
        .mount(&mock_server)
        .await;

    let result = store(&mock_server)
        .insert_pending(pending(Uuid::new_v4(), Uuid::new_v4()))
        .await;

    assert_matches!(
        result,
        Err(MatchingError::Conflict(msg)) if msg == "You already have a pending or active request"
    );
}

#[tokio::test]
async fn test_status_change_is_guarded_by_expected_status() {
    let mock_server = MockServer::start().await;
    let (id, patient, doctor) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/match_requests"))
        .and(query_param("id", format!("eq.{}", id)))
        .and(query_param("status", "eq.pending"))
        .and(body_partial_json(json!({ "status": "accepted" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::match_request_row(id, patient, doctor, "accepted")
        ])))
        .mount(&mock_server)
        .await;
    // Nothing matches once the row has left the expected status.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/match_requests"))
        .and(query_param("status", "eq.accepted"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let store = store(&mock_server);
    let accepted = store
        .compare_and_set_status(id, MatchStatus::Pending, MatchStatus::Accepted, Utc::now())
        .await
        .unwrap();
    assert_eq!(accepted.map(|r| r.status), Some(MatchStatus::Accepted));

    let stale = store
        .compare_and_set_status(id, MatchStatus::Accepted, MatchStatus::Cancelled, Utc::now())
        .await
        .unwrap();
    assert!(stale.is_none());
}

#[tokio::test]
async fn test_doctor_listing_filters_status_and_skips_bad_rows() {
    let mock_server = MockServer::start().await;
    let doctor = Uuid::new_v4();
    let good = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/match_requests"))
        .and(query_param("doctor_id", format!("eq.{}", doctor)))
        .and(query_param("status", "in.(pending)"))
        .and(query_param("order", "created_at.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::match_request_row(good, Uuid::new_v4(), doctor, "pending"),
            MockSupabaseResponses::match_request_row(Uuid::new_v4(), Uuid::new_v4(), doctor, "expired")
        ])))
        .mount(&mock_server)
        .await;

    let requests = store(&mock_server)
        .list_for_doctor(doctor, &[MatchStatus::Pending])
        .await
        .unwrap();

    assert_eq!(requests.iter().map(|r| r.id).collect::<Vec<_>>(), vec![good]);
}

#[tokio::test]
async fn test_active_lookup_queries_active_statuses() {
    let mock_server = MockServer::start().await;
    let (id, patient, doctor) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("GET"))
        .and(path("/rest/v1/match_requests"))
        .and(query_param("patient_id", format!("eq.{}", patient)))
        .and(query_param("status", "in.(pending,accepted)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::match_request_row(id, patient, doctor, "accepted")
        ])))
        .mount(&mock_server)
        .await;

    let active = store(&mock_server).active_for_patient(patient).await.unwrap();
    assert_eq!(active.map(|r| (r.id, r.status)), Some((id, MatchStatus::Accepted)));
}

#[tokio::test]
async fn test_store_outage_is_retryable_and_bad_credentials_are_not() {
    let mock_server = MockServer::start().await;
    let (down, locked) = (Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("GET"))
        .and(path("/rest/v1/match_requests"))
        .and(query_param("id", format!("eq.{}", down)))
        .respond_with(ResponseTemplate::new(503).set_body_json(
            MockSupabaseResponses::error_response("upstream down", "503"),
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/match_requests"))
        .and(query_param("id", format!("eq.{}", locked)))
        .respond_with(ResponseTemplate::new(401).set_body_json(
            MockSupabaseResponses::error_response("invalid api key", "401"),
        ))
        .mount(&mock_server)
        .await;

    let store = store(&mock_server);

    let outage = store.get(down).await.unwrap_err();
    assert_matches!(outage, MatchingError::DirectoryUnavailable(_));
    assert!(outage.is_retryable());

    let auth = store.get(locked).await.unwrap_err();
    assert_matches!(auth, MatchingError::Internal(_));
    assert!(!auth.is_retryable());
}

#[tokio::test]
async fn test_ledger_over_store_reports_conflict_from_index() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/match_requests"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::error_response("duplicate key value", "23505"),
        ))
        .mount(&mock_server)
        .await;

    let ledger = MatchLedger::new(Arc::new(store(&mock_server)));
    let result = ledger.create(Uuid::new_v4(), Uuid::new_v4()).await;

    assert_matches!(result, Err(MatchingError::Conflict(_)));
}
