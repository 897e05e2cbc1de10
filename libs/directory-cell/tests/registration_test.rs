use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use directory_cell::handlers::DirectoryState;
use directory_cell::router::directory_routes;
use directory_cell::{
    DirectoryError, DirectoryStore, InMemoryDirectory, RegisterDoctorRequest, RegisterPatientRequest,
    RegistrationService,
};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn doctor_form(license: &str, specialties: &[&str]) -> RegisterDoctorRequest {
    RegisterDoctorRequest {
        display_name: "Ana Souza".to_string(),
        email: "ana@example.com".to_string(),
        password: "secret1".to_string(),
        confirm_password: "secret1".to_string(),
        license_id: license.to_string(),
        specialties: specialties.iter().map(|s| s.to_string()).collect(),
        other_specialty: None,
    }
}

#[tokio::test]
async fn test_register_doctor_normalizes_license_and_specialties() {
    let directory = Arc::new(InMemoryDirectory::new());
    let service = RegistrationService::new(directory.clone());
    let account = Uuid::new_v4();

    let doctor = service
        .register_doctor(account, doctor_form(" 12345 - sp ", &["cardiologia", "Cardiologia"]))
        .await
        .unwrap();

    assert_eq!(doctor.id, account);
    assert_eq!(doctor.license_id.as_str(), "12345-SP");
    assert_eq!(doctor.specialties.len(), 1);
    assert_eq!(directory.get_doctor(account).await.unwrap(), doctor);
}

#[tokio::test]
async fn test_duplicate_license_is_conflict() {
    let directory = Arc::new(InMemoryDirectory::new());
    let service = RegistrationService::new(directory.clone());

    service
        .register_doctor(Uuid::new_v4(), doctor_form("12345-SP", &["Pediatria"]))
        .await
        .unwrap();

    let second = service
        .register_doctor(Uuid::new_v4(), doctor_form("12345-sp", &["Cardiologia"]))
        .await;

    assert_matches!(second, Err(DirectoryError::Conflict(_)));
    assert_eq!(directory.doctor_count().await, 1);
}

#[tokio::test]
async fn test_bad_license_format_is_validation_error() {
    let service = RegistrationService::new(Arc::new(InMemoryDirectory::new()));

    let result = service
        .register_doctor(Uuid::new_v4(), doctor_form("12-SP", &["Pediatria"]))
        .await;

    assert_matches!(result, Err(DirectoryError::Validation(msg)) if msg.contains("12345-SP"));
}

#[tokio::test]
async fn test_register_patient_requires_matching_passwords() {
    let service = RegistrationService::new(Arc::new(InMemoryDirectory::new()));

    let result = service
        .register_patient(
            Uuid::new_v4(),
            RegisterPatientRequest {
                display_name: "Paulo Reis".to_string(),
                email: "paulo@example.com".to_string(),
                password: "secret1".to_string(),
                confirm_password: "secret2".to_string(),
            },
        )
        .await;

    assert_matches!(result, Err(DirectoryError::Validation(_)));
}

#[tokio::test]
async fn test_only_owner_amends_specialties() {
    let directory = Arc::new(InMemoryDirectory::new());
    let service = RegistrationService::new(directory.clone());
    let doctor_id = Uuid::new_v4();

    service
        .register_doctor(doctor_id, doctor_form("12345-SP", &["Pediatria"]))
        .await
        .unwrap();

    let intruder = service
        .amend_specialties(doctor_id, Uuid::new_v4(), &["Cardiologia".to_string()])
        .await;
    assert_matches!(intruder, Err(DirectoryError::Unauthorized(_)));

    let amended = service
        .amend_specialties(doctor_id, doctor_id, &["cardiologia".to_string(), "Neurologia".to_string()])
        .await
        .unwrap();
    assert!(amended.offers("Cardiologia"));
    assert!(!amended.offers("Pediatria"));
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_register_and_list_specialties_over_http() {
    let test_config = TestConfig::default();
    let state = DirectoryState::new(test_config.to_arc(), Arc::new(InMemoryDirectory::new()));
    let app = directory_routes(state);
    let doctor = TestUser::doctor("ana@example.com");

    let request = Request::builder()
        .method("POST")
        .uri("/doctors")
        .header("Authorization", JwtTestUtils::bearer(&doctor, &test_config.jwt_secret))
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({
                "display_name": "Ana Souza",
                "email": "ana@example.com",
                "password": "secret1",
                "confirm_password": "secret1",
                "license_id": "12345-SP",
                "specialties": ["Dermatologia", "Outras"],
                "other_specialty": "Geriatria"
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["id"], doctor.id);

    let response = app
        .oneshot(Request::builder().uri("/specialties").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let catalog = body_json(response).await;
    assert_eq!(catalog["specialties"], json!(["Dermatologia", "Geriatria"]));
}

#[tokio::test]
async fn test_register_requires_token() {
    let state = DirectoryState::new(TestConfig::default().to_arc(), Arc::new(InMemoryDirectory::new()));
    let app = directory_routes(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/patients")
                .header("Content-Type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
