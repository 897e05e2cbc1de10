use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::{AppConfig, DirectoryBackend};
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub directory_backend: DirectoryBackend,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            directory_backend: DirectoryBackend::Memory,
        }
    }
}

impl TestConfig {
    /// Config pointing the directory at a mock Supabase server.
    pub fn with_supabase(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            directory_backend: DirectoryBackend::Supabase,
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            directory_backend: self.directory_backend,
            directory_retry_attempts: 1,
            server_port: 3000,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn with_id(id: Uuid, role: &str) -> Self {
        Self {
            id: id.to_string(),
            email: format!("{}@example.com", role),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::parse_str(&self.id).unwrap_or_default()
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn bearer(user: &TestUser, secret: &str) -> String {
        format!("Bearer {}", Self::create_test_token(user, secret, None))
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn doctor_row(id: Uuid, display_name: &str, license_id: &str, specialties: &[&str]) -> serde_json::Value {
        json!({
            "id": id,
            "display_name": display_name,
            "license_id": license_id,
            "specialties": specialties,
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn patient_row(id: Uuid, display_name: &str) -> serde_json::Value {
        json!({
            "id": id,
            "display_name": display_name,
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn match_request_row(id: Uuid, patient_id: Uuid, doctor_id: Uuid, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "status": status,
            "created_at": "2024-01-01T00:00:00Z",
            "status_changed_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}
