use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use directory_cell::{normalize_specialty, DirectoryError, DirectoryStore, DoctorProfile, SpecialtyIndex};
use shared_config::AppConfig;

use crate::error::MatchingError;
use crate::models::{ActiveRelationship, Decision, MatchRequest, MatchStatus, Party, PatientRequest};
use crate::services::ledger::MatchLedger;
use crate::services::watch::RelationshipStream;

/// Bounded local retry for transient directory failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 1 }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            attempts: config.directory_retry_attempts,
        }
    }

    /// Run a directory call, retrying only errors that are retryable.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, MatchingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DirectoryError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await.map_err(MatchingError::from) {
                Err(err) if err.is_retryable() && attempt < self.attempts => {
                    attempt += 1;
                    warn!("{} failed ({}), retry {}/{}", operation, err, attempt, self.attempts);
                }
                Err(err) => {
                    if err.is_retryable() {
                        error!("{} failed after {} attempts: {}", operation, attempt + 1, err);
                    }
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }
}

/// Patient and doctor facing operations over the directory and the ledger.
pub struct DoctorMatchingService {
    directory: Arc<dyn DirectoryStore>,
    specialties: SpecialtyIndex,
    ledger: Arc<MatchLedger>,
    retry: RetryPolicy,
}

impl DoctorMatchingService {
    pub fn new(directory: Arc<dyn DirectoryStore>, ledger: Arc<MatchLedger>, retry: RetryPolicy) -> Self {
        Self {
            specialties: SpecialtyIndex::new(directory.clone()),
            directory,
            ledger,
            retry,
        }
    }

    pub fn ledger(&self) -> &Arc<MatchLedger> {
        &self.ledger
    }

    /// Sorted, deduplicated specialties offered by registered doctors.
    pub async fn list_specialties(&self) -> Result<Vec<String>, MatchingError> {
        self.retry
            .run("list_specialties", || self.specialties.try_list_specialties())
            .await
    }

    /// Doctors offering `specialty`, ordered by name, never including `exclude_doctor_id`.
    pub async fn search_doctors(
        &self,
        specialty: &str,
        exclude_doctor_id: Option<Uuid>,
    ) -> Result<Vec<DoctorProfile>, MatchingError> {
        let specialty = normalize_specialty(specialty)
            .ok_or_else(|| MatchingError::Validation("Specialty is required".to_string()))?;
        debug!("Searching doctors for {} excluding {:?}", specialty, exclude_doctor_id);

        let doctors = self
            .retry
            .run("list_doctors", || self.directory.list_doctors())
            .await?;

        let matches: Vec<DoctorProfile> = doctors
            .into_iter()
            .filter(|doctor| Some(doctor.id) != exclude_doctor_id)
            .filter(|doctor| {
                doctor
                    .specialties
                    .iter()
                    .any(|offered| normalize_specialty(offered).as_deref() == Some(specialty.as_str()))
            })
            .collect();

        debug!("{} doctors offer {}", matches.len(), specialty);
        Ok(matches)
    }

    /// Search on behalf of a patient, hiding the doctor they are already matched with.
    pub async fn search_doctors_for_patient(
        &self,
        patient_id: Uuid,
        specialty: &str,
    ) -> Result<Vec<DoctorProfile>, MatchingError> {
        let accepted_doctor = self
            .ledger
            .get_active_for_patient(patient_id)
            .await?
            .filter(|r| r.status == MatchStatus::Accepted)
            .map(|r| r.doctor_id);

        self.search_doctors(specialty, accepted_doctor).await
    }

    pub async fn request_doctor(&self, patient_id: Uuid, doctor_id: Uuid) -> Result<MatchRequest, MatchingError> {
        debug!("Patient {} requesting doctor {}", patient_id, doctor_id);

        self.retry
            .run("get_patient", || self.directory.get_patient(patient_id))
            .await?;
        self.retry
            .run("get_doctor", || self.directory.get_doctor(doctor_id))
            .await?;

        self.ledger.create(patient_id, doctor_id).await.map_err(|err| match err {
            MatchingError::Conflict(_) => {
                MatchingError::Conflict("You already have a pending or active request".to_string())
            }
            other => other,
        })
    }

    pub async fn respond_to_request(
        &self,
        request_id: Uuid,
        doctor_id: Uuid,
        decision: Decision,
    ) -> Result<MatchRequest, MatchingError> {
        debug!("Doctor {} answering request {} with {:?}", doctor_id, request_id, decision);

        match decision {
            Decision::Accept => self.ledger.accept(request_id, doctor_id).await,
            Decision::Reject => self.ledger.reject(request_id, doctor_id).await,
        }
    }

    pub async fn cancel_request(&self, request_id: Uuid, user_id: Uuid) -> Result<MatchRequest, MatchingError> {
        debug!("User {} cancelling request {}", user_id, request_id);
        self.ledger.cancel(request_id, user_id).await
    }

    pub async fn watch_active_relationship(&self, party: Party) -> Result<RelationshipStream, MatchingError> {
        info!("Watching relationships of {}", party);
        self.ledger.subscribe(party).await
    }

    /// The patient's active request with the doctor it targets.
    pub async fn active_relationship(&self, patient_id: Uuid) -> Result<Option<ActiveRelationship>, MatchingError> {
        let Some(request) = self.ledger.get_active_for_patient(patient_id).await? else {
            return Ok(None);
        };

        let doctor_id = request.doctor_id;
        let doctor = self
            .optional_profile("get_doctor", request.id, || self.directory.get_doctor(doctor_id))
            .await?;

        Ok(Some(ActiveRelationship { request, doctor }))
    }

    pub async fn pending_requests(&self, doctor_id: Uuid) -> Result<Vec<PatientRequest>, MatchingError> {
        let requests = self.ledger.list_pending_for_doctor(doctor_id).await?;
        self.with_patients(requests).await
    }

    pub async fn doctor_patients(&self, doctor_id: Uuid) -> Result<Vec<PatientRequest>, MatchingError> {
        let requests = self.ledger.list_accepted_for_doctor(doctor_id).await?;
        self.with_patients(requests).await
    }

    pub async fn history(&self, patient_id: Uuid) -> Result<Vec<MatchRequest>, MatchingError> {
        self.ledger.history_for_patient(patient_id).await
    }

    async fn with_patients(&self, requests: Vec<MatchRequest>) -> Result<Vec<PatientRequest>, MatchingError> {
        let mut joined = Vec::with_capacity(requests.len());

        for request in requests {
            let patient_id = request.patient_id;
            let patient = self
                .optional_profile("get_patient", request.id, || self.directory.get_patient(patient_id))
                .await?;
            joined.push(PatientRequest { request, patient });
        }

        Ok(joined)
    }

    /// Profile lookup for the joined views. A profile gone from the directory leaves the
    /// request visible without it; any other failure fails the view.
    async fn optional_profile<T, F, Fut>(
        &self,
        operation: &str,
        request_id: Uuid,
        call: F,
    ) -> Result<Option<T>, MatchingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DirectoryError>>,
    {
        match self.retry.run(operation, call).await {
            Ok(profile) => Ok(Some(profile)),
            Err(MatchingError::NotFound(what)) => {
                warn!("Request {} shown without profile: {} not in directory", request_id, what);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
