use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::DirectoryError;
use crate::services::store::DirectoryStore;

/// Specialties offered on the registration form.
pub const SUGGESTED_SPECIALTIES: &[&str] = &[
    "Cardiologia",
    "Dermatologia",
    "Ginecologia",
    "Ortopedia",
    "Pediatria",
    "Psiquiatria",
    "Neurologia",
    "Urologia",
    "Endocrinologia",
    "Oftalmologia",
    "Otorrinolaringologia",
    "Oncologia",
    "Radiologia",
    "Reumatologia",
];

/// Form option standing in for a free-text specialty.
pub const OTHER_SPECIALTY: &str = "Outras";

/// Canonical spelling of a specialty: trimmed, inner whitespace collapsed, sentence case.
/// Returns `None` for blank input.
pub fn normalize_specialty(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let first = chars.next()?;

    Some(first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect())
}

/// Result of a catalog scan. A failed scan yields no entries and records why,
/// so callers decide how to surface it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecialtyCatalog {
    pub specialties: Vec<String>,
    pub unavailable: Option<String>,
}

impl SpecialtyCatalog {
    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }
}

/// Derives the set of specialties offered by at least one registered doctor.
/// Recomputed on every call so edits and removals are never served stale.
pub struct SpecialtyIndex {
    directory: Arc<dyn DirectoryStore>,
}

impl SpecialtyIndex {
    pub fn new(directory: Arc<dyn DirectoryStore>) -> Self {
        Self { directory }
    }

    /// Sorted, deduplicated specialties, or the directory failure that prevented the scan.
    pub async fn try_list_specialties(&self) -> Result<Vec<String>, DirectoryError> {
        let doctors = self.directory.list_doctors().await?;
        let specialties: BTreeSet<String> = doctors
            .iter()
            .flat_map(|doctor| doctor.specialties.iter())
            .filter_map(|s| normalize_specialty(s))
            .collect();

        debug!("Specialty catalog has {} entries from {} doctors", specialties.len(), doctors.len());
        Ok(specialties.into_iter().collect())
    }

    pub async fn list_specialties(&self) -> SpecialtyCatalog {
        match self.try_list_specialties().await {
            Ok(specialties) => SpecialtyCatalog {
                specialties,
                unavailable: None,
            },
            Err(e) => {
                warn!("Specialty catalog unavailable: {}", e);
                SpecialtyCatalog {
                    specialties: Vec::new(),
                    unavailable: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_specialty() {
        assert_eq!(normalize_specialty("  cardiologia ").as_deref(), Some("Cardiologia"));
        assert_eq!(normalize_specialty("PEDIATRIA").as_deref(), Some("Pediatria"));
        assert_eq!(
            normalize_specialty("medicina   de  FAMÍLIA").as_deref(),
            Some("Medicina de família")
        );
        assert_eq!(normalize_specialty("   "), None);
        assert_eq!(normalize_specialty(""), None);
    }

    #[test]
    fn test_suggested_specialties_are_normalized() {
        for specialty in SUGGESTED_SPECIALTIES {
            assert_eq!(normalize_specialty(specialty).as_deref(), Some(*specialty));
        }
    }
}
