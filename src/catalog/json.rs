use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use super::{sort_by_date, StudyCatalog, StudyRecord};
use crate::error::CatalogError;

#[derive(Debug, Deserialize)]
struct PatientEntry {
    #[serde(alias = "patientId")]
    patient_id: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    patients: Vec<PatientEntry>,
    #[serde(default)]
    studies: Vec<StudyRecord>,
}

/// Study catalog held in memory, loaded from a JSON document.
///
/// ```json
/// {
///   "patients": [{ "patient_id": "P-001" }],
///   "studies": [
///     { "study_id": "s1", "patient_id": "P-001",
///       "study_date": "2024-01-10", "seg_mask_path": "/uploads/s1_mask.png" }
///   ]
/// }
/// ```
///
/// Patients listed without studies are known but have nothing to compare.
#[derive(Debug, Clone, Default)]
pub struct JsonStudyCatalog {
    by_patient: HashMap<String, Vec<StudyRecord>>,
}

impl JsonStudyCatalog {
    /// Parse a catalog document.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_json::from_str(json).map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        let mut catalog = Self::from_records(file.studies);
        for patient in file.patients {
            catalog.by_patient.entry(patient.patient_id).or_default();
        }
        Ok(catalog)
    }

    /// Read and parse a catalog file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CatalogError::Unavailable(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Build a catalog directly from records.
    pub fn from_records(records: impl IntoIterator<Item = StudyRecord>) -> Self {
        let mut by_patient: HashMap<String, Vec<StudyRecord>> = HashMap::new();
        for study in records {
            by_patient
                .entry(study.patient_id.clone())
                .or_default()
                .push(study);
        }
        for studies in by_patient.values_mut() {
            sort_by_date(studies);
        }
        Self { by_patient }
    }

    pub fn patient_count(&self) -> usize {
        self.by_patient.len()
    }

    pub fn study_count(&self) -> usize {
        self.by_patient.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl StudyCatalog for JsonStudyCatalog {
    async fn studies_for_patient(&self, patient_id: &str) -> Result<Vec<StudyRecord>, CatalogError> {
        self.by_patient
            .get(patient_id)
            .cloned()
            .ok_or_else(|| CatalogError::PatientNotFound(patient_id.to_string()))
    }
}
