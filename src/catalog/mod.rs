//! Study records: which mask belongs to which patient and timepoint.
//!
//! The engine itself only sees locators. The catalog turns a patient and
//! optional study ids into the pair of mask locators to compare.

mod json;

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

pub use json::JsonStudyCatalog;

// =============================================================================
// Records
// =============================================================================

/// One imaging study of a patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyRecord {
    #[serde(alias = "study_id", alias = "id", alias = "_id")]
    pub study_id: String,

    #[serde(alias = "patient_id")]
    pub patient_id: String,

    /// Acquisition date, ISO-8601 (`2024-03-01` or `2024-03-01T09:30:00`)
    /// or DICOM `YYYYMMDD`.
    #[serde(alias = "study_date")]
    pub study_date: String,

    /// Locator of the segmentation mask, if one was produced.
    #[serde(default, alias = "mask_path", alias = "seg_mask_path")]
    pub mask_path: Option<String>,
}

impl StudyRecord {
    /// The mask locator, or an error if the study has none.
    pub fn mask_locator(&self) -> Result<&str, CatalogError> {
        self.mask_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| CatalogError::MaskMissing {
                study_id: self.study_id.clone(),
            })
    }

    /// Sort key built from the digits of the study date.
    ///
    /// `2024-03-01T09:30` and `20240301` compare as expected. Dates without
    /// at least a full `YYYYMMDD` yield `None` and sort after every dated study.
    pub fn date_key(&self) -> Option<String> {
        let mut digits: String = self
            .study_date
            .chars()
            .filter(char::is_ascii_digit)
            .take(14)
            .collect();
        if digits.len() < 8 {
            return None;
        }
        while digits.len() < 14 {
            digits.push('0');
        }
        Some(digits)
    }
}

/// Order studies chronologically, oldest first. Ties keep input order.
pub fn sort_by_date(studies: &mut [StudyRecord]) {
    studies.sort_by(|a, b| match (a.date_key(), b.date_key()) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

// =============================================================================
// Catalog Trait
// =============================================================================

/// Provider of study records.
#[async_trait]
pub trait StudyCatalog: Send + Sync {
    /// All studies of a patient, oldest first.
    ///
    /// Returns [`CatalogError::PatientNotFound`] for unknown patients.
    async fn studies_for_patient(&self, patient_id: &str) -> Result<Vec<StudyRecord>, CatalogError>;

    /// A single study of a patient.
    async fn find_study(
        &self,
        patient_id: &str,
        study_id: &str,
    ) -> Result<StudyRecord, CatalogError> {
        self.studies_for_patient(patient_id)
            .await?
            .into_iter()
            .find(|s| s.study_id == study_id)
            .ok_or_else(|| CatalogError::StudyNotFound {
                patient_id: patient_id.to_string(),
                study_id: study_id.to_string(),
            })
    }
}

// =============================================================================
// Pair Resolution
// =============================================================================

/// Baseline and follow-up studies chosen for a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyPair {
    pub baseline: StudyRecord,
    pub follow_up: StudyRecord,
}

/// Pick the studies to compare for a patient.
///
/// Missing ids default to the earliest study (baseline) and the latest
/// study (follow-up). Defaulting needs at least two studies; with both ids
/// given, any two studies (even the same one twice) are accepted.
pub async fn resolve_pair<C: StudyCatalog + ?Sized>(
    catalog: &C,
    patient_id: &str,
    baseline_id: Option<&str>,
    follow_up_id: Option<&str>,
) -> Result<StudyPair, CatalogError> {
    let studies = catalog.studies_for_patient(patient_id).await?;

    if (baseline_id.is_none() || follow_up_id.is_none()) && studies.len() < 2 {
        return Err(CatalogError::NotEnoughStudies {
            patient_id: patient_id.to_string(),
            count: studies.len(),
        });
    }

    let pick = |id: Option<&str>, fallback: Option<&StudyRecord>| {
        let found = match id {
            Some(id) => studies.iter().find(|s| s.study_id == id),
            None => fallback,
        };
        found.cloned().ok_or_else(|| CatalogError::StudyNotFound {
            patient_id: patient_id.to_string(),
            study_id: id.unwrap_or_default().to_string(),
        })
    };

    Ok(StudyPair {
        baseline: pick(baseline_id, studies.first())?,
        follow_up: pick(follow_up_id, studies.last())?,
    })
}
