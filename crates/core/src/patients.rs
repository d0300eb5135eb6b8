//! Local patient records.
//!
//! The EHR's own patients and their observations live behind [`PatientStore`] and
//! [`ObservationStore`]. The bundled [`InMemoryRecords`] implementation is seeded at startup from a
//! YAML file or from built-in demo data.
//!
//! ## Seed file layout
//!
//! ```yaml
//! patients:
//!   - id: "1"
//!     bsn: "999999990"
//!     firstName: Fred
//!     lastName: Jansen
//!     birthDate: 1954-04-01
//! observations:
//!   - id: "obs-1"
//!     patientId: "1"
//!     code: "8867-4"
//!     display: Heart rate
//!     value: "72"
//!     unit: "/min"
//! ```

use crate::{EhrError, EhrResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use ehr_types::{Urn, UrnError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::RwLock;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub bsn: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

impl Patient {
    /// URN under which this patient is the subject of consents.
    pub fn subject_urn(&self) -> Result<Urn, UrnError> {
        Urn::for_bsn(&self.bsn)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: String,
    pub patient_id: String,
    pub code: String,
    pub display: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective: Option<NaiveDate>,
}

#[async_trait]
pub trait PatientStore: Send + Sync {
    /// # Errors
    ///
    /// [`EhrError::PatientNotFound`] when no patient has this id.
    async fn by_id(&self, id: &str) -> EhrResult<Patient>;

    /// # Errors
    ///
    /// [`EhrError::PatientNotFound`] when no patient has this BSN.
    async fn by_bsn(&self, bsn: &str) -> EhrResult<Patient>;

    async fn all(&self) -> EhrResult<Vec<Patient>>;
}

#[async_trait]
pub trait ObservationStore: Send + Sync {
    async fn by_patient_id(&self, patient_id: &str) -> EhrResult<Vec<Observation>>;
}

/// Contents of a seed file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub patients: Vec<Patient>,
    #[serde(default)]
    pub observations: Vec<Observation>,
}

impl SeedData {
    /// Reads and validates a YAML seed file.
    ///
    /// # Errors
    ///
    /// Returns `EhrError` if the file cannot be read or parsed, if two patients share an id or
    /// BSN, or if a BSN is not a valid 8 or 9 digit number.
    pub fn load(path: &Path) -> EhrResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(EhrError::SeedRead)?;
        let seed: SeedData = serde_yaml::from_str(&raw).map_err(EhrError::SeedParse)?;
        seed.validate()?;
        Ok(seed)
    }

    fn validate(&self) -> EhrResult<()> {
        let mut ids = std::collections::HashSet::new();
        let mut bsns = std::collections::HashSet::new();
        for patient in &self.patients {
            patient.subject_urn()?;
            if !ids.insert(patient.id.as_str()) {
                return Err(EhrError::InvalidInput(format!(
                    "duplicate patient id in seed: {}",
                    patient.id
                )));
            }
            if !bsns.insert(patient.bsn.as_str()) {
                return Err(EhrError::InvalidInput(format!(
                    "duplicate patient BSN in seed: {}",
                    patient.bsn
                )));
            }
        }
        Ok(())
    }

    /// Built-in demo patients used when no seed file is configured.
    pub fn demo() -> Self {
        let patient = |id: &str, bsn: &str, first: &str, last: &str, born: (i32, u32, u32)| {
            Patient {
                id: id.into(),
                bsn: bsn.into(),
                first_name: first.into(),
                last_name: last.into(),
                birth_date: NaiveDate::from_ymd_opt(born.0, born.1, born.2),
                gender: None,
            }
        };
        let observation = |id: &str, patient_id: &str, code: &str, display: &str, value: &str| {
            Observation {
                id: id.into(),
                patient_id: patient_id.into(),
                code: code.into(),
                display: display.into(),
                value: value.into(),
                unit: None,
                effective: None,
            }
        };
        Self {
            patients: vec![
                patient("1", "999999990", "Fred", "Jansen", (1954, 4, 1)),
                patient("2", "999999011", "Ingrid", "de Vries", (1971, 11, 23)),
                patient("3", "999999023", "Sem", "Bakker", (2009, 2, 14)),
            ],
            observations: vec![
                observation("obs-1", "1", "8867-4", "Heart rate", "72"),
                observation("obs-2", "1", "8480-6", "Systolic blood pressure", "135"),
                observation("obs-3", "2", "29463-7", "Body weight", "68"),
            ],
        }
    }
}

/// In-memory patient and observation repository.
#[derive(Debug, Default)]
pub struct InMemoryRecords {
    patients: RwLock<Vec<Patient>>,
    observations: RwLock<Vec<Observation>>,
}

impl InMemoryRecords {
    pub fn new(seed: SeedData) -> Self {
        Self {
            patients: RwLock::new(seed.patients),
            observations: RwLock::new(seed.observations),
        }
    }
}

#[async_trait]
impl PatientStore for InMemoryRecords {
    async fn by_id(&self, id: &str) -> EhrResult<Patient> {
        self.patients
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| EhrError::PatientNotFound(format!("id {id}")))
    }

    async fn by_bsn(&self, bsn: &str) -> EhrResult<Patient> {
        self.patients
            .read()
            .await
            .iter()
            .find(|p| p.bsn == bsn)
            .cloned()
            .ok_or_else(|| EhrError::PatientNotFound(format!("bsn {bsn}")))
    }

    async fn all(&self) -> EhrResult<Vec<Patient>> {
        Ok(self.patients.read().await.clone())
    }
}

#[async_trait]
impl ObservationStore for InMemoryRecords {
    async fn by_patient_id(&self, patient_id: &str) -> EhrResult<Vec<Observation>> {
        Ok(self
            .observations
            .read()
            .await
            .iter()
            .filter(|o| o.patient_id == patient_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn lookups_by_id_and_bsn() {
        let records = InMemoryRecords::new(SeedData::demo());
        assert_eq!(records.by_id("2").await.unwrap().first_name, "Ingrid");
        assert_eq!(records.by_bsn("999999990").await.unwrap().id, "1");
        assert!(matches!(
            records.by_bsn("123456789").await,
            Err(EhrError::PatientNotFound(_))
        ));
        assert_eq!(records.all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn observations_are_filtered_by_patient() {
        let records = InMemoryRecords::new(SeedData::demo());
        let obs = records.by_patient_id("1").await.unwrap();
        assert_eq!(obs.len(), 2);
        assert!(records.by_patient_id("3").await.unwrap().is_empty());
    }

    #[test]
    fn seed_file_loads_from_yaml() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "patients:\n  - id: \"7\"\n    bsn: \"123456782\"\n    firstName: Anna\n    lastName: Smit\n    birthDate: 1980-05-06\nobservations:\n  - id: o1\n    patientId: \"7\"\n    code: \"8867-4\"\n    display: Heart rate\n    value: \"60\"\n    unit: /min\n"
        )
        .expect("write seed");

        let seed = SeedData::load(file.path()).expect("seed should load");
        assert_eq!(seed.patients.len(), 1);
        assert_eq!(seed.patients[0].birth_date, NaiveDate::from_ymd_opt(1980, 5, 6));
        assert_eq!(seed.observations[0].unit.as_deref(), Some("/min"));
    }

    #[test]
    fn seed_file_rejects_duplicate_bsn() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "patients:\n  - {{id: \"1\", bsn: \"123456782\", firstName: A, lastName: B}}\n  - {{id: \"2\", bsn: \"123456782\", firstName: C, lastName: D}}\n"
        )
        .expect("write seed");
        assert!(matches!(
            SeedData::load(file.path()),
            Err(EhrError::InvalidInput(_))
        ));
    }

    #[test]
    fn seed_file_rejects_invalid_bsn() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "patients:\n  - {{id: \"1\", bsn: \"12\", firstName: A, lastName: B}}\n"
        )
        .expect("write seed");
        assert!(matches!(SeedData::load(file.path()), Err(EhrError::Urn(_))));
    }

    #[test]
    fn missing_seed_file_is_read_error() {
        let err = SeedData::load(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, EhrError::SeedRead(_)));
    }

    #[test]
    fn demo_seed_is_valid() {
        SeedData::demo().validate().expect("demo data should validate");
    }
}
