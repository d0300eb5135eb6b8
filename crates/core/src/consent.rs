//! Consent requests initiated by this organisation.

use crate::ledger::{ConsentInTransit, ConsentLedger, RecordOutcome};
use crate::patients::PatientStore;
use crate::EhrResult;
use ehr_types::{NonEmptyText, Urn};
use node_client::{ConsentJob, ConsentLogicApi, CreateConsent};
use std::sync::Arc;

pub struct ConsentRequester {
    consent_logic: Arc<dyn ConsentLogicApi>,
    ledger: Arc<dyn ConsentLedger>,
    patients: Arc<dyn PatientStore>,
    own_urn: Urn,
}

impl ConsentRequester {
    pub fn new(
        consent_logic: Arc<dyn ConsentLogicApi>,
        ledger: Arc<dyn ConsentLedger>,
        patients: Arc<dyn PatientStore>,
        own_urn: Urn,
    ) -> Self {
        Self {
            consent_logic,
            ledger,
            patients,
            own_urn,
        }
    }

    /// Asks the node to register consent for `actor` to access `patient_id`'s records held here,
    /// then records the job in the ledger so it shows as pending until the node completes it.
    ///
    /// # Errors
    ///
    /// - `EhrError::PatientNotFound` for an unknown patient
    /// - `EhrError::Node` when the node rejects or fails the request; nothing is recorded then
    pub async fn request(
        &self,
        patient_id: &str,
        actor: Urn,
        reason: NonEmptyText,
    ) -> EhrResult<ConsentJob> {
        let patient = self.patients.by_id(patient_id).await?;
        let subject = patient.subject_urn()?;

        let job = self
            .consent_logic
            .create(&CreateConsent {
                subject: subject.clone(),
                actor: actor.clone(),
                custodian: self.own_urn.clone(),
                reason: reason.clone(),
            })
            .await?;

        let entry = ConsentInTransit::new(
            job.job_id.clone(),
            subject,
            actor,
            self.own_urn.clone(),
            reason,
        );
        if self.ledger.record(entry).await? == RecordOutcome::Recorded {
            tracing::info!(
                "consent requested for patient {patient_id}: job {}",
                job.job_id
            );
        }
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryConsentLedger;
    use crate::patients::{InMemoryRecords, SeedData};
    use crate::testing::FakeNode;
    use crate::EhrError;

    const SELF_URN: &str = "urn:oid:2.16.840.1.113883.2.4.6.1:00000007";
    const ORG_A: &str = "urn:oid:2.16.840.1.113883.2.4.6.1:00000001";

    fn requester(node: &Arc<FakeNode>, ledger: Arc<InMemoryConsentLedger>) -> ConsentRequester {
        ConsentRequester::new(
            node.clone(),
            ledger,
            Arc::new(InMemoryRecords::new(SeedData::demo())),
            Urn::parse(SELF_URN).unwrap(),
        )
    }

    #[tokio::test]
    async fn records_accepted_job_in_ledger() {
        let node = FakeNode::new();
        let ledger = Arc::new(InMemoryConsentLedger::new());
        let job = requester(&node, ledger.clone())
            .request(
                "1",
                Urn::parse(ORG_A).unwrap(),
                NonEmptyText::new("treatment").unwrap(),
            )
            .await
            .expect("request should succeed");

        let subject = Urn::for_bsn("999999990").unwrap();
        let pending = ledger
            .pending_for(&subject, &Urn::parse(SELF_URN).unwrap())
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].job_id, job.job_id);
        assert_eq!(pending[0].proof_title.as_str(), "treatment");

        let created = node.created();
        assert_eq!(created[0].subject, subject);
        assert_eq!(created[0].custodian.as_str(), SELF_URN);
    }

    #[tokio::test]
    async fn rejected_job_leaves_ledger_untouched() {
        let node = FakeNode::new();
        node.fail_consent_create(true);
        let ledger = Arc::new(InMemoryConsentLedger::new());
        let result = requester(&node, ledger.clone())
            .request(
                "1",
                Urn::parse(ORG_A).unwrap(),
                NonEmptyText::new("treatment").unwrap(),
            )
            .await;
        assert!(matches!(result, Err(EhrError::Node(_))));
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_patient_is_not_sent_to_node() {
        let node = FakeNode::new();
        let result = requester(&node, Arc::new(InMemoryConsentLedger::new()))
            .request(
                "42",
                Urn::parse(ORG_A).unwrap(),
                NonEmptyText::new("treatment").unwrap(),
            )
            .await;
        assert!(matches!(result, Err(EhrError::PatientNotFound(_))));
        assert_eq!(node.calls().consent_create, 0);
    }
}
