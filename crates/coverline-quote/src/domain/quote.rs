//! Quote and quote version entities.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::corollary::{
    CreditNote, Enquiry, FileAttachment, Invoice, QuoteDocument, Submission,
};
use super::data::{CustomerDetailsRecord, DataRecord, DataSnapshot, DataSnapshotIds};
use super::outcome::{
    FundingProposalAcceptanceResult, FundingProposalCreationResult, PaymentAttemptResult,
};
use super::patch::{
    DataPatch, DataPatchType, PatchScope, PatchTarget, PatchableDataHolder, write_if_targeted,
};

/// The business transaction a quote is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteType {
    /// A new policy.
    NewBusiness,
    /// Renewal of an existing policy.
    Renewal,
    /// Mid-term adjustment of an existing policy.
    Adjustment,
    /// Cancellation of an existing policy.
    Cancellation,
}

impl fmt::Display for QuoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An immutable, numbered snapshot of a quote's data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteVersion {
    /// Version identifier.
    pub version_id: Uuid,
    /// One-based version number within the quote.
    pub version_number: u32,
    /// The data as it stood when the version was created.
    pub data: DataSnapshot,
    /// Sequence number of the event that created the version.
    pub created_sequence_number: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl QuoteVersion {
    fn target(&self, quote_id: Uuid) -> PatchTarget {
        PatchTarget::QuoteVersion {
            quote_id,
            version_number: self.version_number,
        }
    }

    fn document(&self, kind: DataPatchType) -> Option<&DataRecord> {
        match kind {
            DataPatchType::FormData => self.data.form_data.as_ref(),
            DataPatchType::CalculationResult => self.data.calculation_result.as_ref(),
        }
    }

    /// Whether `target` addresses this version of quote `quote_id`.
    #[must_use]
    pub fn is_applicable(&self, quote_id: Uuid, target: &PatchTarget) -> bool {
        *target == self.target(quote_id)
    }

    /// Writes `patch` into this version if it is one of the patch targets.
    pub fn apply_patch(&mut self, quote_id: Uuid, patch: &DataPatch) -> bool {
        let target = self.target(quote_id);
        let record = match patch.kind {
            DataPatchType::FormData => self.data.form_data.as_mut(),
            DataPatchType::CalculationResult => self.data.calculation_result.as_mut(),
        };
        record.is_some_and(|r| write_if_targeted(patch, &target, &mut r.data))
    }
}

/// One quote within an aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Quote identifier.
    pub id: Uuid,
    /// Human facing quote number, once assigned.
    pub quote_number: Option<String>,
    /// Business transaction type.
    pub quote_type: QuoteType,
    /// The quote this one was cloned from.
    pub parent_quote_id: Option<Uuid>,
    /// Current workflow state name.
    pub workflow_state: String,
    /// Current workflow step, as recorded by the form.
    pub workflow_step: Option<String>,
    /// Latest form data.
    pub form_data: Option<DataRecord>,
    /// Latest calculation result.
    pub calculation_result: Option<DataRecord>,
    /// When the quote expires, if it does.
    pub expiry: Option<DateTime<Utc>>,
    /// Logically terminated.
    pub discarded: bool,
    /// Whether the quote has been bound.
    pub bound: bool,
    /// Numbered versions, in creation order.
    pub versions: Vec<QuoteVersion>,
    /// Submissions.
    pub submissions: Vec<Submission>,
    /// Enquiries.
    pub enquiries: Vec<Enquiry>,
    /// Invoices.
    pub invoices: Vec<Invoice>,
    /// Credit notes.
    pub credit_notes: Vec<CreditNote>,
    /// Uploaded files.
    pub files: Vec<FileAttachment>,
    /// Generated documents.
    pub documents: Vec<QuoteDocument>,
    /// Latest payment attempt.
    pub latest_payment: Option<PaymentAttemptResult>,
    /// Latest funding proposal creation attempt.
    pub latest_funding_proposal_creation: Option<FundingProposalCreationResult>,
    /// Latest funding proposal acceptance attempt.
    pub latest_funding_proposal_acceptance: Option<FundingProposalAcceptanceResult>,
    /// Policy transaction this quote produced, once issued.
    pub policy_transaction_id: Option<Uuid>,
    /// Sequence number of the creating event.
    pub created_sequence_number: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Quote {
    /// Creates a quote in the given workflow state with no data.
    #[must_use]
    pub fn new(
        id: Uuid,
        quote_type: QuoteType,
        workflow_state: impl Into<String>,
        created_sequence_number: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            quote_number: None,
            quote_type,
            parent_quote_id: None,
            workflow_state: workflow_state.into(),
            workflow_step: None,
            form_data: None,
            calculation_result: None,
            expiry: None,
            discarded: false,
            bound: false,
            versions: Vec::new(),
            submissions: Vec::new(),
            enquiries: Vec::new(),
            invoices: Vec::new(),
            credit_notes: Vec::new(),
            files: Vec::new(),
            documents: Vec::new(),
            latest_payment: None,
            latest_funding_proposal_creation: None,
            latest_funding_proposal_acceptance: None,
            policy_transaction_id: None,
            created_sequence_number,
            created_at,
        }
    }

    /// The quote's current data, with the aggregate's customer details.
    #[must_use]
    pub fn data_snapshot(&self, customer_details: Option<&CustomerDetailsRecord>) -> DataSnapshot {
        DataSnapshot {
            form_data: self.form_data.clone(),
            calculation_result: self.calculation_result.clone(),
            customer_details: customer_details.cloned(),
        }
    }

    /// Identifiers of the quote's current data.
    #[must_use]
    pub fn data_snapshot_ids(
        &self,
        customer_details: Option<&CustomerDetailsRecord>,
    ) -> DataSnapshotIds {
        DataSnapshotIds {
            form_data_id: self.form_data.as_ref().map(|r| r.id),
            calculation_result_id: self.calculation_result.as_ref().map(|r| r.id),
            customer_details_id: customer_details.map(|r| r.id),
        }
    }

    /// Looks up a version by number.
    #[must_use]
    pub fn version(&self, version_number: u32) -> Option<&QuoteVersion> {
        self.versions
            .iter()
            .find(|v| v.version_number == version_number)
    }

    /// The number the next version will get.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn next_version_number(&self) -> u32 {
        self.versions.len() as u32 + 1
    }

    /// Whether the quote has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }

    fn document(&self, kind: DataPatchType) -> Option<&DataRecord> {
        match kind {
            DataPatchType::FormData => self.form_data.as_ref(),
            DataPatchType::CalculationResult => self.calculation_result.as_ref(),
        }
    }
}

impl PatchableDataHolder for Quote {
    fn patch_candidates(
        &self,
        kind: DataPatchType,
        scope: &PatchScope,
    ) -> Vec<(PatchTarget, &Value)> {
        // (include latest data, version number filter; `None` means every version)
        let (latest, versions) = match *scope {
            PatchScope::EntireAggregate => (true, Some(None)),
            PatchScope::QuoteFull { quote_id } if quote_id == self.id => (true, Some(None)),
            PatchScope::QuoteLatest { quote_id } if quote_id == self.id => (true, None),
            PatchScope::QuoteVersion {
                quote_id,
                version_number,
            } if quote_id == self.id => (false, Some(Some(version_number))),
            _ => return Vec::new(),
        };

        let mut candidates = Vec::new();
        if latest {
            if let Some(record) = self.document(kind) {
                candidates.push((PatchTarget::Quote { quote_id: self.id }, &record.data));
            }
        }
        let selected = self.versions.iter().filter(|v| match versions {
            Some(None) => true,
            Some(Some(number)) => v.version_number == number,
            None => false,
        });
        for version in selected {
            if let Some(record) = version.document(kind) {
                candidates.push((version.target(self.id), &record.data));
            }
        }
        candidates
    }

    fn is_applicable(&self, target: &PatchTarget) -> bool {
        match target {
            PatchTarget::Quote { quote_id } => *quote_id == self.id,
            PatchTarget::QuoteVersion { .. } => {
                self.versions.iter().any(|v| v.is_applicable(self.id, target))
            }
            PatchTarget::PolicyTransaction { .. } => false,
        }
    }

    fn apply_patch(&mut self, patch: &DataPatch) -> bool {
        let own_target = PatchTarget::Quote { quote_id: self.id };
        let record = match patch.kind {
            DataPatchType::FormData => self.form_data.as_mut(),
            DataPatchType::CalculationResult => self.calculation_result.as_mut(),
        };
        let mut applied =
            record.is_some_and(|r| write_if_targeted(patch, &own_target, &mut r.data));
        for version in &mut self.versions {
            applied |= version.apply_patch(self.id, patch);
        }
        applied
    }
}
