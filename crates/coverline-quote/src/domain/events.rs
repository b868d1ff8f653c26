//! Domain events for the quote context.
//!
//! The event set is closed: every variant of [`QuoteEventKind`] has exactly
//! one apply handler in the aggregate, and adding a variant is a compile
//! error until it is handled.

use chrono::{DateTime, NaiveDate, Utc};
use coverline_core::event::{DomainEvent, EventMetadata};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::corollary::{FileAttachment, FundingProposal, PaymentDetails, QuoteDocument};
use super::data::{CustomerDetailsRecord, DataRecord, DataSnapshotIds};
use super::outcome::Outcome;
use super::patch::DataPatch;
use super::quote::QuoteType;
use super::workflow::QuoteAction;

/// Event type name for [`QuoteEventKind::QuoteInitialized`].
pub const QUOTE_INITIALIZED_EVENT_TYPE: &str = "quote.initialized";
/// Event type name for [`QuoteEventKind::QuoteImported`].
pub const QUOTE_IMPORTED_EVENT_TYPE: &str = "quote.imported";
/// Event type name for [`QuoteEventKind::RenewalQuoteCreated`].
pub const RENEWAL_QUOTE_CREATED_EVENT_TYPE: &str = "quote.renewal_quote_created";
/// Event type name for [`QuoteEventKind::AdjustmentQuoteCreated`].
pub const ADJUSTMENT_QUOTE_CREATED_EVENT_TYPE: &str = "quote.adjustment_quote_created";
/// Event type name for [`QuoteEventKind::CancellationQuoteCreated`].
pub const CANCELLATION_QUOTE_CREATED_EVENT_TYPE: &str = "quote.cancellation_quote_created";
/// Event type name for [`QuoteEventKind::QuoteStateChanged`].
pub const QUOTE_STATE_CHANGED_EVENT_TYPE: &str = "quote.state_changed";
/// Event type name for [`QuoteEventKind::FormDataUpdated`].
pub const FORM_DATA_UPDATED_EVENT_TYPE: &str = "quote.form_data_updated";
/// Event type name for [`QuoteEventKind::CalculationResultCreated`].
pub const CALCULATION_RESULT_CREATED_EVENT_TYPE: &str = "quote.calculation_result_created";

/// The first event of a new business aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteInitialized {
    /// The new quote.
    pub quote_id: Uuid,
    /// Owning organisation.
    pub organisation_id: Uuid,
    /// Product the quote is for.
    pub product_id: Uuid,
    /// Product release the quote was created against.
    pub product_release_id: Uuid,
    /// Quote number, if assigned at creation.
    pub quote_number: Option<String>,
    /// Workflow state the quote starts in.
    pub initial_state: String,
    /// Initial form data, if any was supplied.
    pub form_data: Option<DataRecord>,
}

/// A quote brought in from another system, with its state as it stood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteImported {
    /// The imported quote.
    pub quote_id: Uuid,
    /// Owning organisation.
    pub organisation_id: Uuid,
    /// Product.
    pub product_id: Uuid,
    /// Product release.
    pub product_release_id: Uuid,
    /// Transaction type of the imported quote.
    pub quote_type: QuoteType,
    /// Quote number.
    pub quote_number: Option<String>,
    /// Workflow state in the source system.
    pub workflow_state: String,
    /// Form data.
    pub form_data: Option<DataRecord>,
    /// Calculation result.
    pub calculation_result: Option<DataRecord>,
}

/// Payload shared by the renewal, adjustment and cancellation creation events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClonedQuoteCreated {
    /// The new quote.
    pub quote_id: Uuid,
    /// The quote it was cloned from.
    pub parent_quote_id: Uuid,
    /// Quote number of the new quote.
    pub quote_number: Option<String>,
    /// Form data carried over, with reset paths stripped.
    pub form_data: Option<DataRecord>,
}

/// A quote moved through its workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteStateChanged {
    /// The quote.
    pub quote_id: Uuid,
    /// The action performed.
    pub action: QuoteAction,
    /// State before the action.
    pub original_state: String,
    /// State after the action.
    pub resulting_state: String,
}

/// New form data for a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDataUpdated {
    /// The quote.
    pub quote_id: Uuid,
    /// The new revision.
    pub form_data: DataRecord,
}

/// A new calculation result for a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResultCreated {
    /// The quote.
    pub quote_id: Uuid,
    /// The new revision.
    pub calculation_result: DataRecord,
}

/// The aggregate was associated with a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerAssociated {
    /// The customer.
    pub customer_id: Uuid,
    /// The customer's details at the time.
    pub customer_details: CustomerDetailsRecord,
}

/// The associated customer's details changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetailsUpdated {
    /// The new revision.
    pub customer_details: CustomerDetailsRecord,
}

/// A user became the owner of the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerAssigned {
    /// The new owner.
    pub owner_user_id: Uuid,
}

/// The aggregate no longer has an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerUnassigned {
    /// The previous owner.
    pub previous_owner_user_id: Uuid,
}

/// A quote's expiry was set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteExpirySet {
    /// The quote.
    pub quote_id: Uuid,
    /// The expiry instant.
    pub expiry: DateTime<Utc>,
}

/// A quote's expiry was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteExpiryCleared {
    /// The quote.
    pub quote_id: Uuid,
}

/// A numbered version of a quote was saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteVersionCreated {
    /// The quote.
    pub quote_id: Uuid,
    /// The version.
    pub version_id: Uuid,
    /// One-based version number.
    pub version_number: u32,
}

/// A quote was logically terminated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteDiscarded {
    /// The quote.
    pub quote_id: Uuid,
}

/// A quote was bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteBound {
    /// The quote.
    pub quote_id: Uuid,
    /// Data the binding was made on.
    pub data_snapshot_ids: DataSnapshotIds,
}

/// A quote was submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSubmitted {
    /// The quote.
    pub quote_id: Uuid,
    /// The submission.
    pub submission_id: Uuid,
    /// Data submitted.
    pub data_snapshot_ids: DataSnapshotIds,
}

/// A customer made an enquiry about a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnquiryMade {
    /// The quote.
    pub quote_id: Uuid,
    /// The enquiry.
    pub enquiry_id: Uuid,
    /// Data at the time.
    pub data_snapshot_ids: DataSnapshotIds,
}

/// An invoice was issued for a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    /// The quote.
    pub quote_id: Uuid,
    /// The invoice.
    pub invoice_id: Uuid,
    /// Invoice number.
    pub invoice_number: String,
    /// Data invoiced.
    pub data_snapshot_ids: DataSnapshotIds,
}

/// A credit note was issued for a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNoteIssued {
    /// The quote.
    pub quote_id: Uuid,
    /// The credit note.
    pub credit_note_id: Uuid,
    /// Credit note number.
    pub credit_note_number: String,
    /// Data credited.
    pub data_snapshot_ids: DataSnapshotIds,
}

/// A payment went through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMade {
    /// The quote.
    pub quote_id: Uuid,
    /// What was charged.
    pub payment_details: PaymentDetails,
    /// Data the payment was for.
    pub data_snapshot_ids: DataSnapshotIds,
}

/// Payload shared by the failed-attempt events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailed {
    /// The quote.
    pub quote_id: Uuid,
    /// `Failed` or `Error`.
    pub outcome: Outcome,
    /// What went wrong.
    pub errors: Vec<String>,
    /// Data the attempt was made with.
    pub data_snapshot_ids: DataSnapshotIds,
}

/// Payload shared by the funding proposal created and accepted events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingProposalRecorded {
    /// The quote.
    pub quote_id: Uuid,
    /// The proposal.
    pub funding_proposal: FundingProposal,
    /// Data the proposal was made on.
    pub data_snapshot_ids: DataSnapshotIds,
}

/// A file was uploaded against a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttached {
    /// The quote.
    pub quote_id: Uuid,
    /// The file.
    pub attachment: FileAttachment,
}

/// A generated document was attached to a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAttached {
    /// The quote.
    pub quote_id: Uuid,
    /// The document.
    pub document: QuoteDocument,
}

/// The form recorded which workflow step a quote is on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStepAssigned {
    /// The quote.
    pub quote_id: Uuid,
    /// The step name.
    pub workflow_step: String,
}

/// A data patch was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDataPatched {
    /// The patch.
    pub patch: DataPatch,
}

/// A new business quote issued the aggregate's policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyIssued {
    /// The policy.
    pub policy_id: Uuid,
    /// Policy number.
    pub policy_number: String,
    /// The issuing quote.
    pub quote_id: Uuid,
    /// The new business transaction.
    pub policy_transaction_id: Uuid,
    /// Start of cover.
    pub inception_date: Option<NaiveDate>,
    /// End of cover.
    pub expiry_date: Option<NaiveDate>,
    /// Amount payable.
    pub total_payable: Decimal,
}

/// A renewal, adjustment or cancellation quote added a policy transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyTransactionCreated {
    /// The policy.
    pub policy_id: Uuid,
    /// The quote the transaction came from.
    pub quote_id: Uuid,
    /// The transaction.
    pub policy_transaction_id: Uuid,
    /// Type of the originating quote.
    pub quote_type: QuoteType,
    /// When the change takes effect.
    pub effective_date: Option<NaiveDate>,
    /// End of cover after the change.
    pub expiry_date: Option<NaiveDate>,
    /// Amount payable.
    pub total_payable: Decimal,
}

/// The policy records were deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDeleted {
    /// The policy.
    pub policy_id: Uuid,
}

/// The aggregate moved to another product release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReleaseMigrated {
    /// Release before the migration.
    pub previous_product_release_id: Uuid,
    /// Release after the migration.
    pub product_release_id: Uuid,
}

/// The aggregate moved to another organisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganisationMigrated {
    /// Organisation before the migration.
    pub previous_organisation_id: Uuid,
    /// Organisation after the migration.
    pub organisation_id: Uuid,
}

/// The stream was rolled back to an earlier sequence number.
///
/// The events to replay and to strip are derived on demand from the history
/// by [`crate::domain::rollback`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolledBack {
    /// The sequence number the stream was rolled back to.
    pub target_sequence_number: i64,
}

/// Legacy: a quote was saved. Kept so old streams stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSaved {
    /// The quote.
    pub quote_id: Uuid,
}

/// Legacy: a quote email was sent. Kept so old streams stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteEmailSent {
    /// The quote.
    pub quote_id: Uuid,
    /// The email.
    pub email_id: Uuid,
}

/// Event payload variants for the quote context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuoteEventKind {
    /// A new business aggregate was created.
    QuoteInitialized(QuoteInitialized),
    /// A quote was imported.
    QuoteImported(QuoteImported),
    /// A renewal quote was cloned from an earlier quote.
    RenewalQuoteCreated(ClonedQuoteCreated),
    /// An adjustment quote was cloned from an earlier quote.
    AdjustmentQuoteCreated(ClonedQuoteCreated),
    /// A cancellation quote was cloned from an earlier quote.
    CancellationQuoteCreated(ClonedQuoteCreated),
    /// A quote changed workflow state.
    QuoteStateChanged(QuoteStateChanged),
    /// A quote's form data was updated.
    FormDataUpdated(FormDataUpdated),
    /// A calculation ran.
    CalculationResultCreated(CalculationResultCreated),
    /// A customer was associated.
    CustomerAssociated(CustomerAssociated),
    /// The customer's details changed.
    CustomerDetailsUpdated(CustomerDetailsUpdated),
    /// An owner was assigned.
    OwnerAssigned(OwnerAssigned),
    /// The owner was unassigned.
    OwnerUnassigned(OwnerUnassigned),
    /// An expiry was set.
    QuoteExpirySet(QuoteExpirySet),
    /// An expiry was cleared.
    QuoteExpiryCleared(QuoteExpiryCleared),
    /// A version was saved.
    QuoteVersionCreated(QuoteVersionCreated),
    /// A quote was discarded.
    QuoteDiscarded(QuoteDiscarded),
    /// A quote was bound.
    QuoteBound(QuoteBound),
    /// A quote was submitted.
    QuoteSubmitted(QuoteSubmitted),
    /// An enquiry was made.
    EnquiryMade(EnquiryMade),
    /// An invoice was issued.
    InvoiceIssued(InvoiceIssued),
    /// A credit note was issued.
    CreditNoteIssued(CreditNoteIssued),
    /// A payment went through.
    PaymentMade(PaymentMade),
    /// A payment failed.
    PaymentFailed(AttemptFailed),
    /// A funding proposal was created.
    FundingProposalCreated(FundingProposalRecorded),
    /// Creating a funding proposal failed.
    FundingProposalCreationFailed(AttemptFailed),
    /// A funding proposal was accepted.
    FundingProposalAccepted(FundingProposalRecorded),
    /// Accepting a funding proposal failed.
    FundingProposalAcceptanceFailed(AttemptFailed),
    /// A file was attached.
    FileAttached(FileAttached),
    /// A document was attached.
    DocumentAttached(DocumentAttached),
    /// A workflow step was recorded.
    WorkflowStepAssigned(WorkflowStepAssigned),
    /// A data patch was recorded.
    PolicyDataPatched(PolicyDataPatched),
    /// The policy was issued.
    PolicyIssued(PolicyIssued),
    /// A policy transaction was added.
    PolicyTransactionCreated(PolicyTransactionCreated),
    /// The policy was deleted.
    PolicyDeleted(PolicyDeleted),
    /// The aggregate changed product release.
    ProductReleaseMigrated(ProductReleaseMigrated),
    /// The aggregate changed organisation.
    OrganisationMigrated(OrganisationMigrated),
    /// The stream was rolled back.
    RolledBack(RolledBack),
    /// Legacy save marker.
    QuoteSaved(QuoteSaved),
    /// Legacy email marker.
    QuoteEmailSent(QuoteEmailSent),
}

impl QuoteEventKind {
    /// The event type name used for storage routing.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::QuoteInitialized(_) => QUOTE_INITIALIZED_EVENT_TYPE,
            Self::QuoteImported(_) => QUOTE_IMPORTED_EVENT_TYPE,
            Self::RenewalQuoteCreated(_) => RENEWAL_QUOTE_CREATED_EVENT_TYPE,
            Self::AdjustmentQuoteCreated(_) => ADJUSTMENT_QUOTE_CREATED_EVENT_TYPE,
            Self::CancellationQuoteCreated(_) => CANCELLATION_QUOTE_CREATED_EVENT_TYPE,
            Self::QuoteStateChanged(_) => QUOTE_STATE_CHANGED_EVENT_TYPE,
            Self::FormDataUpdated(_) => FORM_DATA_UPDATED_EVENT_TYPE,
            Self::CalculationResultCreated(_) => CALCULATION_RESULT_CREATED_EVENT_TYPE,
            Self::CustomerAssociated(_) => "quote.customer_associated",
            Self::CustomerDetailsUpdated(_) => "quote.customer_details_updated",
            Self::OwnerAssigned(_) => "quote.owner_assigned",
            Self::OwnerUnassigned(_) => "quote.owner_unassigned",
            Self::QuoteExpirySet(_) => "quote.expiry_set",
            Self::QuoteExpiryCleared(_) => "quote.expiry_cleared",
            Self::QuoteVersionCreated(_) => "quote.version_created",
            Self::QuoteDiscarded(_) => "quote.discarded",
            Self::QuoteBound(_) => "quote.bound",
            Self::QuoteSubmitted(_) => "quote.submitted",
            Self::EnquiryMade(_) => "quote.enquiry_made",
            Self::InvoiceIssued(_) => "quote.invoice_issued",
            Self::CreditNoteIssued(_) => "quote.credit_note_issued",
            Self::PaymentMade(_) => "quote.payment_made",
            Self::PaymentFailed(_) => "quote.payment_failed",
            Self::FundingProposalCreated(_) => "quote.funding_proposal_created",
            Self::FundingProposalCreationFailed(_) => "quote.funding_proposal_creation_failed",
            Self::FundingProposalAccepted(_) => "quote.funding_proposal_accepted",
            Self::FundingProposalAcceptanceFailed(_) => "quote.funding_proposal_acceptance_failed",
            Self::FileAttached(_) => "quote.file_attached",
            Self::DocumentAttached(_) => "quote.document_attached",
            Self::WorkflowStepAssigned(_) => "quote.workflow_step_assigned",
            Self::PolicyDataPatched(_) => "quote.policy_data_patched",
            Self::PolicyIssued(_) => "quote.policy_issued",
            Self::PolicyTransactionCreated(_) => "quote.policy_transaction_created",
            Self::PolicyDeleted(_) => "quote.policy_deleted",
            Self::ProductReleaseMigrated(_) => "quote.product_release_migrated",
            Self::OrganisationMigrated(_) => "quote.organisation_migrated",
            Self::RolledBack(_) => "quote.rolled_back",
            Self::QuoteSaved(_) => "quote.saved",
            Self::QuoteEmailSent(_) => "quote.email_sent",
        }
    }

    /// The quote the event is about, for events scoped to one quote.
    #[must_use]
    pub fn quote_id(&self) -> Option<Uuid> {
        match self {
            Self::QuoteInitialized(e) => Some(e.quote_id),
            Self::QuoteImported(e) => Some(e.quote_id),
            Self::RenewalQuoteCreated(e)
            | Self::AdjustmentQuoteCreated(e)
            | Self::CancellationQuoteCreated(e) => Some(e.quote_id),
            Self::QuoteStateChanged(e) => Some(e.quote_id),
            Self::FormDataUpdated(e) => Some(e.quote_id),
            Self::CalculationResultCreated(e) => Some(e.quote_id),
            Self::QuoteExpirySet(e) => Some(e.quote_id),
            Self::QuoteExpiryCleared(e) => Some(e.quote_id),
            Self::QuoteVersionCreated(e) => Some(e.quote_id),
            Self::QuoteDiscarded(e) => Some(e.quote_id),
            Self::QuoteBound(e) => Some(e.quote_id),
            Self::QuoteSubmitted(e) => Some(e.quote_id),
            Self::EnquiryMade(e) => Some(e.quote_id),
            Self::InvoiceIssued(e) => Some(e.quote_id),
            Self::CreditNoteIssued(e) => Some(e.quote_id),
            Self::PaymentMade(e) => Some(e.quote_id),
            Self::PaymentFailed(e)
            | Self::FundingProposalCreationFailed(e)
            | Self::FundingProposalAcceptanceFailed(e) => Some(e.quote_id),
            Self::FundingProposalCreated(e) | Self::FundingProposalAccepted(e) => {
                Some(e.quote_id)
            }
            Self::FileAttached(e) => Some(e.quote_id),
            Self::DocumentAttached(e) => Some(e.quote_id),
            Self::WorkflowStepAssigned(e) => Some(e.quote_id),
            Self::PolicyIssued(e) => Some(e.quote_id),
            Self::PolicyTransactionCreated(e) => Some(e.quote_id),
            Self::QuoteSaved(e) => Some(e.quote_id),
            Self::QuoteEmailSent(e) => Some(e.quote_id),
            Self::CustomerAssociated(_)
            | Self::CustomerDetailsUpdated(_)
            | Self::OwnerAssigned(_)
            | Self::OwnerUnassigned(_)
            | Self::PolicyDataPatched(_)
            | Self::PolicyDeleted(_)
            | Self::ProductReleaseMigrated(_)
            | Self::OrganisationMigrated(_)
            | Self::RolledBack(_) => None,
        }
    }
}

/// Domain event envelope for the quote context.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: QuoteEventKind,
}

impl DomainEvent for QuoteEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("QuoteEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
