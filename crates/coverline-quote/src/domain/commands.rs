//! Commands for the quote context.

use chrono::{DateTime, Utc};
use coverline_core::command::Command;
use serde_json::Value;
use uuid::Uuid;

use super::corollary::{FileAttachment, FundingProposal, PaymentDetails, QuoteDocument};
use super::data::{CustomerDetails, DataSnapshotIds};
use super::outcome::AttemptReport;
use super::patch::PolicyDataPatchCommand;
use super::quote::QuoteType;
use super::workflow::QuoteAction;

/// Command to start a new business quote in a fresh aggregate.
#[derive(Debug, Clone)]
pub struct CreateNewBusinessQuote {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate to create.
    pub aggregate_id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// The quote to create.
    pub quote_id: Uuid,
    /// Owning organisation.
    pub organisation_id: Uuid,
    /// Product.
    pub product_id: Uuid,
    /// Product release.
    pub product_release_id: Uuid,
    /// Quote number, if already assigned.
    pub quote_number: Option<String>,
    /// Initial form model.
    pub form_model: Option<Value>,
}

/// Command to import a quote from another system into a fresh aggregate.
#[derive(Debug, Clone)]
pub struct ImportQuote {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate to create.
    pub aggregate_id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// The quote to create.
    pub quote_id: Uuid,
    /// Owning organisation.
    pub organisation_id: Uuid,
    /// Product.
    pub product_id: Uuid,
    /// Product release.
    pub product_release_id: Uuid,
    /// Transaction type.
    pub quote_type: QuoteType,
    /// Quote number.
    pub quote_number: Option<String>,
    /// Workflow state in the source system.
    pub workflow_state: String,
    /// Form model.
    pub form_model: Option<Value>,
    /// Calculation result.
    pub calculation_result: Option<Value>,
}

/// Command to replace an expired quote with a fresh copy.
#[derive(Debug, Clone)]
pub struct CloneExpiredQuote {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The expired quote.
    pub source_quote_id: Uuid,
    /// Identifier for the copy.
    pub new_quote_id: Uuid,
    /// Quote number for the copy.
    pub quote_number: Option<String>,
}

/// Command to replace a quote's form data.
#[derive(Debug, Clone)]
pub struct UpdateFormData {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
    /// The new form model.
    pub form_model: Value,
}

/// Command to record a calculation result.
#[derive(Debug, Clone)]
pub struct RecordCalculationResult {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
    /// The calculation output.
    pub calculation_result: Value,
}

/// Command to perform a pure workflow action on a quote.
#[derive(Debug, Clone)]
pub struct PerformQuoteAction {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
    /// The action.
    pub action: QuoteAction,
}

/// Command to save a quote's current data as a numbered version.
#[derive(Debug, Clone)]
pub struct CreateQuoteVersion {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
    /// Identifier for the version.
    pub version_id: Uuid,
}

/// Command to discard the active quote.
#[derive(Debug, Clone)]
pub struct DiscardQuote {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
}

/// Command to bind a quote.
#[derive(Debug, Clone)]
pub struct BindQuote {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
}

/// Command to submit a quote.
#[derive(Debug, Clone)]
pub struct SubmitQuote {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
    /// Identifier for the submission.
    pub submission_id: Uuid,
}

/// Command to record a customer enquiry.
#[derive(Debug, Clone)]
pub struct MakeEnquiry {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
    /// Identifier for the enquiry.
    pub enquiry_id: Uuid,
}

/// Command to issue an invoice.
#[derive(Debug, Clone)]
pub struct IssueInvoice {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
    /// Identifier for the invoice.
    pub invoice_id: Uuid,
    /// Human facing invoice number.
    pub invoice_number: String,
}

/// Command to issue a credit note.
#[derive(Debug, Clone)]
pub struct IssueCreditNote {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
    /// Identifier for the credit note.
    pub credit_note_id: Uuid,
    /// Human facing credit note number.
    pub credit_note_number: String,
}

/// Command to set a quote's expiry.
#[derive(Debug, Clone)]
pub struct SetQuoteExpiry {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
    /// When the quote expires.
    pub expiry: DateTime<Utc>,
}

/// Command to remove a quote's expiry.
#[derive(Debug, Clone)]
pub struct ClearQuoteExpiry {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
}

/// Command to record the form's current workflow step.
#[derive(Debug, Clone)]
pub struct AssignWorkflowStep {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
    /// The step name.
    pub workflow_step: String,
}

/// Command to attach an uploaded file.
#[derive(Debug, Clone)]
pub struct AttachFile {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
    /// The file.
    pub attachment: FileAttachment,
}

/// Command to attach a generated document.
#[derive(Debug, Clone)]
pub struct AttachDocument {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
    /// The document.
    pub document: QuoteDocument,
}

/// Command to record the outcome of a payment attempt.
#[derive(Debug, Clone)]
pub struct RecordPayment {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
    /// What the payment gateway reported.
    pub report: AttemptReport<PaymentDetails>,
    /// The data the attempt was made with.
    pub data_snapshot_ids: DataSnapshotIds,
}

/// Command to record the outcome of a funding proposal request.
#[derive(Debug, Clone)]
pub struct RecordFundingProposalCreation {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
    /// What the funding provider reported.
    pub report: AttemptReport<FundingProposal>,
    /// The data the attempt was made with.
    pub data_snapshot_ids: DataSnapshotIds,
}

/// Command to record the outcome of accepting a funding proposal.
#[derive(Debug, Clone)]
pub struct RecordFundingProposalAcceptance {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
    /// What the funding provider reported.
    pub report: AttemptReport<FundingProposal>,
    /// The data the attempt was made with.
    pub data_snapshot_ids: DataSnapshotIds,
}

/// Command to assign an owner.
#[derive(Debug, Clone)]
pub struct AssignOwner {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The new owner.
    pub owner_user_id: Uuid,
}

/// Command to remove the owner.
#[derive(Debug, Clone)]
pub struct UnassignOwner {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
}

/// Command to associate the aggregate with a customer.
#[derive(Debug, Clone)]
pub struct AssociateWithCustomer {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The customer.
    pub customer_id: Uuid,
    /// The customer's current details.
    pub details: CustomerDetails,
}

/// Command to record new customer details.
#[derive(Debug, Clone)]
pub struct UpdateCustomerDetails {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The new details.
    pub details: CustomerDetails,
}

/// Command to move the aggregate to another product release.
#[derive(Debug, Clone)]
pub struct MigrateProductRelease {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The target release.
    pub product_release_id: Uuid,
}

/// Command to move the aggregate to another organisation.
#[derive(Debug, Clone)]
pub struct MigrateOrganisation {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The target organisation.
    pub organisation_id: Uuid,
}

/// Command to correct policy data retroactively.
#[derive(Debug, Clone)]
pub struct PatchPolicyData {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// What to patch, where, and under which rules.
    pub patch: PolicyDataPatchCommand,
}

/// Command to issue a policy, or a policy transaction, from a quote.
#[derive(Debug, Clone)]
pub struct IssuePolicy {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The quote identifier.
    pub quote_id: Uuid,
    /// Identifier for a new policy. Ignored for transactions on an existing one.
    pub policy_id: Uuid,
    /// Policy number for a new policy.
    pub policy_number: String,
    /// Identifier for the transaction.
    pub policy_transaction_id: Uuid,
}

/// Command to logically delete the policy.
#[derive(Debug, Clone)]
pub struct DeletePolicy {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
}

/// Command to roll the event stream back to an earlier sequence number.
#[derive(Debug, Clone)]
pub struct RollbackQuoteAggregate {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// The sequence number to roll back to.
    pub target_sequence_number: i64,
}

/// Command to snapshot the aggregate's persisted state.
#[derive(Debug, Clone)]
pub struct TakeSnapshot {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting user, if any.
    pub performing_user_id: Option<Uuid>,
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
}

macro_rules! impl_command {
    ($($ty:ident => $name:literal),+ $(,)?) => {
        $(
            impl Command for $ty {
                fn command_type(&self) -> &'static str {
                    $name
                }

                fn correlation_id(&self) -> Uuid {
                    self.correlation_id
                }

                fn performing_user_id(&self) -> Option<Uuid> {
                    self.performing_user_id
                }
            }
        )+
    };
}

impl_command!(
    CreateNewBusinessQuote => "quote.create_new_business_quote",
    ImportQuote => "quote.import_quote",
    CloneExpiredQuote => "quote.clone_expired_quote",
    UpdateFormData => "quote.update_form_data",
    RecordCalculationResult => "quote.record_calculation_result",
    PerformQuoteAction => "quote.perform_action",
    CreateQuoteVersion => "quote.create_version",
    DiscardQuote => "quote.discard_quote",
    BindQuote => "quote.bind_quote",
    SubmitQuote => "quote.submit_quote",
    MakeEnquiry => "quote.make_enquiry",
    IssueInvoice => "quote.issue_invoice",
    IssueCreditNote => "quote.issue_credit_note",
    SetQuoteExpiry => "quote.set_expiry",
    ClearQuoteExpiry => "quote.clear_expiry",
    AssignWorkflowStep => "quote.assign_workflow_step",
    AttachFile => "quote.attach_file",
    AttachDocument => "quote.attach_document",
    RecordPayment => "quote.record_payment",
    RecordFundingProposalCreation => "quote.record_funding_proposal_creation",
    RecordFundingProposalAcceptance => "quote.record_funding_proposal_acceptance",
    AssignOwner => "quote.assign_owner",
    UnassignOwner => "quote.unassign_owner",
    AssociateWithCustomer => "quote.associate_with_customer",
    UpdateCustomerDetails => "quote.update_customer_details",
    MigrateProductRelease => "quote.migrate_product_release",
    MigrateOrganisation => "quote.migrate_organisation",
    PatchPolicyData => "quote.patch_policy_data",
    IssuePolicy => "quote.issue_policy",
    DeletePolicy => "quote.delete_policy",
    RollbackQuoteAggregate => "quote.rollback",
    TakeSnapshot => "quote.take_snapshot",
);
