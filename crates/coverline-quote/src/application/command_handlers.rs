//! Command handlers for the quote context.
//!
//! Each handler loads the aggregate's history, runs one aggregate command
//! method and persists the resulting events with the aggregate's persisted
//! version as the expected version.

use coverline_core::aggregate::AggregateRoot;
use coverline_core::command::{Clock, Command, CommandContext};
use coverline_core::error::DomainError;
use coverline_core::event::{DomainEvent, EventMetadata};
use coverline_core::repository::{EventRepository, StoredEvent};
use coverline_core::snapshot::{Snapshot, SnapshotRepository};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{ImportedQuote, NewBusinessQuote, QuoteAggregate};
use crate::domain::commands::{
    AssignOwner, AssignWorkflowStep, AssociateWithCustomer, AttachDocument, AttachFile, BindQuote,
    ClearQuoteExpiry, CloneExpiredQuote, CreateNewBusinessQuote, CreateQuoteVersion, DeletePolicy,
    DiscardQuote, ImportQuote, IssueCreditNote, IssueInvoice, IssuePolicy, MakeEnquiry,
    MigrateOrganisation, MigrateProductRelease, PatchPolicyData, PerformQuoteAction,
    RecordCalculationResult, RecordFundingProposalAcceptance, RecordFundingProposalCreation,
    RecordPayment, RollbackQuoteAggregate, SetQuoteExpiry, SubmitQuote, TakeSnapshot,
    UnassignOwner, UpdateCustomerDetails, UpdateFormData,
};
use crate::domain::config::QuoteProduct;
use crate::domain::events::{QuoteEvent, QuoteEventKind};

/// Result of a successful command: the aggregate it ran against and the
/// events it persisted.
#[derive(Debug, Clone)]
pub struct QuoteCommandResult {
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// Events appended by the command, in order. Empty when the command
    /// changed nothing.
    pub stored_events: Vec<StoredEvent>,
}

fn to_stored_event(event: &QuoteEvent) -> StoredEvent {
    let meta = event.metadata();
    StoredEvent {
        event_id: meta.event_id,
        aggregate_id: meta.aggregate_id,
        tenant_id: meta.tenant_id,
        performing_user_id: meta.performing_user_id,
        event_type: event.event_type().to_owned(),
        payload: event.to_payload(),
        sequence_number: meta.sequence_number,
        correlation_id: meta.correlation_id,
        causation_id: meta.causation_id,
        occurred_at: meta.occurred_at,
    }
}

/// Converts stored events back into domain events.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if a payload does not deserialize.
pub(crate) fn to_domain_events(
    stored_events: &[StoredEvent],
) -> Result<Vec<QuoteEvent>, DomainError> {
    stored_events
        .iter()
        .map(|stored| -> Result<QuoteEvent, DomainError> {
            let kind: QuoteEventKind =
                serde_json::from_value(stored.payload.clone()).map_err(|e| {
                    DomainError::Infrastructure(format!("event deserialization failed: {e}"))
                })?;
            Ok(QuoteEvent {
                metadata: EventMetadata {
                    event_id: stored.event_id,
                    event_type: stored.event_type.clone(),
                    aggregate_id: stored.aggregate_id,
                    tenant_id: stored.tenant_id,
                    performing_user_id: stored.performing_user_id,
                    sequence_number: stored.sequence_number,
                    correlation_id: stored.correlation_id,
                    causation_id: stored.causation_id,
                    occurred_at: stored.occurred_at,
                },
                kind,
            })
        })
        .collect()
}

/// Loads an aggregate's full history.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no events exist for the ID,
/// plus any repository or deserialization error.
pub(crate) async fn load_history(
    aggregate_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<Vec<QuoteEvent>, DomainError> {
    let stored_events = repo.load_events(aggregate_id).await?;
    if stored_events.is_empty() {
        return Err(DomainError::AggregateNotFound(aggregate_id));
    }
    to_domain_events(&stored_events)
}

/// Reconstitutes a `QuoteAggregate` from stored events.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub(crate) fn reconstitute(
    aggregate_id: Uuid,
    stored_events: &[StoredEvent],
) -> Result<QuoteAggregate, DomainError> {
    let history = to_domain_events(stored_events)?;
    Ok(QuoteAggregate::load_from_history(aggregate_id, &history))
}

async fn persist(
    mut aggregate: QuoteAggregate,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    let stored_events: Vec<StoredEvent> = aggregate
        .uncommitted_events()
        .iter()
        .map(to_stored_event)
        .collect();
    if !stored_events.is_empty() {
        repo.append_events(aggregate.id, aggregate.persisted_version(), &stored_events)
            .await?;
    }
    aggregate.clear_uncommitted_events();
    Ok(QuoteCommandResult {
        aggregate_id: aggregate.id,
        stored_events,
    })
}

/// Load, execute, persist.
async fn execute<F>(
    command: &dyn Command,
    aggregate_id: Uuid,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
    action: F,
) -> Result<QuoteCommandResult, DomainError>
where
    F: FnOnce(&mut QuoteAggregate, &[QuoteEvent], &CommandContext<'_>) -> Result<(), DomainError>,
{
    info!(
        correlation_id = %command.correlation_id(),
        command_type = command.command_type(),
        "handling command"
    );
    let history = load_history(aggregate_id, repo).await?;
    let mut aggregate = QuoteAggregate::load_from_history(aggregate_id, &history);
    let ctx = CommandContext::for_command(command, clock);
    action(&mut aggregate, &history, &ctx)?;
    persist(aggregate, repo).await
}

/// Handles the `CreateNewBusinessQuote` command.
///
/// # Errors
///
/// Returns `DomainError::ConcurrencyConflict` if the aggregate already
/// exists, or any repository error.
#[instrument(skip(command, product, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_create_new_business_quote(
    command: &CreateNewBusinessQuote,
    product: &QuoteProduct,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    info!(correlation_id = %command.correlation_id, "handling create_new_business_quote command");
    let ctx = CommandContext::for_command(command, clock);
    let aggregate = QuoteAggregate::create_new_business_quote(
        command.aggregate_id,
        command.tenant_id,
        NewBusinessQuote {
            quote_id: command.quote_id,
            organisation_id: command.organisation_id,
            product_id: command.product_id,
            product_release_id: command.product_release_id,
            quote_number: command.quote_number.clone(),
            form_model: command.form_model.clone(),
        },
        &product.configuration,
        &ctx,
    );
    persist(aggregate, repo).await
}

/// Handles the `ImportQuote` command.
///
/// # Errors
///
/// Returns `DomainError::ConcurrencyConflict` if the aggregate already
/// exists, or any repository error.
#[instrument(skip(command, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_import_quote(
    command: &ImportQuote,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    info!(correlation_id = %command.correlation_id, "handling import_quote command");
    if command.workflow_state.trim().is_empty() {
        return Err(DomainError::validation(
            "imported quote workflow state must not be empty",
        ));
    }
    let ctx = CommandContext::for_command(command, clock);
    let aggregate = QuoteAggregate::import_quote(
        command.aggregate_id,
        command.tenant_id,
        ImportedQuote {
            quote_id: command.quote_id,
            organisation_id: command.organisation_id,
            product_id: command.product_id,
            product_release_id: command.product_release_id,
            quote_type: command.quote_type,
            quote_number: command.quote_number.clone(),
            workflow_state: command.workflow_state.clone(),
            form_model: command.form_model.clone(),
            calculation_result: command.calculation_result.clone(),
        },
        &ctx,
    );
    persist(aggregate, repo).await
}

/// Handles the `CloneExpiredQuote` command.
///
/// # Errors
///
/// Returns `DomainError` if loading fails, the source quote cannot be
/// cloned, or appending fails.
#[instrument(skip(command, product, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_clone_expired_quote(
    command: &CloneExpiredQuote,
    product: &QuoteProduct,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.clone_expired_quote(
            command.source_quote_id,
            command.new_quote_id,
            command.quote_number.clone(),
            &product.configuration,
            product.workflow.as_ref(),
            ctx,
        )
    })
    .await
}

/// Handles the `UpdateFormData` command.
///
/// # Errors
///
/// Returns `DomainError` if loading fails, the quote is unknown or
/// discarded, the workflow forbids the update, or appending fails.
#[instrument(skip(command, product, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_update_form_data(
    command: &UpdateFormData,
    product: &QuoteProduct,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.update_form_data(
            command.quote_id,
            command.form_model.clone(),
            product.workflow.as_ref(),
            ctx,
        )
    })
    .await
}

/// Handles the `RecordCalculationResult` command.
///
/// # Errors
///
/// As for [`handle_update_form_data`].
#[instrument(skip(command, product, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_record_calculation_result(
    command: &RecordCalculationResult,
    product: &QuoteProduct,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.record_calculation_result(
            command.quote_id,
            command.calculation_result.clone(),
            product.workflow.as_ref(),
            ctx,
        )
    })
    .await
}

/// Handles the `PerformQuoteAction` command.
///
/// # Errors
///
/// As for [`handle_update_form_data`].
#[instrument(
    skip(command, product, clock, repo),
    fields(aggregate_id = %command.aggregate_id, action = %command.action)
)]
pub async fn handle_perform_quote_action(
    command: &PerformQuoteAction,
    product: &QuoteProduct,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.perform_action(command.quote_id, command.action, product.workflow.as_ref(), ctx)
    })
    .await
}

/// Handles the `CreateQuoteVersion` command.
///
/// # Errors
///
/// As for [`handle_update_form_data`].
#[instrument(skip(command, product, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_create_quote_version(
    command: &CreateQuoteVersion,
    product: &QuoteProduct,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.create_version(
            command.quote_id,
            command.version_id,
            product.workflow.as_ref(),
            ctx,
        )
    })
    .await
}

/// Handles the `DiscardQuote` command.
///
/// # Errors
///
/// Returns `DomainError::InvariantViolation` unless the quote is the
/// aggregate's active quote, plus loading and appending errors.
#[instrument(skip(command, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_discard_quote(
    command: &DiscardQuote,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.discard_quote(command.quote_id, ctx)
    })
    .await
}

/// Handles the `BindQuote` command.
///
/// # Errors
///
/// As for [`handle_update_form_data`].
#[instrument(skip(command, product, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_bind_quote(
    command: &BindQuote,
    product: &QuoteProduct,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.bind_quote(command.quote_id, product.workflow.as_ref(), ctx)
    })
    .await
}

/// Handles the `SubmitQuote` command.
///
/// # Errors
///
/// As for [`handle_update_form_data`].
#[instrument(skip(command, product, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_submit_quote(
    command: &SubmitQuote,
    product: &QuoteProduct,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.submit_quote(
            command.quote_id,
            command.submission_id,
            product.workflow.as_ref(),
            ctx,
        )
    })
    .await
}

/// Handles the `MakeEnquiry` command.
///
/// # Errors
///
/// Returns `DomainError` if the quote is unknown or discarded, plus loading
/// and appending errors.
#[instrument(skip(command, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_make_enquiry(
    command: &MakeEnquiry,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.make_enquiry(command.quote_id, command.enquiry_id, ctx)
    })
    .await
}

/// Handles the `IssueInvoice` command.
///
/// # Errors
///
/// As for [`handle_update_form_data`].
#[instrument(skip(command, product, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_issue_invoice(
    command: &IssueInvoice,
    product: &QuoteProduct,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    if command.invoice_number.trim().is_empty() {
        return Err(DomainError::validation("invoice number must not be empty"));
    }
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.issue_invoice(
            command.quote_id,
            command.invoice_id,
            command.invoice_number.clone(),
            product.workflow.as_ref(),
            ctx,
        )
    })
    .await
}

/// Handles the `IssueCreditNote` command.
///
/// # Errors
///
/// As for [`handle_update_form_data`].
#[instrument(skip(command, product, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_issue_credit_note(
    command: &IssueCreditNote,
    product: &QuoteProduct,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    if command.credit_note_number.trim().is_empty() {
        return Err(DomainError::validation("credit note number must not be empty"));
    }
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.issue_credit_note(
            command.quote_id,
            command.credit_note_id,
            command.credit_note_number.clone(),
            product.workflow.as_ref(),
            ctx,
        )
    })
    .await
}

/// Handles the `SetQuoteExpiry` command.
///
/// # Errors
///
/// Returns `DomainError` if the quote is unknown, plus loading and
/// appending errors.
#[instrument(skip(command, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_set_quote_expiry(
    command: &SetQuoteExpiry,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.set_expiry(command.quote_id, command.expiry, ctx)
    })
    .await
}

/// Handles the `ClearQuoteExpiry` command.
///
/// # Errors
///
/// As for [`handle_set_quote_expiry`].
#[instrument(skip(command, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_clear_quote_expiry(
    command: &ClearQuoteExpiry,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.clear_expiry(command.quote_id, ctx)
    })
    .await
}

/// Handles the `AssignWorkflowStep` command.
///
/// # Errors
///
/// As for [`handle_make_enquiry`].
#[instrument(skip(command, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_assign_workflow_step(
    command: &AssignWorkflowStep,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.assign_workflow_step(command.quote_id, command.workflow_step.clone(), ctx)
    })
    .await
}

/// Handles the `AttachFile` command.
///
/// # Errors
///
/// As for [`handle_set_quote_expiry`].
#[instrument(skip(command, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_attach_file(
    command: &AttachFile,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.attach_file(command.quote_id, command.attachment.clone(), ctx)
    })
    .await
}

/// Handles the `AttachDocument` command.
///
/// # Errors
///
/// As for [`handle_set_quote_expiry`].
#[instrument(skip(command, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_attach_document(
    command: &AttachDocument,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.attach_document(command.quote_id, command.document.clone(), ctx)
    })
    .await
}

/// Handles the `RecordPayment` command.
///
/// # Errors
///
/// Returns `DomainError::InvariantViolation` for a failure report carrying
/// a `Success` outcome, plus the errors of [`handle_update_form_data`].
#[instrument(skip(command, product, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_record_payment(
    command: &RecordPayment,
    product: &QuoteProduct,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.record_payment(
            command.quote_id,
            command.report.clone(),
            command.data_snapshot_ids,
            product.workflow.as_ref(),
            ctx,
        )
    })
    .await
}

/// Handles the `RecordFundingProposalCreation` command.
///
/// # Errors
///
/// As for [`handle_record_payment`].
#[instrument(skip(command, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_record_funding_proposal_creation(
    command: &RecordFundingProposalCreation,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.record_funding_proposal_creation(
            command.quote_id,
            command.report.clone(),
            command.data_snapshot_ids,
            ctx,
        )
    })
    .await
}

/// Handles the `RecordFundingProposalAcceptance` command.
///
/// # Errors
///
/// As for [`handle_record_payment`].
#[instrument(skip(command, product, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_record_funding_proposal_acceptance(
    command: &RecordFundingProposalAcceptance,
    product: &QuoteProduct,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.record_funding_proposal_acceptance(
            command.quote_id,
            command.report.clone(),
            command.data_snapshot_ids,
            product.workflow.as_ref(),
            ctx,
        )
    })
    .await
}

/// Handles the `AssignOwner` command. Persists nothing if the owner is
/// unchanged.
///
/// # Errors
///
/// Returns `DomainError` if loading or appending fails.
#[instrument(skip(command, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_assign_owner(
    command: &AssignOwner,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.assign_owner(command.owner_user_id, ctx);
        Ok(())
    })
    .await
}

/// Handles the `UnassignOwner` command. Persists nothing if there is no
/// owner.
///
/// # Errors
///
/// Returns `DomainError` if loading or appending fails.
#[instrument(skip(command, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_unassign_owner(
    command: &UnassignOwner,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.unassign_owner(ctx);
        Ok(())
    })
    .await
}

/// Handles the `AssociateWithCustomer` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the customer name is empty, plus
/// loading and appending errors.
#[instrument(skip(command, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_associate_with_customer(
    command: &AssociateWithCustomer,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    if command.details.full_name.trim().is_empty() {
        return Err(DomainError::validation("customer name must not be empty"));
    }
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.associate_with_customer(command.customer_id, command.details.clone(), ctx);
        Ok(())
    })
    .await
}

/// Handles the `UpdateCustomerDetails` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` if no customer is associated, plus
/// loading and appending errors.
#[instrument(skip(command, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_update_customer_details(
    command: &UpdateCustomerDetails,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.update_customer_details(command.details.clone(), ctx)
    })
    .await
}

/// Handles the `MigrateProductRelease` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the aggregate is already on the
/// release, plus loading and appending errors.
#[instrument(skip(command, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_migrate_product_release(
    command: &MigrateProductRelease,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.migrate_product_release(command.product_release_id, ctx)
    })
    .await
}

/// Handles the `MigrateOrganisation` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the aggregate already belongs to
/// the organisation, plus loading and appending errors.
#[instrument(skip(command, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_migrate_organisation(
    command: &MigrateOrganisation,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.migrate_organisation(command.organisation_id, ctx)
    })
    .await
}

/// Handles the `PatchPolicyData` command. Either every path is patched or
/// nothing is persisted.
///
/// # Errors
///
/// Returns `DomainError::Validation` when the patch is rejected,
/// `DomainError::InvariantViolation` when it targets a discarded quote, and
/// `DomainError::EntityNotFound` when it names an unknown quote.
#[instrument(skip(command, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_patch_policy_data(
    command: &PatchPolicyData,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.patch_policy_data(&command.patch, ctx)
    })
    .await
}

/// Handles the `IssuePolicy` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the policy number is empty, and
/// the errors of [`QuoteAggregate::issue_policy`].
#[instrument(skip(command, product, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_issue_policy(
    command: &IssuePolicy,
    product: &QuoteProduct,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    if command.policy_number.trim().is_empty() {
        return Err(DomainError::validation("policy number must not be empty"));
    }
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.issue_policy(
            command.quote_id,
            command.policy_id,
            command.policy_number.clone(),
            command.policy_transaction_id,
            &product.configuration,
            product.workflow.as_ref(),
            ctx,
        )
    })
    .await
}

/// Handles the `DeletePolicy` command.
///
/// # Errors
///
/// Returns `DomainError::EntityNotFound` if there is no policy and
/// `DomainError::InvariantViolation` if it is already deleted.
#[instrument(skip(command, clock, repo), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_delete_policy(
    command: &DeletePolicy,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, _, ctx| {
        aggregate.delete_policy(ctx)
    })
    .await
}

/// Handles the `RollbackQuoteAggregate` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` when there are no persisted
/// events, and the rollback precondition errors of
/// [`crate::domain::rollback::validate_target`] otherwise.
#[instrument(
    skip(command, clock, repo),
    fields(
        aggregate_id = %command.aggregate_id,
        target_sequence_number = command.target_sequence_number
    )
)]
pub async fn handle_rollback(
    command: &RollbackQuoteAggregate,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<QuoteCommandResult, DomainError> {
    execute(command, command.aggregate_id, clock, repo, |aggregate, history, ctx| {
        aggregate.rollback_to(command.target_sequence_number, history, ctx)
    })
    .await
}

/// Handles the `TakeSnapshot` command: folds the persisted stream into a
/// snapshot and saves it.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no events exist, plus any
/// repository or serialization error.
#[instrument(skip(command, clock, repo, snapshots), fields(aggregate_id = %command.aggregate_id))]
pub async fn handle_take_snapshot(
    command: &TakeSnapshot,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
    snapshots: &dyn SnapshotRepository,
) -> Result<Snapshot, DomainError> {
    info!(correlation_id = %command.correlation_id, "handling take_snapshot command");
    let history = load_history(command.aggregate_id, repo).await?;
    let aggregate = QuoteAggregate::load_from_history(command.aggregate_id, &history);
    let snapshot = aggregate.to_snapshot(clock.now())?;
    snapshots.save_snapshot(snapshot.clone()).await?;
    Ok(snapshot)
}
