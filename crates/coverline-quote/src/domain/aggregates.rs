//! Aggregate root for the quote context.
//!
//! A [`QuoteAggregate`] owns its quotes (in creation order) and at most one
//! policy. Its state is the sum of theirs. Every command method validates
//! first, then raises events; raising an event applies it immediately and
//! queues it for persistence, so a failed command never leaves partial
//! events behind.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use coverline_core::aggregate::AggregateRoot;
use coverline_core::command::CommandContext;
use coverline_core::error::DomainError;
use coverline_core::event::EventMetadata;
use coverline_core::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::config::QuoteProductConfiguration;
use super::corollary::{
    CreditNote, Enquiry, FileAttachment, FundingProposal, Invoice, PaymentDetails, QuoteDocument,
    Submission,
};
use super::data::{
    CustomerDetails, CustomerDetailsRecord, DataRecord, DataSnapshotIds, form_data_from_model,
    form_model_mut,
};
use super::datum::StandardQuoteData;
use super::events::{
    AttemptFailed, CalculationResultCreated, ClonedQuoteCreated, CreditNoteIssued,
    CustomerAssociated, CustomerDetailsUpdated, DocumentAttached, EnquiryMade, FileAttached,
    FormDataUpdated, FundingProposalRecorded, InvoiceIssued, OrganisationMigrated, OwnerAssigned,
    OwnerUnassigned, PaymentMade, PolicyDataPatched, PolicyDeleted, PolicyIssued,
    PolicyTransactionCreated, ProductReleaseMigrated, QuoteBound, QuoteDiscarded, QuoteEvent,
    QuoteEventKind, QuoteExpiryCleared, QuoteExpirySet, QuoteImported, QuoteInitialized,
    QuoteStateChanged, QuoteSubmitted, QuoteVersionCreated, RolledBack, WorkflowStepAssigned,
};
use super::json_path;
use super::outcome::{
    AttemptReport, FundingProposalAcceptanceResult, FundingProposalCreationResult, Outcome,
    OutcomeResult, PaymentAttemptResult,
};
use super::patch::{
    DataPatch, DataPatchType, PatchRejection, PatchValueSource, PatchableDataHolder,
    PolicyDataPatchCommand,
};
use super::policy::{Policy, PolicyTransaction, PolicyTransactionType};
use super::quote::{Quote, QuoteType, QuoteVersion};
use super::rollback;
use super::workflow::{QuoteAction, QuoteWorkflow, states};

/// Inputs for a new business quote.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBusinessQuote {
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
    /// Initial form model, if the customer has started filling in the form.
    pub form_model: Option<Value>,
}

/// Inputs for a quote imported from another system.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedQuote {
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

/// The aggregate root for a quote lineage and its policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteAggregate {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Owning organisation.
    pub organisation_id: Uuid,
    /// Product.
    pub product_id: Uuid,
    /// Product release the aggregate is on.
    pub product_release_id: Uuid,
    /// Assigned owner.
    pub owner_user_id: Option<Uuid>,
    /// Associated customer.
    pub customer_id: Option<Uuid>,
    /// Latest details of the associated customer.
    pub customer_details: Option<CustomerDetailsRecord>,
    /// When the aggregate was created.
    pub created_at: Option<DateTime<Utc>>,
    /// Quotes in creation order.
    quotes: Vec<Quote>,
    /// The policy, once issued.
    policy: Option<Policy>,
    /// Current version (event count).
    pub(crate) version: i64,
    /// Position of each quote in `quotes`. Rebuilt after snapshot load.
    #[serde(skip)]
    quote_index: HashMap<Uuid, usize>,
    /// Uncommitted events pending persistence.
    #[serde(skip)]
    uncommitted_events: Vec<QuoteEvent>,
}

impl QuoteAggregate {
    fn empty(id: Uuid) -> Self {
        Self {
            id,
            tenant_id: Uuid::nil(),
            organisation_id: Uuid::nil(),
            product_id: Uuid::nil(),
            product_release_id: Uuid::nil(),
            owner_user_id: None,
            customer_id: None,
            customer_details: None,
            created_at: None,
            quotes: Vec::new(),
            policy: None,
            version: 0,
            quote_index: HashMap::new(),
            uncommitted_events: Vec::new(),
        }
    }

    /// Rebuilds an aggregate by applying its full history in order.
    #[must_use]
    pub fn load_from_history(id: Uuid, events: &[QuoteEvent]) -> Self {
        let mut aggregate = Self::empty(id);
        for event in events {
            aggregate.apply(event);
        }
        aggregate
    }

    /// Rebuilds an aggregate from a snapshot plus the events recorded after it.
    ///
    /// Only events whose sequence number is at least the snapshot version are
    /// applied. The quote index, which snapshots do not carry, is rebuilt
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the state cannot be
    /// deserialized, belongs to another aggregate, or the later events do not
    /// continue from the snapshot.
    pub fn from_snapshot(
        snapshot: &Snapshot,
        later_events: &[QuoteEvent],
    ) -> Result<Self, DomainError> {
        let mut aggregate: Self = serde_json::from_value(snapshot.state.clone()).map_err(|e| {
            DomainError::Infrastructure(format!("snapshot deserialization failed: {e}"))
        })?;
        if aggregate.id != snapshot.aggregate_id || aggregate.version != snapshot.version {
            return Err(DomainError::Infrastructure(format!(
                "snapshot of aggregate {} at version {} does not match its state",
                snapshot.aggregate_id, snapshot.version
            )));
        }
        aggregate.repair_after_snapshot();
        for event in later_events
            .iter()
            .filter(|e| e.metadata.sequence_number >= snapshot.version)
        {
            if event.metadata.sequence_number != aggregate.version {
                return Err(DomainError::Infrastructure(format!(
                    "expected event {} after snapshot of aggregate {}, found {}",
                    aggregate.version, aggregate.id, event.metadata.sequence_number
                )));
            }
            aggregate.apply(event);
        }
        Ok(aggregate)
    }

    /// Captures the aggregate's persisted state.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` if there are uncommitted
    /// events, or `DomainError::Infrastructure` if serialization fails.
    pub fn to_snapshot(&self, taken_at: DateTime<Utc>) -> Result<Snapshot, DomainError> {
        if !self.uncommitted_events.is_empty() {
            return Err(DomainError::invariant(
                "cannot snapshot an aggregate with uncommitted events",
            ));
        }
        let state = serde_json::to_value(self).map_err(|e| {
            DomainError::Infrastructure(format!("snapshot serialization failed: {e}"))
        })?;
        Ok(Snapshot {
            aggregate_id: self.id,
            version: self.version,
            state,
            taken_at,
        })
    }

    fn repair_after_snapshot(&mut self) {
        self.quote_index = self
            .quotes
            .iter()
            .enumerate()
            .map(|(position, quote)| (quote.id, position))
            .collect();
    }

    /// Creates a new business aggregate.
    ///
    /// Also sets the quote's expiry when the product enables expiry.
    #[must_use]
    pub fn create_new_business_quote(
        id: Uuid,
        tenant_id: Uuid,
        quote: NewBusinessQuote,
        config: &QuoteProductConfiguration,
        ctx: &CommandContext<'_>,
    ) -> Self {
        let mut aggregate = Self::empty(id);
        aggregate.tenant_id = tenant_id;
        let now = ctx.now();
        aggregate.raise(
            QuoteEventKind::QuoteInitialized(QuoteInitialized {
                quote_id: quote.quote_id,
                organisation_id: quote.organisation_id,
                product_id: quote.product_id,
                product_release_id: quote.product_release_id,
                quote_number: quote.quote_number,
                initial_state: states::NASCENT.to_owned(),
                form_data: quote
                    .form_model
                    .map(|model| DataRecord::new(Uuid::new_v4(), form_data_from_model(model), now)),
            }),
            ctx,
        );
        if let Some(expiry) = config.expiry.expiry_for(now) {
            aggregate.raise(
                QuoteEventKind::QuoteExpirySet(QuoteExpirySet {
                    quote_id: quote.quote_id,
                    expiry,
                }),
                ctx,
            );
        }
        aggregate
    }

    /// Creates an aggregate around a quote imported from another system.
    #[must_use]
    pub fn import_quote(
        id: Uuid,
        tenant_id: Uuid,
        quote: ImportedQuote,
        ctx: &CommandContext<'_>,
    ) -> Self {
        let mut aggregate = Self::empty(id);
        aggregate.tenant_id = tenant_id;
        let now = ctx.now();
        aggregate.raise(
            QuoteEventKind::QuoteImported(QuoteImported {
                quote_id: quote.quote_id,
                organisation_id: quote.organisation_id,
                product_id: quote.product_id,
                product_release_id: quote.product_release_id,
                quote_type: quote.quote_type,
                quote_number: quote.quote_number,
                workflow_state: quote.workflow_state,
                form_data: quote
                    .form_model
                    .map(|model| DataRecord::new(Uuid::new_v4(), form_data_from_model(model), now)),
                calculation_result: quote
                    .calculation_result
                    .map(|data| DataRecord::new(Uuid::new_v4(), data, now)),
            }),
            ctx,
        );
        aggregate
    }

    // ----- queries -------------------------------------------------------

    /// Quotes in creation order.
    #[must_use]
    pub fn quotes(&self) -> &[Quote] {
        &self.quotes
    }

    /// Looks up a quote.
    #[must_use]
    pub fn quote(&self, quote_id: Uuid) -> Option<&Quote> {
        self.quote_index.get(&quote_id).map(|&i| &self.quotes[i])
    }

    /// The single active quote: the most recently created one.
    #[must_use]
    pub fn current_quote(&self) -> Option<&Quote> {
        self.quotes.last()
    }

    /// The policy, once issued.
    #[must_use]
    pub fn policy(&self) -> Option<&Policy> {
        self.policy.as_ref()
    }

    fn require_quote(&self, quote_id: Uuid) -> Result<&Quote, DomainError> {
        self.quote(quote_id)
            .ok_or_else(|| DomainError::not_found("quote", quote_id))
    }

    fn require_active_quote(&self, quote_id: Uuid) -> Result<&Quote, DomainError> {
        let quote = self.require_quote(quote_id)?;
        if quote.discarded {
            return Err(DomainError::InvariantViolation(format!(
                "quote {quote_id} has been discarded"
            )));
        }
        Ok(quote)
    }

    fn plan_transition(
        quote: &Quote,
        action: QuoteAction,
        workflow: &dyn QuoteWorkflow,
    ) -> Result<QuoteStateChanged, DomainError> {
        let resulting_state = workflow.resulting_state(action, &quote.workflow_state)?;
        Ok(QuoteStateChanged {
            quote_id: quote.id,
            action,
            original_state: quote.workflow_state.clone(),
            resulting_state,
        })
    }

    fn raise_transition(&mut self, change: QuoteStateChanged, ctx: &CommandContext<'_>) {
        if change.original_state != change.resulting_state {
            self.raise(QuoteEventKind::QuoteStateChanged(change), ctx);
        }
    }

    // ----- quote lifecycle -------------------------------------------------

    /// Creates a quote of the same type to replace an expired one.
    ///
    /// The prior quote's form data is carried over with the product's reset
    /// paths removed. The new quote is then walked from `Nascent` to the
    /// state the workflow gives for `Actualise`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EntityNotFound` if the prior quote does not
    /// exist, `DomainError::InvariantViolation` if it is a new business quote
    /// or `new_quote_id` is taken, and `DomainError::Validation` if the
    /// workflow does not permit actualising a nascent quote.
    pub fn clone_expired_quote(
        &mut self,
        source_quote_id: Uuid,
        new_quote_id: Uuid,
        quote_number: Option<String>,
        config: &QuoteProductConfiguration,
        workflow: &dyn QuoteWorkflow,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        let source = self.require_quote(source_quote_id)?;
        let created: fn(ClonedQuoteCreated) -> QuoteEventKind = match source.quote_type {
            QuoteType::Renewal => QuoteEventKind::RenewalQuoteCreated,
            QuoteType::Adjustment => QuoteEventKind::AdjustmentQuoteCreated,
            QuoteType::Cancellation => QuoteEventKind::CancellationQuoteCreated,
            QuoteType::NewBusiness => {
                return Err(DomainError::InvariantViolation(format!(
                    "quote {source_quote_id} is a new business quote and cannot be cloned"
                )));
            }
        };
        if self.quote_index.contains_key(&new_quote_id) {
            return Err(DomainError::InvariantViolation(format!(
                "quote {new_quote_id} already exists"
            )));
        }
        let resulting_state = workflow.resulting_state(QuoteAction::Actualise, states::NASCENT)?;

        let form_data = source.form_data.as_ref().map(|record| {
            let mut data = record.data.clone();
            let model = form_model_mut(&mut data);
            for path in &config.clone_reset_paths {
                json_path::remove(model, path);
            }
            DataRecord::new(Uuid::new_v4(), data, ctx.now())
        });

        self.raise(
            created(ClonedQuoteCreated {
                quote_id: new_quote_id,
                parent_quote_id: source_quote_id,
                quote_number,
                form_data,
            }),
            ctx,
        );
        self.raise(
            QuoteEventKind::QuoteStateChanged(QuoteStateChanged {
                quote_id: new_quote_id,
                action: QuoteAction::Actualise,
                original_state: states::NASCENT.to_owned(),
                resulting_state,
            }),
            ctx,
        );
        Ok(())
    }

    /// Replaces a quote's form data.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EntityNotFound` for an unknown quote,
    /// `DomainError::InvariantViolation` for a discarded one and
    /// `DomainError::Validation` if the workflow forbids form updates.
    pub fn update_form_data(
        &mut self,
        quote_id: Uuid,
        form_model: Value,
        workflow: &dyn QuoteWorkflow,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        let quote = self.require_active_quote(quote_id)?;
        let change = Self::plan_transition(quote, QuoteAction::FormUpdate, workflow)?;
        self.raise(
            QuoteEventKind::FormDataUpdated(FormDataUpdated {
                quote_id,
                form_data: DataRecord::new(
                    Uuid::new_v4(),
                    form_data_from_model(form_model),
                    ctx.now(),
                ),
            }),
            ctx,
        );
        self.raise_transition(change, ctx);
        Ok(())
    }

    /// Records a new calculation result.
    ///
    /// # Errors
    ///
    /// As for [`Self::update_form_data`].
    pub fn record_calculation_result(
        &mut self,
        quote_id: Uuid,
        calculation_result: Value,
        workflow: &dyn QuoteWorkflow,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        let quote = self.require_active_quote(quote_id)?;
        let change = Self::plan_transition(quote, QuoteAction::Calculation, workflow)?;
        self.raise(
            QuoteEventKind::CalculationResultCreated(CalculationResultCreated {
                quote_id,
                calculation_result: DataRecord::new(Uuid::new_v4(), calculation_result, ctx.now()),
            }),
            ctx,
        );
        self.raise_transition(change, ctx);
        Ok(())
    }

    /// Performs a pure workflow action: actualise, review and endorsement
    /// referral or approval, auto approval, return, decline, expire or
    /// revert expiry.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for actions that have their own
    /// command or that the workflow forbids, plus the lookup errors of
    /// [`Self::update_form_data`].
    pub fn perform_action(
        &mut self,
        quote_id: Uuid,
        action: QuoteAction,
        workflow: &dyn QuoteWorkflow,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        use QuoteAction as A;
        if !matches!(
            action,
            A::Actualise
                | A::ReviewReferral
                | A::ReviewApproval
                | A::AutoApproval
                | A::EndorsementReferral
                | A::EndorsementApproval
                | A::Return
                | A::Decline
                | A::Expire
                | A::RevertExpiry
        ) {
            return Err(DomainError::Validation(format!(
                "action {action} is performed by its own command"
            )));
        }
        let quote = self.require_active_quote(quote_id)?;
        let change = Self::plan_transition(quote, action, workflow)?;
        self.raise(QuoteEventKind::QuoteStateChanged(change), ctx);
        Ok(())
    }

    /// Saves the quote's current data as the next numbered version.
    ///
    /// # Errors
    ///
    /// As for [`Self::update_form_data`].
    pub fn create_version(
        &mut self,
        quote_id: Uuid,
        version_id: Uuid,
        workflow: &dyn QuoteWorkflow,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        let quote = self.require_active_quote(quote_id)?;
        let change = Self::plan_transition(quote, QuoteAction::QuoteVersion, workflow)?;
        let version_number = quote.next_version_number();
        self.raise(
            QuoteEventKind::QuoteVersionCreated(QuoteVersionCreated {
                quote_id,
                version_id,
                version_number,
            }),
            ctx,
        );
        self.raise_transition(change, ctx);
        Ok(())
    }

    /// Discards the aggregate's active quote.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` unless `quote_id` is the
    /// active quote and has not already been discarded.
    pub fn discard_quote(
        &mut self,
        quote_id: Uuid,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        let current = self.current_quote().map(|q| (q.id, q.discarded));
        match current {
            Some((id, false)) if id == quote_id => {}
            _ => {
                return Err(DomainError::InvariantViolation(format!(
                    "quote {quote_id} is not the active quote of aggregate {}",
                    self.id
                )));
            }
        }
        self.raise(QuoteEventKind::QuoteDiscarded(QuoteDiscarded { quote_id }), ctx);
        Ok(())
    }

    /// Binds a quote.
    ///
    /// # Errors
    ///
    /// As for [`Self::update_form_data`].
    pub fn bind_quote(
        &mut self,
        quote_id: Uuid,
        workflow: &dyn QuoteWorkflow,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        let quote = self.require_active_quote(quote_id)?;
        let change = Self::plan_transition(quote, QuoteAction::Bind, workflow)?;
        let data_snapshot_ids = quote.data_snapshot_ids(self.customer_details.as_ref());
        self.raise(
            QuoteEventKind::QuoteBound(QuoteBound {
                quote_id,
                data_snapshot_ids,
            }),
            ctx,
        );
        self.raise_transition(change, ctx);
        Ok(())
    }

    /// Submits a quote.
    ///
    /// # Errors
    ///
    /// As for [`Self::update_form_data`].
    pub fn submit_quote(
        &mut self,
        quote_id: Uuid,
        submission_id: Uuid,
        workflow: &dyn QuoteWorkflow,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        let quote = self.require_active_quote(quote_id)?;
        let change = Self::plan_transition(quote, QuoteAction::Submit, workflow)?;
        let data_snapshot_ids = quote.data_snapshot_ids(self.customer_details.as_ref());
        self.raise(
            QuoteEventKind::QuoteSubmitted(QuoteSubmitted {
                quote_id,
                submission_id,
                data_snapshot_ids,
            }),
            ctx,
        );
        self.raise_transition(change, ctx);
        Ok(())
    }

    /// Records a customer enquiry.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EntityNotFound` for an unknown quote and
    /// `DomainError::InvariantViolation` for a discarded one.
    pub fn make_enquiry(
        &mut self,
        quote_id: Uuid,
        enquiry_id: Uuid,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        let quote = self.require_active_quote(quote_id)?;
        let data_snapshot_ids = quote.data_snapshot_ids(self.customer_details.as_ref());
        self.raise(
            QuoteEventKind::EnquiryMade(EnquiryMade {
                quote_id,
                enquiry_id,
                data_snapshot_ids,
            }),
            ctx,
        );
        Ok(())
    }

    /// Issues an invoice.
    ///
    /// # Errors
    ///
    /// As for [`Self::update_form_data`].
    pub fn issue_invoice(
        &mut self,
        quote_id: Uuid,
        invoice_id: Uuid,
        invoice_number: String,
        workflow: &dyn QuoteWorkflow,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        let quote = self.require_active_quote(quote_id)?;
        let change = Self::plan_transition(quote, QuoteAction::Invoice, workflow)?;
        let data_snapshot_ids = quote.data_snapshot_ids(self.customer_details.as_ref());
        self.raise(
            QuoteEventKind::InvoiceIssued(InvoiceIssued {
                quote_id,
                invoice_id,
                invoice_number,
                data_snapshot_ids,
            }),
            ctx,
        );
        self.raise_transition(change, ctx);
        Ok(())
    }

    /// Issues a credit note.
    ///
    /// # Errors
    ///
    /// As for [`Self::update_form_data`].
    pub fn issue_credit_note(
        &mut self,
        quote_id: Uuid,
        credit_note_id: Uuid,
        credit_note_number: String,
        workflow: &dyn QuoteWorkflow,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        let quote = self.require_active_quote(quote_id)?;
        let change = Self::plan_transition(quote, QuoteAction::CreditNote, workflow)?;
        let data_snapshot_ids = quote.data_snapshot_ids(self.customer_details.as_ref());
        self.raise(
            QuoteEventKind::CreditNoteIssued(CreditNoteIssued {
                quote_id,
                credit_note_id,
                credit_note_number,
                data_snapshot_ids,
            }),
            ctx,
        );
        self.raise_transition(change, ctx);
        Ok(())
    }

    /// Sets a quote's expiry.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EntityNotFound` for an unknown quote.
    pub fn set_expiry(
        &mut self,
        quote_id: Uuid,
        expiry: DateTime<Utc>,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        self.require_quote(quote_id)?;
        self.raise(
            QuoteEventKind::QuoteExpirySet(QuoteExpirySet { quote_id, expiry }),
            ctx,
        );
        Ok(())
    }

    /// Removes a quote's expiry. Does nothing if it has none.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EntityNotFound` for an unknown quote.
    pub fn clear_expiry(
        &mut self,
        quote_id: Uuid,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        if self.require_quote(quote_id)?.expiry.is_some() {
            self.raise(
                QuoteEventKind::QuoteExpiryCleared(QuoteExpiryCleared { quote_id }),
                ctx,
            );
        }
        Ok(())
    }

    /// Records the workflow step the form reports for a quote.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EntityNotFound` for an unknown quote and
    /// `DomainError::InvariantViolation` for a discarded one.
    pub fn assign_workflow_step(
        &mut self,
        quote_id: Uuid,
        workflow_step: String,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        self.require_active_quote(quote_id)?;
        self.raise(
            QuoteEventKind::WorkflowStepAssigned(WorkflowStepAssigned {
                quote_id,
                workflow_step,
            }),
            ctx,
        );
        Ok(())
    }

    /// Attaches an uploaded file.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EntityNotFound` for an unknown quote.
    pub fn attach_file(
        &mut self,
        quote_id: Uuid,
        attachment: FileAttachment,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        self.require_quote(quote_id)?;
        self.raise(
            QuoteEventKind::FileAttached(FileAttached {
                quote_id,
                attachment,
            }),
            ctx,
        );
        Ok(())
    }

    /// Attaches a generated document.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EntityNotFound` for an unknown quote.
    pub fn attach_document(
        &mut self,
        quote_id: Uuid,
        document: QuoteDocument,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        self.require_quote(quote_id)?;
        self.raise(
            QuoteEventKind::DocumentAttached(DocumentAttached { quote_id, document }),
            ctx,
        );
        Ok(())
    }

    // ----- payment and funding outcomes ------------------------------------

    fn failed_payload(
        quote_id: Uuid,
        outcome: Outcome,
        errors: Vec<String>,
        data_snapshot_ids: DataSnapshotIds,
    ) -> Result<AttemptFailed, DomainError> {
        if outcome == Outcome::Success {
            return Err(DomainError::invariant(
                "a failed attempt cannot carry a Success outcome",
            ));
        }
        Ok(AttemptFailed {
            quote_id,
            outcome,
            errors,
            data_snapshot_ids,
        })
    }

    /// Records the outcome of a payment attempt made with the given data.
    ///
    /// A successful payment moves the quote through the `Payment` action.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` for a failure report with a
    /// `Success` outcome, plus the errors of [`Self::update_form_data`].
    pub fn record_payment(
        &mut self,
        quote_id: Uuid,
        report: AttemptReport<PaymentDetails>,
        data_snapshot_ids: DataSnapshotIds,
        workflow: &dyn QuoteWorkflow,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        let quote = self.require_active_quote(quote_id)?;
        match report {
            AttemptReport::Succeeded(payment_details) => {
                let change = Self::plan_transition(quote, QuoteAction::Payment, workflow)?;
                self.raise(
                    QuoteEventKind::PaymentMade(PaymentMade {
                        quote_id,
                        payment_details,
                        data_snapshot_ids,
                    }),
                    ctx,
                );
                self.raise_transition(change, ctx);
            }
            AttemptReport::Failed { outcome, errors } => {
                let payload = Self::failed_payload(quote_id, outcome, errors, data_snapshot_ids)?;
                self.raise(QuoteEventKind::PaymentFailed(payload), ctx);
            }
        }
        Ok(())
    }

    /// Records the outcome of asking a funding provider for a proposal.
    ///
    /// # Errors
    ///
    /// As for [`Self::record_payment`].
    pub fn record_funding_proposal_creation(
        &mut self,
        quote_id: Uuid,
        report: AttemptReport<FundingProposal>,
        data_snapshot_ids: DataSnapshotIds,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        self.require_active_quote(quote_id)?;
        let kind = match report {
            AttemptReport::Succeeded(funding_proposal) => {
                QuoteEventKind::FundingProposalCreated(FundingProposalRecorded {
                    quote_id,
                    funding_proposal,
                    data_snapshot_ids,
                })
            }
            AttemptReport::Failed { outcome, errors } => {
                QuoteEventKind::FundingProposalCreationFailed(Self::failed_payload(
                    quote_id,
                    outcome,
                    errors,
                    data_snapshot_ids,
                )?)
            }
        };
        self.raise(kind, ctx);
        Ok(())
    }

    /// Records the outcome of accepting a funding proposal.
    ///
    /// A successful acceptance moves the quote through the `Fund` action.
    ///
    /// # Errors
    ///
    /// As for [`Self::record_payment`].
    pub fn record_funding_proposal_acceptance(
        &mut self,
        quote_id: Uuid,
        report: AttemptReport<FundingProposal>,
        data_snapshot_ids: DataSnapshotIds,
        workflow: &dyn QuoteWorkflow,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        let quote = self.require_active_quote(quote_id)?;
        match report {
            AttemptReport::Succeeded(funding_proposal) => {
                let change = Self::plan_transition(quote, QuoteAction::Fund, workflow)?;
                self.raise(
                    QuoteEventKind::FundingProposalAccepted(FundingProposalRecorded {
                        quote_id,
                        funding_proposal,
                        data_snapshot_ids,
                    }),
                    ctx,
                );
                self.raise_transition(change, ctx);
            }
            AttemptReport::Failed { outcome, errors } => {
                let payload = Self::failed_payload(quote_id, outcome, errors, data_snapshot_ids)?;
                self.raise(QuoteEventKind::FundingProposalAcceptanceFailed(payload), ctx);
            }
        }
        Ok(())
    }

    // ----- aggregate-level records -----------------------------------------

    /// Makes `owner_user_id` the owner. Does nothing if they already are.
    pub fn assign_owner(&mut self, owner_user_id: Uuid, ctx: &CommandContext<'_>) {
        if self.owner_user_id != Some(owner_user_id) {
            self.raise(
                QuoteEventKind::OwnerAssigned(OwnerAssigned { owner_user_id }),
                ctx,
            );
        }
    }

    /// Removes the owner. Does nothing if there is none.
    pub fn unassign_owner(&mut self, ctx: &CommandContext<'_>) {
        if let Some(previous_owner_user_id) = self.owner_user_id {
            self.raise(
                QuoteEventKind::OwnerUnassigned(OwnerUnassigned {
                    previous_owner_user_id,
                }),
                ctx,
            );
        }
    }

    /// Associates the aggregate with a customer.
    pub fn associate_with_customer(
        &mut self,
        customer_id: Uuid,
        details: CustomerDetails,
        ctx: &CommandContext<'_>,
    ) {
        self.raise(
            QuoteEventKind::CustomerAssociated(CustomerAssociated {
                customer_id,
                customer_details: CustomerDetailsRecord {
                    id: Uuid::new_v4(),
                    details,
                    created_at: ctx.now(),
                },
            }),
            ctx,
        );
    }

    /// Records new details for the associated customer.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if no customer is associated.
    pub fn update_customer_details(
        &mut self,
        details: CustomerDetails,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        if self.customer_id.is_none() {
            return Err(DomainError::Validation(format!(
                "aggregate {} has no associated customer",
                self.id
            )));
        }
        self.raise(
            QuoteEventKind::CustomerDetailsUpdated(CustomerDetailsUpdated {
                customer_details: CustomerDetailsRecord {
                    id: Uuid::new_v4(),
                    details,
                    created_at: ctx.now(),
                },
            }),
            ctx,
        );
        Ok(())
    }

    /// Moves the aggregate to another product release.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if it is already on that release.
    pub fn migrate_product_release(
        &mut self,
        product_release_id: Uuid,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        if self.product_release_id == product_release_id {
            return Err(DomainError::Validation(format!(
                "aggregate {} is already on product release {product_release_id}",
                self.id
            )));
        }
        self.raise(
            QuoteEventKind::ProductReleaseMigrated(ProductReleaseMigrated {
                previous_product_release_id: self.product_release_id,
                product_release_id,
            }),
            ctx,
        );
        Ok(())
    }

    /// Moves the aggregate to another organisation.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if it already belongs to it.
    pub fn migrate_organisation(
        &mut self,
        organisation_id: Uuid,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        if self.organisation_id == organisation_id {
            return Err(DomainError::Validation(format!(
                "aggregate {} already belongs to organisation {organisation_id}",
                self.id
            )));
        }
        self.raise(
            QuoteEventKind::OrganisationMigrated(OrganisationMigrated {
                previous_organisation_id: self.organisation_id,
                organisation_id,
            }),
            ctx,
        );
        Ok(())
    }

    // ----- data patches ------------------------------------------------------

    fn patch_holders(&self) -> impl Iterator<Item = &dyn PatchableDataHolder> {
        let quotes = self
            .quotes
            .iter()
            .filter(|q| !q.discarded)
            .map(|q| q as &dyn PatchableDataHolder);
        let transactions = self
            .policy
            .iter()
            .flat_map(|p| p.transactions.iter())
            .map(|t| t as &dyn PatchableDataHolder);
        quotes.chain(transactions)
    }

    /// Corrects policy data retroactively.
    ///
    /// Every specified path must resolve to at least one target and every
    /// candidate must pass the command's rules; otherwise nothing is
    /// recorded. On success one patch event is recorded per path.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when the patch is rejected or a
    /// customer-sourced value has no customer, `DomainError::EntityNotFound`
    /// when the scope names an unknown quote and
    /// `DomainError::InvariantViolation` when it names a discarded one.
    pub fn patch_policy_data(
        &mut self,
        command: &PolicyDataPatchCommand,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        if command.paths().next().is_none() {
            return Err(PatchRejection::NoPathSpecified.into());
        }
        if let Some(quote_id) = command.scope.quote_id() {
            if self.require_quote(quote_id)?.discarded {
                return Err(DomainError::InvariantViolation(format!(
                    "quote {quote_id} has been discarded and cannot be patched"
                )));
            }
        }
        let value = match &command.value_source {
            PatchValueSource::Literal(value) => value.clone(),
            PatchValueSource::CustomerDetail(field) => self
                .customer_details
                .as_ref()
                .map(|record| record.details.field_value(*field))
                .ok_or_else(|| {
                    DomainError::Validation(format!(
                        "aggregate {} has no customer to take {field:?} from",
                        self.id
                    ))
                })?,
        };

        let mut patches = Vec::new();
        for (kind, path) in command.paths() {
            let mut targets = Vec::new();
            for holder in self.patch_holders() {
                let selected = match kind {
                    DataPatchType::FormData => {
                        holder.select_and_validate_form_data_patch_targets(command)?
                    }
                    DataPatchType::CalculationResult => {
                        holder.select_and_validate_calculation_result_patch_targets(command)?
                    }
                };
                targets.extend(selected);
            }
            if targets.is_empty() {
                return Err(PatchRejection::NoMatchingTarget {
                    kind,
                    path: path.to_owned(),
                }
                .into());
            }
            patches.push(DataPatch {
                kind,
                path: path.to_owned(),
                value: value.clone(),
                targets,
            });
        }

        for patch in patches {
            self.raise(
                QuoteEventKind::PolicyDataPatched(PolicyDataPatched { patch }),
                ctx,
            );
        }
        Ok(())
    }

    // ----- policy --------------------------------------------------------------

    /// Issues the policy from a new business quote, or adds a renewal,
    /// adjustment or cancellation transaction to it.
    ///
    /// Dates and the amount payable are read from the quote's data through
    /// the product's datum locations.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` when a new business quote
    /// would replace an existing policy, when another quote type finds no
    /// live policy, or when the quote already produced a transaction;
    /// `DomainError::DatumResolution` when the quote data is malformed; and
    /// the errors of [`Self::update_form_data`].
    pub fn issue_policy(
        &mut self,
        quote_id: Uuid,
        policy_id: Uuid,
        policy_number: String,
        policy_transaction_id: Uuid,
        config: &QuoteProductConfiguration,
        workflow: &dyn QuoteWorkflow,
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        let quote = self.require_active_quote(quote_id)?;
        if quote.policy_transaction_id.is_some() {
            return Err(DomainError::InvariantViolation(format!(
                "quote {quote_id} has already produced a policy transaction"
            )));
        }
        let change = Self::plan_transition(quote, QuoteAction::Policy, workflow)?;
        let form_data = quote.form_data.as_ref().map_or(Value::Null, |r| r.data.clone());
        let calculation_result = quote
            .calculation_result
            .as_ref()
            .map_or(Value::Null, |r| r.data.clone());
        let data =
            StandardQuoteData::retrieve(&config.datum_locations, &form_data, &calculation_result)?;

        let kind = match quote.quote_type {
            QuoteType::NewBusiness => {
                if let Some(existing) = &self.policy {
                    return Err(DomainError::InvariantViolation(format!(
                        "aggregate {} already has policy {}; a new business quote cannot replace it",
                        self.id, existing.id
                    )));
                }
                QuoteEventKind::PolicyIssued(PolicyIssued {
                    policy_id,
                    policy_number,
                    quote_id,
                    policy_transaction_id,
                    inception_date: data.inception_date,
                    expiry_date: data.expiry_date,
                    total_payable: data.total_payable,
                })
            }
            quote_type => {
                let policy = self.policy.as_ref().ok_or_else(|| {
                    DomainError::InvariantViolation(format!(
                        "aggregate {} has no policy for a {quote_type} quote to transact on",
                        self.id
                    ))
                })?;
                if policy.deleted {
                    return Err(DomainError::InvariantViolation(format!(
                        "policy {} has been deleted",
                        policy.id
                    )));
                }
                let effective_date = match quote_type {
                    QuoteType::Renewal => data.inception_date,
                    QuoteType::Adjustment => data.effective_date,
                    QuoteType::Cancellation | QuoteType::NewBusiness => {
                        data.cancellation_effective_date
                    }
                };
                QuoteEventKind::PolicyTransactionCreated(PolicyTransactionCreated {
                    policy_id: policy.id,
                    quote_id,
                    policy_transaction_id,
                    quote_type,
                    effective_date,
                    expiry_date: data.expiry_date,
                    total_payable: data.total_payable,
                })
            }
        };

        self.raise(kind, ctx);
        self.raise_transition(change, ctx);
        Ok(())
    }

    /// Logically deletes the policy records.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EntityNotFound` if there is no policy and
    /// `DomainError::InvariantViolation` if it is already deleted.
    pub fn delete_policy(&mut self, ctx: &CommandContext<'_>) -> Result<(), DomainError> {
        let policy = self
            .policy
            .as_ref()
            .ok_or_else(|| DomainError::not_found("policy", self.id))?;
        if policy.deleted {
            return Err(DomainError::InvariantViolation(format!(
                "policy {} has already been deleted",
                policy.id
            )));
        }
        let policy_id = policy.id;
        self.raise(QuoteEventKind::PolicyDeleted(PolicyDeleted { policy_id }), ctx);
        Ok(())
    }

    // ----- rollback ------------------------------------------------------------

    /// Rolls the stream back to `target_sequence_number`.
    ///
    /// `history` is the persisted event stream the aggregate was loaded
    /// from. The recorded event only names the target; the events to replay
    /// and strip are derived from the history by [`rollback`].
    ///
    /// # Errors
    ///
    /// Returns the rollback precondition errors of
    /// [`rollback::validate_target`], or `DomainError::InvariantViolation`
    /// if `history` is not this aggregate's persisted stream.
    #[allow(clippy::cast_possible_wrap)]
    pub fn rollback_to(
        &mut self,
        target_sequence_number: i64,
        history: &[QuoteEvent],
        ctx: &CommandContext<'_>,
    ) -> Result<(), DomainError> {
        if history.len() as i64 != self.persisted_version() {
            return Err(DomainError::InvariantViolation(format!(
                "history of {} events does not match aggregate {} at version {}",
                history.len(),
                self.id,
                self.persisted_version()
            )));
        }
        rollback::validate_target(self.id, history, target_sequence_number)?;
        self.raise(
            QuoteEventKind::RolledBack(RolledBack {
                target_sequence_number,
            }),
            ctx,
        );
        Ok(())
    }

    // ----- event plumbing --------------------------------------------------------

    /// Applies a new event and queues it for persistence.
    fn raise(&mut self, kind: QuoteEventKind, ctx: &CommandContext<'_>) {
        let event = QuoteEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: kind.event_type().to_owned(),
                aggregate_id: self.id,
                tenant_id: self.tenant_id,
                performing_user_id: ctx.performing_user_id,
                sequence_number: self.version,
                correlation_id: ctx.correlation_id,
                causation_id: ctx.correlation_id,
                occurred_at: ctx.now(),
            },
            kind,
        };
        debug!(
            event_type = %event.metadata.event_type,
            aggregate_id = %self.id,
            sequence_number = event.metadata.sequence_number,
            "raising event"
        );
        self.apply(&event);
        self.uncommitted_events.push(event);
    }

    fn add_quote(&mut self, quote: Quote) {
        self.quote_index.insert(quote.id, self.quotes.len());
        self.quotes.push(quote);
    }

    fn with_quote(&mut self, quote_id: Uuid, event_type: &str, f: impl FnOnce(&mut Quote)) {
        match self.quote_index.get(&quote_id) {
            Some(&position) => f(&mut self.quotes[position]),
            None => warn!(
                aggregate_id = %self.id,
                %quote_id,
                event_type,
                "event refers to an unknown quote; skipped"
            ),
        }
    }

    fn outcome_failure<T>(
        &self,
        failed: &AttemptFailed,
        metadata: &EventMetadata,
    ) -> Option<OutcomeResult<T>> {
        match OutcomeResult::failure(
            failed.outcome,
            failed.errors.clone(),
            failed.data_snapshot_ids,
            metadata.occurred_at,
        ) {
            Ok(result) => Some(result),
            Err(e) => {
                error!(
                    aggregate_id = %self.id,
                    sequence_number = metadata.sequence_number,
                    error = %e,
                    "stored failure event cannot be turned into a result; skipped"
                );
                None
            }
        }
    }

    fn apply_cloned(
        &mut self,
        quote_type: QuoteType,
        e: &ClonedQuoteCreated,
        metadata: &EventMetadata,
    ) {
        let mut quote = Quote::new(
            e.quote_id,
            quote_type,
            states::NASCENT,
            metadata.sequence_number,
            metadata.occurred_at,
        );
        quote.parent_quote_id = Some(e.parent_quote_id);
        quote.quote_number.clone_from(&e.quote_number);
        quote.form_data.clone_from(&e.form_data);
        self.add_quote(quote);
    }

    fn apply_patch(&mut self, patch: &DataPatch) {
        let mut applied = false;
        for quote in &mut self.quotes {
            applied |= quote.apply_patch_if_applicable(patch);
        }
        if let Some(policy) = &mut self.policy {
            for transaction in &mut policy.transactions {
                applied |= transaction.apply_patch_if_applicable(patch);
            }
        }
        if !applied {
            warn!(
                aggregate_id = %self.id,
                kind = %patch.kind,
                path = %patch.path,
                "data patch was not applicable to any stored data"
            );
        }
    }

    fn apply_policy_transaction(&mut self, quote_id: Uuid, transaction: PolicyTransaction) {
        let transaction_id = transaction.id;
        match &mut self.policy {
            Some(policy) => policy.add_transaction(transaction),
            None => {
                warn!(
                    aggregate_id = %self.id,
                    %transaction_id,
                    "policy transaction without a policy; skipped"
                );
                return;
            }
        }
        self.with_quote(quote_id, "policy transaction", |q| {
            q.policy_transaction_id = Some(transaction_id);
        });
    }
}

impl AggregateRoot for QuoteAggregate {
    type Event = QuoteEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    #[allow(clippy::too_many_lines)]
    fn apply(&mut self, event: &Self::Event) {
        let metadata = &event.metadata;
        let seq = metadata.sequence_number;
        let at = metadata.occurred_at;
        let event_type = event.kind.event_type();
        match &event.kind {
            QuoteEventKind::QuoteInitialized(e) => {
                self.tenant_id = metadata.tenant_id;
                self.organisation_id = e.organisation_id;
                self.product_id = e.product_id;
                self.product_release_id = e.product_release_id;
                self.created_at = Some(at);
                let mut quote = Quote::new(
                    e.quote_id,
                    QuoteType::NewBusiness,
                    e.initial_state.clone(),
                    seq,
                    at,
                );
                quote.quote_number.clone_from(&e.quote_number);
                quote.form_data.clone_from(&e.form_data);
                self.add_quote(quote);
            }
            QuoteEventKind::QuoteImported(e) => {
                self.tenant_id = metadata.tenant_id;
                self.organisation_id = e.organisation_id;
                self.product_id = e.product_id;
                self.product_release_id = e.product_release_id;
                self.created_at = Some(at);
                let mut quote =
                    Quote::new(e.quote_id, e.quote_type, e.workflow_state.clone(), seq, at);
                quote.quote_number.clone_from(&e.quote_number);
                quote.form_data.clone_from(&e.form_data);
                quote.calculation_result.clone_from(&e.calculation_result);
                self.add_quote(quote);
            }
            QuoteEventKind::RenewalQuoteCreated(e) => {
                self.apply_cloned(QuoteType::Renewal, e, metadata);
            }
            QuoteEventKind::AdjustmentQuoteCreated(e) => {
                self.apply_cloned(QuoteType::Adjustment, e, metadata);
            }
            QuoteEventKind::CancellationQuoteCreated(e) => {
                self.apply_cloned(QuoteType::Cancellation, e, metadata);
            }
            QuoteEventKind::QuoteStateChanged(e) => {
                self.with_quote(e.quote_id, event_type, |q| {
                    q.workflow_state.clone_from(&e.resulting_state);
                });
            }
            QuoteEventKind::FormDataUpdated(e) => {
                self.with_quote(e.quote_id, event_type, |q| {
                    q.form_data = Some(e.form_data.clone());
                });
            }
            QuoteEventKind::CalculationResultCreated(e) => {
                self.with_quote(e.quote_id, event_type, |q| {
                    q.calculation_result = Some(e.calculation_result.clone());
                });
            }
            QuoteEventKind::CustomerAssociated(e) => {
                self.customer_id = Some(e.customer_id);
                self.customer_details = Some(e.customer_details.clone());
            }
            QuoteEventKind::CustomerDetailsUpdated(e) => {
                self.customer_details = Some(e.customer_details.clone());
            }
            QuoteEventKind::OwnerAssigned(e) => {
                self.owner_user_id = Some(e.owner_user_id);
            }
            QuoteEventKind::OwnerUnassigned(_) => {
                self.owner_user_id = None;
            }
            QuoteEventKind::QuoteExpirySet(e) => {
                self.with_quote(e.quote_id, event_type, |q| q.expiry = Some(e.expiry));
            }
            QuoteEventKind::QuoteExpiryCleared(e) => {
                self.with_quote(e.quote_id, event_type, |q| q.expiry = None);
            }
            QuoteEventKind::QuoteVersionCreated(e) => {
                let customer = self.customer_details.clone();
                self.with_quote(e.quote_id, event_type, |q| {
                    let data = q.data_snapshot(customer.as_ref());
                    q.versions.push(QuoteVersion {
                        version_id: e.version_id,
                        version_number: e.version_number,
                        data,
                        created_sequence_number: seq,
                        created_at: at,
                    });
                });
            }
            QuoteEventKind::QuoteDiscarded(e) => {
                self.with_quote(e.quote_id, event_type, |q| q.discarded = true);
            }
            QuoteEventKind::QuoteBound(e) => {
                self.with_quote(e.quote_id, event_type, |q| q.bound = true);
            }
            QuoteEventKind::QuoteSubmitted(e) => {
                self.with_quote(e.quote_id, event_type, |q| {
                    q.submissions.push(Submission {
                        id: e.submission_id,
                        data_snapshot_ids: e.data_snapshot_ids,
                        created_at: at,
                    });
                });
            }
            QuoteEventKind::EnquiryMade(e) => {
                self.with_quote(e.quote_id, event_type, |q| {
                    q.enquiries.push(Enquiry {
                        id: e.enquiry_id,
                        data_snapshot_ids: e.data_snapshot_ids,
                        created_at: at,
                    });
                });
            }
            QuoteEventKind::InvoiceIssued(e) => {
                self.with_quote(e.quote_id, event_type, |q| {
                    q.invoices.push(Invoice {
                        id: e.invoice_id,
                        invoice_number: e.invoice_number.clone(),
                        data_snapshot_ids: e.data_snapshot_ids,
                        created_at: at,
                    });
                });
            }
            QuoteEventKind::CreditNoteIssued(e) => {
                self.with_quote(e.quote_id, event_type, |q| {
                    q.credit_notes.push(CreditNote {
                        id: e.credit_note_id,
                        credit_note_number: e.credit_note_number.clone(),
                        data_snapshot_ids: e.data_snapshot_ids,
                        created_at: at,
                    });
                });
            }
            QuoteEventKind::PaymentMade(e) => {
                let result =
                    OutcomeResult::success(e.payment_details.clone(), e.data_snapshot_ids, at);
                self.with_quote(e.quote_id, event_type, |q| {
                    q.latest_payment = Some(PaymentAttemptResult(result));
                });
            }
            QuoteEventKind::PaymentFailed(e) => {
                if let Some(result) = self.outcome_failure(e, metadata) {
                    self.with_quote(e.quote_id, event_type, |q| {
                        q.latest_payment = Some(PaymentAttemptResult(result));
                    });
                }
            }
            QuoteEventKind::FundingProposalCreated(e) => {
                let result =
                    OutcomeResult::success(e.funding_proposal.clone(), e.data_snapshot_ids, at);
                self.with_quote(e.quote_id, event_type, |q| {
                    q.latest_funding_proposal_creation =
                        Some(FundingProposalCreationResult(result));
                });
            }
            QuoteEventKind::FundingProposalCreationFailed(e) => {
                if let Some(result) = self.outcome_failure(e, metadata) {
                    self.with_quote(e.quote_id, event_type, |q| {
                        q.latest_funding_proposal_creation =
                            Some(FundingProposalCreationResult(result));
                    });
                }
            }
            QuoteEventKind::FundingProposalAccepted(e) => {
                let result =
                    OutcomeResult::success(e.funding_proposal.clone(), e.data_snapshot_ids, at);
                self.with_quote(e.quote_id, event_type, |q| {
                    q.latest_funding_proposal_acceptance =
                        Some(FundingProposalAcceptanceResult(result));
                });
            }
            QuoteEventKind::FundingProposalAcceptanceFailed(e) => {
                if let Some(result) = self.outcome_failure(e, metadata) {
                    self.with_quote(e.quote_id, event_type, |q| {
                        q.latest_funding_proposal_acceptance =
                            Some(FundingProposalAcceptanceResult(result));
                    });
                }
            }
            QuoteEventKind::FileAttached(e) => {
                self.with_quote(e.quote_id, event_type, |q| q.files.push(e.attachment.clone()));
            }
            QuoteEventKind::DocumentAttached(e) => {
                self.with_quote(e.quote_id, event_type, |q| q.documents.push(e.document.clone()));
            }
            QuoteEventKind::WorkflowStepAssigned(e) => {
                self.with_quote(e.quote_id, event_type, |q| {
                    q.workflow_step = Some(e.workflow_step.clone());
                });
            }
            QuoteEventKind::PolicyDataPatched(e) => self.apply_patch(&e.patch),
            QuoteEventKind::PolicyIssued(e) => {
                let data = self
                    .quote(e.quote_id)
                    .map(|q| q.data_snapshot(self.customer_details.as_ref()))
                    .unwrap_or_default();
                self.policy = Some(Policy {
                    id: e.policy_id,
                    policy_number: e.policy_number.clone(),
                    issued_from_quote_id: e.quote_id,
                    inception_date: None,
                    expiry_date: None,
                    deleted: false,
                    transactions: Vec::new(),
                    issued_at: at,
                });
                self.apply_policy_transaction(
                    e.quote_id,
                    PolicyTransaction {
                        id: e.policy_transaction_id,
                        transaction_type: PolicyTransactionType::NewBusiness,
                        quote_id: e.quote_id,
                        effective_date: e.inception_date,
                        expiry_date: e.expiry_date,
                        total_payable: e.total_payable,
                        data,
                        created_sequence_number: seq,
                        created_at: at,
                    },
                );
            }
            QuoteEventKind::PolicyTransactionCreated(e) => {
                let data = self
                    .quote(e.quote_id)
                    .map(|q| q.data_snapshot(self.customer_details.as_ref()))
                    .unwrap_or_default();
                self.apply_policy_transaction(
                    e.quote_id,
                    PolicyTransaction {
                        id: e.policy_transaction_id,
                        transaction_type: e.quote_type.into(),
                        quote_id: e.quote_id,
                        effective_date: e.effective_date,
                        expiry_date: e.expiry_date,
                        total_payable: e.total_payable,
                        data,
                        created_sequence_number: seq,
                        created_at: at,
                    },
                );
            }
            QuoteEventKind::PolicyDeleted(_) => {
                if let Some(policy) = &mut self.policy {
                    policy.deleted = true;
                }
            }
            QuoteEventKind::ProductReleaseMigrated(e) => {
                self.product_release_id = e.product_release_id;
            }
            QuoteEventKind::OrganisationMigrated(e) => {
                self.organisation_id = e.organisation_id;
            }
            // Projections act on rollbacks; the legacy markers carry no state.
            QuoteEventKind::RolledBack(_)
            | QuoteEventKind::QuoteSaved(_)
            | QuoteEventKind::QuoteEmailSent(_) => {}
        }
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::corollary::Corollary;
    use crate::domain::expiry::ExpirySettings;
    use crate::domain::patch::{PatchRule, PatchScope, PatchTarget};
    use crate::domain::workflow::StandardQuoteWorkflow;
    use coverline_test_support::{FixedClock, fixed_now};
    use rust_decimal_macros::dec;
    use serde_json::json;

    struct Fixture {
        aggregate_id: Uuid,
        quote_id: Uuid,
        tenant_id: Uuid,
        clock: FixedClock,
        workflow: StandardQuoteWorkflow,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                aggregate_id: Uuid::new_v4(),
                quote_id: Uuid::new_v4(),
                tenant_id: Uuid::new_v4(),
                clock: FixedClock::default(),
                workflow: StandardQuoteWorkflow::default(),
            }
        }

        fn ctx(&self) -> CommandContext<'_> {
            CommandContext::new(Uuid::new_v4(), &self.clock)
        }

        fn new_business(&self, config: &QuoteProductConfiguration) -> QuoteAggregate {
            QuoteAggregate::create_new_business_quote(
                self.aggregate_id,
                self.tenant_id,
                NewBusinessQuote {
                    quote_id: self.quote_id,
                    organisation_id: Uuid::new_v4(),
                    product_id: Uuid::new_v4(),
                    product_release_id: Uuid::new_v4(),
                    quote_number: Some("Q-0001".into()),
                    form_model: Some(json!({ "policyStartDate": "2026-02-01" })),
                },
                config,
                &self.ctx(),
            )
        }

        fn imported(&self, quote_type: QuoteType, state: &str) -> QuoteAggregate {
            QuoteAggregate::import_quote(
                self.aggregate_id,
                self.tenant_id,
                ImportedQuote {
                    quote_id: self.quote_id,
                    organisation_id: Uuid::new_v4(),
                    product_id: Uuid::new_v4(),
                    product_release_id: Uuid::new_v4(),
                    quote_type,
                    quote_number: Some("REN-001".into()),
                    workflow_state: state.into(),
                    form_model: Some(json!({
                        "policyStartDate": "2026-02-01",
                        "declaration": true
                    })),
                    calculation_result: Some(json!({
                        "payment": { "total": { "payable": "110.00" } }
                    })),
                },
                &self.ctx(),
            )
        }

        /// A new business quote walked to `Approved` with data to issue from.
        fn approved(&self) -> QuoteAggregate {
            let mut aggregate = self.new_business(&QuoteProductConfiguration::default());
            let ctx = self.ctx();
            aggregate
                .update_form_data(
                    self.quote_id,
                    json!({ "policyStartDate": "2026-02-01", "policyEndDate": "2027-02-01" }),
                    &self.workflow,
                    &ctx,
                )
                .unwrap();
            aggregate
                .record_calculation_result(
                    self.quote_id,
                    json!({ "payment": { "total": { "payable": 1250.5 } } }),
                    &self.workflow,
                    &ctx,
                )
                .unwrap();
            aggregate
                .perform_action(self.quote_id, QuoteAction::AutoApproval, &self.workflow, &ctx)
                .unwrap();
            aggregate
        }
    }

    fn committed(mut aggregate: QuoteAggregate) -> QuoteAggregate {
        aggregate.clear_uncommitted_events();
        aggregate
    }

    fn event_types(aggregate: &QuoteAggregate) -> Vec<&'static str> {
        aggregate
            .uncommitted_events()
            .iter()
            .map(|e| e.kind.event_type())
            .collect()
    }

    #[test]
    fn test_create_new_business_quote_starts_nascent() {
        // Arrange
        let fx = Fixture::new();

        // Act
        let aggregate = fx.new_business(&QuoteProductConfiguration::default());

        // Assert
        assert_eq!(aggregate.version(), 1);
        assert_eq!(aggregate.persisted_version(), 0);
        assert_eq!(event_types(&aggregate), ["quote.initialized"]);
        let event = &aggregate.uncommitted_events()[0];
        assert_eq!(event.metadata.sequence_number, 0);
        assert_eq!(event.metadata.tenant_id, fx.tenant_id);
        assert_eq!(event.metadata.occurred_at, fixed_now());
        let quote = aggregate.current_quote().unwrap();
        assert_eq!(quote.id, fx.quote_id);
        assert_eq!(quote.workflow_state, states::NASCENT);
        assert_eq!(quote.quote_type, QuoteType::NewBusiness);
        assert!(quote.expiry.is_none());
    }

    #[test]
    fn test_create_new_business_quote_sets_expiry_when_enabled() {
        let fx = Fixture::new();
        let config = QuoteProductConfiguration {
            expiry: ExpirySettings::enabled_for_days(30),
            ..QuoteProductConfiguration::default()
        };

        let aggregate = fx.new_business(&config);

        assert_eq!(
            event_types(&aggregate),
            ["quote.initialized", "quote.expiry_set"]
        );
        assert_eq!(
            aggregate.uncommitted_events()[1].metadata.sequence_number,
            1
        );
        assert!(aggregate.quote(fx.quote_id).unwrap().expiry.is_some());
    }

    #[test]
    fn test_update_form_data_moves_nascent_quote_to_incomplete() {
        // Arrange
        let fx = Fixture::new();
        let mut aggregate = committed(fx.new_business(&QuoteProductConfiguration::default()));

        // Act
        aggregate
            .update_form_data(fx.quote_id, json!({ "name": "Ada" }), &fx.workflow, &fx.ctx())
            .unwrap();

        // Assert
        let sequence_numbers: Vec<i64> = aggregate
            .uncommitted_events()
            .iter()
            .map(|e| e.metadata.sequence_number)
            .collect();
        assert_eq!(sequence_numbers, [1, 2]);
        assert_eq!(aggregate.persisted_version(), 1);
        let quote = aggregate.quote(fx.quote_id).unwrap();
        assert_eq!(quote.workflow_state, states::INCOMPLETE);
        assert_eq!(quote.form_data.as_ref().unwrap().data["formModel"]["name"], "Ada");
    }

    #[test]
    fn test_update_form_data_without_state_change_raises_one_event() {
        let fx = Fixture::new();
        let mut aggregate = committed(fx.imported(QuoteType::NewBusiness, states::INCOMPLETE));

        aggregate
            .update_form_data(fx.quote_id, json!({}), &fx.workflow, &fx.ctx())
            .unwrap();

        assert_eq!(event_types(&aggregate), ["quote.form_data_updated"]);
    }

    #[test]
    fn test_update_form_data_for_unknown_quote_is_not_found() {
        let fx = Fixture::new();
        let mut aggregate = committed(fx.new_business(&QuoteProductConfiguration::default()));

        let result = aggregate.update_form_data(Uuid::new_v4(), json!({}), &fx.workflow, &fx.ctx());

        assert!(result.unwrap_err().is_not_found());
        assert!(aggregate.uncommitted_events().is_empty());
    }

    #[test]
    fn test_perform_action_rejects_actions_with_their_own_command() {
        let fx = Fixture::new();
        let mut aggregate = committed(fx.imported(QuoteType::NewBusiness, states::APPROVED));

        let result =
            aggregate.perform_action(fx.quote_id, QuoteAction::Bind, &fx.workflow, &fx.ctx());

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_perform_action_forbidden_by_workflow_raises_nothing() {
        let fx = Fixture::new();
        let mut aggregate = committed(fx.imported(QuoteType::NewBusiness, states::DECLINED));

        let result = aggregate.perform_action(
            fx.quote_id,
            QuoteAction::ReviewApproval,
            &fx.workflow,
            &fx.ctx(),
        );

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert!(aggregate.uncommitted_events().is_empty());
    }

    #[test]
    fn test_discard_rejects_quote_that_is_not_current() {
        // Arrange
        let fx = Fixture::new();
        let mut aggregate = committed(fx.new_business(&QuoteProductConfiguration::default()));

        // Act
        let result = aggregate.discard_quote(Uuid::new_v4(), &fx.ctx());

        // Assert
        assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
        assert!(aggregate.uncommitted_events().is_empty());
    }

    #[test]
    fn test_discard_current_quote_once() {
        let fx = Fixture::new();
        let mut aggregate = committed(fx.new_business(&QuoteProductConfiguration::default()));

        aggregate.discard_quote(fx.quote_id, &fx.ctx()).unwrap();
        let second = aggregate.discard_quote(fx.quote_id, &fx.ctx());

        assert!(aggregate.quote(fx.quote_id).unwrap().discarded);
        assert!(matches!(second, Err(DomainError::InvariantViolation(_))));
        assert_eq!(event_types(&aggregate), ["quote.discarded"]);
    }

    #[test]
    fn test_clone_new_business_quote_is_rejected() {
        let fx = Fixture::new();
        let mut aggregate = committed(fx.new_business(&QuoteProductConfiguration::default()));

        let result = aggregate.clone_expired_quote(
            fx.quote_id,
            Uuid::new_v4(),
            None,
            &QuoteProductConfiguration::default(),
            &fx.workflow,
            &fx.ctx(),
        );

        assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
        assert!(aggregate.uncommitted_events().is_empty());
    }

    #[test]
    fn test_clone_renewal_quote_actualises_fresh_copy() {
        // Arrange
        let fx = Fixture::new();
        let mut aggregate = committed(fx.imported(QuoteType::Renewal, states::EXPIRED));
        let config = QuoteProductConfiguration {
            clone_reset_paths: vec!["declaration".into()],
            ..QuoteProductConfiguration::default()
        };
        let new_quote_id = Uuid::new_v4();

        // Act
        aggregate
            .clone_expired_quote(
                fx.quote_id,
                new_quote_id,
                Some("REN-002".into()),
                &config,
                &fx.workflow,
                &fx.ctx(),
            )
            .unwrap();

        // Assert
        assert_eq!(
            event_types(&aggregate),
            ["quote.renewal_quote_created", "quote.state_changed"]
        );
        let clone = aggregate.current_quote().unwrap();
        assert_eq!(clone.id, new_quote_id);
        assert_eq!(clone.quote_type, QuoteType::Renewal);
        assert_eq!(clone.parent_quote_id, Some(fx.quote_id));
        assert_eq!(clone.workflow_state, states::INCOMPLETE);
        let model = &clone.form_data.as_ref().unwrap().data["formModel"];
        assert_eq!(model["policyStartDate"], "2026-02-01");
        assert!(model.get("declaration").is_none());
        assert!(clone.calculation_result.is_none());
    }

    #[test]
    fn test_failed_payment_with_success_outcome_is_rejected() {
        let fx = Fixture::new();
        let mut aggregate = committed(fx.imported(QuoteType::NewBusiness, states::INCOMPLETE));

        let result = aggregate.record_payment(
            fx.quote_id,
            AttemptReport::Failed {
                outcome: Outcome::Success,
                errors: vec![],
            },
            DataSnapshotIds::default(),
            &fx.workflow,
            &fx.ctx(),
        );

        assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
        assert!(aggregate.uncommitted_events().is_empty());
    }

    #[test]
    fn test_declined_payment_is_recorded_against_its_data() {
        // Arrange
        let fx = Fixture::new();
        let mut aggregate = committed(fx.imported(QuoteType::NewBusiness, states::INCOMPLETE));
        let ids = aggregate.quote(fx.quote_id).unwrap().data_snapshot_ids(None);

        // Act
        aggregate
            .record_payment(
                fx.quote_id,
                AttemptReport::Failed {
                    outcome: Outcome::Failed,
                    errors: vec!["card declined".into()],
                },
                ids,
                &fx.workflow,
                &fx.ctx(),
            )
            .unwrap();

        // Assert
        let payment = aggregate.quote(fx.quote_id).unwrap().latest_payment.clone().unwrap();
        assert!(!payment.is_success());
        assert_eq!(payment.outcome(), Outcome::Failed);
        assert_eq!(payment.errors(), ["card declined".to_owned()]);
        assert_eq!(*payment.data_snapshot_ids(), ids);
    }

    #[test]
    fn test_successful_payment_keeps_state_and_exposes_details() {
        let fx = Fixture::new();
        let mut aggregate = committed(fx.imported(QuoteType::NewBusiness, states::APPROVED));
        let details = PaymentDetails {
            payment_id: Uuid::new_v4(),
            amount: dec!(110.00),
            currency_code: "AUD".into(),
            reference: "ch_42".into(),
            gateway_response: json!({ "status": "succeeded" }),
        };

        aggregate
            .record_payment(
                fx.quote_id,
                AttemptReport::Succeeded(details.clone()),
                DataSnapshotIds::default(),
                &fx.workflow,
                &fx.ctx(),
            )
            .unwrap();

        let quote = aggregate.quote(fx.quote_id).unwrap();
        assert_eq!(quote.workflow_state, states::APPROVED);
        assert_eq!(
            quote.latest_payment.as_ref().unwrap().payment_details(),
            Some(&details)
        );
        assert_eq!(event_types(&aggregate), ["quote.payment_made"]);
    }

    #[test]
    fn test_assign_owner_twice_raises_once() {
        let fx = Fixture::new();
        let mut aggregate = committed(fx.new_business(&QuoteProductConfiguration::default()));
        let owner = Uuid::new_v4();

        aggregate.assign_owner(owner, &fx.ctx());
        aggregate.assign_owner(owner, &fx.ctx());
        aggregate.unassign_owner(&fx.ctx());
        aggregate.unassign_owner(&fx.ctx());

        assert_eq!(
            event_types(&aggregate),
            ["quote.owner_assigned", "quote.owner_unassigned"]
        );
        assert!(aggregate.owner_user_id.is_none());
    }

    #[test]
    fn test_update_customer_details_requires_customer() {
        let fx = Fixture::new();
        let mut aggregate = committed(fx.new_business(&QuoteProductConfiguration::default()));

        let result = aggregate.update_customer_details(CustomerDetails::default(), &fx.ctx());

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_patch_of_discarded_quote_is_rejected() {
        let fx = Fixture::new();
        let mut aggregate = committed(fx.imported(QuoteType::NewBusiness, states::INCOMPLETE));
        aggregate.discard_quote(fx.quote_id, &fx.ctx()).unwrap();
        let command = PolicyDataPatchCommand {
            form_data_path: Some("policyStartDate".into()),
            calculation_result_path: None,
            value_source: PatchValueSource::Literal(json!("2026-03-01")),
            scope: PatchScope::QuoteFull {
                quote_id: fx.quote_id,
            },
            rules: vec![],
        };

        let result = aggregate.patch_policy_data(&command, &fx.ctx());

        assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn test_patch_failing_rule_records_nothing() {
        // Arrange
        let fx = Fixture::new();
        let mut aggregate = committed(fx.imported(QuoteType::NewBusiness, states::INCOMPLETE));
        let command = PolicyDataPatchCommand {
            form_data_path: Some("policyStartDate".into()),
            calculation_result_path: Some("payment.total.payable".into()),
            value_source: PatchValueSource::Literal(json!("2026-03-01")),
            scope: PatchScope::EntireAggregate,
            rules: vec![PatchRule::PropertyDoesNotExist],
        };

        // Act
        let result = aggregate.patch_policy_data(&command, &fx.ctx());

        // Assert
        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert!(aggregate.uncommitted_events().is_empty());
        let quote = aggregate.quote(fx.quote_id).unwrap();
        assert_eq!(
            quote.form_data.as_ref().unwrap().data["formModel"]["policyStartDate"],
            "2026-02-01"
        );
    }

    #[test]
    fn test_patch_with_both_paths_records_one_event_per_path() {
        // Arrange
        let fx = Fixture::new();
        let mut aggregate = committed(fx.imported(QuoteType::NewBusiness, states::INCOMPLETE));
        let command = PolicyDataPatchCommand {
            form_data_path: Some("policyStartDate".into()),
            calculation_result_path: Some("payment.total.payable".into()),
            value_source: PatchValueSource::Literal(json!("2026-03-01")),
            scope: PatchScope::QuoteLatest {
                quote_id: fx.quote_id,
            },
            rules: vec![PatchRule::PropertyExists],
        };

        // Act
        aggregate.patch_policy_data(&command, &fx.ctx()).unwrap();

        // Assert
        assert_eq!(
            event_types(&aggregate),
            ["quote.policy_data_patched", "quote.policy_data_patched"]
        );
        let QuoteEventKind::PolicyDataPatched(first) = &aggregate.uncommitted_events()[0].kind
        else {
            panic!("expected a patch event");
        };
        assert_eq!(first.patch.targets, [PatchTarget::Quote { quote_id: fx.quote_id }]);
        let quote = aggregate.quote(fx.quote_id).unwrap();
        assert_eq!(
            quote.form_data.as_ref().unwrap().data["formModel"]["policyStartDate"],
            "2026-03-01"
        );
        assert_eq!(
            quote.calculation_result.as_ref().unwrap().data["payment"]["total"]["payable"],
            "2026-03-01"
        );
    }

    #[test]
    fn test_patch_from_customer_detail_without_customer_is_rejected() {
        let fx = Fixture::new();
        let mut aggregate = committed(fx.imported(QuoteType::NewBusiness, states::INCOMPLETE));
        let command = PolicyDataPatchCommand {
            form_data_path: Some("contactName".into()),
            calculation_result_path: None,
            value_source: PatchValueSource::CustomerDetail(
                crate::domain::data::CustomerDetailField::FullName,
            ),
            scope: PatchScope::EntireAggregate,
            rules: vec![],
        };

        let result = aggregate.patch_policy_data(&command, &fx.ctx());

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_issue_policy_from_new_business_quote() {
        // Arrange
        let fx = Fixture::new();
        let mut aggregate = committed(fx.approved());
        let policy_id = Uuid::new_v4();
        let transaction_id = Uuid::new_v4();

        // Act
        aggregate
            .issue_policy(
                fx.quote_id,
                policy_id,
                "P-0001".into(),
                transaction_id,
                &QuoteProductConfiguration::default(),
                &fx.workflow,
                &fx.ctx(),
            )
            .unwrap();

        // Assert
        assert_eq!(
            event_types(&aggregate),
            ["quote.policy_issued", "quote.state_changed"]
        );
        let policy = aggregate.policy().unwrap();
        assert_eq!(policy.id, policy_id);
        assert_eq!(policy.inception_date, chrono::NaiveDate::from_ymd_opt(2026, 2, 1));
        assert_eq!(policy.expiry_date, chrono::NaiveDate::from_ymd_opt(2027, 2, 1));
        assert_eq!(policy.transactions.len(), 1);
        assert_eq!(policy.transactions[0].total_payable, dec!(1250.5));
        let quote = aggregate.quote(fx.quote_id).unwrap();
        assert_eq!(quote.policy_transaction_id, Some(transaction_id));
        assert_eq!(quote.workflow_state, states::COMPLETE);
    }

    #[test]
    fn test_renewal_without_policy_cannot_issue() {
        let fx = Fixture::new();
        let mut aggregate = committed(fx.imported(QuoteType::Renewal, states::APPROVED));

        let result = aggregate.issue_policy(
            fx.quote_id,
            Uuid::new_v4(),
            "P-0002".into(),
            Uuid::new_v4(),
            &QuoteProductConfiguration::default(),
            &fx.workflow,
            &fx.ctx(),
        );

        assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn test_delete_policy_without_policy_is_not_found() {
        let fx = Fixture::new();
        let mut aggregate = committed(fx.new_business(&QuoteProductConfiguration::default()));

        let missing = aggregate.delete_policy(&fx.ctx());

        assert!(missing.unwrap_err().is_not_found());
    }

    #[test]
    fn test_version_snapshot_is_immutable_after_form_update() {
        // Arrange
        let fx = Fixture::new();
        let mut aggregate = committed(fx.imported(QuoteType::NewBusiness, states::INCOMPLETE));
        aggregate
            .create_version(fx.quote_id, Uuid::new_v4(), &fx.workflow, &fx.ctx())
            .unwrap();

        // Act
        aggregate
            .update_form_data(
                fx.quote_id,
                json!({ "policyStartDate": "2026-09-09" }),
                &fx.workflow,
                &fx.ctx(),
            )
            .unwrap();

        // Assert
        let quote = aggregate.quote(fx.quote_id).unwrap();
        let version = quote.version(1).unwrap();
        assert_eq!(
            version.data.form_data.as_ref().unwrap().data["formModel"]["policyStartDate"],
            "2026-02-01"
        );
        assert_eq!(quote.next_version_number(), 2);
    }

    #[test]
    fn test_replaying_history_reproduces_state() {
        // Arrange
        let fx = Fixture::new();
        let aggregate = fx.approved();
        let history = aggregate.uncommitted_events().to_vec();

        // Act
        let replayed = QuoteAggregate::load_from_history(fx.aggregate_id, &history);

        // Assert
        assert_eq!(replayed.version(), aggregate.version());
        assert!(replayed.uncommitted_events().is_empty());
        assert_eq!(
            serde_json::to_value(&replayed).unwrap(),
            serde_json::to_value(&aggregate).unwrap()
        );
    }

    #[test]
    fn test_snapshot_with_later_events_matches_full_replay() {
        // Arrange
        let fx = Fixture::new();
        let full = fx.approved();
        let history = full.uncommitted_events().to_vec();
        let early = QuoteAggregate::load_from_history(fx.aggregate_id, &history[..2]);
        let snapshot = early.to_snapshot(fixed_now()).unwrap();

        // Act
        let restored = QuoteAggregate::from_snapshot(&snapshot, &history).unwrap();

        // Assert
        assert_eq!(restored.version(), full.version());
        assert_eq!(
            restored.quote(fx.quote_id).unwrap().workflow_state,
            states::APPROVED
        );
    }

    #[test]
    fn test_snapshot_with_uncommitted_events_is_rejected() {
        let fx = Fixture::new();
        let aggregate = fx.new_business(&QuoteProductConfiguration::default());

        let result = aggregate.to_snapshot(fixed_now());

        assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn test_rollback_to_latest_event_is_same_sequence_number() {
        let fx = Fixture::new();
        let history = fx.approved().uncommitted_events().to_vec();
        let mut aggregate = QuoteAggregate::load_from_history(fx.aggregate_id, &history);
        let latest = aggregate.version() - 1;

        let result = aggregate.rollback_to(latest, &history, &fx.ctx());

        assert!(matches!(result, Err(DomainError::SameSequenceNumber { .. })));
    }

    #[test]
    fn test_rollback_records_target_without_changing_state() {
        // Arrange
        let fx = Fixture::new();
        let history = fx.approved().uncommitted_events().to_vec();
        let mut aggregate = QuoteAggregate::load_from_history(fx.aggregate_id, &history);
        let before = serde_json::to_value(&aggregate.quotes).unwrap();

        // Act
        aggregate.rollback_to(0, &history, &fx.ctx()).unwrap();

        // Assert
        let QuoteEventKind::RolledBack(rolled_back) = &aggregate.uncommitted_events()[0].kind else {
            panic!("expected a rollback event");
        };
        assert_eq!(rolled_back.target_sequence_number, 0);
        assert_eq!(serde_json::to_value(&aggregate.quotes).unwrap(), before);
    }

    #[test]
    fn test_event_for_unknown_quote_is_skipped_on_replay() {
        let fx = Fixture::new();
        let mut history = fx
            .new_business(&QuoteProductConfiguration::default())
            .uncommitted_events()
            .to_vec();
        let mut stray = history[0].clone();
        stray.metadata.sequence_number = 1;
        stray.kind = QuoteEventKind::QuoteDiscarded(QuoteDiscarded {
            quote_id: Uuid::new_v4(),
        });
        history.push(stray);

        let aggregate = QuoteAggregate::load_from_history(fx.aggregate_id, &history);

        assert_eq!(aggregate.version(), 2);
        assert!(!aggregate.quote(fx.quote_id).unwrap().discarded);
    }
}
