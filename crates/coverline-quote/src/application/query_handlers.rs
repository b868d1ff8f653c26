//! Query handlers for the quote context.
//!
//! This module contains query handlers that reconstitute aggregates
//! from stored events and return read-only view DTOs.

use chrono::{DateTime, NaiveDate, Utc};
use coverline_core::aggregate::AggregateRoot;
use coverline_core::error::DomainError;
use coverline_core::repository::EventRepository;
use coverline_core::snapshot::SnapshotRepository;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::application::command_handlers;
use crate::domain::aggregates::QuoteAggregate;
use crate::domain::outcome::Outcome;
use crate::domain::policy::{Policy, PolicyTransactionType};
use crate::domain::quote::{Quote, QuoteType};
use crate::domain::rollback::RollbackPoint;

/// Read-only view of a quote.
#[derive(Debug, Serialize)]
pub struct QuoteView {
    /// The quote identifier.
    pub quote_id: Uuid,
    /// Human facing quote number.
    pub quote_number: Option<String>,
    /// Transaction type.
    pub quote_type: QuoteType,
    /// The quote this one was cloned from.
    pub parent_quote_id: Option<Uuid>,
    /// Current workflow state.
    pub workflow_state: String,
    /// Current form workflow step.
    pub workflow_step: Option<String>,
    /// Whether the quote has been discarded.
    pub discarded: bool,
    /// Whether the quote has been bound.
    pub bound: bool,
    /// When the quote expires, if it does.
    pub expiry: Option<DateTime<Utc>>,
    /// Numbers of the saved versions.
    pub version_numbers: Vec<u32>,
    /// Outcome of the latest payment attempt.
    pub latest_payment_outcome: Option<Outcome>,
    /// Policy transaction the quote produced.
    pub policy_transaction_id: Option<Uuid>,
}

impl From<&Quote> for QuoteView {
    fn from(quote: &Quote) -> Self {
        Self {
            quote_id: quote.id,
            quote_number: quote.quote_number.clone(),
            quote_type: quote.quote_type,
            parent_quote_id: quote.parent_quote_id,
            workflow_state: quote.workflow_state.clone(),
            workflow_step: quote.workflow_step.clone(),
            discarded: quote.discarded,
            bound: quote.bound,
            expiry: quote.expiry,
            version_numbers: quote.versions.iter().map(|v| v.version_number).collect(),
            latest_payment_outcome: quote.latest_payment.as_ref().map(|p| p.outcome()),
            policy_transaction_id: quote.policy_transaction_id,
        }
    }
}

/// Read-only view of a policy transaction.
#[derive(Debug, Serialize)]
pub struct PolicyTransactionView {
    /// The transaction identifier.
    pub policy_transaction_id: Uuid,
    /// Kind of change.
    pub transaction_type: PolicyTransactionType,
    /// The quote it was produced from.
    pub quote_id: Uuid,
    /// When it takes effect.
    pub effective_date: Option<NaiveDate>,
    /// When the cover it grants ends.
    pub expiry_date: Option<NaiveDate>,
    /// Amount payable.
    pub total_payable: Decimal,
}

/// Read-only view of a policy.
#[derive(Debug, Serialize)]
pub struct PolicyView {
    /// The policy identifier.
    pub policy_id: Uuid,
    /// Human facing policy number.
    pub policy_number: String,
    /// The quote that issued it.
    pub issued_from_quote_id: Uuid,
    /// Start of cover.
    pub inception_date: Option<NaiveDate>,
    /// End of cover.
    pub expiry_date: Option<NaiveDate>,
    /// Whether the policy records have been deleted.
    pub deleted: bool,
    /// Whether the latest transaction is a cancellation.
    pub cancelled: bool,
    /// Transactions in creation order.
    pub transactions: Vec<PolicyTransactionView>,
}

impl From<&Policy> for PolicyView {
    fn from(policy: &Policy) -> Self {
        Self {
            policy_id: policy.id,
            policy_number: policy.policy_number.clone(),
            issued_from_quote_id: policy.issued_from_quote_id,
            inception_date: policy.inception_date,
            expiry_date: policy.expiry_date,
            deleted: policy.deleted,
            cancelled: policy.is_cancelled(),
            transactions: policy
                .transactions
                .iter()
                .map(|t| PolicyTransactionView {
                    policy_transaction_id: t.id,
                    transaction_type: t.transaction_type,
                    quote_id: t.quote_id,
                    effective_date: t.effective_date,
                    expiry_date: t.expiry_date,
                    total_payable: t.total_payable,
                })
                .collect(),
        }
    }
}

/// Read-only view of a quote aggregate.
#[derive(Debug, Serialize)]
pub struct QuoteAggregateView {
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Owning organisation.
    pub organisation_id: Uuid,
    /// Product.
    pub product_id: Uuid,
    /// Product release.
    pub product_release_id: Uuid,
    /// Assigned owner.
    pub owner_user_id: Option<Uuid>,
    /// Associated customer.
    pub customer_id: Option<Uuid>,
    /// Associated customer's name.
    pub customer_name: Option<String>,
    /// Quotes in creation order.
    pub quotes: Vec<QuoteView>,
    /// The policy, once issued.
    pub policy: Option<PolicyView>,
    /// Current version (event count).
    pub version: i64,
}

impl From<&QuoteAggregate> for QuoteAggregateView {
    fn from(aggregate: &QuoteAggregate) -> Self {
        Self {
            aggregate_id: aggregate.id,
            tenant_id: aggregate.tenant_id,
            organisation_id: aggregate.organisation_id,
            product_id: aggregate.product_id,
            product_release_id: aggregate.product_release_id,
            owner_user_id: aggregate.owner_user_id,
            customer_id: aggregate.customer_id,
            customer_name: aggregate
                .customer_details
                .as_ref()
                .map(|c| c.details.full_name.clone()),
            quotes: aggregate.quotes().iter().map(QuoteView::from).collect(),
            policy: aggregate.policy().map(PolicyView::from),
            version: aggregate.version(),
        }
    }
}

/// The events a recorded rollback replays and strips.
#[derive(Debug, Serialize)]
pub struct RollbackEffectsView {
    /// The aggregate identifier.
    pub aggregate_id: Uuid,
    /// Sequence number of the rollback event.
    pub rollback_sequence_number: i64,
    /// Sequence number rolled back to.
    pub target_sequence_number: i64,
    /// Sequence numbers of the events to replay, in order.
    pub replayed_sequence_numbers: Vec<i64>,
    /// Sequence numbers of the events stripped, in order.
    pub stripped_sequence_numbers: Vec<i64>,
}

/// Retrieves a quote aggregate by its ID.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no events exist for the ID.
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub async fn get_quote_aggregate_by_id(
    aggregate_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<QuoteAggregateView, DomainError> {
    let stored_events = repo.load_events(aggregate_id).await?;
    if stored_events.is_empty() {
        return Err(DomainError::AggregateNotFound(aggregate_id));
    }
    let aggregate = command_handlers::reconstitute(aggregate_id, &stored_events)?;
    Ok(QuoteAggregateView::from(&aggregate))
}

/// Retrieves a quote aggregate starting from its latest snapshot, if any.
///
/// # Errors
///
/// As for [`get_quote_aggregate_by_id`], plus snapshot load and
/// deserialization errors.
pub async fn get_quote_aggregate_from_snapshot(
    aggregate_id: Uuid,
    repo: &dyn EventRepository,
    snapshots: &dyn SnapshotRepository,
) -> Result<QuoteAggregateView, DomainError> {
    let Some(snapshot) = snapshots.load_snapshot(aggregate_id).await? else {
        return get_quote_aggregate_by_id(aggregate_id, repo).await;
    };
    let later = repo.load_events_from(aggregate_id, snapshot.version).await?;
    debug!(
        %aggregate_id,
        snapshot_version = snapshot.version,
        later_events = later.len(),
        "loading aggregate from snapshot"
    );
    let later = command_handlers::to_domain_events(&later)?;
    let aggregate = QuoteAggregate::from_snapshot(&snapshot, &later)?;
    Ok(QuoteAggregateView::from(&aggregate))
}

/// Computes the replayed and stripped events of the rollback recorded at
/// `rollback_sequence_number`.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no events exist for the ID
/// and `DomainError::EntityNotFound` if the event at that sequence number
/// is not a rollback.
pub async fn get_rollback_effects(
    aggregate_id: Uuid,
    rollback_sequence_number: i64,
    repo: &dyn EventRepository,
) -> Result<RollbackEffectsView, DomainError> {
    let history = command_handlers::load_history(aggregate_id, repo).await?;
    let point = history
        .iter()
        .find(|e| e.metadata.sequence_number == rollback_sequence_number)
        .and_then(RollbackPoint::from_event)
        .ok_or_else(|| DomainError::not_found("rollback", rollback_sequence_number))?;
    Ok(RollbackEffectsView {
        aggregate_id,
        rollback_sequence_number,
        target_sequence_number: point.target_sequence_number,
        replayed_sequence_numbers: point
            .replay_events(&history)
            .iter()
            .map(|e| e.metadata.sequence_number)
            .collect(),
        stripped_sequence_numbers: point
            .stripped_events(&history)
            .iter()
            .map(|e| e.metadata.sequence_number)
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::command_handlers::{
        handle_create_new_business_quote, handle_perform_quote_action, handle_rollback,
        handle_take_snapshot, handle_update_form_data,
    };
    use crate::domain::commands::{
        CreateNewBusinessQuote, PerformQuoteAction, RollbackQuoteAggregate, TakeSnapshot,
        UpdateFormData,
    };
    use crate::domain::config::QuoteProduct;
    use crate::domain::workflow::{QuoteAction, states};
    use coverline_test_support::{
        EmptyEventRepository, FixedClock, InMemoryEventRepository, InMemorySnapshotRepository,
    };
    use serde_json::json;

    async fn quote_with_form(repo: &InMemoryEventRepository) -> (Uuid, Uuid) {
        let aggregate_id = Uuid::new_v4();
        let quote_id = Uuid::new_v4();
        let clock = FixedClock::default();
        let product = QuoteProduct::default();
        handle_create_new_business_quote(
            &CreateNewBusinessQuote {
                correlation_id: Uuid::new_v4(),
                performing_user_id: None,
                aggregate_id,
                tenant_id: Uuid::new_v4(),
                quote_id,
                organisation_id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                product_release_id: Uuid::new_v4(),
                quote_number: Some("Q-0200".into()),
                form_model: None,
            },
            &product,
            &clock,
            repo,
        )
        .await
        .unwrap();
        handle_update_form_data(
            &UpdateFormData {
                correlation_id: Uuid::new_v4(),
                performing_user_id: None,
                aggregate_id,
                quote_id,
                form_model: json!({ "policyStartDate": "2026-02-01" }),
            },
            &product,
            &clock,
            repo,
        )
        .await
        .unwrap();
        (aggregate_id, quote_id)
    }

    #[tokio::test]
    async fn test_get_quote_aggregate_returns_view() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        let (aggregate_id, quote_id) = quote_with_form(&repo).await;

        // Act
        let view = get_quote_aggregate_by_id(aggregate_id, &repo).await.unwrap();

        // Assert
        assert_eq!(view.aggregate_id, aggregate_id);
        assert_eq!(view.version, 3);
        assert_eq!(view.quotes.len(), 1);
        assert_eq!(view.quotes[0].quote_id, quote_id);
        assert_eq!(view.quotes[0].workflow_state, states::INCOMPLETE);
        assert_eq!(view.quotes[0].quote_number.as_deref(), Some("Q-0200"));
        assert!(view.policy.is_none());
    }

    #[tokio::test]
    async fn test_get_quote_aggregate_not_found() {
        let aggregate_id = Uuid::new_v4();

        let result = get_quote_aggregate_by_id(aggregate_id, &EmptyEventRepository).await;

        assert!(matches!(result, Err(DomainError::AggregateNotFound(id)) if id == aggregate_id));
    }

    #[tokio::test]
    async fn test_snapshot_view_matches_full_replay() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        let snapshots = InMemorySnapshotRepository::new();
        let clock = FixedClock::default();
        let (aggregate_id, quote_id) = quote_with_form(&repo).await;
        handle_take_snapshot(
            &TakeSnapshot {
                correlation_id: Uuid::new_v4(),
                performing_user_id: None,
                aggregate_id,
            },
            &clock,
            &repo,
            &snapshots,
        )
        .await
        .unwrap();
        handle_perform_quote_action(
            &PerformQuoteAction {
                correlation_id: Uuid::new_v4(),
                performing_user_id: None,
                aggregate_id,
                quote_id,
                action: QuoteAction::Decline,
            },
            &QuoteProduct::default(),
            &clock,
            &repo,
        )
        .await
        .unwrap();

        // Act
        let from_snapshot = get_quote_aggregate_from_snapshot(aggregate_id, &repo, &snapshots)
            .await
            .unwrap();
        let full = get_quote_aggregate_by_id(aggregate_id, &repo).await.unwrap();

        // Assert
        assert_eq!(from_snapshot.version, 4);
        assert_eq!(from_snapshot.quotes[0].workflow_state, states::DECLINED);
        assert_eq!(
            serde_json::to_value(&from_snapshot).unwrap(),
            serde_json::to_value(&full).unwrap()
        );
    }

    #[tokio::test]
    async fn test_rollback_effects_list_replayed_and_stripped_events() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        let (aggregate_id, _) = quote_with_form(&repo).await;
        handle_rollback(
            &RollbackQuoteAggregate {
                correlation_id: Uuid::new_v4(),
                performing_user_id: None,
                aggregate_id,
                target_sequence_number: 1,
            },
            &FixedClock::default(),
            &repo,
        )
        .await
        .unwrap();

        // Act
        let effects = get_rollback_effects(aggregate_id, 3, &repo).await.unwrap();

        // Assert
        assert_eq!(effects.target_sequence_number, 1);
        assert_eq!(effects.replayed_sequence_numbers, [0, 1]);
        assert_eq!(effects.stripped_sequence_numbers, [2]);
    }

    #[tokio::test]
    async fn test_rollback_effects_for_ordinary_event_is_not_found() {
        let repo = InMemoryEventRepository::new();
        let (aggregate_id, _) = quote_with_form(&repo).await;

        let result = get_rollback_effects(aggregate_id, 1, &repo).await;

        assert!(result.unwrap_err().is_not_found());
    }
}
