//! Integration tests driving quote aggregates through the command and query
//! handlers against an in-memory event store.

mod common;

use common::QuoteHarness;
use coverline_core::error::DomainError;
use coverline_core::repository::EventRepository;
use coverline_quote::application::command_handlers::{
    handle_clone_expired_quote, handle_create_quote_version, handle_patch_policy_data,
    handle_rollback,
};
use coverline_quote::application::query_handlers::{
    get_quote_aggregate_by_id, get_rollback_effects,
};
use coverline_quote::domain::commands::{CloneExpiredQuote, CreateQuoteVersion, PatchPolicyData};
use coverline_quote::domain::config::{QuoteProduct, QuoteProductConfiguration};
use coverline_quote::domain::events::QuoteEventKind;
use coverline_quote::domain::patch::{
    PatchRule, PatchScope, PatchTarget, PatchValueSource, PolicyDataPatchCommand,
};
use coverline_quote::domain::quote::QuoteType;
use coverline_quote::domain::rollback::validate_target;
use coverline_quote::domain::workflow::{QuoteAction, states};
use coverline_test_support::{fixed_now, init_test_tracing};
use serde_json::json;
use uuid::Uuid;

fn product_from_yaml(yaml: &str) -> QuoteProduct {
    QuoteProduct::from_configuration(QuoteProductConfiguration::from_yaml_str(yaml).unwrap())
}

fn clone_command(harness: &QuoteHarness, new_quote_id: Uuid) -> CloneExpiredQuote {
    CloneExpiredQuote {
        correlation_id: Uuid::new_v4(),
        performing_user_id: None,
        aggregate_id: harness.aggregate_id,
        source_quote_id: harness.quote_id,
        new_quote_id,
        quote_number: Some("REN-002".into()),
    }
}

#[tokio::test]
async fn test_new_business_quote_progresses_to_approved() {
    init_test_tracing();
    let harness = QuoteHarness::new(QuoteProduct::default());

    // Step 1: create, fill in and price the quote
    harness.create_new_business().await;
    harness.update_form(json!({ "policyStartDate": "2026-02-01" })).await;
    let calculated = harness
        .calculate(json!({ "payment": { "total": { "payable": 420 } } }))
        .await;
    assert_eq!(calculated.stored_events.len(), 1);

    // Step 2: approve it
    harness.perform(QuoteAction::AutoApproval).await;

    // Verify persisted state
    assert_eq!(
        harness.event_types(),
        [
            "quote.initialized",
            "quote.form_data_updated",
            "quote.state_changed",
            "quote.calculation_result_created",
            "quote.state_changed",
        ]
    );
    let view = get_quote_aggregate_by_id(harness.aggregate_id, &harness.repo)
        .await
        .unwrap();
    assert_eq!(view.version, 5);
    assert_eq!(view.quotes.len(), 1);
    assert_eq!(view.quotes[0].workflow_state, states::APPROVED);
}

#[tokio::test]
async fn test_expiry_enabled_product_sets_expiry_on_creation() {
    let harness = QuoteHarness::new(product_from_yaml(
        "expiry:\n  enabled: true\n  expiry_days: 30\n  time_zone: Australia/Melbourne\n",
    ));

    harness.create_new_business().await;

    assert_eq!(harness.event_types(), ["quote.initialized", "quote.expiry_set"]);
    let view = get_quote_aggregate_by_id(harness.aggregate_id, &harness.repo)
        .await
        .unwrap();
    let expiry = view.quotes[0].expiry.unwrap();
    assert!(expiry > fixed_now());
}

#[tokio::test]
async fn test_cloning_expired_renewal_drops_reset_paths() {
    // Arrange
    let harness = QuoteHarness::new(product_from_yaml("clone_reset_paths:\n  - policyStartDate\n"));
    harness
        .import(
            QuoteType::Renewal,
            states::EXPIRED,
            json!({ "policyStartDate": "2026-02-01", "declaration": true }),
        )
        .await;
    let new_quote_id = Uuid::new_v4();

    // Act
    let result = handle_clone_expired_quote(
        &clone_command(&harness, new_quote_id),
        &harness.product,
        &harness.clock,
        &harness.repo,
    )
    .await
    .unwrap();

    // Assert
    let types: Vec<&str> = result.stored_events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, ["quote.renewal_quote_created", "quote.state_changed"]);
    let created: QuoteEventKind =
        serde_json::from_value(result.stored_events[0].payload.clone()).unwrap();
    match created {
        QuoteEventKind::RenewalQuoteCreated(e) => {
            assert_eq!(e.quote_id, new_quote_id);
            assert_eq!(e.parent_quote_id, harness.quote_id);
            let form_data = e.form_data.unwrap();
            assert_eq!(form_data.data["formModel"], json!({ "declaration": true }));
        }
        other => panic!("expected RenewalQuoteCreated, got {other:?}"),
    }

    let view = get_quote_aggregate_by_id(harness.aggregate_id, &harness.repo)
        .await
        .unwrap();
    assert_eq!(view.quotes.len(), 2);
    assert_eq!(view.quotes[1].quote_id, new_quote_id);
    assert_eq!(view.quotes[1].quote_type, QuoteType::Renewal);
    assert_eq!(view.quotes[1].parent_quote_id, Some(harness.quote_id));
    assert_eq!(view.quotes[1].workflow_state, states::INCOMPLETE);
}

#[tokio::test]
async fn test_cloning_new_business_quote_is_invariant_violation() {
    let harness = QuoteHarness::new(QuoteProduct::default());
    harness.create_new_business().await;

    let result = handle_clone_expired_quote(
        &clone_command(&harness, Uuid::new_v4()),
        &harness.product,
        &harness.clock,
        &harness.repo,
    )
    .await;

    assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
    assert_eq!(harness.event_types(), ["quote.initialized"]);
}

#[tokio::test]
async fn test_patch_reaches_quote_and_its_versions() {
    // Arrange
    let harness = QuoteHarness::new(QuoteProduct::default());
    harness.create_new_business().await;
    harness.update_form(json!({ "policyStartDate": "2026-02-01" })).await;
    handle_create_quote_version(
        &CreateQuoteVersion {
            correlation_id: Uuid::new_v4(),
            performing_user_id: None,
            aggregate_id: harness.aggregate_id,
            quote_id: harness.quote_id,
            version_id: Uuid::new_v4(),
        },
        &harness.product,
        &harness.clock,
        &harness.repo,
    )
    .await
    .unwrap();
    let command = PatchPolicyData {
        correlation_id: Uuid::new_v4(),
        performing_user_id: None,
        aggregate_id: harness.aggregate_id,
        patch: PolicyDataPatchCommand {
            form_data_path: Some("policyStartDate".into()),
            calculation_result_path: None,
            value_source: PatchValueSource::Literal(json!("2026-03-01")),
            scope: PatchScope::EntireAggregate,
            rules: vec![PatchRule::PropertyExists],
        },
    };

    // Act
    let result = handle_patch_policy_data(&command, &harness.clock, &harness.repo)
        .await
        .unwrap();

    // Assert
    assert_eq!(result.stored_events.len(), 1);
    let kind: QuoteEventKind =
        serde_json::from_value(result.stored_events[0].payload.clone()).unwrap();
    let patched = match kind {
        QuoteEventKind::PolicyDataPatched(patched) => patched,
        other => panic!("expected PolicyDataPatched, got {other:?}"),
    };
    assert_eq!(patched.patch.value, json!("2026-03-01"));
    assert_eq!(patched.patch.targets.len(), 2);
    assert!(patched.patch.targets.contains(&PatchTarget::Quote {
        quote_id: harness.quote_id
    }));
    assert!(patched.patch.targets.contains(&PatchTarget::QuoteVersion {
        quote_id: harness.quote_id,
        version_number: 1
    }));
}

#[test]
fn test_rollback_of_empty_history_reports_no_prior_events() {
    let aggregate_id = Uuid::new_v4();

    let result = validate_target(aggregate_id, &[], 0);

    assert!(matches!(
        result,
        Err(DomainError::NoPriorEvents { aggregate_id: id }) if id == aggregate_id
    ));
}

#[tokio::test]
async fn test_rollback_precondition_table() {
    let harness = QuoteHarness::new(QuoteProduct::default());
    harness.create_new_business().await;
    harness.update_form(json!({ "name": "Ada" })).await;
    let persisted = harness
        .repo
        .persisted_event_count(harness.aggregate_id)
        .await
        .unwrap();
    assert_eq!(persisted, 3);

    let same = handle_rollback(&harness.rollback_command(2), &harness.clock, &harness.repo).await;
    let beyond = handle_rollback(&harness.rollback_command(3), &harness.clock, &harness.repo).await;
    let negative =
        handle_rollback(&harness.rollback_command(-1), &harness.clock, &harness.repo).await;

    assert!(matches!(
        same,
        Err(DomainError::SameSequenceNumber { sequence_number: 2, .. })
    ));
    assert!(matches!(
        beyond,
        Err(DomainError::RollbackTargetNotFound { sequence_number: 3, .. })
    ));
    assert!(matches!(
        negative,
        Err(DomainError::RollbackTargetNotFound { sequence_number: -1, .. })
    ));
    assert_eq!(
        harness
            .repo
            .persisted_event_count(harness.aggregate_id)
            .await
            .unwrap(),
        persisted
    );
}

#[tokio::test]
async fn test_rollback_of_unknown_aggregate_is_not_found() {
    let harness = QuoteHarness::new(QuoteProduct::default());

    let result = handle_rollback(&harness.rollback_command(0), &harness.clock, &harness.repo).await;

    assert!(matches!(
        result,
        Err(DomainError::AggregateNotFound(id)) if id == harness.aggregate_id
    ));
}

#[tokio::test]
async fn test_successive_rollbacks_skip_previously_stripped_events() {
    init_test_tracing();
    let harness = QuoteHarness::new(QuoteProduct::default());

    // Step 1: build a stream of five events
    harness.create_new_business().await; // 0
    harness.update_form(json!({ "name": "Ada" })).await; // 1, 2
    harness.update_form(json!({ "name": "Grace" })).await; // 3
    harness.calculate(json!({ "premium": 10 })).await; // 4

    // Step 2: roll back the calculation
    let first = handle_rollback(&harness.rollback_command(3), &harness.clock, &harness.repo)
        .await
        .unwrap();
    assert_eq!(first.stored_events[0].sequence_number, 5);
    let effects = get_rollback_effects(harness.aggregate_id, 5, &harness.repo)
        .await
        .unwrap();
    assert_eq!(effects.target_sequence_number, 3);
    assert_eq!(effects.stripped_sequence_numbers, [4]);
    assert_eq!(effects.replayed_sequence_numbers, [2, 3]);

    // Step 3: a stripped event is no longer a valid target
    let stale = handle_rollback(&harness.rollback_command(4), &harness.clock, &harness.repo).await;
    assert!(matches!(
        stale,
        Err(DomainError::RollbackTargetNotFound { sequence_number: 4, .. })
    ));

    // Step 4: roll back further
    handle_rollback(&harness.rollback_command(1), &harness.clock, &harness.repo)
        .await
        .unwrap();
    let effects = get_rollback_effects(harness.aggregate_id, 6, &harness.repo)
        .await
        .unwrap();
    assert_eq!(effects.stripped_sequence_numbers, [2, 3]);
    // The creation event restores the workflow state the stripped change overwrote.
    assert_eq!(effects.replayed_sequence_numbers, [0, 1]);
}
