//! Shared helpers for quote integration tests.
#![allow(dead_code)]

use coverline_quote::application::command_handlers::{self, QuoteCommandResult};
use coverline_quote::domain::commands::{
    CreateNewBusinessQuote, ImportQuote, PerformQuoteAction, RecordCalculationResult,
    RollbackQuoteAggregate, UpdateFormData,
};
use coverline_quote::domain::config::QuoteProduct;
use coverline_quote::domain::quote::QuoteType;
use coverline_quote::domain::workflow::QuoteAction;
use coverline_test_support::{FixedClock, InMemoryEventRepository};
use serde_json::Value;
use uuid::Uuid;

/// One aggregate's stream plus everything needed to drive it through the
/// command handlers.
pub struct QuoteHarness {
    pub repo: InMemoryEventRepository,
    pub clock: FixedClock,
    pub product: QuoteProduct,
    pub aggregate_id: Uuid,
    pub quote_id: Uuid,
}

impl QuoteHarness {
    pub fn new(product: QuoteProduct) -> Self {
        Self {
            repo: InMemoryEventRepository::new(),
            clock: FixedClock::default(),
            product,
            aggregate_id: Uuid::new_v4(),
            quote_id: Uuid::new_v4(),
        }
    }

    /// Creates the aggregate with a nascent new business quote.
    pub async fn create_new_business(&self) -> QuoteCommandResult {
        command_handlers::handle_create_new_business_quote(
            &CreateNewBusinessQuote {
                correlation_id: Uuid::new_v4(),
                performing_user_id: None,
                aggregate_id: self.aggregate_id,
                tenant_id: Uuid::new_v4(),
                quote_id: self.quote_id,
                organisation_id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                product_release_id: Uuid::new_v4(),
                quote_number: Some("Q-0001".into()),
                form_model: None,
            },
            &self.product,
            &self.clock,
            &self.repo,
        )
        .await
        .unwrap()
    }

    /// Creates the aggregate from a quote imported in the given state.
    pub async fn import(
        &self,
        quote_type: QuoteType,
        workflow_state: &str,
        form_model: Value,
    ) -> QuoteCommandResult {
        command_handlers::handle_import_quote(
            &ImportQuote {
                correlation_id: Uuid::new_v4(),
                performing_user_id: None,
                aggregate_id: self.aggregate_id,
                tenant_id: Uuid::new_v4(),
                quote_id: self.quote_id,
                organisation_id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                product_release_id: Uuid::new_v4(),
                quote_type,
                quote_number: Some("REN-001".into()),
                workflow_state: workflow_state.into(),
                form_model: Some(form_model),
                calculation_result: None,
            },
            &self.clock,
            &self.repo,
        )
        .await
        .unwrap()
    }

    pub async fn update_form(&self, form_model: Value) -> QuoteCommandResult {
        command_handlers::handle_update_form_data(
            &UpdateFormData {
                correlation_id: Uuid::new_v4(),
                performing_user_id: None,
                aggregate_id: self.aggregate_id,
                quote_id: self.quote_id,
                form_model,
            },
            &self.product,
            &self.clock,
            &self.repo,
        )
        .await
        .unwrap()
    }

    pub async fn calculate(&self, calculation_result: Value) -> QuoteCommandResult {
        command_handlers::handle_record_calculation_result(
            &RecordCalculationResult {
                correlation_id: Uuid::new_v4(),
                performing_user_id: None,
                aggregate_id: self.aggregate_id,
                quote_id: self.quote_id,
                calculation_result,
            },
            &self.product,
            &self.clock,
            &self.repo,
        )
        .await
        .unwrap()
    }

    pub async fn perform(&self, action: QuoteAction) -> QuoteCommandResult {
        command_handlers::handle_perform_quote_action(
            &PerformQuoteAction {
                correlation_id: Uuid::new_v4(),
                performing_user_id: None,
                aggregate_id: self.aggregate_id,
                quote_id: self.quote_id,
                action,
            },
            &self.product,
            &self.clock,
            &self.repo,
        )
        .await
        .unwrap()
    }

    pub fn rollback_command(&self, target_sequence_number: i64) -> RollbackQuoteAggregate {
        RollbackQuoteAggregate {
            correlation_id: Uuid::new_v4(),
            performing_user_id: None,
            aggregate_id: self.aggregate_id,
            target_sequence_number,
        }
    }

    /// Event types of the persisted stream, in order.
    pub fn event_types(&self) -> Vec<String> {
        self.repo
            .stream(self.aggregate_id)
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }
}
