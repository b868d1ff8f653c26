//! Per-product configuration.

use std::sync::Arc;

use coverline_core::error::DomainError;
use serde::{Deserialize, Serialize};

use super::datum::QuoteDatumLocations;
use super::expiry::ExpirySettings;
use super::workflow::{QuoteWorkflow, StandardQuoteWorkflow, WorkflowTransition};

/// Everything the quote aggregate needs to know about a product.
///
/// Constructed explicitly and passed by reference to the commands that
/// need it. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteProductConfiguration {
    /// Quote expiry.
    pub expiry: ExpirySettings,
    /// Form model paths cleared when a quote is cloned from an expired one.
    pub clone_reset_paths: Vec<String>,
    /// Where the standard datums live.
    pub datum_locations: QuoteDatumLocations,
    /// Replacement transition table; the standard table when absent.
    pub workflow: Option<Vec<WorkflowTransition>>,
}

impl QuoteProductConfiguration {
    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Configuration` if the YAML is malformed or names
    /// an unknown datum source, time zone or quote action, or an expiry hour
    /// outside 0-23.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DomainError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| DomainError::Configuration(format!("invalid product configuration: {e}")))
    }

    /// The workflow this product uses.
    #[must_use]
    pub fn workflow(&self) -> StandardQuoteWorkflow {
        self.workflow
            .clone()
            .map_or_else(StandardQuoteWorkflow::default, StandardQuoteWorkflow::from_transitions)
    }
}

/// A product's configuration together with the workflow its quotes follow.
#[derive(Clone)]
pub struct QuoteProduct {
    /// The configuration.
    pub configuration: QuoteProductConfiguration,
    /// The workflow collaborator.
    pub workflow: Arc<dyn QuoteWorkflow>,
}

impl QuoteProduct {
    /// Uses the workflow the configuration describes.
    #[must_use]
    pub fn from_configuration(configuration: QuoteProductConfiguration) -> Self {
        let workflow = Arc::new(configuration.workflow());
        Self {
            configuration,
            workflow,
        }
    }

    /// Uses a custom workflow collaborator.
    #[must_use]
    pub fn with_workflow(
        configuration: QuoteProductConfiguration,
        workflow: Arc<dyn QuoteWorkflow>,
    ) -> Self {
        Self {
            configuration,
            workflow,
        }
    }
}

impl Default for QuoteProduct {
    fn default() -> Self {
        Self::from_configuration(QuoteProductConfiguration::default())
    }
}

impl std::fmt::Debug for QuoteProduct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteProduct")
            .field("configuration", &self.configuration)
            .finish_non_exhaustive()
    }
}
