//! Outcome envelope for side-effecting sub-processes.
//!
//! Payment attempts and funding proposals are carried out by external
//! collaborators. Their outcome is recorded as an [`OutcomeResult`] tied to
//! the data snapshot used for the attempt.

use chrono::{DateTime, Utc};
use coverline_core::error::DomainError;
use serde::{Deserialize, Serialize};

use super::corollary::{Corollary, FundingProposal, PaymentDetails};
use super::data::DataSnapshotIds;

/// Tri-state classification of a derived result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// The attempt succeeded.
    Success,
    /// A business-level negative result, e.g. a declined card.
    Failed,
    /// A lower-level fault, e.g. the provider could not be reached.
    Error,
}

/// What an external collaborator reports back after an attempt, before the
/// aggregate records it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttemptReport<T> {
    /// The attempt succeeded with this output.
    Succeeded(T),
    /// The attempt did not succeed.
    Failed {
        /// `Failed` or `Error`.
        outcome: Outcome,
        /// What went wrong.
        errors: Vec<String>,
    },
}

/// The generic success / failure / error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeResult<T> {
    outcome: Outcome,
    output: Option<T>,
    errors: Vec<String>,
    data_snapshot_ids: DataSnapshotIds,
    created_at: DateTime<Utc>,
}

impl<T> OutcomeResult<T> {
    /// A successful result carrying its output.
    #[must_use]
    pub fn success(
        output: T,
        data_snapshot_ids: DataSnapshotIds,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            outcome: Outcome::Success,
            output: Some(output),
            errors: Vec::new(),
            data_snapshot_ids,
            created_at,
        }
    }

    /// A failed or errored result carrying its error messages.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` if `outcome` is
    /// [`Outcome::Success`]; success must go through [`Self::success`].
    pub fn failure(
        outcome: Outcome,
        errors: Vec<String>,
        data_snapshot_ids: DataSnapshotIds,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if outcome == Outcome::Success {
            return Err(DomainError::invariant(
                "a failure result cannot be constructed with a Success outcome",
            ));
        }
        Ok(Self {
            outcome,
            output: None,
            errors,
            data_snapshot_ids,
            created_at,
        })
    }

    /// True iff the outcome is [`Outcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// The outcome classification.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// The output of a successful attempt.
    #[must_use]
    pub fn output(&self) -> Option<&T> {
        self.output.as_ref()
    }

    /// Error messages of a failed or errored attempt.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

impl<T> Corollary for OutcomeResult<T> {
    fn data_snapshot_ids(&self) -> &DataSnapshotIds {
        &self.data_snapshot_ids
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Result of a payment attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAttemptResult(pub OutcomeResult<PaymentDetails>);

impl PaymentAttemptResult {
    /// Details of the charge, when the payment went through.
    #[must_use]
    pub fn payment_details(&self) -> Option<&PaymentDetails> {
        self.0.output()
    }
}

/// Result of asking a funding provider for a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingProposalCreationResult(pub OutcomeResult<FundingProposal>);

impl FundingProposalCreationResult {
    /// The proposal that was created.
    #[must_use]
    pub fn funding_proposal(&self) -> Option<&FundingProposal> {
        self.0.output()
    }
}

/// Result of accepting a funding proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingProposalAcceptanceResult(pub OutcomeResult<FundingProposal>);

impl FundingProposalAcceptanceResult {
    /// The proposal that was accepted.
    #[must_use]
    pub fn accepted_proposal(&self) -> Option<&FundingProposal> {
        self.0.output()
    }
}

macro_rules! deref_to_outcome_result {
    ($($ty:ident => $inner:ty),+ $(,)?) => {
        $(
            impl std::ops::Deref for $ty {
                type Target = OutcomeResult<$inner>;

                fn deref(&self) -> &Self::Target {
                    &self.0
                }
            }
        )+
    };
}

deref_to_outcome_result!(
    PaymentAttemptResult => PaymentDetails,
    FundingProposalCreationResult => FundingProposal,
    FundingProposalAcceptanceResult => FundingProposal,
);
