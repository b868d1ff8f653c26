//! Quote workflow: actions, states and the transition table.

use std::fmt;

use coverline_core::error::DomainError;
use serde::{Deserialize, Serialize};

/// Well-known workflow state names.
pub mod states {
    /// A quote that has been created but not yet actualised.
    pub const NASCENT: &str = "Nascent";
    /// A quote being filled in.
    pub const INCOMPLETE: &str = "Incomplete";
    /// Referred for underwriter review.
    pub const REVIEW: &str = "Review";
    /// Referred for endorsement.
    pub const ENDORSEMENT: &str = "Endorsement";
    /// Approved and ready to bind.
    pub const APPROVED: &str = "Approved";
    /// Declined by an underwriter.
    pub const DECLINED: &str = "Declined";
    /// Bound / converted into a policy transaction.
    pub const COMPLETE: &str = "Complete";
    /// Passed its expiry.
    pub const EXPIRED: &str = "Expired";
}

/// An action that moves a quote through its workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteAction {
    /// Form data was updated.
    FormUpdate,
    /// A premium calculation ran.
    Calculation,
    /// A nascent quote became a real one.
    Actualise,
    /// A version of the quote was saved.
    QuoteVersion,
    /// Referred for review.
    ReviewReferral,
    /// Review approved.
    ReviewApproval,
    /// Approved automatically.
    AutoApproval,
    /// Referred for endorsement.
    EndorsementReferral,
    /// Endorsement approved.
    EndorsementApproval,
    /// Returned to the customer for changes.
    Return,
    /// Declined.
    Decline,
    /// Bound.
    Bind,
    /// Submitted.
    Submit,
    /// Converted into a policy transaction.
    Policy,
    /// Invoiced.
    Invoice,
    /// Premium funding arranged.
    Fund,
    /// Paid.
    Payment,
    /// A credit note was issued.
    CreditNote,
    /// Expired.
    Expire,
    /// Expiry reverted.
    RevertExpiry,
}

impl fmt::Display for QuoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Computes the outcome of quote actions.
pub trait QuoteWorkflow: Send + Sync {
    /// Returns the state a quote in `origin_state` moves to when `action` is
    /// performed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when the action is not permitted
    /// from `origin_state`.
    fn resulting_state(&self, action: QuoteAction, origin_state: &str)
    -> Result<String, DomainError>;
}

/// One row of the transition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTransition {
    /// The action.
    pub action: QuoteAction,
    /// States the action is permitted from. Empty means any state.
    #[serde(default)]
    pub from: Vec<String>,
    /// State the quote ends in. `None` leaves the state unchanged.
    #[serde(default)]
    pub to: Option<String>,
}

impl WorkflowTransition {
    fn new(action: QuoteAction, from: &[&str], to: Option<&str>) -> Self {
        Self {
            action,
            from: from.iter().map(|s| (*s).to_owned()).collect(),
            to: to.map(str::to_owned),
        }
    }

    fn permits(&self, action: QuoteAction, origin_state: &str) -> bool {
        self.action == action
            && (self.from.is_empty() || self.from.iter().any(|s| s == origin_state))
    }
}

/// A workflow driven by a transition table.
///
/// The first row matching `(action, origin_state)` wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardQuoteWorkflow {
    transitions: Vec<WorkflowTransition>,
}

impl StandardQuoteWorkflow {
    /// Creates a workflow from an explicit transition table.
    #[must_use]
    pub fn from_transitions(transitions: Vec<WorkflowTransition>) -> Self {
        Self { transitions }
    }

    /// The transition table.
    #[must_use]
    pub fn transitions(&self) -> &[WorkflowTransition] {
        &self.transitions
    }
}

impl Default for StandardQuoteWorkflow {
    fn default() -> Self {
        use QuoteAction as A;
        use states::{
            APPROVED, COMPLETE, DECLINED, ENDORSEMENT, EXPIRED, INCOMPLETE, NASCENT, REVIEW,
        };

        let open = [NASCENT, INCOMPLETE, REVIEW, ENDORSEMENT, APPROVED];
        let editable = [INCOMPLETE, REVIEW, ENDORSEMENT, APPROVED];
        Self::from_transitions(vec![
            WorkflowTransition::new(A::Actualise, &[NASCENT], Some(INCOMPLETE)),
            WorkflowTransition::new(A::FormUpdate, &[NASCENT], Some(INCOMPLETE)),
            WorkflowTransition::new(A::FormUpdate, &editable, None),
            WorkflowTransition::new(A::Calculation, &open, None),
            WorkflowTransition::new(A::QuoteVersion, &editable, None),
            WorkflowTransition::new(A::ReviewReferral, &[INCOMPLETE], Some(REVIEW)),
            WorkflowTransition::new(A::ReviewApproval, &[REVIEW], Some(APPROVED)),
            WorkflowTransition::new(A::AutoApproval, &[INCOMPLETE], Some(APPROVED)),
            WorkflowTransition::new(
                A::EndorsementReferral,
                &[INCOMPLETE, APPROVED],
                Some(ENDORSEMENT),
            ),
            WorkflowTransition::new(A::EndorsementApproval, &[ENDORSEMENT], Some(APPROVED)),
            WorkflowTransition::new(A::Return, &[REVIEW, ENDORSEMENT, APPROVED], Some(INCOMPLETE)),
            WorkflowTransition::new(A::Decline, &editable, Some(DECLINED)),
            WorkflowTransition::new(A::Submit, &[INCOMPLETE, APPROVED], None),
            WorkflowTransition::new(A::Invoice, &[INCOMPLETE, APPROVED], None),
            WorkflowTransition::new(A::Fund, &[INCOMPLETE, APPROVED], None),
            WorkflowTransition::new(A::Payment, &[INCOMPLETE, APPROVED], None),
            WorkflowTransition::new(A::CreditNote, &[APPROVED, COMPLETE], None),
            WorkflowTransition::new(A::Bind, &[APPROVED], Some(COMPLETE)),
            WorkflowTransition::new(A::Policy, &[APPROVED, COMPLETE], Some(COMPLETE)),
            WorkflowTransition::new(A::Expire, &open, Some(EXPIRED)),
            WorkflowTransition::new(A::RevertExpiry, &[EXPIRED], Some(INCOMPLETE)),
        ])
    }
}

impl QuoteWorkflow for StandardQuoteWorkflow {
    fn resulting_state(
        &self,
        action: QuoteAction,
        origin_state: &str,
    ) -> Result<String, DomainError> {
        self.transitions
            .iter()
            .find(|t| t.permits(action, origin_state))
            .map(|t| t.to.clone().unwrap_or_else(|| origin_state.to_owned()))
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "action {action} is not permitted for a quote in state {origin_state}"
                ))
            })
    }
}
