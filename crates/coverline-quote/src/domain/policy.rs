//! Policy and policy transaction entities.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::data::DataSnapshot;
use super::patch::{
    DataPatch, DataPatchType, PatchScope, PatchTarget, PatchableDataHolder, write_if_targeted,
};
use super::quote::QuoteType;

/// The kind of change a policy transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyTransactionType {
    /// The policy was taken out.
    NewBusiness,
    /// The policy was renewed.
    Renewal,
    /// The policy was adjusted mid-term.
    Adjustment,
    /// The policy was cancelled.
    Cancellation,
}

impl From<QuoteType> for PolicyTransactionType {
    fn from(quote_type: QuoteType) -> Self {
        match quote_type {
            QuoteType::NewBusiness => Self::NewBusiness,
            QuoteType::Renewal => Self::Renewal,
            QuoteType::Adjustment => Self::Adjustment,
            QuoteType::Cancellation => Self::Cancellation,
        }
    }
}

/// One change to a policy, produced from a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyTransaction {
    /// Transaction identifier.
    pub id: Uuid,
    /// Kind of change.
    pub transaction_type: PolicyTransactionType,
    /// The quote the transaction was produced from.
    pub quote_id: Uuid,
    /// When the change takes effect.
    pub effective_date: Option<NaiveDate>,
    /// When the cover it grants ends.
    pub expiry_date: Option<NaiveDate>,
    /// Amount payable for the transaction.
    pub total_payable: Decimal,
    /// Quote data the transaction was produced from.
    pub data: DataSnapshot,
    /// Sequence number of the creating event.
    pub created_sequence_number: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl PolicyTransaction {
    fn target(&self) -> PatchTarget {
        PatchTarget::PolicyTransaction {
            policy_transaction_id: self.id,
        }
    }
}

impl PatchableDataHolder for PolicyTransaction {
    fn patch_candidates(
        &self,
        kind: DataPatchType,
        scope: &PatchScope,
    ) -> Vec<(PatchTarget, &Value)> {
        let in_scope = match *scope {
            PatchScope::EntireAggregate => true,
            PatchScope::PolicyTransaction {
                policy_transaction_id,
            } => policy_transaction_id == self.id,
            _ => false,
        };
        let record = match kind {
            DataPatchType::FormData => self.data.form_data.as_ref(),
            DataPatchType::CalculationResult => self.data.calculation_result.as_ref(),
        };
        match record {
            Some(record) if in_scope => vec![(self.target(), &record.data)],
            _ => Vec::new(),
        }
    }

    fn is_applicable(&self, target: &PatchTarget) -> bool {
        *target == self.target()
    }

    fn apply_patch(&mut self, patch: &DataPatch) -> bool {
        let target = self.target();
        let record = match patch.kind {
            DataPatchType::FormData => self.data.form_data.as_mut(),
            DataPatchType::CalculationResult => self.data.calculation_result.as_mut(),
        };
        record.is_some_and(|r| write_if_targeted(patch, &target, &mut r.data))
    }
}

/// The policy an aggregate's quotes produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy identifier.
    pub id: Uuid,
    /// Human facing policy number.
    pub policy_number: String,
    /// The quote that issued the policy.
    pub issued_from_quote_id: Uuid,
    /// Start of cover.
    pub inception_date: Option<NaiveDate>,
    /// End of cover, moved by renewals and cancellations.
    pub expiry_date: Option<NaiveDate>,
    /// Set once the policy records have been deleted.
    pub deleted: bool,
    /// Transactions, in creation order. The first is always new business.
    pub transactions: Vec<PolicyTransaction>,
    /// Issue time.
    pub issued_at: DateTime<Utc>,
}

impl Policy {
    /// Looks up a transaction.
    #[must_use]
    pub fn transaction(&self, transaction_id: Uuid) -> Option<&PolicyTransaction> {
        self.transactions.iter().find(|t| t.id == transaction_id)
    }

    /// Whether the policy is currently cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.transactions
            .last()
            .is_some_and(|t| t.transaction_type == PolicyTransactionType::Cancellation)
    }

    /// Records a transaction and moves the policy's dates accordingly.
    pub fn add_transaction(&mut self, transaction: PolicyTransaction) {
        match transaction.transaction_type {
            PolicyTransactionType::NewBusiness => {
                self.inception_date = transaction.effective_date;
                self.expiry_date = transaction.expiry_date;
            }
            PolicyTransactionType::Renewal => {
                if transaction.expiry_date.is_some() {
                    self.expiry_date = transaction.expiry_date;
                }
            }
            PolicyTransactionType::Cancellation => {
                if transaction.effective_date.is_some() {
                    self.expiry_date = transaction.effective_date;
                }
            }
            PolicyTransactionType::Adjustment => {}
        }
        self.transactions.push(transaction);
    }
}
