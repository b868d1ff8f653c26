//! Corollaries: records derived from a specific data snapshot.
//!
//! No corollary exists independently of the data that produced it, so each
//! one carries the [`DataSnapshotIds`] of its inputs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::data::DataSnapshotIds;

/// Common shape of every derived record.
pub trait Corollary {
    /// The data the record was produced from.
    fn data_snapshot_ids(&self) -> &DataSnapshotIds;

    /// When the record was produced.
    fn created_at(&self) -> DateTime<Utc>;
}

macro_rules! impl_corollary {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Corollary for $ty {
                fn data_snapshot_ids(&self) -> &DataSnapshotIds {
                    &self.data_snapshot_ids
                }

                fn created_at(&self) -> DateTime<Utc> {
                    self.created_at
                }
            }
        )+
    };
}

/// An invoice issued for a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Invoice identifier.
    pub id: Uuid,
    /// Human facing invoice number.
    pub invoice_number: String,
    /// Inputs the invoice was produced from.
    pub data_snapshot_ids: DataSnapshotIds,
    /// Issue time.
    pub created_at: DateTime<Utc>,
}

/// A credit note issued for a quote, typically on cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNote {
    /// Credit note identifier.
    pub id: Uuid,
    /// Human facing credit note number.
    pub credit_note_number: String,
    /// Inputs the credit note was produced from.
    pub data_snapshot_ids: DataSnapshotIds,
    /// Issue time.
    pub created_at: DateTime<Utc>,
}

/// A customer enquiry made against a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enquiry {
    /// Enquiry identifier.
    pub id: Uuid,
    /// Inputs at the time of the enquiry.
    pub data_snapshot_ids: DataSnapshotIds,
    /// Enquiry time.
    pub created_at: DateTime<Utc>,
}

/// A quote submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Submission identifier.
    pub id: Uuid,
    /// Inputs that were submitted.
    pub data_snapshot_ids: DataSnapshotIds,
    /// Submission time.
    pub created_at: DateTime<Utc>,
}

/// Details of a successful payment, as reported by the payment gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// Payment identifier.
    pub payment_id: Uuid,
    /// Amount charged.
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: String,
    /// Gateway reference for the charge.
    pub reference: String,
    /// Raw gateway response, kept for audit.
    pub gateway_response: serde_json::Value,
}

/// A premium funding proposal from a funding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingProposal {
    /// Internal identifier.
    pub proposal_id: Uuid,
    /// Identifier assigned by the funding provider.
    pub external_id: String,
    /// Amount to be funded.
    pub amount_funded: Decimal,
    /// Number of instalments.
    pub instalment_count: u32,
    /// Amount of each instalment.
    pub instalment_amount: Decimal,
    /// Provider payload, kept for audit.
    pub proposal_data: serde_json::Value,
}

/// A file uploaded against a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    /// Attachment identifier.
    pub id: Uuid,
    /// Original file name.
    pub file_name: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Upload time.
    pub attached_at: DateTime<Utc>,
}

/// A generated document (quote schedule, certificate, ...) attached to a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteDocument {
    /// Document identifier.
    pub id: Uuid,
    /// Document name.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// Inputs the document was rendered from.
    pub data_snapshot_ids: DataSnapshotIds,
    /// Render time.
    pub created_at: DateTime<Utc>,
}

impl_corollary!(Invoice, CreditNote, Enquiry, Submission, QuoteDocument);
