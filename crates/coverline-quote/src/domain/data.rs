//! Versioned data elements and the snapshots that bundle them.
//!
//! Form data, calculation results and customer details each carry their
//! own identifier and timestamp, so a corollary can point back at exactly
//! the inputs that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Reserved key under which form data keeps the user-entered form model.
pub const FORM_MODEL_KEY: &str = "formModel";

/// One independently identified JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    /// Identifier of this revision of the document.
    pub id: Uuid,
    /// The document itself.
    pub data: Value,
    /// When this revision was created.
    pub created_at: DateTime<Utc>,
}

impl DataRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(id: Uuid, data: Value, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            data,
            created_at,
        }
    }
}

/// Contact details of the customer a quote is associated with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    /// Display name.
    pub full_name: String,
    /// Email address, if known.
    pub email: Option<String>,
    /// Phone number, if known.
    pub phone: Option<String>,
}

/// Field of [`CustomerDetails`] that a patch can take its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerDetailField {
    /// [`CustomerDetails::full_name`].
    FullName,
    /// [`CustomerDetails::email`].
    Email,
    /// [`CustomerDetails::phone`].
    Phone,
}

impl CustomerDetails {
    /// Returns the given field as a JSON value; absent optional fields are `null`.
    #[must_use]
    pub fn field_value(&self, field: CustomerDetailField) -> Value {
        match field {
            CustomerDetailField::FullName => Value::String(self.full_name.clone()),
            CustomerDetailField::Email => self.email.clone().map_or(Value::Null, Value::String),
            CustomerDetailField::Phone => self.phone.clone().map_or(Value::Null, Value::String),
        }
    }
}

/// A revision of customer details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetailsRecord {
    /// Identifier of this revision.
    pub id: Uuid,
    /// The details.
    pub details: CustomerDetails,
    /// When this revision was created.
    pub created_at: DateTime<Utc>,
}

/// Identifiers of the three data elements a corollary was produced from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataSnapshotIds {
    /// Form data revision.
    pub form_data_id: Option<Uuid>,
    /// Calculation result revision.
    pub calculation_result_id: Option<Uuid>,
    /// Customer details revision.
    pub customer_details_id: Option<Uuid>,
}

/// The three data elements themselves, as they stood at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSnapshot {
    /// Form data, if any had been entered.
    pub form_data: Option<DataRecord>,
    /// Calculation result, if a calculation had run.
    pub calculation_result: Option<DataRecord>,
    /// Customer details, if a customer was associated.
    pub customer_details: Option<CustomerDetailsRecord>,
}

impl DataSnapshot {
    /// Returns the identifiers of the bundled elements.
    #[must_use]
    pub fn ids(&self) -> DataSnapshotIds {
        DataSnapshotIds {
            form_data_id: self.form_data.as_ref().map(|r| r.id),
            calculation_result_id: self.calculation_result.as_ref().map(|r| r.id),
            customer_details_id: self.customer_details.as_ref().map(|r| r.id),
        }
    }
}

/// Wraps a bare form model into the form data container.
#[must_use]
pub fn form_data_from_model(form_model: Value) -> Value {
    let mut container = Map::new();
    container.insert(FORM_MODEL_KEY.to_owned(), form_model);
    Value::Object(container)
}

/// Returns the form model inside a form data document, if present.
#[must_use]
pub fn form_model(form_data: &Value) -> Option<&Value> {
    form_data.get(FORM_MODEL_KEY)
}

/// Returns the form model for mutation, creating the container if needed.
///
/// A document that is not a JSON object is replaced by an empty container.
pub fn form_model_mut(form_data: &mut Value) -> &mut Value {
    if !form_data.is_object() {
        *form_data = Value::Object(Map::new());
    }
    let model = &mut form_data[FORM_MODEL_KEY];
    if model.is_null() {
        *model = Value::Object(Map::new());
    }
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_ids_follow_present_records() {
        let form_id = Uuid::new_v4();
        let snapshot = DataSnapshot {
            form_data: Some(DataRecord::new(form_id, json!({}), Utc::now())),
            calculation_result: None,
            customer_details: None,
        };

        let ids = snapshot.ids();

        assert_eq!(ids.form_data_id, Some(form_id));
        assert_eq!(ids.calculation_result_id, None);
        assert_eq!(ids.customer_details_id, None);
    }

    #[test]
    fn test_form_model_mut_creates_container() {
        let mut form_data = Value::Null;

        form_model_mut(&mut form_data)
            .as_object_mut()
            .unwrap()
            .insert("name".into(), json!("Ada"));

        assert_eq!(form_data, json!({ "formModel": { "name": "Ada" } }));
        assert_eq!(form_model(&form_data), Some(&json!({ "name": "Ada" })));
    }

    #[test]
    fn test_customer_field_value_is_null_when_missing() {
        let details = CustomerDetails {
            full_name: "Ada Lovelace".into(),
            email: None,
            phone: Some("0400 000 000".into()),
        };

        assert_eq!(details.field_value(CustomerDetailField::Email), Value::Null);
        assert_eq!(
            details.field_value(CustomerDetailField::Phone),
            json!("0400 000 000")
        );
    }
}
