//! Datum locations and the locator that resolves them.
//!
//! A [`DatumLocation`] is pure configuration: which document to read and the
//! path within it. Binding locations to a quote's actual documents through a
//! [`DatumLocator`] yields typed values.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use coverline_core::error::DomainError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::data;
use super::json_path;

/// The document a datum is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DatumSource {
    /// The form data's nested form model.
    FormData,
    /// The calculation result document.
    CalculationResult,
}

impl FromStr for DatumSource {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FormData" | "formData" => Ok(Self::FormData),
            "CalculationResult" | "calculationResult" => Ok(Self::CalculationResult),
            other => Err(DomainError::Configuration(format!(
                "unknown datum source `{other}`"
            ))),
        }
    }
}

impl TryFrom<String> for DatumSource {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DatumSource> for String {
    fn from(source: DatumSource) -> Self {
        source.to_string()
    }
}

impl fmt::Display for DatumSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FormData => f.write_str("FormData"),
            Self::CalculationResult => f.write_str("CalculationResult"),
        }
    }
}

/// Where a datum lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatumLocation {
    /// Which document to read.
    pub source: DatumSource,
    /// Path within that document.
    pub path: String,
}

impl DatumLocation {
    /// A location inside the form model.
    pub fn form_data(path: impl Into<String>) -> Self {
        Self {
            source: DatumSource::FormData,
            path: path.into(),
        }
    }

    /// A location inside the calculation result.
    pub fn calculation_result(path: impl Into<String>) -> Self {
        Self {
            source: DatumSource::CalculationResult,
            path: path.into(),
        }
    }
}

impl fmt::Display for DatumLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.path)
    }
}

/// Conversion from a located JSON value.
///
/// Absent values never reach this trait; the locator substitutes the
/// type's `Default`.
pub trait FromDatum: Sized + Default {
    /// Name used in error messages.
    const TYPE_NAME: &'static str;

    /// Converts a present, non-null value.
    ///
    /// # Errors
    ///
    /// Returns a description of why the value could not be converted.
    fn from_datum(value: &Value) -> Result<Self, String>;
}

impl FromDatum for Decimal {
    const TYPE_NAME: &'static str = "decimal";

    fn from_datum(value: &Value) -> Result<Self, String> {
        match value {
            Value::Number(n) => n.to_string().parse::<Decimal>().or_else(|_| {
                n.as_f64()
                    .and_then(|f| Decimal::try_from(f).ok())
                    .ok_or_else(|| format!("number {n} is out of range"))
            }),
            Value::String(s) => parse_decimal_leniently(s),
            other => Err(format!("expected a number or numeric string, found {other}")),
        }
    }
}

/// Accepts surrounding whitespace, a leading currency symbol, thousands
/// separators and accounting-style parentheses for negatives.
fn parse_decimal_leniently(raw: &str) -> Result<Decimal, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let (negative, body) = match trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
    {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };
    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '€' | '£' | ' ' | '_'))
        .collect();
    let parsed = cleaned
        .parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|e| format!("`{raw}` is not a decimal: {e}"))?;
    Ok(if negative { -parsed } else { parsed })
}

impl FromDatum for NaiveDate {
    const TYPE_NAME: &'static str = "date";

    fn from_datum(value: &Value) -> Result<Self, String> {
        let Value::String(raw) = value else {
            return Err(format!("expected a date string, found {value}"));
        };
        let trimmed = raw.trim();
        // Timestamps are accepted by taking their date part.
        let date_part = trimmed.split('T').next().unwrap_or(trimmed);
        ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"]
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(date_part, format).ok())
            .ok_or_else(|| format!("`{raw}` is not a calendar date"))
    }
}

macro_rules! from_datum_via_serde {
    ($($ty:ty => $name:literal),+ $(,)?) => {
        $(
            impl FromDatum for $ty {
                const TYPE_NAME: &'static str = $name;

                fn from_datum(value: &Value) -> Result<Self, String> {
                    serde_json::from_value(value.clone()).map_err(|e| e.to_string())
                }
            }
        )+
    };
}

from_datum_via_serde!(
    String => "string",
    bool => "boolean",
    i32 => "i32",
    i64 => "i64",
    u32 => "u32",
    f64 => "f64",
);

impl<T: FromDatum> FromDatum for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_datum(value: &Value) -> Result<Self, String> {
        T::from_datum(value).map(Some)
    }
}

/// Resolves datum locations against one quote's documents.
#[derive(Debug, Clone, Copy)]
pub struct DatumLocator<'a> {
    form_data: &'a Value,
    calculation_result: &'a Value,
}

impl<'a> DatumLocator<'a> {
    /// Binds a locator to a form data document (with its `formModel`
    /// container) and a calculation result document.
    #[must_use]
    pub fn new(form_data: &'a Value, calculation_result: &'a Value) -> Self {
        Self {
            form_data,
            calculation_result,
        }
    }

    /// Returns the raw value at a location, if present and not `null`.
    #[must_use]
    pub fn locate(&self, location: &DatumLocation) -> Option<&'a Value> {
        let document = match location.source {
            DatumSource::FormData => data::form_model(self.form_data)?,
            DatumSource::CalculationResult => self.calculation_result,
        };
        json_path::get(document, &location.path).filter(|v| !v.is_null())
    }

    /// Resolves a typed value.
    ///
    /// A missing path yields `T::default()`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DatumResolution` naming the location and target
    /// type when the value is present but cannot be converted.
    pub fn resolve<T: FromDatum>(&self, location: &DatumLocation) -> Result<T, DomainError> {
        match self.locate(location) {
            None => Ok(T::default()),
            Some(value) => T::from_datum(value).map_err(|reason| DomainError::DatumResolution {
                location: location.to_string(),
                target_type: T::TYPE_NAME,
                reason,
            }),
        }
    }
}

/// The standard datums a product exposes, with their locations.
///
/// Constructed explicitly (usually from product configuration) and passed to
/// whatever needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteDatumLocations {
    /// Policy start date.
    pub inception_date: DatumLocation,
    /// Policy end date.
    pub expiry_date: DatumLocation,
    /// Effective date of an adjustment.
    pub effective_date: DatumLocation,
    /// Effective date of a cancellation.
    pub cancellation_effective_date: DatumLocation,
    /// Total premium before fees and taxes.
    pub total_premium: DatumLocation,
    /// Total amount payable.
    pub total_payable: DatumLocation,
    /// ISO 4217 currency code.
    pub currency_code: DatumLocation,
    /// Customer display name.
    pub customer_name: DatumLocation,
    /// Customer email.
    pub customer_email: DatumLocation,
    /// Customer phone.
    pub customer_phone: DatumLocation,
}

impl Default for QuoteDatumLocations {
    fn default() -> Self {
        Self {
            inception_date: DatumLocation::form_data("policyStartDate"),
            expiry_date: DatumLocation::form_data("policyEndDate"),
            effective_date: DatumLocation::form_data("policyAdjustmentDate"),
            cancellation_effective_date: DatumLocation::form_data("policyCancellationDate"),
            total_premium: DatumLocation::calculation_result("payment.total.premium"),
            total_payable: DatumLocation::calculation_result("payment.total.payable"),
            currency_code: DatumLocation::calculation_result("payment.currencyCode"),
            customer_name: DatumLocation::form_data("contactName"),
            customer_email: DatumLocation::form_data("contactEmail"),
            customer_phone: DatumLocation::form_data("contactPhone"),
        }
    }
}

/// The standard datums of one quote, resolved in a single pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StandardQuoteData {
    /// Policy start date.
    pub inception_date: Option<NaiveDate>,
    /// Policy end date.
    pub expiry_date: Option<NaiveDate>,
    /// Adjustment effective date.
    pub effective_date: Option<NaiveDate>,
    /// Cancellation effective date.
    pub cancellation_effective_date: Option<NaiveDate>,
    /// Total premium.
    pub total_premium: Decimal,
    /// Total payable.
    pub total_payable: Decimal,
    /// Currency code.
    pub currency_code: Option<String>,
    /// Customer display name.
    pub customer_name: Option<String>,
    /// Customer email.
    pub customer_email: Option<String>,
    /// Customer phone.
    pub customer_phone: Option<String>,
}

impl StandardQuoteData {
    /// Resolves every standard datum.
    ///
    /// # Errors
    ///
    /// Returns the first `DomainError::DatumResolution` encountered.
    pub fn retrieve(
        locations: &QuoteDatumLocations,
        form_data: &Value,
        calculation_result: &Value,
    ) -> Result<Self, DomainError> {
        let locator = DatumLocator::new(form_data, calculation_result);
        Ok(Self {
            inception_date: locator.resolve(&locations.inception_date)?,
            expiry_date: locator.resolve(&locations.expiry_date)?,
            effective_date: locator.resolve(&locations.effective_date)?,
            cancellation_effective_date: locator.resolve(&locations.cancellation_effective_date)?,
            total_premium: locator.resolve(&locations.total_premium)?,
            total_payable: locator.resolve(&locations.total_payable)?,
            currency_code: locator.resolve(&locations.currency_code)?,
            customer_name: locator.resolve(&locations.customer_name)?,
            customer_email: locator.resolve(&locations.customer_email)?,
            customer_phone: locator.resolve(&locations.customer_phone)?,
        })
    }
}
