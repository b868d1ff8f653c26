//! Data patches: retroactive corrections to stored form data and
//! calculation results.
//!
//! A patch never rewrites history. The aggregate validates a
//! [`PolicyDataPatchCommand`] against every [`PatchableDataHolder`], and only
//! when every specified path resolves to at least one target does it record
//! one patch event per path. Applying that event mutates the stored
//! documents of the holders the patch is applicable to.

use std::fmt;

use coverline_core::error::DomainError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::data::{CustomerDetailField, form_model, form_model_mut};
use super::json_path;

/// Which stored document a patch writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataPatchType {
    /// Form data; paths are relative to the form model container.
    FormData,
    /// Calculation result; paths are relative to the document root.
    CalculationResult,
}

impl DataPatchType {
    /// Reads the value at `path` in a document of this kind.
    #[must_use]
    pub fn locate<'a>(self, document: &'a Value, path: &str) -> Option<&'a Value> {
        match self {
            Self::FormData => form_model(document).and_then(|model| json_path::get(model, path)),
            Self::CalculationResult => json_path::get(document, path),
        }
    }

    /// Writes `value` at `path` in a document of this kind.
    pub fn write(self, document: &mut Value, path: &str, value: Value) -> bool {
        match self {
            Self::FormData => json_path::set(form_model_mut(document), path, value),
            Self::CalculationResult => json_path::set(document, path, value),
        }
    }
}

impl fmt::Display for DataPatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FormData => f.write_str("form data"),
            Self::CalculationResult => f.write_str("calculation result"),
        }
    }
}

/// Exactly what a patch applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatchTarget {
    /// The current data of a quote.
    Quote {
        /// The quote.
        quote_id: Uuid,
    },
    /// One numbered version of a quote.
    QuoteVersion {
        /// The quote.
        quote_id: Uuid,
        /// The version.
        version_number: u32,
    },
    /// The data snapshot held by a policy transaction.
    PolicyTransaction {
        /// The transaction.
        policy_transaction_id: Uuid,
    },
}

impl fmt::Display for PatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quote { quote_id } => write!(f, "quote {quote_id}"),
            Self::QuoteVersion {
                quote_id,
                version_number,
            } => write!(f, "quote {quote_id} version {version_number}"),
            Self::PolicyTransaction {
                policy_transaction_id,
            } => write!(f, "policy transaction {policy_transaction_id}"),
        }
    }
}

/// A correction to one path of one kind of document, for a set of targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPatch {
    /// Kind of document.
    pub kind: DataPatchType,
    /// Path within the document.
    pub path: String,
    /// Replacement value.
    pub value: Value,
    /// Non-empty set of targets.
    pub targets: Vec<PatchTarget>,
}

/// Which holders a patch command considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchScope {
    /// Every quote, every quote version and every policy transaction.
    EntireAggregate,
    /// One quote's current data and all of its versions.
    QuoteFull {
        /// The quote.
        quote_id: Uuid,
    },
    /// One quote's current data only.
    QuoteLatest {
        /// The quote.
        quote_id: Uuid,
    },
    /// One version of one quote.
    QuoteVersion {
        /// The quote.
        quote_id: Uuid,
        /// The version.
        version_number: u32,
    },
    /// One policy transaction.
    PolicyTransaction {
        /// The transaction.
        policy_transaction_id: Uuid,
    },
}

impl PatchScope {
    /// The quote this scope names explicitly, if any.
    #[must_use]
    pub fn quote_id(&self) -> Option<Uuid> {
        match self {
            Self::QuoteFull { quote_id }
            | Self::QuoteLatest { quote_id }
            | Self::QuoteVersion { quote_id, .. } => Some(*quote_id),
            Self::EntireAggregate | Self::PolicyTransaction { .. } => None,
        }
    }
}

/// A condition every candidate document must meet at the patch path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchRule {
    /// The path must be present.
    PropertyExists,
    /// The path must be absent.
    PropertyDoesNotExist,
    /// The path must be absent, `null`, or an empty string, array or object.
    PropertyIsMissingOrNullOrEmpty,
}

impl PatchRule {
    /// Evaluates the rule against the current value at the patch path.
    #[must_use]
    pub fn is_satisfied_by(self, current: Option<&Value>) -> bool {
        match self {
            Self::PropertyExists => current.is_some(),
            Self::PropertyDoesNotExist => current.is_none(),
            Self::PropertyIsMissingOrNullOrEmpty => match current {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(Value::Array(items)) => items.is_empty(),
                Some(Value::Object(map)) => map.is_empty(),
                Some(_) => false,
            },
        }
    }
}

/// Where the replacement value of a patch comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatchValueSource {
    /// A literal value.
    Literal(Value),
    /// A field of the customer associated with the aggregate.
    CustomerDetail(CustomerDetailField),
}

/// A request to patch policy data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDataPatchCommand {
    /// Path to patch in form data, if any.
    pub form_data_path: Option<String>,
    /// Path to patch in calculation results, if any.
    pub calculation_result_path: Option<String>,
    /// Source of the replacement value.
    pub value_source: PatchValueSource,
    /// Holders the patch considers.
    pub scope: PatchScope,
    /// Conditions every candidate must meet.
    #[serde(default)]
    pub rules: Vec<PatchRule>,
}

impl PolicyDataPatchCommand {
    /// The paths this command specifies, by document kind.
    pub fn paths(&self) -> impl Iterator<Item = (DataPatchType, &str)> {
        [
            (DataPatchType::FormData, self.form_data_path.as_deref()),
            (
                DataPatchType::CalculationResult,
                self.calculation_result_path.as_deref(),
            ),
        ]
        .into_iter()
        .filter_map(|(kind, path)| path.map(|p| (kind, p)))
    }
}

/// Why a patch command was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchRejection {
    /// A candidate did not meet one of the command's rules.
    #[error("{rule:?} failed for {target} at {kind} path {path}")]
    RuleFailed {
        /// The failed rule.
        rule: PatchRule,
        /// The candidate that failed it.
        target: PatchTarget,
        /// Kind of document.
        kind: DataPatchType,
        /// Path evaluated.
        path: String,
    },
    /// No holder offered a target for the path.
    #[error("no matching target for {kind} path {path}")]
    NoMatchingTarget {
        /// Kind of document.
        kind: DataPatchType,
        /// Path requested.
        path: String,
    },
    /// The command specified neither a form data nor a calculation result path.
    #[error("a patch must specify a form data path or a calculation result path")]
    NoPathSpecified,
}

impl From<PatchRejection> for DomainError {
    fn from(rejection: PatchRejection) -> Self {
        Self::Validation(rejection.to_string())
    }
}

/// Something whose stored documents can be patched.
pub trait PatchableDataHolder {
    /// Targets this holder offers within `scope`, each paired with the
    /// document of `kind` it addresses. Targets without such a document are
    /// not offered.
    fn patch_candidates(&self, kind: DataPatchType, scope: &PatchScope)
    -> Vec<(PatchTarget, &Value)>;

    /// Whether `target` addresses data held by this holder.
    fn is_applicable(&self, target: &PatchTarget) -> bool;

    /// Writes the patch into every applicable document. Returns whether
    /// anything was written.
    fn apply_patch(&mut self, patch: &DataPatch) -> bool;

    /// Applies `patch` only when one of its targets addresses this holder.
    fn apply_patch_if_applicable(&mut self, patch: &DataPatch) -> bool {
        patch.targets.iter().any(|target| self.is_applicable(target)) && self.apply_patch(patch)
    }

    /// Selects this holder's form data targets for `command`.
    ///
    /// # Errors
    ///
    /// Returns a [`PatchRejection`] when a candidate fails a rule.
    fn select_and_validate_form_data_patch_targets(
        &self,
        command: &PolicyDataPatchCommand,
    ) -> Result<Vec<PatchTarget>, PatchRejection> {
        match &command.form_data_path {
            Some(path) => select_and_validate(self, DataPatchType::FormData, path, command),
            None => Ok(Vec::new()),
        }
    }

    /// Selects this holder's calculation result targets for `command`.
    ///
    /// # Errors
    ///
    /// Returns a [`PatchRejection`] when a candidate fails a rule.
    fn select_and_validate_calculation_result_patch_targets(
        &self,
        command: &PolicyDataPatchCommand,
    ) -> Result<Vec<PatchTarget>, PatchRejection> {
        match &command.calculation_result_path {
            Some(path) => {
                select_and_validate(self, DataPatchType::CalculationResult, path, command)
            }
            None => Ok(Vec::new()),
        }
    }
}

fn select_and_validate<H: PatchableDataHolder + ?Sized>(
    holder: &H,
    kind: DataPatchType,
    path: &str,
    command: &PolicyDataPatchCommand,
) -> Result<Vec<PatchTarget>, PatchRejection> {
    let mut targets = Vec::new();
    for (target, document) in holder.patch_candidates(kind, &command.scope) {
        let current = kind.locate(document, path);
        if let Some(rule) = command
            .rules
            .iter()
            .find(|rule| !rule.is_satisfied_by(current))
        {
            return Err(PatchRejection::RuleFailed {
                rule: *rule,
                target,
                kind,
                path: path.to_owned(),
            });
        }
        targets.push(target);
    }
    Ok(targets)
}

/// Writes `patch` into `document` if `target` is one of its targets.
pub(crate) fn write_if_targeted(
    patch: &DataPatch,
    target: &PatchTarget,
    document: &mut Value,
) -> bool {
    patch.targets.contains(target) && patch.kind.write(document, &patch.path, patch.value.clone())
}
