//! Rollback and replay over a quote aggregate's event history.
//!
//! Rolling back to sequence number `S` does not delete anything. A
//! `RolledBack` event is appended and the consuming projection derives two
//! sequences from the history on demand:
//!
//! - the *stripped* events: every effective event after `S`, whose effects
//!   must be reversed;
//! - the *replay* events: the upsert-classified events at or before `S`
//!   that restore each overwritten value, plus the data patches that still
//!   apply on top of them, in their original order.
//!
//! Events stripped by an earlier rollback are neither stripped nor replayed
//! again, and cannot be rolled back to.

use std::collections::{HashMap, HashSet};

use coverline_core::error::DomainError;
use coverline_core::event::DomainEvent;
use uuid::Uuid;

use super::events::{QuoteEvent, QuoteEventKind};
use super::patch::{DataPatchType, PatchTarget};

/// The piece of state an upsert event overwrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpsertField {
    /// A quote's form data.
    FormData,
    /// A quote's calculation result.
    CalculationResult,
    /// A quote's workflow state.
    WorkflowState,
    /// A quote's expiry.
    Expiry,
    /// A quote's workflow step.
    WorkflowStep,
    /// The aggregate's customer details.
    CustomerDetails,
    /// The aggregate's owner.
    Owner,
    /// The aggregate's product release.
    ProductRelease,
    /// The aggregate's organisation.
    Organisation,
}

impl From<DataPatchType> for UpsertField {
    fn from(kind: DataPatchType) -> Self {
        match kind {
            DataPatchType::FormData => Self::FormData,
            DataPatchType::CalculationResult => Self::CalculationResult,
        }
    }
}

/// Identifies one overwritable value: a quote field, or an aggregate field
/// when `quote_id` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UpsertKey {
    /// The quote, for quote-level fields.
    pub quote_id: Option<Uuid>,
    /// The field.
    pub field: UpsertField,
}

impl UpsertKey {
    fn quote(quote_id: Uuid, field: UpsertField) -> Self {
        Self {
            quote_id: Some(quote_id),
            field,
        }
    }

    fn aggregate(field: UpsertField) -> Self {
        Self {
            quote_id: None,
            field,
        }
    }
}

/// The values an event overwrites wholesale. Empty for events that are not
/// upserts.
///
/// Creation events count as setters of every quote field they initialise,
/// so a rollback to before the first update still restores those values.
#[must_use]
pub fn upsert_keys(kind: &QuoteEventKind) -> Vec<UpsertKey> {
    use UpsertField as F;
    let quote_fields = |quote_id: Uuid, fields: &[UpsertField]| -> Vec<UpsertKey> {
        fields
            .iter()
            .map(|field| UpsertKey::quote(quote_id, *field))
            .collect()
    };
    let key = match kind {
        QuoteEventKind::QuoteInitialized(e) => {
            return quote_fields(e.quote_id, &[F::FormData, F::WorkflowState]);
        }
        QuoteEventKind::QuoteImported(e) => {
            return quote_fields(
                e.quote_id,
                &[F::FormData, F::CalculationResult, F::WorkflowState],
            );
        }
        QuoteEventKind::RenewalQuoteCreated(e)
        | QuoteEventKind::AdjustmentQuoteCreated(e)
        | QuoteEventKind::CancellationQuoteCreated(e) => {
            return quote_fields(e.quote_id, &[F::FormData, F::WorkflowState]);
        }
        QuoteEventKind::FormDataUpdated(e) => UpsertKey::quote(e.quote_id, F::FormData),
        QuoteEventKind::CalculationResultCreated(e) => {
            UpsertKey::quote(e.quote_id, F::CalculationResult)
        }
        QuoteEventKind::QuoteStateChanged(e) => UpsertKey::quote(e.quote_id, F::WorkflowState),
        QuoteEventKind::QuoteExpirySet(e) => UpsertKey::quote(e.quote_id, F::Expiry),
        QuoteEventKind::QuoteExpiryCleared(e) => UpsertKey::quote(e.quote_id, F::Expiry),
        QuoteEventKind::WorkflowStepAssigned(e) => UpsertKey::quote(e.quote_id, F::WorkflowStep),
        QuoteEventKind::CustomerAssociated(_) | QuoteEventKind::CustomerDetailsUpdated(_) => {
            UpsertKey::aggregate(F::CustomerDetails)
        }
        QuoteEventKind::OwnerAssigned(_) | QuoteEventKind::OwnerUnassigned(_) => {
            UpsertKey::aggregate(F::Owner)
        }
        QuoteEventKind::ProductReleaseMigrated(_) => UpsertKey::aggregate(F::ProductRelease),
        QuoteEventKind::OrganisationMigrated(_) => UpsertKey::aggregate(F::Organisation),
        _ => return Vec::new(),
    };
    vec![key]
}

fn sequence_number(event: &QuoteEvent) -> i64 {
    event.sequence_number()
}

fn is_rollback(event: &QuoteEvent) -> bool {
    matches!(event.kind, QuoteEventKind::RolledBack(_))
}

/// Sequence numbers of the events earlier rollbacks stripped.
fn previously_stripped(history: &[QuoteEvent]) -> HashSet<i64> {
    let mut stripped = HashSet::new();
    for (index, event) in history.iter().enumerate() {
        if let QuoteEventKind::RolledBack(rollback) = &event.kind {
            for earlier in &history[..index] {
                let seq = sequence_number(earlier);
                if seq > rollback.target_sequence_number && !is_rollback(earlier) {
                    stripped.insert(seq);
                }
            }
        }
    }
    stripped
}

/// The events still in effect after every rollback in `history`.
#[must_use]
pub fn effective_events(history: &[QuoteEvent]) -> Vec<&QuoteEvent> {
    let stripped = previously_stripped(history);
    history
        .iter()
        .filter(|e| !stripped.contains(&sequence_number(e)))
        .collect()
}

/// Checks that `target` is a point `history` can be rolled back to.
///
/// # Errors
///
/// - `DomainError::NoPriorEvents` when the history is empty.
/// - `DomainError::SameSequenceNumber` when `target` is the last event.
/// - `DomainError::RollbackTargetNotFound` when `target` is outside the
///   history or was stripped by an earlier rollback.
#[allow(clippy::cast_possible_wrap)]
pub fn validate_target(
    aggregate_id: Uuid,
    history: &[QuoteEvent],
    target: i64,
) -> Result<(), DomainError> {
    let count = history.len() as i64;
    if count == 0 {
        return Err(DomainError::NoPriorEvents { aggregate_id });
    }
    if target == count - 1 {
        return Err(DomainError::SameSequenceNumber {
            aggregate_id,
            sequence_number: target,
        });
    }
    if !(0..count).contains(&target) || previously_stripped(history).contains(&target) {
        return Err(DomainError::RollbackTargetNotFound {
            aggregate_id,
            sequence_number: target,
        });
    }
    Ok(())
}

/// The events a rollback to `target` strips, in order.
#[must_use]
pub fn stripped_events(history: &[QuoteEvent], target: i64) -> Vec<&QuoteEvent> {
    let stripped: Vec<&QuoteEvent> = effective_events(history)
        .into_iter()
        .filter(|e| sequence_number(e) > target && !is_rollback(e))
        .collect();
    tracing::debug!(
        target_sequence_number = target,
        stripped = stripped.len(),
        "computed stripped events"
    );
    stripped
}

/// The events a projection replays to restore the state as of `target`,
/// in order.
#[must_use]
pub fn replay_events(history: &[QuoteEvent], target: i64) -> Vec<&QuoteEvent> {
    let candidates: Vec<&QuoteEvent> = effective_events(history)
        .into_iter()
        .filter(|e| sequence_number(e) <= target)
        .collect();

    let mut latest: HashMap<UpsertKey, i64> = HashMap::new();
    for event in &candidates {
        for key in upsert_keys(&event.kind) {
            latest.insert(key, sequence_number(event));
        }
    }

    let replay: Vec<&QuoteEvent> = candidates
        .into_iter()
        .filter(|event| match &event.kind {
            QuoteEventKind::PolicyDataPatched(patched) => {
                let field = UpsertField::from(patched.patch.kind);
                patched.patch.targets.iter().any(|patch_target| match patch_target {
                    PatchTarget::Quote { quote_id } => latest
                        .get(&UpsertKey::quote(*quote_id, field))
                        .is_none_or(|overwritten_at| sequence_number(event) > *overwritten_at),
                    PatchTarget::QuoteVersion { .. } | PatchTarget::PolicyTransaction { .. } => {
                        true
                    }
                })
            }
            kind => upsert_keys(kind)
                .iter()
                .any(|key| latest.get(key) == Some(&sequence_number(event))),
        })
        .collect();
    tracing::debug!(
        target_sequence_number = target,
        replayed = replay.len(),
        "computed replay events"
    );
    replay
}

/// A rollback recorded in the history, from which both derived sequences
/// can be recomputed at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackPoint {
    /// The rolled back aggregate.
    pub aggregate_id: Uuid,
    /// The sequence number rolled back to.
    pub target_sequence_number: i64,
    /// The sequence number of the `RolledBack` event itself.
    pub rollback_sequence_number: i64,
}

impl RollbackPoint {
    /// Reads a rollback point from a `RolledBack` event.
    #[must_use]
    pub fn from_event(event: &QuoteEvent) -> Option<Self> {
        match &event.kind {
            QuoteEventKind::RolledBack(rollback) => Some(Self {
                aggregate_id: event.metadata.aggregate_id,
                target_sequence_number: rollback.target_sequence_number,
                rollback_sequence_number: event.metadata.sequence_number,
            }),
            _ => None,
        }
    }

    fn history_before<'a>(&self, history: &'a [QuoteEvent]) -> &'a [QuoteEvent] {
        let end = history.partition_point(|e| sequence_number(e) < self.rollback_sequence_number);
        &history[..end]
    }

    /// Events to replay for this rollback.
    #[must_use]
    pub fn replay_events<'a>(&self, history: &'a [QuoteEvent]) -> Vec<&'a QuoteEvent> {
        replay_events(self.history_before(history), self.target_sequence_number)
    }

    /// Events this rollback strips.
    #[must_use]
    pub fn stripped_events<'a>(&self, history: &'a [QuoteEvent]) -> Vec<&'a QuoteEvent> {
        stripped_events(self.history_before(history), self.target_sequence_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::data::{DataRecord, form_data_from_model};
    use crate::domain::events::{
        CalculationResultCreated, FormDataUpdated, OwnerAssigned, PolicyDataPatched,
        QuoteImported, QuoteInitialized, QuoteStateChanged, RolledBack,
    };
    use crate::domain::patch::DataPatch;
    use crate::domain::quote::QuoteType;
    use crate::domain::workflow::QuoteAction;
    use coverline_core::event::EventMetadata;
    use coverline_test_support::fixed_now;
    use serde_json::json;

    struct History {
        aggregate_id: Uuid,
        quote_id: Uuid,
        events: Vec<QuoteEvent>,
    }

    impl History {
        fn new() -> Self {
            Self::initialized_with(None)
        }

        fn initialized_with(form_data: Option<DataRecord>) -> Self {
            let mut history = Self {
                aggregate_id: Uuid::new_v4(),
                quote_id: Uuid::new_v4(),
                events: Vec::new(),
            };
            let quote_id = history.quote_id;
            history.push(QuoteEventKind::QuoteInitialized(QuoteInitialized {
                quote_id,
                organisation_id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                product_release_id: Uuid::new_v4(),
                quote_number: None,
                initial_state: "Nascent".into(),
                form_data,
            }));
            history
        }

        #[allow(clippy::cast_possible_wrap)]
        fn push(&mut self, kind: QuoteEventKind) -> &mut Self {
            let sequence_number = self.events.len() as i64;
            self.events.push(QuoteEvent {
                metadata: EventMetadata {
                    event_id: Uuid::new_v4(),
                    event_type: kind.event_type().to_owned(),
                    aggregate_id: self.aggregate_id,
                    tenant_id: Uuid::nil(),
                    performing_user_id: None,
                    sequence_number,
                    correlation_id: Uuid::new_v4(),
                    causation_id: Uuid::new_v4(),
                    occurred_at: fixed_now(),
                },
                kind,
            });
            self
        }

        fn form(&mut self, name: &str) -> &mut Self {
            let quote_id = self.quote_id;
            self.push(QuoteEventKind::FormDataUpdated(FormDataUpdated {
                quote_id,
                form_data: named_form(name),
            }))
        }

        fn state(&mut self, from: &str, to: &str) -> &mut Self {
            let quote_id = self.quote_id;
            self.push(QuoteEventKind::QuoteStateChanged(QuoteStateChanged {
                quote_id,
                action: QuoteAction::FormUpdate,
                original_state: from.into(),
                resulting_state: to.into(),
            }))
        }

        fn patch(&mut self) -> &mut Self {
            let quote_id = self.quote_id;
            self.push(QuoteEventKind::PolicyDataPatched(PolicyDataPatched {
                patch: DataPatch {
                    kind: DataPatchType::FormData,
                    path: "name".into(),
                    value: json!("patched"),
                    targets: vec![PatchTarget::Quote { quote_id }],
                },
            }))
        }

        fn rollback(&mut self, target: i64) -> &mut Self {
            self.push(QuoteEventKind::RolledBack(RolledBack {
                target_sequence_number: target,
            }))
        }
    }

    fn named_form(name: &str) -> DataRecord {
        DataRecord::new(
            Uuid::new_v4(),
            form_data_from_model(json!({ "name": name })),
            fixed_now(),
        )
    }

    fn seqs(events: &[&QuoteEvent]) -> Vec<i64> {
        events.iter().map(|e| e.metadata.sequence_number).collect()
    }

    #[test]
    fn test_rollback_precondition_table() {
        // Arrange
        let aggregate_id = Uuid::new_v4();
        let mut history = History::new();
        history.form("a").form("b");

        // Act / Assert
        assert_eq!(
            validate_target(aggregate_id, &[], 0),
            Err(DomainError::NoPriorEvents { aggregate_id })
        );
        assert_eq!(
            validate_target(aggregate_id, &history.events, 2),
            Err(DomainError::SameSequenceNumber {
                aggregate_id,
                sequence_number: 2
            })
        );
        assert_eq!(
            validate_target(aggregate_id, &history.events, 3),
            Err(DomainError::RollbackTargetNotFound {
                aggregate_id,
                sequence_number: 3
            })
        );
        assert_eq!(
            validate_target(aggregate_id, &history.events, -1),
            Err(DomainError::RollbackTargetNotFound {
                aggregate_id,
                sequence_number: -1
            })
        );
        assert!(validate_target(aggregate_id, &history.events, 1).is_ok());
    }

    #[test]
    fn test_stripped_events_are_everything_after_target() {
        let mut history = History::new();
        history.form("a").state("Nascent", "Incomplete").form("b");

        let stripped = stripped_events(&history.events, 1);

        assert_eq!(seqs(&stripped), vec![2, 3]);
    }

    #[test]
    fn test_replay_keeps_latest_upsert_per_key_in_order() {
        // Arrange: 0 init, 1 form a, 2 state, 3 form b, 4 form c
        let mut history = History::new();
        history
            .form("a")
            .state("Nascent", "Incomplete")
            .form("b")
            .form("c");

        // Act
        let replay = replay_events(&history.events, 3);

        // Assert
        assert_eq!(seqs(&replay), vec![2, 3]);
    }

    #[test]
    fn test_replay_keeps_patch_applied_after_latest_upsert() {
        // 0 init, 1 form, 2 patch, 3 form
        let mut history = History::new();
        history.form("a").patch().form("b");

        assert_eq!(seqs(&replay_events(&history.events, 2)), vec![1, 2]);
        assert_eq!(seqs(&replay_events(&history.events, 3)), vec![3]);
    }

    #[test]
    fn test_aggregate_level_upserts_are_keyed_without_quote() {
        let mut history = History::new();
        history
            .push(QuoteEventKind::OwnerAssigned(OwnerAssigned {
                owner_user_id: Uuid::new_v4(),
            }))
            .form("a")
            .push(QuoteEventKind::OwnerAssigned(OwnerAssigned {
                owner_user_id: Uuid::new_v4(),
            }));

        // The creation event still sets the quote's workflow state.
        assert_eq!(seqs(&replay_events(&history.events, 3)), vec![0, 2, 3]);
    }

    #[test]
    fn test_earlier_rollback_is_honoured() {
        // Arrange: 0 init, 1 form a, 2 form b, 3 form c, 4 rollback to 1, 5 form d
        let mut history = History::new();
        history.form("a").form("b").form("c").rollback(1).form("d");

        // Act
        let effective = effective_events(&history.events);
        let stripped = stripped_events(&history.events, 1);
        let inside_stripped_range = validate_target(history.aggregate_id, &history.events, 2);

        // Assert
        assert_eq!(seqs(&effective), vec![0, 1, 4, 5]);
        assert_eq!(seqs(&stripped), vec![5]);
        assert!(matches!(
            inside_stripped_range,
            Err(DomainError::RollbackTargetNotFound {
                sequence_number: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_rollback_point_recomputes_from_history_before_it() {
        let mut history = History::new();
        history.form("a").form("b").rollback(1).form("c");
        let point = RollbackPoint::from_event(&history.events[3]).unwrap();

        let stripped = point.stripped_events(&history.events);
        let replay = point.replay_events(&history.events);

        assert_eq!(point.target_sequence_number, 1);
        assert_eq!(point.rollback_sequence_number, 3);
        assert_eq!(seqs(&stripped), vec![2]);
        assert_eq!(seqs(&replay), vec![0, 1]);
        assert!(RollbackPoint::from_event(&history.events[0]).is_none());
    }

    #[test]
    fn test_rollback_to_creation_replays_creation_event() {
        // Arrange: 0 init with form "initial", 1 form b, 2 state, 3 form c
        let mut history = History::initialized_with(Some(named_form("initial")));
        history.form("b").state("Nascent", "Incomplete").form("c");

        // Act
        let replay = replay_events(&history.events, 0);
        let stripped = stripped_events(&history.events, 0);

        // Assert
        assert_eq!(seqs(&replay), vec![0]);
        assert_eq!(seqs(&stripped), vec![1, 2, 3]);
        let QuoteEventKind::QuoteInitialized(initialized) = &replay[0].kind else {
            panic!("expected QuoteInitialized, got {:?}", replay[0].kind);
        };
        let restored = initialized.form_data.as_ref().unwrap();
        assert_eq!(restored.data["formModel"]["name"], json!("initial"));
    }

    #[test]
    fn test_creation_event_is_dropped_once_every_field_is_overwritten() {
        let mut history = History::new();
        history.form("a").state("Nascent", "Incomplete").form("b");

        assert_eq!(seqs(&replay_events(&history.events, 1)), vec![0, 1]);
        assert_eq!(seqs(&replay_events(&history.events, 2)), vec![1, 2]);
    }

    #[test]
    fn test_imported_quote_restores_calculation_result() {
        // Arrange: 0 imported quote, 1 calculation, 2 form
        let quote_id = Uuid::new_v4();
        let mut history = History::new();
        history.events.clear();
        history.quote_id = quote_id;
        history
            .push(QuoteEventKind::QuoteImported(QuoteImported {
                quote_id,
                organisation_id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                product_release_id: Uuid::new_v4(),
                quote_type: QuoteType::Renewal,
                quote_number: None,
                workflow_state: "Approved".into(),
                form_data: Some(named_form("imported")),
                calculation_result: None,
            }))
            .push(QuoteEventKind::CalculationResultCreated(CalculationResultCreated {
                quote_id,
                calculation_result: named_form("priced"),
            }))
            .form("edited");

        // Act
        let keys = upsert_keys(&history.events[0].kind);
        let replay = replay_events(&history.events, 0);

        // Assert
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&UpsertKey::quote(quote_id, UpsertField::CalculationResult)));
        assert_eq!(seqs(&replay), vec![0]);
        assert_eq!(seqs(&stripped_events(&history.events, 0)), vec![1, 2]);
    }
}
