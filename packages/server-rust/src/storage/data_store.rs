//! Durable persistence boundary for the PMode store.
//!
//! Defines [`PModeDataStore`], which the [`PModeStore`](super::PModeStore)
//! calls on every mutation, and the shapes that cross it: the
//! [`StoreMutation`] log entry and the [`PModeDocument`] snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::record::PModeRecord;

/// A single committed change to the store's persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreMutation {
    /// Insert or replace a record (create, update, soft delete).
    Put { record: PModeRecord },
    /// Physically remove a record (hard delete).
    Remove { id: String },
    /// Replace the default-PMode pointer.
    SetDefault { id: Option<String> },
}

/// Full persisted state: the default-id pointer plus one entry per record,
/// keyed by PMode id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PModeDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_id: Option<String>,
    #[serde(default)]
    pub records: BTreeMap<String, PModeRecord>,
}

impl PModeDocument {
    /// Applies a mutation. Replaying the same mutation twice yields the same state.
    pub fn apply(&mut self, mutation: StoreMutation) {
        match mutation {
            StoreMutation::Put { record } => {
                self.records.insert(record.pmode.id.clone(), record);
            }
            StoreMutation::Remove { id } => {
                self.records.remove(&id);
            }
            StoreMutation::SetDefault { id } => {
                self.default_id = id;
            }
        }
    }
}

/// Durable backend for the PMode store.
///
/// `append` is called inside the store's writer critical section before the
/// in-memory state changes; an error aborts the mutation. Implementations are
/// therefore synchronous and must be durable when `append` returns.
///
/// Used as `Arc<dyn PModeDataStore>`.
pub trait PModeDataStore: Send + Sync {
    /// Reads the full persisted state.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read or decoded.
    fn load(&self) -> anyhow::Result<PModeDocument>;

    /// Durably records one mutation.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation could not be made durable.
    fn append(&self, mutation: &StoreMutation) -> anyhow::Result<()>;

    /// Replaces the persisted state with `document` and discards any log.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot could not be written.
    fn checkpoint(&self, document: &PModeDocument) -> anyhow::Result<()>;

    /// Whether mutations accumulate in a log that periodic checkpoints compact.
    fn is_log_structured(&self) -> bool {
        false
    }

    /// Whether this is a null (no-op) implementation.
    ///
    /// Returns `false` by default. Null implementations override to return `true`.
    fn is_null(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use as4_core::PMode;
    use proptest::prelude::*;

    use super::*;

    fn put(id: &str, now: i64) -> StoreMutation {
        StoreMutation::Put {
            record: PModeRecord::new(PMode::new(id), now),
        }
    }

    #[test]
    fn apply_builds_state_and_is_idempotent() {
        let mut doc = PModeDocument::default();
        let mutations = vec![
            put("a", 1),
            put("b", 2),
            StoreMutation::SetDefault {
                id: Some("a".to_string()),
            },
            StoreMutation::Remove { id: "b".to_string() },
        ];

        for m in mutations.clone() {
            doc.apply(m);
        }
        let once = doc.clone();
        for m in mutations {
            doc.apply(m);
        }

        assert_eq!(doc, once);
        assert_eq!(doc.default_id.as_deref(), Some("a"));
        assert_eq!(doc.records.keys().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn document_json_shape() {
        let mut doc = PModeDocument::default();
        doc.apply(put("pm-1", 7));
        doc.apply(StoreMutation::SetDefault {
            id: Some("pm-1".to_string()),
        });

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["defaultId"], "pm-1");
        assert_eq!(json["records"]["pm-1"]["pmode"]["id"], "pm-1");
        assert_eq!(json["records"]["pm-1"]["metadata"]["creationTime"], 7);

        let back: PModeDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn mutation_msgpack_round_trip() {
        let m = StoreMutation::SetDefault { id: None };
        let bytes = rmp_serde::to_vec_named(&m).unwrap();
        let back: StoreMutation = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(back, m);
    }

    fn mutation() -> impl Strategy<Value = StoreMutation> {
        let id = prop::sample::select(vec!["a", "b", "c"]);
        prop_oneof![
            (id.clone(), 0i64..100).prop_map(|(id, now)| put(id, now)),
            id.clone().prop_map(|id| StoreMutation::Remove { id: id.to_string() }),
            prop::option::of(id).prop_map(|id| StoreMutation::SetDefault {
                id: id.map(str::to_string),
            }),
        ]
    }

    proptest! {
        // A crash between writing the snapshot and truncating the log replays
        // the whole log over a snapshot that already contains a prefix of it.
        #[test]
        fn replay_over_any_snapshot_prefix_converges(
            log in prop::collection::vec(mutation(), 0..24),
            cut in 0usize..24,
        ) {
            let mut expected = PModeDocument::default();
            for m in log.clone() {
                expected.apply(m);
            }

            let cut = cut.min(log.len());
            let mut recovered = PModeDocument::default();
            for m in log[..cut].iter().cloned() {
                recovered.apply(m);
            }
            for m in log {
                recovered.apply(m);
            }

            prop_assert_eq!(recovered, expected);
        }
    }
}
