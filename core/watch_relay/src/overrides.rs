//! Corrections for titles whose ids disagree between the two services.

use std::collections::HashMap;

use serde::Deserialize;

use crate::model::{LookupKey, MediaKind};

/// Small Axe is a movie on the activity service, but the metadata service
/// only has real data for it as a show under a different id.
const SMALL_AXE: OverrideEntry = OverrideEntry {
    source_id: 865887,
    source_kind: MediaKind::Movie,
    replacement_id: 90705,
    replacement_kind: MediaKind::Show,
};

const BUILTIN: &[OverrideEntry] = &[SMALL_AXE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OverrideEntry {
    /// Activity-service (stable) id of the bad record.
    pub source_id: i64,
    /// Movie and show ids are separate numbering spaces on the activity
    /// service, so an entry only applies to records of this kind.
    #[serde(default = "default_source_kind")]
    pub source_kind: MediaKind,
    /// Metadata-service id to look up instead.
    pub replacement_id: i64,
    pub replacement_kind: MediaKind,
}

fn default_source_kind() -> MediaKind {
    MediaKind::Movie
}

#[derive(Debug, Clone)]
pub struct OverrideTable {
    by_source: HashMap<(i64, MediaKind), OverrideEntry>,
}

impl Default for OverrideTable {
    fn default() -> Self {
        Self::with_entries(std::iter::empty())
    }
}

impl OverrideTable {
    /// Built-in corrections plus `extra`; later entries win on conflict.
    pub fn with_entries(extra: impl IntoIterator<Item = OverrideEntry>) -> Self {
        let mut by_source = HashMap::new();
        for e in BUILTIN.iter().copied().chain(extra) {
            by_source.insert((e.source_id, e.source_kind), e);
        }
        OverrideTable { by_source }
    }

    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    /// Returns the key to use for metadata lookups. Unlisted `(id, kind)`
    /// pairs come back unchanged; the stable id is never rewritten.
    pub fn resolve(&self, key: LookupKey) -> LookupKey {
        match self.by_source.get(&(key.stable_id, key.kind)) {
            Some(e) => LookupKey {
                stable_id: key.stable_id,
                tmdb_id: Some(e.replacement_id),
                kind: e.replacement_kind,
            },
            None => key,
        }
    }
}
