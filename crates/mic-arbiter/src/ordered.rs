use heapless::Vec;

use crate::types::{MicConnection, MicId, Sink, MAX_CONCURRENT_MICS};

/// A microphone in a combined list. Only the user the list was built for
/// has sinks attached; microphones pulled in from other users carry `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OrderedMic {
    pub id: MicId,
    pub sink: Option<Sink>,
}

/// Microphone list kept in ascending id order without duplicates, so the
/// physical-to-channel mapping does not depend on request order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderedMicList {
    mics: Vec<OrderedMic, MAX_CONCURRENT_MICS>,
}

impl OrderedMicList {
    pub const fn new() -> Self {
        Self { mics: Vec::new() }
    }

    /// List holding a user's own connections, sinks included.
    pub fn from_connections(connections: &[MicConnection]) -> Self {
        let mut list = Self::new();
        for c in connections {
            list.insert(c.mic, Some(c.sink));
        }
        list
    }

    /// Insert `id` at its ordered position. An id already present is left
    /// untouched. Panics when a new id does not fit.
    pub fn insert(&mut self, id: MicId, sink: Option<Sink>) {
        if self.contains(id) {
            return;
        }
        let at = self.mics.iter().position(|m| m.id > id).unwrap_or(self.mics.len());
        if self.mics.insert(at, OrderedMic { id, sink }).is_err() {
            panic!("ordered mic list full");
        }
    }

    /// Merge ids only, without sinks.
    pub fn merge_ids(&mut self, ids: impl IntoIterator<Item = MicId>) {
        for id in ids {
            self.insert(id, None);
        }
    }

    pub fn contains(&self, id: MicId) -> bool {
        self.mics.iter().any(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.mics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OrderedMic> + '_ {
        self.mics.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = MicId> + '_ {
        self.mics.iter().map(|m| m.id)
    }

    pub fn as_slice(&self) -> &[OrderedMic] {
        &self.mics
    }
}
