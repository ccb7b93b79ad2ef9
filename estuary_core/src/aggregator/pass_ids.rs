// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render-pass id remapping.

use hashbrown::HashMap;

use crate::frame::RenderPassId;
use crate::surface::SurfaceId;

/// Key of one producer pass as embedded once in the aggregated frame.
///
/// `embedding` counts how often the same surface was already expanded during
/// the current aggregation, so a surface embedded twice gets two disjoint
/// sets of ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PassKey {
    surface: SurfaceId,
    embedding: u32,
    local: RenderPassId,
}

#[derive(Clone, Copy, Debug)]
struct Assigned {
    id: RenderPassId,
    in_use: bool,
}

/// Maps producer-local pass ids into one shared id space.
///
/// A producer pass keeps its shared id across aggregations for as long as it
/// is aggregated every time; ids of passes that were not touched by the last
/// aggregation are forgotten by [`end_aggregation`](Self::end_aggregation).
/// The counter never goes backwards, so a forgotten id is never handed out
/// again.
#[derive(Debug)]
pub(crate) struct PassIdRemapper {
    assigned: HashMap<PassKey, Assigned>,
    next_id: u64,
}

impl Default for PassIdRemapper {
    fn default() -> Self {
        Self {
            assigned: HashMap::new(),
            next_id: 1,
        }
    }
}

impl PassIdRemapper {
    pub(crate) fn remap(
        &mut self,
        surface: SurfaceId,
        embedding: u32,
        local: RenderPassId,
    ) -> RenderPassId {
        let key = PassKey {
            surface,
            embedding,
            local,
        };
        if let Some(assigned) = self.assigned.get_mut(&key) {
            assigned.in_use = true;
            return assigned.id;
        }
        let id = RenderPassId(self.next_id);
        self.next_id += 1;
        self.assigned.insert(key, Assigned { id, in_use: true });
        id
    }

    /// Forgets ids that were not remapped since the previous call.
    pub(crate) fn end_aggregation(&mut self) {
        self.assigned.retain(|_, assigned| {
            let keep = assigned.in_use;
            assigned.in_use = false;
            keep
        });
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.assigned.len()
    }
}
