// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The surface directory and its garbage collector.

use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use hashbrown::{HashMap, HashSet};

use crate::trace::{SurfaceCollectedEvent, Tracer};

use super::{Surface, SurfaceId, SurfaceSequence};

/// Learns about new frames on any surface.
pub trait SurfaceDamageObserver {
    /// Called after surface `id` received a frame or a copy request.
    ///
    /// Set `changed` to `true` if the new content will be drawn; otherwise
    /// the producer's draw callback runs as skipped at once.
    fn on_surface_damaged(&mut self, id: SurfaceId, changed: &mut bool);
}

/// Owns every live surface and frees destroyed ones.
///
/// A destroyed surface stays registered until all of its destruction
/// dependencies are satisfied and no live surface reaches it through
/// [`Surface::referenced_surfaces`]. Collection is a mark-and-sweep over the
/// reference graph, so destroyed surfaces that only keep each other alive are
/// freed together.
pub struct SurfaceManager {
    surfaces: HashMap<SurfaceId, Surface>,
    pending_destroy: Vec<SurfaceId>,
    satisfied_sequences: HashSet<SurfaceSequence>,
    valid_namespaces: HashSet<u32>,
    observers: Vec<Weak<RefCell<dyn SurfaceDamageObserver>>>,
    tracer: Tracer,
}

impl fmt::Debug for SurfaceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceManager")
            .field("surfaces", &self.surfaces.len())
            .field("pending_destroy", &self.pending_destroy)
            .field("satisfied_sequences", &self.satisfied_sequences.len())
            .field("valid_namespaces", &self.valid_namespaces)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl Default for SurfaceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceManager {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            surfaces: HashMap::new(),
            pending_destroy: Vec::new(),
            satisfied_sequences: HashSet::new(),
            valid_namespaces: HashSet::new(),
            observers: Vec::new(),
            tracer: Tracer::none(),
        }
    }

    /// Installs a tracer for collection events.
    pub fn set_tracer(&mut self, tracer: Tracer) {
        self.tracer = tracer;
    }

    // -- Directory --

    /// Takes ownership of `surface`.
    ///
    /// # Panics
    ///
    /// Panics if a surface with the same id is registered.
    pub fn register_surface(&mut self, surface: Surface) {
        let id = surface.id();
        assert!(
            !self.surfaces.contains_key(&id),
            "surface {id:?} is already registered"
        );
        self.surfaces.insert(id, surface);
    }

    /// Removes a surface from the directory and hands it back.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered.
    pub fn deregister_surface(&mut self, id: SurfaceId) -> Surface {
        let surface = self
            .surfaces
            .remove(&id)
            .unwrap_or_else(|| panic!("deregistering unknown surface {id:?}"));
        self.pending_destroy.retain(|pending| *pending != id);
        surface
    }

    /// Looks up a surface.
    #[must_use]
    pub fn surface_for_id(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    /// Looks up a surface for mutation.
    #[must_use]
    pub fn surface_for_id_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        self.surfaces.get_mut(&id)
    }

    /// Returns the number of registered surfaces, destroyed or not.
    #[must_use]
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    /// Returns the destroyed surfaces still waiting to be freed.
    #[must_use]
    pub fn pending_destroy(&self) -> &[SurfaceId] {
        &self.pending_destroy
    }

    // -- Lifetime --

    /// Marks a surface destroyed and collects garbage.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered or was already destroyed.
    pub fn destroy(&mut self, id: SurfaceId) {
        let surface = self
            .surfaces
            .get_mut(&id)
            .unwrap_or_else(|| panic!("destroying unknown surface {id:?}"));
        assert!(!surface.destroyed(), "surface {id:?} is already destroyed");
        surface.set_destroyed();
        self.pending_destroy.push(id);
        self.garbage_collect_surfaces();
    }

    /// Records that `sequences` of `namespace` are satisfied, draining the
    /// list, and collects garbage.
    pub fn did_satisfy_sequences(&mut self, namespace: u32, sequences: &mut Vec<u32>) {
        self.satisfied_sequences.extend(
            sequences
                .drain(..)
                .map(|sequence| SurfaceSequence::new(namespace, sequence)),
        );
        self.garbage_collect_surfaces();
    }

    /// Marks `namespace` as owned by a live client.
    pub fn register_surface_id_namespace(&mut self, namespace: u32) {
        self.valid_namespaces.insert(namespace);
    }

    /// Marks `namespace` as gone, orphaning every dependency on it, and
    /// collects garbage.
    pub fn invalidate_surface_id_namespace(&mut self, namespace: u32) {
        self.valid_namespaces.remove(&namespace);
        self.garbage_collect_surfaces();
    }

    /// Frees destroyed surfaces that are no longer needed.
    ///
    /// Every surface first drops dependencies that are satisfied or
    /// orphaned. Surfaces that are not destroyed, or still have dependencies,
    /// are live, as is everything they reach through referenced surfaces.
    /// Destroyed surfaces outside that set are freed.
    pub fn garbage_collect_surfaces(&mut self) {
        if self.pending_destroy.is_empty() {
            return;
        }

        let mut live = Vec::new();
        let mut live_set = HashSet::new();
        for (id, surface) in &mut self.surfaces {
            surface.satisfy_destruction_dependencies(
                &mut self.satisfied_sequences,
                &self.valid_namespaces,
            );
            if !surface.destroyed() || surface.destruction_dependency_count() > 0 {
                live.push(*id);
                live_set.insert(*id);
            }
        }

        let mut next = 0;
        while let Some(id) = live.get(next).copied() {
            next += 1;
            let Some(surface) = self.surfaces.get(&id) else {
                continue;
            };
            for child in surface.referenced_surfaces() {
                if self.surfaces.contains_key(child) && live_set.insert(*child) {
                    live.push(*child);
                }
            }
        }

        let (freed, pending): (Vec<_>, Vec<_>) = core::mem::take(&mut self.pending_destroy)
            .into_iter()
            .partition(|id| !live_set.contains(id));
        self.pending_destroy = pending;
        let freed: Vec<Surface> = freed
            .into_iter()
            .filter_map(|id| self.surfaces.remove(&id))
            .collect();

        if !freed.is_empty() {
            self.tracer.surfaces_collected(&SurfaceCollectedEvent {
                freed: u32::try_from(freed.len()).unwrap_or(u32::MAX),
                remaining: u32::try_from(self.surfaces.len()).unwrap_or(u32::MAX),
            });
        }
        drop(freed);
    }

    // -- Damage --

    /// Adds a damage observer.
    ///
    /// The manager holds it weakly; dropped observers are pruned.
    pub fn add_observer(&mut self, observer: &Rc<RefCell<dyn SurfaceDamageObserver>>) {
        self.observers.push(Rc::downgrade(observer));
    }

    /// Removes a damage observer.
    pub fn remove_observer(&mut self, observer: &Rc<RefCell<dyn SurfaceDamageObserver>>) {
        let target = Rc::downgrade(observer);
        self.observers
            .retain(|weak| weak.strong_count() > 0 && !Weak::ptr_eq(weak, &target));
    }

    /// Tells every observer that `id` changed.
    ///
    /// Returns `true` if any observer will draw the change.
    #[must_use]
    pub fn surface_modified(&self, id: SurfaceId) -> bool {
        let mut changed = false;
        for observer in self.observers.iter().filter_map(Weak::upgrade) {
            observer.borrow_mut().on_surface_damaged(id, &mut changed);
        }
        changed
    }
}
