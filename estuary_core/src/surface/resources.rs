// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reference-count ledger for resources a producer lent to the compositor.

use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use hashbrown::HashMap;
use kurbo::Rect;

use crate::frame::{ResourceId, ReturnedResource, TransferableResource};

use super::SurfaceId;

/// The producer side of a [`SurfaceFactory`](super::SurfaceFactory).
pub trait SurfaceFactoryClient {
    /// Gives resources back to the producer once nothing in the compositor
    /// references them any more.
    ///
    /// Each entry's `count` is the number of times the producer sent the
    /// resource with a frame. Never called with an empty list.
    fn return_resources(&mut self, resources: &[ReturnedResource]);

    /// Tells the producer that `id` is about to be drawn with `damage_rect`
    /// (in the surface's own space) as its changed area.
    fn will_draw_surface(&mut self, id: SurfaceId, damage_rect: Rect) {
        _ = (id, damage_rect);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct ResourceRefs {
    holding_alive: u32,
    received_from_child: u32,
}

/// Counts references to a producer's resources and returns them at zero.
///
/// A resource enters the ledger when a frame carrying it is queued
/// ([`receive_from_child`](Self::receive_from_child)); consumers take extra
/// references with [`ref_resources`](Self::ref_resources). Every reference is
/// dropped through [`unref_resources`](Self::unref_resources); once none are
/// left the resource is handed back to the client with the number of times it
/// was received.
pub struct SurfaceResourceHolder {
    client: Rc<RefCell<dyn SurfaceFactoryClient>>,
    resources: HashMap<ResourceId, ResourceRefs>,
}

impl fmt::Debug for SurfaceResourceHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceResourceHolder")
            .field("resources", &self.resources.len())
            .finish_non_exhaustive()
    }
}

impl SurfaceResourceHolder {
    /// Creates an empty ledger returning resources to `client`.
    #[must_use]
    pub fn new(client: Rc<RefCell<dyn SurfaceFactoryClient>>) -> Self {
        Self {
            client,
            resources: HashMap::new(),
        }
    }

    /// Returns the producer this ledger reports to.
    #[must_use]
    pub fn client(&self) -> &Rc<RefCell<dyn SurfaceFactoryClient>> {
        &self.client
    }

    /// Records that the producer sent `resources` with a frame.
    pub fn receive_from_child(&mut self, resources: &[TransferableResource]) {
        for resource in resources {
            let refs = self.resources.entry(resource.id).or_default();
            refs.holding_alive += 1;
            refs.received_from_child += 1;
        }
    }

    /// Takes one more reference to each of `resources`.
    ///
    /// # Panics
    ///
    /// Panics if a resource was never received.
    pub fn ref_resources(&mut self, resources: &[TransferableResource]) {
        for resource in resources {
            let refs = self
                .resources
                .get_mut(&resource.id)
                .unwrap_or_else(|| panic!("referencing unknown resource {:?}", resource.id));
            refs.holding_alive += 1;
        }
    }

    /// Drops references and returns the resources that reached zero, each
    /// with its received count.
    ///
    /// Unknown ids are ignored. The caller delivers a non-empty result to the
    /// client once it no longer borrows the ledger.
    #[must_use]
    pub fn unref_resources(&mut self, resources: &[ReturnedResource]) -> Vec<ReturnedResource> {
        let mut returned = Vec::new();
        for resource in resources {
            let Some(refs) = self.resources.get_mut(&resource.id) else {
                continue;
            };
            debug_assert!(
                refs.holding_alive >= resource.count,
                "resource {:?} unreferenced more often than referenced",
                resource.id
            );
            refs.holding_alive = refs.holding_alive.saturating_sub(resource.count);
            if refs.holding_alive == 0 {
                returned.push(ReturnedResource {
                    id: resource.id,
                    count: refs.received_from_child,
                    lost: resource.lost,
                });
                self.resources.remove(&resource.id);
            }
        }
        returned
    }

    /// Returns the number of resources still referenced.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` if no resource is referenced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// A surface's non-owning link back to its factory's resource ledger.
///
/// The factory may be dropped while surfaces it created still wait for
/// garbage collection; every operation checks that the ledger is still alive
/// and does nothing otherwise.
#[derive(Clone, Debug, Default)]
pub(crate) struct FactoryHandle {
    holder: Weak<RefCell<SurfaceResourceHolder>>,
}

impl FactoryHandle {
    pub(crate) fn new(holder: &Rc<RefCell<SurfaceResourceHolder>>) -> Self {
        Self {
            holder: Rc::downgrade(holder),
        }
    }

    pub(crate) fn receive_from_child(&self, resources: &[TransferableResource]) {
        if let Some(holder) = self.holder.upgrade() {
            holder.borrow_mut().receive_from_child(resources);
        }
    }

    pub(crate) fn ref_resources(&self, resources: &[TransferableResource]) {
        if let Some(holder) = self.holder.upgrade() {
            holder.borrow_mut().ref_resources(resources);
        }
    }

    /// Drops references and reports resources that reached zero to the
    /// client, after the ledger borrow has ended.
    pub(crate) fn unref_resources(&self, resources: &[ReturnedResource]) {
        let Some(holder) = self.holder.upgrade() else {
            return;
        };
        let (client, returned) = {
            let mut holder = holder.borrow_mut();
            let returned = holder.unref_resources(resources);
            (holder.client.clone(), returned)
        };
        if !returned.is_empty() {
            client.borrow_mut().return_resources(&returned);
        }
    }

    pub(crate) fn will_draw_surface(&self, id: SurfaceId, damage_rect: Rect) {
        let Some(holder) = self.holder.upgrade() else {
            return;
        };
        let client = holder.borrow().client.clone();
        client.borrow_mut().will_draw_surface(id, damage_rect);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Accumulates returned counts per resource id.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingClient {
        pub(crate) returned: HashMap<ResourceId, u32>,
        pub(crate) return_calls: usize,
        pub(crate) will_draw: Vec<(SurfaceId, Rect)>,
    }

    impl SurfaceFactoryClient for RecordingClient {
        fn return_resources(&mut self, resources: &[ReturnedResource]) {
            assert!(!resources.is_empty(), "returns are never empty");
            self.return_calls += 1;
            for resource in resources {
                *self.returned.entry(resource.id).or_default() += resource.count;
            }
        }

        fn will_draw_surface(&mut self, id: SurfaceId, damage_rect: Rect) {
            self.will_draw.push((id, damage_rect));
        }
    }

    pub(crate) fn resources(ids: &[u32]) -> Vec<TransferableResource> {
        ids.iter()
            .map(|&id| TransferableResource::new(ResourceId(id), kurbo::Size::new(1.0, 1.0)))
            .collect()
    }
}
