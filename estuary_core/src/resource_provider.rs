// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The consumer side of resource transfer.
//!
//! The aggregator registers each producer surface as a *child* of a
//! [`ResourceProvider`]. Resources arriving with a child's frames are imported
//! under fresh parent ids, and the aggregator rewrites quads through the
//! child-to-parent map before handing passes to the renderer. Once a child
//! stops using an imported resource, the provider returns it through the
//! child's callback, which in turn drops the reference the aggregator took in
//! the producer's ledger.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::{HashMap, HashSet};

use crate::frame::{ResourceId, ReturnedResource, TransferableResource};

/// Identifies a child registration with a [`ResourceProvider`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChildId(pub u32);

impl fmt::Debug for ChildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChildId({})", self.0)
    }
}

/// Receives resources a child no longer uses, with child-side ids.
pub type ReturnCallback = Box<dyn FnMut(&[ReturnedResource])>;

/// Imports producer resources into the renderer's id space.
pub trait ResourceProvider {
    /// Registers a child whose unused resources are given back through
    /// `return_callback`.
    fn create_child(&mut self, return_callback: ReturnCallback) -> ChildId;

    /// Drops a child registration, returning every resource it still holds.
    ///
    /// # Panics
    ///
    /// Implementations may panic if `child` was never created or was
    /// already destroyed.
    fn destroy_child(&mut self, child: ChildId);

    /// Imports resources sent with one of the child's frames.
    ///
    /// # Panics
    ///
    /// Implementations may panic if `child` is not registered.
    fn receive_from_child(&mut self, child: ChildId, resources: &[TransferableResource]);

    /// Declares which child-side ids the child's current frame uses.
    /// Imported resources outside the set are returned.
    ///
    /// # Panics
    ///
    /// Implementations may panic if `child` is not registered.
    fn declare_used_resources_from_child(&mut self, child: ChildId, used: &HashSet<ResourceId>);

    /// Returns the mapping from the child's ids to parent ids.
    ///
    /// # Panics
    ///
    /// Implementations may panic if `child` is not registered.
    fn child_to_parent_map(&self, child: ChildId) -> &HashMap<ResourceId, ResourceId>;
}

#[derive(Clone, Copy, Debug)]
struct Imported {
    parent_id: ResourceId,
    imported_count: u32,
}

struct Child {
    return_callback: ReturnCallback,
    imported: HashMap<ResourceId, Imported>,
    child_to_parent: HashMap<ResourceId, ResourceId>,
}

impl Child {
    fn take(&mut self, id: ResourceId) -> Option<ReturnedResource> {
        let imported = self.imported.remove(&id)?;
        self.child_to_parent.remove(&id);
        Some(ReturnedResource::new(id, imported.imported_count))
    }
}

/// An in-memory [`ResourceProvider`].
///
/// Parent ids are allocated from 1 and never reused. A resource imported
/// several times before it is returned is returned once with the number of
/// imports as its count.
pub struct ChildResourceProvider {
    children: HashMap<ChildId, Child>,
    next_child: u32,
    next_parent_id: u32,
    parent_resources: HashMap<ResourceId, TransferableResource>,
}

impl fmt::Debug for ChildResourceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildResourceProvider")
            .field("children", &self.children.len())
            .field("resources", &self.parent_resources.len())
            .finish_non_exhaustive()
    }
}

impl Default for ChildResourceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ChildResourceProvider {
    /// Creates a provider with no children.
    #[must_use]
    pub fn new() -> Self {
        Self {
            children: HashMap::new(),
            next_child: 1,
            next_parent_id: 1,
            parent_resources: HashMap::new(),
        }
    }

    /// Returns the number of registered children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Returns the number of imported resources across all children.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.parent_resources.len()
    }

    /// Returns the description of an imported resource by parent id.
    #[must_use]
    pub fn resource(&self, parent_id: ResourceId) -> Option<&TransferableResource> {
        self.parent_resources.get(&parent_id)
    }

    fn child_mut(&mut self, child: ChildId) -> &mut Child {
        self.children
            .get_mut(&child)
            .unwrap_or_else(|| panic!("unknown resource child {child:?}"))
    }
}

impl ResourceProvider for ChildResourceProvider {
    fn create_child(&mut self, return_callback: ReturnCallback) -> ChildId {
        let id = ChildId(self.next_child);
        self.next_child += 1;
        self.children.insert(
            id,
            Child {
                return_callback,
                imported: HashMap::new(),
                child_to_parent: HashMap::new(),
            },
        );
        id
    }

    fn destroy_child(&mut self, child: ChildId) {
        let Some(mut entry) = self.children.remove(&child) else {
            return;
        };
        let ids: Vec<ResourceId> = entry.imported.keys().copied().collect();
        let mut returned = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(parent_id) = entry.child_to_parent.get(&id) {
                self.parent_resources.remove(parent_id);
            }
            returned.extend(entry.take(id));
        }
        if !returned.is_empty() {
            (entry.return_callback)(&returned);
        }
    }

    fn receive_from_child(&mut self, child: ChildId, resources: &[TransferableResource]) {
        let mut next_parent_id = self.next_parent_id;
        let mut new_parents = Vec::new();
        let entry = self.child_mut(child);
        for resource in resources {
            if let Some(imported) = entry.imported.get_mut(&resource.id) {
                imported.imported_count += 1;
                continue;
            }
            let parent_id = ResourceId(next_parent_id);
            next_parent_id += 1;
            entry.imported.insert(
                resource.id,
                Imported {
                    parent_id,
                    imported_count: 1,
                },
            );
            entry.child_to_parent.insert(resource.id, parent_id);
            new_parents.push((
                parent_id,
                TransferableResource {
                    id: parent_id,
                    ..*resource
                },
            ));
        }
        self.next_parent_id = next_parent_id;
        self.parent_resources.extend(new_parents);
    }

    fn declare_used_resources_from_child(&mut self, child: ChildId, used: &HashSet<ResourceId>) {
        let entry = self.child_mut(child);
        let unused: Vec<ResourceId> = entry
            .imported
            .keys()
            .filter(|id| !used.contains(*id))
            .copied()
            .collect();
        let mut freed_parents = Vec::with_capacity(unused.len());
        let mut returned = Vec::with_capacity(unused.len());
        for id in unused {
            if let Some(imported) = entry.imported.get(&id) {
                freed_parents.push(imported.parent_id);
            }
            returned.extend(entry.take(id));
        }
        if !returned.is_empty() {
            (entry.return_callback)(&returned);
        }
        for parent_id in freed_parents {
            self.parent_resources.remove(&parent_id);
        }
    }

    fn child_to_parent_map(&self, child: ChildId) -> &HashMap<ResourceId, ResourceId> {
        &self
            .children
            .get(&child)
            .unwrap_or_else(|| panic!("unknown resource child {child:?}"))
            .child_to_parent
    }
}
