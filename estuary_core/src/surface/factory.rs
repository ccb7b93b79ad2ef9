// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Producer-facing surface lifecycle.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use crate::frame::{CompositorFrame, CopyOutputRequest, ReturnedResource, TransferableResource};

use super::{
    DrawCallback, FactoryHandle, Surface, SurfaceDrawStatus, SurfaceFactoryClient, SurfaceId,
    SurfaceManager, SurfaceResourceHolder,
};

/// Creates, feeds, and destroys the surfaces of one producer.
///
/// Surfaces live in the shared [`SurfaceManager`]; the factory remembers
/// which ids it created and owns the resource ledger those surfaces report
/// to. Dropping the factory destroys every surface it still owns.
///
/// Producer callbacks (draw callbacks and
/// [`SurfaceFactoryClient::return_resources`]) may run while the manager is
/// borrowed and must not re-enter it.
pub struct SurfaceFactory {
    manager: Rc<RefCell<SurfaceManager>>,
    holder: Rc<RefCell<SurfaceResourceHolder>>,
    surfaces: Vec<SurfaceId>,
}

impl fmt::Debug for SurfaceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceFactory")
            .field("surfaces", &self.surfaces)
            .field("holder", &self.holder)
            .finish_non_exhaustive()
    }
}

impl SurfaceFactory {
    /// Creates a factory registering surfaces with `manager` and returning
    /// resources to `client`.
    #[must_use]
    pub fn new(
        manager: Rc<RefCell<SurfaceManager>>,
        client: Rc<RefCell<dyn SurfaceFactoryClient>>,
    ) -> Self {
        Self {
            manager,
            holder: Rc::new(RefCell::new(SurfaceResourceHolder::new(client))),
            surfaces: Vec::new(),
        }
    }

    /// Returns the manager this factory registers with.
    #[must_use]
    pub fn manager(&self) -> &Rc<RefCell<SurfaceManager>> {
        &self.manager
    }

    /// Returns the ids of the surfaces this factory owns.
    #[must_use]
    pub fn surfaces(&self) -> &[SurfaceId] {
        &self.surfaces
    }

    /// Creates an empty surface.
    ///
    /// # Panics
    ///
    /// Panics if `id` is already registered with the manager.
    pub fn create(&mut self, id: SurfaceId) {
        let surface = Surface::new(id, FactoryHandle::new(&self.holder));
        self.manager.borrow_mut().register_surface(surface);
        self.surfaces.push(id);
    }

    /// Hands a surface to the manager for destruction.
    ///
    /// The surface is freed once nothing depends on it; its pending draw
    /// callback then runs as skipped.
    ///
    /// # Panics
    ///
    /// Panics if this factory does not own `id`.
    pub fn destroy(&mut self, id: SurfaceId) {
        let index = self.index_of(id);
        self.surfaces.remove(index);
        self.manager.borrow_mut().destroy(id);
    }

    /// Destroys every owned surface.
    pub fn destroy_all(&mut self) {
        for id in core::mem::take(&mut self.surfaces) {
            self.manager.borrow_mut().destroy(id);
        }
    }

    /// Queues `frame` on surface `id`.
    ///
    /// If no damage observer will draw the change, `callback` runs as skipped
    /// at once so the producer is not stalled by an invisible surface.
    ///
    /// # Panics
    ///
    /// Panics if this factory does not own `id`.
    pub fn submit_compositor_frame(
        &mut self,
        id: SurfaceId,
        frame: CompositorFrame,
        callback: Option<DrawCallback>,
    ) {
        _ = self.index_of(id);
        {
            let mut manager = self.manager.borrow_mut();
            let surface = manager
                .surface_for_id_mut(id)
                .unwrap_or_else(|| panic!("surface {id:?} is not registered"));
            let mut queued = surface.queue_frame(frame, callback);
            if queued.needs_collection() {
                manager.did_satisfy_sequences(id.namespace(), &mut queued.satisfies_sequences);
            }
        }
        if !self.manager.borrow().surface_modified(id) {
            self.run_draw_callback(id, SurfaceDrawStatus::DrawSkipped);
        }
    }

    /// Asks for a capture of surface `id`'s next drawn output.
    ///
    /// Unknown surfaces answer the request empty at once.
    pub fn request_copy_of_surface(&mut self, id: SurfaceId, request: CopyOutputRequest) {
        {
            let mut manager = self.manager.borrow_mut();
            let Some(surface) = manager.surface_for_id_mut(id) else {
                drop(manager);
                request.send_empty_result();
                return;
            };
            surface.request_copy_of_output(request);
        }
        _ = self.manager.borrow().surface_modified(id);
    }

    /// Records that the producer sent `resources`.
    pub fn receive_from_child(&mut self, resources: &[TransferableResource]) {
        self.holder.borrow_mut().receive_from_child(resources);
    }

    /// Takes one more reference to each of `resources`.
    pub fn ref_resources(&mut self, resources: &[TransferableResource]) {
        self.holder.borrow_mut().ref_resources(resources);
    }

    /// Drops references, returning resources that reach zero to the client.
    pub fn unref_resources(&mut self, resources: &[ReturnedResource]) {
        FactoryHandle::new(&self.holder).unref_resources(resources);
    }

    fn run_draw_callback(&self, id: SurfaceId, status: SurfaceDrawStatus) {
        let callback = self
            .manager
            .borrow_mut()
            .surface_for_id_mut(id)
            .and_then(Surface::take_draw_callback);
        if let Some(callback) = callback {
            callback(status);
        }
    }

    fn index_of(&self, id: SurfaceId) -> usize {
        self.surfaces
            .iter()
            .position(|owned| *owned == id)
            .unwrap_or_else(|| panic!("surface {id:?} is not owned by this factory"))
    }
}

impl Drop for SurfaceFactory {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;

    use kurbo::{Affine, Rect};

    use super::super::resources::testing::{RecordingClient, resources};
    use super::super::{SurfaceDamageObserver, SurfaceSequence};
    use super::*;
    use crate::frame::{CopyOutputResult, RenderPass, RenderPassId, ResourceId};

    struct AlwaysVisible;

    impl SurfaceDamageObserver for AlwaysVisible {
        fn on_surface_damaged(&mut self, _id: SurfaceId, changed: &mut bool) {
            *changed = true;
        }
    }

    struct Fixture {
        client: Rc<RefCell<RecordingClient>>,
        manager: Rc<RefCell<SurfaceManager>>,
        factory: SurfaceFactory,
        _observer: Option<Rc<RefCell<dyn SurfaceDamageObserver>>>,
    }

    fn fixture(visible: bool) -> Fixture {
        let client = Rc::new(RefCell::new(RecordingClient::default()));
        let manager = Rc::new(RefCell::new(SurfaceManager::new()));
        manager.borrow_mut().register_surface_id_namespace(1);
        let observer = visible.then(|| {
            let observer: Rc<RefCell<dyn SurfaceDamageObserver>> =
                Rc::new(RefCell::new(AlwaysVisible));
            manager.borrow_mut().add_observer(&observer);
            observer
        });
        let factory = SurfaceFactory::new(manager.clone(), client.clone());
        Fixture {
            client,
            manager,
            factory,
            _observer: observer,
        }
    }

    fn frame_with(ids: &[u32]) -> CompositorFrame {
        let rect = Rect::new(0.0, 0.0, 5.0, 5.0);
        let mut frame =
            CompositorFrame::new(alloc::vec![RenderPass::new(RenderPassId(1), rect, rect, Affine::IDENTITY)]);
        frame.resource_list = resources(ids);
        frame
    }

    fn skipped_log() -> (Rc<RefCell<Vec<SurfaceDrawStatus>>>, DrawCallback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        (log, Box::new(move |status| sink.borrow_mut().push(status)))
    }

    #[test]
    fn resources_return_once_unreferenced() {
        let mut f = fixture(true);
        let id = SurfaceId::new(1, 1);
        f.factory.create(id);
        f.factory.submit_compositor_frame(id, frame_with(&[1, 2, 3]), None);
        assert_eq!(f.client.borrow().return_calls, 0, "still held by the current frame");

        f.factory.submit_compositor_frame(id, frame_with(&[]), None);
        let client = f.client.borrow();
        assert_eq!(client.return_calls, 1, "one batched return");
        for resource in 1..=3 {
            assert_eq!(client.returned.get(&ResourceId(resource)), Some(&1), "resource {resource}");
        }
    }

    #[test]
    fn overlapping_frames_return_summed_counts() {
        let mut f = fixture(true);
        let id = SurfaceId::new(1, 1);
        f.factory.create(id);
        f.factory.submit_compositor_frame(id, frame_with(&[3, 4]), None);
        f.factory.submit_compositor_frame(id, frame_with(&[4, 5]), None);
        f.factory.submit_compositor_frame(id, frame_with(&[]), None);
        let client = f.client.borrow();
        assert_eq!(client.returned.get(&ResourceId(3)), Some(&1));
        assert_eq!(client.returned.get(&ResourceId(4)), Some(&2), "sent with two frames");
        assert_eq!(client.returned.get(&ResourceId(5)), Some(&1));
    }

    #[test]
    fn extra_refs_delay_the_return() {
        let mut f = fixture(true);
        let id = SurfaceId::new(1, 1);
        f.factory.create(id);
        f.factory.submit_compositor_frame(id, frame_with(&[7]), None);
        f.factory.ref_resources(&resources(&[7]));
        f.factory.submit_compositor_frame(id, frame_with(&[]), None);
        assert!(f.client.borrow().returned.is_empty(), "the extra reference holds it");
        f.factory
            .unref_resources(&[ReturnedResource::new(ResourceId(7), 1)]);
        assert_eq!(f.client.borrow().returned.get(&ResourceId(7)), Some(&1));
    }

    #[test]
    fn invisible_submission_is_skipped_at_once() {
        let mut f = fixture(false);
        let id = SurfaceId::new(1, 1);
        f.factory.create(id);
        let (log, callback) = skipped_log();
        f.factory.submit_compositor_frame(id, frame_with(&[]), Some(callback));
        assert_eq!(*log.borrow(), [SurfaceDrawStatus::DrawSkipped], "no observer draws it");
    }

    #[test]
    fn visible_submission_keeps_its_callback() {
        let mut f = fixture(true);
        let id = SurfaceId::new(1, 1);
        f.factory.create(id);
        let (log, callback) = skipped_log();
        f.factory.submit_compositor_frame(id, frame_with(&[]), Some(callback));
        assert!(log.borrow().is_empty(), "waits for the display");
        f.factory.destroy(id);
        assert_eq!(*log.borrow(), [SurfaceDrawStatus::DrawSkipped], "destroy skips it");
    }

    #[test]
    fn copy_of_unknown_surface_is_answered_empty() {
        let mut f = fixture(true);
        let answered = Rc::new(RefCell::new(None::<CopyOutputResult>));
        let sink = answered.clone();
        f.factory.request_copy_of_surface(
            SurfaceId::new(1, 9),
            CopyOutputRequest::new(move |r| *sink.borrow_mut() = Some(r)),
        );
        assert!(
            answered.borrow().as_ref().is_some_and(CopyOutputResult::is_empty),
            "answered at once with an empty result"
        );
    }

    #[test]
    fn dropping_the_factory_destroys_its_surfaces() {
        let f = fixture(true);
        let manager = f.manager.clone();
        let mut factory = f.factory;
        let kept = SurfaceId::new(1, 1);
        let freed = SurfaceId::new(1, 2);
        factory.create(kept);
        factory.create(freed);
        manager
            .borrow_mut()
            .surface_for_id_mut(kept)
            .unwrap()
            .add_destruction_dependency(SurfaceSequence::new(1, 1));
        drop(factory);
        let manager = manager.borrow();
        assert!(manager.surface_for_id(freed).is_none(), "nothing keeps it");
        assert!(manager.surface_for_id(kept).is_some_and(Surface::destroyed), "waits for 1:1");
    }

    #[test]
    #[should_panic(expected = "is not owned by this factory")]
    fn destroying_a_foreign_surface_panics() {
        let mut f = fixture(true);
        f.factory.destroy(SurfaceId::new(1, 1));
    }
}
