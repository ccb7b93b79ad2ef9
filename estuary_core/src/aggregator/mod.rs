// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Surface aggregation: flattening a tree of embedded surfaces into one frame.
//!
//! [`SurfaceAggregator::aggregate`] runs in two phases over the surfaces
//! reachable from a root:
//!
//! 1. **Prewalk.** Every reachable surface is visited once per embedding. Its
//!    resources are imported into the [`ResourceProvider`] and validated, and
//!    its damage is computed from how far its frame index moved since the
//!    previous aggregation. Child damage is mapped into the parent's space and
//!    folded in, producing the root damage.
//! 2. **Copy.** The root frame's passes are copied into a fresh pass list.
//!    Surface-content quads are expanded in place: an opaque embedded
//!    surface without copy requests has its root pass merged into the
//!    embedding pass, anything else is drawn through a render-pass quad. Pass
//!    ids are remapped into one shared space and resource ids are rewritten
//!    to the provider's parent ids.
//!
//! Invalid input never fails the aggregation. A cycle, a missing or frameless
//! surface, or a surface referencing resources it never sent simply
//! contributes nothing, and any copy requests it carried are answered empty.

mod copy;
mod pass_ids;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::mem;

use hashbrown::{HashMap, HashSet};
use kurbo::{Affine, Rect};

use crate::frame::{
    CompositorFrame, CopyOutputRequest, Material, RenderPass, RenderPassId, ReturnedResource,
};
use crate::geometry::{map_enclosing_rect, union_damage};
use crate::resource_provider::{ChildId, ResourceProvider};
use crate::surface::{Surface, SurfaceDrawStatus, SurfaceId, SurfaceManager};
use crate::trace::{AggregateEvent, Tracer};

use copy::PassCopier;
use pass_ids::PassIdRemapper;

/// Aggregation settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AggregatorSettings {
    /// Skip quads that do not intersect the root damage, unless some pass
    /// carries a copy request.
    pub aggregate_only_damaged: bool,
}

impl AggregatorSettings {
    /// Copies every quad.
    pub const DEFAULT: Self = Self {
        aggregate_only_damaged: false,
    };
}

type CopyRequests = HashMap<RenderPassId, Vec<CopyOutputRequest>>;

/// State of one [`SurfaceAggregator::aggregate`] call.
///
/// Unclaimed copy requests are answered empty when the context is dropped.
#[derive(Default)]
struct AggregationContext {
    /// Surfaces on the current recursion path.
    stack: HashSet<SurfaceId>,
    /// Frame index of every surface reached, 0 for missing surfaces.
    contained: HashMap<SurfaceId, u32>,
    /// Surfaces whose resources all resolved.
    valid: HashSet<SurfaceId>,
    copy_requests: HashMap<SurfaceId, CopyRequests>,
    /// How often each surface was expanded during the copy phase.
    embeddings: HashMap<SurfaceId, u32>,
    root_damage: Rect,
    has_copy_requests: bool,
    dest_passes: Vec<RenderPass>,
}

impl AggregationContext {
    fn next_embedding(&mut self, id: SurfaceId) -> u32 {
        let count = self.embeddings.entry(id).or_default();
        let embedding = *count;
        *count += 1;
        embedding
    }
}

/// Damage of a surface's own root pass given the frame index it had at the
/// previous aggregation.
fn damage_rect_for_surface(frame_index: u32, previous: Option<u32>, root_pass: &RenderPass) -> Rect {
    match previous {
        Some(previous) if previous == frame_index => Rect::ZERO,
        Some(previous) if previous.wrapping_add(1) == frame_index => root_pass.damage_rect,
        _ => root_pass.output_rect,
    }
}

/// Flattens surface trees into single frames.
///
/// The aggregator keeps state between calls: the frame index of every
/// surface it reached last time (for damage), one resource-provider child
/// per surface, and the pass-id mapping.
pub struct SurfaceAggregator {
    provider: Box<dyn ResourceProvider>,
    settings: AggregatorSettings,
    children: HashMap<SurfaceId, ChildId>,
    previous_contained: HashMap<SurfaceId, u32>,
    pass_ids: PassIdRemapper,
    tracer: Tracer,
}

impl fmt::Debug for SurfaceAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceAggregator")
            .field("settings", &self.settings)
            .field("children", &self.children.len())
            .field("previous_contained", &self.previous_contained)
            .finish_non_exhaustive()
    }
}

impl SurfaceAggregator {
    /// Creates an aggregator importing resources into `provider`.
    #[must_use]
    pub fn new(provider: Box<dyn ResourceProvider>, settings: AggregatorSettings) -> Self {
        Self {
            provider,
            settings,
            children: HashMap::new(),
            previous_contained: HashMap::new(),
            pass_ids: PassIdRemapper::default(),
            tracer: Tracer::none(),
        }
    }

    /// Installs a tracer.
    pub fn set_tracer(&mut self, tracer: Tracer) {
        self.tracer = tracer;
    }

    /// Returns the settings.
    #[must_use]
    pub fn settings(&self) -> AggregatorSettings {
        self.settings
    }

    /// Returns the provider holding the imported resources.
    #[must_use]
    pub fn resource_provider(&self) -> &dyn ResourceProvider {
        &*self.provider
    }

    /// Returns the surfaces reached by the last successful aggregation, with
    /// the frame index each had.
    #[must_use]
    pub fn previous_contained_surfaces(&self) -> &HashMap<SurfaceId, u32> {
        &self.previous_contained
    }

    /// Makes `id` contribute its full output rect as damage next time.
    pub fn set_full_damage_for_surface(&mut self, id: SurfaceId) {
        if let Some(index) = self.previous_contained.get_mut(&id) {
            *index = 0;
        }
    }

    /// Returns every resource imported from `id` to its producer.
    pub fn release_resources(&mut self, id: SurfaceId) {
        if let Some(&child) = self.children.get(&id) {
            self.provider
                .declare_used_resources_from_child(child, &HashSet::new());
        }
    }

    /// Builds one frame from the tree rooted at `root`.
    ///
    /// Returns `None` if the root has no frame or nothing could be copied.
    /// Draw callbacks of surfaces reached last time but not this time run as
    /// skipped.
    pub fn aggregate(&mut self, manager: &mut SurfaceManager, root: SurfaceId) -> Option<CompositorFrame> {
        let device_scale_factor = manager
            .surface_for_id(root)?
            .eligible_frame()?
            .metadata
            .device_scale_factor;

        let mut ctx = AggregationContext::default();
        ctx.root_damage = self.prewalk(manager, &mut ctx, root);
        for &id in ctx.contained.keys() {
            let Some(surface) = manager.surface_for_id_mut(id) else {
                continue;
            };
            let mut requests = HashMap::new();
            surface.take_copy_output_requests(&mut requests);
            if !requests.is_empty() {
                ctx.copy_requests.insert(id, requests);
            }
        }

        PassCopier {
            manager,
            provider: &*self.provider,
            children: &self.children,
            pass_ids: &mut self.pass_ids,
            cull: self.settings.aggregate_only_damaged && !ctx.has_copy_requests,
            ctx: &mut ctx,
        }
        .copy_root(root);
        self.pass_ids.end_aggregation();

        let mut passes = mem::take(&mut ctx.dest_passes);
        let last = passes.last_mut()?;
        last.damage_rect = ctx.root_damage;

        self.remove_unreferenced_children(manager, &ctx.contained);
        self.previous_contained = mem::take(&mut ctx.contained);

        let mut frame = CompositorFrame::new(passes);
        frame.metadata.device_scale_factor = device_scale_factor;
        let mut contained: Vec<SurfaceId> = self.previous_contained.keys().copied().collect();
        contained.sort_unstable();
        for id in contained {
            if let Some(surface) = manager.surface_for_id_mut(id) {
                surface.take_latency_info(&mut frame.metadata.latency_info);
            }
        }

        self.tracer.aggregate(&AggregateEvent {
            root,
            surfaces: u32::try_from(self.previous_contained.len()).unwrap_or(u32::MAX),
            passes: u32::try_from(frame.render_pass_list.len()).unwrap_or(u32::MAX),
            damage: ctx.root_damage.into(),
            has_copy_requests: ctx.has_copy_requests,
        });
        Some(frame)
    }

    /// Visits `id` and its embedded surfaces, returning the damage of the
    /// subtree in `id`'s root space.
    fn prewalk(&mut self, manager: &SurfaceManager, ctx: &mut AggregationContext, id: SurfaceId) -> Rect {
        if ctx.stack.contains(&id) {
            return Rect::ZERO;
        }
        let Some(surface) = manager.surface_for_id(id) else {
            ctx.contained.insert(id, 0);
            return Rect::ZERO;
        };
        ctx.contained.insert(id, surface.frame_index());
        let Some(frame) = surface.eligible_frame() else {
            return Rect::ZERO;
        };
        let Some(root_pass) = frame.root_pass() else {
            return Rect::ZERO;
        };

        let child = self.child_for_surface(surface);
        surface.factory().ref_resources(&frame.resource_list);
        self.provider.receive_from_child(child, &frame.resource_list);

        let child_to_parent = self.provider.child_to_parent_map(child);
        let mut used = HashSet::new();
        let mut invalid = false;
        let mut embedded: Vec<(SurfaceId, Affine)> = Vec::new();
        for pass in &frame.render_pass_list {
            for quad in &pass.quad_list {
                if let Material::SurfaceContent { surface_id } = quad.material {
                    let sqs = pass.shared_quad_state_of(quad);
                    embedded.push((
                        surface_id,
                        pass.transform_to_root_target * sqs.quad_to_target_transform,
                    ));
                }
                quad.for_each_resource(|resource| {
                    if child_to_parent.contains_key(&resource) {
                        used.insert(resource);
                    } else {
                        invalid = true;
                    }
                });
            }
        }
        if invalid {
            return Rect::ZERO;
        }
        ctx.valid.insert(id);
        self.provider.declare_used_resources_from_child(child, &used);

        let previous = self.previous_contained.get(&id).copied();
        let mut damage = damage_rect_for_surface(surface.frame_index(), previous, root_pass);
        #[cfg(feature = "trace-rich")]
        self.tracer.surface_damage(&crate::trace::SurfaceDamageEvent {
            surface: id,
            frame_index: surface.frame_index(),
            damage: damage.into(),
        });
        ctx.has_copy_requests |= frame.has_copy_requests();

        ctx.stack.insert(id);
        for (child_id, transform) in embedded {
            let child_damage = self.prewalk(manager, ctx, child_id);
            damage = union_damage(damage, map_enclosing_rect(transform, child_damage));
        }
        ctx.stack.remove(&id);

        surface.factory().will_draw_surface(id, damage);
        damage
    }

    fn child_for_surface(&mut self, surface: &Surface) -> ChildId {
        if let Some(&child) = self.children.get(&surface.id()) {
            return child;
        }
        let handle = surface.factory().clone();
        let child = self
            .provider
            .create_child(Box::new(move |returned: &[ReturnedResource]| {
                handle.unref_resources(returned);
            }));
        self.children.insert(surface.id(), child);
        child
    }

    fn remove_unreferenced_children(
        &mut self,
        manager: &mut SurfaceManager,
        contained: &HashMap<SurfaceId, u32>,
    ) {
        for id in self.previous_contained.keys() {
            if contained.contains_key(id) {
                continue;
            }
            if let Some(child) = self.children.remove(id) {
                self.provider.destroy_child(child);
            }
            if let Some(surface) = manager.surface_for_id_mut(*id) {
                surface.run_draw_callbacks(SurfaceDrawStatus::DrawSkipped);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::vec;
    use core::cell::RefCell;

    use kurbo::{Size, Vec2};

    use super::*;
    use crate::frame::{CopyOutputResult, DrawQuad, ResourceId, SharedQuadState, TransferableResource};
    use crate::resource_provider::ChildResourceProvider;
    use crate::surface::testing::RecordingClient;
    use crate::surface::{DrawCallback, SurfaceDamageObserver, SurfaceFactory, SurfaceFactoryClient};

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
        aggregator: SurfaceAggregator,
        _observer: Rc<RefCell<dyn SurfaceDamageObserver>>,
    }

    fn fixture(settings: AggregatorSettings) -> Fixture {
        let client = Rc::new(RefCell::new(RecordingClient::default()));
        let manager = Rc::new(RefCell::new(SurfaceManager::new()));
        manager.borrow_mut().register_surface_id_namespace(1);
        let observer: Rc<RefCell<dyn SurfaceDamageObserver>> = Rc::new(RefCell::new(AlwaysVisible));
        manager.borrow_mut().add_observer(&observer);
        let factory = SurfaceFactory::new(manager.clone(), client.clone() as Rc<RefCell<dyn SurfaceFactoryClient>>);
        Fixture {
            client,
            manager,
            factory,
            aggregator: SurfaceAggregator::new(Box::new(ChildResourceProvider::new()), settings),
            _observer: observer,
        }
    }

    impl Fixture {
        fn surface(&mut self, local: u32) -> SurfaceId {
            let id = SurfaceId::new(1, local);
            self.factory.create(id);
            id
        }

        fn submit(&mut self, id: SurfaceId, frame: CompositorFrame) {
            self.factory.submit_compositor_frame(id, frame, None);
        }

        fn aggregate(&mut self, root: SurfaceId) -> Option<CompositorFrame> {
            self.aggregator.aggregate(&mut self.manager.borrow_mut(), root)
        }
    }

    const BOUNDS: Rect = Rect::new(0.0, 0.0, 100.0, 100.0);

    fn pass(id: u64, damage: Rect) -> RenderPass {
        let mut pass = RenderPass::new(RenderPassId(id), BOUNDS, damage, Affine::IDENTITY);
        _ = pass.push_shared_quad_state(SharedQuadState::new(Affine::IDENTITY, BOUNDS.size()));
        pass
    }

    fn solid(pass: &mut RenderPass) {
        pass.push_quad(DrawQuad::solid_color(0, BOUNDS, [1.0, 0.0, 0.0, 1.0]));
    }

    fn embed(pass: &mut RenderPass, child: SurfaceId, transform: Affine, opacity: f32) {
        let sqs = pass.push_shared_quad_state(
            SharedQuadState::new(transform, Size::new(100.0, 100.0)).with_opacity(opacity),
        );
        pass.push_quad(DrawQuad::surface(sqs, BOUNDS, child));
    }

    fn pass_ids(frame: &CompositorFrame) -> Vec<RenderPassId> {
        frame.render_pass_list.iter().map(|pass| pass.id).collect()
    }

    #[test]
    fn missing_root_aggregates_nothing() {
        let mut f = fixture(AggregatorSettings::DEFAULT);
        let root = f.surface(1);
        assert!(f.aggregate(root).is_none(), "root without a frame");
        assert!(f.aggregate(SurfaceId::new(1, 99)).is_none(), "unknown root");
    }

    #[test]
    fn first_aggregation_is_fully_damaged() {
        let mut f = fixture(AggregatorSettings::DEFAULT);
        let root = f.surface(1);
        let mut root_pass = pass(1, Rect::new(10.0, 10.0, 20.0, 20.0));
        solid(&mut root_pass);
        f.submit(root, CompositorFrame::new(vec![root_pass]));

        let frame = f.aggregate(root).expect("frame");
        assert_eq!(frame.render_pass_list.len(), 1);
        assert_eq!(frame.render_pass_list[0].damage_rect, BOUNDS, "unseen surfaces damage fully");

        let frame = f.aggregate(root).expect("frame");
        assert_eq!(
            frame.render_pass_list[0].damage_rect,
            Rect::ZERO,
            "unchanged frame index means no damage"
        );
        assert_eq!(frame.render_pass_list[0].quad_list.len(), 1, "quads are still copied");
    }

    #[test]
    fn child_damage_is_translated_into_the_root() {
        let mut f = fixture(AggregatorSettings::DEFAULT);
        let root = f.surface(1);
        let child = f.surface(2);
        let mut child_pass = pass(1, BOUNDS);
        solid(&mut child_pass);
        f.submit(child, CompositorFrame::new(vec![child_pass]));
        let mut root_pass = pass(1, BOUNDS);
        embed(&mut root_pass, child, Affine::translate(Vec2::new(30.0, 40.0)), 1.0);
        f.submit(root, CompositorFrame::new(vec![root_pass]));
        _ = f.aggregate(root).expect("frame");

        let mut child_pass = pass(1, Rect::new(5.0, 5.0, 15.0, 10.0));
        solid(&mut child_pass);
        f.submit(child, CompositorFrame::new(vec![child_pass]));
        let frame = f.aggregate(root).expect("frame");
        assert_eq!(
            frame.render_pass_list.last().map(|pass| pass.damage_rect),
            Some(Rect::new(35.0, 45.0, 45.0, 50.0)),
            "child damage moved by the embedding translation"
        );
    }

    #[test]
    fn newly_embedded_child_damages_its_whole_output() {
        let mut f = fixture(AggregatorSettings::DEFAULT);
        let root = f.surface(1);
        let child = f.surface(2);
        let mut root_pass = pass(1, BOUNDS);
        solid(&mut root_pass);
        f.submit(root, CompositorFrame::new(vec![root_pass]));
        _ = f.aggregate(root).expect("frame");

        let child_bounds = Rect::new(0.0, 0.0, 20.0, 20.0);
        let mut child_pass = RenderPass::new(
            RenderPassId(1),
            child_bounds,
            Rect::new(5.0, 5.0, 10.0, 10.0),
            Affine::IDENTITY,
        );
        let sqs = child_pass.push_shared_quad_state(SharedQuadState::new(
            Affine::IDENTITY,
            child_bounds.size(),
        ));
        child_pass.push_quad(DrawQuad::solid_color(sqs, child_bounds, [0.0, 1.0, 0.0, 1.0]));
        f.submit(child, CompositorFrame::new(vec![child_pass]));

        let mut root_pass = pass(1, Rect::new(0.0, 0.0, 1.0, 1.0));
        solid(&mut root_pass);
        embed(&mut root_pass, child, Affine::translate(Vec2::new(30.0, 40.0)), 1.0);
        f.submit(root, CompositorFrame::new(vec![root_pass]));

        let frame = f.aggregate(root).expect("frame");
        assert_eq!(
            frame.render_pass_list.last().map(|pass| pass.damage_rect),
            Some(Rect::new(0.0, 0.0, 50.0, 60.0)),
            "the child's whole output rect lands in root damage, not its reported damage"
        );
    }

    #[test]
    fn opaque_child_merges_and_translucent_child_gets_a_pass() {
        let mut f = fixture(AggregatorSettings::DEFAULT);
        let root = f.surface(1);
        let opaque = f.surface(2);
        let translucent = f.surface(3);
        for child in [opaque, translucent] {
            let mut child_pass = pass(1, BOUNDS);
            solid(&mut child_pass);
            f.submit(child, CompositorFrame::new(vec![child_pass]));
        }
        let mut root_pass = pass(1, BOUNDS);
        embed(&mut root_pass, opaque, Affine::IDENTITY, 1.0);
        embed(&mut root_pass, translucent, Affine::IDENTITY, 0.5);
        f.submit(root, CompositorFrame::new(vec![root_pass]));

        let frame = f.aggregate(root).expect("frame");
        assert_eq!(frame.render_pass_list.len(), 2, "translucent child's pass plus the root");
        let root_out = frame.render_pass_list.last().expect("root pass");
        assert_eq!(root_out.quad_list.len(), 2, "merged solid quad and one render-pass quad");
        assert!(
            matches!(root_out.quad_list[0].material, Material::SolidColor { .. }),
            "opaque child drawn in place"
        );
        assert_eq!(
            root_out.quad_list[1].material,
            Material::RenderPass {
                render_pass_id: frame.render_pass_list[0].id,
                mask_resource_id: None,
            },
            "translucent child drawn through its own pass"
        );
        assert!(
            root_out
                .quad_list
                .iter()
                .all(|quad| quad.shared_quad_state < root_out.shared_quad_state_list.len()),
            "every quad has its state"
        );
    }

    #[test]
    fn colliding_local_pass_ids_stay_unique() {
        let mut f = fixture(AggregatorSettings::DEFAULT);
        let root = f.surface(1);
        let child = f.surface(2);
        let mut inner = pass(1, BOUNDS);
        solid(&mut inner);
        let mut child_root = pass(2, BOUNDS);
        child_root.push_quad(DrawQuad::render_pass(0, BOUNDS, RenderPassId(1)));
        f.submit(child, CompositorFrame::new(vec![inner, child_root]));

        let mut root_inner = pass(1, BOUNDS);
        solid(&mut root_inner);
        let mut root_pass = pass(2, BOUNDS);
        root_pass.push_quad(DrawQuad::render_pass(0, BOUNDS, RenderPassId(1)));
        embed(&mut root_pass, child, Affine::IDENTITY, 0.5);
        embed(&mut root_pass, child, Affine::translate(Vec2::new(50.0, 0.0)), 0.5);
        f.submit(root, CompositorFrame::new(vec![root_inner, root_pass]));

        let frame = f.aggregate(root).expect("frame");
        let ids = pass_ids(&frame);
        assert_eq!(ids.len(), 6, "root's two passes plus two per embedding");
        let unique: HashSet<_> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len(), "ids {ids:?} must not repeat");

        let referenced: HashSet<RenderPassId> = frame
            .render_pass_list
            .iter()
            .flat_map(|pass| pass.quad_list.iter())
            .filter_map(|quad| match quad.material {
                Material::RenderPass { render_pass_id, .. } => Some(render_pass_id),
                _ => None,
            })
            .collect();
        assert!(referenced.is_subset(&unique), "render-pass quads point at emitted passes");
    }

    #[test]
    fn cycles_are_dropped() {
        let mut f = fixture(AggregatorSettings::DEFAULT);
        let root = f.surface(1);
        let mut root_pass = pass(1, BOUNDS);
        solid(&mut root_pass);
        embed(&mut root_pass, root, Affine::IDENTITY, 1.0);
        solid(&mut root_pass);
        f.submit(root, CompositorFrame::new(vec![root_pass]));
        let with_cycle = f.aggregate(root).expect("frame");

        let mut g = fixture(AggregatorSettings::DEFAULT);
        let root = g.surface(1);
        let mut root_pass = pass(1, BOUNDS);
        solid(&mut root_pass);
        solid(&mut root_pass);
        g.submit(root, CompositorFrame::new(vec![root_pass]));
        let without = g.aggregate(root).expect("frame");

        let a = &with_cycle.render_pass_list[0];
        let b = &without.render_pass_list[0];
        assert_eq!(a.quad_list, b.quad_list, "the self-embedding quad is simply gone");
        assert_eq!(a.damage_rect, b.damage_rect);
        assert_eq!(with_cycle.render_pass_list.len(), without.render_pass_list.len());
    }

    #[test]
    fn unresolved_resources_invalidate_the_surface() {
        let mut f = fixture(AggregatorSettings::DEFAULT);
        let root = f.surface(1);
        let child = f.surface(2);
        let mut child_pass = pass(1, BOUNDS);
        child_pass.push_quad(DrawQuad::texture(0, BOUNDS, ResourceId(77)));
        f.submit(child, CompositorFrame::new(vec![child_pass]));
        let answered = Rc::new(RefCell::new(Vec::<CopyOutputResult>::new()));
        let sink = answered.clone();
        f.factory.request_copy_of_surface(
            child,
            CopyOutputRequest::new(move |result| sink.borrow_mut().push(result)),
        );

        let mut root_pass = pass(1, BOUNDS);
        solid(&mut root_pass);
        embed(&mut root_pass, child, Affine::IDENTITY, 1.0);
        f.submit(root, CompositorFrame::new(vec![root_pass]));

        let frame = f.aggregate(root).expect("frame");
        assert_eq!(frame.render_pass_list.len(), 1, "nothing copied from the child");
        assert_eq!(frame.render_pass_list[0].quad_list.len(), 1, "only the root's own quad");
        assert_eq!(answered.borrow().len(), 1, "copy request answered");
        assert!(answered.borrow()[0].is_empty(), "with an empty result");
    }

    #[test]
    fn resources_are_remapped_and_returned() {
        let mut f = fixture(AggregatorSettings::DEFAULT);
        let root = f.surface(1);
        let mut root_pass = pass(1, BOUNDS);
        root_pass.push_quad(DrawQuad::texture(0, BOUNDS, ResourceId(7)));
        let mut frame = CompositorFrame::new(vec![root_pass]);
        frame.resource_list = vec![TransferableResource::new(ResourceId(7), Size::new(4.0, 4.0))];
        f.submit(root, frame);

        let out = f.aggregate(root).expect("frame");
        let mut seen = Vec::new();
        out.render_pass_list[0].quad_list[0].for_each_resource(|id| seen.push(id));
        assert_eq!(seen, [ResourceId(1)], "parent ids start at 1");
        _ = f.aggregate(root).expect("frame");
        assert_eq!(f.client.borrow().return_calls, 0, "still in use");

        let mut empty = pass(1, BOUNDS);
        solid(&mut empty);
        f.submit(root, CompositorFrame::new(vec![empty]));
        _ = f.aggregate(root).expect("frame");
        let client = f.client.borrow();
        assert_eq!(client.returned.get(&ResourceId(7)), Some(&1), "returned once, as received once");
        assert!(
            f.manager.borrow().surface_for_id(root).is_some(),
            "the surface itself is unaffected"
        );
    }

    #[test]
    fn copy_requests_land_on_their_pass() {
        let mut f = fixture(AggregatorSettings {
            aggregate_only_damaged: true,
        });
        let root = f.surface(1);
        let child = f.surface(2);
        let mut child_pass = pass(1, BOUNDS);
        solid(&mut child_pass);
        f.submit(child, CompositorFrame::new(vec![child_pass]));
        let mut root_pass = pass(1, BOUNDS);
        embed(&mut root_pass, child, Affine::IDENTITY, 1.0);
        f.submit(root, CompositorFrame::new(vec![root_pass]));
        _ = f.aggregate(root).expect("frame");

        f.factory
            .request_copy_of_surface(child, CopyOutputRequest::new(|_| {}));
        let frame = f.aggregate(root).expect("frame");
        assert_eq!(frame.render_pass_list.len(), 2, "copied child is not merged");
        assert_eq!(frame.render_pass_list[0].copy_requests.len(), 1);
        assert_eq!(
            frame.render_pass_list[0].quad_list.len(),
            1,
            "no culling while a copy request is pending"
        );
    }

    #[test]
    fn undamaged_quads_are_culled() {
        let mut f = fixture(AggregatorSettings {
            aggregate_only_damaged: true,
        });
        let root = f.surface(1);
        let build = |damage: Rect| {
            let mut root_pass = pass(1, damage);
            let left = root_pass.push_shared_quad_state(SharedQuadState::new(
                Affine::IDENTITY,
                Size::new(50.0, 100.0),
            ));
            root_pass.push_quad(DrawQuad::solid_color(left, Rect::new(0.0, 0.0, 50.0, 100.0), [1.0; 4]));
            let right = root_pass.push_shared_quad_state(SharedQuadState::new(
                Affine::translate(Vec2::new(50.0, 0.0)),
                Size::new(50.0, 100.0),
            ));
            root_pass.push_quad(DrawQuad::solid_color(right, Rect::new(0.0, 0.0, 50.0, 100.0), [1.0; 4]));
            CompositorFrame::new(vec![root_pass])
        };
        f.submit(root, build(BOUNDS));
        assert_eq!(f.aggregate(root).expect("frame").render_pass_list[0].quad_list.len(), 2);

        f.submit(root, build(Rect::new(60.0, 10.0, 70.0, 20.0)));
        let frame = f.aggregate(root).expect("frame");
        let quads = &frame.render_pass_list[0].quad_list;
        assert_eq!(quads.len(), 1, "only the damaged half survives");
        assert_eq!(
            frame.render_pass_list[0].shared_quad_state_of(&quads[0]).quad_to_target_transform,
            Affine::translate(Vec2::new(50.0, 0.0))
        );
    }

    #[test]
    fn unreferenced_children_are_released() {
        let mut f = fixture(AggregatorSettings::DEFAULT);
        let root = f.surface(1);
        let child = f.surface(2);
        let mut child_pass = pass(1, BOUNDS);
        solid(&mut child_pass);
        let skipped = Rc::new(RefCell::new(Vec::new()));
        let sink = skipped.clone();
        let callback: DrawCallback = Box::new(move |status| sink.borrow_mut().push(status));
        f.factory
            .submit_compositor_frame(child, CompositorFrame::new(vec![child_pass]), Some(callback));
        let mut root_pass = pass(1, BOUNDS);
        embed(&mut root_pass, child, Affine::IDENTITY, 1.0);
        f.submit(root, CompositorFrame::new(vec![root_pass]));
        _ = f.aggregate(root).expect("frame");
        assert!(
            f.aggregator.previous_contained_surfaces().contains_key(&child),
            "child reached"
        );

        let mut root_pass = pass(1, BOUNDS);
        solid(&mut root_pass);
        f.submit(root, CompositorFrame::new(vec![root_pass]));
        _ = f.aggregate(root).expect("frame");
        assert!(
            !f.aggregator.previous_contained_surfaces().contains_key(&child),
            "child no longer reached"
        );
        assert_eq!(*skipped.borrow(), [SurfaceDrawStatus::DrawSkipped]);
    }

    #[test]
    fn full_damage_can_be_forced() {
        let mut f = fixture(AggregatorSettings::DEFAULT);
        let root = f.surface(1);
        let mut root_pass = pass(1, Rect::new(1.0, 1.0, 2.0, 2.0));
        solid(&mut root_pass);
        f.submit(root, CompositorFrame::new(vec![root_pass]));
        _ = f.aggregate(root).expect("frame");
        f.aggregator.set_full_damage_for_surface(root);
        let frame = f.aggregate(root).expect("frame");
        assert_eq!(frame.render_pass_list[0].damage_rect, BOUNDS);
    }
}
