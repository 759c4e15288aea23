use crate::context::{ContextDevice, FontScale, RenderContext};
use crate::scene::VisualScene;
use simrig_common::{MAX_VISUAL_GEOMS, ReleaseObserver, ResourceHandle, ViewerConfig, ViewerKind};
use simrig_kernel::{LoadError, LoadedWorld, SceneSource, WorldModel, WorldState};
use std::sync::Arc;

/// Which optional resources to allocate alongside the model and state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceRequest {
    pub visual_scene: bool,
    pub render_context: bool,
    pub scene_capacity: usize,
    pub font_scale: FontScale,
}

impl ResourceRequest {
    /// Model and state only.
    pub fn headless() -> Self {
        Self {
            visual_scene: false,
            render_context: false,
            scene_capacity: MAX_VISUAL_GEOMS,
            font_scale: FontScale::default(),
        }
    }

    /// Everything a backend of `kind` draws from.
    pub fn for_kind(kind: ViewerKind) -> Self {
        Self {
            visual_scene: kind.needs_visual_scene(),
            render_context: kind.renders_locally(),
            ..Self::headless()
        }
    }

    /// [`for_kind`](Self::for_kind) with the configured overlay scale.
    /// An unsupported percentage falls back to unscaled text.
    pub fn for_viewer(config: &ViewerConfig) -> Self {
        Self {
            font_scale: FontScale::from_percent(config.font_scale).unwrap_or_default(),
            ..Self::for_kind(config.kind)
        }
    }
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self::headless()
    }
}

/// Presentation resources a backend renders from.
///
/// `G` is what the backend built on its graphics device for the render
/// context; `S` is the surface that device presents to.
///
/// # Invariants
/// - Fields drop in declaration order: the render context (with its device
///   objects) goes first, then the surface it was built for, then the
///   visual scene.
pub struct RenderParts<S = (), G = ()> {
    pub render_context: ResourceHandle<RenderContext<G>>,
    pub surface: ResourceHandle<S>,
    pub visual_scene: ResourceHandle<VisualScene>,
}

impl<S, G: Send + 'static> RenderParts<S, G> {
    /// Allocate what `request` asks for. A requested render context is
    /// built on `device`, which must be the device the backend renders with.
    pub fn allocate<D>(
        model: &WorldModel,
        request: &ResourceRequest,
        device: &D,
        observer: Option<Arc<dyn ReleaseObserver>>,
    ) -> Self
    where
        D: ContextDevice<Objects = G> + ?Sized,
    {
        let visual_scene = if request.visual_scene {
            ResourceHandle::tracked(
                VisualScene::new(request.scene_capacity),
                "visual-scene",
                observer.clone(),
            )
        } else {
            ResourceHandle::null()
        };
        let render_context = if request.render_context {
            ResourceHandle::tracked(
                RenderContext::build(model, request.font_scale, device),
                "render-context",
                observer,
            )
        } else {
            ResourceHandle::null()
        };
        Self {
            render_context,
            surface: ResourceHandle::null(),
            visual_scene,
        }
    }

    pub fn none() -> Self {
        Self {
            render_context: ResourceHandle::null(),
            surface: ResourceHandle::null(),
            visual_scene: ResourceHandle::null(),
        }
    }

    /// Replace the model-dependent parts for a newly loaded model.
    /// The surface is kept; the old context is released before the new one
    /// is built.
    pub fn rebuild<D>(
        &mut self,
        model: &WorldModel,
        request: &ResourceRequest,
        device: &D,
        observer: Option<Arc<dyn ReleaseObserver>>,
    ) where
        D: ContextDevice<Objects = G> + ?Sized,
    {
        self.render_context.release();
        self.visual_scene.release();
        let RenderParts {
            render_context,
            visual_scene,
            ..
        } = RenderParts::<(), G>::allocate(model, request, device, observer);
        self.render_context = render_context;
        self.visual_scene = visual_scene;
    }
}

/// Everything a running simulation may need, loaded from one scene source.
///
/// Drop order is render context, surface, visual scene, world state, world
/// model, so nothing outlives what it was built from.
pub struct SceneResources<S = (), G = ()> {
    render: RenderParts<S, G>,
    world: LoadedWorld,
}

impl SceneResources {
    pub fn load(source: &SceneSource, request: &ResourceRequest) -> Result<Self, LoadError> {
        Self::load_observed(source, request, None)
    }

    /// [`load`](Self::load), reporting every release to `observer`.
    pub fn load_observed(
        source: &SceneSource,
        request: &ResourceRequest,
        observer: Option<Arc<dyn ReleaseObserver>>,
    ) -> Result<Self, LoadError> {
        SceneResources::load_on(source, request, &(), observer)
    }
}

impl<G: Send + 'static> SceneResources<(), G> {
    /// Load `source`, building a requested render context on `device`.
    pub fn load_on<D>(
        source: &SceneSource,
        request: &ResourceRequest,
        device: &D,
        observer: Option<Arc<dyn ReleaseObserver>>,
    ) -> Result<Self, LoadError>
    where
        D: ContextDevice<Objects = G> + ?Sized,
    {
        let world = simrig_kernel::load_observed(source, observer.clone())?;
        let render = match world.model.get() {
            Some(model) => RenderParts::allocate(model, request, device, observer),
            None => RenderParts::none(),
        };
        Ok(Self { render, world })
    }
}

impl<S, G> SceneResources<S, G> {
    /// Move in the presentation surface the render context draws to.
    pub fn with_surface<T>(self, surface: ResourceHandle<T>) -> SceneResources<T, G> {
        let Self { render, world } = self;
        let RenderParts {
            render_context,
            surface: _,
            visual_scene,
        } = render;
        SceneResources {
            render: RenderParts {
                render_context,
                surface,
                visual_scene,
            },
            world,
        }
    }

    pub fn model(&self) -> &WorldModel {
        match self.world.model.get() {
            Some(model) => model,
            None => simrig_common::fatal::precondition_violation("scene resources without a model"),
        }
    }

    pub fn state(&self) -> &WorldState {
        match self.world.state.get() {
            Some(state) => state,
            None => simrig_common::fatal::precondition_violation("scene resources without a state"),
        }
    }

    pub fn state_mut(&mut self) -> &mut WorldState {
        match self.world.state.get_mut() {
            Some(state) => state,
            None => simrig_common::fatal::precondition_violation("scene resources without a state"),
        }
    }

    pub fn visual_scene(&self) -> Option<&VisualScene> {
        self.render.visual_scene.get()
    }

    pub fn render_context(&self) -> Option<&RenderContext<G>> {
        self.render.render_context.get()
    }

    pub fn surface(&self) -> Option<&S> {
        self.render.surface.get()
    }

    /// Split into the simulation half and the presentation half.
    pub fn into_parts(self) -> (LoadedWorld, RenderParts<S, G>) {
        (self.world, self.render)
    }
}
