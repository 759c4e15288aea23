use glam::Vec3;
use simrig_kernel::{ModelId, WorldModel};

/// UI text scale in percent, applied as the overlay zoom factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontScale {
    #[default]
    Scale100 = 100,
    Scale150 = 150,
    Scale200 = 200,
}

impl FontScale {
    pub fn from_percent(percent: u32) -> Option<Self> {
        match percent {
            100 => Some(Self::Scale100),
            150 => Some(Self::Scale150),
            200 => Some(Self::Scale200),
            _ => None,
        }
    }

    pub fn factor(self) -> f32 {
        self as u32 as f32 / 100.0
    }
}

/// Builds the device-side half of a [`RenderContext`] for one model.
///
/// Implemented by backends over their graphics device. The objects it
/// returns are owned by the context and released with it, before the
/// surface the device draws to.
pub trait ContextDevice {
    type Objects: Send + 'static;

    fn build(&self, ctx: &RenderContext) -> Self::Objects;
}

/// No graphics device: the context carries only model-derived settings.
impl ContextDevice for () {
    type Objects = ();

    fn build(&self, _ctx: &RenderContext) {}
}

/// Model-dependent render assets for one graphics context.
///
/// The settings are derived from the model; `device` holds what the
/// backend built from them on its graphics device (grid geometry and the
/// like). One context belongs to exactly one model.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderContext<G = ()> {
    model_id: ModelId,
    pub clear_color: [f32; 4],
    pub font_scale: FontScale,
    /// Radius of the model's reference configuration.
    pub extent: f32,
    pub center: Vec3,
    /// Distance between grid lines.
    pub grid_spacing: f32,
    /// Grid lines on each side of the origin.
    pub grid_half_lines: u32,
    pub device: G,
}

impl RenderContext {
    pub fn new(model: &WorldModel, font_scale: FontScale) -> Self {
        let stat = model.stat();
        let extent = stat.extent as f32;
        let grid_spacing = grid_spacing(extent);
        Self {
            model_id: model.id(),
            clear_color: [0.1, 0.1, 0.15, 1.0],
            font_scale,
            extent,
            center: stat.center.as_vec3(),
            grid_spacing,
            grid_half_lines: ((2.0 * extent / grid_spacing).ceil() as u32).max(1),
            device: (),
        }
    }

    /// Settings for `model` plus the objects `device` builds from them.
    pub fn build<D: ContextDevice + ?Sized>(
        model: &WorldModel,
        font_scale: FontScale,
        device: &D,
    ) -> RenderContext<D::Objects> {
        let ctx = Self::new(model, font_scale);
        let objects = device.build(&ctx);
        ctx.with_device(objects)
    }
}

impl<G> RenderContext<G> {
    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    /// Swap the device objects, keeping the settings.
    pub fn with_device<H>(self, device: H) -> RenderContext<H> {
        RenderContext {
            model_id: self.model_id,
            clear_color: self.clear_color,
            font_scale: self.font_scale,
            extent: self.extent,
            center: self.center,
            grid_spacing: self.grid_spacing,
            grid_half_lines: self.grid_half_lines,
            device,
        }
    }
}

/// Power of ten giving roughly ten grid cells across the extent.
fn grid_spacing(extent: f32) -> f32 {
    let raw = (extent / 10.0).max(1e-3);
    10f32.powf(raw.log10().round())
}
