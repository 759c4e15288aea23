use crate::gpu::{DeviceContext, GpuRenderer};
use simrig_common::{AppState, ReleaseObserver, ViewerKind};
use simrig_kernel::{WorldModel, WorldState};
use simrig_render::{
    BackendError, FrameBuffer, InputSnapshot, ResourceRequest, SceneView, UiLayer, ViewerBackend,
};
use std::sync::Arc;

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Renders into a texture and reads every frame back to host memory.
///
/// [`ViewerKind::Egl`] asks for a GL adapter; [`ViewerKind::OsMesa`] asks
/// for the software fallback adapter. No window or display is involved.
pub struct OffscreenBackend {
    kind: ViewerKind,
    view: SceneView<DeviceContext>,
    gpu: GpuRenderer,
    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    readback: wgpu::Buffer,
    padded_row: u32,
    device: Arc<wgpu::Device>,
    queue: wgpu::Queue,
    width: u32,
    height: u32,
    frame: FrameBuffer,
    submissions: u64,
}

impl OffscreenBackend {
    pub fn new(
        kind: ViewerKind,
        model: &WorldModel,
        width: u32,
        height: u32,
        observer: Option<Arc<dyn ReleaseObserver>>,
    ) -> Result<Self, BackendError> {
        if width == 0 || height == 0 {
            return Err(BackendError::InvalidViewport { width, height });
        }
        let (backends, force_fallback_adapter) = match kind {
            ViewerKind::Egl => (wgpu::Backends::GL, false),
            ViewerKind::OsMesa => (wgpu::Backends::all(), true),
            other => {
                return Err(BackendError::unavailable(other, "not an offscreen backend"));
            }
        };

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter,
        }))
        .ok_or_else(|| BackendError::unavailable(kind, "no compatible graphics adapter"))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("simrig_offscreen_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| BackendError::unavailable(kind, e.to_string()))?;
        let device = Arc::new(device);

        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen_target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&Default::default());

        let padded_row = padded_bytes_per_row(width);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("offscreen_readback"),
            size: padded_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let gpu = GpuRenderer::new(&device, TARGET_FORMAT, width, height);
        tracing::info!(
            kind = %kind,
            backend = adapter.get_info().backend.to_str(),
            adapter = %adapter.get_info().name,
            "offscreen renderer initialized"
        );

        Ok(Self {
            kind,
            view: SceneView::on_device(
                model,
                ResourceRequest::for_kind(kind),
                DeviceContext::new(device.clone()),
                observer,
            ),
            gpu,
            target,
            target_view,
            readback,
            padded_row,
            device,
            queue,
            width,
            height,
            frame: FrameBuffer::default(),
            submissions: 0,
        })
    }

    /// Copy the mapped readback buffer into `self.frame`, dropping row padding.
    fn read_back(&mut self) -> Result<(), wgpu::BufferAsyncError> {
        let slice = self.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv().unwrap_or(Err(wgpu::BufferAsyncError))?;

        let row = self.width as usize * 4;
        let mut rgba = Vec::with_capacity(row * self.height as usize);
        {
            let mapped = slice.get_mapped_range();
            for chunk in mapped.chunks(self.padded_row as usize) {
                rgba.extend_from_slice(&chunk[..row]);
            }
        }
        self.readback.unmap();
        self.frame = FrameBuffer {
            width: self.width,
            height: self.height,
            rgba,
        };
        Ok(())
    }
}

impl ViewerBackend for OffscreenBackend {
    fn kind(&self) -> ViewerKind {
        self.kind
    }

    fn prepare(&mut self, model: &WorldModel, state: &WorldState, app: &AppState) -> InputSnapshot {
        self.view.sync(model, state, app);
        InputSnapshot {
            framebuffer: (self.width, self.height),
            ..InputSnapshot::default()
        }
    }

    /// Offscreen frames have no UI; `ui` is ignored.
    fn render(&mut self, _app: &mut AppState, _ui: Option<&mut dyn UiLayer>) {
        let (Some(scene), Some(ctx)) = (self.view.scene(), self.view.context()) else {
            return;
        };
        let view_proj = self.view.view_projection(self.width as f32 / self.height as f32);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("offscreen_encoder"),
        });
        self.gpu.encode(
            &self.device,
            &self.queue,
            &mut encoder,
            &self.target_view,
            scene,
            ctx,
            view_proj,
        );
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        self.submissions += 1;

        if let Err(e) = self.read_back() {
            tracing::warn!("offscreen readback failed: {e}");
        }
    }

    fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn gpu_submissions(&self) -> u64 {
        self.submissions
    }

    fn frame(&self) -> Option<&FrameBuffer> {
        (!self.frame.rgba.is_empty()).then_some(&self.frame)
    }

    fn rebind(&mut self, model: &WorldModel) {
        self.view.rebind(model);
    }
}

fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use simrig_kernel::SceneSource;

    fn model() -> WorldModel {
        SceneSource::xml(r#"<mujoco><worldbody><geom type="box" size="0.2 0.2 0.2"/></worldbody></mujoco>"#)
            .compile()
            .unwrap()
    }

    #[test]
    fn rows_pad_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
    }

    #[test]
    fn empty_viewport_is_rejected_before_touching_the_gpu() {
        let err = OffscreenBackend::new(ViewerKind::Egl, &model(), 0, 480, None).err();
        assert!(matches!(
            err,
            Some(BackendError::InvalidViewport { width: 0, height: 480 })
        ));
    }

    #[test]
    fn non_offscreen_kind_is_unavailable() {
        let err = OffscreenBackend::new(ViewerKind::Windowed, &model(), 64, 64, None).err();
        assert!(matches!(err, Some(BackendError::Unavailable { .. })));
    }

    #[test]
    fn software_frame_reads_back_when_an_adapter_exists() {
        let model = model();
        let Ok(mut backend) = OffscreenBackend::new(ViewerKind::OsMesa, &model, 64, 48, None) else {
            // No software adapter on this machine.
            return;
        };
        let mut state = WorldState::new(&model);
        simrig_kernel::engine::forward(&model, &mut state);
        let mut app = AppState::default();
        backend.prepare(&model, &state, &app);
        backend.render(&mut app, None);
        assert_eq!(backend.gpu_submissions(), 1);
        let frame = backend.frame().expect("frame");
        assert_eq!((frame.width, frame.height), (64, 48));
        assert_eq!(frame.rgba.len(), 64 * 48 * 4);
        assert!(backend.view.context().unwrap().device.vertex_count() > 0);
    }

    #[test]
    fn rebind_rebuilds_the_grid_for_the_new_model() {
        let small = model();
        let Ok(mut backend) = OffscreenBackend::new(ViewerKind::OsMesa, &small, 32, 32, None) else {
            return;
        };
        let before = backend.view.context().unwrap().device.vertex_count();
        let large = SceneSource::xml(r#"<mujoco><worldbody><geom type="box" size="20 20 20"/></worldbody></mujoco>"#)
            .compile()
            .unwrap();
        backend.rebind(&large);
        let ctx = backend.view.context().unwrap();
        assert_eq!(ctx.model_id(), large.id());
        assert_eq!(ctx.device.vertex_count(), (2 * ctx.grid_half_lines + 1) * 4);
        assert!(before > 0);
    }
}
