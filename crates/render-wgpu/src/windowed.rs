use crate::gpu::{DeviceContext, GpuRenderer};
use simrig_common::{AppState, MouseState, ReleaseObserver, ViewerConfig, ViewerKind};
use simrig_kernel::{WorldModel, WorldState};
use simrig_render::{
    BackendError, InputSnapshot, OrbitCamera, RenderContext, ResourceRequest, SceneView, UiLayer,
    ViewerBackend,
};
use std::sync::Arc;
use std::time::Duration;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Fullscreen, Window, WindowId};

/// Pixels of touchpad scroll counted as one wheel notch.
const PIXELS_PER_NOTCH: f64 = 50.0;

/// Event pumps allowed for the platform to deliver the first `resumed`.
const STARTUP_PUMPS: usize = 16;

/// Interactive window with an orbit camera and an optional egui overlay.
///
/// Events are pumped without blocking during `prepare`, so the caller keeps
/// control of the frame loop.
///
/// # Invariants
/// - Fields drop in declaration order: scene resources (with the render
///   context's GPU objects), then the surface and renderer, then the
///   window, then the event loop.
pub struct WindowedBackend {
    view: SceneView<DeviceContext>,
    gpu: SurfaceGpu,
    shell: WindowShell,
    event_loop: EventLoop<()>,
    submissions: u64,
}

struct SurfaceGpu {
    renderer: GpuRenderer,
    egui_renderer: egui_wgpu::Renderer,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    device: Arc<wgpu::Device>,
    queue: wgpu::Queue,
}

impl SurfaceGpu {
    fn reconfigure(&mut self, size: PhysicalSize<u32>) {
        self.config.width = size.width.max(1);
        self.config.height = size.height.max(1);
        self.surface.configure(&self.device, &self.config);
        self.renderer
            .resize(&self.device, self.config.width, self.config.height);
    }

    fn set_vsync(&mut self, vsync: bool) {
        let mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        if self.config.present_mode != mode {
            self.config.present_mode = mode;
            self.surface.configure(&self.device, &self.config);
            tracing::debug!(vsync, "present mode changed");
        }
    }
}

/// Window plus everything the event handler accumulates between prepares.
struct WindowShell {
    title: String,
    size: PhysicalSize<u32>,
    window: Option<Arc<Window>>,
    create_error: Option<String>,
    egui_ctx: egui::Context,
    egui_state: Option<egui_winit::State>,
    mouse: MouseState,
    shift: bool,
    camera_blocked: bool,
    reset_requested: bool,
    close_requested: bool,
    scroll: f32,
    resized: Option<PhysicalSize<u32>>,
}

/// Borrowed view handed to the event loop for one pump.
struct EventPump<'a> {
    shell: &'a mut WindowShell,
    camera: &'a mut OrbitCamera,
}

impl ApplicationHandler for EventPump<'_> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.shell.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.shell.title.clone())
            .with_inner_size(self.shell.size);
        match event_loop.create_window(attrs) {
            Ok(window) => self.shell.window = Some(Arc::new(window)),
            Err(e) => self.shell.create_error = Some(e.to_string()),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let shell = &mut *self.shell;
        let consumed = match (&mut shell.egui_state, &shell.window) {
            (Some(state), Some(window)) => state.on_window_event(window, &event).consumed,
            _ => false,
        };
        let camera_input = !consumed && !shell.camera_blocked;

        match event {
            WindowEvent::CloseRequested => shell.close_requested = true,
            WindowEvent::Resized(size) => shell.resized = Some(size),
            WindowEvent::ModifiersChanged(mods) => shell.shift = mods.state().shift_key(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } if !consumed => match key {
                KeyCode::Backspace => shell.reset_requested = true,
                KeyCode::Escape => shell.close_requested = true,
                _ => {}
            },
            WindowEvent::MouseInput { state, button, .. } => {
                // Releases always register so a button never sticks.
                let pressed = state == ElementState::Pressed;
                if pressed && !camera_input {
                    return;
                }
                match button {
                    MouseButton::Left => shell.mouse.button_left = pressed,
                    MouseButton::Middle => shell.mouse.button_middle = pressed,
                    MouseButton::Right => shell.mouse.button_right = pressed,
                    _ => {}
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if motion_steers_camera(camera_input, &shell.mouse) {
                    let height = shell.window.as_ref().map_or(1, |w| w.inner_size().height);
                    self.camera
                        .drag(&mut shell.mouse, position.x, position.y, shell.shift, height);
                } else {
                    shell.mouse.last_x = position.x;
                    shell.mouse.last_y = position.y;
                }
            }
            WindowEvent::MouseWheel { delta, .. } if camera_input => {
                let notches = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => (p.y / PIXELS_PER_NOTCH) as f32,
                };
                shell.scroll += notches;
                self.camera.scroll(notches);
            }
            _ => {}
        }
    }
}

/// A drag that began on the scene keeps steering the camera while the
/// pointer crosses the overlay.
fn motion_steers_camera(camera_input: bool, mouse: &MouseState) -> bool {
    camera_input || mouse.any_button()
}

impl WindowedBackend {
    /// Open a window and bind a GPU surface to it.
    ///
    /// Fails with [`BackendError::Unavailable`] when no display, window or
    /// adapter can be had, including when an event loop already exists in
    /// this process.
    pub fn new(
        model: &WorldModel,
        config: &ViewerConfig,
        observer: Option<Arc<dyn ReleaseObserver>>,
    ) -> Result<Self, BackendError> {
        let (width, height) = (config.width, config.height);
        if width == 0 || height == 0 {
            return Err(BackendError::InvalidViewport { width, height });
        }
        let unavailable = |reason: String| BackendError::unavailable(ViewerKind::Windowed, reason);

        let mut builder = EventLoop::builder();
        #[cfg(target_os = "linux")]
        {
            use winit::platform::x11::EventLoopBuilderExtX11;
            builder.with_any_thread(true);
        }
        #[cfg(target_os = "windows")]
        {
            use winit::platform::windows::EventLoopBuilderExtWindows;
            builder.with_any_thread(true);
        }
        let mut event_loop = builder.build().map_err(|e| unavailable(e.to_string()))?;

        // The view waits for the device; until then the pump drives a bare camera.
        let mut camera = OrbitCamera::framing(model.stat());
        let mut shell = WindowShell {
            title: config.title.clone(),
            size: PhysicalSize::new(width, height),
            window: None,
            create_error: None,
            egui_ctx: egui::Context::default(),
            egui_state: None,
            mouse: MouseState::default(),
            shift: false,
            camera_blocked: false,
            reset_requested: false,
            close_requested: false,
            scroll: 0.0,
            resized: None,
        };
        for _ in 0..STARTUP_PUMPS {
            let mut pump = EventPump {
                shell: &mut shell,
                camera: &mut camera,
            };
            if let PumpStatus::Exit(code) = event_loop.pump_app_events(Some(Duration::ZERO), &mut pump) {
                return Err(unavailable(format!("event loop exited during startup ({code})")));
            }
            if shell.window.is_some() || shell.create_error.is_some() {
                break;
            }
        }
        if let Some(e) = shell.create_error.take() {
            return Err(unavailable(e));
        }
        let window = shell
            .window
            .clone()
            .ok_or_else(|| unavailable("platform never delivered a window".into()))?;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| unavailable(e.to_string()))?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| unavailable("no adapter compatible with the window surface".into()))?;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("simrig_window_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| unavailable(e.to_string()))?;
        let device = Arc::new(device);

        let size = window.inner_size();
        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(caps.formats.first())
            .copied()
            .ok_or_else(|| unavailable("surface reports no formats".into()))?;
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if config.vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        shell.egui_state = Some(egui_winit::State::new(
            shell.egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        ));
        let mut view = SceneView::on_device(
            model,
            ResourceRequest::for_viewer(config),
            DeviceContext::new(device.clone()),
            observer,
        );
        view.camera = camera;
        let gpu = SurfaceGpu {
            renderer: GpuRenderer::new(&device, format, surface_config.width, surface_config.height),
            egui_renderer: egui_wgpu::Renderer::new(&device, format, None, 1, false),
            surface,
            config: surface_config,
            device,
            queue,
        };

        tracing::info!(
            backend = adapter.get_info().backend.to_str(),
            width = size.width,
            height = size.height,
            "window opened"
        );

        Ok(Self {
            view,
            gpu,
            shell,
            event_loop,
            submissions: 0,
        })
    }

    fn apply_window_toggles(&mut self, app: &AppState) {
        if let Some(size) = self.shell.resized.take() {
            self.gpu.reconfigure(size);
        }
        self.gpu.set_vsync(app.vsync);
        if let Some(window) = &self.shell.window {
            if window.fullscreen().is_some() != app.fullscreen {
                window.set_fullscreen(app.fullscreen.then_some(Fullscreen::Borderless(None)));
            }
        }
    }

    /// Run `ui` for one egui frame and record its paint jobs over `target`.
    fn encode_ui(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        app: &mut AppState,
        ui: &mut dyn UiLayer,
    ) {
        let (Some(state), Some(window)) = (&mut self.shell.egui_state, &self.shell.window) else {
            return;
        };
        let ctx = &self.shell.egui_ctx;
        let zoom = overlay_zoom(self.view.context());
        if ctx.zoom_factor() != zoom {
            ctx.set_zoom_factor(zoom);
        }
        let raw_input = state.take_egui_input(window);
        let full_output = ctx.run(raw_input, |ctx| ui.show(ctx, app));
        state.handle_platform_output(window, full_output.platform_output);
        app.wants_to_capture_mouse = ctx.wants_pointer_input() || ctx.is_pointer_over_area();

        let paint_jobs = ctx.tessellate(full_output.shapes, full_output.pixels_per_point);
        let screen = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.gpu.config.width, self.gpu.config.height],
            pixels_per_point: full_output.pixels_per_point,
        };
        let gpu = &mut self.gpu;
        for (id, delta) in &full_output.textures_delta.set {
            gpu.egui_renderer
                .update_texture(&gpu.device, &gpu.queue, *id, delta);
        }
        gpu.egui_renderer
            .update_buffers(&gpu.device, &gpu.queue, encoder, &paint_jobs, &screen);
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: target,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime();
            gpu.egui_renderer.render(&mut pass, &paint_jobs, &screen);
        }
        for id in &full_output.textures_delta.free {
            gpu.egui_renderer.free_texture(id);
        }
    }
}

/// Overlay zoom for the context's font scale; unscaled without a context.
fn overlay_zoom<G>(ctx: Option<&RenderContext<G>>) -> f32 {
    ctx.map_or(1.0, |c| c.font_scale.factor())
}

impl ViewerBackend for WindowedBackend {
    fn kind(&self) -> ViewerKind {
        ViewerKind::Windowed
    }

    fn prepare(&mut self, model: &WorldModel, state: &WorldState, app: &AppState) -> InputSnapshot {
        self.shell.camera_blocked = app.wants_to_capture_mouse;
        let mut pump = EventPump {
            shell: &mut self.shell,
            camera: &mut self.view.camera,
        };
        if let PumpStatus::Exit(_) = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut pump) {
            self.shell.close_requested = true;
        }
        self.view.sync(model, state, app);

        let shell = &mut self.shell;
        let framebuffer = shell
            .window
            .as_ref()
            .map(|w| w.inner_size())
            .map_or((0, 0), |s| (s.width, s.height));
        InputSnapshot {
            mouse: shell.mouse,
            reset_requested: std::mem::take(&mut shell.reset_requested),
            close_requested: std::mem::take(&mut shell.close_requested),
            scroll: std::mem::take(&mut shell.scroll),
            framebuffer,
        }
    }

    fn render(&mut self, app: &mut AppState, ui: Option<&mut dyn UiLayer>) {
        self.apply_window_toggles(app);

        let frame = match self.gpu.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.gpu.surface.configure(&self.gpu.device, &self.gpu.config);
                return;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return;
            }
        };
        let target = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("window_encoder"),
            });

        if let (Some(scene), Some(ctx)) = (self.view.scene(), self.view.context()) {
            let aspect = self.gpu.config.width as f32 / self.gpu.config.height.max(1) as f32;
            let view_proj = self.view.view_projection(aspect);
            let gpu = &mut self.gpu;
            gpu.renderer
                .encode(&gpu.device, &gpu.queue, &mut encoder, &target, scene, ctx, view_proj);
        }

        match ui {
            Some(ui) if app.show_ui => self.encode_ui(&mut encoder, &target, app, ui),
            _ => app.wants_to_capture_mouse = false,
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        self.submissions += 1;
        frame.present();
    }

    fn viewport(&self) -> (u32, u32) {
        (self.gpu.config.width, self.gpu.config.height)
    }

    fn gpu_submissions(&self) -> u64 {
        self.submissions
    }

    fn rebind(&mut self, model: &WorldModel) {
        self.view.rebind(model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simrig_kernel::SceneSource;

    #[test]
    fn empty_viewport_fails_before_opening_a_window() {
        let model = SceneSource::xml("<mujoco><worldbody/></mujoco>").compile().unwrap();
        let config = ViewerConfig {
            width: 0,
            height: 0,
            ..ViewerConfig::with_kind(ViewerKind::Windowed)
        };
        let err = WindowedBackend::new(&model, &config, None).err();
        assert!(matches!(
            err,
            Some(BackendError::InvalidViewport { width: 0, height: 0 })
        ));
    }

    #[test]
    fn drags_started_on_the_scene_survive_the_overlay() {
        let idle = MouseState::default();
        assert!(motion_steers_camera(true, &idle));
        assert!(!motion_steers_camera(false, &idle));
        let dragging = MouseState {
            button_left: true,
            ..MouseState::default()
        };
        assert!(motion_steers_camera(false, &dragging));
    }

    #[test]
    fn overlay_zoom_follows_the_context_font_scale() {
        let model = SceneSource::xml("<mujoco><worldbody/></mujoco>").compile().unwrap();
        assert_eq!(overlay_zoom::<()>(None), 1.0);
        let ctx = RenderContext::new(&model, simrig_render::FontScale::Scale150);
        assert_eq!(overlay_zoom(Some(&ctx)), 1.5);
        let ctx = RenderContext::new(&model, simrig_render::FontScale::Scale200);
        assert_eq!(overlay_zoom(Some(&ctx)), 2.0);
    }
}
