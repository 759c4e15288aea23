use anyhow::{Result, bail};
use clap::Parser;
use egui::Context as EguiContext;
use simrig_common::{AppState, SimConfig, ViewerKind};
use simrig_kernel::{ControlInput, ObjectKind, SceneSource, SimulationCounters, WorldModel};
use simrig_render::UiLayer;
use simrig_tools::{ModelInspector, ModelSummary};
use simrig_viewer::{ApplicationShell, ViewerStatus};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "simrig-desktop", about = "Interactive simrig viewer")]
struct Cli {
    /// Scene description (MJCF XML)
    scene: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// JSON run configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,
}

/// Per-model panel data: everything the UI shows that comes from the model.
struct ModelPanel {
    summary: ModelSummary,
    actuators: Vec<(String, (f64, f64))>,
    cameras: Vec<String>,
    /// Control targets the sliders edit; copied into `ctrl` before every step.
    targets: Vec<f64>,
}

impl ModelPanel {
    fn new(model: &WorldModel) -> Self {
        let actuators = model
            .actuators()
            .iter()
            .enumerate()
            .map(|(i, act)| {
                let name = act.name.clone().unwrap_or_else(|| format!("actuator{i}"));
                (name, act.ctrlrange.unwrap_or((-1.0, 1.0)))
            })
            .collect::<Vec<_>>();
        let cameras = ModelInspector::list(model, ObjectKind::Camera)
            .into_iter()
            .map(|c| c.name.unwrap_or_else(|| format!("camera{}", c.index)))
            .collect();
        Self {
            summary: ModelInspector::summary(model),
            targets: vec![0.0; actuators.len()],
            actuators,
            cameras,
        }
    }
}

/// Side panel drawn over the scene each frame.
struct ControlPanel<'a> {
    model: &'a mut ModelPanel,
    counters: SimulationCounters,
    reload_path: &'a mut String,
    reload_requested: &'a mut bool,
    status: &'a str,
}

impl UiLayer for ControlPanel<'_> {
    fn show(&mut self, ctx: &EguiContext, app: &mut AppState) {
        egui::SidePanel::left("controls")
            .default_width(280.0)
            .show(ctx, |ui| {
                ui.heading("simrig");
                ui.separator();
                let s = &self.model.summary;
                ui.label(format!("Model: {}", s.name));
                ui.label(format!(
                    "Bodies: {}  Joints: {}  Actuators: {}",
                    s.bodies, s.joints, s.actuators
                ));
                ui.label(format!("Time: {:.3} s", self.counters.simulation_time));
                ui.label(format!(
                    "Steps: {} ({} last frame)",
                    self.counters.total_steps, self.counters.steps_this_call
                ));
                ui.separator();

                ui.horizontal(|ui| {
                    let label = if app.running { "Pause" } else { "Run" };
                    if ui.button(label).clicked() {
                        app.running = !app.running;
                    }
                    if ui.button("Reset (Backspace)").clicked() {
                        app.dirty_reset = true;
                    }
                });
                ui.checkbox(&mut app.vsync, "VSync");
                ui.checkbox(&mut app.fullscreen, "Fullscreen");

                let selected = match app.camera {
                    Some(i) => self.model.cameras.get(i).cloned().unwrap_or_default(),
                    None => "Free".to_string(),
                };
                egui::ComboBox::from_label("Camera")
                    .selected_text(selected)
                    .show_ui(ui, |ui| {
                        ui.selectable_value(&mut app.camera, None, "Free");
                        for (i, name) in self.model.cameras.iter().enumerate() {
                            ui.selectable_value(&mut app.camera, Some(i), name.as_str());
                        }
                    });

                if !self.model.actuators.is_empty() {
                    ui.separator();
                    ui.heading("Actuators");
                    for ((name, (lo, hi)), target) in
                        self.model.actuators.iter().zip(self.model.targets.iter_mut())
                    {
                        ui.add(egui::Slider::new(target, *lo..=*hi).text(name.as_str()));
                    }
                    if ui.button("Zero controls").clicked() {
                        self.model.targets.iter_mut().for_each(|t| *t = 0.0);
                    }
                }

                ui.separator();
                ui.heading("Scene");
                ui.text_edit_singleline(&mut *self.reload_path);
                if ui.button("Reload").clicked() {
                    *self.reload_requested = true;
                }
                if !self.status.is_empty() {
                    ui.label(self.status);
                }

                ui.separator();
                ui.small("LMB: rotate | RMB: move | MMB/scroll: zoom | Esc: quit");
            });
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("simrig-desktop starting");

    let mut config = match &cli.config {
        Some(path) => SimConfig::from_json_file(path)?,
        None => SimConfig::default(),
    };
    config.viewer.kind = ViewerKind::Windowed;
    config.viewer.width = cli.width.unwrap_or(config.viewer.width);
    config.viewer.height = cli.height.unwrap_or(config.viewer.height);

    let scene = std::path::absolute(&cli.scene)?;
    println!("scene: {}", scene.display());
    let mut shell = ApplicationShell::from_config(&SceneSource::file(&scene), &config)?;
    if let ViewerStatus::Degraded { reason } = shell.viewer().status() {
        bail!("cannot open a window: {reason}");
    }

    let period = Duration::from_secs_f64(config.frame_duration.max(0.0));
    let mut panel = ModelPanel::new(shell.sim().model());
    let mut reload_path = scene.display().to_string();
    let mut status = String::new();

    loop {
        let start = Instant::now();
        {
            let targets = &panel.targets;
            let mut controller =
                |_: &ControlInput<'_>, ctrl: &mut [f64]| ctrl.copy_from_slice(targets);
            shell.step(&mut controller);
        }

        let mut reload_requested = false;
        let mut ui = ControlPanel {
            model: &mut panel,
            counters: shell.sim().counters(),
            reload_path: &mut reload_path,
            reload_requested: &mut reload_requested,
            status: &status,
        };
        if !shell.present(Some(&mut ui)) {
            break;
        }

        if reload_requested {
            match shell.reload(&SceneSource::file(reload_path.trim())) {
                Ok(()) => {
                    panel = ModelPanel::new(shell.sim().model());
                    status = format!("loaded {}", panel.summary.name);
                }
                Err(e) => {
                    tracing::error!("{e}");
                    status = e.to_string();
                }
            }
        }

        if let Some(rest) = period.checked_sub(start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    tracing::info!(frames = shell.frames(), "simrig-desktop exiting");
    Ok(())
}
