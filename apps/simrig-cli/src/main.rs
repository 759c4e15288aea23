use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use simrig_common::{SimConfig, ViewerKind};
use simrig_kernel::{ControlInput, ObjectKind, SceneSource, WorldModel};
use simrig_tools::ModelInspector;
use simrig_viewer::{ApplicationShell, RunOutcome, ViewerStatus};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "simrig-cli", about = "Run and inspect simrig scenes")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// JSON run configuration; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a scene for a number of frames
    Run {
        /// Scene description (MJCF XML)
        scene: PathBuf,
        /// disabled, egl, osmesa, remote or windowed
        #[arg(long)]
        viewer: Option<ViewerKind>,
        /// Frames to run
        #[arg(long, default_value = "600", conflicts_with = "duration")]
        frames: u64,
        /// Simulated seconds to run instead of a frame count
        #[arg(long)]
        duration: Option<f64>,
        /// Step on a background thread while rendering on this one
        #[arg(long)]
        threaded: bool,
        /// `host:port` for the remote viewer
        #[arg(long)]
        remote: Option<String>,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        /// Constant control `actuator=value`; repeatable
        #[arg(long = "ctrl", value_parser = parse_ctrl)]
        ctrls: Vec<(String, f64)>,
        /// Write the last offscreen frame as a binary PPM
        #[arg(long)]
        save_frame: Option<PathBuf>,
    },
    /// Print a model summary and its named entities
    Info {
        /// Scene description (MJCF XML)
        scene: PathBuf,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn parse_ctrl(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected actuator=value, got `{s}`"))?;
    let value = value
        .trim()
        .parse()
        .map_err(|e| format!("bad control value in `{s}`: {e}"))?;
    Ok((name.trim().to_string(), value))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let mut config = match &cli.config {
        Some(path) => SimConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => SimConfig::default(),
    };

    match cli.command {
        Commands::Run {
            scene,
            viewer,
            frames,
            duration,
            threaded,
            remote,
            width,
            height,
            ctrls,
            save_frame,
        } => {
            if let Some(kind) = viewer {
                config.viewer.kind = kind;
            }
            if remote.is_some() {
                config.viewer.remote_addr = remote;
            }
            config.viewer.width = width.unwrap_or(config.viewer.width);
            config.viewer.height = height.unwrap_or(config.viewer.height);
            config.validate()?;

            let frames = match duration {
                Some(d) if config.frame_duration > 0.0 => (d / config.frame_duration).ceil() as u64,
                Some(_) => bail!("--duration needs a positive frame_duration"),
                None => frames,
            };
            let source = resolve(&scene)?;
            let mut shell = ApplicationShell::from_config(&source, &config)?;
            warn_if_degraded(&shell, config.viewer.kind);
            let ctrl = control_vector(shell.sim().model(), &ctrls)?;

            if threaded {
                let run = shell.run_threaded(frames, move |_: &ControlInput<'_>, out: &mut [f64]| {
                    out.copy_from_slice(&ctrl)
                });
                println!("threaded frames: {}", run.frames);
            } else {
                let mut controller =
                    |_: &ControlInput<'_>, out: &mut [f64]| out.copy_from_slice(&ctrl);
                if shell.run(Some(frames), &mut controller, None) == RunOutcome::Closed {
                    println!("viewer closed after {} frames", shell.frames());
                }
            }
            report(&shell);

            if let Some(path) = save_frame {
                match shell.viewer().frame() {
                    Some(frame) => {
                        write_ppm(&path, frame.width, frame.height, &frame.rgba)?;
                        println!("frame written to {}", path.display());
                    }
                    None => bail!("viewer `{}` kept no frame to save", shell.viewer().active_kind()),
                }
            }
        }
        Commands::Info { scene, json } => {
            let model = resolve(&scene)?.compile()?;
            let summary = ModelInspector::summary(&model);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{summary}");
                for kind in [
                    ObjectKind::Joint,
                    ObjectKind::Actuator,
                    ObjectKind::Sensor,
                    ObjectKind::Camera,
                ] {
                    for entity in ModelInspector::list(&model, kind) {
                        println!("  {entity}");
                    }
                }
            }
        }
    }

    Ok(())
}

/// Print the absolute scene path, then hand back a loadable source.
fn resolve(scene: &Path) -> anyhow::Result<SceneSource> {
    let absolute = std::path::absolute(scene)
        .with_context(|| format!("resolving {}", scene.display()))?;
    println!("scene: {}", absolute.display());
    Ok(SceneSource::file(absolute))
}

/// Log the reason a requested viewer fell back to headless, if it did.
fn warn_if_degraded(shell: &ApplicationShell, requested: ViewerKind) -> Option<&str> {
    let ViewerStatus::Degraded { reason } = shell.viewer().status() else {
        return None;
    };
    tracing::warn!(viewer = %requested, "viewer unavailable, running headless: {reason}");
    Some(reason)
}

fn control_vector(model: &WorldModel, ctrls: &[(String, f64)]) -> anyhow::Result<Vec<f64>> {
    let mut ctrl = vec![0.0; model.nu()];
    for (name, value) in ctrls {
        let Some(id) = model.name2id(ObjectKind::Actuator, name) else {
            bail!("model has no actuator named `{name}`");
        };
        ctrl[id] = *value;
    }
    Ok(ctrl)
}

fn report(shell: &ApplicationShell) {
    let counters = shell.sim().counters();
    let stats = shell.viewer().stats();
    tracing::info!(
        frames = shell.frames(),
        steps = counters.total_steps,
        viewer = %shell.viewer().active_kind(),
        "run finished"
    );
    println!(
        "simulation_time={:.4} total_steps={} total_calls={}",
        counters.simulation_time, counters.total_steps, counters.total_calls
    );
    println!(
        "viewer={} prepares={} renders={} gpu_submissions={}",
        shell.viewer().active_kind(),
        stats.prepares,
        stats.renders,
        stats.gpu_submissions
    );
    for joint in ModelInspector::joints(shell.sim().model(), shell.sim().state()) {
        println!("  {} = {:.4}", joint.name, joint.position);
    }
}

fn write_ppm(path: &Path, width: u32, height: u32, rgba: &[u8]) -> anyhow::Result<()> {
    let mut out = std::io::BufWriter::new(
        std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
    );
    write!(out, "P6\n{width} {height}\n255\n")?;
    for px in rgba.chunks_exact(4) {
        out.write_all(&px[..3])?;
    }
    out.flush()?;
    Ok(())
}
