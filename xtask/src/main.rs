use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for simrig")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// fmt, clippy, tests, docs, then the bundled scene smoke run
    Check,
    /// cargo fmt --check on every crate
    Fmt,
    /// clippy with warnings denied
    Clippy,
    /// Workspace tests; `--kernel` limits them to the simulation crate
    Test {
        #[arg(long)]
        kernel: bool,
    },
    /// Rustdoc for the workspace
    Doc,
    /// Stepping benchmarks in simrig-kernel
    Bench,
    /// Compile every scene under scenes/ and run it headless for a few frames
    Scenes {
        /// Frames per scene
        #[arg(long, default_value = "60")]
        frames: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            fmt()?;
            clippy()?;
            test(false)?;
            doc()?;
            scenes(60)?;
        }
        Commands::Fmt => fmt()?,
        Commands::Clippy => clippy()?,
        Commands::Test { kernel } => test(kernel)?,
        Commands::Doc => doc()?,
        Commands::Bench => cargo("bench", &["bench", "-p", "simrig-kernel"])?,
        Commands::Scenes { frames } => scenes(frames)?,
    }

    Ok(())
}

fn cargo(what: &str, args: &[&str]) -> Result<()> {
    println!("==> cargo {}", args.join(" "));
    let status = Command::new("cargo")
        .args(args)
        .current_dir(workspace_root())
        .status()
        .with_context(|| format!("spawning cargo {what}"))?;
    if !status.success() {
        bail!("cargo {what} failed");
    }
    Ok(())
}

fn fmt() -> Result<()> {
    cargo("fmt", &["fmt", "--all", "--", "--check"])
}

fn clippy() -> Result<()> {
    cargo(
        "clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
    )
}

fn test(kernel_only: bool) -> Result<()> {
    if kernel_only {
        cargo("test", &["test", "-p", "simrig-kernel"])
    } else {
        cargo("test", &["test", "--workspace"])
    }
}

fn doc() -> Result<()> {
    cargo("doc", &["doc", "--workspace", "--no-deps"])
}

fn scenes(frames: u64) -> Result<()> {
    let scenes = scene_files(&workspace_root().join("scenes"))?;
    if scenes.is_empty() {
        bail!("no scenes found under scenes/");
    }
    let frames = frames.to_string();
    for scene in &scenes {
        let path = scene.to_string_lossy();
        cargo("info", &["run", "-q", "-p", "simrig-cli", "--", "info", &path])?;
        cargo(
            "run",
            &[
                "run", "-q", "-p", "simrig-cli", "--", "run", &path, "--viewer", "disabled",
                "--frames", &frames,
            ],
        )?;
    }
    println!("==> {} scenes ok", scenes.len());
    Ok(())
}

/// `.xml` files directly under `dir`, sorted by name.
fn scene_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "xml") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_scenes_are_found_in_name_order() {
        let files = scene_files(&workspace_root().join("scenes")).unwrap();
        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name()?.to_str())
            .collect();
        assert!(names.contains(&"double_pendulum.xml"));
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn only_xml_files_count_as_scenes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.xml"), "<mujoco/>").unwrap();
        std::fs::write(dir.path().join("a.xml"), "<mujoco/>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        let files = scene_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.xml"), dir.path().join("b.xml")]);
    }
}
