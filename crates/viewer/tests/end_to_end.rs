use simrig_common::{AppState, ReleaseLog, SimConfig, ViewerConfig, ViewerKind};
use simrig_kernel::{Passive, SceneSource, SimulationCore};
use simrig_viewer::{ApplicationShell, RunOutcome, Viewer, ViewerStatus};
use std::io::Write;
use std::net::TcpListener;

const DOUBLE_PENDULUM: &str = include_str!("../../../scenes/double_pendulum.xml");

#[test]
fn double_pendulum_runs_ten_seconds_headless() {
    let mut sim = SimulationCore::from_source(&SceneSource::xml(DOUBLE_PENDULUM), 0.002).unwrap();
    sim.state_mut().qpos_mut()[0] = 0.6;
    sim.forward();
    let h = sim.model().timestep();
    let (model, state) = sim.world();
    let viewer = Viewer::create(ViewerKind::Disabled, model, state, 640, 480);
    let mut shell = ApplicationShell::new(sim, viewer, 1.0 / 60.0);

    for _ in 0..600 {
        assert!(shell.frame(&mut Passive, None));
        assert!(shell.sim().state().qpos().iter().all(|q| q.is_finite()));
    }
    assert_eq!(shell.sim().total_calls(), 600);
    assert!((shell.sim().simulation_time() - 10.0).abs() <= h);
    assert_eq!(shell.viewer().stats().renders, 600);
}

#[test]
fn disabled_viewer_survives_a_thousand_frames() {
    let sim = SimulationCore::from_source(&SceneSource::xml(DOUBLE_PENDULUM), 0.002).unwrap();
    let (model, state) = sim.world();
    let mut viewer = Viewer::create(ViewerKind::Disabled, model, state, 640, 480);
    let mut app = AppState::default();
    for _ in 0..1000 {
        viewer.prepare(model, state, &app);
        viewer.render(&mut app, None);
    }
    let stats = viewer.stats();
    assert_eq!(stats.prepares, 1000);
    assert_eq!(stats.renders, 1000);
    assert_eq!(stats.gpu_submissions, 0);
    assert!(!viewer.is_degraded());
}

#[test]
fn failed_window_creation_degrades_to_no_ops() {
    let sim = SimulationCore::from_source(&SceneSource::xml(DOUBLE_PENDULUM), 0.002).unwrap();
    let (model, state) = sim.world();
    let mut viewer = Viewer::create(ViewerKind::Windowed, model, state, 0, 0);
    assert!(viewer.is_degraded());
    assert!(matches!(viewer.status(), ViewerStatus::Degraded { .. }));
    assert_eq!(viewer.kind(), ViewerKind::Windowed);

    let mut app = AppState::default();
    for _ in 0..10 {
        let input = viewer.prepare(model, state, &app);
        assert!(!input.close_requested);
        viewer.render(&mut app, None);
    }
    assert_eq!(viewer.stats().gpu_submissions, 0);
    assert!(viewer.frame().is_none());
    assert_eq!(app, AppState::default());
}

#[test]
fn shell_teardown_releases_presentation_before_the_model() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let log = ReleaseLog::new();
    {
        let world =
            simrig_kernel::load_observed(&SceneSource::xml(DOUBLE_PENDULUM), Some(log.clone())).unwrap();
        let mut sim = SimulationCore::new(0.002);
        sim.attach(world);
        let config = ViewerConfig {
            remote_addr: Some(listener.local_addr().unwrap().to_string()),
            ..ViewerConfig::with_kind(ViewerKind::Remote)
        };
        let (model, state) = sim.world();
        let viewer = Viewer::create_observed(&config, model, state, Some(log.clone()));
        assert_eq!(viewer.status(), &ViewerStatus::Active);
        let mut shell = ApplicationShell::new(sim, viewer, 1.0 / 60.0);
        shell.run_passive(Some(3));
        assert!(log.entries().is_empty());
    }
    assert_eq!(log.entries(), vec!["visual-scene", "world-state", "world-model"]);
}

#[test]
fn shell_from_config_file_with_bad_scene_reports_source() {
    let mut scene = tempfile::NamedTempFile::new().unwrap();
    scene.write_all(b"<mujoco><worldbody><body><joint type=\"free\"/></body></worldbody></mujoco>").unwrap();
    let source = SceneSource::file(scene.path());
    let err = match ApplicationShell::from_config(&source, &SimConfig::default()) {
        Ok(_) => panic!("free joints are not supported"),
        Err(e) => e,
    };
    assert!(err.to_string().contains(&scene.path().display().to_string()));
}

#[test]
fn closing_viewer_ends_the_run_loop() {
    let mut shell =
        ApplicationShell::from_config(&SceneSource::xml(DOUBLE_PENDULUM), &SimConfig::default()).unwrap();
    assert_eq!(shell.run_passive(Some(4)), RunOutcome::Completed);
    assert_eq!(shell.frames(), 4);
}
