//! End-to-end setup pipeline: JSON config + STL file -> running simulation.
//!
//! A block of particles falls onto a floor loaded from an unwelded binary STL
//! that the config scales and translates into place.

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use sph_orchestrator::{build_solver, create_simulation, RunnerState, SimulationConfig};

/// Floor height after the configured translation.
const FLOOR_Y: f32 = -0.5;

struct Fixture {
    dir: PathBuf,
}

impl Fixture {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("sph-e2e-{}-{}", std::process::id(), name));
        fs::create_dir_all(&dir).unwrap();
        Self { dir }
    }

    fn write(&self, file: &str, bytes: &[u8]) -> PathBuf {
        let path = self.dir.join(file);
        fs::write(&path, bytes).unwrap();
        path
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        fs::remove_dir_all(&self.dir).ok();
    }
}

/// Binary STL for a list of triangles (zero header, zero normals).
fn binary_stl(triangles: &[[[f32; 3]; 3]]) -> Vec<u8> {
    let mut bytes = vec![0u8; 80];
    bytes.extend_from_slice(&(triangles.len() as u32).to_le_bytes());
    for tri in triangles {
        bytes.extend_from_slice(&[0u8; 12]);
        for corner in tri {
            for c in corner {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
        }
        bytes.extend_from_slice(&[0u8; 2]);
    }
    bytes
}

/// Square [-1, 1]^2 in the y = 0 plane, plus a sliver that welds away.
fn floor_stl() -> Vec<u8> {
    binary_stl(&[
        [[-1.0, 0.0, -1.0], [-1.0, 0.0, 1.0], [1.0, 0.0, 1.0]],
        [[-1.0, 0.0, -1.0], [1.0, 0.0, 1.0], [1.0, 0.0, -1.0]],
        [[1.0, 0.0, -1.0], [1.001, 0.0, -1.0], [1.0, 0.0, 1.0]],
    ])
}

fn config_json(stl: Option<&str>) -> String {
    let geometry = match stl {
        Some(file) => format!(
            r#"{{ "stl_file": "{file}", "scale": 0.9, "translation": [0.0, {FLOOR_Y}, 0.0] }}"#
        ),
        None => "{}".to_string(),
    };
    format!(
        r#"{{
            "name": "block-on-floor",
            "particle_count": 27,
            "smoothing_radius": 0.15,
            "wind_strength": 0.0,
            "spawn": {{ "Lattice": {{ "spacing": 0.1 }} }},
            "geometry": {geometry},
            "time_step": {{ "Fixed": {{ "dt": 0.005 }} }},
            "max_timesteps": 150
        }}"#
    )
}

fn wait_until_done(state: impl Fn() -> RunnerState) -> RunnerState {
    let deadline = Instant::now() + Duration::from_secs(60);
    loop {
        let s = state();
        if matches!(s, RunnerState::Finished | RunnerState::Error) || Instant::now() > deadline {
            return s;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn build_solver_welds_and_transforms_geometry() {
    let fixture = Fixture::new("build");
    fixture.write("floor.stl", &floor_stl());
    let config_path = fixture.write("scene.json", config_json(Some("floor.stl")).as_bytes());

    let config = SimulationConfig::load(&config_path).unwrap();
    let solver = build_solver(&config, &fixture.dir).unwrap();

    assert_eq!(solver.particles().len(), 27);
    // The sliver collapses when its 0.001-apart corners weld together.
    assert_eq!(solver.triangles().len(), 2);
    assert_eq!(solver.octree().object_count(), 2);
    for tri in solver.triangles() {
        for v in tri.vertices() {
            assert!((v.y - FLOOR_Y).abs() < 1e-6);
            assert!(v.x.abs() <= 0.9 + 1e-6 && v.z.abs() <= 0.9 + 1e-6);
        }
    }
}

#[test]
fn block_lands_on_floor() {
    let fixture = Fixture::new("run");
    fixture.write("floor.stl", &floor_stl());
    let config_path = fixture.write("scene.json", config_json(Some("floor.stl")).as_bytes());

    let runner = create_simulation(&config_path).unwrap();
    runner.start();
    let state = wait_until_done(|| runner.state());
    assert_eq!(state, RunnerState::Finished, "{:?}", runner.error_message());
    assert_eq!(runner.timestep_count(), 150);

    let frame = runner.latest_frame().unwrap();
    assert_eq!(frame.step, 150);
    assert_eq!(frame.len(), 27);
    let lowest = frame.positions.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
    assert!(lowest >= FLOOR_Y - 1e-4, "particle below the floor: y = {lowest}");
    assert!(lowest < FLOOR_Y + 0.1, "block never reached the floor: y = {lowest}");
    assert!(frame.densities.iter().all(|d| d.is_finite() && *d > 0.0));

    runner.join().unwrap();
}

#[test]
fn scene_without_geometry_falls_to_domain_floor() {
    let fixture = Fixture::new("no-geometry");
    let config_path = fixture.write("scene.json", config_json(None).as_bytes());

    let runner = create_simulation(&config_path).unwrap();
    runner.start();
    assert_eq!(wait_until_done(|| runner.state()), RunnerState::Finished);

    let frame = runner.latest_frame().unwrap();
    assert!(frame.positions.iter().all(|p| p.y >= -1.0 && p.y < FLOOR_Y));
    runner.join().unwrap();
}

#[test]
fn missing_geometry_file_fails_setup() {
    let fixture = Fixture::new("missing");
    let config_path = fixture.write("scene.json", config_json(Some("nowhere.stl")).as_bytes());

    let err = create_simulation(&config_path).err().unwrap();
    assert!(err.to_string().contains("nowhere.stl"), "{err}");
}

#[test]
fn invalid_config_fails_setup() {
    let fixture = Fixture::new("invalid");
    let config_path = fixture.write("scene.json", br#"{ "particle_count": 0 }"#);
    assert!(create_simulation(&config_path).is_err());
}
