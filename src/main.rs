//! Headless demo: a small flock seeking the origin around a sphere
//! obstacle, printing one agent's trajectory.
//!
//! Run with: `RUST_LOG=info cargo run --release`

use std::sync::Arc;

use gpuflock::prelude::*;
use log::info;

fn main() {
    env_logger::init();

    let ctx = match GpuContext::new_blocking() {
        Ok(ctx) => Arc::new(ctx),
        Err(err) => {
            eprintln!("no usable GPU: {}", err);
            std::process::exit(1);
        }
    };

    let config = SimConfig::default()
        .with_capacity(256)
        .with_world_half_extent(30.0);
    let mut sim = BoidSim::new(Arc::clone(&ctx), config).expect("simulation setup");

    let mut tracked = None;
    for i in 0..64u32 {
        let angle = i as f32 / 64.0 * std::f32::consts::TAU;
        let id = sim.add_agent(AgentInit {
            position: Vec3::new(angle.cos() * 20.0, 0.0, angle.sin() * 20.0),
            target: Vec3::ZERO,
            ..Default::default()
        });
        if tracked.is_none() {
            tracked = id;
        }
    }
    let tracked = tracked.expect("spawned below capacity");

    let obstacle = Collider::sphere(Vec3::new(5.0, 0.0, 0.0), 3.0);

    for frame in 0..240 {
        sim.tick(1.0 / 60.0, &[obstacle]);
        if frame % 60 == 0 {
            if let Some(snapshot) = sim.get_agent_snapshot(tracked) {
                info!(
                    "frame {:3}: agent {} at {:?}, {} neighbors",
                    frame,
                    tracked,
                    snapshot.position,
                    sim.get_neighbors(tracked).len()
                );
            }
        }
    }

    let snapshot = sim.get_agent_snapshot(tracked).expect("agent published");
    println!(
        "after 4s: agent {} at {:?} ({} agents simulated)",
        tracked,
        snapshot.position,
        sim.len()
    );
}
