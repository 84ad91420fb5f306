//! Runs a small fluid network without a game attached and logs what flows where.
//!
//! Usage: `rebar-headless [seconds]`. Stops early on Ctrl-C.

use std::{
    env,
    sync::{Arc, LazyLock},
    time::Duration,
};

use rebar::{RebarPlugin, logger};
use rebar_fluid::{
    Fluid, FluidPoint, FluidPointType, FluidSource, FluidTank, FluidTemperature, PipeSpec,
    PointId, REBAR_CONFIG,
};
use rebar_utils::{BlockPos, Identifier};
use tokio::{select, signal, time};

static RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime")
});

const DEFAULT_SECONDS: u64 = 10;

fn main() {
    logger::init_logging();

    let seconds = match env::args().nth(1).map(|arg| arg.parse::<u64>()) {
        None => DEFAULT_SECONDS,
        Some(Ok(seconds)) => seconds,
        Some(Err(e)) => {
            log::error!("Invalid number of seconds: {e}");
            return;
        }
    };

    RUNTIME.block_on(run(seconds));
}

/// Adds a point to the network and returns its id.
fn add_point(plugin: &RebarPlugin, pos: BlockPos, point_type: FluidPointType) -> PointId {
    let point = FluidPoint::new(pos, point_type);
    let id = point.id();
    plugin.manager().add(point);
    id
}

async fn run(seconds: u64) {
    let config = *REBAR_CONFIG;
    let plugin = RebarPlugin::new(config, RUNTIME.handle().clone());
    plugin.start();

    let water = Fluid::with_temperature(Identifier::rebar("water".to_owned()), FluidTemperature::Normal);
    let lava = Fluid::with_temperature(Identifier::rebar("lava".to_owned()), FluidTemperature::Hot);
    let pipe = PipeSpec {
        fluid_per_second: 8.0,
        allowed_temperatures: Some(vec![FluidTemperature::Cold, FluidTemperature::Normal]),
    };

    // Two sources feeding a pipe that only carries water into two tanks
    let world = plugin.world();
    let tanks = [
        (BlockPos::new(5, 64, 0), Arc::new(FluidTank::new(50.0))),
        (BlockPos::new(5, 64, 1), Arc::new(FluidTank::new(50.0))),
    ];
    world.place(
        BlockPos::new(0, 64, 0),
        Arc::new(FluidSource::new(water, 20.0, config)),
    );
    world.place(
        BlockPos::new(0, 64, 1),
        Arc::new(FluidSource::new(lava, 20.0, config)),
    );
    for (pos, tank) in &tanks {
        world.place(*pos, tank.clone());
    }

    let water_out = add_point(&plugin, BlockPos::new(0, 64, 0), FluidPointType::Output);
    let lava_out = add_point(&plugin, BlockPos::new(0, 64, 1), FluidPointType::Output);
    let pipe_points: Vec<PointId> = (1..5)
        .map(|x| add_point(&plugin, BlockPos::new(x, 64, 0), FluidPointType::Intersection))
        .collect();
    let tank_points: Vec<PointId> = tanks
        .iter()
        .map(|(pos, _)| add_point(&plugin, *pos, FluidPointType::Input))
        .collect();

    let manager = plugin.manager();
    manager.connect(water_out, pipe_points[0]);
    manager.connect(lava_out, pipe_points[0]);
    for pair in pipe_points.windows(2) {
        manager.connect(pair[0], pair[1]);
    }
    for tank in &tank_points {
        manager.connect(*tank, pipe_points[3]);
    }
    if let Some(segment) = manager.segment_of(pipe_points[0]) {
        pipe.apply(manager, segment);
    }
    log::info!(
        "Built a network of {} points in {} segment(s)",
        manager.point_count(),
        manager.segment_count()
    );

    let mut report = time::interval(Duration::from_secs(1));
    let deadline = time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    let mut elapsed = 0;

    loop {
        select! {
            () = &mut deadline => break,
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    log::error!("Failed to listen for Ctrl-C: {e}");
                }
                break;
            }
            _ = report.tick() => {
                for (pos, tank) in &tanks {
                    log::info!(
                        "[{elapsed}s] Tank at {pos}: {:.2}/{:.2} {}",
                        tank.fluid_amount(),
                        tank.fluid_capacity(),
                        tank.fluid_type().map_or_else(|| "empty".to_owned(), |fluid| fluid.to_string())
                    );
                }
                elapsed += 1;

                // Simulate the middle of the pipe's chunk unloading and loading again
                if elapsed == seconds / 2 {
                    let point = manager.unload(pipe_points[2]);
                    log::info!("Unloaded pipe point, {} segment(s)", manager.segment_count());
                    manager.add(point);
                    if let Some(segment) = manager.segment_of(pipe_points[2]) {
                        log::info!(
                            "Reloaded pipe point, {} segment(s), still limited to {}/s",
                            manager.segment_count(),
                            manager.fluid_per_second(segment)
                        );
                    }
                }
            }
        }
    }

    plugin.shutdown().await;
}
