//! # Cave Walk Simulation
//!
//! Walks a group of players down a mined tunnel lined with hidden ore
//! pockets and reports what the masking pipeline sent them.
//!
//! ```text
//! cargo run --release --bin cave_walk_sim -- [players] [seconds]
//! ```
//!
//! Every pocket is sealed behind one block of stone, so a correct run
//! ends with each player seeing the pockets next to them masked.

use std::sync::Arc;

use cavecloak_index::{BlockAppearance, BlockKey, BlockPos, SpatialBlockIndex, WorldName};
use cavecloak_view::host::{MockServer, MockWorld, PlayerId, Transmission};
use cavecloak_view::{PlayerViewService, ServerTickClock, ViewConfig, SERVER_TICKS_PER_SECOND};
use cgmath::{Point3, Vector3};

const TUNNEL_LENGTH: i32 = 160;
const POCKET_SPACING: i32 = 4;
const WALK_SPEED_BLOCKS_PER_SECOND: f64 = 4.3;

fn build_world(index: &SpatialBlockIndex) -> (MockServer, usize) {
    let world = MockWorld::new("world").with_surface(100);
    world.fill_box(BlockPos::new(0, 40, -1), BlockPos::new(TUNNEL_LENGTH, 41, 1), &BlockAppearance::air());

    let name = WorldName::new("world");
    let original = BlockAppearance::from_material("stone");
    let mut pockets = 0;
    for x in (0..TUNNEL_LENGTH).step_by(POCKET_SPACING as usize) {
        for z in [3, -3] {
            let pos = BlockPos::new(x, 40, z);
            world.set_block(pos, BlockAppearance::air());
            index.track(&BlockKey::new(name.clone(), pos), &original);
            pockets += 1;
        }
    }
    (MockServer::new().with_world(world), pockets)
}

fn parse_arg(position: usize, default: u64) -> u64 {
    std::env::args().nth(position).and_then(|arg| arg.parse().ok()).unwrap_or(default)
}

fn main() {
    let players = parse_arg(1, 8);
    let seconds = parse_arg(2, 10);

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║              CAVECLOAK - CAVE WALK SIMULATION                    ║");
    println!("╠══════════════════════════════════════════════════════════════════╣");
    println!("║  Players: {players:<6}  Duration: {seconds:<4}s  Tunnel: {TUNNEL_LENGTH} blocks            ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");

    let index = Arc::new(SpatialBlockIndex::in_memory());
    let (server, pockets) = build_world(&index);
    for id in 0..players {
        let lane = f64::from(u32::try_from(id % 3).unwrap_or(0)) - 1.0;
        server.place_player(PlayerId(id), "world", Point3::new(0.5, 40.0, lane + 0.5), Vector3::new(1.0, 0.0, 0.0));
    }

    let mut service = PlayerViewService::new(Arc::new(server), Arc::new(ViewConfig::default()), index);
    if let Err(err) = service.start() {
        eprintln!("Failed to start view workers: {err}");
        std::process::exit(1);
    }
    for id in 0..players {
        service.initialize_player(PlayerId(id));
    }

    let total_ticks = seconds * u64::from(SERVER_TICKS_PER_SECOND);
    let step = WALK_SPEED_BLOCKS_PER_SECOND / f64::from(SERVER_TICKS_PER_SECOND);
    let mut clock = ServerTickClock::default();
    let mut view_ticks = 0u64;

    while clock.tick_count() < total_ticks {
        while clock.is_due() && clock.tick_count() < total_ticks {
            let start = clock.begin();
            #[allow(clippy::cast_precision_loss)]
            let travelled = (clock.tick_count() as f64 * step) % f64::from(TUNNEL_LENGTH - 2);
            for id in 0..players {
                let lane = f64::from(u32::try_from(id % 3).unwrap_or(0)) - 1.0;
                service.server().place_player(
                    PlayerId(id),
                    "world",
                    Point3::new(0.5 + travelled, 40.0, lane + 0.5),
                    Vector3::new(1.0, 0.0, 0.0),
                );
            }
            if service.on_server_tick() {
                view_ticks += 1;
            }
            clock.end(start);
        }
        clock.sleep_until_due();
    }

    let sent = service.server().take_transmissions();
    let block_changes = sent
        .iter()
        .filter(|t| matches!(t, Transmission::Block { .. } | Transmission::LegacyBlock { .. }))
        .count();
    let (mut masked, mut revealed) = (0usize, 0usize);
    let world = WorldName::new("world");
    for id in 0..players {
        if let Some(session) = service.session(PlayerId(id)) {
            for x in (0..TUNNEL_LENGTH).step_by(POCKET_SPACING as usize) {
                for z in [3, -3] {
                    let key = BlockKey::at(&world, x, 40, z);
                    masked += usize::from(session.is_masked(&key));
                    revealed += usize::from(session.is_revealed(&key));
                }
            }
        }
    }
    let stats = *clock.stats();
    service.shutdown();

    println!();
    println!("  Server ticks:        {}", clock.tick_count());
    println!("  View service ticks:  {view_ticks}");
    println!("  Tracked pockets:     {pockets}");
    println!("  Block changes sent:  {block_changes}");
    println!("  Pockets masked:      {masked}");
    println!("  Pockets revealed:    {revealed}");
    println!(
        "  Tick time (us):      min {} / avg {} / max {} ({} late)",
        stats.min_tick_us, stats.avg_tick_us, stats.max_tick_us, stats.late_ticks
    );

    if masked == 0 {
        eprintln!("No pocket was ever masked, the pipeline did not run");
        std::process::exit(1);
    }
}
