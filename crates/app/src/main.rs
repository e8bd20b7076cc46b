use std::path::{Path, PathBuf};

use beatmap_timeline_core::{
    Beatmap, ContainerEvent, DrawableHitObject, EngineConfig, PlaybackClock, Playfield,
    SliderShape,
};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() -> beatmap_timeline_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            objects,
            spacing,
            frame_ms,
            duration_ms,
            edit_every_ms,
            config,
        } => run_simulate(
            objects,
            spacing,
            frame_ms,
            duration_ms,
            edit_every_ms,
            config.as_deref(),
        ),
        Commands::Seek {
            objects,
            spacing,
            to,
            config,
        } => run_seek(objects, spacing, &to, config.as_deref()),
    }
}

fn run_simulate(
    objects: usize,
    spacing: f64,
    frame_ms: f64,
    duration_ms: f64,
    edit_every_ms: Option<f64>,
    config: Option<&Path>,
) -> beatmap_timeline_core::Result<()> {
    let config = load_config(config)?;
    let mut beatmap = synthetic_beatmap(objects, spacing);
    let mut playfield = build_playfield(&config, &beatmap)?;
    info!(objects = beatmap.len(), frame_ms, duration_ms, "starting simulation");

    let mut clock = PlaybackClock::default();
    let mut summary = EventSummary::default();
    let mut frames = 0usize;
    let mut peak_alive = 0usize;
    let mut edits = 0usize;
    let edit_interval = edit_every_ms.filter(|ms| *ms > 0.0);
    let mut next_edit = edit_interval.unwrap_or(f64::INFINITY);

    while clock.current_time() <= duration_ms {
        if let Some(interval) = edit_interval {
            if clock.current_time() >= next_edit {
                nudge_next_object(&mut beatmap, clock.current_time(), spacing / 4.0);
                next_edit += interval;
            }
        }
        edits += playfield.schedule_changes(beatmap.take_changed());

        if playfield.update(&beatmap, &clock)? {
            debug!(
                time = clock.current_time(),
                alive = playfield.alive_count(),
                "alive set changed"
            );
        }
        summary.record(&playfield.drain_events());
        peak_alive = peak_alive.max(playfield.alive_count());
        frames += 1;
        clock.advance(frame_ms);
    }

    info!(
        frames,
        peak_alive,
        edits,
        began = summary.began,
        finished = summary.finished,
        crossings = summary.crossings,
        "simulation finished"
    );
    log_pool_stats(&playfield);
    Ok(())
}

fn run_seek(
    objects: usize,
    spacing: f64,
    targets: &[f64],
    config: Option<&Path>,
) -> beatmap_timeline_core::Result<()> {
    let config = load_config(config)?;
    let beatmap = synthetic_beatmap(objects, spacing);
    let mut playfield = build_playfield(&config, &beatmap)?;

    let mut clock = PlaybackClock::default();
    for &target in targets {
        clock.seek(target);
        playfield.update(&beatmap, &clock)?;

        let mut summary = EventSummary::default();
        summary.record(&playfield.drain_events());
        info!(
            time = target,
            alive = playfield.alive_count(),
            became_alive = summary.alive,
            became_dead = summary.dead,
            crossings = summary.crossings,
            "seek applied"
        );
    }

    log_pool_stats(&playfield);
    Ok(())
}

fn load_config(path: Option<&Path>) -> beatmap_timeline_core::Result<EngineConfig> {
    match path {
        Some(path) => {
            info!(?path, "loading engine configuration");
            EngineConfig::load(path)
        }
        None => Ok(EngineConfig::editor_defaults()),
    }
}

fn build_playfield(
    config: &EngineConfig,
    beatmap: &Beatmap,
) -> beatmap_timeline_core::Result<Playfield<DrawableHitObject>> {
    let mut playfield = Playfield::with_factory(config, DrawableHitObject::new);
    for id in beatmap.top_level() {
        playfield.add_hit_object(beatmap, id)?;
    }
    Ok(playfield)
}

/// Circles with a slider every fourth object and a spinner every tenth.
fn synthetic_beatmap(objects: usize, spacing: f64) -> Beatmap {
    let mut beatmap = Beatmap::new();
    for index in 0..objects {
        let time = index as f64 * spacing;
        match index {
            i if i % 10 == 9 => {
                beatmap.add_spinner(time, spacing * 3.0);
            }
            i if i % 4 == 3 => {
                beatmap.add_slider(
                    time,
                    spacing * 2.0,
                    SliderShape {
                        repeats: (i % 3) as u32,
                        tick_interval: spacing / 2.0,
                    },
                );
            }
            _ => {
                beatmap.add_circle(time);
            }
        }
    }
    beatmap
}

/// Pushes the first object starting after `time` later by `offset`.
fn nudge_next_object(beatmap: &mut Beatmap, time: f64, offset: f64) -> bool {
    let next = beatmap.top_level().into_iter().find_map(|id| {
        beatmap
            .get(id)
            .map(|object| object.start_time)
            .filter(|start| *start > time)
            .map(|start| (id, start))
    });
    match next {
        Some((id, start)) => {
            debug!(?id, from = start, to = start + offset, "object moved");
            beatmap.set_start_time(id, start + offset)
        }
        None => false,
    }
}

fn log_pool_stats(playfield: &Playfield<DrawableHitObject>) {
    for (kind, stats) in playfield.container().pools().stats() {
        info!(
            ?kind,
            constructed = stats.constructed,
            in_use = stats.in_use,
            idle = stats.idle,
            peak_in_use = stats.peak_in_use,
            overflow = stats.overflow,
            "pool"
        );
    }
}

#[derive(Debug, Default)]
struct EventSummary {
    alive: usize,
    dead: usize,
    began: usize,
    finished: usize,
    crossings: usize,
}

impl EventSummary {
    fn record(&mut self, events: &[ContainerEvent]) {
        for event in events {
            match event {
                ContainerEvent::BecameAlive { .. } => self.alive += 1,
                ContainerEvent::BecameDead { .. } => self.dead += 1,
                ContainerEvent::UsageBegan(_) => self.began += 1,
                ContainerEvent::UsageFinished(_) => self.finished += 1,
                ContainerEvent::CrossedBoundary { .. } => self.crossings += 1,
                ContainerEvent::IntervalChanged { .. } | ContainerEvent::NewResult { .. } => {}
            }
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Beatmap timeline engine driver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a synthetic beatmap back frame by frame.
    Simulate {
        /// Number of top-level objects to generate.
        #[arg(long, default_value_t = 200)]
        objects: usize,
        /// Milliseconds between consecutive objects.
        #[arg(long, default_value_t = 250.0)]
        spacing: f64,
        /// Frame length in milliseconds.
        #[arg(long, default_value_t = 16.0)]
        frame_ms: f64,
        /// How long to play back for, in milliseconds.
        #[arg(long, default_value_t = 60_000.0)]
        duration_ms: f64,
        /// Move the next upcoming object every this many milliseconds.
        #[arg(long)]
        edit_every_ms: Option<f64>,
        /// Optional JSON engine configuration.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Jump to each of the given times and report what changed.
    Seek {
        #[arg(long, default_value_t = 200)]
        objects: usize,
        #[arg(long, default_value_t = 250.0)]
        spacing: f64,
        /// Times to seek to, in order.
        #[arg(long, num_args = 1.., required = true, allow_negative_numbers = true)]
        to: Vec<f64>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
