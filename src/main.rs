//! Tokendrop: drop character tokens, stack them, merge matching tiers into bigger ones.

mod app;
mod assets;
mod game;
mod input;
mod merge;
mod physics;
mod theme;
mod ui;

use anyhow::{Context, Result};
use app::App;
use assets::{AssetManifest, PendingAssets};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Simulation options derived from the CLI.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub gravity: f32,
    pub floor: FloorPolicy,
    pub damping: f32,
    pub next: NextPolicy,
    pub drift: DropVelocity,
    pub base_radius: f32,
    pub radius_step: f32,
    pub nudge_step: f32,
    pub seed: u64,
}

impl GameConfig {
    /// Radius of a token of the given tier.
    pub fn radius_for(&self, tier: usize) -> f32 {
        self.base_radius + tier as f32 * self.radius_step
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            gravity: 0.12,
            floor: FloorPolicy::Settle,
            damping: 0.7,
            next: NextPolicy::Random,
            drift: DropVelocity::Zero,
            base_radius: 3.0,
            radius_step: 1.0,
            nudge_step: 2.0,
            seed: 0,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;

    let theme = theme::Theme::load(args.theme.as_deref()).unwrap_or_else(|e| {
        log::warn!("theme: {}, using defaults", e);
        theme::Theme::default()
    });
    let manifest = match &args.manifest {
        Some(path) => AssetManifest::load(path)
            .with_context(|| format!("loading manifest {}", path.display()))?,
        None => AssetManifest::builtin(),
    };
    if args.check_assets {
        return check_assets(manifest);
    }
    let config = GameConfig {
        gravity: args.gravity,
        floor: args.floor,
        damping: args.damping,
        next: args.next,
        drift: args.drift,
        base_radius: args.base_radius,
        radius_step: args.radius_step,
        nudge_step: args.nudge,
        seed: args.seed.unwrap_or_else(clock_seed),
    };
    log::info!(
        "starting: {} tiers, seed {}, floor {:?}, next {:?}",
        manifest.tier_count(),
        config.seed,
        config.floor,
        config.next
    );

    let mut app = App::new(config, theme, manifest, args.frame_rate);
    app.run()?;
    Ok(())
}

/// Load every tier, wait for the barrier and print what loaded.
fn check_assets(manifest: AssetManifest) -> Result<()> {
    let registry = PendingAssets::spawn(manifest).wait();
    let mut missing = 0;
    for kind in registry.iter() {
        let status = if kind.image.is_some() {
            "ok"
        } else {
            missing += 1;
            "MISSING"
        };
        println!("{:>2}  {:<16} {}", kind.tier + 1, kind.name, status);
    }
    if missing > 0 {
        anyhow::bail!("{} of {} token images failed to load", missing, registry.len());
    }
    Ok(())
}

/// Logs go to `--log-file` when given; otherwise only `RUST_LOG` enables them,
/// since stderr shares the terminal with the game.
fn init_logging(log_file: Option<&std::path::Path>) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            builder
                .filter_level(log::LevelFilter::Info)
                .parse_env("RUST_LOG")
                .target(env_logger::Target::Pipe(Box::new(file)));
        }
        None => {
            builder.filter_level(log::LevelFilter::Off).parse_env("RUST_LOG");
        }
    }
    builder.init();
    Ok(())
}

fn clock_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x5eed)
}

/// Drop-and-merge character token game in the terminal.
#[derive(Debug, Parser)]
#[command(
    name = "tokendrop",
    version,
    about = "Drop character tokens; two of the same tier that touch merge into the next tier.",
    long_about = "Tokendrop is a terminal drop-and-merge game.\n\n\
        Move the hanging token and drop it into the field. Tokens fall, stack and, when two \
        of the same tier touch, merge into the next tier for points. The game ends when the \
        pile reaches the top.\n\n\
        CONTROLS:\n  Left/Right  Move    Space  Drop    Q / Esc  Quit    R  Restart (after game over)\n\n\
        Use --manifest to load your own token images (TOML with `names` and `images` lists)."
)]
pub struct Args {
    /// Asset manifest (TOML: `names = [..]`, `images = [..]`, equal length). Built-in roster if not set.
    #[arg(short, long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Path to theme file (btop-style theme[key]=\"value\"). Uses One Dark if not set.
    #[arg(short, long, value_name = "FILE")]
    pub theme: Option<PathBuf>,

    /// Vertical velocity added every frame.
    #[arg(long, default_value = "0.12", value_name = "G")]
    pub gravity: f32,

    /// Floor response: settle (stop dead) or bounce (reflect with damping).
    #[arg(long, default_value = "settle")]
    pub floor: FloorPolicy,

    /// Fraction of vertical speed kept on a floor bounce.
    #[arg(long, default_value = "0.7", value_name = "FACTOR")]
    pub damping: f32,

    /// How the next token is chosen: random tier, or cycle through tiers in order.
    #[arg(long, default_value = "random")]
    pub next: NextPolicy,

    /// Horizontal velocity of dropped tokens: zero, or a small random drift.
    #[arg(long, default_value = "zero")]
    pub drift: DropVelocity,

    /// Radius of a tier-0 token, in field pixels (one cell wide, half a cell tall).
    #[arg(long, default_value = "3.0", value_name = "PX")]
    pub base_radius: f32,

    /// Radius added per tier.
    #[arg(long, default_value = "1.0", value_name = "PX")]
    pub radius_step: f32,

    /// Horizontal step of a left/right nudge.
    #[arg(long, default_value = "2.0", value_name = "PX")]
    pub nudge: f32,

    /// Simulation and render frames per second.
    #[arg(long, default_value = "60.0", value_name = "RATE")]
    pub frame_rate: f64,

    /// RNG seed for next-token choice and drift. Derived from the clock if not set.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Load the token images, list which tiers loaded, and exit.
    #[arg(long)]
    pub check_assets: bool,

    /// Write logs to this file (level from RUST_LOG, default info).
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FloorPolicy {
    #[default]
    Settle,
    Bounce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum NextPolicy {
    #[default]
    Random,
    Cycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DropVelocity {
    #[default]
    Zero,
    #[value(alias = "drift")]
    Random,
}
