use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use effectconfig::{EffectName, QualitySetting};

#[derive(Parser, Debug)]
#[command(
    name = "backdrop",
    author,
    version,
    about = "Procedural animated backgrounds rendered on the GPU"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open a preview window and animate the effect until it is closed.
    Run(RunArgs),
    /// Render a single frame on the CPU and write it as PNG.
    Snapshot(SnapshotArgs),
    /// Print the options an effect would run with as JSON.
    Describe(DescribeArgs),
}

/// Effect selection and tunables shared by every subcommand.
#[derive(Args, Debug, Default, Clone)]
pub struct EffectArgs {
    /// Effect to render: `vortex` or `starfield` (defaults to the config file's choice).
    #[arg(long, value_name = "EFFECT", value_parser = EffectName::parse)]
    pub effect: Option<EffectName>,

    /// Configuration file; defaults to `backdrop.toml` in the user config directory.
    #[arg(long, value_name = "PATH", env = "BACKDROP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Target frame rate (0 = the effect's default).
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Upper bound on the display density scale.
    #[arg(long, value_name = "SCALE")]
    pub max_density: Option<f32>,

    /// Quality tier: `auto`, `low`, or `high`.
    #[arg(long, value_name = "TIER", value_parser = QualitySetting::parse)]
    pub quality: Option<QualitySetting>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub effect: EffectArgs,

    /// Logical window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", default_value = "1280x720")]
    pub size: String,
}

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    #[command(flatten)]
    pub effect: EffectArgs,

    /// Animation time in seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 0.0)]
    pub time: f32,

    /// Image size in pixels (e.g. `640x360`).
    #[arg(long, value_name = "WIDTHxHEIGHT", default_value = "640x360")]
    pub size: String,

    /// Destination PNG.
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,
}

#[derive(Args, Debug)]
pub struct DescribeArgs {
    #[command(flatten)]
    pub effect: EffectArgs,

    /// Resolve as if running on a constrained (software or integrated) device.
    #[arg(long)]
    pub constrained: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_snapshot_arguments() {
        let cli = Cli::try_parse_from([
            "backdrop",
            "snapshot",
            "--effect",
            "vortex",
            "--time",
            "1.5",
            "--size",
            "64x48",
            "--out",
            "frame.png",
        ])
        .unwrap();
        let Command::Snapshot(args) = cli.command else {
            panic!("expected snapshot command");
        };
        assert_eq!(args.effect.effect, Some(EffectName::Vortex));
        assert_eq!(args.time, 1.5);
        assert_eq!(args.size, "64x48");
        assert_eq!(args.out, PathBuf::from("frame.png"));
    }

    #[test]
    fn rejects_unknown_effect() {
        let result = Cli::try_parse_from(["backdrop", "describe", "--effect", "plasma"]);
        assert!(result.is_err());
    }

    #[test]
    fn run_defaults_to_720p() {
        let cli = Cli::try_parse_from(["backdrop", "run", "--quality", "low"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.size, "1280x720");
        assert_eq!(args.effect.quality, Some(QualitySetting::Low));
    }
}
