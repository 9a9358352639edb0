use anyhow::Result;
use renderer::{snapshot, BackdropOptions, EffectKind, EffectParams, PreviewConfig, ResolvedOptions};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use crate::bindings::{options_for, resolve_effect};
use crate::bootstrap::{load_config, parse_surface_size};
use crate::cli::{Cli, Command, DescribeArgs, EffectArgs, RunArgs, SnapshotArgs};
use crate::paths::AppPaths;

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    match cli.command {
        Command::Run(args) => run_window(args),
        Command::Snapshot(args) => run_snapshot(args),
        Command::Describe(args) => run_describe(args),
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn prepare(args: &EffectArgs) -> Result<(EffectKind, BackdropOptions)> {
    let paths = AppPaths::discover()?;
    tracing::debug!(config = %paths.config_dir().display(), "resolved backdrop paths");
    let config = load_config(args.config.as_deref(), &paths)?;
    let effect = resolve_effect(args, &config);
    Ok((effect, options_for(effect, args, &config)))
}

fn run_window(args: RunArgs) -> Result<()> {
    let (effect, options) = prepare(&args.effect)?;
    let size = parse_surface_size(&args.size)?;
    tracing::info!(%effect, width = size.0, height = size.1, "opening preview window");
    let mut config = PreviewConfig::new(effect, options);
    config.size = size;
    renderer::run_preview(config)
}

fn run_snapshot(args: SnapshotArgs) -> Result<()> {
    let (effect, options) = prepare(&args.effect)?;
    let (width, height) = parse_surface_size(&args.size)?;
    let resolved = options.resolve(effect, false);
    snapshot::export_png(&resolved.params, args.time, width, height, &args.out)
}

fn run_describe(args: DescribeArgs) -> Result<()> {
    let (effect, options) = prepare(&args.effect)?;
    let resolved = options.resolve(effect, args.constrained);
    println!("{}", serde_json::to_string_pretty(&describe(&resolved))?);
    Ok(())
}

fn describe(resolved: &ResolvedOptions) -> Value {
    let params = match &resolved.params {
        EffectParams::Vortex(vortex) => json!({
            "inner_radius": vortex.inner_radius,
            "outer_radius": vortex.outer_radius,
            "zoom_speed": vortex.zoom_speed,
        }),
        EffectParams::Starfield(stars) => json!({
            "layers": stars.layers,
            "intensity": stars.intensity,
            "drift_speed": stars.drift_speed,
            "seed": stars.seed,
            "palette": stars
                .palette
                .iter()
                .map(|rgb| effectconfig::format_hex_color(*rgb))
                .collect::<Vec<_>>(),
        }),
    };
    json!({
        "effect": resolved.effect.name(),
        "target_fps": resolved.target_fps,
        "max_density_scale": resolved.max_density_scale,
        "constrained": resolved.constrained,
        "params": params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_starfield_defaults() {
        let resolved = BackdropOptions::default().resolve(EffectKind::Starfield, false);
        let value = describe(&resolved);
        assert_eq!(value["effect"], "starfield");
        assert_eq!(value["target_fps"], 30.0);
        assert_eq!(value["params"]["layers"], 6);
        assert_eq!(value["params"]["palette"][0], "#ffe6b3");
    }

    #[test]
    fn describes_constrained_vortex() {
        let resolved = BackdropOptions::default().resolve(EffectKind::Vortex, true);
        let value = describe(&resolved);
        assert_eq!(value["effect"], "vortex");
        assert_eq!(value["constrained"], true);
        assert_eq!(value["max_density_scale"], 1.0);
        assert!(value["params"].get("layers").is_none());
    }
}
