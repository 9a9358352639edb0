use effectconfig::{BackdropConfig, EffectName, QualitySetting};
use renderer::{BackdropOptions, EffectKind, Quality, StarfieldParams, VortexParams};

use crate::cli::EffectArgs;

pub fn map_effect(effect: EffectName) -> EffectKind {
    match effect {
        EffectName::Vortex => EffectKind::Vortex,
        EffectName::Starfield => EffectKind::Starfield,
    }
}

pub fn map_quality(quality: QualitySetting) -> Quality {
    match quality {
        QualitySetting::Auto => Quality::Auto,
        QualitySetting::Low => Quality::Low,
        QualitySetting::High => Quality::High,
    }
}

/// Effect chosen on the command line, else the config file's default.
pub fn resolve_effect(args: &EffectArgs, config: &BackdropConfig) -> EffectKind {
    map_effect(args.effect.unwrap_or(config.defaults.effect))
}

/// Builds mount options for `effect`; command-line flags win over the file.
pub fn options_for(
    effect: EffectKind,
    args: &EffectArgs,
    config: &BackdropConfig,
) -> BackdropOptions {
    let effect_name = match effect {
        EffectKind::Vortex => EffectName::Vortex,
        EffectKind::Starfield => EffectName::Starfield,
    };
    let target_fps = match args.fps {
        Some(fps) if fps > 0.0 => Some(fps),
        Some(_) => None,
        None => config.fps_for(effect_name),
    };
    let max_density_scale = args
        .max_density
        .filter(|scale| scale.is_finite() && *scale > 0.0)
        .unwrap_or(config.defaults.max_density_scale);
    let quality = args.quality.unwrap_or(config.defaults.quality);

    let stars = &config.starfield;
    BackdropOptions {
        target_fps,
        max_density_scale: f64::from(max_density_scale),
        quality: map_quality(quality),
        vortex: VortexParams {
            inner_radius: config.vortex.inner_radius,
            outer_radius: config.vortex.outer_radius,
            zoom_speed: config.vortex.zoom_speed,
        },
        starfield: StarfieldParams {
            layers: stars.layers,
            intensity: stars.intensity,
            drift_speed: stars.drift_speed,
            seed: stars.seed,
            palette: stars.palette.clone(),
        },
        constrained_layers: stars.constrained_layers,
    }
}
