use std::fmt;

use scheduler::LoopError;

use crate::context::ContextUnavailable;

/// Upper bound for the device pixel density scale unless the host overrides it.
///
/// Fill-rate cost grows with the square of the scale, so high-density panels are
/// rendered at most at 2x.
pub const DEFAULT_MAX_DENSITY_SCALE: f64 = 2.0;

/// Density clamp applied on constrained devices.
pub const CONSTRAINED_MAX_DENSITY_SCALE: f64 = 1.0;

/// Upper bound on starfield depth layers; the fragment program loops this many times.
pub const MAX_STAR_LAYERS: u32 = 8;

/// Number of `vec4` palette slots in the uniform block.
pub const MAX_PALETTE_COLORS: usize = 5;

/// Procedural effect selected when mounting a backdrop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Vortex,
    #[default]
    Starfield,
}

impl EffectKind {
    pub const ALL: [EffectKind; 2] = [EffectKind::Vortex, EffectKind::Starfield];

    /// Target frame rate used when the host does not request one.
    pub fn default_fps(self) -> f32 {
        match self {
            EffectKind::Vortex => 24.0,
            EffectKind::Starfield => 30.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EffectKind::Vortex => "vortex",
            EffectKind::Starfield => "starfield",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    Vertex,
    Fragment,
}

impl StageKind {
    pub(crate) fn naga_stage(self) -> wgpu::naga::ShaderStage {
        match self {
            StageKind::Vertex => wgpu::naga::ShaderStage::Vertex,
            StageKind::Fragment => wgpu::naga::ShaderStage::Fragment,
        }
    }
}

/// Step of the shader build that produced a [`BuildError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildStage {
    Vertex,
    Fragment,
    Link,
}

impl From<StageKind> for BuildStage {
    fn from(stage: StageKind) -> Self {
        match stage {
            StageKind::Vertex => BuildStage::Vertex,
            StageKind::Fragment => BuildStage::Fragment,
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildStage::Vertex => "vertex",
            BuildStage::Fragment => "fragment",
            BuildStage::Link => "link",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{stage} stage failed:\n{diagnostic}")]
pub struct BuildError {
    pub stage: BuildStage,
    pub diagnostic: String,
}

impl BuildError {
    pub fn new(stage: BuildStage, diagnostic: impl Into<String>) -> Self {
        Self {
            stage,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Failures reported by [`crate::attach`] and [`crate::Backdrop::mount`].
///
/// All of them are terminal to the one backdrop instance; the host surface is
/// simply left blank.
#[derive(Debug, thiserror::Error)]
pub enum BackdropError {
    #[error(transparent)]
    ContextUnavailable(#[from] ContextUnavailable),
    #[error("shader build failed: {0}")]
    ShaderBuild(#[from] BuildError),
    #[error("backdrop is already mounted")]
    AlreadyMounted,
    #[error(transparent)]
    Loop(#[from] LoopError),
}

/// Fault raised while drawing a frame; stops the render loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DrawError {
    #[error("{0} handle does not refer to a live object")]
    UnknownHandle(&'static str),
    #[error("GPU is out of memory")]
    OutOfMemory,
    #[error("device error: {0}")]
    Device(String),
}

/// Coarse quality tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Quality {
    /// Let the device profile decide.
    #[default]
    Auto,
    /// Always use constrained settings.
    Low,
    /// Always use full settings.
    High,
}

impl Quality {
    pub fn is_constrained(self, device_constrained: bool) -> bool {
        match self {
            Quality::Auto => device_constrained,
            Quality::Low => true,
            Quality::High => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VortexParams {
    pub inner_radius: f32,
    pub outer_radius: f32,
    pub zoom_speed: f32,
}

impl Default for VortexParams {
    fn default() -> Self {
        Self {
            inner_radius: 0.2,
            outer_radius: 0.9,
            zoom_speed: 0.2,
        }
    }
}

impl VortexParams {
    /// The log-polar warp needs `0 < inner_radius < outer_radius`; anything else
    /// divides by a zero-width band.
    pub fn is_well_formed(&self) -> bool {
        self.inner_radius.is_finite()
            && self.outer_radius.is_finite()
            && self.zoom_speed.is_finite()
            && self.inner_radius > 0.0
            && self.inner_radius < self.outer_radius
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StarfieldParams {
    /// Active depth layers, `1..=MAX_STAR_LAYERS`.
    pub layers: u32,
    pub intensity: f32,
    pub drift_speed: f32,
    pub seed: u32,
    /// Linear RGB tones, `1..=MAX_PALETTE_COLORS` entries.
    pub palette: Vec<[f32; 3]>,
}

impl Default for StarfieldParams {
    fn default() -> Self {
        Self {
            layers: 6,
            intensity: 1.6,
            drift_speed: 0.05,
            seed: 0,
            palette: default_palette(),
        }
    }
}

pub fn default_palette() -> Vec<[f32; 3]> {
    vec![
        [1.0, 230.0 / 255.0, 179.0 / 255.0],
        [158.0 / 255.0, 197.0 / 255.0, 1.0],
        [1.0, 1.0, 1.0],
        [1.0, 179.0 / 255.0, 138.0 / 255.0],
    ]
}

/// Options accepted by [`crate::attach`].
#[derive(Clone, Debug, PartialEq)]
pub struct BackdropOptions {
    /// `None` uses [`EffectKind::default_fps`].
    pub target_fps: Option<f32>,
    pub max_density_scale: f64,
    pub quality: Quality,
    pub vortex: VortexParams,
    pub starfield: StarfieldParams,
    /// Star layers used instead of `starfield.layers` on constrained devices.
    pub constrained_layers: u32,
}

impl Default for BackdropOptions {
    fn default() -> Self {
        Self {
            target_fps: None,
            max_density_scale: DEFAULT_MAX_DENSITY_SCALE,
            quality: Quality::Auto,
            vortex: VortexParams::default(),
            starfield: StarfieldParams::default(),
            constrained_layers: 3,
        }
    }
}

impl BackdropOptions {
    /// Applies per-effect defaults and the quality tier.
    pub fn resolve(&self, effect: EffectKind, device_constrained: bool) -> ResolvedOptions {
        let constrained = self.quality.is_constrained(device_constrained);
        let target_fps = self
            .target_fps
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .unwrap_or_else(|| effect.default_fps());

        let mut max_density_scale =
            if self.max_density_scale.is_finite() && self.max_density_scale > 0.0 {
                self.max_density_scale
            } else {
                DEFAULT_MAX_DENSITY_SCALE
            };
        if constrained {
            max_density_scale = max_density_scale.min(CONSTRAINED_MAX_DENSITY_SCALE);
        }

        let params = match effect {
            EffectKind::Vortex if self.vortex.is_well_formed() => {
                EffectParams::Vortex(self.vortex)
            }
            EffectKind::Vortex => {
                tracing::warn!(
                    inner_radius = self.vortex.inner_radius,
                    outer_radius = self.vortex.outer_radius,
                    zoom_speed = self.vortex.zoom_speed,
                    "vortex parameters out of range; using defaults"
                );
                EffectParams::Vortex(VortexParams::default())
            }
            EffectKind::Starfield => {
                let mut starfield = self.starfield.clone();
                let requested = if constrained {
                    self.constrained_layers.min(starfield.layers)
                } else {
                    starfield.layers
                };
                starfield.layers = requested.clamp(1, MAX_STAR_LAYERS);
                starfield.palette.truncate(MAX_PALETTE_COLORS);
                if starfield.palette.is_empty() {
                    starfield.palette = default_palette();
                }
                EffectParams::Starfield(starfield)
            }
        };

        ResolvedOptions {
            effect,
            target_fps,
            max_density_scale,
            constrained,
            params,
        }
    }
}

/// Effect-specific tunables after quality resolution.
#[derive(Clone, Debug, PartialEq)]
pub enum EffectParams {
    Vortex(VortexParams),
    Starfield(StarfieldParams),
}

impl EffectParams {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectParams::Vortex(_) => EffectKind::Vortex,
            EffectParams::Starfield(_) => EffectKind::Starfield,
        }
    }
}

/// Settings a mounted backdrop actually runs with.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedOptions {
    pub effect: EffectKind,
    pub target_fps: f32,
    pub max_density_scale: f64,
    pub constrained: bool,
    pub params: EffectParams,
}
