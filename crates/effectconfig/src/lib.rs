use std::fmt;

use serde::de::{self, Deserializer};
use serde::Deserialize;

/// Upper bound on parallax layers; mirrors the loop bound compiled into the starfield program.
pub const MAX_STAR_LAYERS: u32 = 8;
/// Upper bound on starfield palette entries; mirrors the uniform array length.
pub const MAX_PALETTE_COLORS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectName {
    Vortex,
    #[default]
    Starfield,
}

impl EffectName {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "vortex" | "blackhole" | "black-hole" | "droste" => Ok(Self::Vortex),
            "starfield" | "stars" => Ok(Self::Starfield),
            other => Err(format!(
                "unknown effect '{other}'; expected 'vortex' or 'starfield'"
            )),
        }
    }
}

impl fmt::Display for EffectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectName::Vortex => f.write_str("vortex"),
            EffectName::Starfield => f.write_str("starfield"),
        }
    }
}

/// Coarse quality tier. `Auto` defers to the rendering context's device profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualitySetting {
    #[default]
    Auto,
    Low,
    High,
}

impl QualitySetting {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" | "default" => Ok(Self::Auto),
            "low" | "mobile" | "constrained" => Ok(Self::Low),
            "high" | "desktop" | "full" => Ok(Self::High),
            other => Err(format!("invalid quality setting '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackdropConfig {
    pub version: u32,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub vortex: VortexSection,
    #[serde(default)]
    pub starfield: StarfieldSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub effect: EffectName,
    #[serde(default = "default_max_density_scale")]
    pub max_density_scale: f32,
    #[serde(default)]
    pub quality: QualitySetting,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            effect: EffectName::default(),
            max_density_scale: default_max_density_scale(),
            quality: QualitySetting::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VortexSection {
    #[serde(default)]
    pub fps: Option<f32>,
    #[serde(default = "default_inner_radius")]
    pub inner_radius: f32,
    #[serde(default = "default_outer_radius")]
    pub outer_radius: f32,
    #[serde(default = "default_zoom_speed")]
    pub zoom_speed: f32,
}

impl Default for VortexSection {
    fn default() -> Self {
        Self {
            fps: None,
            inner_radius: default_inner_radius(),
            outer_radius: default_outer_radius(),
            zoom_speed: default_zoom_speed(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StarfieldSection {
    #[serde(default)]
    pub fps: Option<f32>,
    #[serde(default = "default_layers")]
    pub layers: u32,
    #[serde(default = "default_constrained_layers")]
    pub constrained_layers: u32,
    #[serde(default = "default_intensity")]
    pub intensity: f32,
    #[serde(default = "default_drift_speed")]
    pub drift_speed: f32,
    #[serde(default)]
    pub seed: u32,
    #[serde(default = "default_palette", deserialize_with = "deserialize_palette")]
    pub palette: Vec<[f32; 3]>,
}

impl Default for StarfieldSection {
    fn default() -> Self {
        Self {
            fps: None,
            layers: default_layers(),
            constrained_layers: default_constrained_layers(),
            intensity: default_intensity(),
            drift_speed: default_drift_speed(),
            seed: 0,
            palette: default_palette(),
        }
    }
}

fn default_max_density_scale() -> f32 {
    2.0
}

fn default_inner_radius() -> f32 {
    0.2
}

fn default_outer_radius() -> f32 {
    0.9
}

fn default_zoom_speed() -> f32 {
    0.2
}

fn default_layers() -> u32 {
    6
}

fn default_constrained_layers() -> u32 {
    3
}

fn default_intensity() -> f32 {
    1.6
}

fn default_drift_speed() -> f32 {
    0.05
}

fn default_palette() -> Vec<[f32; 3]> {
    ["#ffe6b3", "#9ec5ff", "#ffffff", "#ffb38a"]
        .iter()
        .filter_map(|raw| parse_hex_color(raw).ok())
        .collect()
}

fn deserialize_palette<'de, D>(deserializer: D) -> Result<Vec<[f32; 3]>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Hex(String),
        Rgb([f32; 3]),
    }

    let entries: Vec<Helper> = Vec::deserialize(deserializer)?;
    entries
        .into_iter()
        .map(|entry| match entry {
            Helper::Hex(raw) => parse_hex_color(&raw).map_err(de::Error::custom),
            Helper::Rgb(rgb) => Ok(rgb),
        })
        .collect()
}

/// Parses `#rrggbb` (leading `#` optional) into linear 0..1 channels.
pub fn parse_hex_color(raw: &str) -> Result<[f32; 3], String> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if digits.len() != 6 || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(format!("invalid color '{raw}'; expected #rrggbb"));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16)
            .map(|value| value as f32 / 255.0)
            .map_err(|err| format!("invalid color '{raw}': {err}"))
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

pub fn format_hex_color(rgb: [f32; 3]) -> String {
    let byte = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
    format!("#{:02x}{:02x}{:02x}", byte(rgb[0]), byte(rgb[1]), byte(rgb[2]))
}

impl Default for BackdropConfig {
    fn default() -> Self {
        Self {
            version: 1,
            defaults: Defaults::default(),
            vortex: VortexSection::default(),
            starfield: StarfieldSection::default(),
        }
    }
}

impl BackdropConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: BackdropConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Frame rate requested for `effect`, or `None` to use the effect's built-in default.
    pub fn fps_for(&self, effect: EffectName) -> Option<f32> {
        let fps = match effect {
            EffectName::Vortex => self.vortex.fps,
            EffectName::Starfield => self.starfield.fps,
        };
        fps.filter(|value| *value > 0.0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let scale = self.defaults.max_density_scale;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ConfigError::Invalid(
                "defaults.max_density_scale must be greater than zero".into(),
            ));
        }

        for (section, fps) in [("vortex", self.vortex.fps), ("starfield", self.starfield.fps)] {
            if let Some(fps) = fps {
                if !fps.is_finite() || fps < 0.0 {
                    return Err(ConfigError::Invalid(format!("{section}.fps must be >= 0")));
                }
            }
        }

        let vortex = &self.vortex;
        if !(vortex.inner_radius > 0.0 && vortex.inner_radius < vortex.outer_radius) {
            return Err(ConfigError::Invalid(format!(
                "vortex radii must satisfy 0 < inner_radius < outer_radius (got {} and {})",
                vortex.inner_radius, vortex.outer_radius
            )));
        }
        if !vortex.outer_radius.is_finite() || !vortex.zoom_speed.is_finite() {
            return Err(ConfigError::Invalid(
                "vortex radii and zoom_speed must be finite".into(),
            ));
        }

        let stars = &self.starfield;
        if stars.layers == 0 || stars.layers > MAX_STAR_LAYERS {
            return Err(ConfigError::Invalid(format!(
                "starfield.layers must be between 1 and {MAX_STAR_LAYERS}"
            )));
        }
        if stars.constrained_layers == 0 || stars.constrained_layers > stars.layers {
            return Err(ConfigError::Invalid(
                "starfield.constrained_layers must be between 1 and starfield.layers".into(),
            ));
        }
        if !stars.intensity.is_finite() || stars.intensity <= 0.0 {
            return Err(ConfigError::Invalid(
                "starfield.intensity must be greater than zero".into(),
            ));
        }
        if !stars.drift_speed.is_finite() {
            return Err(ConfigError::Invalid(
                "starfield.drift_speed must be finite".into(),
            ));
        }
        if stars.palette.is_empty() || stars.palette.len() > MAX_PALETTE_COLORS {
            return Err(ConfigError::Invalid(format!(
                "starfield.palette must contain between 1 and {MAX_PALETTE_COLORS} colors"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
version = 1

[defaults]
effect = "vortex"
max_density_scale = 1.5
quality = "low"

[vortex]
fps = 24
inner_radius = 0.25
outer_radius = 0.8
zoom_speed = 0.3

[starfield]
fps = 30
layers = 5
constrained_layers = 2
seed = 7
palette = ["#ff0000", [0.0, 1.0, 0.0], "0000ff"]
"##;

    #[test]
    fn parses_sample_config() {
        let config = BackdropConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.defaults.effect, EffectName::Vortex);
        assert_eq!(config.defaults.quality, QualitySetting::Low);
        assert_eq!(config.vortex.inner_radius, 0.25);
        assert_eq!(config.starfield.layers, 5);
        assert_eq!(config.starfield.seed, 7);
        assert_eq!(
            config.starfield.palette,
            vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
        );
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = BackdropConfig::from_toml_str("version = 1").unwrap();
        assert_eq!(config.defaults.effect, EffectName::Starfield);
        assert_eq!(config.defaults.max_density_scale, 2.0);
        assert_eq!(config.vortex.outer_radius, 0.9);
        assert_eq!(config.starfield.palette.len(), 4);
        assert_eq!(config.fps_for(EffectName::Vortex), None);
    }

    #[test]
    fn zero_fps_means_effect_default() {
        let config = BackdropConfig::from_toml_str(
            r#"
version = 1

[vortex]
fps = 0

[starfield]
fps = 12
"#,
        )
        .unwrap();
        assert_eq!(config.fps_for(EffectName::Vortex), None);
        assert_eq!(config.fps_for(EffectName::Starfield), Some(12.0));
    }

    #[test]
    fn rejects_inverted_radii() {
        let err = BackdropConfig::from_toml_str(
            r#"
version = 1

[vortex]
inner_radius = 0.9
outer_radius = 0.2
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_too_many_layers() {
        let err = BackdropConfig::from_toml_str(
            r#"
version = 1

[starfield]
layers = 12
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_palette_entry() {
        let err = BackdropConfig::from_toml_str(
            r##"
version = 1

[starfield]
palette = ["#12345"]
"##,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_unknown_version() {
        let err = BackdropConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn hex_colors_round_trip_through_formatting() {
        let rgb = parse_hex_color("#ffb38a").unwrap();
        assert_eq!(format_hex_color(rgb), "#ffb38a");
        assert!(parse_hex_color("zzzzzz").is_err());
    }

    #[test]
    fn effect_and_quality_names_parse() {
        assert_eq!(EffectName::parse("Black-Hole").unwrap(), EffectName::Vortex);
        assert_eq!(EffectName::parse("stars").unwrap(), EffectName::Starfield);
        assert!(EffectName::parse("plasma").is_err());
        assert_eq!(QualitySetting::parse("mobile").unwrap(), QualitySetting::Low);
    }
}
