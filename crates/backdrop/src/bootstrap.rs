use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use effectconfig::BackdropConfig;
use tracing::{debug, info};

use crate::paths::AppPaths;

/// Loads the configuration document.
///
/// An explicit path must exist. The default path under the user config
/// directory is optional; when it is absent the built-in defaults apply.
pub fn load_config(explicit: Option<&Path>, paths: &AppPaths) -> Result<BackdropConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.is_file() {
                bail!("config file {} does not exist", path.display());
            }
            path.to_path_buf()
        }
        None => {
            let path = paths.config_file();
            if !path.is_file() {
                debug!(path = %path.display(), "no config file; using defaults");
                return Ok(BackdropConfig::default());
            }
            path
        }
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config = BackdropConfig::from_toml_str(&raw)
        .with_context(|| format!("invalid config file {}", path.display()))?;
    info!(path = %path.display(), "loaded backdrop config");
    Ok(config)
}

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32)> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| anyhow::anyhow!("expected WxH format, e.g. 1920x1080"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid width in size specification"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid height in size specification"))?;

    if width == 0 || height == 0 {
        bail!("surface dimensions must be greater than zero");
    }

    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_surface_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_surface_size(" 64 X 48 ").unwrap(), (64, 48));
        assert_eq!(parse_surface_size("3×2").unwrap(), (3, 2));
        assert!(parse_surface_size("0x10").is_err());
        assert!(parse_surface_size("1280").is_err());
        assert!(parse_surface_size("axb").is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let root = TempDir::new().unwrap();
        let paths = AppPaths::from_raw(root.path().to_path_buf());
        let missing = root.path().join("missing.toml");
        assert!(load_config(Some(&missing), &paths).is_err());
    }

    #[test]
    fn absent_default_file_uses_defaults() {
        let root = TempDir::new().unwrap();
        let paths = AppPaths::from_raw(root.path().join("nowhere"));
        let config = load_config(None, &paths).unwrap();
        assert_eq!(config.starfield.layers, 6);
    }

    #[test]
    fn explicit_file_is_parsed() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("backdrop.toml");
        fs::write(&path, "version = 1\n[starfield]\nlayers = 4\n").unwrap();
        let paths = AppPaths::from_raw(root.path().to_path_buf());
        let config = load_config(Some(&path), &paths).unwrap();
        assert_eq!(config.starfield.layers, 4);
    }

    #[test]
    fn invalid_file_reports_path() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("bad.toml");
        fs::write(&path, "version = 3\n").unwrap();
        let paths = AppPaths::from_raw(root.path().to_path_buf());
        let err = load_config(Some(&path), &paths).unwrap_err();
        assert!(format!("{err:#}").contains("bad.toml"));
    }
}
