//! Compositor configuration.
//!
//! Defaults can be overridden from the environment:
//! `CADENCE_SOCKET`, `CADENCE_REFRESH_RATE`, `CADENCE_OUTPUT_SCALE` and
//! `CADENCE_COLOR_MANAGEMENT`.

use std::str::FromStr;

use crate::core::frame_clock::DEFAULT_SYNC_DELAY_US;
use crate::core::time::is_valid_refresh_rate;

pub const ENV_SOCKET: &str = "CADENCE_SOCKET";
pub const ENV_REFRESH_RATE: &str = "CADENCE_REFRESH_RATE";
pub const ENV_OUTPUT_SCALE: &str = "CADENCE_OUTPUT_SCALE";
pub const ENV_COLOR_MANAGEMENT: &str = "CADENCE_COLOR_MANAGEMENT";

/// Frame clock tuning for one view.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameClockConfig {
    /// Refresh rate in Hz
    pub refresh_rate: f32,
    /// Margin between the end of rendering and the vblank
    pub sync_delay_us: i64,
}

impl Default for FrameClockConfig {
    fn default() -> Self {
        Self {
            refresh_rate: 60.0,
            sync_delay_us: DEFAULT_SYNC_DELAY_US,
        }
    }
}

/// Configuration for the compositor
#[derive(Debug, Clone, PartialEq)]
pub struct CompositorConfig {
    /// Socket name (e.g., "wayland-0")
    pub socket_name: String,
    /// Initial output width
    pub output_width: i32,
    /// Initial output height
    pub output_height: i32,
    /// Output scale factor
    pub output_scale: f64,
    /// Variable refresh rate on the initial output
    pub vrr: bool,
    /// Advertise `wp_color_manager_v1`
    pub color_management: bool,
    pub frame_clock: FrameClockConfig,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            socket_name: "wayland-0".to_string(),
            output_width: 1920,
            output_height: 1080,
            output_scale: 1.0,
            vrr: false,
            color_management: true,
            frame_clock: FrameClockConfig::default(),
        }
    }
}

impl CompositorConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from `lookup`. Unparsable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(socket) = lookup(ENV_SOCKET).filter(|s| !s.is_empty()) {
            self.socket_name = socket;
        }
        if let Some(rate) = parse_var::<f32>(&lookup, ENV_REFRESH_RATE) {
            if is_valid_refresh_rate(rate) {
                self.frame_clock.refresh_rate = rate;
            } else {
                tracing::warn!("Ignoring {}={}", ENV_REFRESH_RATE, rate);
            }
        }
        if let Some(scale) = parse_var::<f64>(&lookup, ENV_OUTPUT_SCALE).filter(|s| *s > 0.0) {
            self.output_scale = scale;
        }
        if let Some(value) = lookup(ENV_COLOR_MANAGEMENT) {
            match parse_bool(&value) {
                Some(enabled) => self.color_management = enabled,
                None => tracing::warn!("Ignoring {}={:?}", ENV_COLOR_MANAGEMENT, value),
            }
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let value = lookup(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}", key, value);
            None
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = CompositorConfig::default();
        assert_eq!(config.socket_name, "wayland-0");
        assert_eq!(config.output_width, 1920);
        assert_eq!(config.output_height, 1080);
        assert_eq!(config.frame_clock.refresh_rate, 60.0);
        assert!(config.color_management);
    }

    #[test]
    fn test_overrides() {
        let mut config = CompositorConfig::default();
        config.apply_overrides(lookup(&[
            (ENV_SOCKET, "cadence-test"),
            (ENV_REFRESH_RATE, "144"),
            (ENV_OUTPUT_SCALE, "1.5"),
            (ENV_COLOR_MANAGEMENT, "off"),
        ]));
        assert_eq!(config.socket_name, "cadence-test");
        assert_eq!(config.frame_clock.refresh_rate, 144.0);
        assert_eq!(config.output_scale, 1.5);
        assert!(!config.color_management);
    }

    #[test]
    fn test_bad_overrides_are_ignored() {
        let mut config = CompositorConfig::default();
        config.apply_overrides(lookup(&[
            (ENV_REFRESH_RATE, "fast"),
            (ENV_OUTPUT_SCALE, "-2"),
            (ENV_COLOR_MANAGEMENT, "maybe"),
        ]));
        assert_eq!(config, CompositorConfig::default());
    }

    #[test]
    fn test_unusable_refresh_rates_are_ignored() {
        for rate in ["inf", "NaN", "0", "5000000"] {
            let mut config = CompositorConfig::default();
            config.apply_overrides(lookup(&[(ENV_REFRESH_RATE, rate)]));
            assert_eq!(config.frame_clock.refresh_rate, 60.0, "rate {}", rate);
        }
    }
}
