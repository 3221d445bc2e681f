//! webhost configuration system
//!
//! This crate provides centralized configuration management for the embedding
//! core, loading settings from `webhost.toml` with environment variable
//! overrides on top.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "webhost.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WebhostConfig {
    /// Engine platform and content instance settings
    pub engine: EngineConfig,
    /// Navigation and URL policy settings
    pub navigation: NavigationConfig,
    /// GPU presentation settings
    pub compositor: CompositorConfig,
    /// Demo application settings
    pub demo: DemoConfig,
}

/// Engine platform configuration
///
/// Handed to every `EnginePlatform` on initialization and instance creation.
/// The scripted engine honors `user_agent` and `javascript_enabled`;
/// `disable_gpu` and `frame_rate` are only read by real engine bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// User agent string override
    pub user_agent: Option<String>,
    /// Enable JavaScript execution
    pub javascript_enabled: bool,
    /// Disable GPU acceleration inside the engine (software compositing)
    pub disable_gpu: bool,
    /// Device scale factor (1.0 = 96 DPI, 2.0 = 192 DPI)
    pub scale_factor: f32,
    /// Initial viewport width in logical pixels
    pub width: u32,
    /// Initial viewport height in logical pixels
    pub height: u32,
    /// Upper bound on frames per second the engine compositor produces
    pub frame_rate: u32,
}

/// Navigation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// URLs longer than this many characters are rejected before reaching the engine
    pub max_url_length: usize,
    /// Schemes the engine may be asked to load
    pub allowed_schemes: Vec<String>,
    /// Page loaded by `load_homepage`
    pub homepage: String,
    /// Search URL template; `{}` is replaced by the encoded query
    pub search_url: String,
}

/// Presentation mode preference for the GPU surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentMode {
    Auto,
    Fifo,
    Mailbox,
    Immediate,
}

impl PresentMode {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "fifo" | "vsync" => Some(Self::Fifo),
            "mailbox" => Some(Self::Mailbox),
            "immediate" => Some(Self::Immediate),
            _ => None,
        }
    }
}

/// Compositor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Surface presentation mode
    pub present_mode: PresentMode,
    /// Maximum number of frames queued on the presentation surface
    pub max_frame_latency: u32,
    /// Clear color (linear RGBA) shown behind the content frame
    pub clear_color: [f64; 4],
}

/// Demo application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// URL (or address-bar text) loaded at startup; the homepage when unset
    pub url: Option<String>,
    /// Simulated navigation latency of the scripted engine in milliseconds
    pub navigation_latency_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            javascript_enabled: true,
            disable_gpu: false,
            scale_factor: 1.0,
            width: 1280,
            height: 720,
            frame_rate: 60,
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            max_url_length: 2048,
            allowed_schemes: vec!["http".into(), "https".into(), "about".into()],
            homepage: "https://www.google.com".into(),
            search_url: "https://www.google.com/search?q={}".into(),
        }
    }
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            present_mode: PresentMode::Fifo,
            max_frame_latency: 2,
            clear_color: [0.1, 0.1, 0.1, 1.0],
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            url: None,
            navigation_latency_ms: 150,
        }
    }
}

fn env_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn valid_scale(scale: f32) -> bool {
    scale.is_finite() && scale > 0.0
}

impl WebhostConfig {
    /// Load configuration from a TOML file
    ///
    /// # Returns
    /// * `Ok(WebhostConfig)` - Successfully loaded configuration
    /// * `Err(String)` - Error message if loading failed
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        let mut config: Self =
            toml::from_str(content).map_err(|e| format!("Failed to parse config file: {}", e))?;
        if !valid_scale(config.engine.scale_factor) {
            config.engine.scale_factor = EngineConfig::default().scale_factor;
        }
        Ok(config)
    }

    /// Load configuration from `webhost.toml` in the current directory,
    /// or return the default configuration if the file doesn't exist
    pub fn load_or_default() -> Self {
        Self::load_from_file(DEFAULT_CONFIG_FILE).unwrap_or_default()
    }

    /// Merge configuration with environment variables
    ///
    /// Environment variables take precedence over configuration file values.
    /// Values that fail to parse are ignored.
    pub fn merge_with_env(&mut self) {
        // Engine settings
        if let Ok(agent) = std::env::var("WEBHOST_USER_AGENT") {
            self.engine.user_agent = Some(agent);
        }
        if let Ok(val) = std::env::var("WEBHOST_JAVASCRIPT") {
            self.engine.javascript_enabled = env_flag(&val);
        }
        if let Ok(val) = std::env::var("WEBHOST_DISABLE_GPU") {
            self.engine.disable_gpu = env_flag(&val);
        }
        if let Ok(val) = std::env::var("WEBHOST_SCALE_FACTOR") {
            if let Ok(scale) = val.parse::<f32>() {
                if valid_scale(scale) {
                    self.engine.scale_factor = scale;
                }
            }
        }

        // Navigation settings
        if let Ok(val) = std::env::var("WEBHOST_MAX_URL_LENGTH") {
            if let Ok(max) = val.parse::<usize>() {
                self.navigation.max_url_length = max;
            }
        }
        if let Ok(homepage) = std::env::var("WEBHOST_HOMEPAGE") {
            self.navigation.homepage = homepage;
        }

        // Compositor settings
        if let Ok(val) = std::env::var("WEBHOST_PRESENT_MODE") {
            if let Some(mode) = PresentMode::parse(&val) {
                self.compositor.present_mode = mode;
            }
        }
        if let Ok(val) = std::env::var("WEBHOST_FRAME_LATENCY") {
            if let Ok(latency) = val.parse::<u32>() {
                self.compositor.max_frame_latency = latency.max(1);
            }
        }

        // Demo settings
        if let Ok(url) = std::env::var("WEBHOST_DEMO_URL") {
            self.demo.url = Some(url);
        }
    }

    /// Load configuration with environment variable overrides
    ///
    /// This is the recommended way to load configuration:
    /// 1. Load from webhost.toml (or use defaults if not found)
    /// 2. Override with environment variables if present
    pub fn load() -> Self {
        let mut config = Self::load_or_default();
        config.merge_with_env();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = WebhostConfig::default();
        assert_eq!(config.navigation.max_url_length, 2048);
        assert_eq!(config.navigation.allowed_schemes, vec!["http", "https", "about"]);
        assert!(config.engine.javascript_enabled);
        assert_eq!(config.compositor.present_mode, PresentMode::Fifo);
    }

    #[test]
    fn test_toml_serialization() {
        let config = WebhostConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = WebhostConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed.navigation.homepage, config.navigation.homepage);
        assert_eq!(parsed.engine.width, 1280);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[navigation]\nmax_url_length = 512\n\n[compositor]\npresent_mode = \"mailbox\""
        )
        .unwrap();

        let config = WebhostConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.navigation.max_url_length, 512);
        assert_eq!(config.navigation.homepage, "https://www.google.com");
        assert_eq!(config.compositor.present_mode, PresentMode::Mailbox);
        assert_eq!(config.compositor.max_frame_latency, 2);
    }

    #[test]
    fn test_unusable_scale_in_file_falls_back() {
        let config = WebhostConfig::from_toml_str("[engine]\nscale_factor = inf").unwrap();
        assert_eq!(config.engine.scale_factor, 1.0);
        let config = WebhostConfig::from_toml_str("[engine]\nscale_factor = -1.5").unwrap();
        assert_eq!(config.engine.scale_factor, 1.0);
        let config = WebhostConfig::from_toml_str("[engine]\nscale_factor = 2.5").unwrap();
        assert_eq!(config.engine.scale_factor, 2.5);
    }

    #[test]
    fn test_invalid_file_reports_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[navigation\nmax_url_length = ").unwrap();
        let err = WebhostConfig::load_from_file(file.path()).unwrap_err();
        assert!(err.starts_with("Failed to parse config file"));

        let missing = WebhostConfig::load_from_file("/nonexistent/webhost.toml").unwrap_err();
        assert!(missing.starts_with("Failed to read config file"));
    }

    #[test]
    fn test_merge_with_env() {
        unsafe {
            std::env::set_var("WEBHOST_MAX_URL_LENGTH", "100");
            std::env::set_var("WEBHOST_PRESENT_MODE", "immediate");
            std::env::set_var("WEBHOST_SCALE_FACTOR", "not-a-number");
        }

        let mut config = WebhostConfig::default();
        config.merge_with_env();

        assert_eq!(config.navigation.max_url_length, 100);
        assert_eq!(config.compositor.present_mode, PresentMode::Immediate);
        assert_eq!(config.engine.scale_factor, 1.0);

        for rejected in ["inf", "NaN", "-2", "0"] {
            unsafe {
                std::env::set_var("WEBHOST_SCALE_FACTOR", rejected);
            }
            config.merge_with_env();
            assert_eq!(config.engine.scale_factor, 1.0, "{rejected}");
        }

        unsafe {
            std::env::set_var("WEBHOST_SCALE_FACTOR", "2");
        }
        config.merge_with_env();
        assert_eq!(config.engine.scale_factor, 2.0);

        unsafe {
            std::env::remove_var("WEBHOST_MAX_URL_LENGTH");
            std::env::remove_var("WEBHOST_PRESENT_MODE");
            std::env::remove_var("WEBHOST_SCALE_FACTOR");
        }
    }
}
