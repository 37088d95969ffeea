use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

/// Service configuration, loaded once at startup
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub layout: LayoutConfig,

    #[serde(default)]
    pub normalize: NormalizeConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

impl AppConfig {
    /// Load configuration from `config.*` in the working directory and
    /// `SIGNOFF__*` environment variables (env wins).
    pub fn load() -> ServiceResult<Self> {
        Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("SIGNOFF")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to build config: {}", e),
            })?
            .try_deserialize()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to deserialize config: {}", e),
            })
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Approval backend (document store, user and paper records)
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Retry budget for external calls
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// How many slots a signature row has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SlotPolicy {
    /// Always lay out `count` slots per row, regardless of signer count
    Fixed { count: usize },
    /// One slot per signer, wrapping to a new row after `max_per_row`
    FitSigners { max_per_row: usize },
}

impl Default for SlotPolicy {
    fn default() -> Self {
        SlotPolicy::FitSigners { max_per_row: 5 }
    }
}

/// Which page of the normalized document receives the signature row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPage {
    #[default]
    First,
    Last,
}

/// Signature row geometry, all lengths in PDF points
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_horizontal_padding")]
    pub horizontal_padding: f32,

    /// Slot height (150px at 0.75pt/px)
    #[serde(default = "default_box_height")]
    pub box_height: f32,

    #[serde(default = "default_bottom_margin")]
    pub bottom_margin: f32,

    /// Space reserved above the row for a title line
    #[serde(default = "default_title_allowance")]
    pub title_allowance: f32,

    #[serde(default = "default_border_width")]
    pub border_width: f32,

    /// Inset of the signature body from the slot's left, right and bottom edges
    #[serde(default = "default_inner_padding")]
    pub inner_padding: f32,

    /// Distance of the name baseline below the slot's top edge; also the
    /// top inset of the signature body
    #[serde(default = "default_name_offset")]
    pub name_offset: f32,

    #[serde(default = "default_name_font_size")]
    pub name_font_size: f32,

    /// Vertical gap between stacked rows
    #[serde(default = "default_row_gap")]
    pub row_gap: f32,

    #[serde(default)]
    pub slots: SlotPolicy,

    #[serde(default)]
    pub target_page: TargetPage,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            horizontal_padding: default_horizontal_padding(),
            box_height: default_box_height(),
            bottom_margin: default_bottom_margin(),
            title_allowance: default_title_allowance(),
            border_width: default_border_width(),
            inner_padding: default_inner_padding(),
            name_offset: default_name_offset(),
            name_font_size: default_name_font_size(),
            row_gap: default_row_gap(),
            slots: SlotPolicy::default(),
            target_page: TargetPage::default(),
        }
    }
}

/// Reference page used when a source document has to be rebuilt as PDF
#[derive(Debug, Clone, Deserialize)]
pub struct NormalizeConfig {
    #[serde(default = "default_page_width")]
    pub page_width: f32,

    #[serde(default = "default_page_height")]
    pub page_height: f32,

    #[serde(default = "default_placeholder_font_size")]
    pub placeholder_font_size: f32,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            page_width: default_page_width(),
            page_height: default_page_height(),
            placeholder_font_size: default_placeholder_font_size(),
        }
    }
}

/// Size limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_output_size")]
    pub max_output_size_bytes: u64,

    #[serde(default = "default_max_signers")]
    pub max_signers: usize,

    #[serde(default = "default_max_request_body")]
    pub max_request_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_output_size_bytes: default_max_output_size(),
            max_signers: default_max_signers(),
            max_request_body_bytes: default_max_request_body(),
        }
    }
}

// ==================== Defaults ====================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_backend_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_horizontal_padding() -> f32 {
    50.0
}

fn default_box_height() -> f32 {
    150.0 * 0.75
}

fn default_bottom_margin() -> f32 {
    50.0
}

fn default_title_allowance() -> f32 {
    20.0
}

fn default_border_width() -> f32 {
    1.0
}

fn default_inner_padding() -> f32 {
    10.0
}

fn default_name_offset() -> f32 {
    20.0
}

fn default_name_font_size() -> f32 {
    12.0
}

fn default_row_gap() -> f32 {
    10.0
}

fn default_page_width() -> f32 {
    595.0
}

fn default_page_height() -> f32 {
    842.0
}

fn default_placeholder_font_size() -> f32 {
    14.0
}

fn default_max_output_size() -> u64 {
    5 * 1024 * 1024
}

fn default_max_signers() -> usize {
    20
}

fn default_max_request_body() -> usize {
    1024 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(source: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_empty_source_uses_defaults() {
        let config = from_toml("");
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.backend.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.layout.box_height, 112.5);
        assert_eq!(config.layout.horizontal_padding, 50.0);
        assert_eq!(
            config.layout.slots,
            SlotPolicy::FitSigners { max_per_row: 5 }
        );
        assert_eq!(config.layout.target_page, TargetPage::First);
        assert_eq!(config.normalize.page_width, 595.0);
        assert_eq!(config.limits.max_output_size_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn test_fixed_square_layout() {
        let config = from_toml(
            r#"
[layout]
box_height = 130.0
target_page = "last"

[layout.slots]
mode = "fixed"
count = 5
"#,
        );
        assert_eq!(config.layout.box_height, 130.0);
        assert_eq!(config.layout.target_page, TargetPage::Last);
        assert_eq!(config.layout.slots, SlotPolicy::Fixed { count: 5 });
        // Unset fields in a partially specified section keep their defaults
        assert_eq!(config.layout.border_width, 1.0);
    }
}
