//! Configuration management
//!
//! This module handles loading, validation, and management of the boardsync
//! configuration. Configuration is stored in TOML format at
//! ~/.boardsync/config.toml and created with defaults on first use.
//!
//! # Configuration Sections
//!
//! - **core**: log level
//! - **board**: REST endpoint and listing page size
//! - **containers**: titles and geometry of the two target frames
//! - **layout**: grid placement of new items
//! - **retry**: backoff policy for REST calls
//! - **batch**: progress granularity for batch writes
//! - **stdio**: tool-process command, environment and timeouts
//! - **extraction**: extraction provider endpoint and limits
//!
//! The file configuration is combined with command-line arguments and
//! credentials exactly once, into an immutable [`RunConfig`] that is shared by
//! the orchestrator and both transports.
//!
//! # Examples
//!
//! ```no_run
//! use boardsync_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("REST endpoint: {}", config.board.rest_base_url);
//! println!("Columns: {}", config.layout.columns);
//! # Ok(())
//! # }
//! ```

use sdk::errors::BoardError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::layout::LayoutConfig;
use crate::retry::RetryPolicy;
use crate::secrets::SecretString;
use crate::transport::stdio::capabilities::ToolDescriptor;

/// Main configuration structure
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Board service settings
    #[serde(default)]
    pub board: BoardConfig,

    /// Target containers
    #[serde(default)]
    pub containers: ContainersConfig,

    /// Item placement
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Retry policy for REST calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Batch write settings
    #[serde(default)]
    pub batch: BatchConfig,

    /// Stdio tool-process settings
    #[serde(default)]
    pub stdio: StdioConfig,

    /// Extraction provider settings
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Board REST service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Base URL of the board REST API
    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,

    /// Page size for listing calls (1-50)
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    // Note: the access token is resolved from the environment or keychain, not stored here
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            rest_base_url: default_rest_base_url(),
            page_limit: default_page_limit(),
        }
    }
}

/// A point on the board
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// The two target containers, side by side with shared geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainersConfig {
    #[serde(default = "default_insights_title")]
    pub insights_title: String,

    #[serde(default = "default_risks_title")]
    pub risks_title: String,

    #[serde(default = "default_container_width")]
    pub width: f64,

    #[serde(default = "default_container_height")]
    pub height: f64,

    #[serde(default = "default_insights_center")]
    pub insights_center: Point,

    #[serde(default = "default_risks_center")]
    pub risks_center: Point,
}

impl Default for ContainersConfig {
    fn default() -> Self {
        Self {
            insights_title: default_insights_title(),
            risks_title: default_risks_title(),
            width: default_container_width(),
            height: default_container_height(),
            insights_center: default_insights_center(),
            risks_center: default_risks_center(),
        }
    }
}

/// Retry policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// Batch write settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Items per progress report
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

/// Stdio tool-process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StdioConfig {
    /// Program to spawn
    #[serde(default = "default_stdio_command")]
    pub command: String,

    /// Arguments passed to the program
    #[serde(default = "default_stdio_args")]
    pub args: Vec<String>,

    /// Environment overlay for the child process
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Environment variable through which the board token reaches the child
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Seconds to wait for the initialize response
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Seconds to wait for each tool call
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Pause between consecutive item writes
    #[serde(default = "default_call_delay_ms")]
    pub call_delay_ms: u64,

    /// Replaces the built-in tool catalog when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<Vec<ToolDescriptor>>,
}

impl Default for StdioConfig {
    fn default() -> Self {
        Self {
            command: default_stdio_command(),
            args: default_stdio_args(),
            env: BTreeMap::new(),
            token_env: default_token_env(),
            connect_timeout_secs: default_connect_timeout(),
            call_timeout_secs: default_call_timeout(),
            call_delay_ms: default_call_delay_ms(),
            catalog: None,
        }
    }
}

/// Extraction provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Base URL for the chat completions API
    #[serde(default = "default_extraction_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_extraction_model")]
    pub model: String,

    /// Upper bound on items per category
    #[serde(default = "default_max_items")]
    pub max_items_per_category: usize,

    /// Request timeout in seconds
    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,
    // Note: API key resolved from the environment or keychain, not stored here
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            base_url: default_extraction_base_url(),
            model: default_extraction_model(),
            max_items_per_category: default_max_items(),
            timeout_secs: default_extraction_timeout(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_rest_base_url() -> String {
    "https://api.miro.com/v2".to_string()
}

fn default_page_limit() -> u32 {
    50
}

fn default_insights_title() -> String {
    "Insights".to_string()
}

fn default_risks_title() -> String {
    "Risks".to_string()
}

fn default_container_width() -> f64 {
    2000.0
}

fn default_container_height() -> f64 {
    1600.0
}

fn default_insights_center() -> Point {
    Point { x: 0.0, y: 0.0 }
}

fn default_risks_center() -> Point {
    Point { x: 2400.0, y: 0.0 }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8000
}

fn default_chunk_size() -> usize {
    10
}

fn default_stdio_command() -> String {
    "npx".to_string()
}

fn default_stdio_args() -> Vec<String> {
    vec!["-y".to_string(), "@k-jarzyna/mcp-miro".to_string()]
}

fn default_token_env() -> String {
    "MIRO_ACCESS_TOKEN".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_call_timeout() -> u64 {
    10
}

fn default_call_delay_ms() -> u64 {
    200
}

fn default_extraction_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_extraction_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_items() -> usize {
    12
}

fn default_extraction_timeout() -> u64 {
    120
}

impl Config {
    /// Load configuration from the default location (~/.boardsync/config.toml)
    ///
    /// If the configuration file doesn't exist, writes and returns the default
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or written
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, BoardError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, BoardError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| BoardError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| BoardError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, BoardError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BoardError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();
        config.validate()?;

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| BoardError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| BoardError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.boardsync/config.toml)
    fn default_config_path() -> Result<PathBuf, BoardError> {
        let home = dirs::home_dir()
            .ok_or_else(|| BoardError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".boardsync").join("config.toml"))
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The log level is unknown
    /// - A page limit, chunk size, column count or timeout is out of range
    /// - Container titles collide or the two containers overlap
    pub fn validate(&self) -> Result<(), BoardError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(BoardError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if !(1..=50).contains(&self.board.page_limit) {
            return Err(BoardError::Config(
                "board.page_limit must be between 1 and 50".to_string(),
            ));
        }

        if self.batch.chunk_size == 0 {
            return Err(BoardError::Config(
                "batch.chunk_size must be at least 1".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(BoardError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        self.layout.validate()?;
        self.validate_containers()?;

        if self.stdio.connect_timeout_secs == 0 || self.stdio.call_timeout_secs == 0 {
            return Err(BoardError::Config(
                "stdio timeouts must be at least one second".to_string(),
            ));
        }

        if self.extraction.max_items_per_category == 0 {
            return Err(BoardError::Config(
                "extraction.max_items_per_category must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_containers(&self) -> Result<(), BoardError> {
        let c = &self.containers;

        if c.insights_title.trim().is_empty() || c.risks_title.trim().is_empty() {
            return Err(BoardError::Config(
                "Container titles must not be empty".to_string(),
            ));
        }
        if c.insights_title.trim() == c.risks_title.trim() {
            return Err(BoardError::Config(
                "Container titles must differ".to_string(),
            ));
        }
        if c.width <= 0.0 || c.height <= 0.0 {
            return Err(BoardError::Config(
                "Container width and height must be positive".to_string(),
            ));
        }

        let dx = (c.insights_center.x - c.risks_center.x).abs();
        let dy = (c.insights_center.y - c.risks_center.y).abs();
        if dx < c.width && dy < c.height {
            return Err(BoardError::Config(
                "Containers overlap. Move their centers further apart".to_string(),
            ));
        }

        Ok(())
    }
}

/// Which board transport a run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Direct HTTP calls to the board service
    Rest,
    /// Tool calls to a spawned child process over stdin/stdout
    Stdio,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Rest => write!(f, "rest"),
            TransportKind::Stdio => write!(f, "stdio"),
        }
    }
}

/// Whether a run writes to the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Read and compute only
    Preview,
    /// Perform the writes
    Execute,
}

/// Credentials resolved once at startup
#[derive(Debug, Clone)]
pub struct Credentials {
    pub board_token: SecretString,
    pub extraction_key: Option<SecretString>,
}

/// Immutable configuration for one run.
///
/// Built once by the `sync` handler and shared, behind an `Arc`, by the
/// orchestrator and the active transport.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub board_id: String,
    pub source_path: PathBuf,
    pub transport: TransportKind,
    pub mode: RunMode,
    pub credentials: Credentials,
    pub settings: Config,
}

impl RunConfig {
    /// Assemble and validate the run configuration.
    ///
    /// Fails fast, before any network activity, when the board id or source
    /// path is missing or the board token is empty.
    pub fn new(
        board_id: impl Into<String>,
        source_path: impl Into<PathBuf>,
        transport: TransportKind,
        mode: RunMode,
        credentials: Credentials,
        settings: Config,
    ) -> Result<Self, BoardError> {
        let board_id = board_id.into();
        let source_path = source_path.into();

        if board_id.trim().is_empty() {
            return Err(BoardError::Config("A board id is required".to_string()));
        }
        if source_path.as_os_str().is_empty() {
            return Err(BoardError::Config("A source path is required".to_string()));
        }
        if credentials.board_token.unsecure().trim().is_empty() {
            return Err(BoardError::MissingCredential("board access token".to_string()));
        }
        settings.validate()?;

        Ok(Self {
            board_id: board_id.trim().to_string(),
            source_path,
            transport,
            mode,
            credentials,
            settings,
        })
    }

    pub fn is_preview(&self) -> bool {
        self.mode == RunMode::Preview
    }
}
