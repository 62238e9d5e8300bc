//! Runtime configuration, read from `UNITWATCH_*` environment variables.
//!
//! Every knob has a typed default; the CLI overrides a few of them
//! (base URL, database path, webhook) after `Config::from_env()`.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const DEFAULT_INDEX_PATH: &str = "/floorplans";
const DEFAULT_FLOORPLAN_PATH: &str = "/floorplans/";
const DEFAULT_PRICE_MARKER: &str = "$";
const DEFAULT_CARD_SELECTOR: &str = ".floorplan-card, .fp-card, [data-floorplan]";
const DEFAULT_CARD_TITLE_SELECTOR: &str = ".floorplan-name, .fp-name, h2, h3";

const DEFAULT_DOM_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_LOAD_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_IDLE_TIMEOUT_MS: u64 = 45_000;
const DEFAULT_ELEMENT_TIMEOUT_MS: u64 = 5_000;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_EXTENDED_LAUNCH_TIMEOUT_SECS: u64 = 90;
const DEFAULT_SPAWN_COOLDOWN_SECS: u64 = 3;

/// Deployment flavour. Only production-like environments clean up stale
/// browser processes before launching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn from_env(name: &str) -> Self {
        Self::parse(&read_env_string(name).unwrap_or_default())
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" | "staging" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production_like(self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// What the pipeline assumes about the target site's markup.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    /// Site origin, e.g. `https://www.example-apartments.com`.
    pub base_url: String,
    pub index_path: String,
    /// Detail pages live at `{floorplan_path}the-{slug}`.
    pub floorplan_path: String,
    /// Literal that marks a card as advertising a price.
    pub price_marker: String,
    pub card_selector: String,
    pub card_title_selector: String,
    /// Controls that reveal hidden unit data on a detail page.
    pub disclosure_selectors: Vec<String>,
    /// Containers scanned for unit/price/date text, in priority order.
    pub container_selectors: Vec<String>,
}

impl SiteProfile {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            index_path: DEFAULT_INDEX_PATH.to_string(),
            floorplan_path: DEFAULT_FLOORPLAN_PATH.to_string(),
            price_marker: DEFAULT_PRICE_MARKER.to_string(),
            card_selector: DEFAULT_CARD_SELECTOR.to_string(),
            card_title_selector: DEFAULT_CARD_TITLE_SELECTOR.to_string(),
            disclosure_selectors: default_disclosure_selectors(),
            container_selectors: default_container_selectors(),
        }
    }

    fn base(&self) -> Result<Url> {
        if self.base_url.trim().is_empty() {
            bail!("no site base URL configured (set UNITWATCH_BASE_URL or pass --base-url)");
        }
        Url::parse(self.base_url.trim())
            .with_context(|| format!("invalid site base URL: {}", self.base_url))
    }

    /// Absolute URL of the floorplan index page.
    pub fn index_url(&self) -> Result<String> {
        let url = self
            .base()?
            .join(&self.index_path)
            .with_context(|| format!("invalid index path: {}", self.index_path))?;
        Ok(url.to_string())
    }

    /// Absolute URL of a floorplan detail page for an already-slugged title.
    pub fn floorplan_url(&self, slug: &str) -> Result<String> {
        let path = format!("{}the-{slug}", self.floorplan_path);
        let url = self
            .base()?
            .join(&path)
            .with_context(|| format!("invalid floorplan path: {path}"))?;
        Ok(url.to_string())
    }
}

fn default_disclosure_selectors() -> Vec<String> {
    [
        "[aria-controls*='availability']",
        ".availability-toggle",
        "button.availability",
        "[data-toggle='availability']",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_container_selectors() -> Vec<String> {
    [
        ".availability-dropdown",
        ".unit-details",
        "[class*='unit']",
        "[class*='availability']",
        ".dropdown-content",
        ".unit-info",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Timeouts for page loads and element operations.
#[derive(Debug, Clone)]
pub struct NavigationConfig {
    pub dom_timeout: Duration,
    pub load_timeout: Duration,
    pub idle_timeout: Duration,
    /// Ceiling for a single scroll, click or text read.
    pub element_timeout: Duration,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            dom_timeout: Duration::from_millis(DEFAULT_DOM_TIMEOUT_MS),
            load_timeout: Duration::from_millis(DEFAULT_LOAD_TIMEOUT_MS),
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS),
            element_timeout: Duration::from_millis(DEFAULT_ELEMENT_TIMEOUT_MS),
        }
    }
}

/// Whole-run retry envelope.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Attempt `n` waits `n * retry_delay` before attempt `n + 1`.
    pub retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

/// Browser launch and recovery settings.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub timeout: Duration,
    pub extended_timeout: Duration,
    pub spawn_cooldown: Duration,
    pub chromium_path: Option<PathBuf>,
    /// Shell command that installs a browser when none is found.
    pub install_command: String,
    /// Directory holding per-launch temp profiles.
    pub profile_root: PathBuf,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_LAUNCH_TIMEOUT_SECS),
            extended_timeout: Duration::from_secs(DEFAULT_EXTENDED_LAUNCH_TIMEOUT_SECS),
            spawn_cooldown: Duration::from_secs(DEFAULT_SPAWN_COOLDOWN_SECS),
            chromium_path: None,
            install_command: default_install_command(),
            profile_root: std::env::temp_dir(),
        }
    }
}

fn default_install_command() -> String {
    format!(
        "npx --yes @puppeteer/browsers install chrome@stable --path {}",
        unitwatch_home().join("chromium").display()
    )
}

/// `~/.unitwatch`, or `/tmp/.unitwatch` when no home directory exists.
pub fn unitwatch_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".unitwatch")
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub site: SiteProfile,
    pub navigation: NavigationConfig,
    pub retry: RetryConfig,
    pub launch: LaunchConfig,
    pub db_path: PathBuf,
    pub webhook_url: Option<String>,
}

impl Config {
    /// Defaults for everything except the site.
    pub fn new(site: SiteProfile) -> Self {
        Self {
            environment: Environment::Development,
            site,
            navigation: NavigationConfig::default(),
            retry: RetryConfig::default(),
            launch: LaunchConfig::default(),
            db_path: unitwatch_home().join("units.db"),
            webhook_url: None,
        }
    }

    /// Build the configuration from `UNITWATCH_*` variables.
    pub fn from_env() -> Self {
        let mut site = SiteProfile::new(read_env_string("UNITWATCH_BASE_URL").unwrap_or_default());
        if let Some(v) = read_env_nonempty("UNITWATCH_INDEX_PATH") {
            site.index_path = v;
        }
        if let Some(v) = read_env_nonempty("UNITWATCH_FLOORPLAN_PATH") {
            site.floorplan_path = v;
        }
        if let Some(v) = read_env_nonempty("UNITWATCH_PRICE_MARKER") {
            site.price_marker = v;
        }
        if let Some(v) = read_env_nonempty("UNITWATCH_CARD_SELECTOR") {
            site.card_selector = v;
        }
        if let Some(v) = read_env_nonempty("UNITWATCH_CARD_TITLE_SELECTOR") {
            site.card_title_selector = v;
        }

        let navigation = NavigationConfig {
            dom_timeout: Duration::from_millis(read_env_u64(
                "UNITWATCH_DOM_TIMEOUT_MS",
                DEFAULT_DOM_TIMEOUT_MS,
            )),
            load_timeout: Duration::from_millis(read_env_u64(
                "UNITWATCH_LOAD_TIMEOUT_MS",
                DEFAULT_LOAD_TIMEOUT_MS,
            )),
            idle_timeout: Duration::from_millis(read_env_u64(
                "UNITWATCH_IDLE_TIMEOUT_MS",
                DEFAULT_IDLE_TIMEOUT_MS,
            )),
            element_timeout: Duration::from_millis(read_env_u64(
                "UNITWATCH_ELEMENT_TIMEOUT_MS",
                DEFAULT_ELEMENT_TIMEOUT_MS,
            )),
        };

        let retry = RetryConfig {
            max_attempts: read_env_u32("UNITWATCH_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS).max(1),
            retry_delay: Duration::from_secs(read_env_u64(
                "UNITWATCH_RETRY_DELAY_SECS",
                DEFAULT_RETRY_DELAY_SECS,
            )),
        };

        let launch = LaunchConfig {
            timeout: Duration::from_secs(read_env_u64(
                "UNITWATCH_LAUNCH_TIMEOUT_SECS",
                DEFAULT_LAUNCH_TIMEOUT_SECS,
            )),
            extended_timeout: Duration::from_secs(read_env_u64(
                "UNITWATCH_EXTENDED_LAUNCH_TIMEOUT_SECS",
                DEFAULT_EXTENDED_LAUNCH_TIMEOUT_SECS,
            )),
            spawn_cooldown: Duration::from_secs(read_env_u64(
                "UNITWATCH_SPAWN_COOLDOWN_SECS",
                DEFAULT_SPAWN_COOLDOWN_SECS,
            )),
            chromium_path: read_env_nonempty("UNITWATCH_CHROMIUM_PATH").map(PathBuf::from),
            install_command: read_env_nonempty("UNITWATCH_INSTALL_CMD")
                .unwrap_or_else(default_install_command),
            profile_root: std::env::temp_dir(),
        };

        Self {
            environment: Environment::from_env("UNITWATCH_ENV"),
            site,
            navigation,
            retry,
            launch,
            db_path: read_env_nonempty("UNITWATCH_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| unitwatch_home().join("units.db")),
            webhook_url: read_env_nonempty("UNITWATCH_WEBHOOK_URL"),
        }
    }
}

fn read_env_u64(name: &str, default_value: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default_value)
}

fn read_env_u32(name: &str, default_value: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default_value)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string())
}

fn read_env_nonempty(name: &str) -> Option<String> {
    read_env_string(name).filter(|v| !v.is_empty())
}
