use eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use slotwatch::booking::{AutoBookRule, DEFAULT_MIN_LEAD_HOURS, DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS, SearchWindow};
use slotwatch::daemon::TickConfig;
use slotwatch::domain::{Credentials, DoctorName, NewRequest};
use slotwatch::notify::RelayConfig;
use slotwatch::portal::LuxmedConfig;
use slotwatch::portal::luxmed::DEFAULT_BASE_URL;
use slotwatch::scheduler::{BackoffPolicy, DEFAULT_ESCALATION_CEILING, DEFAULT_FIRST_PENALTY, SchedulerConfig};

/// Upper bound for every duration-like watch setting: one year
const MAX_SECS: u64 = 365 * 24 * 60 * 60;
const MAX_LEAD_HOURS: i64 = 365 * 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub portal: PortalConfig,
    pub watch: WatchConfig,
    pub notifier: NotifierConfig,
    pub keep_alive: Option<KeepAliveConfig>,
    pub requests: Vec<RequestConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub city_id: u32,
    pub city_name: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        let defaults = LuxmedConfig::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: 30000,
            city_id: defaults.city_id,
            city_name: defaults.city_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub tick_interval_secs: u64,
    pub first_penalty_secs: u64,
    pub escalation_ceiling_secs: u64,
    pub search_window_days: i64,
    pub auto_book_min_lead_hours: i64,
    pub hibernate_resolved: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            first_penalty_secs: DEFAULT_FIRST_PENALTY.as_secs(),
            escalation_ceiling_secs: DEFAULT_ESCALATION_CEILING.as_secs(),
            search_window_days: DEFAULT_WINDOW_DAYS,
            auto_book_min_lead_hours: DEFAULT_MIN_LEAD_HOURS,
            hibernate_resolved: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Log,
    Relay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub kind: NotifierKind,
    pub relay_url: String,
    pub login: String,
    pub password: String,
    pub from_address: String,
    pub error_address: Option<String>,
    pub timeout_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Log,
            relay_url: String::new(),
            login: String::new(),
            password: String::new(),
            from_address: String::new(),
            error_address: None,
            timeout_ms: 10000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepAliveConfig {
    pub url: String,
    #[serde(default = "default_keep_alive_interval")]
    pub interval_secs: u64,
}

fn default_keep_alive_interval() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorConfig {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    pub login: String,
    pub password: String,
    pub service: String,
    #[serde(default)]
    pub doctor: Option<DoctorConfig>,
    pub notification_email: String,
    #[serde(default = "default_auto_book")]
    pub auto_book: bool,
}

fn default_auto_book() -> bool {
    true
}

impl RequestConfig {
    pub fn to_new_request(&self) -> NewRequest {
        NewRequest {
            credentials: Credentials::new(&self.login, &self.password),
            service: self.service.clone(),
            doctor: self.doctor.as_ref().map(|d| DoctorName {
                first_name: d.first_name.clone(),
                last_name: d.last_name.clone(),
            }),
            notification_email: self.notification_email.clone(),
            auto_book: self.auto_book,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            portal: PortalConfig::default(),
            watch: WatchConfig::default(),
            notifier: NotifierConfig::default(),
            keep_alive: None,
            requests: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(1..=MAX_SECS).contains(&self.watch.tick_interval_secs) {
            bail!("watch.tick_interval_secs must be between 1 and {}", MAX_SECS);
        }
        if !(1..=MAX_SECS).contains(&self.watch.first_penalty_secs) {
            bail!("watch.first_penalty_secs must be between 1 and {}", MAX_SECS);
        }
        if !(1..=MAX_SECS).contains(&self.watch.escalation_ceiling_secs) {
            bail!("watch.escalation_ceiling_secs must be between 1 and {}", MAX_SECS);
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.watch.search_window_days) {
            bail!("watch.search_window_days must be between 1 and {}", MAX_WINDOW_DAYS);
        }
        if !(0..=MAX_LEAD_HOURS).contains(&self.watch.auto_book_min_lead_hours) {
            bail!("watch.auto_book_min_lead_hours must be between 0 and {}", MAX_LEAD_HOURS);
        }
        if self.notifier.kind == NotifierKind::Relay && self.notifier.relay_url.is_empty() {
            bail!("notifier.relay_url is required for the relay notifier");
        }
        Ok(())
    }

    pub fn luxmed(&self) -> LuxmedConfig {
        LuxmedConfig {
            base_url: self.portal.base_url.clone(),
            timeout: Duration::from_millis(self.portal.timeout_ms),
            city_id: self.portal.city_id,
            city_name: self.portal.city_name.clone(),
        }
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_secs(self.watch.first_penalty_secs),
            Duration::from_secs(self.watch.escalation_ceiling_secs),
        )
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            policy: self.backoff_policy(),
            hibernate_resolved: self.watch.hibernate_resolved,
        }
    }

    pub fn auto_book_rule(&self) -> AutoBookRule {
        AutoBookRule::new(chrono::Duration::hours(self.watch.auto_book_min_lead_hours))
    }

    pub fn search_window(&self) -> SearchWindow {
        SearchWindow::new(self.watch.search_window_days)
    }

    pub fn tick(&self) -> TickConfig {
        TickConfig {
            tick_interval: Duration::from_secs(self.watch.tick_interval_secs),
        }
    }

    pub fn relay(&self) -> RelayConfig {
        RelayConfig {
            relay_url: self.notifier.relay_url.clone(),
            login: self.notifier.login.clone(),
            password: self.notifier.password.clone(),
            from_address: self.notifier.from_address.clone(),
            error_address: self.notifier.error_address.clone(),
            timeout: Duration::from_millis(self.notifier.timeout_ms),
        }
    }
}
