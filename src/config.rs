use std::env;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::dashboard::DashboardKind;

fn get_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn get_env_bool(key: &str, default: bool) -> bool {
    match get_env(key) {
        None => default,
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"),
    }
}

fn get_env_u64(key: &str, default: u64) -> Result<u64> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<u64>()
            .map_err(|e| anyhow!("{key} invalid int: {e}"))?),
    }
}

fn get_env_port(key: &str, default: u16) -> Result<u16> {
    let v = get_env_u64(key, default as u64)?;
    u16::try_from(v).map_err(|_| anyhow!("{key} must be a port number 0..=65535 (got {v})"))
}

fn get_env_string(key: &str, default: &str) -> String {
    get_env(key).unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionMode {
    Beat,
    District,
}

impl RegionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionMode::Beat => "beat",
            RegionMode::District => "district",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Every response commits; whichever resolves last wins.
    LastWins,
    /// Only the response to the most recently issued refresh commits.
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatmapGrid {
    /// Fill only when 0 < cells < 168.
    Sparse,
    /// Always emit the full 7x24 grid.
    Always,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub use_shift: bool,
    pub use_beat: bool,
    pub use_district: bool,
    pub use_nature: bool,
    pub use_nature_group: bool,
    pub use_call_source: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            use_shift: true,
            use_beat: true,
            use_district: false,
            use_nature: true,
            use_nature_group: false,
            use_call_source: true,
        }
    }
}

impl SiteConfig {
    pub fn region_mode(&self) -> Option<RegionMode> {
        match (self.use_beat, self.use_district) {
            (true, false) => Some(RegionMode::Beat),
            (false, true) => Some(RegionMode::District),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.use_beat && self.use_district {
            return Err(anyhow!(
                "USE_BEAT and USE_DISTRICT are mutually exclusive (region mode must be one or neither)"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Backend
    pub api_base_url: String,
    pub agency_code: String,
    pub http_timeout_secs: u64,

    // Dashboard
    pub kind: DashboardKind,
    pub site: SiteConfig,
    pub stale_policy: StalePolicy,
    pub heatmap_grid: HeatmapGrid,
    pub call_list_per_page: u64,

    // Preview server
    pub preview_enabled: bool,
    pub preview_host: String,
    pub preview_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            agency_code: "default".to_string(),
            http_timeout_secs: 30,
            kind: DashboardKind::CallVolume,
            site: SiteConfig::default(),
            stale_policy: StalePolicy::LastWins,
            heatmap_grid: HeatmapGrid::Sparse,
            call_list_per_page: 50,
            preview_enabled: false,
            preview_host: "127.0.0.1".to_string(),
            preview_port: 8080,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let defaults = Settings::default();
        let site_defaults = SiteConfig::default();

        let kind_raw = get_env_string("DASHBOARD_KIND", defaults.kind.as_str()).to_lowercase();
        let kind = DashboardKind::parse(&kind_raw).ok_or_else(|| {
            anyhow!("DASHBOARD_KIND must be call_volume|officer_allocation|call_list (got {kind_raw})")
        })?;

        let stale_raw = get_env_string("STALE_RESPONSES", "last_wins").to_lowercase();
        let stale_policy = match stale_raw.as_str() {
            "last_wins" => StalePolicy::LastWins,
            "discard" => StalePolicy::Discard,
            _ => return Err(anyhow!("STALE_RESPONSES must be last_wins|discard (got {stale_raw})")),
        };

        let grid_raw = get_env_string("HEATMAP_GRID", "sparse").to_lowercase();
        let heatmap_grid = match grid_raw.as_str() {
            "sparse" => HeatmapGrid::Sparse,
            "always" => HeatmapGrid::Always,
            _ => return Err(anyhow!("HEATMAP_GRID must be sparse|always (got {grid_raw})")),
        };

        let site = SiteConfig {
            use_shift: get_env_bool("USE_SHIFT", site_defaults.use_shift),
            use_beat: get_env_bool("USE_BEAT", site_defaults.use_beat),
            use_district: get_env_bool("USE_DISTRICT", site_defaults.use_district),
            use_nature: get_env_bool("USE_NATURE", site_defaults.use_nature),
            use_nature_group: get_env_bool("USE_NATURE_GROUP", site_defaults.use_nature_group),
            use_call_source: get_env_bool("USE_CALL_SOURCE", site_defaults.use_call_source),
        };

        let s = Self {
            api_base_url: get_env_string("API_BASE_URL", &defaults.api_base_url),
            agency_code: get_env_string("AGENCY_CODE", &defaults.agency_code),
            http_timeout_secs: get_env_u64("HTTP_TIMEOUT_SECS", defaults.http_timeout_secs)?,
            kind,
            site,
            stale_policy,
            heatmap_grid,
            call_list_per_page: get_env_u64("CALL_LIST_PER_PAGE", defaults.call_list_per_page)?,
            preview_enabled: get_env_bool("PREVIEW_ENABLED", defaults.preview_enabled),
            preview_host: get_env_string("PREVIEW_HOST", &defaults.preview_host),
            preview_port: get_env_port("PREVIEW_PORT", defaults.preview_port)?,
        };

        s.validate()?;
        Ok(s)
    }

    pub fn validate(&self) -> Result<()> {
        if self.http_timeout_secs < 1 {
            return Err(anyhow!(
                "HTTP_TIMEOUT_SECS must be >= 1 (got {})",
                self.http_timeout_secs
            ));
        }
        if self.call_list_per_page < 1 {
            return Err(anyhow!(
                "CALL_LIST_PER_PAGE must be >= 1 (got {})",
                self.call_list_per_page
            ));
        }
        if self.agency_code.contains('/') {
            return Err(anyhow!(
                "AGENCY_CODE must be a single path segment (got {})",
                self.agency_code
            ));
        }
        url::Url::parse(&self.api_base_url)
            .map_err(|e| anyhow!("API_BASE_URL invalid ({}): {e}", self.api_base_url))?;
        self.site.validate()
    }
}
