use std::path::Path;

use serde::Deserialize;

pub(crate) const CONFIG_FILE_NAME: &str = "hearth_config.json";

pub(crate) const DEFAULT_MESSAGES_PER_PAGE: usize = 10;
const MAX_MESSAGES_PER_PAGE: usize = 100;
const DEFAULT_NEAR_BOTTOM_THRESHOLD_PX: f64 = 150.0;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) messages_per_page: Option<u32>,
    pub(crate) near_bottom_threshold_px: Option<f64>,
    pub(crate) log_filter: Option<String>,
    // Absent: the assistant pane reports itself unavailable.
    pub(crate) assistant_url: Option<String>,
    pub(crate) toast_on_new_message: Option<bool>,
}

impl AppConfig {
    pub(crate) fn page_size(&self) -> usize {
        self.messages_per_page
            .map(|n| (n as usize).clamp(1, MAX_MESSAGES_PER_PAGE))
            .unwrap_or(DEFAULT_MESSAGES_PER_PAGE)
    }

    pub(crate) fn near_bottom_threshold_px(&self) -> f64 {
        self.near_bottom_threshold_px
            .filter(|px| px.is_finite() && *px >= 0.0)
            .unwrap_or(DEFAULT_NEAR_BOTTOM_THRESHOLD_PX)
    }

    pub(crate) fn toast_on_new_message(&self) -> bool {
        self.toast_on_new_message.unwrap_or(true)
    }

    pub(crate) fn assistant_url(&self) -> Option<&str> {
        self.assistant_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

/// Missing or malformed files fall back to defaults.
pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_slice::<AppConfig>(&bytes) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), %e, "ignoring malformed config");
            AppConfig::default()
        }
    }
}

pub(crate) fn default_app_config_json() -> String {
    let v = serde_json::json!({
        "messages_per_page": DEFAULT_MESSAGES_PER_PAGE,
        "near_bottom_threshold_px": DEFAULT_NEAR_BOTTOM_THRESHOLD_PX,
        "toast_on_new_message": true,
    });
    serde_json::to_string_pretty(&v).unwrap_or_else(|_| "{}".to_string())
}
