use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid message list config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Tuning knobs for the message list engine.
///
/// Durations are carried as milliseconds so the struct can be read straight
/// out of a JSON settings document.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MessageListConfig {
    pub previous_page_size: usize,
    /// Page size for newer messages when the renderer restores scroll
    /// position across insertions above the viewport.
    pub next_page_size_stable: usize,
    /// Page size for newer messages on renderers that jump on insertion.
    pub next_page_size_unstable: usize,
    pub stable_scroll_restoration: bool,
    /// Distance from the oldest loaded message that triggers an older page.
    pub previous_prefetch_distance: usize,
    /// Distance from the newest loaded message that triggers a newer page.
    pub next_prefetch_distance: usize,
    pub max_group_interval_secs: i64,
    pub edited_breaks_group: bool,
    pub animate_changes: bool,
    pub animate_reactions: bool,
    pub animate_link_previews: bool,
    pub reset_threshold: usize,
    pub reset_step: usize,
    pub anchor_clear_delay_ms: u64,
    pub highlight_start_delay_ms: u64,
    pub highlight_clear_delay_ms: u64,
    pub mark_read_throttle_ms: u64,
}

impl Default for MessageListConfig {
    fn default() -> Self {
        Self {
            previous_page_size: 25,
            next_page_size_stable: 25,
            next_page_size_unstable: 5,
            stable_scroll_restoration: true,
            previous_prefetch_distance: 25,
            next_prefetch_distance: 5,
            max_group_interval_secs: 60,
            edited_breaks_group: true,
            animate_changes: true,
            animate_reactions: true,
            animate_link_previews: true,
            reset_threshold: 200,
            reset_step: 200,
            anchor_clear_delay_ms: 500,
            highlight_start_delay_ms: 300,
            highlight_clear_delay_ms: 2000,
            mark_read_throttle_ms: 3000,
        }
    }
}

impl MessageListConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.previous_page_size == 0 {
            return Err(ConfigError::Zero("previous_page_size"));
        }
        if self.next_page_size() == 0 {
            return Err(ConfigError::Zero("next_page_size"));
        }
        if self.reset_step == 0 {
            return Err(ConfigError::Zero("reset_step"));
        }
        Ok(())
    }

    pub fn next_page_size(&self) -> usize {
        if self.stable_scroll_restoration {
            self.next_page_size_stable
        } else {
            self.next_page_size_unstable
        }
    }

    pub fn max_group_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_group_interval_secs)
    }

    pub fn anchor_clear_delay(&self) -> Duration {
        Duration::from_millis(self.anchor_clear_delay_ms)
    }

    pub fn highlight_start_delay(&self) -> Duration {
        Duration::from_millis(self.highlight_start_delay_ms)
    }

    pub fn highlight_clear_delay(&self) -> Duration {
        Duration::from_millis(self.highlight_clear_delay_ms)
    }

    pub fn mark_read_throttle(&self) -> Duration {
        Duration::from_millis(self.mark_read_throttle_ms)
    }
}
