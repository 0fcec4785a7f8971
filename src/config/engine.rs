use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// How the movement rules treat blocked cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WallPolicy {
    /// Walls hold unless the active rule's entropy override fires.
    Entropic,
    /// Walls always hold.
    Never,
    /// Walls never hold.
    Always,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_size")]
    pub size: i32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_tick_base_ms")]
    pub tick_base_ms: u64,
    #[serde(default = "default_tick_jitter_ms")]
    pub tick_jitter_ms: u64,
    #[serde(default = "default_mutate_base_ms")]
    pub mutate_base_ms: u64,
    #[serde(default = "default_mutate_jitter_ms")]
    pub mutate_jitter_ms: u64,
    #[serde(default = "default_soft_reset_base_ms")]
    pub soft_reset_base_ms: u64,
    #[serde(default = "default_soft_reset_jitter_ms")]
    pub soft_reset_jitter_ms: u64,
    #[serde(default = "default_rewriter_base_ms")]
    pub rewriter_base_ms: u64,
    #[serde(default = "default_rewriter_jitter_ms")]
    pub rewriter_jitter_ms: u64,
    #[serde(default = "default_resample_chance")]
    pub resample_chance: f64,
    #[serde(default = "default_autopilot_pause_ms")]
    pub autopilot_pause_ms: u64,
    #[serde(default = "default_analyzer_pause_ms")]
    pub analyzer_pause_ms: u64,
    #[serde(default = "default_analyzer_iteration_limit")]
    pub analyzer_iteration_limit: u64,
    #[serde(default = "default_wall_policy")]
    pub wall_policy: WallPolicy,
}

fn default_size() -> i32 {
    12
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_tick_base_ms() -> u64 {
    30
}
fn default_tick_jitter_ms() -> u64 {
    40
}
fn default_mutate_base_ms() -> u64 {
    200
}
fn default_mutate_jitter_ms() -> u64 {
    500
}
fn default_soft_reset_base_ms() -> u64 {
    500
}
fn default_soft_reset_jitter_ms() -> u64 {
    900
}
fn default_rewriter_base_ms() -> u64 {
    1200
}
fn default_rewriter_jitter_ms() -> u64 {
    4000
}
fn default_resample_chance() -> f64 {
    0.01
}
fn default_autopilot_pause_ms() -> u64 {
    1
}
fn default_analyzer_pause_ms() -> u64 {
    0
}
fn default_analyzer_iteration_limit() -> u64 {
    1_000_000_000
}
fn default_wall_policy() -> WallPolicy {
    WallPolicy::Entropic
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            size: default_size(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            tick_base_ms: default_tick_base_ms(),
            tick_jitter_ms: default_tick_jitter_ms(),
            mutate_base_ms: default_mutate_base_ms(),
            mutate_jitter_ms: default_mutate_jitter_ms(),
            soft_reset_base_ms: default_soft_reset_base_ms(),
            soft_reset_jitter_ms: default_soft_reset_jitter_ms(),
            rewriter_base_ms: default_rewriter_base_ms(),
            rewriter_jitter_ms: default_rewriter_jitter_ms(),
            resample_chance: default_resample_chance(),
            autopilot_pause_ms: default_autopilot_pause_ms(),
            analyzer_pause_ms: default_analyzer_pause_ms(),
            analyzer_iteration_limit: default_analyzer_iteration_limit(),
            wall_policy: default_wall_policy(),
        }
    }
}

/// A base delay plus a seed-derived jitter: `base + seed mod jitter`.
fn jittered(base_ms: u64, jitter_ms: u64, seed: i32) -> Duration {
    let jitter = if jitter_ms == 0 {
        0
    } else {
        i64::from(seed).rem_euclid(jitter_ms as i64) as u64
    };
    Duration::from_millis(base_ms + jitter)
}

impl EngineConfig {
    pub fn with_size(size: i32) -> Self {
        EngineConfig {
            size,
            ..Default::default()
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content, path)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults.
    pub fn from_file_or_default(path: &Path) -> Result<Self, String> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(content: &str, source_path: &Path) -> Result<Self, String> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| format!("{}: {}", source_path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if self.size <= 0 {
            errors.push(format!(
                "size must be > 0, got {}. Example: size = 12",
                self.size
            ));
        }

        if self.tick_base_ms == 0 && self.tick_jitter_ms == 0 {
            errors.push(
                "tick_base_ms and tick_jitter_ms cannot both be 0. Example: tick_base_ms = 30"
                    .to_string(),
            );
        }

        if !(0.0..=1.0).contains(&self.resample_chance) {
            errors.push(format!(
                "resample_chance must be within 0.0-1.0, got {}. Example: resample_chance = 0.01",
                self.resample_chance
            ));
        }

        if self.analyzer_iteration_limit == 0 {
            errors.push(format!(
                "analyzer_iteration_limit must be > 0, got {}. Example: analyzer_iteration_limit = 1000000000",
                self.analyzer_iteration_limit
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            errors.push(format!(
                "log_level must be one of {:?}, got '{}'. Example: log_level = \"info\"",
                valid_levels, self.log_level
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            errors.push(format!(
                "log_format must be one of {:?}, got '{}'. Example: log_format = \"text\"",
                valid_formats, self.log_format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }

    pub fn tick_interval(&self, seed: i32) -> Duration {
        jittered(self.tick_base_ms, self.tick_jitter_ms, seed).max(Duration::from_millis(1))
    }

    pub fn mutate_delay(&self, seed: i32) -> Duration {
        jittered(self.mutate_base_ms, self.mutate_jitter_ms, seed)
    }

    pub fn soft_reset_delay(&self, seed: i32) -> Duration {
        jittered(self.soft_reset_base_ms, self.soft_reset_jitter_ms, seed)
    }

    pub fn rewriter_delay(&self, seed: i32) -> Duration {
        jittered(self.rewriter_base_ms, self.rewriter_jitter_ms, seed)
    }
}
