//! TOML configuration: the main scanner config plus per-GWS overrides.
//!
//! Layout mirrors the original's three-layer merge (spec.md Design Notes): a `[gws.defaults]`
//! table, an optional per-path `.gws-scanner-config.toml` sitting inside the volume itself,
//! an optional admin `[gws.configs."<path>"]` override table, and finally `[gws.overrides]`
//! which is unconditionally applied on top of everything else.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::ScanError;

#[derive(Debug, Clone, Deserialize)]
pub struct ElasticConfig {
    pub data_index_name: String,
    pub volume_index_name: String,
    pub aggregate_index_name: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default)]
    pub ca_certs: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_fail_threshold")]
    pub fail_threshold: u32,
    #[serde(default = "default_max_scan_interval_days")]
    pub max_scan_interval_days: i64,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub never_scan: Vec<String>,
}

fn default_fail_threshold() -> u32 {
    5
}

fn default_max_scan_interval_days() -> i64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_scan_threads")]
    pub scan_threads: usize,
    #[serde(default = "default_scan_max_threads_per_worker")]
    pub scan_max_threads_per_worker: usize,
    #[serde(default = "default_queue_length_scale_factor")]
    pub queue_length_scale_factor: usize,
    pub elastic: ElasticConfig,
    pub daemon: DaemonConfig,
}

fn default_scan_threads() -> usize {
    4
}

fn default_scan_max_threads_per_worker() -> usize {
    4
}

fn default_queue_length_scale_factor() -> usize {
    4
}

impl ScannerConfig {
    /// How many slots a Stage-A input queue should have (spec.md §5): one worker's fair
    /// share of the configured scale factor.
    pub fn stage_a_queue_capacity(&self) -> usize {
        self.scan_threads * self.queue_length_scale_factor
    }

    /// How many slots one Stage-A worker's Stage-B absorb queue should have.
    pub fn stage_b_queue_capacity(&self) -> usize {
        self.scan_max_threads_per_worker * self.queue_length_scale_factor
    }
}

/// Per-GWS walk policy (spec.md §4.1): which directories get a full item-by-item walk versus
/// an aggregated subtree roll-up, and at what depth aggregation kicks in by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GwsConfig {
    #[serde(default)]
    pub full_item_walk_dirs: Vec<String>,
    #[serde(default)]
    pub aggregate_subdir_paths: Vec<String>,
    #[serde(default)]
    pub aggregate_subdir_names: Vec<String>,
    #[serde(default)]
    pub scan_depth: Option<u32>,
}

impl GwsConfig {
    fn union_lists(mut self, other: &GwsConfig) -> GwsConfig {
        for v in &other.full_item_walk_dirs {
            if !self.full_item_walk_dirs.contains(v) {
                self.full_item_walk_dirs.push(v.clone());
            }
        }
        for v in &other.aggregate_subdir_paths {
            if !self.aggregate_subdir_paths.contains(v) {
                self.aggregate_subdir_paths.push(v.clone());
            }
        }
        for v in &other.aggregate_subdir_names {
            if !self.aggregate_subdir_names.contains(v) {
                self.aggregate_subdir_names.push(v.clone());
            }
        }
        self
    }

    fn overlay(mut self, other: &GwsConfig) -> GwsConfig {
        if !other.full_item_walk_dirs.is_empty() {
            self.full_item_walk_dirs = other.full_item_walk_dirs.clone();
        }
        if !other.aggregate_subdir_paths.is_empty() {
            self.aggregate_subdir_paths = other.aggregate_subdir_paths.clone();
        }
        if !other.aggregate_subdir_names.is_empty() {
            self.aggregate_subdir_names = other.aggregate_subdir_names.clone();
        }
        if other.scan_depth.is_some() {
            self.scan_depth = other.scan_depth;
        }
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GwsMainConfig {
    #[serde(default)]
    defaults: GwsConfig,
    #[serde(default)]
    overrides: GwsConfig,
    #[serde(default)]
    configs: HashMap<String, GwsConfig>,
}

#[derive(Debug, Deserialize)]
struct MainConfigFile {
    scanner: ScannerConfig,
    #[serde(default)]
    gws: GwsMainConfig,
}

/// The whole parsed main configuration file, plus the per-GWS merge logic.
pub struct GwsScannerConfig {
    pub scanner: ScannerConfig,
    gws_defaults: GwsConfig,
    gws_overrides: GwsConfig,
    gws_configs: HashMap<String, GwsConfig>,
}

impl GwsScannerConfig {
    pub fn load(path: &Path) -> Result<GwsScannerConfig, ScanError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ScanError::Fatal(anyhow::anyhow!("reading {}: {e}", path.display())))?;
        let parsed: MainConfigFile = toml::from_str(&raw)
            .map_err(|e| ScanError::Fatal(anyhow::anyhow!("parsing {}: {e}", path.display())))?;
        Ok(GwsScannerConfig {
            scanner: parsed.scanner,
            gws_defaults: parsed.gws.defaults,
            gws_overrides: parsed.gws.overrides,
            gws_configs: parsed.gws.configs,
        })
    }

    /// Merge order (spec.md §4.1): defaults, then the volume's own
    /// `.gws-scanner-config.toml` (if present), then the admin per-path override table keyed
    /// on the volume's path, then the unconditional `[gws.overrides]` on top — list fields
    /// union, `scan_depth` takes the minimum of the two.
    pub fn gws_config(&self, volume_path: &Path) -> GwsConfig {
        let mut merged = self.gws_defaults.clone();

        let local_config_path = volume_path.join(".gws-scanner-config.toml");
        if let Ok(raw) = std::fs::read_to_string(&local_config_path) {
            if let Ok(user_dict) = toml::from_str::<GwsConfig>(&raw) {
                merged = merged.overlay(&user_dict);
            } else {
                log::warn!("ignoring unparseable {}", local_config_path.display());
            }
        }

        if let Some(admin) = self
            .gws_configs
            .get(&volume_path.to_string_lossy().to_string())
        {
            merged = merged.overlay(admin);
        }

        merged = merged.union_lists(&self.gws_overrides);
        merged.scan_depth = Some(match (merged.scan_depth, self.gws_overrides.scan_depth) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => 100_000,
        });
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[scanner]
scan_threads = 2
scan_max_threads_per_worker = 3
queue_length_scale_factor = 4

[scanner.elastic]
data_index_name = "data"
volume_index_name = "volumes"
aggregate_index_name = "aggregates"
hosts = ["http://localhost:9200"]

[scanner.daemon]
fail_threshold = 3
volumes = ["/gws/a", "/gws/b"]

[gws.defaults]
scan_depth = 5
aggregate_subdir_names = ["node_modules"]

[gws.overrides]
aggregate_subdir_names = [".git"]
scan_depth = 3
"#;

    #[test]
    fn queue_capacities_scale_with_thread_counts() {
        let file: MainConfigFile = toml::from_str(SAMPLE).unwrap();
        assert_eq!(file.scanner.stage_a_queue_capacity(), 8);
        assert_eq!(file.scanner.stage_b_queue_capacity(), 12);
    }

    #[test]
    fn gws_config_merges_defaults_and_overrides() {
        let file: MainConfigFile = toml::from_str(SAMPLE).unwrap();
        let cfg = GwsScannerConfig {
            scanner: file.scanner,
            gws_defaults: file.gws.defaults,
            gws_overrides: file.gws.overrides,
            gws_configs: file.gws.configs,
        };
        let gws = cfg.gws_config(Path::new("/does/not/exist"));
        assert_eq!(gws.scan_depth, Some(3));
        assert!(
            gws.aggregate_subdir_names
                .contains(&"node_modules".to_string())
        );
        assert!(gws.aggregate_subdir_names.contains(&".git".to_string()));
    }
}
