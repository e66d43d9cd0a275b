//! Solver tuning loaded from TOML. Every field has a default, so an empty
//! file (or no file at all) gives a working configuration.

use std::time::Duration;

/// Largest heuristic weight accepted; keeps weighted costs (and the open
/// list's bucket array) within range.
pub const MAX_WEIGHT: f64 = 10.0;

/// Search configuration.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SolverConfig {
    /// Wall-clock budget in seconds; 0 means unlimited.
    #[serde(default = "default_time_limit")]
    pub time_limit_secs: u64,

    /// Keep the heuristic admissible and prove the push count minimal.
    #[serde(default = "default_optimal")]
    pub optimal: bool,

    /// Heuristic multiplier used when `optimal` is off.
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Expansions between progress reports and deadline checks.
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,

    /// Expansions between unstuck passes; 0 disables them.
    #[serde(default = "default_unstuck_interval")]
    pub unstuck_interval: u64,

    /// Expansions between sweeps of newly learned patterns over open/closed.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,

    /// Restrict branching to the boxes of a proven-relevant corral.
    #[serde(default = "default_true")]
    pub corral_pruning: bool,

    /// Collapse pushes along one-wide tunnels into a single step.
    #[serde(default = "default_true")]
    pub tunnel_macros: bool,

    #[serde(default = "default_corral_node_limit")]
    pub corral_node_limit: usize,

    #[serde(default = "default_goal_zone_node_limit")]
    pub goal_zone_node_limit: usize,

    #[serde(default = "default_unstuck_node_limit")]
    pub unstuck_node_limit: usize,

    #[serde(default = "default_generalize_node_limit")]
    pub generalize_node_limit: usize,

    /// Worker threads for table growth; 0 lets rayon decide.
    #[serde(default)]
    pub resize_threads: usize,

    /// Tables smaller than this many slots grow on the search thread.
    #[serde(default = "default_parallel_resize_min_slots")]
    pub parallel_resize_min_slots: usize,

    /// Learned patterns with more boxes than this are discarded.
    #[serde(default = "default_max_pattern_boxes")]
    pub max_pattern_boxes: usize,
}

fn default_time_limit() -> u64 {
    60
}
fn default_optimal() -> bool {
    true
}
fn default_weight() -> f64 {
    3.0
}
fn default_report_interval() -> u64 {
    50_000
}
fn default_unstuck_interval() -> u64 {
    2_000
}
fn default_sweep_interval() -> u64 {
    10_000
}
fn default_true() -> bool {
    true
}
fn default_corral_node_limit() -> usize {
    2_000
}
fn default_goal_zone_node_limit() -> usize {
    1_000
}
fn default_unstuck_node_limit() -> usize {
    4_000
}
fn default_generalize_node_limit() -> usize {
    500
}
fn default_parallel_resize_min_slots() -> usize {
    1 << 16
}
fn default_max_pattern_boxes() -> usize {
    8
}

impl SolverConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        let mut cfg: SolverConfig = toml::from_str(text)?;
        cfg.validate();
        Ok(cfg)
    }

    /// Clamp values that make no sense, logging each correction.
    pub fn validate(&mut self) {
        if !self.weight.is_finite() || self.weight < 1.0 {
            tracing::warn!(weight = self.weight, "heuristic weight below 1.0; using 1.0");
            self.weight = 1.0;
        } else if self.weight > MAX_WEIGHT {
            tracing::warn!(weight = self.weight, max = MAX_WEIGHT, "heuristic weight too large; clamping");
            self.weight = MAX_WEIGHT;
        }
        if self.report_interval == 0 {
            tracing::warn!("report_interval of 0; using 1");
            self.report_interval = 1;
        }
        if self.sweep_interval == 0 {
            tracing::warn!("sweep_interval of 0; using 1");
            self.sweep_interval = 1;
        }
        if self.max_pattern_boxes == 0 {
            tracing::warn!("max_pattern_boxes of 0 disables learning; using 1");
            self.max_pattern_boxes = 1;
        }
    }

    pub fn time_limit(&self) -> Option<Duration> {
        (self.time_limit_secs > 0).then(|| Duration::from_secs(self.time_limit_secs))
    }

    /// The weight actually applied to the heuristic.
    pub fn effective_weight(&self) -> f64 {
        if self.optimal {
            1.0
        } else {
            self.weight
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: default_time_limit(),
            optimal: default_optimal(),
            weight: default_weight(),
            report_interval: default_report_interval(),
            unstuck_interval: default_unstuck_interval(),
            sweep_interval: default_sweep_interval(),
            corral_pruning: true,
            tunnel_macros: true,
            corral_node_limit: default_corral_node_limit(),
            goal_zone_node_limit: default_goal_zone_node_limit(),
            unstuck_node_limit: default_unstuck_node_limit(),
            generalize_node_limit: default_generalize_node_limit(),
            resize_threads: 0,
            parallel_resize_min_slots: default_parallel_resize_min_slots(),
            max_pattern_boxes: default_max_pattern_boxes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let cfg = SolverConfig::default();
        assert_eq!(cfg.time_limit_secs, 60);
        assert!(cfg.optimal);
        assert!((cfg.weight - 3.0).abs() < 1e-9);
        assert_eq!(cfg.report_interval, 50_000);
        assert_eq!(cfg.unstuck_interval, 2_000);
        assert!(cfg.corral_pruning);
        assert!(cfg.tunnel_macros);
        assert_eq!(cfg.parallel_resize_min_slots, 1 << 16);
        assert_eq!(cfg.max_pattern_boxes, 8);
        assert!((cfg.effective_weight() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_toml_matches_default() {
        let cfg = SolverConfig::from_toml_str("").unwrap();
        let def = SolverConfig::default();
        assert_eq!(cfg.time_limit_secs, def.time_limit_secs);
        assert_eq!(cfg.corral_node_limit, def.corral_node_limit);
        assert_eq!(cfg.resize_threads, 0);
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
            optimal = false
            weight = 2.5
            time_limit_secs = 0
        "#;
        let cfg = SolverConfig::from_toml_str(toml_str).unwrap();
        assert!(!cfg.optimal);
        assert!((cfg.effective_weight() - 2.5).abs() < 1e-9);
        assert_eq!(cfg.time_limit(), None);
        // Defaults for unspecified fields
        assert_eq!(cfg.sweep_interval, 10_000);
        assert!(cfg.tunnel_macros);
    }

    #[test]
    fn test_validate_clamps_weight() {
        let mut cfg = SolverConfig {
            weight: 0.2,
            report_interval: 0,
            ..Default::default()
        };
        cfg.validate();
        assert!((cfg.weight - 1.0).abs() < 1e-9);
        assert_eq!(cfg.report_interval, 1);
    }

    #[test]
    fn test_validate_caps_huge_weight() {
        let cfg = SolverConfig::from_toml_str("optimal = false\nweight = 1e9").unwrap();
        assert!((cfg.weight - MAX_WEIGHT).abs() < 1e-9);
        assert!((cfg.effective_weight() - MAX_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        assert!(SolverConfig::from_toml_str("weight = \"heavy\"").is_err());
    }
}
