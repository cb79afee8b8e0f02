// src/config.rs

use crate::types::Config;
use anyhow::Result;
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_falls_back_to_defaults() {
        let yaml = "bounce:\n  score_threshold: 0.6\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.bounce.score_threshold, 0.6);
        assert_eq!(config.trajectory.max_gate_px, 80.0);
        assert_eq!(config.segmenter.min_shot_seconds, 0.3);
    }
}
