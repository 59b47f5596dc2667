// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static CONFIG: OnceLock<OverwinConfig> = OnceLock::new();

fn default_log_level() -> String {
    "info".to_string()
}

pub fn init_from_path(path: impl AsRef<Path>) -> Result<&'static OverwinConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = path.as_ref().to_path_buf();
    let cfg = OverwinConfig::load_from_file(&path)?;
    let _ = CONFIG.set(cfg);
    CONFIG
        .get()
        .ok_or_else(|| anyhow!("config was not installed: {}", path.display()))
}

pub fn init_from_env_or_default() -> Result<&'static OverwinConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = config_path_from_env_or_default()?;
    init_from_path(path)
}

pub fn config() -> Result<&'static OverwinConfig> {
    init_from_env_or_default()
}

fn config_path_from_env_or_default() -> Result<PathBuf> {
    if let Ok(p) = std::env::var("OVERWIN_CONFIG") {
        if !p.trim().is_empty() {
            return Ok(PathBuf::from(p));
        }
    }

    let candidates = [PathBuf::from("overwin.toml")];
    for p in candidates {
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "missing config file: set $OVERWIN_CONFIG or create ./overwin.toml"
    ))
}

#[derive(Clone, Debug, Deserialize)]
pub struct OverwinConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression.
    /// If set, this takes precedence over `log_level`.
    /// Example: "overwin=debug"
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub window: WindowConfig,
}

impl OverwinConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        Self::parse(&s).with_context(|| format!("parse toml: {}", path.display()))
    }

    pub fn parse(s: &str) -> Result<Self> {
        let cfg: OverwinConfig = toml::from_str(s)?;
        cfg.runtime.validate()?;
        Ok(cfg)
    }

    /// Filter string handed to the tracing subscriber.
    pub fn effective_log_filter(&self) -> &str {
        self.log_filter
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(&self.log_level)
    }
}

impl Default for OverwinConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: None,
            runtime: RuntimeConfig::default(),
            window: WindowConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RuntimeConfig {
    /// Worker threads used for per-partition evaluation. `0` means available parallelism.
    #[serde(default)]
    pub window_threads: usize,
    #[serde(default = "default_parallel_partition_threshold")]
    pub parallel_partition_threshold: usize,
    #[serde(default = "default_parallel_min_rows")]
    pub parallel_min_rows: usize,
}

fn default_parallel_partition_threshold() -> usize {
    64
}

fn default_parallel_min_rows() -> usize {
    4096
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            window_threads: 0,
            parallel_partition_threshold: default_parallel_partition_threshold(),
            parallel_min_rows: default_parallel_min_rows(),
        }
    }
}

impl RuntimeConfig {
    pub fn actual_window_threads(&self) -> usize {
        if self.window_threads > 0 {
            return self.window_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    fn validate(&self) -> Result<()> {
        if self.parallel_partition_threshold == 0 {
            return Err(anyhow!(
                "runtime.parallel_partition_threshold must be greater than 0"
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct WindowConfig {
    /// Use contiguous equal-key runs for keys flagged as sorted.
    #[serde(default = "default_true")]
    pub honor_sorted_hint: bool,
    /// Share partition indices between window expressions of one query.
    #[serde(default = "default_true")]
    pub partition_cache: bool,
}

fn default_true() -> bool {
    true
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            honor_sorted_hint: true,
            partition_cache: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = OverwinConfig::parse("").expect("parse empty config");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.runtime.parallel_partition_threshold, 64);
        assert_eq!(cfg.runtime.parallel_min_rows, 4096);
        assert!(cfg.window.honor_sorted_hint);
        assert!(cfg.window.partition_cache);
    }

    #[test]
    fn log_filter_overrides_level() {
        let cfg = OverwinConfig::parse(
            r#"
log_level = "warn"
log_filter = "overwin=debug"
"#,
        )
        .expect("parse config");
        assert_eq!(cfg.effective_log_filter(), "overwin=debug");

        let cfg = OverwinConfig::parse("log_level = \"warn\"\nlog_filter = \"  \"")
            .expect("parse config");
        assert_eq!(cfg.effective_log_filter(), "warn");
    }

    #[test]
    fn zero_partition_threshold_is_rejected() {
        let err = OverwinConfig::parse("[runtime]\nparallel_partition_threshold = 0")
            .expect_err("expected validation error");
        assert!(
            err.to_string().contains("parallel_partition_threshold"),
            "err={err}"
        );
    }

    #[test]
    fn window_section_is_parsed() {
        let cfg = OverwinConfig::parse(
            r#"
[runtime]
window_threads = 3

[window]
honor_sorted_hint = false
partition_cache = false
"#,
        )
        .expect("parse config");
        assert_eq!(cfg.runtime.actual_window_threads(), 3);
        assert!(!cfg.window.honor_sorted_hint);
        assert!(!cfg.window.partition_cache);
    }
}
