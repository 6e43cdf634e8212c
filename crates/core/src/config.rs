//! Engine settings.
//!
//! Everything has a default; hosts override individual fields from their own
//! configuration source (the stdio server reads environment variables).

use crate::{KgError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Model loaded by the dense backend unless configured otherwise.
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Which embedding backend a session should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Dense first, TF-IDF if the model is unavailable or fails.
    #[default]
    Auto,
    /// Like `Auto`, but a fallback is logged as an error.
    Dense,
    /// TF-IDF only; the dense model is never loaded.
    Sparse,
}

impl BackendPreference {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendPreference::Auto => "auto",
            BackendPreference::Dense => "dense",
            BackendPreference::Sparse => "sparse",
        }
    }
}

impl fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendPreference {
    type Err = KgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendPreference::Auto),
            "dense" => Ok(BackendPreference::Dense),
            "sparse" | "tfidf" => Ok(BackendPreference::Sparse),
            other => Err(KgError::InvalidParameter(format!(
                "unknown backend '{other}' (expected auto, dense or sparse)"
            ))),
        }
    }
}

/// Bounds a host applies to user-supplied query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLimits {
    pub max_top_k: usize,
    pub max_depth: usize,
    pub default_top_k: usize,
    pub default_depth: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_top_k: 10,
            max_depth: 3,
            default_top_k: 5,
            default_depth: 1,
        }
    }
}

impl QueryLimits {
    /// Reject `top_k` outside `1..=max_top_k` and `depth` above `max_depth`.
    pub fn check(&self, top_k: usize, depth: usize) -> Result<()> {
        if top_k == 0 || top_k > self.max_top_k {
            return Err(KgError::InvalidParameter(format!(
                "top_k must be between 1 and {} (got {top_k})",
                self.max_top_k
            )));
        }
        if depth > self.max_depth {
            return Err(KgError::InvalidParameter(format!(
                "depth must be between 0 and {} (got {depth})",
                self.max_depth
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: BackendPreference,
    /// Dense model name.
    pub model: String,
    pub limits: QueryLimits,
    /// Render height for the full-graph view.
    pub render_height: u32,
    /// Render height for query subgraphs.
    pub subgraph_height: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            model: DEFAULT_MODEL.to_string(),
            limits: QueryLimits::default(),
            render_height: 600,
            subgraph_height: 400,
        }
    }
}

impl EngineConfig {
    /// Defaults with the dense backend disabled.
    pub fn sparse_only() -> Self {
        Self {
            backend: BackendPreference::Sparse,
            ..Self::default()
        }
    }

    /// Apply overrides from a key lookup (`KGLENS_BACKEND`, `KGLENS_MODEL`).
    ///
    /// Taking the lookup as a closure keeps this testable without touching
    /// the process environment; hosts pass `|k| std::env::var(k).ok()`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup("KGLENS_BACKEND") {
            self.backend = raw.parse()?;
        }
        if let Some(model) = lookup("KGLENS_MODEL") {
            let model = model.trim();
            if model.is_empty() {
                return Err(KgError::InvalidParameter(
                    "KGLENS_MODEL must not be empty".to_string(),
                ));
            }
            self.model = model.to_string();
        }
        Ok(self)
    }

    /// Defaults overridden from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_query_bounds() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.backend, BackendPreference::Auto);
        assert_eq!(cfg.model, "all-MiniLM-L6-v2");
        assert_eq!(cfg.limits.default_top_k, 5);
        assert_eq!(cfg.limits.default_depth, 1);
        assert_eq!((cfg.render_height, cfg.subgraph_height), (600, 400));
    }

    #[test]
    fn limits_accept_bounds() {
        let limits = QueryLimits::default();
        assert!(limits.check(1, 0).is_ok());
        assert!(limits.check(10, 3).is_ok());
    }

    #[test]
    fn limits_reject_out_of_range() {
        let limits = QueryLimits::default();
        assert!(matches!(limits.check(0, 1), Err(KgError::InvalidParameter(_))));
        assert!(matches!(limits.check(11, 1), Err(KgError::InvalidParameter(_))));
        let err = limits.check(5, 4).unwrap_err();
        assert!(err.to_string().contains("depth must be between 0 and 3"));
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("Sparse".parse::<BackendPreference>().unwrap(), BackendPreference::Sparse);
        assert_eq!(" dense ".parse::<BackendPreference>().unwrap(), BackendPreference::Dense);
        assert!("gpu".parse::<BackendPreference>().is_err());
    }

    #[test]
    fn overrides_apply_from_lookup() {
        let vars: HashMap<&str, &str> =
            [("KGLENS_BACKEND", "sparse"), ("KGLENS_MODEL", "bge-small-en-v1.5")]
                .into_iter()
                .collect();
        let cfg = EngineConfig::default()
            .with_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.backend, BackendPreference::Sparse);
        assert_eq!(cfg.model, "bge-small-en-v1.5");
    }

    #[test]
    fn empty_model_override_is_rejected() {
        let err = EngineConfig::default()
            .with_overrides(|k| (k == "KGLENS_MODEL").then(|| "  ".to_string()))
            .unwrap_err();
        assert!(matches!(err, KgError::InvalidParameter(_)));
    }

    #[test]
    fn deserializes_partial_json() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"backend":"sparse","limits":{"max_top_k":20}}"#).unwrap();
        assert_eq!(cfg.backend, BackendPreference::Sparse);
        assert_eq!(cfg.limits.max_top_k, 20);
        assert_eq!(cfg.limits.max_depth, 3);
        assert_eq!(cfg.model, DEFAULT_MODEL);
    }
}
