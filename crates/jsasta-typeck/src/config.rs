//! Checker configuration.
//!
//! Every field has a default, so an empty TOML document (or
//! `InferConfig::default()`) gives the stock behavior.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Knobs for one run of the checker.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InferConfig {
    /// Prefix for mangled specialization names (`prefix__name_T1_T2`).
    pub module_prefix: Option<String>,
    /// Upper bound on fixpoint iterations, for the const/record pass and for
    /// specialization discovery alike. Hitting it is a warning.
    pub max_iterations: usize,
    /// Upper bound on nested const expansions.
    pub max_const_depth: usize,
    /// Upper bound on specializations materialized inside one another.
    pub max_specialization_depth: usize,
    /// Runtime support routines callable without a declaration, mapped to
    /// the name of their return type.
    pub runtime_functions: BTreeMap<String, String>,
}

impl Default for InferConfig {
    fn default() -> Self {
        let runtime_functions = [
            ("print", "void"),
            ("println", "void"),
            ("console.log", "void"),
            ("strlen", "i32"),
        ]
        .into_iter()
        .map(|(name, ret)| (name.to_string(), ret.to_string()))
        .collect();

        InferConfig {
            module_prefix: None,
            max_iterations: 100,
            max_const_depth: 100,
            max_specialization_depth: 64,
            runtime_functions,
        }
    }
}

impl InferConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<InferConfig, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse checker config: {}", e))
    }

    pub fn with_module_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.module_prefix = Some(prefix.into());
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    /// Return type name of a runtime routine, if `name` is one.
    pub fn runtime_return_type(&self, name: &str) -> Option<&str> {
        self.runtime_functions.get(name).map(String::as_str)
    }
}
