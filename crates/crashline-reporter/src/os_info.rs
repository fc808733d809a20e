//! Operating system information collector
//!
//! Gathers non-identifying system information recorded in panic dumps.
//! Never includes hostname or username.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Non-identifying operating system information
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OsInfo {
    pub os: String,
    pub kernel: String,
    pub arch: String,
}

impl OsInfo {
    /// Collect OS information from the current system.
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            kernel: read_kernel_version(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    /// Flattens the fields into structured-log properties, skipping empty ones.
    pub fn to_properties(&self) -> BTreeMap<String, String> {
        [("os", &self.os), ("kernel", &self.kernel), ("arch", &self.arch)]
            .into_iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (format!("os.{k}"), v.clone()))
            .collect()
    }
}

fn read_kernel_version() -> String {
    std::fs::read_to_string("/proc/version")
        .ok()
        .and_then(|v| v.split_whitespace().nth(2).map(String::from))
        .unwrap_or_default()
}
