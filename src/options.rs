use std::env;

use serde::{Deserialize, Serialize};

/// What [`Database::analyze`](crate::physical::db::Database::analyze) should do with
/// each leaf-table page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    pub decode_rows: bool,
    pub extract_slack: bool,
    /// Keep the gap region even when the cell-pointer array runs straight into the
    /// content area.
    pub keep_empty_gap: bool,
    /// Overrides the free-block cap, which otherwise scales with the page size.
    pub max_freeblocks: Option<usize>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            decode_rows: true,
            extract_slack: true,
            keep_empty_gap: true,
            max_freeblocks: None,
        }
    }
}

impl AnalysisOptions {
    /// Defaults, adjusted by `SLEUTH_NO_ROWS`, `SLEUTH_NO_SLACK` and
    /// `SLEUTH_MAX_FREEBLOCKS`.
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| var(key).is_some_and(|value| !matches!(value.as_str(), "" | "0"));

        let mut options = Self::default();
        if flag("SLEUTH_NO_ROWS") {
            options.decode_rows = false;
        }
        if flag("SLEUTH_NO_SLACK") {
            options.extract_slack = false;
        }
        options.max_freeblocks = var("SLEUTH_MAX_FREEBLOCKS").and_then(|value| value.parse().ok());
        options
    }
}
