//! Source modes a session can enumerate from.

use serde::{Deserialize, Serialize};

/// Default name of the side manifest in culture-aware bundles
pub const DEFAULT_MANIFEST: &str = "resources.txt";

/// Which enumeration scheme the resource identifiers follow.
///
/// Selected explicitly by the caller; sessions never auto-detect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum SourceMode {
    /// Dotted identifiers prefixed with the bundle root (`MyApp.Views.Main.qml`)
    Plain,

    /// Slash-delimited identifiers plus a manifest of canonical paths
    CultureAware {
        /// Identifier of the manifest resource
        manifest: String,
    },
}

impl SourceMode {
    /// Culture-aware mode with the default manifest name
    pub fn culture_aware() -> Self {
        SourceMode::CultureAware {
            manifest: DEFAULT_MANIFEST.to_string(),
        }
    }

    pub fn is_culture_aware(&self) -> bool {
        matches!(self, SourceMode::CultureAware { .. })
    }
}

impl Default for SourceMode {
    fn default() -> Self {
        SourceMode::Plain
    }
}

impl std::fmt::Display for SourceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceMode::Plain => write!(f, "plain"),
            SourceMode::CultureAware { manifest } => write!(f, "culture-aware ({})", manifest),
        }
    }
}
