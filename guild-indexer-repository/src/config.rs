//! Configuration types for the GuildSearchService.

/// Default cap on the number of documents a single search returns.
const DEFAULT_MAX_RESULTS: usize = 100;

/// Configuration for the GuildSearchService.
#[derive(Debug, Clone)]
pub struct SearchServiceConfig {
    /// Maximum number of documents returned by one search.
    ///
    /// Defaults to 100 if not specified.
    pub max_results: usize,
}

impl Default for SearchServiceConfig {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl SearchServiceConfig {
    /// Create a config with a custom result cap.
    ///
    /// A cap of zero is raised to one.
    pub fn with_max_results(max_results: usize) -> Self {
        Self {
            max_results: max_results.max(1),
        }
    }
}
