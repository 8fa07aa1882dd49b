//! View store configuration.
//!
//! Populated from the `[freshness]` and `[source]` sections of the settings.

use std::num::NonZeroUsize;

use time::Duration;

const DEFAULT_STORE_LIMIT: usize = 3000;
const DEFAULT_REVALIDATE_SECONDS: u64 = 60;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum generated views kept across all policies.
    pub store_limit: usize,
    /// How long the canonical post set is reused before refetching. Zero
    /// refetches on every use.
    pub canonical_revalidate: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_limit: DEFAULT_STORE_LIMIT,
            canonical_revalidate: Duration::seconds(DEFAULT_REVALIDATE_SECONDS as i64),
        }
    }
}

impl From<&crate::config::Settings> for StoreConfig {
    fn from(settings: &crate::config::Settings) -> Self {
        Self {
            store_limit: settings.freshness.store_limit.get(),
            canonical_revalidate: Duration::seconds(
                i64::try_from(settings.source.revalidate_seconds).unwrap_or(i64::MAX),
            ),
        }
    }
}

impl StoreConfig {
    /// Returns the store limit as NonZeroUsize, clamping to 1 if zero.
    pub fn store_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.store_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
