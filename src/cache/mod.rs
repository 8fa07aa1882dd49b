//! Freshline view storage
//!
//! Holds everything the freshness engine keeps between requests:
//!
//! - **View store**: generated aggregate views keyed by `(policy, post)`, LRU
//!   bounded, with one regeneration mutex per key
//! - **Canonical slot**: the last fetched canonical post set per content source
//!
//! ## Configuration
//!
//! ```toml
//! [freshness]
//! store_limit = 3000
//!
//! [source]
//! revalidate_seconds = 60
//! ```

mod config;
mod keys;
mod lock;
mod store;

pub use config::StoreConfig;
pub use keys::ViewKey;
pub use store::{CanonicalSlot, RegenerationLock, StoredView, ViewOrigin, ViewStore};
