//! Transports for the remote content service.
//!
//! Both implement [`ContentSource`](crate::application::source::ContentSource)
//! over `reqwest` and must agree on every record; they differ only in how a
//! request is built and how failures surface.

mod client;
mod fetch;

pub use client::ClientSource;
pub use fetch::FetchSource;

pub fn user_agent() -> &'static str {
    concat!("freshline/", env!("CARGO_PKG_VERSION"))
}
