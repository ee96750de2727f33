//! Network access for Harbor.
//!
//! The strategies never talk to the network directly; they call a
//! [`Fetcher`]. Production hosts use [`HttpFetcher`], tests and offline
//! simulations use [`ScriptedFetcher`].

pub mod fetcher;
pub mod http;
pub mod scripted;

pub use fetcher::Fetcher;
pub use http::HttpFetcher;
pub use scripted::ScriptedFetcher;
