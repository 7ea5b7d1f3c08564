//! Feed discovery for arbitrary site URLs.
//!
//! [`feed::Finder`] is the entry point; [`server`] exposes it over HTTP.

pub mod config;
pub mod feed;
pub mod net;
pub mod server;
pub mod util;

pub use config::Config;
pub use feed::{DiscoveryError, Feed, Finder};
