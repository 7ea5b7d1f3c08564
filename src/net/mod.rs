//! Outbound HTTP for discovery.
//!
//! - [`fetcher`] - the single GET primitive every strategy goes through
//! - [`resolver`] - DNS resolution that refuses internal addresses

mod fetcher;
mod resolver;

pub use fetcher::{FetchError, FetchedPage, Fetcher};
pub use resolver::{BlockedAddress, GuardedResolver};
