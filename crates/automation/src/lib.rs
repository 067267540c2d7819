//! HTTP clients for the external collaborators.
//!
//! - [`RemoteScraper`] drives the browser-automation service.
//! - [`HttpImageScorer`] calls the vision scoring service.
//!
//! Both implement the traits in [`pinrelay_core::collaborators`].

pub mod api;
pub mod config;
pub mod scorer;
pub mod scraper;

pub use config::AutomationConfig;
pub use scorer::HttpImageScorer;
pub use scraper::{RemoteScrapeSession, RemoteScraper};
