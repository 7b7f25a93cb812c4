//! Remote fetches
//!
//! HTTP download client used by dataset acquisition.

pub mod http;

pub use http::{DownloadSummary, HttpClient, HttpConfig};
