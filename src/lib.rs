pub mod archive;
pub mod config;
pub mod crawler;
pub mod error;
pub mod models;
pub mod progress;
pub mod utils;

pub use config::{FetchConfig, RetryConfig};
pub use crawler::{Fetcher, HttpFetcher, MangaCrawler, RunSummary};
pub use error::{Error, FetchError, PageError, Result};
pub use models::{Chapter, Image, Page, Series};
pub use utils::{get_user_input, yes_no_prompt};
