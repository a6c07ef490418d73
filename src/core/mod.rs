pub mod config;
pub use config::AppConfig;

pub mod error;
pub use error::{Lookup, ServiceError};

pub mod retry;
pub use retry::{RetryPolicy, with_retry};
