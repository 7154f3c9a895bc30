pub mod error;
pub mod models;
pub mod retry;
pub mod source;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use models::SentimentModel;
pub use retry::{with_retry, RetryConfig};
pub use source::NewsSource;
pub use types::*;
