pub mod mediastack;

pub use mediastack::{ApiKey, MediastackClient, NewsConfig};

pub mod prelude {
    pub use super::mediastack::{ApiKey, MediastackClient, NewsConfig};
    pub use cns_core::{Article, Error, FetchWindow, NewsSource, Result};
}
