use serde::{Deserialize, Serialize};

use crate::link_repo::Link;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShortenedLink {
    pub key: String,
    pub short_url: String,
    pub long_url: String,
}

impl From<Link> for ShortenedLink {
    fn from(
        Link {
            key,
            short_url,
            long_url,
        }: Link,
    ) -> Self {
        Self {
            key,
            short_url,
            long_url,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Error {
    pub error: String,
    /// Also logged server-side, for correlating a response with its failure.
    pub error_id: String,
}
