//! Bucket identifiers.
//!
//! A bucket id groups requests that share one quota. It is derived from the HTTP
//! method and the route *template* (`/channels/{channel_id}/messages`), so that
//! requests against different concrete ids share a bucket unless the id is a
//! major parameter. Major parameters (`guild_id`, `channel_id`, `webhook_id`)
//! are substituted into the template, splitting the quota per resource.
//!
//! ```rust
//! use tollgate::BucketId;
//! use http::Method;
//!
//! let a = BucketId::with_major(Method::POST, "/channels/{channel_id}/messages", [("channel_id", "1")]);
//! let b = BucketId::with_major(Method::POST, "/channels/{channel_id}/messages", [("channel_id", "2")]);
//! assert_ne!(a, b);
//! assert_eq!(a.as_str(), "POST /channels/1/messages");
//! ```

use http::Method;
use std::fmt;
use std::sync::Arc;

/// Route parameters that scope a quota to one resource.
pub const MAJOR_PARAMETERS: [&str; 3] = ["guild_id", "channel_id", "webhook_id"];

/// Key grouping requests that share one quota.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketId(Arc<str>);

impl BucketId {
    /// Bucket for `method` + `route` with no major parameters resolved.
    pub fn new(method: Method, route: &str) -> Self {
        Self(format!("{} {}", method, route).into())
    }

    /// Bucket for `method` + `route` with major parameters substituted.
    ///
    /// Parameters that are not major are ignored and stay as placeholders.
    pub fn with_major<'a, I>(method: Method, route: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut resolved = route.to_owned();
        for (name, value) in params {
            if MAJOR_PARAMETERS.contains(&name) {
                resolved = resolved.replace(&format!("{{{}}}", name), value);
            }
        }
        Self::new(method, &resolved)
    }

    /// Borrow the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketId({:?})", &*self.0)
    }
}

impl From<&str> for BucketId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for BucketId {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl AsRef<str> for BucketId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
