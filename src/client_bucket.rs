//! Static quota table for attenuated authentication.
//!
//! When per-route rate-limit headers are unavailable or not trusted, a fixed set
//! of client-side buckets is used instead. The table is exhaustive for that mode:
//! looking up an id that is not listed is a programming error and panics.

use std::time::Duration;

/// A fixed window: `window_count` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientBucket {
    /// Bucket id as used in [`BucketId`](crate::BucketId).
    pub id: &'static str,
    /// Permits per window.
    pub window_count: u32,
    /// Window length.
    pub window: Duration,
}

/// Default bucket for attenuated requests with no dedicated quota.
pub const UNBUCKETED: &str = "<unbucketed>";
/// Message sends and edits.
pub const SEND_EDIT: &str = "<send_edit>";

static TABLE: [ClientBucket; 2] = [
    ClientBucket { id: UNBUCKETED, window_count: 10, window: Duration::from_secs(10) },
    ClientBucket { id: SEND_EDIT, window_count: 10, window: Duration::from_secs(10) },
];

impl ClientBucket {
    /// Look up a bucket. Panics on an unknown id.
    pub fn get(id: &str) -> &'static ClientBucket {
        match Self::find(id) {
            Some(bucket) => bucket,
            None => panic!("no client bucket is defined for id {id:?}"),
        }
    }

    /// Non-panicking lookup.
    pub fn find(id: &str) -> Option<&'static ClientBucket> {
        TABLE.iter().find(|bucket| bucket.id == id)
    }

    /// All defined buckets.
    pub fn all() -> &'static [ClientBucket] {
        &TABLE
    }
}
