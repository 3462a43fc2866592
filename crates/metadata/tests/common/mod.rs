//! Test fixtures shared by the facade test suites.

use std::sync::atomic::{AtomicU64, Ordering};
use time::{Duration, OffsetDateTime};
use updraft_core::{PackageFields, ReleaseMethod, StoreConfig};
use updraft_metadata::UpdraftStore;

/// Counter for generating unique emails across a test binary.
static EMAIL_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Fresh in-memory store.
pub async fn test_store() -> UpdraftStore {
    updraft_metadata::from_config(&StoreConfig::for_testing())
        .await
        .expect("test store")
}

/// A unique email address.
pub fn unique_email(tag: &str) -> String {
    let n = EMAIL_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{tag}{n}@example.com")
}

/// Release fields for a package labeled `label`.
pub fn package_fields(label: &str) -> PackageFields {
    PackageFields {
        label: label.to_string(),
        app_version: "1.0.0".to_string(),
        package_hash: format!("hash-{label}"),
        blob_url: format!("https://blobs.example.com/{label}"),
        manifest_blob_url: format!("https://blobs.example.com/{label}.manifest"),
        is_mandatory: false,
        is_disabled: false,
        rollout: 100,
        size: 256_994,
        released_by: "user1@example.com".to_string(),
        release_method: ReleaseMethod::Upload,
        description: "Minor improvements".to_string(),
    }
}

/// An expiry comfortably in the future.
#[allow(dead_code)] // each test file compiles common/ separately
pub fn far_future() -> OffsetDateTime {
    OffsetDateTime::now_utc() + Duration::days(365)
}

/// An expiry in the past.
#[allow(dead_code)]
pub fn past() -> OffsetDateTime {
    OffsetDateTime::now_utc() - Duration::days(1)
}
