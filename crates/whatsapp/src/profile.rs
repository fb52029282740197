//! Session profile directory lifecycle.

use std::{path::Path, time::Duration};

use tracing::{debug, warn};

/// Delete the profile directory with bounded retries.
///
/// A just-terminated browser process may hold file handles for a moment,
/// making the first delete attempts fail; the retry loop exists for that
/// race. Returns `true` once the directory is gone, `false` after the
/// budget is exhausted — the caller treats giving up as non-fatal.
pub async fn purge_profile_dir(dir: &Path, attempts: u32, retry_delay: Duration) -> bool {
    for attempt in 1..=attempts.max(1) {
        if !dir.exists() {
            return true;
        }
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => {
                debug!(dir = %dir.display(), attempt, "profile directory removed");
                return true;
            },
            Err(e) => {
                debug!(dir = %dir.display(), attempt, error = %e, "profile delete attempt failed");
                tokio::time::sleep(retry_delay).await;
            },
        }
    }

    if dir.exists() {
        warn!(dir = %dir.display(), attempts, "giving up on profile directory removal");
        return false;
    }
    true
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removes_populated_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let profile = tmp.path().join("profile");
        std::fs::create_dir_all(profile.join("Default/Cache")).unwrap();
        std::fs::write(profile.join("Default/Cookies"), b"blob").unwrap();

        assert!(purge_profile_dir(&profile, 5, Duration::from_millis(1)).await);
        assert!(!profile.exists());
    }

    #[tokio::test]
    async fn missing_directory_is_success() {
        let tmp = tempfile::tempdir().unwrap();
        let profile = tmp.path().join("never-created");
        assert!(purge_profile_dir(&profile, 5, Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let tmp = tempfile::tempdir().unwrap();
        let profile = tmp.path().join("profile");
        std::fs::create_dir_all(&profile).unwrap();
        assert!(purge_profile_dir(&profile, 0, Duration::from_millis(1)).await);
        assert!(!profile.exists());
    }
}
