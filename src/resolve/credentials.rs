use std::collections::VecDeque;

/// Remaining-quota floor below which the current album-service key is retired.
pub const QUOTA_FLOOR: u64 = 1000;

/// Ordered album-service client ids, consumed from the front.
///
/// Callers read the front key, release the lock for the request, and then
/// report quota with [`CredentialPool::retire_if_front`]. Retiring only when
/// the reported key is still at the front keeps two concurrent callers that
/// saw the same low quota from discarding two keys.
#[derive(Debug, Default)]
pub struct CredentialPool {
    keys: VecDeque<String>,
}

impl CredentialPool {
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            keys: keys.into_iter().filter(|k| !k.is_empty()).collect(),
        }
    }

    pub fn front(&self) -> Option<&str> {
        self.keys.front().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Discard `key` if it is still the front key and `remaining` is under
    /// the floor. Returns whether a key was discarded.
    pub fn retire_if_front(&mut self, key: &str, remaining: u64) -> bool {
        if remaining >= QUOTA_FLOOR || self.front() != Some(key) {
            return false;
        }
        self.keys.pop_front();
        tracing::info!(
            remaining,
            left = self.keys.len(),
            "Album-service key near quota, rotating to the next one"
        );
        true
    }
}
