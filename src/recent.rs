use crate::error::Result;
use crate::persistence::{KeyValueStore, user_key};

const RECENT_KEY: &str = "recently_played";

#[derive(Debug, Clone)]
pub struct RecentlyPlayed {
    limit: usize,
}

impl RecentlyPlayed {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn list(&self, store: &dyn KeyValueStore, user: &str) -> Vec<String> {
        let raw = match store.get(&user_key(RECENT_KEY, user)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                tracing::warn!(user, "failed to read recently played: {err}");
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            tracing::warn!(user, "discarding unreadable recently played list: {err}");
            Vec::new()
        })
    }

    pub fn record(&self, store: &mut dyn KeyValueStore, user: &str, track_id: &str) -> Result<()> {
        let mut ids = self.list(store, user);
        ids.retain(|id| id != track_id);
        ids.insert(0, track_id.to_string());
        ids.truncate(self.limit);
        let json = serde_json::to_string(&ids)?;
        store.set(&user_key(RECENT_KEY, user), &json)
    }
}
