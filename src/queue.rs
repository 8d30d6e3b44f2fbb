use crate::model::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub key: EntryKey,
    pub track: Track,
}

#[derive(Debug, Default)]
pub struct QueueStore {
    pub(crate) entries: Vec<QueueEntry>,
    // Pre-shuffle arrangement of the same entries; Some only while shuffled.
    pub(crate) original: Option<Vec<QueueEntry>>,
    pub(crate) current: Option<usize>,
    next_key: u64,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.entries.iter().map(|entry| entry.track.clone()).collect()
    }

    pub fn original_tracks(&self) -> Option<Vec<Track>> {
        self.original
            .as_ref()
            .map(|entries| entries.iter().map(|entry| entry.track.clone()).collect())
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_entry(&self) -> Option<&QueueEntry> {
        self.entries.get(self.current?)
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_entry().map(|entry| &entry.track)
    }

    pub fn current_key(&self) -> Option<EntryKey> {
        self.current_entry().map(|entry| entry.key)
    }

    pub fn is_shuffled(&self) -> bool {
        self.original.is_some()
    }

    pub fn position_of(&self, key: EntryKey) -> Option<usize> {
        self.entries.iter().position(|entry| entry.key == key)
    }

    pub fn has_next(&self) -> bool {
        match self.current {
            Some(current) => current + 1 < self.entries.len(),
            None => !self.entries.is_empty(),
        }
    }

    pub fn set_current(&mut self, index: usize) -> bool {
        if index >= self.entries.len() {
            return false;
        }
        self.current = Some(index);
        true
    }

    pub fn load(&mut self, tracks: Vec<Track>) {
        self.entries = tracks.into_iter().map(|track| self.wrap(track)).collect();
        self.original = None;
        self.current = None;
    }

    pub fn restore(
        &mut self,
        queue: Vec<Track>,
        original: Option<Vec<Track>>,
        current: Option<usize>,
    ) {
        self.load(queue);
        self.current = current.filter(|index| *index < self.entries.len());

        let Some(original) = original else {
            return;
        };
        let mut unclaimed: Vec<QueueEntry> = self.entries.clone();
        let mut restored = Vec::with_capacity(original.len());
        for track in original {
            let Some(pos) = unclaimed.iter().position(|entry| entry.track.id == track.id) else {
                tracing::warn!(track_id = %track.id, "snapshot original order diverges from queue");
                return;
            };
            restored.push(unclaimed.remove(pos));
        }
        if !unclaimed.is_empty() {
            tracing::warn!("snapshot original order is missing queued tracks");
            return;
        }
        self.original = Some(restored);
    }

    pub fn append(&mut self, track: Track) -> EntryKey {
        let entry = self.wrap(track);
        let key = entry.key;
        if let Some(original) = self.original.as_mut() {
            original.push(entry.clone());
        }
        self.entries.push(entry);
        key
    }

    pub fn insert_after_current(&mut self, track: Track) -> EntryKey {
        let entry = self.wrap(track);
        let key = entry.key;
        let anchor = self.current_key();

        if let Some(original) = self.original.as_mut() {
            let at = anchor
                .and_then(|anchor| original.iter().position(|item| item.key == anchor))
                .map_or(0, |pos| pos + 1);
            original.insert(at, entry.clone());
        }

        let at = self.current.map_or(0, |current| current + 1);
        self.entries.insert(at, entry);
        key
    }

    pub fn remove_at(&mut self, index: usize) -> bool {
        if index >= self.entries.len() || Some(index) == self.current {
            return false;
        }

        let removed = self.entries.remove(index);
        if let Some(original) = self.original.as_mut() {
            original.retain(|entry| entry.key != removed.key);
        }
        if let Some(current) = self.current
            && index < current
        {
            self.current = Some(current - 1);
        }
        true
    }

    pub fn clear_except_current(&mut self) {
        match self.current_entry().cloned() {
            Some(active) => {
                if let Some(original) = self.original.as_mut() {
                    original.retain(|entry| entry.key == active.key);
                }
                self.entries = vec![active];
                self.current = Some(0);
            }
            None => {
                self.entries.clear();
                if let Some(original) = self.original.as_mut() {
                    original.clear();
                }
                self.current = None;
            }
        }
    }

    pub fn set_favorite(&mut self, track_id: &str, is_favorite: bool) -> usize {
        let mut changed = 0;
        for entry in self.entries.iter_mut().filter(|entry| entry.track.id == track_id) {
            entry.track.is_favorite = is_favorite;
            changed += 1;
        }
        if let Some(original) = self.original.as_mut() {
            for entry in original.iter_mut().filter(|entry| entry.track.id == track_id) {
                entry.track.is_favorite = is_favorite;
            }
        }
        changed
    }

    pub(crate) fn relocate_current(&mut self, key: Option<EntryKey>) {
        self.current = key.and_then(|key| self.position_of(key));
    }

    fn wrap(&mut self, track: Track) -> QueueEntry {
        self.next_key += 1;
        QueueEntry {
            key: EntryKey(self.next_key),
            track,
        }
    }
}
