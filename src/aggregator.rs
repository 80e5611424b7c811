use crate::identifier::ThreadIdentifier;
use crate::types::{Bundle, FeedSource, RawItem, ThreadUpdate, ThreadcastError};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Per-source cycle processor. Holds the permalinks seen in the previous
/// completed cycle and detects novelty against them; within-cycle duplicates
/// are counted each time they appear.
pub struct CycleAggregator {
    source: Arc<FeedSource>,
    identifier: Box<dyn ThreadIdentifier>,
    previous_seen: HashSet<String>,
    current_seen: HashSet<String>,
    updates: HashMap<String, ThreadUpdate>,
}

impl CycleAggregator {
    pub fn new(source: Arc<FeedSource>) -> Self {
        let identifier = source.identifier.build();
        Self {
            source,
            identifier,
            previous_seen: HashSet::new(),
            current_seen: HashSet::new(),
            updates: HashMap::new(),
        }
    }

    /// Process one cycle's items, in the order supplied. Returns the bundle
    /// for this cycle when any thread saw new activity. Seen sets and the
    /// update map are rotated unconditionally, whether or not a bundle is
    /// produced.
    pub fn process_cycle(&mut self, items: &[RawItem]) -> Option<Bundle> {
        for item in items {
            let permalink = match Url::parse(&item.permalink) {
                Ok(url) => url,
                Err(source) => {
                    let err = ThreadcastError::Permalink {
                        permalink: item.permalink.clone(),
                        source,
                    };
                    warn!(source = %self.source.id, error = %err, "skipping item");
                    continue;
                }
            };

            let key = match self.identifier.thread_key(&permalink) {
                Ok(key) => key,
                Err(err) => {
                    warn!(source = %self.source.id, error = %err, "skipping item");
                    continue;
                }
            };

            self.current_seen.insert(item.permalink.clone());

            // Novelty is judged against the previous completed cycle only.
            if self.previous_seen.contains(&item.permalink) {
                continue;
            }

            match self.updates.entry(key) {
                Entry::Occupied(mut entry) => {
                    let update = entry.get_mut();
                    update.last_updated_at = item.published.clone();
                    update.message_count += 1;
                }
                Entry::Vacant(entry) => {
                    // Title is fixed to the first item seen for this key.
                    entry.insert(ThreadUpdate {
                        title: item.title.clone(),
                        last_updated_at: item.published.clone(),
                        message_count: 1,
                    });
                }
            }
        }

        self.previous_seen = mem::take(&mut self.current_seen);
        let updates = mem::take(&mut self.updates);

        if updates.is_empty() {
            debug!(source = %self.source.id, "cycle produced no new activity");
            return None;
        }

        debug!(
            source = %self.source.id,
            threads = updates.len(),
            "cycle produced a bundle"
        );
        Some(Bundle {
            source: self.source.clone(),
            updates,
        })
    }
}
