//! Per-job crawl frontier: one authoritative map of every known URL plus an
//! ordered queue pointing into it. A URL enters the map exactly once, so
//! dedup and visited tracking cannot drift apart. The frontier is owned by
//! the job's supervising task; it is not shared across tasks.

use std::cmp::Ordering;
use std::collections::HashMap;

use priority_queue::PriorityQueue;
use tracing::trace;

/// Where a known URL is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Queued,
    Visited,
}

#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub depth: u32,
    pub source_url: Option<String>,
    /// Anchor text of the link that discovered this URL.
    pub link_text: Option<String>,
    pub state: EntryState,
}

/// Scheduling key: BFS by depth, advisory priority inside a depth,
/// insertion order as the tiebreak.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Schedule {
    depth: u32,
    priority: u8,
    seq: u64,
}

impl PartialOrd for Schedule {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Schedule {
    fn cmp(&self, other: &Self) -> Ordering {
        // PriorityQueue pops the max: shallower depth wins, then higher
        // priority, then earlier insertion.
        other
            .depth
            .cmp(&self.depth)
            .then(self.priority.cmp(&other.priority))
            .then(other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct UrlKey(String);

#[derive(Default)]
pub struct Frontier {
    entries: HashMap<String, FrontierEntry>,
    queue: PriorityQueue<UrlKey, Schedule>,
    seq: u64,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a URL if it has never been seen in this job.
    /// Returns false for duplicates (queued or already visited).
    pub fn insert(
        &mut self,
        url: &str,
        depth: u32,
        source_url: Option<String>,
        link_text: Option<String>,
        priority: u8,
    ) -> bool {
        if self.entries.contains_key(url) {
            return false;
        }
        self.entries.insert(
            url.to_string(),
            FrontierEntry {
                depth,
                source_url,
                link_text,
                state: EntryState::Queued,
            },
        );
        self.seq += 1;
        self.queue.push(
            UrlKey(url.to_string()),
            Schedule {
                depth,
                priority,
                seq: self.seq,
            },
        );
        trace!(url, depth, priority, "queued");
        true
    }

    /// Pop the next URL and mark it visited.
    pub fn pop(&mut self) -> Option<(String, FrontierEntry)> {
        let (key, _) = self.queue.pop()?;
        let entry = self.entries.get_mut(&key.0)?;
        entry.state = EntryState::Visited;
        Some((key.0, entry.clone()))
    }

    /// Pop up to `n` URLs in scheduling order, marking each visited.
    pub fn pop_batch(&mut self, n: usize) -> Vec<(String, FrontierEntry)> {
        let mut batch = Vec::with_capacity(n.min(self.queue.len()));
        for _ in 0..n {
            match self.pop() {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        batch
    }

    /// Whether the URL is known to this job at all (queued or visited).
    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    pub fn is_visited(&self, url: &str) -> bool {
        matches!(
            self.entries.get(url).map(|e| e.state),
            Some(EntryState::Visited)
        )
    }

    /// URLs still waiting to be processed.
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Every URL ever inserted in this job.
    pub fn discovered_count(&self) -> usize {
        self.entries.len()
    }

    pub fn visited_count(&self) -> usize {
        self.entries.len() - self.queue.len()
    }
}
