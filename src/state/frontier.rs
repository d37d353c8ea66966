use std::collections::{HashSet, VecDeque};

/// Breadth-first crawl frontier: a FIFO of `(url, depth)` pairs plus the set
/// of URLs already processed
///
/// URLs are stored in canonical string form (see
/// [`normalize_url`](crate::url::normalize_url)). A visited URL is never
/// re-enqueued, and a URL already waiting in the queue is not added twice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontier {
    queue: VecDeque<(String, u32)>,
    visited: HashSet<String>,
    pending: HashSet<String>,
}

impl Frontier {
    /// Creates a frontier seeded with the start URL at depth 0
    pub fn new(start_url: impl Into<String>) -> Self {
        let mut frontier = Self::default();
        frontier.enqueue(start_url, 0);
        frontier
    }

    /// Rebuilds a frontier from a persisted snapshot
    pub fn restore(
        visited: impl IntoIterator<Item = String>,
        queue: impl IntoIterator<Item = (String, u32)>,
    ) -> Self {
        let mut frontier = Self {
            visited: visited.into_iter().collect(),
            ..Self::default()
        };
        for (url, depth) in queue {
            frontier.enqueue(url, depth);
        }
        frontier
    }

    /// Appends a URL to the back of the queue
    ///
    /// Returns false (and leaves the frontier untouched) if the URL was
    /// already visited or is already waiting.
    pub fn enqueue(&mut self, url: impl Into<String>, depth: u32) -> bool {
        let url = url.into();
        if self.visited.contains(&url) || self.pending.contains(&url) {
            return false;
        }
        self.pending.insert(url.clone());
        self.queue.push_back((url, depth));
        true
    }

    /// Removes and returns the head of the queue
    pub fn pop(&mut self) -> Option<(String, u32)> {
        let (url, depth) = self.queue.pop_front()?;
        self.pending.remove(&url);
        Some((url, depth))
    }

    /// Records a URL as processed; returns false if it already was
    pub fn mark_visited(&mut self, url: impl Into<String>) -> bool {
        self.visited.insert(url.into())
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    /// Queued `(url, depth)` pairs in processing order
    pub fn queued(&self) -> impl Iterator<Item = &(String, u32)> {
        self.queue.iter()
    }

    /// Visited URLs in no particular order
    pub fn visited(&self) -> impl Iterator<Item = &String> {
        self.visited.iter()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }

    /// True when no URL is waiting to be processed
    pub fn is_exhausted(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_with_start_url() {
        let mut frontier = Frontier::new("http://a.test/");
        assert_eq!(frontier.queue_len(), 1);
        assert_eq!(frontier.pop(), Some(("http://a.test/".to_string(), 0)));
        assert!(frontier.is_exhausted());
    }

    #[test]
    fn test_fifo_order() {
        let mut frontier = Frontier::default();
        frontier.enqueue("http://a.test/1", 1);
        frontier.enqueue("http://a.test/2", 1);
        frontier.enqueue("http://a.test/3", 2);

        let order: Vec<String> = std::iter::from_fn(|| frontier.pop()).map(|(u, _)| u).collect();
        assert_eq!(order, vec!["http://a.test/1", "http://a.test/2", "http://a.test/3"]);
    }

    #[test]
    fn test_visited_never_requeued() {
        let mut frontier = Frontier::new("http://a.test/");
        let (url, _) = frontier.pop().unwrap();
        assert!(frontier.mark_visited(url.clone()));
        assert!(!frontier.mark_visited(url.clone()));

        assert!(!frontier.enqueue(url, 1));
        assert!(frontier.is_exhausted());
    }

    #[test]
    fn test_pending_not_duplicated() {
        let mut frontier = Frontier::default();
        assert!(frontier.enqueue("http://a.test/x", 1));
        assert!(!frontier.enqueue("http://a.test/x", 2));
        assert_eq!(frontier.queue_len(), 1);

        // Once popped it may be enqueued again until marked visited
        frontier.pop();
        assert!(frontier.enqueue("http://a.test/x", 2));
    }

    #[test]
    fn test_restore_preserves_order_and_visited() {
        let frontier = Frontier::restore(
            vec!["http://a.test/".to_string()],
            vec![
                ("http://a.test/b".to_string(), 1),
                ("http://a.test/".to_string(), 1),
                ("http://a.test/c".to_string(), 2),
            ],
        );

        assert!(frontier.is_visited("http://a.test/"));
        let queued: Vec<&(String, u32)> = frontier.queued().collect();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].0, "http://a.test/b");
        assert_eq!(queued[1], &("http://a.test/c".to_string(), 2));
    }
}
