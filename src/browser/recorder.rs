//! Network exchange recorder for a DevTools session
//!
//! DevTools reports one request as several events (sent, response, finished
//! or failed) keyed by a request id, and listeners may observe them slightly
//! out of order. The recorder accepts events in any order and keeps one
//! exchange per redirect hop, in the order each hop was first seen.

use crate::traffic::{TrafficEntry, TrafficLog};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Response half of an exchange as reported by DevTools
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ObservedResponse {
    pub url: String,
    pub status: i64,
    pub mime_type: String,
}

#[derive(Debug)]
struct Exchange {
    url: String,
    method: String,
    started_at: DateTime<Utc>,
    clock: Instant,
    status: Option<u16>,
    mime_type: String,
    duration_ms: f64,
    done: bool,
}

impl Exchange {
    fn new(url: &str, method: &str) -> Self {
        Self {
            url: url.to_string(),
            method: method.to_string(),
            started_at: Utc::now(),
            clock: Instant::now(),
            status: None,
            mime_type: String::new(),
            duration_ms: 0.0,
            done: false,
        }
    }

    fn respond(&mut self, response: &ObservedResponse) {
        self.status = u16::try_from(response.status).ok().filter(|s| *s > 0);
        self.mime_type = response.mime_type.clone();
    }

    fn to_entry(&self) -> TrafficEntry {
        let entry = match self.status {
            Some(status) => TrafficEntry::new(&self.url, &self.method, &self.mime_type, status),
            None => TrafficEntry::failed(&self.url, &self.method),
        };
        entry.with_timing(self.started_at, self.duration_ms)
    }
}

/// Collects DevTools network events into traffic entries
#[derive(Debug)]
pub(crate) struct NetworkRecorder {
    /// Entries carried over from an earlier capture
    earlier: TrafficLog,
    exchanges: Vec<Exchange>,
    /// Request id to the index of its current hop
    current: HashMap<String, usize>,
    /// Ids whose completion arrived before anything else about them
    closed_early: HashSet<String>,
    pending: usize,
    last_activity: Instant,
}

impl NetworkRecorder {
    pub fn new() -> Self {
        Self {
            earlier: TrafficLog::new(),
            exchanges: Vec::new(),
            current: HashMap::new(),
            closed_early: HashSet::new(),
            pending: 0,
            last_activity: Instant::now(),
        }
    }

    /// Keeps `earlier` ahead of everything recorded in this session
    pub fn carry_over(&mut self, earlier: TrafficLog) {
        self.earlier = earlier;
    }

    /// A request is about to be sent
    ///
    /// `redirect` is the response that caused this request, in which case the
    /// id's previous hop is closed with it.
    pub fn request_sent(
        &mut self,
        id: &str,
        url: &str,
        method: &str,
        redirect: Option<&ObservedResponse>,
    ) {
        self.touch();

        if let Some(response) = redirect {
            let hop = match self.current.get(id) {
                Some(&hop) => hop,
                None => self.push(&response.url, method),
            };
            self.exchanges[hop].respond(response);
            self.close(hop);
            self.open(id, url, method);
            return;
        }

        match self.current.get(id) {
            // Response or completion was observed first
            Some(&hop) => {
                let exchange = &mut self.exchanges[hop];
                exchange.url = url.to_string();
                exchange.method = method.to_string();
            }
            None => {
                self.open(id, url, method);
            }
        }
    }

    pub fn response_received(&mut self, id: &str, response: &ObservedResponse) {
        self.touch();
        let hop = self.hop(id, &response.url, "GET");
        self.exchanges[hop].respond(response);
    }

    /// The response body has been fully received
    pub fn finished(&mut self, id: &str) {
        self.touch();
        match self.current.get(id) {
            Some(&hop) => self.close(hop),
            None => {
                self.closed_early.insert(id.to_string());
            }
        }
    }

    /// The request failed or was aborted; a response already seen is kept
    pub fn failed(&mut self, id: &str) {
        self.finished(id);
    }

    /// Requests sent but not yet finished
    pub fn in_flight(&self) -> usize {
        self.pending
    }

    /// Whether nothing has been in flight for at least `window`
    pub fn is_idle(&self, window: Duration) -> bool {
        self.pending == 0 && self.last_activity.elapsed() >= window
    }

    /// Everything recorded so far, unfinished requests included
    ///
    /// Only http(s) exchanges are kept; `data:` and `blob:` loads never
    /// touch the network.
    pub fn snapshot(&self) -> TrafficLog {
        self.earlier
            .entries()
            .iter()
            .cloned()
            .chain(
                self.exchanges
                    .iter()
                    .filter(|e| e.url.starts_with("http://") || e.url.starts_with("https://"))
                    .map(Exchange::to_entry),
            )
            .collect()
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Current hop of `id`, opening one if the request was never seen
    fn hop(&mut self, id: &str, url: &str, method: &str) -> usize {
        match self.current.get(id) {
            Some(&hop) => hop,
            None => self.open(id, url, method),
        }
    }

    /// Starts a new hop and makes it the current one for `id`
    fn open(&mut self, id: &str, url: &str, method: &str) -> usize {
        let hop = self.push(url, method);
        self.current.insert(id.to_string(), hop);
        if self.closed_early.remove(id) {
            self.close(hop);
        }
        hop
    }

    fn push(&mut self, url: &str, method: &str) -> usize {
        self.exchanges.push(Exchange::new(url, method));
        self.pending += 1;
        self.exchanges.len() - 1
    }

    fn close(&mut self, hop: usize) {
        let exchange = &mut self.exchanges[hop];
        if !exchange.done {
            exchange.done = true;
            exchange.duration_ms = exchange.clock.elapsed().as_secs_f64() * 1000.0;
            self.pending -= 1;
        }
    }
}
