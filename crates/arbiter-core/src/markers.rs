use std::collections::VecDeque;

use parking_lot::Mutex;

pub const DEFAULT_MARKER_LIMIT: usize = 64;

/// Short-term memory markers (e.g. `[MEM:NEAR_DEATH]`) carried into every escalation.
///
/// Rolling window: the oldest marker is evicted once `limit` is exceeded, and a marker equal to
/// the most recent one is not repeated.
#[derive(Debug)]
pub struct ContextMarkers {
    markers: Mutex<VecDeque<String>>,
    limit: usize,
}

impl Default for ContextMarkers {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MARKER_LIMIT)
    }
}

impl ContextMarkers {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            markers: Mutex::new(VecDeque::new()),
            limit: limit.max(1),
        }
    }

    pub fn tag(&self, marker: impl Into<String>) {
        let marker = marker.into();
        let mut markers = self.markers.lock();
        if markers.back() == Some(&marker) {
            return;
        }
        markers.push_back(marker);
        while markers.len() > self.limit {
            markers.pop_front();
        }
    }

    /// All active markers joined by single spaces, oldest first.
    pub fn snapshot(&self) -> String {
        let markers = self.markers.lock();
        let mut out = String::new();
        for (i, m) in markers.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(m);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.markers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.lock().is_empty()
    }
}
