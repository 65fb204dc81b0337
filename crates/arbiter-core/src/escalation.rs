use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One deliberation job. Immutable once enqueued.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct EscalationRequest {
    pub prompt: String,
    /// Base64 screenshot for vision-capable deliberation.
    #[serde(default)]
    pub image_b64: Option<String>,
    /// Context markers active when the request was raised.
    #[serde(default)]
    pub context_markers: String,
}

/// Unbounded FIFO of escalations, drained by the deliberative consumer.
///
/// No cap is imposed here; producers are expected not to flood it.
#[derive(Debug, Default)]
pub struct EscalationQueue {
    pending: Mutex<VecDeque<EscalationRequest>>,
}

impl EscalationQueue {
    pub fn enqueue(&self, request: EscalationRequest) {
        self.pending.lock().push_back(request);
    }

    pub fn dequeue(&self) -> Option<EscalationRequest> {
        self.pending.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(prompt: &str) -> EscalationRequest {
        EscalationRequest {
            prompt: prompt.to_string(),
            image_b64: None,
            context_markers: String::new(),
        }
    }

    #[test]
    fn dequeue_is_fifo() {
        let q = EscalationQueue::default();
        q.enqueue(req("first"));
        q.enqueue(req("second"));
        q.enqueue(req("third"));
        assert_eq!(q.len(), 3);
        assert_eq!(q.dequeue().map(|r| r.prompt).as_deref(), Some("first"));
        assert_eq!(q.dequeue().map(|r| r.prompt).as_deref(), Some("second"));
        assert_eq!(q.dequeue().map(|r| r.prompt).as_deref(), Some("third"));
        assert!(q.dequeue().is_none());
        assert!(q.is_empty());
    }
}
