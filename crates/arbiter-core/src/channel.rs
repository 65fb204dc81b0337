use tokio::sync::mpsc::UnboundedSender;

/// Outbound delivery of one serialized intent to the embodied actor.
///
/// Fire-and-forget: delivery failures stay inside the implementation and never feed back into
/// arbitration state.
pub trait ActionChannel: Send + Sync {
    fn send(&self, action: &str);
}

impl ActionChannel for UnboundedSender<String> {
    fn send(&self, action: &str) {
        if UnboundedSender::send(self, action.to_owned()).is_err() {
            tracing::debug!("action channel closed; dropping action");
        }
    }
}
