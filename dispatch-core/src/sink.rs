/// Seam through which monitors surface notifications and UI effects. The
/// console implements this with its broadcast hub; tests capture emissions.
pub trait OpsSink: Send + Sync + 'static {
    fn emit_json(&self, event: &str, payload: serde_json::Value);
}

pub struct NoopSink;

impl OpsSink for NoopSink {
    fn emit_json(&self, _event: &str, _payload: serde_json::Value) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use super::OpsSink;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub struct CaptureSink {
        pub seen: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    }

    impl CaptureSink {
        pub fn events_named(&self, name: &str) -> usize {
            self.seen
                .lock()
                .expect("lock")
                .iter()
                .filter(|(event, _)| event == name)
                .count()
        }
    }

    impl OpsSink for CaptureSink {
        fn emit_json(&self, event: &str, payload: serde_json::Value) {
            self.seen
                .lock()
                .expect("lock")
                .push((event.to_string(), payload));
        }
    }
}
