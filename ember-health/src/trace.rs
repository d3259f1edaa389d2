//! Minimal tracing capability used around health aggregation
//!
//! The core only needs to start a span, attach attributes and end it. Which
//! backend receives the spans is decided by whoever implements [Tracer].

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Instant;

use log::debug;

use crate::probe::Scalar;

/// Attributes attached to a span
pub type Attributes = BTreeMap<String, Scalar>;

/// A started span. Ending twice has no further effect.
pub trait SpanHandle: Send {
    fn set_attributes(&mut self, attributes: Attributes);
    fn end(&mut self);
}

/// Something that can start spans
pub trait Tracer: Debug + Send + Sync {
    fn start_span(&self, name: &str) -> Box<dyn SpanHandle>;
}

/// Build [Attributes] from key/value pairs
pub fn attributes<I, K, V>(pairs: I) -> Attributes
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Scalar>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

struct NoopSpan;

impl SpanHandle for NoopSpan {
    fn set_attributes(&mut self, _attributes: Attributes) {}
    fn end(&mut self) {}
}

impl Tracer for NoopTracer {
    fn start_span(&self, _name: &str) -> Box<dyn SpanHandle> {
        Box::new(NoopSpan)
    }
}

/// Emits spans to the log at debug level
#[derive(Debug, Clone)]
pub struct LogTracer {
    service: String,
}

impl LogTracer {
    pub fn new<S: Into<String>>(service: S) -> Self {
        Self {
            service: service.into(),
        }
    }
}

struct LogSpan {
    service: String,
    name: String,
    started: Instant,
    attributes: Attributes,
    ended: bool,
}

impl SpanHandle for LogSpan {
    fn set_attributes(&mut self, attributes: Attributes) {
        self.attributes.extend(attributes);
    }

    fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;

        let attributes = self
            .attributes
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        debug!(
            "span end {}/{} took {}us [{}]",
            self.service,
            self.name,
            self.started.elapsed().as_micros(),
            attributes
        );
    }
}

impl Drop for LogSpan {
    fn drop(&mut self) {
        self.end();
    }
}

impl Tracer for LogTracer {
    fn start_span(&self, name: &str) -> Box<dyn SpanHandle> {
        debug!("span start {}/{}", self.service, name);
        Box::new(LogSpan {
            service: self.service.clone(),
            name: name.to_owned(),
            started: Instant::now(),
            attributes: Attributes::new(),
            ended: false,
        })
    }
}

/// Tracer that keeps ended spans in memory so tests can look at them
#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedSpan {
        pub name: String,
        pub attributes: Attributes,
    }

    #[derive(Debug, Clone, Default)]
    pub struct RecordingTracer {
        pub spans: Arc<Mutex<Vec<RecordedSpan>>>,
    }

    struct RecordingSpan {
        span: Option<RecordedSpan>,
        sink: Arc<Mutex<Vec<RecordedSpan>>>,
    }

    impl SpanHandle for RecordingSpan {
        fn set_attributes(&mut self, attributes: Attributes) {
            if let Some(span) = self.span.as_mut() {
                span.attributes.extend(attributes);
            }
        }

        fn end(&mut self) {
            if let Some(span) = self.span.take() {
                self.sink.lock().unwrap().push(span);
            }
        }
    }

    impl Drop for RecordingSpan {
        fn drop(&mut self) {
            self.end();
        }
    }

    impl Tracer for RecordingTracer {
        fn start_span(&self, name: &str) -> Box<dyn SpanHandle> {
            Box::new(RecordingSpan {
                span: Some(RecordedSpan {
                    name: name.to_owned(),
                    attributes: Attributes::new(),
                }),
                sink: self.spans.clone(),
            })
        }
    }
}
