//! Topic-prefix dispatch.
//!
//! After the generic message event fires, the topic line is matched against
//! registered prefixes and the raw payload handed to each matching decoder.
//! Unmatched topics are ignored at this layer.

use parking_lot::RwLock;

/// Decoder callback: receives the full topic line and the raw payload.
pub(crate) type PrefixHandler = Box<dyn Fn(&str, &str) + Send + Sync>;

struct Route {
    prefix: String,
    handler: PrefixHandler,
}

/// Registry of prefix-keyed payload decoders.
pub(crate) struct TopicRouter {
    routes: RwLock<Vec<Route>>,
}

impl TopicRouter {
    pub(crate) fn new() -> Self {
        Self {
            routes: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, prefix: impl Into<String>, handler: PrefixHandler) {
        self.routes.write().push(Route {
            prefix: prefix.into(),
            handler,
        });
    }

    /// Invoke every handler whose prefix matches the topic.
    pub(crate) fn dispatch(&self, topic: &str, payload: &str) {
        let routes = self.routes.read();
        for route in routes.iter().filter(|r| topic.starts_with(&r.prefix)) {
            (route.handler)(topic, payload);
        }
    }
}
