//! Ordered middleware execution.

use std::sync::Arc;

use sw_core::FetchEvent;

use crate::context::MiddlewareContext;

/// One step of the fetch pipeline.
///
/// `handle` runs synchronously. Asynchronous work is answered through
/// [`FetchEvent::respond_with`] or registered with
/// [`FetchEvent::wait_until`].
pub trait Middleware: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn handle(&self, event: &FetchEvent, ctx: &mut MiddlewareContext);
}

/// Middleware run in declaration order against a shared context.
#[derive(Clone, Default)]
pub struct Pipeline {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware.
    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.push(Arc::new(middleware));
        self
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Names of the middleware, in run order.
    pub fn names(&self) -> Vec<&str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    /// Run every middleware once, in order. Does not wait for the work the
    /// middleware register.
    pub fn run(&self, event: &FetchEvent, ctx: &mut MiddlewareContext) {
        for middleware in &self.middleware {
            tracing::trace!(event = %event.id(), middleware = middleware.name(), "running middleware");
            middleware.handle(event, ctx);
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use sw_core::Request;

    #[derive(Clone, Default)]
    struct Trace(Arc<Mutex<Vec<String>>>);

    struct Step {
        label: &'static str,
        trace: Trace,
    }

    impl Middleware for Step {
        fn name(&self) -> &str {
            self.label
        }

        fn handle(&self, _event: &FetchEvent, ctx: &mut MiddlewareContext) {
            let seen = ctx.cache_name.clone().unwrap_or_default();
            self.trace.0.lock().unwrap().push(format!("{}:{}", self.label, seen));
            ctx.cache_name = Some(self.label.to_string());
        }
    }

    #[test]
    fn test_runs_in_order_on_shared_context() {
        let trace = Trace::default();
        let pipeline = Pipeline::new()
            .with(Step { label: "first", trace: trace.clone() })
            .with(Step { label: "second", trace: trace.clone() });

        let event = FetchEvent::new(Request::get("https://cdn.example.com/a.js").unwrap());
        let mut ctx = MiddlewareContext::new(None);
        pipeline.run(&event, &mut ctx);

        assert_eq!(*trace.0.lock().unwrap(), vec!["first:", "second:first"]);
        assert_eq!(ctx.cache_name.as_deref(), Some("second"));
        assert_eq!(pipeline.names(), vec!["first", "second"]);
    }

    #[test]
    fn test_empty_pipeline_leaves_event_unanswered() {
        let event = FetchEvent::new(Request::get("https://cdn.example.com/a.js").unwrap());
        let mut ctx = MiddlewareContext::new(None);

        Pipeline::new().run(&event, &mut ctx);

        assert!(!event.has_response());
        assert!(event.keep_alive().is_idle());
    }
}
