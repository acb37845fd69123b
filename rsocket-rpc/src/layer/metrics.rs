use std::sync::Arc;
use std::time::Instant;

use rsocket_rpc_core::RpcError;

use super::Lifecycle;
use crate::context::InteractionContext;
use crate::metrics::{
    CANCELLATIONS, DURATION, ERRORS, INVOCATIONS, ITEMS, MeterId, MeterRegistry,
};

/// Records the server meters of one interaction.
///
/// Duration and item count are reported exactly once, on the terminal signal
/// or on cancellation.
pub(crate) struct MetricsObserver {
    registry: Arc<dyn MeterRegistry>,
    context: InteractionContext,
    started: Option<Instant>,
    items: u64,
    finished: bool,
}

impl MetricsObserver {
    pub(crate) fn new(registry: Arc<dyn MeterRegistry>, context: InteractionContext) -> Self {
        Self {
            registry,
            context,
            started: None,
            items: 0,
            finished: false,
        }
    }

    fn id(&self, name: &'static str) -> MeterId {
        MeterId::server(name, self.context.service(), self.context.method())
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if let Some(started) = self.started {
            self.registry.record(&self.id(DURATION), started.elapsed());
        }
        if self.items > 0 {
            self.registry.increment(&self.id(ITEMS), self.items);
        }
    }
}

impl Lifecycle for MetricsObserver {
    fn on_subscribe(&mut self) {
        self.started = Some(Instant::now());
        self.registry.increment(&self.id(INVOCATIONS), 1);
    }

    fn on_next(&mut self) {
        self.items += 1;
    }

    fn on_error(&mut self, _error: &RpcError) {
        if !self.finished {
            self.registry.increment(&self.id(ERRORS), 1);
        }
        self.finish();
    }

    fn on_complete(&mut self) {
        self.finish();
    }
}

impl Drop for MetricsObserver {
    fn drop(&mut self) {
        if self.started.is_some() && !self.finished {
            self.registry.increment(&self.id(CANCELLATIONS), 1);
            self.finish();
        }
    }
}
