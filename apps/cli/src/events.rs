//! Diagnostic events routed into `tracing`

use ferrum_tree::{EventHandler, EventResponse, RendererEvent, RendererEventConfig};
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct TracingEventHandler {
    config: RendererEventConfig,
    warnings: AtomicUsize,
}

impl TracingEventHandler {
    pub fn new(config: RendererEventConfig) -> Self {
        Self {
            config,
            warnings: AtomicUsize::new(0),
        }
    }

    /// Warnings logged since the last call
    pub fn take_warning_count(&self) -> usize {
        self.warnings.swap(0, Ordering::Relaxed)
    }
}

impl EventHandler for TracingEventHandler {
    fn handle(&self, event: RendererEvent) -> ferrum_tree::Result<()> {
        match self.config.response_for(event.kind) {
            EventResponse::Ignore => {
                tracing::debug!(event = %event.kind, "{}", event.message);
                Ok(())
            }
            EventResponse::LogWarning => {
                self.warnings.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(event = %event.kind, "{}", event.message);
                Ok(())
            }
            EventResponse::Throw => Err(event.escalate()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrum_tree::{Error, RendererEventType};

    #[test]
    fn counts_warnings_and_escalates_throws() {
        let handler = TracingEventHandler::new(RendererEventConfig::default());

        handler
            .event(RendererEventType::MissingTypeLink, "missing".into())
            .unwrap();
        handler
            .event(RendererEventType::IgnorableMappingId, "ignored".into())
            .unwrap();
        let err = handler
            .event(RendererEventType::LinkReferencesItself, "self".into())
            .unwrap_err();

        assert!(matches!(err, Error::EscalatedEvent { .. }));
        assert_eq!(handler.take_warning_count(), 1);
        assert_eq!(handler.take_warning_count(), 0);
    }
}
