//! Tool handler port
//!
//! A handler is the machine-side implementation of one tool. The engine
//! drives it with validated arguments, a progress channel, and a
//! cancellation token it is expected to honour at its next safe point.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One progress sample reported by a running handler.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Fraction complete in `[0.0, 1.0]`.
    pub value: f64,
    /// Optional human-readable status line.
    pub message: Option<String>,
}

impl Progress {
    pub fn at(value: f64) -> Self {
        Self {
            value,
            message: None,
        }
    }

    pub fn with_message(value: f64, message: impl Into<String>) -> Self {
        Self {
            value,
            message: Some(message.into()),
        }
    }
}

/// Channel a handler pushes progress samples into.
pub type ProgressSender = mpsc::UnboundedSender<Progress>;

/// Port for executing one tool against the physical machine.
#[async_trait]
pub trait ToolHandlerPort: Send + Sync {
    /// Run the tool to completion.
    ///
    /// `arguments` have already passed safety evaluation and may have been
    /// clamped. Handlers should poll `cancel` at safe points and return
    /// early when it fires; the engine also stops polling a cancelled
    /// handler, so cleanup must not rely on running after that point.
    async fn execute(
        &self,
        arguments: Value,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Result<Value, String>;
}

/// Registry of handlers keyed by tool name.
///
/// Populated once at wiring time; the execution engine looks handlers up
/// at admission.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandlerPort>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandlerPort>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn with(mut self, name: impl Into<String>, handler: Arc<dyn ToolHandlerPort>) -> Self {
        self.register(name, handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandlerPort>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("tools", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
