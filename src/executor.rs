//! Action executor - uniform dispatch and failure containment

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{instrument, warn};

use crate::error::HiveError;
use crate::registry::ActionRegistry;
use crate::types::{Action, ActionType};

/// One domain handler per registered action type.
///
/// Side effects (activity records, notifications) are the handler's
/// responsibility; the executor only dispatches and contains failures.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, action: &Action) -> anyhow::Result<Value>;
}

/// Adapter so a closure can be registered as a handler
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(Action) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn handle(&self, action: &Action) -> anyhow::Result<Value> {
        (self.0)(action.clone()).await
    }
}

/// Normalized outcome of dispatching one action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl ExecutionReport {
    pub fn success(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Dispatch table binding handler names to implementations.
///
/// Known action types bind through [`HandlerRegistry::bind`], which takes
/// the handler name from the action registry row; `register_dynamic` keeps
/// the runtime path open for plugin-style capabilities that only exist as
/// [`ActionType::Other`] names.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the handler for a known action type
    pub fn bind(
        mut self,
        action_type: &ActionType,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<Self, HiveError> {
        let entry = ActionRegistry::entry(action_type).ok_or_else(|| {
            HiveError::ConfigError(format!(
                "cannot bind handler for unregistered action type: {action_type}"
            ))
        })?;
        self.handlers.insert(entry.handler_name.to_string(), handler);
        Ok(self)
    }

    /// Register a dynamic handler under a bare name
    pub fn register_dynamic(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn ActionHandler>,
    ) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Dispatches approved actions to their handlers with uniform containment
pub struct ActionExecutor {
    handlers: HandlerRegistry,
}

impl ActionExecutor {
    pub fn new(handlers: HandlerRegistry) -> Self {
        Self { handlers }
    }

    /// Execute one action.
    ///
    /// Never returns an error and never panics outward: configuration
    /// problems and handler failures (including panics) all come back as a
    /// structured failure report.
    #[instrument(skip(self, action), fields(action_id = %action.id, action_type = %action.action_type))]
    pub async fn execute(&self, action: &Action) -> ExecutionReport {
        let handler_name = match ActionRegistry::entry(&action.action_type) {
            Some(entry) => entry.handler_name.to_string(),
            // runtime fallback: dynamic handlers are keyed by the raw type name
            None if self.handlers.get(action.action_type.as_str()).is_some() => {
                action.action_type.as_str().to_string()
            }
            None => {
                return ExecutionReport::failure(format!(
                    "Unknown action type: {}",
                    action.action_type
                ));
            }
        };

        let Some(handler) = self.handlers.get(&handler_name) else {
            return ExecutionReport::failure(format!("No handler found: {handler_name}"));
        };

        let owned = action.clone();
        let call = tokio::spawn(async move { handler.handle(&owned).await });

        match call.await {
            Ok(Ok(result)) => ExecutionReport::success(result),
            Ok(Err(e)) => {
                warn!(handler = %handler_name, error = %e, "Handler returned an error");
                ExecutionReport::failure(e.to_string())
            }
            Err(join_error) => {
                warn!(handler = %handler_name, error = %join_error, "Handler did not settle cleanly");
                let reason = if join_error.is_panic() {
                    "panicked"
                } else {
                    "was cancelled"
                };
                ExecutionReport::failure(format!("Handler {handler_name} {reason}"))
            }
        }
    }
}
