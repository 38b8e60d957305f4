//! EventSubscriber - the bus-facing handler contract

use contracts::{ContractError, SafetyEvent};

/// Handler registered with the bus
///
/// Called synchronously, once per published event, in publish order.
/// I/O-bound handlers should not do their work inline: wrap the sink in a
/// [`SinkHandle`](crate::SinkHandle) so delivery is just an enqueue.
pub trait EventSubscriber: Send + Sync {
    /// Subscriber name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Handle one event
    ///
    /// # Errors
    /// Any error is logged and counted by the bus; it never reaches the
    /// publisher and never stops delivery to other subscribers.
    fn on_event(&self, event: &SafetyEvent) -> Result<(), ContractError>;
}

/// Closure-backed subscriber
pub struct FnSubscriber<F> {
    name: String,
    handler: F,
}

impl<F> FnSubscriber<F>
where
    F: Fn(&SafetyEvent) -> Result<(), ContractError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> EventSubscriber for FnSubscriber<F>
where
    F: Fn(&SafetyEvent) -> Result<(), ContractError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_event(&self, event: &SafetyEvent) -> Result<(), ContractError> {
        (self.handler)(event)
    }
}
