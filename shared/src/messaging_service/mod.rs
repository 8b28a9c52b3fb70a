// ============================================================================
// Messaging Service
// ============================================================================
//
// Context and HTTP surface for the message API. Handlers translate requests
// into coordinator calls; all ordering and failure policy lives in `core`.
//
// ============================================================================

pub mod core;
pub mod handlers;

pub use self::core::{Delivery, DualWriteCoordinator, OperationOutcome};

/// Messaging Service context
#[derive(Clone)]
pub struct MessagingServiceContext {
    pub coordinator: DualWriteCoordinator,
}

impl MessagingServiceContext {
    pub fn new(coordinator: DualWriteCoordinator) -> Self {
        Self { coordinator }
    }
}
