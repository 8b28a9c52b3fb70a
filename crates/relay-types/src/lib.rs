// ============================================================================
// Relay Types - Core Data Types
// ============================================================================
//
// Data structures shared by the store, the publisher and the HTTP surface.
// No dependencies on databases, brokers or business logic.
//
// Contents:
// - Message identifiers and their generator
// - The persisted message record and request validation
// - Broker event bodies
//
// ============================================================================

pub mod event;
pub mod id;
pub mod message;

// Re-exports for convenience
pub use event::*;
pub use id::*;
pub use message::*;
