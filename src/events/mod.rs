//! Typed endpoint events and the bus that delivers them.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | [`Event`], [`EventKind`], [`EventFilter`] |
//! | `bus` | [`EventBus`] with its serialized dispatch task |

// ============================================================================
// Submodules
// ============================================================================

/// Publish/subscribe bus.
pub mod bus;

/// Event types and filters.
pub mod event;

// ============================================================================
// Re-exports
// ============================================================================

pub use bus::{EventBus, EventHandler, SubscriptionHandle, WeakEventBus};
pub use event::{Event, EventFilter, EventKind};
