// ============================================================================
// Order Domain - Business logic for olive-oil shop orders
// ============================================================================
//
// - Value objects (statuses, lines, order numbers, callers)
// - Events and commands
// - Errors (OrderError)
// - Aggregate (Order with handle_command / apply_event)
// - Checkout pricing, stock reservation and order numbering
// - Command handler (write side) and queries (read side)
// - Tracking projection
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod numbering;
pub mod placement;
pub mod tracking;
pub mod command_handler;
pub mod queries;

#[cfg(test)]
pub(crate) mod fixtures;

pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use numbering::OrderNumberAllocator;
pub use placement::StockReservation;
pub use tracking::{TrackedLine, TrackingEntry, TrackingView};
pub use command_handler::OrderCommandHandler;
pub use queries::{OrderPage, OrderQueries, OrderQuery};
