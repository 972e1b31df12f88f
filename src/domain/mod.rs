// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// `order` holds the order aggregate and the services around it. `catalog`
// is the narrow view of the product catalog those services depend on.
//
// ============================================================================

pub mod catalog;
pub mod order;
