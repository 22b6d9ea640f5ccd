//! Database layer - destination abstraction, sqlx-backed pool, and schema
//! inference

pub mod destination;
pub mod pool;
pub mod schema;

pub use destination::{Destination, DestinationTx, WriteMode};
pub use pool::SqlDestination;
