//! Arena memory: shared page pools, the row arena, and the payload arena.

mod data;
mod pool;
mod rows;

pub use data::DataStore;
pub use pool::PagePool;
pub use rows::RowDb;
