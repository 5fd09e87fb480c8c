pub mod manager;
pub mod migrate;
pub mod model;

pub use manager::{DatabaseError, DatabaseManager};
pub use model::{Column, ColumnType, Model, ModelDescriptor};
