//! Model System - Document models and their persistence
//!
//! - `core_trait`: the Model trait and identifier contracts
//! - `tracked`: change-tracked documents with save and delete
//! - `diff`: snapshot diffing into `$set`/`$unset` updates
//! - `crud_operations`: queries and raw writes on a model's configuration
//! - `cursor`: lazy query results
//! - `indexes`: index creation from declared indexes

pub mod core_trait;
pub mod crud_operations;
pub mod cursor;
pub mod diff;
pub mod indexes;
pub mod tracked;

pub use core_trait::{DocumentId, IdValue, Model, NewId, ID_KEY};
pub use cursor::ModelCursor;
pub use tracked::Tracked;
