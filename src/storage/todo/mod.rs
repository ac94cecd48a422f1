//! Todo item stores.
//!
//! Both implementations honour the same contract: labels behave as an
//! ordered set, enumeration follows insertion order, and absence is reported
//! through return values rather than errors.

mod memory;
mod sqlite;

pub use memory::InMemoryTodoStore;
pub use sqlite::SqliteTodoStore;
