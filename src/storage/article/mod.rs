//! Article stores.
//!
//! Image paths behave as an ordered set. Expiration is enforced only by
//! [`ExpiringCollection::purge_expired`](crate::storage::ExpiringCollection::purge_expired).

mod memory;
mod sqlite;

pub use memory::InMemoryArticleStore;
pub use sqlite::SqliteArticleStore;

use crate::{Error, Result};

fn validate_image_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::Validation("image path must not be empty".to_string()));
    }
    Ok(())
}
