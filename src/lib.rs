//! A generic B+-tree with two interchangeable backends — in-memory and
//! record-store-backed — sharing one search/insert/delete engine.
//!
//! ```
//! use bptree::tree::{memory::MemoryBackend, Tree};
//!
//! let mut tree: Tree<i32, &str, MemoryBackend<i32, &str>> =
//!     Tree::new(4, MemoryBackend::new()).unwrap();
//! tree.insert(1, "a").unwrap();
//! tree.insert(2, "b").unwrap();
//! assert_eq!(tree.search(&1).unwrap(), Some("a"));
//! ```
//!
//! See `tree::Backend` for the capability both backends implement, and
//! `node` for the shared leaf/internal data model both backends store.

pub mod errors;
pub mod node;
pub mod store;
pub mod tree;

pub use errors::{Error, Result};
pub use tree::Tree;

/// Initializes `env_logger` from the `RUST_LOG` environment variable before
/// doing any real work. A no-op unless built with the `init_env_logger`
/// feature.
#[cfg(feature = "init_env_logger")]
pub fn init_env_logger() {
    let _ = env_logger::try_init();
}
