pub mod batch_function;
mod cache;
mod error;
pub mod hackernews;
mod loader;
mod loader_op;
mod loader_worker;
mod options;
#[cfg(feature = "stats")]
mod worker_stats;

pub use batch_function::{align, BatchFunction};
pub use error::LoadError;
pub use loader::Loader;
pub use options::LoaderOptions;
