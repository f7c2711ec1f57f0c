pub mod config;
pub mod indexer;
pub mod projections;
pub mod scenario;
pub mod util;

pub use config::*;
pub use indexer::*;
pub use projections::*;
pub use util::*;
