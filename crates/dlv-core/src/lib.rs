pub mod collate;
pub mod derived;
pub mod error;
pub mod ids;
pub mod model;
pub mod project;
pub mod timestamp;
pub mod types;
pub mod version;

pub use collate::*;
pub use derived::*;
pub use error::*;
pub use ids::*;
pub use model::*;
pub use project::*;
pub use timestamp::*;
pub use types::*;
pub use version::*;
