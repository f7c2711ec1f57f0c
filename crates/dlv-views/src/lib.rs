pub mod design;
pub mod maps;
pub mod reducers;
pub mod view;

pub use design::*;
pub use view::*;
