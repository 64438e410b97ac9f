mod glsl;
mod index;
mod types;

pub use glsl::*;
pub use index::*;
pub use types::*;
