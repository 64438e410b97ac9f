pub type IndexType = u16;

mod block;
mod build_state;
mod connection_point;
mod core;
mod defines;
mod effect;
mod graph;
mod material;
mod serialization;
mod shared_data;

pub mod blocks;

pub use crate::block::*;
pub use crate::blocks::*;
pub use crate::build_state::*;
pub use crate::connection_point::*;
pub use crate::core::*;
pub use crate::defines::*;
pub use crate::effect::*;
pub use crate::graph::*;
pub use crate::material::*;
pub use crate::serialization::*;
pub use crate::shared_data::*;

pub use anyhow;
pub use glam;
pub use indexmap;
pub use serde;
pub use serde_derive;
pub use serde_json;
pub use uuid;
