pub mod bones;
pub mod color_merger;
pub mod derivative;
pub mod fragment_output;
pub mod input;
pub mod light_information;
pub mod math;
pub mod noise;
pub mod remap;
pub mod texture;
pub mod transform;
pub mod vector_splitter;
pub mod vertex_output;


pub use self::bones::*;
pub use self::color_merger::*;
pub use self::derivative::*;
pub use self::fragment_output::*;
pub use self::input::*;
pub use self::light_information::*;
pub use self::math::*;
pub use self::noise::*;
pub use self::remap::*;
pub use self::texture::*;
pub use self::transform::*;
pub use self::vector_splitter::*;
pub use self::vertex_output::*;

use crate::BlockRegistry;

pub fn add_default_blocks(registry: &mut BlockRegistry) {
    registry.register::<InputBlock>();
    registry.register::<VertexOutputBlock>();
    registry.register::<FragmentOutputBlock>();
    registry.register::<TransformBlock>();
    registry.register::<MathBlock>();
    registry.register::<ColorMergerBlock>();
    registry.register::<VectorSplitterBlock>();
    registry.register::<RemapBlock>();
    registry.register::<SimplexPerlin3DBlock>();
    registry.register::<DerivativeBlock>();
    registry.register::<TextureBlock>();
    registry.register::<LightInformationBlock>();
    registry.register::<BonesBlock>();
}

pub fn default_block_registry() -> BlockRegistry {
    let mut registry = BlockRegistry::default();
    add_default_blocks(&mut registry);
    registry
}
