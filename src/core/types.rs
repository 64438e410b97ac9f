use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionPointType {
    Float,
    Int,
    Vector2,
    Vector3,
    Vector4,
    Color3,
    Color4,
    Matrix,
    Matrix3x3,
    Matrix2x2,
    Texture,
    /// Resolved from the upstream connection, or from a linked sibling input.
    AutoDetect,
    /// Resolved from a designated sibling input of the same block.
    BasedOnInput,
}

impl ConnectionPointType {
    pub fn is_resolved(self) -> bool {
        !matches!(
            self,
            ConnectionPointType::AutoDetect | ConnectionPointType::BasedOnInput
        )
    }

    /// Vector and color types of the same width are interchangeable.
    pub fn is_equivalent(self, other: ConnectionPointType) -> bool {
        use ConnectionPointType::*;
        self == other
            || matches!(
                (self, other),
                (Vector3, Color3) | (Color3, Vector3) | (Vector4, Color4) | (Color4, Vector4)
            )
    }

    pub fn gl_type(self) -> Option<&'static str> {
        use ConnectionPointType::*;
        Some(match self {
            Float => "float",
            Int => "int",
            Vector2 => "vec2",
            Vector3 | Color3 => "vec3",
            Vector4 | Color4 => "vec4",
            Matrix => "mat4",
            Matrix3x3 => "mat3",
            Matrix2x2 => "mat2",
            Texture => "sampler2D",
            AutoDetect | BasedOnInput => return None,
        })
    }
}

/// Stage mask of a block or a connection point.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockTarget {
    Vertex,
    Fragment,
    #[default]
    VertexAndFragment,
    Neutral,
}

impl BlockTarget {
    pub const fn bits(self) -> u8 {
        match self {
            BlockTarget::Vertex => 1,
            BlockTarget::Fragment => 2,
            BlockTarget::VertexAndFragment => 3,
            BlockTarget::Neutral => 4,
        }
    }

    pub const fn intersects(self, other: BlockTarget) -> bool {
        self.bits() & other.bits() != 0
    }

    pub fn stage_name(self) -> &'static str {
        match self {
            BlockTarget::Vertex => "vertex",
            BlockTarget::Fragment => "fragment",
            BlockTarget::VertexAndFragment => "vertex and fragment",
            BlockTarget::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionDirection {
    Input,
    Output,
}
