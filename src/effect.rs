use glam::{Mat4, Vec2, Vec3, Vec4};
use serde_derive::{Deserialize, Serialize};

use crate::NodeMaterialDefines;

pub mod vertex_kind {
    pub const POSITION: &str = "position";
    pub const NORMAL: &str = "normal";
    pub const TANGENT: &str = "tangent";
    pub const UV: &str = "uv";
    pub const UV2: &str = "uv2";
    pub const COLOR: &str = "color";
    pub const MATRICES_INDICES: &str = "matricesIndices";
    pub const MATRICES_WEIGHTS: &str = "matricesWeights";
}

/// Receives uniform values for a compiled program at draw time.
pub trait EffectBinder {
    fn set_float(&mut self, name: &str, value: f32);
    fn set_int(&mut self, name: &str, value: i32);
    fn set_vector2(&mut self, name: &str, value: Vec2);
    fn set_vector3(&mut self, name: &str, value: Vec3);
    fn set_vector4(&mut self, name: &str, value: Vec4);
    fn set_color3(&mut self, name: &str, value: Vec3);
    fn set_color4(&mut self, name: &str, value: Vec4);
    fn set_matrix(&mut self, name: &str, value: Mat4);
    fn set_matrices(&mut self, name: &str, value: &[Mat4]);
    fn set_texture(&mut self, name: &str, texture: &TextureReference);
}

pub trait MeshProvider {
    fn is_vertices_data_present(&self, kind: &str) -> bool;

    fn world_matrix(&self) -> Mat4 {
        Mat4::IDENTITY
    }

    fn num_bone_influencers(&self) -> u32 {
        0
    }

    /// `None` when the mesh has no skeleton skinned on the GPU.
    fn bone_matrices(&self) -> Option<Vec<Mat4>> {
        None
    }
}

pub trait SceneProvider {
    fn view_matrix(&self) -> Mat4;

    fn projection_matrix(&self) -> Mat4;

    fn transform_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    fn camera_position(&self) -> Vec3;

    fn fog_color(&self) -> Vec3 {
        Vec3::ZERO
    }

    fn animation_ratio(&self) -> f32 {
        1.0
    }

    fn lights(&self) -> &[LightInfo] {
        &[]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightKind {
    Point,
    Directional,
    Spot,
    Hemispheric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightInfo {
    pub name: String,
    pub kind: LightKind,
    pub position: Vec3,
    pub direction: Vec3,
    pub diffuse: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureReference {
    pub url: String,
    #[serde(default = "default_level")]
    pub level: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Mat4>,
    #[serde(default = "default_ready")]
    pub is_ready: bool,
}

fn default_level() -> f32 {
    1.0
}

fn default_ready() -> bool {
    true
}

impl TextureReference {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            level: 1.0,
            transform: None,
            is_ready: true,
        }
    }

    pub fn has_transform(&self) -> bool {
        self.transform.map_or(false, |x| x != Mat4::IDENTITY)
    }
}

/// Defines dropped rank by rank when the GPU refuses to compile the full program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectFallbacks {
    pub defines: Vec<(u32, String)>,
    pub cpu_skinning: Option<(u32, u32)>,
    current_rank: u32,
}

impl EffectFallbacks {
    pub fn add_fallback(&mut self, rank: u32, define: &str) {
        self.defines.push((rank, define.to_owned()));
    }

    pub fn add_cpu_skinning_fallback(&mut self, rank: u32, bone_influencers: u32) {
        self.cpu_skinning = Some((rank, bone_influencers));
    }

    pub fn is_empty(&self) -> bool {
        self.defines.is_empty() && self.cpu_skinning.is_none()
    }

    pub fn has_more_fallbacks(&self) -> bool {
        self.defines.iter().any(|(rank, _)| *rank >= self.current_rank)
            || self.cpu_skinning.map_or(false, |(rank, _)| rank >= self.current_rank)
    }

    /// Drops the defines of the current rank and moves to the next one.
    pub fn reduce(&mut self, defines: &NodeMaterialDefines) -> NodeMaterialDefines {
        let mut reduced = defines.clone();
        for (rank, define) in self.defines.iter() {
            if *rank <= self.current_rank {
                reduced = reduced.without(define);
            }
        }

        if let Some((rank, _)) = self.cpu_skinning {
            if rank <= self.current_rank {
                reduced.set_int("NUM_BONE_INFLUENCERS", 0);
            }
        }

        self.current_rank += 1;
        reduced
    }
}

/// Everything the GPU effect compiler needs to create the program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectCreationOptions {
    pub vertex_source: String,
    pub fragment_source: String,
    pub attributes: Vec<String>,
    pub uniforms: Vec<String>,
    pub samplers: Vec<String>,
    pub defines: String,
    pub fallbacks: EffectFallbacks,
    pub max_simultaneous_lights: u32,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fallbacks_reduce_by_rank() {
        let mut defines = NodeMaterialDefines::new();
        defines.set_bool("FOG", true);
        defines.set_bool("SPECULAR", true);
        defines.set_int("NUM_BONE_INFLUENCERS", 4);

        let mut fallbacks = EffectFallbacks::default();
        fallbacks.add_fallback(0, "FOG");
        fallbacks.add_fallback(1, "SPECULAR");
        fallbacks.add_cpu_skinning_fallback(1, 4);
        assert!(fallbacks.has_more_fallbacks());

        let first = fallbacks.reduce(&defines);
        assert!(!first.get_bool("FOG"));
        assert!(first.get_bool("SPECULAR"));
        assert_eq!(first.get_int("NUM_BONE_INFLUENCERS"), Some(4));

        let second = fallbacks.reduce(&defines);
        assert!(!second.get_bool("SPECULAR"));
        assert_eq!(second.get_int("NUM_BONE_INFLUENCERS"), Some(0));
        assert!(!fallbacks.has_more_fallbacks());
    }
}
