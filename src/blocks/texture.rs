use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    vertex_kind, AutoConnection, AutoSource, BlockBuildError, BlockConstructor, BlockList,
    BlockRegistration, BlockTarget, BuildContext, ConnectionPointType, EffectBinder,
    MeshProvider, NodeMaterialBlock, NodeMaterialBuildState, NodeMaterialDefines, SceneProvider,
    TextureReference,
};

const CHANNELS: [(&str, &str); 6] = [
    ("rgba", ""),
    ("rgb", ".rgb"),
    ("r", ".r"),
    ("g", ".g"),
    ("b", ".b"),
    ("a", ".a"),
];

/// Samples a 2D texture in the fragment stage, scaled by the texture level. An optional uv
/// matrix is applied when the texture carries one.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TextureBlock {
    #[serde(default)]
    pub texture: Option<TextureReference>,
    #[serde(skip)]
    sampler_name: String,
    #[serde(skip)]
    level_name: String,
    #[serde(skip)]
    transform_name: String,
    #[serde(skip)]
    define_name: String,
}

impl TextureBlock {
    pub fn new(texture: TextureReference) -> Self {
        Self {
            texture: Some(texture),
            ..Default::default()
        }
    }

    pub fn sampler_name(&self) -> &str {
        &self.sampler_name
    }
}

impl BlockConstructor for TextureBlock {
    fn identity() -> &'static str {
        "TextureBlock"
    }
}

impl NodeMaterialBlock for TextureBlock {
    fn class_name(&self) -> &'static str {
        Self::identity()
    }

    fn register(&self, registration: &mut BlockRegistration) {
        use ConnectionPointType::*;
        registration.input("uv", Vector2).accepts(&[Vector3, Vector4]);
        registration.output("rgba", Color4).with_target(BlockTarget::Fragment);
        registration.output("rgb", Color3).with_target(BlockTarget::Fragment);
        for channel in ["r", "g", "b", "a"] {
            registration.output(channel, Float).with_target(BlockTarget::Fragment);
        }
    }

    fn target(&self) -> BlockTarget {
        BlockTarget::Fragment
    }

    fn initialize(&mut self, _state: &NodeMaterialBuildState) {
        self.sampler_name.clear();
        self.level_name.clear();
        self.transform_name.clear();
        self.define_name.clear();
    }

    fn auto_configure(&self) -> Vec<AutoConnection> {
        vec![AutoConnection {
            input: "uv",
            source: AutoSource::Attribute(vertex_kind::UV),
        }]
    }

    fn build_block(&mut self, context: &mut BuildContext<'_>) -> Result<(), BlockBuildError> {
        let uv = context.input("uv")?;

        context.register(BlockList::Texture);
        context.register(BlockList::Bindable);
        context.register(BlockList::Blocking);
        context.register(BlockList::Defines);

        let name = context.name().to_owned();
        self.sampler_name = context.free_variable_name(&format!("{name}Sampler"));
        self.level_name = context.free_variable_name(&format!("{name}Level"));
        self.transform_name = context.free_variable_name(&format!("{name}Transform"));
        self.define_name = context.free_define_name("UVTRANSFORM");

        context.emit_sampler(&self.sampler_name);
        context.emit_uniform(&self.level_name, "float", None);
        context.emit_uniform(&self.transform_name, "mat4", Some(self.define_name.as_str()));

        let uv = context.variable(uv);
        let transformed = context.free_variable_name("transformedUV");
        let read = context.free_variable_name("textureRead");

        let mut code = format!(
            "vec2 {transformed};\n#ifdef {define}\n{transformed} = vec2({matrix} * vec4({uv}.xy, 1.0, 0.0));\n#else\n{transformed} = {uv}.xy;\n#endif\nvec4 {read} = texture2D({sampler}, {transformed});\n",
            define = self.define_name,
            matrix = self.transform_name,
            sampler = self.sampler_name,
        );

        for (channel, swizzle) in CHANNELS {
            let output = context.output(channel)?;
            if context.has_endpoints(output) {
                code += &format!(
                    "{} = {read}{swizzle} * {};\n",
                    context.declare_output(output)?,
                    self.level_name
                );
            }
        }

        context.append(&code);
        Ok(())
    }

    fn prepare_defines(
        &self,
        _mesh: &dyn MeshProvider,
        _scene: &dyn SceneProvider,
        defines: &mut NodeMaterialDefines,
        _use_instances: bool,
    ) {
        if self.define_name.is_empty() {
            return;
        }

        let has_transform = self.texture.as_ref().map_or(false, |x| x.has_transform());
        defines.set_bool(&self.define_name, has_transform);
    }

    fn is_ready(
        &self,
        _mesh: &dyn MeshProvider,
        _defines: &NodeMaterialDefines,
        _use_instances: bool,
    ) -> bool {
        self.texture.as_ref().map_or(true, |x| x.is_ready)
    }

    fn bind(
        &self,
        effect: &mut dyn EffectBinder,
        _scene: &dyn SceneProvider,
        _mesh: &dyn MeshProvider,
    ) {
        let Some(texture) = self.texture.as_ref() else {
            return;
        };

        effect.set_float(&self.level_name, texture.level);
        if let Some(transform) = texture.transform.filter(|_| texture.has_transform()) {
            effect.set_matrix(&self.transform_name, transform);
        }
        effect.set_texture(&self.sampler_name, texture);
    }

    fn settings(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
