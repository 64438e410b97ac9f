use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    BlockBuildError, BlockConstructor, BlockList, BlockRegistration, BlockTarget, BuildContext,
    ConnectionPointType, EffectBinder, LightInfo, LightKind, MeshProvider, NodeMaterialBlock,
    NodeMaterialBuildState, NodeMaterialDefines, SceneProvider,
};

/// Direction, color and intensity of one scene light as seen from a world position.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LightInformationBlock {
    /// Light to read, the first scene light when unset.
    #[serde(default)]
    pub light: Option<String>,
    #[serde(skip)]
    data_name: String,
    #[serde(skip)]
    color_name: String,
    #[serde(skip)]
    define_name: String,
}

impl LightInformationBlock {
    pub fn new(light: &str) -> Self {
        Self {
            light: Some(light.to_owned()),
            ..Default::default()
        }
    }

    fn find_light<'a>(&self, scene: &'a dyn SceneProvider) -> Option<&'a LightInfo> {
        match self.light.as_deref() {
            Some(name) => scene.lights().iter().find(|x| x.name == name),
            None => scene.lights().first(),
        }
    }
}

impl BlockConstructor for LightInformationBlock {
    fn identity() -> &'static str {
        "LightInformationBlock"
    }
}

impl NodeMaterialBlock for LightInformationBlock {
    fn class_name(&self) -> &'static str {
        Self::identity()
    }

    fn register(&self, registration: &mut BlockRegistration) {
        use ConnectionPointType::*;
        registration.input("worldPosition", Vector4);
        registration.output("direction", Vector3);
        registration.output("color", Color3);
        registration.output("intensity", Float);
    }

    fn target(&self) -> BlockTarget {
        BlockTarget::Vertex
    }

    fn initialize(&mut self, _state: &NodeMaterialBuildState) {
        self.data_name.clear();
        self.color_name.clear();
        self.define_name.clear();
    }

    fn build_block(&mut self, context: &mut BuildContext<'_>) -> Result<(), BlockBuildError> {
        let world_position = context.input("worldPosition")?;
        let direction = context.output("direction")?;
        let color = context.output("color")?;
        let intensity = context.output("intensity")?;

        context.register(BlockList::Bindable);
        context.register(BlockList::Defines);

        self.data_name = context.free_variable_name("lightData");
        self.color_name = context.free_variable_name("lightColor");
        self.define_name = context.free_define_name("LIGHTPOINTTYPE");

        context.emit_uniform(&self.data_name, "vec3", None);
        context.emit_uniform(&self.color_name, "vec4", None);

        let mut code = String::new();
        if context.has_endpoints(direction) {
            let name = context.variable(direction);
            code += &format!(
                "{};\n#ifdef {}\n{name} = normalize({}.xyz - {});\n#else\n{name} = {};\n#endif\n",
                context.declare_output(direction)?,
                self.define_name,
                context.variable(world_position),
                self.data_name,
                self.data_name,
            );
        }

        if context.has_endpoints(color) {
            code += &format!("{} = {}.rgb;\n", context.declare_output(color)?, self.color_name);
        }

        if context.has_endpoints(intensity) {
            code += &format!(
                "{} = {}.a;\n",
                context.declare_output(intensity)?,
                self.color_name
            );
        }

        context.append(&code);
        Ok(())
    }

    fn prepare_defines(
        &self,
        _mesh: &dyn MeshProvider,
        scene: &dyn SceneProvider,
        defines: &mut NodeMaterialDefines,
        _use_instances: bool,
    ) {
        if self.define_name.is_empty() {
            return;
        }

        let is_point = self
            .find_light(scene)
            .map_or(false, |x| x.kind == LightKind::Point);
        defines.set_bool(&self.define_name, is_point);
    }

    fn bind(
        &self,
        effect: &mut dyn EffectBinder,
        scene: &dyn SceneProvider,
        _mesh: &dyn MeshProvider,
    ) {
        let Some(light) = self.find_light(scene) else {
            effect.set_vector3(&self.data_name, glam::Vec3::ZERO);
            effect.set_color4(&self.color_name, glam::Vec4::ZERO);
            return;
        };

        let data = match light.kind {
            LightKind::Point => light.position,
            _ => light.direction.normalize_or_zero(),
        };
        effect.set_vector3(&self.data_name, data);
        effect.set_color4(&self.color_name, light.diffuse.extend(light.intensity));
    }

    fn settings(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
