use glam::{Mat4, Vec2, Vec3, Vec4};
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    emit_float, BlockBuildError, BlockConstructor, BlockIndex, BlockList, BlockRegistration,
    BlockTarget, BuildContext, ConnectionPointType, EffectBinder, GraphError, NodeMaterialBlock,
    NodeMaterialBuildState, NodeMaterialGraph, PointIndex, SceneProvider,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemValue {
    World,
    WorldView,
    WorldViewProjection,
    View,
    ViewProjection,
    Projection,
    CameraPosition,
    FogColor,
}

impl SystemValue {
    pub fn point_type(self) -> ConnectionPointType {
        match self {
            SystemValue::CameraPosition => ConnectionPointType::Vector3,
            SystemValue::FogColor => ConnectionPointType::Color3,
            _ => ConnectionPointType::Matrix,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum InputValue {
    Float(f32),
    Int(i32),
    Vector2(Vec2),
    Vector3(Vec3),
    Vector4(Vec4),
    Color3(Vec3),
    Color4(Vec4),
    Matrix(Mat4),
}

impl InputValue {
    pub fn ty(&self) -> ConnectionPointType {
        match self {
            InputValue::Float(_) => ConnectionPointType::Float,
            InputValue::Int(_) => ConnectionPointType::Int,
            InputValue::Vector2(_) => ConnectionPointType::Vector2,
            InputValue::Vector3(_) => ConnectionPointType::Vector3,
            InputValue::Vector4(_) => ConnectionPointType::Vector4,
            InputValue::Color3(_) => ConnectionPointType::Color3,
            InputValue::Color4(_) => ConnectionPointType::Color4,
            InputValue::Matrix(_) => ConnectionPointType::Matrix,
        }
    }

    /// Zero vectors, white colors and the identity matrix.
    pub fn default_for(ty: ConnectionPointType) -> Option<Self> {
        Some(match ty {
            ConnectionPointType::Float => InputValue::Float(0.0),
            ConnectionPointType::Int => InputValue::Int(0),
            ConnectionPointType::Vector2 => InputValue::Vector2(Vec2::ZERO),
            ConnectionPointType::Vector3 => InputValue::Vector3(Vec3::ZERO),
            ConnectionPointType::Vector4 => InputValue::Vector4(Vec4::ZERO),
            ConnectionPointType::Color3 => InputValue::Color3(Vec3::ONE),
            ConnectionPointType::Color4 => InputValue::Color4(Vec4::ONE),
            ConnectionPointType::Matrix => InputValue::Matrix(Mat4::IDENTITY),
            _ => return None,
        })
    }

    /// GLSL literal for the value, used when the input is inlined as a constant.
    pub fn to_glsl(&self) -> String {
        match self {
            InputValue::Float(x) => emit_float(*x),
            InputValue::Int(x) => x.to_string(),
            InputValue::Vector2(v) => vector_literal("vec2", &v.to_array()),
            InputValue::Vector3(v) | InputValue::Color3(v) => vector_literal("vec3", &v.to_array()),
            InputValue::Vector4(v) | InputValue::Color4(v) => vector_literal("vec4", &v.to_array()),
            InputValue::Matrix(m) => vector_literal("mat4", &m.to_cols_array()),
        }
    }

    fn transmit(&self, effect: &mut dyn EffectBinder, name: &str) {
        match *self {
            InputValue::Float(x) => effect.set_float(name, x),
            InputValue::Int(x) => effect.set_int(name, x),
            InputValue::Vector2(x) => effect.set_vector2(name, x),
            InputValue::Vector3(x) => effect.set_vector3(name, x),
            InputValue::Vector4(x) => effect.set_vector4(name, x),
            InputValue::Color3(x) => effect.set_color3(name, x),
            InputValue::Color4(x) => effect.set_color4(name, x),
            InputValue::Matrix(x) => effect.set_matrix(name, x),
        }
    }
}

fn vector_literal(constructor: &str, values: &[f32]) -> String {
    let values: Vec<String> = values.iter().map(|x| emit_float(*x)).collect();
    format!("{constructor}({})", values.join(", "))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputMode {
    Uniform,
    Constant,
    Attribute,
    SystemValue(SystemValue),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnimatedInputType {
    #[default]
    None,
    Time,
}

/// Type of the well known mesh attributes.
pub fn attribute_type(name: &str) -> Option<ConnectionPointType> {
    Some(match name {
        "position" | "normal" | "tangent" => ConnectionPointType::Vector3,
        "uv" | "uv2" => ConnectionPointType::Vector2,
        "matricesIndices" | "matricesWeights" | "world0" | "world1" | "world2" | "world3" => {
            ConnectionPointType::Vector4
        }
        "color" => ConnectionPointType::Color4,
        _ => return None,
    })
}

/// Feeds a value into the graph: a uniform, an inlined constant, a mesh attribute named after
/// the block, or a value provided by the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBlock {
    pub mode: InputMode,
    #[serde(rename = "type")]
    pub ty: ConnectionPointType,
    #[serde(default)]
    pub value: Option<InputValue>,
    #[serde(default)]
    pub animation: AnimatedInputType,
    #[serde(skip)]
    associated_name: String,
}

impl InputBlock {
    fn with_mode(mode: InputMode, ty: ConnectionPointType, value: Option<InputValue>) -> Self {
        Self {
            mode,
            ty,
            value,
            animation: AnimatedInputType::None,
            associated_name: String::new(),
        }
    }

    pub fn uniform(value: InputValue) -> Self {
        Self::with_mode(InputMode::Uniform, value.ty(), Some(value))
    }

    pub fn constant(value: InputValue) -> Self {
        Self::with_mode(InputMode::Constant, value.ty(), Some(value))
    }

    /// The type comes from the attribute name, unknown names stay unresolved until typed.
    pub fn attribute(name: &str) -> Self {
        let ty = attribute_type(name).unwrap_or(ConnectionPointType::AutoDetect);
        Self::with_mode(InputMode::Attribute, ty, None)
    }

    pub fn attribute_with_type(ty: ConnectionPointType) -> Self {
        Self::with_mode(InputMode::Attribute, ty, None)
    }

    pub fn system_value(value: SystemValue) -> Self {
        Self::with_mode(InputMode::SystemValue(value), value.point_type(), None)
    }

    pub fn animated(mut self, animation: AnimatedInputType) -> Self {
        self.animation = animation;
        self
    }

    pub fn is_uniform(&self) -> bool {
        matches!(self.mode, InputMode::Uniform | InputMode::SystemValue(_))
    }

    pub fn is_constant(&self) -> bool {
        self.mode == InputMode::Constant
    }

    pub fn system(&self) -> Option<SystemValue> {
        match self.mode {
            InputMode::SystemValue(x) => Some(x),
            _ => None,
        }
    }

    /// Name of the emitted uniform or attribute, empty before a build.
    pub fn associated_name(&self) -> &str {
        &self.associated_name
    }

    pub fn set_default_value(&mut self) {
        if !self.is_attribute() && self.system().is_none() {
            self.value = InputValue::default_for(self.ty);
        }
    }

    pub fn animate(&mut self, scene: &dyn SceneProvider) {
        if self.animation != AnimatedInputType::Time {
            return;
        }

        if let Some(InputValue::Float(value)) = self.value.as_mut() {
            *value += scene.animation_ratio() * 0.01;
        }
    }

    /// Matrices that depend on the mesh being drawn.
    pub fn transmit_world(
        &self,
        effect: &mut dyn EffectBinder,
        world: Mat4,
        world_view: Mat4,
        world_view_projection: Mat4,
    ) {
        let name = self.associated_name.as_str();
        match self.system() {
            Some(SystemValue::World) => effect.set_matrix(name, world),
            Some(SystemValue::WorldView) => effect.set_matrix(name, world_view),
            Some(SystemValue::WorldViewProjection) => effect.set_matrix(name, world_view_projection),
            _ => {}
        }
    }

    pub fn transmit(&self, effect: &mut dyn EffectBinder, scene: &dyn SceneProvider) {
        let name = self.associated_name.as_str();
        match self.mode {
            InputMode::Attribute | InputMode::Constant => {}
            InputMode::SystemValue(system) => match system {
                SystemValue::World | SystemValue::WorldView | SystemValue::WorldViewProjection => {}
                SystemValue::View => effect.set_matrix(name, scene.view_matrix()),
                SystemValue::Projection => effect.set_matrix(name, scene.projection_matrix()),
                SystemValue::ViewProjection => effect.set_matrix(name, scene.transform_matrix()),
                SystemValue::CameraPosition => effect.set_vector3(name, scene.camera_position()),
                SystemValue::FogColor => effect.set_color3(name, scene.fog_color()),
            },
            InputMode::Uniform => {
                if let Some(value) = self.value.as_ref() {
                    value.transmit(effect, name);
                }
            }
        }
    }

    fn emit_uniform(
        &mut self,
        context: &mut BuildContext<'_>,
        output: PointIndex,
    ) -> Result<(), BlockBuildError> {
        context.register(BlockList::Input);

        if self.associated_name.is_empty() {
            let prefix = format!("u_{}", context.name());
            self.associated_name = context.free_variable_name(&prefix);
        }
        context
            .point_mut(output)
            .set_associated_variable_name(self.associated_name.clone());

        let gl_type = context.gl_type(output)?;
        if !context.emit_uniform(&self.associated_name, gl_type, None) {
            return Ok(());
        }

        match self.system() {
            Some(SystemValue::WorldView) => context.shared.hints.need_world_view_matrix = true,
            Some(SystemValue::WorldViewProjection) => {
                context.shared.hints.need_world_view_projection_matrix = true
            }
            Some(_) => {}
            None => {
                if self.animation != AnimatedInputType::None {
                    context.register(BlockList::AnimatedInput);
                }
            }
        }

        Ok(())
    }
}

impl BlockConstructor for InputBlock {
    fn identity() -> &'static str {
        "InputBlock"
    }
}

impl NodeMaterialBlock for InputBlock {
    fn class_name(&self) -> &'static str {
        Self::identity()
    }

    fn register(&self, registration: &mut BlockRegistration) {
        registration.output("output", self.ty);
    }

    fn target(&self) -> BlockTarget {
        match self.mode {
            InputMode::Attribute => BlockTarget::Vertex,
            _ => BlockTarget::VertexAndFragment,
        }
    }

    fn is_input(&self) -> bool {
        true
    }

    fn is_attribute(&self) -> bool {
        self.mode == InputMode::Attribute
    }

    fn initialize(&mut self, _state: &NodeMaterialBuildState) {
        self.associated_name.clear();
    }

    fn build_block(&mut self, context: &mut BuildContext<'_>) -> Result<(), BlockBuildError> {
        let output = context.output("output")?;

        match self.mode {
            InputMode::Constant => {
                let literal = self
                    .value
                    .or_else(|| InputValue::default_for(self.ty))
                    .map(|x| x.to_glsl())
                    .unwrap_or_else(|| "0.0".to_owned());
                context.point_mut(output).set_associated_variable_name(literal);
                Ok(())
            }
            InputMode::Uniform | InputMode::SystemValue(_) => self.emit_uniform(context, output),
            InputMode::Attribute => {
                self.associated_name = context.name().to_owned();
                context
                    .point_mut(output)
                    .set_associated_variable_name(self.associated_name.clone());

                let gl_type = context.gl_type(output)?;
                // Attributes read by the fragment stage are declared where they exist.
                match context.state.vertex_state.as_mut() {
                    Some(vertex) => vertex.emit_attribute(&self.associated_name, gl_type, None),
                    None => context.state.emit_attribute(&self.associated_name, gl_type, None),
                };
                Ok(())
            }
        }
    }

    fn settings(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

impl NodeMaterialGraph {
    pub fn add_attribute(&mut self, name: &str) -> Result<BlockIndex, GraphError> {
        self.add_block(name, InputBlock::attribute(name))
    }

    pub fn add_input(&mut self, name: &str, block: InputBlock) -> Result<BlockIndex, GraphError> {
        self.add_block(name, block)
    }

    pub fn input_block(&self, index: BlockIndex) -> Result<&InputBlock, GraphError> {
        self.downcast::<InputBlock>(index).ok_or_else(|| {
            GraphError::UnexpectedBlockType(self.header(index).name.clone(), InputBlock::identity())
        })
    }

    /// Stores a new value, switching attribute and system inputs to uniforms and retyping the
    /// output to match.
    pub fn set_input_value(
        &mut self,
        index: BlockIndex,
        value: InputValue,
    ) -> Result<(), GraphError> {
        let name = self.header(index).name.clone();
        let block = self
            .downcast_mut::<InputBlock>(index)
            .ok_or_else(|| GraphError::UnexpectedBlockType(name, InputBlock::identity()))?;

        block.value = Some(value);
        block.ty = value.ty();
        if !block.is_constant() {
            block.mode = InputMode::Uniform;
        }

        if let Some(output) = self.header(index).outputs.first().copied() {
            self.point_mut(output).inner_type = value.ty();
        }
        Ok(())
    }

    /// First input block satisfying `predicate`, used to share attributes and system values.
    pub fn find_input_block<F>(&self, mut predicate: F) -> Option<BlockIndex>
    where
        F: FnMut(&str, &InputBlock) -> bool,
    {
        self.find_block(|header, block| {
            block
                .as_any()
                .downcast_ref::<InputBlock>()
                .map_or(false, |x| predicate(&header.name, x))
        })
    }
}
