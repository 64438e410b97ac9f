use std::any::Any;
use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    resolve_type, resolve_variable_name, BlockIndex, BlockList, BlockTarget,
    BuildStateSharedData, ConnectionDirection, ConnectionPoint, ConnectionPointType,
    EffectBinder, EffectCreationOptions, EffectFallbacks, MeshProvider, NodeMaterialBuildState,
    NodeMaterialDefines, PointIndex, SceneProvider, SystemValue,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockBuildError {
    #[error("block has no connection point named \"{0}\"")]
    MissingPoint(String),
    #[error("type of \"{1}\" could not be resolved")]
    UnresolvedType(PointIndex, String),
}

pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub trait BlockClone {
    fn clone_block(&self) -> Box<dyn NodeMaterialBlock>;
}

impl<T: NodeMaterialBlock + Clone> BlockClone for T {
    fn clone_block(&self) -> Box<dyn NodeMaterialBlock> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn NodeMaterialBlock> {
    fn clone(&self) -> Self {
        self.clone_block()
    }
}

/// The unit of GLSL generation. Only `build_block` is mandatory, every other hook is a no-op
/// unless the block registers itself in the matching shared list during its build.
pub trait NodeMaterialBlock: AsAny + BlockClone + Debug {
    fn class_name(&self) -> &'static str;

    /// Declares the connection points, called once when the block joins a graph.
    fn register(&self, registration: &mut BlockRegistration);

    fn target(&self) -> BlockTarget;

    fn is_input(&self) -> bool {
        false
    }

    fn is_attribute(&self) -> bool {
        false
    }

    fn is_final_merger(&self) -> bool {
        false
    }

    fn initialize(&mut self, _state: &NodeMaterialBuildState) {}

    fn input_connected(&mut self, _input: &str, _source: &ConnectedSource<'_>) {}

    /// Inputs that should be wired to a well known attribute or system value when they are
    /// left unconnected.
    fn auto_configure(&self) -> Vec<AutoConnection> {
        Vec::new()
    }

    fn build_block(&mut self, context: &mut BuildContext<'_>) -> Result<(), BlockBuildError>;

    fn initialize_defines(
        &self,
        _mesh: &dyn MeshProvider,
        _defines: &mut NodeMaterialDefines,
        _use_instances: bool,
    ) {
    }

    fn prepare_defines(
        &self,
        _mesh: &dyn MeshProvider,
        _scene: &dyn SceneProvider,
        _defines: &mut NodeMaterialDefines,
        _use_instances: bool,
    ) {
    }

    fn is_ready(
        &self,
        _mesh: &dyn MeshProvider,
        _defines: &NodeMaterialDefines,
        _use_instances: bool,
    ) -> bool {
        true
    }

    fn provide_fallbacks(&self, _mesh: &dyn MeshProvider, _fallbacks: &mut EffectFallbacks) {}

    fn update_uniforms_and_samplers(
        &self,
        _options: &mut EffectCreationOptions,
        _defines: &NodeMaterialDefines,
    ) {
    }

    fn replace_repeatable_content(
        &self,
        _options: &mut EffectCreationOptions,
        _mesh: &dyn MeshProvider,
        _defines: &NodeMaterialDefines,
    ) {
    }

    fn bind(
        &self,
        _effect: &mut dyn EffectBinder,
        _scene: &dyn SceneProvider,
        _mesh: &dyn MeshProvider,
    ) {
    }

    /// Block specific configuration, restored through the matching [`BlockConstructor`].
    fn settings(&self) -> serde_json::Result<Value>;
}

pub trait BlockConstructor: NodeMaterialBlock + DeserializeOwned + Sized {
    fn identity() -> &'static str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutoConnection {
    pub input: &'static str,
    pub source: AutoSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutoSource {
    Attribute(&'static str),
    SystemValue(SystemValue),
}

/// What an input was just connected to.
pub struct ConnectedSource<'a> {
    pub block_name: &'a str,
    pub output_name: &'a str,
    pub is_input_block: bool,
}

#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub id: Uuid,
    pub name: String,
    pub comments: String,
    pub inputs: Vec<PointIndex>,
    pub outputs: Vec<PointIndex>,
    pub(crate) build_id: u64,
    pub(crate) build_target: Option<BlockTarget>,
    pub(crate) preparation_id: u64,
}

impl BlockHeader {
    pub fn new(id: Uuid, name: &str) -> Self {
        Self {
            id,
            name: name.to_owned(),
            comments: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            build_id: 0,
            build_target: None,
            preparation_id: 0,
        }
    }

    pub fn build_target(&self) -> Option<BlockTarget> {
        self.build_target
    }
}

#[derive(Debug, Clone)]
pub struct PointDeclaration {
    pub name: String,
    pub direction: ConnectionDirection,
    pub ty: ConnectionPointType,
    pub is_optional: bool,
    pub target: BlockTarget,
    pub accepted_types: Vec<ConnectionPointType>,
    pub excluded_types: Vec<ConnectionPointType>,
    pub type_source: Option<String>,
    pub linked_source: Option<String>,
}

impl PointDeclaration {
    fn new(name: &str, direction: ConnectionDirection, ty: ConnectionPointType) -> Self {
        Self {
            name: name.to_owned(),
            direction,
            ty,
            is_optional: false,
            target: BlockTarget::VertexAndFragment,
            accepted_types: Vec::new(),
            excluded_types: Vec::new(),
            type_source: None,
            linked_source: None,
        }
    }

    pub fn with_target(&mut self, target: BlockTarget) -> &mut Self {
        self.target = target;
        self
    }

    pub fn accepts(&mut self, types: &[ConnectionPointType]) -> &mut Self {
        self.accepted_types.extend_from_slice(types);
        self
    }

    pub fn excludes(&mut self, types: &[ConnectionPointType]) -> &mut Self {
        self.excluded_types.extend_from_slice(types);
        self
    }

    /// Resolves a `BasedOnInput` output from the named sibling input.
    pub fn type_from(&mut self, input: &str) -> &mut Self {
        self.type_source = Some(input.to_owned());
        self
    }

    /// Lets an `AutoDetect` input follow the named sibling input's type.
    pub fn linked_to(&mut self, input: &str) -> &mut Self {
        self.linked_source = Some(input.to_owned());
        self
    }
}

#[derive(Debug, Default)]
pub struct BlockRegistration {
    pub points: Vec<PointDeclaration>,
}

impl BlockRegistration {
    pub fn input(&mut self, name: &str, ty: ConnectionPointType) -> &mut PointDeclaration {
        self.push(PointDeclaration::new(name, ConnectionDirection::Input, ty))
    }

    pub fn optional_input(&mut self, name: &str, ty: ConnectionPointType) -> &mut PointDeclaration {
        let declaration = self.input(name, ty);
        declaration.is_optional = true;
        declaration
    }

    pub fn output(&mut self, name: &str, ty: ConnectionPointType) -> &mut PointDeclaration {
        self.push(PointDeclaration::new(name, ConnectionDirection::Output, ty))
    }

    fn push(&mut self, declaration: PointDeclaration) -> &mut PointDeclaration {
        self.points.push(declaration);
        let last = self.points.len() - 1;
        &mut self.points[last]
    }
}

/// Everything `build_block` may read or emit into for one block in one stage.
pub struct BuildContext<'a> {
    pub index: BlockIndex,
    pub header: &'a BlockHeader,
    pub points: &'a mut [ConnectionPoint],
    pub state: &'a mut NodeMaterialBuildState,
    pub shared: &'a mut BuildStateSharedData,
}

impl<'a> BuildContext<'a> {
    pub fn target(&self) -> BlockTarget {
        self.state.target
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn input(&self, name: &str) -> Result<PointIndex, BlockBuildError> {
        self.find(&self.header.inputs, name)
    }

    pub fn output(&self, name: &str) -> Result<PointIndex, BlockBuildError> {
        self.find(&self.header.outputs, name)
    }

    fn find(&self, list: &[PointIndex], name: &str) -> Result<PointIndex, BlockBuildError> {
        list.iter()
            .copied()
            .find(|x| self.points[usize::from(*x)].name == name)
            .ok_or_else(|| BlockBuildError::MissingPoint(name.to_owned()))
    }

    pub fn point(&self, index: PointIndex) -> &ConnectionPoint {
        &self.points[usize::from(index)]
    }

    pub fn point_mut(&mut self, index: PointIndex) -> &mut ConnectionPoint {
        &mut self.points[usize::from(index)]
    }

    pub fn is_connected(&self, index: PointIndex) -> bool {
        self.point(index).is_connected()
    }

    pub fn has_endpoints(&self, index: PointIndex) -> bool {
        self.point(index).has_endpoints()
    }

    pub fn point_type(&self, index: PointIndex) -> ConnectionPointType {
        resolve_type(&*self.points, index)
    }

    /// Type of the upstream output feeding `index`.
    pub fn connected_type(&self, index: PointIndex) -> Option<ConnectionPointType> {
        self.point(index)
            .connected_point()
            .map(|x| resolve_type(&*self.points, x))
    }

    pub fn variable(&self, index: PointIndex) -> String {
        resolve_variable_name(&*self.points, index).to_owned()
    }

    /// The connected variable, or `fallback` when the input is left open.
    pub fn variable_or(&self, index: PointIndex, fallback: &str) -> String {
        if self.is_connected(index) {
            self.variable(index)
        } else {
            fallback.to_owned()
        }
    }

    pub fn gl_type(&self, index: PointIndex) -> Result<&'static str, BlockBuildError> {
        self.point_type(index).gl_type().ok_or_else(|| {
            BlockBuildError::UnresolvedType(index, self.point(index).name.clone())
        })
    }

    /// Returns `"<gltype> <name>"` for an output whose name was allocated by the build.
    pub fn declare_output(&self, index: PointIndex) -> Result<String, BlockBuildError> {
        let gl_type = self.gl_type(index)?;
        Ok(format!("{gl_type} {}", self.variable(index)))
    }

    pub fn free_variable_name(&mut self, prefix: &str) -> String {
        self.shared.free_variable_name(prefix)
    }

    pub fn free_define_name(&mut self, prefix: &str) -> String {
        self.shared.free_define_name(prefix)
    }

    pub fn append(&mut self, code: &str) {
        self.state.compilation_string.push_str(code);
    }

    pub fn emit_function(&mut self, name: &str, code: &str, comment: &str) {
        let emit_comments = self.shared.emit_comments;
        self.state.emit_function(name, code, comment, emit_comments);
    }

    pub fn emit_extension(&mut self, name: &str, extension: &str, define: Option<&str>) {
        self.state.emit_extension(name, extension, define);
    }

    pub fn emit_uniform(&mut self, name: &str, gl_type: &str, define: Option<&str>) -> bool {
        self.state.emit_uniform_from_string(name, gl_type, define, false)
    }

    pub fn emit_sampler(&mut self, name: &str) -> bool {
        self.state.emit_sampler(name)
    }

    pub fn emit_varying(&mut self, name: &str, gl_type: &str, define: Option<&str>) -> bool {
        self.state
            .emit_varying_from_string(self.shared, name, gl_type, define, false)
    }

    pub fn register(&mut self, list: BlockList) {
        self.shared.register(list, self.index);
    }

    pub fn report_missing_input(&mut self, index: PointIndex) {
        self.shared.checks.report_missing_input(index);
    }
}
