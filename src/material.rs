use glam::{Mat4, Vec4};
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    vertex_kind, AutoSource, BlockBuildError, BlockIndex, BlockList, BlockSlot, BlockTarget,
    BuildContext, BuildStateSharedData, EffectBinder, EffectCreationOptions,
    EffectFallbacks, FragmentOutputBlock, GraphError, InputBlock, InputValue, MeshProvider,
    NodeMaterialBlock, NodeMaterialBuildState, NodeMaterialCompilationError, NodeMaterialDefines,
    NodeMaterialGraph,
    PointIndex, SceneProvider, SystemValue, TransformBlock, VertexOutputBlock,
};

#[cfg(test)]
mod tests;

/// Bound on the length of any upstream chain walked during compilation.
pub const MAX_GRAPH_DEPTH: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMaterialOptions {
    /// Annotates the generated source with block names and section titles.
    #[serde(default)]
    pub emit_comments: bool,
    #[serde(default = "default_max_simultaneous_lights")]
    pub max_simultaneous_lights: u32,
    /// Logs every block build at debug level.
    #[serde(default)]
    pub verbose: bool,
}

fn default_max_simultaneous_lights() -> u32 {
    4
}

impl Default for NodeMaterialOptions {
    fn default() -> Self {
        Self {
            emit_comments: false,
            max_simultaneous_lights: default_max_simultaneous_lights(),
            verbose: false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("You must define at least one vertexOutputNode")]
    MissingVertexOutputNode,
    #[error("You must define at least one fragmentOutputNode")]
    MissingFragmentOutputNode,
    #[error("block \"{0}\" is not meant to be an output node")]
    InvalidOutputNode(String),
    #[error("cyclic graph: {}", .0.join(" -> "))]
    CyclicGraph(Vec<String>),
    #[error("block {block}[{class_name}] targets {target:?} but is reached from the {stage:?} stage")]
    TargetUnsatisfiable {
        block: String,
        class_name: String,
        target: BlockTarget,
        stage: BlockTarget,
    },
    #[error("graph is deeper than {0} blocks at \"{1}\"")]
    DepthLimitExceeded(usize, String),
    #[error("block \"{0}\" failed to build: {1}")]
    Block(String, BlockBuildError),
    #[error(transparent)]
    Compilation(#[from] NodeMaterialCompilationError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("material has not been built")]
    NotBuilt,
}

/// Output of a successful build.
#[derive(Debug, Clone)]
pub struct CompiledNodeMaterial {
    pub vertex: NodeMaterialBuildState,
    pub fragment: NodeMaterialBuildState,
    pub shared: BuildStateSharedData,
}

impl CompiledNodeMaterial {
    pub fn vertex_shader(&self) -> &str {
        &self.vertex.compilation_string
    }

    pub fn fragment_shader(&self) -> &str {
        &self.fragment.compilation_string
    }

    pub fn attributes(&self) -> &[String] {
        &self.vertex.attributes
    }

    /// Vertex uniforms followed by the fragment only ones.
    pub fn uniforms(&self) -> Vec<String> {
        merge(&self.vertex.uniforms, &self.fragment.uniforms)
    }

    pub fn samplers(&self) -> Vec<String> {
        merge(&self.vertex.samplers, &self.fragment.samplers)
    }
}

fn merge(first: &[String], second: &[String]) -> Vec<String> {
    let mut merged = first.to_vec();
    for name in second {
        if !merged.contains(name) {
            merged.push(name.clone());
        }
    }
    merged
}

#[derive(Debug, Clone, PartialEq)]
pub enum EffectPreparation {
    /// A blocking block, usually a texture, is still loading.
    NotReady,
    /// Defines did not change, the current effect stays valid.
    Unchanged,
    Create(Box<EffectCreationOptions>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    /// Visited for the given stage.
    Done(BlockTarget),
}

/// A material described by a block graph, compiled to a vertex and a fragment shader.
#[derive(Debug, Clone)]
pub struct NodeMaterial {
    pub name: String,
    pub options: NodeMaterialOptions,
    graph: NodeMaterialGraph,
    vertex_output_nodes: Vec<BlockIndex>,
    fragment_output_nodes: Vec<BlockIndex>,
    build_id: u64,
    compiled: Option<CompiledNodeMaterial>,
}

impl NodeMaterial {
    pub fn new(name: &str) -> Self {
        Self::with_options(name, NodeMaterialOptions::default())
    }

    pub fn with_options(name: &str, options: NodeMaterialOptions) -> Self {
        Self {
            name: name.to_owned(),
            options,
            graph: NodeMaterialGraph::new(),
            vertex_output_nodes: Vec::new(),
            fragment_output_nodes: Vec::new(),
            build_id: 0,
            compiled: None,
        }
    }

    pub fn graph(&self) -> &NodeMaterialGraph {
        &self.graph
    }

    /// Editing the graph invalidates the compiled shaders.
    pub fn graph_mut(&mut self) -> &mut NodeMaterialGraph {
        self.compiled = None;
        &mut self.graph
    }

    pub fn compiled(&self) -> Option<&CompiledNodeMaterial> {
        self.compiled.as_ref()
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    pub fn vertex_shader(&self) -> Option<&str> {
        self.compiled.as_ref().map(|x| x.vertex_shader())
    }

    pub fn fragment_shader(&self) -> Option<&str> {
        self.compiled.as_ref().map(|x| x.fragment_shader())
    }

    pub fn vertex_output_nodes(&self) -> &[BlockIndex] {
        &self.vertex_output_nodes
    }

    pub fn fragment_output_nodes(&self) -> &[BlockIndex] {
        &self.fragment_output_nodes
    }

    pub fn output_nodes(&self) -> impl Iterator<Item = BlockIndex> + '_ {
        self.vertex_output_nodes
            .iter()
            .chain(self.fragment_output_nodes.iter())
            .copied()
    }

    pub fn add_output_node(&mut self, index: BlockIndex) -> Result<(), CompileError> {
        let list = match self.graph.block_target(index) {
            BlockTarget::Vertex => &mut self.vertex_output_nodes,
            BlockTarget::Fragment => &mut self.fragment_output_nodes,
            _ => {
                return Err(CompileError::InvalidOutputNode(
                    self.graph.header(index).name.clone(),
                ))
            }
        };

        if !list.contains(&index) {
            list.push(index);
        }
        self.compiled = None;
        Ok(())
    }

    pub fn remove_output_node(&mut self, index: BlockIndex) {
        self.vertex_output_nodes.retain(|x| *x != index);
        self.fragment_output_nodes.retain(|x| *x != index);
        self.compiled = None;
    }

    /// Drops every block and output node.
    pub fn clear(&mut self) {
        self.graph = NodeMaterialGraph::new();
        self.vertex_output_nodes.clear();
        self.fragment_output_nodes.clear();
        self.compiled = None;
    }

    /// Compiles the graph. On failure the previous output is discarded.
    pub fn build(&mut self) -> Result<(), CompileError> {
        self.compiled = None;

        if self.vertex_output_nodes.is_empty() {
            return Err(CompileError::MissingVertexOutputNode);
        }

        if self.fragment_output_nodes.is_empty() {
            return Err(CompileError::MissingFragmentOutputNode);
        }

        self.build_id += 1;
        let mut shared = BuildStateSharedData::new(self.build_id);
        shared.emit_comments = self.options.emit_comments;
        shared.verbose = self.options.verbose;

        self.auto_configure()?;

        for index in self.graph.block_indices() {
            if self.graph.block(index).is_attribute() {
                shared.reserve_variable_name(&self.graph.header(index).name);
            }
        }

        let mut vertex_state = NodeMaterialBuildState::new(BlockTarget::Vertex);
        let mut fragment_state = NodeMaterialBuildState::new(BlockTarget::Fragment);

        let mut vertex_nodes = Vec::new();
        let mut fragment_nodes = Vec::new();
        let mut initializer = Initializer::new(&mut self.graph, self.build_id);
        for &output in self.vertex_output_nodes.iter() {
            vertex_nodes.push(output);
            initializer.visit(output, &vertex_state, BlockTarget::Vertex, &mut fragment_nodes)?;
        }

        initializer.reset();
        for &output in self.fragment_output_nodes.iter() {
            if !fragment_nodes.contains(&output) {
                fragment_nodes.push(output);
            }
            initializer.visit(output, &fragment_state, BlockTarget::Fragment, &mut vertex_nodes)?;
        }

        let mut builder = Builder {
            graph: &mut self.graph,
            shared: &mut shared,
        };

        for &node in vertex_nodes.iter() {
            builder.build(&mut vertex_state, &vertex_nodes, node)?;
        }

        fragment_state.uniforms = vertex_state.uniforms.clone();
        fragment_state.uniform_declaration = vertex_state.uniform_declaration.clone();
        fragment_state.vertex_state = Some(Box::new(vertex_state));

        builder.reset_dual_blocks(&fragment_nodes);
        for &node in fragment_nodes.iter() {
            builder.build(&mut fragment_state, &fragment_nodes, node)?;
        }

        let mut vertex_state = match fragment_state.vertex_state.take() {
            Some(state) => *state,
            None => NodeMaterialBuildState::new(BlockTarget::Vertex),
        };

        vertex_state.finalize(&shared);
        fragment_state.finalize(&shared);
        shared.emit_errors(&self.graph)?;

        tracing::debug!(
            material = %self.name,
            build_id = self.build_id,
            "vertex shader:\n{}",
            vertex_state.compilation_string
        );
        tracing::debug!(
            material = %self.name,
            build_id = self.build_id,
            "fragment shader:\n{}",
            fragment_state.compilation_string
        );

        self.compiled = Some(CompiledNodeMaterial {
            vertex: vertex_state,
            fragment: fragment_state,
            shared,
        });
        Ok(())
    }

    /// Wires unconnected inputs that blocks expect to come from a mesh attribute or a scene
    /// value, reusing an existing input block when there is one.
    fn auto_configure(&mut self) -> Result<(), CompileError> {
        let roots: Vec<BlockIndex> = self.output_nodes().collect();
        for index in self.graph.upstream_blocks(&roots) {
            for connection in self.graph.block(index).auto_configure() {
                let input = self.graph.input(index, connection.input)?;
                if self.graph.point(input).is_connected() {
                    continue;
                }

                let source = match connection.source {
                    AutoSource::Attribute(name) => {
                        match self
                            .graph
                            .find_input_block(|block, x| x.is_attribute() && block == name)
                        {
                            Some(source) => source,
                            None => self.graph.add_attribute(name)?,
                        }
                    }
                    AutoSource::SystemValue(value) => {
                        match self.graph.find_input_block(|_, x| x.system() == Some(value)) {
                            Some(source) => source,
                            None => self
                                .graph
                                .add_block(&format!("{value:?}"), InputBlock::system_value(value))?,
                        }
                    }
                };

                let output = self.graph.output(source, "output")?;
                self.graph.connect(output, input)?;
            }
        }
        Ok(())
    }

    fn compiled_or_err(&self) -> Result<&CompiledNodeMaterial, CompileError> {
        self.compiled.as_ref().ok_or(CompileError::NotBuilt)
    }

    fn blocks_in(&self, list: BlockList) -> Vec<BlockIndex> {
        self.compiled
            .as_ref()
            .map(|x| x.shared.list(list).to_vec())
            .unwrap_or_default()
    }

    /// Updates `defines` for `mesh` and returns the options of the effect to create when they
    /// changed.
    pub fn prepare_effect(
        &self,
        mesh: &dyn MeshProvider,
        scene: &dyn SceneProvider,
        defines: &mut NodeMaterialDefines,
        use_instances: bool,
    ) -> Result<EffectPreparation, CompileError> {
        let compiled = self.compiled_or_err()?;
        let shared = &compiled.shared;

        for &index in shared.blocking_blocks.iter() {
            if !self.graph.block(index).is_ready(mesh, defines, use_instances) {
                return Ok(EffectPreparation::NotReady);
            }
        }

        if defines.are_attributes_dirty() {
            defines.set_bool("NORMAL", mesh.is_vertices_data_present(vertex_kind::NORMAL));
            defines.set_bool("TANGENT", mesh.is_vertices_data_present(vertex_kind::TANGENT));
            defines.set_bool("UV1", mesh.is_vertices_data_present(vertex_kind::UV));
            for &index in shared.blocks_with_defines.iter() {
                self.graph
                    .block(index)
                    .initialize_defines(mesh, defines, use_instances);
            }
        }

        for &index in shared.blocks_with_defines.iter() {
            self.graph
                .block(index)
                .prepare_defines(mesh, scene, defines, use_instances);
        }

        if !defines.is_dirty() {
            return Ok(EffectPreparation::Unchanged);
        }

        let mut fallbacks = EffectFallbacks::default();
        for &index in shared.blocks_with_fallbacks.iter() {
            self.graph.block(index).provide_fallbacks(mesh, &mut fallbacks);
        }

        let mut options = EffectCreationOptions {
            vertex_source: compiled.vertex_shader().to_owned(),
            fragment_source: compiled.fragment_shader().to_owned(),
            attributes: compiled.attributes().to_vec(),
            uniforms: compiled.uniforms(),
            samplers: compiled.samplers(),
            defines: defines.to_string(),
            fallbacks,
            max_simultaneous_lights: self.options.max_simultaneous_lights,
        };

        for &index in shared.repeatable_content_blocks.iter() {
            self.graph
                .block(index)
                .replace_repeatable_content(&mut options, mesh, defines);
        }

        for &index in shared.dynamic_uniform_blocks.iter() {
            self.graph
                .block(index)
                .update_uniforms_and_samplers(&mut options, defines);
        }

        defines.mark_as_processed();
        Ok(EffectPreparation::Create(Box::new(options)))
    }

    /// Pushes the matrices that change per mesh.
    pub fn bind_only_world_matrix(
        &self,
        effect: &mut dyn EffectBinder,
        scene: &dyn SceneProvider,
        world: Mat4,
    ) {
        let Some(compiled) = self.compiled.as_ref() else {
            return;
        };

        let hints = &compiled.shared.hints;
        let world_view = if hints.need_world_view_matrix {
            scene.view_matrix() * world
        } else {
            Mat4::IDENTITY
        };
        let world_view_projection = if hints.need_world_view_projection_matrix {
            scene.transform_matrix() * world
        } else {
            Mat4::IDENTITY
        };

        for &index in compiled.shared.input_blocks.iter() {
            if let Some(input) = self.graph.downcast::<InputBlock>(index) {
                input.transmit_world(effect, world, world_view, world_view_projection);
            }
        }
    }

    pub fn bind(
        &self,
        effect: &mut dyn EffectBinder,
        scene: &dyn SceneProvider,
        mesh: &dyn MeshProvider,
    ) {
        let Some(compiled) = self.compiled.as_ref() else {
            return;
        };

        self.bind_only_world_matrix(effect, scene, mesh.world_matrix());

        for &index in compiled.shared.input_blocks.iter() {
            if let Some(input) = self.graph.downcast::<InputBlock>(index) {
                input.transmit(effect, scene);
            }
        }

        for &index in compiled.shared.bindable_blocks.iter() {
            self.graph.block(index).bind(effect, scene, mesh);
        }
    }

    /// Advances animated inputs. Does not require a rebuild.
    pub fn animate(&mut self, scene: &dyn SceneProvider) {
        for index in self.blocks_in(BlockList::AnimatedInput) {
            if let Some(input) = self.graph.downcast_mut::<InputBlock>(index) {
                input.animate(scene);
            }
        }
    }

    pub fn need_alpha_blending(&self) -> bool {
        self.compiled
            .as_ref()
            .map_or(false, |x| x.shared.hints.need_alpha_blending)
    }

    pub fn need_alpha_testing(&self) -> bool {
        self.compiled
            .as_ref()
            .map_or(false, |x| x.shared.hints.need_alpha_testing)
    }

    /// Replaces the graph with a plain material: transformed position and a flat grey color.
    pub fn set_to_default(&mut self) -> Result<(), CompileError> {
        self.clear();
        let graph = &mut self.graph;

        let position = graph.add_attribute(vertex_kind::POSITION)?;
        let world = graph.add_block("World", InputBlock::system_value(SystemValue::World))?;
        let world_pos = graph.add_block("WorldPos", TransformBlock::default())?;
        graph.connect_blocks(position, world_pos)?;
        graph.connect_blocks(world, world_pos)?;

        let view_projection = graph.add_block(
            "ViewProjection",
            InputBlock::system_value(SystemValue::ViewProjection),
        )?;
        let projected = graph.add_block("WorldPos * ViewProjectionTransform", TransformBlock::default())?;
        graph.connect_blocks(world_pos, projected)?;
        graph.connect_blocks(view_projection, projected)?;

        let vertex_output = graph.add_block("VertexOutput", VertexOutputBlock::default())?;
        graph.connect_blocks(projected, vertex_output)?;

        let color = graph.add_block(
            "color",
            InputBlock::uniform(InputValue::Color4(Vec4::new(0.8, 0.8, 0.8, 1.0))),
        )?;
        let fragment_output = graph.add_block("FragmentOutput", FragmentOutputBlock::default())?;
        graph.connect_blocks(color, fragment_output)?;

        self.add_output_node(vertex_output)?;
        self.add_output_node(fragment_output)?;
        Ok(())
    }
}

/// Walks every reachable block once per stage before code generation, detecting cycles and
/// collecting the blocks the other stage must also build.
struct Initializer<'a> {
    graph: &'a mut NodeMaterialGraph,
    build_id: u64,
    marks: Vec<Mark>,
    path: Vec<BlockIndex>,
}

impl<'a> Initializer<'a> {
    fn new(graph: &'a mut NodeMaterialGraph, build_id: u64) -> Self {
        let marks = vec![Mark::Unvisited; graph.len()];
        Self {
            graph,
            build_id,
            marks,
            path: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.marks.fill(Mark::Unvisited);
        self.path.clear();
    }

    fn cycle(&self, index: BlockIndex) -> CompileError {
        let start = self.path.iter().position(|x| *x == index).unwrap_or(0);
        let mut names: Vec<String> = self.path[start..]
            .iter()
            .map(|x| self.graph.header(*x).name.clone())
            .collect();
        names.push(self.graph.header(index).name.clone());
        CompileError::CyclicGraph(names)
    }

    /// True when code upstream of `index` can only run in the fragment stage.
    fn requires_fragment(&self, index: BlockIndex) -> bool {
        self.graph
            .upstream_blocks(&[index])
            .into_iter()
            .any(|x| self.graph.block_target(x) == BlockTarget::Fragment)
    }

    /// `stage` is the stage the block is emitted in. It differs from the state's target for
    /// vertex blocks reached from the fragment root, whose inputs must all run in the vertex
    /// stage.
    fn visit(
        &mut self,
        index: BlockIndex,
        state: &NodeMaterialBuildState,
        stage: BlockTarget,
        other_stage: &mut Vec<BlockIndex>,
    ) -> Result<(), CompileError> {
        match self.marks[usize::from(index)] {
            Mark::Done(done) if done == stage || done == BlockTarget::Vertex => return Ok(()),
            Mark::InProgress => return Err(self.cycle(index)),
            _ => {}
        }

        let name = &self.graph.header(index).name;
        if self.path.len() >= MAX_GRAPH_DEPTH {
            return Err(CompileError::DepthLimitExceeded(MAX_GRAPH_DEPTH, name.clone()));
        }

        let target = self.graph.block_target(index);
        if stage == BlockTarget::Vertex && target == BlockTarget::Fragment {
            return Err(CompileError::TargetUnsatisfiable {
                block: name.clone(),
                class_name: self.graph.block(index).class_name().to_owned(),
                target,
                stage,
            });
        }
        let stage = if target == BlockTarget::Vertex {
            BlockTarget::Vertex
        } else {
            stage
        };

        self.marks[usize::from(index)] = Mark::InProgress;
        self.path.push(index);

        self.graph.block_mut(index).initialize(state);
        self.graph.header_mut(index).preparation_id = self.build_id;

        let inputs = self.graph.header(index).inputs.clone();
        for input in inputs {
            let point = self.graph.point_mut(input);
            point.clear_associated_variable_name();
            point.enforce_associated_variable_name = false;

            let Some(connected) = point.connected_point else {
                continue;
            };

            let source = self.graph.point(connected).owner;
            if source == index {
                return Err(self.cycle(index));
            }

            let source_target = self.graph.block_target(source);
            let hoisted = state.target == BlockTarget::Fragment
                && source_target == BlockTarget::Vertex
                && self.graph.header(source).preparation_id != self.build_id;
            let dual = source_target == BlockTarget::VertexAndFragment
                && (state.target == BlockTarget::Vertex || !self.requires_fragment(source));
            if (dual || hoisted) && !other_stage.contains(&source) {
                other_stage.push(source);
            }

            self.visit(source, state, stage, other_stage)?;
        }

        let outputs = self.graph.header(index).outputs.clone();
        for output in outputs {
            self.graph.point_mut(output).clear_associated_variable_name();
        }

        self.path.pop();
        self.marks[usize::from(index)] = Mark::Done(stage);
        Ok(())
    }
}

/// Emits code for one stage. Blocks build their inputs first, then the downstream blocks of
/// the same stage.
struct Builder<'a> {
    graph: &'a mut NodeMaterialGraph,
    shared: &'a mut BuildStateSharedData,
}

impl<'a> Builder<'a> {
    /// Lets blocks that run in both stages emit again for the fragment stage.
    fn reset_dual_blocks(&mut self, roots: &[BlockIndex]) {
        for index in self.graph.upstream_blocks(roots) {
            if self.graph.block_target(index) == BlockTarget::VertexAndFragment {
                self.graph.header_mut(index).build_id = 0;
            }
        }
    }

    fn build(
        &mut self,
        state: &mut NodeMaterialBuildState,
        active: &[BlockIndex],
        index: BlockIndex,
    ) -> Result<(), CompileError> {
        let build_id = self.shared.build_id;
        if self.graph.header(index).build_id == build_id {
            return Ok(());
        }

        let block_target = self.graph.block_target(index);
        if !self.graph.block(index).is_input() {
            for output in self.graph.header(index).outputs.clone() {
                let point = self.graph.point(output);
                if point.associated_variable_name.is_empty() {
                    let name = self.shared.free_variable_name(&point.name);
                    self.graph.point_mut(output).set_associated_variable_name(name);
                }
            }
        }

        for input in self.graph.header(index).inputs.clone() {
            let point = self.graph.point(input);
            let Some(connected) = point.connected_point else {
                if !point.is_optional {
                    self.shared.checks.report_missing_input(input);
                }
                continue;
            };

            if block_target != BlockTarget::Neutral
                && (!point.target.intersects(block_target) || !point.target.intersects(state.target))
            {
                continue;
            }

            let source = self.graph.point(connected).owner;
            self.process_build(state, active, index, source, input)?;
        }

        if self.graph.header(index).build_id == build_id {
            return Ok(());
        }

        let NodeMaterialGraph { blocks, points } = &mut *self.graph;
        let BlockSlot { header, block } = &mut blocks[usize::from(index)];

        if self.shared.verbose {
            tracing::debug!(
                block = %header.name,
                class_name = block.class_name(),
                stage = state.target.stage_name(),
                "building block"
            );
        }

        if block.is_final_merger() {
            match state.target {
                BlockTarget::Vertex => self.shared.checks.emit_vertex = true,
                BlockTarget::Fragment => self.shared.checks.emit_fragment = true,
                _ => {}
            }
        }

        if self.shared.emit_comments {
            state
                .compilation_string
                .push_str(&format!("\n//{}\n", header.name));
        }

        let mut context = BuildContext {
            index,
            header: &*header,
            points: points.as_mut_slice(),
            state: &mut *state,
            shared: &mut *self.shared,
        };

        match block.build_block(&mut context) {
            Ok(()) => {}
            Err(BlockBuildError::UnresolvedType(point, point_name)) => {
                tracing::warn!(
                    block = %header.name,
                    point = %point_name,
                    "skipping block with an unresolved type"
                );
                self.shared.checks.report_unresolved_type(point);
            }
            Err(err) => return Err(CompileError::Block(header.name.clone(), err)),
        }

        header.build_id = build_id;
        header.build_target = Some(state.target);

        for output in header.outputs.clone() {
            if !self.graph.point(output).target.intersects(state.target) {
                continue;
            }

            let mut endpoints = self.graph.point(output).endpoints.clone();
            endpoints.sort();
            for endpoint in endpoints {
                let owner = self.graph.point(endpoint).owner;
                if self.graph.block_target(owner).intersects(state.target) && active.contains(&owner)
                {
                    self.process_build(state, active, index, owner, endpoint)?;
                }
            }
        }

        Ok(())
    }

    /// Builds `source` then, when the value crosses from the vertex to the fragment stage,
    /// routes it through a varying.
    fn process_build(
        &mut self,
        state: &mut NodeMaterialBuildState,
        active: &[BlockIndex],
        index: BlockIndex,
        source: BlockIndex,
        input: PointIndex,
    ) -> Result<(), CompileError> {
        self.build(state, active, source)?;

        if state.vertex_state.is_none() {
            return Ok(());
        }

        let target = self.graph.block_target(index);
        let source_target = self.graph.block_target(source);
        let source_build_target = self.graph.header(source).build_target();
        let source_block = self.graph.block(source);
        // Attributes only exist in the vertex stage.
        let is_attribute = source_block.is_input() && source_block.is_attribute();
        let stage_switch = is_attribute
            || source_build_target.map_or(true, |x| !source_target.intersects(x))
            || !source_target.intersects(self.graph.point(input).target)
            || (target != BlockTarget::VertexAndFragment
                && source_build_target == Some(BlockTarget::Vertex)
                && source_target != BlockTarget::VertexAndFragment);
        if !stage_switch {
            return Ok(());
        }

        let emitted_by_vertex =
            !source_block.is_input() && Some(state.target) != source_build_target;
        if !emitted_by_vertex && !is_attribute {
            return Ok(());
        }

        let Some(connected) = self.graph.point(input).connected_point() else {
            return Ok(());
        };

        let Some(gl_type) = self.graph.point_type(connected).gl_type() else {
            self.shared.checks.report_unresolved_type(connected);
            return Ok(());
        };

        let name = self.graph.variable_name(connected).to_owned();
        let varying = format!("v_{name}");
        if let Some(vertex) = state.vertex_state.as_mut() {
            if vertex.emit_varying_from_string(self.shared, &varying, gl_type, None, false) {
                tracing::trace!(varying = %varying, "carrying value to the fragment stage");
                vertex.push_varying_transfer(&format!("{varying} = {name};\n"));
            }
        }

        let point = self.graph.point_mut(input);
        point.set_associated_variable_name(varying);
        point.enforce_associated_variable_name = true;
        Ok(())
    }
}
