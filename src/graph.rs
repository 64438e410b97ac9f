use std::collections::HashMap;

use thiserror::Error;
use uuid::Uuid;

use crate::{
    check_type_compatibility, resolve_type, resolve_variable_name, BlockHeader, BlockIndex,
    BlockRegistration, BlockTarget, CompatibilityState, ConnectedSource, ConnectionDirection,
    ConnectionError, ConnectionPoint, ConnectionPointType, GraphIndexError, IndexConversions,
    NodeMaterialBlock, PointIndex, MAX_GRAPH_DEPTH,
};


#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("index error: {0}")]
    Index(#[from] GraphIndexError),
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("block \"{0}\" has no input named \"{1}\"")]
    UnknownInput(String, String),
    #[error("block \"{0}\" has no output named \"{1}\"")]
    UnknownOutput(String, String),
    #[error("block \"{0}\" links \"{1}\" to \"{2}\" which is not one of its inputs")]
    UnknownSourcePoint(String, String, String),
    #[error("unable to find a compatible match between \"{0}\" and \"{1}\"")]
    NoCompatibleConnection(String, String),
    #[error("block \"{0}\" is not a {1}")]
    UnexpectedBlockType(String, &'static str),
}

#[derive(Debug, Clone)]
pub struct BlockSlot {
    pub(crate) header: BlockHeader,
    pub(crate) block: Box<dyn NodeMaterialBlock>,
}

/// Arena owning every block and connection point of a material. Edges are point handles.
#[derive(Debug, Default, Clone)]
pub struct NodeMaterialGraph {
    pub(crate) blocks: Vec<BlockSlot>,
    pub(crate) points: Vec<ConnectionPoint>,
}

impl NodeMaterialGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_indices(&self) -> impl Iterator<Item = BlockIndex> + '_ {
        (0..self.blocks.len()).map(|x| BlockIndex(x as _))
    }

    pub fn add_block<T: NodeMaterialBlock>(
        &mut self,
        name: &str,
        block: T,
    ) -> Result<BlockIndex, GraphError> {
        self.add_boxed_block(Uuid::new_v4(), name, Box::new(block))
    }

    pub fn add_boxed_block(
        &mut self,
        id: Uuid,
        name: &str,
        block: Box<dyn NodeMaterialBlock>,
    ) -> Result<BlockIndex, GraphError> {
        let index = self.blocks.len().try_block_index()?;

        let mut registration = BlockRegistration::default();
        block.register(&mut registration);

        let first_point = self.points.len();
        if !registration.points.is_empty() {
            (first_point + registration.points.len() - 1).try_point_index()?;
        }

        let mut inputs_by_name = HashMap::new();
        for (offset, declaration) in registration.points.iter().enumerate() {
            if declaration.direction == ConnectionDirection::Input {
                inputs_by_name.insert(declaration.name.as_str(), PointIndex((first_point + offset) as _));
            }
        }

        let lookup = |declaration: &str, source: &Option<String>| match source {
            Some(source) => inputs_by_name
                .get(source.as_str())
                .copied()
                .map(Some)
                .ok_or_else(|| {
                    GraphError::UnknownSourcePoint(
                        name.to_owned(),
                        declaration.to_owned(),
                        source.clone(),
                    )
                }),
            None => Ok(None),
        };

        let mut header = BlockHeader::new(id, name);
        let mut points = Vec::with_capacity(registration.points.len());
        for (offset, declaration) in registration.points.iter().enumerate() {
            let point_index = PointIndex((first_point + offset) as _);
            let mut point =
                ConnectionPoint::new(&declaration.name, index, declaration.direction, declaration.ty);
            point.is_optional = declaration.is_optional;
            point.target = declaration.target;
            point.accepted_types = declaration.accepted_types.clone();
            point.excluded_types = declaration.excluded_types.clone();
            point.type_source = lookup(&declaration.name, &declaration.type_source)?;
            point.linked_source = lookup(&declaration.name, &declaration.linked_source)?;
            points.push(point);

            match declaration.direction {
                ConnectionDirection::Input => header.inputs.push(point_index),
                ConnectionDirection::Output => header.outputs.push(point_index),
            }
        }

        self.points.extend(points);
        self.blocks.push(BlockSlot { header, block });
        Ok(index)
    }

    pub fn header(&self, index: BlockIndex) -> &BlockHeader {
        &self.blocks[usize::from(index)].header
    }

    pub fn header_mut(&mut self, index: BlockIndex) -> &mut BlockHeader {
        &mut self.blocks[usize::from(index)].header
    }

    pub fn block(&self, index: BlockIndex) -> &dyn NodeMaterialBlock {
        self.blocks[usize::from(index)].block.as_ref()
    }

    pub fn block_mut(&mut self, index: BlockIndex) -> &mut dyn NodeMaterialBlock {
        self.blocks[usize::from(index)].block.as_mut()
    }

    pub fn downcast<T: NodeMaterialBlock>(&self, index: BlockIndex) -> Option<&T> {
        self.block(index).as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: NodeMaterialBlock>(&mut self, index: BlockIndex) -> Option<&mut T> {
        self.block_mut(index).as_any_mut().downcast_mut::<T>()
    }

    pub fn block_target(&self, index: BlockIndex) -> BlockTarget {
        self.block(index).target()
    }

    pub fn block_by_name(&self, name: &str) -> Option<BlockIndex> {
        self.block_indices().find(|x| self.header(*x).name == name)
    }

    pub fn find_block<F>(&self, mut predicate: F) -> Option<BlockIndex>
    where
        F: FnMut(&BlockHeader, &dyn NodeMaterialBlock) -> bool,
    {
        self.blocks
            .iter()
            .position(|x| predicate(&x.header, x.block.as_ref()))
            .map(|x| BlockIndex(x as _))
    }

    pub fn point(&self, index: PointIndex) -> &ConnectionPoint {
        &self.points[usize::from(index)]
    }

    pub(crate) fn point_mut(&mut self, index: PointIndex) -> &mut ConnectionPoint {
        &mut self.points[usize::from(index)]
    }

    pub fn input(&self, block: BlockIndex, name: &str) -> Result<PointIndex, GraphError> {
        let header = self.header(block);
        header
            .inputs
            .iter()
            .copied()
            .find(|x| self.point(*x).name == name)
            .ok_or_else(|| GraphError::UnknownInput(header.name.clone(), name.to_owned()))
    }

    pub fn output(&self, block: BlockIndex, name: &str) -> Result<PointIndex, GraphError> {
        let header = self.header(block);
        header
            .outputs
            .iter()
            .copied()
            .find(|x| self.point(*x).name == name)
            .ok_or_else(|| GraphError::UnknownOutput(header.name.clone(), name.to_owned()))
    }

    pub fn point_type(&self, index: PointIndex) -> ConnectionPointType {
        resolve_type(&self.points, index)
    }

    pub fn variable_name(&self, index: PointIndex) -> &str {
        resolve_variable_name(&self.points, index)
    }

    /// Block name, class name and point name, for messages.
    pub fn describe_point(&self, index: PointIndex) -> (String, String, String) {
        let point = self.point(index);
        let slot = &self.blocks[usize::from(point.owner)];
        (
            slot.header.name.clone(),
            slot.block.class_name().to_owned(),
            point.name.clone(),
        )
    }

    fn qualified_name(&self, index: PointIndex) -> String {
        let point = self.point(index);
        format!("{}.{}", self.header(point.owner).name, point.name)
    }

    pub fn is_connected_in_vertex_shader(&self, index: PointIndex) -> bool {
        self.is_connected_in_stage(index, BlockTarget::Vertex, 0)
    }

    pub fn is_connected_in_fragment_shader(&self, index: PointIndex) -> bool {
        self.is_connected_in_stage(index, BlockTarget::Fragment, 0)
    }

    fn is_connected_in_stage(&self, index: PointIndex, stage: BlockTarget, depth: usize) -> bool {
        let point = self.point(index);
        if point.target == stage {
            return true;
        }

        if depth >= MAX_GRAPH_DEPTH {
            return false;
        }

        for endpoint in point.endpoints.iter() {
            let endpoint = self.point(*endpoint);
            let owner_target = self.block_target(endpoint.owner);
            if owner_target == stage {
                return true;
            }

            if stage == BlockTarget::Vertex && endpoint.target == stage {
                return true;
            }

            if matches!(owner_target, BlockTarget::Neutral | BlockTarget::VertexAndFragment)
                && self
                    .header(endpoint.owner)
                    .outputs
                    .iter()
                    .any(|x| self.is_connected_in_stage(*x, stage, depth + 1))
            {
                return true;
            }
        }

        false
    }

    pub fn check_compatibility(&self, output: PointIndex, input: PointIndex) -> CompatibilityState {
        let source_block = self.point(output).owner;
        let target_block = self.point(input).owner;

        if self.block_target(source_block) == BlockTarget::Fragment {
            if self.block_target(target_block) == BlockTarget::Vertex {
                return CompatibilityState::TargetIncompatible;
            }

            if self
                .header(source_block)
                .outputs
                .iter()
                .any(|x| self.is_connected_in_vertex_shader(*x))
            {
                return CompatibilityState::TargetIncompatible;
            }
        }

        check_type_compatibility(
            self.point_type(output),
            self.point(input),
            self.point_type(input),
        )
    }

    pub fn can_connect(&self, output: PointIndex, input: PointIndex) -> bool {
        self.point(output).is_output()
            && self.point(input).is_input()
            && self.point_type(output).is_resolved()
            && self.check_compatibility(output, input) == CompatibilityState::Compatible
    }

    /// Wires `output` into `input`, replacing any previous upstream of `input`.
    pub fn connect(&mut self, output: PointIndex, input: PointIndex) -> Result<(), GraphError> {
        self.check_direction(output, input)?;

        let output_type = self.point_type(output);
        if !output_type.is_resolved() {
            return Err(ConnectionError::UnresolvedType(self.qualified_name(output)).into());
        }

        match self.check_compatibility(output, input) {
            CompatibilityState::Compatible => {}
            CompatibilityState::TargetIncompatible => {
                return Err(ConnectionError::TargetIncompatible(
                    self.qualified_name(output),
                    self.qualified_name(input),
                )
                .into())
            }
            CompatibilityState::TypeIncompatible => {
                return Err(ConnectionError::TypeMismatch {
                    output: self.qualified_name(output),
                    input: self.qualified_name(input),
                    output_type,
                    input_type: self.point_type(input),
                }
                .into())
            }
        }

        self.link(output, input);
        Ok(())
    }

    /// Wires two points without type or stage checks, used when restoring a saved graph.
    pub fn connect_unchecked(&mut self, output: PointIndex, input: PointIndex) -> Result<(), GraphError> {
        self.check_direction(output, input)?;
        self.link(output, input);
        Ok(())
    }

    pub fn connect_by_name(
        &mut self,
        from: BlockIndex,
        output: &str,
        to: BlockIndex,
        input: &str,
    ) -> Result<(), GraphError> {
        let output = self.output(from, output)?;
        let input = self.input(to, input)?;
        self.connect(output, input)
    }

    /// Connects the first compatible output of `from` to the first free input of `to`.
    pub fn connect_blocks(&mut self, from: BlockIndex, to: BlockIndex) -> Result<(), GraphError> {
        let to_target = self.block_target(to);
        let outputs = self.header(from).outputs.clone();
        let first = outputs.iter().position(|x| {
            to_target == BlockTarget::Neutral || to_target.intersects(self.point(*x).target)
        });

        let Some(first) = first else {
            return Err(self.no_compatible_connection(from, to));
        };

        for output in outputs[first..].iter().copied() {
            let output_type = self.point_type(output);
            let candidate = self.header(to).inputs.iter().copied().find(|x| {
                let input = self.point(*x);
                !input.is_connected()
                    && (input.inner_type == ConnectionPointType::AutoDetect
                        || output_type.is_equivalent(self.point_type(*x))
                        || input.accepted_types.contains(&output_type))
            });

            if let Some(input) = candidate {
                if self.can_connect(output, input) {
                    return self.connect(output, input);
                }
            }
        }

        Err(self.no_compatible_connection(from, to))
    }

    fn no_compatible_connection(&self, from: BlockIndex, to: BlockIndex) -> GraphError {
        GraphError::NoCompatibleConnection(
            self.header(from).name.clone(),
            self.header(to).name.clone(),
        )
    }

    pub fn disconnect(&mut self, output: PointIndex, input: PointIndex) {
        let Some(position) = self.point(output).endpoints.iter().position(|x| *x == input) else {
            return;
        };

        let source = self.point_mut(output);
        source.endpoints.remove(position);
        source.enforce_associated_variable_name = false;

        let endpoint = self.point_mut(input);
        endpoint.connected_point = None;
        endpoint.enforce_associated_variable_name = false;
    }

    pub fn disconnect_input(&mut self, input: PointIndex) {
        if let Some(output) = self.point(input).connected_point {
            self.disconnect(output, input);
        }
    }

    fn check_direction(&self, output: PointIndex, input: PointIndex) -> Result<(), GraphError> {
        if self.point(output).is_output() && self.point(input).is_input() {
            Ok(())
        } else {
            Err(ConnectionError::InvalidDirection(
                self.qualified_name(output),
                self.qualified_name(input),
            )
            .into())
        }
    }

    fn link(&mut self, output: PointIndex, input: PointIndex) {
        self.disconnect_input(input);

        let source = self.point_mut(output);
        source.endpoints.push(input);
        source.enforce_associated_variable_name = false;
        self.point_mut(input).connected_point = Some(output);

        let source_owner = self.point(output).owner;
        let output_name = self.point(output).name.clone();
        let block_name = self.header(source_owner).name.clone();
        let is_input_block = self.block(source_owner).is_input();
        let input_point = self.point(input);
        let (input_owner, input_name) = (input_point.owner, input_point.name.clone());

        self.block_mut(input_owner).input_connected(
            &input_name,
            &ConnectedSource {
                block_name: &block_name,
                output_name: &output_name,
                is_input_block,
            },
        );
    }

    /// Blocks reachable upstream from `roots`, each listed once, roots first.
    pub fn upstream_blocks(&self, roots: &[BlockIndex]) -> Vec<BlockIndex> {
        let mut visited = vec![false; self.blocks.len()];
        let mut order = Vec::new();
        let mut stack: Vec<BlockIndex> = roots.iter().rev().copied().collect();

        while let Some(block) = stack.pop() {
            if std::mem::replace(&mut visited[usize::from(block)], true) {
                continue;
            }
            order.push(block);

            for input in self.header(block).inputs.iter().rev() {
                if let Some(connected) = self.point(*input).connected_point {
                    stack.push(self.point(connected).owner);
                }
            }
        }

        order
    }
}
