use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    BlockConstructor, BlockIndex, CompileError, GraphError, NodeMaterial, NodeMaterialBlock,
    NodeMaterialOptions,
};


#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("missing block builder: {0:?}")]
    MissingBlockBuilder(String),
    #[error("block initialization failed: {0:?}")]
    BlockInitializationFailed(String, anyhow::Error),
    #[error("unknown block id: {0}")]
    UnknownBlockId(Uuid),
    #[error("duplicate block id: {0}")]
    DuplicateBlockId(Uuid),
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("invalid output node: {0}")]
    OutputNode(#[from] CompileError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedInput {
    pub input_name: String,
    pub target_block_id: Uuid,
    pub target_connection_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedBlock {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comments: String,
    pub custom_type: String,
    #[serde(default)]
    pub settings: Value,
    /// Connected inputs only.
    #[serde(default)]
    pub inputs: Vec<SerializedInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedNodeMaterial {
    pub name: String,
    #[serde(default)]
    pub options: NodeMaterialOptions,
    pub blocks: Vec<SerializedBlock>,
    pub output_nodes: Vec<Uuid>,
}

pub trait BlockBuilder {
    fn create(&self, name: &str, settings: Value) -> anyhow::Result<Box<dyn NodeMaterialBlock>>;
}

pub struct BlockConstructorMarker<T: BlockConstructor>(PhantomData<T>);

impl<T: BlockConstructor> BlockBuilder for BlockConstructorMarker<T> {
    fn create(&self, _name: &str, settings: Value) -> anyhow::Result<Box<dyn NodeMaterialBlock>> {
        let block: T = serde_json::from_value(settings)?;
        Ok(Box::new(block))
    }
}

/// Block constructors keyed by class name.
#[derive(Default, Clone)]
pub struct BlockRegistry {
    pub builders: HashMap<String, Arc<dyn BlockBuilder>>,
}

impl BlockRegistry {
    pub fn add(&mut self, name: &str, builder: Arc<dyn BlockBuilder>) {
        self.builders.insert(name.to_owned(), builder);
    }

    pub fn register<T: BlockConstructor>(&mut self) {
        self.add(
            T::identity(),
            Arc::new(BlockConstructorMarker::<T>(PhantomData)),
        )
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    pub fn create(
        &self,
        name: &str,
        settings: Value,
    ) -> Result<Box<dyn NodeMaterialBlock>, SerializationError> {
        let builder = self
            .builders
            .get(name)
            .ok_or_else(|| SerializationError::MissingBlockBuilder(name.to_owned()))?;

        builder
            .create(name, settings)
            .map_err(|err| SerializationError::BlockInitializationFailed(name.to_owned(), err))
    }
}

impl NodeMaterial {
    pub fn serialize(&self) -> Result<SerializedNodeMaterial, SerializationError> {
        let graph = self.graph();
        let mut blocks = Vec::with_capacity(graph.len());

        for index in graph.block_indices() {
            let header = graph.header(index);
            let block = graph.block(index);

            let mut inputs = Vec::new();
            for &input in header.inputs.iter() {
                let point = graph.point(input);
                let Some(connected) = point.connected_point() else {
                    continue;
                };

                let source = graph.point(connected);
                inputs.push(SerializedInput {
                    input_name: point.name.clone(),
                    target_block_id: graph.header(source.owner).id,
                    target_connection_name: source.name.clone(),
                });
            }

            blocks.push(SerializedBlock {
                id: header.id,
                name: header.name.clone(),
                comments: header.comments.clone(),
                custom_type: block.class_name().to_owned(),
                settings: block.settings()?,
                inputs,
            });
        }

        Ok(SerializedNodeMaterial {
            name: self.name.clone(),
            options: self.options.clone(),
            blocks,
            output_nodes: self
                .output_nodes()
                .map(|x| graph.header(x).id)
                .collect(),
        })
    }

    /// Rebuilds a material, block ids are preserved. The result still needs a [`NodeMaterial::build`].
    pub fn deserialize(
        serialized: &SerializedNodeMaterial,
        registry: &BlockRegistry,
    ) -> Result<NodeMaterial, SerializationError> {
        let mut material = NodeMaterial::with_options(&serialized.name, serialized.options.clone());
        let graph = material.graph_mut();

        let mut ids: HashMap<Uuid, BlockIndex> = HashMap::with_capacity(serialized.blocks.len());
        for block in serialized.blocks.iter() {
            if ids.contains_key(&block.id) {
                return Err(SerializationError::DuplicateBlockId(block.id));
            }

            let instance = registry.create(&block.custom_type, block.settings.clone())?;
            let index = graph.add_boxed_block(block.id, &block.name, instance)?;
            graph.header_mut(index).comments = block.comments.clone();
            ids.insert(block.id, index);
        }

        let lookup = |id: &Uuid| {
            ids.get(id)
                .copied()
                .ok_or(SerializationError::UnknownBlockId(*id))
        };

        for block in serialized.blocks.iter() {
            let index = lookup(&block.id)?;
            for input in block.inputs.iter() {
                let source = lookup(&input.target_block_id)?;
                let output = graph.output(source, &input.target_connection_name)?;
                let input = graph.input(index, &input.input_name)?;
                graph.connect_unchecked(output, input)?;
            }
        }

        for id in serialized.output_nodes.iter() {
            let index = lookup(id)?;
            material.add_output_node(index)?;
        }

        Ok(material)
    }

    pub fn to_json(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string_pretty(&self.serialize()?)?)
    }

    pub fn from_json(json: &str, registry: &BlockRegistry) -> Result<NodeMaterial, SerializationError> {
        let serialized: SerializedNodeMaterial = serde_json::from_str(json)?;
        Self::deserialize(&serialized, registry)
    }
}
