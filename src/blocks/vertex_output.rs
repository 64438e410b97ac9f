use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    BlockBuildError, BlockConstructor, BlockRegistration, BlockTarget, BuildContext,
    ConnectionPointType, NodeMaterialBlock,
};

/// Writes `gl_Position`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct VertexOutputBlock {}

impl BlockConstructor for VertexOutputBlock {
    fn identity() -> &'static str {
        "VertexOutputBlock"
    }
}

impl NodeMaterialBlock for VertexOutputBlock {
    fn class_name(&self) -> &'static str {
        Self::identity()
    }

    fn register(&self, registration: &mut BlockRegistration) {
        registration.input("vector", ConnectionPointType::Vector4);
    }

    fn target(&self) -> BlockTarget {
        BlockTarget::Vertex
    }

    fn is_final_merger(&self) -> bool {
        true
    }

    fn build_block(&mut self, context: &mut BuildContext<'_>) -> Result<(), BlockBuildError> {
        let vector = context.input("vector")?;
        let code = format!("gl_Position = {};\n", context.variable(vector));
        context.append(&code);
        Ok(())
    }

    fn settings(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
