use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    BlockBuildError, BlockConstructor, BlockRegistration, BlockTarget, BuildContext,
    ConnectionPointType, NodeMaterialBlock,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MathOperation {
    #[default]
    Add,
    Subtract,
    Multiply,
    Divide,
    Min,
    Max,
}

impl MathOperation {
    fn expression(self, left: &str, right: &str) -> String {
        match self {
            MathOperation::Add => format!("{left} + {right}"),
            MathOperation::Subtract => format!("{left} - {right}"),
            MathOperation::Multiply => format!("{left} * {right}"),
            MathOperation::Divide => format!("{left} / {right}"),
            MathOperation::Min => format!("min({left}, {right})"),
            MathOperation::Max => format!("max({left}, {right})"),
        }
    }
}

/// Binary operator on two values of the same type. The output takes the type of `left`.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MathBlock {
    pub operation: MathOperation,
}

impl MathBlock {
    pub fn new(operation: MathOperation) -> Self {
        Self { operation }
    }
}

impl BlockConstructor for MathBlock {
    fn identity() -> &'static str {
        "MathBlock"
    }
}

impl NodeMaterialBlock for MathBlock {
    fn class_name(&self) -> &'static str {
        Self::identity()
    }

    fn register(&self, registration: &mut BlockRegistration) {
        use ConnectionPointType::*;
        registration
            .input("left", AutoDetect)
            .linked_to("right")
            .excludes(&[Texture]);
        registration
            .input("right", AutoDetect)
            .linked_to("left")
            .excludes(&[Texture]);
        registration.output("output", BasedOnInput).type_from("left");
    }

    fn target(&self) -> BlockTarget {
        BlockTarget::Neutral
    }

    fn build_block(&mut self, context: &mut BuildContext<'_>) -> Result<(), BlockBuildError> {
        let left = context.input("left")?;
        let right = context.input("right")?;
        let output = context.output("output")?;

        let expression = self
            .operation
            .expression(&context.variable(left), &context.variable(right));
        let code = format!("{} = {expression};\n", context.declare_output(output)?);
        context.append(&code);
        Ok(())
    }

    fn settings(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
