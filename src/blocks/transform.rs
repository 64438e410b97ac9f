use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    write_float, BlockBuildError, BlockConstructor, BlockRegistration, BlockTarget, BuildContext,
    ConnectedSource, ConnectionPointType, NodeMaterialBlock,
};

/// Multiplies a vector by a matrix, completing it to a `vec4` first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformBlock {
    pub complement_w: f32,
    pub complement_z: f32,
}

impl Default for TransformBlock {
    fn default() -> Self {
        Self {
            complement_w: 1.0,
            complement_z: 0.0,
        }
    }
}

impl BlockConstructor for TransformBlock {
    fn identity() -> &'static str {
        "TransformBlock"
    }
}

impl NodeMaterialBlock for TransformBlock {
    fn class_name(&self) -> &'static str {
        Self::identity()
    }

    fn register(&self, registration: &mut BlockRegistration) {
        use ConnectionPointType::*;
        registration
            .input("vector", AutoDetect)
            .excludes(&[Float, Int, Matrix, Matrix3x3, Matrix2x2, Texture]);
        registration.input("transform", Matrix);
        registration.output("output", Vector4);
        registration.output("xyz", Vector3);
    }

    fn target(&self) -> BlockTarget {
        BlockTarget::Neutral
    }

    fn input_connected(&mut self, input: &str, source: &ConnectedSource<'_>) {
        // Directions are not translated.
        if input == "vector"
            && source.is_input_block
            && matches!(source.block_name, "normal" | "tangent")
        {
            self.complement_w = 0.0;
        }
    }

    fn build_block(&mut self, context: &mut BuildContext<'_>) -> Result<(), BlockBuildError> {
        let vector = context.input("vector")?;
        let transform = context.input("transform")?;
        let output = context.output("output")?;
        let xyz = context.output("xyz")?;

        let Some(vector_type) = context.connected_type(vector) else {
            return Ok(());
        };

        let matrix = context.variable(transform);
        let value = context.variable(vector);
        let expression = match vector_type {
            ConnectionPointType::Vector2 => format!(
                "{matrix} * vec4({value}, {}, {})",
                write_float(self.complement_z),
                write_float(self.complement_w)
            ),
            ConnectionPointType::Vector3 | ConnectionPointType::Color3 => {
                format!("{matrix} * vec4({value}, {})", write_float(self.complement_w))
            }
            _ => format!("{matrix} * {value}"),
        };

        let mut code = String::new();
        if context.has_endpoints(output) {
            code += &format!("{} = {expression};\n", context.declare_output(output)?);
            if context.has_endpoints(xyz) {
                code += &format!(
                    "{} = {}.xyz;\n",
                    context.declare_output(xyz)?,
                    context.variable(output)
                );
            }
        } else if context.has_endpoints(xyz) {
            code += &format!("{} = ({expression}).xyz;\n", context.declare_output(xyz)?);
        }

        context.append(&code);
        Ok(())
    }

    fn settings(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
