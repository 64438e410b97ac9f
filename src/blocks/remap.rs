use glam::Vec2;
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    write_float, BlockBuildError, BlockConstructor, BlockRegistration, BlockTarget, BuildContext,
    ConnectionPointType, NodeMaterialBlock,
};

/// Linear remap from the source range to the target range. Connected bounds override the
/// configured ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemapBlock {
    pub source_range: Vec2,
    pub target_range: Vec2,
}

impl Default for RemapBlock {
    fn default() -> Self {
        Self {
            source_range: Vec2::new(-1.0, 1.0),
            target_range: Vec2::new(0.0, 1.0),
        }
    }
}

impl BlockConstructor for RemapBlock {
    fn identity() -> &'static str {
        "RemapBlock"
    }
}

impl NodeMaterialBlock for RemapBlock {
    fn class_name(&self) -> &'static str {
        Self::identity()
    }

    fn register(&self, registration: &mut BlockRegistration) {
        use ConnectionPointType::*;
        registration.input("input", AutoDetect);
        registration.optional_input("sourceMin", Float);
        registration.optional_input("sourceMax", Float);
        registration.optional_input("targetMin", Float);
        registration.optional_input("targetMax", Float);
        registration.output("output", BasedOnInput).type_from("input");
    }

    fn target(&self) -> BlockTarget {
        BlockTarget::Neutral
    }

    fn build_block(&mut self, context: &mut BuildContext<'_>) -> Result<(), BlockBuildError> {
        let input = context.input("input")?;
        let output = context.output("output")?;

        let source_min = bound(context, "sourceMin", self.source_range.x)?;
        let source_max = bound(context, "sourceMax", self.source_range.y)?;
        let target_min = bound(context, "targetMin", self.target_range.x)?;
        let target_max = bound(context, "targetMax", self.target_range.y)?;

        let code = format!(
            "{} = {target_min} + ({} - {source_min}) * ({target_max} - {target_min}) / ({source_max} - {source_min});\n",
            context.declare_output(output)?,
            context.variable(input),
        );
        context.append(&code);
        Ok(())
    }

    fn settings(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

fn bound(context: &BuildContext<'_>, name: &str, value: f32) -> Result<String, BlockBuildError> {
    let input = context.input(name)?;
    Ok(context.variable_or(input, &write_float(value)))
}
