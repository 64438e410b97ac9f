use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    BlockBuildError, BlockConstructor, BlockRegistration, BlockTarget, BuildContext,
    ConnectionPointType, NodeMaterialBlock,
};

/// Assembles a color from `rgbIn` or from separate channels. Open channels read `0.0`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ColorMergerBlock {}

impl BlockConstructor for ColorMergerBlock {
    fn identity() -> &'static str {
        "ColorMergerBlock"
    }
}

impl NodeMaterialBlock for ColorMergerBlock {
    fn class_name(&self) -> &'static str {
        Self::identity()
    }

    fn register(&self, registration: &mut BlockRegistration) {
        use ConnectionPointType::*;
        registration.optional_input("rgbIn", Color3);
        registration.optional_input("r", Float);
        registration.optional_input("g", Float);
        registration.optional_input("b", Float);
        registration.optional_input("a", Float);
        registration.output("rgba", Color4);
        registration.output("rgb", Color3);
    }

    fn target(&self) -> BlockTarget {
        BlockTarget::Neutral
    }

    fn build_block(&mut self, context: &mut BuildContext<'_>) -> Result<(), BlockBuildError> {
        let rgb_in = context.input("rgbIn")?;
        let rgba_output = context.output("rgba")?;
        let rgb_output = context.output("rgb")?;

        let a = channel(context, "a")?;

        let mut code = String::new();
        if context.is_connected(rgb_in) {
            let rgb = context.variable(rgb_in);
            if context.has_endpoints(rgba_output) {
                code += &format!(
                    "{} = vec4({rgb}, {a});\n",
                    context.declare_output(rgba_output)?
                );
            }
            if context.has_endpoints(rgb_output) {
                code += &format!("{} = {rgb};\n", context.declare_output(rgb_output)?);
            }
        } else {
            let r = channel(context, "r")?;
            let g = channel(context, "g")?;
            let b = channel(context, "b")?;
            if context.has_endpoints(rgba_output) {
                code += &format!(
                    "{} = vec4({r}, {g}, {b}, {a});\n",
                    context.declare_output(rgba_output)?
                );
            }
            if context.has_endpoints(rgb_output) {
                code += &format!(
                    "{} = vec3({r}, {g}, {b});\n",
                    context.declare_output(rgb_output)?
                );
            }
        }

        context.append(&code);
        Ok(())
    }

    fn settings(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

fn channel(context: &BuildContext<'_>, name: &str) -> Result<String, BlockBuildError> {
    let input = context.input(name)?;
    Ok(context.variable_or(input, "0.0"))
}
