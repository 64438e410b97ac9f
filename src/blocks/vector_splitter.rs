use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    BlockBuildError, BlockConstructor, BlockRegistration, BlockTarget, BuildContext,
    ConnectionPointType, NodeMaterialBlock,
};

/// Splits the widest connected vector into swizzles and components.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct VectorSplitterBlock {}

const COMPONENTS: [&str; 4] = ["x", "y", "z", "w"];

impl BlockConstructor for VectorSplitterBlock {
    fn identity() -> &'static str {
        "VectorSplitterBlock"
    }
}

impl NodeMaterialBlock for VectorSplitterBlock {
    fn class_name(&self) -> &'static str {
        Self::identity()
    }

    fn register(&self, registration: &mut BlockRegistration) {
        use ConnectionPointType::*;
        registration.optional_input("xyzw", Vector4).accepts(&[Color4]);
        registration.optional_input("xyzIn", Vector3).accepts(&[Color3]);
        registration.optional_input("xyIn", Vector2);
        registration.output("xyz", Vector3);
        registration.output("xy", Vector2);
        registration.output("zw", Vector2);
        registration.output("x", Float);
        registration.output("y", Float);
        registration.output("z", Float);
        registration.output("w", Float);
    }

    fn target(&self) -> BlockTarget {
        BlockTarget::VertexAndFragment
    }

    fn build_block(&mut self, context: &mut BuildContext<'_>) -> Result<(), BlockBuildError> {
        let xyzw = context.input("xyzw")?;
        let xyz_in = context.input("xyzIn")?;
        let xy_in = context.input("xyIn")?;

        let input = [xyzw, xyz_in, xy_in]
            .into_iter()
            .find(|x| context.is_connected(*x));
        let Some(input) = input else {
            context.report_missing_input(xyzw);
            return Ok(());
        };
        let value = context.variable(input);

        let mut code = String::new();
        let xyz = context.output("xyz")?;
        if context.has_endpoints(xyz) {
            let expression = if input == xy_in {
                format!("vec3({value}, 0.0)")
            } else {
                format!("{value}.xyz")
            };
            code += &format!("{} = {expression};\n", context.declare_output(xyz)?);
        }

        let zw = context.output("zw")?;
        if input == xyzw && context.has_endpoints(zw) {
            code += &format!("{} = {value}.zw;\n", context.declare_output(zw)?);
        }

        let xy = context.output("xy")?;
        if context.has_endpoints(xy) {
            code += &format!("{} = {value}.xy;\n", context.declare_output(xy)?);
        }

        for component in COMPONENTS {
            let output = context.output(component)?;
            if context.has_endpoints(output) {
                code += &format!(
                    "{} = {value}.{component};\n",
                    context.declare_output(output)?
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
