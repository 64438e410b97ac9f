use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    BlockBuildError, BlockConstructor, BlockRegistration, BlockTarget, BuildContext,
    ConnectionPointType, NodeMaterialBlock,
};

const DERIVATIVES_EXTENSION: &str = "#extension GL_OES_standard_derivatives : enable";

/// Screen space derivatives of the input.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DerivativeBlock {}

impl BlockConstructor for DerivativeBlock {
    fn identity() -> &'static str {
        "DerivativeBlock"
    }
}

impl NodeMaterialBlock for DerivativeBlock {
    fn class_name(&self) -> &'static str {
        Self::identity()
    }

    fn register(&self, registration: &mut BlockRegistration) {
        use ConnectionPointType::*;
        registration.input("input", AutoDetect).excludes(&[Matrix, Matrix3x3, Matrix2x2, Texture]);
        registration.output("dx", BasedOnInput).type_from("input");
        registration.output("dy", BasedOnInput).type_from("input");
    }

    fn target(&self) -> BlockTarget {
        BlockTarget::Fragment
    }

    fn build_block(&mut self, context: &mut BuildContext<'_>) -> Result<(), BlockBuildError> {
        let input = context.input("input")?;
        let value = context.variable(input);

        context.emit_extension("derivatives", DERIVATIVES_EXTENSION, None);

        for (name, function) in [("dx", "dFdx"), ("dy", "dFdy")] {
            let output = context.output(name)?;
            if context.has_endpoints(output) {
                let code = format!("{} = {function}({value});\n", context.declare_output(output)?);
                context.append(&code);
            }
        }

        Ok(())
    }

    fn settings(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
