use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    BlockBuildError, BlockConstructor, BlockRegistration, BlockTarget, BuildContext,
    ConnectionPointType, NodeMaterialBlock,
};

/// Writes `gl_FragColor` from `rgba`, or from `rgb` and `a`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FragmentOutputBlock {}

impl BlockConstructor for FragmentOutputBlock {
    fn identity() -> &'static str {
        "FragmentOutputBlock"
    }
}

impl NodeMaterialBlock for FragmentOutputBlock {
    fn class_name(&self) -> &'static str {
        Self::identity()
    }

    fn register(&self, registration: &mut BlockRegistration) {
        use ConnectionPointType::*;
        registration.optional_input("rgba", Color4);
        registration.optional_input("rgb", Color3).accepts(&[Float]);
        registration.optional_input("a", Float);
    }

    fn target(&self) -> BlockTarget {
        BlockTarget::Fragment
    }

    fn is_final_merger(&self) -> bool {
        true
    }

    fn build_block(&mut self, context: &mut BuildContext<'_>) -> Result<(), BlockBuildError> {
        let rgba = context.input("rgba")?;
        let rgb = context.input("rgb")?;
        let a = context.input("a")?;

        context.shared.hints.need_alpha_blending =
            context.is_connected(rgba) || context.is_connected(a);

        let code = if context.is_connected(rgba) {
            if context.is_connected(a) {
                format!(
                    "gl_FragColor = vec4({}.rgb, {});\n",
                    context.variable(rgba),
                    context.variable(a)
                )
            } else {
                format!("gl_FragColor = {};\n", context.variable(rgba))
            }
        } else if context.is_connected(rgb) {
            let alpha = context.variable_or(a, "1.0");
            let color = context.variable(rgb);
            if context.connected_type(rgb) == Some(ConnectionPointType::Float) {
                format!("gl_FragColor = vec4({color}, {color}, {color}, {alpha});\n")
            } else {
                format!("gl_FragColor = vec4({color}, {alpha});\n")
            }
        } else {
            context.report_missing_input(rgba);
            return Ok(());
        };

        context.append(&code);
        Ok(())
    }

    fn settings(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
