use std::fmt::Write;

use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    vertex_kind, AutoConnection, AutoSource, BlockBuildError, BlockConstructor, BlockList,
    BlockRegistration, BlockTarget, BuildContext, ConnectionPointType, EffectBinder,
    EffectFallbacks, MeshProvider, NodeMaterialBlock, NodeMaterialDefines, SceneProvider,
    SystemValue,
};

const BONES_UNIFORM: &str = "mBones";
const BONES_DECLARATION: &str =
    "#if NUM_BONE_INFLUENCERS > 0\nuniform mat4 mBones[BonesPerMesh];\n#endif\n";

/// Skinned world matrix. Falls back to `world` when the mesh has no bone influencers.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BonesBlock {}

fn skinning(mesh: &dyn MeshProvider) -> Option<(u32, usize)> {
    let influencers = mesh.num_bone_influencers();
    match mesh.bone_matrices() {
        Some(bones) if influencers > 0 => Some((influencers, bones.len())),
        _ => None,
    }
}

impl BlockConstructor for BonesBlock {
    fn identity() -> &'static str {
        "BonesBlock"
    }
}

impl NodeMaterialBlock for BonesBlock {
    fn class_name(&self) -> &'static str {
        Self::identity()
    }

    fn register(&self, registration: &mut BlockRegistration) {
        use ConnectionPointType::*;
        registration.input("matricesIndices", Vector4);
        registration.input("matricesWeights", Vector4);
        registration.optional_input("matricesIndicesExtra", Vector4);
        registration.optional_input("matricesWeightsExtra", Vector4);
        registration.input("world", Matrix);
        registration.output("output", Matrix);
    }

    fn target(&self) -> BlockTarget {
        BlockTarget::Vertex
    }

    fn auto_configure(&self) -> Vec<AutoConnection> {
        vec![
            AutoConnection {
                input: "matricesIndices",
                source: AutoSource::Attribute(vertex_kind::MATRICES_INDICES),
            },
            AutoConnection {
                input: "matricesWeights",
                source: AutoSource::Attribute(vertex_kind::MATRICES_WEIGHTS),
            },
            AutoConnection {
                input: "world",
                source: AutoSource::SystemValue(SystemValue::World),
            },
        ]
    }

    fn build_block(&mut self, context: &mut BuildContext<'_>) -> Result<(), BlockBuildError> {
        let indices = context.input("matricesIndices")?;
        let weights = context.input("matricesWeights")?;
        let indices_extra = context.input("matricesIndicesExtra")?;
        let weights_extra = context.input("matricesWeightsExtra")?;
        let world = context.input("world")?;
        let output = context.output("output")?;

        context.register(BlockList::Fallbacks);
        context.register(BlockList::Bindable);
        context.register(BlockList::Defines);

        if !context.state.uniforms.iter().any(|x| x == BONES_UNIFORM) {
            context.state.uniforms.push(BONES_UNIFORM.to_owned());
        }
        context.emit_function("bonesDeclaration", BONES_DECLARATION, "");

        let influence = context.free_variable_name("influence");
        let world = context.variable(world);
        let output_name = context.variable(output);
        let mut sources = vec![(context.variable(indices), context.variable(weights))];
        if context.is_connected(indices_extra) && context.is_connected(weights_extra) {
            sources.push((context.variable(indices_extra), context.variable(weights_extra)));
        }

        let mut code = format!(
            "{} = {world};\n#if NUM_BONE_INFLUENCERS > 0\nmat4 {influence};\n",
            context.declare_output(output)?
        );
        for (set, (indices, weights)) in sources.iter().enumerate() {
            for component in 0..4 {
                let rank = set * 4 + component;
                let line = format!("mBones[int({indices}[{component}])] * {weights}[{component}]");
                if rank == 0 {
                    let _ = writeln!(code, "{influence} = {line};");
                } else {
                    let _ = write!(
                        code,
                        "#if NUM_BONE_INFLUENCERS > {rank}\n{influence} += {line};\n#endif\n"
                    );
                }
            }
        }
        let _ = write!(code, "{output_name} = {world} * {influence};\n#endif\n");

        context.append(&code);
        Ok(())
    }

    fn initialize_defines(
        &self,
        _mesh: &dyn MeshProvider,
        defines: &mut NodeMaterialDefines,
        _use_instances: bool,
    ) {
        defines.set_int("NUM_BONE_INFLUENCERS", 0);
        defines.set_int("BonesPerMesh", 0);
    }

    fn prepare_defines(
        &self,
        mesh: &dyn MeshProvider,
        _scene: &dyn SceneProvider,
        defines: &mut NodeMaterialDefines,
        _use_instances: bool,
    ) {
        let (influencers, bones) = skinning(mesh).map_or((0, 0), |(x, bones)| (x, bones + 1));
        defines.set_int("NUM_BONE_INFLUENCERS", influencers as i32);
        defines.set_int("BonesPerMesh", bones as i32);
    }

    fn provide_fallbacks(&self, mesh: &dyn MeshProvider, fallbacks: &mut EffectFallbacks) {
        if let Some((influencers, _)) = skinning(mesh) {
            fallbacks.add_cpu_skinning_fallback(0, influencers);
        }
    }

    fn bind(
        &self,
        effect: &mut dyn EffectBinder,
        _scene: &dyn SceneProvider,
        mesh: &dyn MeshProvider,
    ) {
        if let Some(bones) = mesh.bone_matrices() {
            effect.set_matrices(BONES_UNIFORM, &bones);
        }
    }

    fn settings(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
