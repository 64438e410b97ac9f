use std::collections::HashMap;

use glam::{Mat4, Vec2, Vec3, Vec4};
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use super::*;
use crate::{
    AnimatedInputType, BlockConstructor, BlockRegistration, BonesBlock, ConnectionPointType,
    Diagnostic, LightInfo, LightInformationBlock, LightKind, MathBlock, MathOperation,
    NodeMaterialBlock, TextureBlock, TextureReference, VectorSplitterBlock,
};

#[derive(Default)]
struct TestMesh {
    kinds: Vec<&'static str>,
    world: Mat4,
    influencers: u32,
    bones: Option<Vec<Mat4>>,
}

impl MeshProvider for TestMesh {
    fn is_vertices_data_present(&self, kind: &str) -> bool {
        self.kinds.iter().any(|x| *x == kind)
    }

    fn world_matrix(&self) -> Mat4 {
        self.world
    }

    fn num_bone_influencers(&self) -> u32 {
        self.influencers
    }

    fn bone_matrices(&self) -> Option<Vec<Mat4>> {
        self.bones.clone()
    }
}

struct TestScene {
    view: Mat4,
    projection: Mat4,
    ratio: f32,
    lights: Vec<LightInfo>,
}

impl Default for TestScene {
    fn default() -> Self {
        Self {
            view: Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)),
            projection: Mat4::perspective_rh_gl(1.0, 1.5, 0.1, 100.0),
            ratio: 1.0,
            lights: Vec::new(),
        }
    }
}

impl SceneProvider for TestScene {
    fn view_matrix(&self) -> Mat4 {
        self.view
    }

    fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    fn camera_position(&self) -> Vec3 {
        Vec3::new(0.0, 0.0, 5.0)
    }

    fn animation_ratio(&self) -> f32 {
        self.ratio
    }

    fn lights(&self) -> &[LightInfo] {
        &self.lights
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Recorded {
    Float(f32),
    Int(i32),
    Vector(Vec4),
    Matrix(Mat4),
    Matrices(usize),
    Texture(String),
}

#[derive(Default)]
struct RecordingEffect {
    values: HashMap<String, Recorded>,
}

impl EffectBinder for RecordingEffect {
    fn set_float(&mut self, name: &str, value: f32) {
        self.values.insert(name.to_owned(), Recorded::Float(value));
    }

    fn set_int(&mut self, name: &str, value: i32) {
        self.values.insert(name.to_owned(), Recorded::Int(value));
    }

    fn set_vector2(&mut self, name: &str, value: Vec2) {
        self.set_vector4(name, value.extend(0.0).extend(0.0));
    }

    fn set_vector3(&mut self, name: &str, value: Vec3) {
        self.set_vector4(name, value.extend(0.0));
    }

    fn set_vector4(&mut self, name: &str, value: Vec4) {
        self.values.insert(name.to_owned(), Recorded::Vector(value));
    }

    fn set_color3(&mut self, name: &str, value: Vec3) {
        self.set_vector3(name, value);
    }

    fn set_color4(&mut self, name: &str, value: Vec4) {
        self.set_vector4(name, value);
    }

    fn set_matrix(&mut self, name: &str, value: Mat4) {
        self.values.insert(name.to_owned(), Recorded::Matrix(value));
    }

    fn set_matrices(&mut self, name: &str, value: &[Mat4]) {
        self.values
            .insert(name.to_owned(), Recorded::Matrices(value.len()));
    }

    fn set_texture(&mut self, name: &str, texture: &TextureReference) {
        self.values
            .insert(name.to_owned(), Recorded::Texture(texture.url.clone()));
    }
}

fn default_material() -> NodeMaterial {
    let mut material = NodeMaterial::new("test");
    material.set_to_default().unwrap();
    material
}

fn fragment_output(material: &NodeMaterial) -> BlockIndex {
    material.fragment_output_nodes()[0]
}

/// Detaches the default color so the test can wire its own fragment graph.
fn detach_color(material: &mut NodeMaterial) -> BlockIndex {
    let fragment = fragment_output(material);
    let graph = material.graph_mut();
    let rgba = graph.input(fragment, "rgba").unwrap();
    graph.disconnect_input(rgba);
    fragment
}

fn prepare(
    material: &NodeMaterial,
    mesh: &TestMesh,
    scene: &TestScene,
    defines: &mut NodeMaterialDefines,
) -> EffectCreationOptions {
    match material.prepare_effect(mesh, scene, defines, false).unwrap() {
        EffectPreparation::Create(options) => *options,
        other => panic!("expected new effect options, got {other:?}"),
    }
}

#[test]
fn test_missing_output_nodes() {
    let mut material = NodeMaterial::new("empty");
    assert_eq!(material.build(), Err(CompileError::MissingVertexOutputNode));

    let vertex = material
        .graph_mut()
        .add_block("vertex", VertexOutputBlock::default())
        .unwrap();
    material.add_output_node(vertex).unwrap();
    assert_eq!(material.build(), Err(CompileError::MissingFragmentOutputNode));
    assert!(!material.is_compiled());
}

#[test]
fn test_neutral_block_is_not_an_output_node() {
    let mut material = NodeMaterial::new("test");
    let math = material
        .graph_mut()
        .add_block("add", MathBlock::default())
        .unwrap();

    assert_eq!(
        material.add_output_node(math),
        Err(CompileError::InvalidOutputNode("add".to_owned()))
    );
}

#[test]
fn test_default_material() {
    let mut material = default_material();
    material.build().unwrap();

    let vertex = material.vertex_shader().unwrap();
    let fragment = material.fragment_shader().unwrap();

    assert!(vertex.contains("attribute vec3 position;\n"), "{vertex}");
    assert!(vertex.contains("uniform mat4 u_World;\n"));
    assert!(vertex.contains("uniform mat4 u_ViewProjection;\n"));
    assert!(vertex.contains("vec4 output2 = u_World * vec4(position, 1.000000);\n"));
    assert!(vertex.contains("vec4 output1 = u_ViewProjection * output2;\n"));
    assert!(vertex.ends_with("gl_Position = output1;\n}\n"));

    assert!(fragment.contains("uniform vec4 u_color;\n"), "{fragment}");
    assert!(fragment.contains("gl_FragColor = u_color;\n"));
    assert!(!fragment.contains("attribute"));

    // Unused outputs are never declared.
    assert!(!vertex.contains("xyz"));

    let compiled = material.compiled().unwrap();
    assert_eq!(compiled.attributes(), &["position".to_owned()]);
    assert_eq!(
        compiled.uniforms(),
        vec!["u_World", "u_ViewProjection", "u_color"]
    );
    assert!(material.need_alpha_blending());
}

#[test]
fn test_dependencies_are_emitted_first() {
    let mut material = default_material();
    material.build().unwrap();

    let vertex = material.vertex_shader().unwrap();
    let world = vertex.find("vec4 output2 =").unwrap();
    let projected = vertex.find("vec4 output1 =").unwrap();
    let position = vertex.find("gl_Position").unwrap();
    assert!(world < projected && projected < position, "{vertex}");
}

#[test]
fn test_rebuild_is_deterministic() {
    let mut material = default_material();
    material.build().unwrap();
    let vertex = material.vertex_shader().unwrap().to_owned();
    let fragment = material.fragment_shader().unwrap().to_owned();

    material.build().unwrap();
    assert_eq!(material.vertex_shader().unwrap(), vertex);
    assert_eq!(material.fragment_shader().unwrap(), fragment);

    let mut copy = material.clone();
    copy.build().unwrap();
    assert_eq!(copy.vertex_shader().unwrap(), vertex);
    assert_eq!(copy.fragment_shader().unwrap(), fragment);
}

#[test]
fn test_comments() {
    let mut material = NodeMaterial::with_options(
        "commented",
        NodeMaterialOptions {
            emit_comments: true,
            ..Default::default()
        },
    );
    material.set_to_default().unwrap();
    material.build().unwrap();

    let vertex = material.vertex_shader().unwrap();
    assert!(vertex.contains("//Attributes\n"), "{vertex}");
    assert!(vertex.contains("//Entry point\n"));
    assert!(vertex.contains("\n//VertexOutput\n"));
    assert!(material.fragment_shader().unwrap().contains("\n//FragmentOutput\n"));
}

#[test]
fn test_editing_discards_compiled_output() {
    let mut material = default_material();
    material.build().unwrap();
    assert!(material.is_compiled());

    material.graph_mut();
    assert!(!material.is_compiled());
    assert_eq!(material.vertex_shader(), None);

    let fragment = fragment_output(&material);
    material.remove_output_node(fragment);
    assert_eq!(material.build(), Err(CompileError::MissingFragmentOutputNode));

    material.clear();
    assert!(material.graph().is_empty());
    assert!(material.output_nodes().next().is_none());
}

#[test]
fn test_cycle_is_reported() {
    let mut material = default_material();
    let fragment = detach_color(&mut material);
    let graph = material.graph_mut();

    let value = graph
        .add_block("value", InputBlock::uniform(InputValue::Float(1.0)))
        .unwrap();
    let first = graph.add_block("first", MathBlock::default()).unwrap();
    let second = graph.add_block("second", MathBlock::default()).unwrap();
    graph.connect_by_name(value, "output", first, "right").unwrap();
    graph.connect_by_name(value, "output", second, "right").unwrap();
    graph.connect_by_name(first, "output", fragment, "rgb").unwrap();
    // Types resolve on connect, close the loop last.
    graph.connect_by_name(second, "output", first, "left").unwrap();
    graph.connect_by_name(first, "output", second, "left").unwrap();

    assert_eq!(
        material.build(),
        Err(CompileError::CyclicGraph(vec![
            "first".to_owned(),
            "second".to_owned(),
            "first".to_owned()
        ]))
    );
    assert!(!material.is_compiled());
}

#[test]
fn test_fragment_block_in_vertex_stage() {
    let mut material = default_material();
    let graph = material.graph_mut();
    let vertex = graph.block_by_name("VertexOutput").unwrap();
    let texture = graph
        .add_block("diffuse", TextureBlock::new(TextureReference::new("diffuse.png")))
        .unwrap();

    let rgba = graph.output(texture, "rgba").unwrap();
    let vector = graph.input(vertex, "vector").unwrap();
    graph.connect_unchecked(rgba, vector).unwrap();

    assert_eq!(
        material.build(),
        Err(CompileError::TargetUnsatisfiable {
            block: "diffuse".to_owned(),
            class_name: "TextureBlock".to_owned(),
            target: BlockTarget::Fragment,
            stage: BlockTarget::Vertex,
        })
    );
}

fn diffuse_texture(graph: &mut NodeMaterialGraph) -> BlockIndex {
    graph
        .add_block("diffuse", TextureBlock::new(TextureReference::new("diffuse.png")))
        .unwrap()
}

fn diffuse_unsatisfiable() -> CompileError {
    CompileError::TargetUnsatisfiable {
        block: "diffuse".to_owned(),
        class_name: "TextureBlock".to_owned(),
        target: BlockTarget::Fragment,
        stage: BlockTarget::Vertex,
    }
}

#[test]
fn test_fragment_block_behind_hoisted_vertex_block() {
    let mut material = default_material();
    let fragment = detach_color(&mut material);
    let graph = material.graph_mut();
    let texture = diffuse_texture(graph);
    let light = graph
        .add_block("light", LightInformationBlock::new("lamp"))
        .unwrap();

    let rgba = graph.output(texture, "rgba").unwrap();
    let world_position = graph.input(light, "worldPosition").unwrap();
    graph.connect_unchecked(rgba, world_position).unwrap();
    graph.connect_by_name(light, "direction", fragment, "rgb").unwrap();

    assert_eq!(material.build(), Err(diffuse_unsatisfiable()));
    assert!(!material.is_compiled());
}

#[test]
fn test_fragment_block_shared_with_hoisted_vertex_block() {
    let mut material = default_material();
    let fragment = detach_color(&mut material);
    let graph = material.graph_mut();
    let texture = diffuse_texture(graph);
    let light = graph
        .add_block("light", LightInformationBlock::new("lamp"))
        .unwrap();

    // The texture is first reached from the fragment root, then again through the light.
    graph.connect_by_name(texture, "rgba", fragment, "rgba").unwrap();
    let rgba = graph.output(texture, "rgba").unwrap();
    let world_position = graph.input(light, "worldPosition").unwrap();
    graph.connect_unchecked(rgba, world_position).unwrap();
    graph.connect_by_name(light, "intensity", fragment, "a").unwrap();

    assert_eq!(material.build(), Err(diffuse_unsatisfiable()));
}

#[test]
fn test_dual_block_fed_by_fragment_block_stays_in_fragment() {
    let mut material = default_material();
    let fragment = detach_color(&mut material);
    let graph = material.graph_mut();
    let texture = diffuse_texture(graph);
    let splitter = graph.add_block("splitter", VectorSplitterBlock::default()).unwrap();
    graph.connect_by_name(texture, "rgba", splitter, "xyzw").unwrap();
    graph.connect_by_name(splitter, "xyz", fragment, "rgb").unwrap();
    material.build().unwrap();

    let vertex = material.vertex_shader().unwrap();
    assert!(!vertex.contains("texture2D"), "{vertex}");
    assert!(!vertex.contains("xyz ="));

    let fragment = material.fragment_shader().unwrap();
    assert_eq!(fragment.matches("texture2D(diffuseSampler").count(), 1, "{fragment}");
    assert!(fragment.contains("vec3 xyz = rgba.xyz;\n"));
}

#[test]
fn test_diagnostics_are_aggregated() {
    let mut material = default_material();
    let fragment = detach_color(&mut material);
    let graph = material.graph_mut();
    let transform = graph.add_block("transform", TransformBlock::default()).unwrap();
    graph.connect_by_name(transform, "output", fragment, "rgba").unwrap();

    let Err(CompileError::Compilation(err)) = material.build() else {
        panic!("expected a compilation error");
    };

    assert_eq!(
        err.diagnostics,
        vec![
            Diagnostic::MissingRequiredConnection {
                block: "transform".to_owned(),
                class_name: "TransformBlock".to_owned(),
                input: "vector".to_owned(),
            },
            Diagnostic::MissingRequiredConnection {
                block: "transform".to_owned(),
                class_name: "TransformBlock".to_owned(),
                input: "transform".to_owned(),
            },
        ]
    );
    assert!(err.to_string().starts_with("Build of NodeMaterial failed:\n"));
    assert!(!material.is_compiled());
}

#[test]
fn test_missing_fragment_output_diagnostic() {
    let mut material = default_material();
    detach_color(&mut material);

    let Err(CompileError::Compilation(err)) = material.build() else {
        panic!("expected a compilation error");
    };

    assert!(err.diagnostics.contains(&Diagnostic::MissingRequiredConnection {
        block: "FragmentOutput".to_owned(),
        class_name: "FragmentOutputBlock".to_owned(),
        input: "rgba".to_owned(),
    }));
}

#[test]
fn test_texture_attribute_goes_through_varying() {
    let mut material = default_material();
    let fragment = detach_color(&mut material);
    let graph = material.graph_mut();
    let texture = graph
        .add_block("diffuse", TextureBlock::new(TextureReference::new("diffuse.png")))
        .unwrap();
    graph.connect_by_name(texture, "rgba", fragment, "rgba").unwrap();
    material.build().unwrap();

    let vertex = material.vertex_shader().unwrap();
    let fragment = material.fragment_shader().unwrap();

    assert!(vertex.contains("attribute vec2 uv;\n"), "{vertex}");
    assert!(vertex.contains("varying vec2 v_uv;\n"));
    assert!(vertex.ends_with("v_uv = uv;\n}\n"));
    assert_eq!(vertex.matches("v_uv = uv;").count(), 1);

    assert!(fragment.contains("varying vec2 v_uv;\n"), "{fragment}");
    assert!(fragment.contains("uniform sampler2D diffuseSampler;\n"));
    assert!(fragment.contains("uniform float diffuseLevel;\n"));
    assert!(fragment.contains("#ifdef UVTRANSFORM0\nuniform mat4 diffuseTransform;\n#endif\n"));
    assert!(fragment.contains("transformedUV = v_uv.xy;\n"));
    assert!(fragment.contains("vec4 textureRead = texture2D(diffuseSampler, transformedUV);\n"));
    assert!(fragment.contains("vec4 rgba = textureRead * diffuseLevel;\n"));
    assert!(fragment.contains("gl_FragColor = rgba;\n"));
    assert!(!fragment.contains("attribute"));

    let compiled = material.compiled().unwrap();
    assert_eq!(compiled.attributes(), &["position".to_owned(), "uv".to_owned()]);
    assert_eq!(compiled.samplers(), vec!["diffuseSampler"]);
}

#[test]
fn test_auto_configure_reuses_existing_attribute() {
    let mut material = default_material();
    let fragment = detach_color(&mut material);
    let graph = material.graph_mut();
    let uv = graph.add_attribute("uv").unwrap();
    for name in ["first", "second"] {
        let texture = graph
            .add_block(name, TextureBlock::new(TextureReference::new("a.png")))
            .unwrap();
        if name == "first" {
            graph.connect_by_name(texture, "rgba", fragment, "rgba").unwrap();
        } else {
            graph.connect_by_name(texture, "a", fragment, "a").unwrap();
        }
    }
    let blocks = material.graph().len();
    material.build().unwrap();

    assert_eq!(material.graph().len(), blocks);
    let uv_output = material.graph().output(uv, "output").unwrap();
    assert_eq!(material.graph().point(uv_output).endpoints().len(), 2);

    let fragment = material.fragment_shader().unwrap();
    assert!(fragment.contains("gl_FragColor = vec4(rgba.rgb, a2);\n"), "{fragment}");
}

#[test]
fn test_prepare_effect_with_texture() {
    let mut material = default_material();
    let fragment = detach_color(&mut material);
    let graph = material.graph_mut();
    let mut reference = TextureReference::new("diffuse.png");
    reference.transform = Some(Mat4::from_scale(Vec3::new(2.0, 2.0, 1.0)));
    let texture = graph.add_block("diffuse", TextureBlock::new(reference)).unwrap();
    graph.connect_by_name(texture, "rgb", fragment, "rgb").unwrap();
    material.build().unwrap();

    let mesh = TestMesh {
        kinds: vec![vertex_kind::POSITION, vertex_kind::UV],
        ..Default::default()
    };
    let scene = TestScene::default();
    let mut defines = NodeMaterialDefines::new();

    let options = prepare(&material, &mesh, &scene, &mut defines);
    assert_eq!(options.defines, "#define UV1\n#define UVTRANSFORM0\n");
    assert_eq!(options.attributes, vec!["position", "uv"]);
    assert_eq!(options.samplers, vec!["diffuseSampler"]);
    assert!(options.uniforms.contains(&"diffuseTransform".to_owned()));
    assert_eq!(options.max_simultaneous_lights, 4);
    assert_eq!(options.vertex_source, material.vertex_shader().unwrap());
    assert!(!material.need_alpha_blending());

    assert_eq!(
        material.prepare_effect(&mesh, &scene, &mut defines, false),
        Ok(EffectPreparation::Unchanged)
    );

    let mut effect = RecordingEffect::default();
    material.bind(&mut effect, &scene, &mesh);
    assert_eq!(
        effect.values.get("diffuseSampler"),
        Some(&Recorded::Texture("diffuse.png".to_owned()))
    );
    assert_eq!(effect.values.get("diffuseLevel"), Some(&Recorded::Float(1.0)));
    assert!(matches!(
        effect.values.get("diffuseTransform"),
        Some(Recorded::Matrix(_))
    ));
}

#[test]
fn test_texture_not_ready() {
    let mut material = default_material();
    let fragment = detach_color(&mut material);
    let graph = material.graph_mut();
    let mut reference = TextureReference::new("slow.png");
    reference.is_ready = false;
    let texture = graph.add_block("slow", TextureBlock::new(reference)).unwrap();
    graph.connect_by_name(texture, "rgba", fragment, "rgba").unwrap();
    material.build().unwrap();

    let mut defines = NodeMaterialDefines::new();
    assert_eq!(
        material.prepare_effect(&TestMesh::default(), &TestScene::default(), &mut defines, false),
        Ok(EffectPreparation::NotReady)
    );
    assert!(defines.is_dirty());
}

#[test]
fn test_prepare_effect_requires_build() {
    let material = default_material();
    let mut defines = NodeMaterialDefines::new();
    assert_eq!(
        material.prepare_effect(&TestMesh::default(), &TestScene::default(), &mut defines, false),
        Err(CompileError::NotBuilt)
    );
}

#[test]
fn test_bind_default_material() {
    let mut material = default_material();
    material.build().unwrap();

    let mesh = TestMesh {
        world: Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)),
        ..Default::default()
    };
    let scene = TestScene::default();
    let mut effect = RecordingEffect::default();
    material.bind(&mut effect, &scene, &mesh);

    assert_eq!(effect.values.get("u_World"), Some(&Recorded::Matrix(mesh.world)));
    assert_eq!(
        effect.values.get("u_ViewProjection"),
        Some(&Recorded::Matrix(scene.transform_matrix()))
    );
    assert_eq!(
        effect.values.get("u_color"),
        Some(&Recorded::Vector(Vec4::new(0.8, 0.8, 0.8, 1.0)))
    );
}

#[test]
fn test_world_view_matrices() {
    let mut material = default_material();
    let graph = material.graph_mut();
    let world_pos = graph.block_by_name("WorldPos").unwrap();
    let world_view = graph
        .add_block("WorldView", InputBlock::system_value(SystemValue::WorldView))
        .unwrap();
    graph.connect_by_name(world_view, "output", world_pos, "transform").unwrap();
    material.build().unwrap();
    assert!(material.compiled().unwrap().shared.hints.need_world_view_matrix);

    let mesh = TestMesh {
        world: Mat4::from_scale(Vec3::splat(2.0)),
        ..Default::default()
    };
    let scene = TestScene::default();
    let mut effect = RecordingEffect::default();
    material.bind_only_world_matrix(&mut effect, &scene, mesh.world);

    assert_eq!(
        effect.values.get("u_WorldView"),
        Some(&Recorded::Matrix(scene.view * mesh.world))
    );
    assert_eq!(effect.values.get("u_ViewProjection"), None);
}

#[test]
fn test_animated_input() {
    let mut material = default_material();
    let fragment = fragment_output(&material);
    let graph = material.graph_mut();
    let time = graph
        .add_block(
            "time",
            InputBlock::uniform(InputValue::Float(0.0)).animated(AnimatedInputType::Time),
        )
        .unwrap();
    graph.connect_by_name(time, "output", fragment, "a").unwrap();
    material.build().unwrap();

    assert!(material
        .fragment_shader()
        .unwrap()
        .contains("gl_FragColor = vec4(u_color.rgb, u_time);\n"));

    let scene = TestScene {
        ratio: 2.0,
        ..Default::default()
    };
    material.animate(&scene);
    material.animate(&scene);

    let Some(InputValue::Float(value)) = material.graph().input_block(time).unwrap().value else {
        panic!("expected a float value");
    };
    assert!((value - 0.04).abs() < 1e-6, "{value}");
    assert!(material.is_compiled());
}

#[test]
fn test_vertex_value_read_in_fragment() {
    let mut material = default_material();
    let fragment = detach_color(&mut material);
    let graph = material.graph_mut();
    let world_pos = graph.block_by_name("WorldPos").unwrap();
    let light = graph
        .add_block("light", LightInformationBlock::new("sun"))
        .unwrap();
    graph.connect_by_name(world_pos, "output", light, "worldPosition").unwrap();
    graph.connect_by_name(light, "color", fragment, "rgb").unwrap();
    material.build().unwrap();

    let vertex = material.vertex_shader().unwrap();
    let fragment = material.fragment_shader().unwrap();
    assert!(vertex.contains("uniform vec4 lightColor;\n"), "{vertex}");
    assert!(vertex.contains("vec3 color = lightColor.rgb;\n"));
    assert!(vertex.ends_with("v_color = color;\n}\n"));
    assert!(fragment.contains("varying vec3 v_color;\n"), "{fragment}");
    assert!(fragment.contains("gl_FragColor = vec4(v_color, 1.0);\n"));
    assert!(!fragment.contains("lightColor.rgb"));
}

#[test]
fn test_light_defines_and_binding() {
    let mut material = default_material();
    let fragment = detach_color(&mut material);
    let graph = material.graph_mut();
    let world_pos = graph.block_by_name("WorldPos").unwrap();
    let light = graph
        .add_block("light", LightInformationBlock::new("lamp"))
        .unwrap();
    graph.connect_by_name(world_pos, "output", light, "worldPosition").unwrap();
    graph.connect_by_name(light, "direction", fragment, "rgb").unwrap();
    material.build().unwrap();

    let vertex = material.vertex_shader().unwrap();
    assert!(
        vertex.contains("vec3 direction;\n#ifdef LIGHTPOINTTYPE0\ndirection = normalize(output2.xyz - lightData);\n#else\ndirection = lightData;\n#endif\n"),
        "{vertex}"
    );

    let scene = TestScene {
        lights: vec![LightInfo {
            name: "lamp".to_owned(),
            kind: LightKind::Point,
            position: Vec3::new(1.0, 4.0, 0.0),
            direction: Vec3::ZERO,
            diffuse: Vec3::new(1.0, 0.5, 0.25),
            intensity: 2.0,
        }],
        ..Default::default()
    };
    let mesh = TestMesh::default();
    let mut defines = NodeMaterialDefines::new();
    let options = prepare(&material, &mesh, &scene, &mut defines);
    assert!(options.defines.contains("#define LIGHTPOINTTYPE0\n"));

    let mut effect = RecordingEffect::default();
    material.bind(&mut effect, &scene, &mesh);
    assert_eq!(
        effect.values.get("lightData"),
        Some(&Recorded::Vector(Vec4::new(1.0, 4.0, 0.0, 0.0)))
    );
    assert_eq!(
        effect.values.get("lightColor"),
        Some(&Recorded::Vector(Vec4::new(1.0, 0.5, 0.25, 2.0)))
    );
}

#[test]
fn test_bones() {
    let mut material = NodeMaterial::new("skinned");
    let graph = material.graph_mut();
    let position = graph.add_attribute(vertex_kind::POSITION).unwrap();
    let bones = graph.add_block("bones", BonesBlock::default()).unwrap();
    let world_pos = graph.add_block("WorldPos", TransformBlock::default()).unwrap();
    let view_projection = graph
        .add_block("ViewProjection", InputBlock::system_value(SystemValue::ViewProjection))
        .unwrap();
    let projected = graph.add_block("projected", TransformBlock::default()).unwrap();
    let vertex = graph.add_block("VertexOutput", VertexOutputBlock::default()).unwrap();
    let color = graph
        .add_block("color", InputBlock::uniform(InputValue::Color4(Vec4::ONE)))
        .unwrap();
    let fragment = graph.add_block("FragmentOutput", FragmentOutputBlock::default()).unwrap();

    graph.connect_by_name(position, "output", world_pos, "vector").unwrap();
    graph.connect_by_name(bones, "output", world_pos, "transform").unwrap();
    graph.connect_blocks(world_pos, projected).unwrap();
    graph.connect_blocks(view_projection, projected).unwrap();
    graph.connect_blocks(projected, vertex).unwrap();
    graph.connect_blocks(color, fragment).unwrap();
    material.add_output_node(vertex).unwrap();
    material.add_output_node(fragment).unwrap();
    material.build().unwrap();

    let vertex = material.vertex_shader().unwrap();
    assert!(vertex.contains("attribute vec4 matricesIndices;\n"), "{vertex}");
    assert!(vertex.contains("attribute vec4 matricesWeights;\n"));
    assert!(vertex.contains("#if NUM_BONE_INFLUENCERS > 0\nuniform mat4 mBones[BonesPerMesh];\n#endif\n"));
    assert!(vertex.contains("mat4 output3 = u_World;\n#if NUM_BONE_INFLUENCERS > 0\nmat4 influence;\n"));
    assert!(vertex.contains(
        "influence = mBones[int(matricesIndices[0])] * matricesWeights[0];\n#if NUM_BONE_INFLUENCERS > 1\n"
    ));
    assert!(vertex.contains("#if NUM_BONE_INFLUENCERS > 3\n"));
    assert!(!vertex.contains("#if NUM_BONE_INFLUENCERS > 4\n"));

    let mesh = TestMesh {
        kinds: vec![
            vertex_kind::POSITION,
            vertex_kind::MATRICES_INDICES,
            vertex_kind::MATRICES_WEIGHTS,
        ],
        influencers: 4,
        bones: Some(vec![Mat4::IDENTITY; 3]),
        ..Default::default()
    };
    let scene = TestScene::default();
    let mut defines = NodeMaterialDefines::new();
    let options = prepare(&material, &mesh, &scene, &mut defines);

    assert_eq!(defines.get_int("NUM_BONE_INFLUENCERS"), Some(4));
    assert_eq!(defines.get_int("BonesPerMesh"), Some(4));
    assert_eq!(options.fallbacks.cpu_skinning, Some((0, 4)));
    assert!(options.uniforms.contains(&"mBones".to_owned()));
    assert_eq!(
        options.attributes,
        vec!["position", "matricesIndices", "matricesWeights"]
    );

    let mut effect = RecordingEffect::default();
    material.bind(&mut effect, &scene, &mesh);
    assert_eq!(effect.values.get("mBones"), Some(&Recorded::Matrices(3)));
}

/// Test block exercising the effect option hooks.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct TintBlock {}

impl BlockConstructor for TintBlock {
    fn identity() -> &'static str {
        "TintBlock"
    }
}

impl NodeMaterialBlock for TintBlock {
    fn class_name(&self) -> &'static str {
        Self::identity()
    }

    fn register(&self, registration: &mut BlockRegistration) {
        registration.input("color", ConnectionPointType::Color4);
        registration.output("output", ConnectionPointType::Color4);
    }

    fn target(&self) -> BlockTarget {
        BlockTarget::Fragment
    }

    fn build_block(&mut self, context: &mut BuildContext<'_>) -> Result<(), BlockBuildError> {
        let color = context.input("color")?;
        let output = context.output("output")?;
        context.register(BlockList::RepeatableContent);
        context.register(BlockList::DynamicUniform);

        let code = format!(
            "//tintRepeat\n{} = {};\n",
            context.declare_output(output)?,
            context.variable(color)
        );
        context.append(&code);
        Ok(())
    }

    fn update_uniforms_and_samplers(
        &self,
        options: &mut EffectCreationOptions,
        _defines: &NodeMaterialDefines,
    ) {
        options.uniforms.push("tintExtra".to_owned());
    }

    fn replace_repeatable_content(
        &self,
        options: &mut EffectCreationOptions,
        _mesh: &dyn MeshProvider,
        _defines: &NodeMaterialDefines,
    ) {
        let lights = format!("// {} lights", options.max_simultaneous_lights);
        options.fragment_source = options.fragment_source.replace("//tintRepeat", &lights);
    }

    fn settings(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

#[test]
fn test_effect_option_hooks() {
    let mut material = default_material();
    material.options.max_simultaneous_lights = 2;
    let fragment = detach_color(&mut material);
    let graph = material.graph_mut();
    let color = graph.block_by_name("color").unwrap();
    let tint = graph.add_block("tint", TintBlock::default()).unwrap();
    graph.connect_by_name(color, "output", tint, "color").unwrap();
    graph.connect_by_name(tint, "output", fragment, "rgba").unwrap();
    material.build().unwrap();

    let mut defines = NodeMaterialDefines::new();
    let options = prepare(&material, &TestMesh::default(), &TestScene::default(), &mut defines);
    assert!(options.fragment_source.contains("// 2 lights\nvec4 output3 = u_color;\n"));
    assert!(options.uniforms.ends_with(&["tintExtra".to_owned()]));
    assert!(material.fragment_shader().unwrap().contains("//tintRepeat"));
}

#[test]
fn test_long_math_chain_builds() {
    let mut material = default_material();
    let fragment = detach_color(&mut material);
    let graph = material.graph_mut();
    let step = graph
        .add_block("step", InputBlock::uniform(InputValue::Float(0.01)))
        .unwrap();

    let mut previous = step;
    for i in 0..120 {
        let add = graph.add_block(&format!("add{i}"), MathBlock::default()).unwrap();
        graph.connect_by_name(previous, "output", add, "left").unwrap();
        graph.connect_by_name(step, "output", add, "right").unwrap();
        previous = add;
    }

    let output = graph.output(previous, "output").unwrap();
    assert_eq!(graph.point_type(output), ConnectionPointType::Float);
    graph.connect_by_name(previous, "output", fragment, "rgb").unwrap();
    material.build().unwrap();

    let fragment = material.fragment_shader().unwrap();
    assert_eq!(fragment.matches(" + u_step;\n").count(), 120, "{fragment}");
}

#[test]
fn test_depth_limit_exceeded() {
    let mut material = default_material();
    let fragment = detach_color(&mut material);
    let graph = material.graph_mut();
    let step = graph
        .add_block("step", InputBlock::uniform(InputValue::Float(0.01)))
        .unwrap();

    let mut previous = step;
    for i in 0..MAX_GRAPH_DEPTH + 8 {
        let add = graph.add_block(&format!("add{i}"), MathBlock::default()).unwrap();
        graph.connect_by_name(previous, "output", add, "left").unwrap();
        graph.connect_by_name(step, "output", add, "right").unwrap();
        previous = add;
    }
    graph.connect_by_name(previous, "output", fragment, "rgb").unwrap();

    let result = material.build();
    assert!(
        matches!(result, Err(CompileError::DepthLimitExceeded(MAX_GRAPH_DEPTH, _))),
        "{result:?}"
    );
    assert!(!material.is_compiled());
}

#[test]
fn test_unresolved_attribute_type_is_diagnosed() {
    let mut material = default_material();
    let fragment = detach_color(&mut material);
    let graph = material.graph_mut();
    let custom = graph.add_attribute("custom").unwrap();
    let output = graph.output(custom, "output").unwrap();
    let rgb = graph.input(fragment, "rgb").unwrap();
    graph.connect_unchecked(output, rgb).unwrap();

    let Err(CompileError::Compilation(err)) = material.build() else {
        panic!("expected a compilation error");
    };
    assert!(
        err.diagnostics.contains(&Diagnostic::UnresolvedType {
            block: "custom".to_owned(),
            class_name: "InputBlock".to_owned(),
            point: "output".to_owned(),
        }),
        "{err}"
    );
    assert_eq!(
        err.diagnostics
            .iter()
            .filter(|x| matches!(x, Diagnostic::UnresolvedType { .. }))
            .count(),
        1
    );
    assert!(!material.is_compiled());
}

#[test]
fn test_default_defines_create_an_effect() {
    let mut material = default_material();
    material.build().unwrap();

    let mesh = TestMesh::default();
    let scene = TestScene::default();
    let mut defines = NodeMaterialDefines::default();
    let options = prepare(&material, &mesh, &scene, &mut defines);
    assert_eq!(options.fragment_source, material.fragment_shader().unwrap());

    assert_eq!(
        material.prepare_effect(&mesh, &scene, &mut defines, false),
        Ok(EffectPreparation::Unchanged)
    );
}

#[test]
fn test_generated_names_do_not_shadow_attributes() {
    let mut material = default_material();
    let fragment = detach_color(&mut material);
    let graph = material.graph_mut();
    graph.add_attribute("color").unwrap();
    graph.add_attribute("color2").unwrap();
    let world_pos = graph.block_by_name("WorldPos").unwrap();
    let light = graph
        .add_block("light", LightInformationBlock::new("sun"))
        .unwrap();
    graph.connect_by_name(world_pos, "output", light, "worldPosition").unwrap();
    graph.connect_by_name(light, "color", fragment, "rgb").unwrap();
    material.build().unwrap();

    let vertex = material.vertex_shader().unwrap();
    assert!(vertex.contains("vec3 color3 = lightColor.rgb;\n"), "{vertex}");
    assert!(!vertex.contains("vec3 color ="));
    assert!(!vertex.contains("vec3 color2 ="));
}

mod properties {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    const OPERATIONS: [MathOperation; 6] = [
        MathOperation::Add,
        MathOperation::Subtract,
        MathOperation::Multiply,
        MathOperation::Divide,
        MathOperation::Min,
        MathOperation::Max,
    ];

    /// Float uniforms combined by math blocks, each reading two earlier values. The last value
    /// drives the fragment color.
    fn math_material(wiring: &[(usize, usize, usize)]) -> NodeMaterial {
        let mut material = default_material();
        let fragment = detach_color(&mut material);
        let graph = material.graph_mut();

        let mut values: Vec<BlockIndex> = Vec::new();
        for i in 0..3 {
            let value = InputBlock::uniform(InputValue::Float(i as f32));
            values.push(graph.add_block(&format!("v{i}"), value).unwrap());
        }

        for (i, &(operation, left, right)) in wiring.iter().enumerate() {
            let operation = OPERATIONS[operation % OPERATIONS.len()];
            let math = graph.add_block(&format!("m{i}"), MathBlock::new(operation)).unwrap();
            let left = values[left % values.len()];
            let right = values[right % values.len()];
            graph.connect_by_name(left, "output", math, "left").unwrap();
            graph.connect_by_name(right, "output", math, "right").unwrap();
            values.push(math);
        }

        let last = values[values.len() - 1];
        graph.connect_by_name(last, "output", fragment, "rgb").unwrap();
        material.build().unwrap();
        material
    }

    proptest! {
        #[test]
        fn generated_graphs_declare_once_in_dependency_order(
            wiring in prop::collection::vec((0..6usize, 0..32usize, 0..32usize), 1..24)
        ) {
            let material = math_material(&wiring);
            let fragment = material.fragment_shader().unwrap();

            let uniforms: Vec<&str> = fragment.lines().filter(|x| x.starts_with("uniform ")).collect();
            let unique: HashSet<&str> = uniforms.iter().copied().collect();
            prop_assert_eq!(uniforms.len(), unique.len());

            let mut declared: HashSet<String> = HashSet::new();
            for line in fragment.lines() {
                let Some((name, expression)) = line
                    .strip_prefix("float ")
                    .and_then(|x| x.split_once(" = "))
                else {
                    continue;
                };
                prop_assert!(declared.insert(name.to_owned()), "{} declared twice", name);
                for token in expression.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_')) {
                    if token.starts_with("output") {
                        prop_assert!(declared.contains(token), "{} used before it is declared", token);
                    }
                }
            }
        }

        #[test]
        fn generated_graphs_compile_deterministically(
            wiring in prop::collection::vec((0..6usize, 0..32usize, 0..32usize), 1..16)
        ) {
            let first = math_material(&wiring);
            let second = math_material(&wiring);
            prop_assert_eq!(first.fragment_shader(), second.fragment_shader());
            prop_assert_eq!(first.vertex_shader(), second.vertex_shader());
        }
    }
}
