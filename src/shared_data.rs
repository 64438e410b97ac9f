use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use thiserror::Error;

use crate::{sanitize_identifier, BlockIndex, NodeMaterialGraph, PointIndex};

/// Names that collide with GLSL built-ins and always carry a counter.
const RESERVED_VARIABLE_NAMES: [&str; 2] = ["output", "texture"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockList {
    Input,
    Texture,
    Bindable,
    Fallbacks,
    Defines,
    RepeatableContent,
    DynamicUniform,
    Blocking,
    AnimatedInput,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hints {
    pub need_world_view_matrix: bool,
    pub need_world_view_projection_matrix: bool,
    pub need_alpha_blending: bool,
    pub need_alpha_testing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checks {
    pub emit_vertex: bool,
    pub emit_fragment: bool,
    pub not_connected_non_optional_inputs: Vec<PointIndex>,
    pub unresolved_types: Vec<PointIndex>,
}

impl Checks {
    pub fn report_missing_input(&mut self, index: PointIndex) {
        if !self.not_connected_non_optional_inputs.contains(&index) {
            self.not_connected_non_optional_inputs.push(index);
        }
    }

    pub fn report_unresolved_type(&mut self, index: PointIndex) {
        if !self.unresolved_types.contains(&index) {
            self.unresolved_types.push(index);
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    #[error("NodeMaterial does not have a vertex output. You need to at least add a block that generates a glPosition value.")]
    MissingVertexOutput,
    #[error("NodeMaterial does not have a fragment output. You need to at least add a block that generates a glFragColor value.")]
    MissingFragmentOutput,
    #[error("input {input} from block {block}[{class_name}] is not connected and is not optional.")]
    MissingRequiredConnection {
        block: String,
        class_name: String,
        input: String,
    },
    #[error("type of {point} from block {block}[{class_name}] could not be resolved.")]
    UnresolvedType {
        block: String,
        class_name: String,
        point: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Build of NodeMaterial failed:\n{}", display_diagnostics(.diagnostics))]
pub struct NodeMaterialCompilationError {
    pub diagnostics: Vec<Diagnostic>,
}

fn display_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut text = String::new();
    for diagnostic in diagnostics {
        let _ = writeln!(text, "{diagnostic}");
    }
    text
}

/// State shared by the vertex and fragment stages of a single compilation run.
#[derive(Debug, Clone, Default)]
pub struct BuildStateSharedData {
    pub build_id: u64,
    pub emit_comments: bool,
    pub verbose: bool,
    pub input_blocks: Vec<BlockIndex>,
    pub texture_blocks: Vec<BlockIndex>,
    pub bindable_blocks: Vec<BlockIndex>,
    pub blocks_with_fallbacks: Vec<BlockIndex>,
    pub blocks_with_defines: Vec<BlockIndex>,
    pub repeatable_content_blocks: Vec<BlockIndex>,
    pub dynamic_uniform_blocks: Vec<BlockIndex>,
    pub blocking_blocks: Vec<BlockIndex>,
    pub animated_inputs: Vec<BlockIndex>,
    pub variable_names: HashMap<String, u32>,
    /// Names emitted verbatim, never handed out by the allocator.
    pub reserved_names: HashSet<String>,
    pub define_names: HashMap<String, u32>,
    pub varyings: Vec<String>,
    pub varying_declaration: String,
    pub hints: Hints,
    pub checks: Checks,
}

impl BuildStateSharedData {
    pub fn new(build_id: u64) -> Self {
        Self {
            build_id,
            ..Default::default()
        }
    }

    pub fn list(&self, list: BlockList) -> &[BlockIndex] {
        match list {
            BlockList::Input => &self.input_blocks,
            BlockList::Texture => &self.texture_blocks,
            BlockList::Bindable => &self.bindable_blocks,
            BlockList::Fallbacks => &self.blocks_with_fallbacks,
            BlockList::Defines => &self.blocks_with_defines,
            BlockList::RepeatableContent => &self.repeatable_content_blocks,
            BlockList::DynamicUniform => &self.dynamic_uniform_blocks,
            BlockList::Blocking => &self.blocking_blocks,
            BlockList::AnimatedInput => &self.animated_inputs,
        }
    }

    pub fn register(&mut self, list: BlockList, block: BlockIndex) {
        let list = match list {
            BlockList::Input => &mut self.input_blocks,
            BlockList::Texture => &mut self.texture_blocks,
            BlockList::Bindable => &mut self.bindable_blocks,
            BlockList::Fallbacks => &mut self.blocks_with_fallbacks,
            BlockList::Defines => &mut self.blocks_with_defines,
            BlockList::RepeatableContent => &mut self.repeatable_content_blocks,
            BlockList::DynamicUniform => &mut self.dynamic_uniform_blocks,
            BlockList::Blocking => &mut self.blocking_blocks,
            BlockList::AnimatedInput => &mut self.animated_inputs,
        };

        if !list.contains(&block) {
            list.push(block);
        }
    }

    /// Marks a name as taken, used for attribute names which are emitted verbatim.
    pub fn reserve_variable_name(&mut self, name: &str) {
        self.reserved_names.insert(name.to_owned());
    }

    /// `name`, then `name2`, `name3`... Reserved words start at `name1`. Reserved names are
    /// skipped.
    pub fn free_variable_name(&mut self, prefix: &str) -> String {
        let mut prefix = sanitize_identifier(prefix);
        if prefix.is_empty() {
            prefix.push_str("tmp");
        }

        loop {
            let name = self.next_variable_name(&prefix);
            if !self.reserved_names.contains(&name) {
                return name;
            }
        }
    }

    fn next_variable_name(&mut self, prefix: &str) -> String {
        match self.variable_names.get_mut(prefix) {
            Some(counter) => {
                *counter += 1;
                format!("{prefix}{counter}")
            }
            None => {
                self.variable_names.insert(prefix.to_owned(), 1);
                if RESERVED_VARIABLE_NAMES.contains(&prefix) {
                    format!("{prefix}1")
                } else {
                    prefix.to_owned()
                }
            }
        }
    }

    pub fn free_define_name(&mut self, prefix: &str) -> String {
        let counter = self
            .define_names
            .entry(prefix.to_owned())
            .and_modify(|x| *x += 1)
            .or_insert(0);
        format!("{prefix}{counter}")
    }

    pub fn emit_errors(&self, graph: &NodeMaterialGraph) -> Result<(), NodeMaterialCompilationError> {
        let mut diagnostics = Vec::new();

        if !self.checks.emit_vertex {
            diagnostics.push(Diagnostic::MissingVertexOutput);
        }

        if !self.checks.emit_fragment {
            diagnostics.push(Diagnostic::MissingFragmentOutput);
        }

        for &input in self.checks.not_connected_non_optional_inputs.iter() {
            let (block, class_name, point) = graph.describe_point(input);
            diagnostics.push(Diagnostic::MissingRequiredConnection {
                block,
                class_name,
                input: point,
            });
        }

        for &point in self.checks.unresolved_types.iter() {
            let (block, class_name, point) = graph.describe_point(point);
            diagnostics.push(Diagnostic::UnresolvedType {
                block,
                class_name,
                point,
            });
        }

        if diagnostics.is_empty() {
            Ok(())
        } else {
            Err(NodeMaterialCompilationError { diagnostics })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_free_variable_name_sequence() {
        let mut shared = BuildStateSharedData::default();
        assert_eq!(shared.free_variable_name("rgba"), "rgba");
        assert_eq!(shared.free_variable_name("rgba"), "rgba2");
        assert_eq!(shared.free_variable_name("rgba"), "rgba3");
        assert_eq!(shared.free_variable_name("output"), "output1");
        assert_eq!(shared.free_variable_name("output"), "output2");
        assert_eq!(shared.free_variable_name("u_my color"), "u_mycolor");
    }

    #[test]
    fn test_reserved_attribute_name_is_skipped() {
        let mut shared = BuildStateSharedData::default();
        shared.reserve_variable_name("x");
        assert_eq!(shared.free_variable_name("x"), "x2");
    }

    #[test]
    fn test_reserved_names_with_digits_are_skipped() {
        let mut shared = BuildStateSharedData::default();
        shared.reserve_variable_name("color");
        shared.reserve_variable_name("color2");
        shared.reserve_variable_name("output1");
        assert_eq!(shared.free_variable_name("color"), "color3");
        assert_eq!(shared.free_variable_name("color"), "color4");
        assert_eq!(shared.free_variable_name("output"), "output2");
    }

    #[test]
    fn test_free_define_name_sequence() {
        let mut shared = BuildStateSharedData::default();
        assert_eq!(shared.free_define_name("UVTRANSFORM"), "UVTRANSFORM0");
        assert_eq!(shared.free_define_name("UVTRANSFORM"), "UVTRANSFORM1");
        assert_eq!(shared.free_define_name("LIGHTPOINTTYPE"), "LIGHTPOINTTYPE0");
    }

    #[test]
    fn test_register_deduplicates() {
        let mut shared = BuildStateSharedData::default();
        shared.register(BlockList::Bindable, BlockIndex(3));
        shared.register(BlockList::Bindable, BlockIndex(3));
        assert_eq!(shared.list(BlockList::Bindable), &[BlockIndex(3)]);
    }

    mod properties {
        use std::collections::HashSet;

        use proptest::prelude::*;

        use super::super::*;

        proptest! {
            #[test]
            fn free_variable_names_are_unique(prefixes in prop::collection::vec("[a-c_]{1,3}", 1..64)) {
                let mut shared = BuildStateSharedData::default();
                let mut seen = HashSet::new();
                for prefix in prefixes.iter() {
                    let name = shared.free_variable_name(prefix);
                    prop_assert!(seen.insert(name));
                }
            }

            #[test]
            fn free_variable_names_are_deterministic(prefixes in prop::collection::vec("[a-z]{1,4}", 1..32)) {
                let mut first = BuildStateSharedData::default();
                let mut second = BuildStateSharedData::default();
                for prefix in prefixes.iter() {
                    prop_assert_eq!(first.free_variable_name(prefix), second.free_variable_name(prefix));
                }
            }
        }
    }
}
