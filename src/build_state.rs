use indexmap::IndexMap;

use crate::{define_guard, BlockTarget, BuildStateSharedData, ConnectionPointType};

/// Source text and declarations accumulated for one stage of one compilation run.
#[derive(Debug, Clone, Default)]
pub struct NodeMaterialBuildState {
    pub target: BlockTarget,
    pub compilation_string: String,
    pub attributes: Vec<String>,
    pub uniforms: Vec<String>,
    pub samplers: Vec<String>,
    pub functions: IndexMap<String, String>,
    pub extensions: IndexMap<String, String>,
    pub(crate) attribute_declaration: String,
    pub(crate) uniform_declaration: String,
    pub(crate) sampler_declaration: String,
    pub(crate) varying_transfer: String,
    /// Present while the fragment stage builds, owned back by the driver afterwards.
    pub vertex_state: Option<Box<NodeMaterialBuildState>>,
}

impl NodeMaterialBuildState {
    pub fn new(target: BlockTarget) -> Self {
        Self {
            target,
            ..Default::default()
        }
    }

    pub fn is_fragment(&self) -> bool {
        self.target == BlockTarget::Fragment
    }

    pub fn gl_type(ty: ConnectionPointType) -> Option<&'static str> {
        ty.gl_type()
    }

    pub fn emit_function(&mut self, name: &str, code: &str, comment: &str, emit_comments: bool) {
        if self.functions.contains_key(name) {
            return;
        }

        let code = if emit_comments && !comment.is_empty() {
            format!("//{comment}\n{code}")
        } else {
            code.to_owned()
        };
        self.functions.insert(name.to_owned(), code);
    }

    pub fn emit_extension(&mut self, name: &str, extension: &str, define: Option<&str>) {
        if self.extensions.contains_key(name) {
            return;
        }

        let extension = match define {
            Some(define) => format!("{}{extension}\n#endif", define_guard(define, false)),
            None => extension.to_owned(),
        };
        self.extensions.insert(name.to_owned(), extension);
    }

    pub fn emit_attribute(&mut self, name: &str, gl_type: &str, define: Option<&str>) -> bool {
        if self.attributes.iter().any(|x| x == name) {
            return false;
        }

        self.attributes.push(name.to_owned());
        wrap_declaration(
            &mut self.attribute_declaration,
            &format!("attribute {gl_type} {name};\n"),
            define,
            false,
        );
        true
    }

    pub fn emit_uniform_from_string(
        &mut self,
        name: &str,
        gl_type: &str,
        define: Option<&str>,
        not_define: bool,
    ) -> bool {
        if self.uniforms.iter().any(|x| x == name) {
            return false;
        }

        self.uniforms.push(name.to_owned());
        wrap_declaration(
            &mut self.uniform_declaration,
            &format!("uniform {gl_type} {name};\n"),
            define,
            not_define,
        );
        true
    }

    pub fn emit_sampler(&mut self, name: &str) -> bool {
        if self.samplers.iter().any(|x| x == name) {
            return false;
        }

        self.samplers.push(name.to_owned());
        self.sampler_declaration
            .push_str(&format!("uniform sampler2D {name};\n"));
        true
    }

    /// Varyings are declared once per run, both stages print the shared declaration.
    pub fn emit_varying_from_string(
        &mut self,
        shared: &mut BuildStateSharedData,
        name: &str,
        gl_type: &str,
        define: Option<&str>,
        not_define: bool,
    ) -> bool {
        if shared.varyings.iter().any(|x| x == name) {
            return false;
        }

        shared.varyings.push(name.to_owned());
        wrap_declaration(
            &mut shared.varying_declaration,
            &format!("varying {gl_type} {name};\n"),
            define,
            not_define,
        );
        true
    }

    pub(crate) fn push_varying_transfer(&mut self, code: &str) {
        self.varying_transfer.push_str(code);
    }

    pub fn finalize(&mut self, shared: &BuildStateSharedData) {
        let emit_comments = shared.emit_comments;
        let mut source = String::new();

        for extension in self.extensions.values() {
            source.push_str(extension);
            source.push('\n');
        }

        if !self.is_fragment() && !self.attribute_declaration.is_empty() {
            push_section(&mut source, emit_comments, "Attributes", &self.attribute_declaration);
        }
        if !self.uniform_declaration.is_empty() {
            push_section(&mut source, emit_comments, "Uniforms", &self.uniform_declaration);
        }
        if !self.sampler_declaration.is_empty() {
            push_section(&mut source, emit_comments, "Samplers", &self.sampler_declaration);
        }
        if !shared.varying_declaration.is_empty() {
            push_section(&mut source, emit_comments, "Varyings", &shared.varying_declaration);
        }

        if !self.functions.is_empty() {
            source.push('\n');
            for function in self.functions.values() {
                source.push_str(function);
                source.push('\n');
            }
        }

        source.push('\n');
        if emit_comments {
            source.push_str("//Entry point\n");
        }
        source.push_str("void main(void) {\n");
        source.push_str(&self.compilation_string);
        if !self.is_fragment() && !self.varying_transfer.is_empty() {
            source.push_str(&self.varying_transfer);
        }
        source.push_str("}\n");

        self.compilation_string = source;
    }
}

fn push_section(source: &mut String, emit_comments: bool, title: &str, declaration: &str) {
    source.push('\n');
    if emit_comments {
        source.push_str(&format!("//{title}\n"));
    }
    source.push_str(declaration);
}

fn wrap_declaration(target: &mut String, line: &str, define: Option<&str>, not_define: bool) {
    match define {
        Some(define) => {
            target.push_str(&define_guard(define, not_define));
            target.push_str(line);
            target.push_str("#endif\n");
        }
        None => target.push_str(line),
    }
}
