use std::fmt::{self, Display};

use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefineValue {
    Bool(bool),
    Int(i32),
}

/// Preprocessor symbols of one mesh/material combination, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMaterialDefines {
    values: IndexMap<String, DefineValue>,
    is_dirty: bool,
    attributes_dirty: bool,
}

/// Starts dirty so the first preparation initializes every define.
impl Default for NodeMaterialDefines {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeMaterialDefines {
    pub fn new() -> Self {
        Self {
            values: IndexMap::new(),
            is_dirty: true,
            attributes_dirty: true,
        }
    }

    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.set(name, DefineValue::Bool(value));
    }

    pub fn set_int(&mut self, name: &str, value: i32) {
        self.set(name, DefineValue::Int(value));
    }

    fn set(&mut self, name: &str, value: DefineValue) {
        if self.values.get(name) != Some(&value) {
            self.values.insert(name.to_owned(), value);
            self.is_dirty = true;
        }
    }

    pub fn get_bool(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(DefineValue::Bool(true)))
    }

    pub fn get_int(&self, name: &str) -> Option<i32> {
        match self.values.get(name) {
            Some(DefineValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn are_attributes_dirty(&self) -> bool {
        self.attributes_dirty
    }

    pub fn mark_as_processed(&mut self) {
        self.is_dirty = false;
        self.attributes_dirty = false;
    }

    pub fn mark_all_as_dirty(&mut self) {
        self.is_dirty = true;
        self.attributes_dirty = true;
    }

    /// Removes a symbol from the generated string, used by effect fallbacks.
    pub fn without(&self, name: &str) -> NodeMaterialDefines {
        let mut reduced = self.clone();
        reduced.values.shift_remove(name);
        reduced
    }
}

impl Display for NodeMaterialDefines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.values.iter() {
            match value {
                DefineValue::Bool(true) => writeln!(f, "#define {name}")?,
                DefineValue::Bool(false) => {}
                DefineValue::Int(value) => writeln!(f, "#define {name} {value}")?,
            }
        }
        Ok(())
    }
}
