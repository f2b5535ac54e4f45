//! `Module`: an ordered sequence of functions sharing one source-file label.

use super::entities::FuncRef;
use super::function::Function;
use sox_entity::PrimaryMap;

#[derive(Clone, Debug, Default)]
pub struct Module {
    pub source_file: String,
    pub functions: PrimaryMap<FuncRef, Function>,
}

impl Module {
    pub fn new(source_file: impl Into<String>) -> Self {
        Module {
            source_file: source_file.into(),
            functions: PrimaryMap::new(),
        }
    }

    pub fn push_function(&mut self, f: Function) -> FuncRef {
        self.functions.push(f)
    }

    pub fn find_by_name(&self, name: &str) -> Option<FuncRef> {
        self.functions
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(r, _)| r)
    }
}
