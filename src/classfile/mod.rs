pub mod class_loader;
pub mod descriptor;
pub mod parser;
pub mod reader;
pub mod writer;

use std::fmt;

use crate::object::constant_pool::ConstantPool;
use crate::object::method::Code;
use crate::object::symbol::Symbol;

pub use class_loader::{ClassLoader, ClassPathLoader};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassLoadErr {
    InvalidFormat(String),
    VerifyFailed(String),
    NotFound(String),
    ClassCircularity(String),
    Io(String),
}

impl fmt::Display for ClassLoadErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassLoadErr::InvalidFormat(msg) => write!(f, "invalid class format: {}", msg),
            ClassLoadErr::VerifyFailed(msg) => write!(f, "verification failed: {}", msg),
            ClassLoadErr::NotFound(name) => write!(f, "class not found: {}", name),
            ClassLoadErr::ClassCircularity(name) => write!(f, "class circularity: {}", name),
            ClassLoadErr::Io(msg) => write!(f, "i/o error: {}", msg),
        }
    }
}

impl std::error::Error for ClassLoadErr {}

impl From<std::io::Error> for ClassLoadErr {
    fn from(e: std::io::Error) -> Self {
        ClassLoadErr::Io(e.to_string())
    }
}

pub struct FieldInfo {
    pub access_flags: u16,
    pub name: Symbol,
    pub descriptor: Symbol,
    pub constant_value: Option<u16>,
}

pub struct MethodInfo {
    pub access_flags: u16,
    pub name: Symbol,
    pub descriptor: Symbol,
    pub code: Option<Code>,
}

/// Decoded shape of one `.class` file, before linking.
pub struct ClassFile {
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: Symbol,
    pub super_class: Option<Symbol>,
    pub interfaces: Vec<Symbol>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub source_file: Option<Symbol>,
}
