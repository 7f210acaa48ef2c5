// Class file loading
//
// Single forward pass over a `.class` buffer. Only what the debugger needs is
// kept: the constant pool, the header and the methods that own bytecode.

use crate::constant_pool::ConstantPool;
use crate::method::{read_attribute, read_attributes, Attribute, MethodInfo};
use crate::reader::ClassReader;
use std::path::Path;
use thiserror::Error;

pub const CLASS_MAGIC: u32 = 0xCAFEBABE;

pub type ClassFileResult<T> = Result<T, ClassFileError>;

#[derive(Debug, Error)]
pub enum ClassFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected end of class file at offset {offset} (needed {needed} bytes)")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("Invalid class file magic: {0:#010x}")]
    InvalidMagic(u32),

    #[error("Unknown constant pool tag {tag} at offset {offset}")]
    UnknownConstantTag { tag: u8, offset: usize },

    #[error("Invalid constant pool index: {0}")]
    InvalidConstantPoolIndex(u16),

    #[error("Constant pool type mismatch at index {index}: expected {expected}, found {found}")]
    ConstantPoolTypeMismatch {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Attribute {name} declares {length} bytes but only {remaining} remain")]
    AttributeOverrun {
        name: String,
        length: usize,
        remaining: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub magic: u32,
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces_count: u16,
    pub methods: Vec<MethodInfo>,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> ClassFileResult<Self> {
        let mut reader = ClassReader::new(bytes);

        let magic = reader.read_u32()?;
        if magic != CLASS_MAGIC {
            return Err(ClassFileError::InvalidMagic(magic));
        }
        let minor_version = reader.read_u16()?;
        let major_version = reader.read_u16()?;
        let constant_pool = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u16()?;
        let this_class = reader.read_u16()?;
        let super_class = reader.read_u16()?;

        let interfaces_count = reader.read_u16()?;
        reader.skip(interfaces_count as usize * 2)?;

        // access_flags, name_index, descriptor_index, then attributes
        let fields_count = reader.read_u16()?;
        for _ in 0..fields_count {
            reader.skip(6)?;
            read_attributes(&mut reader, &constant_pool)?;
        }

        let methods_count = reader.read_u16()?;
        let mut methods = Vec::with_capacity(methods_count as usize);
        for _ in 0..methods_count {
            let method = read_method(&mut reader, &constant_pool)?;
            if method.is_native() || method.is_bridge() {
                continue;
            }
            methods.push(method);
        }

        // Class-level attributes carry nothing we use; walk them when present
        // so a bad length still surfaces as an error.
        if !reader.is_empty() {
            read_attributes(&mut reader, &constant_pool)?;
        }

        Ok(Self {
            magic,
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces_count,
            methods,
        })
    }

    /// Read and parse a class file from disk
    pub fn load(path: impl AsRef<Path>) -> ClassFileResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    /// Internal name of this class, e.g. `com/example/Main`
    pub fn this_class_name(&self) -> ClassFileResult<&str> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Internal name of the super class; `None` for `java/lang/Object`
    pub fn super_class_name(&self) -> ClassFileResult<Option<&str>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    /// First retained method matching both name and descriptor
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }
}

fn read_method(reader: &mut ClassReader<'_>, pool: &ConstantPool) -> ClassFileResult<MethodInfo> {
    let access_flags = reader.read_u16()?;
    let name = pool.utf8(reader.read_u16()?)?.to_string();
    let descriptor = pool.utf8(reader.read_u16()?)?.to_string();

    let mut code = None;
    let attributes_count = reader.read_u16()?;
    for _ in 0..attributes_count {
        if let Some(Attribute::Code(attribute)) = read_attribute(reader, pool)? {
            if code.is_none() {
                code = Some(attribute);
            }
        }
    }

    Ok(MethodInfo {
        access_flags,
        name,
        descriptor,
        code,
    })
}
