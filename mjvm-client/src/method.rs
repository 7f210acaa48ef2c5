// Method and attribute model
//
// Methods keep their bytecode and, when present, the line number table. All
// other attributes are skipped while loading.

use crate::classfile::{ClassFileError, ClassFileResult};
use crate::constant_pool::ConstantPool;
use crate::reader::ClassReader;
use serde::{Deserialize, Serialize};

// Method access flags
pub mod method_flags {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SYNCHRONIZED: u16 = 0x0020;
    pub const BRIDGE: u16 = 0x0040;
    pub const VARARGS: u16 = 0x0080;
    pub const NATIVE: u16 = 0x0100;
    pub const ABSTRACT: u16 = 0x0400;
    pub const STRICT: u16 = 0x0800;
    pub const SYNTHETIC: u16 = 0x1000;
}

pub const ATTRIBUTE_CODE: &str = "Code";
pub const ATTRIBUTE_LINE_NUMBER_TABLE: &str = "LineNumberTable";

/// Line table entry - maps a bytecode offset to a source line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub line_numbers: Option<Vec<LineNumberEntry>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub code: Option<CodeAttribute>,
}

impl MethodInfo {
    pub fn new(
        name: impl Into<String>,
        descriptor: impl Into<String>,
        code: Option<CodeAttribute>,
    ) -> Self {
        Self {
            access_flags: method_flags::PUBLIC,
            name: name.into(),
            descriptor: descriptor.into(),
            code,
        }
    }

    pub fn is_native(&self) -> bool {
        self.access_flags & method_flags::NATIVE != 0
    }

    pub fn is_bridge(&self) -> bool {
        self.access_flags & method_flags::BRIDGE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & method_flags::ABSTRACT != 0
    }

    pub fn line_numbers(&self) -> Option<&[LineNumberEntry]> {
        self.code.as_ref()?.line_numbers.as_deref()
    }

    /// Line of the entry with the greatest start_pc not past `pc`.
    pub fn line_for_pc(&self, pc: u32) -> Option<u16> {
        self.line_numbers()?
            .iter()
            .filter(|entry| u32::from(entry.start_pc) <= pc)
            .fold(None::<&LineNumberEntry>, |best, entry| match best {
                Some(b) if b.start_pc >= entry.start_pc => Some(b),
                _ => Some(entry),
            })
            .map(|entry| entry.line_number)
    }

    /// Smallest start_pc recorded for `line`.
    pub fn first_pc_for_line(&self, line: u16) -> Option<u16> {
        self.line_numbers()?
            .iter()
            .filter(|entry| entry.line_number == line)
            .map(|entry| entry.start_pc)
            .min()
    }
}

/// Attributes the loader understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    Code(CodeAttribute),
    LineNumberTable(Vec<LineNumberEntry>),
}

/// Read one attribute, returning `None` for the ones we skip.
pub(crate) fn read_attribute(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> ClassFileResult<Option<Attribute>> {
    let name_index = reader.read_u16()?;
    let length = reader.read_u32()? as usize;
    let name = pool.utf8(name_index)?;

    if length > reader.remaining() {
        return Err(ClassFileError::AttributeOverrun {
            name: name.to_string(),
            length,
            remaining: reader.remaining(),
        });
    }

    let body = reader.read_bytes(length)?;
    let mut sub = ClassReader::new(body);
    let attribute = match name {
        ATTRIBUTE_CODE => Some(Attribute::Code(read_code(&mut sub, pool)?)),
        ATTRIBUTE_LINE_NUMBER_TABLE => {
            Some(Attribute::LineNumberTable(read_line_numbers(&mut sub)?))
        }
        _ => None,
    };
    Ok(attribute)
}

/// Read an attribute table and keep the interpreted entries.
pub(crate) fn read_attributes(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> ClassFileResult<Vec<Attribute>> {
    let count = reader.read_u16()?;
    let mut attributes = Vec::new();
    for _ in 0..count {
        if let Some(attribute) = read_attribute(reader, pool)? {
            attributes.push(attribute);
        }
    }
    Ok(attributes)
}

fn read_code(reader: &mut ClassReader<'_>, pool: &ConstantPool) -> ClassFileResult<CodeAttribute> {
    let max_stack = reader.read_u16()?;
    let max_locals = reader.read_u16()?;
    let code_length = reader.read_u32()? as usize;
    let code = reader.read_bytes(code_length)?.to_vec();

    // start_pc, end_pc, handler_pc, catch_type
    let exception_table_length = reader.read_u16()? as usize;
    reader.skip(exception_table_length * 8)?;

    let mut line_numbers: Option<Vec<LineNumberEntry>> = None;
    for attribute in read_attributes(reader, pool)? {
        if let Attribute::LineNumberTable(entries) = attribute {
            line_numbers.get_or_insert_with(Vec::new).extend(entries);
        }
    }

    Ok(CodeAttribute {
        max_stack,
        max_locals,
        code,
        line_numbers,
    })
}

fn read_line_numbers(reader: &mut ClassReader<'_>) -> ClassFileResult<Vec<LineNumberEntry>> {
    let count = reader.read_u16()? as usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let start_pc = reader.read_u16()?;
        let line_number = reader.read_u16()?;
        entries.push(LineNumberEntry {
            start_pc,
            line_number,
        });
    }
    Ok(entries)
}
