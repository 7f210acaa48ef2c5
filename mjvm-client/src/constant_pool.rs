// Constant pool decoding
//
// The pool is 1-indexed in the class file and stored 0-indexed here. Long and
// Double constants occupy two slots; the second one is a placeholder.

use crate::classfile::{ClassFileError, ClassFileResult};
use crate::reader::ClassReader;

// Constant pool tags
pub mod tags {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const INVOKE_DYNAMIC: u8 = 18;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstantPoolEntry {
    Utf8(String),
    Integer(u32),
    Float(u32),
    Long(u64),
    Double(u64),
    /// Second slot of a Long or Double constant.
    Reserved,
    Class {
        name_index: u16,
    },
    String {
        utf8_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    FieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    MethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
}

impl ConstantPoolEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            ConstantPoolEntry::Utf8(_) => "Utf8",
            ConstantPoolEntry::Integer(_) => "Integer",
            ConstantPoolEntry::Float(_) => "Float",
            ConstantPoolEntry::Long(_) => "Long",
            ConstantPoolEntry::Double(_) => "Double",
            ConstantPoolEntry::Reserved => "Reserved",
            ConstantPoolEntry::Class { .. } => "Class",
            ConstantPoolEntry::String { .. } => "String",
            ConstantPoolEntry::MethodType { .. } => "MethodType",
            ConstantPoolEntry::FieldRef { .. } => "FieldRef",
            ConstantPoolEntry::MethodRef { .. } => "MethodRef",
            ConstantPoolEntry::InterfaceMethodRef { .. } => "InterfaceMethodRef",
            ConstantPoolEntry::NameAndType { .. } => "NameAndType",
            ConstantPoolEntry::MethodHandle { .. } => "MethodHandle",
            ConstantPoolEntry::InvokeDynamic { .. } => "InvokeDynamic",
        }
    }

    fn is_wide(&self) -> bool {
        matches!(self, ConstantPoolEntry::Long(_) | ConstantPoolEntry::Double(_))
    }

    fn read(tag: u8, reader: &mut ClassReader<'_>) -> ClassFileResult<Self> {
        let entry = match tag {
            tags::UTF8 => {
                let len = reader.read_u16()? as usize;
                let bytes = reader.read_bytes(len)?;
                ConstantPoolEntry::Utf8(String::from_utf8_lossy(bytes).into_owned())
            }
            tags::INTEGER => ConstantPoolEntry::Integer(reader.read_u32()?),
            tags::FLOAT => ConstantPoolEntry::Float(reader.read_u32()?),
            tags::LONG => ConstantPoolEntry::Long(reader.read_u64()?),
            tags::DOUBLE => ConstantPoolEntry::Double(reader.read_u64()?),
            tags::CLASS => ConstantPoolEntry::Class {
                name_index: reader.read_u16()?,
            },
            tags::STRING => ConstantPoolEntry::String {
                utf8_index: reader.read_u16()?,
            },
            tags::METHOD_TYPE => ConstantPoolEntry::MethodType {
                descriptor_index: reader.read_u16()?,
            },
            tags::FIELD_REF | tags::METHOD_REF | tags::INTERFACE_METHOD_REF => {
                let class_index = reader.read_u16()?;
                let name_and_type_index = reader.read_u16()?;
                match tag {
                    tags::FIELD_REF => ConstantPoolEntry::FieldRef {
                        class_index,
                        name_and_type_index,
                    },
                    tags::METHOD_REF => ConstantPoolEntry::MethodRef {
                        class_index,
                        name_and_type_index,
                    },
                    _ => ConstantPoolEntry::InterfaceMethodRef {
                        class_index,
                        name_and_type_index,
                    },
                }
            }
            tags::NAME_AND_TYPE => ConstantPoolEntry::NameAndType {
                name_index: reader.read_u16()?,
                descriptor_index: reader.read_u16()?,
            },
            tags::METHOD_HANDLE => ConstantPoolEntry::MethodHandle {
                reference_kind: reader.read_u8()?,
                reference_index: reader.read_u16()?,
            },
            tags::INVOKE_DYNAMIC => ConstantPoolEntry::InvokeDynamic {
                bootstrap_method_attr_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            _ => {
                return Err(ClassFileError::UnknownConstantTag {
                    tag,
                    offset: reader.position() - 1,
                })
            }
        };
        Ok(entry)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<ConstantPoolEntry>,
}

impl ConstantPool {
    /// Parse the pool count and entries, then check every cross reference.
    pub fn parse(reader: &mut ClassReader<'_>) -> ClassFileResult<Self> {
        // The header count is one larger than the number of usable slots.
        let slots = reader.read_u16()?.saturating_sub(1) as usize;
        let mut entries = Vec::with_capacity(slots);

        while entries.len() < slots {
            let tag = reader.read_u8()?;
            let entry = ConstantPoolEntry::read(tag, reader)?;
            let wide = entry.is_wide();
            entries.push(entry);
            if wide {
                if entries.len() == slots {
                    return Err(ClassFileError::InvalidConstantPoolIndex(slots as u16 + 1));
                }
                entries.push(ConstantPoolEntry::Reserved);
            }
        }

        let pool = Self { entries };
        pool.validate()?;
        Ok(pool)
    }

    pub fn from_entries(entries: Vec<ConstantPoolEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ConstantPoolEntry] {
        &self.entries
    }

    /// Look up a 1-based pool index.
    pub fn get(&self, index: u16) -> ClassFileResult<&ConstantPoolEntry> {
        match index
            .checked_sub(1)
            .and_then(|slot| self.entries.get(slot as usize))
        {
            Some(ConstantPoolEntry::Reserved) | None => {
                Err(ClassFileError::InvalidConstantPoolIndex(index))
            }
            Some(entry) => Ok(entry),
        }
    }

    pub fn utf8(&self, index: u16) -> ClassFileResult<&str> {
        match self.get(index)? {
            ConstantPoolEntry::Utf8(value) => Ok(value),
            other => Err(mismatch(index, "Utf8", other)),
        }
    }

    pub fn class_name(&self, index: u16) -> ClassFileResult<&str> {
        match self.get(index)? {
            ConstantPoolEntry::Class { name_index } => self.utf8(*name_index),
            other => Err(mismatch(index, "Class", other)),
        }
    }

    pub fn name_and_type(&self, index: u16) -> ClassFileResult<(&str, &str)> {
        match self.get(index)? {
            ConstantPoolEntry::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            other => Err(mismatch(index, "NameAndType", other)),
        }
    }

    fn expect(
        &self,
        index: u16,
        expected: &'static str,
        ok: fn(&ConstantPoolEntry) -> bool,
    ) -> ClassFileResult<()> {
        let entry = self.get(index)?;
        if ok(entry) {
            Ok(())
        } else {
            Err(mismatch(index, expected, entry))
        }
    }

    fn validate(&self) -> ClassFileResult<()> {
        let is_utf8 = |e: &ConstantPoolEntry| matches!(e, ConstantPoolEntry::Utf8(_));
        let is_class = |e: &ConstantPoolEntry| matches!(e, ConstantPoolEntry::Class { .. });
        let is_name_and_type =
            |e: &ConstantPoolEntry| matches!(e, ConstantPoolEntry::NameAndType { .. });
        let is_member_ref = |e: &ConstantPoolEntry| {
            matches!(
                e,
                ConstantPoolEntry::FieldRef { .. }
                    | ConstantPoolEntry::MethodRef { .. }
                    | ConstantPoolEntry::InterfaceMethodRef { .. }
            )
        };

        for entry in &self.entries {
            match entry {
                ConstantPoolEntry::Utf8(_)
                | ConstantPoolEntry::Integer(_)
                | ConstantPoolEntry::Float(_)
                | ConstantPoolEntry::Long(_)
                | ConstantPoolEntry::Double(_)
                | ConstantPoolEntry::Reserved => {}
                ConstantPoolEntry::Class { name_index } => {
                    self.expect(*name_index, "Utf8", is_utf8)?
                }
                ConstantPoolEntry::String { utf8_index } => {
                    self.expect(*utf8_index, "Utf8", is_utf8)?
                }
                ConstantPoolEntry::MethodType { descriptor_index } => {
                    self.expect(*descriptor_index, "Utf8", is_utf8)?
                }
                ConstantPoolEntry::FieldRef {
                    class_index,
                    name_and_type_index,
                }
                | ConstantPoolEntry::MethodRef {
                    class_index,
                    name_and_type_index,
                }
                | ConstantPoolEntry::InterfaceMethodRef {
                    class_index,
                    name_and_type_index,
                } => {
                    self.expect(*class_index, "Class", is_class)?;
                    self.expect(*name_and_type_index, "NameAndType", is_name_and_type)?;
                }
                ConstantPoolEntry::NameAndType {
                    name_index,
                    descriptor_index,
                } => {
                    self.expect(*name_index, "Utf8", is_utf8)?;
                    self.expect(*descriptor_index, "Utf8", is_utf8)?;
                }
                ConstantPoolEntry::MethodHandle {
                    reference_index, ..
                } => self.expect(*reference_index, "member reference", is_member_ref)?,
                ConstantPoolEntry::InvokeDynamic {
                    name_and_type_index,
                    ..
                } => self.expect(*name_and_type_index, "NameAndType", is_name_and_type)?,
            }
        }
        Ok(())
    }
}

fn mismatch(index: u16, expected: &'static str, found: &ConstantPoolEntry) -> ClassFileError {
    ClassFileError::ConstantPoolTypeMismatch {
        index,
        expected,
        found: found.kind(),
    }
}
