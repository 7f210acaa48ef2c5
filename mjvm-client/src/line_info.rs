// Line <-> program counter resolution
//
// Registry of loaded classes, each tied to the source file it was compiled
// from. Breakpoints are resolved from (source, line) to device locations and
// stack frames are resolved back from (class, method, descriptor, pc).

use crate::classfile::{ClassFile, ClassFileResult};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("No bytecode for line {line} in {source_path}")]
    UnresolvedLine { line: u32, source_path: String },

    #[error("No line for pc {pc} in {class_name}.{method_name}{descriptor}")]
    UnresolvedPc {
        pc: u32,
        class_name: String,
        method_name: String,
        descriptor: String,
    },
}

/// A source line resolved to a device location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugLineInfo {
    pub source_path: String,
    pub line: u32,
    pub pc: u32,
    pub class_name: String,
    pub method_name: String,
    pub descriptor: String,
}

impl DebugLineInfo {
    /// Breakpoints are the same when they sit on the same source line.
    pub fn same_breakpoint(&self, source_path: &str, line: u32) -> bool {
        self.source_path == source_path && self.line == line
    }
}

impl PartialEq for DebugLineInfo {
    fn eq(&self, other: &Self) -> bool {
        self.same_breakpoint(&other.source_path, other.line)
    }
}

impl Eq for DebugLineInfo {}

#[derive(Debug, Clone)]
pub struct LoadedClass {
    pub class_name: String,
    pub source_path: String,
    pub class: ClassFile,
}

#[derive(Debug, Clone, Default)]
pub struct LineResolver {
    source_root: Option<PathBuf>,
    classes: Vec<LoadedClass>,
}

impl LineResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver deriving source paths below `source_root`
    pub fn with_source_root(source_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: Some(source_root.into()),
            classes: Vec::new(),
        }
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn classes(&self) -> &[LoadedClass] {
        &self.classes
    }

    /// Conventional source path for an internal class name:
    /// `com/example/Main$Inner` -> `<root>/com/example/Main.java`
    pub fn source_path_for(&self, class_name: &str) -> String {
        let class_name = normalize_class_name(class_name);
        let outer = class_name.split('$').next().unwrap_or(&class_name);
        let relative = format!("{}.java", outer);
        match &self.source_root {
            Some(root) => root.join(relative).to_string_lossy().into_owned(),
            None => relative,
        }
    }

    /// Register a class under its conventional source path
    pub fn add_class(&mut self, class: ClassFile) -> ClassFileResult<&LoadedClass> {
        let source_path = self.source_path_for(class.this_class_name()?);
        self.add_class_with_source(class, source_path)
    }

    /// Register a class under an explicit source path
    pub fn add_class_with_source(
        &mut self,
        class: ClassFile,
        source_path: impl Into<String>,
    ) -> ClassFileResult<&LoadedClass> {
        let class_name = normalize_class_name(class.this_class_name()?);
        let source_path = source_path.into();
        debug!(
            "Registered class {} ({} methods) for {}",
            class_name,
            class.methods.len(),
            source_path
        );

        // Reloading a class replaces the previous definition.
        self.classes.retain(|c| c.class_name != class_name);
        self.classes.push(LoadedClass {
            class_name,
            source_path,
            class,
        });
        Ok(&self.classes[self.classes.len() - 1])
    }

    pub fn load_class_file(&mut self, path: impl AsRef<Path>) -> ClassFileResult<&LoadedClass> {
        let class = ClassFile::load(path)?;
        self.add_class(class)
    }

    /// Load every `.class` file below `dir`. Files that fail to parse are
    /// skipped; the number of classes loaded is returned.
    pub fn load_class_dir(&mut self, dir: impl AsRef<Path>) -> usize {
        let mut loaded = 0;
        for entry in walkdir::WalkDir::new(dir.as_ref())
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension() != Some(OsStr::new("class")) {
                continue;
            }
            match self.load_class_file(entry.path()) {
                Ok(_) => loaded += 1,
                Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
            }
        }
        info!("Loaded {} classes from {}", loaded, dir.as_ref().display());
        loaded
    }

    /// First bytecode instruction generated for `line` in `source_path`
    pub fn resolve_from_line(&self, line: u32, source_path: &str) -> Result<DebugLineInfo, ResolveError> {
        let unresolved = || ResolveError::UnresolvedLine {
            line,
            source_path: source_path.to_string(),
        };
        let line_number = u16::try_from(line).map_err(|_| unresolved())?;

        let mut best: Option<(&LoadedClass, &str, &str, u16)> = None;
        for loaded in self.classes.iter().filter(|c| c.source_path == source_path) {
            for method in &loaded.class.methods {
                let Some(pc) = method.first_pc_for_line(line_number) else {
                    continue;
                };
                if best.map_or(true, |(_, _, _, best_pc)| pc < best_pc) {
                    best = Some((loaded, &method.name, &method.descriptor, pc));
                }
            }
        }

        let (loaded, method_name, descriptor, pc) = best.ok_or_else(unresolved)?;
        Ok(DebugLineInfo {
            source_path: loaded.source_path.clone(),
            line,
            pc: u32::from(pc),
            class_name: loaded.class_name.clone(),
            method_name: method_name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    /// Source line containing `pc` in the given method
    pub fn resolve_from_pc(
        &self,
        pc: u32,
        class_name: &str,
        method_name: &str,
        descriptor: &str,
    ) -> Result<DebugLineInfo, ResolveError> {
        let class_name = normalize_class_name(class_name);
        let unresolved = || ResolveError::UnresolvedPc {
            pc,
            class_name: class_name.clone(),
            method_name: method_name.to_string(),
            descriptor: descriptor.to_string(),
        };

        let loaded = self
            .classes
            .iter()
            .find(|c| c.class_name == class_name)
            .ok_or_else(unresolved)?;
        let line = loaded
            .class
            .method(method_name, descriptor)
            .and_then(|method| method.line_for_pc(pc))
            .ok_or_else(unresolved)?;

        Ok(DebugLineInfo {
            source_path: loaded.source_path.clone(),
            line: u32::from(line),
            pc,
            class_name: loaded.class_name.clone(),
            method_name: method_name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }
}

/// Device and class names use `/` separators
pub fn normalize_class_name(class_name: &str) -> String {
    class_name.replace(['\\', '.'], "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant_pool::{ConstantPool, ConstantPoolEntry};
    use crate::method::{CodeAttribute, LineNumberEntry, MethodInfo};

    fn method(name: &str, descriptor: &str, lines: &[(u16, u16)]) -> MethodInfo {
        let line_numbers = lines
            .iter()
            .map(|&(start_pc, line_number)| LineNumberEntry {
                start_pc,
                line_number,
            })
            .collect();
        MethodInfo::new(
            name,
            descriptor,
            Some(CodeAttribute {
                max_stack: 1,
                max_locals: 1,
                code: vec![0; 32],
                line_numbers: Some(line_numbers),
            }),
        )
    }

    fn class(name: &str, methods: Vec<MethodInfo>) -> ClassFile {
        ClassFile {
            magic: crate::classfile::CLASS_MAGIC,
            minor_version: 0,
            major_version: 52,
            constant_pool: ConstantPool::from_entries(vec![
                ConstantPoolEntry::Utf8(name.to_string()),
                ConstantPoolEntry::Class { name_index: 1 },
            ]),
            access_flags: 0x21,
            this_class: 2,
            super_class: 0,
            interfaces_count: 0,
            methods,
        }
    }

    fn resolver() -> LineResolver {
        let mut resolver = LineResolver::with_source_root("/src");
        resolver
            .add_class(class(
                "demo/Blink",
                vec![
                    method("<init>", "()V", &[(0, 3)]),
                    method("main", "()V", &[(0, 6), (4, 7), (9, 8), (14, 7)]),
                    method("toggle", "(I)I", &[(0, 12), (5, 13)]),
                ],
            ))
            .unwrap();
        resolver
            .add_class(class(
                "demo/Blink$Led",
                vec![method("on", "()V", &[(0, 20), (3, 21)])],
            ))
            .unwrap();
        resolver
    }

    #[test]
    fn test_source_path_convention() {
        let resolver = LineResolver::with_source_root("/src");
        assert_eq!(
            resolver.source_path_for("demo/Blink$Led"),
            Path::new("/src").join("demo/Blink.java").to_string_lossy()
        );
        assert_eq!(LineResolver::new().source_path_for("demo.Blink"), "demo/Blink.java");
    }

    #[test]
    fn test_resolve_from_line() {
        let resolver = resolver();
        let source = resolver.source_path_for("demo/Blink");

        let info = resolver.resolve_from_line(13, &source).unwrap();
        assert_eq!(info.class_name, "demo/Blink");
        assert_eq!(info.method_name, "toggle");
        assert_eq!(info.descriptor, "(I)I");
        assert_eq!(info.pc, 5);

        // Inner classes share the outer source file
        let info = resolver.resolve_from_line(21, &source).unwrap();
        assert_eq!(info.class_name, "demo/Blink$Led");
        assert_eq!(info.pc, 3);
    }

    #[test]
    fn test_resolve_from_line_prefers_smallest_pc() {
        let resolver = resolver();
        let source = resolver.source_path_for("demo/Blink");

        let info = resolver.resolve_from_line(7, &source).unwrap();
        assert_eq!(info.method_name, "main");
        assert_eq!(info.pc, 4);
    }

    #[test]
    fn test_resolve_from_line_unknown() {
        let resolver = resolver();
        let source = resolver.source_path_for("demo/Blink");

        assert_eq!(
            resolver.resolve_from_line(99, &source),
            Err(ResolveError::UnresolvedLine {
                line: 99,
                source_path: source.clone()
            })
        );
        assert!(resolver.resolve_from_line(6, "/elsewhere/Blink.java").is_err());
    }

    #[test]
    fn test_resolve_from_pc_floor() {
        let resolver = resolver();

        let info = resolver.resolve_from_pc(11, "demo/Blink", "main", "()V").unwrap();
        assert_eq!(info.line, 8);
        assert_eq!(info.pc, 11);

        let info = resolver.resolve_from_pc(9, "demo\\Blink", "main", "()V").unwrap();
        assert_eq!(info.line, 8);
    }

    #[test]
    fn test_line_then_pc_round_trip() {
        let resolver = resolver();
        let source = resolver.source_path_for("demo/Blink");

        for line in [3, 6, 7, 8, 12, 13, 20, 21] {
            let info = resolver.resolve_from_line(line, &source).unwrap();
            let back = resolver
                .resolve_from_pc(info.pc, &info.class_name, &info.method_name, &info.descriptor)
                .unwrap();
            assert_eq!(back.line, line);
            assert_eq!(back.source_path, source);
        }
    }

    #[test]
    fn test_resolve_from_pc_failures() {
        let resolver = resolver();

        assert!(resolver.resolve_from_pc(0, "demo/Missing", "main", "()V").is_err());
        assert!(resolver.resolve_from_pc(0, "demo/Blink", "main", "(I)V").is_err());

        let mut resolver = LineResolver::new();
        let mut no_lines = method("run", "()V", &[]);
        no_lines.code.as_mut().unwrap().line_numbers = None;
        resolver
            .add_class(class("demo/Quiet", vec![no_lines, method("late", "()V", &[(4, 30)])]))
            .unwrap();
        assert!(resolver.resolve_from_pc(0, "demo/Quiet", "run", "()V").is_err());
        assert!(resolver.resolve_from_pc(2, "demo/Quiet", "late", "()V").is_err());
    }

    #[test]
    fn test_reloading_replaces_class() {
        let mut resolver = resolver();
        resolver
            .add_class(class("demo/Blink", vec![method("main", "()V", &[(0, 40)])]))
            .unwrap();

        assert_eq!(resolver.class_count(), 2);
        let source = resolver.source_path_for("demo/Blink");
        assert!(resolver.resolve_from_line(6, &source).is_err());
        assert_eq!(resolver.resolve_from_line(40, &source).unwrap().pc, 0);
    }

    #[test]
    fn test_breakpoint_identity_is_source_and_line() {
        let resolver = resolver();
        let source = resolver.source_path_for("demo/Blink");
        let a = resolver.resolve_from_line(7, &source).unwrap();
        let mut b = a.clone();
        b.pc = 14;

        assert_eq!(a, b);
        assert!(a.same_breakpoint(&source, 7));
        assert!(!a.same_breakpoint(&source, 8));
    }

    #[test]
    fn test_load_class_dir_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("demo")).unwrap();
        std::fs::write(dir.path().join("demo/Broken.class"), [0xCA, 0xFE]).unwrap();
        std::fs::write(dir.path().join("demo/notes.txt"), "hello").unwrap();

        let mut resolver = LineResolver::new();
        assert_eq!(resolver.load_class_dir(dir.path()), 0);
        assert_eq!(resolver.class_count(), 0);
    }
}
