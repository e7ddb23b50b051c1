use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::parser::ClassParser;
use super::reader::OwnedBytesClassReader;
use super::{ClassFile, ClassLoadErr};
use crate::object::symbol::SymbolTable;

/// A place class files are looked up in, searched by file name such as
/// `java/lang/Object.class`.
pub trait ClassPathEntry: Send {
    fn read_class(&mut self, filename: &str) -> Result<Option<Vec<u8>>, ClassLoadErr>;
}

pub struct ClassPathDirEntry {
    dir: PathBuf,
}

impl ClassPathDirEntry {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl ClassPathEntry for ClassPathDirEntry {
    fn read_class(&mut self, filename: &str) -> Result<Option<Vec<u8>>, ClassLoadErr> {
        let class_file = self.dir.join(filename);
        match std::fs::read(&class_file) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct ClassPathJarEntry {
    archive: zip::ZipArchive<File>,
}

impl ClassPathJarEntry {
    pub fn open<P: AsRef<Path>>(jar: P) -> Result<Self, ClassLoadErr> {
        let file = File::open(jar.as_ref())?;
        let archive = zip::ZipArchive::new(file).map_err(|e| {
            ClassLoadErr::Io(format!("cannot open {}: {}", jar.as_ref().display(), e))
        })?;
        Ok(Self { archive })
    }
}

impl ClassPathEntry for ClassPathJarEntry {
    fn read_class(&mut self, filename: &str) -> Result<Option<Vec<u8>>, ClassLoadErr> {
        match self.archive.by_name(filename) {
            Ok(mut file) => {
                let mut bytes = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(ClassLoadErr::Io(e.to_string())),
        }
    }
}

/// Class files held in memory, keyed by internal class name.
#[derive(Default, Clone)]
pub struct MemoryClassPath {
    classes: HashMap<String, Vec<u8>>,
}

impl MemoryClassPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, class_name: &str, bytes: Vec<u8>) -> &mut Self {
        self.classes.insert(class_name.to_string(), bytes);
        self
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.classes.contains_key(class_name)
    }
}

impl ClassPathEntry for MemoryClassPath {
    fn read_class(&mut self, filename: &str) -> Result<Option<Vec<u8>>, ClassLoadErr> {
        let class_name = filename.strip_suffix(".class").unwrap_or(filename);
        Ok(self.classes.get(class_name).cloned())
    }
}

/// Produces the decoded form of a class by name.
pub trait ClassLoader: Send {
    fn load(&mut self, class_name: &str, symbols: &mut SymbolTable)
        -> Result<ClassFile, ClassLoadErr>;
}

#[derive(Default)]
pub struct ClassPathLoader {
    cp_entries: Vec<Box<dyn ClassPathEntry>>,
}

impl ClassPathLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds entries from directories and `.jar`/`.zip` files.
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self, ClassLoadErr> {
        let mut loader = Self::new();
        for path in paths {
            let is_archive = path
                .extension()
                .map_or(false, |ext| ext == "jar" || ext == "zip");
            if is_archive {
                loader.add_entry(Box::new(ClassPathJarEntry::open(path)?));
            } else {
                loader.add_entry(Box::new(ClassPathDirEntry::new(path)));
            }
        }
        Ok(loader)
    }

    pub fn add_entry(&mut self, entry: Box<dyn ClassPathEntry>) -> &mut Self {
        self.cp_entries.push(entry);
        self
    }

    /// Adds an entry searched before every existing one.
    pub fn prepend_entry(&mut self, entry: Box<dyn ClassPathEntry>) -> &mut Self {
        self.cp_entries.insert(0, entry);
        self
    }
}

impl ClassLoader for ClassPathLoader {
    fn load(
        &mut self,
        class_name: &str,
        symbols: &mut SymbolTable,
    ) -> Result<ClassFile, ClassLoadErr> {
        let filename = format!("{}.class", class_name);
        for entry in self.cp_entries.iter_mut() {
            if let Some(bytes) = entry.read_class(&filename)? {
                let reader = OwnedBytesClassReader::new(bytes);
                let class_file = ClassParser::new(Box::new(reader), symbols).parse_class()?;
                if class_file.this_class.as_str() != class_name {
                    return Err(ClassLoadErr::InvalidFormat(format!(
                        "{} declares class {}",
                        filename, class_file.this_class
                    )));
                }
                return Ok(class_file);
            }
        }
        Err(ClassLoadErr::NotFound(class_name.to_string()))
    }
}
