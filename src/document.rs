/*!
 * In-memory model of a paper source tree.
 *
 * A document is an ordered set of units keyed by their path relative to the
 * staged tree. `.tex` units carry their text; every other file is kept as a
 * reference to its bytes on disk and is never read or rewritten.
 */

use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::file_utils::{FileManager, FileType};

/// One file of the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUnit {
    /// LaTeX source text
    Tex(String),
    /// Any other file, copied byte for byte from this path
    Support(PathBuf),
}

impl SourceUnit {
    pub fn is_tex(&self) -> bool {
        matches!(self, Self::Tex(_))
    }
}

/// Ordered set of source units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    root: PathBuf,
    units: BTreeMap<PathBuf, SourceUnit>,
}

impl Document {
    /// Empty document whose support files live under `root`
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            units: BTreeMap::new(),
        }
    }

    /// Load every file under `root`
    pub fn load<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let mut document = Self::new(root);

        for relative in FileManager::list_files(root)? {
            let absolute = root.join(&relative);
            match FileManager::detect_file_type(&relative) {
                FileType::Tex => {
                    let bytes = fs::read(&absolute)
                        .with_context(|| format!("Failed to read file: {:?}", absolute))?;
                    match String::from_utf8(bytes) {
                        Ok(text) => document.insert_tex(relative, text),
                        Err(_) => {
                            warn!("{} is not valid UTF-8, copying it untranslated", relative.display());
                            document.insert_support(relative, absolute);
                        }
                    }
                }
                FileType::Support => document.insert_support(relative, absolute),
            }
        }

        debug!(
            "Loaded {} units ({} tex) from {}",
            document.len(),
            document.tex_count(),
            root.display()
        );
        Ok(document)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn insert_tex<P: Into<PathBuf>>(&mut self, path: P, text: String) {
        self.units.insert(path.into(), SourceUnit::Tex(text));
    }

    pub fn insert_support<P: Into<PathBuf>, S: Into<PathBuf>>(&mut self, path: P, source: S) {
        self.units.insert(path.into(), SourceUnit::Support(source.into()));
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn tex_count(&self) -> usize {
        self.units.values().filter(|unit| unit.is_tex()).count()
    }

    pub fn get(&self, path: &Path) -> Option<&SourceUnit> {
        self.units.get(path)
    }

    /// Text of a `.tex` unit
    pub fn tex(&self, path: &Path) -> Option<&str> {
        match self.units.get(path) {
            Some(SourceUnit::Tex(text)) => Some(text),
            _ => None,
        }
    }

    /// Relative paths in order
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.units.keys().map(PathBuf::as_path)
    }

    /// All units in path order
    pub fn units(&self) -> impl Iterator<Item = (&Path, &SourceUnit)> {
        self.units.iter().map(|(path, unit)| (path.as_path(), unit))
    }

    /// `.tex` units in path order
    pub fn tex_units(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.units.iter().filter_map(|(path, unit)| match unit {
            SourceUnit::Tex(text) => Some((path.as_path(), text.as_str())),
            SourceUnit::Support(_) => None,
        })
    }
}
