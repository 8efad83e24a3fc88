/*!
 * Writing a translated document back to disk.
 *
 * The tree is written to a hidden staging directory next to the output
 * directory and moved into place only once every file is written, so a
 * failed assembly never leaves a half-written output tree behind.
 */

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::compiler;
use crate::document::{Document, SourceUnit};
use crate::file_utils::FileManager;
use crate::latex::{FontSetup, preamble};

/// Name of the issues log written into the output directory
pub const ISSUES_LOG_NAME: &str = "arxlate.issues.log";

/// How the output tree is written
#[derive(Debug, Clone, Default)]
pub struct AssemblyOptions {
    /// Replace an existing, non-empty output directory
    pub force_overwrite: bool,
    /// CJK font setup applied to the root document
    pub font_setup: Option<FontSetup>,
}

/// Summary of a written output tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledTree {
    pub output_dir: PathBuf,
    /// Root document, relative to `output_dir`
    pub root_document: Option<PathBuf>,
    pub tex_files: usize,
    pub support_files: usize,
    pub font_applied: bool,
}

pub struct Assembler;

impl Assembler {
    /// Write every unit of `document` under `output_dir`
    pub fn assemble(document: &Document, output_dir: &Path, options: &AssemblyOptions) -> Result<AssembledTree> {
        Self::prepare_output_dir(output_dir, options.force_overwrite)?;

        let root_document = compiler::select_root(document.tex_units());
        let staging = Self::staging_dir(output_dir)?;
        FileManager::remove_dir_all(&staging)?;

        let result = Self::write_tree(document, &staging, root_document.as_deref(), options);
        let (tex_files, support_files, font_applied) = match result {
            Ok(counts) => counts,
            Err(e) => {
                if let Err(cleanup) = FileManager::remove_dir_all(&staging) {
                    warn!("Failed to remove staging directory {}: {}", staging.display(), cleanup);
                }
                return Err(e);
            }
        };

        FileManager::remove_dir_all(output_dir)?;
        fs::rename(&staging, output_dir).with_context(|| {
            format!("Failed to move {} to {}", staging.display(), output_dir.display())
        })?;

        info!(
            "Wrote {} tex and {} support files to {}",
            tex_files,
            support_files,
            output_dir.display()
        );

        Ok(AssembledTree {
            output_dir: output_dir.to_path_buf(),
            root_document,
            tex_files,
            support_files,
            font_applied,
        })
    }

    /// Refuse to overwrite a non-empty output directory without `force`.
    ///
    /// A directory holding only an issues log from an earlier failed run
    /// counts as empty.
    fn prepare_output_dir(output_dir: &Path, force_overwrite: bool) -> Result<()> {
        if !output_dir.exists() {
            return Ok(());
        }
        if !output_dir.is_dir() {
            return Err(anyhow!("Output path exists and is not a directory: {:?}", output_dir));
        }

        let occupied = fs::read_dir(output_dir)
            .with_context(|| format!("Failed to read directory: {:?}", output_dir))?
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name() != ISSUES_LOG_NAME);

        if occupied && !force_overwrite {
            return Err(anyhow!(
                "Output directory {:?} is not empty (use -f to force overwrite)",
                output_dir
            ));
        }
        Ok(())
    }

    fn staging_dir(output_dir: &Path) -> Result<PathBuf> {
        let name = output_dir
            .file_name()
            .ok_or_else(|| anyhow!("Output directory has no name: {:?}", output_dir))?;
        Ok(output_dir.with_file_name(format!(".{}.partial", name.to_string_lossy())))
    }

    fn write_tree(
        document: &Document,
        staging: &Path,
        root_document: Option<&Path>,
        options: &AssemblyOptions,
    ) -> Result<(usize, usize, bool)> {
        FileManager::ensure_dir(staging)?;

        let mut tex_files = 0;
        let mut support_files = 0;
        let mut font_applied = false;

        for (path, unit) in document.units() {
            let destination = staging.join(path);
            match unit {
                SourceUnit::Tex(text) => {
                    let text = match &options.font_setup {
                        Some(fonts) => {
                            let (text, applied) = Self::apply_fonts(path, text, root_document, fonts);
                            font_applied |= applied;
                            text
                        }
                        None => text.clone(),
                    };
                    FileManager::write_to_file(&destination, &text)?;
                    tex_files += 1;
                }
                SourceUnit::Support(source) => {
                    FileManager::copy_file(source, &destination)?;
                    support_files += 1;
                }
            }
            debug!("Wrote {}", path.display());
        }

        Ok((tex_files, support_files, font_applied))
    }

    fn apply_fonts(path: &Path, text: &str, root_document: Option<&Path>, fonts: &FontSetup) -> (String, bool) {
        if root_document != Some(path) {
            return (preamble::strip_cjk_environments(text), false);
        }
        match preamble::apply_font_setup(text, fonts) {
            Some(updated) => {
                info!("Configured CJK font '{}' in {}", fonts.main_font, path.display());
                (updated, true)
            }
            None => {
                warn!("No \\documentclass line in {}, font setup skipped", path.display());
                (text.to_string(), false)
            }
        }
    }
}
