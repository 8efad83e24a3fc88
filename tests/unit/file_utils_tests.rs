/*!
 * Tests for file utility functions
 */

use std::fs;
use std::path::{Path, PathBuf};
use anyhow::Result;
use arxlate::file_utils::{FileManager, FileType};
use crate::common;

/// Test that file_exists returns true for existing files
#[test]
fn test_file_exists_withExistingFile_shouldReturnTrue() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let test_file = common::create_test_file(temp_dir.path(), "test_file_exists.tmp", "test content")?;

    assert!(FileManager::file_exists(&test_file));
    assert!(!FileManager::dir_exists(&test_file));
    Ok(())
}

/// Test that file_exists returns false for non-existent files
#[test]
fn test_file_exists_withNonExistentFile_shouldReturnFalse() {
    assert!(!FileManager::file_exists("non_existent_file.tmp"));
}

/// Test listing a nested tree
#[test]
fn test_list_files_withNestedTree_shouldReturnSortedRelativePaths() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    common::create_test_file(temp_dir.path(), "b.tex", "")?;
    common::create_test_file(temp_dir.path(), "a/z.sty", "")?;
    common::create_test_file(temp_dir.path(), "a/c.tex", "")?;

    let files = FileManager::list_files(temp_dir.path())?;

    assert_eq!(
        files,
        vec![PathBuf::from("a/c.tex"), PathBuf::from("a/z.sty"), PathBuf::from("b.tex")]
    );
    Ok(())
}

/// Test finding files by extension, case-insensitively
#[test]
fn test_find_files_withMixedExtensions_shouldMatchIgnoringCase() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    common::create_test_file(temp_dir.path(), "main.tex", "")?;
    common::create_test_file(temp_dir.path(), "sec/INTRO.TEX", "")?;
    common::create_test_file(temp_dir.path(), "refs.bib", "")?;

    let files = FileManager::find_files(temp_dir.path(), ".tex")?;

    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| f.starts_with(temp_dir.path())));
    Ok(())
}

/// Test emptiness checks
#[test]
fn test_is_dir_empty_withVariousDirs_shouldReportCorrectly() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    assert!(FileManager::is_dir_empty(temp_dir.path())?);
    assert!(FileManager::is_dir_empty(temp_dir.path().join("missing"))?);

    common::create_test_file(temp_dir.path(), "x.txt", "x")?;
    assert!(!FileManager::is_dir_empty(temp_dir.path())?);
    Ok(())
}

/// Test byte-exact copies of binary files
#[test]
fn test_copy_file_withBinaryContent_shouldCopyBytes() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = temp_dir.path().join("figure.png");
    fs::write(&source, common::SAMPLE_FIGURE)?;
    let target = temp_dir.path().join("out/deep/figure.png");

    FileManager::copy_file(&source, &target)?;

    assert_eq!(fs::read(&target)?, common::SAMPLE_FIGURE);
    assert!(FileManager::copy_file(temp_dir.path().join("missing"), &target).is_err());
    Ok(())
}

/// Test appending timestamped lines to a log
#[test]
fn test_append_to_log_file_withTwoEntries_shouldKeepBoth() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let log = temp_dir.path().join("logs/arxlate.issues.log");

    FileManager::append_to_log_file(&log, "[WARN] first")?;
    FileManager::append_to_log_file(&log, "[ERROR] second")?;

    let content = FileManager::read_to_string(&log)?;
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("[WARN] first"));
    assert!(lines[1].starts_with('['));
    Ok(())
}

/// Test file type detection
#[test]
fn test_detect_file_type_withExtensions_shouldClassify() {
    assert_eq!(FileManager::detect_file_type(Path::new("main.tex")), FileType::Tex);
    assert_eq!(FileManager::detect_file_type(Path::new("MAIN.TeX")), FileType::Tex);
    assert_eq!(FileManager::detect_file_type(Path::new("refs.bib")), FileType::Support);
    assert_eq!(FileManager::detect_file_type(Path::new("Makefile")), FileType::Support);
}
