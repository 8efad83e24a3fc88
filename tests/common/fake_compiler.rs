/*!
 * Fake compiler for tests
 *
 * Writes an empty PDF next to the root document instead of running a TeX
 * engine, and counts passes so tests can assert on rerun behavior.
 */

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arxlate::compiler::{CompileOutput, Compiler};
use arxlate::errors::CompileError;

/// How the fake compiler behaves
#[derive(Debug, Clone)]
pub enum FakeBehavior {
    /// Every pass succeeds with a clean log
    Succeed,
    /// The first pass asks for a rerun, later passes are clean
    RerunOnce,
    /// Every pass asks for a rerun
    AlwaysRerun,
    /// Every pass fails with this log
    Fail(String),
    /// Succeeds but never writes a PDF
    NoOutput,
}

#[derive(Debug, Clone)]
pub struct FakeCompiler {
    behavior: FakeBehavior,
    passes: Arc<AtomicUsize>,
}

impl FakeCompiler {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            passes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(FakeBehavior::Succeed)
    }

    /// Number of passes run so far
    pub fn pass_count(&self) -> usize {
        self.passes.load(Ordering::SeqCst)
    }

    fn write_pdf(work_dir: &Path, root: &Path) {
        let pdf = work_dir.join(root.with_extension("pdf"));
        fs::write(pdf, b"%PDF-1.5\n%fake\n").expect("fake compiler could not write PDF");
    }
}

#[async_trait]
impl Compiler for FakeCompiler {
    async fn compile(&self, work_dir: &Path, root: &Path) -> Result<CompileOutput, CompileError> {
        let pass = self.passes.fetch_add(1, Ordering::SeqCst) + 1;

        let (success, log) = match &self.behavior {
            FakeBehavior::Succeed => (true, "Output written on main.pdf".to_string()),
            FakeBehavior::RerunOnce if pass == 1 => (
                true,
                "LaTeX Warning: Label(s) may have changed. Rerun to get cross-references right.".to_string(),
            ),
            FakeBehavior::RerunOnce => (true, "Output written on main.pdf".to_string()),
            FakeBehavior::AlwaysRerun => (true, "Rerun to get cross-references right.".to_string()),
            FakeBehavior::Fail(log) => (false, log.clone()),
            FakeBehavior::NoOutput => (true, "No pages of output.".to_string()),
        };

        if success && !matches!(self.behavior, FakeBehavior::NoOutput) {
            Self::write_pdf(work_dir, root);
        }

        Ok(CompileOutput {
            success,
            exit_code: Some(if success { 0 } else { 1 }),
            log,
        })
    }

    fn name(&self) -> String {
        "fake".to_string()
    }
}
