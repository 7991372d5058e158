//! Compiler adapter
//!
//! Runs the external LaTeX engine in a fresh scratch directory and copies
//! the produced PDF to its destination. Scratch directories are never
//! reused across calls (stale auxiliary files from a previous run can
//! change the outcome) and are removed on exit, success or failure.

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::LatexConfig;

/// How much of the engine output to keep as the diagnostic, in characters.
const DIAGNOSTIC_TAIL_CHARS: usize = 8000;

#[derive(Debug, Error)]
pub enum CompileError {
    /// Engine exited non-zero; carries the captured output tail.
    #[error("LaTeX compile failed:\n{0}")]
    Engine(String),

    /// All passes exited zero but no PDF appeared.
    #[error("PDF not produced. Output:\n{0}")]
    MissingOutput(String),

    #[error("Failed to launch {engine}: {message}")]
    Launch { engine: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    /// Diagnostic text to feed the repair prompt.
    pub fn diagnostic(&self) -> String {
        self.to_string()
    }
}

/// Compiles a LaTeX source into a PDF at the requested destination.
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, tex_source: &str, dest: &Path, toc: bool) -> Result<(), CompileError>;
}

/// Subprocess-backed compiler using the configured engine.
pub struct LatexCompiler {
    engine: String,
    max_runs: u32,
    scratch_dir: PathBuf,
}

impl LatexCompiler {
    pub fn new(config: &LatexConfig, scratch_dir: &Path) -> Self {
        Self {
            engine: config.engine.clone(),
            max_runs: config.max_runs.clamp(1, 5),
            scratch_dir: scratch_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl Compiler for LatexCompiler {
    async fn compile(&self, tex_source: &str, dest: &Path, toc: bool) -> Result<(), CompileError> {
        std::fs::create_dir_all(&self.scratch_dir)?;
        let workdir = tempfile::Builder::new()
            .prefix("tex_")
            .tempdir_in(&self.scratch_dir)?;

        std::fs::write(workdir.path().join("main.tex"), tex_source)?;

        // Two passes resolve ToC cross-references; one suffices otherwise.
        let wanted = if toc { 2 } else { 1 };
        let runs = wanted.min(self.max_runs);

        let mut last_output = String::new();
        for pass in 1..=runs {
            let output = Command::new(&self.engine)
                .args([
                    "-interaction=nonstopmode",
                    "-halt-on-error",
                    "-file-line-error",
                    "-no-shell-escape",
                    "main.tex",
                ])
                .current_dir(workdir.path())
                .output()
                .map_err(|e| CompileError::Launch {
                    engine: self.engine.clone(),
                    message: e.to_string(),
                })?;

            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            last_output = tail_chars(&combined, DIAGNOSTIC_TAIL_CHARS);

            if !output.status.success() {
                tracing::warn!(engine = %self.engine, pass, "LaTeX engine exited non-zero");
                return Err(CompileError::Engine(last_output));
            }
        }

        let produced = workdir.path().join("main.pdf");
        if !produced.exists() {
            return Err(CompileError::MissingOutput(last_output));
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&produced, dest)?;
        tracing::info!(dest = %dest.display(), "Compiled PDF");

        Ok(())
    }
}

fn tail_chars(s: &str, max: usize) -> String {
    let count = s.chars().count();
    if count <= max {
        s.to_string()
    } else {
        s.chars().skip(count - max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_only_last_characters() {
        assert_eq!(tail_chars("abcdef", 4), "cdef");
        assert_eq!(tail_chars("ab", 4), "ab");
    }

    // The real engine is exercised through a stand-in script: the adapter
    // only cares about exit codes and whether main.pdf appears.
    #[cfg(unix)]
    mod with_fake_engine {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn fake_engine(dir: &Path, script_body: &str) -> PathBuf {
            let path = dir.join("fake-engine");
            std::fs::write(&path, format!("#!/bin/sh\n{script_body}\n")).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        fn compiler_for(engine: &Path, scratch: &Path, max_runs: u32) -> LatexCompiler {
            LatexCompiler::new(
                &LatexConfig {
                    engine: engine.display().to_string(),
                    max_runs,
                },
                scratch,
            )
        }

        #[tokio::test]
        async fn success_copies_pdf_to_destination() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_engine(dir.path(), "printf fake-pdf > main.pdf");
            let compiler = compiler_for(&engine, dir.path(), 2);
            let dest = dir.path().join("out/doc.pdf");

            compiler
                .compile("\\documentclass{article}", &dest, false)
                .await
                .unwrap();

            assert_eq!(std::fs::read_to_string(&dest).unwrap(), "fake-pdf");
        }

        #[tokio::test]
        async fn nonzero_exit_surfaces_diagnostic() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_engine(dir.path(), "echo '! Undefined control sequence.'; exit 1");
            let compiler = compiler_for(&engine, dir.path(), 2);
            let dest = dir.path().join("doc.pdf");

            let err = compiler.compile("broken", &dest, false).await.unwrap_err();
            match err {
                CompileError::Engine(diag) => {
                    assert!(diag.contains("Undefined control sequence"))
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert!(!dest.exists());
        }

        #[tokio::test]
        async fn missing_pdf_is_an_error_even_on_exit_zero() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_engine(dir.path(), "echo ok");
            let compiler = compiler_for(&engine, dir.path(), 2);

            let err = compiler
                .compile("src", &dir.path().join("doc.pdf"), false)
                .await
                .unwrap_err();
            assert!(matches!(err, CompileError::MissingOutput(_)));
        }

        #[tokio::test]
        async fn toc_requests_two_passes() {
            let dir = tempfile::tempdir().unwrap();
            // Each invocation appends a line; the pass count lands in the PDF.
            let engine = fake_engine(dir.path(), "echo run >> main.pdf");
            let compiler = compiler_for(&engine, dir.path(), 5);
            let dest = dir.path().join("doc.pdf");

            compiler.compile("src", &dest, true).await.unwrap();
            assert_eq!(std::fs::read_to_string(&dest).unwrap().lines().count(), 2);
        }

        #[tokio::test]
        async fn max_runs_caps_toc_passes() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_engine(dir.path(), "echo run >> main.pdf");
            let compiler = compiler_for(&engine, dir.path(), 1);
            let dest = dir.path().join("doc.pdf");

            compiler.compile("src", &dest, true).await.unwrap();
            assert_eq!(std::fs::read_to_string(&dest).unwrap().lines().count(), 1);
        }

        #[tokio::test]
        async fn scratch_directory_is_removed() {
            let dir = tempfile::tempdir().unwrap();
            let scratch = dir.path().join("scratch");
            let engine = fake_engine(dir.path(), "printf x > main.pdf");
            let compiler = compiler_for(&engine, &scratch, 2);

            compiler
                .compile("src", &dir.path().join("doc.pdf"), false)
                .await
                .unwrap();

            let leftovers: Vec<_> = std::fs::read_dir(&scratch).unwrap().collect();
            assert!(leftovers.is_empty());
        }
    }
}
