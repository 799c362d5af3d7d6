//! Report generation: selected received files through the converter tool
//! into the generated tree.

use std::ffi::OsString;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cursor::NavigationCursor;
use crate::error::{DocspaceError, Result};
use crate::runner::{ToolInvocation, ToolOutcome, ToolRunner};
use crate::tree::WorkspaceTree;

/// How a converter's non-zero exit is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitPolicy {
    /// Log a warning and report success.
    #[default]
    Permissive,
    /// Fail with [`DocspaceError::NonZeroExit`].
    Strict,
}

/// A validated conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportJob {
    /// Absolute paths of the selected received files, in selection order.
    pub inputs: Vec<PathBuf>,
    /// Absolute path of the generated tree's current directory.
    pub output_dir: PathBuf,
    /// Value of the server-name flag.
    pub server_name: String,
}

impl ReportJob {
    /// Validate the whole selection before anything runs.
    ///
    /// Every name must be an existing file in the received cursor directory.
    /// An empty selection or any directory fails with
    /// [`DocspaceError::InvalidSelection`].
    pub fn plan(
        selected: &[String],
        received: (&WorkspaceTree, &NavigationCursor),
        generated: (&WorkspaceTree, &NavigationCursor),
        server_name: &str,
    ) -> Result<Self> {
        let (received_tree, received_cursor) = received;
        let (generated_tree, generated_cursor) = generated;

        if selected.is_empty() {
            return Err(DocspaceError::InvalidSelection {
                reason: "no input files selected".into(),
            });
        }

        let mut inputs = Vec::with_capacity(selected.len());
        for name in selected {
            let entry = received_tree.entry(received_cursor, name)?;
            if !entry.is_file() {
                return Err(DocspaceError::InvalidSelection {
                    reason: format!("'{name}' is not a regular file"),
                });
            }
            inputs.push(received_tree.resolve(received_cursor, name)?);
        }

        Ok(Self {
            inputs,
            output_dir: generated_tree.absolute_dir(generated_cursor)?,
            server_name: server_name.to_string(),
        })
    }

    /// `-b <server> -o <output dir> <input>...`, one argument per element.
    pub fn tool_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-b".into(),
            self.server_name.clone().into(),
            "-o".into(),
            self.output_dir.clone().into(),
        ];
        args.extend(self.inputs.iter().map(|input| input.clone().into_os_string()));
        args
    }
}

/// Runs the converter over a selection of received files.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    runner: ToolRunner,
    converter: String,
    server_name: String,
    policy: ExitPolicy,
}

impl ReportGenerator {
    /// A permissive generator using `converter` from the runner's root.
    pub fn new(runner: ToolRunner, converter: impl Into<String>, server_name: impl Into<String>) -> Self {
        Self {
            runner,
            converter: converter.into(),
            server_name: server_name.into(),
            policy: ExitPolicy::default(),
        }
    }

    /// Set the exit policy.
    pub fn with_policy(mut self, policy: ExitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Current exit policy.
    pub fn policy(&self) -> ExitPolicy {
        self.policy
    }

    /// Convert `selected` into the generated cursor directory.
    ///
    /// Missing executables and timeouts always fail. A non-zero exit fails
    /// only under [`ExitPolicy::Strict`].
    pub fn generate(
        &self,
        selected: &[String],
        received: (&WorkspaceTree, &NavigationCursor),
        generated: (&WorkspaceTree, &NavigationCursor),
    ) -> Result<ToolOutcome> {
        let job = ReportJob::plan(selected, received, generated, &self.server_name)?;
        let invocation =
            ToolInvocation::new(&self.converter, &job.output_dir).args(job.tool_args());

        info!(
            tool = %self.converter,
            inputs = job.inputs.len(),
            output = %job.output_dir.display(),
            "generating report"
        );
        let outcome = self.runner.run(&invocation)?;

        match self.policy {
            ExitPolicy::Strict => outcome.check(),
            ExitPolicy::Permissive => {
                if !outcome.success() {
                    warn!(
                        tool = %outcome.tool,
                        exit_code = ?outcome.exit_code,
                        stderr = %String::from_utf8_lossy(&outcome.stderr),
                        "converter failed; continuing"
                    );
                }
                Ok(outcome)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeKind;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _base: TempDir,
        bin: TempDir,
        received: WorkspaceTree,
        generated: WorkspaceTree,
        root: NavigationCursor,
    }

    fn fixture() -> Fixture {
        let base = tempdir().unwrap();
        let received = WorkspaceTree::open(base.path().join("received"), 9, TreeKind::Received).unwrap();
        let generated = WorkspaceTree::open(base.path().join("generated"), 9, TreeKind::Generated).unwrap();
        std::fs::write(received.root_path().join("a.xml"), b"<a/>").unwrap();
        std::fs::write(received.root_path().join("b c.xml"), b"<b/>").unwrap();
        received.create_directory(&NavigationCursor::root(), "folder").unwrap();
        Fixture {
            _base: base,
            bin: tempdir().unwrap(),
            received,
            generated,
            root: NavigationCursor::root(),
        }
    }

    #[test]
    fn test_plan_builds_argument_vector() {
        let f = fixture();
        let job = ReportJob::plan(
            &["b c.xml".to_string(), "a.xml".to_string()],
            (&f.received, &f.root),
            (&f.generated, &f.root),
            "forum.example",
        )
        .unwrap();

        let args = job.tool_args();
        assert_eq!(args[0], "-b");
        assert_eq!(args[1], "forum.example");
        assert_eq!(args[2], "-o");
        assert_eq!(PathBuf::from(&args[3]), f.generated.root_path());
        assert_eq!(PathBuf::from(&args[4]), f.received.root_path().join("b c.xml"));
        assert_eq!(PathBuf::from(&args[5]), f.received.root_path().join("a.xml"));
    }

    #[test]
    fn test_empty_selection_is_invalid() {
        let f = fixture();
        let generator = ReportGenerator::new(ToolRunner::new(f.bin.path()), "beagleviz", "srv");
        let result = generator.generate(&[], (&f.received, &f.root), (&f.generated, &f.root));
        assert!(matches!(result, Err(DocspaceError::InvalidSelection { .. })));
    }

    #[test]
    fn test_directory_in_selection_is_invalid() {
        let f = fixture();
        let result = ReportJob::plan(
            &["a.xml".to_string(), "folder".to_string()],
            (&f.received, &f.root),
            (&f.generated, &f.root),
            "srv",
        );
        assert!(matches!(result, Err(DocspaceError::InvalidSelection { .. })));
    }

    #[test]
    fn test_missing_converter_fails_even_when_permissive() {
        let f = fixture();
        let generator = ReportGenerator::new(ToolRunner::new(f.bin.path()), "beagleviz", "srv");
        let result = generator.generate(
            &["a.xml".to_string()],
            (&f.received, &f.root),
            (&f.generated, &f.root),
        );
        assert!(matches!(result, Err(DocspaceError::ToolNotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_policy() {
        use std::os::unix::fs::PermissionsExt;

        let f = fixture();
        let tool = f.bin.path().join("beagleviz");
        std::fs::write(&tool, "#!/bin/sh\nexit 2\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        let selected = ["a.xml".to_string()];

        let permissive = ReportGenerator::new(ToolRunner::new(f.bin.path()), "beagleviz", "srv");
        let outcome = permissive
            .generate(&selected, (&f.received, &f.root), (&f.generated, &f.root))
            .unwrap();
        assert_eq!(outcome.exit_code, Some(2));

        let strict = permissive.with_policy(ExitPolicy::Strict);
        let result = strict.generate(&selected, (&f.received, &f.root), (&f.generated, &f.root));
        assert!(matches!(result, Err(DocspaceError::NonZeroExit { code: Some(2), .. })));
    }
}
