//! Ad-hoc rendering of one tree description to SVG.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::Builder;
use tracing::info;

use crate::error::{DocspaceError, Result};
use crate::runner::{ToolInvocation, ToolRunner};

/// Media type of rendered output.
pub const SVG_CONTENT_TYPE: &str = "image/svg+xml";

/// Runs the renderer tool over a posted tree description.
///
/// Input and output live in scratch temp files that are removed when the
/// call returns, whether it succeeded or not.
#[derive(Debug, Clone)]
pub struct TreeRenderer {
    runner: ToolRunner,
    renderer: String,
    scratch_dir: PathBuf,
}

impl TreeRenderer {
    /// A renderer running `renderer` with scratch files in `scratch_dir`.
    pub fn new(runner: ToolRunner, renderer: impl Into<String>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            renderer: renderer.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Scratch directory for temp files.
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Render `description` and return the SVG bytes.
    pub fn render(&self, description: &[u8]) -> Result<Vec<u8>> {
        std::fs::create_dir_all(&self.scratch_dir)
            .map_err(|e| DocspaceError::io(&self.scratch_dir, e))?;

        let mut input = Builder::new()
            .prefix("tree-")
            .suffix(".txt")
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| DocspaceError::io(&self.scratch_dir, e))?;
        input
            .write_all(description)
            .and_then(|()| input.flush())
            .map_err(|e| DocspaceError::io(input.path(), e))?;
        let input = input.into_temp_path();

        let output = Builder::new()
            .prefix("tree-")
            .suffix(".svg")
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| DocspaceError::io(&self.scratch_dir, e))?
            .into_temp_path();

        let invocation = ToolInvocation::new(&self.renderer, &self.scratch_dir)
            .arg(input.as_os_str())
            .arg(output.as_os_str());
        self.runner.run(&invocation)?.check()?;

        let svg = std::fs::read(&output).map_err(|e| DocspaceError::io(&output, e))?;
        info!(tool = %self.renderer, input_bytes = description.len(), svg_bytes = svg.len(), "rendered tree");
        Ok(svg)
    }
}
