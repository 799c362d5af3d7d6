//! Workspace runtime: every command a session can issue, in one place.

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use crate::archive::ArchiveBuilder;
use crate::cursor::NavigationCursor;
use crate::download::{self, Download};
use crate::error::Result;
use crate::render::TreeRenderer;
use crate::report::{ExitPolicy, ReportGenerator};
use crate::runner::{ToolOutcome, ToolRunner};
use crate::session::{Principal, SessionContext};
use crate::tree::{BatchOutcome, Entry, PlannedRemoval, TreeKind, TreeRoots, WorkspaceTree};
use crate::upload::{self, UploadedPayload};

/// Specification for a workspace deployment.
#[derive(Debug, Clone)]
pub struct WorkspaceSpec {
    /// Base directories for received and generated trees.
    pub roots: TreeRoots,
    /// Directory holding the converter and renderer executables.
    pub executable_root: PathBuf,
    /// Converter tool name.
    pub converter: String,
    /// Renderer tool name.
    pub renderer: String,
    /// Value passed to the converter's server-name flag.
    pub server_name: String,
    /// Scratch directory for rendering.
    pub scratch_dir: PathBuf,
    /// Kill tools after this long.
    pub timeout: Option<Duration>,
    /// Converter exit handling.
    pub exit_policy: ExitPolicy,
}

impl WorkspaceSpec {
    /// A spec with the default tool names and a permissive exit policy.
    pub fn new(roots: TreeRoots, executable_root: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            roots,
            executable_root: executable_root.into(),
            converter: "beagleviz".into(),
            renderer: "tree2svg".into(),
            server_name: "localhost".into(),
            scratch_dir: scratch_dir.into(),
            timeout: None,
            exit_policy: ExitPolicy::Permissive,
        }
    }
}

/// Runtime for a workspace deployment.
///
/// Holds no per-user state. Every operation takes the caller's
/// [`SessionContext`] and opens the trees it needs.
pub struct Workspace {
    spec: WorkspaceSpec,
    generator: ReportGenerator,
    renderer: TreeRenderer,
    archiver: ArchiveBuilder,
}

impl Workspace {
    /// Create a runtime from a spec.
    pub fn new(spec: WorkspaceSpec) -> Self {
        let runner = ToolRunner::new(&spec.executable_root).with_timeout(spec.timeout);
        let generator = ReportGenerator::new(runner.clone(), &spec.converter, &spec.server_name)
            .with_policy(spec.exit_policy);
        let renderer = TreeRenderer::new(runner, &spec.renderer, &spec.scratch_dir);

        Self {
            spec,
            generator,
            renderer,
            archiver: ArchiveBuilder::new(),
        }
    }

    /// Get the spec.
    pub fn spec(&self) -> &WorkspaceSpec {
        &self.spec
    }

    /// Get the report generator.
    pub fn generator(&self) -> &ReportGenerator {
        &self.generator
    }

    /// Open (provisioning if needed) one of the principal's trees.
    pub fn tree(&self, principal: &Principal, kind: TreeKind) -> Result<WorkspaceTree> {
        WorkspaceTree::open(self.spec.roots.base_for(kind), principal.user_id, kind)
    }

    /// List the cursor directory of one tree.
    pub fn list(&self, ctx: &SessionContext, kind: TreeKind) -> Result<Vec<Entry>> {
        self.tree(&ctx.principal, kind)?.list(ctx.cursor(kind))
    }

    /// Enter a sub-directory.
    pub fn chdir(&self, ctx: &mut SessionContext, kind: TreeKind, name: &str) -> Result<()> {
        let tree = self.tree(&ctx.principal, kind)?;
        ctx.cursor_mut(kind).descend(&tree, name)
    }

    /// Leave the current directory; a no-op at the root.
    pub fn updir(&self, ctx: &mut SessionContext, kind: TreeKind) {
        ctx.cursor_mut(kind).ascend();
    }

    /// Store an upload in the received cursor directory.
    pub fn upload<R: Read>(&self, ctx: &SessionContext, payload: UploadedPayload<R>) -> Result<PathBuf> {
        let tree = self.tree(&ctx.principal, TreeKind::Received)?;
        upload::receive(&tree, &ctx.received, payload)
    }

    /// Open a file for download.
    pub fn download(&self, ctx: &SessionContext, kind: TreeKind, name: &str) -> Result<Download> {
        let tree = self.tree(&ctx.principal, kind)?;
        download::respond(&tree, ctx.cursor(kind), name)
    }

    /// Create a directory in the cursor directory.
    pub fn create_directory(&self, ctx: &SessionContext, kind: TreeKind, name: &str) -> Result<()> {
        let tree = self.tree(&ctx.principal, kind)?;
        tree.create_directory(ctx.cursor(kind), name).map(drop)
    }

    /// Delete the named files; directories are skipped.
    pub fn delete_selected(&self, ctx: &SessionContext, kind: TreeKind, names: &[String]) -> Result<BatchOutcome> {
        let tree = self.tree(&ctx.principal, kind)?;
        tree.delete_selected(ctx.cursor(kind), names)
    }

    /// Recursively delete the named directories; files are skipped.
    pub fn remove_directories(&self, ctx: &SessionContext, kind: TreeKind, names: &[String]) -> Result<BatchOutcome> {
        let tree = self.tree(&ctx.principal, kind)?;
        tree.remove_directories(ctx.cursor(kind), names)
    }

    /// What removing the directory `name` would delete.
    pub fn plan_directory_removal(
        &self,
        ctx: &SessionContext,
        kind: TreeKind,
        name: &str,
    ) -> Result<Vec<PlannedRemoval>> {
        let tree = self.tree(&ctx.principal, kind)?;
        tree.plan_directory_removal(ctx.cursor(kind), name)
    }

    /// Convert selected received files into the generated cursor directory.
    pub fn generate_report(&self, ctx: &SessionContext, selected: &[String]) -> Result<ToolOutcome> {
        let received = self.tree(&ctx.principal, TreeKind::Received)?;
        let generated = self.tree(&ctx.principal, TreeKind::Generated)?;
        self.generator.generate(
            selected,
            (&received, &ctx.received),
            (&generated, &ctx.generated),
        )
    }

    /// Zip the generated cursor directory.
    pub fn build_archive(&self, ctx: &SessionContext) -> Result<Vec<u8>> {
        let tree = self.tree(&ctx.principal, TreeKind::Generated)?;
        self.archiver.build(&tree, &ctx.generated)
    }

    /// Render a posted tree description to SVG.
    pub fn render(&self, description: &[u8]) -> Result<Vec<u8>> {
        self.renderer.render(description)
    }

    /// Reset a cursor whose directory has vanished, so the view can recover.
    pub fn repair_cursor(&self, ctx: &mut SessionContext, kind: TreeKind) -> Result<bool> {
        let tree = self.tree(&ctx.principal, kind)?;
        if tree.is_directory(ctx.cursor(kind)) {
            return Ok(false);
        }
        *ctx.cursor_mut(kind) = NavigationCursor::root();
        Ok(true)
    }
}
