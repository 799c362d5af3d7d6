//! # Docspace
//!
//! Per-user document sandboxes with report generation through an external
//! converter.
//!
//! Every user owns two trees: a *received* tree for uploaded source documents
//! and a *generated* tree for converter output. A session keeps one
//! [`NavigationCursor`] per tree.
//!
//! | Concern | Type | Enforcement |
//! |---------|------|-------------|
//! | Names | [`PathSegment`] | single component, no `..`, no separators |
//! | Containment | [`WorkspaceTree`] | `cap-std` directory handles plus canonical prefix checks |
//! | Uploads | [`receive`] | temp file, sync, atomic rename |
//! | Tools | [`ToolRunner`] | argument vector, fixed executable root, monotonic [`Deadline`] |
//! | Reports | [`ReportGenerator`] | whole selection validated before the converter starts |
//! | Archives | [`ArchiveBuilder`] | current directory only, control files excluded |
//!
//! ## Design Principles
//!
//! 1. **Reject, never clamp**: a name that would leave the sandbox is an
//!    error. Nothing is silently rewritten into something acceptable.
//!
//! 2. **Validate before mutating**: batch deletes and report jobs check every
//!    input first; a bad entry aborts with nothing changed.
//!
//! 3. **No global state**: callers pass a [`SessionContext`] into every
//!    [`Workspace`] operation.
//!
//! ## Example
//!
//! ```ignore
//! use docspace::{Principal, SessionContext, TreeKind, TreeRoots, Workspace, WorkspaceSpec};
//!
//! let roots = TreeRoots {
//!     received: "/srv/docspace/received".into(),
//!     generated: "/srv/docspace/generated".into(),
//! };
//! let workspace = Workspace::new(WorkspaceSpec::new(roots, "/opt/docspace/bin", "/tmp"));
//! let mut ctx = SessionContext::new(Principal { user_id: 42, level: 2 });
//!
//! workspace.chdir(&mut ctx, TreeKind::Received, "inputs")?;
//! workspace.generate_report(&ctx, &["tree.xml".to_string()])?;
//! let zip = workspace.build_archive(&ctx)?;
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]

mod archive;
mod cursor;
mod download;
mod error;
mod render;
mod report;
mod runner;
mod segment;
mod session;
mod time;
mod tree;
mod upload;
mod workspace;

pub use archive::{collect_entries, ArchiveBuilder, ArchiveEntry, ARCHIVE_FILE_NAME, CONTROL_FILES};
pub use cursor::NavigationCursor;
pub use download::{content_type_for, respond, Download, CONTENT_TYPES, OCTET_STREAM};
pub use error::{DocspaceError, Result};
pub use render::{TreeRenderer, SVG_CONTENT_TYPE};
pub use report::{ExitPolicy, ReportGenerator, ReportJob};
pub use runner::{ToolInvocation, ToolOutcome, ToolRunner};
pub use segment::{ensure_contained, resolve, PathSegment};
pub use session::{Principal, SessionContext, REQUIRED_LEVEL};
pub use time::Deadline;
pub use tree::{BatchOutcome, Entry, EntryKind, PlannedRemoval, TreeKind, TreeRoots, WorkspaceTree};
pub use upload::{receive, UploadedPayload};
pub use workspace::{Workspace, WorkspaceSpec};
