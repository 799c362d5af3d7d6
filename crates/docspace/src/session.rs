//! Caller identity and per-session navigation state.

use serde::{Deserialize, Serialize};

use crate::cursor::NavigationCursor;
use crate::tree::TreeKind;

/// Minimum access level for any workspace command.
pub const REQUIRED_LEVEL: u32 = 2;

/// An authenticated user, as vouched for by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// User id; also names the user's tree directories.
    pub user_id: i64,
    /// Access level.
    pub level: u32,
}

impl Principal {
    /// Whether this principal may use the workspace at all.
    pub fn can_use_workspace(&self) -> bool {
        self.level >= REQUIRED_LEVEL && self.user_id >= 0
    }
}

/// Everything the core needs to know about one session.
///
/// Each tree kind has its own cursor; moving in one never moves the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Who is calling.
    pub principal: Principal,
    /// Cursor in the received tree.
    pub received: NavigationCursor,
    /// Cursor in the generated tree.
    pub generated: NavigationCursor,
}

impl SessionContext {
    /// A fresh session with both cursors at the root.
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            received: NavigationCursor::root(),
            generated: NavigationCursor::root(),
        }
    }

    /// Cursor for `kind`.
    pub fn cursor(&self, kind: TreeKind) -> &NavigationCursor {
        match kind {
            TreeKind::Received => &self.received,
            TreeKind::Generated => &self.generated,
        }
    }

    /// Mutable cursor for `kind`.
    pub fn cursor_mut(&mut self, kind: TreeKind) -> &mut NavigationCursor {
        match kind {
            TreeKind::Received => &mut self.received,
            TreeKind::Generated => &mut self.generated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_gate() {
        assert!(!Principal { user_id: 1, level: 1 }.can_use_workspace());
        assert!(Principal { user_id: 1, level: 2 }.can_use_workspace());
        assert!(Principal { user_id: 1, level: 9 }.can_use_workspace());
        assert!(!Principal { user_id: -1, level: 9 }.can_use_workspace());
    }

    #[test]
    fn test_cursors_are_independent() {
        let mut ctx = SessionContext::new(Principal { user_id: 5, level: 2 });
        *ctx.cursor_mut(TreeKind::Generated) = "/out/".parse().unwrap();

        assert!(ctx.cursor(TreeKind::Received).is_root());
        assert_eq!(ctx.cursor(TreeKind::Generated).to_string(), "/out/");
    }

    #[test]
    fn test_session_serializes_cursor_strings() {
        let mut ctx = SessionContext::new(Principal { user_id: 5, level: 3 });
        ctx.received = "/a/b/".parse().unwrap();

        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["received"], "/a/b/");
        assert_eq!(json["generated"], "/");

        let back: SessionContext = serde_json::from_value(json).unwrap();
        assert_eq!(back, ctx);
    }

    #[test]
    fn test_tampered_cursor_is_rejected() {
        let json = serde_json::json!({
            "principal": { "user_id": 5, "level": 3 },
            "received": "/../../etc/",
            "generated": "/",
        });
        assert!(serde_json::from_value::<SessionContext>(json).is_err());
    }
}
