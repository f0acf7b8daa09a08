//! Lazy log directory browser.
//!
//! [`TreeProvider`] lists children on demand and never caches them, so every
//! query reflects the filesystem as it is now. [`RefreshSignal`] tells a
//! display that its rows are stale, and [`TreeView`] is the display-side
//! bookkeeping that re-queries on refresh.

mod refresh;
mod tree;
mod view;

pub use refresh::RefreshSignal;
pub use tree::{
    ActionTree, CommandRef, FilesystemTree, NodeKind, NodeLocation, TreeNode, TreeProvider,
    ACTION_VIEW_ID,
};
pub use view::{TreeRow, TreeView};
