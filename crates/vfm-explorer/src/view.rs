use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use tokio::sync::watch;

use crate::{RefreshSignal, TreeNode, TreeProvider};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeRow {
    pub depth: usize,
    pub node: TreeNode,
    pub expanded: bool,
}

/// Rows currently on display plus the set of expanded directories.
///
/// Rows are never patched in place: a rebuild re-queries the provider from
/// the root and re-expands every remembered directory that is still listed.
pub struct TreeView {
    provider: TreeProvider,
    expanded: HashSet<PathBuf>,
    rows: Vec<TreeRow>,
    refresh_rx: watch::Receiver<u64>,
}

impl TreeView {
    pub fn new(provider: TreeProvider, refresh: &RefreshSignal) -> Self {
        let mut refresh_rx = refresh.subscribe();
        refresh_rx.mark_unchanged();
        Self {
            provider,
            expanded: HashSet::new(),
            rows: Vec::new(),
            refresh_rx,
        }
    }

    pub fn provider(&self) -> &TreeProvider {
        &self.provider
    }

    pub fn rows(&self) -> &[TreeRow] {
        &self.rows
    }

    pub fn is_stale(&self) -> bool {
        self.refresh_rx.has_changed().unwrap_or(false)
    }

    /// Re-renders when a refresh fired since the last render.
    pub async fn sync(&mut self) -> bool {
        if !self.is_stale() {
            return false;
        }
        self.render().await;
        true
    }

    pub async fn render(&mut self) -> &[TreeRow] {
        self.refresh_rx.mark_unchanged();

        let mut rows = Vec::new();
        let mut still_expanded = HashSet::new();
        let mut stack: Vec<(usize, TreeNode)> = self
            .provider
            .list_children(None)
            .await
            .into_iter()
            .rev()
            .map(|node| (0, node))
            .collect();

        while let Some((depth, node)) = stack.pop() {
            let expanded = node.is_expandable()
                && node.path().is_some_and(|path| self.expanded.contains(path));
            if expanded {
                if let Some(path) = node.path() {
                    still_expanded.insert(path.to_path_buf());
                }
                let children = self.provider.list_children(Some(&node)).await;
                stack.extend(children.into_iter().rev().map(|child| (depth + 1, child)));
            }
            rows.push(TreeRow {
                depth,
                node,
                expanded,
            });
        }

        self.expanded = still_expanded;
        self.rows = rows;
        &self.rows
    }

    /// Expands a displayed directory row. Returns false when `path` is not one.
    pub async fn expand(&mut self, path: &Path) -> bool {
        let displayed = self
            .rows
            .iter()
            .any(|row| row.node.is_expandable() && row.node.path() == Some(path));
        if !displayed {
            return false;
        }
        self.expanded.insert(path.to_path_buf());
        self.render().await;
        true
    }

    pub async fn collapse(&mut self, path: &Path) {
        if self.expanded.remove(path) {
            self.render().await;
        }
    }

    /// Expands every directory down to `depth` levels below the root.
    pub async fn expand_to_depth(&mut self, depth: usize) {
        self.render().await;
        for _ in 0..depth {
            let pending: Vec<PathBuf> = self
                .rows
                .iter()
                .filter(|row| row.node.is_expandable() && !row.expanded)
                .filter_map(|row| row.node.path().map(Path::to_path_buf))
                .collect();
            if pending.is_empty() {
                break;
            }
            self.expanded.extend(pending);
            self.render().await;
        }
    }
}
