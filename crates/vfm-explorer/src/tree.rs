use std::{
    fs::Metadata,
    path::{Path, PathBuf},
};

use tokio::fs;
use tracing::{debug, warn};

/// Synthetic root identifier of the action view.
pub const ACTION_VIEW_ID: &str = "vfm.actions";

const PULL_LOGS_ENTRY_ID: &str = "vfm-pull-logs-trigger";
const CONNECT_ENTRY_ID: &str = "vfm-connect-device-trigger";

/// Command a node triggers when activated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandRef {
    OpenFile(PathBuf),
    PullLogs,
    ConnectDevice,
}

impl CommandRef {
    pub fn id(&self) -> &'static str {
        match self {
            CommandRef::OpenFile(_) => "vfm.openFile",
            CommandRef::PullLogs => "vfm.pullLogs",
            CommandRef::ConnectDevice => "vfm.connectDevice",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            CommandRef::OpenFile(_) => "Open File",
            CommandRef::PullLogs => "Pull VFM log files from the Android device",
            CommandRef::ConnectDevice => "Connect a wireless device (ip:port)",
        }
    }

    /// Rebuilds a command from its id. `OpenFile` needs the path as `arg`.
    pub fn from_id(id: &str, arg: Option<&str>) -> Option<Self> {
        match id {
            "vfm.openFile" => arg
                .filter(|value| !value.trim().is_empty())
                .map(|value| CommandRef::OpenFile(PathBuf::from(value))),
            "vfm.pullLogs" => Some(CommandRef::PullLogs),
            "vfm.connectDevice" => Some(CommandRef::ConnectDevice),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
    Action,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeLocation {
    Path(PathBuf),
    Synthetic(&'static str),
}

/// One listed entry. Nodes are views: they are rebuilt on every listing and a
/// directory node never holds its children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeNode {
    name: String,
    location: NodeLocation,
    kind: NodeKind,
    command: Option<CommandRef>,
}

impl TreeNode {
    fn from_metadata(name: String, path: PathBuf, meta: &Metadata) -> Self {
        if meta.is_dir() {
            Self {
                name,
                location: NodeLocation::Path(path),
                kind: NodeKind::Directory,
                command: None,
            }
        } else {
            Self {
                name,
                command: Some(CommandRef::OpenFile(path.clone())),
                location: NodeLocation::Path(path),
                kind: NodeKind::File,
            }
        }
    }

    fn action(name: &str, id: &'static str, command: CommandRef) -> Self {
        Self {
            name: name.to_string(),
            location: NodeLocation::Synthetic(id),
            kind: NodeKind::Action,
            command: Some(command),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &NodeLocation {
        &self.location
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn command(&self) -> Option<&CommandRef> {
        self.command.as_ref()
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            NodeLocation::Path(path) => Some(path),
            NodeLocation::Synthetic(_) => None,
        }
    }

    pub fn is_expandable(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// Lists a real directory subtree.
#[derive(Clone, Debug)]
pub struct FilesystemTree {
    root: PathBuf,
}

impl FilesystemTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn list_children(&self, parent: Option<&TreeNode>) -> Vec<TreeNode> {
        let target = match parent {
            Some(node) => match node.path() {
                Some(path) => path,
                None => return Vec::new(),
            },
            None => self.root.as_path(),
        };
        if target.as_os_str().is_empty() {
            warn!("no log folder selected");
            return Vec::new();
        }
        if !is_directory(target).await {
            return Vec::new();
        }
        list_directory(target).await
    }
}

/// Fixed set of command-triggering pseudo-entries.
#[derive(Clone, Copy, Debug, Default)]
pub struct ActionTree;

impl ActionTree {
    pub fn view_id(&self) -> &'static str {
        ACTION_VIEW_ID
    }

    pub fn list_children(&self, parent: Option<&TreeNode>) -> Vec<TreeNode> {
        if parent.is_some() {
            return Vec::new();
        }
        vec![
            TreeNode::action("Pull VFM logs", PULL_LOGS_ENTRY_ID, CommandRef::PullLogs),
            TreeNode::action(
                "Connect wireless device",
                CONNECT_ENTRY_ID,
                CommandRef::ConnectDevice,
            ),
        ]
    }
}

/// A tree data source. The variant is chosen at construction and never changes.
#[derive(Clone, Debug)]
pub enum TreeProvider {
    Filesystem(FilesystemTree),
    Actions(ActionTree),
}

impl TreeProvider {
    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        TreeProvider::Filesystem(FilesystemTree::new(root))
    }

    pub fn actions() -> Self {
        TreeProvider::Actions(ActionTree)
    }

    pub async fn list_children(&self, parent: Option<&TreeNode>) -> Vec<TreeNode> {
        match self {
            TreeProvider::Filesystem(tree) => tree.list_children(parent).await,
            TreeProvider::Actions(tree) => tree.list_children(parent),
        }
    }

    pub fn root_label(&self) -> String {
        match self {
            TreeProvider::Filesystem(tree) => tree.root().display().to_string(),
            TreeProvider::Actions(tree) => tree.view_id().to_string(),
        }
    }
}

// Existence check: any stat error reads as "not a directory".
async fn is_directory(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

async fn list_directory(dir: &Path) -> Vec<TreeNode> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) => {
            debug!("cannot list {}: {err}", dir.display());
            return Vec::new();
        }
    };

    let mut nodes = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();
                match fs::metadata(&path).await {
                    Ok(meta) => nodes.push(TreeNode::from_metadata(name, path, &meta)),
                    Err(err) => debug!("skipping {}: {err}", path.display()),
                }
            }
            Ok(None) => break,
            Err(err) => {
                debug!("listing {} stopped early: {err}", dir.display());
                break;
            }
        }
    }
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    nodes
}
