use vfm_explorer::{CommandRef, NodeKind, NodeLocation, TreeRow};
use vfm_targets::{PipelineSink, RetrievalRecord, RetrievalStatus};

/// Prints progress to stdout and failures to stderr as they happen.
pub(crate) struct ConsoleSink;

impl PipelineSink for ConsoleSink {
    fn progress(&self, message: &str) {
        println!("{message}");
    }

    fn error(&self, message: &str) {
        eprintln!("error: {message}");
    }
}

pub(crate) fn format_row(row: &TreeRow) -> String {
    let indent = "  ".repeat(row.depth);
    let name = row.node.name();
    match row.node.kind() {
        NodeKind::Directory => format!("{indent}{name}/"),
        NodeKind::File => format!("{indent}{name}"),
        NodeKind::Action => {
            let command = row.node.command().map(CommandRef::id).unwrap_or("-");
            match row.node.location() {
                NodeLocation::Synthetic(id) => format!("{indent}{name}\t{command}\t{id}"),
                NodeLocation::Path(path) => {
                    format!("{indent}{name}\t{command}\t{}", path.display())
                }
            }
        }
    }
}

pub(crate) fn print_tree(label: &str, rows: &[TreeRow]) {
    println!("{label}");
    if rows.is_empty() {
        println!("  (empty)");
    }
    for row in rows {
        println!("  {}", format_row(row));
    }
}

pub(crate) fn format_record(record: &RetrievalRecord) -> String {
    let status = match record.status {
        RetrievalStatus::Pulled => "pulled",
        RetrievalStatus::NothingToPull => "empty",
        RetrievalStatus::Failed => "failed",
    };
    let files = record
        .files_pulled
        .map(|count| count.to_string())
        .unwrap_or_else(|| "?".into());
    format!(
        "{}\t{}\t{}\t{}\t{}",
        record.at_unix_millis,
        status,
        files,
        record.device.as_deref().unwrap_or("-"),
        record.message
    )
}
