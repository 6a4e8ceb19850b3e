// Postmortem dump of a task whose diff failed verification.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use super::DriverError;
use crate::revision::{Contributor, Revision};
use crate::task::Task;

/// Write `task` and `error` as pretty JSON into `dir`; returns the file path.
pub fn write_dump(dir: &Path, task: &Task<Revision>, error: &DriverError) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let counter = match error {
        DriverError::Verification {
            revision_counter, ..
        } => *revision_counter,
        _ => 0,
    };
    let path = dir.join(format!(
        "article-{}-part-{}-rev-{counter}.json",
        task.article_id(),
        task.part_index
    ));

    let doc = json!({
        "error": error.to_string(),
        "article_id": task.header.article_id,
        "article_name": task.header.article_name,
        "part_index": task.part_index,
        "task_type": task.task_type.to_string(),
        "revisions": task.payload().iter().map(revision_json).collect::<Vec<_>>(),
    });

    let mut out = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut out, &doc)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(path)
}

fn revision_json(revision: &Revision) -> Value {
    let contributor = match &revision.contributor {
        Contributor::Registered { id, name } => json!({ "id": id, "name": name }),
        Contributor::Anonymous { address } => json!({ "address": address }),
    };
    let mut value = json!({
        "sequence": revision.sequence,
        "revision_id": revision.revision_id,
        "timestamp": revision.timestamp.to_rfc3339(),
        "comment": revision.comment,
        "contributor": contributor,
        "minor": revision.minor,
        "text": revision.text.to_string_lossy(),
    });
    // Lossy text hides unpaired surrogates; keep the raw units too.
    if revision.text.has_unpaired_surrogates() {
        value["units"] = json!(revision.text.as_units());
    }
    value
}
