// Diff pipeline driver.
//
// Turns `Task<Revision>` input into `Task<Diff>` output, one article at a
// time. Per-article state lives in an explicit `ArticleState` owned by the
// driver and is created when an article's first task arrives and dropped
// when its last task has been processed (or when another article starts).
//
// Per revision, in chronological order:
//   1. Unpaired surrogates: drop the revision or sanitize its text.
//   2. Every `full_revision_interval`th stored revision is a checkpoint
//      (`FullRevision`); all others are diffed against the previous text.
//   3. An empty diff is a no-op and is dropped without advancing the
//      revision counter.
//   4. Optionally verify by applying the diff to the previous text.
//   5. Pack the diff into size-bounded output tasks.

pub mod dump;

use std::borrow::Cow;

use log::{debug, info, warn};
use thiserror::Error;

use crate::codec::{EncodeError, RevisionCodec};
use crate::config::{ConfigError, DiffConfig, SurrogateMode};
use crate::diff::{Diff, DiffMetadata, DiffPart};
use crate::matching::{self, MatcherConfig};
use crate::revision::{Revision, RevisionText};
use crate::task::{ByteSize, Task, TaskBuilder, TaskHeader, TaskType};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(
        "article {article_id}: unexpected {task_type} task part {part_index} ({})",
        expected_part(.expected)
    )]
    TaskOrder {
        article_id: u64,
        task_type: TaskType,
        part_index: u32,
        expected: Option<u32>,
    },
    #[error("article {article_id}, revision {revision_id}: {source}")]
    Encode {
        article_id: u64,
        revision_id: u64,
        #[source]
        source: EncodeError,
    },
    #[error(
        "diff verification failed for article {article_id} ({article_name}), revision counter {revision_counter} (id {revision_id}): {detail}"
    )]
    Verification {
        article_id: u64,
        article_name: String,
        revision_id: u64,
        revision_counter: u64,
        detail: String,
    },
}

fn expected_part(expected: &Option<u32>) -> String {
    match expected {
        Some(part) => format!("expected part {part}"),
        None => "no open article".to_string(),
    }
}

impl DriverError {
    /// Article the error belongs to, when it is article-scoped.
    pub fn article_id(&self) -> Option<u64> {
        match self {
            DriverError::Config(_) => None,
            DriverError::TaskOrder { article_id, .. }
            | DriverError::Encode { article_id, .. }
            | DriverError::Verification { article_id, .. } => Some(*article_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub revisions_in: u64,
    pub diffs_out: u64,
    pub full_revisions: u64,
    pub noop_drops: u64,
    pub surrogate_drops: u64,
    pub surrogates_replaced: u64,
    pub tasks_out: u64,
    /// Sum of the diffs' size estimates.
    pub diff_bytes: u64,
}

impl DriverStats {
    pub fn merge(&mut self, other: &DriverStats) {
        self.revisions_in += other.revisions_in;
        self.diffs_out += other.diffs_out;
        self.full_revisions += other.full_revisions;
        self.noop_drops += other.noop_drops;
        self.surrogate_drops += other.surrogate_drops;
        self.surrogates_replaced += other.surrogates_replaced;
        self.tasks_out += other.tasks_out;
        self.diff_bytes += other.diff_bytes;
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Running state of the article being collected.
#[derive(Debug)]
struct ArticleState {
    header: TaskHeader,
    /// Diffs stored so far; the next diff gets `revision_counter + 1`.
    revision_counter: u64,
    next_input_part: u32,
    previous: RevisionText,
    output: TaskBuilder<Diff>,
}

impl ArticleState {
    fn new(header: TaskHeader, output_limit: usize) -> Self {
        Self {
            output: TaskBuilder::new(header.clone(), output_limit),
            header,
            revision_counter: 0,
            next_input_part: 0,
            previous: RevisionText::new(),
        }
    }
}

#[derive(Debug, Default)]
enum DriverState {
    #[default]
    Idle,
    Collecting(ArticleState),
    /// Remaining parts of this article are skipped.
    Failed(TaskHeader),
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Stateful revision-to-diff converter for one stream of articles.
///
/// Not shareable between threads while running; shard by article instead.
#[derive(Debug)]
pub struct DiffDriver {
    config: DiffConfig,
    matcher: MatcherConfig,
    codec: RevisionCodec,
    state: DriverState,
    stats: DriverStats,
}

impl DiffDriver {
    pub fn new(config: DiffConfig) -> Result<Self, DriverError> {
        config.validate()?;
        Ok(Self {
            matcher: config.matcher(),
            codec: RevisionCodec::new(config.codec_options()),
            config,
            state: DriverState::Idle,
            stats: DriverStats::default(),
        })
    }

    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    /// Header of the article currently being collected.
    pub fn current_article(&self) -> Option<&TaskHeader> {
        match &self.state {
            DriverState::Collecting(article) => Some(&article.header),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, DriverState::Idle)
    }

    /// Drop any unfinished article state.
    pub fn reset(&mut self) {
        if let DriverState::Collecting(article) = std::mem::take(&mut self.state) {
            warn!(
                "article {} ({}) discarded before its last part ({} buffered diffs)",
                article.header.article_id,
                article.header.article_name,
                article.output.buffered()
            );
        }
    }

    /// Process one revision task and return the diff tasks it completes.
    pub fn process(&mut self, task: Task<Revision>) -> Result<Vec<Task<Diff>>, DriverError> {
        let Some(mut article) = self.admit(&task)? else {
            return Ok(Vec::new());
        };

        let mut revisions: Vec<&Revision> = task.payload().iter().collect();
        revisions.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.sequence.cmp(&b.sequence))
        });

        let mut out = Vec::new();
        for revision in revisions {
            let diff = match self.diff_revision(&mut article, revision) {
                Ok(Some(diff)) => diff,
                Ok(None) => continue,
                Err(err) => {
                    if matches!(err, DriverError::Verification { .. })
                        && let Some(dir) = &self.config.debug_dump_dir
                    {
                        match dump::write_dump(dir, &task, &err) {
                            Ok(path) => warn!("wrote debug dump {}", path.display()),
                            Err(e) => warn!("debug dump failed: {e}"),
                        }
                    }
                    if !task.task_type.ends_article() {
                        self.state = DriverState::Failed(article.header);
                    }
                    return Err(err);
                }
            };
            if let Some(done) = article.output.push(diff) {
                out.push(self.emitted(done));
            }
        }

        article.next_input_part += 1;
        if task.task_type.ends_article() {
            if let Some(done) = article.output.finish() {
                out.push(self.emitted(done));
            }
            debug!(
                "article {} complete after {} stored revisions",
                task.header.article_id, article.revision_counter
            );
            self.state = DriverState::Idle;
        } else {
            self.state = DriverState::Collecting(article);
        }
        Ok(out)
    }

    /// Check task order and take the article state out of the driver.
    ///
    /// `Ok(None)` means the task belongs to a failed article and is skipped.
    fn admit(&mut self, task: &Task<Revision>) -> Result<Option<ArticleState>, DriverError> {
        let state = std::mem::take(&mut self.state);
        let order_error = |expected| DriverError::TaskOrder {
            article_id: task.article_id(),
            task_type: task.task_type,
            part_index: task.part_index,
            expected,
        };

        if task.task_type.starts_article() {
            if task.part_index != 0 {
                self.state = state;
                return Err(order_error(Some(0)));
            }
            self.state = state;
            self.reset();
            return Ok(Some(ArticleState::new(
                task.header.clone(),
                self.config.output_task_limit,
            )));
        }

        match state {
            DriverState::Collecting(article) if article.header.article_id == task.article_id() => {
                if task.part_index != article.next_input_part {
                    let expected = article.next_input_part;
                    self.state = DriverState::Collecting(article);
                    return Err(order_error(Some(expected)));
                }
                Ok(Some(article))
            }
            DriverState::Failed(header) if header.article_id == task.article_id() => {
                debug!(
                    "skipping part {} of failed article {}",
                    task.part_index, header.article_id
                );
                if !task.task_type.ends_article() {
                    self.state = DriverState::Failed(header);
                }
                Ok(None)
            }
            other => {
                self.state = other;
                Err(order_error(None))
            }
        }
    }

    fn diff_revision(
        &mut self,
        article: &mut ArticleState,
        revision: &Revision,
    ) -> Result<Option<Diff>, DriverError> {
        self.stats.revisions_in += 1;

        let text = if revision.text.has_unpaired_surrogates() {
            match self.config.surrogate_mode {
                SurrogateMode::DiscardRevision => {
                    self.stats.surrogate_drops += 1;
                    warn!(
                        "article {}: dropping revision {} with unpaired surrogates",
                        article.header.article_id, revision.revision_id
                    );
                    return Ok(None);
                }
                SurrogateMode::ReplaceSurrogates => {
                    self.stats.surrogates_replaced += 1;
                    Cow::Owned(revision.text.replace_unpaired_surrogates())
                }
            }
        } else {
            Cow::Borrowed(&revision.text)
        };

        let counter = article.revision_counter;
        let parts = if counter % self.config.full_revision_interval == 0 {
            vec![DiffPart::FullRevision {
                text: text.clone().into_owned(),
            }]
        } else {
            let parts =
                matching::diff_units(&self.matcher, article.previous.as_units(), text.as_units());
            if parts.is_empty() {
                self.stats.noop_drops += 1;
                debug!(
                    "article {}: revision {} is unchanged, dropped",
                    article.header.article_id, revision.revision_id
                );
                return Ok(None);
            }
            parts
        };

        let mut diff = Diff::new(parts, DiffMetadata::from_revision(revision, counter + 1));
        diff.codec_data = self
            .codec
            .codec_data(&diff.parts)
            .map_err(|source| DriverError::Encode {
                article_id: article.header.article_id,
                revision_id: revision.revision_id,
                source,
            })?;

        if self.config.verify {
            verify(article, &diff, &text)?;
        }

        debug!(
            "article {} revision {} -> counter {}: {} parts ({})",
            article.header.article_id,
            revision.revision_id,
            diff.meta.revision_counter,
            diff.parts.len(),
            diff.codec_data
        );
        self.stats.diffs_out += 1;
        self.stats.diff_bytes += diff.byte_size() as u64;
        if diff.is_full_revision() {
            self.stats.full_revisions += 1;
        }
        article.revision_counter += 1;
        article.previous = text.into_owned();
        Ok(Some(diff))
    }

    fn emitted(&mut self, task: Task<Diff>) -> Task<Diff> {
        self.stats.tasks_out += 1;
        info!(
            "article {}: emitting {} task part {} ({} diffs, ~{} bytes)",
            task.article_id(),
            task.task_type,
            task.part_index,
            task.len(),
            task.byte_size()
        );
        task
    }
}

/// Apply `diff` to the article's previous text and compare with `expected`,
/// ignoring line ending differences.
fn verify(article: &ArticleState, diff: &Diff, expected: &RevisionText) -> Result<(), DriverError> {
    let detail = match diff.apply(&article.previous) {
        Ok(text) if text.normalized_line_endings() == expected.normalized_line_endings() => {
            return Ok(());
        }
        Ok(text) => format!(
            "reconstructed {} units, expected {}",
            text.len(),
            expected.len()
        ),
        Err(e) => e.to_string(),
    };
    Err(DriverError::Verification {
        article_id: article.header.article_id,
        article_name: article.header.article_name.clone(),
        revision_id: diff.meta.revision_id,
        revision_counter: diff.meta.revision_counter,
        detail,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
