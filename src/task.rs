// Bounded-size units of streamed work.
//
// A `Task<T>` carries part of one article's payload (revisions on the way
// in, diffs on the way out). Payloads that would exceed a byte budget are
// split over several parts: `PartialFirst`, zero or more `Partial`, then
// `PartialLast`. An article that fits in one task is sent as `Full`.

use std::fmt;

/// Estimated in-memory / on-wire size used for task splitting.
pub trait ByteSize {
    fn byte_size(&self) -> usize;
}

/// Position of a task within its article's part sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// The whole article in one task.
    Full,
    PartialFirst,
    Partial,
    PartialLast,
}

impl TaskType {
    /// True for the task types that open an article.
    pub fn starts_article(self) -> bool {
        matches!(self, TaskType::Full | TaskType::PartialFirst)
    }

    /// True for the task types that close an article.
    pub fn ends_article(self) -> bool {
        matches!(self, TaskType::Full | TaskType::PartialLast)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskType::Full => "full",
            TaskType::PartialFirst => "partial-first",
            TaskType::Partial => "partial",
            TaskType::PartialLast => "partial-last",
        };
        f.write_str(name)
    }
}

/// Identifies the article a task belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHeader {
    pub article_id: u64,
    pub article_name: String,
}

impl TaskHeader {
    pub fn new(article_id: u64, article_name: impl Into<String>) -> Self {
        Self {
            article_id,
            article_name: article_name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// One part of an article's payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Task<T> {
    pub header: TaskHeader,
    /// 0-based index of this part within the article.
    pub part_index: u32,
    pub task_type: TaskType,
    payload: Vec<T>,
    byte_size: usize,
}

impl<T: ByteSize> Task<T> {
    pub fn new(header: TaskHeader, part_index: u32, task_type: TaskType) -> Self {
        Self {
            header,
            part_index,
            task_type,
            payload: Vec::new(),
            byte_size: 0,
        }
    }

    /// Build a task from a ready payload, summing its size estimate.
    pub fn with_payload(
        header: TaskHeader,
        part_index: u32,
        task_type: TaskType,
        payload: Vec<T>,
    ) -> Self {
        let byte_size = payload.iter().map(ByteSize::byte_size).sum();
        Self {
            header,
            part_index,
            task_type,
            payload,
            byte_size,
        }
    }

    pub fn push(&mut self, item: T) {
        self.byte_size += item.byte_size();
        self.payload.push(item);
    }

    /// Cumulative size estimate of the payload.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }
}

impl<T> Task<T> {
    pub fn article_id(&self) -> u64 {
        self.header.article_id
    }

    pub fn payload(&self) -> &[T] {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Vec<T> {
        &mut self.payload
    }

    pub fn into_payload(self) -> Vec<T> {
        self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

// ---------------------------------------------------------------------------
// TaskBuilder
// ---------------------------------------------------------------------------

/// Packs a stream of items for one article into size-bounded tasks.
///
/// Items are appended to the open task; once its estimate exceeds `limit`
/// the task is handed back as `PartialFirst` (first emission) or `Partial`
/// and a new one is opened with the next part index. `finish` closes the
/// article as `Full` when nothing was emitted before, else `PartialLast`.
#[derive(Debug)]
pub struct TaskBuilder<T> {
    header: TaskHeader,
    limit: usize,
    open: Vec<T>,
    open_size: usize,
    next_part: u32,
}

impl<T: ByteSize> TaskBuilder<T> {
    pub fn new(header: TaskHeader, limit: usize) -> Self {
        Self {
            header,
            limit,
            open: Vec::new(),
            open_size: 0,
            next_part: 0,
        }
    }

    pub fn header(&self) -> &TaskHeader {
        &self.header
    }

    /// Number of tasks emitted so far.
    pub fn emitted(&self) -> u32 {
        self.next_part
    }

    pub fn buffered(&self) -> usize {
        self.open.len()
    }

    pub fn buffered_size(&self) -> usize {
        self.open_size
    }

    /// Append an item; returns a completed task once the budget is exceeded.
    pub fn push(&mut self, item: T) -> Option<Task<T>> {
        self.open_size += item.byte_size();
        self.open.push(item);
        if self.open_size > self.limit {
            let task_type = if self.next_part == 0 {
                TaskType::PartialFirst
            } else {
                TaskType::Partial
            };
            Some(self.take(task_type))
        } else {
            None
        }
    }

    /// Close the article.
    ///
    /// Returns `None` only when nothing was ever pushed: an article whose
    /// earlier parts went out still gets a (possibly empty) `PartialLast`.
    pub fn finish(mut self) -> Option<Task<T>> {
        if self.next_part == 0 {
            if self.open.is_empty() {
                return None;
            }
            return Some(self.take(TaskType::Full));
        }
        Some(self.take(TaskType::PartialLast))
    }

    fn take(&mut self, task_type: TaskType) -> Task<T> {
        let payload = std::mem::take(&mut self.open);
        let task = Task {
            header: self.header.clone(),
            part_index: self.next_part,
            task_type,
            payload,
            byte_size: self.open_size,
        };
        self.open_size = 0;
        self.next_part += 1;
        task
    }
}

/// Split one article's items into tasks under `limit`.
pub fn split_into_tasks<T: ByteSize>(
    header: TaskHeader,
    limit: usize,
    items: impl IntoIterator<Item = T>,
) -> Vec<Task<T>> {
    let mut builder = TaskBuilder::new(header, limit);
    let mut tasks: Vec<Task<T>> = items.into_iter().filter_map(|item| builder.push(item)).collect();
    tasks.extend(builder.finish());
    tasks
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
