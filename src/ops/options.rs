//! Closed option structs for database operations.
//!
//! Each struct is applied by exactly one command-building function, so the
//! mapping from an option field to a command field is deterministic.
use std::time::Duration;

use bson::Document;
use common::WriteConcern;

/// How a cursor behaves once it reaches the end of the collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorType {
    /// The cursor closes after the last matching document.
    NonTailable,
    /// The cursor stays open on a capped collection.
    Tailable,
    /// The cursor stays open and the server blocks briefly for new data
    /// before answering a getMore.
    TailableAwait,
}

/// Options for find operations.
#[derive(Clone, Debug)]
pub struct FindOptions {
    /// The maximum number of documents to return. A negative limit caps the
    /// result to a single batch of that many documents.
    pub limit: Option<i64>,
    /// The number of documents per server batch.
    pub batch_size: Option<i32>,
    /// The number of matching documents to skip.
    pub skip: Option<i64>,
    pub sort: Option<Document>,
    pub projection: Option<Document>,
    /// An arbitrary comment attached to the command for server logs.
    pub comment: Option<String>,
    /// Per-query server-side execution cap.
    pub max_time: Option<Duration>,
    pub cursor_type: CursorType,
    /// Keeps the server from reaping the cursor on its idle timeout.
    pub no_cursor_timeout: bool,
    /// Permits partial results from a sharded cluster with unreachable
    /// shards.
    pub allow_partial_results: bool,
}

impl FindOptions {
    /// Returns a new set of default find options.
    pub fn new() -> FindOptions {
        FindOptions {
            limit: None,
            batch_size: None,
            skip: None,
            sort: None,
            projection: None,
            comment: None,
            max_time: None,
            cursor_type: CursorType::NonTailable,
            no_cursor_timeout: false,
            allow_partial_results: false,
        }
    }

    pub fn with_limit(mut self, limit: i64) -> FindOptions {
        self.limit = Some(limit);
        self
    }

    pub fn with_batch_size(mut self, batch_size: i32) -> FindOptions {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_skip(mut self, skip: i64) -> FindOptions {
        self.skip = Some(skip);
        self
    }

    pub fn with_sort(mut self, sort: Document) -> FindOptions {
        self.sort = Some(sort);
        self
    }

    pub fn with_projection(mut self, projection: Document) -> FindOptions {
        self.projection = Some(projection);
        self
    }

    pub fn with_cursor_type(mut self, cursor_type: CursorType) -> FindOptions {
        self.cursor_type = cursor_type;
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> FindOptions {
        self.max_time = Some(max_time);
        self
    }
}

impl Default for FindOptions {
    fn default() -> FindOptions {
        FindOptions::new()
    }
}

/// One document-level update request within an update command.
#[derive(Clone, Debug)]
pub struct UpdateModel {
    /// Selects the documents to update.
    pub filter: Document,
    /// The modifications to apply.
    pub update: Document,
    /// Insert a document when none matches the filter.
    pub upsert: Option<bool>,
    /// Update every matching document instead of the first.
    pub multi: Option<bool>,
    pub collation: Option<Document>,
}

impl UpdateModel {
    pub fn new(filter: Document, update: Document) -> UpdateModel {
        UpdateModel {
            filter: filter,
            update: update,
            upsert: None,
            multi: None,
            collation: None,
        }
    }

    pub fn with_upsert(mut self, upsert: bool) -> UpdateModel {
        self.upsert = Some(upsert);
        self
    }

    pub fn with_multi(mut self, multi: bool) -> UpdateModel {
        self.multi = Some(multi);
        self
    }

    pub fn with_collation(mut self, collation: Document) -> UpdateModel {
        self.collation = Some(collation);
        self
    }
}

/// Command-level options for update operations.
#[derive(Clone, Debug, Default)]
pub struct UpdateOptions {
    /// Stop at the first failing update instead of attempting the rest.
    pub ordered: Option<bool>,
    pub bypass_document_validation: Option<bool>,
    pub write_concern: Option<WriteConcern>,
}
