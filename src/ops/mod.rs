//! Database operations: server selection wrappers, find, update, and raw
//! commands.
pub mod options;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bson::{Bson, Document};

use command_type::CommandType;
use common::{ReadMode, ReadPreference};
use cursor::Cursor;
use error::Error::{self, ArgumentError};
use error::Result;
use topology::select::Selector;
use topology::server::Server;
use topology::Cluster;

use self::options::{CursorType, FindOptions, UpdateModel, UpdateOptions};

/// A fully qualified collection name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Namespace {
    pub db: String,
    pub coll: String,
}

impl Namespace {
    pub fn new(db: &str, coll: &str) -> Result<Namespace> {
        if db.is_empty() || coll.is_empty() {
            return Err(ArgumentError(
                "Namespace requires a database and a collection name.".to_owned(),
            ));
        }

        Ok(Namespace {
            db: String::from(db),
            coll: String::from(coll),
        })
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.db, self.coll)
    }
}

impl FromStr for Namespace {
    type Err = Error;

    // The first dot separates the database; collection names may contain
    // further dots.
    fn from_str(s: &str) -> Result<Namespace> {
        match s.find('.') {
            Some(index) => Namespace::new(&s[..index], &s[index + 1..]),
            None => Err(ArgumentError(format!(
                "Invalid namespace (expected `db.collection`): {}",
                s
            ))),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}.{}", self.db, self.coll)
    }
}

/// A server chosen for an operation, along with the read preference that
/// justified the choice.
pub struct SelectedServer {
    pub server: Arc<Server>,
    pub read_preference: ReadPreference,
}

impl SelectedServer {
    /// True when commands routed here must set the slave-ok wire flag.
    pub fn slave_ok(&self) -> bool {
        self.read_preference.mode != ReadMode::Primary
    }
}

/// Selects a server admissible under the given read preference.
pub fn select_for_read(cluster: &Cluster, read_preference: &ReadPreference)
                       -> Result<SelectedServer> {
    let server = cluster.select_server(&Selector::ReadPref(read_preference.clone()))?;
    Ok(SelectedServer {
        server: server,
        read_preference: read_preference.clone(),
    })
}

/// Selects a server that accepts writes.
pub fn select_for_write(cluster: &Cluster) -> Result<SelectedServer> {
    let server = cluster.select_server(&Selector::Write)?;
    Ok(SelectedServer {
        server: server,
        read_preference: ReadPreference::primary(),
    })
}

/// Runs a caller-supplied database-scoped command on the selected server.
pub fn run_command(selected: &SelectedServer, db: &str, command: Document) -> Result<Document> {
    let mut conn = selected.server.acquire()?;
    conn.execute_command(db, command, selected.slave_ok(), CommandType::Command)
}

/// Issues a find command and wraps the reply in a cursor bound to the
/// selected server.
pub fn find(selected: SelectedServer, namespace: &Namespace, filter: Document,
            options: FindOptions) -> Result<Cursor> {
    let command = build_find_command(namespace, filter, &options)?;
    let slave_ok = selected.slave_ok();

    let reply = {
        let mut conn = selected.server.acquire()?;
        conn.execute_command(&namespace.db, command, slave_ok, CommandType::Find)?
    };

    Cursor::from_reply(selected.server, slave_ok, options.batch_size, reply)
}

/// Issues an update command carrying one entry per model.
pub fn update(selected: &SelectedServer, namespace: &Namespace, updates: Vec<UpdateModel>,
              options: &UpdateOptions) -> Result<Document> {
    if updates.is_empty() {
        return Err(ArgumentError(
            "An update requires at least one update document.".to_owned(),
        ));
    }

    let command = build_update_command(namespace, updates, options);
    let mut conn = selected.server.acquire()?;
    conn.execute_command(&namespace.db, command, false, CommandType::Update)
}

fn build_find_command(namespace: &Namespace, filter: Document, options: &FindOptions)
                      -> Result<Document> {
    let mut command = doc! {
        "find": namespace.coll.clone(),
        "filter": filter
    };

    // A negative limit caps the result to one batch of |limit| documents.
    let mut limit = options.limit.unwrap_or(0);
    let mut single_batch = false;
    if limit < 0 {
        if options.cursor_type != CursorType::NonTailable {
            return Err(ArgumentError(
                "A tailable cursor cannot use a negative limit.".to_owned(),
            ));
        }
        single_batch = true;
        limit = -limit;
    }
    if limit != 0 {
        command.insert("limit", limit);
    }

    if let Some(batch_size) = options.batch_size {
        if batch_size < 0 {
            return Err(ArgumentError("Batch size must be non-negative.".to_owned()));
        }
        if batch_size != 0 {
            command.insert("batchSize", batch_size);
        }
        // The whole result fits in the first batch, so the server need not
        // keep a cursor open.
        if limit > 0 && limit <= i64::from(batch_size) {
            single_batch = true;
        }
    }

    if single_batch {
        command.insert("singleBatch", true);
    }

    if let Some(skip) = options.skip {
        if skip < 0 {
            return Err(ArgumentError("Skip must be non-negative.".to_owned()));
        }
        if skip != 0 {
            command.insert("skip", skip);
        }
    }

    if let Some(ref sort) = options.sort {
        command.insert("sort", sort.clone());
    }

    if let Some(ref projection) = options.projection {
        command.insert("projection", projection.clone());
    }

    if let Some(ref comment) = options.comment {
        command.insert("comment", comment.clone());
    }

    if let Some(max_time) = options.max_time {
        let millis = max_time.as_secs() as i64 * 1000 + i64::from(max_time.subsec_millis());
        command.insert("maxTimeMS", millis);
    }

    match options.cursor_type {
        CursorType::NonTailable => {}
        CursorType::Tailable => {
            command.insert("tailable", true);
        }
        CursorType::TailableAwait => {
            command.insert("tailable", true);
            command.insert("awaitData", true);
        }
    }

    if options.no_cursor_timeout {
        command.insert("noCursorTimeout", true);
    }

    if options.allow_partial_results {
        command.insert("allowPartialResults", true);
    }

    Ok(command)
}

fn build_update_command(namespace: &Namespace, updates: Vec<UpdateModel>,
                        options: &UpdateOptions) -> Document {
    let mut update_docs = Vec::with_capacity(updates.len());
    for model in updates {
        let mut entry = doc! {
            "q": model.filter,
            "u": model.update
        };
        if let Some(upsert) = model.upsert {
            entry.insert("upsert", upsert);
        }
        if let Some(multi) = model.multi {
            entry.insert("multi", multi);
        }
        if let Some(collation) = model.collation {
            entry.insert("collation", collation);
        }
        update_docs.push(Bson::Document(entry));
    }

    let mut command = doc! {
        "update": namespace.coll.clone(),
        "updates": update_docs
    };

    if let Some(ordered) = options.ordered {
        command.insert("ordered", ordered);
    }
    if let Some(bypass) = options.bypass_document_validation {
        command.insert("bypassDocumentValidation", bypass);
    }
    if let Some(ref write_concern) = options.write_concern {
        command.insert("writeConcern", write_concern.to_bson());
    }

    command
}
