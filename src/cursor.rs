//! Iteration over multi-batch command results.
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;

use bson::{Bson, Document};

use command_type::CommandType;
use error::Error::{self, CombinedError, CursorNotFoundError, DefaultError, ResponseError};
use error::Result;
use ops::Namespace;
use topology::server::Server;

/// Lazily iterates over the documents of a cursor-bearing command reply,
/// fetching further batches from the owning server as needed.
///
/// `next` yields `None` both on exhaustion and on error; callers that need
/// to distinguish check `err` afterwards. Once a fetch has failed the
/// cursor is terminal and never touches the network again, except for the
/// best-effort kill on close.
pub struct Cursor {
    server: Arc<Server>,
    namespace: Namespace,
    batch_size: Option<i32>,
    // Zero once the server has exhausted the cursor.
    cursor_id: i64,
    buffer: VecDeque<Document>,
    slave_ok: bool,
    err: Option<Error>,
}

impl Cursor {
    /// Builds a cursor from a cursor-bearing command reply, bound to the
    /// server the command ran on.
    pub fn from_reply(server: Arc<Server>, slave_ok: bool, batch_size: Option<i32>,
                      reply: Document) -> Result<Cursor> {
        let cursor_doc = match reply.get("cursor") {
            Some(&Bson::Document(ref doc)) => doc.clone(),
            _ => return Err(CursorNotFoundError),
        };

        let cursor_id = match cursor_doc.get("id") {
            Some(&Bson::I64(id)) => id,
            _ => return Err(CursorNotFoundError),
        };

        let namespace = match cursor_doc.get("ns") {
            Some(&Bson::String(ref ns)) => Namespace::from_str(ns)?,
            _ => return Err(CursorNotFoundError),
        };

        let buffer = batch_documents(&cursor_doc, "firstBatch")?;

        Ok(Cursor {
            server: server,
            namespace: namespace,
            batch_size: batch_size,
            cursor_id: cursor_id,
            buffer: buffer,
            slave_ok: slave_ok,
            err: None,
        })
    }

    /// The server-side cursor id; zero once exhausted.
    pub fn id(&self) -> i64 {
        self.cursor_id
    }

    /// The error that terminated iteration, if any.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Kills any live server-side cursor and surfaces the sticky error,
    /// folding in any failure from the kill itself. The sticky error stays
    /// observable through `err` afterwards, so closing does not turn a
    /// failed cursor into one that looks cleanly exhausted.
    pub fn close(&mut self) -> Result<()> {
        self.buffer.clear();

        // An exhausted cursor no longer exists server-side.
        if self.cursor_id != 0 {
            let cursor_id = self.cursor_id;
            self.cursor_id = 0;
            if let Err(err) = self.kill(cursor_id) {
                self.record(err);
            }
        }

        match self.err {
            Some(ref err) => Err(DefaultError(err.to_string())),
            None => Ok(()),
        }
    }

    // Folds a new failure into the sticky error instead of overwriting it.
    fn record(&mut self, err: Error) {
        self.err = Some(match self.err.take() {
            Some(prior) => CombinedError(vec![prior, err]),
            None => err,
        });
    }

    fn kill(&mut self, cursor_id: i64) -> Result<()> {
        let command = doc! {
            "killCursors": self.namespace.coll.clone(),
            "cursors": [Bson::I64(cursor_id)]
        };

        let mut conn = self.server.acquire()?;
        conn.execute_command(
            &self.namespace.db,
            command,
            self.slave_ok,
            CommandType::KillCursors,
        )?;
        Ok(())
    }

    // Fetches the next batch into the buffer. The buffer may legitimately
    // stay empty for a live tailable cursor.
    fn load_batch(&mut self) -> Result<()> {
        let mut command = doc! {
            "getMore": Bson::I64(self.cursor_id),
            "collection": self.namespace.coll.clone()
        };
        if let Some(batch_size) = self.batch_size {
            if batch_size > 0 {
                command.insert("batchSize", batch_size);
            }
        }

        let reply = {
            let mut conn = self.server.acquire()?;
            conn.execute_command(
                &self.namespace.db,
                command,
                self.slave_ok,
                CommandType::GetMore,
            )?
        };

        let cursor_doc = match reply.get("cursor") {
            Some(&Bson::Document(ref doc)) => doc.clone(),
            _ => return Err(CursorNotFoundError),
        };

        self.cursor_id = match cursor_doc.get("id") {
            Some(&Bson::I64(id)) => id,
            _ => return Err(CursorNotFoundError),
        };

        self.buffer = batch_documents(&cursor_doc, "nextBatch")?;
        Ok(())
    }
}

impl Iterator for Cursor {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        if let Some(doc) = self.buffer.pop_front() {
            return Some(doc);
        }

        if self.err.is_some() || self.cursor_id == 0 {
            return None;
        }

        match self.load_batch() {
            Ok(()) => self.buffer.pop_front(),
            Err(err) => {
                // A cursor the server no longer knows needs no kill on
                // close; anything else keeps its id for a best-effort kill.
                if let CursorNotFoundError = err {
                    self.cursor_id = 0;
                }
                self.err = Some(err);
                None
            }
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if self.cursor_id != 0 {
            let _ = self.close();
        }
    }
}

fn batch_documents(cursor_doc: &Document, key: &str) -> Result<VecDeque<Document>> {
    let array = match cursor_doc.get(key) {
        Some(&Bson::Array(ref array)) => array,
        _ => return Err(ResponseError(format!("Cursor reply is missing `{}`.", key))),
    };

    let mut documents = VecDeque::with_capacity(array.len());
    for entry in array {
        match *entry {
            Bson::Document(ref doc) => documents.push_back(doc.clone()),
            _ => {
                return Err(ResponseError(
                    "Cursor batch contained a non-document entry.".to_owned(),
                ))
            }
        }
    }

    Ok(documents)
}
