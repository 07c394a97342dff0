use bson::{self, Bson};
use std::collections::BTreeMap;

/// Policy selecting which server roles are acceptable for a read operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

#[derive(Debug, Clone)]
pub struct ReadPreference {
    /// The read preference mode.
    pub mode: ReadMode,
    /// Tag sets to match against eligible servers, in decreasing order of
    /// priority. An empty list matches any server.
    pub tag_sets: Vec<BTreeMap<String, String>>,
}

impl ReadPreference {
    pub fn new(mode: ReadMode, tag_sets: Option<Vec<BTreeMap<String, String>>>) -> ReadPreference {
        ReadPreference {
            mode: mode,
            tag_sets: tag_sets.unwrap_or(Vec::new()),
        }
    }

    pub fn primary() -> ReadPreference {
        ReadPreference::new(ReadMode::Primary, None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConcern {
    pub w: i32,          // Write replication
    pub w_timeout: i32,  // Used in conjunction with 'w'. Propagation timeout in ms.
    pub j: bool,         // If true, will block until write operations have been committed to journal.
    pub fsync: bool,     // If true and server is not journaling, blocks until server has synced all data files to disk.
}

impl WriteConcern {
    pub fn new() -> WriteConcern {
        WriteConcern {
            w: 1,
            w_timeout: 0,
            j: false,
            fsync: false,
        }
    }

    pub fn to_bson(&self) -> bson::Document {
        let mut bson = bson::Document::new();
        bson.insert("w".to_owned(), Bson::I32(self.w));
        bson.insert("wtimeout".to_owned(), Bson::I32(self.w_timeout));
        bson.insert("j".to_owned(), Bson::Boolean(self.j));
        bson
    }
}
