//! Pure server selection over a topology snapshot.
//!
//! Nothing here performs I/O or holds state; selection maps one snapshot
//! and one selector to the set of admissible hosts, and the caller picks
//! among them.
use std::collections::BTreeMap;

use common::{ReadMode, ReadPreference};
use connstring::Host;

use super::server::{ServerDescription, ServerType};
use super::TopologyDescription;

/// What an operation requires from the server it runs on.
#[derive(Clone, Debug)]
pub enum Selector {
    /// Any server satisfying the read preference.
    ReadPref(ReadPreference),
    /// A server that accepts writes.
    Write,
}

/// Returns every host in the snapshot admissible under the selector.
pub fn select(description: &TopologyDescription, selector: &Selector) -> Vec<Host> {
    match *selector {
        Selector::Write => description
            .servers
            .values()
            .filter(|server| is_writable(server))
            .map(|server| server.host.clone())
            .collect(),
        Selector::ReadPref(ref read_preference) => select_read(description, read_preference),
    }
}

fn is_writable(server: &ServerDescription) -> bool {
    match server.server_type {
        ServerType::RSPrimary | ServerType::Standalone | ServerType::Mongos => true,
        _ => false,
    }
}

// Standalone servers and shard routers serve any read preference; the
// mode only arbitrates among replica set members.
fn is_ungoverned(server: &ServerDescription) -> bool {
    match server.server_type {
        ServerType::Standalone | ServerType::Mongos => true,
        _ => false,
    }
}

fn select_read(description: &TopologyDescription, read_preference: &ReadPreference) -> Vec<Host> {
    let servers: Vec<&ServerDescription> = description.servers.values().collect();

    let ungoverned: Vec<&ServerDescription> =
        servers.iter().cloned().filter(|s| is_ungoverned(s)).collect();
    let primaries: Vec<&ServerDescription> = servers
        .iter()
        .cloned()
        .filter(|s| s.server_type == ServerType::RSPrimary)
        .collect();
    let secondaries: Vec<&ServerDescription> = servers
        .iter()
        .cloned()
        .filter(|s| s.server_type == ServerType::RSSecondary)
        .collect();

    let tag_sets = &read_preference.tag_sets;

    let governed = match read_preference.mode {
        ReadMode::Primary => primaries,
        ReadMode::PrimaryPreferred => {
            if primaries.is_empty() {
                filter_by_tag_sets(secondaries, tag_sets)
            } else {
                primaries
            }
        }
        ReadMode::Secondary => filter_by_tag_sets(secondaries, tag_sets),
        ReadMode::SecondaryPreferred => {
            let matched = filter_by_tag_sets(secondaries, tag_sets);
            if matched.is_empty() { primaries } else { matched }
        }
        ReadMode::Nearest => {
            let mut data_bearing = primaries;
            data_bearing.extend(secondaries);
            filter_by_tag_sets(data_bearing, tag_sets)
        }
    };

    ungoverned
        .into_iter()
        .chain(governed.into_iter())
        .map(|server| server.host.clone())
        .collect()
}

// Applies tag sets in caller order; the first set matching any server wins.
// An empty list of sets, or an empty set, matches every server.
fn filter_by_tag_sets<'a>(servers: Vec<&'a ServerDescription>,
                          tag_sets: &[BTreeMap<String, String>])
                          -> Vec<&'a ServerDescription> {
    if tag_sets.is_empty() {
        return servers;
    }

    for tag_set in tag_sets {
        let matched: Vec<&ServerDescription> = servers
            .iter()
            .cloned()
            .filter(|server| tags_match(&server.tags, tag_set))
            .collect();
        if !matched.is_empty() {
            return matched;
        }
    }

    Vec::new()
}

// A server matches a tag set when its tags form a superset of it.
fn tags_match(server_tags: &BTreeMap<String, String>, tag_set: &BTreeMap<String, String>) -> bool {
    tag_set
        .iter()
        .all(|(key, value)| server_tags.get(key) == Some(value))
}
