//! Reconciliation between the local active list and the remote collection
//!
//! The network part of a sync is driven by [`Store::sync`](crate::store::Store::sync).
//! This module holds the pure parts: which tasks should be uploaded, and how the lists are merged once the server has been read.

use std::collections::{HashMap, HashSet};

use crate::task::{ListName, Task};

pub mod progress;
use progress::SyncProgress;


/// Something that went wrong for a single task during a sync, without aborting it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncWarning {
    pub task_id: String,
    pub message: String,
}

/// What a successful sync did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Remote tasks that were written into the active list (replacements and additions)
    pub pulled: usize,
    /// Local tasks that were uploaded because the server did not have them
    pub pushed: usize,
    /// Remote tasks that were ignored because they are archived locally
    pub skipped_archived: usize,
    pub warnings: Vec<SyncWarning>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}


/// The remote-list tasks of the active list that the server does not know about.
///
/// Tasks whose id is archived are never uploaded.
pub fn tasks_to_push(active: &[Task], remote: &[Task], archived_ids: &HashSet<String>) -> Vec<Task> {
    let remote_ids: HashSet<&str> = remote.iter().map(|t| t.id()).collect();

    active.iter()
        .filter(|t| t.list_name() == ListName::Remote)
        .filter(|t| remote_ids.contains(t.id()) == false)
        .filter(|t| archived_ids.contains(t.id()) == false)
        .cloned()
        .collect()
}

/// Compose the new active list from the current one and the tasks the server returned.
///
/// * local-list tasks are kept as they are. A remote task with the same id is dropped (with a warning)
/// * remote-list tasks the server returned are replaced by the server version, at the same position.
///   Their `updated_at` does not go backwards when the server copy is older
/// * remote-list tasks the server did not return are kept
/// * the other server tasks are appended, in server order
///
/// Server tasks whose id is archived are ignored, and so are duplicated ids in the server response (the first one wins).
pub fn merge(active: Vec<Task>, remote: Vec<Task>, archived_ids: &HashSet<String>, progress: &mut SyncProgress) -> Vec<Task> {
    let mut pending: Vec<Option<Task>> = Vec::with_capacity(remote.len());
    let mut index_of: HashMap<String, usize> = HashMap::new();

    for task in remote {
        if archived_ids.contains(task.id()) {
            log::debug!("Remote task {} is archived locally, ignoring it", task.id());
            progress.report_mut().skipped_archived += 1;
            continue;
        }
        if index_of.contains_key(task.id()) {
            progress.warn(task.id(), "the server returned this task more than once, keeping the first copy".to_string());
            continue;
        }
        index_of.insert(task.id().to_string(), pending.len());
        pending.push(Some(task));
    }

    let mut merged = Vec::with_capacity(active.len() + pending.len());
    for task in active {
        let from_server = index_of.get(task.id()).and_then(|&i| pending[i].take());

        match (task.list_name(), from_server) {
            (_, None) => merged.push(task),
            (ListName::Local, Some(_)) => {
                progress.warn(task.id(), "a local task has the same id as a remote one, the remote copy is ignored".to_string());
                merged.push(task);
            },
            (ListName::Remote, Some(mut remote_task)) => {
                remote_task.set_updated_at_at_least(*task.updated_at());
                progress.report_mut().pulled += 1;
                merged.push(remote_task);
            },
        }
    }

    for task in pending.into_iter().flatten() {
        progress.report_mut().pulled += 1;
        merged.push(task);
    }

    merged
}
