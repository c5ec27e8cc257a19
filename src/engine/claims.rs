//! engine::claims
//!
//! Names and folders reserved by the coordinator, in frontier order.
//!
//! Every task reserves its repository's simple name (which picks the store
//! entry) and the folders it will write before any worker starts. The first
//! claimant in frontier order wins; later claimants fail with a collision,
//! so the outcome never depends on scheduling and no two tasks ever write
//! into the same folder.

use std::collections::HashMap;
use std::fmt;

use super::task::{CloneTask, TaskError};
use crate::core::paths::LayoutPaths;
use crate::core::types::{RepositoryIdentity, Revision};
use crate::store::StoreError;

/// Who a working-tree folder belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Occupant {
    Master(RepositoryIdentity),
    Versioned(RepositoryIdentity, Revision),
}

impl fmt::Display for Occupant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Occupant::Master(identity) => write!(f, "the master tree of {identity}"),
            Occupant::Versioned(identity, revision) => write!(f, "{identity} at {revision}"),
        }
    }
}

/// Reservations for one clone run.
#[derive(Debug, Default)]
pub(crate) struct Claims {
    names: HashMap<String, RepositoryIdentity>,
    /// Keyed by lowercased folder name
    folders: HashMap<String, Occupant>,
}

impl Claims {
    /// Reserve the name and folders `task` will write, including the master
    /// folder when `master` is set. Nothing is reserved on error.
    pub fn claim(&mut self, task: &CloneTask, master: bool) -> Result<(), TaskError> {
        let name = task.identity.name();
        if let Some(owner) = self.names.get(name) {
            if owner != &task.identity {
                return Err(TaskError::Store(StoreError::NameCollision {
                    name: name.to_string(),
                    existing: owner.to_string(),
                    requested: task.identity.clone(),
                }));
            }
        }

        let mut wanted = vec![(
            LayoutPaths::versioned_name(name, &task.revision),
            Occupant::Versioned(task.identity.clone(), task.revision.clone()),
        )];
        if master {
            wanted.push((name.to_string(), Occupant::Master(task.identity.clone())));
        }

        for (folder, occupant) in &wanted {
            match self.folders.get(&folder.to_ascii_lowercase()) {
                Some(existing) if existing != occupant => {
                    return Err(TaskError::FolderCollision {
                        folder: folder.clone(),
                        existing: existing.to_string(),
                        requested: occupant.to_string(),
                    })
                }
                _ => {}
            }
        }

        self.names.insert(name.to_string(), task.identity.clone());
        for (folder, occupant) in wanted {
            self.folders.insert(folder.to_ascii_lowercase(), occupant);
        }
        Ok(())
    }
}
