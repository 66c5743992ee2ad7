//! Traits used by the store to talk to a CalDAV collection

use async_trait::async_trait;

use crate::error::Result;
use crate::task::Task;

/// Whether the task collection exists on the server
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectionState {
    Present,
    Missing,
}

/// A remote collection of tasks.
///
/// This is implemented by the HTTP [`Client`](crate::client::Client), and by [`MockRemote`](crate::mock_remote::MockRemote) for tests.
/// Every call is a single round-trip: implementors must not retry.
#[async_trait]
pub trait TaskRemote: Send + Sync {
    /// Tells whether the collection exists
    async fn probe(&self) -> Result<CollectionState>;

    /// Creates the collection
    async fn create_collection(&self) -> Result<()>;

    /// Creates the collection, unless it already exists
    async fn ensure_collection(&self) -> Result<()> {
        match self.probe().await? {
            CollectionState::Present => Ok(()),
            CollectionState::Missing => {
                log::info!("Task collection is missing on the server, creating it");
                self.create_collection().await
            },
        }
    }

    /// Returns every task of the collection.
    /// Items that cannot be parsed are skipped.
    async fn list_tasks(&self) -> Result<Vec<Task>>;

    /// Creates or replaces a task on the server
    async fn put_task(&self, task: &Task) -> Result<()>;

    /// Deletes a task from the server. Deleting a task that does not exist is not an error
    async fn delete_task(&self, task_id: &str) -> Result<()>;
}
