//! An in-memory [`TaskRemote`], that can be told to fail on some calls
//!
//! This is what the tests use in place of a CalDAV server.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::task::Task;
use crate::traits::{CollectionState, TaskRemote};

/// This stores some behaviour tweaks, that describe how a mocked instance will behave during a given test
///
/// So that a functions fails _n_ times after _m_ initial successes, set `(m, n)` for the suited parameter
#[derive(Default, Clone, Debug)]
pub struct MockBehaviour {
    /// If this is true, every action will be allowed
    pub is_suspended: bool,

    pub probe_behaviour: (u32, u32),
    pub create_collection_behaviour: (u32, u32),
    pub list_tasks_behaviour: (u32, u32),
    pub put_task_behaviour: (u32, u32),
    pub delete_task_behaviour: (u32, u32),
}

impl MockBehaviour {
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls will fail at once, for `n_fails` times
    pub fn fail_now(n_fails: u32) -> Self {
        Self {
            is_suspended: false,
            probe_behaviour: (0, n_fails),
            create_collection_behaviour: (0, n_fails),
            list_tasks_behaviour: (0, n_fails),
            put_task_behaviour: (0, n_fails),
            delete_task_behaviour: (0, n_fails),
        }
    }

    /// Suspend this mock behaviour until you call `resume`
    pub fn suspend(&mut self) {
        self.is_suspended = true;
    }
    /// Make this behaviour active again
    pub fn resume(&mut self) {
        self.is_suspended = false;
    }

    pub fn can_probe(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.probe_behaviour, "probe")
    }
    pub fn can_create_collection(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.create_collection_behaviour, "create_collection")
    }
    pub fn can_list_tasks(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.list_tasks_behaviour, "list_tasks")
    }
    pub fn can_put_task(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.put_task_behaviour, "put_task")
    }
    pub fn can_delete_task(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.delete_task_behaviour, "delete_task")
    }
}


/// Return Ok(()) in case the value is `(1+, _)` or `(_, 0)`, or return Err and decrement otherwise
fn decrement(value: &mut (u32, u32), descr: &str) -> Result<()> {
    let remaining_successes = value.0;
    let remaining_failures = value.1;

    if remaining_successes > 0 {
        value.0 -= 1;
        log::debug!("Mock behaviour: allowing a {} ({:?})", descr, value);
        Ok(())
    } else if remaining_failures > 0 {
        value.1 -= 1;
        log::debug!("Mock behaviour: failing a {} ({:?})", descr, value);
        Err(Error::Network(format!("Mocked behaviour requires this {} to fail this time. ({:?})", descr, value)))
    } else {
        log::debug!("Mock behaviour: allowing a {} ({:?})", descr, value);
        Ok(())
    }
}


/// A call received by a [`MockRemote`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockCall {
    Probe,
    CreateCollection,
    ListTasks,
    PutTask(String),
    DeleteTask(String),
}

#[derive(Debug, Default)]
struct MockState {
    collection_exists: bool,
    /// In server order
    tasks: Vec<Task>,
    calls: Vec<MockCall>,
    behaviour: MockBehaviour,
}

/// A fake task collection.
///
/// Clones share the same state, so that a test can keep a handle on a remote it has given to a [`Store`](crate::store::Store).
#[derive(Clone, Debug, Default)]
pub struct MockRemote {
    state: Arc<Mutex<MockState>>,
}

impl MockRemote {
    /// A remote whose collection does not exist yet
    pub fn new() -> Self {
        Self::default()
    }

    /// A remote whose collection exists and holds these tasks
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let remote = Self::new();
        {
            let mut state = remote.lock();
            state.collection_exists = true;
            state.tasks = tasks;
        }
        remote
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_behaviour(&self, behaviour: MockBehaviour) {
        self.lock().behaviour = behaviour;
    }

    pub fn collection_exists(&self) -> bool {
        self.lock().collection_exists
    }

    /// The tasks the collection currently holds
    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.lock().tasks.iter().find(|t| t.id() == id).cloned()
    }

    /// Store a task as if another client had uploaded it
    pub fn insert(&self, task: Task) {
        let mut state = self.lock();
        state.collection_exists = true;
        upsert(&mut state.tasks, task);
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

fn upsert(tasks: &mut Vec<Task>, task: Task) {
    match tasks.iter_mut().find(|t| t.id() == task.id()) {
        Some(existing) => *existing = task,
        None => tasks.push(task),
    }
}


#[async_trait]
impl TaskRemote for MockRemote {
    async fn probe(&self) -> Result<CollectionState> {
        let mut state = self.lock();
        state.calls.push(MockCall::Probe);
        state.behaviour.can_probe()?;
        Ok(match state.collection_exists {
            true => CollectionState::Present,
            false => CollectionState::Missing,
        })
    }

    async fn create_collection(&self) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::CreateCollection);
        state.behaviour.can_create_collection()?;
        state.collection_exists = true;
        Ok(())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut state = self.lock();
        state.calls.push(MockCall::ListTasks);
        state.behaviour.can_list_tasks()?;
        if state.collection_exists == false {
            return Err(Error::Network("REPORT failed with status 404 Not Found".to_string()));
        }
        Ok(state.tasks.clone())
    }

    async fn put_task(&self, task: &Task) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::PutTask(task.id().to_string()));
        state.behaviour.can_put_task()?;
        if state.collection_exists == false {
            return Err(Error::Network("PUT failed with status 409 Conflict".to_string()));
        }
        // The server only knows what the iCal representation carries
        let mut stored = task.clone();
        stored.set_archived(false, *task.updated_at());
        stored.set_list_name(crate::task::ListName::Remote, *task.updated_at());
        upsert(&mut state.tasks, stored);
        Ok(())
    }

    async fn delete_task(&self, task_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::DeleteTask(task_id.to_string()));
        state.behaviour.can_delete_task()?;
        state.tasks.retain(|t| t.id() != task_id);
        Ok(())
    }
}
