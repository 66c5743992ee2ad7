//! The task store
//!
//! A [`Store`] owns the active and archive lists, persists them after every change, and reflects the changes
//! of `remote` tasks on the CalDAV server.
//!
//! Every mutation follows the same order: update memory, persist to disk, then talk to the server.
//! A network failure never rolls back the local change.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::cache::Cache;
use crate::client::Client;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::input::TaskInput;
use crate::query;
use crate::sync::progress::{FeedbackSender, SyncEvent, SyncProgress};
use crate::sync::{merge, tasks_to_push, SyncReport};
use crate::task::{CompletionStatus, ListName, Task};
use crate::traits::TaskRemote;


/// The fields of a task to create
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub note: Option<String>,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    /// `None` means the default list of the configuration
    pub list_name: Option<ListName>,
}

impl NewTask {
    pub fn new<S: ToString>(title: S) -> Self {
        Self { title: title.to_string(), ..Self::default() }
    }

    pub fn note<S: ToString>(mut self, note: S) -> Self {
        self.note = Some(note.to_string());
        self
    }

    pub fn tags<I: IntoIterator<Item = S>, S: ToString>(mut self, tags: I) -> Self {
        self.tags = tags.into_iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn list_name(mut self, list_name: ListName) -> Self {
        self.list_name = Some(list_name);
        self
    }
}

impl From<TaskInput> for NewTask {
    fn from(input: TaskInput) -> Self {
        Self {
            title: input.title,
            note: None,
            tags: input.tags,
            due_date: input.due_date,
            list_name: None,
        }
    }
}

/// Changes to apply to a task. `None` fields are left untouched
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskEdit {
    pub title: Option<String>,
    /// `Some(None)` clears the note
    pub note: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    /// `Some(None)` clears the due date
    pub due_date: Option<Option<DateTime<Utc>>>,
    /// Moves the task to another list
    pub list_name: Option<ListName>,
}

impl TaskEdit {
    fn apply_to(self, task: &mut Task, now: DateTime<Utc>) -> Result<()> {
        // First, so that an invalid title leaves the task untouched
        if let Some(title) = self.title {
            task.set_title(&title, now)?;
        }
        if let Some(note) = self.note {
            task.set_note(note, now);
        }
        if let Some(tags) = self.tags {
            task.set_tags(tags, now);
        }
        if let Some(due_date) = self.due_date {
            task.set_due_date(due_date, now);
        }
        if let Some(list_name) = self.list_name {
            task.set_list_name(list_name, now);
        }
        Ok(())
    }
}


#[derive(Debug, Default)]
struct Lists {
    active: Vec<Task>,
    archive: Vec<Task>,
}

impl Lists {
    fn archived_ids(&self) -> HashSet<String> {
        self.archive.iter().map(|t| t.id().to_string()).collect()
    }

    fn active_index(&self, id: &str) -> Result<usize> {
        self.active.iter()
            .position(|t| t.id() == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn archive_index(&self, id: &str) -> Result<usize> {
        self.archive.iter()
            .position(|t| t.id() == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Restores the invariants of freshly loaded lists. Returns whether anything changed
    fn repair(&mut self) -> bool {
        let mut changed = false;

        let mut archived_ids = HashSet::new();
        let mut archive = Vec::with_capacity(self.archive.len());
        for mut task in self.archive.drain(..) {
            if archived_ids.insert(task.id().to_string()) == false {
                log::warn!("Task {} appears twice in the archive, dropping the second copy", task.id());
                changed = true;
                continue;
            }
            if task.archived() == false {
                let updated_at = *task.updated_at();
                task.set_archived(true, updated_at);
                changed = true;
            }
            archive.push(task);
        }
        self.archive = archive;

        let mut active_ids = HashSet::new();
        let mut active = Vec::with_capacity(self.active.len());
        for mut task in self.active.drain(..) {
            if archived_ids.contains(task.id()) {
                log::warn!("Task {} is both active and archived, keeping the archived copy", task.id());
                changed = true;
                continue;
            }
            if active_ids.insert(task.id().to_string()) == false {
                log::warn!("Task {} appears twice in the active list, dropping the second copy", task.id());
                changed = true;
                continue;
            }
            if task.archived() {
                let updated_at = *task.updated_at();
                task.set_archived(false, updated_at);
                changed = true;
            }
            active.push(task);
        }
        self.active = active;

        changed
    }

    /// Moves the tasks that have been completed for long enough to the archive. Returns how many moved
    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let (to_archive, to_keep): (Vec<Task>, Vec<Task>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(|t| t.is_archivable(now));
        self.active = to_keep;

        let n_archived = to_archive.len();
        for mut task in to_archive {
            log::debug!("Auto-archiving task {}", task.id());
            task.set_archived(true, now);
            self.archive.push(task);
        }
        n_archived
    }
}


/// The task store. It is `Send + Sync`, and meant to be shared in an `Arc`
pub struct Store {
    cache: Cache,
    default_list: ListName,
    remote: Option<Box<dyn TaskRemote>>,
    clock: Arc<dyn Clock>,
    /// Set once the remote collection is known to exist
    collection_ready: AtomicBool,

    data: RwLock<Lists>,
    /// Held by every write operation (and by a whole sync)
    writer: Mutex<()>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("folder", &self.cache.folder())
            .field("default_list", &self.default_list)
            .field("sync_enabled", &self.sync_enabled())
            .finish()
    }
}

impl Store {
    /// Open the store described by `config`, with the system clock.
    /// A CalDAV client is created when sync is enabled.
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Same as [`Store::open`], with another time source. The CalDAV client shares it.
    pub fn open_with_clock(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let remote = Client::from_config(config)?
            .map(|client| Box::new(client.with_clock(clock.clone())) as Box<dyn TaskRemote>);
        Self::open_with(config, remote, clock)
    }

    /// Open a store with an explicit remote (`None` disables sync) and time source.
    ///
    /// The task files are read, repaired if needed, and tasks that have been completed for more than a day are archived.
    pub fn open_with(config: &Config, remote: Option<Box<dyn TaskRemote>>, clock: Arc<dyn Clock>) -> Result<Self> {
        let cache = Cache::new(&config.data_dir);
        let mut lists = Lists {
            active: cache.load_active()?,
            archive: cache.load_archive()?,
        };

        let repaired = lists.repair();
        let n_archived = lists.sweep(clock.now());
        if n_archived > 0 {
            log::info!("Archived {} completed tasks", n_archived);
        }
        if repaired || n_archived > 0 {
            cache.save_archive(&lists.archive)?;
            cache.save_active(&lists.active)?;
        }
        log::debug!("Loaded {} active and {} archived tasks from {:?}", lists.active.len(), lists.archive.len(), cache.folder());

        Ok(Self {
            cache,
            default_list: config.default_list,
            remote,
            clock,
            collection_ready: AtomicBool::new(false),
            data: RwLock::new(lists),
            writer: Mutex::new(()),
        })
    }

    pub fn sync_enabled(&self) -> bool {
        self.remote.is_some()
    }

    pub fn default_list(&self) -> ListName {
        self.default_list
    }

    //
    // Reads
    //

    /// The active tasks, in canonical order
    pub async fn all_tasks(&self) -> Vec<Task> {
        let data = self.data.read().await;
        let mut tasks = data.active.clone();
        query::sort_tasks(&mut tasks);
        tasks
    }

    /// Incomplete active tasks due today (local time)
    pub async fn due_today(&self) -> Result<Vec<Task>> {
        let data = self.data.read().await;
        query::due_today(&data.active, self.clock.now())
    }

    pub async fn get(&self, id: &str) -> Option<Task> {
        let data = self.data.read().await;
        data.active.iter().find(|t| t.id() == id).cloned()
    }

    pub async fn get_archived(&self, id: &str) -> Option<Task> {
        let data = self.data.read().await;
        data.archive.iter().find(|t| t.id() == id).cloned()
    }

    /// The archived tasks, in the order they were archived
    pub async fn archived_tasks(&self) -> Vec<Task> {
        self.data.read().await.archive.clone()
    }

    /// Active tasks whose title fuzzy-matches `pattern`
    pub async fn search(&self, pattern: &str) -> Vec<Task> {
        let data = self.data.read().await;
        query::search(&data.active, pattern)
    }

    //
    // Writes
    //

    /// Create a task at the end of the active list
    pub async fn add(&self, new_task: NewTask) -> Result<Task> {
        let _gate = self.writer.lock().await;
        let now = self.clock.now();

        let mut task = Task::new(&new_task.title, new_task.list_name.unwrap_or(self.default_list), now)?;
        task.set_note(new_task.note, now);
        task.set_tags(new_task.tags, now);
        task.set_due_date(new_task.due_date, now);

        {
            let mut data = self.data.write().await;
            data.active.push(task.clone());
            self.cache.save_active(&data.active)?;
        }
        log::debug!("Added task {} to the {} list", task.id(), task.list_name());

        if task.is_remote() {
            self.upload(&task).await?;
        }
        Ok(task)
    }

    /// Create a task from a quick-add line, such as `Buy milk +shopping +1d`
    pub async fn add_from_input(&self, input: &str) -> Result<Task> {
        let input = TaskInput::parse(input, self.clock.now())?;
        self.add(input.into()).await
    }

    /// Edit an active task.
    ///
    /// Moving a task to the remote list uploads it, moving it to the local list removes it from the server.
    pub async fn update(&self, id: &str, edit: TaskEdit) -> Result<Task> {
        let _gate = self.writer.lock().await;
        let now = self.clock.now();

        let (task, previous_list) = {
            let mut data = self.data.write().await;
            let index = data.active_index(id)?;
            let mut task = data.active[index].clone();
            let previous_list = task.list_name();
            edit.apply_to(&mut task, now)?;
            data.active[index] = task.clone();
            self.cache.save_active(&data.active)?;
            (task, previous_list)
        };

        match (previous_list, task.list_name()) {
            (_, ListName::Remote) => self.upload(&task).await?,
            (ListName::Remote, ListName::Local) => self.delete_remote_copy(task.id()).await,
            (ListName::Local, ListName::Local) => {},
        }
        Ok(task)
    }

    /// Delete a task, active or archived.
    /// Failing to delete the server copy is logged, not returned.
    pub async fn delete(&self, id: &str) -> Result<Task> {
        let _gate = self.writer.lock().await;

        let task = {
            let mut data = self.data.write().await;
            if let Ok(index) = data.active_index(id) {
                let task = data.active.remove(index);
                self.cache.save_active(&data.active)?;
                task
            } else {
                let index = data.archive_index(id)?;
                let task = data.archive.remove(index);
                self.cache.save_archive(&data.archive)?;
                task
            }
        };
        log::debug!("Deleted task {}", task.id());

        if task.is_remote() {
            self.delete_remote_copy(task.id()).await;
        }
        Ok(task)
    }

    /// Mark an active task as completed, or reopen it
    pub async fn toggle_complete(&self, id: &str) -> Result<Task> {
        let _gate = self.writer.lock().await;
        let now = self.clock.now();

        let task = {
            let mut data = self.data.write().await;
            let index = data.active_index(id)?;
            data.active[index].toggle_completion(now);
            self.cache.save_active(&data.active)?;
            data.active[index].clone()
        };

        if task.is_remote() {
            self.upload(&task).await?;
        }
        Ok(task)
    }

    /// Move an active task to the archive. The server copy is left as it is
    pub async fn archive(&self, id: &str) -> Result<Task> {
        let _gate = self.writer.lock().await;
        let now = self.clock.now();

        let mut data = self.data.write().await;
        let index = data.active_index(id)?;
        let mut task = data.active.remove(index);
        task.set_archived(true, now);
        data.archive.push(task.clone());
        self.persist(&data)?;
        Ok(task)
    }

    /// Move every completed active task to the archive. Returns how many were moved
    pub async fn archive_all_completed(&self) -> Result<usize> {
        let _gate = self.writer.lock().await;
        let now = self.clock.now();

        let mut data = self.data.write().await;
        let (completed, open): (Vec<Task>, Vec<Task>) = std::mem::take(&mut data.active)
            .into_iter()
            .partition(|t| t.completed());
        data.active = open;

        let n_archived = completed.len();
        for mut task in completed {
            task.set_archived(true, now);
            data.archive.push(task);
        }
        if n_archived > 0 {
            self.persist(&data)?;
        }
        Ok(n_archived)
    }

    /// Bring an archived task back to the end of the active list, reopened
    pub async fn unarchive(&self, id: &str) -> Result<Task> {
        let _gate = self.writer.lock().await;
        let now = self.clock.now();

        let task = {
            let mut data = self.data.write().await;
            let index = data.archive_index(id)?;
            let mut task = data.archive.remove(index);
            task.set_archived(false, now);
            task.set_completion_status(CompletionStatus::Uncompleted, now);
            data.active.push(task.clone());
            self.persist(&data)?;
            task
        };

        if task.is_remote() {
            self.upload(&task).await?;
        }
        Ok(task)
    }

    //
    // Sync
    //

    /// Reconcile the active list with the server
    pub async fn sync(&self) -> Result<SyncReport> {
        self.run_sync(SyncProgress::new()).await
    }

    /// Same as [`Store::sync`], publishing its progress to `feedback_sender`
    pub async fn sync_with_feedback(&self, feedback_sender: FeedbackSender) -> Result<SyncReport> {
        self.run_sync(SyncProgress::new_with_feedback_channel(feedback_sender)).await
    }

    async fn run_sync(&self, mut progress: SyncProgress) -> Result<SyncReport> {
        let remote = self.remote.as_deref()
            .ok_or_else(|| Error::Config("sync is not enabled".to_string()))?;
        let _gate = self.writer.lock().await;

        log::info!("Starting a sync");
        progress.feedback(SyncEvent::Started);

        let result = self.sync_inner(remote, &mut progress).await;
        match &result {
            Ok(()) => {
                let report = progress.report_mut();
                log::info!("Sync finished: {} pulled, {} pushed, {} archived skipped, {} warnings",
                    report.pulled, report.pushed, report.skipped_archived, report.warnings.len());
                let success = report.is_clean();
                progress.feedback(SyncEvent::Finished{ success });
            },
            Err(err) => {
                log::error!("Sync aborted: {}", err);
                progress.feedback(SyncEvent::Finished{ success: false });
            },
        }
        result.map(|()| progress.into_report())
    }

    async fn sync_inner(&self, remote: &dyn TaskRemote, progress: &mut SyncProgress) -> Result<()> {
        progress.feedback(SyncEvent::InProgress{ details: "Checking the remote collection".to_string() });
        remote.ensure_collection().await?;
        self.collection_ready.store(true, Ordering::SeqCst);

        progress.feedback(SyncEvent::InProgress{ details: "Fetching remote tasks".to_string() });
        let remote_tasks = remote.list_tasks().await?;

        let to_push = {
            let data = self.data.read().await;
            tasks_to_push(&data.active, &remote_tasks, &data.archived_ids())
        };
        if to_push.is_empty() == false {
            progress.feedback(SyncEvent::InProgress{ details: format!("Uploading {} tasks", to_push.len()) });
        }
        for task in &to_push {
            match remote.put_task(task).await {
                Ok(()) => progress.report_mut().pushed += 1,
                Err(err) => progress.warn(task.id(), format!("unable to upload the task: {}", err)),
            }
        }

        progress.feedback(SyncEvent::InProgress{ details: "Merging".to_string() });
        let mut data = self.data.write().await;
        let merged = merge(data.active.clone(), remote_tasks, &data.archived_ids(), progress);
        self.cache.save_active(&merged)?;
        data.active = merged;
        Ok(())
    }

    //
    // Helpers
    //

    /// Archive first, so that an interrupted save leaves the task archived
    fn persist(&self, data: &Lists) -> Result<()> {
        self.cache.save_archive(&data.archive)?;
        self.cache.save_active(&data.active)
    }

    /// PUT a task, creating the collection first if it has not been seen yet
    async fn upload(&self, task: &Task) -> Result<()> {
        let remote = match &self.remote {
            None => {
                log::debug!("Sync is disabled, task {} stays local for now", task.id());
                return Ok(());
            },
            Some(remote) => remote,
        };

        if self.collection_ready.load(Ordering::SeqCst) == false {
            remote.ensure_collection().await?;
            self.collection_ready.store(true, Ordering::SeqCst);
        }
        remote.put_task(task).await
    }

    async fn delete_remote_copy(&self, id: &str) {
        if let Some(remote) = &self.remote {
            if let Err(err) = remote.delete_task(id).await {
                log::warn!("Unable to delete task {} from the server: {}", id, err);
            }
        }
    }
}
