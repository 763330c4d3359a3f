use std::fmt;

use anyhow::anyhow;
use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use crate::storage::{KeyValueStore, load_tasks, save_tasks};
use crate::task::{ParsedInput, Task, TaskId};

/// Receives the full task list after every applied mutation.
pub trait StoreObserver {
    fn on_change(&mut self, tasks: &[Task]);
}

impl<F> StoreObserver for F
where
    F: FnMut(&[Task]),
{
    fn on_change(&mut self, tasks: &[Task]) {
        self(tasks)
    }
}

/// Write-through persistence: serializes the list into `S` on every change.
#[derive(Debug)]
pub struct PersistOnChange<S> {
    store: S,
}

impl<S: KeyValueStore> PersistOnChange<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: KeyValueStore> StoreObserver for PersistOnChange<S> {
    fn on_change(&mut self, tasks: &[Task]) {
        save_tasks(&mut self.store, tasks);
    }
}

/// A task taken out of the list, with the position it held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    pub task: Task,
    pub index: usize,
}

/// Sole owner of the task list. Tasks are kept most recent first; every
/// operation either applies fully and notifies observers, or does nothing.
pub struct TaskStore {
    tasks: Vec<Task>,
    observers: Vec<Box<dyn StoreObserver>>,
}

impl fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStore")
            .field("tasks", &self.tasks)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl TaskStore {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            observers: vec![],
        }
    }

    /// Loads from `kv` and keeps it updated after every change.
    #[instrument(skip(kv))]
    pub fn open<S>(kv: S) -> Self
    where
        S: KeyValueStore + 'static,
    {
        let tasks = load_tasks(&kv);
        info!(count = tasks.len(), "opened task store");
        let mut store = Self::new(tasks);
        store.subscribe(Box::new(PersistOnChange::new(kv)));
        store
    }

    pub fn subscribe(&mut self, observer: Box<dyn StoreObserver>) {
        self.observers.push(observer);
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Finds a task by full id or by a prefix shared with no other task.
    pub fn resolve(&self, reference: &str) -> anyhow::Result<TaskId> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(anyhow!("task id cannot be empty"));
        }

        if let Some(task) = self.tasks.iter().find(|t| t.id.as_str() == reference) {
            return Ok(task.id.clone());
        }

        let matches: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| t.id.as_str().starts_with(reference))
            .collect();

        match matches.as_slice() {
            [] => Err(anyhow!("no task matches id {reference}")),
            [task] => Ok(task.id.clone()),
            many => Err(anyhow!(
                "id {reference} is ambiguous; matches {}",
                many.iter()
                    .map(|t| t.id.short().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }

    #[instrument(skip(self))]
    pub fn add(&mut self, raw: &str, due_at: Option<NaiveDate>) -> Option<TaskId> {
        let Some(task) = Task::from_input(raw, due_at) else {
            debug!("ignoring add with empty display text");
            return None;
        };
        let id = task.id.clone();
        self.tasks.insert(0, task);
        debug!(id = %id, count = self.tasks.len(), "task added");
        self.notify();
        Some(id)
    }

    #[instrument(skip(self), fields(id = %id))]
    pub fn toggle(&mut self, id: &TaskId) -> bool {
        let Some(task) = self.find_mut(id) else {
            return false;
        };
        task.completed = !task.completed;
        debug!(completed = task.completed, "task toggled");
        self.notify();
        true
    }

    #[instrument(skip(self), fields(id = %id))]
    pub fn delete(&mut self, id: &TaskId) -> Option<Removed> {
        let index = self.tasks.iter().position(|t| &t.id == id)?;
        let task = self.tasks.remove(index);
        debug!(index, "task deleted");
        self.notify();
        Some(Removed { task, index })
    }

    /// Rewrites text and tags from new raw input. Input that strips down to
    /// nothing is rejected and the task is left as it was.
    #[instrument(skip(self), fields(id = %id))]
    pub fn edit(&mut self, id: &TaskId, raw: &str) -> bool {
        let Some(parsed) = ParsedInput::parse(raw) else {
            debug!("ignoring edit with empty display text");
            return false;
        };
        let Some(task) = self.find_mut(id) else {
            return false;
        };
        task.apply_input(parsed);
        debug!(tags = ?task.tags, "task edited");
        self.notify();
        true
    }

    #[instrument(skip(self), fields(id = %id))]
    pub fn toggle_pin(&mut self, id: &TaskId) -> bool {
        let Some(task) = self.find_mut(id) else {
            return false;
        };
        task.pinned = !task.pinned;
        debug!(pinned = task.pinned, "task pin toggled");
        self.notify();
        true
    }

    #[instrument(skip(self), fields(id = %id))]
    pub fn set_due_date(&mut self, id: &TaskId, due_at: Option<NaiveDate>) -> bool {
        let Some(task) = self.find_mut(id) else {
            return false;
        };
        task.due_at = due_at;
        self.notify();
        true
    }

    /// Puts a deleted task back where it was, under a fresh id.
    #[instrument(skip(self, removed), fields(old_id = %removed.task.id))]
    pub fn restore(&mut self, removed: Removed) -> TaskId {
        let mut task = removed.task;
        task.id = TaskId::new();
        let id = task.id.clone();
        let index = removed.index.min(self.tasks.len());
        self.tasks.insert(index, task);
        debug!(new_id = %id, index, "task restored");
        self.notify();
        id
    }

    #[instrument(skip(self))]
    pub fn clear_completed(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(Task::is_active);
        let removed = before - self.tasks.len();
        if removed > 0 {
            info!(removed, "cleared completed tasks");
            self.notify();
        }
        removed
    }

    fn find_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| &t.id == id)
    }

    fn notify(&mut self) {
        for observer in &mut self.observers {
            observer.on_change(&self.tasks);
        }
    }
}
