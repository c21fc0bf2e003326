//! Bring every reload task's retry count to a target value.
//!
//! The task list is fetched once. Each task is then judged on its own: in a
//! dry run it is only reported; when applying, a task whose count differs is
//! re-fetched in full (the listing may be a projection), has `maxRetries`
//! replaced and is submitted back. The first failing call ends the run;
//! tasks updated before it stay updated.

use std::fmt;

use crate::connection::RunSettings;
use crate::error::Error;
use crate::ports::{ReloadTask, TaskRepository};

/// What happens to a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Not applying; the task is only reported.
    DryRun,
    /// The task already has the target count.
    AlreadyAtTarget,
    /// The task is re-fetched and updated to the target count.
    Update,
}

/// Decide what to do with one task.
#[must_use]
pub fn decide(task: &ReloadTask, settings: RunSettings) -> RetryDecision {
    if !settings.apply {
        RetryDecision::DryRun
    } else if task.max_retries == settings.target_retries {
        RetryDecision::AlreadyAtTarget
    } else {
        RetryDecision::Update
    }
}

/// The line printed for one task. Always ends with the task name.
#[must_use]
pub fn report_line(task: &ReloadTask, decision: RetryDecision, target: u32) -> String {
    let note = match decision {
        RetryDecision::DryRun => "dry run only, no change applied".to_string(),
        RetryDecision::AlreadyAtTarget => "no need to update".to_string(),
        RetryDecision::Update => format!("setting retry count to {target}"),
    };
    format!("{} maxRetries={}: {note}: {}", task.id, task.max_retries, task.name)
}

/// Counts from one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Tasks returned by the listing.
    pub examined: usize,
    /// Tasks updated in this run.
    pub updated: usize,
    /// Tasks left alone because they already matched.
    pub unchanged: usize,
    /// Tasks reported in a dry run whose count differs from the target.
    pub pending: usize,
    /// Whether changes were applied.
    pub applied: bool,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.applied {
            write!(
                f,
                "{} task(s) examined: {} updated, {} already at target",
                self.examined, self.updated, self.unchanged
            )
        } else {
            write!(
                f,
                "{} task(s) examined (dry run): {} would change, rerun with --apply to update",
                self.examined, self.pending
            )
        }
    }
}

/// Reconcile every task against the target, printing one line per task and
/// a summary.
///
/// # Errors
///
/// Returns [`Error::Api`] for the first listing, fetch or update that fails.
pub async fn reconcile(
    repo: &dyn TaskRepository,
    settings: RunSettings,
) -> Result<Summary, Error> {
    let tasks = repo
        .list_reload_tasks()
        .await
        .map_err(|e| Error::api("Failed to list reload tasks", e))?;
    tracing::info!(count = tasks.len(), target = settings.target_retries, "fetched reload tasks");

    let mut summary = Summary { applied: settings.apply, ..Summary::default() };
    for task in &tasks {
        let decision = decide(task, settings);
        match decision {
            RetryDecision::DryRun => {
                if task.max_retries != settings.target_retries {
                    summary.pending += 1;
                }
            }
            RetryDecision::AlreadyAtTarget => summary.unchanged += 1,
            RetryDecision::Update => {
                apply_target(repo, &task.id, settings.target_retries).await?;
                summary.updated += 1;
            }
        }
        summary.examined += 1;
        println!("{}", report_line(task, decision, settings.target_retries));
    }

    println!("{summary}");
    Ok(summary)
}

async fn apply_target(repo: &dyn TaskRepository, id: &str, target: u32) -> Result<(), Error> {
    let mut task = repo
        .get_reload_task(id)
        .await
        .map_err(|e| Error::api(format!("Failed to fetch reload task {id}"), e))?;
    let previous = task.max_retries;
    task.max_retries = target;

    repo.update_reload_task(&task)
        .await
        .map_err(|e| Error::api(format!("Failed to update reload task {id}"), e))?;
    tracing::debug!(%id, previous, target, "updated reload task");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::ports::{About, PortError, RepoFuture};

    fn ready<'a, T: Send + 'a>(result: Result<T, PortError>) -> RepoFuture<'a, T> {
        Box::pin(std::future::ready(result))
    }

    /// In-memory repository that persists updates and counts calls.
    ///
    /// Listing returns a projection without the extra fields, like the
    /// server's condensed listing.
    #[derive(Default)]
    struct FakeRepository {
        tasks: Mutex<Vec<ReloadTask>>,
        gets: Mutex<Vec<String>>,
        updates: Mutex<Vec<ReloadTask>>,
        fail_update_of: Option<String>,
    }

    impl FakeRepository {
        fn with(tasks: Vec<ReloadTask>) -> Self {
            Self { tasks: Mutex::new(tasks), ..Self::default() }
        }

        fn gets(&self) -> Vec<String> {
            self.gets.lock().unwrap().clone()
        }

        fn updates(&self) -> Vec<ReloadTask> {
            self.updates.lock().unwrap().clone()
        }

        fn stored(&self, id: &str) -> ReloadTask {
            self.tasks.lock().unwrap().iter().find(|t| t.id == id).unwrap().clone()
        }
    }

    impl TaskRepository for FakeRepository {
        fn about(&self) -> RepoFuture<'_, About> {
            ready(Ok(About::default()))
        }

        fn list_reload_tasks(&self) -> RepoFuture<'_, Vec<ReloadTask>> {
            let listed = self
                .tasks
                .lock()
                .unwrap()
                .iter()
                .map(|t| ReloadTask::new(t.id.clone(), t.name.clone(), t.max_retries))
                .collect();
            ready(Ok(listed))
        }

        fn get_reload_task<'a>(&'a self, id: &'a str) -> RepoFuture<'a, ReloadTask> {
            self.gets.lock().unwrap().push(id.to_string());
            let found = self.tasks.lock().unwrap().iter().find(|t| t.id == id).cloned();
            ready(found.ok_or_else(|| format!("no task {id}").into()))
        }

        fn update_reload_task<'a>(&'a self, task: &'a ReloadTask) -> RepoFuture<'a, ReloadTask> {
            if self.fail_update_of.as_deref() == Some(task.id.as_str()) {
                return ready(Err("HTTP 409 conflict".into()));
            }
            self.updates.lock().unwrap().push(task.clone());
            let mut tasks = self.tasks.lock().unwrap();
            if let Some(stored) = tasks.iter_mut().find(|t| t.id == task.id) {
                *stored = task.clone();
            }
            ready(Ok(task.clone()))
        }
    }

    fn full_task(id: &str, name: &str, max_retries: u32) -> ReloadTask {
        let mut task = ReloadTask::new(id, name, max_retries);
        task.extra.insert("enabled".into(), json!(true));
        task.extra.insert("modifiedDate".into(), json!("2024-05-01T10:00:00.000Z"));
        task.extra.insert("app".into(), json!({"id": format!("app-{id}")}));
        task
    }

    fn apply(target: u32) -> RunSettings {
        RunSettings { target_retries: target, apply: true }
    }

    #[test]
    fn decide_covers_each_case() {
        let task = ReloadTask::new("a", "A", 2);
        assert_eq!(decide(&task, RunSettings { target_retries: 0, apply: false }), RetryDecision::DryRun);
        assert_eq!(decide(&task, apply(2)), RetryDecision::AlreadyAtTarget);
        assert_eq!(decide(&task, apply(0)), RetryDecision::Update);
    }

    #[test]
    fn report_line_ends_with_task_name() {
        let task = ReloadTask::new("a1", "Nightly sales", 0);
        assert_eq!(
            report_line(&task, RetryDecision::Update, 3),
            "a1 maxRetries=0: setting retry count to 3: Nightly sales"
        );
        assert!(report_line(&task, RetryDecision::DryRun, 3)
            .contains("dry run only, no change applied"));
        assert!(report_line(&task, RetryDecision::AlreadyAtTarget, 0).ends_with("Nightly sales"));
    }

    #[tokio::test]
    async fn updates_only_the_mismatched_task() {
        let repo = FakeRepository::with(vec![full_task("A", "X", 0), full_task("B", "Y", 3)]);

        let summary = reconcile(&repo, apply(3)).await.unwrap();

        assert_eq!(repo.gets(), ["A"]);
        let updates = repo.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, "A");
        assert_eq!(updates[0].max_retries, 3);
        assert_eq!(summary, Summary { examined: 2, updated: 1, unchanged: 1, pending: 0, applied: true });
    }

    #[tokio::test]
    async fn submitted_record_differs_only_in_max_retries() {
        let original = full_task("A", "X", 5);
        let repo = FakeRepository::with(vec![original.clone()]);

        reconcile(&repo, apply(1)).await.unwrap();

        let submitted = &repo.updates()[0];
        assert_eq!(submitted.max_retries, 1);
        assert_eq!(ReloadTask { max_retries: 5, ..submitted.clone() }, original);
    }

    #[tokio::test]
    async fn dry_run_never_writes() {
        let repo = FakeRepository::with(vec![full_task("A", "X", 0), full_task("B", "Y", 7)]);

        let summary = reconcile(&repo, RunSettings { target_retries: 3, apply: false }).await.unwrap();

        assert!(repo.gets().is_empty());
        assert!(repo.updates().is_empty());
        assert_eq!(summary.pending, 2);
        assert!(!summary.applied);
    }

    #[tokio::test]
    async fn second_apply_run_is_a_no_op() {
        let repo = FakeRepository::with(vec![
            full_task("A", "X", 0),
            full_task("B", "Y", 2),
            full_task("C", "Z", 1),
        ]);

        let first = reconcile(&repo, apply(1)).await.unwrap();
        assert_eq!(first.updated, 2);

        let second = reconcile(&repo, apply(1)).await.unwrap();
        assert_eq!(second.updated, 0);
        assert_eq!(second.unchanged, 3);
        assert_eq!(repo.updates().len(), 2);
        assert_eq!(repo.stored("B").max_retries, 1);
    }

    #[tokio::test]
    async fn empty_listing_is_fine() {
        let repo = FakeRepository::default();
        let summary = reconcile(&repo, apply(0)).await.unwrap();
        assert_eq!(summary.examined, 0);
    }

    #[tokio::test]
    async fn failed_update_stops_the_run_without_rollback() {
        let mut repo = FakeRepository::with(vec![
            full_task("A", "X", 0),
            full_task("B", "Y", 0),
            full_task("C", "Z", 0),
        ]);
        repo.fail_update_of = Some("B".into());

        let err = reconcile(&repo, apply(2)).await.unwrap_err();

        assert!(err.to_string().contains("Failed to update reload task B"));
        assert!(!err.is_usage());
        assert_eq!(repo.stored("A").max_retries, 2);
        assert_eq!(repo.stored("C").max_retries, 0);
        assert_eq!(repo.gets(), ["A", "B"]);
    }
}
