//! 后台任务服务：按标签（会话 id）管理处理任务
//!
//! restart(tag) 先取消同一标签下所有未完成的任务，再派生新任务；每个任务持有自己的 CancellationToken。
//! 回收（collect）按间隔限流，强制回收时先取消全部任务再逐个等待；任务错误与 panic 都只写日志，不抛给调用方。

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct TaskEntry {
    tag: String,
    cancel: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

#[derive(Default)]
struct Tasks {
    entries: HashMap<String, TaskEntry>,
    last_collection: Option<Instant>,
}

pub struct BackgroundTaskService {
    tasks: Mutex<Tasks>,
    gc_interval: Duration,
}

impl BackgroundTaskService {
    pub fn new(gc_interval_ms: u64) -> Self {
        Self {
            tasks: Mutex::new(Tasks::default()),
            gc_interval: Duration::from_millis(gc_interval_ms),
        }
    }

    /// 取消 tag 下的旧任务并启动新任务，返回任务 id
    pub async fn restart<F, Fut>(&self, tag: &str, task_id: String, f: F) -> String
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        {
            let mut tasks = self.tasks.lock().await;
            for entry in tasks.entries.values().filter(|e| e.tag == tag) {
                if !entry.handle.is_finished() && !entry.cancel.is_cancelled() {
                    tracing::info!(tag, "superseding in-flight task");
                    entry.cancel.cancel();
                }
            }

            let cancel = CancellationToken::new();
            let handle = tokio::spawn(f(cancel.clone()));
            tasks.entries.insert(
                task_id.clone(),
                TaskEntry {
                    tag: tag.to_string(),
                    cancel,
                    handle,
                },
            );
        }

        self.collect(false).await;
        task_id
    }

    /// 取消 tag 下的全部任务
    pub async fn cancel(&self, tag: &str) {
        let tasks = self.tasks.lock().await;
        for entry in tasks.entries.values().filter(|e| e.tag == tag) {
            entry.cancel.cancel();
        }
    }

    /// 尚未结束的任务数
    pub async fn running(&self, tag: &str) -> usize {
        self.tasks
            .lock()
            .await
            .entries
            .values()
            .filter(|e| e.tag == tag && !e.handle.is_finished())
            .count()
    }

    /// 回收已结束的任务；force 时取消并等待全部任务
    pub async fn collect(&self, force: bool) {
        let finished: Vec<(String, TaskEntry)> = {
            let mut tasks = self.tasks.lock().await;
            let now = Instant::now();
            if !force {
                if let Some(last) = tasks.last_collection {
                    if now.duration_since(last) < self.gc_interval {
                        return;
                    }
                }
            }
            tasks.last_collection = Some(now);

            if force {
                for entry in tasks.entries.values() {
                    entry.cancel.cancel();
                }
            }
            let ids: Vec<String> = tasks
                .entries
                .iter()
                .filter(|(_, e)| force || e.handle.is_finished())
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| tasks.entries.remove(&id).map(|e| (id, e)))
                .collect()
        };

        if finished.is_empty() {
            return;
        }
        tracing::debug!(count = finished.len(), force, "collecting background tasks");

        for (task_id, entry) in finished {
            match entry.handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(task_id = %task_id, tag = %entry.tag, error = ?e, "background task failed");
                }
                Err(e) if e.is_cancelled() => {
                    tracing::debug!(task_id = %task_id, "background task aborted");
                }
                Err(e) => {
                    tracing::error!(task_id = %task_id, tag = %entry.tag, error = %e, "background task panicked");
                }
            }
        }
    }
}
