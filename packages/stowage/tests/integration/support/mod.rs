use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use common::storage::FilesystemStorage;
use common::{FileStorage, Task, TaskQueue, Upload};
use stowage::{
    Attacher, AttachmentState, BasicUploader, DependentPolicy, HasAttachments, JobOutcome,
    MemoryRepository, ReferenceCodec, SlotOptions, SlotSet, perform_task,
};
use tempfile::TempDir;

pub const SECRET: &[u8] = b"integration-secret";

static USER_SLOTS: LazyLock<SlotSet> = LazyLock::new(|| {
    SlotSet::new()
        .has_one_attached(
            "avatar",
            SlotOptions::new().uploader(
                BasicUploader::new("Image")
                    .allow_types(["image/*"])
                    .max_size(1024),
            ),
        )
        .has_many_attached("photos", SlotOptions::new())
        .has_one_attached(
            "resume",
            SlotOptions::new().dependent(DependentPolicy::Delete),
        )
        .has_many_attached(
            "archive",
            SlotOptions::new().dependent(DependentPolicy::Nullify),
        )
        .has_one_attached("badge", SlotOptions::new().strict_loading(true))
});

/// Host record used throughout the tests.
#[derive(Debug, Default)]
pub struct User {
    pub id: Option<i64>,
    pub changed: bool,
    pub attachments: AttachmentState,
}

impl User {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persisted(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }
}

impl HasAttachments for User {
    fn owner_type() -> &'static str {
        "User"
    }

    fn slots() -> &'static SlotSet {
        &USER_SLOTS
    }

    fn owner_id(&self) -> Option<String> {
        self.id.map(|id| id.to_string())
    }

    fn is_changed(&self) -> bool {
        self.changed
    }

    fn attachment_state(&self) -> &AttachmentState {
        &self.attachments
    }

    fn attachment_state_mut(&mut self) -> &mut AttachmentState {
        &mut self.attachments
    }
}

/// Task queue double that only records what was enqueued.
#[derive(Debug, Default)]
pub struct RecordingQueue {
    tasks: Mutex<Vec<Task>>,
}

impl RecordingQueue {
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<Task> {
        std::mem::take(&mut *self.tasks.lock().unwrap())
    }
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    async fn enqueue(&self, task: Task) -> anyhow::Result<()> {
        self.tasks.lock().unwrap().push(task);
        Ok(())
    }
}

pub struct TestEnv {
    _dir: TempDir,
    pub storage: Arc<FilesystemStorage>,
    pub repo: Arc<MemoryRepository>,
    pub queue: Arc<RecordingQueue>,
    pub attacher: Attacher,
}

impl TestEnv {
    /// No task queue: promotion and disposal run inline.
    pub async fn inline() -> Self {
        Self::build(false).await
    }

    /// Promotion and disposal go to a recording queue.
    pub async fn queued() -> Self {
        Self::build(true).await
    }

    async fn build(with_queue: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(
            FilesystemStorage::new(dir.path().to_path_buf(), 1024 * 1024)
                .await
                .unwrap(),
        );
        let repo = Arc::new(MemoryRepository::new());
        let queue = Arc::new(RecordingQueue::default());
        let codec = ReferenceCodec::new(SECRET, "attachment-reference").unwrap();

        let mut attacher = Attacher::new(repo.clone(), storage.clone(), codec);
        if with_queue {
            attacher = attacher.with_queue(queue.clone());
        }

        Self {
            _dir: dir,
            storage,
            repo,
            queue,
            attacher,
        }
    }

    pub fn codec(&self) -> &ReferenceCodec {
        self.attacher.codec()
    }

    /// Run every recorded task in order, as the worker would.
    pub async fn drain_queue(&self) -> Vec<JobOutcome> {
        let mut outcomes = Vec::new();
        for task in self.queue.take() {
            outcomes.push(
                perform_task(&task, self.repo.as_ref(), self.storage.as_ref())
                    .await
                    .unwrap(),
            );
        }
        outcomes
    }

    pub async fn exists(&self, file: &common::UploadedFile) -> bool {
        self.storage.exists(file).await.unwrap()
    }
}

pub fn png(tag: &str) -> Upload {
    Upload::new(format!("png-{tag}").into_bytes()).with_filename(format!("{tag}.png"))
}

pub fn text(tag: &str) -> Upload {
    Upload::new(format!("text-{tag}").into_bytes()).with_filename(format!("{tag}.txt"))
}

/// `token` with the last signature character changed.
pub fn forge(token: &str) -> String {
    let (head, last) = token.split_at(token.len() - 1);
    let flipped = if last == "0" { "1" } else { "0" };
    format!("{head}{flipped}")
}
