use stowage::{DestroyAttachment, HasAttachments, JobOutcome, PromoteAttachment, SkipReason, StowageError};

use crate::support::{TestEnv, User, png};

#[tokio::test]
async fn detach_keeps_stored_file() {
    let env = TestEnv::inline().await;
    let mut user = User::persisted(1);
    env.attacher
        .one(&mut user, "avatar")
        .unwrap()
        .attach(png("keep"))
        .await
        .unwrap();
    let file = env.repo.all().await[0].file.clone().unwrap();

    let mut avatar = env.attacher.one(&mut user, "avatar").unwrap();
    avatar.detach().await.unwrap();
    assert!(avatar.is_blank().await.unwrap());

    assert!(env.repo.is_empty().await);
    assert!(env.exists(&file).await);
    assert!(!user.attachment_state().has_changes());
}

#[tokio::test]
async fn purge_removes_file_and_row() {
    let env = TestEnv::inline().await;
    let mut user = User::persisted(1);
    env.attacher
        .many(&mut user, "photos")
        .unwrap()
        .attach([png("a"), png("b")])
        .await
        .unwrap();
    let files: Vec<_> = env
        .repo
        .all()
        .await
        .into_iter()
        .filter_map(|a| a.file)
        .collect();
    assert_eq!(files.len(), 2);

    env.attacher
        .many(&mut user, "photos")
        .unwrap()
        .purge()
        .await
        .unwrap();

    assert!(env.repo.is_empty().await);
    for file in &files {
        assert!(!env.exists(file).await);
    }
    assert!(
        env.attacher
            .many(&mut user, "photos")
            .unwrap()
            .attachments()
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn purge_later_requires_queue() {
    let env = TestEnv::inline().await;
    let mut user = User::persisted(1);
    env.attacher
        .one(&mut user, "avatar")
        .unwrap()
        .attach(png("stays"))
        .await
        .unwrap();

    let err = env
        .attacher
        .one(&mut user, "avatar")
        .unwrap()
        .purge_later()
        .await
        .unwrap_err();

    assert!(matches!(err, StowageError::BackgroundingNotConfigured));
    assert_eq!(env.repo.len().await, 1);
    assert!(env.exists(env.repo.all().await[0].file.as_ref().unwrap()).await);
}

#[tokio::test]
async fn purge_later_deletes_row_now_and_file_in_background() {
    let env = TestEnv::queued().await;
    let mut user = User::persisted(1);
    env.attacher
        .one(&mut user, "avatar")
        .unwrap()
        .attach(png("later"))
        .await
        .unwrap();
    let cached = env.repo.all().await[0].file.clone().unwrap();
    assert!(cached.is_cached());

    env.attacher
        .one(&mut user, "avatar")
        .unwrap()
        .purge_later()
        .await
        .unwrap();

    assert!(env.repo.is_empty().await);
    // Disposal is deferred.
    assert!(env.exists(&cached).await);

    let types: Vec<_> = env.queue.tasks().into_iter().map(|t| t.task_type).collect();
    assert_eq!(
        types,
        vec![PromoteAttachment::TASK_TYPE, DestroyAttachment::TASK_TYPE]
    );

    let outcomes = env.drain_queue().await;
    assert_eq!(
        outcomes,
        vec![
            JobOutcome::Skipped(SkipReason::AttachmentMissing),
            JobOutcome::Destroyed { existed: true },
        ]
    );
    assert!(!env.exists(&cached).await);
}

#[tokio::test]
async fn purging_an_empty_slot_is_a_no_op() {
    let env = TestEnv::queued().await;
    let mut user = User::persisted(1);

    env.attacher
        .one(&mut user, "avatar")
        .unwrap()
        .purge_later()
        .await
        .unwrap();
    env.attacher
        .many(&mut user, "photos")
        .unwrap()
        .detach()
        .await
        .unwrap();

    assert!(env.queue.tasks().is_empty());
}

#[tokio::test]
async fn purge_after_background_promotion_removes_promoted_file() {
    let env = TestEnv::queued().await;
    let mut user = User::persisted(1);
    env.attacher
        .one(&mut user, "avatar")
        .unwrap()
        .attach(png("moved"))
        .await
        .unwrap();
    let outcomes = env.drain_queue().await;
    let [JobOutcome::Promoted(stored)] = outcomes.as_slice() else {
        panic!("expected a single promotion, got {outcomes:?}");
    };

    env.attacher
        .one(&mut user, "avatar")
        .unwrap()
        .purge()
        .await
        .unwrap();

    assert!(env.repo.is_empty().await);
    assert!(!env.exists(stored).await);
}

#[tokio::test]
async fn purge_later_after_background_promotion_destroys_promoted_file() {
    let env = TestEnv::queued().await;
    let mut user = User::persisted(1);
    env.attacher
        .one(&mut user, "avatar")
        .unwrap()
        .attach(png("moved"))
        .await
        .unwrap();
    let outcomes = env.drain_queue().await;
    let [JobOutcome::Promoted(stored)] = outcomes.as_slice() else {
        panic!("expected a single promotion, got {outcomes:?}");
    };

    env.attacher
        .one(&mut user, "avatar")
        .unwrap()
        .purge_later()
        .await
        .unwrap();

    let tasks = env.queue.tasks();
    assert_eq!(tasks.len(), 1);
    let job: DestroyAttachment = serde_json::from_value(tasks[0].payload.clone()).unwrap();
    assert_eq!(&job.file, stored);

    assert_eq!(
        env.drain_queue().await,
        vec![JobOutcome::Destroyed { existed: true }]
    );
    assert!(!env.exists(stored).await);
}
