use common::{FileStorage, StorageTier};
use stowage::{
    AttachmentRepository, HasAttachments, JobOutcome, PromoteAttachment, RowOp, SkipReason,
    perform_task,
};

use crate::support::{TestEnv, User, png};

#[tokio::test]
async fn inline_promotion_moves_file_to_store() {
    let env = TestEnv::inline().await;
    let mut user = User::persisted(1);
    env.attacher
        .one(&mut user, "avatar")
        .unwrap()
        .attach(png("inline"))
        .await
        .unwrap();

    let row = &env.repo.all().await[0];
    let file = row.file.as_ref().unwrap();
    assert_eq!(file.storage, StorageTier::Store);
    assert_eq!(env.storage.read(file).await.unwrap(), b"png-inline");
    assert!(env.queue.tasks().is_empty());

    // The owner's cached view follows the promotion.
    let current = env
        .attacher
        .one(&mut user, "avatar")
        .unwrap()
        .attachment()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.file.as_ref(), Some(file));
}

#[tokio::test]
async fn queued_promotion_runs_in_worker() {
    let env = TestEnv::queued().await;
    let mut user = User::persisted(1);
    env.attacher
        .one(&mut user, "avatar")
        .unwrap()
        .attach(png("queued"))
        .await
        .unwrap();
    let cached = env.repo.all().await[0].file.clone().unwrap();
    assert!(cached.is_cached());

    let outcomes = env.drain_queue().await;
    let [JobOutcome::Promoted(stored)] = outcomes.as_slice() else {
        panic!("expected a single promotion, got {outcomes:?}");
    };

    assert_eq!(stored.storage, StorageTier::Store);
    assert_eq!(env.repo.all().await[0].file.as_ref(), Some(stored));
    assert!(!env.exists(&cached).await);
}

#[tokio::test]
async fn stale_promotion_is_skipped() {
    let env = TestEnv::queued().await;
    let mut user = User::persisted(1);
    env.attacher
        .one(&mut user, "avatar")
        .unwrap()
        .attach(png("first"))
        .await
        .unwrap();
    let first_task = env.queue.take().remove(0);

    // Another process swaps the row's file before the first job runs.
    let mut row = env.repo.all().await.remove(0);
    let file2 = env
        .storage
        .store(&png("second"), StorageTier::Cache)
        .await
        .unwrap();
    row.file = Some(file2.clone());
    env.repo.apply(vec![RowOp::Update(row.clone())]).await.unwrap();
    let second_task = PromoteAttachment::for_attachment(&row, "Image")
        .unwrap()
        .to_task()
        .unwrap();

    let second = perform_task(&second_task, env.repo.as_ref(), env.storage.as_ref())
        .await
        .unwrap();
    let JobOutcome::Promoted(promoted) = second else {
        panic!("expected promotion, got {second:?}");
    };
    assert_eq!(env.storage.read(&promoted).await.unwrap(), b"png-second");

    let first = perform_task(&first_task, env.repo.as_ref(), env.storage.as_ref())
        .await
        .unwrap();
    assert_eq!(first, JobOutcome::Skipped(SkipReason::AttachmentChanged));

    assert_eq!(env.repo.find(row.id).await.unwrap().unwrap().file, Some(promoted));
}

#[tokio::test]
async fn replaced_attachment_is_not_promoted() {
    let env = TestEnv::queued().await;
    let mut user = User::persisted(1);
    env.attacher
        .one(&mut user, "avatar")
        .unwrap()
        .attach(png("old"))
        .await
        .unwrap();
    env.attacher
        .one(&mut user, "avatar")
        .unwrap()
        .attach(png("new"))
        .await
        .unwrap();

    let outcomes = env.drain_queue().await;
    assert_eq!(outcomes[0], JobOutcome::Skipped(SkipReason::AttachmentMissing));
    assert!(matches!(outcomes[1], JobOutcome::Promoted(_)));
    assert_eq!(outcomes[2], JobOutcome::Destroyed { existed: true });
    assert_eq!(outcomes.len(), 3);

    let rows = env.repo.all().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(
        env.storage.read(rows[0].file.as_ref().unwrap()).await.unwrap(),
        b"png-new"
    );
}

#[tokio::test]
async fn promotion_after_owner_destroyed_is_skipped() {
    let env = TestEnv::queued().await;
    let mut user = User::persisted(1);
    env.attacher
        .one(&mut user, "avatar")
        .unwrap()
        .attach(png("gone"))
        .await
        .unwrap();

    env.attacher.destroy_owner(&mut user).await.unwrap();
    assert!(env.repo.is_empty().await);
    assert!(!user.attachment_state().is_loaded("avatar"));

    let outcomes = env.drain_queue().await;
    assert_eq!(
        outcomes,
        vec![
            JobOutcome::Skipped(SkipReason::AttachmentMissing),
            JobOutcome::Destroyed { existed: true },
        ]
    );
}

#[tokio::test]
async fn nullified_owner_skips_promotion() {
    let env = TestEnv::queued().await;
    let mut user = User::persisted(1);
    env.attacher
        .many(&mut user, "archive")
        .unwrap()
        .attach([png("kept")])
        .await
        .unwrap();

    env.attacher.destroy_owner(&mut user).await.unwrap();
    let rows = env.repo.all().await;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].owner.is_none());

    assert_eq!(
        env.drain_queue().await,
        vec![JobOutcome::Skipped(SkipReason::OwnerChanged)]
    );
}

#[tokio::test]
async fn replacing_after_background_promotion_destroys_promoted_file() {
    let env = TestEnv::queued().await;
    let mut user = User::persisted(1);
    env.attacher
        .one(&mut user, "avatar")
        .unwrap()
        .attach(png("v1"))
        .await
        .unwrap();
    let outcomes = env.drain_queue().await;
    let [JobOutcome::Promoted(first)] = outcomes.as_slice() else {
        panic!("expected a single promotion, got {outcomes:?}");
    };

    // The owner still holds the cached descriptor of v1.
    env.attacher
        .one(&mut user, "avatar")
        .unwrap()
        .attach(png("v2"))
        .await
        .unwrap();

    let outcomes = env.drain_queue().await;
    assert_eq!(outcomes.len(), 2);
    assert!(matches!(outcomes[0], JobOutcome::Promoted(_)));
    assert_eq!(outcomes[1], JobOutcome::Destroyed { existed: true });
    assert!(!env.exists(first).await);

    let rows = env.repo.all().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(
        env.storage.read(rows[0].file.as_ref().unwrap()).await.unwrap(),
        b"png-v2"
    );
}
