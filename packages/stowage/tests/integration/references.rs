use common::storage::FileMetadata;
use common::{FileStorage, StorageTier, UploadedFile};
use stowage::{HasAttachments, JobOutcome, StowageError};

use crate::support::{TestEnv, User, forge, png};

async fn attached_avatar(env: &TestEnv, user: &mut User) -> stowage::Attachment {
    env.attacher
        .one(user, "avatar")
        .unwrap()
        .attach(png("me"))
        .await
        .unwrap();
    env.attacher
        .one(user, "avatar")
        .unwrap()
        .attachment()
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn resubmitted_token_reuses_attachment() {
    let env = TestEnv::inline().await;
    let mut user = User::persisted(1);
    let current = attached_avatar(&env, &mut user).await;
    let token = current.signed_id(env.codec()).unwrap();

    env.attacher
        .set_one(&mut user, "avatar", Some(token.clone().into()))
        .await
        .unwrap();
    env.attacher.save(&mut user).await.unwrap();

    // Same again from a freshly loaded owner, as after a form round trip.
    let mut reloaded = User::persisted(1);
    env.attacher
        .set_one(&mut reloaded, "avatar", Some(token.into()))
        .await
        .unwrap();
    let staged = reloaded.attachment_state().change("avatar").unwrap().attachments()[0].clone();
    assert_eq!(staged.id, current.id);
    assert!(staged.is_persisted());
    env.attacher.save(&mut reloaded).await.unwrap();

    let rows = env.repo.all().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, current.id);
    assert_eq!(rows[0].file, current.file);
    assert!(env.exists(current.file.as_ref().unwrap()).await);
}

#[tokio::test]
async fn forged_token_is_invalid() {
    let env = TestEnv::inline().await;
    let mut user = User::persisted(1);
    let current = attached_avatar(&env, &mut user).await;
    let forged = forge(&current.signed_id(env.codec()).unwrap());

    env.attacher
        .set_one(&mut user, "avatar", Some(forged.into()))
        .await
        .unwrap();
    let staged = user.attachment_state().change("avatar").unwrap().attachments()[0].clone();
    assert_ne!(staged.id, current.id);
    assert!(staged.file.is_none());

    let err = env.attacher.save(&mut user).await.unwrap_err();
    assert!(err.is_record_invalid());
    assert_eq!(user.errors().on("avatar"), &["is invalid".to_string()]);

    // The committed association is untouched.
    assert_eq!(env.repo.len().await, 1);
    assert_eq!(env.repo.all().await[0].id, current.id);
}

#[tokio::test]
async fn garbage_string_is_invalid() {
    let env = TestEnv::inline().await;
    let mut user = User::persisted(1);

    let attached = env
        .attacher
        .one(&mut user, "avatar")
        .unwrap()
        .attach("not a token")
        .await
        .unwrap();

    assert!(!attached);
    assert_eq!(user.errors().on("avatar"), &["is invalid".to_string()]);
    assert!(env.repo.is_empty().await);
}

mod foreign_token {
    use super::*;

    #[tokio::test]
    async fn token_from_another_owner_is_invalid() {
        let env = TestEnv::inline().await;
        let mut alice = User::persisted(1);
        let hers = attached_avatar(&env, &mut alice).await;
        let token = hers.signed_id(env.codec()).unwrap();

        let mut bob = User::persisted(2);
        let attached = env
            .attacher
            .one(&mut bob, "avatar")
            .unwrap()
            .attach(token)
            .await
            .unwrap();

        assert!(!attached);
        assert_eq!(bob.errors().on("avatar"), &["is invalid".to_string()]);
        assert_eq!(env.repo.len().await, 1);

        // Bob has nothing to purge, so Alice's bytes survive.
        env.attacher
            .one(&mut bob, "avatar")
            .unwrap()
            .purge()
            .await
            .unwrap();
        assert!(env.exists(hers.file.as_ref().unwrap()).await);
    }

    #[tokio::test]
    async fn token_is_not_reusable_in_another_slot() {
        let env = TestEnv::inline().await;
        let mut user = User::persisted(1);
        let avatar = attached_avatar(&env, &mut user).await;
        let token = avatar.signed_id(env.codec()).unwrap();

        env.attacher
            .set_many(&mut user, "photos", vec![token.into()])
            .await
            .unwrap();
        let err = env.attacher.save(&mut user).await.unwrap_err();

        assert!(err.is_record_invalid());
        assert_eq!(user.errors().on("photos"), &["is invalid".to_string()]);
        let rows = env.repo.all().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "avatar");
    }
}

#[tokio::test]
async fn token_from_before_promotion_keeps_promoted_file() {
    let env = TestEnv::queued().await;
    let mut user = User::persisted(1);
    let current = attached_avatar(&env, &mut user).await;
    assert!(current.file.as_ref().unwrap().is_cached());
    let token = current.signed_id(env.codec()).unwrap();

    let outcomes = env.drain_queue().await;
    let [JobOutcome::Promoted(stored)] = outcomes.as_slice() else {
        panic!("expected a single promotion, got {outcomes:?}");
    };

    // Resubmitted from a freshly loaded owner and from the one still
    // holding the cached descriptor.
    for mut owner in [User::persisted(1), user] {
        env.attacher
            .set_one(&mut owner, "avatar", Some(token.clone().into()))
            .await
            .unwrap();
        env.attacher.save(&mut owner).await.unwrap();

        let rows = env.repo.all().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, current.id);
        assert_eq!(rows[0].file.as_ref(), Some(stored));
        assert_eq!(env.storage.read(stored).await.unwrap(), b"png-me");
    }
    assert!(env.queue.tasks().is_empty());
}

mod raw_descriptor {
    use super::*;

    #[tokio::test]
    async fn cached_file_is_accepted() {
        let env = TestEnv::inline().await;
        let mut user = User::persisted(1);
        let cached = env
            .storage
            .store(&png("direct"), StorageTier::Cache)
            .await
            .unwrap();

        env.attacher
            .set_one(&mut user, "avatar", Some(cached.to_json().unwrap().into()))
            .await
            .unwrap();
        env.attacher.save(&mut user).await.unwrap();

        let rows = env.repo.all().await;
        assert_eq!(rows.len(), 1);
        let stored = rows[0].file.clone().unwrap();
        assert_eq!(stored.storage, StorageTier::Store);
        assert_eq!(env.storage.read(&stored).await.unwrap(), b"png-direct");
        assert!(!env.exists(&cached).await);
    }

    #[tokio::test]
    async fn store_tier_file_is_rejected() {
        let env = TestEnv::inline().await;
        let mut user = User::persisted(1);
        let stored = env
            .storage
            .store(&png("elsewhere"), StorageTier::Store)
            .await
            .unwrap();

        env.attacher
            .set_one(&mut user, "avatar", Some(stored.to_json().unwrap().into()))
            .await
            .unwrap();

        assert!(matches!(
            env.attacher.save(&mut user).await,
            Err(StowageError::RecordInvalid(_))
        ));
        assert_eq!(user.errors().on("avatar"), &["is invalid".to_string()]);
        assert!(env.repo.is_empty().await);
    }

    #[tokio::test]
    async fn missing_cached_file_is_rejected() {
        let env = TestEnv::inline().await;
        let mut user = User::persisted(1);
        let ghost = UploadedFile::new(
            "0123456789abcdef.png",
            StorageTier::Cache,
            FileMetadata {
                size: 3,
                filename: Some("ghost.png".into()),
                mime_type: Some("image/png".into()),
                sha256: None,
            },
        );

        env.attacher
            .set_one(&mut user, "avatar", Some(ghost.to_json().unwrap().into()))
            .await
            .unwrap();

        assert!(env.attacher.save(&mut user).await.is_err());
        assert_eq!(user.errors().on("avatar"), &["is invalid".to_string()]);
    }

    #[tokio::test]
    async fn programmatic_assignment_clears_unverified_flag() {
        let env = TestEnv::inline().await;
        let mut user = User::persisted(1);
        let stored = env
            .storage
            .store(&png("trusted"), StorageTier::Store)
            .await
            .unwrap();

        env.attacher
            .set_one(&mut user, "avatar", Some(stored.to_json().unwrap().into()))
            .await
            .unwrap();
        env.attacher
            .set_one(&mut user, "avatar", Some(stored.clone().into()))
            .await
            .unwrap();
        env.attacher.save(&mut user).await.unwrap();

        assert_eq!(env.repo.all().await[0].file, Some(stored));
    }
}
