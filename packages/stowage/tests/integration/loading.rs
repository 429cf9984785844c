use stowage::{AttachmentRepository, DependentPolicy, HasAttachments, SlotKind, StowageError};

use crate::support::{TestEnv, User, png};

mod strict {
    use super::*;

    #[tokio::test]
    async fn lazy_read_of_strict_slot_fails_until_loaded() {
        let env = TestEnv::inline().await;
        let mut user = User::persisted(1);
        env.attacher
            .set_one(&mut user, "badge", Some(png("gold").into()))
            .await
            .unwrap();
        env.attacher.save(&mut user).await.unwrap();

        let mut fresh = User::persisted(1);
        let err = env
            .attacher
            .one(&mut fresh, "badge")
            .unwrap()
            .attachment()
            .await
            .unwrap_err();
        assert!(matches!(err, StowageError::StrictLoading(ref name) if name == "badge"));

        let loaded = env.attacher.load(&mut fresh, "badge").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(
            env.attacher
                .one(&mut fresh, "badge")
                .unwrap()
                .is_attached()
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn new_owner_reads_strict_slot_as_empty() {
        let env = TestEnv::inline().await;
        let mut user = User::new();
        assert!(
            env.attacher
                .one(&mut user, "badge")
                .unwrap()
                .is_blank()
                .await
                .unwrap()
        );
    }
}

mod preload {
    use super::*;

    #[tokio::test]
    async fn preload_fills_every_record() {
        let env = TestEnv::inline().await;
        for id in [1, 2] {
            let mut user = User::persisted(id);
            env.attacher
                .many(&mut user, "photos")
                .unwrap()
                .attach((0..id).map(|n| png(&format!("{id}-{n}"))))
                .await
                .unwrap();
        }

        let mut users = vec![User::persisted(1), User::persisted(2), User::persisted(3)];
        env.attacher.preload(&mut users, "photos").await.unwrap();

        let counts: Vec<_> = users
            .iter()
            .map(|u| u.attachment_state().loaded("photos").map(<[_]>::len))
            .collect();
        assert_eq!(counts, vec![Some(1), Some(2), Some(0)]);
    }

    #[tokio::test]
    async fn preload_satisfies_strict_loading() {
        let env = TestEnv::inline().await;
        let mut user = User::persisted(5);
        env.attacher
            .set_one(&mut user, "badge", Some(png("silver").into()))
            .await
            .unwrap();
        env.attacher.save(&mut user).await.unwrap();

        let mut users = vec![User::persisted(5)];
        env.attacher.preload(&mut users, "badge").await.unwrap();

        let badge = env
            .attacher
            .one(&mut users[0], "badge")
            .unwrap()
            .attachment()
            .await
            .unwrap();
        assert!(badge.is_some());
    }
}

mod dependent {
    use super::*;

    #[tokio::test]
    async fn delete_policy_keeps_replaced_file() {
        let env = TestEnv::inline().await;
        let mut user = User::persisted(1);
        env.attacher
            .one(&mut user, "resume")
            .unwrap()
            .attach(png("v1"))
            .await
            .unwrap();
        let old = env.repo.all().await.remove(0);

        env.attacher
            .one(&mut user, "resume")
            .unwrap()
            .attach(png("v2"))
            .await
            .unwrap();

        let rows = env.repo.all().await;
        assert_eq!(rows.len(), 1);
        assert_ne!(rows[0].id, old.id);
        assert!(env.exists(old.file.as_ref().unwrap()).await);
    }

    #[tokio::test]
    async fn nullify_policy_orphans_rows() {
        let env = TestEnv::inline().await;
        let mut user = User::persisted(1);
        env.attacher
            .many(&mut user, "archive")
            .unwrap()
            .attach([png("a")])
            .await
            .unwrap();
        let original = env.repo.all().await.remove(0);

        env.attacher
            .set_many(&mut user, "archive", vec![png("b").into()])
            .await
            .unwrap();
        env.attacher.save(&mut user).await.unwrap();

        let orphan = env.repo.find(original.id).await.unwrap().unwrap();
        assert!(orphan.owner.is_none());
        assert!(env.exists(orphan.file.as_ref().unwrap()).await);
        assert_eq!(env.repo.len().await, 2);
    }

    #[tokio::test]
    async fn destroy_owner_applies_each_slot_policy() {
        let env = TestEnv::inline().await;
        let mut user = User::persisted(1);
        env.attacher
            .one(&mut user, "avatar")
            .unwrap()
            .attach(png("avatar"))
            .await
            .unwrap();
        env.attacher
            .one(&mut user, "resume")
            .unwrap()
            .attach(png("resume"))
            .await
            .unwrap();
        env.attacher
            .many(&mut user, "archive")
            .unwrap()
            .attach([png("archive")])
            .await
            .unwrap();

        let rows = env.repo.all().await;
        let file_of = |name: &str| {
            rows.iter()
                .find(|r| r.name == name)
                .and_then(|r| r.file.clone())
                .unwrap()
        };
        let (avatar, resume, archive) = (file_of("avatar"), file_of("resume"), file_of("archive"));

        env.attacher.destroy_owner(&mut user).await.unwrap();

        let remaining = env.repo.all().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "archive");
        assert!(remaining[0].owner.is_none());

        assert!(!env.exists(&avatar).await);
        assert!(env.exists(&resume).await);
        assert!(env.exists(&archive).await);
    }
}

mod reflection {
    use super::*;

    #[test]
    fn slots_are_reflected_in_declaration_order() {
        let slots = User::slots();
        let names: Vec<_> = slots
            .reflect_on_all_attachments()
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(names, vec!["avatar", "photos", "resume", "archive", "badge"]);

        let avatar = slots.reflect_on_attachment("avatar").unwrap();
        assert_eq!(avatar.kind(), SlotKind::One);
        assert_eq!(avatar.kind().macro_name(), "has_one_attached");
        assert_eq!(avatar.uploader().name(), "Image");

        let archive = slots.reflect_on_attachment("archive").unwrap();
        assert_eq!(archive.kind(), SlotKind::Many);
        assert_eq!(archive.dependent(), DependentPolicy::Nullify);
        assert!(slots.reflect_on_attachment("missing").is_none());
    }

    #[tokio::test]
    async fn wrong_kind_or_unknown_slot_is_rejected() {
        let env = TestEnv::inline().await;
        let mut user = User::persisted(1);
        assert!(matches!(
            env.attacher.many(&mut user, "avatar"),
            Err(StowageError::SlotKindMismatch {
                declared: SlotKind::One,
                requested: SlotKind::Many,
                ..
            })
        ));
        assert!(matches!(
            env.attacher.one(&mut user, "nope"),
            Err(StowageError::UnknownSlot(_))
        ));
    }
}
