//! Social Flow Tests
//!
//! End-to-end flows across services sharing one store: befriending,
//! tagging friends in a retrospective, reading the inbox, and collecting
//! items into a shared catalogue.

#[cfg(test)]
mod social_flow_tests {
    use anyhow::Result;
    use retrospace_core::config::AppConfig;
    use retrospace_core::db::MemoryStore;
    use retrospace_core::feedback::NoticeBoard;
    use retrospace_core::mentions::{ComposerKey, KeyOutcome};
    use retrospace_core::models::{
        MemberRole, NewCatalogue, NewCatalogueItem, NewRetrospective, NotificationKind, Profile,
        RbtCategory, UserSummary,
    };
    use retrospace_core::services::{
        ActivityService, CatalogueService, FriendshipService, NotificationService,
        RetrospectiveService,
    };
    use std::sync::Arc;

    struct App {
        store: Arc<MemoryStore>,
        board: Arc<NoticeBoard>,
        friends: FriendshipService,
        retros: RetrospectiveService,
        notifications: NotificationService,
        catalogues: CatalogueService,
        activity: ActivityService,
    }

    async fn app() -> Result<App> {
        let store = Arc::new(MemoryStore::new());
        let board = Arc::new(NoticeBoard::default());
        let app = App {
            friends: FriendshipService::new(store.clone(), board.clone()),
            retros: RetrospectiveService::new(store.clone(), board.clone()),
            notifications: NotificationService::new(store.clone(), board.clone()),
            catalogues: CatalogueService::new(store.clone(), board.clone()),
            activity: ActivityService::new(store.clone()),
            store,
            board,
        };
        for (id, name) in [
            ("ana", "Ana Lima"),
            ("ben", "Ben Stone"),
            ("bea", "Bea"),
            ("cleo", "Cleo Park"),
        ] {
            app.friends
                .save_profile(&Profile {
                    id: id.to_string(),
                    display_name: name.to_string(),
                    avatar_url: None,
                    email: None,
                })
                .await?;
        }
        Ok(app)
    }

    async fn actor(app: &App, user_id: &str) -> Result<UserSummary> {
        let profile = app
            .friends
            .get_profile(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no profile for {}", user_id))?;
        Ok(profile.into())
    }

    async fn befriend(app: &App, a: &str, b: &str) -> Result<()> {
        let request = app.friends.send_request(a, b).await?;
        app.friends.accept(&request.id, b).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_tagging_friends_from_the_composer() -> Result<()> {
        let app = app().await?;
        befriend(&app, "ana", "ben").await?;
        befriend(&app, "ana", "bea").await?;
        let roster = app.friends.friends_of("ana").await?;
        assert_eq!(roster.len(), 2);

        // Ana types a mention and picks Ben from the suggestions
        let config = AppConfig::from_env(|var| match var {
            "RETROSPACE_DB_PATH" => Some("unused.db".to_string()),
            _ => None,
        })?;
        let mut composer = app.friends.mention_composer("ana", &config).await?;
        composer.update("Sunset with @be", "Sunset with @be".len());
        assert_eq!(composer.suggestions().len(), 2);
        assert_eq!(composer.handle_key(ComposerKey::Down), KeyOutcome::Handled);
        assert_eq!(composer.handle_key(ComposerKey::Enter), KeyOutcome::Handled);
        assert_eq!(composer.text(), "Sunset with @Ben Stone ");

        let text = composer.text().to_string();
        let retro = app
            .retros
            .create(NewRetrospective::new("ana", "Algarve").item(RbtCategory::Rose, text.as_str()))
            .await?;

        let ana = actor(&app, "ana").await?;
        let sent = app
            .retros
            .tag_mentions(&retro, &retro.roses[0].id, &ana, &roster)
            .await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, "ben");
        assert_eq!(sent[0].message, "Ana Lima tagged you in \"Algarve\"");

        let inbox = app.notifications.inbox("ben");
        inbox.load().await?;
        let kinds: Vec<NotificationKind> =
            inbox.items().await.into_iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![NotificationKind::Tagged, NotificationKind::FriendRequest]
        );
        assert_eq!(app.notifications.unread_count("ben").await?, 2);
        assert!(app
            .notifications
            .list_for_user("bea")
            .await?
            .iter()
            .all(|n| n.kind != NotificationKind::Tagged));
        assert!(app.board.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_strangers_are_not_tagged() -> Result<()> {
        let app = app().await?;
        befriend(&app, "ana", "ben").await?;
        let roster = app.friends.friends_of("ana").await?;

        let retro = app
            .retros
            .create(
                NewRetrospective::new("ana", "Concert")
                    .item(RbtCategory::Bud, "next time bring @Cleo Park and @Ben Stone"),
            )
            .await?;
        let ana = actor(&app, "ana").await?;
        let sent = app
            .retros
            .tag_mentions(&retro, &retro.buds[0].id, &ana, &roster)
            .await;
        // Cleo is not on Ana's roster
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, "ben");
        assert_eq!(app.notifications.list_for_user("cleo").await?.len(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_collecting_into_a_shared_catalogue() -> Result<()> {
        let app = app().await?;
        befriend(&app, "ana", "cleo").await?;

        let retro = app
            .retros
            .create(NewRetrospective::new("cleo", "Tokyo").item(RbtCategory::Rose, "Golden Gai"))
            .await?;
        let catalogue = app
            .catalogues
            .create(NewCatalogue::new("ana", "Nightlife"))
            .await?;
        app.catalogues
            .invite_member(&catalogue.id, "ana", "cleo", MemberRole::Editor)
            .await?;
        app.catalogues.accept_invite(&catalogue.id, "cleo").await?;

        app.catalogues
            .save_item(
                &catalogue.id,
                "cleo",
                NewCatalogueItem::new(RbtCategory::Rose, retro.roses[0].text.as_str())
                    .from_retro(&retro.id),
            )
            .await?;

        let items = app.catalogues.items(&catalogue.id).await?;
        assert_eq!(items[0].retro_id.as_deref(), Some(retro.id.as_str()));

        let feed = app
            .activity
            .feed(&["ana".to_string(), "cleo".to_string()], 10)
            .await?;
        assert_eq!(feed[0].summary, "saved a rose to Nightlife");
        assert_eq!(app.store.row_count("catalogue_members"), 2);
        Ok(())
    }
}
