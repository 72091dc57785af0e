//! PostgreSQL store tests
//!
//! Each test gets a fresh database with migrations applied.
//! Run with: DATABASE_URL=postgres://... cargo test -p social-api --test pg_store_tests -- --ignored

use social_api::db::{PgStore, SocialStore, StoreError};
use social_api::models::{NewComment, NewPost, NewUser, Toggle, User};
use sqlx::PgPool;
use uuid::Uuid;

async fn user(store: &PgStore, username: &str) -> User {
    store
        .create_user(NewUser {
            username: username.to_string(),
            fullname: format!("{username} test"),
            email: format!("{username}@example.com"),
            password_hash: "not-a-real-hash".to_string(),
        })
        .await
        .unwrap()
}

async fn reload(store: &PgStore, id: Uuid) -> User {
    store.find_user_by_id(id).await.unwrap().unwrap()
}

fn assert_counts_match(user: &User) {
    assert_eq!(user.followers_count, user.followers.len() as i64);
    assert_eq!(user.following_count, user.following.len() as i64);
}

#[sqlx::test(migrator = "social_api::db::postgres::MIGRATOR")]
#[ignore = "Requires PostgreSQL database"]
async fn follow_writes_edge_and_both_counters(pool: PgPool) {
    let store = PgStore::new(pool);
    let alice = user(&store, "alice").await;
    let bob = user(&store, "bob").await;

    store.add_follow_edge(alice.id, bob.id).await.unwrap();

    let alice = reload(&store, alice.id).await;
    let bob = reload(&store, bob.id).await;
    assert_eq!(alice.following, vec![bob.id]);
    assert_eq!(bob.followers, vec![alice.id]);
    assert_eq!(alice.following_count, 1);
    assert_eq!(bob.followers_count, 1);
    assert_counts_match(&alice);
    assert_counts_match(&bob);
}

#[sqlx::test(migrator = "social_api::db::postgres::MIGRATOR")]
#[ignore = "Requires PostgreSQL database"]
async fn double_follow_is_rejected_without_touching_counters(pool: PgPool) {
    let store = PgStore::new(pool);
    let alice = user(&store, "alice").await;
    let bob = user(&store, "bob").await;

    store.add_follow_edge(alice.id, bob.id).await.unwrap();
    let err = store.add_follow_edge(alice.id, bob.id).await.unwrap_err();
    assert!(matches!(err, StoreError::EdgeExists));

    let bob = reload(&store, bob.id).await;
    assert_eq!(bob.followers_count, 1);
    assert_counts_match(&bob);
}

#[sqlx::test(migrator = "social_api::db::postgres::MIGRATOR")]
#[ignore = "Requires PostgreSQL database"]
async fn follow_of_unknown_user_is_not_found(pool: PgPool) {
    let store = PgStore::new(pool);
    let alice = user(&store, "alice").await;

    let err = store
        .add_follow_edge(alice.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    assert_eq!(reload(&store, alice.id).await.following_count, 0);
}

#[sqlx::test(migrator = "social_api::db::postgres::MIGRATOR")]
#[ignore = "Requires PostgreSQL database"]
async fn unfollow_removes_edge_and_clamps_counters(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let alice = user(&store, "alice").await;
    let bob = user(&store, "bob").await;

    assert!(!store.remove_follow_edge(alice.id, bob.id).await.unwrap());

    store.add_follow_edge(alice.id, bob.id).await.unwrap();
    assert!(store.remove_follow_edge(alice.id, bob.id).await.unwrap());
    let bob_now = reload(&store, bob.id).await;
    assert!(bob_now.followers.is_empty());
    assert_eq!(bob_now.followers_count, 0);

    // Counters that drifted to zero stay at zero.
    store.add_follow_edge(alice.id, bob.id).await.unwrap();
    sqlx::query("UPDATE users SET followers_count = 0, following_count = 0")
        .execute(&pool)
        .await
        .unwrap();
    assert!(store.remove_follow_edge(alice.id, bob.id).await.unwrap());
    assert_eq!(reload(&store, bob.id).await.followers_count, 0);
    assert_eq!(reload(&store, alice.id).await.following_count, 0);
}

#[sqlx::test(migrator = "social_api::db::postgres::MIGRATOR")]
#[ignore = "Requires PostgreSQL database"]
async fn crossed_follows_both_succeed(pool: PgPool) {
    let store = PgStore::new(pool);

    for round in 0..20 {
        let a = user(&store, &format!("left{round}")).await;
        let b = user(&store, &format!("right{round}")).await;

        let forward = {
            let store = store.clone();
            tokio::spawn(async move { store.add_follow_edge(a.id, b.id).await })
        };
        let backward = {
            let store = store.clone();
            tokio::spawn(async move { store.add_follow_edge(b.id, a.id).await })
        };

        forward.await.unwrap().unwrap();
        backward.await.unwrap().unwrap();

        for id in [a.id, b.id] {
            let u = reload(&store, id).await;
            assert_eq!(u.followers_count, 1);
            assert_eq!(u.following_count, 1);
            assert_counts_match(&u);
        }
    }
}

#[sqlx::test(migrator = "social_api::db::postgres::MIGRATOR")]
#[ignore = "Requires PostgreSQL database"]
async fn concurrent_duplicate_follows_count_once(pool: PgPool) {
    let store = PgStore::new(pool);
    let alice = user(&store, "alice").await;
    let bob = user(&store, "bob").await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.add_follow_edge(alice.id, bob.id).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => created += 1,
            Err(StoreError::EdgeExists) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(reload(&store, bob.id).await.followers_count, 1);
}

#[sqlx::test(migrator = "social_api::db::postgres::MIGRATOR")]
#[ignore = "Requires PostgreSQL database"]
async fn legacy_posts_report_untracked_retweets(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let alice = user(&store, "alice").await;
    let post = store
        .create_post(NewPost {
            user_id: alice.id,
            caption: "old".to_string(),
            files: vec![],
            tags: vec![],
        })
        .await
        .unwrap();
    assert_eq!(post.retweets, Some(vec![]));

    sqlx::query("UPDATE posts SET retweets_tracked = FALSE WHERE id = $1")
        .bind(post.id)
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(store.find_post(post.id).await.unwrap().unwrap().retweets, None);

    assert_eq!(
        store.toggle_retweet(post.id, alice.id).await.unwrap(),
        Toggle::Added
    );
    let post = store.find_post(post.id).await.unwrap().unwrap();
    assert_eq!(post.retweets, Some(vec![alice.id]));
    assert_eq!(post.retweet_count, 1);
}

#[sqlx::test(migrator = "social_api::db::postgres::MIGRATOR")]
#[ignore = "Requires PostgreSQL database"]
async fn toggles_and_comments_keep_counters_in_step(pool: PgPool) {
    let store = PgStore::new(pool);
    let alice = user(&store, "alice").await;
    let bob = user(&store, "bob").await;
    let post = store
        .create_post(NewPost {
            user_id: alice.id,
            caption: "sunset".to_string(),
            files: vec![],
            tags: vec!["sun".to_string()],
        })
        .await
        .unwrap();

    assert_eq!(store.toggle_like(post.id, bob.id).await.unwrap(), Toggle::Added);
    let liked = store.find_post(post.id).await.unwrap().unwrap();
    assert_eq!(liked.likes, vec![bob.id]);
    assert_eq!(liked.likes_count, 1);

    assert_eq!(store.toggle_like(post.id, bob.id).await.unwrap(), Toggle::Removed);
    let unliked = store.find_post(post.id).await.unwrap().unwrap();
    assert!(unliked.likes.is_empty());
    assert_eq!(unliked.likes_count, 0);

    assert_eq!(store.toggle_saved(bob.id, post.id).await.unwrap(), Toggle::Added);
    assert_eq!(reload(&store, bob.id).await.saved_posts, vec![post.id]);
    assert_eq!(store.toggle_saved(bob.id, post.id).await.unwrap(), Toggle::Removed);
    assert!(reload(&store, bob.id).await.saved_posts.is_empty());

    store
        .add_comment(NewComment {
            post_id: post.id,
            user_id: bob.id,
            text: "nice".to_string(),
        })
        .await
        .unwrap();
    let commented = store.find_post(post.id).await.unwrap().unwrap();
    assert_eq!(commented.comments_count, 1);
    let comments = store.find_comments_for_posts(&[post.id]).await.unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].text, "nice");

    let err = store.toggle_like(Uuid::new_v4(), bob.id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}
