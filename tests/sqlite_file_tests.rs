use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;

use study_companion_backend::config::DatabaseConfig;
use study_companion_backend::db::operations::flashcards::{self, NewCard};
use study_companion_backend::db::operations::subjects;
use study_companion_backend::db::operations::users::{self, NewUser};
use study_companion_backend::db::{Database, DbHealth};
use study_companion_backend::services::scheduler::{record_review, ReviewOutcome, ReviewState};

fn file_config(dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("data/study.db").display()),
        max_connections: 4,
        busy_timeout: Duration::from_secs(5),
    }
}

async fn seed_card(db: &Database) -> (String, String) {
    let user = users::insert_user(
        db,
        NewUser {
            username: "ada",
            email: "ada@example.com",
            password_hash: "hash",
            full_name: None,
        },
    )
    .await
    .unwrap();
    let subject = subjects::insert_subject(db, &user.id, "Biology", None, None).await.unwrap();
    let cards = [NewCard {
        front: "ATP?".to_string(),
        back: "Energy".to_string(),
    }];
    let set = flashcards::insert_set_with_cards(db, &user.id, &subject.id, "Cells", None, &cards)
        .await
        .unwrap();
    let detail = flashcards::get_set_detail(db, &user.id, &set.id).await.unwrap().unwrap();
    (user.id, detail.flashcards[0].id.clone())
}

#[tokio::test]
async fn test_file_database_persists_across_reconnect() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);

    let db = Database::connect(&config).await.unwrap();
    assert!(matches!(db.check_health(Duration::from_secs(1)).await, DbHealth::Connected { .. }));
    let (user_id, card_id) = seed_card(&db).await;
    db.pool().close().await;

    let reopened = Database::connect(&config).await.unwrap();
    let card = flashcards::get_card(&reopened, &user_id, &card_id).await.unwrap();
    assert!(card.is_some());
}

#[tokio::test]
async fn test_stale_review_write_is_rejected() {
    let dir = TempDir::new().unwrap();
    let db = Database::connect(&file_config(&dir)).await.unwrap();
    let (user_id, card_id) = seed_card(&db).await;

    let first = flashcards::get_card(&db, &user_id, &card_id).await.unwrap().unwrap();
    let second = first.clone();

    let now = Utc::now();
    let correct = record_review(&first.review, ReviewOutcome::Correct, now);
    let incorrect = record_review(&second.review, ReviewOutcome::Incorrect, now);

    assert!(flashcards::save_review(&db, &card_id, first.review.times_reviewed, &correct).await.unwrap());
    // Both reads saw zero reviews; only one of the writes may land.
    assert!(!flashcards::save_review(&db, &card_id, second.review.times_reviewed, &incorrect).await.unwrap());

    let stored = flashcards::get_card(&db, &user_id, &card_id).await.unwrap().unwrap();
    assert_eq!(stored.review.times_reviewed, 1);
    assert_eq!(stored.review.times_correct, 1);
}

#[tokio::test]
async fn test_due_candidates_only_returns_due_cards() {
    let db = Database::in_memory().await.unwrap();
    let (user_id, card_id) = seed_card(&db).await;
    let now = Utc::now();

    let due = flashcards::due_candidates(&db, &user_id, None, now, 20).await.unwrap();
    assert_eq!(due.len(), 1);

    let card = flashcards::get_card(&db, &user_id, &card_id).await.unwrap().unwrap();
    let next = record_review(&card.review, ReviewOutcome::Incorrect, now);
    assert!(flashcards::save_review(&db, &card_id, 0, &next).await.unwrap());

    assert!(flashcards::due_candidates(&db, &user_id, None, now, 20).await.unwrap().is_empty());
    let tomorrow = now + chrono::Duration::days(1);
    assert_eq!(flashcards::due_candidates(&db, &user_id, None, tomorrow, 20).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_due_candidates_orders_unreviewed_first_and_applies_limit() {
    let db = Database::in_memory().await.unwrap();
    let (user_id, _) = seed_card(&db).await;
    let subject = subjects::insert_subject(&db, &user_id, "Chemistry", None, None).await.unwrap();
    let cards: Vec<NewCard> = ["fresh", "older", "recent"]
        .iter()
        .map(|front| NewCard {
            front: front.to_string(),
            back: "back".to_string(),
        })
        .collect();
    let set = flashcards::insert_set_with_cards(&db, &user_id, &subject.id, "Bonds", None, &cards)
        .await
        .unwrap();
    let detail = flashcards::get_set_detail(&db, &user_id, &set.id).await.unwrap().unwrap();
    let id_of = |front: &str| {
        detail
            .flashcards
            .iter()
            .find(|card| card.front == front)
            .map(|card| card.id.clone())
            .unwrap()
    };

    let now = Utc::now();
    for (front, days_ago) in [("older", 3), ("recent", 1)] {
        let reviewed = ReviewState {
            difficulty: 1,
            times_reviewed: 1,
            times_correct: 1,
            last_reviewed: Some(now - chrono::Duration::days(days_ago + 2)),
            next_review: Some(now - chrono::Duration::days(days_ago)),
        };
        assert!(flashcards::save_review(&db, &id_of(front), 0, &reviewed).await.unwrap());
    }

    let fronts = |cards: Vec<flashcards::FlashcardRecord>| cards.into_iter().map(|c| c.front).collect::<Vec<_>>();

    let all = flashcards::due_candidates(&db, &user_id, Some(&subject.id), now, 20).await.unwrap();
    assert_eq!(fronts(all), vec!["fresh", "older", "recent"]);

    let limited = flashcards::due_candidates(&db, &user_id, Some(&subject.id), now, 2).await.unwrap();
    assert_eq!(fronts(limited), vec!["fresh", "older"]);

    // The Biology card from the seed is also unreviewed but belongs to another subject.
    let everything = flashcards::due_candidates(&db, &user_id, None, now, 20).await.unwrap();
    assert_eq!(everything.len(), 4);
}
