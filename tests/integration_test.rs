use axum::http::{Method, StatusCode};
use serde_json::json;

mod common;

use common::{create_test_app, create_test_app_with, StubGenerator};

#[tokio::test]
async fn test_health_root() {
    let app = create_test_app().await;

    let (status, body) = app.request(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "connected");
    assert_eq!(body["ai_available"], true);
}

#[tokio::test]
async fn test_health_live() {
    let app = create_test_app().await;

    let (status, body) = app.request(Method::GET, "/health/live", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");
}

#[tokio::test]
async fn test_404_not_found() {
    let app = create_test_app().await;

    let (status, body) = app.request(Method::GET, "/nonexistent/path", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_unauthorized_without_token() {
    let app = create_test_app().await;

    let (status, body) = app.request(Method::GET, "/api/subjects", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = app.get("/api/flashcards/due", "not-a-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_login_and_logout() {
    let app = create_test_app().await;
    let token = app.register("ada").await;

    let (status, body) = app.get("/api/auth/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "ada");
    assert_eq!(body["data"]["email"], "ada@example.com");

    let duplicate = json!({ "username": "ada", "email": "other@example.com", "password": "secret123" });
    let (status, body) = app.request(Method::POST, "/api/auth/register", None, Some(duplicate)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Username already exists");

    let login = json!({ "username": "ADA@example.com", "password": "secret123" });
    let (status, body) = app.request(Method::POST, "/api/auth/login", None, Some(login)).await;
    assert_eq!(status, StatusCode::OK);
    let second_token = body["data"]["access_token"].as_str().unwrap().to_string();

    let wrong = json!({ "username": "ada", "password": "wrong-password" });
    let (status, _) = app.request(Method::POST, "/api/auth/login", None, Some(wrong)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.request(Method::POST, "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/api/auth/me", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Other sessions survive a logout.
    let (status, _) = app.get("/api/auth/me", &second_token).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_validation() {
    let app = create_test_app().await;

    let short = json!({ "username": "bob", "email": "bob@example.com", "password": "123" });
    let (status, body) = app.request(Method::POST, "/api/auth/register", None, Some(short)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let bad_email = json!({ "username": "bob", "email": "bob", "password": "secret123" });
    let (status, _) = app.request(Method::POST, "/api/auth/register", None, Some(bad_email)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reset_password_request_does_not_reveal_accounts() {
    let app = create_test_app().await;
    app.register("ada").await;

    let known = json!({ "email": "ADA@example.com" });
    let (status, known_body) = app.request(Method::POST, "/api/auth/reset-password-request", None, Some(known)).await;
    assert_eq!(status, StatusCode::OK);

    let unknown = json!({ "email": "nobody@example.com" });
    let (status, unknown_body) = app.request(Method::POST, "/api/auth/reset-password-request", None, Some(unknown)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(known_body, unknown_body);
    assert_eq!(unknown_body["success"], true);

    let (status, body) = app.request(Method::POST, "/api/auth/reset-password-request", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let invalid = json!({ "email": "not-an-email" });
    let (status, _) = app.request(Method::POST, "/api/auth/reset-password-request", None, Some(invalid)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_change_password_revokes_other_sessions() {
    let app = create_test_app().await;
    let token = app.register("carol").await;

    let login = json!({ "username": "carol", "password": "secret123" });
    let (_, body) = app.request(Method::POST, "/api/auth/login", None, Some(login)).await;
    let other = body["data"]["access_token"].as_str().unwrap().to_string();

    let (status, _) = app
        .post("/api/auth/change-password", &token, json!({ "current_password": "nope", "new_password": "newsecret" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/api/auth/change-password", &token, json!({ "current_password": "secret123", "new_password": "newsecret" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(app.get("/api/auth/me", &token).await.0, StatusCode::OK);
    assert_eq!(app.get("/api/auth/me", &other).await.0, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_subjects_are_scoped_to_owner() {
    let app = create_test_app().await;
    let alice = app.register("alice").await;
    let mallory = app.register("mallory").await;

    let (status, body) = app
        .post("/api/subjects", &alice, json!({ "name": "Biology", "color": "#10b981" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["color"], "#10B981");
    assert_eq!(body["data"]["lecture_count"], 0);
    let subject_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app.get(&format!("/api/subjects/{subject_id}"), &mallory).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.get("/api/subjects", &mallory).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    let (status, _) = app.post("/api/subjects", &alice, json!({ "name": "Chem", "color": "red" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .put(&format!("/api/subjects/{subject_id}"), &alice, json!({ "description": "Cells" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Biology");
    assert_eq!(body["data"]["description"], "Cells");

    let (status, _) = app.delete(&format!("/api/subjects/{subject_id}"), &alice).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/api/subjects/{subject_id}"), &alice).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_lectures_require_an_owned_subject() {
    let app = create_test_app().await;
    let alice = app.register("alice").await;
    let mallory = app.register("mallory").await;
    let subject_id = app.create_subject(&alice, "Biology").await;

    let lecture = json!({ "title": "Cell walls", "subject_id": subject_id, "transcription": "Plants have cell walls." });
    let (status, body) = app.post("/api/lectures", &mallory, lecture.clone()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Subject not found");

    let (status, body) = app.post("/api/lectures", &alice, lecture).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["subject_id"], subject_id.as_str());
}

async fn create_set_with_cards(app: &common::TestApp, token: &str, subject_id: &str, fronts: &[&str]) -> Vec<String> {
    let (status, body) = app
        .post("/api/flashcards/sets", token, json!({ "title": "Cells", "subject_id": subject_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let set_id = body["data"]["id"].as_str().unwrap().to_string();

    let mut ids = Vec::new();
    for front in fronts {
        let (status, body) = app
            .post("/api/flashcards", token, json!({ "front": front, "back": "answer", "flashcard_set_id": set_id }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(body["data"]["id"].as_str().unwrap().to_string());
    }
    ids
}

#[tokio::test]
async fn test_flashcard_review_updates_schedule() {
    let app = create_test_app().await;
    let token = app.register("dana").await;
    let subject_id = app.create_subject(&token, "Biology").await;
    let ids = create_set_with_cards(&app, &token, &subject_id, &["ATP?"]).await;

    let (status, body) = app.get(&format!("/api/flashcards/{}", ids[0]), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["difficulty"], 0);
    assert!(body["data"]["next_review"].is_null());
    assert!(body["data"]["accuracy"].is_null());

    let (status, body) = app
        .post(&format!("/api/flashcards/{}/review", ids[0]), &token, json!({ "correct": false }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["difficulty"], 1);
    assert_eq!(body["data"]["times_reviewed"], 1);
    assert_eq!(body["data"]["times_correct"], 0);
    assert_eq!(body["data"]["accuracy"], 0.0);
    assert!(body["data"]["next_review"].is_string());

    let (_, body) = app
        .post(&format!("/api/flashcards/{}/review", ids[0]), &token, json!({ "correct": true }))
        .await;
    assert_eq!(body["data"]["difficulty"], 0);
    assert_eq!(body["data"]["times_reviewed"], 2);
    assert_eq!(body["data"]["times_correct"], 1);
    assert_eq!(body["data"]["accuracy"], 50.0);

    // Anything but a JSON `true` is an incorrect answer.
    let (_, body) = app
        .post(&format!("/api/flashcards/{}/review", ids[0]), &token, json!({ "correct": "yes" }))
        .await;
    assert_eq!(body["data"]["difficulty"], 1);
    assert_eq!(body["data"]["times_correct"], 1);

    let (status, body) = app.request(Method::POST, &format!("/api/flashcards/{}/review", ids[0]), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["times_reviewed"], 4);

    let (status, _) = app
        .post("/api/flashcards/missing-card/review", &token, json!({ "correct": true }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_due_cards_exclude_future_reviews() {
    let app = create_test_app().await;
    let token = app.register("erin").await;
    let biology = app.create_subject(&token, "Biology").await;
    let history = app.create_subject(&token, "History").await;

    let bio_cards = create_set_with_cards(&app, &token, &biology, &["one", "two", "three"]).await;
    let history_cards = create_set_with_cards(&app, &token, &history, &["four"]).await;

    app.post(&format!("/api/flashcards/{}/review", bio_cards[0]), &token, json!({ "correct": true }))
        .await;

    let (status, body) = app.get("/api/flashcards/due", &token).await;
    assert_eq!(status, StatusCode::OK);
    let due: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|card| card["id"].as_str().unwrap())
        .collect();
    assert_eq!(due.len(), 3);
    assert!(!due.contains(&bio_cards[0].as_str()));
    assert!(due.contains(&history_cards[0].as_str()));

    let (_, body) = app.get(&format!("/api/flashcards/due?subject_id={biology}"), &token).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (_, body) = app.get("/api/flashcards/due?limit=1", &token).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = app.get("/api/flashcards/due?limit=abc", &token).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let other = app.register("frank").await;
    let (_, body) = app.get("/api/flashcards/due", &other).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_generate_flashcard_set_from_note() {
    let generator = StubGenerator::replying("");
    generator.queue(
        "```json\n{\"flashcards\": [{\"front\": \"What makes ATP?\", \"back\": \"Mitochondria\"}, {\"front\": \"\", \"back\": \"dropped\"}, {\"front\": \"ATP stands for?\", \"back\": \"Adenosine triphosphate\"}]}\n```",
    );
    let app = create_test_app_with(generator).await;
    let token = app.register("gina").await;
    let subject_id = app.create_subject(&token, "Biology").await;

    let (status, body) = app
        .post(
            "/api/notes",
            &token,
            json!({ "title": "Cells", "content": "Mitochondria make ATP.", "subject_id": subject_id, "tags": "cells, energy" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["tags"], json!(["cells", "energy"]));
    let note_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post("/api/flashcards/sets/generate", &token, json!({ "subject_id": subject_id, "note_id": note_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["title"], "Biology Flashcards");
    assert_eq!(body["data"]["card_count"], 2);
    let cards = body["data"]["flashcards"].as_array().unwrap();
    assert_eq!(cards[0]["front"], "What makes ATP?");
    assert_eq!(cards[1]["back"], "Adenosine triphosphate");
}

#[tokio::test]
async fn test_generation_failures_are_reported() {
    let app = create_test_app_with(StubGenerator::replying("I cannot do that.")).await;
    let token = app.register("hank").await;
    let subject_id = app.create_subject(&token, "Biology").await;

    let (status, body) = app
        .post("/api/flashcards/sets/generate", &token, json!({ "subject_id": subject_id, "content": "ATP" }))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "GENERATION_FAILED");

    let (_, body) = app.get("/api/flashcards/sets", &token).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = app
        .post("/api/flashcards/sets/generate", &token, json!({ "subject_id": subject_id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/api/flashcards/sets/generate", &token, json!({ "subject_id": subject_id, "content": "   " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_generation_unavailable_without_provider() {
    let app = create_test_app_with(StubGenerator::unavailable()).await;
    let token = app.register("iris").await;
    let subject_id = app.create_subject(&token, "Biology").await;

    let (status, body) = app
        .post("/api/quizzes/generate", &token, json!({ "subject_id": subject_id, "content": "ATP" }))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "AI_UNAVAILABLE");

    let (_, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(body["ai_available"], false);
}

#[tokio::test]
async fn test_quiz_submit_grades_answers() {
    let app = create_test_app().await;
    let token = app.register("jack").await;
    let subject_id = app.create_subject(&token, "Biology").await;

    let (status, body) = app
        .post(
            "/api/quizzes",
            &token,
            json!({
                "title": "Cells",
                "subject_id": subject_id,
                "questions": [
                    { "question": "Powerhouse?", "question_type": "multiple_choice", "options": ["Nucleus", "Mitochondria"], "correct_answer": "Mitochondria", "points": 2 },
                    { "question": "ATP stores energy", "question_type": "true_false", "correct_answer": "true" },
                    { "question": "Name the energy molecule", "question_type": "short_answer", "correct_answer": "ATP", "explanation": "Adenosine triphosphate" }
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["question_count"], 3);
    let quiz_id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = app.get(&format!("/api/quizzes/{quiz_id}"), &token).await;
    let questions = body["data"]["questions"].as_array().unwrap().clone();
    assert_eq!(questions.len(), 3);
    assert!(questions.iter().all(|q| q.get("correct_answer").is_none()));

    let (_, body) = app.get(&format!("/api/quizzes/{quiz_id}?include_answers=true"), &token).await;
    assert_eq!(body["data"]["questions"][0]["correct_answer"], "Mitochondria");

    let answers = json!({
        questions[0]["id"].as_str().unwrap(): " mitochondria ",
        questions[1]["id"].as_str().unwrap(): false,
        questions[2]["id"].as_str().unwrap(): "atp",
    });
    let (status, body) = app
        .post(&format!("/api/quizzes/{quiz_id}/submit"), &token, json!({ "answers": answers, "time_taken_seconds": 42 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["attempt"]["score"], 3);
    assert_eq!(body["data"]["attempt"]["total_points"], 4);
    assert_eq!(body["data"]["attempt"]["percentage"], 75.0);
    assert_eq!(body["data"]["attempt"]["quiz_title"], "Cells");
    assert_eq!(body["data"]["results"][1]["is_correct"], false);

    let (_, body) = app.get(&format!("/api/quizzes/{quiz_id}/attempts"), &token).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .post(&format!("/api/quizzes/{quiz_id}/questions"), &token, json!({ "question": "Pick", "options": ["A"], "correct_answer": "A" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_question_options_are_stored() {
    let app = create_test_app().await;
    let token = app.register("kate").await;
    let subject_id = app.create_subject(&token, "Biology").await;

    let quiz = json!({
        "title": "Organelles",
        "subject_id": subject_id,
        "questions": [
            { "question": "Powerhouse?", "question_type": "multiple_choice", "options": ["Nucleus", "Mitochondria"], "correct_answer": "Mitochondria" }
        ]
    });
    let (status, body) = app.post("/api/quizzes", &token, quiz).await;
    assert_eq!(status, StatusCode::CREATED);
    let quiz_id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = app.get(&format!("/api/quizzes/{quiz_id}?include_answers=true"), &token).await;
    let question_id = body["data"]["questions"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .put(
            &format!("/api/quizzes/questions/{question_id}"),
            &token,
            json!({ "options": ["Nucleus", "Mitochondria", "Golgi"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["options"], json!(["Nucleus", "Mitochondria", "Golgi"]));

    let (_, body) = app.get(&format!("/api/quizzes/{quiz_id}?include_answers=true"), &token).await;
    assert_eq!(body["data"]["questions"][0]["options"], json!(["Nucleus", "Mitochondria", "Golgi"]));
    assert_eq!(body["data"]["questions"][0]["correct_answer"], "Mitochondria");
}

#[tokio::test]
async fn test_generate_quiz() {
    let generator = StubGenerator::replying(
        r#"Here you go: [{"question": "ATP is an energy carrier", "question_type": "true_false", "correct_answer": true},
            {"question": "Where is ATP made?", "question_type": "multiple_choice", "options": ["Mitochondria", "Ribosome"], "correct_answer": "Mitochondria"},
            {"question": "Broken", "question_type": "essay", "correct_answer": "x"}]"#,
    );
    let app = create_test_app_with(generator).await;
    let token = app.register("kate").await;
    let subject_id = app.create_subject(&token, "Biology").await;

    let (status, body) = app
        .post(
            "/api/quizzes/generate",
            &token,
            json!({ "subject_id": subject_id, "content": "ATP", "num_questions": 500, "question_types": ["true_false", "multiple-choice"] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["question_count"], 2);
    assert_eq!(body["data"]["questions"][0]["correct_answer"], "True");

    let (status, _) = app
        .post("/api/quizzes/generate", &token, json!({ "subject_id": subject_id, "content": "ATP", "question_types": ["essay"] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tutor_chat_keeps_history() {
    let app = create_test_app_with(StubGenerator::replying("Think about energy.")).await;
    let token = app.register("liam").await;
    let subject_id = app.create_subject(&token, "Biology").await;

    let (status, body) = app
        .post("/api/tutor/chat", &token, json!({ "message": "What is ATP?", "subject_id": subject_id }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let session_id = body["data"]["session_id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["assistant_message"]["content"], "Think about energy.");

    let (status, _) = app
        .post("/api/tutor/chat", &token, json!({ "message": "And ADP?", "session_id": session_id }))
        .await;
    assert_eq!(status, StatusCode::OK);

    {
        let prompts = app.generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0][0].content.contains("Biology"));
        // system + two stored messages + the new question
        assert_eq!(prompts[1].len(), 4);
        assert_eq!(prompts[1][1].content, "What is ATP?");
    }

    let (_, body) = app.get("/api/tutor/sessions", &token).await;
    assert_eq!(body["data"][0]["session_id"], session_id.as_str());
    assert_eq!(body["data"][0]["message_count"], 4);

    let (status, body) = app.get(&format!("/api/tutor/sessions/{session_id}"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["messages"].as_array().unwrap().len(), 4);

    let (status, _) = app.delete(&format!("/api/tutor/sessions/{session_id}"), &token).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/api/tutor/sessions/{session_id}"), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.post("/api/tutor/ask", &token, json!({ "question": "Why?" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["answer"], "Think about energy.");
    let (_, body) = app.get("/api/tutor/sessions", &token).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_youtube_import_and_notes_from_lecture() {
    let app = create_test_app_with(StubGenerator::replying("# Notes\n- ATP")).await;
    let token = app.register("mia").await;
    let subject_id = app.create_subject(&token, "Biology").await;

    let (status, body) = app
        .post("/api/lectures/youtube", &token, json!({ "url": "not a url", "subject_id": subject_id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = app
        .post(
            "/api/lectures/youtube",
            &token,
            json!({ "url": "https://youtu.be/dQw4w9WgXcQ", "subject_id": subject_id, "generate_summary": false }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["source_type"], "youtube");
    assert_eq!(body["data"]["title"], "YouTube Lecture - dQw4w9WgXcQ");
    assert_eq!(body["data"]["duration_seconds"], 95);
    assert!(body["data"]["summary"].is_null());
    let lecture_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post(&format!("/api/notes/from-lecture/{lecture_id}"), &token, json!({}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["content"], "# Notes\n- ATP");
    assert_eq!(body["data"]["lecture_id"], lecture_id.as_str());
    assert_eq!(body["data"]["subject_id"], subject_id.as_str());
    assert!(body["data"]["title"].as_str().unwrap().starts_with("Notes: "));

    let (_, body) = app.get(&format!("/api/notes?lecture_id={lecture_id}"), &token).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .post("/api/lectures", &token, json!({ "title": "Empty", "subject_id": subject_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let empty_id = body["data"]["id"].as_str().unwrap().to_string();
    let (status, _) = app.post(&format!("/api/lectures/{empty_id}/summarize"), &token, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deleting_subject_cascades() {
    let app = create_test_app().await;
    let token = app.register("noah").await;
    let subject_id = app.create_subject(&token, "Biology").await;
    let cards = create_set_with_cards(&app, &token, &subject_id, &["one"]).await;

    let (status, _) = app.delete(&format!("/api/subjects/{subject_id}"), &token).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get(&format!("/api/flashcards/{}", cards[0]), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = app.get("/api/flashcards/due", &token).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}
