mod common;

use axum::http::StatusCode;
use common::{attempt, create_test_app, learner};
use futures::future::join_all;
use serde_json::json;

#[tokio::test]
async fn test_record_attempt_without_quest_chain() {
    let app = create_test_app(None).await;
    let user = learner();

    let body = app.answer(&user, "lim-1", true).await;
    assert_eq!(body["progress"]["question_id"], "lim-1");
    assert_eq!(body["progress"]["attempts"], 1);
    assert_eq!(body["progress"]["status"], "completed");
    assert!(body.get("quest").is_none());
}

#[tokio::test]
async fn test_camel_case_attempt_fields_are_accepted() {
    let app = create_test_app(None).await;
    let user = learner();

    let (status, body) = app
        .post(
            "/api/v1/progress/lim-2",
            &user,
            json!({
                "status": "reviewing",
                "isCorrect": false,
                "userAnswer": "x = 2",
                "timeSpent": 45,
                "difficulty": 3,
                "notes": "check the sign"
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"]["status"], "reviewing");
    assert_eq!(body["progress"]["difficulty"], 3);
    assert_eq!(body["progress"]["notes"], "check the sign");
}

#[tokio::test]
async fn test_concurrent_submissions_share_one_record() {
    let app = create_test_app(None).await;
    let user = learner();

    join_all((0..10).map(|i| {
        let app = &app;
        let user = &user;
        async move { app.answer(user, "lim-3", i % 2 == 0).await }
    }))
    .await;

    let (status, page) = app.get("/api/v1/progress/my", &user).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["progress"][0]["attempts"], 10);
}

#[tokio::test]
async fn test_invalid_attempt_is_rejected() {
    let app = create_test_app(None).await;
    let user = learner();

    let mut empty_answer = attempt(true);
    empty_answer["user_answer"] = json!("");
    let (status, body) = app.post("/api/v1/progress/lim-1", &user, empty_answer).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);

    let mut bad_difficulty = attempt(true);
    bad_difficulty["difficulty"] = json!(9);
    let (status, _) = app.post("/api/v1/progress/lim-1", &user, bad_difficulty).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/api/v1/progress/lim-1", &user, json!({"status": "finished"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, page) = app.get("/api/v1/progress/my", &user).await;
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn test_unknown_question_returns_404() {
    let app = create_test_app(None).await;
    let user = learner();

    let (status, body) = app.post("/api/v1/progress/nope-1", &user, attempt(true)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_list_progress_filters_and_pages() {
    let app = create_test_app(None).await;
    let user = learner();
    for n in 1..=3 {
        app.answer(&user, &format!("lim-{}", n), true).await;
    }
    for n in 1..=2 {
        app.answer(&user, &format!("alg-{}", n), false).await;
    }

    let (_, algebra) = app.get("/api/v1/progress/my?subject=Algebra", &user).await;
    assert_eq!(algebra["total"], 2);

    let (_, page) = app
        .get("/api/v1/progress/my?chapter=Limits&limit=2&page=2", &user)
        .await;
    assert_eq!(page["total"], 3);
    assert_eq!(page["page"], 2);
    assert_eq!(page["total_pages"], 2);
    assert_eq!(page["progress"].as_array().unwrap().len(), 1);

    let (_, skipped) = app.get("/api/v1/progress/my?status=skipped", &user).await;
    assert_eq!(skipped["total"], 0);
}

#[tokio::test]
async fn test_empty_history_has_zero_mastery() {
    let app = create_test_app(None).await;
    let user = learner();

    let (status, summary) = app.get("/api/v1/progress/mastery", &user).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["overall"].as_f64(), Some(0.0));
    assert_eq!(summary["weak_concepts"], json!([]));

    let (status, stats) = app.get("/api/v1/progress/stats", &user).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["overall"]["total_questions"], 0);

    let (status, history) = app.get("/api/v1/progress/history", &user).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history, json!([]));
}

#[tokio::test]
async fn test_mastery_summary_reports_weak_concepts() {
    let app = create_test_app(None).await;
    let user = learner();

    for n in 1..=4 {
        app.answer(&user, &format!("lim-{}", n), true).await;
    }
    app.answer(&user, "der-1", true).await;
    app.answer(&user, "der-2", false).await;
    app.answer(&user, "der-3", false).await;

    let (_, summary) = app.get("/api/v1/progress/mastery", &user).await;
    let overall = summary["overall"].as_f64().unwrap();
    assert!((overall - 500.0 / 7.0).abs() < 0.01);

    let weak: Vec<&str> = summary["weak_concepts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["concept"].as_str().unwrap())
        .collect();
    assert_eq!(weak.len(), 2);
    assert!(weak.contains(&"derivatives"));
    assert!(weak.contains(&"chain-rule"));

    let (_, concepts) = app.get("/api/v1/progress/concepts", &user).await;
    let limits = concepts
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["concept"] == "limits")
        .cloned()
        .unwrap();
    assert_eq!(limits["total"], 4);
    assert_eq!(limits["mastery"].as_f64(), Some(100.0));
}

#[tokio::test]
async fn test_non_completed_attempts_do_not_count_toward_mastery() {
    let app = create_test_app(None).await;
    let user = learner();

    let mut skipped = attempt(true);
    skipped["status"] = json!("skipped");
    let (status, _) = app.post("/api/v1/progress/lim-1", &user, skipped).await;
    assert_eq!(status, StatusCode::OK);
    app.answer(&user, "lim-2", false).await;

    let (_, summary) = app.get("/api/v1/progress/mastery", &user).await;
    assert_eq!(summary["overall"].as_f64(), Some(0.0));

    let (_, stats) = app.get("/api/v1/progress/stats", &user).await;
    assert_eq!(stats["overall"]["total_questions"], 2);
}

#[tokio::test]
async fn test_history_groups_todays_attempts() {
    let app = create_test_app(None).await;
    let user = learner();
    app.answer(&user, "lim-1", true).await;
    app.answer(&user, "lim-2", false).await;

    let (_, history) = app.get("/api/v1/progress/history", &user).await;
    let points = history.as_array().unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["total_count"], 2);
    assert_eq!(points[0]["correct_count"], 1);
    assert_eq!(points[0]["mastery"].as_f64(), Some(50.0));
}

#[tokio::test]
async fn test_recommendations_fall_back_to_default_advice() {
    let app = create_test_app(None).await;
    let user = learner();
    app.answer(&user, "alg-1", false).await;

    let (status, body) = app.get("/api/v1/progress/recommendations", &user).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["weak_concepts"][0]["concept"], "matrices");
    assert!(body["recommendations"]["importance"]
        .as_str()
        .unwrap()
        .contains("matrices"));
}

#[tokio::test]
async fn test_goal_defaults_and_updates() {
    let app = create_test_app(None).await;
    let user = learner();

    let (status, goal) = app.get("/api/v1/progress/goals", &user).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(goal["goal"]["target_mastery"].as_f64(), Some(70.0));

    let (status, _) = app
        .post(
            "/api/v1/progress/goals",
            &user,
            json!({"targetMastery": 85, "description": "ace the midterm"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, goal) = app.get("/api/v1/progress/goals", &user).await;
    assert_eq!(goal["goal"]["target_mastery"].as_f64(), Some(85.0));
    assert_eq!(goal["goal"]["description"], "ace the midterm");

    let (status, _) = app
        .post("/api/v1/progress/goals", &user, json!({"target_mastery": 150}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
