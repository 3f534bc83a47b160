mod common;

use axum::http::StatusCode;
use common::{create_test_app, learner, ScriptedGenerator, TWO_QUEST_CHAIN};

async fn learner_with_completed_quest(app: &common::TestApp) -> String {
    let user = learner();
    app.generate_chain(&user).await;
    for n in 1..=5 {
        app.answer(&user, &format!("lim-{}", n), true).await;
    }
    user
}

#[tokio::test]
async fn test_claim_marks_reward_claimed() {
    let app = create_test_app(Some(ScriptedGenerator::replying(TWO_QUEST_CHAIN))).await;
    let user = learner_with_completed_quest(&app).await;

    let rewards = app.rewards(&user).await;
    let reward_id = rewards[0]["_id"].as_str().unwrap().to_string();
    assert_eq!(rewards[0]["claimed"], false);
    assert_eq!(rewards[0]["source"], "quest_completion");
    assert_eq!(rewards[0]["source_model"], "Quest");

    let (status, claimed) = app
        .send(
            "POST",
            &format!("/api/v1/rewards/{}/claim", reward_id),
            Some(user.as_str()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(claimed["claimed"], true);
    assert!(claimed["claimed_at"].is_string());

    let (_, unclaimed) = app.get("/api/v1/rewards/my?claimed=false", &user).await;
    assert_eq!(unclaimed.as_array().unwrap().len(), 1);
    let (_, done) = app.get("/api/v1/rewards/my?claimed=true", &user).await;
    assert_eq!(done.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_second_claim_returns_404() {
    let app = create_test_app(Some(ScriptedGenerator::replying(TWO_QUEST_CHAIN))).await;
    let user = learner_with_completed_quest(&app).await;

    let reward_id = app.rewards(&user).await[0]["_id"]
        .as_str()
        .unwrap()
        .to_string();
    let uri = format!("/api/v1/rewards/{}/claim", reward_id);

    let (first, _) = app.send("POST", &uri, Some(user.as_str()), None).await;
    assert_eq!(first, StatusCode::OK);
    let (second, body) = app.send("POST", &uri, Some(user.as_str()), None).await;
    assert_eq!(second, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_claim_unknown_or_foreign_reward_returns_404() {
    let app = create_test_app(Some(ScriptedGenerator::replying(TWO_QUEST_CHAIN))).await;
    let owner = learner_with_completed_quest(&app).await;
    let other = learner();

    let (status, _) = app
        .send("POST", "/api/v1/rewards/does-not-exist/claim", Some(owner.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let reward_id = app.rewards(&owner).await[0]["_id"]
        .as_str()
        .unwrap()
        .to_string();
    let (status, _) = app
        .send(
            "POST",
            &format!("/api/v1/rewards/{}/claim", reward_id),
            Some(other.as_str()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_default_chain_badges_are_rare() {
    let app = create_test_app(None).await;
    let user = learner();
    app.generate_chain(&user).await;

    // The first default quest lives in "Functions and Limits", which the seeded
    // bank does not cover
    for n in 1..=5 {
        app.store
            .insert_question(mathquest_api::models::question::QuestionRef {
                id: format!("fl-{}", n),
                subject: "Calculus".to_string(),
                chapter: "Functions and Limits".to_string(),
                tags: vec!["functions".to_string()],
            })
            .await;
        app.answer(&user, &format!("fl-{}", n), true).await;
    }

    let rewards = app.rewards(&user).await;
    let badge = rewards.iter().find(|r| r["kind"] == "badge").unwrap();
    assert_eq!(badge["name"], "Math Novice");
    assert_eq!(badge["rarity"], "rare");
    assert_eq!(badge["value"], 0);
    assert_eq!(rewards.len(), 3);
}
