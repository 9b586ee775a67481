use plgrade_core::config::{GradingConfig, ScoringConfig};
use plgrade_core::db::{
    AssessmentInstanceFixture, Database, GradebookFixture, InstanceQuestionFixture,
    SubmissionFixture,
};
use plgrade_core::rubric::GradingState;
use plgrade_core::scoring::ScoreRequest;

/// One instance with a single question worth `earned` points
fn single_question(earned: f64) -> Database {
    let fixture = GradebookFixture {
        assessment_instances: vec![AssessmentInstanceFixture {
            id: 1,
            max_points: Some(10.0),
            max_bonus_points: Some(2.0),
            points: 0.0,
            score_perc: 0.0,
        }],
        instance_questions: vec![InstanceQuestionFixture {
            id: 1,
            assessment_instance_id: 1,
            zone_id: None,
            max_points: Some(12.0),
            max_auto_points: Some(12.0),
            max_manual_points: Some(0.0),
            manual_rubric_id: None,
            auto_points: Some(earned),
            manual_points: None,
            points: None,
            grading_state: GradingState::AutoGraded,
        }],
        submissions: vec![SubmissionFixture {
            id: None,
            instance_question_id: 1,
            credit: Some(100),
            partial_scores: None,
            date: None,
        }],
        ..GradebookFixture::default()
    };

    let db = Database::open_in_memory().unwrap();
    db.load_fixture(&fixture).unwrap();
    db
}

#[test]
fn test_full_credit_scenario() {
    let db = single_question(9.0);
    let update = db
        .grade_assessment_instance(&ScoreRequest::new(1).with_credit(Some(100)))
        .unwrap();

    assert_eq!(update.points, 9.0);
    assert_eq!(update.score_perc, 90.0);
    assert!(update.updated);
}

#[test]
fn test_partial_credit_scenario() {
    let db = single_question(9.0);
    let update = db
        .grade_assessment_instance(&ScoreRequest::new(1).with_credit(Some(50)))
        .unwrap();

    assert_eq!(update.points, 9.0);
    assert_eq!(update.score_perc, 50.0);
}

#[test]
fn test_bonus_credit_scenario() {
    let db = single_question(12.0);
    let update = db
        .grade_assessment_instance(&ScoreRequest::new(1).with_credit(Some(110)))
        .unwrap();

    assert_eq!(update.points, 12.0);
    assert!((update.score_perc - 132.0).abs() < 1e-9);
}

#[test]
fn test_points_capped_at_bonus_ceiling() {
    let db = single_question(12.0);
    db.set_points(1, 0.0, None).unwrap();

    let update = db
        .grade_assessment_instance(&ScoreRequest::new(1).with_credit(Some(100)))
        .unwrap();
    assert_eq!(update.points, 12.0);
    assert_eq!(update.score_perc, 120.0);
}

#[test]
fn test_score_never_decreases_without_flag() {
    let db = single_question(9.0);
    db.grade_assessment_instance(&ScoreRequest::new(1).with_credit(Some(100)))
        .unwrap();

    let lower = db
        .grade_assessment_instance(&ScoreRequest::new(1).with_credit(Some(30)))
        .unwrap();
    assert_eq!(lower.score_perc, 90.0);
    assert!(!lower.updated);

    let allowed = db
        .grade_assessment_instance(
            &ScoreRequest::new(1)
                .with_credit(Some(30))
                .allow_decrease(true),
        )
        .unwrap();
    assert_eq!(allowed.score_perc, 30.0);
    assert_eq!(db.assessment_instance(1).unwrap().score_perc, 30.0);
}

#[test]
fn test_credit_range_enforced_when_configured() {
    let config = GradingConfig {
        scoring: ScoringConfig {
            enforce_credit_range: true,
        },
        ..GradingConfig::default()
    };
    let db = single_question(9.0).with_config(config);

    let err = db
        .grade_assessment_instance(&ScoreRequest::new(1).with_credit(Some(-5)))
        .unwrap_err();
    assert!(err.is_invalid_input());
    assert_eq!(db.assessment_instance(1).unwrap().points, 0.0);
}

#[test]
fn test_unvalidated_credit_by_default() {
    let db = single_question(9.0);
    let update = db
        .grade_assessment_instance(&ScoreRequest::new(1).with_credit(Some(-5)).allow_decrease(true))
        .unwrap();
    assert_eq!(update.score_perc, -5.0);
}

#[test]
fn test_audit_log_records_actor_and_credit() {
    let db = single_question(9.0);
    db.grade_assessment_instance(
        &ScoreRequest::new(1)
            .with_credit(Some(100))
            .with_authn_user(Some(42)),
    )
    .unwrap();

    let log = db.select_score_log(1).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].action, "update");
    assert_eq!(log[0].authn_user_id, Some(42));
    assert_eq!(log[0].credit, Some(100));
    assert_eq!(log[0].old_state.points, 0.0);
    assert_eq!(log[0].new_state.score_perc, 90.0);
}
