use chrono::{Duration, TimeZone, Utc};

use super::*;
use crate::rubric::{ModifiedAtChecker, RubricItem, RubricSettings};

fn submission() -> SubmissionForScoreUpdate {
    SubmissionForScoreUpdate {
        assessment_instance_id: 1,
        instance_question_id: 10,
        submission_id: Some(100),
        max_points: Some(10.0),
        max_auto_points: Some(4.0),
        max_manual_points: Some(6.0),
        manual_rubric_id: None,
        partial_scores: None,
        auto_points: Some(2.0),
        manual_points: Some(1.0),
        manual_rubric_grading_id: None,
        grading_state: GradingState::AutoGraded,
        modified_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
        modified_at_conflict: false,
    }
}

fn rubric(settings: RubricSettings) -> Rubric {
    let item = |id: &str, points: f64, number: u32| RubricItem {
        id: id.to_string(),
        points,
        number,
        description: id.to_string(),
        explanation: None,
        grader_note: None,
        always_show_to_students: false,
    };
    Rubric::new(
        5,
        settings,
        vec![item("correct", 4.0, 0), item("style", 2.0, 1), item("typo", -1.0, 2)],
    )
    .unwrap()
}

#[test]
fn test_manual_points_added_to_stored_auto_points() {
    let input = InstanceQuestionScoreInput {
        manual_points: Some(5.0),
        ..Default::default()
    };
    let change = compute_question_score(&submission(), &input, None).unwrap();

    assert_eq!(change.points, Some(7.0));
    assert_eq!(change.score_perc, Some(70.0));
    assert_eq!(change.manual_points, Some(5.0));
    assert_eq!(change.auto_points, None);
    assert_eq!(change.rubric_grading, RubricGradingChange::Clear);
}

#[test]
fn test_manual_score_perc_scales_manual_max() {
    let input = InstanceQuestionScoreInput {
        manual_score_perc: Some(50.0),
        ..Default::default()
    };
    let change = compute_question_score(&submission(), &input, None).unwrap();

    assert_eq!(change.manual_points, Some(3.0));
    assert_eq!(change.points, Some(5.0));
}

#[test]
fn test_total_points_split_into_manual() {
    let input = InstanceQuestionScoreInput {
        points: Some(9.0),
        ..Default::default()
    };
    let change = compute_question_score(&submission(), &input, None).unwrap();

    assert_eq!(change.score_perc, Some(90.0));
    assert_eq!(change.manual_points, Some(7.0));
}

#[test]
fn test_score_perc_sets_points() {
    let input = InstanceQuestionScoreInput {
        score_perc: Some(40.0),
        ..Default::default()
    };
    let change = compute_question_score(&submission(), &input, None).unwrap();

    assert_eq!(change.points, Some(4.0));
    assert_eq!(change.manual_points, Some(2.0));
}

#[test]
fn test_auto_points_only_keeps_manual_points() {
    let input = InstanceQuestionScoreInput {
        auto_points: Some(3.0),
        ..Default::default()
    };
    let change = compute_question_score(&submission(), &input, None).unwrap();

    assert_eq!(change.auto_points, Some(3.0));
    assert_eq!(change.auto_score_perc, Some(75.0));
    assert_eq!(change.points, Some(4.0));
    assert_eq!(change.manual_points, None);
    assert_eq!(change.grading_event(false), Some(GradingEvent::AutoGrade));
}

#[test]
fn test_partial_scores_merge_and_weight() {
    let mut current = submission();
    current.partial_scores = Some(PartialScores::from([(
        "part1".to_string(),
        PartialScore {
            score: Some(1.0),
            weight: Some(1.0),
        },
    )]));

    let input = InstanceQuestionScoreInput {
        partial_scores: Some(PartialScores::from([(
            "part2".to_string(),
            PartialScore {
                score: Some(0.0),
                weight: Some(3.0),
            },
        )])),
        ..Default::default()
    };
    let change = compute_question_score(&current, &input, None).unwrap();

    assert_eq!(change.auto_score_perc, Some(25.0));
    assert_eq!(change.auto_points, Some(1.0));
    assert_eq!(change.partial_scores.as_ref().map(|p| p.len()), Some(2));
}

#[test]
fn test_partial_scores_with_zero_weight() {
    let scores = PartialScores::from([(
        "only".to_string(),
        PartialScore {
            score: Some(1.0),
            weight: Some(0.0),
        },
    )]);
    assert_eq!(partial_scores_perc(&scores), None);
    assert_eq!(partial_scores_perc(&PartialScores::new()), None);
}

#[test]
fn test_conflicting_fields_rejected() {
    let cases = [
        InstanceQuestionScoreInput {
            auto_points: Some(1.0),
            auto_score_perc: Some(10.0),
            ..Default::default()
        },
        InstanceQuestionScoreInput {
            auto_score_perc: Some(10.0),
            score_perc: Some(10.0),
            ..Default::default()
        },
        InstanceQuestionScoreInput {
            auto_points: Some(1.0),
            points: Some(1.0),
            ..Default::default()
        },
        InstanceQuestionScoreInput {
            manual_points: Some(1.0),
            manual_score_perc: Some(10.0),
            ..Default::default()
        },
        InstanceQuestionScoreInput {
            manual_score_perc: Some(10.0),
            score_perc: Some(10.0),
            ..Default::default()
        },
        InstanceQuestionScoreInput {
            manual_points: Some(1.0),
            points: Some(1.0),
            ..Default::default()
        },
        InstanceQuestionScoreInput {
            score_perc: Some(10.0),
            points: Some(1.0),
            ..Default::default()
        },
    ];

    for input in cases {
        let err = compute_question_score(&submission(), &input, None).unwrap_err();
        assert!(err.is_invalid_input(), "{input:?}");
    }
}

#[test]
fn test_non_finite_input_rejected() {
    let input = InstanceQuestionScoreInput {
        points: Some(f64::INFINITY),
        ..Default::default()
    };
    assert!(compute_question_score(&submission(), &input, None)
        .unwrap_err()
        .is_invalid_input());
}

#[test]
fn test_rubric_sets_manual_points() {
    let mut current = submission();
    current.manual_rubric_id = Some(5);
    let rubric = rubric(RubricSettings::default());

    let input = InstanceQuestionScoreInput {
        manual_rubric_data: Some(ManualRubricData {
            rubric_id: 5,
            applied_rubric_items: vec![
                AppliedRubricItem::full("correct"),
                AppliedRubricItem::full("typo"),
            ],
            adjust_points: Some(0.5),
        }),
        ..Default::default()
    };
    let change = compute_question_score(&current, &input, Some(&rubric)).unwrap();

    assert_eq!(change.manual_points, Some(3.5));
    assert_eq!(change.points, Some(5.5));
    assert!(matches!(change.rubric_grading, RubricGradingChange::New(_)));
    assert_eq!(change.grading_event(false), Some(GradingEvent::ManualGrade));
    assert_eq!(change.grading_event(true), Some(GradingEvent::AiGrade));
}

#[test]
fn test_rubric_replacing_auto_points_subtracts_auto() {
    let mut current = submission();
    current.manual_rubric_id = Some(5);
    let rubric = rubric(RubricSettings {
        replace_auto_points: true,
        ..RubricSettings::default()
    });

    let input = InstanceQuestionScoreInput {
        manual_rubric_data: Some(ManualRubricData {
            rubric_id: 5,
            applied_rubric_items: vec![
                AppliedRubricItem::full("correct"),
                AppliedRubricItem::full("style"),
            ],
            adjust_points: None,
        }),
        ..Default::default()
    };
    let change = compute_question_score(&current, &input, Some(&rubric)).unwrap();

    // rubric total 6 covers the whole question; auto points stay at 2
    assert_eq!(change.manual_points, Some(4.0));
    assert_eq!(change.points, Some(6.0));
}

#[test]
fn test_rubric_with_total_points_rejected() {
    let mut current = submission();
    current.manual_rubric_id = Some(5);
    let rubric = rubric(RubricSettings::default());

    let input = InstanceQuestionScoreInput {
        points: Some(3.0),
        manual_rubric_data: Some(ManualRubricData {
            rubric_id: 5,
            ..Default::default()
        }),
        ..Default::default()
    };
    assert!(compute_question_score(&current, &input, Some(&rubric))
        .unwrap_err()
        .is_invalid_input());
}

#[test]
fn test_rubric_of_other_question_rejected() {
    let mut current = submission();
    current.manual_rubric_id = Some(6);
    let rubric = rubric(RubricSettings::default());

    let input = InstanceQuestionScoreInput {
        manual_rubric_data: Some(ManualRubricData {
            rubric_id: 5,
            ..Default::default()
        }),
        ..Default::default()
    };
    assert!(compute_question_score(&current, &input, Some(&rubric)).is_err());
}

#[test]
fn test_existing_rubric_grading_kept_without_manual_change() {
    let mut current = submission();
    current.manual_rubric_id = Some(5);
    current.manual_rubric_grading_id = Some(77);

    let input = InstanceQuestionScoreInput {
        auto_points: Some(1.0),
        ..Default::default()
    };
    let change = compute_question_score(&current, &input, None).unwrap();

    assert_eq!(change.rubric_grading, RubricGradingChange::Keep(Some(77)));
}

#[test]
fn test_nothing_to_score() {
    let input = InstanceQuestionScoreInput {
        feedback: Some(serde_json::json!({"manual": "see comments"})),
        ..Default::default()
    };
    let change = compute_question_score(&submission(), &input, None).unwrap();

    assert_eq!(change.score_perc, None);
    assert_eq!(change.grading_event(false), None);
}

#[test]
fn test_zero_max_points_gives_zero_perc() {
    let mut current = submission();
    current.max_points = Some(0.0);
    let input = InstanceQuestionScoreInput {
        points: Some(3.0),
        ..Default::default()
    };
    let change = compute_question_score(&current, &input, None).unwrap();

    assert_eq!(change.score_perc, Some(0.0));
}

#[test]
fn test_check_conflict_marks_stale_client() {
    let stored = submission();
    let loaded = stored.modified_at;
    let stale = loaded - Duration::seconds(5);

    assert!(!stored
        .clone()
        .check_conflict(&ModifiedAtChecker, Some(&loaded))
        .modified_at_conflict);
    assert!(stored
        .clone()
        .check_conflict(&ModifiedAtChecker, Some(&stale))
        .modified_at_conflict);
    assert!(!stored
        .check_conflict(&ModifiedAtChecker, None)
        .modified_at_conflict);
}

#[test]
fn test_sanitized_coerces_nan() {
    let mut current = submission();
    current.auto_points = Some(f64::NAN);
    current.max_points = Some(f64::NAN);

    let clean = current.sanitized();
    assert_eq!(clean.auto_points, Some(0.0));
    assert_eq!(clean.max_points, Some(0.0));
}
