use chrono::{Duration, TimeZone, Utc};

use super::*;
use crate::config::RubricConfig;

fn item(id: &str, points: f64, number: u32) -> RubricItem {
    RubricItem {
        id: id.to_string(),
        points,
        number,
        description: format!("item {id}"),
        explanation: None,
        grader_note: None,
        always_show_to_students: false,
    }
}

fn two_item_rubric() -> Rubric {
    Rubric::new(
        7,
        RubricSettings::default(),
        vec![item("a", 2.0, 0), item("b", -1.0, 1)],
    )
    .unwrap()
}

fn limits(max_points: f64, max_manual_points: f64) -> PointLimits {
    PointLimits {
        max_points,
        max_manual_points,
    }
}

#[test]
fn test_total_defaults_missing_score_to_full_value() {
    let rubric = two_item_rubric();
    let grading = apply_rubric_grading(
        &rubric,
        &[
            AppliedRubricItem::partial("a", 1.0),
            AppliedRubricItem::full("b"),
        ],
    )
    .unwrap();

    assert_eq!(grading.total, 1.0);
    assert_eq!(grading.rubric_id, 7);
    assert_eq!(grading.items.len(), 2);
}

#[test]
fn test_partial_score_scales_item_points() {
    let rubric = two_item_rubric();
    let grading = rubric
        .apply(&[AppliedRubricItem::partial("a", 0.5)])
        .unwrap();

    assert_eq!(grading.total, 1.0);
}

#[test]
fn test_unknown_item_rejected() {
    let rubric = two_item_rubric();
    let err = rubric
        .apply(&[AppliedRubricItem::full("unknown")])
        .unwrap_err();

    assert!(err.is_invalid_input());
}

#[test]
fn test_item_applied_twice_rejected() {
    let rubric = two_item_rubric();
    let err = rubric
        .apply(&[AppliedRubricItem::full("a"), AppliedRubricItem::full("a")])
        .unwrap_err();

    assert!(err.is_invalid_input());
}

#[test]
fn test_nan_score_counts_as_zero() {
    let rubric = two_item_rubric();
    let grading = rubric
        .apply(&[AppliedRubricItem::partial("a", f64::NAN)])
        .unwrap();

    assert_eq!(grading.total, 0.0);
}

#[test]
fn test_duplicate_item_ids_rejected() {
    let err = Rubric::new(
        1,
        RubricSettings::default(),
        vec![item("a", 1.0, 0), item("a", 2.0, 1)],
    )
    .unwrap_err();

    assert!(err.is_invalid_input());
}

#[test]
fn test_items_sorted_by_number() {
    let rubric = Rubric::new(
        1,
        RubricSettings::default(),
        vec![item("late", 1.0, 3), item("early", 1.0, 0)],
    )
    .unwrap();

    let ids: Vec<_> = rubric.items().iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["early", "late"]);
}

#[test]
fn test_computed_points_clamped_to_manual_max_plus_extra() {
    let settings = RubricSettings {
        starting_points: 0.0,
        min_points: 0.0,
        max_extra_points: 1.0,
        replace_auto_points: false,
    };
    let rubric = Rubric::new(1, settings, vec![item("a", 10.0, 0)]).unwrap();
    let grading = rubric.apply(&[AppliedRubricItem::full("a")]).unwrap();

    assert_eq!(grading.computed_points(&limits(10.0, 5.0)), 6.0);
}

#[test]
fn test_computed_points_uses_total_max_when_replacing_auto() {
    let settings = RubricSettings {
        replace_auto_points: true,
        ..RubricSettings::default()
    };
    let rubric = Rubric::new(1, settings, vec![item("a", 10.0, 0)]).unwrap();
    let grading = rubric.apply(&[AppliedRubricItem::full("a")]).unwrap();

    assert_eq!(grading.computed_points(&limits(8.0, 5.0)), 8.0);
}

#[test]
fn test_negative_grading_floor_and_adjustment() {
    let settings = RubricSettings {
        starting_points: 5.0,
        min_points: 1.0,
        max_extra_points: 0.0,
        replace_auto_points: false,
    };
    let rubric = Rubric::new(1, settings, vec![item("typo", -3.0, 0), item("wrong", -4.0, 1)])
        .unwrap();
    let grading = rubric
        .apply(&[
            AppliedRubricItem::full("typo"),
            AppliedRubricItem::full("wrong"),
        ])
        .unwrap()
        .with_adjust_points(-2.0);

    // floor of 1 applies before the adjustment
    assert_eq!(grading.computed_points(&limits(5.0, 5.0)), -1.0);
}

#[test]
fn test_staleness_clean_for_unchanged_rubric() {
    let rubric = two_item_rubric();
    let grading = rubric.apply(&[AppliedRubricItem::full("a")]).unwrap();

    let staleness = detect_staleness(&grading, &rubric);
    assert!(!staleness.is_stale());
}

#[test]
fn test_staleness_flags_settings_change() {
    let rubric = two_item_rubric();
    let grading = rubric.apply(&[AppliedRubricItem::full("a")]).unwrap();

    let edited = Rubric::new(
        7,
        RubricSettings {
            min_points: -5.0,
            ..RubricSettings::default()
        },
        rubric.items().to_vec(),
    )
    .unwrap();

    let staleness = detect_staleness(&grading, &edited);
    assert!(staleness.rubric_settings_changed);
    assert!(!staleness.rubric_items_changed);
}

#[test]
fn test_staleness_flags_item_points_change_and_removal() {
    let rubric = two_item_rubric();
    let grading = rubric.apply(&[AppliedRubricItem::full("a")]).unwrap();

    let repriced = Rubric::new(7, RubricSettings::default(), vec![item("a", 3.0, 0)]).unwrap();
    let staleness = detect_staleness(&grading, &repriced);
    assert!(staleness.rubric_items_changed);
    assert!(!staleness.rubric_settings_changed);

    let removed = Rubric::new(7, RubricSettings::default(), vec![item("b", -1.0, 0)]).unwrap();
    assert!(detect_staleness(&grading, &removed).rubric_items_changed);
}

#[test]
fn test_staleness_ignores_unapplied_item_changes() {
    let rubric = two_item_rubric();
    let grading = rubric.apply(&[AppliedRubricItem::full("a")]).unwrap();

    let edited = Rubric::new(
        7,
        RubricSettings::default(),
        vec![item("a", 2.0, 0), item("b", -2.0, 1)],
    )
    .unwrap();

    assert!(!detect_staleness(&grading, &edited).is_stale());
}

#[test]
fn test_detect_conflict_is_equality_check() {
    let t1 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let t2 = t1 + Duration::milliseconds(1);

    assert!(!detect_conflict(&t1, &t1));
    assert!(detect_conflict(&t1, &t2));
    assert!(detect_conflict(&t2, &t1));
}

#[test]
fn test_lifecycle_happy_path() {
    let state = GradingState::Ungraded
        .transition(GradingEvent::AutoGrade)
        .and_then(|s| s.transition(GradingEvent::AiGrade))
        .and_then(|s| s.transition(GradingEvent::ManualGrade))
        .and_then(|s| s.transition(GradingEvent::Finalize))
        .unwrap();

    assert_eq!(state, GradingState::Finalized);
}

#[test]
fn test_lifecycle_rejects_ai_over_manual_and_edits_after_finalize() {
    assert!(GradingState::ManualGraded
        .transition(GradingEvent::AiGrade)
        .is_err());
    assert!(GradingState::Finalized
        .transition(GradingEvent::ManualGrade)
        .is_err());
    assert!(GradingState::AutoGraded
        .transition(GradingEvent::Finalize)
        .is_err());
}

#[test]
fn test_new_submission_resets_any_state() {
    for state in [
        GradingState::Ungraded,
        GradingState::AutoGraded,
        GradingState::ManualGraded,
        GradingState::AiGraded,
        GradingState::Finalized,
    ] {
        assert_eq!(
            state.transition(GradingEvent::NewSubmission).unwrap(),
            GradingState::Ungraded
        );
    }
}

#[test]
fn test_grading_state_round_trips_through_str() {
    let state: GradingState = "ai_graded".parse().unwrap();
    assert_eq!(state, GradingState::AiGraded);
    assert_eq!(state.to_string(), "ai_graded");
    assert!("graded".parse::<GradingState>().is_err());
}

fn input(points: Option<f64>, description: Option<&str>, order: i64) -> RubricItemInput {
    RubricItemInput {
        points,
        description: description.map(str::to_string),
        order,
        ..RubricItemInput::default()
    }
}

#[test]
fn test_validate_rubric_items() {
    let config = RubricConfig::default();

    assert!(validate_rubric_items(&[], &config).is_err());
    assert!(validate_rubric_items(&[input(None, Some("x"), 0)], &config).is_err());
    assert!(validate_rubric_items(&[input(Some(1.0), None, 0)], &config).is_err());
    assert!(validate_rubric_items(&[input(Some(1.0), Some(""), 0)], &config).is_err());

    let long = "x".repeat(config.max_description_length + 1);
    assert!(validate_rubric_items(&[input(Some(1.0), Some(&long), 0)], &config).is_err());

    let exact = "x".repeat(config.max_description_length);
    assert!(validate_rubric_items(&[input(Some(1.0), Some(&exact), 0)], &config).is_ok());
}

#[test]
fn test_validate_point_range() {
    let settings = RubricSettings {
        min_points: 5.0,
        ..RubricSettings::default()
    };

    assert!(validate_point_range(&settings, &limits(10.0, 5.0)).is_err());
    assert!(validate_point_range(&settings, &limits(10.0, 6.0)).is_ok());

    let replacing = RubricSettings {
        replace_auto_points: true,
        ..settings
    };
    assert!(validate_point_range(&replacing, &limits(10.0, 5.0)).is_ok());
}

#[test]
fn test_build_rubric_items_renumbers_by_order_and_keeps_ids() {
    let mut second = input(Some(-1.0), Some("second"), 20);
    second.id = Some("keep".to_string());
    let items = build_rubric_items(vec![second, input(Some(2.0), Some("first"), 10)]);

    assert_eq!(items[0].description, "first");
    assert_eq!(items[0].number, 0);
    assert!(!items[0].id.is_empty());
    assert_eq!(items[1].id, "keep");
    assert_eq!(items[1].number, 1);
}
