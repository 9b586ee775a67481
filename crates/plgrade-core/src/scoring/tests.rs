use std::cell::RefCell;

use super::*;
use crate::error::GradeError;

struct MemoryStore {
    instance: RefCell<Option<AssessmentInstance>>,
    zones: Vec<ZonePoints>,
    last_credit: Option<i64>,
}

impl MemoryStore {
    fn new(max_points: f64, max_bonus_points: f64, zone_points: &[f64]) -> Self {
        let zones = zone_points
            .iter()
            .enumerate()
            .map(|(i, points)| ZonePoints {
                zone_id: i as i64 + 1,
                points: *points,
                instance_question_ids: vec![i as i64 + 100],
                max_points,
                max_instance_question_ids: vec![i as i64 + 100],
            })
            .collect();

        Self {
            instance: RefCell::new(Some(AssessmentInstance {
                id: 1,
                max_points: Some(max_points),
                max_bonus_points: Some(max_bonus_points),
                points: 0.0,
                score_perc: 0.0,
            })),
            zones,
            last_credit: None,
        }
    }

    fn set_zone_total(&mut self, points: f64) {
        self.zones.truncate(1);
        self.zones[0].points = points;
    }

    fn stored(&self) -> AssessmentInstance {
        self.instance.borrow().clone().unwrap()
    }
}

impl ScoreStore for MemoryStore {
    fn select_assessment_instance(&self, id: i64) -> Result<Option<AssessmentInstance>> {
        Ok(self.instance.borrow().clone().filter(|i| i.id == id))
    }

    fn select_zone_points(&self, _id: i64) -> Result<Vec<ZonePoints>> {
        Ok(self.zones.clone())
    }

    fn select_last_submission_credit(&self, _id: i64) -> Result<Option<i64>> {
        Ok(self.last_credit)
    }

    fn update_assessment_instance_score(
        &self,
        _id: i64,
        points: f64,
        score_perc: f64,
    ) -> Result<()> {
        if let Some(instance) = self.instance.borrow_mut().as_mut() {
            instance.points = points;
            instance.score_perc = score_perc;
        }
        Ok(())
    }
}

#[derive(Default)]
struct MemoryAudit {
    entries: RefCell<Vec<ScoreLogEntry>>,
    fail: bool,
}

impl AuditSink for MemoryAudit {
    fn record_score_change(&self, entry: &ScoreLogEntry) -> Result<()> {
        if self.fail {
            return Err(GradeError::Other("audit log unavailable".to_string()));
        }
        self.entries.borrow_mut().push(entry.clone());
        Ok(())
    }
}

fn recompute(store: &MemoryStore, audit: &MemoryAudit, request: ScoreRequest) -> ScoreUpdate {
    compute_assessment_instance_score(store, audit, &request, &ScoringConfig::default()).unwrap()
}

#[test]
fn test_full_credit_scenario() {
    let store = MemoryStore::new(10.0, 2.0, &[5.0, 4.0]);
    let audit = MemoryAudit::default();

    let update = recompute(&store, &audit, ScoreRequest::new(1).with_credit(Some(100)));

    assert_eq!(
        update,
        ScoreUpdate {
            updated: true,
            points: 9.0,
            score_perc: 90.0
        }
    );
    assert_eq!(store.stored().points, 9.0);
    assert_eq!(store.stored().score_perc, 90.0);
    assert_eq!(audit.entries.borrow().len(), 1);
}

#[test]
fn test_credit_below_full_caps_percentage() {
    let store = MemoryStore::new(10.0, 2.0, &[9.0]);
    let audit = MemoryAudit::default();

    let update = recompute(&store, &audit, ScoreRequest::new(1).with_credit(Some(50)));

    assert_eq!(update.points, 9.0);
    assert_eq!(update.score_perc, 50.0);
}

#[test]
fn test_bonus_credit_scales_after_full_points() {
    let store = MemoryStore::new(10.0, 2.0, &[12.0]);
    let audit = MemoryAudit::default();

    let update = recompute(&store, &audit, ScoreRequest::new(1).with_credit(Some(110)));

    assert_eq!(update.points, 12.0);
    assert!((update.score_perc - 132.0).abs() < 1e-9);
}

#[test]
fn test_bonus_credit_ignored_below_full_points() {
    let store = MemoryStore::new(10.0, 0.0, &[8.0]);
    let audit = MemoryAudit::default();

    let update = recompute(&store, &audit, ScoreRequest::new(1).with_credit(Some(120)));

    assert_eq!(update.score_perc, 80.0);
}

#[test]
fn test_points_never_exceed_max_plus_bonus() {
    for total in [0.0, 5.0, 11.5, 12.0, 40.0] {
        let store = MemoryStore::new(10.0, 2.0, &[total]);
        let audit = MemoryAudit::default();
        let update = recompute(&store, &audit, ScoreRequest::new(1).with_credit(Some(100)));
        assert_eq!(update.points, f64::min(total, 12.0));
    }
}

#[test]
fn test_score_never_decreases_without_allow_decrease() {
    let mut store = MemoryStore::new(10.0, 0.0, &[8.0]);
    let audit = MemoryAudit::default();

    let mut last = 0.0;
    for total in [8.0, 3.0, 9.0, 0.0, 6.0] {
        store.set_zone_total(total);
        let update = recompute(&store, &audit, ScoreRequest::new(1).with_credit(Some(100)));
        assert!(update.score_perc >= last);
        last = update.score_perc;
    }
    assert_eq!(store.stored().score_perc, 90.0);
}

#[test]
fn test_allow_decrease_lowers_score() {
    let mut store = MemoryStore::new(10.0, 0.0, &[8.0]);
    let audit = MemoryAudit::default();
    recompute(&store, &audit, ScoreRequest::new(1).with_credit(Some(100)));

    store.set_zone_total(2.0);
    let update = recompute(
        &store,
        &audit,
        ScoreRequest::new(1)
            .with_credit(Some(100))
            .allow_decrease(true),
    );

    assert_eq!(update.score_perc, 20.0);
    assert!(update.updated);
}

#[test]
fn test_credit_defaults_to_last_submission_then_zero() {
    let mut store = MemoryStore::new(10.0, 0.0, &[9.0]);
    store.last_credit = Some(70);
    let audit = MemoryAudit::default();

    let update = recompute(&store, &audit, ScoreRequest::new(1));
    assert_eq!(update.score_perc, 70.0);
    assert_eq!(audit.entries.borrow()[0].credit, Some(70));

    let store = MemoryStore::new(10.0, 0.0, &[9.0]);
    let update = recompute(&store, &audit, ScoreRequest::new(1));
    assert_eq!(update.score_perc, 0.0);
}

#[test]
fn test_zero_max_points_does_not_divide_by_zero() {
    let store = MemoryStore::new(0.0, 5.0, &[3.0]);
    let audit = MemoryAudit::default();

    let update = recompute(&store, &audit, ScoreRequest::new(1).with_credit(Some(100)));

    assert_eq!(update.points, 3.0);
    assert_eq!(update.score_perc, 300.0);
}

#[test]
fn test_only_log_if_score_updated_skips_unchanged() {
    let store = MemoryStore::new(10.0, 0.0, &[5.0]);
    let audit = MemoryAudit::default();
    let request = ScoreRequest::new(1)
        .with_credit(Some(100))
        .only_log_if_score_updated(true);

    let first = recompute(&store, &audit, request.clone());
    let second = recompute(&store, &audit, request);

    assert!(first.updated);
    assert!(!second.updated);
    assert_eq!(audit.entries.borrow().len(), 1);
}

#[test]
fn test_unchanged_score_still_logged_by_default() {
    let store = MemoryStore::new(10.0, 0.0, &[5.0]);
    let audit = MemoryAudit::default();

    recompute(&store, &audit, ScoreRequest::new(1).with_credit(Some(100)));
    recompute(&store, &audit, ScoreRequest::new(1).with_credit(Some(100)));

    assert_eq!(audit.entries.borrow().len(), 2);
}

#[test]
fn test_audit_failure_does_not_block_update() {
    let store = MemoryStore::new(10.0, 0.0, &[5.0]);
    let audit = MemoryAudit {
        fail: true,
        ..Default::default()
    };

    let update = recompute(&store, &audit, ScoreRequest::new(1).with_credit(Some(100)));

    assert_eq!(update.score_perc, 50.0);
    assert_eq!(store.stored().score_perc, 50.0);
}

#[test]
fn test_missing_instance_is_not_found() {
    let store = MemoryStore::new(10.0, 0.0, &[5.0]);
    let audit = MemoryAudit::default();

    let err = compute_assessment_instance_score(
        &store,
        &audit,
        &ScoreRequest::new(42),
        &ScoringConfig::default(),
    )
    .unwrap_err();

    assert!(err.is_not_found());
    assert!(audit.entries.borrow().is_empty());
}

#[test]
fn test_credit_range_only_checked_when_enforced() {
    let store = MemoryStore::new(10.0, 0.0, &[5.0]);
    let audit = MemoryAudit::default();
    let request = ScoreRequest::new(1).with_credit(Some(-20));

    let lenient = compute_assessment_instance_score(
        &store,
        &audit,
        &request,
        &ScoringConfig::default(),
    );
    assert!(lenient.is_ok());

    let strict = ScoringConfig {
        enforce_credit_range: true,
    };
    let err = compute_assessment_instance_score(&store, &audit, &request, &strict).unwrap_err();
    assert!(err.is_invalid_input());
}

#[test]
fn test_nan_inputs_never_propagate() {
    let instance = AssessmentInstance {
        id: 1,
        max_points: Some(10.0),
        max_bonus_points: None,
        points: f64::NAN,
        score_perc: f64::NAN,
    };
    let zones = vec![
        ZonePoints {
            zone_id: 1,
            points: f64::NAN,
            instance_question_ids: vec![],
            max_points: 10.0,
            max_instance_question_ids: vec![],
        },
        ZonePoints {
            zone_id: 2,
            points: 4.0,
            instance_question_ids: vec![],
            max_points: 10.0,
            max_instance_question_ids: vec![],
        },
    ];

    let update = compute_score(&instance, &zones, 100, false);

    assert_eq!(update.points, 4.0);
    assert_eq!(update.score_perc, 40.0);
}

#[test]
fn test_set_score_perc_override() {
    let store = MemoryStore::new(20.0, 0.0, &[5.0]);
    let audit = MemoryAudit::default();

    let update = set_assessment_instance_score_perc(&store, &audit, 1, 75.0, Some(9)).unwrap();

    assert_eq!(update.points, 15.0);
    assert_eq!(update.score_perc, 75.0);
    let entries = audit.entries.borrow();
    assert_eq!(entries[0].authn_user_id, Some(9));
    assert_eq!(entries[0].credit, None);
}

#[test]
fn test_set_points_override_with_missing_max_points() {
    let store = MemoryStore::new(10.0, 0.0, &[5.0]);
    store.instance.borrow_mut().as_mut().unwrap().max_points = None;
    let audit = MemoryAudit::default();

    let update = set_assessment_instance_points(&store, &audit, 1, 3.0, None).unwrap();

    assert_eq!(update.score_perc, 300.0);
}

#[test]
fn test_override_rejects_non_finite_values() {
    let store = MemoryStore::new(10.0, 0.0, &[5.0]);
    let audit = MemoryAudit::default();

    assert!(set_assessment_instance_points(&store, &audit, 1, f64::NAN, None).is_err());
    assert!(set_assessment_instance_score_perc(&store, &audit, 1, f64::INFINITY, None).is_err());
}
