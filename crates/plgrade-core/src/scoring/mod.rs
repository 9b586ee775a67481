//! Assessment instance score aggregation
//!
//! Combines per-zone point totals into the canonical `points` and
//! `score_perc` of an assessment instance, applying the credit, bonus and
//! non-decrease rules. Storage is reached through [`ScoreStore`] and audit
//! logging through [`AuditSink`], so the same logic runs against SQLite or
//! an in-memory fake.

pub mod zones;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ScoringConfig, MAX_CREDIT};
use crate::error::{GradeError, Result};
use crate::numeric::coerce_nan;
use crate::bail_invalid;

pub use zones::{aggregate_zone_points, ZoneQuestionPoints, ZoneRule};

/// Credit value meaning "full credit, no cap, no bonus"
pub const FULL_CREDIT: i64 = 100;

/// One student's attempt at an assessment, as far as scoring is concerned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentInstance {
    pub id: i64,
    pub max_points: Option<f64>,
    pub max_bonus_points: Option<f64>,
    pub points: f64,
    pub score_perc: f64,
}

impl AssessmentInstance {
    /// Highest point total the instance can hold, bonus included
    pub fn points_ceiling(&self) -> f64 {
        self.max_points.unwrap_or(0.0) + self.max_bonus_points.unwrap_or(0.0)
    }
}

/// Points earned in one zone, as reported by the zone aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonePoints {
    pub zone_id: i64,
    pub points: f64,
    pub instance_question_ids: Vec<i64>,
    pub max_points: f64,
    pub max_instance_question_ids: Vec<i64>,
}

/// Parameters of one score recomputation.
///
/// This is the explicit request context: everything the aggregator needs
/// about the caller travels here rather than through ambient state.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRequest {
    pub assessment_instance_id: i64,
    /// Only used for the audit log
    pub authn_user_id: Option<i64>,
    /// Integer percentage; derived from the latest submission when absent
    pub credit: Option<i64>,
    pub only_log_if_score_updated: bool,
    pub allow_decrease: bool,
}

impl ScoreRequest {
    pub fn new(assessment_instance_id: i64) -> Self {
        Self {
            assessment_instance_id,
            authn_user_id: None,
            credit: None,
            only_log_if_score_updated: false,
            allow_decrease: false,
        }
    }

    pub fn with_authn_user(mut self, authn_user_id: Option<i64>) -> Self {
        self.authn_user_id = authn_user_id;
        self
    }

    pub fn with_credit(mut self, credit: Option<i64>) -> Self {
        self.credit = credit;
        self
    }

    pub fn only_log_if_score_updated(mut self, only: bool) -> Self {
        self.only_log_if_score_updated = only;
        self
    }

    pub fn allow_decrease(mut self, allow: bool) -> Self {
        self.allow_decrease = allow;
        self
    }
}

/// Result of a score recomputation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub updated: bool,
    pub points: f64,
    pub score_perc: f64,
}

/// Points and percentage at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreState {
    pub points: f64,
    pub score_perc: f64,
}

/// Audit record for a change to an assessment instance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreLogEntry {
    pub assessment_instance_id: i64,
    pub action: String,
    pub old_state: ScoreState,
    pub new_state: ScoreState,
    pub credit: Option<i64>,
    pub authn_user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl ScoreLogEntry {
    pub fn update(
        instance: &AssessmentInstance,
        new_state: ScoreState,
        credit: Option<i64>,
        authn_user_id: Option<i64>,
    ) -> Self {
        Self {
            assessment_instance_id: instance.id,
            action: "update".to_string(),
            old_state: ScoreState {
                points: instance.points,
                score_perc: instance.score_perc,
            },
            new_state,
            credit,
            authn_user_id,
            created_at: Utc::now(),
        }
    }
}

/// Storage seam for score recomputation.
///
/// Implementations must run a whole recomputation against one consistent
/// view: the SQLite implementation wraps every call in an immediate
/// transaction.
pub trait ScoreStore {
    fn select_assessment_instance(&self, id: i64) -> Result<Option<AssessmentInstance>>;

    /// Per-zone totals after the zone's best-questions selection
    fn select_zone_points(&self, id: i64) -> Result<Vec<ZonePoints>>;

    /// Credit recorded on the most recent submission of the instance
    fn select_last_submission_credit(&self, id: i64) -> Result<Option<i64>>;

    fn update_assessment_instance_score(&self, id: i64, points: f64, score_perc: f64)
        -> Result<()>;
}

/// Destination for score audit records
pub trait AuditSink {
    fn record_score_change(&self, entry: &ScoreLogEntry) -> Result<()>;
}

/// Reject structurally invalid credit values.
///
/// Range checks only apply when `enforce_credit_range` is set; by default
/// any integer is accepted.
pub fn validate_credit(credit: i64, config: &ScoringConfig) -> Result<()> {
    if config.enforce_credit_range && !(0..=MAX_CREDIT).contains(&credit) {
        bail_invalid!(
            "credit",
            format!("{} (expected 0..={})", credit, MAX_CREDIT),
        );
    }
    Ok(())
}

/// Compute the new score of an instance from its zone totals.
///
/// Pure function: no storage access, no logging.
pub fn compute_score(
    instance: &AssessmentInstance,
    zones: &[ZonePoints],
    credit: i64,
    allow_decrease: bool,
) -> ScoreUpdate {
    let max_points = coerce_nan("max_points", instance.max_points.unwrap_or(0.0));
    let previous_points = coerce_nan("points", instance.points);
    let previous_score_perc = coerce_nan("score_perc", instance.score_perc);

    let total_points: f64 = zones
        .iter()
        .map(|zone| coerce_nan("zone_points", zone.points))
        .sum();

    let points = total_points.min(coerce_nan("points_ceiling", instance.points_ceiling()));

    let divisor = if max_points > 0.0 { max_points } else { 1.0 };
    let mut score_perc = points * 100.0 / divisor;

    let credit_f = credit as f64;
    if credit < FULL_CREDIT {
        score_perc = score_perc.min(credit_f);
    } else if credit > FULL_CREDIT && points >= max_points {
        score_perc = credit_f * score_perc / 100.0;
    }

    if !allow_decrease {
        score_perc = score_perc.max(previous_score_perc);
    }

    ScoreUpdate {
        updated: points != previous_points || score_perc != previous_score_perc,
        points,
        score_perc,
    }
}

fn record_audit<A: AuditSink + ?Sized>(audit: &A, entry: &ScoreLogEntry) {
    if let Err(e) = audit.record_score_change(entry) {
        tracing::warn!(
            assessment_instance_id = entry.assessment_instance_id,
            error = %e,
            "failed to write score audit log"
        );
    }
}

fn load_instance<S: ScoreStore + ?Sized>(store: &S, id: i64) -> Result<AssessmentInstance> {
    store
        .select_assessment_instance(id)?
        .ok_or_else(|| GradeError::not_found("assessment instance", id))
}

/// Recompute and persist the score of an assessment instance.
///
/// Audit-log failures are logged and swallowed; they never fail the update.
#[tracing::instrument(skip(store, audit, config), fields(id = request.assessment_instance_id))]
pub fn compute_assessment_instance_score<S, A>(
    store: &S,
    audit: &A,
    request: &ScoreRequest,
    config: &ScoringConfig,
) -> Result<ScoreUpdate>
where
    S: ScoreStore + ?Sized,
    A: AuditSink + ?Sized,
{
    let id = request.assessment_instance_id;
    let instance = load_instance(store, id)?;

    let credit = match request.credit {
        Some(credit) => credit,
        None => store.select_last_submission_credit(id)?.unwrap_or(0),
    };
    validate_credit(credit, config)?;

    let zones = store.select_zone_points(id)?;
    let update = compute_score(&instance, &zones, credit, request.allow_decrease);

    store.update_assessment_instance_score(id, update.points, update.score_perc)?;

    tracing::debug!(
        old_points = instance.points,
        new_points = update.points,
        old_score_perc = instance.score_perc,
        new_score_perc = update.score_perc,
        credit,
        updated = update.updated,
        "recomputed assessment instance score"
    );

    if !request.only_log_if_score_updated || update.updated {
        let entry = ScoreLogEntry::update(
            &instance,
            ScoreState {
                points: update.points,
                score_perc: update.score_perc,
            },
            Some(credit),
            request.authn_user_id,
        );
        record_audit(audit, &entry);
    }

    Ok(update)
}

fn apply_override<S, A>(
    store: &S,
    audit: &A,
    instance: &AssessmentInstance,
    points: f64,
    score_perc: f64,
    authn_user_id: Option<i64>,
) -> Result<ScoreUpdate>
where
    S: ScoreStore + ?Sized,
    A: AuditSink + ?Sized,
{
    store.update_assessment_instance_score(instance.id, points, score_perc)?;

    let new_state = ScoreState { points, score_perc };
    record_audit(
        audit,
        &ScoreLogEntry::update(instance, new_state, None, authn_user_id),
    );

    Ok(ScoreUpdate {
        updated: points != instance.points || score_perc != instance.score_perc,
        points,
        score_perc,
    })
}

/// Set an instance's percentage directly; points follow from `max_points`.
pub fn set_assessment_instance_score_perc<S, A>(
    store: &S,
    audit: &A,
    id: i64,
    score_perc: f64,
    authn_user_id: Option<i64>,
) -> Result<ScoreUpdate>
where
    S: ScoreStore + ?Sized,
    A: AuditSink + ?Sized,
{
    if !score_perc.is_finite() {
        bail_invalid!("score_perc", score_perc);
    }
    let instance = load_instance(store, id)?;
    let points = score_perc * instance.max_points.unwrap_or(0.0) / 100.0;
    apply_override(store, audit, &instance, points, score_perc, authn_user_id)
}

/// Set an instance's points directly; the percentage follows from `max_points`.
pub fn set_assessment_instance_points<S, A>(
    store: &S,
    audit: &A,
    id: i64,
    points: f64,
    authn_user_id: Option<i64>,
) -> Result<ScoreUpdate>
where
    S: ScoreStore + ?Sized,
    A: AuditSink + ?Sized,
{
    if !points.is_finite() {
        bail_invalid!("points", points);
    }
    let instance = load_instance(store, id)?;
    let divisor = match instance.max_points {
        Some(max) if max > 0.0 => max,
        _ => 1.0,
    };
    let score_perc = points * 100.0 / divisor;
    apply_override(store, audit, &instance, points, score_perc, authn_user_id)
}

#[cfg(test)]
mod tests;
