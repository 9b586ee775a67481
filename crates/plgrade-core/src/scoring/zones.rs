//! Zone aggregation: best N of M questions per zone
//!
//! A zone counts only its `best_questions` highest-scoring questions and
//! never more than its own `max_points`. The aggregator treats the result
//! as opaque input; this module is what the SQLite store uses to produce it.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ZonePoints;
use crate::numeric::coerce_nan;

/// Scoring rule of one zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRule {
    pub zone_id: i64,
    /// Count only this many questions; all when absent
    pub best_questions: Option<u32>,
    /// Cap on the zone total; uncapped when absent
    pub max_points: Option<f64>,
}

impl ZoneRule {
    pub fn unlimited(zone_id: i64) -> Self {
        Self {
            zone_id,
            best_questions: None,
            max_points: None,
        }
    }
}

/// Current points of one instance question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneQuestionPoints {
    pub instance_question_id: i64,
    pub zone_id: i64,
    pub points: f64,
    pub max_points: f64,
}

fn best_by<F>(questions: &[&ZoneQuestionPoints], limit: Option<u32>, key: F) -> Vec<i64>
where
    F: Fn(&ZoneQuestionPoints) -> f64,
{
    let mut ranked: Vec<&ZoneQuestionPoints> = questions.to_vec();
    ranked.sort_by(|a, b| {
        key(b)
            .partial_cmp(&key(a))
            .unwrap_or(Ordering::Equal)
            .then(a.instance_question_id.cmp(&b.instance_question_id))
    });

    let take = limit.map(|n| n as usize).unwrap_or(ranked.len());
    ranked
        .into_iter()
        .take(take)
        .map(|q| q.instance_question_id)
        .collect()
}

fn capped(total: f64, cap: Option<f64>) -> f64 {
    match cap {
        Some(cap) => total.min(cap),
        None => total,
    }
}

/// Aggregate question points into per-zone totals.
///
/// Questions referencing a zone without a rule are scored as an unlimited
/// zone. Zones appear in ascending `zone_id` order; every rule yields an
/// entry, even with no questions.
pub fn aggregate_zone_points(
    rules: &[ZoneRule],
    questions: &[ZoneQuestionPoints],
) -> Vec<ZonePoints> {
    let mut by_zone: BTreeMap<i64, (ZoneRule, Vec<&ZoneQuestionPoints>)> = rules
        .iter()
        .map(|rule| (rule.zone_id, (rule.clone(), Vec::new())))
        .collect();

    for question in questions {
        by_zone
            .entry(question.zone_id)
            .or_insert_with(|| (ZoneRule::unlimited(question.zone_id), Vec::new()))
            .1
            .push(question);
    }

    by_zone
        .into_values()
        .map(|(rule, members)| {
            let lookup: BTreeMap<i64, &ZoneQuestionPoints> = members
                .iter()
                .map(|q| (q.instance_question_id, *q))
                .collect();

            let instance_question_ids =
                best_by(&members, rule.best_questions, |q| coerce_nan("points", q.points));
            let max_instance_question_ids = best_by(&members, rule.best_questions, |q| {
                coerce_nan("max_points", q.max_points)
            });

            let points: f64 = instance_question_ids
                .iter()
                .filter_map(|id| lookup.get(id))
                .map(|q| coerce_nan("points", q.points))
                .sum();
            let max_points: f64 = max_instance_question_ids
                .iter()
                .filter_map(|id| lookup.get(id))
                .map(|q| coerce_nan("max_points", q.max_points))
                .sum();

            ZonePoints {
                zone_id: rule.zone_id,
                points: capped(points, rule.max_points),
                instance_question_ids,
                max_points: capped(max_points, rule.max_points),
                max_instance_question_ids,
            }
        })
        .collect()
}
