//! Mastery aggregation over a learner's attempt records.
//!
//! Everything here is a pure function of its inputs. Grouping uses ordered
//! maps so results are deterministic for a fixed record set.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::models::{
    mastery::{
        ConceptMastery, MasteryBucket, MasteryPoint, MasterySummary, OverallStats, ProgressStats,
        ScopedAccuracy, WeakConcept, WEAK_CONCEPT_THRESHOLD,
    },
    progress::{AttemptStatus, ProgressRecord},
    question::QuestionRef,
};

/// An attempt record joined with its question reference data.
#[derive(Debug, Clone, Copy)]
pub struct JoinedAttempt<'a> {
    pub record: &'a ProgressRecord,
    pub question: &'a QuestionRef,
}

impl JoinedAttempt<'_> {
    fn counts(&self) -> bool {
        self.record.status == AttemptStatus::Completed
    }
}

/// Joins records to questions by id. Records whose question is gone from the
/// bank are dropped.
pub fn join<'a>(
    records: &'a [ProgressRecord],
    questions: &'a [QuestionRef],
) -> Vec<JoinedAttempt<'a>> {
    let by_id: HashMap<&str, &QuestionRef> =
        questions.iter().map(|q| (q.id.as_str(), q)).collect();

    records
        .iter()
        .filter_map(|record| {
            by_id
                .get(record.question_id.as_str())
                .map(|question| JoinedAttempt { record, question })
        })
        .collect()
}

/// `correct / total * 100`, defined as 0 for an empty denominator.
pub fn percentage(correct: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (f64::from(correct) / f64::from(total) * 100.0).clamp(0.0, 100.0)
}

pub fn scoped_accuracy(attempts: &[JoinedAttempt<'_>], subject: &str, chapter: &str) -> ScopedAccuracy {
    let (completed, correct) = attempts
        .iter()
        .filter(|a| a.counts() && a.question.in_scope(subject, chapter))
        .fold((0u32, 0u32), |(completed, correct), a| {
            (completed + 1, correct + u32::from(a.record.is_correct))
        });

    ScopedAccuracy {
        questions_completed: completed,
        correct,
        accuracy: percentage(correct, completed),
    }
}

#[derive(Default)]
struct ConceptTally {
    total: u32,
    correct: u32,
    attempts: u32,
    time_spent: i64,
}

/// Per-tag mastery, weakest first. A question with N tags feeds all N buckets.
pub fn concept_mastery(attempts: &[JoinedAttempt<'_>]) -> Vec<ConceptMastery> {
    let mut tallies: BTreeMap<&str, ConceptTally> = BTreeMap::new();

    for attempt in attempts.iter().filter(|a| a.counts()) {
        for tag in &attempt.question.tags {
            let tally = tallies.entry(tag.as_str()).or_default();
            tally.total += 1;
            tally.correct += u32::from(attempt.record.is_correct);
            tally.attempts += attempt.record.attempts;
            tally.time_spent += attempt.record.time_spent;
        }
    }

    let mut concepts: Vec<ConceptMastery> = tallies
        .into_iter()
        .map(|(concept, tally)| ConceptMastery {
            concept: concept.to_string(),
            total: tally.total,
            correct: tally.correct,
            attempts: tally.attempts,
            average_time_spent: average(tally.time_spent, tally.total),
            mastery: percentage(tally.correct, tally.total),
        })
        .collect();

    // Stable sort keeps the alphabetical order among equal mastery values
    concepts.sort_by(|a, b| a.mastery.total_cmp(&b.mastery));
    concepts
}

/// Concepts under the weak threshold, weakest first.
pub fn weak_concepts(concepts: &[ConceptMastery]) -> Vec<WeakConcept> {
    let mut weak: Vec<WeakConcept> = concepts
        .iter()
        .filter(|c| c.mastery < WEAK_CONCEPT_THRESHOLD)
        .map(|c| WeakConcept {
            concept: c.concept.clone(),
            mastery: c.mastery,
            total: c.total,
            correct: c.correct,
        })
        .collect();

    weak.sort_by(|a, b| {
        a.mastery
            .total_cmp(&b.mastery)
            .then_with(|| a.concept.cmp(&b.concept))
    });
    weak
}

#[derive(Default)]
struct DayTally {
    total: u32,
    correct: u32,
    attempts: u32,
}

/// Daily mastery of completed attempts last submitted at or after `since`,
/// chronologically ascending.
pub fn mastery_series(attempts: &[JoinedAttempt<'_>], since: DateTime<Utc>) -> Vec<MasteryPoint> {
    let mut days: BTreeMap<chrono::NaiveDate, DayTally> = BTreeMap::new();

    for attempt in attempts
        .iter()
        .filter(|a| a.counts() && a.record.last_attempt_at >= since)
    {
        let tally = days
            .entry(attempt.record.last_attempt_at.date_naive())
            .or_default();
        tally.total += 1;
        tally.correct += u32::from(attempt.record.is_correct);
        tally.attempts += attempt.record.attempts;
    }

    days.into_iter()
        .map(|(day, tally)| MasteryPoint {
            date: day.format("%Y-%m-%d").to_string(),
            correct_count: tally.correct,
            total_count: tally.total,
            average_attempts: average(i64::from(tally.attempts), tally.total),
            mastery: percentage(tally.correct, tally.total),
        })
        .collect()
}

fn buckets<'a, F>(attempts: &[JoinedAttempt<'a>], key: F) -> Vec<MasteryBucket>
where
    F: Fn(&JoinedAttempt<'a>) -> &'a str,
{
    let mut grouped: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    for attempt in attempts.iter().filter(|a| a.counts()) {
        let entry = grouped.entry(key(attempt)).or_default();
        entry.0 += 1;
        entry.1 += u32::from(attempt.record.is_correct);
    }

    grouped
        .into_iter()
        .map(|(key, (total, correct))| MasteryBucket {
            key: key.to_string(),
            total,
            correct,
            mastery: percentage(correct, total),
        })
        .collect()
}

pub fn by_subject(attempts: &[JoinedAttempt<'_>]) -> Vec<MasteryBucket> {
    buckets(attempts, |a| a.question.subject.as_str())
}

pub fn by_chapter(attempts: &[JoinedAttempt<'_>]) -> Vec<MasteryBucket> {
    buckets(attempts, |a| a.question.chapter.as_str())
}

pub fn summarize(attempts: &[JoinedAttempt<'_>]) -> MasterySummary {
    let (completed, correct) = attempts
        .iter()
        .filter(|a| a.counts())
        .fold((0u32, 0u32), |(completed, correct), a| {
            (completed + 1, correct + u32::from(a.record.is_correct))
        });

    let by_concept = concept_mastery(attempts);
    let weak_concepts = weak_concepts(&by_concept);

    MasterySummary {
        overall: percentage(correct, completed),
        by_subject: by_subject(attempts),
        by_chapter: by_chapter(attempts),
        by_concept,
        weak_concepts,
    }
}

/// Dashboard totals. `overall` covers every record regardless of status; the
/// buckets follow the mastery rules.
pub fn progress_stats(records: &[ProgressRecord], attempts: &[JoinedAttempt<'_>]) -> ProgressStats {
    let total_questions = u32::try_from(records.len()).unwrap_or(u32::MAX);
    let correct_answers = records
        .iter()
        .filter(|r| r.status == AttemptStatus::Completed && r.is_correct)
        .count();
    let total_attempts: u32 = records.iter().map(|r| r.attempts).sum();
    let time_spent: i64 = records.iter().map(|r| r.time_spent).sum();

    ProgressStats {
        overall: OverallStats {
            total_questions,
            correct_answers: u32::try_from(correct_answers).unwrap_or(u32::MAX),
            total_attempts,
            average_time_spent: average(time_spent, total_questions),
        },
        by_subject: by_subject(attempts),
        by_chapter: by_chapter(attempts),
    }
}

fn average(sum: i64, count: u32) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum as f64 / f64::from(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn question(id: &str, chapter: &str, tags: &[&str]) -> QuestionRef {
        QuestionRef {
            id: id.to_string(),
            subject: "Calculus".to_string(),
            chapter: chapter.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn record(question_id: &str, status: AttemptStatus, correct: bool, at: DateTime<Utc>) -> ProgressRecord {
        ProgressRecord {
            id: format!("p-{}", question_id),
            user_id: "u1".to_string(),
            question_id: question_id.to_string(),
            status,
            is_correct: correct,
            user_answer: "42".to_string(),
            time_spent: 60,
            attempts: 1,
            last_attempt_at: at,
            difficulty: None,
            notes: None,
            created_at: at,
        }
    }

    fn fixture() -> (Vec<ProgressRecord>, Vec<QuestionRef>) {
        let day1 = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let day2 = day1 + Duration::days(1);
        let questions = vec![
            question("q1", "Limits", &["limits", "continuity"]),
            question("q2", "Limits", &["limits"]),
            question("q3", "Derivatives", &["chain-rule"]),
            question("q4", "Derivatives", &["chain-rule"]),
        ];
        let records = vec![
            record("q1", AttemptStatus::Completed, true, day1),
            record("q2", AttemptStatus::Completed, false, day1),
            record("q3", AttemptStatus::Completed, true, day2),
            record("q4", AttemptStatus::Skipped, false, day2),
        ];
        (records, questions)
    }

    #[test]
    fn empty_denominator_is_zero() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(3, 4), 75.0);

        let summary = summarize(&[]);
        assert_eq!(summary.overall, 0.0);
        assert!(summary.weak_concepts.is_empty());
        assert!(summary.by_concept.is_empty());
    }

    #[test]
    fn scoped_accuracy_counts_completed_in_scope_only() {
        let (records, questions) = fixture();
        let joined = join(&records, &questions);

        let limits = scoped_accuracy(&joined, "Calculus", "Limits");
        assert_eq!(limits.questions_completed, 2);
        assert_eq!(limits.correct, 1);
        assert_eq!(limits.accuracy, 50.0);

        // q4 was skipped and does not count
        let derivatives = scoped_accuracy(&joined, "Calculus", "Derivatives");
        assert_eq!(derivatives.questions_completed, 1);
        assert_eq!(derivatives.accuracy, 100.0);

        let other = scoped_accuracy(&joined, "Algebra", "Limits");
        assert_eq!(other.questions_completed, 0);
        assert_eq!(other.accuracy, 0.0);
    }

    #[test]
    fn tags_fan_out_and_weak_concepts_are_sorted() {
        let (records, questions) = fixture();
        let joined = join(&records, &questions);

        let concepts = concept_mastery(&joined);
        let names: Vec<&str> = concepts.iter().map(|c| c.concept.as_str()).collect();
        assert_eq!(names, vec!["limits", "chain-rule", "continuity"]);
        assert!(concepts.iter().all(|c| (0.0..=100.0).contains(&c.mastery)));

        let limits = &concepts[0];
        assert_eq!((limits.total, limits.correct), (2, 1));
        assert_eq!(limits.average_time_spent, 60.0);

        let weak = weak_concepts(&concepts);
        assert_eq!(weak.len(), 1);
        assert_eq!(weak[0].concept, "limits");
        assert_eq!(weak[0].mastery, 50.0);
    }

    #[test]
    fn series_groups_by_day_ascending() {
        let (records, questions) = fixture();
        let joined = join(&records, &questions);
        let since = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();

        let series = mastery_series(&joined, since);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, "2026-03-01");
        assert_eq!(series[0].total_count, 2);
        assert_eq!(series[0].mastery, 50.0);
        assert_eq!(series[1].date, "2026-03-02");
        assert_eq!(series[1].mastery, 100.0);

        let later = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        assert_eq!(mastery_series(&joined, later).len(), 1);
    }

    #[test]
    fn summary_is_deterministic() {
        let (records, questions) = fixture();
        let mut reversed = records.clone();
        reversed.reverse();

        let a = summarize(&join(&records, &questions));
        let b = summarize(&join(&reversed, &questions));
        assert_eq!(a, b);
        assert!((a.overall - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn stats_cover_every_record() {
        let (records, questions) = fixture();
        let joined = join(&records, &questions);

        let stats = progress_stats(&records, &joined);
        assert_eq!(stats.overall.total_questions, 4);
        assert_eq!(stats.overall.correct_answers, 2);
        assert_eq!(stats.overall.total_attempts, 4);
        assert_eq!(stats.by_chapter.len(), 2);
        assert_eq!(stats.by_subject[0].key, "Calculus");
        assert_eq!(stats.by_subject[0].total, 3);
    }
}
