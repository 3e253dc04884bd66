//! End-to-end runs over small teacher exports with a scripted inference backend.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use teachmap::config::parse_run_timestamp;
use teachmap::error::{InferenceError, InferenceResult};
use teachmap::parser::output_csv_string;
use teachmap::{
    transform_bytes, transform_csv, Field, FieldStatus, InferenceBackend, InferenceContext,
    PipelineError, RetentionPolicy, RetryPolicy, RunConfig,
};

const SHEET: &str = "\
Input\tOutput
ID\tteacher_id
First (FP) + Last (FV)\tName (b)
Headline (FS)\tHeadline (d)
-\tSubject (c)
-\tbio
Country (B)\tcountry
City (A)\tcity
Linkedin (L)\tLinkedin URL
-\tPreferred age range
Years (Y)\tYears of experience
-\tNationality
Source\tSource ID
";

const TEACHERS: &str = "\
ID,First,Last,Headline,Country,City,Linkedin,Years,Source
3F2504E0-4F89-11D3-9A0C-0305E82C3301,John,Smith,slow Maths teacher,UAE,Dubai,https://linkedin.com/in/jsmith,5-10 years,src-1
,Jane,,Physics teacher,UK,London,https://linkedin.com/in/jane,7,src-2
T-1234,Ann,Lee,Chemistry teacher,India,Mumbai,https://linkedin.com/in/ann,3,src-3
,Bob,Ray,FAIL teacher,USA,Austin,https://linkedin.com/in/bob,4,src-4
";

/// Answers every field from a fixed table. Headlines containing `FAIL`
/// always get a 503; `slow` ones answer late.
struct Scripted {
    calls: AtomicUsize,
}

impl Scripted {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl InferenceBackend for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn max_batch(&self) -> usize {
        8
    }

    async fn infer(
        &self,
        fields: &[Field],
        context: &InferenceContext,
    ) -> InferenceResult<BTreeMap<Field, String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let headline = context.get("headline").unwrap_or("");

        if headline.contains("FAIL") {
            return Err(InferenceError::Status {
                status: 503,
                message: "overloaded".to_string(),
            });
        }
        if headline.contains("slow") {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        Ok(fields
            .iter()
            .filter_map(|f| {
                let answer = match f {
                    Field::Subject => "Mathematics, Physics",
                    Field::Bio => "Teaches exam classes with a focus on problem solving.",
                    Field::PreferredGradeLevel => "High School",
                    Field::Nationality => "Irish",
                    _ => return None,
                };
                Some((*f, answer.to_string()))
            })
            .collect())
    }
}

fn config() -> RunConfig {
    RunConfig::default()
        .with_run_timestamp(parse_run_timestamp("2026-01-01T00:00:00Z").unwrap())
        .with_concurrency(4)
        .with_retry(RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            backoff_factor: 2.0,
            attempt_timeout: Duration::from_secs(2),
        })
}

#[tokio::test]
async fn test_full_run_resolves_and_validates() {
    let backend = Scripted::new();
    let outcome = transform_bytes(TEACHERS.as_bytes(), SHEET, &config(), backend.clone())
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 4);
    let john = &outcome.records[0];
    assert!(john.validation.passed, "{:?}", john.validation.errors);
    assert_eq!(john.record.get(Field::TeacherId), "3f2504e0-4f89-11d3-9a0c-0305e82c3301");
    assert_eq!(john.record.get(Field::Name), "John Smith");
    assert_eq!(john.record.get(Field::CurrentLocationCountry), "United Arab Emirates");
    assert_eq!(john.record.get(Field::YearsOfTeachingExperience), "5");
    assert_eq!(john.record.get(Field::Subject), "Mathematics, Physics");
    assert_eq!(john.record.get(Field::SubjectsCount), "2");
    assert_eq!(john.record.get(Field::CreatedAt), "2026-01-01T00:00:00Z");
    assert_eq!(john.record.get(Field::SourceId), "src-1");
    assert!(john.diagnostics.is_empty());
}

#[tokio::test]
async fn test_combined_rule_elides_empty_part() {
    let outcome = transform_bytes(TEACHERS.as_bytes(), SHEET, &config(), Scripted::new())
        .await
        .unwrap();

    let jane = &outcome.records[1];
    assert_eq!(jane.record.get(Field::Name), "Jane");
    assert_eq!(jane.record.get(Field::CurrentLocationCountry), "United Kingdom");
    // No id column value: a synthesized UUID passes the contract.
    assert_eq!(jane.validation.status(Field::TeacherId), FieldStatus::Valid);
    assert!(jane.validation.passed);
}

#[tokio::test]
async fn test_malformed_id_only_affects_that_field() {
    let outcome = transform_bytes(TEACHERS.as_bytes(), SHEET, &config(), Scripted::new())
        .await
        .unwrap();

    let ann = &outcome.records[2];
    assert_eq!(ann.validation.status(Field::TeacherId), FieldStatus::Malformed);
    assert_eq!(ann.validation.errors.len(), 1);
    assert_eq!(ann.validation.status(Field::Name), FieldStatus::Valid);
    assert_eq!(ann.validation.status(Field::Nationality), FieldStatus::Valid);
    assert!(!ann.validation.passed);
}

#[tokio::test]
async fn test_exhausted_retries_stay_with_one_record() {
    let backend = Scripted::new();
    let outcome = transform_bytes(TEACHERS.as_bytes(), SHEET, &config(), backend.clone())
        .await
        .unwrap();

    let bob = &outcome.records[3];
    assert_eq!(bob.record.get(Field::Subject), "");
    assert_eq!(bob.record.get(Field::Nationality), "");
    assert_eq!(bob.validation.status(Field::Subject), FieldStatus::Missing);
    assert_eq!(bob.validation.status(Field::Nationality), FieldStatus::Missing);
    assert_eq!(bob.record.get(Field::SubjectsCount), "0");

    // The others still got their answers.
    assert!(outcome.records[..2].iter().all(|r| r.validation.passed));

    let stats = &outcome.summary.inference;
    assert_eq!(backend.calls.load(Ordering::SeqCst), 6);
    assert_eq!(stats.calls, 6);
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.unresolved, 4);

    assert_eq!(outcome.summary.records, 4);
    assert_eq!(outcome.summary.passed, 2);
    assert_eq!(outcome.summary.failed, 2);
}

#[tokio::test]
async fn test_output_keeps_input_order() {
    let outcome = transform_bytes(TEACHERS.as_bytes(), SHEET, &config(), Scripted::new())
        .await
        .unwrap();

    let names: Vec<&str> = outcome.records.iter().map(|r| r.record.get(Field::Name)).collect();
    assert_eq!(names, vec!["John Smith", "Jane", "Ann Lee", "Bob Ray"]);
    let indices: Vec<usize> = outcome.records.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_same_run_timestamp_is_idempotent() {
    let first = transform_bytes(TEACHERS.as_bytes(), SHEET, &config(), Scripted::new())
        .await
        .unwrap();
    let second = transform_bytes(TEACHERS.as_bytes(), SHEET, &config(), Scripted::new())
        .await
        .unwrap();

    assert_eq!(
        output_csv_string(&first.emitted()).unwrap(),
        output_csv_string(&second.emitted()).unwrap()
    );
    assert_eq!(first.summary, second.summary);
}

#[tokio::test]
async fn test_identical_contexts_share_one_call() {
    let mut csv = String::from("Row,First,Last,Headline,Country,City,Linkedin,Years,Source\n");
    for i in 0..12 {
        csv.push_str(&format!(
            "{},Jane,Doe,Physics teacher,UK,London,https://linkedin.com/in/jane,7,src-1\n",
            i
        ));
    }

    let backend = Scripted::new();
    let config = config().with_concurrency(12);
    let outcome = transform_bytes(csv.as_bytes(), SHEET, &config, backend.clone())
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 12);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.summary.inference.lookups, 48);
    assert_eq!(outcome.summary.inference.cache_hits, 44);
    assert!(outcome
        .records
        .iter()
        .all(|r| r.record.get(Field::Nationality) == "Irish"));
}

#[tokio::test]
async fn test_drop_failing_withholds_records() {
    let config = config().with_retention(RetentionPolicy::DropFailing);
    let outcome = transform_bytes(TEACHERS.as_bytes(), SHEET, &config, Scripted::new())
        .await
        .unwrap();

    let emitted = outcome.emitted();
    assert_eq!(emitted.len(), 2);
    assert_eq!(outcome.summary.dropped, 2);
    assert_eq!(emitted[0].get(Field::Name), "John Smith");
    assert_eq!(emitted[1].get(Field::Name), "Jane");
}

#[tokio::test]
async fn test_missing_source_column_is_a_diagnostic() {
    let csv = "First,Last,Headline\nJohn,Smith,Maths teacher\n";
    let outcome = transform_bytes(csv.as_bytes(), SHEET, &config(), Scripted::new())
        .await
        .unwrap();

    let record = &outcome.records[0];
    assert_eq!(record.record.get(Field::Name), "John Smith");
    assert!(record
        .diagnostics
        .iter()
        .any(|d| serde_json::to_string(d).unwrap().contains("\"sourceColumn\":\"Country\"")));
    // Absent columns are not sent to inference.
    assert_eq!(record.validation.status(Field::CurrentLocationCountry), FieldStatus::Missing);
}

#[tokio::test]
async fn test_malformed_sheet_stops_the_run() {
    let backend = Scripted::new();
    let sheet = format!("{}-\tname\n", SHEET);
    let err = transform_bytes(TEACHERS.as_bytes(), &sheet, &config(), backend.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Spec(_)));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transform_csv_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("teachers.csv");
    std::fs::write(&path, TEACHERS.replace(',', ";")).unwrap();

    let outcome = transform_csv(&path, SHEET, &config(), Scripted::new()).await.unwrap();
    assert_eq!(outcome.csv_info.delimiter, ';');
    assert_eq!(outcome.records.len(), 4);

    let report = outcome.report_json().unwrap();
    assert!(report.contains("\"failed\": 2"));
}
