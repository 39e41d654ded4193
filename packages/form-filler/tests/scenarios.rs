//! End-to-end runs of the form filler against mock collaborators.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use form_filler::testing::{MockEmbedder, MockGenerator, MockParser};
use form_filler::{
    Answer, CancellationToken, DocumentRef, FillConfig, FillOutcome, FillRequest, FormFillError,
    FormFiller, Segment, VectorIndex,
};

const SOURCE: &str = "visa.md";
const FORM: &str = "form.md";
const IDENTITY: &str = "visa-1";

const FIELDS_JSON: &str = r#"{"fields": ["Full name", "Date of birth", "Nationality"]}"#;

fn parser() -> MockParser {
    MockParser::new()
        .with_document(
            SOURCE,
            vec![
                Segment::new("Full name: Ada Lovelace"),
                Segment::new("Born 10 December 1815 in London"),
                Segment::new("Citizenship: British"),
            ],
        )
        .with_document(
            FORM,
            vec![Segment::new("1. Full name ______\n2. Date of birth ______\n3. Nationality ______")],
        )
}

/// Pattern matching only the retrieval prompt for `field`.
fn ask(field: &str) -> String {
    format!("applicant? {field}")
}

fn filler(parser: Arc<MockParser>, generator: Arc<MockGenerator>, dir: &Path) -> FormFiller {
    FormFiller::new(
        parser,
        Arc::new(MockEmbedder::new()),
        generator,
        FillConfig::default().with_storage_dir(dir),
    )
}

fn request() -> FillRequest {
    FillRequest::new(DocumentRef::new(SOURCE, IDENTITY), FORM)
}

fn filled(outcome: FillOutcome) -> form_filler::FilledForm {
    match outcome {
        FillOutcome::Filled(form) => form,
        FillOutcome::Unstructured { raw } => panic!("expected a filled form, got raw text: {raw}"),
    }
}

#[tokio::test]
async fn test_all_fields_answered() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(
        MockGenerator::new()
            .with_response("parsed form", FIELDS_JSON)
            .with_response(
                "<responses>",
                r#"{"Full name": "Ada Lovelace", "Date of birth": "10 December 1815", "Nationality": "British"}"#,
            )
            .with_response(ask("Full name"), "Ada Lovelace")
            .with_response(ask("Date of birth"), "10 December 1815")
            .with_response(ask("Nationality"), "British"),
    );

    let outcome = filler(Arc::new(parser()), generator.clone(), dir.path())
        .process(request())
        .await
        .unwrap();
    let form = filled(outcome);

    assert_eq!(
        form.fields().collect::<Vec<_>>(),
        vec!["Full name", "Date of birth", "Nationality"]
    );
    assert_eq!(form.answered(), 3);
    assert_eq!(form.get("Nationality"), Some(&Answer::value("British")));
    assert_eq!(generator.prompts_containing("<responses>"), 1);
}

#[tokio::test]
async fn test_failed_query_becomes_blank() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(
        MockGenerator::new()
            .with_response("parsed form", FIELDS_JSON)
            .with_response(
                "<responses>",
                r#"{"Full name": "Ada Lovelace", "Date of birth": "10 December 1815", "Nationality": ""}"#,
            )
            .with_response(ask("Full name"), "Ada Lovelace")
            .with_response(ask("Date of birth"), "10 December 1815")
            .failing_on(ask("Nationality"), "upstream 502"),
    );

    let outcome = filler(Arc::new(parser()), generator.clone(), dir.path())
        .process(request())
        .await
        .unwrap();
    let form = filled(outcome);

    assert_eq!(form.len(), 3);
    assert_eq!(form.answered(), 2);
    assert_eq!(form.get("Nationality"), Some(&Answer::Blank));

    let synthesis = generator
        .prompts()
        .into_iter()
        .find(|p| p.contains("<responses>"))
        .unwrap();
    assert!(synthesis.contains("Field: Nationality\nResponse: (no information found)"));

    let json = serde_json::to_value(&form).unwrap();
    assert_eq!(json["Nationality"], "");
}

#[tokio::test]
async fn test_panicking_query_becomes_blank() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(
        MockGenerator::new()
            .with_response("parsed form", FIELDS_JSON)
            .with_response("<responses>", r#"{"Full name": "Ada Lovelace"}"#)
            .with_response(ask("Full name"), "Ada Lovelace")
            .panicking_on(ask("Date of birth"))
            .with_response(ask("Nationality"), "Not provided in the document."),
    );

    let outcome = filler(Arc::new(parser()), generator, dir.path())
        .process(request())
        .await
        .unwrap();
    let form = filled(outcome);

    // Omitted keys fall back to the collected (blank) responses
    assert_eq!(form.len(), 3);
    assert_eq!(form.get("Full name"), Some(&Answer::value("Ada Lovelace")));
    assert_eq!(form.get("Date of birth"), Some(&Answer::Blank));
    assert_eq!(form.get("Nationality"), Some(&Answer::Blank));
}

#[tokio::test]
async fn test_fenced_field_list() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(
        MockGenerator::new()
            .with_response("parsed form", format!("```json\n{FIELDS_JSON}\n```"))
            .with_response("<responses>", r#"{"Full name": "Ada Lovelace"}"#)
            .with_default_response("Ada Lovelace"),
    );

    let outcome = filler(Arc::new(parser()), generator, dir.path())
        .process(request())
        .await
        .unwrap();

    assert_eq!(filled(outcome).len(), 3);
}

#[tokio::test]
async fn test_unparsable_synthesis_returns_raw_text() {
    let dir = tempfile::tempdir().unwrap();
    let raw = "Full name is Ada Lovelace, the rest I could not find.";
    let generator = Arc::new(
        MockGenerator::new()
            .with_response("parsed form", FIELDS_JSON)
            .with_response("<responses>", raw)
            .with_default_response("Ada Lovelace"),
    );

    let outcome = filler(Arc::new(parser()), generator, dir.path())
        .process(request())
        .await
        .unwrap();

    assert!(outcome.is_degraded());
    assert_eq!(outcome, FillOutcome::Unstructured { raw: raw.to_string() });
}

#[tokio::test]
async fn test_reuse_without_persisted_index_builds() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(
        MockGenerator::new()
            .with_response("parsed form", FIELDS_JSON)
            .with_response("<responses>", "{}"),
    );

    let outcome = filler(Arc::new(parser()), generator, dir.path())
        .process(request().with_reuse_index(true))
        .await
        .unwrap();

    assert_eq!(filled(outcome).len(), 3);
    assert!(VectorIndex::path_for(dir.path(), IDENTITY).exists());
}

#[tokio::test]
async fn test_second_run_reuses_persisted_index() {
    let dir = tempfile::tempdir().unwrap();
    let generator = || {
        Arc::new(
            MockGenerator::new()
                .with_response("parsed form", FIELDS_JSON)
                .with_response("<responses>", "{}"),
        )
    };

    let first = Arc::new(parser());
    filler(first.clone(), generator(), dir.path())
        .process(request())
        .await
        .unwrap();
    assert!(first.parsed_paths().contains(&PathBuf::from(SOURCE)));

    let second = Arc::new(parser());
    filler(second.clone(), generator(), dir.path())
        .process(request())
        .await
        .unwrap();
    assert_eq!(second.parsed_paths(), vec![PathBuf::from(FORM)]);
}

#[tokio::test]
async fn test_corrupt_index_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = VectorIndex::path_for(dir.path(), IDENTITY);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();

    let generator = Arc::new(MockGenerator::new().with_response("parsed form", FIELDS_JSON));
    let result = filler(Arc::new(parser()), generator.clone(), dir.path())
        .process(request())
        .await;

    assert!(matches!(result, Err(FormFillError::StorageCorrupt { .. })));
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn test_no_fields_aborts_before_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(
        MockGenerator::new()
            .with_response("parsed form", "I could not find any fields.")
            .with_default_response("should not be asked"),
    );

    let result = filler(Arc::new(parser()), generator.clone(), dir.path())
        .process(request())
        .await;

    assert!(matches!(result, Err(FormFillError::FieldExtraction { .. })));
    assert_eq!(generator.prompts_containing("Query:"), 0);
}

#[tokio::test]
async fn test_missing_input_is_rejected_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let parser = Arc::new(parser());
    let filler = filler(parser.clone(), Arc::new(MockGenerator::new()), dir.path());

    let result = filler.process(FillRequest::default()).await;
    assert!(matches!(result, Err(FormFillError::InputValidation { .. })));

    let result = filler
        .process(FillRequest {
            source: Some(DocumentRef::new(SOURCE, IDENTITY)),
            ..Default::default()
        })
        .await;
    assert!(matches!(result, Err(FormFillError::InputValidation { .. })));

    assert_eq!(parser.parse_count(), 0);
}

#[tokio::test]
async fn test_timeout_returns_no_map() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(
        MockGenerator::new()
            .with_response("parsed form", FIELDS_JSON)
            .with_delay(Duration::from_secs(5)),
    );
    let filler = FormFiller::new(
        Arc::new(parser()),
        Arc::new(MockEmbedder::new()),
        generator,
        FillConfig::default()
            .with_storage_dir(dir.path())
            .with_run_timeout(Duration::from_millis(50)),
    );

    let result = filler.process(request()).await;
    assert!(matches!(result, Err(FormFillError::Timeout { .. })));
}

#[tokio::test]
async fn test_timeout_aborts_outstanding_field_queries() {
    let dir = tempfile::tempdir().unwrap();
    let slow = Duration::from_millis(300);
    let generator = Arc::new(
        MockGenerator::new()
            .with_response("parsed form", FIELDS_JSON)
            .with_response("<responses>", "{}")
            .with_slow_response(ask("Full name"), "Ada Lovelace", slow)
            .with_slow_response(ask("Date of birth"), "10 December 1815", slow)
            .with_slow_response(ask("Nationality"), "British", slow),
    );
    let filler = FormFiller::new(
        Arc::new(parser()),
        Arc::new(MockEmbedder::new()),
        generator.clone(),
        FillConfig::default()
            .with_storage_dir(dir.path())
            .with_run_timeout(Duration::from_millis(100)),
    );

    let result = filler.process(request()).await;
    assert!(matches!(result, Err(FormFillError::Timeout { .. })));
    assert_eq!(generator.prompts_containing("Query:"), 3);

    tokio::time::sleep(slow * 2).await;

    // Only the field-list call ever returned; the field queries died with the run
    assert_eq!(generator.completed(), 1);
    assert_eq!(generator.prompts_containing("<responses>"), 0);
}

#[tokio::test]
async fn test_cancelled_run() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(
        MockGenerator::new()
            .with_response("parsed form", FIELDS_JSON)
            .with_delay(Duration::from_secs(5)),
    );
    let filler = filler(Arc::new(parser()), generator, dir.path());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = filler.process_with_cancel(request(), cancel).await;
    assert!(matches!(result, Err(FormFillError::Cancelled)));
}

#[tokio::test]
async fn test_foreign_filter_leaves_every_field_blank() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(
        MockGenerator::new()
            .with_response("parsed form", FIELDS_JSON)
            .with_response("<responses>", "{}")
            .with_default_response("Ada Lovelace"),
    );

    let outcome = filler(Arc::new(parser()), generator.clone(), dir.path())
        .process(request().with_filter_identities(["someone-else"]))
        .await
        .unwrap();
    let form = filled(outcome);

    assert_eq!(form.len(), 3);
    assert_eq!(form.answered(), 0);
    assert_eq!(generator.prompts_containing("Query:"), 0);
}

#[tokio::test]
async fn test_synthesis_waits_for_every_field() {
    let dir = tempfile::tempdir().unwrap();
    let names: Vec<String> = (1..=20).map(|i| format!("Field {i:02}")).collect();
    let field_list = serde_json::json!({ "fields": names }).to_string();

    let mut generator = MockGenerator::new()
        .with_response("parsed form", field_list)
        .with_response("<responses>", "{}");
    for name in &names {
        generator = generator.with_response(ask(name), format!("value of {name}"));
    }
    let generator = Arc::new(generator);

    let parser = Arc::new(
        MockParser::new()
            .with_text(SOURCE, &["Everything about the applicant"])
            .with_text(FORM, &["A long form"]),
    );

    let outcome = filler(parser, generator.clone(), dir.path())
        .process(request())
        .await
        .unwrap();
    let form = filled(outcome);

    assert_eq!(form.len(), 20);
    assert_eq!(form.answered(), 20);
    assert_eq!(form.get("Field 07"), Some(&Answer::value("value of Field 07")));

    // Exactly one synthesis call, and it saw all twenty responses
    assert_eq!(generator.prompts_containing("<responses>"), 1);
    let synthesis = generator
        .prompts()
        .into_iter()
        .find(|p| p.contains("<responses>"))
        .unwrap();
    for name in &names {
        assert!(synthesis.contains(&format!("Field: {name}\nResponse: value of {name}")));
    }
}

#[tokio::test]
async fn test_duplicate_field_names_counted_once() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(
        MockGenerator::new()
            .with_response(
                "parsed form",
                r#"{"fields": ["Full name", "Full name", "Nationality"]}"#,
            )
            .with_response("<responses>", r#"{"Full name": "Ada Lovelace", "Nationality": "British"}"#)
            .with_default_response("Ada Lovelace"),
    );

    let outcome = filler(Arc::new(parser()), generator.clone(), dir.path())
        .process(request())
        .await
        .unwrap();

    assert_eq!(filled(outcome).len(), 2);
    assert_eq!(generator.prompts_containing("Query:"), 2);
}
