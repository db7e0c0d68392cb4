use pulse_core::errors::ParseError;
use pulse_core::fingerprint::{MAX_TRACE_CHARS, TRUNCATION_MARKER};
use pulse_core::model::CaseStatus;
use pulse_core::parser::parse;

fn fixture(name: &str) -> Vec<u8> {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("read {}: {}", path.display(), e))
}

#[test]
fn test_nested_suites_fixture() {
    let report = parse(&fixture("nested_suites.xml")).expect("parse");

    assert_eq!(report.total_tests, 6);
    assert_eq!(
        (report.pass_count, report.fail_count, report.skip_count),
        (1, 4, 1)
    );
    assert_eq!(report.total_duration, 12.75);
    assert_eq!(
        report.timestamp.map(|t| t.to_rfc3339()),
        Some("2025-02-11T06:30:00+00:00".to_string())
    );

    // three distinct failures; the stale element trace shows up twice
    let ids: Vec<_> = report.failure_catalog.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["ERR_1", "ERR_2", "ERR_3"]);
    let counts: Vec<_> = report
        .failure_catalog
        .iter()
        .map(|f| f.occurrence_count)
        .collect();
    assert_eq!(counts, vec![1, 2, 1]);

    let locked = &report.failure_catalog[0];
    assert_eq!(locked.message, "expected <Locked> but was <Welcome>");
    assert_eq!(
        locked.stack_trace,
        "org.opentest4j.AssertionFailedError: expected <Locked> but was <Welcome>\n\tat e2e.auth.LoginTest.lockedAccount(LoginTest.java:57)"
    );

    // <failure> wins over <error> on the same case
    assert_eq!(report.failure_catalog[1].message, "wins");
    assert_eq!(report.failure_catalog[2].stack_trace, "");
    assert_eq!(report.failure_catalog[2].message, "Search returned nothing");

    let by_name = &report.failed_tests[1];
    assert_eq!(by_name.test_name, "byName");
    assert_eq!(by_name.duration, 1250.5);
    assert_eq!(by_name.failure_ref_id.as_deref(), Some("ERR_2"));
    assert_eq!(report.failed_tests[2].duration, 0.0);
    assert_eq!(report.failed_tests[2].failure_ref_id.as_deref(), Some("ERR_2"));

    assert_eq!(report.skipped_tests[0].test_name, "sso");
    assert_eq!(report.skipped_tests[0].status, CaseStatus::Skipped);
    assert_eq!(report.passed_tests[0].class_name, "e2e.auth.LoginTest");
}

#[test]
fn test_single_testsuite_root_and_root_time_fallback() {
    let xml = br#"<testsuites time="7.5"><testsuite name="a"><testcase name="t" classname="c"/></testsuite></testsuites>"#;
    let report = parse(xml).expect("parse");
    assert_eq!(report.total_duration, 7.5);
    assert_eq!(report.timestamp, None);

    let xml = br#"<testsuite name="solo" time="1.25"><testcase name="t" classname="c"/></testsuite>"#;
    let report = parse(xml).expect("parse");
    assert_eq!(report.total_tests, 1);
    assert_eq!(report.total_duration, 1.25);
}

#[test]
fn test_long_traces_are_truncated_and_deduped() {
    let head = "x".repeat(MAX_TRACE_CHARS);
    let xml = format!(
        r#"<testsuite>
            <testcase classname="c" name="one"><failure message="m">{head}AAAA</failure></testcase>
            <testcase classname="c" name="two"><failure message="m">{head}BBBB</failure></testcase>
        </testsuite>"#
    );
    let report = parse(xml.as_bytes()).expect("parse");
    assert_eq!(report.failure_catalog.len(), 1);
    let entry = &report.failure_catalog[0];
    assert_eq!(entry.occurrence_count, 2);
    assert_eq!(entry.stack_trace, format!("{}{}", head, TRUNCATION_MARKER));
}

#[test]
fn test_rejects_bad_documents() {
    assert_eq!(parse(b"").unwrap_err(), ParseError::EmptyDocument);
    assert_eq!(parse(b"  \n ").unwrap_err(), ParseError::EmptyDocument);
    assert!(matches!(
        parse(b"<results><testcase/></results>").unwrap_err(),
        ParseError::UnsupportedRoot(root) if root == "results"
    ));
    assert!(matches!(
        parse(b"<testsuite><testcase></testsuite>").unwrap_err(),
        ParseError::Xml { .. }
    ));
    assert!(matches!(
        parse(b"<testsuite><testcase name=\"a\">").unwrap_err(),
        ParseError::Unterminated(_) | ParseError::Xml { .. }
    ));
}
