use chrono::{DateTime, Duration, TimeZone, Utc};
use pulse_core::analytics::{AnalyticsEngine, FailurePattern, PatternCategory};
use pulse_core::errors::PulseError;
use pulse_core::ingest::Coordinator;
use pulse_core::model::{FlakyStatusUpdate, ResolutionStatus};
use pulse_core::storage::Store;
use tempfile::tempdir;

#[derive(Clone, Copy)]
enum Outcome<'a> {
    Pass,
    Skip,
    Fail(&'a str),
}

struct Case<'a> {
    class: &'a str,
    name: &'a str,
    time: f64,
    outcome: Outcome<'a>,
}

fn case<'a>(class: &'a str, name: &'a str, time: f64, outcome: Outcome<'a>) -> Case<'a> {
    Case {
        class,
        name,
        time,
        outcome,
    }
}

fn junit(ts: DateTime<Utc>, cases: &[Case<'_>]) -> String {
    let mut body = String::new();
    for c in cases {
        let inner = match c.outcome {
            Outcome::Pass => String::new(),
            Outcome::Skip => "<skipped/>".to_string(),
            Outcome::Fail(trace) => format!("<failure message=\"failed\">{}</failure>", trace),
        };
        body.push_str(&format!(
            "<testcase classname=\"{}\" name=\"{}\" time=\"{}\">{}</testcase>\n",
            c.class, c.name, c.time, inner
        ));
    }
    format!(
        "<testsuites><testsuite name=\"s\" timestamp=\"{}\">\n{}</testsuite></testsuites>",
        ts.to_rfc3339(),
        body
    )
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap()
}

fn setup(dir: &std::path::Path) -> anyhow::Result<(Store, i64, Coordinator, AnalyticsEngine)> {
    let store = Store::open(&dir.join("pulse.db"))?;
    store.init_schema()?;
    let pid = store.create_project("web", None)?.id;
    let coord = Coordinator::new(store.clone());
    // analytics reads through its own connection
    let reader = Store::open(&dir.join("pulse.db"))?;
    Ok((store, pid, coord, AnalyticsEngine::new(reader)))
}

fn ingest(coord: &Coordinator, pid: i64, xml: String) -> anyhow::Result<i64> {
    Ok(coord.ingest(pid, &[xml])?[0])
}

#[test]
fn test_trends_weighted_rate_daily_series_and_previous_window() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (_store, pid, coord, engine) = setup(dir.path())?;

    // 1. current window: day one 10 tests (8 pass, 2 fail), day two 5 tests (4 pass, 1 skip)
    let mut day1: Vec<Case> = (0..8)
        .map(|_| case("a.Cart", "add", 1.0, Outcome::Pass))
        .collect();
    day1.push(case("a.Cart", "remove", 3.0, Outcome::Fail("boom")));
    day1.push(case("a.Cart", "clear", 2.0, Outcome::Fail("boom")));
    ingest(&coord, pid, junit(now() - Duration::days(2), &day1))?;

    let mut day2: Vec<Case> = (0..4)
        .map(|_| case("a.Cart", "add", 0.5, Outcome::Pass))
        .collect();
    day2.push(case("a.Cart", "slow", 99.0, Outcome::Skip));
    ingest(&coord, pid, junit(now() - Duration::days(1), &day2))?;

    // 2. preceding window: 1 of 2 passes
    let prev = vec![
        case("a.Cart", "add", 1.0, Outcome::Pass),
        case("a.Cart", "remove", 1.0, Outcome::Fail("boom")),
    ];
    ingest(&coord, pid, junit(now() - Duration::days(10), &prev))?;

    // 3. far outside both windows
    ingest(
        &coord,
        pid,
        junit(now() - Duration::days(90), &[case("a.Cart", "x", 1.0, Outcome::Pass)]),
    )?;

    let t = engine.trends_at(pid, 7, now())?;
    let m = &t.metrics;
    assert_eq!(m.total_runs, 2);
    // (8 + 4) / ((10 + 5) - (0 + 1)) * 100
    assert_eq!(m.avg_pass_rate, 85.7);
    assert_eq!(m.latest_pass_rate, 100.0);
    assert_eq!(m.pass_rate_trend, 35.7);
    assert_eq!(m.total_unique_failures, 2);
    // 8*1 + 3 + 2 + 4*0.5 over 14 non-skipped cases
    assert_eq!(m.avg_execution_time, 1.07);

    assert_eq!(t.daily_trends.len(), 2);
    let d1 = &t.daily_trends[0];
    let d2 = &t.daily_trends[1];
    assert!(d1.date < d2.date);
    assert_eq!((d1.total_tests, d1.pass_count, d1.fail_count), (10, 8, 2));
    assert_eq!(d1.pass_rate, 80.0);
    assert_eq!((d1.min_duration, d1.max_duration, d1.avg_duration), (1.0, 3.0, 1.3));
    assert_eq!(d2.skip_count, 1);
    assert_eq!(d2.pass_rate, 100.0);
    assert_eq!(d2.max_duration, 0.5, "skipped cases do not count toward durations");

    let json = serde_json::to_value(&t)?;
    assert_eq!(json["dailyTrends"][0]["date"], "2025-06-28");
    assert_eq!(json["metrics"]["avgPassRate"], 85.7);
    Ok(())
}

#[test]
fn test_empty_window_is_zero_valued() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (_store, pid, _coord, engine) = setup(dir.path())?;

    let t = engine.trends_at(pid, 30, now())?;
    assert_eq!(t.metrics, Default::default());
    assert!(t.daily_trends.is_empty());
    assert!(engine.top_failures_at(pid, 30, 10, now())?.is_empty());
    assert!(engine.failure_patterns_at(pid, 30, now())?.is_empty());
    let flaky = engine.flaky_tests_at(pid, 30, 0.0, now())?;
    assert_eq!(flaky.metrics.total_flaky_tests, 0);
    assert!(flaky.tests.is_empty());
    Ok(())
}

#[test]
fn test_unknown_project_is_not_found() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (_store, pid, _coord, engine) = setup(dir.path())?;
    let missing = pid + 100;

    let err = engine.trends_at(missing, 30, now()).unwrap_err();
    assert!(matches!(err, PulseError::ProjectNotFound(id) if id == missing));
    assert!(engine.top_failures_at(missing, 30, 10, now()).unwrap_err().is_not_found());
    assert!(engine.flaky_tests_at(missing, 30, 0.0, now()).unwrap_err().is_not_found());
    assert!(engine.failure_patterns_at(missing, 30, now()).unwrap_err().is_not_found());
    Ok(())
}

#[test]
fn test_huge_windows_cover_all_history() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (_store, pid, coord, engine) = setup(dir.path())?;
    ingest(
        &coord,
        pid,
        junit(now() - Duration::days(4000), &[case("a.Old", "t", 1.0, Outcome::Fail("boom"))]),
    )?;

    let t = engine.trends_at(pid, u32::MAX, now())?;
    assert_eq!(t.metrics.total_runs, 1);
    assert_eq!(t.metrics.pass_rate_trend, 0.0);
    assert_eq!(engine.top_failures_at(pid, 60_000_000, 10, now())?.len(), 1);
    Ok(())
}

#[test]
fn test_top_failures_ranking_and_patterns() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (_store, pid, coord, engine) = setup(dir.path())?;

    let x = "org.openqa.selenium.TimeoutException: waited 30s for #checkout";
    let y = "java.lang.AssertionError: expected true but was false";
    let z = "java.net.ConnectException: Connection refused";

    let mut cases = Vec::new();
    for i in 0..5 {
        cases.push((format!("x{}", i), x));
    }
    for i in 0..9 {
        cases.push((format!("y{}", i), y));
    }
    for i in 0..2 {
        cases.push((format!("z{}", i), z));
    }
    let report: Vec<Case> = cases
        .iter()
        .map(|(name, trace)| case("a.Flow", name, 0.1, Outcome::Fail(trace)))
        .collect();
    ingest(&coord, pid, junit(now() - Duration::hours(3), &report))?;

    let top = engine.top_failures_at(pid, 7, 2, now())?;
    assert_eq!(top.len(), 2);
    assert_eq!((top[0].message.as_str(), top[0].count), (y, 9));
    assert_eq!((top[1].message.as_str(), top[1].count), (x, 5));
    assert_eq!(top[0].hash.len(), 64);

    let patterns = engine.failure_patterns_at(pid, 7, now())?;
    assert_eq!(
        patterns,
        vec![
            FailurePattern {
                category: PatternCategory::Assertion,
                count: 9
            },
            FailurePattern {
                category: PatternCategory::Timeout,
                count: 5
            },
            FailurePattern {
                category: PatternCategory::Connectivity,
                count: 2
            },
        ]
    );
    Ok(())
}

#[test]
fn test_flaky_detection_threshold_and_triage() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (store, pid, coord, engine) = setup(dir.path())?;

    // ten daily runs; charge fails on three of them
    for day in 0..10 {
        let charge = if day % 3 == 0 && day > 0 {
            Outcome::Fail("java.lang.IllegalStateException: gateway busy")
        } else {
            Outcome::Pass
        };
        let cases = vec![
            case("a.Pay", "charge", 0.2, charge),
            case("a.Pay", "always_pass", 0.1, Outcome::Pass),
            case("a.Pay", "always_fail", 0.1, Outcome::Fail("broken")),
            case(
                "a.Pay",
                "fail_or_skip",
                0.1,
                if day == 5 { Outcome::Skip } else { Outcome::Fail("broken") },
            ),
            case(
                "a.Pay",
                "pass_or_skip",
                0.1,
                if day == 5 { Outcome::Skip } else { Outcome::Pass },
            ),
        ];
        ingest(&coord, pid, junit(now() - Duration::days(day + 1), &cases))?;
    }

    let res = engine.flaky_tests_at(pid, 30, 30.0, now())?;
    assert_eq!(
        res.tests.len(),
        1,
        "a skip mixed into an all-pass or all-fail history is not flakiness"
    );
    let t = &res.tests[0];
    assert_eq!((t.class_name.as_str(), t.test_name.as_str()), ("a.Pay", "charge"));
    assert_eq!((t.total_executions, t.fail_count, t.pass_count), (10, 3, 7));
    assert_eq!(t.flakiness_score, 30.0);
    assert_eq!(t.management_id, None);
    assert_eq!(t.resolution_status, ResolutionStatus::Unresolved);
    assert_eq!(res.metrics.total_flaky_tests, 1);
    assert_eq!(res.metrics.unresolved_count, 1);

    assert!(engine.flaky_tests_at(pid, 30, 31.0, now())?.tests.is_empty());

    // reading never materialized a management row
    assert_eq!(store.flaky_management("a.Pay", "charge")?.id, None);

    let saved = engine.update_flaky_status(
        "a.Pay",
        "charge",
        &FlakyStatusUpdate {
            acknowledged: true,
            status: Some(ResolutionStatus::Investigating),
            assignee: Some("sam".into()),
            notes: None,
        },
    )?;
    assert!(saved.id.is_some());

    let res = engine.flaky_tests_at(pid, 30, 0.0, now())?;
    let t = &res.tests[0];
    assert_eq!(t.management_id, saved.id);
    assert!(t.acknowledged);
    assert_eq!(t.assignee.as_deref(), Some("sam"));
    assert_eq!(res.metrics.acknowledged_count, 1);
    assert_eq!(res.metrics.investigating_count, 1);
    assert_eq!(res.metrics.unresolved_count, 0);
    Ok(())
}
