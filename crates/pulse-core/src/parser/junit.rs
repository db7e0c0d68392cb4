use super::catalog::FailureCatalog;
use crate::errors::ParseError;
use crate::fingerprint::truncate_trace;
use crate::model::{CaseDetail, CaseStatus, ParsedReport};
use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, Default)]
struct Detail {
    message: String,
    text: String,
}

#[derive(Debug)]
struct CaseBuilder {
    name: String,
    class_name: String,
    duration: f64,
    failure: Option<Detail>,
    error: Option<Detail>,
    skipped: bool,
    depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetailKind {
    Failure,
    Error,
}

#[derive(Debug, Clone, Copy)]
struct Collect {
    kind: DetailKind,
    depth: usize,
}

#[derive(Default)]
struct Walker {
    stack: Vec<String>,
    root_seen: bool,
    root_time: f64,
    suite_time: f64,
    timestamp: Option<DateTime<Utc>>,
    current: Option<CaseBuilder>,
    collect: Option<Collect>,
    catalog: FailureCatalog,
    passed: Vec<CaseDetail>,
    failed: Vec<CaseDetail>,
    skipped: Vec<CaseDetail>,
}

pub(crate) fn parse_junit(bytes: &[u8]) -> Result<ParsedReport, ParseError> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ParseError::EmptyDocument);
    }

    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(false);
    reader.check_end_names(true);

    let mut walker = Walker::default();
    let mut buf = Vec::new();

    loop {
        let position = reader.buffer_position();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| xml_error(reader.buffer_position(), e))?;

        match event {
            Event::Start(e) => walker.open(&e, false, position)?,
            Event::Empty(e) => walker.open(&e, true, position)?,
            Event::End(_) => walker.close(),
            Event::Text(t) => {
                if walker.collecting() {
                    let text = t.unescape().map_err(|e| xml_error(position, e))?;
                    walker.push_text(&text);
                }
            }
            Event::CData(c) => {
                if walker.collecting() {
                    let raw = c.into_inner();
                    walker.push_text(&String::from_utf8_lossy(&raw));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    walker.finish()
}

impl Walker {
    fn open(&mut self, e: &BytesStart<'_>, empty: bool, position: usize) -> Result<(), ParseError> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

        if !self.root_seen {
            self.root_seen = true;
            if name != "testsuites" && name != "testsuite" {
                return Err(ParseError::UnsupportedRoot(name));
            }
        }

        let depth = self.stack.len() + 1;
        match name.as_str() {
            "testsuites" => {
                if depth == 1 {
                    self.root_time = parse_number(attr(e, b"time", position)?.as_deref());
                }
            }
            "testsuite" => {
                self.suite_time += parse_number(attr(e, b"time", position)?.as_deref());
                if self.timestamp.is_none() {
                    self.timestamp = attr(e, b"timestamp", position)?
                        .as_deref()
                        .and_then(parse_timestamp);
                }
            }
            "testcase" if self.current.is_none() => {
                self.current = Some(CaseBuilder {
                    name: attr(e, b"name", position)?.unwrap_or_default(),
                    class_name: attr(e, b"classname", position)?.unwrap_or_default(),
                    duration: parse_number(attr(e, b"time", position)?.as_deref()),
                    failure: None,
                    error: None,
                    skipped: false,
                    depth,
                });
                if empty {
                    self.finish_case();
                }
            }
            "failure" | "error" if self.collect.is_none() => {
                let kind = if name == "failure" {
                    DetailKind::Failure
                } else {
                    DetailKind::Error
                };
                let message = attr(e, b"message", position)?.unwrap_or_default();
                if let Some(case) = self.current.as_mut() {
                    let slot = match kind {
                        DetailKind::Failure => &mut case.failure,
                        DetailKind::Error => &mut case.error,
                    };
                    if slot.is_none() {
                        *slot = Some(Detail {
                            message,
                            text: String::new(),
                        });
                        if !empty {
                            self.collect = Some(Collect { kind, depth });
                        }
                    }
                }
            }
            "skipped" => {
                if let Some(case) = self.current.as_mut() {
                    case.skipped = true;
                }
            }
            _ => {}
        }

        if !empty {
            self.stack.push(name);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.stack.pop();
        let depth = self.stack.len();

        if self.collect.is_some_and(|c| depth < c.depth) {
            self.collect = None;
        }
        if self.current.as_ref().is_some_and(|c| depth < c.depth) {
            self.finish_case();
        }
    }

    fn collecting(&self) -> bool {
        self.collect.is_some()
    }

    fn push_text(&mut self, text: &str) {
        let (Some(collect), Some(case)) = (self.collect, self.current.as_mut()) else {
            return;
        };
        let slot = match collect.kind {
            DetailKind::Failure => case.failure.as_mut(),
            DetailKind::Error => case.error.as_mut(),
        };
        if let Some(detail) = slot {
            detail.text.push_str(text);
        }
    }

    fn finish_case(&mut self) {
        let Some(case) = self.current.take() else {
            return;
        };
        self.collect = None;

        // <failure> wins over <error> when both are present
        if let Some(detail) = case.failure.or(case.error) {
            let trace = truncate_trace(detail.text.trim());
            let ref_id = self.catalog.record(&detail.message, &trace);
            self.failed.push(CaseDetail {
                test_name: case.name,
                class_name: case.class_name,
                duration: case.duration,
                status: CaseStatus::Failed,
                failure_ref_id: Some(ref_id),
            });
        } else if case.skipped {
            self.skipped.push(CaseDetail {
                test_name: case.name,
                class_name: case.class_name,
                duration: case.duration,
                status: CaseStatus::Skipped,
                failure_ref_id: None,
            });
        } else {
            self.passed.push(CaseDetail {
                test_name: case.name,
                class_name: case.class_name,
                duration: case.duration,
                status: CaseStatus::Passed,
                failure_ref_id: None,
            });
        }
    }

    fn finish(self) -> Result<ParsedReport, ParseError> {
        if !self.root_seen {
            return Err(ParseError::EmptyDocument);
        }
        if let Some(open) = self.stack.last() {
            return Err(ParseError::Unterminated(open.clone()));
        }

        let pass_count = self.passed.len() as u32;
        let fail_count = self.failed.len() as u32;
        let skip_count = self.skipped.len() as u32;
        let total_duration = if self.suite_time > 0.0 {
            self.suite_time
        } else {
            self.root_time
        };

        Ok(ParsedReport {
            total_tests: pass_count + fail_count + skip_count,
            pass_count,
            fail_count,
            skip_count,
            total_duration,
            timestamp: self.timestamp,
            failure_catalog: self.catalog.into_entries(),
            passed_tests: self.passed,
            failed_tests: self.failed,
            skipped_tests: self.skipped,
        })
    }
}

fn attr(e: &BytesStart<'_>, key: &[u8], position: usize) -> Result<Option<String>, ParseError> {
    for a in e.attributes() {
        let a = a.map_err(|err| xml_error(position, err))?;
        if a.key.local_name().as_ref() == key {
            let value = a.unescape_value().map_err(|err| xml_error(position, err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn xml_error(position: usize, e: impl std::fmt::Display) -> ParseError {
    ParseError::Xml {
        position,
        message: e.to_string(),
    }
}

/// Missing or unparsable numbers count as zero.
fn parse_number(raw: Option<&str>) -> f64 {
    raw.map(|s| s.trim().replace(',', ""))
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(0.0)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
