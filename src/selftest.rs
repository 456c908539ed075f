//! Self-test: exercises every handle operation in a throwaway namespace,
//! then removes it.

use crate::backend::RegistryBackend;
use crate::codec::Object;
use crate::error::Result;
use crate::handle::{remove_namespace, HandleOptions, RegistryHandle};
use crate::value::{RegData, ValueType};
use crate::AccessRight;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Debug;
use tracing::{info, warn};

pub const DEFAULT_COMPANY: &str = "Santo Spirito";
pub const DEFAULT_PROJECT: &str = "TestKey";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelfTestReport {
    pub path: String,
    pub access: AccessRight,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepResult>,
}

impl SelfTestReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.steps.iter().all(|s| s.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| !s.passed)
    }

    fn record(&mut self, name: &str, outcome: std::result::Result<(), String>) {
        match &outcome {
            Ok(()) => info!("self-test {}: ok", name),
            Err(detail) => warn!("self-test {}: {}", name, detail),
        }
        self.steps.push(StepResult {
            name: name.to_owned(),
            passed: outcome.is_ok(),
            detail: outcome.err(),
        });
    }
}

fn expect_eq<T: PartialEq + Debug>(actual: Result<T>, expected: &T) -> std::result::Result<(), String> {
    match actual {
        Ok(value) if value == *expected => Ok(()),
        Ok(value) => Err(format!("expected {expected:?}, got {value:?}")),
        Err(e) => Err(e.to_string()),
    }
}

fn expect_not_found<T: Debug>(actual: Result<T>) -> std::result::Result<(), String> {
    match actual {
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(format!("expected not found, got error: {e}")),
        Ok(value) => Err(format!("expected not found, got {value:?}")),
    }
}

fn encoded_samples() -> Vec<(&'static str, Object)> {
    vec![
        ("testp_int", Object::Int(123)),
        ("testp_str", Object::from("string")),
        ("testp_bool", Object::Bool(true)),
        ("testp_float", Object::Float(1.0)),
        ("testp_complex", Object::Complex { re: 1.0, im: 1.0 }),
        ("testp_unicode", Object::from("unicodestr")),
        (
            "testp_tuple",
            Object::Tuple(vec![
                Object::Int(1),
                Object::Int(2),
                Object::Int(3),
                Object::from("string"),
            ]),
        ),
    ]
}

/// Run the self-test in `Software\<company>\<project>` on `backend`.
///
/// Failed steps are recorded in the report; cleanup is attempted regardless.
///
/// # Errors
///
/// Returns an error only if the namespace cannot be opened or created
pub fn run<B>(backend: &B, company: &str, project: &str) -> Result<SelfTestReport>
where
    B: RegistryBackend + Clone,
{
    let started_at = Utc::now();
    let mut handle =
        RegistryHandle::open_with(backend.clone(), company, project, HandleOptions::default())?;

    let mut report = SelfTestReport {
        path: handle.path().to_owned(),
        access: handle.access(),
        started_at,
        finished_at: started_at,
        steps: Vec::new(),
    };

    let outcome = handle
        .set_value("test_stringval", "string")
        .map_err(|e| e.to_string())
        .and_then(|()| {
            expect_eq(
                handle.get_value("test_stringval"),
                &(RegData::from("string"), ValueType::String),
            )
        });
    report.record("string value", outcome);

    let outcome = handle
        .set_default("test", "test_str")
        .map_err(|e| e.to_string())
        .and_then(|()| expect_eq(handle.get_default("test"), &"test_str".to_owned()));
    report.record("default value", outcome);

    let samples = encoded_samples();
    for (subkey, object) in &samples {
        let outcome = handle
            .set_encoded(subkey, object)
            .map_err(|e| e.to_string())
            .and_then(|()| expect_eq(handle.get_decoded(subkey), object));
        report.record(&format!("encoded {subkey}"), outcome);
    }

    let outcome = handle
        .set_encoded("test_remove_subkey", &Object::from("removeme"))
        .and_then(|()| handle.delete_subkey("test_remove_subkey"))
        .map_err(|e| e.to_string())
        .and_then(|()| expect_not_found(handle.get_decoded("test_remove_subkey")));
    report.record("delete subkey", outcome);

    let outcome = handle
        .set_value("test_remove_stringval", "removeme")
        .and_then(|()| handle.delete_value("test_remove_stringval"))
        .map_err(|e| e.to_string())
        .and_then(|()| expect_not_found(handle.get_value("test_remove_stringval")));
    report.record("delete value", outcome);

    let mut cleanup = Vec::new();
    for subkey in std::iter::once("test").chain(samples.iter().map(|(name, _)| *name)) {
        if let Err(e) = handle.delete_subkey(subkey) {
            cleanup.push(format!("{subkey}: {e}"));
        }
    }
    if let Err(e) = handle.delete_value("test_stringval") {
        cleanup.push(format!("test_stringval: {e}"));
    }
    if let Err(e) = remove_namespace(backend, company, project) {
        cleanup.push(format!("{}: {e}", report.path));
    }
    handle.close();

    let outcome = if cleanup.is_empty() {
        Ok(())
    } else {
        Err(cleanup.join("; "))
    };
    report.record("cleanup", outcome);

    report.finished_at = Utc::now();
    Ok(report)
}
