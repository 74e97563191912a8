use chrono::{DateTime, Local, Utc};
use meridian_solar_lib::{CycleOutcome, DiagnosticsSnapshot, ReadingField, SelfTestReport};
use tabled::{Table, Tabled};

#[derive(Clone, Debug)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled)]
struct ReadingRow {
    #[tabled(rename = "Value")]
    label: String,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Source")]
    source: String,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "Check")]
    check: String,
    #[tabled(rename = "Result")]
    result: String,
}

fn build_reading_rows(outcome: &CycleOutcome) -> Vec<ReadingRow> {
    let missing = outcome.missing();
    outcome
        .reading()
        .fields()
        .iter()
        .map(|(field, value)| ReadingRow {
            label: field.label().to_string(),
            amount: format_amount(*field, *value),
            unit: field.unit().to_string(),
            source: if missing.contains(field) {
                "placeholder".to_string()
            } else {
                outcome.tier().to_string()
            },
        })
        .collect()
}

fn build_diagnostics_rows(snapshot: &DiagnosticsSnapshot) -> Vec<FieldRow> {
    let urls = snapshot.urls.as_ref();
    vec![
        FieldRow {
            field: "Username".into(),
            value: snapshot.username.clone(),
        },
        FieldRow {
            field: "Logged in".into(),
            value: yes_no(snapshot.logged_in),
        },
        FieldRow {
            field: "Session closed".into(),
            value: yes_no(snapshot.session_closed),
        },
        FieldRow {
            field: "Re-auth attempts".into(),
            value: snapshot.retry_count.to_string(),
        },
        FieldRow {
            field: "Login URL".into(),
            value: urls.map(|u| u.login.to_string()).unwrap_or_else(|| "-".into()),
        },
        FieldRow {
            field: "Dashboard URL".into(),
            value: urls
                .map(|u| u.dashboard.to_string())
                .unwrap_or_else(|| "-".into()),
        },
        FieldRow {
            field: "Form action".into(),
            value: snapshot
                .form_action
                .as_ref()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "-".into()),
        },
        FieldRow {
            field: "Last success".into(),
            value: format_timestamp(snapshot.last_success),
        },
        FieldRow {
            field: "Last source".into(),
            value: snapshot
                .last_tier
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".into()),
        },
    ]
}

fn build_check_rows(report: &SelfTestReport) -> Vec<CheckRow> {
    report
        .checks()
        .iter()
        .map(|(name, ok)| CheckRow {
            check: name.replace('_', " "),
            result: if *ok { "pass" } else { "FAIL" }.to_string(),
        })
        .collect()
}

pub fn print_outcome_table(outcome: &CycleOutcome) {
    println!("{}", Table::new(build_reading_rows(outcome)));
    match outcome {
        CycleOutcome::Complete { .. } => {}
        CycleOutcome::Degraded { reason, .. } => {
            println!("CSV export unavailable ({}); energy totals are placeholders.", reason)
        }
        CycleOutcome::Fallback { reason, .. } => {
            println!("Portal unavailable ({}); showing defaults.", reason)
        }
    }
}

pub fn print_diagnostics_table(snapshot: &DiagnosticsSnapshot) {
    println!("{}", Table::new(build_diagnostics_rows(snapshot)));
    if let Some(report) = &snapshot.self_test {
        println!("{}", Table::new(build_check_rows(report)));
        if !report.data_endpoints.is_empty() {
            println!("Data endpoints referenced from the dashboard:");
            for endpoint in &report.data_endpoints {
                println!("  {}", endpoint);
            }
        }
    }
}

pub fn print_json<T: serde::Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}

fn format_amount(field: ReadingField, value: f64) -> String {
    match field {
        ReadingField::CurrentRate | ReadingField::NextRate => format!("{:.4}", value),
        _ => format!("{:.2}", value),
    }
}

fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| {
        t.with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    })
    .unwrap_or_else(|| "never".to_string())
}

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}
