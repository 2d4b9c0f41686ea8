//! Plain-text listings of stored readings, audit entries and the event catalog.

use crate::db::models::{EventCodeRow, LogRow, Page, ReadingRow};
use std::fmt::Write;

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn footer(out: &mut String, page: i64, pages: i64, total: i64) {
    let _ = writeln!(out, "page {}/{} ({} total)", page, pages.max(1), total);
}

pub fn render_readings(page: &Page<ReadingRow>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>8}  {:<19}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}",
        "id", "timestamp", "light", "temp_f", "humid", "water_cm", "soil"
    );
    for r in &page.items {
        let _ = writeln!(
            out,
            "{:>8}  {:<19}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}",
            r.id,
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            cell(r.light_level),
            cell(r.temperature),
            cell(r.humidity),
            cell(r.water_level),
            cell(r.soil_moisture),
        );
    }
    footer(&mut out, page.page, page.pages(), page.total);
    out
}

pub fn render_logs(page: &Page<LogRow>) -> String {
    let mut out = String::new();
    for l in &page.items {
        let _ = writeln!(
            out,
            "{:>8}  {}  {}  {}",
            l.id,
            l.timestamp.format("%Y-%m-%d %H:%M:%S"),
            l.event_code,
            l.description
        );
    }
    footer(&mut out, page.page, page.pages(), page.total);
    out
}

pub fn render_events(rows: &[EventCodeRow]) -> String {
    rows.iter().map(|r| format!("{}  {}\n", r.code, r.description)).collect()
}
