//! Output formatting for the ftpscope commands

use comfy_table::{Cell, Color, ContentArrangement, Table};
use ftpscope_core::analysis::{AnalysisReport, LatestFile};
use ftpscope_core::{RemoteFile, Settings};
use serde_json::json;

// ============================================================================
// Formatters
// ============================================================================

fn header(table: &mut Table, titles: &[&str], no_color: bool) {
    if no_color {
        table.set_header(titles.to_vec());
    } else {
        table.set_header(
            titles
                .iter()
                .map(|t| Cell::new(t).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    }
}

pub fn format_health(settings: &Settings, connected: bool, json: bool) -> String {
    let status = if connected { "connected" } else { "error" };
    if json {
        return json!({ "ok": true, "ftp": status }).to_string();
    }
    format!("FTP {}:{} - {}", settings.host, settings.port, status)
}

pub fn format_machines(machines: &[u32], json: bool) -> String {
    if json {
        return json!({ "machines": machines }).to_string();
    }
    machines
        .iter()
        .map(|m| format!("{:03}", m))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Day-folders as table (human) or JSON
pub fn format_days(days: &[RemoteFile], json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(days).unwrap_or_else(|_| "[]".to_string());
    }
    if days.is_empty() {
        return "No day-folders found.".to_string();
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    header(&mut table, &["Folder", "Modified", "Path"], no_color);

    for day in days {
        let modified = day
            .modified
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![day.name.clone(), modified, day.path.clone()]);
    }

    table.to_string()
}

pub fn format_latest(latest: &LatestFile, json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(latest).unwrap_or_else(|_| "{}".to_string());
    }

    let mut lines = vec![
        format!("File:      {}", latest.filename),
        format!(
            "Modified:  {}",
            latest
                .modified
                .map(|ts| ts.to_string())
                .unwrap_or_else(|| "-".to_string())
        ),
        format!(
            "Size:      {}",
            latest
                .size
                .map(|s| format!("{} bytes", s))
                .unwrap_or_else(|| "-".to_string())
        ),
        String::new(),
    ];
    lines.push(latest.content.clone());
    lines.join("\n")
}

fn format_value(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.4}", v))
        .unwrap_or_else(|| "-".to_string())
}

/// Analysis report as summary plus point table (human) or JSON
pub fn format_report(report: &AnalysisReport, json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
    }

    let mut out = vec![
        format!("Files analyzed:   {}", report.total_files),
        format!("Values found:     {}", report.points.len()),
        format!("Mean:             {}", format_value(report.mean)),
        format!("Machine runtime:  {:.1}%", report.machine_runtime_percent),
        format!(
            "Latest file:      {}",
            report.latest_file_name.as_deref().unwrap_or("-")
        ),
    ];

    if !report.points.is_empty() {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        header(&mut table, &["#", "File", "Time", "Value"], no_color);
        for point in &report.points {
            table.add_row(vec![
                point.idx.to_string(),
                point.label.clone(),
                point.time_iso.replace('T', " "),
                format_value(Some(point.value)),
            ]);
        }
        out.push(String::new());
        out.push(table.to_string());
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftpscope_core::analysis::{FtpStatus, ReportPoint};

    fn report() -> AnalysisReport {
        AnalysisReport {
            points: vec![ReportPoint {
                idx: 1,
                value: 12.5,
                label: "LOG_001.DAT".to_string(),
                time_iso: "2024-03-01T06:00:00".to_string(),
                local_path_id: "0".repeat(32),
            }],
            mean: Some(12.5),
            total_files: 2,
            machine_runtime_percent: 42.0,
            ftp_status: FtpStatus::Ok,
            latest_file_name: Some("LOG_002.DAT".to_string()),
            failures: Vec::new(),
        }
    }

    #[test]
    fn test_report_table_lists_points() {
        let text = format_report(&report(), false, true);
        assert!(text.contains("Files analyzed:   2"));
        assert!(text.contains("Machine runtime:  42.0%"));
        assert!(text.contains("LOG_001.DAT"));
        assert!(text.contains("12.5000"));
    }

    #[test]
    fn test_report_json_is_camel_case() {
        let text = format_report(&report(), true, true);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["totalFiles"], 2);
        assert_eq!(value["latestFileName"], "LOG_002.DAT");
    }

    #[test]
    fn test_machines_are_zero_padded() {
        assert_eq!(format_machines(&[1, 2, 12], false), "001 002 012");
        assert_eq!(format_machines(&[1], true), r#"{"machines":[1]}"#);
    }

    #[test]
    fn test_empty_days() {
        assert_eq!(format_days(&[], false, true), "No day-folders found.");
    }
}
