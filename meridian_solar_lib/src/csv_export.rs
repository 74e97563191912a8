//! Parsing of the portal's half-hourly CSV export.
//!
//! Each data row is one meter element for one day:
//! `ICP, meter, element, D/M/YYYY, v00:00 .. v23:30`, so 52 fields with
//! 48 half-hour values. Short or unrecognised rows are skipped.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use csv::{ReaderBuilder, Trim};
use thiserror::Error;

/// Half-hour slots in a day.
pub const HALF_HOUR_SLOTS: usize = 48;

/// Fields a usable row must have.
pub const MIN_FIELDS: usize = 4 + HALF_HOUR_SLOTS;

const ELEMENT_FIELD: usize = 2;
const DATE_FIELD: usize = 3;
const FIRST_VALUE_FIELD: usize = 4;

#[derive(Error, Debug)]
pub enum CsvExportError {
    #[error("export has {0} non-blank lines, need a header and at least one row")]
    TooShort(usize),
    #[error("export has no usable rows")]
    NoRecords,
}

/// Meter channel a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterElement {
    FeedIn,
    Consumption,
}

impl FromStr for MeterElement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Feed-in" => Ok(MeterElement::FeedIn),
            "Consumption" => Ok(MeterElement::Consumption),
            other => Err(format!("unknown meter element '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsvRecord {
    pub meter_element: MeterElement,
    pub date: NaiveDate,
    pub half_hour_values: Vec<f64>,
}

impl CsvRecord {
    pub fn daily_total(&self) -> f64 {
        self.half_hour_values.iter().sum()
    }

    /// Last half-hour value above zero. Negative slots are meter
    /// corrections, not generation.
    pub fn latest_nonzero(&self) -> Option<f64> {
        self.half_hour_values.iter().rev().copied().find(|v| *v > 0.0)
    }
}

/// Totals for one day of the export.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DailySummary {
    pub date: Option<NaiveDate>,
    pub daily_feed_in: f64,
    pub solar_generation: f64,
    pub daily_consumption: f64,
    /// True when today had no rows and the last day in the file was used.
    pub used_fallback_date: bool,
}

/// Everything the pipeline takes from one export.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvSummary {
    pub day: DailySummary,
    pub average_daily_use: Option<f64>,
    pub record_count: usize,
}

/// Parses `D/M/YYYY`, with or without zero padding.
pub fn parse_export_date(raw: &str) -> Option<NaiveDate> {
    let mut parts = raw.trim().split('/');
    let day = parts.next()?.trim().parse::<u32>().ok()?;
    let month = parts.next()?.trim().parse::<u32>().ok()?;
    let year = parts.next()?.trim().parse::<i32>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Formats a date the way the export writes it: `D/M/YYYY`, unpadded.
pub fn format_export_date(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.day(), date.month(), date.year())
}

/// Parses every usable row, in file order.
pub fn parse_export(text: &str) -> Result<Vec<CsvRecord>, CsvExportError> {
    let lines = text.lines().filter(|l| !l.trim().is_empty()).count();
    if lines < 2 {
        return Err(CsvExportError::TooShort(lines));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::debug!("row {}: unreadable ({})", index + 1, e);
                continue;
            }
        };
        if row.len() < MIN_FIELDS {
            tracing::debug!("row {}: {} fields, skipping", index + 1, row.len());
            continue;
        }

        let meter_element = match row.get(ELEMENT_FIELD).unwrap_or("").parse::<MeterElement>() {
            Ok(element) => element,
            Err(e) => {
                tracing::debug!("row {}: {}", index + 1, e);
                continue;
            }
        };
        let Some(date) = row.get(DATE_FIELD).and_then(parse_export_date) else {
            tracing::debug!("row {}: bad date {:?}", index + 1, row.get(DATE_FIELD));
            continue;
        };

        let half_hour_values = (FIRST_VALUE_FIELD..MIN_FIELDS)
            .map(|i| {
                row.get(i)
                    .and_then(|v| v.parse::<f64>().ok())
                    .filter(|v| v.is_finite())
                    .unwrap_or(0.0)
            })
            .collect();

        records.push(CsvRecord {
            meter_element,
            date,
            half_hour_values,
        });
    }

    Ok(records)
}

/// Totals for `today`, or for the date of the last row when today has no
/// rows. Where an element appears twice for the chosen day the later row wins.
/// The fallback date comes from the last usable record, so a trailing short
/// or malformed line never picks a day that has no data.
pub fn summarize_day(records: &[CsvRecord], today: NaiveDate) -> Option<DailySummary> {
    let last = records.last()?;
    let has_today = records.iter().any(|r| r.date == today);
    let target = if has_today { today } else { last.date };

    let mut summary = DailySummary {
        date: Some(target),
        used_fallback_date: !has_today,
        ..DailySummary::default()
    };
    if !has_today {
        tracing::warn!(
            "no rows for {}, using {} instead",
            format_export_date(today),
            format_export_date(target)
        );
    }

    for record in records.iter().filter(|r| r.date == target) {
        match record.meter_element {
            MeterElement::FeedIn => {
                summary.daily_feed_in = record.daily_total();
                summary.solar_generation = record.latest_nonzero().unwrap_or(0.0);
            }
            MeterElement::Consumption => {
                summary.daily_consumption = record.daily_total();
            }
        }
    }

    Some(summary)
}

/// Mean daily consumption over the most recent `history_days` dates that
/// have a non-zero consumption total.
pub fn average_daily_use(records: &[CsvRecord], history_days: u32) -> Option<f64> {
    let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for record in records {
        if record.meter_element != MeterElement::Consumption {
            continue;
        }
        let total = record.daily_total();
        if total > 0.0 {
            by_date.insert(record.date, total);
        }
    }

    let recent: Vec<f64> = by_date
        .values()
        .rev()
        .take(history_days as usize)
        .copied()
        .collect();
    if recent.is_empty() {
        return None;
    }
    Some(recent.iter().sum::<f64>() / recent.len() as f64)
}

/// Parses an export and reduces it to what the pipeline publishes.
pub fn summarize_export(
    text: &str,
    today: NaiveDate,
    history_days: u32,
) -> Result<CsvSummary, CsvExportError> {
    let records = parse_export(text)?;
    let day = summarize_day(&records, today).ok_or(CsvExportError::NoRecords)?;
    Ok(CsvSummary {
        day,
        average_daily_use: average_daily_use(&records, history_days),
        record_count: records.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "ICP,Meter,Element,Date,00:00,00:30,01:00,01:30,02:00,02:30,03:00,03:30,04:00,04:30,05:00,05:30,06:00,06:30,07:00,07:30,08:00,08:30,09:00,09:30,10:00,10:30,11:00,11:30,12:00,12:30,13:00,13:30,14:00,14:30,15:00,15:30,16:00,16:30,17:00,17:30,18:00,18:30,19:00,19:30,20:00,20:30,21:00,21:30,22:00,22:30,23:00,23:30";

    fn row(element: &str, date: &str, values: &[(usize, &str)]) -> String {
        let mut slots = vec!["0".to_string(); HALF_HOUR_SLOTS];
        for (slot, value) in values {
            slots[*slot] = value.to_string();
        }
        format!("0001234567AB123,M1,{},{},{}", element, date, slots.join(","))
    }

    fn export(rows: &[String]) -> String {
        let mut text = String::from(HEADER);
        for r in rows {
            text.push('\n');
            text.push_str(r);
        }
        text
    }

    fn date(d: u32, m: u32, y: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_export_date() {
        assert_eq!(parse_export_date("1/1/2024"), Some(date(1, 1, 2024)));
        assert_eq!(parse_export_date("05/03/2024"), Some(date(5, 3, 2024)));
        assert_eq!(parse_export_date("31/2/2024"), None);
        assert_eq!(parse_export_date("2024-01-01"), None);
        assert_eq!(parse_export_date("1/1/2024/1"), None);
    }

    #[test]
    fn test_format_export_date_is_unpadded() {
        assert_eq!(format_export_date(date(5, 3, 2024)), "5/3/2024");
        assert_eq!(format_export_date(date(15, 11, 2024)), "15/11/2024");
    }

    #[test]
    fn test_header_only_is_too_short() {
        let err = parse_export(HEADER).unwrap_err();
        assert!(matches!(err, CsvExportError::TooShort(1)));
        assert!(matches!(parse_export("").unwrap_err(), CsvExportError::TooShort(0)));
    }

    #[test]
    fn test_parse_skips_short_and_unknown_rows() {
        let text = export(&[
            "0001,M1,Feed-in,1/1/2024,1,2,3".to_string(),
            row("Controlled", "1/1/2024", &[]),
            row("Feed-in", "not-a-date", &[]),
            row("Consumption", "1/1/2024", &[(0, "1.5")]),
        ]);
        let records = parse_export(&text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].meter_element, MeterElement::Consumption);
        assert_eq!(records[0].half_hour_values.len(), HALF_HOUR_SLOTS);
    }

    #[test]
    fn test_non_numeric_values_become_zero() {
        let text = export(&[row(
            "Feed-in",
            "1/1/2024",
            &[(10, "abc"), (11, "2.5"), (12, ""), (13, "NaN")],
        )]);
        let records = parse_export(&text).unwrap();
        assert_eq!(records[0].daily_total(), 2.5);
        assert_eq!(records[0].half_hour_values[10], 0.0);
        assert_eq!(records[0].half_hour_values[13], 0.0);
    }

    #[test]
    fn test_today_feed_in_and_consumption() {
        let text = export(&[
            row("Feed-in", "1/1/2024", &[(20, "0.8"), (24, "1.2"), (30, "0.4")]),
            row("Consumption", "1/1/2024", &[(0, "0.5"), (40, "1.5")]),
        ]);
        let records = parse_export(&text).unwrap();
        let day = summarize_day(&records, date(1, 1, 2024)).unwrap();

        assert_eq!(day.date, Some(date(1, 1, 2024)));
        assert!(!day.used_fallback_date);
        assert!((day.daily_feed_in - 2.4).abs() < 1e-9);
        assert_eq!(day.solar_generation, 0.4);
        assert_eq!(day.daily_consumption, 2.0);
    }

    #[test]
    fn test_falls_back_to_last_row_date() {
        let text = export(&[
            row("Feed-in", "2/1/2024", &[(20, "3.0")]),
            row("Consumption", "2/1/2024", &[(20, "7.0")]),
            row("Feed-in", "1/1/2024", &[(20, "1.0")]),
        ]);
        let records = parse_export(&text).unwrap();
        let day = summarize_day(&records, date(9, 9, 2024)).unwrap();

        assert_eq!(day.date, Some(date(1, 1, 2024)));
        assert!(day.used_fallback_date);
        assert_eq!(day.daily_feed_in, 1.0);
        assert_eq!(day.daily_consumption, 0.0);
    }

    #[test]
    fn test_generation_is_last_nonzero_scanning_backward() {
        let text = export(&[row("Feed-in", "1/1/2024", &[(2, "1.2"), (4, "0.5")])]);
        let records = parse_export(&text).unwrap();
        let day = summarize_day(&records, date(1, 1, 2024)).unwrap();
        assert!((day.daily_feed_in - 1.7).abs() < 1e-9);
        assert_eq!(day.solar_generation, 0.5);
    }

    #[test]
    fn test_generation_ignores_negative_corrections() {
        let text = export(&[row(
            "Feed-in",
            "1/1/2024",
            &[(2, "1.2"), (4, "0.5"), (6, "-0.1")],
        )]);
        let records = parse_export(&text).unwrap();
        assert_eq!(records[0].latest_nonzero(), Some(0.5));
        let day = summarize_day(&records, date(1, 1, 2024)).unwrap();
        assert_eq!(day.solar_generation, 0.5);
    }

    #[test]
    fn test_fallback_date_is_last_in_file_order() {
        let text = export(&[
            row("Feed-in", "1/1/2024", &[(0, "1.0")]),
            row("Feed-in", "2/1/2024", &[(0, "2.0")]),
        ]);
        let records = parse_export(&text).unwrap();
        let day = summarize_day(&records, date(5, 1, 2024)).unwrap();
        assert_eq!(day.date, Some(date(2, 1, 2024)));
        assert_eq!(day.daily_feed_in, 2.0);
    }

    #[test]
    fn test_duplicate_rows_last_one_wins() {
        let text = export(&[
            row("Consumption", "1/1/2024", &[(0, "9.0")]),
            row("Consumption", "1/1/2024", &[(0, "4.0")]),
        ]);
        let records = parse_export(&text).unwrap();
        let day = summarize_day(&records, date(1, 1, 2024)).unwrap();
        assert_eq!(day.daily_consumption, 4.0);
    }

    #[test]
    fn test_feed_in_without_generation() {
        let text = export(&[row("Feed-in", "1/1/2024", &[])]);
        let records = parse_export(&text).unwrap();
        let day = summarize_day(&records, date(1, 1, 2024)).unwrap();
        assert_eq!(day.daily_feed_in, 0.0);
        assert_eq!(day.solar_generation, 0.0);
    }

    #[test]
    fn test_average_daily_use_over_recent_days() {
        let text = export(&[
            row("Consumption", "1/1/2024", &[(0, "30.0")]),
            row("Consumption", "2/1/2024", &[(0, "10.0")]),
            row("Consumption", "3/1/2024", &[]),
            row("Consumption", "4/1/2024", &[(0, "20.0")]),
            row("Feed-in", "4/1/2024", &[(0, "100.0")]),
        ]);
        let records = parse_export(&text).unwrap();

        assert_eq!(average_daily_use(&records, 2), Some(15.0));
        assert_eq!(average_daily_use(&records, 7), Some(20.0));
    }

    #[test]
    fn test_average_daily_use_none_without_consumption() {
        let text = export(&[row("Feed-in", "1/1/2024", &[(0, "1.0")])]);
        let records = parse_export(&text).unwrap();
        assert_eq!(average_daily_use(&records, 7), None);
    }

    #[test]
    fn test_summarize_export_without_usable_rows() {
        let text = format!("{}\n0001,M1,Feed-in,1/1/2024", HEADER);
        let err = summarize_export(&text, date(1, 1, 2024), 7).unwrap_err();
        assert!(matches!(err, CsvExportError::NoRecords));
    }

    #[test]
    fn test_quoted_fields_are_unwrapped() {
        let mut line = row("Feed-in", "1/1/2024", &[(5, "2.0")]);
        line = line.replacen("Feed-in,1/1/2024", "\"Feed-in\",\"1/1/2024\"", 1);
        let records = parse_export(&export(&[line])).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].daily_total(), 2.0);
    }
}
