use std::borrow::Cow;

use chrono::NaiveDate;
use log::debug;
use serde::Serialize;

use crate::card_format::{CardFormatSpec, CardType, Leading, SignRule, TextEncoding, Trailing};
use crate::error::{KakeiboError, Result};

/// One statement line, in the ledger's own conventions: spending is positive,
/// refunds are negative, amounts are integer minor units.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NormalizedRow {
    pub transaction_date: NaiveDate,
    pub description: String,
    pub amount: i64,
    /// 1-based line number in the decoded file.
    pub raw_row_index: usize,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a statement amount into minor units. Currency marks, thousands
/// separators and quotes are ignored; `(123)` and `-123` are negative.
/// Returns `None` when the value has more precision than `minor_digits` allows.
pub fn parse_amount(raw: &str, minor_digits: u32) -> Option<i64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | '"' | '¥' | '￥' | '円') && !c.is_whitespace())
        .collect();
    let (negative, body) = if let Some(inner) = cleaned.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        (true, inner)
    } else if let Some(rest) = cleaned.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = cleaned.strip_prefix('+') {
        (false, rest)
    } else {
        (false, cleaned.as_str())
    };

    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    if int_part.is_empty()
        || !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let digits = minor_digits as usize;
    if frac_part.len() > digits && frac_part[digits..].bytes().any(|b| b != b'0') {
        return None;
    }
    let mut frac: String = frac_part.chars().take(digits).collect();
    while frac.len() < digits {
        frac.push('0');
    }

    let whole: i64 = int_part.parse().ok()?;
    let frac: i64 = if digits == 0 { 0 } else { frac.parse().ok()? };
    let value = whole.checked_mul(10i64.checked_pow(minor_digits)?)?.checked_add(frac)?;
    Some(if negative { -value } else { value })
}

pub fn parse_date(raw: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), format).ok()
}

/// Trim and collapse runs of whitespace (ideographic spaces included) to one space.
pub fn normalize_description(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode<'a>(bytes: &'a [u8], encoding: TextEncoding) -> Result<Cow<'a, str>> {
    let body = match encoding {
        TextEncoding::Utf8 => bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes),
        TextEncoding::ShiftJis => bytes,
    };
    let enc = encoding.encoding();
    enc.decode_without_bom_handling_and_without_replacement(body)
        .ok_or_else(|| KakeiboError::Encoding(format!("file is not valid {}", enc.name())))
}

fn is_blank(record: &csv::StringRecord) -> bool {
    record.iter().all(|f| f.trim().is_empty())
}

fn check_header(spec: &CardFormatSpec, labels: &[(usize, &str)], record: &csv::StringRecord, row: usize) -> Result<()> {
    for (col, label) in labels {
        let found = record.get(*col).map(str::trim).unwrap_or("");
        if found != *label {
            return Err(KakeiboError::parse(
                row,
                format!("missing required column '{label}' for {}", spec.name),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// parse
// ---------------------------------------------------------------------------

/// Decode and normalize a whole statement. Any row that does not fit the
/// card's layout rejects the entire file.
pub fn parse(bytes: &[u8], card_type: CardType) -> Result<Vec<NormalizedRow>> {
    let spec = card_type.spec();
    let text = decode(bytes, spec.encoding)?;

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(spec.delimiter)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    let mut leading_seen = 0usize;
    let mut in_trailer = false;
    let mut saw_any = false;

    for result in rdr.records() {
        let record = result.map_err(|e| {
            let row = e.position().map(|p| p.line() as usize).unwrap_or(0);
            KakeiboError::parse(row, format!("malformed CSV: {e}"))
        })?;
        let row = record.position().map(|p| p.line() as usize).unwrap_or(0);
        if is_blank(&record) {
            continue;
        }
        saw_any = true;

        match spec.leading {
            Leading::Header(labels) if leading_seen == 0 => {
                check_header(spec, labels, &record, row)?;
                leading_seen = 1;
                continue;
            }
            Leading::Skip(n) if leading_seen < n => {
                let date_cell = record.get(spec.date_col).unwrap_or("");
                if parse_date(date_cell, spec.date_format).is_some() {
                    return Err(KakeiboError::parse(row, "expected preamble row, found a transaction"));
                }
                leading_seen += 1;
                continue;
            }
            _ => {}
        }

        if in_trailer {
            if record.get(spec.date_col).map(str::trim).unwrap_or("").is_empty() {
                continue;
            }
            return Err(KakeiboError::parse(row, "transaction row after the statement summary"));
        }

        if record.len() < spec.min_columns() {
            return Err(KakeiboError::parse(
                row,
                format!("expected at least {} columns, found {}", spec.min_columns(), record.len()),
            ));
        }

        let raw_date = record[spec.date_col].trim();
        if raw_date.is_empty() {
            if spec.trailing == Trailing::BlankDate {
                in_trailer = true;
                continue;
            }
            return Err(KakeiboError::parse(row, "missing transaction date"));
        }
        let transaction_date = parse_date(raw_date, spec.date_format)
            .ok_or_else(|| KakeiboError::parse(row, format!("unparseable date '{raw_date}'")))?;

        let description = normalize_description(&record[spec.description_col]);
        if description.is_empty() {
            return Err(KakeiboError::parse(row, "empty description"));
        }

        let raw_amount = &record[spec.amount_col];
        let amount = parse_amount(raw_amount, spec.minor_digits)
            .ok_or_else(|| KakeiboError::parse(row, format!("unparseable amount '{}'", raw_amount.trim())))?;
        let amount = match spec.sign {
            SignRule::DebitPositive => amount,
            SignRule::DebitNegative => -amount,
        };

        rows.push(NormalizedRow {
            transaction_date,
            description,
            amount,
            raw_row_index: row,
        });
    }

    if !saw_any {
        return Err(KakeiboError::parse(0, "file is empty"));
    }

    debug!("Parsed {} row(s) from {} statement", rows.len(), spec.name);
    Ok(rows)
}
