//! Executor stdout parsing.
//!
//! The executor prints a simulation summary before sending, one of:
//!
//! ```text
//! simulate.execLimits → executed=3 | skipped=1
//! simulate.closeBatch(2) → closed=0 | skipped=4 ids=11,12,13,14
//! ```
//!
//! Matching is case-insensitive and whitespace tolerant. Touched ids
//! come from an `ids=` field on a summary line, falling back to a
//! bracketed `[1, 2]` list on the same line.

use crate::domain::instrument::ItemId;
use crate::domain::range::uniq_sorted;
use crate::ports::executor::ExecutionReport;

/// Parse the last summary line in `stdout`. `None` if there is none.
pub fn parse_report(stdout: &str) -> Option<ExecutionReport> {
    stdout.lines().rev().find_map(parse_summary_line)
}

/// Parse one summary line.
pub fn parse_summary_line(line: &str) -> Option<ExecutionReport> {
    let lower = line.to_ascii_lowercase();

    let count = ["executed", "closed"]
        .iter()
        .find_map(|key| field_u64(&lower, key))?;
    let skipped = field_u64(&lower, "skipped")?;

    let touched_ids = ids_field(&lower)
        .or_else(|| bracketed_ids(&lower))
        .unwrap_or_default();

    Some(ExecutionReport {
        count,
        skipped,
        touched_ids,
    })
}

/// Value of `key = <digits>`, where `key` starts a word.
fn field_u64(line: &str, key: &str) -> Option<u64> {
    let mut search = 0;
    while let Some(pos) = line[search..].find(key) {
        let start = search + pos;
        search = start + key.len();

        let at_word_start = line[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_ascii_alphanumeric());
        if !at_word_start {
            continue;
        }

        let rest = line[search..].trim_start();
        let Some(rest) = rest.strip_prefix('=') else {
            continue;
        };
        let digits: String = rest
            .trim_start()
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        if let Ok(value) = digits.parse() {
            return Some(value);
        }
    }
    None
}

/// `ids=1,2, 3` or `id=4`.
fn ids_field(line: &str) -> Option<Vec<ItemId>> {
    let mut found = Vec::new();
    let mut search = 0;

    while let Some(pos) = line[search..].find("id") {
        let start = search + pos;
        search = start + 2;

        let at_word_start = line[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_ascii_alphanumeric());
        if !at_word_start {
            continue;
        }

        let mut rest = &line[search..];
        rest = rest.strip_prefix('s').unwrap_or(rest);
        let Some(rest) = rest.trim_start().strip_prefix('=') else {
            continue;
        };
        let list: String = rest
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == ',' || c.is_whitespace())
            .collect();
        found.extend(parse_id_list(&list));
    }

    (!found.is_empty()).then(|| uniq_sorted(found))
}

fn bracketed_ids(line: &str) -> Option<Vec<ItemId>> {
    let open = line.find('[')?;
    let close = open + line[open..].find(']')?;
    let inner = &line[open + 1..close];
    if !inner.chars().all(|c| c.is_ascii_digit() || c == ',' || c.is_whitespace()) {
        return None;
    }
    let ids = parse_id_list(inner);
    (!ids.is_empty()).then(|| uniq_sorted(ids))
}

fn parse_id_list(list: &str) -> Vec<ItemId> {
    list.split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_limits_summary() {
        let out = "🔗 RPC: x\n🧠 simulate.execLimits → executed=3 | skipped=1\n🚀 execLimits tx: 0xabc\n";
        let report = parse_report(out).unwrap();
        assert_eq!(report.count, 3);
        assert_eq!(report.skipped, 1);
        assert!(report.touched_ids.is_empty());
    }

    #[test]
    fn test_close_batch_summary_with_ids() {
        let report =
            parse_summary_line("simulate.closeBatch(2) → CLOSED = 2 | Skipped=0 ids=14, 12,12").unwrap();
        assert_eq!(report.count, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.touched_ids, vec![12, 14]);
    }

    #[test]
    fn test_bracket_fallback() {
        let report = parse_summary_line("closed=1 | skipped=1 [8813, 8667]").unwrap();
        assert_eq!(report.touched_ids, vec![8667, 8813]);
    }

    #[test]
    fn test_no_summary_line() {
        assert!(parse_report("📦 Mode: limit | Asset: 0 | IDs: 1,2\n").is_none());
        assert!(parse_summary_line("executed=3").is_none());
    }

    #[test]
    fn test_field_must_start_a_word() {
        assert_eq!(field_u64("unskipped=4 skipped=2", "skipped"), Some(2));
        assert_eq!(ids_field("uuid=5"), None);
    }
}
