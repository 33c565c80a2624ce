//! Chunker: splits a table's key range into disjoint chunks targeting a
//! byte budget per chunk (spec §4.5).

use crate::error::{DumpError, Result};
use crate::session::Session;

/// A closed-closed key range, stored as SQL literal text (spec §3 `Range`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub begin: String,
    pub end: String,
}

/// One planned chunk (spec §3 `ChunkTask`, minus the writer/index handles
/// which are created by the worker at stream time).
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    pub chunk_id: u64,
    pub range: Option<Range>,
    pub include_nulls: bool,
    /// Set on the final chunk of a table; the worker uses it to pick the
    /// `@<N>` vs `@@<N>` file-name marker (spec §6).
    pub is_last: bool,
}

/// Table key-column metadata needed to choose a chunking strategy.
#[derive(Debug, Clone)]
pub struct KeyColumn {
    pub name: String,
    pub is_integer: bool,
}

const MAX_BINARY_SEARCH_ITERATIONS: u32 = 10;
const LARGE_TABLE_ROW_THRESHOLD: u64 = 1_000_000;

/// Mark the last-produced chunk of a table so the worker can choose the
/// `@@<N>` file-name marker over `@<N>` (spec §6).
fn finalize_is_last(chunks: &mut [ChunkPlan]) {
    if let Some(last) = chunks.last_mut() {
        last.is_last = true;
    }
}

/// Build the tracing SQL comment reproduced from spec §4.5, with this
/// crate's own name standing in for the tool that originated the pattern.
pub fn tracing_comment(schema: &str, table: &str, chunk_id: u64) -> String {
    format!("/* shelldump dump, chunking table `{schema}`.`{table}`, chunk ID: {chunk_id} */")
}

/// Plan chunks for a table. `key` is `None` when no usable index exists
/// (primary key preferred, else any unique column, else no chunking).
pub fn plan_chunks(
    session: &mut dyn Session,
    schema: &str,
    table: &str,
    key: Option<&KeyColumn>,
    row_count_estimate: u64,
    avg_row_length: u64,
    bytes_per_chunk: u64,
) -> Result<Vec<ChunkPlan>> {
    let Some(key) = key else {
        return Ok(vec![ChunkPlan {
            chunk_id: 0,
            range: None,
            include_nulls: true,
            is_last: true,
        }]);
    };

    if key.is_integer {
        plan_integer_chunks(session, schema, table, key, row_count_estimate, avg_row_length, bytes_per_chunk)
    } else {
        plan_paginated_chunks(session, schema, table, key, row_count_estimate, avg_row_length, bytes_per_chunk)
    }
}

fn rows_per_chunk(avg_row_length: u64, bytes_per_chunk: u64) -> u64 {
    (bytes_per_chunk / avg_row_length.max(1)).max(1)
}

fn query_min_max(session: &mut dyn Session, schema: &str, table: &str, col: &str) -> Result<Option<(i128, i128)>> {
    let sql = format!("SELECT MIN(`{col}`), MAX(`{col}`) FROM `{schema}`.`{table}`");
    let rows = session.query_rows(&sql)?;
    let Some(row) = rows.first() else { return Ok(None) };
    let lo = row.get_as_string(0).and_then(|s| s.parse::<i128>().ok());
    let hi = row.get_as_string(1).and_then(|s| s.parse::<i128>().ok());
    Ok(lo.zip(hi))
}

fn explain_count_between(session: &mut dyn Session, schema: &str, table: &str, col: &str, begin: i128, end: i128) -> Result<u64> {
    let sql = format!(
        "EXPLAIN SELECT COUNT(*) FROM `{schema}`.`{table}` WHERE `{col}` BETWEEN {begin} AND {end}"
    );
    let rows = session.query_rows(&sql)?;
    Ok(rows.first().and_then(|r| r.get_uint(0)).unwrap_or(0))
}

fn plan_integer_chunks(
    session: &mut dyn Session,
    schema: &str,
    table: &str,
    key: &KeyColumn,
    row_count_estimate: u64,
    avg_row_length: u64,
    bytes_per_chunk: u64,
) -> Result<Vec<ChunkPlan>> {
    let Some((min, max)) = query_min_max(session, schema, table, &key.name)? else {
        // table has no non-null key values: one empty chunk that still
        // captures any NULL-keyed rows.
        return Ok(vec![ChunkPlan {
            chunk_id: 0,
            range: None,
            include_nulls: true,
            is_last: true,
        }]);
    };

    let per_chunk = rows_per_chunk(avg_row_length, bytes_per_chunk);
    let estimated_chunks = (row_count_estimate / per_chunk).max(1);
    let span = (max - min + 1).max(1);
    let estimated_step = (span / estimated_chunks as i128).max(1);

    let mut chunks = Vec::new();
    let mut start = min;
    let mut chunk_id = 0u64;

    if row_count_estimate < LARGE_TABLE_ROW_THRESHOLD {
        while start <= max {
            let mut end = start + estimated_step - 1;
            if max - end <= estimated_step / 4 {
                end = max;
            }
            chunks.push(ChunkPlan {
                chunk_id,
                range: Some(Range {
                    begin: start.to_string(),
                    end: end.to_string(),
                }),
                include_nulls: chunk_id == 0,
                is_last: false,
            });
            chunk_id += 1;
            start = end + 1;
        }
    } else {
        let accuracy = (estimated_step / 10).max(10);
        while start <= max {
            let mut left = start;
            let mut right = (start + 2 * estimated_step).min(max);
            let mut mid = right;
            let mut iterations = 0;
            loop {
                mid = left + (right - left) / 2;
                let count = explain_count_between(session, schema, table, &key.name, start, mid)? as i128;
                iterations += 1;
                let diff = count - per_chunk as i128;
                if diff.abs() <= accuracy || iterations >= MAX_BINARY_SEARCH_ITERATIONS as i32 || right <= left {
                    break;
                }
                if diff > 0 {
                    right = mid;
                } else {
                    left = mid;
                }
            }
            let mut end = mid.max(start);
            if max - end <= estimated_step / 4 {
                end = max;
            }
            chunks.push(ChunkPlan {
                chunk_id,
                range: Some(Range {
                    begin: start.to_string(),
                    end: end.to_string(),
                }),
                include_nulls: chunk_id == 0,
                is_last: false,
            });
            chunk_id += 1;
            start = end + 1;
        }
    }

    if chunks.is_empty() {
        chunks.push(ChunkPlan {
            chunk_id: 0,
            range: Some(Range {
                begin: min.to_string(),
                end: max.to_string(),
            }),
            include_nulls: true,
            is_last: false,
        });
    }

    finalize_is_last(&mut chunks);
    Ok(chunks)
}

fn query_nth_after(session: &mut dyn Session, schema: &str, table: &str, col: &str, after: Option<&str>, n: u64) -> Result<Option<String>> {
    let where_clause = match after {
        Some(v) => format!("WHERE `{col}` > {v} "),
        None => String::new(),
    };
    let sql = format!("SELECT `{col}` FROM `{schema}`.`{table}` {where_clause}ORDER BY `{col}` LIMIT {n},1");
    let rows = session.query_rows(&sql)?;
    Ok(rows.first().and_then(|r| r.get_as_string(0)))
}

fn plan_paginated_chunks(
    session: &mut dyn Session,
    schema: &str,
    table: &str,
    key: &KeyColumn,
    row_count_estimate: u64,
    avg_row_length: u64,
    bytes_per_chunk: u64,
) -> Result<Vec<ChunkPlan>> {
    let per_chunk = rows_per_chunk(avg_row_length, bytes_per_chunk);
    let Some((global_min, global_max)) = query_min_max_text(session, schema, table, &key.name)? else {
        return Ok(vec![ChunkPlan {
            chunk_id: 0,
            range: None,
            include_nulls: true,
            is_last: true,
        }]);
    };

    let mut chunks = Vec::new();
    // `cursor` is the previous chunk's end, an exclusive lower bound for the
    // next one. Each chunk's own `begin` is re-derived as the first row
    // strictly greater than `cursor` rather than reusing `cursor` itself, so
    // that the closed-closed `BETWEEN begin AND end` the worker builds from
    // this range never re-selects the row that closed the previous chunk.
    let mut cursor: Option<String> = None;
    let mut chunk_id = 0u64;
    let n = per_chunk.saturating_sub(1);

    loop {
        let begin = match &cursor {
            None => global_min.clone(),
            Some(c) => match query_nth_after(session, schema, table, &key.name, Some(c), 0)? {
                Some(v) => v,
                None => break,
            },
        };
        let end = match query_nth_after(session, schema, table, &key.name, cursor.as_deref(), n)? {
            Some(v) => v,
            None => global_max.clone(),
        };
        let at_end = end == global_max;
        chunks.push(ChunkPlan {
            chunk_id,
            range: Some(Range { begin, end: end.clone() }),
            include_nulls: chunk_id == 0,
            is_last: false,
        });
        if at_end {
            break;
        }
        cursor = Some(end);
        chunk_id += 1;
        if row_count_estimate > 0 && chunk_id as u64 > row_count_estimate {
            return Err(DumpError::Fatal(format!(
                "chunk planning for `{schema}`.`{table}` did not converge"
            )));
        }
    }

    finalize_is_last(&mut chunks);
    Ok(chunks)
}

fn query_min_max_text(session: &mut dyn Session, schema: &str, table: &str, col: &str) -> Result<Option<(String, String)>> {
    let sql = format!("SELECT MIN(`{col}`), MAX(`{col}`) FROM `{schema}`.`{table}`");
    let rows = session.query_rows(&sql)?;
    let Some(row) = rows.first() else { return Ok(None) };
    match (row.get_as_string(0), row.get_as_string(1)) {
        (Some(lo), Some(hi)) => Ok(Some((lo, hi))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ColumnType, FixtureColumn, FixtureSession, FixtureTable};

    fn session_with_rows(n: i64) -> FixtureSession {
        let mut s = FixtureSession::new();
        let rows = (1..=n)
            .map(|i| vec![Some(i.to_string().into_bytes())])
            .collect();
        s.add_table(
            "s",
            "w",
            FixtureTable {
                columns: vec![FixtureColumn { name: "id".into(), ty: ColumnType::Int }],
                key_index: Some(0),
                rows,
                create_ddl: String::new(),
            },
        );
        s
    }

    #[test]
    fn integer_chunking_covers_whole_range_in_four_chunks() {
        let mut session = session_with_rows(10_000);
        let key = KeyColumn { name: "id".into(), is_integer: true };
        // 10_000 rows, want ~4 chunks => bytes_per_chunk / avg_row_length ~= 2500
        let chunks = plan_chunks(&mut session, "s", "w", Some(&key), 10_000, 4, 10_000).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].range.as_ref().unwrap().begin, "1");
        assert_eq!(chunks.last().unwrap().range.as_ref().unwrap().end, "10000");
        assert!(chunks[0].include_nulls);
        assert!(!chunks[1].include_nulls);

        // ranges disjoint and monotonic
        let mut prev_end: i128 = -1;
        for c in &chunks {
            let r = c.range.as_ref().unwrap();
            let begin: i128 = r.begin.parse().unwrap();
            let end: i128 = r.end.parse().unwrap();
            assert!(begin > prev_end);
            assert!(end >= begin);
            prev_end = end;
        }
    }

    #[test]
    fn paginated_chunking_covers_whole_range_without_overlap() {
        let mut session = session_with_rows(23);
        // Forces the `LIMIT n,1` pagination path (spec §4.5 "non-integer
        // ordered type"); the fixture's rows happen to be numeric-looking
        // strings, which is enough to exercise the range math.
        let key = KeyColumn { name: "id".into(), is_integer: false };
        let chunks = plan_chunks(&mut session, "s", "w", Some(&key), 23, 8, 40).unwrap();
        assert!(chunks.len() > 1, "expected more than one chunk to exercise pagination");
        assert_eq!(chunks[0].range.as_ref().unwrap().begin, "1");
        assert_eq!(chunks.last().unwrap().range.as_ref().unwrap().end, "23");
        assert!(chunks.last().unwrap().is_last);

        let mut seen = std::collections::HashSet::new();
        let mut prev_end: i128 = 0;
        for (i, c) in chunks.iter().enumerate() {
            let r = c.range.as_ref().unwrap();
            let begin: i128 = r.begin.parse().unwrap();
            let end: i128 = r.end.parse().unwrap();
            assert!(end >= begin);
            if i > 0 {
                assert!(begin > prev_end, "chunk {i} begin {begin} must exceed previous end {prev_end}");
            }
            for v in begin..=end {
                assert!(seen.insert(v), "value {v} covered by more than one chunk");
            }
            prev_end = end;
        }
    }

    #[test]
    fn no_key_column_yields_single_chunk() {
        let mut session = session_with_rows(5);
        let chunks = plan_chunks(&mut session, "s", "w", None, 5, 8, 1024).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].range.is_none());
        assert!(chunks[0].include_nulls);
    }

    #[test]
    fn tracing_comment_contains_schema_table_and_chunk_id() {
        let c = tracing_comment("s", "w", 3);
        assert!(c.contains("`s`.`w`"));
        assert!(c.contains("chunk ID: 3"));
    }
}
