use crate::error::Result;
use crate::report::{GroupBy, GroupKey, Report};
use crate::row::DatasourceRow;
use once_cell::sync::OnceCell;
use reportkit_types::{Value, normalize_name, resolve_value};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A named group of rows, already ordered for display.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: Value,
    pub rows: Vec<DatasourceRow>,
}

/// Partitions a report's rows into ordered groups.
///
/// The row scan happens once; every accessor reuses it.
pub struct Grouper<'a> {
    report: &'a Report,
    group_by: &'a GroupBy,
    groups: OnceCell<Vec<Group>>,
    scans: AtomicUsize,
}

impl<'a> Grouper<'a> {
    pub fn new(report: &'a Report, group_by: &'a GroupBy) -> Self {
        Self {
            report,
            group_by,
            groups: OnceCell::new(),
            scans: AtomicUsize::new(0),
        }
    }

    /// Groups sorted by the text of their key, rows sorted by the order key.
    pub fn items(&self) -> Result<&[Group]> {
        self.groups
            .get_or_try_init(|| self.process())
            .map(Vec::as_slice)
    }

    pub fn keys(&self) -> Result<Vec<Value>> {
        Ok(self.items()?.iter().map(|g| g.key.clone()).collect())
    }

    pub fn values(&self) -> Result<Vec<&[DatasourceRow]>> {
        Ok(self.items()?.iter().map(|g| g.rows.as_slice()).collect())
    }

    /// Number of row scans performed so far (0 or 1).
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    fn process(&self) -> Result<Vec<Group>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let datasource = self.report.datasource();
        let display_order = self.report.display_order();

        // Sort keys come from the full row; the order key need not be displayed.
        let order = &self.group_by.order;
        let mut buckets: Vec<(Value, Vec<(SortKey, DatasourceRow)>)> = Vec::new();
        for row in datasource.get_data()? {
            let key = self.group_key(row)?;
            let entry = (SortKey(sort_value(row, order)), row.project(&display_order));
            match buckets.iter_mut().find(|(k, _)| *k == key) {
                Some((_, rows)) => rows.push(entry),
                None => buckets.push((key, vec![entry])),
            }
        }

        let mut groups: Vec<Group> = buckets
            .into_iter()
            .map(|(key, mut rows)| {
                rows.sort_by(|a, b| a.0.cmp(&b.0));
                Group {
                    key,
                    rows: rows.into_iter().map(|(_, row)| row).collect(),
                }
            })
            .collect();
        groups.sort_by_cached_key(|g| g.key.to_string());

        tracing::debug!(
            collection = %datasource.collection(),
            groups = groups.len(),
            "grouped rows"
        );
        Ok(groups)
    }

    fn group_key(&self, row: &DatasourceRow) -> Result<Value> {
        let datasource = self.report.datasource();
        match &self.group_by.key {
            GroupKey::Callable(func) => Ok(row
                .original()
                .map(|record| func(record.as_ref()))
                .unwrap_or_default()),
            GroupKey::Column(name) => {
                if let Some(column) = datasource.column(name) {
                    return Ok(match row.original() {
                        Some(record) => column.get_value(record.as_ref(), datasource)?,
                        None => row
                            .get(name)
                            .and_then(|cell| cell.value())
                            .cloned()
                            .unwrap_or_default(),
                    });
                }
                Ok(sort_value(row, name))
            }
        }
    }
}

/// Raw attribute of the source record, else the cell of the same name.
fn sort_value(row: &DatasourceRow, path: &str) -> Value {
    if let Some(record) = row.original() {
        return resolve_value(record.as_ref(), path).unwrap_or_default();
    }
    row.get(&normalize_name(path))
        .and_then(|cell| cell.value())
        .cloned()
        .unwrap_or_default()
}

struct SortKey(Value);

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for SortKey {}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.sort_cmp(&other.0)
    }
}
