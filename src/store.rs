use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::error::StoreError;
use crate::extract::ExtractedRecord;
use crate::kv::KeyValue;

/// The single aggregate key. Everything the store owns lives under it.
pub const STORAGE_KEY: &str = "problem_set";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetInfo {
    pub title: String,
    pub submitted_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemRecord {
    pub id: String,
    pub name: String,
    pub submission_link: String,
    pub code: String,
    pub language: String,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub order: usize,
}

/// Fields an update may touch; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct ProblemPatch {
    pub name: Option<String>,
    pub submission_link: Option<String>,
    pub code: Option<String>,
    pub language: Option<String>,
}

/// The persisted aggregate. Decoding is lenient: a non-list `problems`
/// field becomes empty, and records that fail to decode are skipped, so
/// a partially corrupted aggregate degrades instead of wedging every
/// operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProblemSet {
    pub info: SetInfo,
    #[serde(deserialize_with = "lenient_records")]
    pub problems: Vec<ProblemRecord>,
}

fn lenient_records<'de, D>(deserializer: D) -> Result<Vec<ProblemRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()),
        _ => Ok(Vec::new()),
    }
}

#[derive(Debug)]
pub struct StoreStats {
    pub problems: usize,
    pub languages: Vec<(String, usize)>,
    pub info_set: bool,
}

/// CRUD over the persisted problem set. Every mutation is a
/// read-modify-write that re-establishes the dense ordering invariant
/// (`problems[i].order == i`) and writes back against the version it
/// read.
pub struct Store<K: KeyValue> {
    kv: K,
}

impl<K: KeyValue> Store<K> {
    pub fn new(kv: K) -> Self {
        Store { kv }
    }

    fn load(&self) -> Result<(u64, ProblemSet), StoreError> {
        match self.kv.load(STORAGE_KEY)? {
            Some(versioned) => {
                let set = serde_json::from_value(versioned.value)
                    .unwrap_or_else(|e| {
                        warn!("malformed aggregate, starting from empty: {}", e);
                        ProblemSet::default()
                    });
                Ok((versioned.version, set))
            }
            None => Ok((0, ProblemSet::default())),
        }
    }

    fn save(&self, version: u64, set: &ProblemSet) -> Result<(), StoreError> {
        let value = serde_json::to_value(set).map_err(crate::error::KvError::from)?;
        self.kv
            .store(STORAGE_KEY, version, &value)
            .map_err(|e| match e {
                crate::error::KvError::VersionConflict(_) => StoreError::Conflict,
                other => StoreError::Kv(other),
            })?;
        Ok(())
    }

    /// Overwrite the set metadata entirely with trimmed values.
    pub fn set_info(&self, title: &str, submitted_by: &str) -> Result<(), StoreError> {
        let title = title.trim();
        let submitted_by = submitted_by.trim();
        if title.is_empty() {
            return Err(StoreError::blank("title"));
        }
        if submitted_by.is_empty() {
            return Err(StoreError::blank("submittedBy"));
        }

        let (version, mut set) = self.load()?;
        set.info = SetInfo {
            title: title.to_string(),
            submitted_by: submitted_by.to_string(),
        };
        self.save(version, &set)
    }

    /// Never fails on a missing aggregate: absent fields read as empty.
    pub fn get_info(&self) -> Result<SetInfo, StoreError> {
        Ok(self.load()?.1.info)
    }

    /// Append a captured record at the end of the ordering. Required
    /// fields are checked in order; the first blank one is reported.
    pub fn add_problem(&self, record: &ExtractedRecord) -> Result<ProblemRecord, StoreError> {
        for (field, value) in [
            ("name", &record.name),
            ("submissionLink", &record.submission_link),
            ("code", &record.code),
            ("language", &record.language),
        ] {
            if value.trim().is_empty() {
                return Err(StoreError::blank(field));
            }
        }

        let (version, mut set) = self.load()?;
        let problem = ProblemRecord {
            id: Uuid::new_v4().to_string(),
            name: record.name.clone(),
            submission_link: record.submission_link.clone(),
            code: record.code.clone(),
            language: record.language.clone(),
            captured_at: Utc::now(),
            order: set.problems.len(),
        };
        set.problems.push(problem.clone());
        self.save(version, &set)?;
        Ok(problem)
    }

    /// Shallow-merge the patch onto an existing record.
    pub fn update_problem(&self, id: &str, patch: &ProblemPatch) -> Result<(), StoreError> {
        let (version, mut set) = self.load()?;
        let record = set
            .problems
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Some(name) = &patch.name {
            record.name = name.clone();
        }
        if let Some(link) = &patch.submission_link {
            record.submission_link = link.clone();
        }
        if let Some(code) = &patch.code {
            record.code = code.clone();
        }
        if let Some(language) = &patch.language {
            record.language = language.clone();
        }
        self.save(version, &set)
    }

    /// Remove a record and renumber the survivors. An absent id is a
    /// benign no-op: the record may already be gone.
    pub fn delete_problem(&self, id: &str) -> Result<(), StoreError> {
        let (version, mut set) = self.load()?;
        let before = set.problems.len();
        set.problems.retain(|p| p.id != id);
        if set.problems.len() == before {
            warn!("delete of unknown problem id {}, nothing removed", id);
            return Ok(());
        }
        renumber(&mut set.problems);
        self.save(version, &set)
    }

    /// All records, ascending by `order`. A missing `order` sorts as 0.
    pub fn list_problems(&self) -> Result<Vec<ProblemRecord>, StoreError> {
        let (_, set) = self.load()?;
        let mut problems = set.problems;
        problems.sort_by_key(|p| p.order);
        Ok(problems)
    }

    /// Replace the ordering with exactly `ordered_ids`: records are
    /// renumbered by their position, ids with no matching record are
    /// skipped, and records whose id is omitted are dropped. Callers
    /// reordering in place must pass a complete permutation.
    pub fn reorder_problems(&self, ordered_ids: &[String]) -> Result<(), StoreError> {
        if ordered_ids.is_empty() {
            return Err(StoreError::InvalidInput {
                field: "orderedIds",
                reason: "must be a non-empty list",
            });
        }

        let (version, mut set) = self.load()?;
        let mut remaining = std::mem::take(&mut set.problems);
        let mut reordered = Vec::with_capacity(ordered_ids.len());
        for id in ordered_ids {
            if let Some(pos) = remaining.iter().position(|p| p.id == *id) {
                reordered.push(remaining.remove(pos));
            }
        }
        let dropped = remaining.len();
        if dropped > 0 || reordered.len() != ordered_ids.len() {
            warn!(
                "reorder matched {} of {} ids, dropping {} unlisted records",
                reordered.len(),
                ordered_ids.len(),
                dropped
            );
        }
        renumber(&mut reordered);
        set.problems = reordered;
        self.save(version, &set)
    }

    /// Destroy the whole aggregate, metadata included.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        self.kv.remove(STORAGE_KEY)?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let (_, set) = self.load()?;
        let mut languages: Vec<(String, usize)> = Vec::new();
        for p in &set.problems {
            match languages.iter_mut().find(|(l, _)| *l == p.language) {
                Some((_, n)) => *n += 1,
                None => languages.push((p.language.clone(), 1)),
            }
        }
        languages.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(StoreStats {
            problems: set.problems.len(),
            languages,
            info_set: set.info != SetInfo::default(),
        })
    }
}

fn renumber(problems: &mut [ProblemRecord]) {
    for (i, p) in problems.iter_mut().enumerate() {
        p.order = i;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::SqliteKv;
    use serde_json::json;

    fn store() -> Store<SqliteKv> {
        Store::new(SqliteKv::in_memory().unwrap())
    }

    fn record(name: &str) -> ExtractedRecord {
        ExtractedRecord {
            name: name.to_string(),
            code: "def f(n):\n    return n".to_string(),
            language: "Python3".to_string(),
            submission_link: "/submissions/detail/1/".to_string(),
        }
    }

    fn orders(store: &Store<SqliteKv>) -> Vec<usize> {
        store
            .list_problems()
            .unwrap()
            .iter()
            .map(|p| p.order)
            .collect()
    }

    #[test]
    fn add_appends_dense_orders() {
        let s = store();
        for name in ["a", "b", "c"] {
            s.add_problem(&record(name)).unwrap();
        }
        assert_eq!(orders(&s), vec![0, 1, 2]);
    }

    #[test]
    fn add_rejects_first_blank_field_in_order() {
        let s = store();
        let mut r = record("a");
        r.code = "  ".to_string();
        r.language = String::new();
        // code comes before language in the declared check order
        match s.add_problem(&r) {
            Err(StoreError::InvalidInput { field, .. }) => assert_eq!(field, "code"),
            other => panic!("expected InvalidInput, got {:?}", other),
        }
        assert!(s.list_problems().unwrap().is_empty());
    }

    #[test]
    fn delete_renumbers_survivors() {
        let s = store();
        let ids: Vec<String> = ["a", "b", "c"]
            .iter()
            .map(|n| s.add_problem(&record(n)).unwrap().id)
            .collect();
        s.delete_problem(&ids[1]).unwrap();
        let listed = s.list_problems().unwrap();
        assert_eq!(
            listed.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "c"]
        );
        assert_eq!(orders(&s), vec![0, 1]);
    }

    #[test]
    fn add_after_delete_never_reuses_stale_order() {
        let s = store();
        let ids: Vec<String> = ["a", "b", "c"]
            .iter()
            .map(|n| s.add_problem(&record(n)).unwrap().id)
            .collect();
        s.delete_problem(&ids[0]).unwrap();
        let added = s.add_problem(&record("d")).unwrap();
        assert_eq!(added.order, 2);
        assert_eq!(orders(&s), vec![0, 1, 2]);
    }

    #[test]
    fn delete_of_absent_id_is_noop() {
        let s = store();
        s.add_problem(&record("a")).unwrap();
        s.delete_problem("no-such-id").unwrap();
        assert_eq!(s.list_problems().unwrap().len(), 1);
    }

    #[test]
    fn update_merges_patch() {
        let s = store();
        let id = s.add_problem(&record("a")).unwrap().id;
        s.update_problem(
            &id,
            &ProblemPatch {
                name: Some("renamed".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        let listed = s.list_problems().unwrap();
        assert_eq!(listed[0].name, "renamed");
        assert_eq!(listed[0].language, "Python3");
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let s = store();
        assert!(matches!(
            s.update_problem("missing", &ProblemPatch::default()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn reorder_permutation_keeps_records() {
        let s = store();
        let ids: Vec<String> = ["a", "b", "c"]
            .iter()
            .map(|n| s.add_problem(&record(n)).unwrap().id)
            .collect();
        s.reorder_problems(&[ids[2].clone(), ids[0].clone(), ids[1].clone()])
            .unwrap();
        let listed = s.list_problems().unwrap();
        assert_eq!(
            listed.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["c", "a", "b"]
        );
        assert_eq!(orders(&s), vec![0, 1, 2]);
    }

    #[test]
    fn reorder_omitting_an_id_drops_it() {
        let s = store();
        let ids: Vec<String> = ["a", "b", "c"]
            .iter()
            .map(|n| s.add_problem(&record(n)).unwrap().id)
            .collect();
        s.reorder_problems(&[ids[2].clone(), ids[0].clone()]).unwrap();
        let listed = s.list_problems().unwrap();
        assert_eq!(
            listed.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["c", "a"]
        );
    }

    #[test]
    fn reorder_unknown_ids_silently_skipped() {
        let s = store();
        let id = s.add_problem(&record("a")).unwrap().id;
        s.reorder_problems(&["ghost".to_string(), id]).unwrap();
        assert_eq!(s.list_problems().unwrap().len(), 1);
        assert_eq!(orders(&s), vec![0]);
    }

    #[test]
    fn reorder_empty_list_rejected() {
        let s = store();
        assert!(matches!(
            s.reorder_problems(&[]),
            Err(StoreError::InvalidInput { .. })
        ));
    }

    #[test]
    fn set_info_trims_and_overwrites() {
        let s = store();
        s.set_info("  Weekly Set 3  ", " Alice ").unwrap();
        let info = s.get_info().unwrap();
        assert_eq!(info.title, "Weekly Set 3");
        assert_eq!(info.submitted_by, "Alice");
    }

    #[test]
    fn set_info_blank_title_writes_nothing() {
        let s = store();
        assert!(matches!(
            s.set_info("", "Alice"),
            Err(StoreError::InvalidInput { field: "title", .. })
        ));
        assert_eq!(s.get_info().unwrap(), SetInfo::default());
    }

    #[test]
    fn get_info_on_missing_aggregate_is_empty() {
        let s = store();
        assert_eq!(s.get_info().unwrap(), SetInfo::default());
    }

    #[test]
    fn clear_destroys_info_and_problems() {
        let s = store();
        s.set_info("T", "A").unwrap();
        s.add_problem(&record("a")).unwrap();
        s.clear_all().unwrap();
        assert_eq!(s.get_info().unwrap(), SetInfo::default());
        assert!(s.list_problems().unwrap().is_empty());
    }

    #[test]
    fn non_list_problems_reads_empty() {
        let kv = SqliteKv::in_memory().unwrap();
        kv.store(
            STORAGE_KEY,
            0,
            &json!({ "info": { "title": "T", "submittedBy": "A" }, "problems": "corrupted" }),
        )
        .unwrap();
        let s = Store::new(kv);
        assert!(s.list_problems().unwrap().is_empty());
        assert_eq!(s.get_info().unwrap().title, "T");
    }

    #[test]
    fn malformed_records_skipped_and_missing_order_sorts_first() {
        let kv = SqliteKv::in_memory().unwrap();
        kv.store(
            STORAGE_KEY,
            0,
            &json!({ "problems": [
                { "id": "b", "name": "B", "submissionLink": "/s/2/", "code": "c",
                  "language": "C", "capturedAt": "2026-08-01T00:00:00Z", "order": 5 },
                42,
                { "id": "a", "name": "A", "submissionLink": "/s/1/", "code": "c",
                  "language": "C", "capturedAt": "2026-08-01T00:00:00Z" }
            ]}),
        )
        .unwrap();
        let s = Store::new(kv);
        let listed = s.list_problems().unwrap();
        assert_eq!(
            listed.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn stats_counts_languages() {
        let s = store();
        s.add_problem(&record("a")).unwrap();
        s.add_problem(&record("b")).unwrap();
        let mut cpp = record("c");
        cpp.language = "C++".to_string();
        s.add_problem(&cpp).unwrap();
        let stats = s.stats().unwrap();
        assert_eq!(stats.problems, 3);
        assert_eq!(stats.languages[0], ("Python3".to_string(), 2));
        assert!(!stats.info_set);
    }
}
