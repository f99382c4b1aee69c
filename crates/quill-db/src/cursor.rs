use std::cmp::Ordering;
use std::sync::mpsc;
use std::sync::Arc;

use quill_model::{compare_things_with, get_dot_value, match_query, modify, Document, Value};

use crate::core::Core;
use crate::error::DbError;
use crate::executor::{Executor, Ticket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

type WherePredicate = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

pub(crate) struct CursorSpec {
    query: Document,
    sort: Vec<(String, SortDirection)>,
    skip: usize,
    limit: Option<usize>,
    projection: Option<Document>,
    where_pred: Option<WherePredicate>,
}

/// A deferred query.
///
/// Builder methods refine it; `exec` ships it to the executor, which applies
/// the predicate, the optional sort, skip/limit and the projection against
/// the candidate set. Results are deep clones, so mutating them cannot alter
/// the cache.
pub struct Cursor {
    executor: Arc<Executor>,
    spec: CursorSpec,
}

impl Cursor {
    pub(crate) fn new(executor: Arc<Executor>, query: Document) -> Self {
        Self {
            executor,
            spec: CursorSpec {
                query,
                sort: Vec::new(),
                skip: 0,
                limit: None,
                projection: None,
                where_pred: None,
            },
        }
    }

    /// Sort by one or more dot-path keys, applied in order.
    pub fn sort(mut self, keys: &[(&str, SortDirection)]) -> Self {
        self.spec.sort = keys
            .iter()
            .map(|(field, direction)| ((*field).to_string(), *direction))
            .collect();
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.spec.skip = n;
        self
    }

    /// Limit the number of results. Zero means unlimited.
    pub fn limit(mut self, n: usize) -> Self {
        self.spec.limit = Some(n);
        self
    }

    /// Keys all `1` pick fields, keys all `0` omit them; `_id` may be
    /// omitted independently of the mode.
    pub fn projection(mut self, projection: Document) -> Self {
        self.spec.projection = Some(projection);
        self
    }

    /// Attach a caller predicate, ANDed with the query.
    pub fn matching(mut self, pred: impl Fn(&Document) -> bool + Send + Sync + 'static) -> Self {
        self.spec.where_pred = Some(Arc::new(pred));
        self
    }

    /// Run the query and return the matching documents.
    pub fn exec(self) -> Result<Vec<Document>, DbError> {
        self.exec_queued().wait()
    }

    /// Schedule the query without blocking, useful before the database has
    /// loaded, when blocking calls would wait for `load_database`.
    pub fn exec_queued(self) -> Ticket<Result<Vec<Document>, DbError>> {
        let spec = self.spec;
        let (tx, rx) = mpsc::channel();
        self.executor.submit(
            false,
            Box::new(move |core| {
                let _ = tx.send(exec_docs(&spec, core));
            }),
        );
        Ticket::new(rx)
    }

    /// Run the query and return the first result, if any.
    pub fn first(self) -> Result<Option<Document>, DbError> {
        let mut docs = self.limit(1).exec()?;
        Ok(if docs.is_empty() {
            None
        } else {
            Some(docs.remove(0))
        })
    }

    /// Count the matching documents (projection is irrelevant here).
    pub fn count(self) -> Result<usize, DbError> {
        let spec = self.spec;
        let (tx, rx) = mpsc::channel();
        self.executor.submit(
            false,
            Box::new(move |core| {
                let _ = tx.send(collect_matching(&spec, core).map(|docs| docs.len()));
            }),
        );
        Ticket::new(rx).wait()
    }
}

pub(crate) fn exec_docs(spec: &CursorSpec, core: &mut Core) -> Result<Vec<Document>, DbError> {
    let matched = collect_matching(spec, core)?;
    let mut results = Vec::with_capacity(matched.len());
    for doc in matched {
        results.push(match &spec.projection {
            Some(projection) if !projection.is_empty() => apply_projection(&doc, projection)?,
            _ => (*doc).clone(),
        });
    }
    Ok(results)
}

fn collect_matching(spec: &CursorSpec, core: &mut Core) -> Result<Vec<Arc<Document>>, DbError> {
    let candidates = core.get_candidates(&spec.query, false)?;
    let limit = spec.limit.filter(|n| *n > 0);

    let accepts = |doc: &Document| -> Result<bool, DbError> {
        if !match_query(doc, &spec.query)? {
            return Ok(false);
        }
        Ok(spec.where_pred.as_ref().map_or(true, |pred| pred(doc)))
    };

    if spec.sort.is_empty() {
        // No sort: fuse filter, skip and limit into one pass.
        let mut skipped = 0usize;
        let mut results = Vec::new();
        for doc in candidates {
            if !accepts(&doc)? {
                continue;
            }
            if skipped < spec.skip {
                skipped += 1;
                continue;
            }
            results.push(doc);
            if limit.is_some_and(|n| results.len() >= n) {
                break;
            }
        }
        return Ok(results);
    }

    let mut matched = Vec::new();
    for doc in candidates {
        if accepts(&doc)? {
            matched.push(doc);
        }
    }

    let strings = core.compare_strings().map(|cmp| cmp.as_ref());
    matched.sort_by(|a, b| {
        for (key, direction) in &spec.sort {
            let va = get_dot_value(a, key);
            let vb = get_dot_value(b, key);
            let ord = compare_things_with(va.as_ref(), vb.as_ref(), strings);
            let ord = match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });

    let end = match limit {
        Some(n) => (spec.skip + n).min(matched.len()),
        None => matched.len(),
    };
    let start = spec.skip.min(end);
    Ok(matched[start..end].to_vec())
}

/// Apply a projection document to one result.
///
/// Pick mode rebuilds the document from the chosen dot paths; omit mode
/// clones and unsets each listed path. Both reuse the modifier engine.
fn apply_projection(doc: &Document, projection: &Document) -> Result<Document, DbError> {
    let keep_id = projection.get("_id") != Some(&Value::Number(0.0));

    let mut mode: Option<bool> = None; // true = pick, false = omit
    for (key, value) in projection {
        if key == "_id" {
            continue;
        }
        let action = match value {
            Value::Number(n) if *n == 1.0 => true,
            Value::Number(n) if *n == 0.0 => false,
            Value::Bool(b) => *b,
            _ => {
                return Err(DbError::ProjectionConflict(
                    "projection values must be 0 or 1".to_string(),
                ))
            }
        };
        match mode {
            None => mode = Some(action),
            Some(m) if m != action => {
                return Err(DbError::ProjectionConflict(
                    "can't both keep and omit fields except for _id".to_string(),
                ))
            }
            _ => {}
        }
    }

    match mode {
        // Only an `_id` directive (or nothing): the document as-is, minus
        // `_id` when it was opted out.
        None => {
            let mut out = doc.clone();
            if !keep_id {
                out.remove("_id");
            }
            Ok(out)
        }
        Some(true) => {
            let mut picks = Document::new();
            for (key, _) in projection.iter().filter(|(k, _)| *k != "_id") {
                if let Some(value) = get_dot_value(doc, key) {
                    picks.insert(key.clone(), value);
                }
            }
            let mut set = Document::new();
            set.insert("$set".to_string(), Value::Object(picks));
            let mut out = modify(&Document::new(), &set)?;
            if keep_id {
                if let Some(id) = doc.get("_id") {
                    out.insert("_id".to_string(), id.clone());
                }
            } else {
                out.remove("_id");
            }
            Ok(out)
        }
        Some(false) => {
            let mut unsets = Document::new();
            for (key, _) in projection.iter().filter(|(k, _)| *k != "_id") {
                unsets.insert(key.clone(), Value::Bool(true));
            }
            let mut unset = Document::new();
            unset.insert("$unset".to_string(), Value::Object(unsets));
            let mut out = modify(doc, &unset)?;
            if !keep_id {
                out.remove("_id");
            }
            Ok(out)
        }
    }
}
