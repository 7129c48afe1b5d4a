use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::Serialize;
use sheets_codec::{serialize_record, Record, RECORD_EXTENSION};
use sheets_repo::ObjectDatabase;
use sheets_store::tree::split_path;
use sheets_store::{BlobRef, MutableTree, Node};
use sheets_template::Template;
use tokio::sync::OnceCell;
use tracing::{debug, info, trace};

use crate::cache::RecordCache;
use crate::config::{OpenOptions, SheetConfig};
use crate::diff::{parse_raw_diff, DiffEntry, DiffOptions};
use crate::error::{SheetError, SheetResult};
use crate::normalize::normalize;
use crate::patch::diff_records;
use crate::query::Query;
use crate::queue::WriteQueue;

/// A record returned by a query, with where it was found.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueriedRecord {
    pub sheet: String,
    /// Path relative to the sheet root, without extension.
    pub path: String,
    pub record: Record,
}

/// A record about to be written, with the path it was read from.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingRecord {
    pub record: Record,
    /// Where the record lived before; the stale path is removed when the
    /// record now renders elsewhere.
    pub previous_path: Option<String>,
}

impl From<Record> for PendingRecord {
    fn from(record: Record) -> Self {
        Self {
            record,
            previous_path: None,
        }
    }
}

impl From<QueriedRecord> for PendingRecord {
    fn from(queried: QueriedRecord) -> Self {
        Self {
            record: queried.record,
            previous_path: Some(queried.path),
        }
    }
}

/// Outcome of an upsert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpsertResult {
    pub blob: BlobRef,
    /// Path relative to the sheet root, without extension.
    pub path: String,
}

/// Lazy sequence of query matches.
pub type RecordStream = BoxStream<'static, SheetResult<QueriedRecord>>;

/// A named, configured collection of records inside a workspace tree.
///
/// Cloning is cheap; clones share the config, write queue and record cache.
#[derive(Clone)]
pub struct Sheet {
    inner: Arc<SheetInner>,
}

struct SheetInner {
    name: String,
    db: Arc<dyn ObjectDatabase>,
    workspace: MutableTree,
    options: OpenOptions,
    config: OnceCell<Arc<SheetConfig>>,
    writes: WriteQueue,
    cache: RecordCache,
}

impl std::fmt::Debug for Sheet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sheet")
            .field("name", &self.inner.name)
            .field("pending_writes", &self.inner.writes.pending())
            .field("cached_records", &self.inner.cache.len())
            .finish()
    }
}

fn record_file(path: &str) -> String {
    format!("{path}.{RECORD_EXTENSION}")
}

fn is_within(dir: Option<&str>, path: &str) -> bool {
    dir.and_then(|dir| path.strip_prefix(dir))
        .is_some_and(|rest| rest.starts_with('/'))
}

fn strip_extension(path: &str) -> &str {
    path.strip_suffix(&format!(".{RECORD_EXTENSION}"))
        .unwrap_or(path)
}

impl Sheet {
    /// A sheet over `workspace`. Its config is read on first use.
    pub fn new(
        db: Arc<dyn ObjectDatabase>,
        workspace: MutableTree,
        name: impl Into<String>,
        options: OpenOptions,
    ) -> Self {
        Self {
            inner: Arc::new(SheetInner {
                name: name.into(),
                db,
                workspace,
                options,
                config: OnceCell::new(),
                writes: WriteQueue::new(),
                cache: RecordCache::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn workspace(&self) -> &MutableTree {
        &self.inner.workspace
    }

    pub fn pending_writes(&self) -> usize {
        self.inner.writes.pending()
    }

    /// The sheet's config, read once per instance.
    pub async fn config(&self) -> SheetResult<Arc<SheetConfig>> {
        self.inner
            .config
            .get_or_try_init(|| self.read_config())
            .await
            .cloned()
    }

    async fn read_config(&self) -> SheetResult<Arc<SheetConfig>> {
        let path = self.inner.options.config_path(&self.inner.name);
        let blob = match self.inner.workspace.get_child(&path)? {
            Some(Node::Blob(blob)) => blob,
            _ => {
                return Err(SheetError::Config(format!(
                    "sheet {:?} has no config at {path}",
                    self.inner.name
                )))
            }
        };
        let bytes = self.inner.db.read_blob(&blob.id).await?;
        let config = SheetConfig::from_bytes(&bytes)?;
        debug!(sheet = %self.inner.name, template = %config.path, "loaded sheet config");
        Ok(Arc::new(config))
    }

    /// Path of the sheet's root inside the workspace.
    pub async fn root_path(&self) -> SheetResult<String> {
        Ok(self.inner.options.data_root(&*self.config().await?))
    }

    async fn root_tree(&self, create: bool) -> SheetResult<Option<MutableTree>> {
        let root = self.root_path().await?;
        Ok(self.inner.workspace.get_subtree(&root, create)?)
    }

    async fn render(&self, record: Record) -> SheetResult<(Record, String)> {
        let config = self.config().await?;
        let record = normalize(record, &config.fields)?;
        let path = Template::compile(&config.path)?.render(&record)?;
        Ok((record, path))
    }

    /// The path `record` would be stored under, without writing it.
    pub async fn path_for(&self, record: &Record) -> SheetResult<String> {
        Ok(self.render(record.clone()).await?.1)
    }

    // ---- Writing ----

    /// Normalize and store a record at its rendered path.
    pub async fn upsert(&self, pending: impl Into<PendingRecord>) -> SheetResult<UpsertResult> {
        let PendingRecord {
            record,
            previous_path,
        } = pending.into();
        let _ticket = self.inner.writes.begin();

        let (record, path) = self.render(record).await?;
        let bytes = serialize_record(&record)?;
        let root = self
            .root_tree(true)
            .await?
            .ok_or_else(|| SheetError::Config("sheet root could not be created".into()))?;

        if let Some(previous) = previous_path.filter(|p| *p != path) {
            root.delete_child(&record_file(&previous))?;
            if let Some(Node::Tree(attachments)) = root.get_child(&previous)? {
                root.delete_child(&previous)?;
                root.write_child(&path, attachments)?;
            }
            debug!(sheet = %self.inner.name, from = %previous, to = %path, "moved record");
        }

        let blob = self.inner.db.write_blob(&bytes).await?;
        root.write_child(&record_file(&path), blob)?;
        debug!(sheet = %self.inner.name, path = %path, blob = %blob.id.short_hex(), "upserted record");
        Ok(UpsertResult { blob, path })
    }

    /// Remove a record and its attachments. Returns whether it existed.
    pub async fn delete(&self, record: &Record) -> SheetResult<bool> {
        let path = self.path_for(record).await?;
        self.delete_path(&path).await
    }

    /// Remove the record stored at `path` and its attachments.
    pub async fn delete_path(&self, path: &str) -> SheetResult<bool> {
        let _ticket = self.inner.writes.begin();
        let Some(root) = self.root_tree(false).await? else {
            return Ok(false);
        };
        let removed = root.delete_child(&record_file(path))?.is_some();
        if let Some(Node::Tree(_)) = root.get_child(path)? {
            root.delete_child(path)?;
        }
        debug!(sheet = %self.inner.name, path, removed, "deleted record");
        Ok(removed)
    }

    /// Empty the sheet's root. The sheet configs survive even when they
    /// live inside it.
    pub async fn clear(&self) -> SheetResult<()> {
        let _ticket = self.inner.writes.begin();
        let root = self.root_path().await?;
        let workspace = &self.inner.workspace;
        let config_dir = self.inner.options.config_dir();
        let saved = workspace.get_child(&config_dir)?;

        if split_path(&root).is_empty() {
            workspace.retain_only(&[])?;
        } else {
            workspace.write_child(&root, MutableTree::new(self.inner.db.store()))?;
        }
        match saved {
            Some(Node::Tree(dir)) => {
                workspace.write_child(&config_dir, dir)?;
            }
            Some(Node::Blob(blob)) => {
                workspace.write_child(&config_dir, blob)?;
            }
            None => {}
        }
        info!(sheet = %self.inner.name, root = %root, "cleared sheet");
        Ok(())
    }

    /// Re-store every record so it matches the current config. Returns the
    /// number of records rewritten.
    pub async fn normalize_all(&self) -> SheetResult<usize> {
        let records = self.query_all(Query::all()).await?;
        let count = records.len();
        for queried in records {
            self.upsert(queried).await?;
        }
        self.finish_writing().await;
        info!(sheet = %self.inner.name, count, "normalized records");
        Ok(count)
    }

    /// Wait for every in-flight write on this sheet.
    pub async fn finish_writing(&self) {
        self.inner.writes.finish_writing().await;
    }

    // ---- Reading ----

    /// Records matching `query`, found by walking the path template and then
    /// checking every criterion against the decoded record.
    pub async fn query(&self, query: impl Into<Query>) -> SheetResult<RecordStream> {
        let query = query.into();
        let config = self.config().await?;
        let template = Template::compile(&config.path)?;
        let Some(root) = self.root_tree(false).await? else {
            return Ok(stream::empty::<SheetResult<QueriedRecord>>().boxed());
        };

        let hidden = self.config_dir_within(&self.root_path().await?);
        let sheet = self.clone();
        let candidates = template.query_tree(root, query.path_hint());
        Ok(candidates
            .map_err(SheetError::from)
            .try_filter_map(move |(path, blob)| {
                let sheet = sheet.clone();
                let query = query.clone();
                let hidden = is_within(hidden.as_deref(), &path);
                async move {
                    if hidden {
                        return Ok(None);
                    }
                    sheet.load_match(&query, &path, &blob).await
                }
            })
            .boxed())
    }

    async fn load_match(
        &self,
        query: &Query,
        path: &str,
        blob: &BlobRef,
    ) -> SheetResult<Option<QueriedRecord>> {
        let record = self.inner.cache.load(&*self.inner.db, &blob.id).await?;
        if !query.matches_record(&record) {
            trace!(sheet = %self.inner.name, path, "skipped candidate");
            return Ok(None);
        }
        Ok(Some(QueriedRecord {
            sheet: self.inner.name.clone(),
            path: strip_extension(path).to_string(),
            record: (*record).clone(),
        }))
    }

    /// The config directory relative to `root`, when it lies inside it.
    fn config_dir_within(&self, root: &str) -> Option<String> {
        let dir = self.inner.options.config_dir();
        if root.is_empty() {
            return Some(dir);
        }
        dir.strip_prefix(&format!("{root}/")).map(str::to_string)
    }

    pub async fn query_first(&self, query: impl Into<Query>) -> SheetResult<Option<QueriedRecord>> {
        self.query(query).await?.try_next().await
    }

    pub async fn query_all(&self, query: impl Into<Query>) -> SheetResult<Vec<QueriedRecord>> {
        self.query(query).await?.try_collect().await
    }

    // ---- Attachments ----

    async fn attachment_dir(&self, record: &Record) -> SheetResult<Option<MutableTree>> {
        let path = self.path_for(record).await?;
        let Some(root) = self.root_tree(false).await? else {
            return Ok(None);
        };
        Ok(root.get_child(&path)?.and_then(|node| node.as_tree().cloned()))
    }

    /// Every attachment of `record`, keyed by attachment-local path.
    pub async fn get_attachments(&self, record: &Record) -> SheetResult<BTreeMap<String, BlobRef>> {
        match self.attachment_dir(record).await? {
            Some(dir) => Ok(dir.get_blob_map()?),
            None => Ok(BTreeMap::new()),
        }
    }

    pub async fn get_attachment(&self, record: &Record, name: &str) -> SheetResult<Option<BlobRef>> {
        let Some(dir) = self.attachment_dir(record).await? else {
            return Ok(None);
        };
        Ok(dir.get_child(name)?.and_then(|node| node.as_blob().copied()))
    }

    /// Bytes of one attachment, if present.
    pub async fn read_attachment(&self, record: &Record, name: &str) -> SheetResult<Option<Vec<u8>>> {
        match self.get_attachment(record, name).await? {
            Some(blob) => Ok(Some(self.inner.db.read_blob(&blob.id).await?)),
            None => Ok(None),
        }
    }

    /// Store an already-written blob as an attachment of `record`.
    pub async fn set_attachment(&self, record: &Record, name: &str, blob: BlobRef) -> SheetResult<()> {
        self.set_attachments(record, [(name.to_string(), blob)]).await
    }

    pub async fn set_attachments(
        &self,
        record: &Record,
        attachments: impl IntoIterator<Item = (String, BlobRef)>,
    ) -> SheetResult<()> {
        let _ticket = self.inner.writes.begin();
        let path = self.path_for(record).await?;
        let root = self
            .root_tree(true)
            .await?
            .ok_or_else(|| SheetError::Config("sheet root could not be created".into()))?;
        for (name, blob) in attachments {
            let segments = split_path(&name);
            if segments.is_empty() || segments.contains(&"..") {
                return Err(SheetError::validation(
                    "attachment",
                    format!("invalid attachment name {name:?}"),
                ));
            }
            let target = format!("{path}/{}", segments.join("/"));
            root.write_child(&target, blob)?;
            debug!(sheet = %self.inner.name, path = %target, "set attachment");
        }
        Ok(())
    }

    // ---- Diffs ----

    /// Records changed between `src_ref`'s copy of this sheet (or nothing)
    /// and the workspace.
    pub async fn diff_from(
        &self,
        src_ref: Option<&str>,
        options: DiffOptions,
    ) -> SheetResult<Vec<DiffEntry>> {
        self.finish_writing().await;
        let db = &self.inner.db;
        let root = self.root_path().await?;

        let src_hash = match src_ref {
            Some(reference) => {
                if db.resolve_ref(reference).await?.is_none() {
                    return Err(SheetError::InvalidRef(reference.to_string()));
                }
                db.tree_hash(reference, &root)
                    .await?
                    .unwrap_or_else(|| db.empty_tree_hash())
            }
            None => db.empty_tree_hash(),
        };
        let dst_hash = match self.root_tree(false).await? {
            Some(tree) => db.write_tree(&tree).await?,
            None => db.empty_tree_hash(),
        };

        let pattern = format!("*.{RECORD_EXTENSION}");
        let raw = db.diff_tree(&src_hash, &dst_hash, &pattern).await?;
        let hidden = self.config_dir_within(&root);
        let mut entries = Vec::new();
        for line in parse_raw_diff(&raw)? {
            let touches = [Some(line.path.as_str()), line.new_path.as_deref()];
            if touches
                .into_iter()
                .flatten()
                .any(|path| is_within(hidden.as_deref(), path))
            {
                continue;
            }
            let status = line.diff_status()?;
            let (path, previous_path) = match &line.new_path {
                Some(new_path) => (
                    strip_extension(new_path).to_string(),
                    Some(strip_extension(&line.path).to_string()),
                ),
                None => (strip_extension(&line.path).to_string(), None),
            };
            let mut entry = DiffEntry {
                path,
                previous_path,
                status,
                src_blob: None,
                dst_blob: None,
                src: None,
                dst: None,
                patch: None,
            };
            if options.blobs {
                entry.src_blob = line.src_blob();
                entry.dst_blob = line.dst_blob();
            }
            if options.records || options.patches {
                let src = match line.src_hash {
                    Some(id) => Some(self.inner.cache.load(&**db, &id).await?),
                    None => None,
                };
                let dst = match line.dst_hash {
                    Some(id) => Some(self.inner.cache.load(&**db, &id).await?),
                    None => None,
                };
                if options.patches {
                    if let (Some(src), Some(dst)) = (&src, &dst) {
                        entry.patch = Some(diff_records(src, dst));
                    }
                }
                if options.records {
                    entry.src = src.map(|r| (*r).clone());
                    entry.dst = dst.map(|r| (*r).clone());
                }
            }
            entries.push(entry);
        }
        debug!(sheet = %self.inner.name, changes = entries.len(), "computed sheet diff");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldSpec, FieldType};
    use crate::diff::DiffStatus;
    use crate::patch::PatchKind;
    use sheets_repo::Repository;

    fn record(text: &str) -> Record {
        toml::from_str(text).unwrap()
    }

    async fn sheet_with(config: SheetConfig) -> (Arc<Repository>, Sheet) {
        let repo = Arc::new(Repository::in_memory());
        let workspace = repo.create_tree();
        let options = OpenOptions::default();
        workspace
            .write_child(
                &options.config_path("people"),
                config.to_toml().unwrap().into_bytes(),
            )
            .unwrap();
        let sheet = Sheet::new(repo.clone(), workspace, "people", options);
        (repo, sheet)
    }

    async fn paths(sheet: &Sheet, query: Query) -> Vec<String> {
        let mut found: Vec<_> = sheet
            .query_all(query)
            .await
            .unwrap()
            .into_iter()
            .map(|q| q.path)
            .collect();
        found.sort();
        found
    }

    #[tokio::test]
    async fn missing_config_is_config_error() {
        let repo = Arc::new(Repository::in_memory());
        let sheet = Sheet::new(repo.clone(), repo.create_tree(), "ghost", OpenOptions::default());
        assert!(matches!(sheet.config().await, Err(SheetError::Config(_))));
        assert!(matches!(
            sheet.upsert(record(r#"id = "1""#)).await,
            Err(SheetError::Config(_))
        ));
    }

    #[tokio::test]
    async fn upsert_then_query() {
        let (_, sheet) = sheet_with(SheetConfig::new("{{id}}")).await;
        sheet.upsert(record(r#"id = "1"
name = "Ada""#)).await.unwrap();
        let result = sheet.upsert(record(r#"id = "2"
name = "Grace""#)).await.unwrap();
        assert_eq!(result.path, "2");
        sheet.finish_writing().await;

        assert_eq!(paths(&sheet, Query::all()).await, ["1", "2"]);
        let grace = sheet
            .query_first(Query::all().equals("id", "2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(grace.record, record(r#"id = "2"
name = "Grace""#));
        assert_eq!(grace.sheet, "people");
        assert!(sheet
            .query_first(Query::all().equals("name", "Nobody"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn query_checks_fields_outside_the_path() {
        let (_, sheet) = sheet_with(SheetConfig::new("${{ team }}/${{ id }}")).await;
        for (team, id, lang) in [("a", "1", "rust"), ("a", "2", "go"), ("b", "3", "rust")] {
            let mut r = Record::new();
            r.insert("team".into(), team.into());
            r.insert("id".into(), id.into());
            r.insert("lang".into(), lang.into());
            sheet.upsert(r).await.unwrap();
        }
        assert_eq!(
            paths(&sheet, Query::all().equals("lang", "rust")).await,
            ["a/1", "b/3"]
        );
        assert_eq!(
            paths(&sheet, Query::all().equals("team", "a").equals("lang", "rust")).await,
            ["a/1"]
        );
        let ids = Query::all().predicate("id", |v| v.and_then(|v| v.as_str()) != Some("1"));
        assert_eq!(paths(&sheet, ids).await, ["a/2", "b/3"]);
    }

    #[tokio::test]
    async fn query_of_empty_sheet_is_empty() {
        let config = SheetConfig::new("${{ id }}").with_root("people");
        let (_, sheet) = sheet_with(config).await;
        assert!(sheet.query_all(Query::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_for_unstorable_value_is_empty() {
        let (_, sheet) = sheet_with(SheetConfig::new("${{ id }}")).await;
        sheet.upsert(record(r#"id = "1""#)).await.unwrap();
        let found = sheet
            .query_all(Query::all().equals("id", "a/b"))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let (_, sheet) = sheet_with(SheetConfig::new("${{ id }}")).await;
        let first = sheet
            .upsert(record(r#"id = "1"
tags = ["b", "a"]"#))
            .await
            .unwrap();
        let stored = sheet.query_all(Query::all()).await.unwrap();
        let again = sheet.upsert(stored[0].clone()).await.unwrap();
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn upsert_normalizes_declared_fields() {
        let config = SheetConfig::new("${{ id }}")
            .with_field("age", FieldSpec::typed(FieldType::Number));
        let (_, sheet) = sheet_with(config).await;
        sheet
            .upsert(record(r#"id = "1"
age = "36""#))
            .await
            .unwrap();
        let stored = sheet.query_first(Query::all()).await.unwrap().unwrap();
        assert_eq!(stored.record["age"].as_integer(), Some(36));

        let err = sheet
            .upsert(record(r#"id = "2"
age = "old""#))
            .await
            .unwrap_err();
        assert!(matches!(err, SheetError::Validation { ref field, .. } if field == "age"));
    }

    #[tokio::test]
    async fn unrenderable_record_is_rejected() {
        let (_, sheet) = sheet_with(SheetConfig::new("${{ id }}")).await;
        let err = sheet.upsert(record(r#"name = "No Id""#)).await.unwrap_err();
        assert!(matches!(err, SheetError::Unrenderable(_)));
    }

    #[tokio::test]
    async fn changed_key_moves_record_and_attachments() {
        let (repo, sheet) = sheet_with(SheetConfig::new("${{ slug }}")).await;
        let old = record(r#"slug = "draft"
title = "Hello""#);
        sheet.upsert(old.clone()).await.unwrap();
        let photo = repo.write_blob(b"jpeg").await.unwrap();
        sheet.set_attachment(&old, "photo.jpg", photo).await.unwrap();

        let mut renamed = sheet.query_first(Query::all()).await.unwrap().unwrap();
        renamed
            .record
            .insert("slug".into(), "final".into());
        let result = sheet.upsert(renamed).await.unwrap();
        assert_eq!(result.path, "final");

        assert_eq!(paths(&sheet, Query::all()).await, ["final"]);
        let moved = record(r#"slug = "final"
title = "Hello""#);
        assert_eq!(
            sheet.read_attachment(&moved, "photo.jpg").await.unwrap(),
            Some(b"jpeg".to_vec())
        );
        assert!(sheet.get_attachments(&old).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn attachments_live_beside_records_and_are_not_records() {
        let (repo, sheet) = sheet_with(SheetConfig::new("${{ id }}")).await;
        let ada = record(r#"id = "1"
name = "Ada""#);
        sheet.upsert(ada.clone()).await.unwrap();
        let notes = repo.write_blob(b"notes").await.unwrap();
        let meta = repo.write_blob(b"x = 1").await.unwrap();
        sheet
            .set_attachments(
                &ada,
                [
                    ("notes.txt".to_string(), notes),
                    ("extra/meta.toml".to_string(), meta),
                ],
            )
            .await
            .unwrap();

        let names: Vec<_> = sheet.get_attachments(&ada).await.unwrap().into_keys().collect();
        assert_eq!(names, ["extra/meta.toml", "notes.txt"]);
        assert_eq!(sheet.get_attachment(&ada, "notes.txt").await.unwrap(), Some(notes));
        assert_eq!(paths(&sheet, Query::all()).await, ["1"]);
        assert!(sheet.set_attachment(&ada, "../escape", notes).await.is_err());
    }

    #[tokio::test]
    async fn delete_removes_record_and_attachments() {
        let (repo, sheet) = sheet_with(SheetConfig::new("${{ id }}")).await;
        let ada = record(r#"id = "1""#);
        sheet.upsert(ada.clone()).await.unwrap();
        sheet.upsert(record(r#"id = "2""#)).await.unwrap();
        let notes = repo.write_blob(b"notes").await.unwrap();
        sheet.set_attachment(&ada, "notes.txt", notes).await.unwrap();

        assert!(sheet.delete(&ada).await.unwrap());
        assert!(!sheet.delete(&ada).await.unwrap());
        assert!(sheet.get_attachments(&ada).await.unwrap().is_empty());
        assert!(sheet.delete_path("2").await.unwrap());
        assert!(paths(&sheet, Query::all()).await.is_empty());
    }

    #[tokio::test]
    async fn clear_keeps_configs() {
        let (_, sheet) = sheet_with(SheetConfig::new("${{ id }}")).await;
        sheet.upsert(record(r#"id = "1""#)).await.unwrap();
        sheet.clear().await.unwrap();
        assert!(paths(&sheet, Query::all()).await.is_empty());

        let reopened = Sheet::new(
            sheet.inner.db.clone(),
            sheet.workspace().clone(),
            "people",
            OpenOptions::default(),
        );
        assert!(reopened.config().await.is_ok());
    }

    #[tokio::test]
    async fn normalize_all_rewrites_every_record() {
        let (_, sheet) = sheet_with(SheetConfig::new("${{ id }}")).await;
        sheet.upsert(record(r#"id = "1""#)).await.unwrap();
        sheet.upsert(record(r#"id = "2""#)).await.unwrap();
        assert_eq!(sheet.normalize_all().await.unwrap(), 2);
        assert_eq!(paths(&sheet, Query::all()).await, ["1", "2"]);
    }

    #[tokio::test]
    async fn diff_against_nothing_adds_every_record() {
        let (_, sheet) = sheet_with(SheetConfig::new("${{ id }}").with_root("people")).await;
        sheet.upsert(record(r#"id = "1""#)).await.unwrap();
        sheet.upsert(record(r#"id = "2""#)).await.unwrap();

        let diffs = sheet.diff_from(None, DiffOptions::full()).await.unwrap();
        assert_eq!(diffs.len(), 2);
        assert!(diffs.iter().all(|d| d.status == DiffStatus::Added));
        assert!(diffs.iter().all(|d| d.dst.is_some() && d.patch.is_none()));
        assert_eq!(diffs[0].path, "1");
    }

    #[tokio::test]
    async fn diff_against_saved_state() {
        let (repo, sheet) = sheet_with(SheetConfig::new("${{ id }}")).await;
        sheet
            .upsert(record(r#"id = "1"
name = "Hopper""#))
            .await
            .unwrap();
        let tree = repo.write_tree(sheet.workspace()).await.unwrap();
        let base = repo.commit_tree(&tree, &[], "base").await.unwrap();
        repo.update_ref("master", base, None).await.unwrap();

        assert!(sheet
            .diff_from(Some("master"), DiffOptions::full())
            .await
            .unwrap()
            .is_empty());

        sheet
            .upsert(record(r#"id = "1"
name = "Hopper-Suffix""#))
            .await
            .unwrap();
        let diffs = sheet
            .diff_from(Some("master"), DiffOptions::default())
            .await
            .unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].status, DiffStatus::Modified);
        assert!(diffs[0].src.is_none() && diffs[0].patch.is_none());

        let full = sheet.diff_from(Some("master"), DiffOptions::full()).await.unwrap();
        let patch = full[0].patch.as_ref().unwrap();
        assert_eq!(patch.len(), 1);
        assert_eq!(patch[0].op, PatchKind::Replace);
        assert_eq!(patch[0].path, "/name");

        assert!(matches!(
            sheet.diff_from(Some("nowhere"), DiffOptions::default()).await,
            Err(SheetError::InvalidRef(_))
        ));
    }
}
