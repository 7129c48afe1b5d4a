use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::try_join_all;
use sheets_codec::{Record, RECORD_EXTENSION};
use sheets_refs::qualify_branch;
use sheets_repo::{ObjectDatabase, Repository};
use sheets_store::{MutableTree, Node};
use sheets_types::ObjectId;
use tracing::{debug, info};

use crate::config::{OpenOptions, SheetConfig};
use crate::diff::{DiffEntry, DiffOptions};
use crate::error::{SheetError, SheetResult};
use crate::query::Query;
use crate::sheet::{QueriedRecord, Sheet};

/// A batch of records to load into one sheet.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportRequest {
    pub sheet: String,
    pub records: Vec<Record>,
    /// Ref whose tree the import starts from. An empty workspace if `None`.
    pub parent_ref: Option<String>,
    /// Clear the sheet before loading, so the result holds only `records`.
    pub replace: bool,
    /// Branch to commit the result to.
    pub branch: Option<String>,
    pub message: Option<String>,
}

impl ImportRequest {
    /// A replacing import of `records` into `sheet`.
    pub fn new(sheet: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            sheet: sheet.into(),
            records,
            parent_ref: None,
            replace: true,
            branch: None,
            message: None,
        }
    }

    pub fn from_ref(mut self, parent_ref: impl Into<String>) -> Self {
        self.parent_ref = Some(parent_ref.into());
        self
    }

    pub fn save_to(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Keep existing records, upserting over them.
    pub fn merging(mut self) -> Self {
        self.replace = false;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Result of an import.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Hash of the resulting workspace tree.
    pub tree: ObjectId,
    /// Commit created on the requested branch.
    pub commit: Option<ObjectId>,
    pub records: usize,
}

/// Repository-level operations over sheets: workspaces, imports, exports,
/// comparisons and merges.
#[derive(Clone)]
pub struct GitSheets {
    db: Arc<dyn ObjectDatabase>,
    options: OpenOptions,
}

impl std::fmt::Debug for GitSheets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitSheets")
            .field("options", &self.options)
            .finish()
    }
}

impl GitSheets {
    pub fn new(db: Arc<dyn ObjectDatabase>) -> Self {
        Self::with_options(db, OpenOptions::default())
    }

    pub fn with_options(db: Arc<dyn ObjectDatabase>, options: OpenOptions) -> Self {
        Self { db, options }
    }

    /// Sheets over a fresh in-memory repository.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(Repository::in_memory()))
    }

    pub fn db(&self) -> &Arc<dyn ObjectDatabase> {
        &self.db
    }

    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    // ---- Workspaces ----

    /// A workspace loaded from `reference`'s root tree.
    pub async fn checkout(&self, reference: &str) -> SheetResult<MutableTree> {
        Ok(self.db.create_tree_from_ref(reference).await?)
    }

    pub fn empty_workspace(&self) -> MutableTree {
        self.db.create_tree()
    }

    /// Every sheet with a config in `workspace`, by name.
    pub fn open_sheets(&self, workspace: &MutableTree) -> SheetResult<BTreeMap<String, Sheet>> {
        let Some(dir) = workspace.get_subtree(&self.options.config_dir(), false)? else {
            return Ok(BTreeMap::new());
        };
        let suffix = format!(".{RECORD_EXTENSION}");
        Ok(dir
            .get_children()?
            .into_iter()
            .filter(|(_, node)| node.is_blob())
            .filter_map(|(file, _)| file.strip_suffix(&suffix).map(str::to_string))
            .map(|name| {
                let sheet = self.open_sheet(workspace, &name);
                (name, sheet)
            })
            .collect())
    }

    /// The sheet `name` in `workspace`. Its config is read on first use.
    pub fn open_sheet(&self, workspace: &MutableTree, name: &str) -> Sheet {
        Sheet::new(
            Arc::clone(&self.db),
            workspace.clone(),
            name,
            self.options.clone(),
        )
    }

    /// Write a sheet config into `workspace` and open the sheet.
    pub async fn create_sheet(
        &self,
        workspace: &MutableTree,
        name: &str,
        config: &SheetConfig,
    ) -> SheetResult<Sheet> {
        if name.is_empty() || name.contains('/') || name.starts_with('.') {
            return Err(SheetError::Config(format!("invalid sheet name {name:?}")));
        }
        let blob = self.db.write_blob(config.to_toml()?.as_bytes()).await?;
        workspace.write_child(&self.options.config_path(name), blob)?;
        debug!(sheet = name, template = %config.path, "created sheet");
        Ok(self.open_sheet(workspace, name))
    }

    async fn resolve_required(&self, reference: &str) -> SheetResult<ObjectId> {
        self.db
            .resolve_ref(reference)
            .await?
            .ok_or_else(|| SheetError::InvalidRef(reference.to_string()))
    }

    /// Commit `workspace` to `branch`, parented on `parent_ref` (or the
    /// branch's current tip). The branch moves only if nobody moved it
    /// since its tip was read.
    pub async fn save_to_branch(
        &self,
        workspace: &MutableTree,
        branch: &str,
        parent_ref: Option<&str>,
        message: &str,
    ) -> SheetResult<ObjectId> {
        let tree = self.db.write_tree(workspace).await?;
        let tip = self.db.resolve_ref(branch).await?;
        let parent = match parent_ref {
            Some(reference) => Some(self.resolve_required(reference).await?),
            None => tip,
        };
        let parents: Vec<ObjectId> = parent.into_iter().collect();
        let commit = self.db.commit_tree(&tree, &parents, message).await?;
        self.db.update_ref(branch, commit, tip).await?;
        info!(branch, commit = %commit.short_hex(), "saved workspace");
        Ok(commit)
    }

    // ---- Bulk data ----

    /// Load records into a sheet, optionally committing the result.
    ///
    /// Records are written concurrently; the first failing record aborts
    /// the import with its error.
    pub async fn import(&self, request: ImportRequest) -> SheetResult<ImportOutcome> {
        let workspace = match &request.parent_ref {
            Some(reference) => self.checkout(reference).await?,
            None => self.empty_workspace(),
        };
        let sheet = self.open_sheet(&workspace, &request.sheet);
        sheet.config().await?;

        if request.replace {
            sheet.clear().await?;
        }
        let count = request.records.len();
        try_join_all(request.records.into_iter().map(|record| sheet.upsert(record))).await?;
        sheet.finish_writing().await;

        let tree = self.db.write_tree(&workspace).await?;
        let commit = match &request.branch {
            Some(branch) => {
                let message = request
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("import {count} records into {}", request.sheet));
                Some(
                    self.save_to_branch(&workspace, branch, request.parent_ref.as_deref(), &message)
                        .await?,
                )
            }
            None => None,
        };
        info!(sheet = %request.sheet, records = count, tree = %tree.short_hex(), "imported records");
        Ok(ImportOutcome {
            tree,
            commit,
            records: count,
        })
    }

    /// Every record of `sheet` at `reference`.
    pub async fn export(&self, reference: &str, sheet: &str) -> SheetResult<Vec<QueriedRecord>> {
        let workspace = self.checkout(reference).await?;
        self.open_sheet(&workspace, sheet)
            .query_all(Query::all())
            .await
    }

    // ---- Review ----

    /// Records of `sheet` changed from `src_ref` to `dst_ref`, with records
    /// and patches attached.
    pub async fn compare(
        &self,
        src_ref: &str,
        dst_ref: &str,
        sheet: &str,
    ) -> SheetResult<Vec<DiffEntry>> {
        let workspace = self.checkout(dst_ref).await?;
        self.open_sheet(&workspace, sheet)
            .diff_from(Some(src_ref), DiffOptions::full())
            .await
    }

    /// Fast-forward `src_ref` onto `dst_ref` with a merge commit, then delete
    /// `dst_ref`. `dst_ref`'s tree always wins.
    pub async fn merge(
        &self,
        src_ref: &str,
        dst_ref: &str,
        message: Option<&str>,
    ) -> SheetResult<ObjectId> {
        let dst_branch = merge_branch(dst_ref)?;
        if qualify_branch(src_ref).is_ok_and(|src| src == dst_branch) {
            return Err(SheetError::Merge(format!("cannot merge {dst_ref} into itself")));
        }
        let src_commit = self.resolve_required(src_ref).await?;
        let dst_commit = self.resolve_required(dst_ref).await?;
        if !self.db.merge_base_is_ancestor(&src_commit, &dst_commit).await? {
            return Err(SheetError::Merge(format!(
                "{src_ref} is not an ancestor of {dst_ref}"
            )));
        }
        let dst_tree = self
            .db
            .tree_hash(dst_ref, "")
            .await?
            .ok_or_else(|| SheetError::InvalidRef(dst_ref.to_string()))?;

        let message = message
            .map(str::to_string)
            .unwrap_or_else(|| format!("Merge {dst_ref}"));
        let merge = self
            .db
            .commit_tree(&dst_tree, &[src_commit, dst_commit], &message)
            .await?;
        self.db.update_ref(src_ref, merge, Some(src_commit)).await?;
        self.db.delete_branch(dst_ref).await?;
        info!(src = src_ref, dst = dst_ref, commit = %merge.short_hex(), "merged");
        Ok(merge)
    }
}

/// Canonical name of a merge destination, which is deleted once merged.
fn merge_branch(dst_ref: &str) -> SheetResult<String> {
    if ObjectId::looks_like_hex(dst_ref) {
        return Err(SheetError::Merge(format!("{dst_ref} is not a branch")));
    }
    qualify_branch(dst_ref)
        .map_err(|e| SheetError::Merge(format!("{dst_ref} is not a branch: {e}")))
}

/// Whether `workspace` holds a config for `sheet` under `options`.
pub fn has_sheet(workspace: &MutableTree, options: &OpenOptions, sheet: &str) -> SheetResult<bool> {
    Ok(matches!(
        workspace.get_child(&options.config_path(sheet))?,
        Some(Node::Blob(_))
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffStatus;
    use crate::patch::PatchKind;
    use serde_json::json;
    use sheets_store::ObjectStore;

    const SHEET: &str = "people";

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    }

    fn person(id: &str, first: &str, last: &str) -> Record {
        let mut record = Record::new();
        record.insert("id".into(), id.into());
        record.insert("first_name".into(), first.into());
        record.insert("last_name".into(), last.into());
        record
    }

    fn initial() -> Vec<Record> {
        vec![
            person("1", "Ada", "Lovelace"),
            person("2", "Grace", "Hopper"),
            person("3", "Radia", "Perlman"),
        ]
    }

    fn changed() -> Vec<Record> {
        vec![
            person("1", "Ada", "Lovelace"),
            person("2", "Grace", "Hopper-Suffix"),
            person("4", "Another", "Example"),
            person("5", "Foo", "Bar"),
        ]
    }

    /// A repository whose `master` holds a sheet config using `template`.
    async fn repo_with_sheet(template: &str) -> GitSheets {
        init_tracing();
        let sheets = GitSheets::in_memory();
        let workspace = sheets.empty_workspace();
        sheets
            .create_sheet(&workspace, SHEET, &SheetConfig::new(template))
            .await
            .unwrap();
        sheets
            .save_to_branch(&workspace, "master", None, "init")
            .await
            .unwrap();
        sheets
    }

    async fn import_fixture(sheets: &GitSheets, records: Vec<Record>, branch: &str) -> ImportOutcome {
        sheets
            .import(
                ImportRequest::new(SHEET, records)
                    .from_ref("master")
                    .save_to(branch),
            )
            .await
            .unwrap()
    }

    async fn ids(sheets: &GitSheets, reference: &str) -> Vec<String> {
        let mut ids: Vec<_> = sheets
            .export(reference, SHEET)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn import_without_config_is_config_error() {
        let sheets = GitSheets::in_memory();
        let err = sheets
            .import(ImportRequest::new(SHEET, initial()))
            .await
            .unwrap_err();
        assert!(matches!(err, SheetError::Config(_)));
    }

    #[tokio::test]
    async fn import_writes_one_record_per_item() {
        let sheets = repo_with_sheet("{{id}}").await;
        let outcome = import_fixture(&sheets, initial(), "master").await;
        assert_eq!(outcome.records, 3);
        assert!(outcome.commit.is_some());
        assert_eq!(ids(&sheets, "master").await, ["1", "2", "3"]);

        let exported = sheets.export("master", SHEET).await.unwrap();
        let grace = exported.iter().find(|r| r.path == "2").unwrap();
        assert_eq!(grace.record, person("2", "Grace", "Hopper"));
    }

    #[tokio::test]
    async fn import_keeps_config() {
        let sheets = repo_with_sheet("{{id}}").await;
        import_fixture(&sheets, initial(), "master").await;
        let workspace = sheets.checkout("master").await.unwrap();
        assert!(has_sheet(&workspace, sheets.options(), SHEET).unwrap());
        let opened = sheets.open_sheets(&workspace).unwrap();
        assert_eq!(opened.keys().collect::<Vec<_>>(), [SHEET]);
        assert_eq!(opened[SHEET].config().await.unwrap().path, "{{id}}");
    }

    #[tokio::test]
    async fn import_replaces_by_default() {
        let sheets = repo_with_sheet("{{id}}").await;
        import_fixture(&sheets, initial(), "master").await;
        import_fixture(&sheets, changed(), "master").await;
        assert_eq!(ids(&sheets, "master").await, ["1", "2", "4", "5"]);
    }

    #[tokio::test]
    async fn merging_import_keeps_existing_records() {
        let sheets = repo_with_sheet("{{id}}").await;
        import_fixture(&sheets, initial(), "master").await;
        sheets
            .import(
                ImportRequest::new(SHEET, changed())
                    .from_ref("master")
                    .save_to("master")
                    .merging(),
            )
            .await
            .unwrap();
        assert_eq!(ids(&sheets, "master").await, ["1", "2", "3", "4", "5"]);
    }

    #[tokio::test]
    async fn import_to_new_branch_leaves_parent() {
        let sheets = repo_with_sheet("{{id}}").await;
        import_fixture(&sheets, initial(), "master").await;
        import_fixture(&sheets, changed(), "proposal").await;
        assert_eq!(ids(&sheets, "proposal").await, ["1", "2", "4", "5"]);
        assert_eq!(ids(&sheets, "master").await, ["1", "2", "3"]);
    }

    #[tokio::test]
    async fn export_supports_nested_paths() {
        let sheets = repo_with_sheet("{{last_name}}/{{first_name}}").await;
        import_fixture(&sheets, initial(), "master").await;
        let rows = sheets.export("master", SHEET).await.unwrap();
        assert_eq!(rows.len(), 3);
        for row in rows {
            let expected = format!(
                "{}/{}",
                row.record["last_name"].as_str().unwrap(),
                row.record["first_name"].as_str().unwrap()
            );
            assert_eq!(row.path, expected);
        }
    }

    #[tokio::test]
    async fn export_of_empty_sheet_is_empty() {
        let sheets = repo_with_sheet("{{id}}").await;
        assert!(sheets.export("master", SHEET).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn export_of_unknown_ref_is_invalid_ref() {
        let sheets = repo_with_sheet("{{id}}").await;
        assert!(matches!(
            sheets.export("unicorns", SHEET).await,
            Err(SheetError::InvalidRef(_))
        ));
    }

    #[tokio::test]
    async fn compare_reports_each_changed_record() {
        let sheets = repo_with_sheet("{{id}}").await;
        import_fixture(&sheets, initial(), "master").await;
        import_fixture(&sheets, changed(), "proposed").await;

        let diffs = sheets.compare("master", "proposed", SHEET).await.unwrap();
        let summary: Vec<_> = diffs.iter().map(|d| (d.path.as_str(), d.status)).collect();
        assert_eq!(
            summary,
            [
                ("2", DiffStatus::Modified),
                ("3", DiffStatus::Deleted),
                ("4", DiffStatus::Added),
                ("5", DiffStatus::Added),
            ]
        );

        let modified = &diffs[0];
        let patch = modified.patch.as_ref().unwrap();
        assert_eq!(patch.len(), 1);
        assert_eq!(patch[0].op, PatchKind::Replace);
        assert_eq!(patch[0].path, "/last_name");
        assert_eq!(patch[0].value, Some(json!("Hopper-Suffix")));
        assert_eq!(patch[0].from, Some(json!("Hopper")));
        assert_eq!(diffs[1].src, Some(person("3", "Radia", "Perlman")));
    }

    #[tokio::test]
    async fn compare_of_identical_refs_is_empty() {
        let sheets = repo_with_sheet("{{id}}").await;
        import_fixture(&sheets, initial(), "master").await;
        import_fixture(&sheets, initial(), "proposed").await;
        assert!(sheets
            .compare("master", "proposed", SHEET)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn compare_supports_nested_templates() {
        let sheets = repo_with_sheet("{{last_name}}/{{first_name}}").await;
        import_fixture(&sheets, initial(), "master").await;
        import_fixture(&sheets, changed(), "proposed").await;
        let diffs = sheets.compare("master", "proposed", SHEET).await.unwrap();
        assert_eq!(diffs.len(), 4);

        let renamed = diffs
            .iter()
            .find(|d| d.path == "Hopper-Suffix/Grace")
            .unwrap();
        assert_eq!(renamed.status, DiffStatus::Modified);
        assert_eq!(renamed.previous_path.as_deref(), Some("Hopper/Grace"));
        assert!(renamed.patch.is_some());

        let mut others: Vec<_> = diffs
            .iter()
            .filter(|d| d.previous_path.is_none())
            .map(|d| (d.path.as_str(), d.status))
            .collect();
        others.sort();
        assert_eq!(
            others,
            [
                ("Bar/Foo", DiffStatus::Added),
                ("Example/Another", DiffStatus::Added),
                ("Perlman/Radia", DiffStatus::Deleted),
            ]
        );
    }

    #[tokio::test]
    async fn merge_moves_source_to_destination_tree() {
        let sheets = repo_with_sheet("{{id}}").await;
        import_fixture(&sheets, initial(), "master").await;
        import_fixture(&sheets, changed(), "proposed").await;
        let proposed_tree = sheets.db().tree_hash("proposed", "").await.unwrap();

        let merge = sheets.merge("master", "proposed", None).await.unwrap();
        assert_eq!(sheets.db().resolve_ref("master").await.unwrap(), Some(merge));
        assert_eq!(sheets.db().tree_hash("master", "").await.unwrap(), proposed_tree);
        assert_eq!(ids(&sheets, "master").await, ["1", "2", "4", "5"]);
        assert!(matches!(
            sheets.export("proposed", SHEET).await,
            Err(SheetError::InvalidRef(_))
        ));
    }

    #[tokio::test]
    async fn merge_onto_non_ancestor_fails_without_mutation() {
        let sheets = repo_with_sheet("{{id}}").await;
        import_fixture(&sheets, initial(), "master").await;
        import_fixture(&sheets, changed(), "proposed").await;
        import_fixture(&sheets, vec![person("1", "empty", "empty")], "master").await;

        let master = sheets.db().resolve_ref("master").await.unwrap();
        let proposed = sheets.db().resolve_ref("proposed").await.unwrap();
        let err = sheets.merge("master", "proposed", None).await.unwrap_err();
        assert!(matches!(err, SheetError::Merge(_)));
        assert_eq!(sheets.db().resolve_ref("master").await.unwrap(), master);
        assert_eq!(sheets.db().resolve_ref("proposed").await.unwrap(), proposed);
    }

    #[tokio::test]
    async fn merge_of_unknown_destination_is_invalid_ref() {
        let sheets = repo_with_sheet("{{id}}").await;
        let master = sheets.db().resolve_ref("master").await.unwrap();
        assert!(matches!(
            sheets.merge("master", "nowhere", None).await,
            Err(SheetError::InvalidRef(_))
        ));
        assert_eq!(sheets.db().resolve_ref("master").await.unwrap(), master);
    }

    #[tokio::test]
    async fn merge_into_itself_fails_without_mutation() {
        let sheets = repo_with_sheet("{{id}}").await;
        import_fixture(&sheets, initial(), "master").await;
        let master = sheets.db().resolve_ref("master").await.unwrap();

        for dst in ["master", "refs/heads/master"] {
            let err = sheets.merge("master", dst, None).await.unwrap_err();
            assert!(matches!(err, SheetError::Merge(_)));
            assert_eq!(sheets.db().resolve_ref("master").await.unwrap(), master);
        }
        assert_eq!(ids(&sheets, "master").await, ["1", "2", "3"]);
    }

    #[tokio::test]
    async fn merge_from_commit_hash_leaves_source_unmoved() {
        let sheets = repo_with_sheet("{{id}}").await;
        import_fixture(&sheets, changed(), "proposed").await;
        let master = sheets.db().resolve_ref("master").await.unwrap();
        let proposed = sheets.db().resolve_ref("proposed").await.unwrap().unwrap();

        let err = sheets
            .merge("master", &proposed.to_hex(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SheetError::Merge(_)));
        assert_eq!(sheets.db().resolve_ref("master").await.unwrap(), master);
        assert_eq!(sheets.db().resolve_ref("proposed").await.unwrap(), Some(proposed));
    }

    #[tokio::test]
    async fn stale_tip_is_a_ref_conflict() {
        let sheets = repo_with_sheet("{{id}}").await;
        let workspace = sheets.checkout("master").await.unwrap();
        let sheet = sheets.open_sheet(&workspace, SHEET);
        sheet.upsert(person("9", "Late", "Writer")).await.unwrap();

        let tree = sheets.db().write_tree(&workspace).await.unwrap();
        let tip = sheets.db().resolve_ref("master").await.unwrap().unwrap();
        let other = sheets.db().commit_tree(&tree, &[tip], "other").await.unwrap();
        sheets.db().update_ref("master", other, Some(tip)).await.unwrap();

        let stale = sheets.db().commit_tree(&tree, &[tip], "stale").await.unwrap();
        let err = sheets
            .db()
            .update_ref("master", stale, Some(tip))
            .await
            .map_err(SheetError::from)
            .unwrap_err();
        assert!(matches!(err, SheetError::Ref(_)));
    }

    #[tokio::test]
    async fn custom_merge_message_is_used() {
        let sheets = repo_with_sheet("{{id}}").await;
        import_fixture(&sheets, changed(), "proposed").await;
        let merge = sheets
            .merge("master", "proposed", Some("Accept proposal"))
            .await
            .unwrap();
        let commit = sheets.db().store().read_commit(&merge).unwrap();
        assert_eq!(commit.message, "Accept proposal");
        assert_eq!(commit.parents.len(), 2);
    }

    #[tokio::test]
    async fn sheets_under_a_root_and_prefix() {
        init_tracing();
        let options = OpenOptions::default().with_root("data").with_prefix("sheets");
        let sheets = GitSheets::with_options(Arc::new(Repository::in_memory()), options);
        let workspace = sheets.empty_workspace();
        let sheet = sheets
            .create_sheet(
                &workspace,
                SHEET,
                &SheetConfig::new("${{ id }}").with_root("people"),
            )
            .await
            .unwrap();
        sheet.upsert(person("1", "Ada", "Lovelace")).await.unwrap();
        assert_eq!(sheet.root_path().await.unwrap(), "data/sheets/people");
        assert!(matches!(
            workspace.get_child("data/sheets/people/1.toml").unwrap(),
            Some(Node::Blob(_))
        ));
        assert!(sheets.create_sheet(&workspace, "a/b", &SheetConfig::new("x")).await.is_err());
    }
}
