//! Lazy remote listing and the reconcile step that routes each entry.
//!
//! [`RemoteLister`] yields entries one at a time and only asks the remote for
//! the next page once the current one is used up. [`Reconciler`] drains it:
//! trashed entries are evicted from the store, folders are skipped, and
//! everything else is handed to the fetch pool through a bounded channel, so
//! a slow pool holds back further page requests.

use crate::error::SyncError;
use crate::job::EntryFailure;
use crate::store::DocumentStore;
use bridge_traits::error::BridgeError;
use bridge_traits::storage::{ListQuery, RemoteEntry, RemoteSource};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

pub struct RemoteLister {
    remote: Arc<dyn RemoteSource>,
    access_token: String,
    query: ListQuery,
    buffer: VecDeque<RemoteEntry>,
    next_page_token: Option<String>,
    exhausted: bool,
    pages: usize,
}

impl RemoteLister {
    pub fn new(remote: Arc<dyn RemoteSource>, access_token: String, query: ListQuery) -> Self {
        Self {
            remote,
            access_token,
            query,
            buffer: VecDeque::new(),
            next_page_token: None,
            exhausted: false,
            pages: 0,
        }
    }

    /// Resume from a page token returned by an earlier listing.
    pub fn starting_at(mut self, page_token: impl Into<String>) -> Self {
        self.next_page_token = Some(page_token.into());
        self
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Next entry, or `Ok(None)` once the listing is exhausted.
    pub async fn next_entry(&mut self) -> Result<Option<RemoteEntry>, BridgeError> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                return Ok(Some(entry));
            }
            if self.exhausted {
                return Ok(None);
            }

            let page = self
                .remote
                .list_children(
                    &self.access_token,
                    &self.query,
                    self.next_page_token.as_deref(),
                )
                .await?;
            self.pages += 1;
            debug!(
                page = self.pages,
                entries = page.entries.len(),
                more = page.next_page_token.is_some(),
                "Fetched listing page"
            );

            self.next_page_token = page.next_page_token;
            self.exhausted = self.next_page_token.is_none();
            self.buffer.extend(page.entries);
        }
    }
}

/// What to do with one listed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Fetch,
    Evict,
    Skip,
}

pub fn classify(entry: &RemoteEntry) -> Disposition {
    if entry.is_folder() {
        Disposition::Skip
    } else if entry.trashed {
        Disposition::Evict
    } else {
        Disposition::Fetch
    }
}

/// Counters from draining one listing.
#[derive(Debug, Clone, Default)]
pub struct ListingReport {
    pub listed: usize,
    pub forwarded: usize,
    pub evicted: usize,
    pub skipped: usize,
    pub failures: Vec<EntryFailure>,
}

pub struct Reconciler<'a> {
    documents: &'a DocumentStore,
    report: ListingReport,
    listed_ids: HashSet<String>,
}

impl<'a> Reconciler<'a> {
    pub fn new(documents: &'a DocumentStore) -> Self {
        Self {
            documents,
            report: ListingReport::default(),
            listed_ids: HashSet::new(),
        }
    }

    /// Whether the listing returned `id`, whatever its disposition.
    pub fn has_listed(&self, id: &str) -> bool {
        self.listed_ids.contains(id)
    }

    /// Drain the lister into `sink`.
    ///
    /// A listing error stops the drain and is returned as
    /// [`SyncError::Listing`]; the counters gathered so far stay available
    /// through [`Reconciler::into_report`].
    #[instrument(skip_all)]
    pub async fn run(
        &mut self,
        lister: &mut RemoteLister,
        sink: &mpsc::Sender<RemoteEntry>,
    ) -> Result<(), SyncError> {
        while let Some(entry) = lister.next_entry().await.map_err(SyncError::Listing)? {
            self.report.listed += 1;
            self.listed_ids.insert(entry.id.clone());

            match classify(&entry) {
                Disposition::Skip => {
                    debug!(name = %entry.name, "Skipping folder");
                    self.report.skipped += 1;
                }
                Disposition::Evict => self.evict(&entry).await,
                Disposition::Fetch => {
                    sink.send(entry).await.map_err(|_| {
                        SyncError::Worker("fetch pool stopped accepting entries".to_string())
                    })?;
                    self.report.forwarded += 1;
                }
            }
        }

        info!(
            listed = self.report.listed,
            forwarded = self.report.forwarded,
            evicted = self.report.evicted,
            pages = lister.pages_fetched(),
            "Listing complete"
        );
        Ok(())
    }

    async fn evict(&mut self, entry: &RemoteEntry) {
        match self.documents.evict(&entry.id).await {
            Ok(removed) => {
                debug!(name = %entry.name, removed, "Evicted trashed entry");
                self.report.evicted += 1;
            }
            Err(e) => {
                warn!(name = %entry.name, error = %e, "Failed to evict trashed entry");
                self.report.failures.push(EntryFailure {
                    entry_id: entry.id.clone(),
                    name: entry.name.clone(),
                    transient: e.is_transient(),
                    error: e.to_string(),
                });
            }
        }
    }

    pub fn into_report(self) -> ListingReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::storage::{InMemoryStore, ListPage, FOLDER_MIME_TYPE};
    use bytes::Bytes;
    use std::sync::Mutex;

    /// Serves fixed pages and records every page token it was asked for.
    struct PagedRemote {
        pages: Vec<Vec<RemoteEntry>>,
        requested: Mutex<Vec<Option<String>>>,
        fail_on_page: Option<usize>,
    }

    impl PagedRemote {
        fn new(pages: Vec<Vec<RemoteEntry>>) -> Self {
            Self {
                pages,
                requested: Mutex::new(Vec::new()),
                fail_on_page: None,
            }
        }
    }

    #[async_trait]
    impl RemoteSource for PagedRemote {
        async fn list_children(
            &self,
            _access_token: &str,
            _query: &ListQuery,
            page_token: Option<&str>,
        ) -> BridgeResult<ListPage> {
            self.requested
                .lock()
                .unwrap()
                .push(page_token.map(str::to_string));
            let index: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
            if self.fail_on_page == Some(index) {
                return Err(BridgeError::Connection("reset".to_string()));
            }
            Ok(ListPage {
                entries: self.pages[index].clone(),
                next_page_token: (index + 1 < self.pages.len()).then(|| (index + 1).to_string()),
            })
        }

        async fn download(&self, _access_token: &str, _entry_id: &str) -> BridgeResult<Bytes> {
            unreachable!("listing never downloads")
        }
    }

    fn md(id: &str) -> RemoteEntry {
        RemoteEntry::new(id, format!("{}.md", id), "text/markdown")
    }

    #[tokio::test]
    async fn test_pages_are_fetched_lazily() {
        let remote = Arc::new(PagedRemote::new(vec![vec![md("a"), md("b")], vec![md("c")]]));
        let mut lister = RemoteLister::new(remote.clone(), "t".into(), ListQuery::new("p"));

        assert_eq!(lister.next_entry().await.unwrap().unwrap().id, "a");
        assert_eq!(lister.next_entry().await.unwrap().unwrap().id, "b");
        assert_eq!(remote.requested.lock().unwrap().len(), 1);

        assert_eq!(lister.next_entry().await.unwrap().unwrap().id, "c");
        assert!(lister.next_entry().await.unwrap().is_none());
        assert!(lister.next_entry().await.unwrap().is_none());

        assert_eq!(
            *remote.requested.lock().unwrap(),
            vec![None, Some("1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_pages_are_skipped_over() {
        let remote = Arc::new(PagedRemote::new(vec![vec![], vec![md("x")]]));
        let mut lister = RemoteLister::new(remote, "t".into(), ListQuery::new("p"));

        assert_eq!(lister.next_entry().await.unwrap().unwrap().id, "x");
        assert_eq!(lister.pages_fetched(), 2);
    }

    #[tokio::test]
    async fn test_resume_from_page_token() {
        let remote = Arc::new(PagedRemote::new(vec![vec![md("a")], vec![md("b")]]));
        let mut lister =
            RemoteLister::new(remote, "t".into(), ListQuery::new("p")).starting_at("1");

        assert_eq!(lister.next_entry().await.unwrap().unwrap().id, "b");
        assert!(lister.next_entry().await.unwrap().is_none());
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&md("a")), Disposition::Fetch);
        assert_eq!(classify(&md("a").trashed(true)), Disposition::Evict);
        assert_eq!(
            classify(&RemoteEntry::new("f", "drafts", FOLDER_MIME_TYPE)),
            Disposition::Skip
        );
    }

    #[tokio::test]
    async fn test_reconciler_routes_entries() {
        let remote = Arc::new(PagedRemote::new(vec![vec![
            md("a"),
            md("c").trashed(true),
            RemoteEntry::new("f", "drafts", FOLDER_MIME_TYPE),
            md("d"),
        ]]));
        let documents = DocumentStore::new(Arc::new(InMemoryStore::new()), "p");
        let mut lister = RemoteLister::new(remote, "t".into(), ListQuery::new("p"));
        let (tx, mut rx) = mpsc::channel(8);

        let mut reconciler = Reconciler::new(&documents);
        reconciler.run(&mut lister, &tx).await.unwrap();
        drop(tx);

        let mut forwarded = Vec::new();
        while let Some(entry) = rx.recv().await {
            forwarded.push(entry.id);
        }
        assert!(reconciler.has_listed("c"));
        assert!(reconciler.has_listed("f"));
        assert!(!reconciler.has_listed("z"));
        let report = reconciler.into_report();

        assert_eq!(forwarded, vec!["a", "d"]);
        assert_eq!(report.listed, 4);
        assert_eq!(report.evicted, 1);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_listing_error_keeps_partial_report() {
        let mut remote = PagedRemote::new(vec![vec![md("a")], vec![md("b")]]);
        remote.fail_on_page = Some(1);
        let documents = DocumentStore::new(Arc::new(InMemoryStore::new()), "p");
        let mut lister = RemoteLister::new(Arc::new(remote), "t".into(), ListQuery::new("p"));
        let (tx, _rx) = mpsc::channel(8);

        let mut reconciler = Reconciler::new(&documents);
        let err = reconciler.run(&mut lister, &tx).await.unwrap_err();

        assert!(matches!(err, SyncError::Listing(BridgeError::Connection(_))));
        assert_eq!(reconciler.into_report().forwarded, 1);
    }
}
