//! Scripted in-memory mailbox for worker and controller tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mailbox_types::{
    Body, BodyType, FindItemsResults, FolderId, FolderSummary, FolderView, Item, ItemId, ItemView,
    PropertySet, SearchFilter, WellKnownFolder,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::config::WatchCriteria;
use crate::error::ServiceError;
use crate::service::MailboxService;

pub fn criteria() -> WatchCriteria {
    WatchCriteria {
        folder_name: "subFolderForTests".to_string(),
        subject: "testing ews".to_string(),
        created_after: Utc.with_ymd_and_hms(2019, 3, 1, 12, 0, 0).unwrap(),
        folder_page_size: 500,
        item_page_size: 100,
        poll_interval: Duration::from_secs(1),
    }
}

pub fn folder(id: &str, name: &str) -> FolderSummary {
    FolderSummary {
        id: FolderId(id.to_string()),
        display_name: name.to_string(),
    }
}

pub fn matching_item(id: &str, created: DateTime<Utc>) -> Item {
    Item {
        id: ItemId::new(id),
        subject: Some(format!("testing ews {}", id)),
        date_time_received: Some(created),
        date_time_created: Some(created),
        body: Some(Body {
            body_type: BodyType::Text,
            text: format!("body of {}", id),
        }),
    }
}

enum Scripted {
    Items(Vec<Item>),
    Error,
    Hang,
    Block(Duration),
}

#[derive(Default)]
struct Inner {
    folders: Vec<FolderSummary>,
    fail_folders: AtomicBool,
    fail_next_load: AtomicBool,
    script: Mutex<VecDeque<Scripted>>,
    store: Mutex<HashMap<ItemId, Item>>,
    find_calls: AtomicUsize,
    load_calls: AtomicUsize,
    cancel_after: Mutex<Option<(usize, CancelToken)>>,
    folder_page_sizes: Mutex<Vec<u32>>,
    last_query: Mutex<Option<(FolderId, SearchFilter, ItemView)>>,
}

/// Each find-items call consumes one scripted step; an exhausted script
/// answers with an empty result.
#[derive(Clone, Default)]
pub struct MockMailbox {
    inner: Arc<Inner>,
}

impl MockMailbox {
    pub fn new(folders: Vec<FolderSummary>) -> Self {
        Self {
            inner: Arc::new(Inner {
                folders,
                ..Inner::default()
            }),
        }
    }

    pub fn push_empty(&self, times: usize) {
        let mut script = self.inner.script.lock().unwrap();
        for _ in 0..times {
            script.push_back(Scripted::Items(Vec::new()));
        }
    }

    /// Items become visible to one find-items call and loadable afterwards
    pub fn push_found(&self, items: Vec<Item>) {
        let mut store = self.inner.store.lock().unwrap();
        for item in &items {
            store.insert(item.id.clone(), item.clone());
        }
        self.inner
            .script
            .lock()
            .unwrap()
            .push_back(Scripted::Items(items));
    }

    pub fn push_error(&self) {
        self.inner.script.lock().unwrap().push_back(Scripted::Error);
    }

    /// The next find-items call never returns
    pub fn push_hang(&self) {
        self.inner.script.lock().unwrap().push_back(Scripted::Hang);
    }

    /// The next find-items call blocks its runtime thread for `duration`
    pub fn push_blocking(&self, duration: Duration) {
        self.inner
            .script
            .lock()
            .unwrap()
            .push_back(Scripted::Block(duration));
    }

    pub fn fail_folder_listing(&self) {
        self.inner.fail_folders.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_load(&self) {
        self.inner.fail_next_load.store(true, Ordering::SeqCst);
    }

    /// Cancel `token` while serving the `nth` find-items call
    pub fn cancel_after_find(&self, nth: usize, token: CancelToken) {
        *self.inner.cancel_after.lock().unwrap() = Some((nth, token));
    }

    pub fn find_calls(&self) -> usize {
        self.inner.find_calls.load(Ordering::SeqCst)
    }

    pub fn load_calls(&self) -> usize {
        self.inner.load_calls.load(Ordering::SeqCst)
    }

    pub fn folder_page_sizes(&self) -> Vec<u32> {
        self.inner.folder_page_sizes.lock().unwrap().clone()
    }

    pub fn last_query(&self) -> Option<(FolderId, SearchFilter, ItemView)> {
        self.inner.last_query.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailboxService for MockMailbox {
    async fn find_folders(
        &self,
        _parent: WellKnownFolder,
        view: &FolderView,
    ) -> Result<Vec<FolderSummary>, ServiceError> {
        self.inner
            .folder_page_sizes
            .lock()
            .unwrap()
            .push(view.page_size);
        if self.inner.fail_folders.load(Ordering::SeqCst) {
            return Err(ServiceError::remote("ErrorAccessDenied", "Access is denied."));
        }
        Ok(self
            .inner
            .folders
            .iter()
            .skip(view.offset as usize)
            .take(view.page_size as usize)
            .cloned()
            .collect())
    }

    async fn find_items(
        &self,
        folder: &FolderId,
        filter: &SearchFilter,
        view: &ItemView,
    ) -> Result<FindItemsResults, ServiceError> {
        let call = self.inner.find_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.inner.last_query.lock().unwrap() =
            Some((folder.clone(), filter.clone(), view.clone()));

        if let Some((nth, token)) = self.inner.cancel_after.lock().unwrap().as_ref() {
            if *nth == call {
                token.cancel();
            }
        }

        let step = self.inner.script.lock().unwrap().pop_front();
        let candidates = match step {
            None => Vec::new(),
            Some(Scripted::Items(items)) => items,
            Some(Scripted::Error) => {
                return Err(ServiceError::remote("ErrorServerBusy", "The server is busy."))
            }
            Some(Scripted::Hang) => {
                std::future::pending::<()>().await;
                Vec::new()
            }
            Some(Scripted::Block(duration)) => {
                std::thread::sleep(duration);
                Vec::new()
            }
        };

        let mut matched: Vec<Item> = candidates
            .into_iter()
            .filter(|item| filter.matches(item))
            .collect();
        view.sort(&mut matched);
        let total_count = matched.len() as u32;
        let page: Vec<Item> = matched
            .iter()
            .skip(view.offset as usize)
            .take(view.page_size as usize)
            .map(|item| item.project(&view.properties))
            .collect();

        Ok(FindItemsResults {
            total_count,
            more_available: (page.len() as u32) < total_count,
            items: page,
        })
    }

    async fn load_properties(
        &self,
        items: &[Item],
        properties: &PropertySet,
    ) -> Result<Vec<Item>, ServiceError> {
        self.inner.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_next_load.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::remote("ErrorTimeoutExpired", "Request timed out."));
        }

        let store = self.inner.store.lock().unwrap();
        Ok(items
            .iter()
            .map(|item| match store.get(&item.id) {
                Some(full) => full.project(properties),
                None => item.clone(),
            })
            .collect())
    }
}
