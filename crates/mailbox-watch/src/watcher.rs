//! Mailbox poll worker.
//!
//! Resolves the target folder under the Inbox, then polls it for items
//! matching the configured subject and creation time until a first batch
//! shows up or the run is cancelled.

use mailbox_types::{
    FolderId, FolderSummary, FolderView, Item, ItemField, ItemView, PropertySet, SearchFilter,
    SortDirection, WellKnownFolder,
};

use crate::cancel::CancelToken;
use crate::config::WatchCriteria;
use crate::error::{ServiceError, WatchError};
use crate::service::MailboxService;

/// How a watch run ended on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The first non-empty batch, loaded with full properties
    Found(Vec<Item>),
    /// No subfolder name contained the configured substring
    FolderMissing,
    /// Cancellation was observed before a batch arrived
    Cancelled,
}

enum PollStep {
    Found(Vec<Item>),
    Empty,
    Cancelled,
}

pub struct MailboxWatcher<S> {
    service: S,
    criteria: WatchCriteria,
}

impl<S: MailboxService> MailboxWatcher<S> {
    pub fn new(service: S, criteria: WatchCriteria) -> Self {
        Self { service, criteria }
    }

    /// Run until a batch is found, the folder is missing, or `cancel` fires.
    ///
    /// Consumes the watcher so the service connection is released when the
    /// run ends.
    pub async fn run(self, cancel: &CancelToken) -> Result<WatchOutcome, WatchError> {
        let folder = match self.resolve_folder().await {
            Ok(Some(folder)) => folder,
            Ok(None) => {
                tracing::error!("Folder {} does not exist.", self.criteria.folder_name);
                return Ok(WatchOutcome::FolderMissing);
            }
            Err(e) => {
                tracing::error!("{}", e);
                return Err(e);
            }
        };
        tracing::info!("Watching folder {} ({})", folder.display_name, folder.id);

        let view = self.item_view().inspect_err(|e| tracing::error!("{}", e))?;
        let filter = self.filter();

        while !cancel.is_cancelled() {
            match self.poll_once(&folder.id, &filter, &view, cancel).await {
                Ok(PollStep::Found(items)) => return Ok(WatchOutcome::Found(items)),
                Ok(PollStep::Cancelled) => {
                    tracing::info!("Watch cancelled");
                    return Ok(WatchOutcome::Cancelled);
                }
                Ok(PollStep::Empty) => {}
                Err(e) => tracing::error!("Poll failed: {}", e),
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Watch cancelled while sleeping");
                    return Ok(WatchOutcome::Cancelled);
                }
                _ = tokio::time::sleep(self.criteria.poll_interval) => {}
            }
        }

        tracing::info!("Watch cancelled");
        Ok(WatchOutcome::Cancelled)
    }

    /// First subfolder of the Inbox whose display name contains the
    /// configured substring
    pub async fn resolve_folder(&self) -> Result<Option<FolderSummary>, WatchError> {
        let view = FolderView::new(self.criteria.folder_page_size)?;
        let folders = self
            .service
            .find_folders(WellKnownFolder::Inbox, &view)
            .await
            .map_err(WatchError::FolderListing)?;

        tracing::debug!("Inbox has {} subfolders", folders.len());
        Ok(folders
            .into_iter()
            .find(|f| f.display_name.contains(&self.criteria.folder_name)))
    }

    fn item_view(&self) -> Result<ItemView, WatchError> {
        let view = ItemView::new(self.criteria.item_page_size)?
            .order_by(ItemField::DateTimeReceived, SortDirection::Ascending)?
            .with_properties(
                PropertySet::id_only()
                    .with(ItemField::Subject)
                    .with(ItemField::DateTimeReceived),
            );
        Ok(view)
    }

    fn filter(&self) -> SearchFilter {
        SearchFilter::And(vec![
            SearchFilter::contains(ItemField::Subject, self.criteria.subject.clone()),
            SearchFilter::greater_than(ItemField::DateTimeCreated, self.criteria.created_after),
        ])
    }

    async fn poll_once(
        &self,
        folder: &FolderId,
        filter: &SearchFilter,
        view: &ItemView,
        cancel: &CancelToken,
    ) -> Result<PollStep, ServiceError> {
        let results = self.service.find_items(folder, filter, view).await?;
        tracing::info!("total {}", results.total_count);

        if cancel.is_cancelled() {
            return Ok(PollStep::Cancelled);
        }
        if results.total_count == 0 {
            return Ok(PollStep::Empty);
        }

        let items = self
            .service
            .load_properties(&results.items, &PropertySet::first_class())
            .await?;
        for item in &items {
            match item.body() {
                Ok(body) => tracing::info!("{}", body),
                Err(e) => tracing::error!("Item {}: {}", item.id, e),
            }
        }
        Ok(PollStep::Found(items))
    }
}
