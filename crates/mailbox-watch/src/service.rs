use async_trait::async_trait;
use mailbox_types::{
    FindItemsResults, FolderId, FolderSummary, FolderView, Item, ItemView, PropertySet,
    SearchFilter, WellKnownFolder,
};

use crate::error::ServiceError;

/// Remote mailbox operations the poll worker depends on.
///
/// Every call is an independent read-only request; implementations hold no
/// state that a later call relies on.
#[async_trait]
pub trait MailboxService: Send + Sync {
    /// List the direct subfolders of `parent`, one page as described by `view`
    async fn find_folders(
        &self,
        parent: WellKnownFolder,
        view: &FolderView,
    ) -> Result<Vec<FolderSummary>, ServiceError>;

    /// Run `filter` against the items of `folder`
    async fn find_items(
        &self,
        folder: &FolderId,
        filter: &SearchFilter,
        view: &ItemView,
    ) -> Result<FindItemsResults, ServiceError>;

    /// Reload `items` with `properties` in one batch.
    ///
    /// The returned list has one entry per input item, in the same order.
    /// An item the server could not load is returned as it was passed in.
    async fn load_properties(
        &self,
        items: &[Item],
        properties: &PropertySet,
    ) -> Result<Vec<Item>, ServiceError>;
}
