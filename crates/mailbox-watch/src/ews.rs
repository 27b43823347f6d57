//! Exchange Web Services client over SOAP/HTTPS.

use async_trait::async_trait;
use mailbox_types::{
    ExchangeVersion, FindItemsResults, FolderId, FolderSummary, FolderView, Item, ItemView,
    PropertySet, SearchFilter, WellKnownFolder,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};

use crate::config::EwsConfig;
use crate::error::ServiceError;
use crate::service::MailboxService;
use crate::soap;

/// Client for one EWS endpoint and one set of credentials
pub struct EwsClient {
    http: Client,
    url: Url,
    login: String,
    password: String,
    version: ExchangeVersion,
}

impl EwsClient {
    /// Prepare a client for `config`. No request is sent until the first call.
    pub fn connect(config: &EwsConfig) -> Result<Self, ServiceError> {
        tracing::info!("Connecting to Exchange service at {}", config.url);

        let url = Url::parse(&config.url)
            .map_err(|e| ServiceError::InvalidUrl(format!("{}: {}", config.url, e)))?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(ServiceError::InvalidUrl(format!(
                "{}: unsupported scheme",
                config.url
            )));
        }

        let http = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            url,
            login: config.login.clone(),
            password: config.password.clone(),
            version: config.version,
        })
    }

    async fn call(&self, operation: &str, body: String) -> Result<String, ServiceError> {
        tracing::debug!("Sending {} request", operation);

        let response = self
            .http
            .post(self.url.clone())
            .basic_auth(&self.login, Some(&self.password))
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(soap::envelope(self.version, &body))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            // Server-side failures usually come back as a SOAP fault with a 500
            let message_name = format!("{}ResponseMessage", operation);
            let parsed = soap::response_messages(&text, &message_name);
            if let Err(fault @ ServiceError::Remote { .. }) = parsed {
                return Err(fault);
            }
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body: text.chars().take(512).collect(),
            });
        }

        Ok(text)
    }
}

#[async_trait]
impl MailboxService for EwsClient {
    async fn find_folders(
        &self,
        parent: WellKnownFolder,
        view: &FolderView,
    ) -> Result<Vec<FolderSummary>, ServiceError> {
        let xml = self
            .call("FindFolder", soap::find_folder_request(parent, view))
            .await?;
        soap::parse_find_folder_response(&xml)
    }

    async fn find_items(
        &self,
        folder: &FolderId,
        filter: &SearchFilter,
        view: &ItemView,
    ) -> Result<FindItemsResults, ServiceError> {
        let xml = self
            .call("FindItem", soap::find_item_request(folder, filter, view))
            .await?;
        soap::parse_find_item_response(&xml)
    }

    async fn load_properties(
        &self,
        items: &[Item],
        properties: &PropertySet,
    ) -> Result<Vec<Item>, ServiceError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let xml = self
            .call("GetItem", soap::get_item_request(items, properties))
            .await?;
        soap::parse_get_item_response(&xml, items)
    }
}
