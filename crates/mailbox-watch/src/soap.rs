//! SOAP envelopes for the EWS operations we use, and a small element tree
//! for reading the responses.

use chrono::{DateTime, SecondsFormat, Utc};
use mailbox_types::{
    Body, BodyType, ExchangeVersion, FindItemsResults, FolderId, FolderSummary, FolderView, Item,
    ItemId, ItemView, PropertySet, SearchFilter, WellKnownFolder,
};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt::Write;

use crate::error::ServiceError;

const SOAP_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const TYPES_NS: &str = "http://schemas.microsoft.com/exchange/services/2006/types";
const MESSAGES_NS: &str = "http://schemas.microsoft.com/exchange/services/2006/messages";

/// Wrap an operation body in a SOAP envelope with the version header
pub fn envelope(version: ExchangeVersion, body: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<soap:Envelope xmlns:soap="{soap}" xmlns:t="{types}" xmlns:m="{messages}">"#,
            r#"<soap:Header><t:RequestServerVersion Version="{version}"/></soap:Header>"#,
            r#"<soap:Body>{body}</soap:Body>"#,
            r#"</soap:Envelope>"#
        ),
        soap = SOAP_NS,
        types = TYPES_NS,
        messages = MESSAGES_NS,
        version = version.as_str(),
        body = body,
    )
}

pub fn find_folder_request(parent: WellKnownFolder, view: &FolderView) -> String {
    format!(
        concat!(
            r#"<m:FindFolder Traversal="Shallow">"#,
            r#"<m:FolderShape><t:BaseShape>Default</t:BaseShape></m:FolderShape>"#,
            r#"<m:IndexedPageFolderView MaxEntriesReturned="{page}" Offset="{offset}" BasePoint="Beginning"/>"#,
            r#"<m:ParentFolderIds><t:DistinguishedFolderId Id="{parent}"/></m:ParentFolderIds>"#,
            r#"</m:FindFolder>"#
        ),
        page = view.page_size,
        offset = view.offset,
        parent = parent.distinguished_id(),
    )
}

pub fn find_item_request(folder: &FolderId, filter: &SearchFilter, view: &ItemView) -> String {
    let mut xml = String::from(r#"<m:FindItem Traversal="Shallow">"#);
    xml.push_str(&item_shape(&view.properties));
    let _ = write!(
        xml,
        r#"<m:IndexedPageItemView MaxEntriesReturned="{}" Offset="{}" BasePoint="Beginning"/>"#,
        view.page_size, view.offset
    );

    let mut restriction = String::new();
    write_filter(&mut restriction, filter);
    if !restriction.is_empty() {
        let _ = write!(xml, "<m:Restriction>{}</m:Restriction>", restriction);
    }

    if !view.order_by.is_empty() {
        xml.push_str("<m:SortOrder>");
        for (field, direction) in &view.order_by {
            let _ = write!(
                xml,
                r#"<t:FieldOrder Order="{}"><t:FieldURI FieldURI="{}"/></t:FieldOrder>"#,
                direction.as_str(),
                field.field_uri()
            );
        }
        xml.push_str("</m:SortOrder>");
    }

    let _ = write!(
        xml,
        r#"<m:ParentFolderIds><t:FolderId Id="{}"/></m:ParentFolderIds></m:FindItem>"#,
        escape(folder.0.as_str())
    );
    xml
}

pub fn get_item_request(items: &[Item], properties: &PropertySet) -> String {
    let mut xml = String::from("<m:GetItem>");
    xml.push_str(&item_shape(properties));
    xml.push_str("<m:ItemIds>");
    for item in items {
        let _ = write!(xml, r#"<t:ItemId Id="{}""#, escape(item.id.id.as_str()));
        if let Some(change_key) = &item.id.change_key {
            let _ = write!(xml, r#" ChangeKey="{}""#, escape(change_key.as_str()));
        }
        xml.push_str("/>");
    }
    xml.push_str("</m:ItemIds></m:GetItem>");
    xml
}

fn item_shape(properties: &PropertySet) -> String {
    let mut xml = format!(
        "<m:ItemShape><t:BaseShape>{}</t:BaseShape>",
        properties.base.as_str()
    );
    if !properties.additional.is_empty() {
        xml.push_str("<t:AdditionalProperties>");
        for field in &properties.additional {
            let _ = write!(xml, r#"<t:FieldURI FieldURI="{}"/>"#, field.field_uri());
        }
        xml.push_str("</t:AdditionalProperties>");
    }
    xml.push_str("</m:ItemShape>");
    xml
}

fn write_filter(xml: &mut String, filter: &SearchFilter) {
    match filter {
        SearchFilter::ContainsSubstring { field, value } => {
            let _ = write!(
                xml,
                concat!(
                    r#"<t:Contains ContainmentMode="Substring" ContainmentComparison="IgnoreCase">"#,
                    r#"<t:FieldURI FieldURI="{}"/><t:Constant Value="{}"/></t:Contains>"#
                ),
                field.field_uri(),
                escape(value.as_str())
            );
        }
        SearchFilter::IsGreaterThan { field, value } => {
            let _ = write!(
                xml,
                concat!(
                    r#"<t:IsGreaterThan><t:FieldURI FieldURI="{}"/>"#,
                    r#"<t:FieldURIOrConstant><t:Constant Value="{}"/></t:FieldURIOrConstant>"#,
                    r#"</t:IsGreaterThan>"#
                ),
                field.field_uri(),
                value.to_rfc3339_opts(SecondsFormat::Secs, true)
            );
        }
        SearchFilter::And(filters) => match filters.as_slice() {
            [] => {}
            [single] => write_filter(xml, single),
            many => {
                xml.push_str("<t:And>");
                for f in many {
                    write_filter(xml, f);
                }
                xml.push_str("</t:And>");
            }
        },
    }
}

/// XML element with namespace prefixes stripped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn parse(xml: &str) -> Result<Element, ServiceError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(Self::from_start(&start)?),
                Event::Empty(start) => {
                    let element = Self::from_start(&start)?;
                    Self::attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| ServiceError::malformed("unbalanced end tag"))?;
                    // Indentation between child elements is not content
                    if !element.children.is_empty() && element.text.trim().is_empty() {
                        element.text.clear();
                    }
                    Self::attach(&mut stack, &mut root, element);
                }
                Event::Text(text) => {
                    if let Some(top) = stack.last_mut() {
                        let text = text
                            .unescape()
                            .map_err(|e| ServiceError::malformed(e.to_string()))?;
                        top.text.push_str(&text);
                    }
                }
                Event::CData(data) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(ServiceError::malformed("unexpected end of document"));
        }
        root.ok_or_else(|| ServiceError::malformed("empty document"))
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Element, ServiceError> {
        let mut element = Element {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            ..Element::default()
        };
        for attr in start.attributes() {
            let attr = attr.map_err(|e| ServiceError::malformed(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| ServiceError::malformed(e.to_string()))?
                .into_owned();
            element.attrs.push((key, value));
        }
        Ok(element)
    }

    fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None => *root = Some(element),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Text with surrounding whitespace removed, for codes and timestamps
    pub fn value(&self) -> &str {
        self.text.trim()
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// First element named `name` in document order, including `self`
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// All elements named `name` in document order, not descending into matches
    pub fn find_all<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        if self.name == name {
            out.push(self);
            return;
        }
        for child in &self.children {
            child.find_all(name, out);
        }
    }
}

/// Parse a response document and return its response messages.
///
/// SOAP faults become [`ServiceError::Remote`]. Messages are returned
/// regardless of their `ResponseClass`; see [`check_message`].
pub fn response_messages(xml: &str, message_name: &str) -> Result<Vec<Element>, ServiceError> {
    let root = Element::parse(xml)?;

    if let Some(fault) = root.find("Fault") {
        let code = fault
            .find("ResponseCode")
            .or_else(|| fault.child("faultcode"))
            .map(|e| e.value().to_string())
            .unwrap_or_else(|| "SoapFault".to_string());
        let message = fault
            .find("Message")
            .or_else(|| fault.child("faultstring"))
            .map(|e| e.value().to_string())
            .unwrap_or_default();
        return Err(ServiceError::Remote { code, message });
    }

    let mut found = Vec::new();
    root.find_all(message_name, &mut found);
    if found.is_empty() {
        return Err(ServiceError::malformed(format!(
            "no {} in response",
            message_name
        )));
    }
    Ok(found.into_iter().cloned().collect())
}

/// Turn a `ResponseClass="Error"` message into an error
pub fn check_message(message: &Element) -> Result<(), ServiceError> {
    if message.attr("ResponseClass") == Some("Error") {
        let code = message
            .child("ResponseCode")
            .map(|e| e.value().to_string())
            .unwrap_or_else(|| "ErrorUnknown".to_string());
        let text = message
            .child("MessageText")
            .map(|e| e.value().to_string())
            .unwrap_or_default();
        return Err(ServiceError::Remote {
            code,
            message: text,
        });
    }
    Ok(())
}

fn single_message(xml: &str, message_name: &str) -> Result<Element, ServiceError> {
    let mut messages = response_messages(xml, message_name)?;
    let message = messages.remove(0);
    check_message(&message)?;
    Ok(message)
}

pub fn parse_find_folder_response(xml: &str) -> Result<Vec<FolderSummary>, ServiceError> {
    let message = single_message(xml, "FindFolderResponseMessage")?;
    let folders = message
        .find("Folders")
        .ok_or_else(|| ServiceError::malformed("FindFolder response without Folders"))?;

    folders
        .children
        .iter()
        .map(|folder| {
            let id = folder
                .child("FolderId")
                .and_then(|e| e.attr("Id"))
                .ok_or_else(|| ServiceError::malformed("folder without FolderId"))?;
            Ok(FolderSummary {
                id: FolderId(id.to_string()),
                display_name: folder
                    .child("DisplayName")
                    .map(|e| e.text.clone())
                    .unwrap_or_default(),
            })
        })
        .collect()
}

pub fn parse_find_item_response(xml: &str) -> Result<FindItemsResults, ServiceError> {
    let message = single_message(xml, "FindItemResponseMessage")?;
    let root_folder = message
        .find("RootFolder")
        .ok_or_else(|| ServiceError::malformed("FindItem response without RootFolder"))?;

    let total_count = root_folder
        .attr("TotalItemsInView")
        .unwrap_or("0")
        .parse()
        .map_err(|_| ServiceError::malformed("invalid TotalItemsInView"))?;
    let more_available = root_folder.attr("IncludesLastItemInRange") == Some("false");

    let items = match root_folder.child("Items") {
        Some(items) => items
            .children
            .iter()
            .map(parse_item)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(FindItemsResults {
        total_count,
        items,
        more_available,
    })
}

/// Match GetItem response messages back to the requested items.
///
/// Items whose message carries an error are returned unchanged.
pub fn parse_get_item_response(xml: &str, requested: &[Item]) -> Result<Vec<Item>, ServiceError> {
    let messages = response_messages(xml, "GetItemResponseMessage")?;
    if messages.len() != requested.len() {
        return Err(ServiceError::malformed(format!(
            "expected {} GetItem messages, got {}",
            requested.len(),
            messages.len()
        )));
    }

    let mut loaded = Vec::with_capacity(requested.len());
    for (message, original) in messages.iter().zip(requested) {
        if let Err(e) = check_message(message) {
            tracing::warn!("Failed to load item {}: {}", original.id, e);
            loaded.push(original.clone());
            continue;
        }
        let item = message
            .child("Items")
            .and_then(|items| items.children.first())
            .ok_or_else(|| ServiceError::malformed("GetItem message without an item"))?;
        loaded.push(parse_item(item)?);
    }
    Ok(loaded)
}

fn parse_item(element: &Element) -> Result<Item, ServiceError> {
    let id_element = element
        .child("ItemId")
        .ok_or_else(|| ServiceError::malformed("item without ItemId"))?;
    let id = ItemId {
        id: id_element
            .attr("Id")
            .ok_or_else(|| ServiceError::malformed("ItemId without Id"))?
            .to_string(),
        change_key: id_element.attr("ChangeKey").map(str::to_string),
    };

    let body = element.child("Body").map(|b| Body {
        body_type: match b.attr("BodyType") {
            Some("HTML") => BodyType::Html,
            _ => BodyType::Text,
        },
        text: b.text.clone(),
    });

    Ok(Item {
        id,
        subject: element.child("Subject").map(|e| e.text.clone()),
        date_time_received: parse_time(element, "DateTimeReceived")?,
        date_time_created: parse_time(element, "DateTimeCreated")?,
        body,
    })
}

fn parse_time(element: &Element, name: &str) -> Result<Option<DateTime<Utc>>, ServiceError> {
    element
        .child(name)
        .map(|e| {
            DateTime::parse_from_rfc3339(e.value())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|err| ServiceError::malformed(format!("invalid {}: {}", name, err)))
        })
        .transpose()
}
