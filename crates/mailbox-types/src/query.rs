//! Search filters, views and property sets for item and folder queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::Item;

/// Item properties that can be projected, filtered or sorted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemField {
    Subject,
    DateTimeReceived,
    DateTimeCreated,
    Body,
}

impl ItemField {
    /// Property path as used in `FieldURI` elements
    pub fn field_uri(&self) -> &'static str {
        match self {
            ItemField::Subject => "item:Subject",
            ItemField::DateTimeReceived => "item:DateTimeReceived",
            ItemField::DateTimeCreated => "item:DateTimeCreated",
            ItemField::Body => "item:Body",
        }
    }

    pub fn is_sortable(&self) -> bool {
        !matches!(self, ItemField::Body)
    }
}

impl fmt::Display for ItemField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_uri())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("cannot sort on {0}")]
    NotSortable(ItemField),
    #[error("page size must be greater than zero")]
    EmptyPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "Ascending",
            SortDirection::Descending => "Descending",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasePropertySet {
    IdOnly,
    FirstClassProperties,
}

impl BasePropertySet {
    /// `BaseShape` value on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            BasePropertySet::IdOnly => "IdOnly",
            BasePropertySet::FirstClassProperties => "AllProperties",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySet {
    pub base: BasePropertySet,
    pub additional: Vec<ItemField>,
}

impl PropertySet {
    pub fn id_only() -> Self {
        Self {
            base: BasePropertySet::IdOnly,
            additional: Vec::new(),
        }
    }

    pub fn first_class() -> Self {
        Self {
            base: BasePropertySet::FirstClassProperties,
            additional: Vec::new(),
        }
    }

    pub fn with(mut self, field: ItemField) -> Self {
        if !self.additional.contains(&field) {
            self.additional.push(field);
        }
        self
    }

    pub fn includes(&self, field: ItemField) -> bool {
        match self.base {
            BasePropertySet::FirstClassProperties => true,
            BasePropertySet::IdOnly => self.additional.contains(&field),
        }
    }
}

/// Paged view over the subfolders of a folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderView {
    pub page_size: u32,
    pub offset: u32,
}

impl FolderView {
    pub fn new(page_size: u32) -> Result<Self, QueryError> {
        if page_size == 0 {
            return Err(QueryError::EmptyPage);
        }
        Ok(Self {
            page_size,
            offset: 0,
        })
    }
}

/// Paged, sorted and projected view over the items of a folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
    pub page_size: u32,
    pub offset: u32,
    pub order_by: Vec<(ItemField, SortDirection)>,
    pub properties: PropertySet,
}

impl ItemView {
    pub fn new(page_size: u32) -> Result<Self, QueryError> {
        if page_size == 0 {
            return Err(QueryError::EmptyPage);
        }
        Ok(Self {
            page_size,
            offset: 0,
            order_by: Vec::new(),
            properties: PropertySet::first_class(),
        })
    }

    pub fn order_by(
        mut self,
        field: ItemField,
        direction: SortDirection,
    ) -> Result<Self, QueryError> {
        if !field.is_sortable() {
            return Err(QueryError::NotSortable(field));
        }
        self.order_by.push((field, direction));
        Ok(self)
    }

    pub fn with_properties(mut self, properties: PropertySet) -> Self {
        self.properties = properties;
        self
    }

    /// Sort `items` in place following `order_by`
    pub fn sort(&self, items: &mut [Item]) {
        items.sort_by(|a, b| {
            for (field, direction) in &self.order_by {
                let ordering = match field {
                    ItemField::Subject => a.subject.cmp(&b.subject),
                    ItemField::DateTimeReceived => a.date_time_received.cmp(&b.date_time_received),
                    ItemField::DateTimeCreated => a.date_time_created.cmp(&b.date_time_created),
                    ItemField::Body => std::cmp::Ordering::Equal,
                };
                let ordering = match direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                };
                if ordering.is_ne() {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
    }
}

/// Restriction applied by find-items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchFilter {
    /// Case-insensitive substring match on a text field
    ContainsSubstring { field: ItemField, value: String },
    /// Strictly later than `value`
    IsGreaterThan {
        field: ItemField,
        value: DateTime<Utc>,
    },
    And(Vec<SearchFilter>),
}

impl SearchFilter {
    pub fn contains(field: ItemField, value: impl Into<String>) -> Self {
        SearchFilter::ContainsSubstring {
            field,
            value: value.into(),
        }
    }

    pub fn greater_than(field: ItemField, value: DateTime<Utc>) -> Self {
        SearchFilter::IsGreaterThan { field, value }
    }

    /// Evaluate the filter against an item. Missing properties never match.
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            SearchFilter::ContainsSubstring { field, value } => {
                let text = match field {
                    ItemField::Subject => item.subject.as_deref(),
                    ItemField::Body => item.body.as_ref().map(|b| b.text.as_str()),
                    _ => None,
                };
                text.is_some_and(|t| t.to_lowercase().contains(&value.to_lowercase()))
            }
            SearchFilter::IsGreaterThan { field, value } => {
                let at = match field {
                    ItemField::DateTimeReceived => item.date_time_received,
                    ItemField::DateTimeCreated => item.date_time_created,
                    _ => None,
                };
                at.is_some_and(|t| t > *value)
            }
            SearchFilter::And(filters) => filters.iter().all(|f| f.matches(item)),
        }
    }
}
