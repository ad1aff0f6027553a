//! Copy (physical instance of a title) model and related types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{CopyId, TitleId};

/// Copy availability, stored as text in `lms_book_copies.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum CopyStatus {
    Available,
    Loaned,
}

impl CopyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyStatus::Available => "Available",
            CopyStatus::Loaned => "Loaned",
        }
    }
}

impl FromStr for CopyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Available" => Ok(CopyStatus::Available),
            "Loaned" => Ok(CopyStatus::Loaned),
            other => Err(format!("unknown copy status '{}'", other)),
        }
    }
}

/// One lendable copy of a catalog title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BookCopy {
    pub copy_id: CopyId,
    pub title_id: TitleId,
    pub status: CopyStatus,
}

/// How a caller names the title to borrow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleRef {
    Id(TitleId),
    Isbn(String),
}

impl fmt::Display for TitleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TitleRef::Id(id) => write!(f, "{}", id),
            TitleRef::Isbn(isbn) => write!(f, "isbn {}", isbn),
        }
    }
}

impl From<TitleId> for TitleRef {
    fn from(id: TitleId) -> Self {
        TitleRef::Id(id)
    }
}

/// Copy counts for one title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TitleAvailability {
    pub title_id: TitleId,
    pub total_copies: usize,
    pub available_copies: usize,
}

impl TitleAvailability {
    pub fn from_copies(title_id: TitleId, copies: &[BookCopy]) -> Self {
        Self {
            title_id,
            total_copies: copies.len(),
            available_copies: copies
                .iter()
                .filter(|c| c.status == CopyStatus::Available)
                .count(),
        }
    }
}
