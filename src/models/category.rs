// src/models/category.rs

//! Listing categories walked by the index crawler.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Whether a listing is offered for rent or for sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Deal {
    Rent,
    Sale,
}

impl Deal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Deal::Rent => "rent",
            Deal::Sale => "sale",
        }
    }
}

impl FromStr for Deal {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rent" => Ok(Deal::Rent),
            "sale" => Ok(Deal::Sale),
            other => Err(AppError::validation(format!("unknown deal '{other}'"))),
        }
    }
}

/// Kind of property behind a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    Flat,
    House,
}

impl PropertyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKind::Flat => "flat",
            PropertyKind::House => "house",
        }
    }
}

impl FromStr for PropertyKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flat" => Ok(PropertyKind::Flat),
            "house" => Ok(PropertyKind::House),
            other => Err(AppError::validation(format!("unknown property kind '{other}'"))),
        }
    }
}

/// One paginated index on the site, e.g. flats for rent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Path segment naming the index on the site (e.g. "mietwohnungen")
    pub slug: String,

    pub deal: Deal,

    pub kind: PropertyKind,
}

impl Category {
    pub fn new(slug: impl Into<String>, deal: Deal, kind: PropertyKind) -> Self {
        Self {
            slug: slug.into(),
            deal,
            kind,
        }
    }

    /// Human-readable key used in the run report, e.g. "rent flats".
    pub fn label(&self) -> String {
        format!("{} {}s", self.deal.as_str(), self.kind.as_str())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
