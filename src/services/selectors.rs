//! Selector compilation.
//!
//! Parses the configured CSS selectors once per run so that a typo in
//! `config.toml` is reported at start instead of on the first page.

use scraper::Selector;

use crate::error::{AppError, Result};
use crate::models::PageSelectors;

/// Parse a single CSS selector.
pub fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Every selector used by the index and detail extractors, parsed.
#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    pub structured_data: Selector,
    pub next_page: Selector,
    pub attr_name: String,
    pub title: Selector,
    pub article: Selector,
    pub price_value: Selector,
    pub price_label: Selector,
    pub size_teaser: Selector,
    pub rooms_teaser: Selector,
    pub attribute_item: Selector,
    pub attribute_title: Selector,
    pub attribute_value: Selector,
    pub energy_box: Selector,
    pub address: Selector,
    pub ad_id: Selector,
    pub edit_date: Selector,
    pub private_seller: Selector,
    source: PageSelectors,
}

impl CompiledSelectors {
    pub fn compile(selectors: &PageSelectors) -> Result<Self> {
        // The templates must parse for at least the first index.
        parse_selector(&selectors.energy_label_at(0))?;
        parse_selector(&selectors.energy_value_at(0))?;

        Ok(Self {
            structured_data: parse_selector(&selectors.structured_data)?,
            next_page: parse_selector(&selectors.next_page)?,
            attr_name: selectors.attr_name.clone(),
            title: parse_selector(&selectors.title)?,
            article: parse_selector(&selectors.article)?,
            price_value: parse_selector(&selectors.price_value)?,
            price_label: parse_selector(&selectors.price_label)?,
            size_teaser: parse_selector(&selectors.size_teaser)?,
            rooms_teaser: parse_selector(&selectors.rooms_teaser)?,
            attribute_item: parse_selector(&selectors.attribute_item)?,
            attribute_title: parse_selector(&selectors.attribute_title)?,
            attribute_value: parse_selector(&selectors.attribute_value)?,
            energy_box: parse_selector(&selectors.energy_box)?,
            address: parse_selector(&selectors.address)?,
            ad_id: parse_selector(&selectors.ad_id)?,
            edit_date: parse_selector(&selectors.edit_date)?,
            private_seller: parse_selector(&selectors.private_seller)?,
            source: selectors.clone(),
        })
    }

    /// Label and value selectors of the `i`-th energy pass attribute.
    pub fn energy_pair(&self, i: usize) -> Result<(Selector, Selector)> {
        Ok((
            parse_selector(&self.source.energy_label_at(i))?,
            parse_selector(&self.source.energy_value_at(i))?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selector_valid() {
        assert!(parse_selector("div.class").is_ok());
        assert!(parse_selector(r#"span[data-testid="ad-detail-ad-id"]"#).is_ok());
    }

    #[test]
    fn test_parse_selector_invalid() {
        assert!(parse_selector("[[invalid").is_err());
    }

    #[test]
    fn test_default_selectors_compile() {
        let compiled = CompiledSelectors::compile(&PageSelectors::default()).unwrap();
        assert_eq!(compiled.attr_name, "href");
        assert!(compiled.energy_pair(3).is_ok());
    }

    #[test]
    fn test_broken_override_is_reported() {
        let selectors = PageSelectors {
            title: "h1[".to_string(),
            ..PageSelectors::default()
        };
        let err = CompiledSelectors::compile(&selectors).unwrap_err();
        assert!(matches!(err, AppError::Selector { selector, .. } if selector == "h1["));
    }
}
