// src/models/selectors.rs

//! CSS selectors for scraping index and detail pages.

use serde::{Deserialize, Serialize};

/// CSS selectors for the listing site, overridable from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSelectors {
    /// Script tag holding the page's structured data
    #[serde(default = "defaults::structured_data")]
    pub structured_data: String,

    /// Link to the next index page
    #[serde(default = "defaults::next_page")]
    pub next_page: String,

    /// HTML attribute name for extracting links (usually "href")
    #[serde(default = "defaults::attr_name")]
    pub attr_name: String,

    #[serde(default = "defaults::title")]
    pub title: String,

    /// Main article body on the detail page
    #[serde(default = "defaults::article")]
    pub article: String,

    #[serde(default = "defaults::price_value")]
    pub price_value: String,

    /// Label that holds the price while a listing is reserved
    #[serde(default = "defaults::price_label")]
    pub price_label: String,

    #[serde(default = "defaults::size_teaser")]
    pub size_teaser: String,

    #[serde(default = "defaults::rooms_teaser")]
    pub rooms_teaser: String,

    /// Each entry of the attribute lists
    #[serde(default = "defaults::attribute_item")]
    pub attribute_item: String,

    #[serde(default = "defaults::attribute_title")]
    pub attribute_title: String,

    #[serde(default = "defaults::attribute_value")]
    pub attribute_value: String,

    #[serde(default = "defaults::energy_box")]
    pub energy_box: String,

    /// Label selector template, `{i}` is the attribute index
    #[serde(default = "defaults::energy_label")]
    pub energy_label: String,

    /// Value selector template, `{i}` is the attribute index
    #[serde(default = "defaults::energy_value")]
    pub energy_value: String,

    #[serde(default = "defaults::address")]
    pub address: String,

    #[serde(default = "defaults::ad_id")]
    pub ad_id: String,

    #[serde(default = "defaults::edit_date")]
    pub edit_date: String,

    #[serde(default = "defaults::private_seller")]
    pub private_seller: String,
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            structured_data: defaults::structured_data(),
            next_page: defaults::next_page(),
            attr_name: defaults::attr_name(),
            title: defaults::title(),
            article: defaults::article(),
            price_value: defaults::price_value(),
            price_label: defaults::price_label(),
            size_teaser: defaults::size_teaser(),
            rooms_teaser: defaults::rooms_teaser(),
            attribute_item: defaults::attribute_item(),
            attribute_title: defaults::attribute_title(),
            attribute_value: defaults::attribute_value(),
            energy_box: defaults::energy_box(),
            energy_label: defaults::energy_label(),
            energy_value: defaults::energy_value(),
            address: defaults::address(),
            ad_id: defaults::ad_id(),
            edit_date: defaults::edit_date(),
            private_seller: defaults::private_seller(),
        }
    }
}

impl PageSelectors {
    /// Energy pass label selector for the `i`-th attribute.
    pub fn energy_label_at(&self, i: usize) -> String {
        self.energy_label.replace("{i}", &i.to_string())
    }

    /// Energy pass value selector for the `i`-th attribute.
    pub fn energy_value_at(&self, i: usize) -> String {
        self.energy_value.replace("{i}", &i.to_string())
    }
}

mod defaults {
    pub fn structured_data() -> String {
        "script#__NEXT_DATA__".into()
    }
    pub fn next_page() -> String {
        r#"a[data-testid="pagination-top-next-button"]"#.into()
    }
    pub fn attr_name() -> String {
        "href".into()
    }
    pub fn title() -> String {
        "h1".into()
    }
    pub fn article() -> String {
        "article".into()
    }
    pub fn price_value() -> String {
        r#"span[data-testid="contact-box-price-box-price-value-0"]"#.into()
    }
    pub fn price_label() -> String {
        r#"span[data-testid="contact-box-price-box-price-label-0"]"#.into()
    }
    pub fn size_teaser() -> String {
        r#"div[data-testid="ad-detail-teaser-attribute-0"]"#.into()
    }
    pub fn rooms_teaser() -> String {
        r#"div[data-testid="ad-detail-teaser-attribute-1"]"#.into()
    }
    pub fn attribute_item() -> String {
        r#"li[data-testid="attribute-item"]"#.into()
    }
    pub fn attribute_title() -> String {
        r#"div[data-testid="attribute-title"]"#.into()
    }
    pub fn attribute_value() -> String {
        r#"div[data-testid="attribute-value"]"#.into()
    }
    pub fn energy_box() -> String {
        r#"div[data-testid="energy-pass-box"]"#.into()
    }
    pub fn energy_label() -> String {
        r#"span[data-testid="energy-pass-attribute-label-{i}"]"#.into()
    }
    pub fn energy_value() -> String {
        r#"span[data-testid="energy-pass-attribute-value-{i}"]"#.into()
    }
    pub fn address() -> String {
        r#"div[data-testid="object-location-address"]"#.into()
    }
    pub fn ad_id() -> String {
        r#"span[data-testid="ad-detail-ad-id"]"#.into()
    }
    pub fn edit_date() -> String {
        r#"span[data-testid="ad-detail-ad-edit-date"]"#.into()
    }
    pub fn private_seller() -> String {
        r#"div[data-testid="ad-detail-contact-box-private-top"]"#.into()
    }
}
