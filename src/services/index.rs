// src/services/index.rs

//! Index page parser.
//!
//! Index pages carry their listing summaries in the structured-data block:
//!
//! ```text
//! props.pageProps.searchResult.advertSummaryList.advertSummary[]
//!     id
//!     attributes.attribute[] { name, values[] }
//!         SEO_URL           detail path relative to /iad/
//!         PUBLISHED_String  2026-01-10T09:30:00Z
//!         PRICE             "850" or "850.5"
//! ```

use chrono::NaiveDateTime;
use scraper::Html;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Category, IndexEntry, IndexPage, IndexRow, PRICE_UNKNOWN, SiteConfig};
use crate::services::selectors::CompiledSelectors;
use crate::services::structured::{id_string, page_props, read_structured_data};
use crate::utils::resolve;

const PUBLISHED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Deserialize)]
struct AdvertSummary {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    attributes: AttributeList,
}

#[derive(Debug, Default, Deserialize)]
struct AttributeList {
    #[serde(default)]
    attribute: Vec<Attribute>,
}

#[derive(Debug, Deserialize)]
struct Attribute {
    name: String,
    #[serde(default)]
    values: Vec<String>,
}

/// Parse one index page of `category`.
///
/// Returns `Ok(None)` when the page has no structured-data block.
pub fn parse_index_page(
    body: &str,
    page_url: &str,
    category: &Category,
    site: &SiteConfig,
    selectors: &CompiledSelectors,
) -> Result<Option<IndexPage>> {
    let document = Html::parse_document(body);

    let Some(data) = read_structured_data(&document, &selectors.structured_data, page_url)?
    else {
        return Ok(None);
    };

    let summaries = page_props(&data)
        .and_then(|props| props.pointer("/searchResult/advertSummaryList/advertSummary"))
        .cloned()
        .ok_or_else(|| AppError::extraction(page_url, "no advert summary list"))?;
    let summaries: Vec<AdvertSummary> = serde_json::from_value(summaries)
        .map_err(|e| AppError::extraction(page_url, format!("bad advert summary: {e}")))?;

    let detail_path = site.detail_path(category);
    let rows = summaries
        .into_iter()
        .map(|summary| classify(summary, &site.base_url, &detail_path))
        .collect();

    let next_page = document
        .select(&selectors.next_page)
        .next()
        .and_then(|link| link.value().attr(&selectors.attr_name))
        .and_then(|href| resolve(page_url, href));

    Ok(Some(IndexPage { rows, next_page }))
}

fn classify(summary: AdvertSummary, base_url: &str, detail_path: &str) -> IndexRow {
    let item_id = id_string(&summary.id).unwrap_or_default();

    let mut url = None;
    let mut published_at = None;
    let mut price = None;

    for attribute in &summary.attributes.attribute {
        let Some(value) = attribute.values.first() else {
            continue;
        };
        match attribute.name.as_str() {
            "SEO_URL" => {
                let full = format!(
                    "{}/iad/{}",
                    base_url.trim_end_matches('/'),
                    value.trim_start_matches('/')
                );
                if !full.contains(detail_path) {
                    return IndexRow::Foreign { item_id };
                }
                url = Some(full);
            }
            "PUBLISHED_String" => {
                published_at = NaiveDateTime::parse_from_str(value, PUBLISHED_FORMAT)
                    .ok()
                    .map(|ts| ts.and_utc());
            }
            "PRICE" => {
                price = Some(
                    value
                        .trim()
                        .parse::<f64>()
                        .map(|p| p as i64)
                        .unwrap_or(PRICE_UNKNOWN),
                );
            }
            _ => {}
        }
    }

    match (url, published_at, price) {
        (Some(url), Some(published_at), Some(price)) if !item_id.is_empty() => {
            IndexRow::Entry(IndexEntry {
                item_id,
                url,
                published_at,
                price,
            })
        }
        _ => IndexRow::Incomplete { item_id },
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::json;

    /// One advert summary for [`index_html`].
    pub struct Ad<'a> {
        pub id: &'a str,
        pub slug: &'a str,
        pub published: &'a str,
        pub price: &'a str,
    }

    /// Render an index page around the given summaries.
    pub fn index_html(ads: &[Ad<'_>], next_page: Option<&str>) -> String {
        let summaries: Vec<_> = ads
            .iter()
            .map(|ad| {
                json!({
                    "id": ad.id,
                    "attributes": { "attribute": [
                        { "name": "SEO_URL", "values": [format!(
                            "immobilien/d/{}/steiermark/graz/listing-{}/", ad.slug, ad.id
                        )] },
                        { "name": "PUBLISHED_String", "values": [ad.published] },
                        { "name": "PRICE", "values": [ad.price] },
                    ]}
                })
            })
            .collect();

        let data = json!({
            "props": { "pageProps": { "searchResult": {
                "advertSummaryList": { "advertSummary": summaries }
            }}}
        });

        let next = next_page
            .map(|href| {
                format!(r#"<a data-testid="pagination-top-next-button" href="{href}">next</a>"#)
            })
            .unwrap_or_default();

        format!(
            r#"<html><body>{next}<script id="__NEXT_DATA__" type="application/json">{data}</script></body></html>"#
        )
    }

    /// Absolute detail URL produced for an [`Ad`] under the default site.
    pub fn detail_url(slug: &str, id: &str) -> String {
        format!(
            "https://www.willhaben.at/iad/immobilien/d/{slug}/steiermark/graz/listing-{id}/"
        )
    }
}
