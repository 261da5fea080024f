// src/services/detail.rs

//! Detail page extractor.
//!
//! Turns a detail page into an [`ObservedListing`]. A field that cannot be
//! found or parsed is logged and keeps its default; only a malformed
//! structured-data block aborts the page.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::{Regex, RegexBuilder};
use scraper::{ElementRef, Html};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Config, DetailRequest, ExtractionConfig, ObservedListing, PRICE_UNKNOWN};
use crate::services::selectors::CompiledSelectors;
use crate::services::structured::{id_string, page_props, read_structured_data};
use crate::utils::squash_whitespace;

const EDIT_DATE_FORMAT: &str = "%d.%m.%Y, %H:%M";
const START_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Regular expressions used for free-text fields.
#[derive(Debug, Clone)]
struct Patterns {
    number: Regex,
    digit: Regex,
    commission_free: Regex,
    no_duration: Regex,
    duration_suffix: Regex,
    construction: Regex,
    postal_code: Regex,
    district: Regex,
    edit_date: Regex,
}

impl Patterns {
    fn compile() -> Result<Self> {
        Ok(Self {
            number: regex(r"\d+", false)?,
            digit: regex(r"\d", false)?,
            commission_free: regex(r"provi([a-z]+)frei|privatperson|bezahlt der abgeber", true)?,
            no_duration: regex(r"keine|unbefristet", true)?,
            duration_suffix: regex(r" Jahr\(e\)$| Jahre$| Jahr$", false)?,
            construction: regex(r"altbau|neubau", true)?,
            postal_code: regex(r"\b(\d{4})\b", false)?,
            district: regex(r"\b\d{4} ([^,]+)", false)?,
            edit_date: regex(r"\d{2}\.\d{2}\.\d{4}, \d{2}:\d{2}", false)?,
        })
    }
}

fn regex(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| AppError::config(format!("invalid pattern '{pattern}': {e}")))
}

/// Extracts typed listings from detail pages.
#[derive(Debug, Clone)]
pub struct DetailExtractor {
    selectors: CompiledSelectors,
    ranges: ExtractionConfig,
    patterns: Patterns,
}

impl DetailExtractor {
    pub fn new(selectors: CompiledSelectors, ranges: ExtractionConfig) -> Result<Self> {
        Ok(Self {
            selectors,
            ranges,
            patterns: Patterns::compile()?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            CompiledSelectors::compile(&config.selectors)?,
            config.extraction.clone(),
        )
    }

    pub fn selectors(&self) -> &CompiledSelectors {
        &self.selectors
    }

    /// Extract the listing behind `request` from its detail page body.
    pub fn extract(&self, body: &str, request: &DetailRequest) -> Result<ObservedListing> {
        let document = Html::parse_document(body);
        let url = request.url.as_str();

        let mut listing = ObservedListing {
            item_id: request.item_id.clone(),
            url: request.url.clone(),
            deal: request.category.deal,
            kind: request.category.kind,
            title: String::new(),
            description: String::new(),
            current_price: PRICE_UNKNOWN,
            size: 0,
            room_count: 0,
            postal_code: String::new(),
            district: String::new(),
            address: String::new(),
            energy_info: None,
            heating_consumption: None,
            features_info: None,
            contract_duration: None,
            construction_type: None,
            has_commission: true,
            seller_is_private: false,
            edit_date: request.indexed_at.naive_utc(),
            published_at: None,
        };

        self.apply_structured_data(&document, url, &mut listing)?;

        match first(&document, &self.selectors.title) {
            Some(title) => listing.title = text_of(title),
            None => log::error!("title element not found on page {url}"),
        }

        listing.current_price = self.extract_price(&document, url);
        self.extract_size_and_rooms(&document, url, &mut listing);
        self.extract_energy(&document, url, &mut listing);

        let article = first(&document, &self.selectors.article);
        self.extract_features(&document, article, url, &mut listing);
        self.extract_address(&document, url, &mut listing);

        match first(&document, &self.selectors.ad_id) {
            Some(el) => match self.patterns.number.find(&text_of(el)) {
                Some(m) => listing.item_id = m.as_str().to_string(),
                None => log::error!("ad id parsing failed on page {url}"),
            },
            None => log::error!("ad id element not found on page {url}"),
        }

        match first(&document, &self.selectors.edit_date) {
            Some(el) => match self.parse_edit_date(&text_of(el)) {
                Some(edit_date) => listing.edit_date = edit_date,
                None => log::error!("edit date parsing failed on page {url}"),
            },
            None => log::error!("edit date element not found on page {url}"),
        }

        listing.seller_is_private = first(&document, &self.selectors.private_seller).is_some();

        match article {
            Some(article) => {
                let text = article.text().collect::<String>();
                listing.has_commission = !self.patterns.commission_free.is_match(&text);
            }
            None => log::error!("article element not found on page {url}"),
        }

        Ok(listing)
    }

    /// Fields from the structured-data block, when the page carries one.
    fn apply_structured_data(
        &self,
        document: &Html,
        url: &str,
        listing: &mut ObservedListing,
    ) -> Result<()> {
        let Some(data) = read_structured_data(document, &self.selectors.structured_data, url)?
        else {
            log::warn!("structured data block not found on page {url}");
            return Ok(());
        };

        let Some(details) = page_props(&data).and_then(|props| props.get("advertDetails")) else {
            log::warn!("page {url} has no advert details");
            return Ok(());
        };
        if details.is_null() {
            log::warn!("page {url} has no advert details");
            return Ok(());
        }

        if let Some(id) = details.get("id").and_then(id_string) {
            listing.item_id = id;
        }
        if let Some(description) = details.get("description").and_then(Value::as_str) {
            listing.description = description.trim().to_string();
        }

        let published = details
            .get("firstPublishedDate")
            .or_else(|| details.get("startDate"))
            .and_then(Value::as_str);
        if let Some(raw) = published {
            listing.published_at = parse_offset_date(raw);
            if listing.published_at.is_none() {
                log::warn!("unparseable publication date '{raw}' on page {url}");
            }
        }

        Ok(())
    }

    fn extract_price(&self, document: &Html, url: &str) -> i64 {
        let Some(value) = first(document, &self.selectors.price_value) else {
            log::error!("price element not found on page {url}");
            return PRICE_UNKNOWN;
        };

        let mut price = self.parse_price(&text_of(value));
        if price == PRICE_UNKNOWN {
            // Reserved listings show the price in the label instead.
            log::warn!("main price missing for item {url}");
            if let Some(label) = first(document, &self.selectors.price_label) {
                price = self.parse_price(&text_of(label));
            }
        }

        if price == PRICE_UNKNOWN {
            log::error!("could not parse price on page {url}");
        } else if !(self.ranges.min_price < price && price < self.ranges.max_price) {
            log::warn!("unrealistic price {price} on page {url}");
        }
        price
    }

    /// `"€ 99.750"` -> 99750; thousands separators are dots.
    fn parse_price(&self, text: &str) -> i64 {
        let cleaned = text.replace('.', "");
        self.patterns
            .number
            .find(&cleaned)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(PRICE_UNKNOWN)
    }

    fn plausible_size(&self, text: &str, url: &str) -> Option<u32> {
        let size: u32 = self.patterns.number.find(text)?.as_str().parse().ok()?;
        if self.ranges.min_size < size && size < self.ranges.max_size {
            Some(size)
        } else {
            log::warn!("unrealistic size {size} on page {url}");
            None
        }
    }

    fn extract_size_and_rooms(&self, document: &Html, url: &str, listing: &mut ObservedListing) {
        match first(document, &self.selectors.size_teaser) {
            Some(el) => {
                if let Some(size) = self.plausible_size(&text_of(el), url) {
                    listing.size = size;
                }
            }
            None => log::error!("size element not found on page {url}"),
        }

        match first(document, &self.selectors.rooms_teaser) {
            Some(el) => match self.patterns.digit.find(&text_of(el)) {
                Some(m) => listing.room_count = m.as_str().parse().unwrap_or(0),
                None => log::warn!("room count parsing failed on page {url}"),
            },
            None => log::error!("room count element not found on page {url}"),
        }

        let mut items = document.select(&self.selectors.attribute_item).peekable();
        if items.peek().is_none() {
            log::error!("attribute elements not found on page {url}");
            return;
        }

        for item in items {
            let text = text_of(item);
            if listing.size == 0 && text.contains("Nutzfläche") {
                if let Some(size) = self.plausible_size(&text, url) {
                    listing.size = size;
                }
            }
            if listing.room_count == 0 && text.contains("Zimmer") {
                if let Some(rooms) = self
                    .patterns
                    .number
                    .find(&text)
                    .and_then(|m| m.as_str().parse().ok())
                {
                    listing.room_count = rooms;
                }
            }
        }
    }

    fn extract_energy(&self, document: &Html, url: &str, listing: &mut ObservedListing) {
        let Some(energy_box) = first(document, &self.selectors.energy_box) else {
            log::warn!("energy info element not found on page {url}");
            return;
        };

        let mut pairs = Vec::new();
        for i in 0.. {
            let Ok((label_sel, value_sel)) = self.selectors.energy_pair(i) else {
                break;
            };
            let (Some(label), Some(value)) = (
                energy_box.select(&label_sel).next(),
                energy_box.select(&value_sel).next(),
            ) else {
                break;
            };

            let label = text_of(label).replace([' ', ':'], "");
            let value = text_of(value);

            if label.contains("HWB(kWh") {
                match value.replace(',', ".").parse::<f64>() {
                    Ok(hwb) => listing.heating_consumption = Some(hwb),
                    Err(_) => log::warn!("unparseable heating demand '{value}' on page {url}"),
                }
            }
            pairs.push(format!("\"{label}\": \"{value}\""));
        }

        listing.energy_info = Some(pairs.join(", "));
    }

    fn extract_features(
        &self,
        document: &Html,
        article: Option<ElementRef<'_>>,
        url: &str,
        listing: &mut ObservedListing,
    ) {
        let mut pairs = Vec::new();

        for item in document.select(&self.selectors.attribute_item) {
            let (Some(title), Some(value)) = (
                item.select(&self.selectors.attribute_title).next(),
                item.select(&self.selectors.attribute_value).next(),
            ) else {
                continue;
            };
            let title = text_of(title);
            let value = text_of(value);
            if title.is_empty() || value.is_empty() {
                continue;
            }

            match title.as_str() {
                "Befristung" => {
                    listing.contract_duration = Some(if self.patterns.no_duration.is_match(&value) {
                        "0".to_string()
                    } else {
                        self.patterns.duration_suffix.replace(&value, "").into_owned()
                    });
                }
                "Bautyp" => listing.construction_type = Some(value.to_lowercase()),
                _ => {}
            }
            pairs.push(format!("\"{title}\": \"{value}\""));
        }

        if pairs.is_empty() {
            log::warn!("features info not found on page {url}");
        } else {
            listing.features_info = Some(pairs.join(", "));
        }

        if listing.construction_type.is_none() {
            if let Some(article) = article {
                let text: String = article.text().collect();
                listing.construction_type = self
                    .patterns
                    .construction
                    .find(&text)
                    .map(|m| m.as_str().to_lowercase());
            }
        }
    }

    fn extract_address(&self, document: &Html, url: &str, listing: &mut ObservedListing) {
        let Some(el) = first(document, &self.selectors.address) else {
            log::error!("address element not found on page {url}");
            return;
        };

        listing.address = text_of(el);

        match self.patterns.postal_code.captures(&listing.address) {
            Some(caps) => listing.postal_code = caps[1].to_string(),
            None => log::error!("postal code parsing failed on page {url}"),
        }
        match self.patterns.district.captures(&listing.address) {
            Some(caps) => listing.district = caps[1].trim().to_string(),
            None => log::error!("district parsing failed on page {url}"),
        }
    }

    /// `"Zuletzt geändert: 10.01.2026, 09:30 Uhr"` -> 2026-01-10 09:30
    fn parse_edit_date(&self, text: &str) -> Option<NaiveDateTime> {
        let m = self.patterns.edit_date.find(text)?;
        NaiveDateTime::parse_from_str(m.as_str(), EDIT_DATE_FORMAT).ok()
    }
}

fn first<'a>(document: &'a Html, selector: &scraper::Selector) -> Option<ElementRef<'a>> {
    document.select(selector).next()
}

fn text_of(element: ElementRef<'_>) -> String {
    squash_whitespace(&element.text().collect::<String>())
}

fn parse_offset_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, START_DATE_FORMAT))
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::json;

    /// Render a detail page with the markup the extractor expects.
    pub fn detail_html(item_id: &str, price: &str, edit_date: &str, article: &str) -> String {
        let data = json!({
            "props": { "pageProps": { "advertDetails": {
                "id": item_id,
                "description": "Helle Wohnung nahe Zentrum",
                "startDate": "2026-01-05T10:00:00+0100",
            }}}
        });

        format!(
            r#"<html><body>
<script id="__NEXT_DATA__" type="application/json">{data}</script>
<h1>  Schöne 4-Zimmer Wohnung </h1>
<span data-testid="ad-detail-ad-id">willhaben-Code: {item_id}</span>
<span data-testid="ad-detail-ad-edit-date">Zuletzt geändert: {edit_date} Uhr</span>
<span data-testid="contact-box-price-box-price-value-0">€ {price}</span>
<div data-testid="ad-detail-teaser-attribute-0">85 m²</div>
<div data-testid="ad-detail-teaser-attribute-1">4 Zimmer</div>
<div data-testid="object-location-address">8020 Graz, Lend, Annenstraße</div>
<ul>
  <li data-testid="attribute-item"><div data-testid="attribute-title">Befristung</div><div data-testid="attribute-value">3 Jahre</div></li>
  <li data-testid="attribute-item"><div data-testid="attribute-title">Stockwerk(e)</div><div data-testid="attribute-value">2</div></li>
</ul>
<div data-testid="energy-pass-box">
  <span data-testid="energy-pass-attribute-label-0">HWB (kWh/m²/Jahr):</span>
  <span data-testid="energy-pass-attribute-value-0">45,3</span>
  <span data-testid="energy-pass-attribute-label-1">fGEE:</span>
  <span data-testid="energy-pass-attribute-value-1">0,85</span>
</div>
<article>{article}</article>
</body></html>"#
        )
    }
}
