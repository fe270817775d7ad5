use chrono::Local;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use url::Url;

use crate::error::ExtractError;
use crate::price::{decimal_commas_to_points, parse_number, round_cents};
use crate::record::ProductRecord;

lazy_static! {
    static ref MARKUP_RE: Regex = Regex::new(r"<[A-Za-z!][^>]*>").unwrap();
    static ref BYLINE_RE: Regex = Regex::new(
        r"^(?:Besuche den|Visit the)\s+(.+?)(?:-Store|\s+Store)$|^(?:Marke|Brand):\s*(.+)$"
    )
    .unwrap();
}

/// A location a field value may be read from: the text of elements matching
/// `selector`, or one of their attributes.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    selector: &'static str,
    attr: Option<&'static str>,
}

impl Candidate {
    const fn text(selector: &'static str) -> Self {
        Self { selector, attr: None }
    }

    const fn attr(selector: &'static str, attr: &'static str) -> Self {
        Self {
            selector,
            attr: Some(attr),
        }
    }
}

const NAME: &[Candidate] = &[
    Candidate::text("#productTitle"),
    Candidate::text("#btAsinTitle"),
    Candidate::text("#title"),
    Candidate::text("h1"),
];

const CURRENT_PRICE: &[Candidate] = &[
    Candidate::text("#corePriceDisplay_desktop_feature_div .priceToPay .a-offscreen"),
    Candidate::text("#corePrice_feature_div .a-price:not(.a-text-price) .a-offscreen"),
    Candidate::text("#corePrice_desktop .a-price:not(.a-text-price) .a-offscreen"),
    Candidate::text("#priceblock_dealprice"),
    Candidate::text("#priceblock_ourprice"),
    Candidate::text("#priceblock_saleprice"),
    Candidate::text("#price_inside_buybox"),
    Candidate::text("#newBuyBoxPrice"),
];

const PRICE_REGULAR: &[Candidate] = &[
    Candidate::text("#corePriceDisplay_desktop_feature_div .basisPrice .a-offscreen"),
    Candidate::text("#corePrice_desktop .a-text-price .a-offscreen"),
    Candidate::text("#corePrice_feature_div .a-text-price .a-offscreen"),
    Candidate::text(".priceBlockStrikePriceString"),
    Candidate::text("#listPrice"),
];

const DISPLAYED_SAVINGS: &[Candidate] = &[
    Candidate::text("#corePrice_desktop .priceBlockSavingsString"),
    Candidate::text("#regularprice_savings .priceBlockSavingsString"),
    Candidate::text("#dealprice_savings .priceBlockSavingsString"),
];

const DISCOUNT_BADGE: &[Candidate] = &[
    Candidate::text("#corePriceDisplay_desktop_feature_div .savingsPercentage"),
    Candidate::text(".savingsPercentage"),
];

const NUMBER_OF_REVIEWS: &[Candidate] = &[
    Candidate::text("#acrCustomerReviewText"),
    Candidate::text("[data-hook='total-review-count']"),
];

const REVIEW_SCORE: &[Candidate] = &[
    Candidate::attr("#acrPopover", "title"),
    Candidate::text("#acrPopover .a-icon-alt"),
    Candidate::text("[data-hook='rating-out-of-text']"),
    Candidate::text("#averageCustomerReviews .a-icon-alt"),
];

const SELLER: &[Candidate] = &[
    Candidate::text("#tabular-buybox [tabular-attribute-name='Verkäufer'] .tabular-buybox-text-message"),
    Candidate::text("#tabular-buybox [tabular-attribute-name='Verkauf durch'] .tabular-buybox-text-message"),
    Candidate::text("#tabular-buybox [tabular-attribute-name='Sold by'] .tabular-buybox-text-message"),
    Candidate::text("#sellerProfileTriggerId"),
    Candidate::text("#merchant-info a"),
];

const SHIPPING: &[Candidate] = &[
    Candidate::text("#mir-layout-DELIVERY_BLOCK-slot-PRIMARY_DELIVERY_MESSAGE_LARGE"),
    Candidate::text("#deliveryBlockMessage"),
    Candidate::text("#tabular-buybox [tabular-attribute-name='Versand'] .tabular-buybox-text-message"),
    Candidate::text("#tabular-buybox [tabular-attribute-name='Ships from'] .tabular-buybox-text-message"),
];

const BYLINE: &[Candidate] = &[Candidate::text("#bylineInfo"), Candidate::text("#brand")];

const CHOICE_FOR: &[Candidate] = &[
    Candidate::text("#acBadge_feature_div .ac-keyword-link"),
    Candidate::text(".ac-keyword-link a"),
];

const PRIME_MARKERS: &[&str] = &[
    "#desktop_buybox i.a-icon-prime",
    "#buybox i.a-icon-prime",
    "#corePrice_feature_div i.a-icon-prime",
    "#priceBadging_feature_div i.a-icon-prime",
    "#deliveryBlockMessage i.a-icon-prime",
];

const CHOICE_MARKERS: &[&str] = &[
    "#acBadge_feature_div .ac-badge-wrapper",
    "#acBadge_feature_div .ac-badge-rectangle",
    ".ac-badge-wrapper",
];

const BRAND_LABELS: &[&str] = &["marke", "markenname", "brand"];
const MANUFACTURER_LABELS: &[&str] = &["hersteller", "manufacturer"];
const COUNTRY_LABELS: &[&str] = &["herkunftsland", "country of origin"];
const DIMENSION_LABELS: &[&str] = &[
    "produktabmessungen",
    "abmessungen",
    "artikelabmessungen l x b x h",
    "verpackungsabmessungen",
    "product dimensions",
    "item dimensions",
    "package dimensions",
];
const ON_SALE_LABELS: &[&str] = &[
    "im angebot von amazon.de seit",
    "erhältlich seit",
    "date first available",
];
const PRODUCT_ID_LABELS: &[&str] = &[
    "modellnummer",
    "artikelnummer",
    "item model number",
    "model number",
];
const ASIN_LABELS: &[&str] = &["asin"];

/// Turns a product page into a [`ProductRecord`].
///
/// Every field is looked up independently over an ordered list of candidate
/// locations; a field that cannot be found is left absent. Only input that is
/// not markup at all is rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProductExtractor;

impl ProductExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, html: &str, url: &str) -> Result<ProductRecord, ExtractError> {
        if html.trim().is_empty() {
            return Err(ExtractError::MalformedDocument {
                url: url.to_string(),
                reason: "empty document".to_string(),
            });
        }
        if !MARKUP_RE.is_match(html) {
            return Err(ExtractError::MalformedDocument {
                url: url.to_string(),
                reason: "no markup found".to_string(),
            });
        }

        let document = Html::parse_document(html);
        let details = ProductDetails::from_document(&document);
        let structured = StructuredProduct::from_document(&document);

        let name = first_text(&document, NAME).or_else(|| structured.name.clone());
        if name.is_none() {
            tracing::warn!(url, "no product name found");
        }

        let current_price = first_number(&document, CURRENT_PRICE).or(structured.price);
        let price_regular = first_number(&document, PRICE_REGULAR);
        let (discount_in_euros, percent_discount) =
            self.discounts(&document, current_price, price_regular);

        let seller = first_text(&document, SELLER);
        let sold_by_amazon = seller.as_deref().is_some_and(names_amazon);

        let brand = details
            .get(BRAND_LABELS)
            .or_else(|| first_text(&document, BYLINE).and_then(|b| clean_byline(&b)))
            .or_else(|| structured.brand.clone());

        let asin = asin_from_url(url).or_else(|| details.get(ASIN_LABELS));

        let now = Local::now();
        Ok(ProductRecord {
            url: url.to_string(),
            asin,
            product_id: details.get(PRODUCT_ID_LABELS),
            name,
            current_price,
            price_regular,
            discount_in_euros,
            percent_discount,
            number_of_reviews: first_number(&document, NUMBER_OF_REVIEWS),
            review_score: first_number(&document, REVIEW_SCORE),
            prime: has_marker(&document, PRIME_MARKERS),
            sold_by_amazon,
            amazon_choice: has_marker(&document, CHOICE_MARKERS),
            seller,
            brand,
            shipping: first_text(&document, SHIPPING),
            amazon_choice_for: first_text(&document, CHOICE_FOR),
            manufacturer: details.get(MANUFACTURER_LABELS),
            country_of_origin: details.get(COUNTRY_LABELS),
            product_dimensions: details
                .get(DIMENSION_LABELS)
                .map(|d| decimal_commas_to_points(&d)),
            on_sale_since: details.get(ON_SALE_LABELS),
            timestamp: now,
            date: now.date_naive(),
            time: now.time(),
        })
    }

    /// Savings in currency units and percent. Values computed from the two
    /// prices win over anything the page displays.
    fn discounts(
        &self,
        document: &Html,
        current: Option<f64>,
        regular: Option<f64>,
    ) -> (Option<f64>, Option<f64>) {
        if let (Some(current), Some(regular)) = (current, regular) {
            if regular > 0.0 {
                let saved = regular - current;
                let percent = (saved / regular * 100.0).round();
                return (Some(round_cents(saved)), Some(percent));
            }
        }

        (
            first_number(document, DISPLAYED_SAVINGS),
            first_number(document, DISCOUNT_BADGE),
        )
    }
}

/// Marketplace item id: the path segment after `dp` or `gp/product`.
pub fn asin_from_url(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    for (idx, segment) in segments.iter().enumerate() {
        let next = match *segment {
            "dp" => segments.get(idx + 1),
            "gp" if segments.get(idx + 1) == Some(&"product") => segments.get(idx + 2),
            _ => None,
        };
        if let Some(asin) = next {
            return Some(asin.to_string());
        }
    }
    None
}

fn clean_text(raw: &str) -> Option<String> {
    let text = raw
        .replace(['\u{200e}', '\u{200f}'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

fn candidate_values<'a>(
    document: &'a Html,
    candidate: &Candidate,
) -> impl Iterator<Item = String> + 'a {
    let attr = candidate.attr;
    let matches: Vec<ElementRef<'a>> = match Selector::parse(candidate.selector) {
        Ok(sel) => document.select(&sel).collect(),
        Err(_) => Vec::new(),
    };
    matches.into_iter().filter_map(move |element| match attr {
        Some(name) => element.value().attr(name).and_then(clean_text),
        None => element_text(element),
    })
}

fn first_text(document: &Html, candidates: &[Candidate]) -> Option<String> {
    candidates
        .iter()
        .find_map(|c| candidate_values(document, c).next())
}

fn first_number(document: &Html, candidates: &[Candidate]) -> Option<f64> {
    candidates.iter().find_map(|c| {
        candidate_values(document, c).find_map(|text| parse_number(&text))
    })
}

fn has_marker(document: &Html, selectors: &[&str]) -> bool {
    selectors.iter().any(|s| match Selector::parse(s) {
        Ok(sel) => document.select(&sel).next().is_some(),
        Err(_) => false,
    })
}

fn names_amazon(seller: &str) -> bool {
    seller.to_lowercase().starts_with("amazon")
}

fn clean_byline(byline: &str) -> Option<String> {
    match BYLINE_RE.captures(byline) {
        Some(caps) => caps
            .get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| clean_text(m.as_str())),
        None => clean_text(byline),
    }
}

/// Label/value rows from the product information sections.
struct ProductDetails {
    rows: Vec<(String, String)>,
}

impl ProductDetails {
    fn from_document(document: &Html) -> Self {
        let mut rows = Vec::new();

        if let (Ok(item_sel), Ok(span_sel)) = (
            Selector::parse("#detailBullets_feature_div li, #detailBulletsWrapper_feature_div li"),
            Selector::parse("span.a-list-item > span"),
        ) {
            for item in document.select(&item_sel) {
                let spans: Vec<String> = item.select(&span_sel).filter_map(element_text).collect();
                if let [label, value, ..] = spans.as_slice() {
                    rows.push((normalize_label(label), value.clone()));
                }
            }
        }

        if let (Ok(row_sel), Ok(cell_sel)) = (
            Selector::parse(
                "#productDetails_techSpec_section_1 tr, #productDetails_techSpec_section_2 tr, \
                 #productDetails_detailBullets_sections1 tr, #productOverview_feature_div tr, \
                 .prodDetTable tr",
            ),
            Selector::parse("th, td"),
        ) {
            for row in document.select(&row_sel) {
                let cells: Vec<String> = row.select(&cell_sel).filter_map(element_text).collect();
                if let [label, value, ..] = cells.as_slice() {
                    rows.push((normalize_label(label), value.clone()));
                }
            }
        }

        Self { rows }
    }

    /// Value of the first label (in priority order) present on the page.
    fn get(&self, labels: &[&str]) -> Option<String> {
        labels.iter().find_map(|label| {
            self.rows
                .iter()
                .find(|(key, _)| key == label)
                .map(|(_, value)| value.clone())
        })
    }
}

fn normalize_label(label: &str) -> String {
    clean_text(label)
        .unwrap_or_default()
        .trim_end_matches([':', ' '])
        .to_lowercase()
}

/// Fields from an embedded JSON-LD `Product` block, if the page has one.
#[derive(Debug, Default)]
struct StructuredProduct {
    name: Option<String>,
    brand: Option<String>,
    price: Option<f64>,
}

impl StructuredProduct {
    fn from_document(document: &Html) -> Self {
        let Ok(script_sel) = Selector::parse("script[type='application/ld+json']") else {
            return Self::default();
        };

        for script in document.select(&script_sel) {
            let text = script.text().collect::<String>();
            if text.trim().is_empty() {
                continue;
            }
            let Ok(data) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            if let Some(product) = find_product(&data) {
                return Self::from_json(product);
            }
        }
        Self::default()
    }

    fn from_json(product: &Map<String, Value>) -> Self {
        let name = product
            .get("name")
            .and_then(|v| v.as_str())
            .and_then(clean_text);
        let brand = match product.get("brand") {
            Some(Value::String(s)) => clean_text(s),
            Some(Value::Object(o)) => o.get("name").and_then(|v| v.as_str()).and_then(clean_text),
            _ => None,
        };
        let offer = match product.get("offers") {
            Some(Value::Array(items)) => items.first(),
            other => other,
        };
        let price = offer.and_then(|o| o.get("price")).and_then(|p| match p {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_number(s),
            _ => None,
        });

        Self { name, brand, price }
    }
}

fn find_product(data: &Value) -> Option<&Map<String, Value>> {
    match data {
        Value::Object(obj) => {
            if obj.get("@type").and_then(|v| v.as_str()) == Some("Product") {
                return Some(obj);
            }
            obj.get("@graph").and_then(find_product)
        }
        Value::Array(items) => items.iter().find_map(find_product),
        _ => None,
    }
}
