use chrono::{DateTime, Local, NaiveDate, NaiveTime};
use serde::Serialize;

/// Column order of the persisted product table.
pub const CSV_COLUMNS: [&str; 24] = [
    "timestamp",
    "date",
    "time",
    "name",
    "current_price",
    "price_regular",
    "prime",
    "discount_in_euros",
    "percent_discount",
    "sold_by_amazon",
    "seller",
    "brand",
    "shipping",
    "amazon_choice",
    "amazon_choice_for",
    "asin",
    "product_id",
    "manufacturer",
    "country_of_origin",
    "product_dimensions",
    "number_of_reviews",
    "review_score",
    "on_sale_since",
    "url",
];

/// One extracted product page.
///
/// Optional fields are `None` when the page carried no usable value; present
/// strings are never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRecord {
    pub url: String,
    pub asin: Option<String>,
    pub product_id: Option<String>,

    pub name: Option<String>,

    pub current_price: Option<f64>,
    pub price_regular: Option<f64>,
    pub discount_in_euros: Option<f64>,
    pub percent_discount: Option<f64>,
    pub number_of_reviews: Option<f64>,
    pub review_score: Option<f64>,

    pub prime: bool,
    pub sold_by_amazon: bool,
    pub amazon_choice: bool,

    pub seller: Option<String>,
    pub brand: Option<String>,
    pub shipping: Option<String>,
    pub amazon_choice_for: Option<String>,
    pub manufacturer: Option<String>,
    pub country_of_origin: Option<String>,
    pub product_dimensions: Option<String>,
    pub on_sale_since: Option<String>,

    pub timestamp: DateTime<Local>,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl ProductRecord {
    /// Cell values in `CSV_COLUMNS` order. Absent fields become empty cells.
    pub fn csv_values(&self) -> [String; 24] {
        fn text(v: &Option<String>) -> String {
            v.clone().unwrap_or_default()
        }
        fn number(v: Option<f64>) -> String {
            v.map(|n| n.to_string()).unwrap_or_default()
        }

        [
            self.timestamp.to_rfc3339(),
            self.date.format("%Y-%m-%d").to_string(),
            self.time.format("%H:%M:%S").to_string(),
            text(&self.name),
            number(self.current_price),
            number(self.price_regular),
            self.prime.to_string(),
            number(self.discount_in_euros),
            number(self.percent_discount),
            self.sold_by_amazon.to_string(),
            text(&self.seller),
            text(&self.brand),
            text(&self.shipping),
            self.amazon_choice.to_string(),
            text(&self.amazon_choice_for),
            text(&self.asin),
            text(&self.product_id),
            text(&self.manufacturer),
            text(&self.country_of_origin),
            text(&self.product_dimensions),
            number(self.number_of_reviews),
            number(self.review_score),
            text(&self.on_sale_since),
            self.url.clone(),
        ]
    }

    /// True when both records carry the same extracted data, ignoring the
    /// capture time.
    pub fn same_content(&self, other: &Self) -> bool {
        let mut stamped = other.clone();
        stamped.timestamp = self.timestamp;
        stamped.date = self.date;
        stamped.time = self.time;
        *self == stamped
    }
}
