//! Field extraction from rendered product pages.
//!
//! Each field is pulled through an ordered cascade of strategies: the next
//! strategy runs only when the current one yields exactly empty, and the
//! first non-empty result wins. Strategies are never merged. A field whose
//! every strategy comes up empty is an empty string, not an error.

use scraper::{Html, Selector};

// ── Selectors (Walmart layout variants) ───────────────────────────────────────

const TITLE_SEL: &str = "h1";
const TITLE_ATTR: &str = "content";

const PRICE_PRIMARY_SEL: &str = ".price-characteristic";
const PRICE_PRIMARY_ATTR: &str = "content";

// Out-of-stock listings drop the priced container and show the amount split
// across a whole-number node and a fraction node.
const PRICE_WHOLE_SEL: &str = "#price > div > span.hide-content.display-inline-block-m > span > span.price-group.price-out-of-stock > span.price-characteristic";
const PRICE_FRACTION_SEL: &str = "#price > div > span.hide-content.display-inline-block-m > span > span.price-group.price-out-of-stock > span.price-mantissa";

const SELLER_SEL: &str = ".seller-name";
const OUT_OF_STOCK_SEL: &str = ".prod-ProductOffer-oosMsg";
const DELIVERY_SEL: &str = ".fulfillment-shipping-text";

// ── Strategies ────────────────────────────────────────────────────────────────

enum Strategy {
    /// Read an attribute off the first matching element.
    Attr {
        selector: &'static str,
        attr: &'static str,
    },
    /// Collect the text of the first matching element.
    Text { selector: &'static str },
    /// Join a whole-number node and a fraction node as "<whole>.<fraction>".
    WholeFraction {
        whole: &'static str,
        fraction: &'static str,
    },
}

impl Strategy {
    fn extract(&self, doc: &Html) -> String {
        match self {
            Strategy::Attr { selector, attr } => {
                first_attr(doc, selector, attr).unwrap_or_default()
            }
            Strategy::Text { selector } => first_text(doc, selector).unwrap_or_default(),
            Strategy::WholeFraction { whole, fraction } => {
                let whole = first_text(doc, whole).unwrap_or_default();
                let fraction = first_text(doc, fraction).unwrap_or_default();
                if whole.is_empty() && fraction.is_empty() {
                    String::new()
                } else {
                    format!("{whole}.{fraction}")
                }
            }
        }
    }
}

fn first_attr(doc: &Html, selector: &str, attr: &str) -> Option<String> {
    let Ok(sel) = Selector::parse(selector) else {
        return None;
    };
    doc.select(&sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let Ok(sel) = Selector::parse(selector) else {
        return None;
    };
    doc.select(&sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
}

/// Run a cascade: first non-empty strategy result wins.
fn cascade(doc: &Html, strategies: &[Strategy]) -> String {
    for strategy in strategies {
        let value = strategy.extract(doc);
        if !value.is_empty() {
            return value;
        }
    }
    String::new()
}

// ── Extracted fields ──────────────────────────────────────────────────────────

/// Raw structured fields pulled from one rendered page. All fields degrade
/// to empty strings when their DOM regions are missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageFields {
    pub title: String,
    pub price_raw: String,
    pub seller_text: String,
    pub out_of_stock_text: String,
    pub delivery_text: String,
}

impl PageFields {
    pub fn extract(html: &str) -> Self {
        let doc = Html::parse_document(html);

        Self {
            title: cascade(
                &doc,
                &[Strategy::Attr {
                    selector: TITLE_SEL,
                    attr: TITLE_ATTR,
                }],
            ),
            price_raw: cascade(
                &doc,
                &[
                    Strategy::Attr {
                        selector: PRICE_PRIMARY_SEL,
                        attr: PRICE_PRIMARY_ATTR,
                    },
                    Strategy::WholeFraction {
                        whole: PRICE_WHOLE_SEL,
                        fraction: PRICE_FRACTION_SEL,
                    },
                ],
            ),
            seller_text: cascade(&doc, &[Strategy::Text { selector: SELLER_SEL }]),
            out_of_stock_text: cascade(
                &doc,
                &[Strategy::Text {
                    selector: OUT_OF_STOCK_SEL,
                }],
            ),
            delivery_text: cascade(
                &doc,
                &[Strategy::Text {
                    selector: DELIVERY_SEL,
                }],
            ),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK_PRICE_HTML: &str = r#"
        <div id="price"><div>
          <span class="hide-content display-inline-block-m"><span>
            <span class="price-group price-out-of-stock">
              <span class="price-characteristic">24</span>
              <span class="price-mantissa">99</span>
            </span>
          </span></span>
        </div></div>
    "#;

    fn page(body: &str) -> String {
        format!("<html><body>{body}</body></html>")
    }

    #[test]
    fn title_read_from_heading_attribute() {
        let html = page(r#"<h1 content="Widget Pro 3000">Widget Pro 3000</h1>"#);
        let fields = PageFields::extract(&html);
        assert_eq!(fields.title, "Widget Pro 3000");
    }

    #[test]
    fn missing_title_yields_empty_not_error() {
        let fields = PageFields::extract(&page("<p>no heading here</p>"));
        assert_eq!(fields.title, "");
    }

    #[test]
    fn primary_price_wins_when_present() {
        // Both layouts present: the fallback must not contribute.
        let html = page(&format!(
            r#"<span class="price-characteristic" content="19.99">19</span>{FALLBACK_PRICE_HTML}"#
        ));
        let fields = PageFields::extract(&html);
        assert_eq!(fields.price_raw, "19.99");
    }

    #[test]
    fn fallback_concatenates_whole_and_fraction() {
        let fields = PageFields::extract(&page(FALLBACK_PRICE_HTML));
        assert_eq!(fields.price_raw, "24.99");
    }

    #[test]
    fn primary_with_empty_attribute_falls_through() {
        let html = page(&format!(
            r#"<span class="price-characteristic" content="">19</span>{FALLBACK_PRICE_HTML}"#
        ));
        let fields = PageFields::extract(&html);
        assert_eq!(fields.price_raw, "24.99");
    }

    #[test]
    fn no_price_layout_yields_empty_string() {
        let fields = PageFields::extract(&page("<p>call for pricing</p>"));
        assert_eq!(fields.price_raw, "");
    }

    #[test]
    fn optional_regions_degrade_to_empty() {
        let fields = PageFields::extract(&page("<h1 content=\"x\"></h1>"));
        assert_eq!(fields.seller_text, "");
        assert_eq!(fields.out_of_stock_text, "");
        assert_eq!(fields.delivery_text, "");
    }

    #[test]
    fn stock_signal_regions_extracted_when_present() {
        let html = page(
            r#"<div class="seller-name">Sold by Walmart.com</div>
               <div class="prod-ProductOffer-oosMsg">Out of Stock</div>
               <div class="fulfillment-shipping-text">Delivery not available</div>"#,
        );
        let fields = PageFields::extract(&html);
        assert_eq!(fields.seller_text, "Sold by Walmart.com");
        assert_eq!(fields.out_of_stock_text, "Out of Stock");
        assert_eq!(fields.delivery_text, "Delivery not available");
    }
}
