//! Stock classification from the page's three weak availability signals.

use tracing::debug;

use crate::models::StockState;

pub const OUT_OF_STOCK_MARKER: &str = "Out of Stock";
pub const DELIVERY_UNAVAILABLE_MARKER: &str = "Delivery not available";

/// Derive availability from the three signals. Each disqualifier is computed
/// unconditionally so all three are observable in the debug log:
/// a listing is out of stock when the seller is not the expected one, OR the
/// out-of-stock banner is present, OR delivery is flagged unavailable.
pub fn classify(
    seller_text: &str,
    out_of_stock_text: &str,
    delivery_text: &str,
    expected_seller: &str,
) -> StockState {
    let wrong_seller = !seller_text.contains(expected_seller);
    let marked_out_of_stock = out_of_stock_text.contains(OUT_OF_STOCK_MARKER);
    let delivery_unavailable = delivery_text.contains(DELIVERY_UNAVAILABLE_MARKER);

    debug!(
        wrong_seller,
        marked_out_of_stock, delivery_unavailable, "Stock signals"
    );

    if wrong_seller || marked_out_of_stock || delivery_unavailable {
        StockState::OutOfStock
    } else {
        StockState::InStock
    }
}
