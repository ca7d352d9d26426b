//! Snapshot formatter
//!
//! Renders store entries into the fixed-width report sent to destinations.
//! Pure and deterministic: the output depends only on the entries passed in.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt::Write;

use crate::store::{PricePoint, Symbol};

/// Glyph ramp, lowest to highest level
pub const BAR_GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Number of glyphs in every bar
pub const BAR_WIDTH: usize = 8;

pub const REPORT_TITLE: &str = "Real-time Market Data";

const SYMBOL_WIDTH: usize = 10;
const PRICE_WIDTH: usize = 14;
const NOT_AVAILABLE: &str = "N/A";

/// Render a snapshot, one line per entry in the order given
pub fn format_snapshot(entries: &[(Symbol, PricePoint)]) -> String {
    let range = PriceRange::of(entries);
    let mut out = String::with_capacity(REPORT_TITLE.len() + 2 + entries.len() * 48);

    out.push_str(REPORT_TITLE);
    out.push('\n');

    for (symbol, point) in entries {
        let level = point.last.map(|last| range.level(last)).unwrap_or(0);
        let _ = write!(
            out,
            "\n{:<sw$} {} {:>pw$}  {}",
            symbol.as_str(),
            bar(level),
            format_price(point.last),
            format_change(point.change_pct_24h),
            sw = SYMBOL_WIDTH,
            pw = PRICE_WIDTH,
        );
    }

    out
}

/// Bar made of one glyph repeated `BAR_WIDTH` times
pub fn bar(level: usize) -> String {
    let glyph = BAR_GLYPHS[level.min(BAR_GLYPHS.len() - 1)];
    std::iter::repeat(glyph).take(BAR_WIDTH).collect()
}

/// Price with a magnitude dependent scale, or "N/A"
pub fn format_price(last: Option<Decimal>) -> String {
    let Some(price) = last else {
        return NOT_AVAILABLE.to_string();
    };

    let magnitude = price.abs();
    let dp = if magnitude >= Decimal::ONE_HUNDRED {
        2
    } else if magnitude >= Decimal::ONE {
        4
    } else {
        6
    };

    let mut rounded = price.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    rounded.to_string()
}

/// Percent change with a direction marker, or "N/A"
pub fn format_change(change: Option<Decimal>) -> String {
    let Some(change) = change else {
        return NOT_AVAILABLE.to_string();
    };

    let mut rounded = change.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);

    if rounded.is_sign_positive() && !rounded.is_zero() {
        format!("▲ +{rounded}%")
    } else if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("▼ {rounded}%")
    } else {
        "• 0.00%".to_string()
    }
}

/// Min/max of the known prices of one snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
struct PriceRange {
    min: Decimal,
    max: Decimal,
}

impl PriceRange {
    fn of(entries: &[(Symbol, PricePoint)]) -> Self {
        let mut known = entries.iter().filter_map(|(_, point)| point.last);
        let Some(first) = known.next() else {
            return Self {
                min: Decimal::ZERO,
                max: Decimal::ZERO,
            };
        };

        known.fold(Self { min: first, max: first }, |range, price| Self {
            min: range.min.min(price),
            max: range.max.max(price),
        })
    }

    /// Ramp level of a known price; a flat range puts every price at the top
    fn level(&self, price: Decimal) -> usize {
        let top = BAR_GLYPHS.len() - 1;
        let Some((offset, span)) = Self::distances(price, self.min, self.max) else {
            return top;
        };
        if span <= Decimal::ZERO {
            return top;
        }

        let scaled = offset
            .checked_div(span)
            .and_then(|ratio| ratio.checked_mul(Decimal::from(top)))
            .unwrap_or(Decimal::ZERO)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

        scaled.to_usize().unwrap_or(0).min(top)
    }

    /// `(price - min, max - min)`, computed on values scaled down by ten
    /// when the full-size difference does not fit in a `Decimal`
    fn distances(price: Decimal, min: Decimal, max: Decimal) -> Option<(Decimal, Decimal)> {
        let exact = price.checked_sub(min).zip(max.checked_sub(min));
        exact.or_else(|| {
            let (price, min, max) = (price / Decimal::TEN, min / Decimal::TEN, max / Decimal::TEN);
            price.checked_sub(min).zip(max.checked_sub(min))
        })
    }
}
