use rust_decimal::Decimal;

use crate::model::*;

use super::ValidationError;

/// Totals for an appointment composed of one or more service lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceTotals {
    pub total_price: Decimal,
    pub total_duration: Minute,
}

impl ServiceTotals {
    pub fn end_time(&self, start: Minute) -> Result<Minute, ValidationError> {
        let end = start.saturating_add(self.total_duration);
        if end > MINUTES_PER_DAY {
            return Err(ValidationError::CrossesMidnight);
        }
        Ok(end)
    }
}

/// Sum price and duration over all lines. Order does not matter.
pub fn aggregate(lines: &[ServiceLineItem]) -> Result<ServiceTotals, ValidationError> {
    if lines.is_empty() {
        return Err(ValidationError::NoServiceLines);
    }

    let mut total_price = Decimal::ZERO;
    let mut total_duration: Minute = 0;
    for line in lines {
        if line.duration == 0 {
            return Err(ValidationError::ZeroDuration);
        }
        if line.price.is_sign_negative() && !line.price.is_zero() {
            return Err(ValidationError::NegativePrice);
        }
        total_price = total_price
            .checked_add(line.price)
            .ok_or(ValidationError::PriceOverflow)?;
        total_duration = total_duration.saturating_add(line.duration);
    }

    Ok(ServiceTotals {
        total_price,
        total_duration,
    })
}

/// Display string for the lines, in the order given.
pub fn service_label(lines: &[ServiceLineItem]) -> String {
    lines
        .iter()
        .map(|l| l.name.as_str())
        .collect::<Vec<_>>()
        .join(" + ")
}
