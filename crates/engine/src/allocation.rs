//! Per-service split of a receipt.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CurrencyCode, DEBT_TOLERANCE, EngineError, Money, MoneyMap, ResultEngine, ServiceId};

/// Part of a receipt assigned to one service of the booking.
///
/// `amount_service` is expressed in the service's currency. When the money
/// was paid in another currency, `amount_payment`/`payment_currency` record
/// the payment-side figure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAllocation {
    pub service_id: ServiceId,
    pub amount_service: Money,
    #[serde(default)]
    pub amount_payment: Option<Decimal>,
    #[serde(default)]
    pub payment_currency: Option<CurrencyCode>,
}

impl ServiceAllocation {
    #[must_use]
    pub fn new(service_id: ServiceId, amount_service: Money) -> Self {
        Self {
            service_id,
            amount_service,
            amount_payment: None,
            payment_currency: None,
        }
    }

    #[must_use]
    pub fn paid_as(mut self, amount: Decimal, currency: CurrencyCode) -> Self {
        self.amount_payment = Some(amount);
        self.payment_currency = Some(currency);
        self
    }

    /// The amount this allocation draws from the receipt's funds.
    #[must_use]
    pub fn payment_side(&self) -> Money {
        match self.amount_payment {
            Some(amount) => Money::new(
                amount,
                self.payment_currency
                    .unwrap_or(self.amount_service.currency),
            ),
            None => self.amount_service,
        }
    }
}

/// Checks a receipt's allocations against the booking, the resolved ledger
/// scope and the money the receipt actually carries (`available`).
///
/// Returns the allocated total per payment currency.
pub fn validate_allocations(
    allocations: &[ServiceAllocation],
    booking_services: &BTreeSet<ServiceId>,
    scope: &BTreeSet<ServiceId>,
    available: &MoneyMap,
) -> ResultEngine<MoneyMap> {
    let mut seen = BTreeSet::new();
    let mut allocated = MoneyMap::new();

    for allocation in allocations {
        let service_id = allocation.service_id;
        if allocation.amount_service.amount <= Decimal::ZERO
            || allocation.amount_payment.is_some_and(|a| a <= Decimal::ZERO)
        {
            return Err(EngineError::InvalidInput(format!(
                "allocation for service {service_id} must be > 0"
            )));
        }
        if !seen.insert(service_id) {
            return Err(EngineError::InvalidInput(format!(
                "service {service_id} allocated more than once"
            )));
        }
        if !booking_services.contains(&service_id) {
            return Err(EngineError::AllocationOutOfBounds(format!(
                "service {service_id} does not belong to the booking"
            )));
        }
        if !scope.contains(&service_id) {
            return Err(EngineError::AllocationOutOfBounds(format!(
                "service {service_id} is not among the selected services"
            )));
        }
        allocated.add_money(allocation.payment_side());
    }

    for (currency, total) in allocated.iter() {
        let carried = available.get(currency);
        if total - carried > DEBT_TOLERANCE {
            return Err(EngineError::AllocationOutOfBounds(format!(
                "allocations total {} but the receipt carries {}",
                Money::new(total, currency),
                Money::new(carried, currency)
            )));
        }
    }

    Ok(allocated)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn ids(values: &[ServiceId]) -> BTreeSet<ServiceId> {
        values.iter().copied().collect()
    }

    fn ars(amount: Decimal) -> Money {
        Money::new(amount, CurrencyCode::ARS)
    }

    fn available(amount: Decimal) -> MoneyMap {
        [(CurrencyCode::ARS, amount)].into_iter().collect()
    }

    #[test]
    fn allocations_above_carried_funds_are_rejected() {
        let allocations = [
            ServiceAllocation::new(1, ars(dec!(600))),
            ServiceAllocation::new(2, ars(dec!(600))),
        ];
        let err = validate_allocations(
            &allocations,
            &ids(&[1, 2]),
            &ids(&[1, 2]),
            &available(dec!(1000)),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::AllocationOutOfBounds(_)));
    }

    #[test]
    fn allocations_within_funds_pass() {
        let allocations = [
            ServiceAllocation::new(1, ars(dec!(600))),
            ServiceAllocation::new(2, ars(dec!(400.005))),
        ];
        let allocated = validate_allocations(
            &allocations,
            &ids(&[1, 2]),
            &ids(&[1, 2]),
            &available(dec!(1000)),
        )
        .unwrap();
        assert_eq!(allocated.get(CurrencyCode::ARS), dec!(1000.005));
    }

    #[test]
    fn payment_side_amount_is_checked_in_payment_currency() {
        let allocations = [ServiceAllocation::new(1, Money::new(dec!(100), CurrencyCode::USD))
            .paid_as(dec!(110000), CurrencyCode::ARS)];
        let allocated = validate_allocations(
            &allocations,
            &ids(&[1]),
            &ids(&[1]),
            &available(dec!(110000)),
        )
        .unwrap();
        assert_eq!(allocated.get(CurrencyCode::ARS), dec!(110000));
        assert!(!allocated.contains(CurrencyCode::USD));
    }

    #[test]
    fn services_outside_booking_or_scope_are_rejected() {
        let allocation = [ServiceAllocation::new(3, ars(dec!(10)))];
        let err =
            validate_allocations(&allocation, &ids(&[1, 2]), &ids(&[1]), &available(dec!(10)))
                .unwrap_err();
        assert_eq!(
            err,
            EngineError::AllocationOutOfBounds(
                "service 3 does not belong to the booking".to_string()
            )
        );

        let allocation = [ServiceAllocation::new(2, ars(dec!(10)))];
        let err =
            validate_allocations(&allocation, &ids(&[1, 2]), &ids(&[1]), &available(dec!(10)))
                .unwrap_err();
        assert!(matches!(err, EngineError::AllocationOutOfBounds(_)));
    }

    #[test]
    fn duplicates_and_non_positive_amounts_are_invalid() {
        let duplicated = [
            ServiceAllocation::new(1, ars(dec!(10))),
            ServiceAllocation::new(1, ars(dec!(10))),
        ];
        let err = validate_allocations(&duplicated, &ids(&[1]), &ids(&[1]), &available(dec!(100)))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));

        let zero = [ServiceAllocation::new(1, ars(dec!(0)))];
        let err = validate_allocations(&zero, &ids(&[1]), &ids(&[1]), &available(dec!(100)))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }
}
