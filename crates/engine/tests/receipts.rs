use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use engine::{
    AgencyConfig, BookingContext, CurrencyCode, EngineError, LedgerInput, Money, MoneyMap,
    OverpaymentRequest, PaymentLine, ReceiptDraft, ReceiptForDebt, ReceiptPayment,
    ServiceAllocation, ServiceForDebt, compute_ledger, plan_receipt, resolve_scope,
};

fn booking(services: Vec<ServiceForDebt>, prior_receipts: Vec<ReceiptForDebt>) -> BookingContext {
    let selected = services.iter().map(|s| s.id).collect();
    BookingContext {
        services,
        selected_service_ids: selected,
        prior_receipts,
        ..Default::default()
    }
}

fn ars(amount: Decimal) -> PaymentLine {
    PaymentLine::new(amount, "ARS", 1)
}

#[test]
fn overpayment_needs_consent_and_a_named_client() {
    let context = booking(vec![ServiceForDebt::new(1, dec!(1000), "ARS")], vec![]);
    let draft = ReceiptDraft::new(vec![ars(dec!(1200))])
        .booking(context)
        .clients(vec![42]);

    let err = plan_receipt(&draft).unwrap_err();
    assert!(matches!(err, EngineError::Overpayment(_)));

    let plan = plan_receipt(&draft.overpayment(OverpaymentRequest::credit_to(42))).unwrap();
    let excess = plan.excess.unwrap();
    assert_eq!(excess.client_id, 42);
    let expected: MoneyMap = [(CurrencyCode::ARS, dec!(200))].into_iter().collect();
    assert_eq!(excess.by_currency, expected);
}

#[test]
fn settled_scope_rejects_new_receipts() {
    let prior = ReceiptForDebt {
        id: 1,
        amount: dec!(500),
        currency: "ARS".to_string(),
        ..Default::default()
    };
    let context = booking(vec![ServiceForDebt::new(1, dec!(500), "ARS")], vec![prior]);
    let draft = ReceiptDraft::new(vec![ars(dec!(10))]).booking(context.clone());

    assert!(matches!(
        plan_receipt(&draft),
        Err(EngineError::AlreadySettled(_))
    ));

    // editing the receipt that settled the booking is allowed
    let editing = BookingContext {
        editing_receipt_id: Some(1),
        ..context
    };
    let plan = plan_receipt(&ReceiptDraft::new(vec![ars(dec!(500))]).booking(editing)).unwrap();
    assert!(plan.ledger.unwrap().debt_after.is_settled());
}

#[test]
fn allocations_cannot_exceed_the_receipt() {
    let context = booking(
        vec![
            ServiceForDebt::new(1, dec!(800), "ARS"),
            ServiceForDebt::new(2, dec!(800), "ARS"),
        ],
        vec![],
    );
    let draft = ReceiptDraft::new(vec![ars(dec!(1000))])
        .booking(context)
        .allocate(ServiceAllocation::new(
            1,
            Money::new(dec!(600), CurrencyCode::ARS),
        ))
        .allocate(ServiceAllocation::new(
            2,
            Money::new(dec!(600), CurrencyCode::ARS),
        ));

    assert!(matches!(
        plan_receipt(&draft),
        Err(EngineError::AllocationOutOfBounds(_))
    ));
}

#[test]
fn mixed_currencies_need_a_conversion_in_a_booking() {
    let context = booking(vec![ServiceForDebt::new(1, dec!(1000), "ARS")], vec![]);
    let draft = ReceiptDraft::new(vec![ars(dec!(100)), PaymentLine::new(dec!(5), "US$", 1)])
        .booking(context);

    assert!(matches!(
        plan_receipt(&draft),
        Err(EngineError::AmbiguousCurrency(_))
    ));

    // outside a booking the lines are only normalized
    let loose = ReceiptDraft::new(vec![ars(dec!(100)), PaymentLine::new(dec!(5), "US$", 1)]);
    let plan = plan_receipt(&loose).unwrap();
    assert_eq!(plan.credited.get(CurrencyCode::USD), dec!(5));
}

#[test]
fn currencies_never_offset_each_other() {
    let context = booking(
        vec![
            ServiceForDebt::new(1, dec!(1000), "ARS"),
            ServiceForDebt::new(2, dec!(100), "USD"),
        ],
        vec![],
    );
    let plan = plan_receipt(
        &ReceiptDraft::new(vec![PaymentLine::new(dec!(100), "u$s", 1)]).booking(context),
    )
    .unwrap();
    let ledger = plan.ledger.unwrap();

    assert_eq!(ledger.debt_after.get(CurrencyCode::USD), dec!(0));
    assert_eq!(ledger.debt_after.get(CurrencyCode::ARS), dec!(1000));
    assert!(plan.excess.is_none());
}

#[test]
fn receipts_allocated_elsewhere_do_not_count() {
    let other_service = ReceiptForDebt {
        id: 1,
        amount: dec!(300),
        currency: "ARS".to_string(),
        allocations: vec![ServiceAllocation::new(
            2,
            Money::new(dec!(300), CurrencyCode::ARS),
        )],
        ..Default::default()
    };
    let services = vec![
        ServiceForDebt::new(1, dec!(500), "ARS"),
        ServiceForDebt::new(2, dec!(300), "ARS"),
    ];
    let context = BookingContext {
        services,
        selected_service_ids: vec![1],
        prior_receipts: vec![other_service],
        ..Default::default()
    };
    let plan = plan_receipt(&ReceiptDraft::new(vec![ars(dec!(200))]).booking(context)).unwrap();
    let ledger = plan.ledger.unwrap();

    assert_eq!(ledger.paid.get(CurrencyCode::ARS), dec!(0));
    assert_eq!(ledger.debt_after.get(CurrencyCode::ARS), dec!(300));
}

fn currency() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("ARS"), Just("USD"), Just("EUR")]
}

fn amount() -> impl Strategy<Value = Decimal> {
    (1i64..=1_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn services() -> impl Strategy<Value = Vec<ServiceForDebt>> {
    prop::collection::vec((amount(), currency()), 1..6).prop_map(|items| {
        items
            .into_iter()
            .enumerate()
            .map(|(i, (price, cur))| ServiceForDebt::new(i as i64 + 1, price, cur))
            .collect()
    })
}

fn receipts() -> impl Strategy<Value = Vec<ReceiptForDebt>> {
    prop::collection::vec(
        (amount(), currency(), prop::option::of(amount())),
        0..5,
    )
    .prop_map(|items| {
        items
            .into_iter()
            .enumerate()
            .map(|(i, (paid, cur, fee))| ReceiptForDebt {
                id: i as i64 + 1,
                amount: paid,
                currency: cur.to_string(),
                payments: vec![ReceiptPayment {
                    amount: paid,
                    currency: cur.to_string(),
                    fee_amount: fee,
                }],
                ..Default::default()
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn debt_is_sales_minus_paid_per_currency(services in services(), receipts in receipts()) {
        let config = AgencyConfig { booking_sale_mode: true, ..Default::default() };
        let scope = resolve_scope(&config, &services, &[]).unwrap();
        let current = MoneyMap::new();
        let input = LedgerInput {
            config: &config,
            services: &services,
            scope: &scope,
            prior_receipts: &receipts,
            editing_receipt: None,
            current: &current,
        };

        let first = compute_ledger(&input);
        let second = compute_ledger(&input);
        prop_assert_eq!(&first, &second);

        for currency in first.sales.currencies().chain(first.paid.currencies()) {
            prop_assert_eq!(
                first.debt.get(currency),
                first.sales.get(currency) - first.paid.get(currency)
            );
        }
    }

    #[test]
    fn planning_is_repeatable(services in services(), receipts in receipts(), paid in amount()) {
        let context = BookingContext {
            config: AgencyConfig { booking_sale_mode: true, ..Default::default() },
            services,
            prior_receipts: receipts,
            ..Default::default()
        };
        let draft = ReceiptDraft::new(vec![PaymentLine::new(paid, "ARS", 1)])
            .booking(context)
            .clients(vec![1])
            .overpayment(OverpaymentRequest::credit_to(1));

        match (plan_receipt(&draft), plan_receipt(&draft)) {
            (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
            (Err(a), Err(b)) => prop_assert_eq!(a, b),
            _ => prop_assert!(false, "planning the same draft gave different outcomes"),
        }
    }
}
