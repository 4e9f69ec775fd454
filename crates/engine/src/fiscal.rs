//! Fiscal breakdown of a sale.
//!
//! Splits the margin of a sale (or of several services added together) into
//! the buckets an invoice needs: the non-computable part of the cost, the
//! taxable bases at 21% and 10.5%, and the agency commission split into an
//! exempt part and taxable parts with their VAT.
//!
//! When both VAT components of the cost are present, any taxable remainder
//! that the VAT figures do not explain is assigned to the 21% bucket.
//!
//! Every derived figure can be replaced by hand ([`ManualOverrides`]); the
//! replaced values, not the computed ones, flow into the totals, and the
//! breakdown stays flagged as manually adjusted.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    AgencyConfig, CurrencyCode, DEBT_TOLERANCE, EngineError, ResultEngine,
    money::{amount_too_large, ensure_within_limit},
    round2,
};

const RATE_21: Decimal = Decimal::from_parts(21, 0, 0, false, 2);
const RATE_10_5: Decimal = Decimal::from_parts(105, 0, 0, false, 3);
const FACTOR_21: Decimal = Decimal::from_parts(121, 0, 0, false, 2);
const FACTOR_10_5: Decimal = Decimal::from_parts(1105, 0, 0, false, 3);

/// Sale, cost and tax figures of one service or of a whole document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalInputs {
    #[serde(default)]
    pub currency: CurrencyCode,
    pub sale_price: Decimal,
    pub cost: Decimal,
    /// VAT included in the cost at 21%.
    #[serde(default)]
    pub vat_21: Decimal,
    /// VAT included in the cost at 10.5%.
    #[serde(default)]
    pub vat_10_5: Decimal,
    #[serde(default)]
    pub exempt: Decimal,
    #[serde(default)]
    pub other_taxes: Decimal,
    /// Card interest charged on top of the sale. Not read by
    /// [`compute_breakdown`], which derives the taxable split from
    /// `card_interest_vat`; it is echoed in [`FiscalReport::inputs`] for the
    /// document that prints the surcharge.
    #[serde(default)]
    pub card_interest: Decimal,
    #[serde(default)]
    pub card_interest_vat: Decimal,
    /// Bank transfer fee as a fraction of the sale price (`0.024` = 2.4%).
    #[serde(default)]
    pub transfer_fee_pct: Decimal,
}

impl FiscalInputs {
    /// Adds up the figures of several services of the same document.
    ///
    /// All services must share currency and transfer fee percentage.
    pub fn aggregate<'a>(items: impl IntoIterator<Item = &'a FiscalInputs>) -> ResultEngine<Self> {
        let mut items = items.into_iter();
        let Some(first) = items.next() else {
            return Err(EngineError::InvalidInput(
                "nothing to aggregate".to_string(),
            ));
        };
        let mut total = first.clone();
        for item in items {
            if item.currency != total.currency {
                return Err(EngineError::CurrencyMismatch(format!(
                    "cannot add {} figures to {} figures",
                    item.currency, total.currency
                )));
            }
            if item.transfer_fee_pct != total.transfer_fee_pct {
                return Err(EngineError::InvalidInput(
                    "services use different transfer fee percentages".to_string(),
                ));
            }
            total.sale_price = add(total.sale_price, item.sale_price)?;
            total.cost = add(total.cost, item.cost)?;
            total.vat_21 = add(total.vat_21, item.vat_21)?;
            total.vat_10_5 = add(total.vat_10_5, item.vat_10_5)?;
            total.exempt = add(total.exempt, item.exempt)?;
            total.other_taxes = add(total.other_taxes, item.other_taxes)?;
            total.card_interest = add(total.card_interest, item.card_interest)?;
            total.card_interest_vat = add(total.card_interest_vat, item.card_interest_vat)?;
        }
        Ok(total)
    }
}

/// Derived figures shown on an invoice-like document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalBreakdown {
    pub non_computable: Decimal,
    pub taxable_base_21: Decimal,
    pub taxable_base_10_5: Decimal,
    pub commission_exempt: Decimal,
    pub commission_21: Decimal,
    pub commission_10_5: Decimal,
    pub vat_on_commission_21: Decimal,
    pub vat_on_commission_10_5: Decimal,
    pub total_commission_without_vat: Decimal,
    /// Total VAT: cost VAT, commission VAT and card interest VAT.
    pub imp_iva: Decimal,
    pub taxable_card_interest: Decimal,
    pub vat_on_card_interest: Decimal,
    pub transfer_fee_amount: Decimal,
    pub transfer_fee_pct: Decimal,
}

/// Individually overridable breakdown field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BreakdownField {
    #[serde(rename = "non_computable")]
    NonComputable,
    #[serde(rename = "taxable_base_21")]
    TaxableBase21,
    #[serde(rename = "taxable_base_10_5")]
    TaxableBase10_5,
    #[serde(rename = "commission_exempt")]
    CommissionExempt,
    #[serde(rename = "commission_21")]
    Commission21,
    #[serde(rename = "commission_10_5")]
    Commission10_5,
    #[serde(rename = "vat_on_commission_21")]
    VatOnCommission21,
    #[serde(rename = "vat_on_commission_10_5")]
    VatOnCommission10_5,
    #[serde(rename = "total_commission_without_vat")]
    TotalCommissionWithoutVat,
    #[serde(rename = "imp_iva")]
    ImpIva,
    #[serde(rename = "taxable_card_interest")]
    TaxableCardInterest,
    #[serde(rename = "vat_on_card_interest")]
    VatOnCardInterest,
    #[serde(rename = "transfer_fee_amount")]
    TransferFeeAmount,
    #[serde(rename = "transfer_fee_pct")]
    TransferFeePct,
}

impl BreakdownField {
    pub const ALL: [BreakdownField; 14] = [
        Self::NonComputable,
        Self::TaxableBase21,
        Self::TaxableBase10_5,
        Self::CommissionExempt,
        Self::Commission21,
        Self::Commission10_5,
        Self::VatOnCommission21,
        Self::VatOnCommission10_5,
        Self::TotalCommissionWithoutVat,
        Self::ImpIva,
        Self::TaxableCardInterest,
        Self::VatOnCardInterest,
        Self::TransferFeeAmount,
        Self::TransferFeePct,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NonComputable => "non_computable",
            Self::TaxableBase21 => "taxable_base_21",
            Self::TaxableBase10_5 => "taxable_base_10_5",
            Self::CommissionExempt => "commission_exempt",
            Self::Commission21 => "commission_21",
            Self::Commission10_5 => "commission_10_5",
            Self::VatOnCommission21 => "vat_on_commission_21",
            Self::VatOnCommission10_5 => "vat_on_commission_10_5",
            Self::TotalCommissionWithoutVat => "total_commission_without_vat",
            Self::ImpIva => "imp_iva",
            Self::TaxableCardInterest => "taxable_card_interest",
            Self::VatOnCardInterest => "vat_on_card_interest",
            Self::TransferFeeAmount => "transfer_fee_amount",
            Self::TransferFeePct => "transfer_fee_pct",
        }
    }
}

impl TryFrom<&str> for BreakdownField {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let wanted = value.trim();
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == wanted)
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown breakdown field: {wanted}")))
    }
}

impl fmt::Display for BreakdownField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FiscalBreakdown {
    #[must_use]
    pub fn get(&self, field: BreakdownField) -> Decimal {
        match field {
            BreakdownField::NonComputable => self.non_computable,
            BreakdownField::TaxableBase21 => self.taxable_base_21,
            BreakdownField::TaxableBase10_5 => self.taxable_base_10_5,
            BreakdownField::CommissionExempt => self.commission_exempt,
            BreakdownField::Commission21 => self.commission_21,
            BreakdownField::Commission10_5 => self.commission_10_5,
            BreakdownField::VatOnCommission21 => self.vat_on_commission_21,
            BreakdownField::VatOnCommission10_5 => self.vat_on_commission_10_5,
            BreakdownField::TotalCommissionWithoutVat => self.total_commission_without_vat,
            BreakdownField::ImpIva => self.imp_iva,
            BreakdownField::TaxableCardInterest => self.taxable_card_interest,
            BreakdownField::VatOnCardInterest => self.vat_on_card_interest,
            BreakdownField::TransferFeeAmount => self.transfer_fee_amount,
            BreakdownField::TransferFeePct => self.transfer_fee_pct,
        }
    }

    pub fn set(&mut self, field: BreakdownField, value: Decimal) {
        let slot = match field {
            BreakdownField::NonComputable => &mut self.non_computable,
            BreakdownField::TaxableBase21 => &mut self.taxable_base_21,
            BreakdownField::TaxableBase10_5 => &mut self.taxable_base_10_5,
            BreakdownField::CommissionExempt => &mut self.commission_exempt,
            BreakdownField::Commission21 => &mut self.commission_21,
            BreakdownField::Commission10_5 => &mut self.commission_10_5,
            BreakdownField::VatOnCommission21 => &mut self.vat_on_commission_21,
            BreakdownField::VatOnCommission10_5 => &mut self.vat_on_commission_10_5,
            BreakdownField::TotalCommissionWithoutVat => &mut self.total_commission_without_vat,
            BreakdownField::ImpIva => &mut self.imp_iva,
            BreakdownField::TaxableCardInterest => &mut self.taxable_card_interest,
            BreakdownField::VatOnCardInterest => &mut self.vat_on_card_interest,
            BreakdownField::TransferFeeAmount => &mut self.transfer_fee_amount,
            BreakdownField::TransferFeePct => &mut self.transfer_fee_pct,
        };
        *slot = value;
    }
}

/// Non-fatal inconsistencies in the fiscal inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakdownWarning {
    SaleNotAboveCost,
    TaxableExceedsNetCost,
    NegativeCommission,
    NegativeNonComputable,
    ZeroNetCost,
}

impl fmt::Display for BreakdownWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::SaleNotAboveCost => "sale price does not exceed cost",
            Self::TaxableExceedsNetCost => "taxable bases plus exempt exceed the net cost",
            Self::NegativeCommission => "commission without VAT is negative",
            Self::NegativeNonComputable => "non-computable amount is negative",
            Self::ZeroNetCost => "net cost is zero, exempt share cannot be derived",
        };
        f.write_str(msg)
    }
}

/// Computed breakdown with the inputs it came from and its warnings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalReport {
    pub inputs: FiscalInputs,
    pub breakdown: FiscalBreakdown,
    pub warnings: Vec<BreakdownWarning>,
}

/// Manually entered replacements for breakdown fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManualOverrides(BTreeMap<BreakdownField, Decimal>);

impl ManualOverrides {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, field: BreakdownField, value: Decimal) -> Self {
        self.0.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: BreakdownField, value: Decimal) {
        self.0.insert(field, value);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BreakdownField, Decimal)> + '_ {
        self.0.iter().map(|(f, v)| (*f, *v))
    }
}

/// Breakdown after manual corrections.
///
/// `effective` is what invoices must use; `computed` is kept for comparison.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustedBreakdown {
    pub computed: FiscalBreakdown,
    pub effective: FiscalBreakdown,
    pub overridden: BTreeSet<BreakdownField>,
}

impl AdjustedBreakdown {
    #[must_use]
    pub fn manually_adjusted(&self) -> bool {
        !self.overridden.is_empty()
    }

    #[must_use]
    pub fn is_overridden(&self, field: BreakdownField) -> bool {
        self.overridden.contains(&field)
    }
}

fn add(a: Decimal, b: Decimal) -> ResultEngine<Decimal> {
    a.checked_add(b).ok_or_else(amount_too_large)
}

fn sub(a: Decimal, b: Decimal) -> ResultEngine<Decimal> {
    a.checked_sub(b).ok_or_else(amount_too_large)
}

fn mul(a: Decimal, b: Decimal) -> ResultEngine<Decimal> {
    a.checked_mul(b).ok_or_else(amount_too_large)
}

/// `numerator / denominator`, or 0 when the denominator is 0.
fn ratio(numerator: Decimal, denominator: Decimal) -> ResultEngine<Decimal> {
    if denominator.is_zero() {
        Ok(Decimal::ZERO)
    } else {
        numerator
            .checked_div(denominator)
            .ok_or_else(amount_too_large)
    }
}

fn ensure_fraction(pct: Decimal) -> ResultEngine<()> {
    if pct < Decimal::ZERO || pct > Decimal::ONE {
        return Err(EngineError::InvalidInput(format!(
            "transfer fee percentage must be a fraction between 0 and 1, got {pct}"
        )));
    }
    Ok(())
}

/// Computes the fiscal breakdown of `inputs`.
///
/// In manual-breakdown mode card interest is left out of the breakdown.
/// Amounts beyond [`crate::MAX_AMOUNT`], a transfer fee percentage outside
/// `0..=1`, or a near-zero blended factor that would blow the commission up
/// are rejected with `InvalidInput`.
pub fn compute_breakdown(inputs: &FiscalInputs, config: &AgencyConfig) -> ResultEngine<FiscalReport> {
    let FiscalInputs {
        sale_price,
        cost,
        vat_21,
        vat_10_5,
        exempt,
        other_taxes,
        card_interest,
        card_interest_vat,
        transfer_fee_pct,
        ..
    } = *inputs;

    for (what, value) in [
        ("sale price", sale_price),
        ("cost", cost),
        ("vat 21", vat_21),
        ("vat 10.5", vat_10_5),
        ("exempt amount", exempt),
        ("other taxes", other_taxes),
        ("card interest", card_interest),
        ("card interest vat", card_interest_vat),
    ] {
        ensure_within_limit(value, what)?;
    }
    ensure_fraction(transfer_fee_pct)?;

    let net_cost = round2(cost - (vat_21 + vat_10_5) - other_taxes);
    let transfer_fee_amount = round2(sale_price * transfer_fee_pct);

    let taxable_base_21 = if vat_21.is_zero() {
        Decimal::ZERO
    } else {
        round2(vat_21 / RATE_21)
    };
    let taxable_base_10_5 = if vat_10_5.is_zero() {
        Decimal::ZERO
    } else {
        round2(vat_10_5 / RATE_10_5)
    };

    let margin = round2(sale_price - cost);
    let non_computable = round2(net_cost - (exempt + taxable_base_21 + taxable_base_10_5));
    let exempt_share = ratio(exempt, net_cost)?;
    let taxable_share = Decimal::ONE - exempt_share;

    let (commission_exempt, commission_21, commission_10_5) =
        if vat_21.is_zero() && vat_10_5.is_zero() {
            let factor = add(exempt_share, mul(taxable_share, FACTOR_21)?)?;
            let net_commission = ratio(margin, factor)?;
            let commission_exempt = round2(mul(net_commission, exempt_share)?);
            let commission_21 = round2(sub(net_commission, commission_exempt)?);
            (commission_exempt, commission_21, Decimal::ZERO)
        } else {
            let unexplained = net_cost - exempt - taxable_base_21 - taxable_base_10_5;
            let effective_21 = taxable_base_21 + unexplained;
            let effective_10_5 = taxable_base_10_5;
            let taxable_total = effective_21 + effective_10_5;
            let (weight_21, weight_10_5) = if taxable_total.is_zero() {
                (Decimal::ONE, Decimal::ZERO)
            } else {
                (
                    ratio(effective_21, taxable_total)?,
                    ratio(effective_10_5, taxable_total)?,
                )
            };
            let blended = add(mul(weight_21, FACTOR_21)?, mul(weight_10_5, FACTOR_10_5)?)?;
            let factor = add(exempt_share, mul(taxable_share, blended)?)?;
            let net_commission = ratio(margin, factor)?;
            let commission_exempt = round2(mul(net_commission, exempt_share)?);
            let taxable_commission = round2(sub(net_commission, commission_exempt)?);
            let commission_21 = round2(mul(taxable_commission, weight_21)?);
            let commission_10_5 = sub(taxable_commission, commission_21)?;
            (commission_exempt, commission_21, commission_10_5)
        };
    for commission in [commission_exempt, commission_21, commission_10_5] {
        ensure_within_limit(commission, "commission")?;
    }

    let vat_on_commission_21 = round2(commission_21 * RATE_21);
    let vat_on_commission_10_5 = round2(commission_10_5 * RATE_10_5);

    let (taxable_card_interest, vat_on_card_interest) =
        if config.manual_breakdown || card_interest_vat.is_zero() {
            (Decimal::ZERO, Decimal::ZERO)
        } else {
            (round2(card_interest_vat / RATE_21), round2(card_interest_vat))
        };

    let total_commission_without_vat = commission_exempt + commission_21 + commission_10_5;
    let imp_iva = round2(
        vat_21 + vat_10_5 + vat_on_commission_21 + vat_on_commission_10_5 + vat_on_card_interest,
    );

    let mut warnings = Vec::new();
    if sale_price <= cost {
        warnings.push(BreakdownWarning::SaleNotAboveCost);
    }
    if exempt + taxable_base_21 + taxable_base_10_5 - net_cost > DEBT_TOLERANCE {
        warnings.push(BreakdownWarning::TaxableExceedsNetCost);
    }
    if total_commission_without_vat < Decimal::ZERO {
        warnings.push(BreakdownWarning::NegativeCommission);
    }
    if non_computable < Decimal::ZERO {
        warnings.push(BreakdownWarning::NegativeNonComputable);
    }
    if net_cost.is_zero() {
        warnings.push(BreakdownWarning::ZeroNetCost);
    }
    for warning in &warnings {
        tracing::warn!(currency = %inputs.currency, %warning, "fiscal breakdown inconsistency");
    }

    Ok(FiscalReport {
        inputs: inputs.clone(),
        breakdown: FiscalBreakdown {
            non_computable,
            taxable_base_21,
            taxable_base_10_5,
            commission_exempt,
            commission_21,
            commission_10_5,
            vat_on_commission_21,
            vat_on_commission_10_5,
            total_commission_without_vat,
            imp_iva,
            taxable_card_interest,
            vat_on_card_interest,
            transfer_fee_amount,
            transfer_fee_pct,
        },
        warnings,
    })
}

impl FiscalReport {
    /// Applies manual corrections.
    ///
    /// Overridden values replace the computed ones and feed the figures that
    /// depend on them, unless those were overridden too:
    ///
    /// | overridden                         | recomputed                      |
    /// |------------------------------------|---------------------------------|
    /// | `transfer_fee_pct`                 | `transfer_fee_amount`           |
    /// | `commission_21` / `commission_10_5`| VAT on that commission          |
    /// | any commission bucket              | `total_commission_without_vat`  |
    /// | any commission or VAT bucket       | `imp_iva`                       |
    ///
    /// Override values follow the same bounds as the inputs.
    pub fn with_overrides(&self, overrides: &ManualOverrides) -> ResultEngine<AdjustedBreakdown> {
        let computed = self.breakdown.clone();
        let mut effective = computed.clone();
        let mut overridden = BTreeSet::new();
        for (field, value) in overrides.iter() {
            if field == BreakdownField::TransferFeePct {
                ensure_fraction(value)?;
            } else {
                ensure_within_limit(value, field.as_str())?;
            }
            effective.set(field, value);
            overridden.insert(field);
        }
        let touched = |field: BreakdownField| overridden.contains(&field);

        if touched(BreakdownField::TransferFeePct) && !touched(BreakdownField::TransferFeeAmount) {
            effective.transfer_fee_amount =
                round2(self.inputs.sale_price * effective.transfer_fee_pct);
        }
        if touched(BreakdownField::Commission21) && !touched(BreakdownField::VatOnCommission21) {
            effective.vat_on_commission_21 = round2(effective.commission_21 * RATE_21);
        }
        if touched(BreakdownField::Commission10_5) && !touched(BreakdownField::VatOnCommission10_5)
        {
            effective.vat_on_commission_10_5 = round2(effective.commission_10_5 * RATE_10_5);
        }

        let commission_fields = [
            BreakdownField::CommissionExempt,
            BreakdownField::Commission21,
            BreakdownField::Commission10_5,
        ];
        if commission_fields.into_iter().any(touched)
            && !touched(BreakdownField::TotalCommissionWithoutVat)
        {
            effective.total_commission_without_vat =
                effective.commission_exempt + effective.commission_21 + effective.commission_10_5;
        }

        let vat_fields = [
            BreakdownField::Commission21,
            BreakdownField::Commission10_5,
            BreakdownField::VatOnCommission21,
            BreakdownField::VatOnCommission10_5,
            BreakdownField::VatOnCardInterest,
        ];
        if vat_fields.into_iter().any(touched) && !touched(BreakdownField::ImpIva) {
            effective.imp_iva = round2(
                self.inputs.vat_21
                    + self.inputs.vat_10_5
                    + effective.vat_on_commission_21
                    + effective.vat_on_commission_10_5
                    + effective.vat_on_card_interest,
            );
        }

        Ok(AdjustedBreakdown {
            computed,
            effective,
            overridden,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn inputs(sale: Decimal, cost: Decimal) -> FiscalInputs {
        FiscalInputs {
            currency: CurrencyCode::ARS,
            sale_price: sale,
            cost,
            ..Default::default()
        }
    }

    #[test]
    fn sale_without_vat_uses_the_21_factor() {
        let report = compute_breakdown(&inputs(dec!(1000), dec!(700)), &AgencyConfig::default()).unwrap();
        let b = &report.breakdown;

        assert_eq!(b.taxable_base_21, dec!(0));
        assert_eq!(b.non_computable, dec!(700));
        assert_eq!(b.commission_exempt, dec!(0));
        assert_eq!(b.commission_21, dec!(247.93));
        assert_eq!(b.vat_on_commission_21, dec!(52.07));
        assert!((b.commission_21 * dec!(1.21) - dec!(300)).abs() <= DEBT_TOLERANCE);
        assert_eq!(b.commission_21 + b.vat_on_commission_21, dec!(300));
        assert_eq!(b.imp_iva, dec!(52.07));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn exempt_share_splits_the_commission() {
        let report = compute_breakdown(
            &FiscalInputs {
                exempt: dec!(350),
                ..inputs(dec!(1000), dec!(700))
            },
            &AgencyConfig::default(),
        )
        .unwrap();
        let b = &report.breakdown;
        // factor = 0.5 + 0.5 * 1.21 = 1.105; net commission = 271.4932...
        assert_eq!(b.commission_exempt, dec!(135.75));
        assert_eq!(b.commission_21, dec!(135.74));
        assert_eq!(b.non_computable, dec!(350));
        assert_eq!(b.total_commission_without_vat, dec!(271.49));
    }

    #[test]
    fn both_rates_split_proportionally() {
        let report = compute_breakdown(
            &FiscalInputs {
                vat_21: dec!(21),
                vat_10_5: dec!(10.5),
                ..inputs(dec!(1500), dec!(1231.5))
            },
            &AgencyConfig::default(),
        )
        .unwrap();
        let b = &report.breakdown;
        // net cost 1200: 100 at 21%, 100 at 10.5%, 1000 unexplained folded into 21%.
        assert_eq!(b.taxable_base_21, dec!(100));
        assert_eq!(b.taxable_base_10_5, dec!(100));
        assert_eq!(b.non_computable, dec!(1000));
        // weights 1100/1200 and 100/1200
        let weight_21 = dec!(1100) / dec!(1200);
        let weight_10_5 = dec!(100) / dec!(1200);
        let factor = weight_21 * dec!(1.21) + weight_10_5 * dec!(1.105);
        let net_commission = round2(dec!(268.5) / factor);
        assert_eq!(b.commission_21 + b.commission_10_5, net_commission);
        assert_eq!(b.commission_21, round2(net_commission * weight_21));
        assert_eq!(b.vat_on_commission_10_5, round2(b.commission_10_5 * dec!(0.105)));
        assert_eq!(
            b.imp_iva,
            round2(dec!(31.5) + b.vat_on_commission_21 + b.vat_on_commission_10_5)
        );
        let rebuilt = b.commission_21 * dec!(1.21) + b.commission_10_5 * dec!(1.105);
        assert!((rebuilt - dec!(268.5)).abs() <= dec!(0.02));
    }

    #[test]
    fn card_interest_and_transfer_fee() {
        let fiscal = FiscalInputs {
            card_interest: dec!(121),
            card_interest_vat: dec!(21),
            transfer_fee_pct: dec!(0.024),
            ..inputs(dec!(1000), dec!(700))
        };
        let report = compute_breakdown(&fiscal, &AgencyConfig::default()).unwrap();
        assert_eq!(report.breakdown.taxable_card_interest, dec!(100));
        assert_eq!(report.breakdown.vat_on_card_interest, dec!(21));
        assert_eq!(report.breakdown.transfer_fee_amount, dec!(24));
        assert_eq!(report.breakdown.imp_iva, dec!(73.07));

        let manual = AgencyConfig {
            manual_breakdown: true,
            ..Default::default()
        };
        let report = compute_breakdown(&fiscal, &manual).unwrap();
        assert_eq!(report.breakdown.taxable_card_interest, dec!(0));
        assert_eq!(report.breakdown.vat_on_card_interest, dec!(0));
    }

    #[test]
    fn inconsistent_inputs_raise_warnings() {
        let report = compute_breakdown(&inputs(dec!(500), dec!(700)), &AgencyConfig::default()).unwrap();
        assert!(report.warnings.contains(&BreakdownWarning::SaleNotAboveCost));
        assert!(report.warnings.contains(&BreakdownWarning::NegativeCommission));

        let report = compute_breakdown(
            &FiscalInputs {
                vat_21: dec!(210),
                ..inputs(dec!(1000), dec!(700))
            },
            &AgencyConfig::default(),
        )
        .unwrap();
        assert!(report.warnings.contains(&BreakdownWarning::TaxableExceedsNetCost));
        assert!(report.warnings.contains(&BreakdownWarning::NegativeNonComputable));

        let report = compute_breakdown(&inputs(dec!(100), dec!(0)), &AgencyConfig::default()).unwrap();
        assert_eq!(report.warnings, vec![BreakdownWarning::ZeroNetCost]);
    }

    #[test]
    fn overrides_propagate_to_totals() {
        let report = compute_breakdown(&inputs(dec!(1000), dec!(700)), &AgencyConfig::default()).unwrap();
        let adjusted = report
            .with_overrides(&ManualOverrides::new().set(BreakdownField::Commission21, dec!(200)))
            .unwrap();

        assert!(adjusted.manually_adjusted());
        assert!(adjusted.is_overridden(BreakdownField::Commission21));
        assert_eq!(adjusted.computed, report.breakdown);
        assert_eq!(adjusted.effective.commission_21, dec!(200));
        assert_eq!(adjusted.effective.vat_on_commission_21, dec!(42));
        assert_eq!(adjusted.effective.total_commission_without_vat, dec!(200));
        assert_eq!(adjusted.effective.imp_iva, dec!(42));
    }

    #[test]
    fn overridden_totals_are_kept() {
        let report = compute_breakdown(&inputs(dec!(1000), dec!(700)), &AgencyConfig::default()).unwrap();
        let adjusted = report.with_overrides(
            &ManualOverrides::new()
                .set(BreakdownField::Commission21, dec!(200))
                .set(BreakdownField::ImpIva, dec!(50)),
            )
            .unwrap();
        assert_eq!(adjusted.effective.imp_iva, dec!(50));

        let untouched = report.with_overrides(&ManualOverrides::new()).unwrap();
        assert!(!untouched.manually_adjusted());
        assert_eq!(untouched.effective, report.breakdown);
    }

    #[test]
    fn out_of_range_figures_are_rejected() {
        let config = AgencyConfig::default();
        let err = compute_breakdown(&inputs(dec!(1e26), dec!(700)), &config).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));

        let pct = FiscalInputs {
            transfer_fee_pct: dec!(2.4),
            ..inputs(dec!(1000), dec!(700))
        };
        assert!(compute_breakdown(&pct, &config).is_err());

        // exempt share 5.7619 leaves a blended factor of 0.000001
        let degenerate = FiscalInputs {
            exempt: dec!(57619),
            ..inputs(dec!(2000000000), dec!(10000))
        };
        assert!(matches!(
            compute_breakdown(&degenerate, &config),
            Err(EngineError::InvalidInput(_))
        ));

        let report = compute_breakdown(&inputs(dec!(1000), dec!(700)), &config).unwrap();
        let huge = ManualOverrides::new().set(BreakdownField::Commission21, dec!(1e27));
        assert!(report.with_overrides(&huge).is_err());
        let pct = ManualOverrides::new().set(BreakdownField::TransferFeePct, dec!(1e20));
        assert!(report.with_overrides(&pct).is_err());
    }

    #[test]
    fn aggregate_requires_one_currency() {
        let a = inputs(dec!(1000), dec!(700));
        let b = inputs(dec!(500), dec!(300));
        let total = FiscalInputs::aggregate([&a, &b]).unwrap();
        assert_eq!(total.sale_price, dec!(1500));
        assert_eq!(total.cost, dec!(1000));

        let usd = FiscalInputs {
            currency: CurrencyCode::USD,
            ..b
        };
        assert!(matches!(
            FiscalInputs::aggregate([&a, &usd]),
            Err(EngineError::CurrencyMismatch(_))
        ));
        assert!(FiscalInputs::aggregate(std::iter::empty::<&FiscalInputs>()).is_err());
    }

    #[test]
    fn field_names_round_trip() {
        for field in BreakdownField::ALL {
            assert_eq!(BreakdownField::try_from(field.as_str()).unwrap(), field);
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(json, format!("\"{}\"", field.as_str()));
        }
        assert!(BreakdownField::try_from("margin").is_err());
    }
}
