//! Platform fee splitting.
//!
//! A listed price is split into a merchant portion and a platform-fee
//! portion using basis points. The split is pure arithmetic over
//! [`rust_decimal::Decimal`] display units; conversion to chain base units
//! happens later, in transfer planning.
//!
//! Fee routing is enabled only when both a treasury account and a positive
//! rate are configured. The configuration is resolved once at process
//! startup and never mutated afterwards.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use solana_pubkey::Pubkey;

/// One basis point is 1/10000 of the total.
const BPS_DENOMINATOR: u16 = 10_000;

/// Process-wide fee routing configuration.
///
/// Routing is active only when a treasury account is present **and** the
/// rate is positive. Either condition missing disables the fee leg entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeConfig {
    treasury: Option<Pubkey>,
    fee_bps: u16,
}

impl FeeConfig {
    /// Creates a fee configuration.
    ///
    /// A `fee_bps` of 10000 or more would consume the whole payment, so it
    /// is clamped to `BPS_DENOMINATOR - 1`.
    #[must_use]
    pub fn new(treasury: Option<Pubkey>, fee_bps: u16) -> Self {
        Self {
            treasury,
            fee_bps: fee_bps.min(BPS_DENOMINATOR - 1),
        }
    }

    /// Configuration with fee routing switched off.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            treasury: None,
            fee_bps: 0,
        }
    }

    /// Returns `true` when a treasury is configured and the rate is positive.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.treasury.is_some() && self.fee_bps > 0
    }

    /// The platform treasury account, if configured.
    #[must_use]
    pub const fn treasury(&self) -> Option<&Pubkey> {
        self.treasury.as_ref()
    }

    /// The configured rate in basis points.
    #[must_use]
    pub const fn fee_bps(&self) -> u16 {
        self.fee_bps
    }

    /// The configured rate as a percentage.
    #[must_use]
    pub fn fee_percent(&self) -> Decimal {
        Decimal::from(self.fee_bps) / Decimal::from(100u16)
    }

    /// Splits `amount` (in the asset's display unit) into merchant and fee
    /// portions at `precision` decimal places.
    ///
    /// The fee is rounded half-up at the given precision and the merchant
    /// portion is defined as the remainder, so the two always sum exactly to
    /// the input. Non-positive amounts and disabled routing both degrade to
    /// a zero fee rather than an error, since the same split feeds pure
    /// display surfaces.
    #[must_use]
    pub fn split(&self, amount: Decimal, precision: u32) -> FeeBreakdown {
        if !self.enabled() || amount <= Decimal::ZERO {
            return FeeBreakdown {
                total: amount,
                merchant: amount,
                fee: Decimal::ZERO,
                fee_bps: 0,
            };
        }

        let fee = (amount * Decimal::from(self.fee_bps) / Decimal::from(BPS_DENOMINATOR))
            .round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero)
            .min(amount);

        FeeBreakdown {
            total: amount,
            merchant: amount - fee,
            fee,
            fee_bps: self.fee_bps,
        }
    }
}

/// The result of splitting a listed price.
///
/// Invariant: `merchant + fee == total` at the precision the split was
/// computed with. Created fresh per calculation; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    /// The listed price.
    pub total: Decimal,
    /// The portion routed to the merchant.
    pub merchant: Decimal,
    /// The portion routed to the platform treasury.
    pub fee: Decimal,
    /// The rate actually applied (0 when routing was disabled).
    pub fee_bps: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngExt;
    use std::str::FromStr;

    fn treasury() -> Pubkey {
        Pubkey::new_unique()
    }

    #[test]
    fn splits_hundred_at_seventy_five_bps() {
        let config = FeeConfig::new(Some(treasury()), 75);
        let split = config.split(Decimal::from(100), 6);
        assert_eq!(split.fee, Decimal::from_str("0.75").unwrap());
        assert_eq!(split.merchant, Decimal::from_str("99.25").unwrap());
        assert_eq!(split.total, Decimal::from(100));
        assert_eq!(split.fee_bps, 75);
    }

    #[test]
    fn disabled_routing_takes_no_fee() {
        let config = FeeConfig::disabled();
        let split = config.split(Decimal::from(50), 6);
        assert_eq!(split.fee, Decimal::ZERO);
        assert_eq!(split.merchant, Decimal::from(50));
        assert_eq!(split.fee_bps, 0);
    }

    #[test]
    fn treasury_without_rate_is_disabled() {
        let config = FeeConfig::new(Some(treasury()), 0);
        assert!(!config.enabled());
        assert_eq!(config.split(Decimal::from(10), 6).fee, Decimal::ZERO);
    }

    #[test]
    fn rate_without_treasury_is_disabled() {
        let config = FeeConfig::new(None, 250);
        assert!(!config.enabled());
        assert_eq!(config.split(Decimal::from(10), 6).fee, Decimal::ZERO);
    }

    #[test]
    fn non_positive_amounts_degrade_to_zero_fee() {
        let config = FeeConfig::new(Some(treasury()), 250);
        assert_eq!(config.split(Decimal::ZERO, 6).fee, Decimal::ZERO);
        assert_eq!(config.split(Decimal::from(-3), 6).fee, Decimal::ZERO);
    }

    #[test]
    fn rate_is_clamped_below_full_amount() {
        let config = FeeConfig::new(Some(treasury()), 10_000);
        assert_eq!(config.fee_bps(), 9_999);
    }

    #[test]
    fn merchant_and_fee_conserve_total() {
        let mut rng = rand::rng();
        let config_treasury = treasury();
        for _ in 0..1_000 {
            let mantissa: i64 = rng.random_range(1..100_000_000);
            let scale: u32 = rng.random_range(0..=6);
            let amount = Decimal::new(mantissa, scale);
            let bps: u16 = rng.random_range(0..10_000);
            let config = FeeConfig::new(Some(config_treasury), bps);
            let split = config.split(amount, 6);
            assert_eq!(
                split.merchant + split.fee,
                split.total,
                "conservation failed for amount={amount} bps={bps}"
            );
            assert!(split.fee >= Decimal::ZERO);
            assert!(split.merchant >= Decimal::ZERO);
        }
    }

    #[test]
    fn fee_percent_reflects_bps() {
        let config = FeeConfig::new(Some(treasury()), 250);
        assert_eq!(config.fee_percent(), Decimal::from_str("2.5").unwrap());
    }
}
