//! In-memory paper trading ledger.
//!
//! Tracks simulated balances per (venue, currency) and applies fills
//! all-or-nothing: an order that would drive any balance negative is
//! rejected and leaves every balance untouched.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::{OrderSide, Price, TradingPair, VenueId, Volume};
use crate::error::LedgerError;

/// A simulated order at a fixed price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperOrder {
    pub venue: VenueId,
    pub pair: TradingPair,
    pub side: OrderSide,
    pub price: Price,
    pub quantity: Volume,
    /// Fee as a fraction of notional, charged in quote currency.
    pub fee_rate: Decimal,
}

impl PaperOrder {
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }

    #[must_use]
    pub fn fee(&self) -> Decimal {
        self.notional() * self.fee_rate
    }
}

/// A simulated fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperFill {
    pub venue: VenueId,
    pub side: OrderSide,
    pub price: Price,
    pub quantity: Volume,
    pub fee: Decimal,
    pub fee_currency: String,
    pub executed_at: DateTime<Utc>,
}

type BalanceKey = (VenueId, String);

/// Simulated balances.
#[derive(Debug, Default)]
pub struct PaperLedger {
    balances: Mutex<HashMap<BalanceKey, Decimal>>,
}

impl PaperLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` to the balance of `currency` on `venue`.
    pub fn deposit(&self, venue: &VenueId, currency: &str, amount: Decimal) {
        let mut balances = self.balances.lock();
        *balances.entry(key(venue, currency)).or_default() += amount;
    }

    /// Current balance, zero when never funded.
    #[must_use]
    pub fn balance(&self, venue: &VenueId, currency: &str) -> Decimal {
        self.balances
            .lock()
            .get(&key(venue, currency))
            .copied()
            .unwrap_or_default()
    }

    /// All balances, sorted by venue then currency.
    #[must_use]
    pub fn balances(&self) -> Vec<(VenueId, String, Decimal)> {
        let mut all: Vec<_> = self
            .balances
            .lock()
            .iter()
            .map(|((venue, currency), amount)| (venue.clone(), currency.clone(), *amount))
            .collect();
        all.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        all
    }

    /// Check that `order` could be filled right now.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidOrder`] for a non-positive price or quantity,
    /// [`LedgerError::InsufficientBalance`] when funds are short.
    pub fn can_fill(&self, order: &PaperOrder) -> Result<(), LedgerError> {
        let balances = self.balances.lock();
        check(&balances, order).map(|_| ())
    }

    /// Apply `order` to the balances.
    ///
    /// # Errors
    ///
    /// Same as [`can_fill`](Self::can_fill); on error nothing changes.
    pub fn simulate_fill(&self, order: &PaperOrder) -> Result<PaperFill, LedgerError> {
        let mut balances = self.balances.lock();
        let (debit, credit) = check(&balances, order)?;
        transfer(&mut balances, &debit, &credit);
        Ok(fill(order))
    }

    /// Apply `buy` then `sell` as one step.
    ///
    /// Both legs are checked and applied under the same lock, so concurrent
    /// callers can never spend the same funds twice.
    ///
    /// # Errors
    ///
    /// Same as [`simulate_fill`](Self::simulate_fill) for either leg. If the
    /// sell is rejected the buy is rolled back and nothing changes.
    pub fn simulate_pair(
        &self,
        buy: &PaperOrder,
        sell: &PaperOrder,
    ) -> Result<(PaperFill, PaperFill), LedgerError> {
        let mut balances = self.balances.lock();
        let (buy_debit, buy_credit) = check(&balances, buy)?;
        transfer(&mut balances, &buy_debit, &buy_credit);

        match check(&balances, sell) {
            Ok((sell_debit, sell_credit)) => {
                transfer(&mut balances, &sell_debit, &sell_credit);
                Ok((fill(buy), fill(sell)))
            }
            Err(e) => {
                transfer(&mut balances, &buy_credit, &buy_debit);
                Err(e)
            }
        }
    }
}

type Movement = (BalanceKey, Decimal);

fn transfer(balances: &mut HashMap<BalanceKey, Decimal>, debit: &Movement, credit: &Movement) {
    *balances.entry(debit.0.clone()).or_default() -= debit.1;
    *balances.entry(credit.0.clone()).or_default() += credit.1;
}

fn fill(order: &PaperOrder) -> PaperFill {
    let fee = order.fee();
    debug!(
        venue = %order.venue,
        pair = %order.pair,
        side = %order.side,
        price = %order.price,
        quantity = %order.quantity,
        fee = %fee,
        "Paper fill"
    );
    PaperFill {
        venue: order.venue.clone(),
        side: order.side,
        price: order.price,
        quantity: order.quantity,
        fee,
        fee_currency: order.pair.quote().to_string(),
        executed_at: Utc::now(),
    }
}

fn key(venue: &VenueId, currency: &str) -> BalanceKey {
    (venue.clone(), currency.to_ascii_uppercase())
}

/// Validate `order` and return its (debit, credit) movements.
fn check(
    balances: &HashMap<BalanceKey, Decimal>,
    order: &PaperOrder,
) -> Result<(Movement, Movement), LedgerError> {
    if order.price <= Decimal::ZERO || order.quantity <= Decimal::ZERO {
        return Err(LedgerError::InvalidOrder(format!(
            "price {} and quantity {} must be positive",
            order.price, order.quantity
        )));
    }

    let base = key(&order.venue, order.pair.base());
    let quote = key(&order.venue, order.pair.quote());
    let (debit, credit) = match order.side {
        OrderSide::Buy => (
            (quote, order.notional() + order.fee()),
            (base, order.quantity),
        ),
        OrderSide::Sell => (
            (base, order.quantity),
            (quote, order.notional() - order.fee()),
        ),
    };

    let available = balances.get(&debit.0).copied().unwrap_or_default();
    if available < debit.1 {
        return Err(LedgerError::InsufficientBalance {
            venue: order.venue.clone(),
            currency: debit.0 .1.clone(),
            required: debit.1,
            available,
        });
    }
    Ok((debit, credit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(side: OrderSide, price: Decimal, quantity: Decimal) -> PaperOrder {
        PaperOrder {
            venue: VenueId::from("a"),
            pair: "BTC-USD".parse().unwrap(),
            side,
            price,
            quantity,
            fee_rate: dec!(0.001),
        }
    }

    #[test]
    fn buy_debits_notional_plus_fee() {
        let ledger = PaperLedger::new();
        let venue = VenueId::from("a");
        ledger.deposit(&venue, "usd", dec!(100000));

        let fill = ledger
            .simulate_fill(&order(OrderSide::Buy, dec!(50000), dec!(0.1)))
            .unwrap();

        assert_eq!(fill.fee, dec!(5));
        assert_eq!(fill.fee_currency, "USD");
        assert_eq!(ledger.balance(&venue, "USD"), dec!(94995));
        assert_eq!(ledger.balance(&venue, "BTC"), dec!(0.1));
    }

    #[test]
    fn sell_credits_notional_minus_fee() {
        let ledger = PaperLedger::new();
        let venue = VenueId::from("a");
        ledger.deposit(&venue, "BTC", dec!(1));

        ledger
            .simulate_fill(&order(OrderSide::Sell, dec!(50000), dec!(0.1)))
            .unwrap();

        assert_eq!(ledger.balance(&venue, "BTC"), dec!(0.9));
        assert_eq!(ledger.balance(&venue, "USD"), dec!(4995));
    }

    #[test]
    fn insufficient_balance_mutates_nothing() {
        let ledger = PaperLedger::new();
        let venue = VenueId::from("a");
        ledger.deposit(&venue, "USD", dec!(50000));
        let buy = order(OrderSide::Buy, dec!(50000), dec!(0.1));

        // 0.1 * 50000 * 1.001 = 5005 is affordable; 1.0 is not.
        assert!(ledger
            .can_fill(&order(OrderSide::Buy, dec!(50000), dec!(0.1)))
            .is_ok());
        let big = order(OrderSide::Buy, dec!(50000), dec!(1));
        let err = ledger.simulate_fill(&big).unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                venue: venue.clone(),
                currency: "USD".into(),
                required: dec!(50050),
                available: dec!(50000),
            }
        );
        assert_eq!(ledger.balance(&venue, "USD"), dec!(50000));
        assert_eq!(ledger.balance(&venue, "BTC"), Decimal::ZERO);
    }

    #[test]
    fn non_positive_order_is_invalid() {
        let ledger = PaperLedger::new();
        assert!(matches!(
            ledger.can_fill(&order(OrderSide::Buy, dec!(1), Decimal::ZERO)),
            Err(LedgerError::InvalidOrder(_))
        ));
    }

    fn order_on(venue: &str, side: OrderSide, price: Decimal, quantity: Decimal) -> PaperOrder {
        PaperOrder {
            venue: VenueId::from(venue),
            ..order(side, price, quantity)
        }
    }

    #[test]
    fn pair_applies_both_legs() {
        let ledger = PaperLedger::new();
        ledger.deposit(&VenueId::from("a"), "USD", dec!(10000));
        ledger.deposit(&VenueId::from("b"), "BTC", dec!(1));

        let (buy, sell) = ledger
            .simulate_pair(
                &order_on("a", OrderSide::Buy, dec!(50000), dec!(0.1)),
                &order_on("b", OrderSide::Sell, dec!(50300), dec!(0.1)),
            )
            .unwrap();

        assert_eq!(buy.fee, dec!(5));
        assert_eq!(sell.fee, dec!(5.03));
        assert_eq!(ledger.balance(&VenueId::from("a"), "USD"), dec!(4995));
        assert_eq!(ledger.balance(&VenueId::from("a"), "BTC"), dec!(0.1));
        assert_eq!(ledger.balance(&VenueId::from("b"), "BTC"), dec!(0.9));
        assert_eq!(ledger.balance(&VenueId::from("b"), "USD"), dec!(5024.97));
    }

    #[test]
    fn pair_rolls_back_buy_when_sell_is_short() {
        let ledger = PaperLedger::new();
        ledger.deposit(&VenueId::from("a"), "USD", dec!(10000));
        ledger.deposit(&VenueId::from("b"), "BTC", dec!(0.05));

        let err = ledger
            .simulate_pair(
                &order_on("a", OrderSide::Buy, dec!(50000), dec!(0.1)),
                &order_on("b", OrderSide::Sell, dec!(50300), dec!(0.1)),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            LedgerError::InsufficientBalance { ref currency, .. } if currency == "BTC"
        ));
        assert_eq!(ledger.balance(&VenueId::from("a"), "USD"), dec!(10000));
        assert_eq!(ledger.balance(&VenueId::from("a"), "BTC"), Decimal::ZERO);
        assert_eq!(ledger.balance(&VenueId::from("b"), "BTC"), dec!(0.05));
        assert_eq!(ledger.balance(&VenueId::from("b"), "USD"), Decimal::ZERO);
    }

    #[test]
    fn concurrent_pairs_never_overdraw() {
        let ledger = std::sync::Arc::new(PaperLedger::new());
        // Enough for exactly three buys of 0.1 at 50000 with fees.
        ledger.deposit(&VenueId::from("a"), "USD", dec!(15015));
        ledger.deposit(&VenueId::from("b"), "BTC", dec!(10));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = std::sync::Arc::clone(&ledger);
                std::thread::spawn(move || {
                    ledger
                        .simulate_pair(
                            &order_on("a", OrderSide::Buy, dec!(50000), dec!(0.1)),
                            &order_on("b", OrderSide::Sell, dec!(50300), dec!(0.1)),
                        )
                        .is_ok()
                })
            })
            .collect();
        let filled = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(filled, 3);
        assert_eq!(ledger.balance(&VenueId::from("a"), "USD"), Decimal::ZERO);
        assert_eq!(ledger.balance(&VenueId::from("a"), "BTC"), dec!(0.3));
        assert_eq!(ledger.balance(&VenueId::from("b"), "BTC"), dec!(9.7));
    }

    #[test]
    fn balances_are_sorted() {
        let ledger = PaperLedger::new();
        ledger.deposit(&VenueId::from("b"), "USD", dec!(1));
        ledger.deposit(&VenueId::from("a"), "USD", dec!(2));
        ledger.deposit(&VenueId::from("a"), "BTC", dec!(3));

        let all = ledger.balances();
        assert_eq!(all[0], (VenueId::from("a"), "BTC".to_string(), dec!(3)));
        assert_eq!(all[2].0, VenueId::from("b"));
    }
}
