use crate::{
    contract::deferred_cash::create_deferred_cash_unit,
    error::LedgerError,
    ledger::view::LedgerView,
    pricing::PriceMap,
    transaction::{Move, PendingTransaction},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use smol_str::{SmolStr, format_smolstr};
use std::collections::BTreeMap;
use tally_instrument::{
    is_dust,
    unit::{
        STOCK_DECIMAL_PLACES, Unit, UnitSymbol,
        kind::UnitKind,
        state::{Dividend, StockState, UnitState},
    },
    wallet::WalletId,
};

/// Lower bound applied to shortable stocks.
pub const DEFAULT_STOCK_SHORT_MIN_BALANCE: Decimal = dec!(-1000000);

/// Create a stock unit with an optional dividend schedule.
///
/// Shortable stocks admit negative balances down to
/// [`DEFAULT_STOCK_SHORT_MIN_BALANCE`]; otherwise the balance floor is zero.
pub fn create_stock_unit<Symbol, Name>(
    symbol: Symbol,
    name: Name,
    issuer: WalletId,
    currency: UnitSymbol,
    dividend_schedule: Vec<Dividend>,
    shortable: bool,
) -> Result<Unit, LedgerError>
where
    Symbol: Into<UnitSymbol>,
    Name: Into<SmolStr>,
{
    for dividend in &dividend_schedule {
        if dividend.amount_per_share <= Decimal::ZERO {
            return Err(LedgerError::InvalidContractOperation(format!(
                "amount_per_share must be positive, got {}",
                dividend.amount_per_share
            )));
        }
        if dividend.payment_date < dividend.ex_date {
            return Err(LedgerError::InvalidContractOperation(
                "payment_date must be at or after ex_date".to_string(),
            ));
        }
    }

    let min_balance = if shortable {
        DEFAULT_STOCK_SHORT_MIN_BALANCE
    } else {
        Decimal::ZERO
    };

    Ok(Unit::new(
        symbol,
        name,
        UnitKind::Stock,
        Some(min_balance),
        None,
        Some(STOCK_DECIMAL_PLACES),
    )
    .with_state(UnitState::Stock(StockState {
        issuer,
        currency,
        shortable,
        dividend_schedule,
        processed_dividends: Default::default(),
    })))
}

/// Process every dividend whose ex-date has been reached.
///
/// For each unprocessed due dividend, holders (positive positions, excluding the
/// issuer) are snapshotted and one freshly minted deferred-cash entitlement unit is
/// created per holder, carried by a quantity-1 move from SYSTEM. The cash itself moves
/// when those units settle on the payment date. Each ex-date is processed exactly once.
pub fn process_dividends(
    view: &dyn LedgerView,
    stock_symbol: &UnitSymbol,
    current_time: DateTime<Utc>,
) -> Result<PendingTransaction, LedgerError> {
    let state = stock_state(view, stock_symbol)?;

    let mut moves = Vec::new();
    let mut new_units = Vec::new();
    let mut processed = state.processed_dividends.clone();

    for dividend in &state.dividend_schedule {
        let key = dividend.key();
        if dividend.ex_date > current_time || processed.contains(&key) {
            continue;
        }

        for (holder, shares) in view.get_positions(stock_symbol) {
            if holder == state.issuer || shares <= Decimal::ZERO {
                continue;
            }
            let amount = shares * dividend.amount_per_share;
            if is_dust(amount) {
                continue;
            }

            let entitlement_symbol =
                format_smolstr!("DIV_{stock_symbol}_{key}_{holder}");
            new_units.push(create_deferred_cash_unit(
                entitlement_symbol.clone(),
                amount,
                dividend.currency.clone(),
                dividend.payment_date,
                state.issuer.clone(),
                holder.clone(),
                Some(format_smolstr!("dividend_{stock_symbol}_{key}")),
            )?);
            moves.push(Move::new(
                WalletId::system(),
                holder,
                UnitSymbol::new(entitlement_symbol),
                Decimal::ONE,
                format!("dividend_{stock_symbol}_{key}"),
            )?);
        }

        processed.insert(key);
    }

    if processed == state.processed_dividends {
        return Ok(PendingTransaction::empty());
    }

    let mut state_updates = BTreeMap::new();
    state_updates.insert(
        stock_symbol.clone(),
        UnitState::Stock(StockState {
            processed_dividends: processed,
            ..state
        }),
    );

    Ok(PendingTransaction::new(moves, state_updates).with_new_units(new_units))
}

/// SmartContract: create dividend entitlements as ex-dates pass.
pub fn stock_contract(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
    timestamp: DateTime<Utc>,
    _: &PriceMap,
) -> Result<PendingTransaction, LedgerError> {
    if view.get_unit_state(symbol)?.is_none() {
        return Ok(PendingTransaction::empty());
    }
    process_dividends(view, symbol, timestamp)
}

fn stock_state(view: &dyn LedgerView, symbol: &UnitSymbol) -> Result<StockState, LedgerError> {
    match view.get_unit_state(symbol)? {
        UnitState::Stock(state) => Ok(state),
        _ => Err(LedgerError::StateMismatch {
            unit: symbol.clone(),
            expected: UnitKind::Stock,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Ledger, LedgerConfig};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ex_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap()
    }

    fn pay_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 17, 0, 0, 0).unwrap()
    }

    fn dividend_ledger() -> (Ledger, UnitSymbol) {
        let mut ledger = Ledger::new("stocks", DateTime::<Utc>::default(), LedgerConfig::default());
        ledger.register_unit(Unit::cash("USD", "US Dollar")).unwrap();
        ledger.register_wallet("treasury".into()).unwrap();
        ledger.register_wallet("alice".into()).unwrap();
        ledger.register_wallet("bob".into()).unwrap();

        let stock = create_stock_unit(
            "AAPL",
            "Apple Inc.",
            "treasury".into(),
            "USD".into(),
            vec![Dividend {
                ex_date: ex_date(),
                payment_date: pay_date(),
                amount_per_share: dec!(0.25),
                currency: "USD".into(),
            }],
            false,
        )
        .unwrap();
        let symbol = stock.symbol.clone();
        ledger.register_unit(stock).unwrap();

        ledger.set_balance(&"treasury".into(), &"USD".into(), dec!(100000)).unwrap();
        ledger.set_balance(&"treasury".into(), &symbol, dec!(10000)).unwrap();
        ledger.set_balance(&"alice".into(), &symbol, dec!(100)).unwrap();
        ledger.set_balance(&"bob".into(), &symbol, dec!(40)).unwrap();

        (ledger, symbol)
    }

    #[test]
    fn test_no_entitlements_before_ex_date() {
        let (ledger, symbol) = dividend_ledger();
        let pending = process_dividends(&ledger, &symbol, DateTime::<Utc>::default()).unwrap();
        assert!(pending.is_empty());
    }

    #[test]
    fn test_ex_date_mints_entitlements_per_holder() {
        let (mut ledger, symbol) = dividend_ledger();
        ledger.advance_time(ex_date()).unwrap();

        let pending = process_dividends(&ledger, &symbol, ex_date()).unwrap();
        // One entitlement each for alice and bob; the issuer is excluded
        assert_eq!(pending.new_units.len(), 2);
        assert_eq!(pending.moves.len(), 2);
        assert!(pending.moves.iter().all(|mv| mv.source == WalletId::system()));
        assert!(pending.moves.iter().all(|mv| mv.quantity == Decimal::ONE));

        assert!(ledger.execute_contract(&pending).unwrap().is_applied());

        // Entitlement amounts are shares * amount_per_share
        let alice_unit: UnitSymbol = "DIV_AAPL_2025-03-15_alice".into();
        match ledger.get_unit_state(&alice_unit).unwrap() {
            UnitState::DeferredCash(state) => {
                assert_eq!(state.amount, dec!(25));
                assert_eq!(state.payer_wallet, "treasury".into());
                assert_eq!(state.payment_date, pay_date());
            }
            _ => unreachable!(),
        }
        assert_eq!(
            ledger.get_balance(&"alice".into(), &alice_unit).unwrap(),
            Decimal::ONE
        );

        // The ex-date key is processed exactly once
        let pending = process_dividends(&ledger, &symbol, ex_date()).unwrap();
        assert!(pending.is_empty());
    }

    #[test]
    fn test_create_stock_unit_validates_schedule() {
        let result = create_stock_unit(
            "BAD",
            "Bad Corp",
            "treasury".into(),
            "USD".into(),
            vec![Dividend {
                ex_date: pay_date(),
                payment_date: ex_date(),
                amount_per_share: dec!(0.25),
                currency: "USD".into(),
            }],
            false,
        );
        assert!(result.is_err());
    }
}
