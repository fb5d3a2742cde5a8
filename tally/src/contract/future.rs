use crate::{
    error::LedgerError,
    ledger::view::LedgerView,
    pricing::PriceMap,
    transaction::{Move, PendingTransaction},
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::collections::BTreeMap;
use tally_instrument::{
    QUANTITY_EPSILON, is_dust,
    unit::{
        Unit, UnitSymbol,
        kind::UnitKind,
        state::{FutureState, FutureWalletState, UnitState},
    },
    wallet::WalletId,
};

/// Create an exchange-traded futures contract unit.
///
/// Negative prices are supported: the virtual-cash model makes no sign assumptions.
pub fn create_future<Symbol, Name>(
    symbol: Symbol,
    name: Name,
    underlying: UnitSymbol,
    expiry: DateTime<Utc>,
    multiplier: Decimal,
    currency: UnitSymbol,
    clearinghouse: WalletId,
) -> Result<Unit, LedgerError>
where
    Symbol: Into<UnitSymbol>,
    Name: Into<SmolStr>,
{
    if multiplier <= Decimal::ZERO {
        return Err(LedgerError::InvalidContractOperation(format!(
            "multiplier must be positive, got {multiplier}"
        )));
    }
    if clearinghouse.name().trim().is_empty() {
        return Err(LedgerError::InvalidContractOperation(
            "clearinghouse cannot be empty".to_string(),
        ));
    }

    Ok(Unit::new(
        symbol,
        name,
        UnitKind::Future,
        Some(Decimal::from(-1_000_000)),
        Some(Decimal::from(1_000_000)),
        Some(2),
    )
    .with_state(UnitState::Future(FutureState {
        underlying,
        expiry,
        multiplier,
        currency,
        clearinghouse,
        last_settle_price: None,
        last_settle_date: None,
        settled: false,
        settlement_price: None,
        wallets: BTreeMap::new(),
    })))
}

/// Execute a futures trade with algebraic quantity: positive = buy, negative = sell.
///
/// The trade books `virtual_cash -= qty * price * multiplier` for the wallet (buying
/// spends cash, selling receives it), applies the equal-and-opposite change to the
/// clearinghouse, and emits a single move of `|qty|` contracts between clearinghouse and
/// wallet. The tracked per-wallet position must reconcile with the ledger balance before
/// the trade.
pub fn transact(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
    wallet: &WalletId,
    quantity: Decimal,
    price: Decimal,
) -> Result<PendingTransaction, LedgerError> {
    let state = future_state(view, symbol)?;
    if state.settled {
        return Err(LedgerError::InvalidContractOperation(format!(
            "cannot trade settled contract {symbol}"
        )));
    }
    if is_dust(quantity) {
        return Err(LedgerError::InvalidContractOperation(format!(
            "quantity must be non-zero, got {quantity}"
        )));
    }
    if wallet == &state.clearinghouse {
        return Err(LedgerError::InvalidContractOperation(
            "wallet cannot be the clearinghouse".to_string(),
        ));
    }

    let mut wallets = state.wallets.clone();
    let wallet_state = wallets.get(wallet).copied().unwrap_or_default();

    // Tracked position must agree with the ledger balance
    let ledger_position = view.get_balance(wallet, symbol)?;
    if (wallet_state.position - ledger_position).abs() >= QUANTITY_EPSILON {
        return Err(LedgerError::InvalidContractOperation(format!(
            "position mismatch for {wallet}: state={}, ledger={ledger_position}",
            wallet_state.position
        )));
    }
    let new_position = wallet_state.position + quantity;

    let unit = view.get_unit(symbol)?;
    if !unit.within_bounds(new_position) {
        return Err(LedgerError::InvalidContractOperation(format!(
            "position {new_position} would breach the limits of {symbol} for {wallet}"
        )));
    }

    let virtual_cash_change = -quantity * price * state.multiplier;
    wallets.insert(
        wallet.clone(),
        FutureWalletState {
            position: new_position,
            virtual_cash: wallet_state.virtual_cash + virtual_cash_change,
        },
    );

    // Clearinghouse side: ledger position is the source of truth; tracked state is
    // reconciled when an entry already exists
    let clearinghouse_state = wallets
        .get(&state.clearinghouse)
        .copied()
        .unwrap_or_default();
    let clearinghouse_ledger_position = view.get_balance(&state.clearinghouse, symbol)?;
    if state.wallets.contains_key(&state.clearinghouse)
        && (clearinghouse_state.position - clearinghouse_ledger_position).abs() >= QUANTITY_EPSILON
    {
        return Err(LedgerError::InvalidContractOperation(format!(
            "position mismatch for {}: state={}, ledger={clearinghouse_ledger_position}",
            state.clearinghouse, clearinghouse_state.position
        )));
    }
    wallets.insert(
        state.clearinghouse.clone(),
        FutureWalletState {
            position: clearinghouse_ledger_position - quantity,
            virtual_cash: clearinghouse_state.virtual_cash - virtual_cash_change,
        },
    );

    let (source, dest, move_quantity) = if quantity > Decimal::ZERO {
        (state.clearinghouse.clone(), wallet.clone(), quantity)
    } else {
        (wallet.clone(), state.clearinghouse.clone(), -quantity)
    };
    let moves = vec![Move::new(
        source,
        dest,
        symbol.clone(),
        move_quantity,
        format!("future_{symbol}"),
    )?];

    let mut state_updates = BTreeMap::new();
    state_updates.insert(
        symbol.clone(),
        UnitState::Future(FutureState { wallets, ..state }),
    );

    Ok(PendingTransaction::new(moves, state_updates))
}

/// Mark all positions to market at the provided price.
///
/// For every wallet with a position or residual virtual cash:
/// `target_vcash = -position * price * multiplier`, and the variation margin
/// `vm = virtual_cash - target_vcash` is paid out (clearinghouse pays when positive,
/// collects when negative), after which virtual cash resets to target.
///
/// No move is emitted for the clearinghouse itself: its settlement is already the net of
/// the bilateral trader flows, so cash changes still sum to zero. Idempotent per
/// `(symbol, settle_date)`.
pub fn mark_to_market(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
    price: Decimal,
    settle_date: Option<NaiveDate>,
) -> Result<PendingTransaction, LedgerError> {
    let state = future_state(view, symbol)?;
    if state.settled {
        return Err(LedgerError::InvalidContractOperation(format!(
            "cannot mark-to-market settled contract {symbol}"
        )));
    }
    if settle_date.is_some() && state.last_settle_date == settle_date {
        return Ok(PendingTransaction::empty());
    }

    let positions = view.get_positions(symbol);
    let mut wallets = state.wallets.clone();
    let mut moves = Vec::new();

    // Settle wallets holding a position or residual virtual cash (a closed position may
    // still carry unsettled variation)
    let to_settle: Vec<WalletId> = positions
        .keys()
        .chain(state.wallets.keys())
        .cloned()
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    for wallet in to_settle {
        let position = positions.get(&wallet).copied().unwrap_or_default();
        let wallet_state = wallets.get(&wallet).copied().unwrap_or_default();

        if state.wallets.contains_key(&wallet)
            && (wallet_state.position - position).abs() >= QUANTITY_EPSILON
        {
            return Err(LedgerError::InvalidContractOperation(format!(
                "position mismatch for {wallet}: state={}, ledger={position}",
                wallet_state.position
            )));
        }

        if is_dust(position) && is_dust(wallet_state.virtual_cash) {
            continue;
        }

        let target_virtual_cash = -position * price * state.multiplier;
        let variation_margin = wallet_state.virtual_cash - target_virtual_cash;

        if !is_dust(variation_margin) && wallet != state.clearinghouse {
            let (source, dest, amount) = if variation_margin > Decimal::ZERO {
                (state.clearinghouse.clone(), wallet.clone(), variation_margin)
            } else {
                (wallet.clone(), state.clearinghouse.clone(), -variation_margin)
            };
            moves.push(
                Move::new(
                    source,
                    dest,
                    state.currency.clone(),
                    amount,
                    format!("mtm_{symbol}_{wallet}"),
                )?
                .with_metadata(format!("MTM {symbol} at {price}")),
            );
        }

        if is_dust(position) {
            wallets.remove(&wallet);
        } else {
            wallets.insert(
                wallet,
                FutureWalletState {
                    position,
                    virtual_cash: target_virtual_cash,
                },
            );
        }
    }

    let mut state_updates = BTreeMap::new();
    state_updates.insert(
        symbol.clone(),
        UnitState::Future(FutureState {
            wallets,
            last_settle_price: Some(price),
            last_settle_date: settle_date,
            ..state
        }),
    );

    Ok(PendingTransaction::new(moves, state_updates))
}

/// SmartContract: daily mark-to-market, with final settlement at expiry.
pub fn future_contract(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
    timestamp: DateTime<Utc>,
    prices: &PriceMap,
) -> Result<PendingTransaction, LedgerError> {
    if view.get_unit_state(symbol)?.is_none() {
        return Ok(PendingTransaction::empty());
    }
    let state = future_state(view, symbol)?;
    if state.settled {
        return Ok(PendingTransaction::empty());
    }
    let Some(price) = prices.get(&state.underlying).copied() else {
        return Ok(PendingTransaction::empty());
    };

    let mut result = mark_to_market(view, symbol, price, Some(timestamp.date_naive()))?;

    if timestamp >= state.expiry {
        let marked = match result.state_updates.remove(symbol) {
            Some(UnitState::Future(marked)) => marked,
            _ => state,
        };
        result.state_updates.insert(
            symbol.clone(),
            UnitState::Future(FutureState {
                settled: true,
                settlement_price: Some(price),
                ..marked
            }),
        );
    }

    Ok(result)
}

fn future_state(view: &dyn LedgerView, symbol: &UnitSymbol) -> Result<FutureState, LedgerError> {
    match view.get_unit_state(symbol)? {
        UnitState::Future(state) => Ok(state),
        _ => Err(LedgerError::StateMismatch {
            unit: symbol.clone(),
            expected: UnitKind::Future,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Ledger, LedgerConfig};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn expiry() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 20, 0, 0, 0).unwrap()
    }

    fn futures_ledger() -> (Ledger, UnitSymbol) {
        let mut ledger = Ledger::new("futures", DateTime::<Utc>::default(), LedgerConfig::default());
        ledger.register_unit(Unit::cash("USD", "US Dollar")).unwrap();
        ledger.register_wallet("trader".into()).unwrap();
        ledger.register_wallet("cme".into()).unwrap();

        let future = create_future(
            "ES_JUN25",
            "E-mini S&P Jun-25",
            "SPX".into(),
            expiry(),
            dec!(50),
            "USD".into(),
            "cme".into(),
        )
        .unwrap();
        let symbol = future.symbol.clone();
        ledger.register_unit(future).unwrap();

        ledger.set_balance(&"trader".into(), &"USD".into(), dec!(1000000)).unwrap();
        ledger.set_balance(&"cme".into(), &"USD".into(), dec!(10000000)).unwrap();

        (ledger, symbol)
    }

    fn apply(ledger: &mut Ledger, pending: &PendingTransaction) {
        assert!(ledger.execute_contract(pending).unwrap().is_applied());
    }

    #[test]
    fn test_transact_books_virtual_cash() {
        let (mut ledger, symbol) = futures_ledger();

        let pending = transact(&ledger, &symbol, &"trader".into(), dec!(10), dec!(4500)).unwrap();
        assert_eq!(pending.moves.len(), 1);
        assert_eq!(pending.moves[0].quantity, dec!(10));
        apply(&mut ledger, &pending);

        let state = match ledger.get_unit_state(&symbol).unwrap() {
            UnitState::Future(state) => state,
            _ => unreachable!(),
        };
        let trader = state.wallets.get(&WalletId::from("trader")).unwrap();
        assert_eq!(trader.position, dec!(10));
        // Bought 10 at 4500 with multiplier 50: virtual cash is -2,250,000
        assert_eq!(trader.virtual_cash, dec!(-2250000));
        let clearinghouse = state.wallets.get(&WalletId::from("cme")).unwrap();
        assert_eq!(clearinghouse.position, dec!(-10));
        assert_eq!(clearinghouse.virtual_cash, dec!(2250000));
    }

    #[test]
    fn test_transact_rejects_clearinghouse_and_settled() {
        let (ledger, symbol) = futures_ledger();
        assert!(transact(&ledger, &symbol, &"cme".into(), dec!(1), dec!(4500)).is_err());
        assert!(transact(&ledger, &symbol, &"trader".into(), Decimal::ZERO, dec!(4500)).is_err());
    }

    #[test]
    fn test_daily_mtm_pays_variation_margin() {
        let (mut ledger, symbol) = futures_ledger();
        let pending = transact(&ledger, &symbol, &"trader".into(), dec!(10), dec!(4500)).unwrap();
        apply(&mut ledger, &pending);

        // Mark at 4520: trader is owed 10 * 50 * 20 = 10,000
        let date_1 = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let pending = mark_to_market(&ledger, &symbol, dec!(4520), Some(date_1)).unwrap();
        assert_eq!(pending.moves.len(), 1);
        assert_eq!(pending.moves[0].source, "cme".into());
        assert_eq!(pending.moves[0].dest, "trader".into());
        assert_eq!(pending.moves[0].quantity, dec!(10000));
        apply(&mut ledger, &pending);

        // Same settle date is idempotent
        let pending = mark_to_market(&ledger, &symbol, dec!(4520), Some(date_1)).unwrap();
        assert!(pending.is_empty());

        // Mark at 4480: trader pays 10 * 50 * 40 = 20,000
        let date_2 = NaiveDate::from_ymd_opt(2025, 1, 3).unwrap();
        let pending = mark_to_market(&ledger, &symbol, dec!(4480), Some(date_2)).unwrap();
        assert_eq!(pending.moves[0].source, "trader".into());
        assert_eq!(pending.moves[0].quantity, dec!(20000));
        apply(&mut ledger, &pending);

        // Conservation: positions and virtual cash both sum to zero
        let state = match ledger.get_unit_state(&symbol).unwrap() {
            UnitState::Future(state) => state,
            _ => unreachable!(),
        };
        let position_sum: Decimal = state.wallets.values().map(|w| w.position).sum();
        let virtual_cash_sum: Decimal = state.wallets.values().map(|w| w.virtual_cash).sum();
        assert_eq!(position_sum, Decimal::ZERO);
        assert_eq!(virtual_cash_sum, Decimal::ZERO);
    }

    #[test]
    fn test_future_contract_settles_at_expiry() {
        let (mut ledger, symbol) = futures_ledger();
        let pending = transact(&ledger, &symbol, &"trader".into(), dec!(2), dec!(4500)).unwrap();
        apply(&mut ledger, &pending);
        ledger.advance_time(expiry()).unwrap();

        let mut prices = PriceMap::new();
        prices.insert("SPX".into(), dec!(4550));
        let pending = future_contract(&ledger, &symbol, expiry(), &prices).unwrap();
        apply(&mut ledger, &pending);

        let state = match ledger.get_unit_state(&symbol).unwrap() {
            UnitState::Future(state) => state,
            _ => unreachable!(),
        };
        assert!(state.settled);
        assert_eq!(state.settlement_price, Some(dec!(4550)));

        // Settled contracts poll to empty
        let pending = future_contract(&ledger, &symbol, expiry(), &prices).unwrap();
        assert!(pending.is_empty());
    }
}
