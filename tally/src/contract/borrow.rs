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
    QUANTITY_EPSILON, is_dust,
    unit::{
        Unit, UnitSymbol,
        kind::UnitKind,
        state::{BorrowState, UnitState},
    },
    wallet::WalletId,
};
use tracing::warn;

const BASIS_POINTS: Decimal = dec!(10000);
const DAYS_PER_YEAR: Decimal = dec!(365);

/// Open a securities borrow: shares move lender to borrower, and a freshly minted
/// borrow-record unit lands with the borrower to track the return liability.
pub fn open_borrow<Symbol, Name>(
    view: &dyn LedgerView,
    borrow_symbol: Symbol,
    name: Name,
    stock: UnitSymbol,
    lender: WalletId,
    borrower: WalletId,
    quantity: Decimal,
    fee_rate_bps: Decimal,
    currency: UnitSymbol,
    term_end: Option<DateTime<Utc>>,
) -> Result<PendingTransaction, LedgerError>
where
    Symbol: Into<UnitSymbol>,
    Name: Into<SmolStr>,
{
    if quantity <= Decimal::ZERO {
        return Err(LedgerError::InvalidContractOperation(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    if lender == borrower {
        return Err(LedgerError::InvalidContractOperation(
            "lender and borrower must be different".to_string(),
        ));
    }

    let lender_balance = view.get_balance(&lender, &stock)?;
    if lender_balance < quantity - QUANTITY_EPSILON {
        return Err(LedgerError::InvalidContractOperation(format!(
            "lender {lender} has insufficient shares: {lender_balance} < {quantity}"
        )));
    }

    let borrow_symbol = borrow_symbol.into();
    let record = Unit::new(
        borrow_symbol.clone(),
        name,
        UnitKind::BorrowRecord,
        Some(Decimal::NEGATIVE_ONE),
        Some(Decimal::ONE),
        Some(0),
    )
    .with_state(UnitState::Borrow(BorrowState {
        stock: stock.clone(),
        lender: lender.clone(),
        borrower: borrower.clone(),
        quantity,
        fee_rate_bps,
        currency,
        open_date: view.current_time(),
        term_end,
        returned: false,
    }));

    let moves = vec![
        Move::new(
            lender,
            borrower.clone(),
            stock,
            quantity,
            format!("borrow_{borrow_symbol}_shares"),
        )?,
        Move::new(
            WalletId::system(),
            borrower,
            borrow_symbol.clone(),
            Decimal::ONE,
            format!("borrow_{borrow_symbol}_record"),
        )?,
    ];

    Ok(PendingTransaction::new(moves, BTreeMap::new()).with_new_units(vec![record]))
}

/// Accrued borrow fee: `quantity * rate_bps/10000 * days/365`.
pub fn compute_borrow_fee(quantity: Decimal, fee_rate_bps: Decimal, days: Decimal) -> Decimal {
    quantity * fee_rate_bps / BASIS_POINTS * days / DAYS_PER_YEAR
}

/// Return borrowed shares: shares move back to the lender, the record is extinguished to
/// SYSTEM, and the accrued fee becomes an immediately-due deferred-cash obligation from
/// borrower to lender.
pub fn compute_return(
    view: &dyn LedgerView,
    borrow_symbol: &UnitSymbol,
    return_time: DateTime<Utc>,
) -> Result<PendingTransaction, LedgerError> {
    let state = borrow_state(view, borrow_symbol)?;
    if state.returned {
        return Ok(PendingTransaction::empty());
    }

    let borrower_shares = view.get_balance(&state.borrower, &state.stock)?;
    if borrower_shares < state.quantity - QUANTITY_EPSILON {
        return Err(LedgerError::InvalidContractOperation(format!(
            "borrower {} cannot return {} {}: holds {borrower_shares}",
            state.borrower, state.quantity, state.stock
        )));
    }

    let mut moves = vec![
        Move::new(
            state.borrower.clone(),
            state.lender.clone(),
            state.stock.clone(),
            state.quantity,
            format!("return_{borrow_symbol}_shares"),
        )?,
        Move::new(
            state.borrower.clone(),
            WalletId::system(),
            borrow_symbol.clone(),
            Decimal::ONE,
            format!("return_{borrow_symbol}_record"),
        )?,
    ];

    let mut new_units = Vec::new();
    let days = Decimal::from((return_time - state.open_date).num_seconds()) / dec!(86400);
    let fee = compute_borrow_fee(state.quantity, state.fee_rate_bps, days);
    if !is_dust(fee) {
        let fee_symbol = format_smolstr!("FEE_{borrow_symbol}");
        new_units.push(create_deferred_cash_unit(
            fee_symbol.clone(),
            fee,
            state.currency.clone(),
            return_time,
            state.borrower.clone(),
            state.lender.clone(),
            Some(format_smolstr!("borrow_fee_{borrow_symbol}")),
        )?);
        moves.push(Move::new(
            WalletId::system(),
            state.lender.clone(),
            UnitSymbol::new(fee_symbol),
            Decimal::ONE,
            format!("return_{borrow_symbol}_fee"),
        )?);
    }

    let mut state_updates = BTreeMap::new();
    state_updates.insert(
        borrow_symbol.clone(),
        UnitState::Borrow(BorrowState {
            returned: true,
            ..state
        }),
    );

    Ok(PendingTransaction::new(moves, state_updates).with_new_units(new_units))
}

/// Shares a wallet can sell without going naked: owned minus open borrow obligations.
pub fn compute_available_position(
    view: &dyn LedgerView,
    wallet: &WalletId,
    stock: &UnitSymbol,
) -> Result<Decimal, LedgerError> {
    let owned = view.get_balance(wallet, stock)?;

    let mut borrowed = Decimal::ZERO;
    for symbol in view.list_units() {
        let unit = view.get_unit(&symbol)?;
        if unit.kind != UnitKind::BorrowRecord {
            continue;
        }
        if let UnitState::Borrow(state) = &unit.state
            && !state.returned
            && &state.borrower == wallet
            && &state.stock == stock
        {
            borrowed += state.quantity;
        }
    }

    Ok(owned - borrowed)
}

/// Check a proposed short sale against the available position.
pub fn validate_short_sale(
    view: &dyn LedgerView,
    seller: &WalletId,
    stock: &UnitSymbol,
    quantity: Decimal,
) -> Result<bool, LedgerError> {
    let available = compute_available_position(view, seller, stock)?;
    Ok(available - quantity >= -QUANTITY_EPSILON)
}

/// SmartContract: auto-return at the end of a term borrow.
pub fn borrow_contract(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
    timestamp: DateTime<Utc>,
    _: &PriceMap,
) -> Result<PendingTransaction, LedgerError> {
    if view.get_unit_state(symbol)?.is_none() {
        return Ok(PendingTransaction::empty());
    }
    let state = borrow_state(view, symbol)?;
    if state.returned {
        return Ok(PendingTransaction::empty());
    }
    let Some(term_end) = state.term_end else {
        return Ok(PendingTransaction::empty());
    };
    if timestamp < term_end {
        return Ok(PendingTransaction::empty());
    }

    // A borrower without the shares cannot be force-returned; leave the record open and
    // let the host resolve the recall
    let borrower_shares = view.get_balance(&state.borrower, &state.stock)?;
    if borrower_shares < state.quantity - QUANTITY_EPSILON {
        warn!(
            borrow = %symbol,
            borrower = %state.borrower,
            held = %borrower_shares,
            owed = %state.quantity,
            "term borrow due but borrower lacks shares to return"
        );
        return Ok(PendingTransaction::empty());
    }

    compute_return(view, symbol, timestamp)
}

fn borrow_state(view: &dyn LedgerView, symbol: &UnitSymbol) -> Result<BorrowState, LedgerError> {
    match view.get_unit_state(symbol)? {
        UnitState::Borrow(state) => Ok(state),
        _ => Err(LedgerError::StateMismatch {
            unit: symbol.clone(),
            expected: UnitKind::BorrowRecord,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Ledger, LedgerConfig};
    use chrono::{TimeDelta, TimeZone};

    fn open_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn sbl_ledger() -> Ledger {
        let mut ledger = Ledger::new("sbl", open_date(), LedgerConfig::default());
        ledger.register_unit(Unit::cash("USD", "US Dollar")).unwrap();
        ledger
            .register_unit(Unit::new(
                "AAPL",
                "Apple Inc.",
                UnitKind::Stock,
                Some(Decimal::ZERO),
                None,
                Some(6),
            ))
            .unwrap();
        ledger.register_wallet("lender".into()).unwrap();
        ledger.register_wallet("shorty".into()).unwrap();
        ledger.set_balance(&"lender".into(), &"AAPL".into(), dec!(1000)).unwrap();
        ledger.set_balance(&"shorty".into(), &"USD".into(), dec!(100000)).unwrap();
        ledger
    }

    #[test]
    fn test_open_and_return_borrow_with_fee() {
        let mut ledger = sbl_ledger();

        let pending = open_borrow(
            &ledger,
            "BRW_AAPL_1",
            "AAPL borrow",
            "AAPL".into(),
            "lender".into(),
            "shorty".into(),
            dec!(100),
            dec!(50),
            "USD".into(),
            None,
        )
        .unwrap();
        assert!(ledger.execute_contract(&pending).unwrap().is_applied());

        assert_eq!(
            ledger.get_balance(&"shorty".into(), &"AAPL".into()).unwrap(),
            dec!(100)
        );
        assert_eq!(
            ledger
                .get_balance(&"shorty".into(), &"BRW_AAPL_1".into())
                .unwrap(),
            Decimal::ONE
        );

        // Available position nets out the borrow: shorty owns 100 but owes 100
        assert_eq!(
            compute_available_position(&ledger, &"shorty".into(), &"AAPL".into()).unwrap(),
            Decimal::ZERO
        );
        assert!(!validate_short_sale(&ledger, &"shorty".into(), &"AAPL".into(), dec!(1)).unwrap());

        // Return after 73 days: fee = 100 * 50/10000 * 73/365 = 0.1
        let return_time = open_date() + TimeDelta::days(73);
        ledger.advance_time(return_time).unwrap();
        let pending = compute_return(&ledger, &"BRW_AAPL_1".into(), return_time).unwrap();
        assert_eq!(pending.new_units.len(), 1);
        assert!(ledger.execute_contract(&pending).unwrap().is_applied());

        assert_eq!(
            ledger.get_balance(&"lender".into(), &"AAPL".into()).unwrap(),
            dec!(1000)
        );
        match ledger.get_unit_state(&"FEE_BRW_AAPL_1".into()).unwrap() {
            UnitState::DeferredCash(state) => assert_eq!(state.amount, dec!(0.1)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_term_borrow_auto_returns() {
        let mut ledger = sbl_ledger();
        let term_end = open_date() + TimeDelta::days(30);

        let pending = open_borrow(
            &ledger,
            "BRW_AAPL_2",
            "AAPL term borrow",
            "AAPL".into(),
            "lender".into(),
            "shorty".into(),
            dec!(50),
            dec!(25),
            "USD".into(),
            Some(term_end),
        )
        .unwrap();
        ledger.execute_contract(&pending).unwrap();

        // Before term end the contract is quiet
        let pending =
            borrow_contract(&ledger, &"BRW_AAPL_2".into(), open_date(), &PriceMap::new()).unwrap();
        assert!(pending.is_empty());

        ledger.advance_time(term_end).unwrap();
        let pending =
            borrow_contract(&ledger, &"BRW_AAPL_2".into(), term_end, &PriceMap::new()).unwrap();
        assert!(!pending.is_empty());
        assert!(ledger.execute_contract(&pending).unwrap().is_applied());

        match ledger.get_unit_state(&"BRW_AAPL_2".into()).unwrap() {
            UnitState::Borrow(state) => assert!(state.returned),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_open_borrow_requires_lender_inventory() {
        let ledger = sbl_ledger();
        let result = open_borrow(
            &ledger,
            "BRW_AAPL_3",
            "oversized",
            "AAPL".into(),
            "lender".into(),
            "shorty".into(),
            dec!(5000),
            dec!(25),
            "USD".into(),
            None,
        );
        assert!(result.is_err());
    }
}
