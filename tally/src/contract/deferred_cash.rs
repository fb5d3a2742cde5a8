use crate::{
    error::LedgerError,
    ledger::view::LedgerView,
    pricing::PriceMap,
    transaction::{Move, PendingTransaction},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::collections::BTreeMap;
use tally_instrument::{
    QUANTITY_EPSILON, is_dust,
    unit::{
        Unit, UnitSymbol,
        kind::UnitKind,
        state::{DeferredCashState, UnitState},
    },
    wallet::WalletId,
};

/// Create a deferred-cash unit representing a future payment obligation.
///
/// The unit always trades in quantity 1 and is held by whichever party carries the
/// obligation: the payer for trade settlement (T+n), the payee for entitlements such as
/// dividends. The slight negative lower bound admits the extinguishing move back to
/// SYSTEM.
pub fn create_deferred_cash_unit<Symbol>(
    symbol: Symbol,
    amount: Decimal,
    currency: UnitSymbol,
    payment_date: DateTime<Utc>,
    payer_wallet: WalletId,
    payee_wallet: WalletId,
    reference: Option<SmolStr>,
) -> Result<Unit, LedgerError>
where
    Symbol: Into<UnitSymbol>,
{
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidContractOperation(format!(
            "amount must be positive, got {amount}"
        )));
    }
    if payer_wallet == payee_wallet {
        return Err(LedgerError::InvalidContractOperation(
            "payer_wallet and payee_wallet must be different".to_string(),
        ));
    }

    let name = format!("Deferred Cash Payment: {amount} {currency}");
    Ok(Unit::new(
        symbol,
        name,
        UnitKind::DeferredCash,
        Some(Decimal::NEGATIVE_ONE),
        Some(Decimal::ONE),
        Some(0),
    )
    .with_state(UnitState::DeferredCash(DeferredCashState {
        amount,
        currency,
        payment_date,
        payer_wallet,
        payee_wallet,
        settled: false,
        settlement_time: None,
        reference,
    })))
}

/// Execute the deferred payment if due: cash moves payer to payee and the obligation is
/// extinguished back to SYSTEM by whichever party holds it.
///
/// Empty when the payment date has not been reached, the obligation is settled, or
/// nobody holds the unit.
pub fn compute_deferred_cash_settlement(
    view: &dyn LedgerView,
    dc_symbol: &UnitSymbol,
    settlement_time: DateTime<Utc>,
) -> Result<PendingTransaction, LedgerError> {
    let state = deferred_cash_state(view, dc_symbol)?;

    if state.settled || settlement_time < state.payment_date {
        return Ok(PendingTransaction::empty());
    }

    // The holder is the payer (trade settlement) or the payee (dividend entitlement)
    let payer_balance = view.get_balance(&state.payer_wallet, dc_symbol)?;
    let payee_balance = view.get_balance(&state.payee_wallet, dc_symbol)?;
    let (holder, holder_balance) = if payer_balance > QUANTITY_EPSILON {
        (&state.payer_wallet, payer_balance)
    } else if payee_balance > QUANTITY_EPSILON {
        (&state.payee_wallet, payee_balance)
    } else {
        return Ok(PendingTransaction::empty());
    };

    let moves = vec![
        Move::new(
            state.payer_wallet.clone(),
            state.payee_wallet.clone(),
            state.currency.clone(),
            state.amount,
            format!("settlement_{dc_symbol}_cash"),
        )?,
        Move::new(
            holder.clone(),
            WalletId::system(),
            dc_symbol.clone(),
            holder_balance,
            format!("settlement_{dc_symbol}_extinguish"),
        )?,
    ];

    let mut state_updates = BTreeMap::new();
    state_updates.insert(
        dc_symbol.clone(),
        UnitState::DeferredCash(DeferredCashState {
            settled: true,
            settlement_time: Some(settlement_time),
            ..state
        }),
    );

    Ok(PendingTransaction::new(moves, state_updates))
}

/// Secondary market assignment of an unsettled obligation at a negotiated price.
pub fn transact(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
    seller: &WalletId,
    buyer: &WalletId,
    quantity: Decimal,
    price: Decimal,
) -> Result<PendingTransaction, LedgerError> {
    if quantity <= Decimal::ZERO {
        return Err(LedgerError::InvalidContractOperation(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    if price < Decimal::ZERO {
        return Err(LedgerError::InvalidContractOperation(format!(
            "price must be non-negative, got {price}"
        )));
    }
    if seller == buyer {
        return Err(LedgerError::InvalidContractOperation(
            "seller and buyer must be different".to_string(),
        ));
    }

    let state = deferred_cash_state(view, symbol)?;
    if state.settled {
        return Err(LedgerError::InvalidContractOperation(format!(
            "deferred cash {symbol} has already been settled"
        )));
    }

    let seller_balance = view.get_balance(seller, symbol)?;
    if seller_balance < quantity - QUANTITY_EPSILON {
        return Err(LedgerError::InvalidContractOperation(format!(
            "seller {seller} has insufficient balance: {seller_balance} < {quantity}"
        )));
    }

    let mut moves = vec![Move::new(
        seller.clone(),
        buyer.clone(),
        symbol.clone(),
        quantity,
        format!("dc_trade_{symbol}_unit"),
    )?];

    let total_payment = quantity * price;
    if !is_dust(total_payment) {
        moves.push(Move::new(
            buyer.clone(),
            seller.clone(),
            state.currency.clone(),
            total_payment,
            format!("dc_trade_{symbol}_cash"),
        )?);
    }

    Ok(PendingTransaction::new(moves, BTreeMap::new()))
}

/// SmartContract: settle automatically once the payment date is reached.
pub fn deferred_cash_contract(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
    timestamp: DateTime<Utc>,
    _: &PriceMap,
) -> Result<PendingTransaction, LedgerError> {
    if view.get_unit_state(symbol)?.is_none() {
        return Ok(PendingTransaction::empty());
    }
    let state = deferred_cash_state(view, symbol)?;

    if state.settled || timestamp < state.payment_date {
        return Ok(PendingTransaction::empty());
    }

    compute_deferred_cash_settlement(view, symbol, timestamp)
}

fn deferred_cash_state(
    view: &dyn LedgerView,
    symbol: &UnitSymbol,
) -> Result<DeferredCashState, LedgerError> {
    match view.get_unit_state(symbol)? {
        UnitState::DeferredCash(state) => Ok(state),
        _ => Err(LedgerError::StateMismatch {
            unit: symbol.clone(),
            expected: UnitKind::DeferredCash,
        }),
    }
}
