use crate::{
    contract::{bond, deferred_cash, forward, option, stock},
    error::LedgerError,
    event::{Event, EventAction},
    ledger::view::LedgerView,
    pricing::PriceMap,
    transaction::PendingTransaction,
};
use indexmap::IndexMap;

/// A scheduled-event handler: a pure function resolving an [`Event`] into a
/// [`PendingTransaction`] by delegating to the contract modules.
pub type EventHandler =
    fn(&dyn LedgerView, &Event, &PriceMap) -> Result<PendingTransaction, LedgerError>;

/// The default action -> handler registry.
///
/// Option actions require a `settlement_price` parameter and resolve to an empty result
/// without one; the remaining actions derive everything from unit state and the event's
/// trigger context.
pub fn default_handlers() -> IndexMap<EventAction, EventHandler> {
    IndexMap::from([
        (EventAction::Exercise, handle_option_exercise as EventHandler),
        (EventAction::Expiry, handle_option_expiry as EventHandler),
        (EventAction::Assignment, handle_option_exercise as EventHandler),
        (EventAction::Settlement, handle_deferred_cash_settlement as EventHandler),
        (EventAction::Delivery, handle_forward_delivery as EventHandler),
        (EventAction::Coupon, handle_bond_coupon as EventHandler),
        (EventAction::Redemption, handle_bond_redemption as EventHandler),
        (EventAction::Dividend, handle_stock_dividend as EventHandler),
    ])
}

fn settlement_price(event: &Event, prices: &PriceMap, view: &dyn LedgerView) -> Option<rust_decimal::Decimal> {
    // An explicit event parameter wins; otherwise fall back to the polled price of the
    // unit's underlying
    event.settlement_price().or_else(|| {
        let unit = view.get_unit(&event.symbol).ok()?;
        match &unit.state {
            tally_instrument::unit::state::UnitState::Option(state) => {
                prices.get(&state.underlying).copied()
            }
            tally_instrument::unit::state::UnitState::Forward(state) => {
                prices.get(&state.underlying).copied()
            }
            _ => None,
        }
    })
}

fn handle_option_exercise(
    view: &dyn LedgerView,
    event: &Event,
    prices: &PriceMap,
) -> Result<PendingTransaction, LedgerError> {
    let Some(price) = settlement_price(event, prices, view) else {
        return Ok(PendingTransaction::empty());
    };
    option::compute_option_exercise(view, &event.symbol, price)
}

fn handle_option_expiry(
    view: &dyn LedgerView,
    event: &Event,
    prices: &PriceMap,
) -> Result<PendingTransaction, LedgerError> {
    let Some(price) = settlement_price(event, prices, view) else {
        return Ok(PendingTransaction::empty());
    };
    option::compute_option_settlement(view, &event.symbol, price, false)
}

fn handle_deferred_cash_settlement(
    view: &dyn LedgerView,
    event: &Event,
    _: &PriceMap,
) -> Result<PendingTransaction, LedgerError> {
    deferred_cash::compute_deferred_cash_settlement(view, &event.symbol, view.current_time())
}

fn handle_forward_delivery(
    view: &dyn LedgerView,
    event: &Event,
    _: &PriceMap,
) -> Result<PendingTransaction, LedgerError> {
    forward::compute_forward_settlement(view, &event.symbol, false)
}

fn handle_bond_coupon(
    view: &dyn LedgerView,
    event: &Event,
    _: &PriceMap,
) -> Result<PendingTransaction, LedgerError> {
    bond::compute_coupon_payment(view, &event.symbol, view.current_time())
}

fn handle_bond_redemption(
    view: &dyn LedgerView,
    event: &Event,
    _: &PriceMap,
) -> Result<PendingTransaction, LedgerError> {
    bond::compute_redemption(view, &event.symbol, view.current_time())
}

fn handle_stock_dividend(
    view: &dyn LedgerView,
    event: &Event,
    _: &PriceMap,
) -> Result<PendingTransaction, LedgerError> {
    stock::process_dividends(view, &event.symbol, view.current_time())
}
