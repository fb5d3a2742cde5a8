use crate::{
    error::{Bound, LedgerError},
    ledger::{Ledger, view::LedgerView},
    transaction::{Move, Transaction},
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tally_instrument::unit::{Unit, UnitSymbol, kind::UnitKind, transfer::TransferRule};
use tally_instrument::wallet::WalletId;

/// Check that every unit and wallet a transaction references is registered.
///
/// This check is never skipped, even in fast mode.
pub(super) fn check_registration(ledger: &Ledger, tx: &Transaction) -> Result<(), LedgerError> {
    for mv in &tx.moves {
        if !ledger.units().contains_key(&mv.unit) {
            return Err(LedgerError::UnitNotRegistered(mv.unit.clone()));
        }
        if !ledger.is_registered(&mv.source) {
            return Err(LedgerError::WalletNotRegistered(mv.source.clone()));
        }
        if !ledger.is_registered(&mv.dest) {
            return Err(LedgerError::WalletNotRegistered(mv.dest.clone()));
        }
    }
    for delta in &tx.state_deltas {
        if !ledger.units().contains_key(&delta.unit) {
            return Err(LedgerError::UnitNotRegistered(delta.unit.clone()));
        }
    }
    Ok(())
}

/// Full pre-flight validation: timestamp, per-move transfer rules, then the net
/// balance-bound check across the whole transaction.
///
/// The net check is order-independent and applies unit rounding at every accumulation
/// step to match execution exactly, so intra-transaction intermediate negatives are
/// admissible as long as the final per-(wallet, unit) balance is in bounds.
pub(super) fn validate(ledger: &Ledger, tx: &Transaction) -> Result<(), LedgerError> {
    if tx.timestamp > ledger.current_time() {
        return Err(LedgerError::FutureTimestamp {
            timestamp: tx.timestamp,
            current: ledger.current_time(),
        });
    }

    for mv in &tx.moves {
        let unit = ledger
            .units()
            .get(&mv.unit)
            .ok_or_else(|| LedgerError::UnitNotRegistered(mv.unit.clone()))?;
        if let Some(rule) = unit.transfer_rule {
            check_transfer_rule(rule, unit, mv)?;
        }
    }

    // Net per-(wallet, unit) change, rounded as execution will round
    let mut net: BTreeMap<(&WalletId, &UnitSymbol), Decimal> = BTreeMap::new();
    for mv in &tx.moves {
        let unit = ledger
            .units()
            .get(&mv.unit)
            .ok_or_else(|| LedgerError::UnitNotRegistered(mv.unit.clone()))?;

        let source = net.entry((&mv.source, &mv.unit)).or_default();
        *source = unit.round(*source - mv.quantity);
        let dest = net.entry((&mv.dest, &mv.unit)).or_default();
        *dest = unit.round(*dest + mv.quantity);
    }

    for ((wallet, unit_symbol), delta) in net {
        // The SYSTEM wallet is the mint/sink and is exempt from balance bounds
        if wallet.is_system() {
            continue;
        }

        let unit = ledger
            .units()
            .get(unit_symbol)
            .ok_or_else(|| LedgerError::UnitNotRegistered(unit_symbol.clone()))?;
        let current = ledger.balance_or_zero(wallet, unit_symbol);
        let projected = unit.round(current + delta);

        if let Some(min) = unit.min_balance
            && projected < min
        {
            return Err(if unit.kind == UnitKind::Cash {
                LedgerError::InsufficientFunds {
                    wallet: wallet.clone(),
                    unit: unit_symbol.clone(),
                    projected,
                }
            } else {
                LedgerError::BalanceConstraintViolation {
                    wallet: wallet.clone(),
                    unit: unit_symbol.clone(),
                    projected,
                    bound: Bound::Min,
                    limit: min,
                }
            });
        }
        if let Some(max) = unit.max_balance
            && projected > max
        {
            return Err(LedgerError::BalanceConstraintViolation {
                wallet: wallet.clone(),
                unit: unit_symbol.clone(),
                projected,
                bound: Bound::Max,
                limit: max,
            });
        }
    }

    Ok(())
}

fn check_transfer_rule(rule: TransferRule, unit: &Unit, mv: &Move) -> Result<(), LedgerError> {
    match rule {
        TransferRule::Bilateral => {
            let Some((long, short, novation_from)) = unit.state.bilateral_parties() else {
                return Err(LedgerError::TransferRuleViolation(format!(
                    "bilateral unit {} missing counterparty state",
                    unit.symbol
                )));
            };

            let authorized = |wallet: &WalletId| {
                wallet == long || wallet == short || novation_from == Some(wallet)
            };

            if !authorized(&mv.source) {
                return Err(LedgerError::TransferRuleViolation(format!(
                    "bilateral {}: {} not authorized",
                    unit.symbol, mv.source
                )));
            }
            if !authorized(&mv.dest) {
                return Err(LedgerError::TransferRuleViolation(format!(
                    "bilateral {}: {} not authorized",
                    unit.symbol, mv.dest
                )));
            }
            Ok(())
        }
    }
}
