//! Holding reconciliation for buy/sell activity, using the weighted average
//! cost method.

use rust_decimal::Decimal;

use crate::domains::actions::ActivityDraft;
use crate::domains::ledger::{
    ActivityType, Holding, NewHolding, RecordId, DEFAULT_ASSET_TYPE, DEFAULT_CURRENCY,
};
use crate::error::{Result, YellowTrackerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

/// The holding-relevant part of a buy or sell activity.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeLeg {
    pub side: Side,
    pub ticker: String,
    pub shares: Decimal,
    pub price: Decimal,
    pub currency: String,
    pub platform: Option<String>,
    pub asset_type: String,
}

impl TradeLeg {
    /// `None` for activity that does not move shares, has no ticker, or
    /// carries a missing or non-positive share count.
    pub fn from_activity(activity: &ActivityDraft) -> Option<Self> {
        let side = match activity.activity_type {
            ActivityType::Buy => Side::Buy,
            ActivityType::Sell => Side::Sell,
            _ => return None,
        };
        let ticker = activity
            .ticker
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())?
            .to_string();
        let shares = activity.shares.filter(|s| *s > Decimal::ZERO)?;
        Some(Self {
            side,
            ticker,
            shares,
            price: activity.price_per_unit.unwrap_or(Decimal::ZERO),
            currency: activity
                .currency
                .clone()
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            platform: activity.platform.clone(),
            asset_type: activity
                .asset_type
                .clone()
                .unwrap_or_else(|| DEFAULT_ASSET_TYPE.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcilePlan {
    /// Set shares, and avg_cost when given; nothing else changes.
    Update {
        id: RecordId,
        shares: Decimal,
        avg_cost: Option<Decimal>,
    },
    Open(NewHolding),
    /// Shares reached zero or below. `oversold` when they went negative.
    Close { id: RecordId, oversold: bool },
    /// Sell against a ticker the user does not hold.
    NothingToSell,
}

/// Returns `(new_shares, new_avg_cost)` after buying `shares` at `price`.
pub fn weighted_average_cost(
    old_shares: Decimal,
    old_avg_cost: Decimal,
    shares: Decimal,
    price: Decimal,
) -> Result<(Decimal, Decimal)> {
    let overflow = || YellowTrackerError::Runtime("holding cost overflow".to_string());
    let new_shares = old_shares.checked_add(shares).ok_or_else(overflow)?;
    if new_shares <= Decimal::ZERO {
        return Ok((new_shares, Decimal::ZERO));
    }
    let old_cost = old_shares.checked_mul(old_avg_cost).ok_or_else(overflow)?;
    let added_cost = shares.checked_mul(price).ok_or_else(overflow)?;
    let total_cost = old_cost.checked_add(added_cost).ok_or_else(overflow)?;
    let avg_cost = total_cost.checked_div(new_shares).ok_or_else(overflow)?;
    Ok((new_shares, avg_cost))
}

pub fn plan(existing: Option<&Holding>, leg: &TradeLeg) -> Result<ReconcilePlan> {
    match (leg.side, existing) {
        (Side::Buy, Some(holding)) => {
            let (shares, avg_cost) =
                weighted_average_cost(holding.shares, holding.avg_cost, leg.shares, leg.price)?;
            if shares <= Decimal::ZERO {
                return Ok(ReconcilePlan::Close {
                    id: holding.id,
                    oversold: shares < Decimal::ZERO,
                });
            }
            Ok(ReconcilePlan::Update {
                id: holding.id,
                shares,
                avg_cost: Some(avg_cost),
            })
        }
        (Side::Buy, None) => Ok(ReconcilePlan::Open(NewHolding {
            asset_type: leg.asset_type.clone(),
            ticker: leg.ticker.clone(),
            name: None,
            shares: leg.shares,
            avg_cost: leg.price,
            currency: leg.currency.clone(),
            platform: leg.platform.clone(),
            notes: None,
        })),
        (Side::Sell, Some(holding)) => {
            let shares = holding
                .shares
                .checked_sub(leg.shares)
                .ok_or_else(|| YellowTrackerError::Runtime("holding share overflow".to_string()))?;
            if shares <= Decimal::ZERO {
                Ok(ReconcilePlan::Close {
                    id: holding.id,
                    oversold: shares < Decimal::ZERO,
                })
            } else {
                Ok(ReconcilePlan::Update {
                    id: holding.id,
                    shares,
                    avg_cost: None,
                })
            }
        }
        (Side::Sell, None) => Ok(ReconcilePlan::NothingToSell),
    }
}
