use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tradegate_models::brain::{AgentContext, BrainId, BrainOutput, Direction};
use tradegate_models::world_state::{TrendDirection, WorldState};

use super::{decimal_evidence, Brain};
use crate::error::BrainError;

/// Weighs sizing headroom against the account and the configured limits.
///
/// With headroom it leans with the prevailing trend; without it, it argues
/// for standing aside.
pub struct RiskBrain;

#[async_trait]
impl Brain for RiskBrain {
    fn id(&self) -> BrainId {
        BrainId::Risk
    }

    async fn evaluate(
        &self,
        state: &WorldState,
        context: &AgentContext,
    ) -> Result<BrainOutput, BrainError> {
        Ok(assess(state, context))
    }
}

fn stand_aside(
    confidence: Decimal,
    rationale: String,
    evidence: BTreeMap<String, serde_json::Value>,
) -> BrainOutput {
    BrainOutput {
        brain_id: BrainId::Risk,
        direction: Direction::Flat,
        confidence,
        rationale,
        evidence,
    }
}

fn assess(state: &WorldState, context: &AgentContext) -> BrainOutput {
    let config = &context.config;
    let account = &state.account;
    let mut evidence = BTreeMap::new();

    let realized = account.realized_loss();
    let remaining_loss = (config.daily_loss_limit - realized).max(Decimal::ZERO);
    evidence.insert("realized_loss".to_string(), decimal_evidence(realized));
    evidence.insert(
        "remaining_loss_budget".to_string(),
        decimal_evidence(remaining_loss),
    );

    let open = account.open_position_count() as u32;
    evidence.insert("open_positions".to_string(), serde_json::json!(open));

    if account.buying_power <= Decimal::ZERO {
        return stand_aside(dec!(0.9), "No buying power".to_string(), evidence);
    }
    if remaining_loss < config.max_risk_per_trade {
        return stand_aside(
            dec!(0.9),
            format!("Daily loss budget {remaining_loss} cannot cover a full-risk trade"),
            evidence,
        );
    }
    let has_position = account.position_for(&state.symbol).is_some();
    if open >= config.max_open_positions && !has_position {
        return stand_aside(
            dec!(0.8),
            format!("Position capacity exhausted ({open}/{})", config.max_open_positions),
            evidence,
        );
    }

    let loss_headroom = if config.daily_loss_limit > Decimal::ZERO {
        remaining_loss / config.daily_loss_limit
    } else {
        Decimal::ZERO
    };
    let slot_headroom = if config.max_open_positions > 0 {
        Decimal::from(config.max_open_positions.saturating_sub(open))
            / Decimal::from(config.max_open_positions)
    } else {
        Decimal::ZERO
    };
    let headroom = loss_headroom.min(slot_headroom);
    evidence.insert("headroom".to_string(), decimal_evidence(headroom));

    let direction = match state.market.trend.as_ref().map(|t| t.direction) {
        Some(TrendDirection::Up) => Direction::Buy,
        Some(TrendDirection::Down) => Direction::Sell,
        _ => Direction::Flat,
    };
    let confidence = (dec!(0.3) + headroom * dec!(0.3)).min(dec!(0.6));

    BrainOutput {
        brain_id: BrainId::Risk,
        direction,
        confidence,
        rationale: format!("Headroom {} of limits", headroom.round_dp(2)),
        evidence,
    }
}
