use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tradegate_models::brain::{AgentContext, BrainId, BrainOutput, Direction};
use tradegate_models::world_state::{TrendDirection, WorldState};

use super::{decimal_evidence, Brain};
use crate::error::BrainError;

const MIN_TREND_STRENGTH: Decimal = dec!(0.5);
const MAX_CONVICTION: Decimal = dec!(0.9);
const EXTREME_VOLATILITY_PCT: Decimal = dec!(3);

/// Reads price structure: trend, moving-average stacking and volatility.
pub struct MarketBrain;

#[async_trait]
impl Brain for MarketBrain {
    fn id(&self) -> BrainId {
        BrainId::Market
    }

    async fn evaluate(
        &self,
        state: &WorldState,
        _context: &AgentContext,
    ) -> Result<BrainOutput, BrainError> {
        Ok(assess(state))
    }
}

fn assess(state: &WorldState) -> BrainOutput {
    let market = &state.market;
    let mut evidence = BTreeMap::new();
    evidence.insert("price".to_string(), decimal_evidence(market.price));
    evidence.insert(
        "volatility_pct".to_string(),
        decimal_evidence(market.volatility_pct),
    );

    let (trend_dir, strength) = match &market.trend {
        Some(t) if t.strength > MIN_TREND_STRENGTH => match t.direction {
            TrendDirection::Up => (Direction::Buy, t.strength),
            TrendDirection::Down => (Direction::Sell, t.strength),
            TrendDirection::Sideways => (Direction::Flat, Decimal::ZERO),
        },
        _ => (Direction::Flat, Decimal::ZERO),
    };
    evidence.insert("trend_strength".to_string(), decimal_evidence(strength));

    let stacked = match (market.sma_20, market.sma_50) {
        (Some(fast), Some(slow)) if market.price > fast && fast > slow => Direction::Buy,
        (Some(fast), Some(slow)) if market.price < fast && fast < slow => Direction::Sell,
        _ => Direction::Flat,
    };
    evidence.insert(
        "ma_stack".to_string(),
        serde_json::Value::String(stacked.to_string()),
    );

    let direction = match (trend_dir, stacked) {
        (Direction::Flat, s) => s,
        (t, Direction::Flat) => t,
        (t, s) if t == s => t,
        _ => Direction::Flat,
    };

    if direction == Direction::Flat {
        let rationale = if trend_dir.is_actionable() && stacked.is_actionable() {
            "Trend and moving averages disagree"
        } else {
            "No clear price structure"
        };
        return BrainOutput {
            brain_id: BrainId::Market,
            direction,
            confidence: dec!(0.4),
            rationale: rationale.to_string(),
            evidence,
        };
    }

    let mut notes = Vec::new();
    let mut conviction = dec!(0.5) + strength * dec!(0.3);
    if trend_dir == stacked {
        conviction += dec!(0.1);
        notes.push("trend confirmed by moving averages");
    }
    conviction = conviction.min(MAX_CONVICTION);

    if market.risk_off && direction == Direction::Buy {
        conviction *= dec!(0.7);
        notes.push("risk-off regime");
    }
    if market.volatility_pct > EXTREME_VOLATILITY_PCT {
        conviction *= dec!(0.6);
        notes.push("extreme volatility");
    }

    let mut rationale = format!(
        "{} structure on {} {}",
        if direction == Direction::Buy { "Bullish" } else { "Bearish" },
        state.symbol,
        state.timeframe
    );
    if !notes.is_empty() {
        rationale.push_str(&format!(" ({})", notes.join(", ")));
    }

    BrainOutput {
        brain_id: BrainId::Market,
        direction,
        confidence: conviction,
        rationale,
        evidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{paper_context, sample_state};
    use tradegate_models::world_state::TrendReading;

    fn trending(direction: TrendDirection, strength: Decimal) -> WorldState {
        let mut state = sample_state("EURUSD", dec!(1.0850));
        state.market.trend = Some(TrendReading {
            direction,
            strength,
        });
        state.market.sma_20 = None;
        state.market.sma_50 = None;
        state
    }

    #[tokio::test]
    async fn strong_uptrend_buys() {
        let out = MarketBrain
            .evaluate(&trending(TrendDirection::Up, dec!(0.8)), &paper_context())
            .await
            .unwrap();
        assert_eq!(out.direction, Direction::Buy);
        assert_eq!(out.confidence, dec!(0.74));
    }

    #[test]
    fn weak_trend_is_flat() {
        let out = assess(&trending(TrendDirection::Down, dec!(0.4)));
        assert_eq!(out.direction, Direction::Flat);
    }

    #[test]
    fn confirmed_downtrend_sells_with_bonus() {
        let mut state = trending(TrendDirection::Down, dec!(0.9));
        state.market.sma_20 = Some(dec!(1.0900));
        state.market.sma_50 = Some(dec!(1.0950));
        let out = assess(&state);
        assert_eq!(out.direction, Direction::Sell);
        assert_eq!(out.confidence, dec!(0.87));
    }

    #[test]
    fn risk_off_and_volatility_dampen_longs() {
        let mut state = trending(TrendDirection::Up, dec!(1.0));
        state.market.risk_off = true;
        state.market.volatility_pct = dec!(3.5);
        let out = assess(&state);
        assert_eq!(out.direction, Direction::Buy);
        assert_eq!(out.confidence, dec!(0.8) * dec!(0.7) * dec!(0.6));
    }

    #[test]
    fn conflicting_signals_stay_flat() {
        let mut state = trending(TrendDirection::Up, dec!(0.8));
        state.market.price = dec!(1.0800);
        state.market.sma_20 = Some(dec!(1.0850));
        state.market.sma_50 = Some(dec!(1.0900));
        let out = assess(&state);
        assert_eq!(out.direction, Direction::Flat);
        assert!(out.rationale.contains("disagree"));
    }
}
