use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tradegate_models::brain::{AgentContext, BrainId, CoordinatorOutput, Direction};
use tradegate_models::config::SizingConfig;
use tradegate_models::proposal::DraftProposal;
use tradegate_models::world_state::{PositionSide, WorldState};

use crate::brains::psychology::SIZE_MULTIPLIER_KEY;

/// Stop distance never drops below 0.1% of price.
const MIN_STOP_FRACTION: Decimal = dec!(0.001);

/// Turns a consensus into a sized, unlogged proposal.
pub struct ProposalSizer {
    config: SizingConfig,
}

impl ProposalSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    /// Size the consensus against the per-trade risk budget.
    ///
    /// FLAT drafts carry no size, risk or price levels. Actionable drafts put
    /// the stop `stop_multiplier` volatility ranges away and size so the stop
    /// loses at most the budget, with a floor of one unit.
    pub fn draft(
        &self,
        state: &WorldState,
        coordinator: &CoordinatorOutput,
        context: &AgentContext,
        now: DateTime<Utc>,
    ) -> DraftProposal {
        let direction = coordinator.consensus_direction;
        let mut draft = DraftProposal {
            symbol: state.symbol.clone(),
            timeframe: state.timeframe,
            direction,
            size: Decimal::ZERO,
            risk_amount: Decimal::ZERO,
            entry: None,
            stop: None,
            target: None,
            confidence: coordinator.consensus_confidence,
            generated_at: now,
            mode: context.mode,
            closes_position: false,
            holds_overnight: false,
        };
        if !direction.is_actionable() {
            return draft;
        }

        let price = state.market.price;
        let distance = (price * state.market.volatility_pct / dec!(100)
            * self.config.stop_multiplier)
            .max(price * MIN_STOP_FRACTION);

        let budget = context.config.max_risk_per_trade
            * context.config.psychology_mode.size_multiplier()
            * psychology_multiplier(coordinator);
        let size = (budget / distance).floor().max(Decimal::ONE);

        let (stop, target) = match direction {
            Direction::Buy => (
                price - distance,
                price + distance * self.config.target_multiple,
            ),
            _ => (
                price + distance,
                price - distance * self.config.target_multiple,
            ),
        };

        draft.size = size;
        draft.risk_amount = size * distance;
        draft.entry = Some(price);
        draft.stop = Some(stop);
        draft.target = Some(target);
        draft.closes_position = closes_position(state, direction);
        draft.holds_overnight = self.holds_overnight(state);
        draft
    }

    fn holds_overnight(&self, state: &WorldState) -> bool {
        match state.market.session.minutes_to_close {
            Some(left) => state.timeframe.minutes() * self.config.hold_bars > left,
            None => false,
        }
    }
}

/// The psychology brain's published multiplier, or 1 when it abstained or is absent.
fn psychology_multiplier(coordinator: &CoordinatorOutput) -> Decimal {
    coordinator
        .brains
        .iter()
        .find(|b| b.brain_id == BrainId::Psychology && !b.is_abstention())
        .and_then(|b| b.evidence.get(SIZE_MULTIPLIER_KEY))
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<Decimal>().ok())
        .filter(|m| *m > Decimal::ZERO)
        .unwrap_or(Decimal::ONE)
}

fn closes_position(state: &WorldState, direction: Direction) -> bool {
    match state.account.position_for(&state.symbol) {
        Some(p) => matches!(
            (p.side, direction),
            (PositionSide::Long, Direction::Sell) | (PositionSide::Short, Direction::Buy)
        ),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{coordinator_output, paper_context, sample_state};
    use std::collections::BTreeMap;
    use tradegate_models::brain::BrainOutput;
    use tradegate_models::world_state::Position;

    fn sizer() -> ProposalSizer {
        ProposalSizer::new(SizingConfig::default())
    }

    fn state() -> WorldState {
        let mut state = sample_state("EURUSD", dec!(100));
        state.market.volatility_pct = dec!(2);
        state
    }

    #[test]
    fn flat_consensus_has_no_size() {
        let draft = sizer().draft(
            &state(),
            &coordinator_output(Direction::Flat, dec!(0.5), vec![]),
            &paper_context(),
            Utc::now(),
        );
        assert_eq!(draft.size, Decimal::ZERO);
        assert_eq!(draft.risk_amount, Decimal::ZERO);
        assert!(draft.entry.is_none());
    }

    #[test]
    fn buy_is_sized_to_the_risk_budget() {
        // stop distance = 100 × 2% × 1.5 = 3; 500 / 3 = 166 units
        let draft = sizer().draft(
            &state(),
            &coordinator_output(Direction::Buy, dec!(0.8), vec![]),
            &paper_context(),
            Utc::now(),
        );
        assert_eq!(draft.size, dec!(166));
        assert_eq!(draft.risk_amount, dec!(498));
        assert_eq!(draft.stop, Some(dec!(97)));
        assert_eq!(draft.target, Some(dec!(106)));
        assert!(!draft.closes_position);
    }

    #[test]
    fn psychology_multiplier_shrinks_size() {
        let psych = BrainOutput {
            brain_id: BrainId::Psychology,
            direction: Direction::Flat,
            confidence: dec!(0.6),
            rationale: String::new(),
            evidence: BTreeMap::from([(
                SIZE_MULTIPLIER_KEY.to_string(),
                serde_json::json!("0.5"),
            )]),
        };
        let draft = sizer().draft(
            &state(),
            &coordinator_output(Direction::Sell, dec!(0.7), vec![psych]),
            &paper_context(),
            Utc::now(),
        );
        assert_eq!(draft.size, dec!(83));
        assert_eq!(draft.stop, Some(dec!(103)));
    }

    #[test]
    fn opposite_position_is_a_close() {
        let mut state = state();
        state.account.positions.push(Position {
            symbol: "EURUSD".to_string(),
            side: PositionSide::Long,
            quantity: dec!(100),
            avg_price: dec!(99),
            market_price: dec!(100),
            unrealized_pnl: dec!(100),
        });
        let draft = sizer().draft(
            &state,
            &coordinator_output(Direction::Sell, dec!(0.7), vec![]),
            &paper_context(),
            Utc::now(),
        );
        assert!(draft.closes_position);
    }

    #[test]
    fn hold_past_close_is_overnight() {
        let mut state = state();
        state.market.session.minutes_to_close = Some(90);
        let draft = sizer().draft(
            &state,
            &coordinator_output(Direction::Buy, dec!(0.8), vec![]),
            &paper_context(),
            Utc::now(),
        );
        // 4 bars of 1h = 240 minutes
        assert!(draft.holds_overnight);
    }
}
