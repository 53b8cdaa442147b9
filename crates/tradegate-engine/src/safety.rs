//! Safety battery run over every drafted proposal before it is logged.
//!
//! Checks never short-circuit: a denied proposal carries every reason that
//! applies, in check order, so the ledger shows the full picture.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::debug;
use tradegate_models::agent_config::AgentConfig;
use tradegate_models::brain::Direction;
use tradegate_models::config::SafetyConfig;
use tradegate_models::mode::can_propose_in_mode;
use tradegate_models::proposal::DraftProposal;
use tradegate_models::safety::SafetyResult;
use tradegate_models::world_state::{PositionSide, WorldState};

pub const KILL_SWITCH_REASON: &str = "kill switch engaged";
pub const VENUE_HALTED_REASON: &str = "execution venue reports trading halted";

pub struct SafetyEvaluator {
    config: SafetyConfig,
}

impl SafetyEvaluator {
    pub fn new(config: SafetyConfig) -> Self {
        Self { config }
    }

    /// Run the full battery.
    ///
    /// `venue_halted` is the venue's own halt flag when one is configured for
    /// the current mode. Position-dependent checks only apply to actionable
    /// drafts; FLAT never opens exposure.
    pub fn evaluate(
        &self,
        draft: &DraftProposal,
        state: &WorldState,
        config: &AgentConfig,
        venue_halted: Option<bool>,
        now: DateTime<Utc>,
    ) -> SafetyResult {
        let mut reasons = Vec::new();
        let mut flags = Vec::new();
        let actionable = draft.direction.is_actionable();
        let realized = state.account.realized_loss();

        if !config.trading_enabled {
            reasons.push(KILL_SWITCH_REASON.to_string());
        }
        if venue_halted == Some(true) {
            reasons.push(VENUE_HALTED_REASON.to_string());
        }

        if actionable && !can_propose_in_mode(draft.mode) {
            reasons.push(format!("mode {} does not allow proposals", draft.mode));
        }

        if !config.symbol_allowed(&draft.symbol) {
            reasons.push(format!(
                "symbol {} is not in the allowed symbols list",
                draft.symbol
            ));
        }

        if actionable {
            if draft.risk_amount > config.max_risk_per_trade {
                reasons.push(format!(
                    "risk {} exceeds max risk per trade {}",
                    draft.risk_amount.round_dp(2),
                    config.max_risk_per_trade
                ));
            } else if draft.risk_amount > config.max_risk_per_trade * self.config.risk_flag_ratio {
                flags.push(format!(
                    "risk {} is close to max risk per trade {}",
                    draft.risk_amount.round_dp(2),
                    config.max_risk_per_trade
                ));
            }

            let projected = realized + draft.risk_amount;
            if projected > config.daily_loss_limit {
                reasons.push(format!(
                    "daily loss limit {} would be exceeded: realized {} plus risk {}",
                    config.daily_loss_limit,
                    realized.round_dp(2),
                    draft.risk_amount.round_dp(2)
                ));
            } else if projected > config.daily_loss_limit * self.config.daily_loss_flag_ratio {
                flags.push(format!(
                    "projected daily loss {} approaching limit {}",
                    projected.round_dp(2),
                    config.daily_loss_limit
                ));
            }

            let open = state.account.open_position_count() as u32;
            if open >= config.max_open_positions && !draft.closes_position {
                reasons.push(format!(
                    "max open positions reached ({open}/{})",
                    config.max_open_positions
                ));
            }

            if !config.allow_overnight && draft.holds_overnight {
                reasons.push("overnight holding not allowed".to_string());
            }

            if let Some(flag) = correlated_exposure(draft, state) {
                flags.push(flag);
            }
        }

        let lookahead = Duration::minutes(self.config.event_lookahead_minutes);
        let events = state.market.imminent_high_impact(now, lookahead);
        for event in &events {
            flags.push(format!("upcoming high-impact event: {}", event.name));
        }
        let elevated = state.market.volatility_pct >= self.config.elevated_volatility_pct;
        if actionable && elevated && !events.is_empty() {
            let names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
            reasons.push(format!(
                "high-impact event ({}) within {} minutes at elevated volatility {}%",
                names.join(", "),
                self.config.event_lookahead_minutes,
                state.market.volatility_pct
            ));
        }

        let result = SafetyResult::from_checks(reasons, flags);
        debug!(
            symbol = %draft.symbol,
            allowed = result.allowed,
            reasons = result.reasons.len(),
            flags = result.flags.len(),
            "Safety evaluated"
        );
        result
    }
}

/// Same-side exposure already held in the symbol or in a pair sharing a currency leg.
fn correlated_exposure(draft: &DraftProposal, state: &WorldState) -> Option<String> {
    let side = match draft.direction {
        Direction::Buy => PositionSide::Long,
        Direction::Sell => PositionSide::Short,
        Direction::Flat => return None,
    };
    let related: Vec<&str> = state
        .account
        .positions
        .iter()
        .filter(|p| p.side == side && p.quantity > Decimal::ZERO)
        .filter(|p| p.symbol == draft.symbol || shares_leg(&p.symbol, &draft.symbol))
        .map(|p| p.symbol.as_str())
        .collect();
    if related.is_empty() {
        None
    } else {
        Some(format!(
            "correlated exposure: same-side positions in {}",
            related.join(", ")
        ))
    }
}

/// Six-letter FX pairs sharing a base or quote currency.
fn shares_leg(a: &str, b: &str) -> bool {
    let legs = |s: &str| -> Option<(String, String)> {
        (s.len() == 6 && s.is_ascii()).then(|| (s[..3].to_string(), s[3..].to_string()))
    };
    match (legs(a), legs(b)) {
        (Some((a_base, a_quote)), Some((b_base, b_quote))) => {
            a_base == b_base || a_quote == b_quote
        }
        _ => false,
    }
}
