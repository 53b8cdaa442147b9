use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tradegate_models::brain::{AgentContext, BrainId, BrainOutput, Direction};
use tradegate_models::world_state::{MemoryItem, WorldState};

use super::{decimal_evidence, Brain};
use crate::error::BrainError;

/// Evidence key read by the sizer to shrink the risk budget.
pub const SIZE_MULTIPLIER_KEY: &str = "size_multiplier";

const TILT_LOSS_STREAK: u32 = 3;
const OVERCONFIDENT_WIN_STREAK: u32 = 5;
const FATIGUE_THRESHOLD: Decimal = dec!(0.7);
const FOMO_DECISIONS_PER_DAY: u32 = 10;
const FEAR_REJECTIONS_PER_DAY: u32 = 5;
const POOR_WIN_RATE: Decimal = dec!(0.35);
const MIN_TRADES_FOR_WIN_RATE: usize = 3;
const RECALL_RELEVANCE: Decimal = dec!(0.5);
const RECALL_LIMIT: usize = 3;

/// Behavioral bias read from journaled history.
///
/// Never originates a trade. It votes FLAT, with more confidence the more
/// warning signs it sees, and publishes a size multiplier for the sizer.
pub struct PsychologyBrain;

#[async_trait]
impl Brain for PsychologyBrain {
    fn id(&self) -> BrainId {
        BrainId::Psychology
    }

    async fn evaluate(
        &self,
        state: &WorldState,
        context: &AgentContext,
    ) -> Result<BrainOutput, BrainError> {
        Ok(assess(state, context))
    }
}

fn assess(state: &WorldState, context: &AgentContext) -> BrainOutput {
    let signals = &state.memory.psychology;
    let mut issues: Vec<String> = Vec::new();
    let mut multiplier = Decimal::ONE;

    if signals.loss_streak >= TILT_LOSS_STREAK {
        issues.push(format!("tilt risk after {} straight losses", signals.loss_streak));
        multiplier *= dec!(0.5);
    }
    if signals.win_streak >= OVERCONFIDENT_WIN_STREAK {
        issues.push(format!("overconfidence after {} straight wins", signals.win_streak));
        multiplier *= dec!(0.75);
    }
    if let Some(fatigue) = signals.fatigue_score {
        if fatigue > FATIGUE_THRESHOLD {
            issues.push(format!("fatigue score {fatigue}"));
            multiplier *= dec!(0.7);
        }
    }
    if signals.decisions_last_24h > FOMO_DECISIONS_PER_DAY {
        issues.push(format!(
            "{} decisions in 24h suggests FOMO",
            signals.decisions_last_24h
        ));
        multiplier *= dec!(0.8);
    }
    if signals.rejections_last_24h > FEAR_REJECTIONS_PER_DAY {
        issues.push(format!(
            "{} rejections in 24h suggests hesitation",
            signals.rejections_last_24h
        ));
    }
    if signals.seeks_overnight && !context.config.allow_overnight {
        issues.push("habitually holds overnight against policy".to_string());
    }

    let symbol_trades = state
        .memory
        .recent_trades
        .iter()
        .filter(|t| t.symbol == state.symbol)
        .count();
    let win_rate = state.memory.win_rate(&state.symbol);
    if let Some(rate) = win_rate.filter(|_| symbol_trades >= MIN_TRADES_FOR_WIN_RATE) {
        if rate < POOR_WIN_RATE {
            issues.push(format!(
                "win rate {}% over the last {symbol_trades} {} trades",
                (rate * dec!(100)).round_dp(0),
                state.symbol
            ));
            multiplier *= dec!(0.8);
        }
    }

    let confidence = (dec!(0.3) + dec!(0.15) * Decimal::from(issues.len() as u32)).min(dec!(0.9));

    let mut evidence = BTreeMap::new();
    evidence.insert(SIZE_MULTIPLIER_KEY.to_string(), decimal_evidence(multiplier));
    evidence.insert("issues".to_string(), serde_json::json!(issues));
    evidence.insert("loss_streak".to_string(), serde_json::json!(signals.loss_streak));
    evidence.insert("win_streak".to_string(), serde_json::json!(signals.win_streak));
    if let Some(rate) = win_rate {
        evidence.insert("win_rate".to_string(), decimal_evidence(rate));
    }
    evidence.insert("lessons".to_string(), serde_json::json!(recall(&state.memory.lessons)));
    evidence.insert("rules".to_string(), serde_json::json!(recall(&state.memory.rules)));

    let rationale = if issues.is_empty() {
        "Clear state of mind".to_string()
    } else {
        format!("Caution: {}", issues.join("; "))
    };

    BrainOutput {
        brain_id: BrainId::Psychology,
        direction: Direction::Flat,
        confidence,
        rationale,
        evidence,
    }
}

/// The most relevant memory texts, strongest first.
fn recall(items: &[MemoryItem]) -> Vec<&str> {
    let mut relevant: Vec<&MemoryItem> = items
        .iter()
        .filter(|item| item.relevance >= RECALL_RELEVANCE)
        .collect();
    relevant.sort_by(|a, b| b.relevance.cmp(&a.relevance));
    relevant
        .into_iter()
        .take(RECALL_LIMIT)
        .map(|item| item.text.as_str())
        .collect()
}
