use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use tradegate_models::*;
use uuid::Uuid;

pub(crate) fn world_state(symbol: &str, at: DateTime<Utc>) -> WorldState {
    WorldState {
        symbol: symbol.to_string(),
        timeframe: Timeframe::H1,
        built_at: at,
        market: MarketContext {
            price: dec!(1.08512),
            volatility_pct: dec!(0.45),
            sma_20: Some(dec!(1.0840)),
            sma_50: Some(dec!(1.0810)),
            trend: Some(TrendReading {
                direction: TrendDirection::Up,
                strength: dec!(0.7),
            }),
            risk_off: false,
            session: SessionContext {
                is_open: true,
                minutes_to_close: Some(300),
            },
            calendar: vec![],
            as_of: at,
        },
        account: AccountContext {
            account_id: "paper-1".to_string(),
            equity: dec!(25000),
            buying_power: dec!(50000),
            daily_pnl: dec!(-120.50),
            unrealized_pnl: dec!(0),
            positions: vec![],
            as_of: at,
        },
        memory: AgentMemory::default(),
    }
}

pub(crate) fn record(symbol: &str, at: DateTime<Utc>) -> DecisionRecord {
    let id = Uuid::new_v4();
    let brains = vec![
        BrainOutput {
            brain_id: BrainId::Market,
            direction: Direction::Buy,
            confidence: dec!(0.8),
            rationale: "uptrend".to_string(),
            evidence: BTreeMap::from([("trend_strength".to_string(), serde_json::json!("0.7"))]),
        },
        BrainOutput::abstain(BrainId::Risk, "timed out"),
    ];
    let coordinator = CoordinatorOutput {
        brains: brains.clone(),
        consensus_direction: Direction::Buy,
        consensus_confidence: dec!(1),
        agreement_score: dec!(0.5),
        raw_winner: Direction::Buy,
        votes: VoteTally {
            buy: dec!(0.8),
            sell: dec!(0),
            flat: dec!(0),
        },
    };
    let proposal = TradeProposal {
        id,
        symbol: symbol.to_string(),
        timeframe: Timeframe::H1,
        direction: Direction::Buy,
        size: dec!(10000),
        risk_amount: dec!(73.2),
        entry: Some(dec!(1.08512)),
        stop: Some(dec!(1.07780)),
        target: Some(dec!(1.09976)),
        confidence: dec!(1),
        generated_at: at,
        mode: AgentMode::Paper,
        closes_position: false,
        holds_overnight: false,
    };
    DecisionRecord {
        id,
        timestamp: at,
        symbol: symbol.to_string(),
        context_snapshot: world_state(symbol, at),
        proposed_order: proposal,
        brains_output: brains,
        coordinator_output: coordinator,
        safety: SafetyResult {
            allowed: false,
            reasons: vec![
                "kill switch engaged".to_string(),
                "symbol not in allowed list".to_string(),
            ],
            flags: vec!["risk near per-trade limit".to_string()],
        },
        user_action: UserAction::Pending,
        user_notes: None,
        confidence: dec!(1),
        mode: AgentMode::Paper,
        result: None,
    }
}
