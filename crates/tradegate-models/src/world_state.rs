use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::brain::Direction;

/// Bar timeframe a proposal is evaluated on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1_440,
            Timeframe::W1 => 10_080,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            "1w" => Ok(Timeframe::W1),
            other => Err(format!("invalid timeframe '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Sideways,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendReading {
    pub direction: TrendDirection,
    /// 0.0 to 1.0.
    pub strength: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionContext {
    pub is_open: bool,
    /// Minutes until the session closes. None for markets that never close.
    pub minutes_to_close: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventImpact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEvent {
    pub name: String,
    pub impact: EventImpact,
    pub scheduled_at: DateTime<Utc>,
}

/// Market side of the snapshot for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketContext {
    pub price: Decimal,
    /// Typical bar range as a percentage of price.
    pub volatility_pct: Decimal,
    pub sma_20: Option<Decimal>,
    pub sma_50: Option<Decimal>,
    pub trend: Option<TrendReading>,
    #[serde(default)]
    pub risk_off: bool,
    pub session: SessionContext,
    #[serde(default)]
    pub calendar: Vec<CalendarEvent>,
    pub as_of: DateTime<Utc>,
}

impl MarketContext {
    /// High-impact events scheduled between `now` and `now + lookahead`.
    pub fn imminent_high_impact(
        &self,
        now: DateTime<Utc>,
        lookahead: Duration,
    ) -> Vec<&CalendarEvent> {
        self.calendar
            .iter()
            .filter(|e| e.impact == EventImpact::High)
            .filter(|e| e.scheduled_at >= now && e.scheduled_at <= now + lookahead)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub market_price: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Account side of the snapshot. Always read fresh from the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountContext {
    pub account_id: String,
    pub equity: Decimal,
    pub buying_power: Decimal,
    /// Realized P&L for the current trading day. Negative = loss.
    pub daily_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    #[serde(default)]
    pub positions: Vec<Position>,
    pub as_of: DateTime<Utc>,
}

impl AccountContext {
    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn position_for(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    /// Loss already realized today, as a non-negative amount.
    pub fn realized_loss(&self) -> Decimal {
        if self.daily_pnl.is_sign_negative() {
            -self.daily_pnl
        } else {
            Decimal::ZERO
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryItem {
    pub text: String,
    pub relevance: Decimal,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradeOutcome {
    Win,
    Loss,
    Breakeven,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecentTrade {
    pub symbol: String,
    pub direction: Direction,
    pub outcome: TradeOutcome,
    pub pnl: Option<Decimal>,
    pub closed_at: DateTime<Utc>,
}

/// Behavioral signals derived from the journal and recent decisions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PsychologySignals {
    pub loss_streak: u32,
    pub win_streak: u32,
    /// 0.0 to 1.0, None when no journal entry reports it.
    pub fatigue_score: Option<Decimal>,
    pub decisions_last_24h: u32,
    pub rejections_last_24h: u32,
    /// The trader habitually holds positions overnight.
    #[serde(default)]
    pub seeks_overnight: bool,
}

/// Retrieved lessons, playbook rules and journaled history relevant to a symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AgentMemory {
    #[serde(default)]
    pub lessons: Vec<MemoryItem>,
    #[serde(default)]
    pub rules: Vec<MemoryItem>,
    #[serde(default)]
    pub recent_trades: Vec<RecentTrade>,
    #[serde(default)]
    pub psychology: PsychologySignals,
}

impl AgentMemory {
    /// Fraction of recent trades on `symbol` that were wins. None without history.
    pub fn win_rate(&self, symbol: &str) -> Option<Decimal> {
        let trades: Vec<&RecentTrade> = self
            .recent_trades
            .iter()
            .filter(|t| t.symbol == symbol)
            .collect();
        if trades.is_empty() {
            return None;
        }
        let wins = trades
            .iter()
            .filter(|t| t.outcome == TradeOutcome::Win)
            .count();
        Some(Decimal::from(wins as u64) / Decimal::from(trades.len() as u64))
    }
}

/// What a market/account provider returns for one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldStateInputs {
    pub market: MarketContext,
    pub account: AccountContext,
}

/// Immutable point-in-time snapshot every brain evaluates against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldState {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub built_at: DateTime<Utc>,
    pub market: MarketContext,
    pub account: AccountContext,
    pub memory: AgentMemory,
}
