use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::debug;
use tradegate_models::brain::{BrainId, BrainOutput, CoordinatorOutput, Direction, VoteTally};
use tradegate_models::config::CoordinatorConfig;

const DIRECTIONS: [Direction; 3] = [Direction::Buy, Direction::Sell, Direction::Flat];

/// Weighted vote over the brain outputs.
pub struct Coordinator {
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config }
    }

    /// Combine brain outputs into one consensus.
    ///
    /// Each brain contributes `weight × confidence` to its direction. Vote
    /// masses within `tie_epsilon` of the leader make the raw winner FLAT.
    /// When the weight aligned with the raw winner falls below
    /// `agreement_threshold`, the consensus is FLAT and its confidence is
    /// FLAT's share of the vote mass.
    pub fn combine(
        &self,
        outputs: Vec<BrainOutput>,
        weights: &BTreeMap<BrainId, Decimal>,
    ) -> CoordinatorOutput {
        let total_weight: Decimal = weights.values().copied().sum();

        let mut votes = VoteTally::default();
        for out in &outputs {
            let weight = weights.get(&out.brain_id).copied().unwrap_or(Decimal::ZERO);
            votes.add(out.direction, weight * out.confidence);
        }

        let raw_winner = self.raw_winner(&votes);

        let aligned_weight: Decimal = outputs
            .iter()
            .filter(|o| o.direction == raw_winner)
            .map(|o| weights.get(&o.brain_id).copied().unwrap_or(Decimal::ZERO))
            .sum();
        let agreement_score = if total_weight > Decimal::ZERO {
            aligned_weight / total_weight
        } else {
            Decimal::ZERO
        };

        let consensus_direction = if agreement_score < self.config.agreement_threshold {
            Direction::Flat
        } else {
            raw_winner
        };

        let total_mass = votes.total();
        let consensus_confidence = if total_mass > Decimal::ZERO {
            votes.get(consensus_direction) / total_mass
        } else {
            Decimal::ZERO
        };

        debug!(
            raw_winner = %raw_winner,
            consensus = %consensus_direction,
            agreement = %agreement_score,
            "Votes combined"
        );

        CoordinatorOutput {
            brains: outputs,
            consensus_direction,
            consensus_confidence,
            agreement_score,
            raw_winner,
            votes,
        }
    }

    fn raw_winner(&self, votes: &VoteTally) -> Direction {
        let leader = DIRECTIONS
            .iter()
            .map(|d| votes.get(*d))
            .max()
            .unwrap_or(Decimal::ZERO);
        let contenders: Vec<Direction> = DIRECTIONS
            .into_iter()
            .filter(|d| leader - votes.get(*d) <= self.config.tie_epsilon)
            .collect();
        match contenders.as_slice() {
            [only] => *only,
            _ => Direction::Flat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn vote(id: BrainId, direction: Direction, confidence: Decimal) -> BrainOutput {
        BrainOutput {
            brain_id: id,
            direction,
            confidence,
            rationale: String::new(),
            evidence: BTreeMap::new(),
        }
    }

    fn equal_weights() -> BTreeMap<BrainId, Decimal> {
        BrainId::ALL.into_iter().map(|id| (id, Decimal::ONE)).collect()
    }

    fn coordinator() -> Coordinator {
        Coordinator::new(CoordinatorConfig::default())
    }

    #[test]
    fn majority_buy_wins() {
        let out = coordinator().combine(
            vec![
                vote(BrainId::Market, Direction::Buy, dec!(0.8)),
                vote(BrainId::Risk, Direction::Buy, dec!(0.6)),
                vote(BrainId::Psychology, Direction::Flat, dec!(0.3)),
            ],
            &equal_weights(),
        );
        assert_eq!(out.consensus_direction, Direction::Buy);
        assert_eq!(out.votes.buy, dec!(1.4));
        assert_eq!(out.agreement_score.round_dp(2), dec!(0.67));
        assert_eq!(out.consensus_confidence, dec!(1.4) / dec!(1.7));
    }

    #[test]
    fn low_agreement_forces_flat() {
        let config = CoordinatorConfig {
            agreement_threshold: dec!(0.6),
            ..Default::default()
        };
        let out = Coordinator::new(config).combine(
            vec![
                vote(BrainId::Market, Direction::Buy, dec!(0.9)),
                vote(BrainId::Risk, Direction::Sell, dec!(0.2)),
                vote(BrainId::Psychology, Direction::Flat, dec!(0.3)),
            ],
            &equal_weights(),
        );
        assert_eq!(out.raw_winner, Direction::Buy);
        assert!(out.agreement_score < dec!(0.6));
        assert_eq!(out.consensus_direction, Direction::Flat);
        assert_eq!(out.consensus_confidence, dec!(0.3) / dec!(1.4));
    }

    #[test]
    fn every_low_agreement_ensemble_is_flat() {
        let directions = [Direction::Buy, Direction::Sell, Direction::Flat];
        let confidences = [dec!(0.1), dec!(0.5), dec!(0.95)];
        let config = CoordinatorConfig {
            agreement_threshold: dec!(0.7),
            ..Default::default()
        };
        let coordinator = Coordinator::new(config);
        let mut below_threshold = 0;

        let mut ensembles = Vec::new();
        for market in directions {
            for risk in directions {
                for psychology in directions {
                    for mc in confidences {
                        for rc in confidences {
                            for pc in confidences {
                                ensembles.push([(market, mc), (risk, rc), (psychology, pc)]);
                            }
                        }
                    }
                }
            }
        }

        for [(market, mc), (risk, rc), (psychology, pc)] in ensembles {
            let out = coordinator.combine(
                vec![
                    vote(BrainId::Market, market, mc),
                    vote(BrainId::Risk, risk, rc),
                    vote(BrainId::Psychology, psychology, pc),
                ],
                &equal_weights(),
            );
            if out.agreement_score < dec!(0.7) {
                below_threshold += 1;
                assert_eq!(
                    out.consensus_direction,
                    Direction::Flat,
                    "{market}@{mc} {risk}@{rc} {psychology}@{pc}"
                );
            }
        }
        assert!(below_threshold > 0);
    }

    #[test]
    fn near_tie_prefers_flat() {
        let out = coordinator().combine(
            vec![
                vote(BrainId::Market, Direction::Buy, dec!(0.700)),
                vote(BrainId::Risk, Direction::Sell, dec!(0.695)),
            ],
            &equal_weights(),
        );
        assert_eq!(out.raw_winner, Direction::Flat);
        assert_eq!(out.consensus_direction, Direction::Flat);
    }

    #[test]
    fn weights_scale_votes() {
        let weights = BTreeMap::from([
            (BrainId::Market, dec!(3)),
            (BrainId::Risk, dec!(1)),
            (BrainId::Psychology, dec!(1)),
        ]);
        let out = coordinator().combine(
            vec![
                vote(BrainId::Market, Direction::Sell, dec!(0.5)),
                vote(BrainId::Risk, Direction::Buy, dec!(0.9)),
                vote(BrainId::Psychology, Direction::Flat, dec!(0.3)),
            ],
            &weights,
        );
        assert_eq!(out.votes.sell, dec!(1.5));
        assert_eq!(out.consensus_direction, Direction::Sell);
        assert_eq!(out.agreement_score, dec!(0.6));
    }

    #[test]
    fn all_abstentions_are_flat_with_zero_confidence() {
        let out = coordinator().combine(
            BrainId::ALL
                .into_iter()
                .map(|id| BrainOutput::abstain(id, "timed out"))
                .collect(),
            &equal_weights(),
        );
        assert_eq!(out.consensus_direction, Direction::Flat);
        assert_eq!(out.consensus_confidence, Decimal::ZERO);
    }
}
