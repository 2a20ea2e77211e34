//! Price and supply curves for the auction view.
//!
//! Everything here is pure display math over `f64`. Nothing derived from a
//! chart is ever used to decide whether a bid is valid; the contract's
//! `getPrice` is the only authority.

use dutch_types::{u256_to_f64, AuctionParameters};
use serde::Serialize;

/// Inputs of the chart, in display units.
#[derive(Clone, Debug, PartialEq)]
pub struct ChartInput {
    pub start_price: f64,
    /// Used as the floor when the auction has no reserve
    pub end_price: f64,
    pub duration_hours: f64,
    pub initial_token_supply: f64,
    pub reserve_price: f64,
}

impl ChartInput {
    /// Build chart input from contract parameters.
    ///
    /// Without a separate end price the reserve doubles as the end of the curve.
    pub fn from_parameters(params: &AuctionParameters) -> Self {
        let reserve = u256_to_f64(params.reserve_price);
        Self {
            start_price: u256_to_f64(params.start_price),
            end_price: reserve,
            duration_hours: params.duration_secs() as f64 / 3600.0,
            initial_token_supply: u256_to_f64(params.initial_token_supply),
            reserve_price: reserve,
        }
    }

    /// Price the curve converges to.
    pub fn target_price(&self) -> f64 {
        if self.reserve_price > 0.0 {
            self.reserve_price
        } else {
            self.end_price
        }
    }

    fn is_degenerate(&self) -> bool {
        self.duration_hours <= 0.0 || !self.duration_hours.is_finite()
    }
}

/// How the price falls over time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DecayModel {
    /// Straight line from the start price to the target at expiry.
    Linear,
    /// What the contract computes: `start - rate * elapsed`, floored at the target.
    DiscountRate { per_second: f64 },
}

impl DecayModel {
    pub fn from_parameters(params: &AuctionParameters) -> Self {
        Self::DiscountRate {
            per_second: u256_to_f64(params.discount_rate),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PricePoint {
    pub time_hours: f64,
    pub price: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SupplyPoint {
    pub time_hours: f64,
    /// Tokens sold by `time_hours`
    pub sold: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ChartData {
    pub price_points: Vec<PricePoint>,
    pub supply_points: Vec<SupplyPoint>,
}

impl ChartData {
    /// Replace the projected supply at `time_hours` with an observation.
    ///
    /// Points stay sorted by time; an observation at an existing sample time
    /// overwrites that sample.
    pub fn record_supply(&mut self, time_hours: f64, tokens_left: f64, initial_supply: f64) {
        let point = SupplyPoint {
            time_hours,
            sold: (initial_supply - tokens_left).max(0.0),
        };
        match self
            .supply_points
            .iter()
            .position(|p| p.time_hours >= time_hours)
        {
            Some(i) if (self.supply_points[i].time_hours - time_hours).abs() < 1e-9 => {
                self.supply_points[i] = point
            }
            Some(i) => self.supply_points.insert(i, point),
            None => self.supply_points.push(point),
        }
    }
}

/// Price at `time_hours` after the start.
pub fn price_at(input: &ChartInput, model: DecayModel, time_hours: f64) -> f64 {
    let target = input.target_price();
    let t = time_hours.max(0.0);
    let price = match model {
        DecayModel::Linear => {
            if input.is_degenerate() {
                return input.start_price;
            }
            if t >= input.duration_hours {
                return target;
            }
            let drop = (input.start_price - target) * (t / input.duration_hours);
            input.start_price - drop
        }
        DecayModel::DiscountRate { per_second } => input.start_price - per_second * t * 3600.0,
    };
    if input.start_price >= target {
        price.max(target)
    } else {
        price
    }
}

/// Sample both curves at `steps + 1` evenly spaced times.
pub fn derive_chart(input: &ChartInput, model: DecayModel, steps: usize) -> ChartData {
    if steps == 0 || input.is_degenerate() {
        return ChartData {
            price_points: vec![PricePoint {
                time_hours: 0.0,
                price: input.start_price,
            }],
            supply_points: Vec::new(),
        };
    }

    let mut data = ChartData::default();
    for i in 0..=steps {
        let time_hours = if i == steps {
            input.duration_hours
        } else {
            input.duration_hours * i as f64 / steps as f64
        };
        data.price_points.push(PricePoint {
            time_hours,
            price: price_at(input, model, time_hours),
        });
        data.supply_points.push(SupplyPoint {
            time_hours,
            sold: input.initial_token_supply * time_hours / input.duration_hours,
        });
    }
    data
}
