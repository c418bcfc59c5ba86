//! Attribution models over a time-ordered touchpoint list. Every non-empty
//! result sums to 100.

use chrono::{DateTime, Utc};
use insights_core::types::{AttributionWeights, ChannelWeights, Touchpoint};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

pub fn first_touch(touchpoints: &[Touchpoint]) -> ChannelWeights {
    touchpoints
        .first()
        .map(|t| ChannelWeights::from([(t.channel(), 100.0)]))
        .unwrap_or_default()
}

pub fn last_touch(touchpoints: &[Touchpoint]) -> ChannelWeights {
    touchpoints
        .last()
        .map(|t| ChannelWeights::from([(t.channel(), 100.0)]))
        .unwrap_or_default()
}

/// Equal credit per touchpoint, summed per channel.
pub fn linear(touchpoints: &[Touchpoint]) -> ChannelWeights {
    if touchpoints.is_empty() {
        return ChannelWeights::new();
    }
    let share = 100.0 / touchpoints.len() as f64;
    let mut weights = ChannelWeights::new();
    for t in touchpoints {
        *weights.entry(t.channel()).or_insert(0.0) += share;
    }
    weights
}

/// Credit proportional to `exp(-age_days / decay_days)`, normalised to 100.
/// Touchpoints timestamped after `now` count as age zero.
pub fn time_decay(touchpoints: &[Touchpoint], now: DateTime<Utc>, decay_days: f64) -> ChannelWeights {
    if touchpoints.is_empty() {
        return ChannelWeights::new();
    }
    let decay_days = if decay_days > 0.0 { decay_days } else { 7.0 };
    let raw: Vec<(String, f64)> = touchpoints
        .iter()
        .map(|t| {
            let age_days =
                ((now - t.timestamp).num_milliseconds() as f64 / MILLIS_PER_DAY).max(0.0);
            (t.channel(), (-age_days / decay_days).exp())
        })
        .collect();

    let total: f64 = raw.iter().map(|(_, w)| w).sum();
    if total <= 0.0 || !total.is_finite() {
        // Every weight underflowed; fall back to equal credit.
        return linear(touchpoints);
    }
    let mut weights = ChannelWeights::new();
    for (channel, w) in raw {
        *weights.entry(channel).or_insert(0.0) += w / total * 100.0;
    }
    weights
}

pub fn compute_weights(
    touchpoints: &[Touchpoint],
    now: DateTime<Utc>,
    decay_days: f64,
) -> AttributionWeights {
    AttributionWeights {
        first_touch: first_touch(touchpoints),
        last_touch: last_touch(touchpoints),
        linear: linear(touchpoints),
        time_decay: time_decay(touchpoints, now, decay_days),
    }
}
