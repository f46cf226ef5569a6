//! Profit-maximizing O-D matching engine
//!
//! For each origin, every destination with complete price data for the
//! period is evaluated and the strictly most profitable one is kept. The
//! running best starts at zero, so an origin whose best option does not make
//! money produces no record. Ties keep the first destination in input order.
//!
//! Origins are independent: each origin's full destination scan is one
//! future, and up to `max_concurrent` of them run at once. That width is also
//! the cap on in-flight routing requests. Output order follows input order.

use crate::income::Quote;
use crate::profit::profit;
use crate::routing::{DistanceResolver, DistanceSource, RoadRouter};
use crate::{DestinationPoint, MatchRecord, OriginPoint, PeriodKind};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Counters for one period run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchStats {
    pub origins_evaluated: usize,
    pub records_emitted: usize,
    /// Origins with no complete or no profitable destination
    pub origins_dropped: usize,
    /// Destinations skipped for missing or unparseable price data
    pub candidates_skipped: usize,
    pub pairs_evaluated: usize,
    pub straight_line_fallbacks: usize,
}

/// Result of matching all origins for one period
#[derive(Debug, Clone)]
pub struct PeriodOutcome {
    pub period: PeriodKind,
    pub records: Vec<MatchRecord>,
    pub stats: MatchStats,
}

/// Running best candidate for one origin
#[derive(Debug)]
struct Best {
    profit: f64,
    record: Option<MatchRecord>,
    evaluated: usize,
    fallbacks: usize,
}

impl Best {
    fn new() -> Self {
        Self {
            profit: 0.0,
            record: None,
            evaluated: 0,
            fallbacks: 0,
        }
    }

    /// Replace the candidate only on a strictly higher profit
    fn offer(&mut self, profit: f64, build: impl FnOnce() -> MatchRecord) {
        if profit > self.profit {
            self.profit = profit;
            self.record = Some(build());
        }
    }
}

pub struct Matcher<R> {
    resolver: DistanceResolver<R>,
    max_concurrent: usize,
}

impl<R: RoadRouter> Matcher<R> {
    pub fn new(resolver: DistanceResolver<R>, max_concurrent: usize) -> Self {
        Self {
            resolver,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Match every origin to its most profitable destination for `period`
    pub async fn match_period(
        &self,
        origins: &[OriginPoint],
        destinations: &[DestinationPoint],
        period: PeriodKind,
    ) -> PeriodOutcome {
        info!(
            "Matching {} origins against {} destinations for {}",
            origins.len(),
            destinations.len(),
            period
        );

        let (candidates, skipped) = priced_candidates(destinations, period);
        let candidates = candidates.as_slice();

        let total = origins.len();
        let outcomes: Vec<Best> = stream::iter(origins.iter().enumerate())
            .map(|(i, origin)| async move {
                info!("Evaluating origin {} of {} ({})", i + 1, total, origin.id);
                self.best_for_origin(origin, candidates, period).await
            })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let mut stats = MatchStats {
            origins_evaluated: total,
            candidates_skipped: skipped,
            ..MatchStats::default()
        };
        let mut records = Vec::with_capacity(total);

        for best in outcomes {
            stats.pairs_evaluated += best.evaluated;
            stats.straight_line_fallbacks += best.fallbacks;
            match best.record {
                Some(record) => records.push(record),
                None => stats.origins_dropped += 1,
            }
        }
        stats.records_emitted = records.len();

        info!(
            "{}: {} records, {} origins dropped, {} straight-line fallbacks",
            period, stats.records_emitted, stats.origins_dropped, stats.straight_line_fallbacks
        );

        PeriodOutcome {
            period,
            records,
            stats,
        }
    }

    /// Full destination scan for one origin
    async fn best_for_origin(
        &self,
        origin: &OriginPoint,
        candidates: &[(&DestinationPoint, Quote)],
        period: PeriodKind,
    ) -> Best {
        let mut best = Best::new();

        for (destination, quote) in candidates {
            let distance = self.resolver.resolve(origin, destination).await;
            if distance.source == DistanceSource::StraightLine {
                best.fallbacks += 1;
            }
            best.evaluated += 1;

            let candidate_profit = profit(distance.miles, origin.volume_bu, quote, period);
            best.offer(candidate_profit, || {
                build_record(origin, destination, quote.clone(), distance.miles, distance.source, candidate_profit, period)
            });
        }

        if best.record.is_none() {
            debug!("No profitable destination for origin {}", origin.id);
        }

        best
    }
}

/// Destinations with complete price data for `period`, paired with their
/// quote. Incomplete ones are logged once here rather than once per origin.
fn priced_candidates(destinations: &[DestinationPoint], period: PeriodKind) -> (Vec<(&DestinationPoint, Quote)>, usize) {
    let mut candidates = Vec::with_capacity(destinations.len());
    let mut skipped = 0;

    for destination in destinations {
        match Quote::for_destination(destination, period) {
            Some(Ok(quote)) => candidates.push((destination, quote)),
            Some(Err(e)) => {
                warn!("Skipping {} for {}: {}", destination.display_name(), period, e);
                skipped += 1;
            }
            None => {
                debug!(
                    "Skipping {}: no {} price/basis",
                    destination.display_name(),
                    period
                );
                skipped += 1;
            }
        }
    }

    (candidates, skipped)
}

fn build_record(
    origin: &OriginPoint,
    destination: &DestinationPoint,
    quote: Quote,
    distance_mi: f64,
    distance_source: DistanceSource,
    profit: f64,
    period: PeriodKind,
) -> MatchRecord {
    let destination_name = destination.display_name();
    MatchRecord {
        period,
        origin_id: origin.id.clone(),
        volume_bu: origin.volume_bu,
        volume_tons: period.tons(origin.volume_bu),
        origin_xy: origin.location,
        od_name: format!("{} - {}", origin.id, destination_name),
        destination_name,
        destination_city: destination.city.clone(),
        destination_type: destination.kind.clone(),
        destination_xy: destination.location,
        price: quote.price,
        basis: quote.basis,
        distance_mi,
        distance_source,
        profit,
    }
}
