use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Duration, DurationRound, Months, Utc};
use serde::Serialize;

use crate::config::EnergyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergySample {
    pub timestamp: DateTime<Utc>,
    pub relay_on: bool,
    pub floor_temperature: Option<f32>,
    pub room_temperature: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyTemperature {
    pub hour_start: DateTime<Utc>,
    pub floor: Option<f32>,
    pub room: Option<f32>,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerUsageSnapshot {
    pub ratio_24h: Option<f64>,
    pub ratio_7d: Option<f64>,
    pub ratio_12mo: Option<f64>,
    pub hourly: Vec<HourlyTemperature>,
    pub current_power_watts: Option<u16>,
}

/// Instantaneous draw: the rated power while the relay is closed.
pub fn current_power(relay_on: bool, rated_watts: u16) -> u16 {
    if relay_on {
        rated_watts
    } else {
        0
    }
}

#[derive(Debug, Default)]
struct TemperatureSum {
    floor: f64,
    floor_count: usize,
    room: f64,
    room_count: usize,
    samples: usize,
}

impl TemperatureSum {
    fn mean(sum: f64, count: usize) -> Option<f32> {
        (count > 0).then(|| (sum / count as f64) as f32)
    }
}

/// Rolling buffer of relay and temperature samples, at most twelve calendar
/// months deep.
#[derive(Debug, Clone)]
pub struct EnergyAggregator {
    config: EnergyConfig,
    samples: VecDeque<EnergySample>,
}

impl EnergyAggregator {
    pub fn new(config: EnergyConfig) -> Self {
        Self {
            config,
            samples: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&EnergySample> {
        self.samples.back()
    }

    /// Inserts in timestamp order, then evicts anything older than twelve
    /// months before the newest sample.
    pub fn ingest(&mut self, sample: EnergySample) {
        let position = self
            .samples
            .partition_point(|existing| existing.timestamp <= sample.timestamp);
        self.samples.insert(position, sample);

        let Some(newest) = self.samples.back().map(|s| s.timestamp) else {
            return;
        };
        let Some(cutoff) = newest.checked_sub_months(Months::new(12)) else {
            return;
        };
        while self
            .samples
            .front()
            .is_some_and(|oldest| oldest.timestamp < cutoff)
        {
            self.samples.pop_front();
        }
    }

    /// Share of `[start, now]` the relay was on. Each sample's state holds
    /// until the next sample or `now`, capped by the configured gap.
    pub fn on_ratio(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> Option<f64> {
        if now <= start {
            return None;
        }
        let first = self.samples.partition_point(|s| s.timestamp < start);
        let last = self.samples.partition_point(|s| s.timestamp <= now);
        if first >= last {
            return None;
        }

        let max_gap = self
            .config
            .max_sample_gap_secs
            .map(|secs| Duration::seconds(secs as i64));
        let mut on = Duration::zero();
        for index in first..last {
            let sample = &self.samples[index];
            if !sample.relay_on {
                continue;
            }
            let until = self
                .samples
                .get(index + 1)
                .map_or(now, |next| next.timestamp)
                .min(now);
            let mut held = until - sample.timestamp;
            if let Some(gap) = max_gap {
                held = held.min(gap);
            }
            on += held;
        }

        let window = (now - start).num_milliseconds() as f64;
        Some((on.num_milliseconds() as f64 / window).clamp(0.0, 1.0))
    }

    /// Hourly mean temperatures over the last `history_hours`, oldest first.
    /// Hours without samples are omitted.
    pub fn hourly_series(&self, now: DateTime<Utc>) -> Vec<HourlyTemperature> {
        let hour = Duration::hours(1);
        let current_hour = now.duration_trunc(hour).unwrap_or(now);
        let first_hour = current_hour - Duration::hours(self.config.history_hours.saturating_sub(1) as i64);

        let mut buckets: BTreeMap<DateTime<Utc>, TemperatureSum> = BTreeMap::new();
        let from = self.samples.partition_point(|s| s.timestamp < first_hour);
        for sample in self.samples.range(from..).take_while(|s| s.timestamp <= now) {
            let Ok(start) = sample.timestamp.duration_trunc(hour) else {
                continue;
            };
            let sum = buckets.entry(start).or_default();
            sum.samples += 1;
            if let Some(floor) = sample.floor_temperature {
                sum.floor += floor as f64;
                sum.floor_count += 1;
            }
            if let Some(room) = sample.room_temperature {
                sum.room += room as f64;
                sum.room_count += 1;
            }
        }

        buckets
            .into_iter()
            .map(|(hour_start, sum)| HourlyTemperature {
                hour_start,
                floor: TemperatureSum::mean(sum.floor, sum.floor_count),
                room: TemperatureSum::mean(sum.room, sum.room_count),
                samples: sum.samples,
            })
            .collect()
    }

    pub fn snapshot(&self, now: DateTime<Utc>, rated_watts: Option<u16>) -> PowerUsageSnapshot {
        let year_ago = now
            .checked_sub_months(Months::new(12))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        PowerUsageSnapshot {
            ratio_24h: self.on_ratio(now - Duration::hours(24), now),
            ratio_7d: self.on_ratio(now - Duration::days(7), now),
            ratio_12mo: self.on_ratio(year_ago, now),
            hourly: self.hourly_series(now),
            current_power_watts: rated_watts
                .zip(self.latest())
                .map(|(rated, sample)| current_power(sample.relay_on, rated)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn sample(timestamp: DateTime<Utc>, relay_on: bool) -> EnergySample {
        EnergySample {
            timestamp,
            relay_on,
            floor_temperature: None,
            room_temperature: None,
        }
    }

    fn aggregator() -> EnergyAggregator {
        EnergyAggregator::new(EnergyConfig::default())
    }

    #[test]
    fn empty_buffer_is_unavailable() {
        let snapshot = aggregator().snapshot(utc(2025, 1, 10, 12, 0), Some(1200));
        assert_eq!(snapshot.ratio_24h, None);
        assert_eq!(snapshot.ratio_7d, None);
        assert_eq!(snapshot.ratio_12mo, None);
        assert!(snapshot.hourly.is_empty());
        assert_eq!(snapshot.current_power_watts, None);
    }

    #[test]
    fn half_day_on_is_fifty_percent() {
        let now = utc(2025, 1, 10, 12, 0);
        let mut energy = aggregator();
        for step in 0..144 {
            let at = now - Duration::hours(24) + Duration::minutes(10 * step);
            energy.ingest(sample(at, step < 72));
        }

        let snapshot = energy.snapshot(now, Some(1000));
        assert_eq!(snapshot.ratio_24h, Some(0.5));
        assert_eq!(snapshot.ratio_7d, Some(12.0 / 168.0));
        assert_eq!(snapshot.current_power_watts, Some(0));
    }

    #[test]
    fn last_sample_holds_until_now() {
        let now = utc(2025, 1, 10, 12, 0);
        let mut energy = aggregator();
        energy.ingest(sample(now - Duration::hours(24), true));
        energy.ingest(sample(now - Duration::hours(12), false));
        energy.ingest(sample(now - Duration::hours(6), true));
        assert_eq!(energy.on_ratio(now - Duration::hours(24), now), Some(0.75));
    }

    #[test]
    fn sample_gap_cap_limits_held_state() {
        let now = utc(2025, 1, 10, 12, 0);
        let mut energy = EnergyAggregator::new(EnergyConfig {
            max_sample_gap_secs: Some(3600),
            ..EnergyConfig::default()
        });
        energy.ingest(sample(now - Duration::hours(24), true));
        let ratio = energy.on_ratio(now - Duration::hours(24), now).unwrap();
        assert!((ratio - 1.0 / 24.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_order_samples_are_sorted() {
        let base = utc(2025, 1, 10, 0, 0);
        let mut energy = aggregator();
        energy.ingest(sample(base + Duration::minutes(20), true));
        energy.ingest(sample(base, false));
        energy.ingest(sample(base + Duration::minutes(10), true));

        let order: Vec<_> = energy.samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(
            order,
            vec![
                base,
                base + Duration::minutes(10),
                base + Duration::minutes(20)
            ]
        );
        assert_eq!(energy.latest().unwrap().timestamp, base + Duration::minutes(20));
    }

    #[test]
    fn samples_older_than_twelve_months_are_evicted() {
        let mut energy = aggregator();
        energy.ingest(sample(utc(2024, 1, 9, 12, 0), true));
        energy.ingest(sample(utc(2024, 1, 10, 12, 0), true));
        energy.ingest(sample(utc(2025, 1, 10, 12, 0), false));

        assert_eq!(energy.len(), 2);
        assert_eq!(energy.samples[0].timestamp, utc(2024, 1, 10, 12, 0));
    }

    #[test]
    fn hourly_series_averages_available_readings() {
        let now = utc(2025, 1, 10, 12, 30);
        let mut energy = aggregator();
        let reading = |at: DateTime<Utc>, floor: Option<f32>, room: Option<f32>| EnergySample {
            timestamp: at,
            relay_on: false,
            floor_temperature: floor,
            room_temperature: room,
        };
        energy.ingest(reading(utc(2025, 1, 2, 0, 0), Some(30.0), Some(30.0)));
        energy.ingest(reading(utc(2025, 1, 10, 11, 5), Some(24.0), Some(20.0)));
        energy.ingest(reading(utc(2025, 1, 10, 11, 50), Some(26.0), None));
        energy.ingest(reading(utc(2025, 1, 10, 12, 10), None, Some(21.0)));

        let series = energy.hourly_series(now);
        assert_eq!(
            series,
            vec![
                HourlyTemperature {
                    hour_start: utc(2025, 1, 10, 11, 0),
                    floor: Some(25.0),
                    room: Some(20.0),
                    samples: 2,
                },
                HourlyTemperature {
                    hour_start: utc(2025, 1, 10, 12, 0),
                    floor: None,
                    room: Some(21.0),
                    samples: 1,
                },
            ]
        );
    }

    #[test]
    fn current_power_is_rated_only_when_relay_is_on() {
        assert_eq!(current_power(true, 1500), 1500);
        assert_eq!(current_power(false, 1500), 0);
    }
}
