use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What one cycle did, reported by the orchestrator when it returns to idle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle: u64,
    pub symbols_scanned: usize,
    pub quotes_succeeded: usize,
    pub quotes_failed: usize,
    pub candidates: usize,
    pub published: usize,
    pub persist_dropped: usize,
    pub quotes_missing: usize,
    pub deadline_hit: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleMetrics {
    pub started_at: DateTime<Utc>,
    pub total_cycles_completed: u64,
    pub total_opportunities_published: u64,
    pub cycles_over_deadline: u64,
    pub last_cycle: Option<CycleSummary>,
    pub average_cycle_ms: f64,
    pub exchange_performance: BTreeMap<String, ExchangeMetrics>,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExchangeMetrics {
    pub successful_quotes: u64,
    pub failed_quotes: u64,
    pub times_cheapest: u64,
    pub times_dearest: u64,
}

impl CycleMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            total_cycles_completed: 0,
            total_opportunities_published: 0,
            cycles_over_deadline: 0,
            last_cycle: None,
            average_cycle_ms: 0.0,
            exchange_performance: BTreeMap::new(),
            error_count: 0,
            last_error: None,
            last_updated: Utc::now(),
        }
    }

    pub fn update_cycle_metrics(&mut self, summary: CycleSummary) {
        self.total_cycles_completed += 1;
        self.total_opportunities_published += summary.published as u64;
        if summary.deadline_hit {
            self.cycles_over_deadline += 1;
        }

        let total_time = self.average_cycle_ms * (self.total_cycles_completed - 1) as f64;
        self.average_cycle_ms = (total_time + summary.duration_ms as f64) / self.total_cycles_completed as f64;

        self.last_cycle = Some(summary);
        self.last_updated = Utc::now();
    }

    pub fn update_exchange_metrics(&mut self, exchange_id: &str, success: bool) {
        let metrics = self.exchange_performance.entry(exchange_id.to_string()).or_default();
        if success {
            metrics.successful_quotes += 1;
        } else {
            metrics.failed_quotes += 1;
        }
    }

    pub fn record_sides(&mut self, cheapest: &str, dearest: &str) {
        self.exchange_performance.entry(cheapest.to_string()).or_default().times_cheapest += 1;
        self.exchange_performance.entry(dearest.to_string()).or_default().times_dearest += 1;
    }

    pub fn record_error(&mut self, error_message: &str) {
        self.error_count += 1;
        self.last_error = Some(error_message.to_string());
        self.last_updated = Utc::now();
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Spot Arbitrage Metrics ===\n");
        report.push_str(&format!("Uptime: {} seconds\n", self.uptime_seconds()));
        report.push_str(&format!("Total Cycles: {}\n", self.total_cycles_completed));
        report.push_str(&format!("Opportunities Published: {}\n", self.total_opportunities_published));
        report.push_str(&format!("Cycles Over Deadline: {}\n", self.cycles_over_deadline));
        report.push_str(&format!("Average Cycle: {:.0}ms\n", self.average_cycle_ms));
        report.push_str(&format!("Error Count: {}\n", self.error_count));

        if let Some(ref error) = self.last_error {
            report.push_str(&format!("Last Error: {}\n", error));
        }

        report.push_str("\n=== Exchange Performance ===\n");
        for (exchange_id, metrics) in &self.exchange_performance {
            let total = metrics.successful_quotes + metrics.failed_quotes;
            report.push_str(&format!(
                "{}: {}/{} quotes ok ({:.1}%), cheapest {} times, dearest {} times\n",
                exchange_id,
                metrics.successful_quotes,
                total,
                if total > 0 {
                    metrics.successful_quotes as f64 / total as f64 * 100.0
                } else {
                    0.0
                },
                metrics.times_cheapest,
                metrics.times_dearest
            ));
        }

        report
    }
}

impl Default for CycleMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_averages() {
        let mut metrics = CycleMetrics::new();
        metrics.update_cycle_metrics(CycleSummary {
            cycle: 1,
            published: 3,
            duration_ms: 100,
            ..Default::default()
        });
        metrics.update_cycle_metrics(CycleSummary {
            cycle: 2,
            published: 1,
            duration_ms: 300,
            deadline_hit: true,
            ..Default::default()
        });

        assert_eq!(metrics.total_cycles_completed, 2);
        assert_eq!(metrics.total_opportunities_published, 4);
        assert_eq!(metrics.cycles_over_deadline, 1);
        assert!((metrics.average_cycle_ms - 200.0).abs() < f64::EPSILON);
        assert_eq!(metrics.last_cycle.as_ref().map(|c| c.cycle), Some(2));
    }

    #[test]
    fn test_exchange_metrics_and_report() {
        let mut metrics = CycleMetrics::new();
        metrics.update_exchange_metrics("binance", true);
        metrics.update_exchange_metrics("binance", false);
        metrics.record_sides("binance", "kucoin");
        metrics.record_error("kucoin unreachable");

        let binance = &metrics.exchange_performance["binance"];
        assert_eq!(binance.successful_quotes, 1);
        assert_eq!(binance.failed_quotes, 1);
        assert_eq!(binance.times_cheapest, 1);
        assert_eq!(metrics.exchange_performance["kucoin"].times_dearest, 1);

        let report = metrics.generate_report();
        assert!(report.contains("binance: 1/2 quotes ok (50.0%)"));
        assert!(report.contains("Last Error: kucoin unreachable"));
        assert!(serde_json::to_value(&metrics).is_ok());
    }
}
