//! Metric detection from question text

use super::MetricKind;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Checked in this order; the caller applies the first match.
    static ref VOCABULARY: Vec<(MetricKind, Regex)> = vec![
        (
            MetricKind::Cagr,
            Regex::new(
                r"(?i)\bcagr\b|\bcompound(ed)? annual growth|\bannuali[sz]ed growth|\bgrowth rate\b",
            )
            .unwrap(),
        ),
        (
            MetricKind::Aov,
            Regex::new(
                r"(?i)\baov\b|\bav(era)?g(e)?\.? order (value|size)\b|\baverage (basket|ticket|transaction) (value|size)\b|\b(revenue|sales|spend) per order\b",
            )
            .unwrap(),
        ),
        (
            MetricKind::Growth,
            Regex::new(
                r"(?i)\bgrowth\b|\bgr[eo]w(s|n|ing)?\b|\bincrease[sd]?\b|\bdecrease[sd]?\b|\bdecline[sd]?\b|\byear[- ]over[- ]year\b|\byoy\b",
            )
            .unwrap(),
        ),
        (
            MetricKind::Share,
            Regex::new(
                r"(?i)\bshare\b|\bpercentage\b|\bpercent of\b|\bcontribut(ion|ions|e|es|ed)\b|\bportion\b|% of\b",
            )
            .unwrap(),
        ),
        (
            MetricKind::Ratio,
            Regex::new(r"(?i)\bratio\b|\bproportion\b|\bper\b|\brelative to\b").unwrap(),
        ),
    ];
}

/// Every metric kind the question asks for, in priority order.
pub fn detect_requested_metrics(question: &str) -> Vec<MetricKind> {
    VOCABULARY
        .iter()
        .filter(|(_, re)| re.is_match(question))
        .map(|(kind, _)| *kind)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_metric_questions() {
        assert_eq!(
            detect_requested_metrics("What was the CAGR of sales from 2023 to 2024?"),
            vec![MetricKind::Cagr]
        );
        assert_eq!(
            detect_requested_metrics("What is our average order value?"),
            vec![MetricKind::Aov]
        );
        assert_eq!(
            detect_requested_metrics("How much did revenue increase last year?"),
            vec![MetricKind::Growth]
        );
        assert_eq!(
            detect_requested_metrics("What share of sales comes from each region?"),
            vec![MetricKind::Share]
        );
        assert_eq!(
            detect_requested_metrics("What is the ratio of returns to orders?"),
            vec![MetricKind::Ratio]
        );
    }

    #[test]
    fn test_growth_rate_prefers_cagr() {
        let kinds = detect_requested_metrics("What is the growth rate of sales?");
        assert_eq!(kinds.first(), Some(&MetricKind::Cagr));
        assert!(kinds.contains(&MetricKind::Growth));
    }

    #[test]
    fn test_per_is_a_whole_word() {
        assert!(detect_requested_metrics("Show sales by period").is_empty());
        assert_eq!(
            detect_requested_metrics("revenue per order in 2024"),
            vec![MetricKind::Aov, MetricKind::Ratio]
        );
    }

    #[test]
    fn test_no_metric() {
        assert!(detect_requested_metrics("List all stores in Ohio").is_empty());
    }
}
