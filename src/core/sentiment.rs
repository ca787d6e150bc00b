use super::types::{Impact, NewsItem, Sentiment};

const MAX_IMPACT_WEIGHT: f64 = 1.5;

fn direction(sentiment: Sentiment) -> f64 {
    match sentiment {
        Sentiment::Positive => 1.0,
        Sentiment::Neutral => 0.0,
        Sentiment::Negative => -1.0,
    }
}

fn impact_weight(impact: Impact) -> f64 {
    match impact {
        Impact::Low => 0.5,
        Impact::Medium => 1.0,
        Impact::High => MAX_IMPACT_WEIGHT,
    }
}

/// Impact-weighted mean sentiment in `[-1, 1]`. An empty feed is exactly neutral.
pub fn tilt(news: &[NewsItem]) -> f64 {
    if news.is_empty() {
        return 0.0;
    }
    let weighted: f64 = news
        .iter()
        .map(|item| direction(item.sentiment) * impact_weight(item.impact))
        .sum();
    (weighted / (news.len() as f64 * MAX_IMPACT_WEIGHT)).clamp(-1.0, 1.0)
}

/// Additive return view, never below `floor`.
pub fn adjust_return(mu: f64, tilt: f64, scale: f64, floor: f64) -> f64 {
    let adjusted = mu + tilt * scale;
    if adjusted.is_nan() {
        floor
    } else {
        adjusted.max(floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    fn item(sentiment: Sentiment, impact: Impact) -> NewsItem {
        NewsItem {
            headline: String::new(),
            sentiment,
            impact,
        }
    }

    #[test]
    fn empty_feed_is_exactly_neutral() {
        assert_eq!(tilt(&[]), 0.0);
    }

    #[test]
    fn unanimous_high_impact_news_saturates() {
        let bull = vec![item(Sentiment::Positive, Impact::High); 4];
        let bear = vec![item(Sentiment::Negative, Impact::High); 4];
        assert_eq!(tilt(&bull), 1.0);
        assert_eq!(tilt(&bear), -1.0);
    }

    #[test]
    fn mixed_feed_is_weighted_by_impact() {
        let news = vec![
            item(Sentiment::Positive, Impact::High),
            item(Sentiment::Negative, Impact::Low),
            item(Sentiment::Neutral, Impact::Medium),
        ];
        // (1.5 - 0.5 + 0) / (3 * 1.5)
        assert!((tilt(&news) - 1.0 / 4.5).abs() < 1e-12);
    }

    #[test]
    fn adjusted_return_respects_floor() {
        assert!((adjust_return(0.10, 0.5, 0.02, 0.05) - 0.11).abs() < 1e-12);
        assert_eq!(adjust_return(0.05, -1.0, 0.02, 0.05), 0.05);
        assert_eq!(adjust_return(f64::NAN, 0.0, 0.02, 0.05), 0.05);
    }

    proptest! {
        #[test]
        fn prop_tilt_is_bounded(codes in proptest::collection::vec((0u8..3, 0u8..3), 0..40)) {
            let news: Vec<NewsItem> = codes
                .into_iter()
                .map(|(s, i)| {
                    let sentiment = match s {
                        0 => Sentiment::Positive,
                        1 => Sentiment::Neutral,
                        _ => Sentiment::Negative,
                    };
                    let impact = match i {
                        0 => Impact::Low,
                        1 => Impact::Medium,
                        _ => Impact::High,
                    };
                    item(sentiment, impact)
                })
                .collect();
            let t = tilt(&news);
            prop_assert!((-1.0..=1.0).contains(&t));
        }
    }
}
