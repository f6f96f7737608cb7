use std::fmt::Write;

use chrono::{DateTime, Local};

use super::dashboard::sort::{pub_date_timestamp, SortOrder};
use super::dashboard::DashboardSnapshot;
use super::feed::types::{Geo, TrendItem};

const HEADLINES_PER_TREND: usize = 2;

pub fn status_badge(snapshot: &DashboardSnapshot) -> &'static str {
    if snapshot.is_live {
        "Live Feed"
    } else {
        "Offline Mode"
    }
}

/// Plain-text dashboard: status line, optional notice, then one column per geo.
pub fn render_dashboard(snapshot: &DashboardSnapshot, order: SortOrder) -> String {
    let view = snapshot.sorted(order);
    let mut out = String::new();

    let updated = view
        .last_updated
        .map(|timestamp| {
            timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "never".to_string());
    let _ = write!(
        out,
        "[{}] updated {updated} | sorted {}",
        status_badge(&view),
        order.label()
    );
    if view.loading {
        out.push_str(" | Loading…");
    }
    out.push('\n');

    if let Some(message) = &view.error_message {
        let _ = writeln!(out, "! {message}");
    }

    for geo in Geo::ALL {
        let items = view.items(geo);
        let _ = writeln!(
            out,
            "\n== {} ({}) | {} trends ==",
            geo.label(),
            geo.code(),
            items.len()
        );
        if items.is_empty() {
            out.push_str("   no trends yet\n");
        }
        for (rank, item) in items.iter().enumerate() {
            render_trend(&mut out, rank + 1, item);
        }
    }

    out
}

fn render_trend(out: &mut String, rank: usize, item: &TrendItem) {
    let traffic = if item.traffic.is_empty() {
        "?"
    } else {
        item.traffic.as_str()
    };
    let _ = writeln!(
        out,
        "{rank:>3}. {}  [{traffic}]  {}",
        item.title,
        display_date(&item.pub_date)
    );
    if let Some(source) = &item.picture_source {
        let _ = writeln!(out, "     picture: {source}");
    }
    for news in item.news_items.iter().take(HEADLINES_PER_TREND) {
        if news.source.is_empty() {
            let _ = writeln!(out, "     - {}", news.title);
        } else {
            let _ = writeln!(out, "     - {} ({})", news.title, news.source);
        }
    }
}

fn display_date(raw: &str) -> String {
    match pub_date_timestamp(raw) {
        0 => "date unknown".to_string(),
        secs => DateTime::from_timestamp(secs, 0)
            .map(|timestamp| {
                timestamp
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M")
                    .to_string()
            })
            .unwrap_or_else(|| raw.to_string()),
    }
}
