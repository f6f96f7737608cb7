use roxmltree::{Document, Node};
use sha2::{Digest, Sha256};

use super::types::{NewsItem, TrendItem};

/// Parses a Google Trends RSS document into trend entries, in document order.
///
/// Never fails: a document that is not well-formed XML, or that carries no
/// `<item>` elements, yields an empty vector. Missing optional fields come
/// back as `None`; missing required text comes back empty.
pub fn parse_trends(xml: &str) -> Vec<TrendItem> {
    let doc = match Document::parse(xml.trim_start()) {
        Ok(doc) => doc,
        Err(error) => {
            tracing::warn!(error = %error, "trend feed is not well-formed xml");
            return Vec::new();
        }
    };

    doc.descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "item")
        .enumerate()
        .map(|(index, node)| trend_from_item(index, node))
        .collect()
}

fn trend_from_item(index: usize, item: Node<'_, '_>) -> TrendItem {
    let title = child_text(item, "title").unwrap_or_default();
    let news_items = item
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "news_item")
        .map(news_from_node)
        .collect();

    TrendItem {
        id: build_trend_id(index, &title),
        traffic: child_text(item, "approx_traffic").unwrap_or_default(),
        pub_date: child_text(item, "pubDate").unwrap_or_default(),
        main_picture: child_text(item, "picture"),
        picture_source: child_text(item, "picture_source"),
        news_items,
        title,
    }
}

fn news_from_node(node: Node<'_, '_>) -> NewsItem {
    NewsItem {
        title: child_text(node, "news_item_title").unwrap_or_default(),
        url: child_text(node, "news_item_url").unwrap_or_default(),
        source: child_text(node, "news_item_source").unwrap_or_default(),
        image_url: child_text(node, "news_item_picture"),
    }
}

/// Trimmed text of the first direct child with the given local name.
/// Prefixes like `ht:` are ignored so namespace URI changes upstream do not matter.
fn child_text(parent: Node<'_, '_>, local_name: &str) -> Option<String> {
    parent
        .children()
        .find(|node| node.is_element() && node.tag_name().name() == local_name)
        .map(|node| {
            node.descendants()
                .filter(|child| child.is_text())
                .filter_map(|child| child.text())
                .collect::<String>()
        })
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

pub fn build_trend_id(index: usize, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    let digest = hasher.finalize();
    let short: String = digest
        .iter()
        .take(4)
        .map(|byte| format!("{byte:02x}"))
        .collect();
    format!("trend-{index}-{short}")
}
