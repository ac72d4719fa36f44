use chrono::Local;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::value::{FieldValue, Row, Timestamp};

/// Longest text (in characters) shown in the compact grid/card view.
pub const MAX_INLINE_CHARS: usize = 50;

lazy_static! {
    static ref IMAGE_URL_REGEX: Regex =
        Regex::new(r"(?i)(https?://.+\.(?:png|jpg|jpeg|gif|webp))(\?.*)?$").unwrap();
}

/// How a field value is shown in the grid/card view.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RenderDecision {
    Suppressed,
    PlainText(String),
    /// Opened in a new tab without leaking the referrer.
    Link(String),
    Timestamp(String),
    NestedList(Vec<Vec<RenderedField>>),
    PreformattedJson(String),
}

/// A labeled grid decision, one per record field.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderedField {
    pub label: String,
    pub decision: RenderDecision,
}

/// How a field value is shown in the detail view of a selected record.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DetailDecision {
    Timestamp(String),
    Image(String),
    Text(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetailField {
    pub label: String,
    pub decision: DetailDecision,
}

/// Local date/time text used for every timestamp display.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.with_timezone(&Local).format("%Y/%m/%d %H:%M:%S").to_string()
}

pub fn is_image_url(text: &str) -> bool {
    IMAGE_URL_REGEX.is_match(text)
}

fn too_long(text: &str) -> bool {
    text.chars().count() > MAX_INLINE_CHARS
}

/// Classify a value for the grid/card view
///
/// Rules are tried in this order and the first match wins:
/// timestamp, over-long text, image URL, `http` link, array, object, scalar.
/// Never fails: anything unexpected falls through to the scalar rule.
///
/// # Arguments
/// * `value` - The field value to display
///
/// # Returns
/// * `RenderDecision` - What the card should show for this value
///
/// # Examples
/// ```
/// use tabdeck::render::{classify, RenderDecision};
/// use tabdeck::value::FieldValue;
///
/// let link = classify(&FieldValue::from("http://x.com/p"));
/// assert_eq!(link, RenderDecision::Link("http://x.com/p".to_string()));
/// assert_eq!(classify(&FieldValue::from("a".repeat(51))), RenderDecision::Suppressed);
/// ```
pub fn classify(value: &FieldValue) -> RenderDecision {
    if let Some(ts) = value.as_timestamp() {
        return RenderDecision::Timestamp(format_timestamp(ts));
    }

    if let Some(text) = value.as_text() {
        if too_long(text) {
            return RenderDecision::Suppressed;
        }
        // Images are only inlined in the detail view
        if is_image_url(text) {
            return RenderDecision::Suppressed;
        }
        if text.starts_with("http") {
            return RenderDecision::Link(text.to_string());
        }
    }

    match value {
        FieldValue::List(items) => RenderDecision::NestedList(
            items
                .iter()
                .enumerate()
                .map(|(idx, item)| match item {
                    FieldValue::Map(row) => render_card(row),
                    other => vec![RenderedField {
                        label: idx.to_string(),
                        decision: classify(other),
                    }],
                })
                .collect(),
        ),
        FieldValue::Map(_) => {
            let json = value.to_compact_json();
            if too_long(&json) {
                RenderDecision::Suppressed
            } else {
                RenderDecision::PreformattedJson(json)
            }
        }
        scalar => {
            let text = scalar.to_string();
            if too_long(&text) {
                RenderDecision::Suppressed
            } else {
                RenderDecision::PlainText(text)
            }
        }
    }
}

/// Classify a value for the detail view. Nothing is suppressed here.
pub fn classify_detail(value: &FieldValue) -> DetailDecision {
    if let Some(ts) = value.as_timestamp() {
        return DetailDecision::Timestamp(format_timestamp(ts));
    }
    match value.as_text() {
        Some(text) if is_image_url(text) => DetailDecision::Image(text.to_string()),
        _ => DetailDecision::Text(value.to_string()),
    }
}

/// Grid decisions for every field of a record, in field order.
pub fn render_card(record: &Row) -> Vec<RenderedField> {
    record
        .iter()
        .map(|(label, value)| RenderedField {
            label: label.to_string(),
            decision: classify(value),
        })
        .collect()
}

/// Detail decisions for every field of a record, in field order.
pub fn render_detail(record: &Row) -> Vec<DetailField> {
    record
        .iter()
        .map(|(label, value)| DetailField {
            label: label.to_string(),
            decision: classify_detail(value),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn length_boundary() {
        assert_eq!(classify(&FieldValue::from("a".repeat(51))), RenderDecision::Suppressed);
        assert_eq!(
            classify(&FieldValue::from("a".repeat(50))),
            RenderDecision::PlainText("a".repeat(50))
        );
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let text = "あ".repeat(50);
        assert_eq!(classify(&FieldValue::from(text.as_str())), RenderDecision::PlainText(text));
    }

    #[test]
    fn short_http_text_is_a_link() {
        assert_eq!(
            classify(&FieldValue::from("http://x.com/p")),
            RenderDecision::Link("http://x.com/p".into())
        );
    }

    #[test]
    fn long_link_is_suppressed() {
        let url = format!("https://example.com/{}", "p".repeat(40));
        assert_eq!(classify(&FieldValue::from(url)), RenderDecision::Suppressed);
    }

    #[test]
    fn image_urls_are_hidden_in_grid_but_shown_in_detail() {
        let value = FieldValue::from("http://x.com/a.png");
        assert_eq!(classify(&value), RenderDecision::Suppressed);
        assert_eq!(classify_detail(&value), DetailDecision::Image("http://x.com/a.png".into()));

        let with_query = FieldValue::from("https://cdn.x.com/pic.JPEG?w=200");
        assert!(matches!(classify_detail(&with_query), DetailDecision::Image(_)));
    }

    #[test]
    fn timestamp_precedes_every_other_rule() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 8, 30, 0).unwrap();
        let expected = format_timestamp(&ts);
        assert_eq!(classify(&FieldValue::from(ts)), RenderDecision::Timestamp(expected.clone()));
        assert_eq!(classify_detail(&FieldValue::from(ts)), DetailDecision::Timestamp(expected));
    }

    #[test]
    fn arrays_render_nested_labeled_lists() {
        let value = FieldValue::List(vec![
            FieldValue::Map(Row::from_pairs([("k", "v"), ("u", "http://a.io")])),
            FieldValue::Int(7),
        ]);
        let RenderDecision::NestedList(items) = classify(&value) else {
            panic!("expected nested list");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(items[0][0].label, "k");
        assert_eq!(items[0][1].decision, RenderDecision::Link("http://a.io".into()));
        assert_eq!(items[1][0].decision, RenderDecision::PlainText("7".into()));
    }

    #[test]
    fn objects_render_as_compact_json_unless_long() {
        let small = FieldValue::Map(Row::from_pairs([("a", FieldValue::Int(1))]));
        assert_eq!(classify(&small), RenderDecision::PreformattedJson(r#"{"a":1}"#.into()));

        let big = FieldValue::Map(Row::from_pairs([("long", "x".repeat(60))]));
        assert_eq!(classify(&big), RenderDecision::Suppressed);
    }

    #[test]
    fn scalars_use_their_string_form() {
        assert_eq!(classify(&FieldValue::Int(30)), RenderDecision::PlainText("30".into()));
        assert_eq!(classify(&FieldValue::Null), RenderDecision::PlainText("null".into()));
        assert_eq!(classify(&FieldValue::Bool(true)), RenderDecision::PlainText("true".into()));
    }

    #[test]
    fn detail_view_never_suppresses() {
        let long = "a".repeat(200);
        assert_eq!(classify_detail(&FieldValue::from(long.as_str())), DetailDecision::Text(long));
    }

    #[test]
    fn card_keeps_field_order() {
        let record = Row::from_pairs([("name", "Alice"), ("age", "30")]);
        let labels: Vec<String> = render_card(&record).into_iter().map(|f| f.label).collect();
        assert_eq!(labels, vec!["name", "age"]);
        assert_eq!(render_detail(&record).len(), 2);
    }
}
