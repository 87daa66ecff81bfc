//! Interactive-card assembly.
//!
//! Cards are built fresh for every send from compiled markdown plus caller
//! options, serialized once into the v1 interactive-card JSON, and dropped.
//! Status cards layer a fixed status → (color, icon) mapping on top for
//! long-running task displays that get patched in place.

use serde_json::{Value, json};

use crate::markdown;

/// Header color when nothing picks another one.
const DEFAULT_TEMPLATE: &str = "blue";

/// Header color forced by [`build_update_card`] when the body carries a
/// success marker.
const SUCCESS_TEMPLATE: &str = "green";

/// Substrings that mark an update as "finished successfully". Matches the
/// check icon our own status cards render plus the platform's dominant
/// locale, so automated status text triggers the override either way.
const SUCCESS_MARKERS: [&str; 2] = ["✅", "成功"];

/// One typed block of a card, in render order.
#[derive(Debug, Clone, PartialEq)]
pub enum CardElement {
    /// Markdown text, rendered natively by the platform.
    TextBlock { content: String },
    /// Structured table; `rows` map the generated `col_N` keys to cell text.
    Table {
        columns: Vec<TableColumn>,
        rows: Vec<serde_json::Map<String, Value>>,
        page_size: u8,
    },
    /// A row of interactive buttons.
    ActionRow { buttons: Vec<Button> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub key: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    /// Echoed back in the card-action event as `action.value.action`.
    pub value: String,
    pub style: ButtonStyle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ButtonStyle {
    #[default]
    Default,
    Primary,
    Danger,
}

impl ButtonStyle {
    /// Wire value for the button `type` field.
    #[must_use]
    pub fn as_wire_type(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Primary => "primary",
            Self::Danger => "danger",
        }
    }
}

/// A complete card document. No `title` means no header on the wire, not an
/// empty one.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub title: Option<String>,
    pub color_template: String,
    pub elements: Vec<CardElement>,
}

/// Caller knobs for [`build_card`].
#[derive(Debug, Clone, Default)]
pub struct CardOptions {
    /// Header title; a leading `# ` heading in the markdown wins over this.
    pub title: Option<String>,
    /// Header color template; defaults to a neutral color.
    pub template: Option<String>,
    /// Buttons appended as a trailing action row, in order.
    pub buttons: Vec<Button>,
}

/// Lifecycle phase shown by a status card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Running,
    Success,
    Error,
    Warning,
}

impl Status {
    /// Parse the wire string; `None` for anything unrecognized so call
    /// sites pick their own fallback.
    #[must_use]
    pub fn parse(wire: &str) -> Option<Self> {
        match wire {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            _ => None,
        }
    }

    /// (header color template, title icon) for this status.
    #[must_use]
    pub fn visual(self) -> (&'static str, &'static str) {
        match self {
            Self::Pending => ("grey", "⏳"),
            Self::Running => ("blue", "🔄"),
            Self::Success => ("green", "✅"),
            Self::Error => ("red", "❌"),
            Self::Warning => ("orange", "⚠️"),
        }
    }
}

/// Inputs for a status card.
#[derive(Debug, Clone, Default)]
pub struct StatusCardOptions {
    pub title: String,
    /// Markdown body below the header.
    pub content: String,
    /// Status wire string; unrecognized values fall back to the default the
    /// call site supplies.
    pub status: String,
    pub buttons: Vec<Button>,
}

/// Build a card from markdown.
///
/// A leading `# ` heading becomes the header title (overriding
/// `options.title`) and is stripped from the body before compilation.
#[must_use]
pub fn build_card(markdown: &str, options: &CardOptions) -> Card {
    let (extracted, body) = split_leading_title(markdown);
    let title = extracted.or_else(|| options.title.clone());

    let mut elements = markdown::compile(body);
    if !options.buttons.is_empty() {
        elements.push(CardElement::ActionRow {
            buttons: options.buttons.clone(),
        });
    }

    Card {
        title,
        color_template: options
            .template
            .clone()
            .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
        elements,
    }
}

/// Build the replacement card for an in-place update.
///
/// When the markdown contains a success marker the header color is forced
/// to the success template, even over an explicit `options.template`.
#[must_use]
pub fn build_update_card(markdown: &str, options: &CardOptions) -> Card {
    let mut card = build_card(markdown, options);
    if SUCCESS_MARKERS.iter().any(|marker| markdown.contains(marker)) {
        // TODO: ask product whether an explicit options.template should beat
        // this marker override; until confirmed the marker wins.
        card.color_template = SUCCESS_TEMPLATE.to_string();
    }
    card
}

/// Build a status card: `"<icon> <title>"` header (no header when the title
/// is empty), status-colored template, markdown content, optional buttons.
///
/// `default` is used when `options.status` is unrecognized; the send and
/// update paths pass different defaults.
#[must_use]
pub fn status_card(options: &StatusCardOptions, default: Status) -> Card {
    let status = Status::parse(&options.status).unwrap_or(default);
    let (template, icon) = status.visual();

    let mut elements = markdown::compile(&options.content);
    if !options.buttons.is_empty() {
        elements.push(CardElement::ActionRow {
            buttons: options.buttons.clone(),
        });
    }

    Card {
        title: (!options.title.is_empty()).then(|| format!("{icon} {}", options.title)),
        color_template: template.to_string(),
        elements,
    }
}

/// Split a leading `# ` heading off the markdown, tolerating blank lines
/// before it. Returns the heading text and the remaining body.
fn split_leading_title(markdown: &str) -> (Option<String>, &str) {
    let trimmed = markdown.trim_start();
    if let Some(rest) = trimmed.strip_prefix("# ") {
        let (title, body) = rest.split_once('\n').unwrap_or((rest, ""));
        return (Some(title.trim().to_string()), body);
    }
    (None, markdown)
}

impl Card {
    /// Serialize into the v1 interactive-card JSON.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let elements: Vec<Value> = self.elements.iter().map(CardElement::to_value).collect();
        let mut card = json!({
            "config": { "wide_screen_mode": true },
            "elements": elements,
        });
        if let Some(title) = &self.title {
            card["header"] = json!({
                "title": { "tag": "plain_text", "content": title },
                "template": self.color_template,
            });
        }
        card
    }
}

impl CardElement {
    fn to_value(&self) -> Value {
        match self {
            Self::TextBlock { content } => json!({
                "tag": "markdown",
                "content": content,
            }),
            Self::Table {
                columns,
                rows,
                page_size,
            } => json!({
                "tag": "table",
                "page_size": page_size,
                "row_height": "low",
                "header_style": { "text_align": "left", "background_style": "grey" },
                "columns": columns
                    .iter()
                    .map(|c| json!({
                        "name": c.key,
                        "display_name": c.display_name,
                        "width": "auto",
                    }))
                    .collect::<Vec<_>>(),
                "rows": rows,
            }),
            Self::ActionRow { buttons } => json!({
                "tag": "action",
                "actions": buttons.iter().map(Button::to_value).collect::<Vec<_>>(),
            }),
        }
    }
}

impl Button {
    fn to_value(&self) -> Value {
        json!({
            "tag": "button",
            "text": { "tag": "plain_text", "content": self.label },
            "type": self.style.as_wire_type(),
            "value": { "action": self.value },
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn button(label: &str, value: &str, style: ButtonStyle) -> Button {
        Button {
            label: label.to_string(),
            value: value.to_string(),
            style,
        }
    }

    #[test]
    fn leading_heading_becomes_title() {
        let card = build_card("# Title\nBody", &CardOptions::default());
        assert_eq!(card.title.as_deref(), Some("Title"));
        assert_eq!(card.elements, vec![CardElement::TextBlock {
            content: "Body".into()
        }]);
    }

    #[test]
    fn body_without_heading_has_no_title() {
        let card = build_card("Body only", &CardOptions::default());
        assert!(card.title.is_none());
    }

    #[test]
    fn heading_overrides_options_title() {
        let options = CardOptions {
            title: Some("From options".into()),
            ..Default::default()
        };
        let card = build_card("# From markdown\nBody", &options);
        assert_eq!(card.title.as_deref(), Some("From markdown"));
    }

    #[test]
    fn options_title_used_when_no_heading() {
        let options = CardOptions {
            title: Some("From options".into()),
            ..Default::default()
        };
        let card = build_card("Body", &options);
        assert_eq!(card.title.as_deref(), Some("From options"));
    }

    #[test]
    fn blank_lines_before_heading_still_extract_title() {
        let card = build_card("\n\n# Padded\nBody", &CardOptions::default());
        assert_eq!(card.title.as_deref(), Some("Padded"));
    }

    #[test]
    fn heading_only_markdown_yields_empty_body() {
        let card = build_card("# Just a title", &CardOptions::default());
        assert_eq!(card.title.as_deref(), Some("Just a title"));
        assert!(card.elements.is_empty());
    }

    #[test]
    fn buttons_append_trailing_action_row() {
        let options = CardOptions {
            buttons: vec![
                button("Pass", "pass", ButtonStyle::Primary),
                button("Fail", "fail", ButtonStyle::Danger),
            ],
            ..Default::default()
        };
        let card = build_card("Click below", &options);

        let CardElement::ActionRow { buttons } = card.elements.last().unwrap() else {
            panic!("expected trailing action row, got {:?}", card.elements);
        };
        assert_eq!(
            buttons.iter().map(|b| b.label.as_str()).collect::<Vec<_>>(),
            vec!["Pass", "Fail"]
        );
    }

    #[test]
    fn template_defaults_to_neutral() {
        assert_eq!(
            build_card("x", &CardOptions::default()).color_template,
            "blue"
        );
    }

    #[test]
    fn explicit_template_wins_over_default() {
        let options = CardOptions {
            template: Some("violet".into()),
            ..Default::default()
        };
        assert_eq!(build_card("x", &options).color_template, "violet");
    }

    #[rstest]
    #[case(Status::Pending, "grey", "⏳")]
    #[case(Status::Running, "blue", "🔄")]
    #[case(Status::Success, "green", "✅")]
    #[case(Status::Error, "red", "❌")]
    #[case(Status::Warning, "orange", "⚠️")]
    fn status_visuals(#[case] status: Status, #[case] template: &str, #[case] icon: &str) {
        assert_eq!(status.visual(), (template, icon));
    }

    #[rstest]
    #[case("pending", Some(Status::Pending))]
    #[case("running", Some(Status::Running))]
    #[case("success", Some(Status::Success))]
    #[case("error", Some(Status::Error))]
    #[case("warning", Some(Status::Warning))]
    #[case("exploded", None)]
    #[case("", None)]
    fn status_parse(#[case] wire: &str, #[case] expected: Option<Status>) {
        assert_eq!(Status::parse(wire), expected);
    }

    #[test]
    fn status_card_renders_icon_title() {
        let card = status_card(
            &StatusCardOptions {
                title: "Deploy".into(),
                content: "building image".into(),
                status: "running".into(),
                buttons: vec![],
            },
            Status::Running,
        );
        assert_eq!(card.title.as_deref(), Some("🔄 Deploy"));
        assert_eq!(card.color_template, "blue");
    }

    #[test]
    fn status_card_empty_title_has_no_header() {
        let card = status_card(
            &StatusCardOptions {
                content: "body".into(),
                status: "success".into(),
                ..Default::default()
            },
            Status::Running,
        );
        assert!(card.title.is_none());
        assert!(card.to_value().get("header").is_none());
    }

    #[test]
    fn status_card_unrecognized_status_uses_supplied_default() {
        let options = StatusCardOptions {
            title: "T".into(),
            status: "mystery".into(),
            ..Default::default()
        };
        assert_eq!(status_card(&options, Status::Running).color_template, "blue");
        assert_eq!(
            status_card(&options, Status::Success).color_template,
            "green"
        );
    }

    #[rstest]
    #[case("done ✅")]
    #[case("部署成功")]
    fn update_with_success_marker_forces_success_color(#[case] markdown: &str) {
        let options = CardOptions {
            template: Some("red".into()),
            ..Default::default()
        };
        let card = build_update_card(markdown, &options);
        assert_eq!(card.color_template, "green");
    }

    #[test]
    fn update_without_marker_keeps_requested_template() {
        let options = CardOptions {
            template: Some("red".into()),
            ..Default::default()
        };
        assert_eq!(build_update_card("still failing", &options).color_template, "red");
    }

    #[test]
    fn wire_json_omits_header_without_title() {
        let card = build_card("no title here", &CardOptions::default());
        let value = card.to_value();
        assert!(value.get("header").is_none());
        assert_eq!(value["config"]["wide_screen_mode"], true);
    }

    #[test]
    fn wire_json_header_and_markdown_element() {
        let card = build_card("# Hi\nBody", &CardOptions::default());
        let value = card.to_value();
        assert_eq!(value["header"]["title"]["tag"], "plain_text");
        assert_eq!(value["header"]["title"]["content"], "Hi");
        assert_eq!(value["header"]["template"], "blue");
        assert_eq!(value["elements"][0]["tag"], "markdown");
        assert_eq!(value["elements"][0]["content"], "Body");
    }

    #[test]
    fn wire_json_table_element() {
        let card = build_card(
            "| Name | Status |\n|---|---|\n| core | ok |",
            &CardOptions::default(),
        );
        let value = card.to_value();
        let table = &value["elements"][0];
        assert_eq!(table["tag"], "table");
        assert_eq!(table["page_size"], 1);
        assert_eq!(table["row_height"], "low");
        assert_eq!(table["columns"][0]["name"], "col_0");
        assert_eq!(table["columns"][0]["display_name"], "Name");
        assert_eq!(table["columns"][0]["width"], "auto");
        assert_eq!(table["rows"][0]["col_0"], "core");
        assert_eq!(table["rows"][0]["col_1"], "ok");
    }

    #[test]
    fn wire_json_action_element() {
        let options = CardOptions {
            buttons: vec![button("Go", "go", ButtonStyle::Primary)],
            ..Default::default()
        };
        let value = build_card("press it", &options).to_value();
        let action = &value["elements"][1];
        assert_eq!(action["tag"], "action");
        assert_eq!(action["actions"][0]["tag"], "button");
        assert_eq!(action["actions"][0]["text"]["tag"], "plain_text");
        assert_eq!(action["actions"][0]["text"]["content"], "Go");
        assert_eq!(action["actions"][0]["type"], "primary");
        assert_eq!(action["actions"][0]["value"]["action"], "go");
    }

    #[test]
    fn button_style_wire_values() {
        assert_eq!(ButtonStyle::Default.as_wire_type(), "default");
        assert_eq!(ButtonStyle::Primary.as_wire_type(), "primary");
        assert_eq!(ButtonStyle::Danger.as_wire_type(), "danger");
    }
}
