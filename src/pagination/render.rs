//! Listing screen rendering: page text plus the navigation keyboard.
//!
//! Every navigation button carries the session token, so a press on an old
//! message after restart or expiry resolves to a clean "session expired"
//! answer instead of a guess.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::storage::db::Record;

/// Literal shown when a listing has no rows at all.
pub const EMPTY_LISTING: &str = "❔ Немає записів.";

/// Parsed navigation callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavCallback {
    /// Jump to `page` within the session named by `token`
    Page { token: String, page: usize },
    /// Inert slot; acknowledged and otherwise ignored
    Noop { token: String },
}

impl NavCallback {
    /// Parse a `list:page:<token>:<page>` / `list:noop:<token>` payload.
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.split(':');
        if parts.next()? != "list" {
            return None;
        }
        match parts.next()? {
            "page" => {
                let token = parts.next()?.to_string();
                let page = parts.next()?.parse().ok()?;
                Some(NavCallback::Page { token, page })
            }
            "noop" => {
                let token = parts.next()?.to_string();
                Some(NavCallback::Noop { token })
            }
            _ => None,
        }
    }
}

fn page_callback(token: &str, page: usize) -> String {
    format!("list:page:{}:{}", token, page)
}

fn noop_callback(token: &str) -> String {
    format!("list:noop:{}", token)
}

/// Render `-` for an unset optional field.
fn display_or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

/// Format one page of records plus its navigation keyboard.
///
/// Rows arrive already ordered by ascending id. Empty `rows` on the first page
/// renders the literal "no records" text. The keyboard is always a symmetric
/// three-slot row: an arrow (or an inert slot) on each side of an inert
/// `page/total` counter, every slot bound to the session token.
pub fn render_page(
    rows: &[Record],
    token: &str,
    page: usize,
    total_pages: usize,
) -> (String, InlineKeyboardMarkup) {
    let text = if rows.is_empty() && page == 0 {
        EMPTY_LISTING.to_string()
    } else {
        rows.iter()
            .map(|r| {
                format!(
                    "Number: {}\nID: {},  user: {},  name: {},  tag: {},  phone: {}",
                    r.id,
                    r.user_id,
                    display_or_dash(&r.user),
                    display_or_dash(&r.name),
                    display_or_dash(&r.tag),
                    display_or_dash(&r.phone),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let prev = if page > 0 {
        InlineKeyboardButton::callback("⬅️", page_callback(token, page - 1))
    } else {
        InlineKeyboardButton::callback("⬅️", noop_callback(token))
    };

    let counter = InlineKeyboardButton::callback(
        format!("{}/{}", page + 1, total_pages),
        noop_callback(token),
    );

    let next = if page + 1 < total_pages {
        InlineKeyboardButton::callback("➡️", page_callback(token, page + 1))
    } else {
        InlineKeyboardButton::callback("➡️", noop_callback(token))
    };

    let keyboard = InlineKeyboardMarkup::new(vec![vec![prev, counter, next]]);
    (text, keyboard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(id: i64) -> Record {
        Record {
            id,
            user_id: 1000 + id,
            user: format!("@user{}", id),
            name: format!("Name{}", id),
            tag: String::new(),
            phone: String::new(),
        }
    }

    /// Helper: extract all callback_data strings from a keyboard
    fn callback_data(keyboard: &InlineKeyboardMarkup) -> Vec<String> {
        keyboard
            .inline_keyboard
            .iter()
            .flatten()
            .filter_map(|btn| match &btn.kind {
                teloxide::types::InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_empty_first_page_renders_no_records_text() {
        let (text, kb) = render_page(&[], "tok", 0, 1);
        assert_eq!(text, EMPTY_LISTING);

        // Both arrows inert on a single empty page
        let data = callback_data(&kb);
        assert_eq!(data, vec!["list:noop:tok", "list:noop:tok", "list:noop:tok"]);
    }

    #[test]
    fn test_unset_fields_render_as_dash() {
        let r = record(1);
        let (text, _) = render_page(&[r], "tok", 0, 1);
        assert!(text.contains("tag: -,  phone: -"), "got: {}", text);
        assert!(text.contains("Number: 1"));
        assert!(text.contains("ID: 1001"));
    }

    #[test]
    fn test_first_page_has_inert_prev_and_active_next() {
        let rows: Vec<Record> = (1..=3).map(record).collect();
        let (_, kb) = render_page(&rows, "tok", 0, 3);

        let data = callback_data(&kb);
        assert_eq!(data[0], "list:noop:tok");
        assert_eq!(data[1], "list:noop:tok");
        assert_eq!(data[2], "list:page:tok:1");
    }

    #[test]
    fn test_last_page_has_active_prev_and_inert_next() {
        let rows: Vec<Record> = (1..=3).map(record).collect();
        let (_, kb) = render_page(&rows, "tok", 2, 3);

        let data = callback_data(&kb);
        assert_eq!(data[0], "list:page:tok:1");
        assert_eq!(data[2], "list:noop:tok");
    }

    #[test]
    fn test_middle_page_has_both_arrows_active() {
        let rows: Vec<Record> = (1..=3).map(record).collect();
        let (_, kb) = render_page(&rows, "tok", 1, 3);

        let data = callback_data(&kb);
        assert_eq!(data[0], "list:page:tok:0");
        assert_eq!(data[2], "list:page:tok:2");
    }

    #[test]
    fn test_counter_shows_one_based_page() {
        let rows: Vec<Record> = (1..=3).map(record).collect();
        let (_, kb) = render_page(&rows, "tok", 1, 3);

        let labels: Vec<String> = kb.inline_keyboard[0].iter().map(|b| b.text.clone()).collect();
        assert_eq!(labels, vec!["⬅️", "2/3", "➡️"]);
    }

    #[test]
    fn test_nav_callback_parse() {
        assert_eq!(
            NavCallback::parse("list:page:abc123:4"),
            Some(NavCallback::Page { token: "abc123".into(), page: 4 })
        );
        assert_eq!(
            NavCallback::parse("list:noop:abc123"),
            Some(NavCallback::Noop { token: "abc123".into() })
        );
        assert_eq!(NavCallback::parse("videos:page:abc:1"), None);
        assert_eq!(NavCallback::parse("list:page:abc"), None);
        assert_eq!(NavCallback::parse("list:page:abc:NaN"), None);
    }
}
