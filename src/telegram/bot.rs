//! Bot construction, the admin command set, and reply keyboards.

use teloxide::prelude::*;
use teloxide::types::{KeyboardButton, KeyboardMarkup};
use teloxide::utils::command::BotCommands;

use crate::core::config;

/// Commands the admin can issue. Non-admin chats never reach these.
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "snake_case", description = "Доступні команди:")]
pub enum Command {
    #[command(description = "почати роботу з ботом")]
    Start,
    #[command(description = "додати запис")]
    Add,
    #[command(description = "показати всі записи")]
    All,
    #[command(description = "показати записи за user_name або name")]
    View,
    #[command(description = "надіслати повідомлення користувачам")]
    SendMessage,
    #[command(description = "надіслати файл користувачам")]
    SendFile,
    #[command(description = "замінити name запису")]
    ReplaceName,
    #[command(description = "замінити user_name запису")]
    ReplaceUser,
    #[command(description = "замінити tag запису")]
    ReplaceTag,
    #[command(description = "видалити запис")]
    Delete,
    #[command(description = "очистити всю базу даних")]
    ClearDb,
}

/// Build the bot from the configured token.
pub fn create_bot() -> Bot {
    Bot::new(config::BOT_TOKEN.clone())
}

/// One-time reply keyboard listing every command, shown on /start.
pub fn command_keyboard() -> KeyboardMarkup {
    let rows = vec![
        vec![KeyboardButton::new("/add"), KeyboardButton::new("/all"), KeyboardButton::new("/view")],
        vec![KeyboardButton::new("/send_message"), KeyboardButton::new("/send_file")],
        vec![
            KeyboardButton::new("/replace_name"),
            KeyboardButton::new("/replace_user"),
            KeyboardButton::new("/replace_tag"),
        ],
        vec![KeyboardButton::new("/delete"), KeyboardButton::new("/clear_db")],
    ];
    KeyboardMarkup::new(rows).one_time_keyboard()
}

/// Small `1`/`2` keyboard for the choice steps.
pub fn choice_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![KeyboardButton::new("1"), KeyboardButton::new("2")]])
        .one_time_keyboard()
        .resize_keyboard()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_parse_from_text() {
        let cmd = Command::parse("/add", "testbot").unwrap();
        assert_eq!(cmd, Command::Add);

        let cmd = Command::parse("/send_message", "testbot").unwrap();
        assert_eq!(cmd, Command::SendMessage);

        let cmd = Command::parse("/clear_db@testbot", "testbot").unwrap();
        assert_eq!(cmd, Command::ClearDb);
    }

    #[test]
    fn test_command_keyboard_covers_every_command() {
        let kb = command_keyboard();
        let labels: Vec<String> = kb
            .keyboard
            .iter()
            .flatten()
            .map(|b| b.text.clone())
            .collect();
        for label in [
            "/add", "/all", "/view", "/send_message", "/send_file", "/replace_name",
            "/replace_user", "/replace_tag", "/delete", "/clear_db",
        ] {
            assert!(labels.iter().any(|l| l == label), "missing {}", label);
        }
    }

    #[test]
    fn test_choice_keyboard_is_one_two() {
        let kb = choice_keyboard();
        assert_eq!(kb.keyboard.len(), 1);
        assert_eq!(kb.keyboard[0][0].text, "1");
        assert_eq!(kb.keyboard[0][1].text, "2");
    }
}
