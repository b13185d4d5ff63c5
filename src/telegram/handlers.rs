//! Telegram dispatcher schema.
//!
//! The handler tree is built from a [`HandlerDeps`] bundle so integration
//! tests can drive the same tree as production. Branch order matters: admin
//! commands first, then pending-flow input from the admin chat, then
//! unsolicited messages from everyone else, then inline-keyboard callbacks.

use std::sync::Arc;

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, Message};

use crate::core::error::AppResult;
use crate::flow::{
    Flow, FlowAction, FlowContext, FlowRegistry, SendKind, SendTarget, StepInput, StepResult,
};
use crate::pagination::{render_page, NavCallback, SessionManager, EMPTY_LISTING};
use crate::storage::db::{self, RecordField, RecordFilter};
use crate::storage::get_connection;
use crate::telegram::bot::{choice_keyboard, command_keyboard, Command};
use crate::telegram::broadcast::{broadcast, classify_send_error};

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

const ERR_GENERIC: &str = "❌ Сталася помилка. Спробуйте ще раз.";
const ERR_NOT_ADMIN: &str = "❌ Ви не є адміністратором і не можете використовувати цю команду.";
const SESSION_EXPIRED: &str = "⌛ Сесія перегляду застаріла. Виконайте команду ще раз.";

const WELCOME: &str = "Вітаю! Я бот-записник.\n\n\
/add - додати запис\n\
/all - показати всі записи\n\
/view - показати записи за user_name або name\n\
/send_message - надіслати повідомлення користувачам\n\
/send_file - надіслати файл користувачам\n\
/replace_name - замінити name запису\n\
/replace_user - замінити user_name запису\n\
/replace_tag - замінити tag запису\n\
/delete - видалити запис\n\
/clear_db - очистити всю базу даних";

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub db_pool: Arc<db::DbPool>,
    pub sessions: Arc<SessionManager>,
    pub flows: Arc<FlowRegistry>,
    pub admin_id: i64,
}

impl HandlerDeps {
    /// Create new handler dependencies
    pub fn new(
        db_pool: Arc<db::DbPool>,
        sessions: Arc<SessionManager>,
        flows: Arc<FlowRegistry>,
        admin_id: i64,
    ) -> Self {
        Self { db_pool, sessions, flows, admin_id }
    }

    fn is_admin_chat(&self, msg: &Message) -> bool {
        msg.chat.id.0 == self.admin_id
    }
}

/// Record-existence lookups for mid-flow validation.
struct DbFlowContext<'a> {
    conn: &'a db::DbConnection,
}

impl FlowContext for DbFlowContext<'_> {
    fn record_exists(&self, id: i64) -> AppResult<bool> {
        Ok(db::record_exists(self.conn, id)?)
    }
}

/// Main handler schema for the dispatcher.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_commands = deps.clone();
    let deps_flow = deps.clone();
    let deps_guest = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        // Admin commands
        .branch(command_handler(deps_commands))
        // Admin replies feeding a pending flow
        .branch(admin_message_handler(deps_flow))
        // Everyone else
        .branch(guest_message_handler(deps_guest))
        // Inline keyboard navigation
        .branch(callback_handler(deps_callback))
}

/// Handler for bot commands.
fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("Received command {:?} from chat {}", cmd, msg.chat.id);

                if !deps.is_admin_chat(&msg) {
                    // Only the gated commands answer; the rest fall through
                    // to the guest path as an ordinary message would.
                    if matches!(cmd, Command::Delete | Command::ClearDb) {
                        bot.send_message(msg.chat.id, ERR_NOT_ADMIN).await?;
                        return Ok(());
                    }
                    return handle_guest_message(&bot, &msg, &deps).await;
                }

                if let Err(err) = handle_admin_command(&bot, &msg, cmd, &deps).await {
                    log::error!("Command failed for chat {}: {}", msg.chat.id, err);
                    bot.send_message(msg.chat.id, ERR_GENERIC).await?;
                }
                Ok(())
            }
        },
    ))
}

async fn handle_admin_command(
    bot: &Bot,
    msg: &Message,
    cmd: Command,
    deps: &HandlerDeps,
) -> Result<(), HandlerError> {
    let chat = msg.chat.id;
    match cmd {
        Command::Start => {
            // A new command always discards whatever flow was pending
            deps.flows.cancel(chat).await;
            bot.send_message(chat, WELCOME)
                .reply_markup(command_keyboard())
                .await?;
        }
        Command::Add => {
            begin_flow(bot, chat, deps, Flow::add()).await?;
        }
        Command::All => {
            deps.flows.cancel(chat).await;
            send_listing(bot, chat, deps, RecordFilter::All).await?;
        }
        Command::View => {
            begin_flow(bot, chat, deps, Flow::view()).await?;
        }
        Command::SendMessage => {
            begin_flow(bot, chat, deps, Flow::send(SendKind::Message)).await?;
        }
        Command::SendFile => {
            begin_flow(bot, chat, deps, Flow::send(SendKind::File)).await?;
        }
        Command::ReplaceName => {
            send_listing(bot, chat, deps, RecordFilter::All).await?;
            begin_flow(bot, chat, deps, Flow::replace(RecordField::Name)).await?;
        }
        Command::ReplaceUser => {
            send_listing(bot, chat, deps, RecordFilter::All).await?;
            begin_flow(bot, chat, deps, Flow::replace(RecordField::User)).await?;
        }
        Command::ReplaceTag => {
            send_listing(bot, chat, deps, RecordFilter::All).await?;
            begin_flow(bot, chat, deps, Flow::replace(RecordField::Tag)).await?;
        }
        Command::Delete => {
            send_listing(bot, chat, deps, RecordFilter::All).await?;
            begin_flow(bot, chat, deps, Flow::delete()).await?;
        }
        Command::ClearDb => {
            deps.flows.cancel(chat).await;
            let conn = get_connection(&deps.db_pool)?;
            let removed = db::clear_records(&conn)?;
            log::warn!("Admin cleared the database, {} records removed", removed);
            bot.send_message(chat, "✅ Вся база даних була очищена.").await?;
        }
    }
    Ok(())
}

/// Enter a flow: replace any pending one and send its first prompt.
async fn begin_flow(
    bot: &Bot,
    chat: ChatId,
    deps: &HandlerDeps,
    flow: Flow,
) -> Result<(), HandlerError> {
    let prompt = flow.entry_prompt();
    let request = bot.send_message(chat, prompt);
    if flow.starts_with_choice() {
        request.reply_markup(choice_keyboard()).await?;
    } else {
        request.await?;
    }
    deps.flows.begin(chat, flow).await;
    Ok(())
}

/// Handler for admin messages that are not commands: flow input.
fn admin_message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let filter_deps = deps.clone();
    Update::filter_message()
        .filter(move |msg: Message| filter_deps.is_admin_chat(&msg))
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let chat = msg.chat.id;
                let Some(flow) = deps.flows.take(chat).await else {
                    // Admin free text outside a flow is ignored
                    return Ok(());
                };

                let file_id;
                let input = if let Some(text) = msg.text() {
                    StepInput::Text(text)
                } else if let Some(doc) = msg.document() {
                    file_id = doc.file.id.0.clone();
                    StepInput::Document(&file_id)
                } else {
                    let error = format!(
                        "❌ Надішліть текстове повідомлення.\n{}",
                        flow.command()
                    );
                    deps.flows.resume(chat, flow).await;
                    bot.send_message(chat, error).await?;
                    return Ok(());
                };

                let hint = flow.command();
                let fed = {
                    let conn = get_connection(&deps.db_pool)?;
                    let ctx = DbFlowContext { conn: &conn };
                    flow.feed(input, &ctx)
                };

                let (next, result) = match fed {
                    Ok(pair) => pair,
                    Err(err) => {
                        log::error!("Flow step failed for chat {}: {}", chat, err);
                        bot.send_message(chat, format!("{}\n{}", ERR_GENERIC, hint)).await?;
                        return Ok(());
                    }
                };

                match result {
                    StepResult::Advance { prompt, show_records } => {
                        if show_records {
                            send_listing(&bot, chat, &deps, RecordFilter::All).await?;
                        }
                        bot.send_message(chat, prompt).await?;
                        if let Some(flow) = next {
                            deps.flows.resume(chat, flow).await;
                        }
                    }
                    StepResult::Retry { error } => {
                        bot.send_message(chat, error).await?;
                        if let Some(flow) = next {
                            deps.flows.resume(chat, flow).await;
                        }
                    }
                    StepResult::Abort { message } => {
                        bot.send_message(chat, message).await?;
                    }
                    StepResult::Complete(action) => {
                        if let Err(err) = execute_action(&bot, chat, &deps, action).await {
                            log::error!("Flow action failed for chat {}: {}", chat, err);
                            bot.send_message(chat, ERR_GENERIC).await?;
                        }
                    }
                }
                Ok(())
            }
        })
}

/// Run the terminal effect of a completed flow.
async fn execute_action(
    bot: &Bot,
    chat: ChatId,
    deps: &HandlerDeps,
    action: FlowAction,
) -> Result<(), HandlerError> {
    match action {
        FlowAction::SaveRecord { user_id, user, name, tag, phone } => {
            let conn = get_connection(&deps.db_pool)?;
            db::upsert_record(&conn, user_id, &user, &name, &tag, &phone)?;
            log::info!("Saved record for user_id {}", user_id);
            bot.send_message(chat, "✅ Запис успішно додано.").await?;
        }
        FlowAction::ListFiltered(filter) => {
            send_listing(bot, chat, deps, filter).await?;
        }
        FlowAction::ReplaceField { id, field, value } => {
            let conn = get_connection(&deps.db_pool)?;
            // The row can vanish between the flow's check and this write
            if db::update_field(&conn, id, field, &value)? {
                bot.send_message(chat, "✅ Запис успішно змінено.").await?;
            } else {
                bot.send_message(chat, "❔ Такого Number немає.").await?;
            }
        }
        FlowAction::DeleteRecord { id } => {
            let conn = get_connection(&deps.db_pool)?;
            if db::delete_record(&conn, id)? {
                log::info!("Deleted record {}", id);
                bot.send_message(chat, "✅ Запис успішно видалено.").await?;
            } else {
                bot.send_message(chat, "❔ Такий Number не знайдено.").await?;
            }
        }
        FlowAction::SendText { target, text } => {
            let recipients = resolve_target(deps, target)?;
            let report = broadcast(&recipients, |user_id| {
                let bot = bot.clone();
                let text = text.clone();
                async move {
                    bot.send_message(ChatId(user_id), text)
                        .await
                        .map(|_| ())
                        .map_err(|e| classify_send_error(&e))
                }
            })
            .await;
            bot.send_message(
                chat,
                format!("✅ Надіслано {} з {} користувачам.", report.sent, report.total()),
            )
            .await?;
        }
        FlowAction::SendDocument { target, file_id } => {
            let recipients = resolve_target(deps, target)?;
            let report = broadcast(&recipients, |user_id| {
                let bot = bot.clone();
                let file_id = file_id.clone();
                async move {
                    bot.send_document(ChatId(user_id), InputFile::file_id(FileId(file_id)))
                        .await
                        .map(|_| ())
                        .map_err(|e| classify_send_error(&e))
                }
            })
            .await;
            bot.send_message(
                chat,
                format!("✅ Надіслано {} з {} користувачам.", report.sent, report.total()),
            )
            .await?;
        }
    }
    Ok(())
}

/// Snapshot of the user_ids a send flow targets.
fn resolve_target(deps: &HandlerDeps, target: SendTarget) -> Result<Vec<i64>, HandlerError> {
    match target {
        SendTarget::One(user_id) => Ok(vec![user_id]),
        SendTarget::All => {
            let conn = get_connection(&deps.db_pool)?;
            Ok(db::recipient_ids(&conn)?)
        }
    }
}

/// Open a fresh paginated listing in the chat.
async fn send_listing(
    bot: &Bot,
    chat: ChatId,
    deps: &HandlerDeps,
    filter: RecordFilter,
) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    let token = deps.sessions.create_blocking(&conn, filter)?;
    let Some((rows, total_pages)) = deps.sessions.fetch_page_blocking(&conn, &token, 0)? else {
        // Freshly created; only an immediate expiry sweep could drop it
        bot.send_message(chat, SESSION_EXPIRED).await?;
        return Ok(());
    };

    if rows.is_empty() {
        bot.send_message(chat, EMPTY_LISTING).await?;
        return Ok(());
    }

    let (text, keyboard) = render_page(&rows, &token, 0, total_pages);
    bot.send_message(chat, text).reply_markup(keyboard).await?;
    Ok(())
}

/// Handler for messages from non-admin chats.
fn guest_message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
        let deps = deps.clone();
        async move { handle_guest_message(&bot, &msg, &deps).await }
    })
}

async fn handle_guest_message(
    bot: &Bot,
    msg: &Message,
    deps: &HandlerDeps,
) -> Result<(), HandlerError> {
    let user_id = msg.chat.id.0;
    let username = msg
        .from
        .as_ref()
        .and_then(|u| u.username.as_deref())
        .map(|u| format!("@{}", u))
        .unwrap_or_else(|| "-".to_string());
    let text = msg.text().unwrap_or("<не текст>");

    log::info!(
        "ID Користувач: {} | user_name користувача: {} | Написав: {}",
        user_id,
        username,
        text
    );
    bot.send_message(
        ChatId(deps.admin_id),
        format!(
            "ID Користувач: {} | user_name користувача: {} | Написав: {}",
            user_id, username, text
        ),
    )
    .await?;

    // First contact gets a stub record the admin can fill in later
    let conn = get_connection(&deps.db_pool)?;
    if !db::user_known(&conn, user_id)? {
        let name = msg
            .from
            .as_ref()
            .map(|u| u.first_name.clone())
            .unwrap_or_default();
        db::upsert_record(&conn, user_id, &username, &name, "", "")?;
        log::info!("Recorded new user {}", user_id);
    }
    Ok(())
}

/// Handler for callback queries (inline keyboard navigation).
fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move {
            // Always stop the client spinner first
            bot.answer_callback_query(q.id.clone()).await?;

            let Some(nav) = q.data.as_deref().and_then(NavCallback::parse) else {
                return Ok(());
            };
            let (chat, message_id) = match q.message.as_ref() {
                Some(m) => (m.chat().id, m.id()),
                None => return Ok(()),
            };

            let NavCallback::Page { token, page } = nav else {
                // Inert slot: acknowledged above, nothing else to do
                return Ok(());
            };

            let conn = get_connection(&deps.db_pool)?;
            match deps.sessions.fetch_page_blocking(&conn, &token, page) {
                Ok(Some((rows, total_pages))) => {
                    let (text, keyboard) = render_page(&rows, &token, page, total_pages);
                    let edit = bot
                        .edit_message_text(chat, message_id, text.clone())
                        .reply_markup(keyboard.clone())
                        .await;
                    if let Err(err) = edit {
                        // "message is not modified" and deleted messages land here
                        log::warn!("Edit failed in chat {}: {}; sending fresh page", chat, err);
                        bot.send_message(chat, text).reply_markup(keyboard).await?;
                    }
                }
                Ok(None) => {
                    bot.send_message(chat, SESSION_EXPIRED).await?;
                }
                Err(err) => {
                    log::error!("Page fetch failed for token {}: {}", token, err);
                    bot.send_message(chat, ERR_GENERIC).await?;
                }
            }
            Ok(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::create_memory_pool;
    use std::time::Duration;

    fn test_deps() -> HandlerDeps {
        let pool = Arc::new(create_memory_pool().unwrap());
        HandlerDeps::new(
            pool,
            Arc::new(SessionManager::new(2, Duration::from_secs(60))),
            Arc::new(FlowRegistry::new()),
            999,
        )
    }

    #[test]
    fn test_db_flow_context_checks_real_rows() {
        let deps = test_deps();
        let conn = get_connection(&deps.db_pool).unwrap();
        db::upsert_record(&conn, 42, "@x", "X", "", "").unwrap();

        let ctx = DbFlowContext { conn: &conn };
        assert!(ctx.record_exists(1).unwrap());
        assert!(!ctx.record_exists(2).unwrap());
    }

    #[test]
    fn test_resolve_target_snapshots_all_user_ids() {
        let deps = test_deps();
        let conn = get_connection(&deps.db_pool).unwrap();
        db::upsert_record(&conn, 10, "@a", "A", "", "").unwrap();
        db::upsert_record(&conn, 20, "@b", "B", "", "").unwrap();
        // The memory pool holds a single connection; return it so
        // resolve_target can check it out again.
        drop(conn);

        assert_eq!(resolve_target(&deps, SendTarget::One(77)).unwrap(), vec![77]);

        let mut all = resolve_target(&deps, SendTarget::All).unwrap();
        all.sort_unstable();
        assert_eq!(all, vec![10, 20]);
    }
}
