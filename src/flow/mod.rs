//! Per-chat sequential prompt engine.
//!
//! Each admin command enters a named flow; a flow is an ordered list of steps.
//! A step consumes one inbound message, validates it, and either advances with
//! the accumulated typed data, re-arms itself with an error, completes into a
//! [`FlowAction`] for the dispatcher to execute, or aborts. State sits idle in
//! memory between messages for as long as it takes the admin to answer; no
//! step timeout is enforced (accepted limitation, same as the original bot).
//!
//! The choice steps (`1`/`2`) deliberately abort on invalid input instead of
//! re-prompting: the admin restarts the command. Kept as-is.

use std::collections::HashMap;
use teloxide::types::ChatId;
use tokio::sync::Mutex;

use crate::core::error::AppResult;
use crate::storage::db::{RecordField, RecordFilter};

/// One inbound message as seen by a step.
#[derive(Debug, Clone, Copy)]
pub enum StepInput<'a> {
    /// Plain text body
    Text(&'a str),
    /// Document attachment, by opaque transport file handle
    Document(&'a str),
}

/// Broadcast destination chosen in the send flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendTarget {
    /// Every stored user_id
    All,
    /// Exactly one user_id
    One(i64),
}

/// Which kind of content a send flow collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendKind {
    Message,
    File,
}

impl SendKind {
    fn command(self) -> &'static str {
        match self {
            SendKind::Message => "/send_message",
            SendKind::File => "/send_file",
        }
    }
}

/// Terminal effect of a completed flow, executed by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowAction {
    /// Upsert-by-user_id into the contact table
    SaveRecord {
        user_id: i64,
        user: String,
        name: String,
        tag: String,
        phone: String,
    },
    /// Open a filtered paginated listing
    ListFiltered(RecordFilter),
    /// Rewrite one field of an existing record
    ReplaceField {
        id: i64,
        field: RecordField,
        value: String,
    },
    /// Delete by surrogate id; the executor reports "deleted" or "not found"
    DeleteRecord { id: i64 },
    /// Send text to the target(s)
    SendText { target: SendTarget, text: String },
    /// Send a document to the target(s)
    SendDocument { target: SendTarget, file_id: String },
}

/// Outcome of feeding one message into a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Input accepted; send `prompt` and await the next message.
    /// `show_records` asks the dispatcher to show the full listing first.
    Advance { prompt: String, show_records: bool },
    /// Input rejected; same step re-armed, accumulated state unchanged
    Retry { error: String },
    /// Flow finished; run the action and discard the state
    Complete(FlowAction),
    /// Flow abandoned with a terminal message; the admin restarts the command
    Abort { message: String },
}

/// Lookups a step may need against live data.
///
/// Kept behind a trait so step logic stays testable without a database.
pub trait FlowContext {
    /// Whether a record with this surrogate id currently exists
    fn record_exists(&self, id: i64) -> AppResult<bool>;
}

// ---------------------------------------------------------------------------
// Per-flow step states
// ---------------------------------------------------------------------------

/// Add flow: user id → handle → name → tag → phone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddStep {
    UserId,
    User { user_id: i64 },
    Name { user_id: i64, user: String },
    Tag { user_id: i64, user: String, name: String },
    Phone { user_id: i64, user: String, name: String, tag: String },
}

/// View flow: criterion choice, then the value to filter by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewStep {
    Choice,
    Value { by_user: bool },
}

/// Replace flow: target Number, then the new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceStep {
    Id,
    Value { id: i64 },
}

/// Send flows: destination choice, optional recipient id, then content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStep {
    Choice,
    RecipientId,
    Content { target: SendTarget },
}

/// A pending conversation for one chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Add(AddStep),
    View(ViewStep),
    Replace { field: RecordField, step: ReplaceStep },
    Delete,
    Send { kind: SendKind, step: SendStep },
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn parse_digits(text: &str) -> Option<i64> {
    let text = text.trim();
    if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
        text.parse().ok()
    } else {
        None
    }
}

/// `@`-prefixed handle: at least one trailing char, all `[A-Za-z0-9_]`.
fn valid_handle(text: &str) -> bool {
    match text.strip_prefix('@') {
        Some(rest) => !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
        None => false,
    }
}

/// `+`-prefixed phone: at least one trailing char, all digits.
fn valid_phone(text: &str) -> bool {
    match text.strip_prefix('+') {
        Some(rest) => !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Literal `-` stores as the empty string ("unset").
fn dash_to_empty(text: &str) -> String {
    if text == "-" {
        String::new()
    } else {
        text.to_string()
    }
}

fn advance(prompt: impl Into<String>) -> StepResult {
    StepResult::Advance {
        prompt: prompt.into(),
        show_records: false,
    }
}

fn retry(error: impl Into<String>) -> StepResult {
    StepResult::Retry { error: error.into() }
}

// ---------------------------------------------------------------------------
// Flow transitions
// ---------------------------------------------------------------------------

impl Flow {
    pub fn add() -> Self {
        Flow::Add(AddStep::UserId)
    }

    pub fn view() -> Self {
        Flow::View(ViewStep::Choice)
    }

    pub fn replace(field: RecordField) -> Self {
        Flow::Replace { field, step: ReplaceStep::Id }
    }

    pub fn delete() -> Self {
        Flow::Delete
    }

    pub fn send(kind: SendKind) -> Self {
        Flow::Send { kind, step: SendStep::Choice }
    }

    /// Command hint appended to error messages, as the original bot did.
    pub fn command(&self) -> &'static str {
        match self {
            Flow::Add(_) => "/add",
            Flow::View(_) => "/view",
            Flow::Replace { field, .. } => match field {
                RecordField::Name => "/replace_name",
                RecordField::User => "/replace_user",
                RecordField::Tag => "/replace_tag",
            },
            Flow::Delete => "/delete",
            Flow::Send { kind, .. } => kind.command(),
        }
    }

    /// Prompt sent when the flow is entered.
    pub fn entry_prompt(&self) -> String {
        match self {
            Flow::Add(_) => "Напишіть user ID яке хочете зберегти:".to_string(),
            Flow::View(_) => "Оберіть критерій для перегляду записів:\n1 - За user_name.\n2 - За name.".to_string(),
            Flow::Replace { field, .. } => {
                format!("Введіть Number кому хочете замінити {}:", field.column())
            }
            Flow::Delete => "Введіть Number запису для видалення:".to_string(),
            Flow::Send { kind: SendKind::Message, .. } => {
                "Оберіть критерій для надіслання повідомлення:\n1 - Надіслати всім.\n2 - Надіслати за ID.".to_string()
            }
            Flow::Send { kind: SendKind::File, .. } => {
                "Оберіть критерій для надіслання файла:\n1 - Надіслати всім.\n2 - Надіслати за ID.".to_string()
            }
        }
    }

    /// Whether the entry prompt is a `1`/`2` choice (gets the small keyboard).
    pub fn starts_with_choice(&self) -> bool {
        matches!(self, Flow::View(_) | Flow::Send { .. })
    }

    /// Feed one message into the flow.
    ///
    /// Consumes the flow and returns the state to re-arm (if any) together
    /// with the step outcome. `Retry` re-arms the same step with its
    /// accumulated data untouched; `Complete` and `Abort` are terminal.
    pub fn feed(
        self,
        input: StepInput<'_>,
        ctx: &dyn FlowContext,
    ) -> AppResult<(Option<Flow>, StepResult)> {
        let cmd = self.command();
        match self {
            Flow::Add(step) => Ok(feed_add(step, input, cmd)),
            Flow::View(step) => Ok(feed_view(step, input, cmd)),
            Flow::Replace { field, step } => feed_replace(field, step, input, cmd, ctx),
            Flow::Delete => Ok(feed_delete(input, cmd)),
            Flow::Send { kind, step } => Ok(feed_send(kind, step, input, cmd)),
        }
    }
}

fn feed_add(step: AddStep, input: StepInput<'_>, cmd: &str) -> (Option<Flow>, StepResult) {
    match step {
        AddStep::UserId => match text_of(input) {
            Some(text) => match parse_digits(text) {
                Some(user_id) => (
                    Some(Flow::Add(AddStep::User { user_id })),
                    advance("Введіть тег користувача який починається з @:"),
                ),
                None => (
                    Some(Flow::Add(AddStep::UserId)),
                    retry(format!("❌ Введіть user ID у форматі (цифрами).\n{}", cmd)),
                ),
            },
            None => (
                Some(Flow::Add(AddStep::UserId)),
                retry(format!("❌ Введіть user ID у форматі (цифрами).\n{}", cmd)),
            ),
        },
        AddStep::User { user_id } => match text_of(input).map(str::trim) {
            Some(text) if valid_handle(text) => (
                Some(Flow::Add(AddStep::Name { user_id, user: text.to_string() })),
                advance("Введіть name:"),
            ),
            _ => (
                Some(Flow::Add(AddStep::User { user_id })),
                retry(format!("❌ Введіть тег у форматі (@user_name).\n{}", cmd)),
            ),
        },
        AddStep::Name { user_id, user } => match text_of(input).map(str::trim) {
            // Any text is accepted verbatim; there is no retry path here
            Some(text) => (
                Some(Flow::Add(AddStep::Tag {
                    user_id,
                    user,
                    name: text.to_string(),
                })),
                advance("Введіть tag (або - якщо немає):"),
            ),
            None => (
                Some(Flow::Add(AddStep::Name { user_id, user })),
                retry(format!("❌ Надішліть текстове повідомлення.\n{}", cmd)),
            ),
        },
        AddStep::Tag { user_id, user, name } => match text_of(input).map(str::trim) {
            Some(text) => (
                Some(Flow::Add(AddStep::Phone {
                    user_id,
                    user,
                    name,
                    tag: dash_to_empty(text),
                })),
                advance("Введіть телефон у форматі (+цифри) або - якщо немає:"),
            ),
            None => (
                Some(Flow::Add(AddStep::Tag { user_id, user, name })),
                retry(format!("❌ Надішліть текстове повідомлення.\n{}", cmd)),
            ),
        },
        AddStep::Phone { user_id, user, name, tag } => match text_of(input).map(str::trim) {
            Some(text) if text == "-" || valid_phone(text) => (
                None,
                StepResult::Complete(FlowAction::SaveRecord {
                    user_id,
                    user,
                    name,
                    tag,
                    phone: dash_to_empty(text),
                }),
            ),
            _ => (
                // Accumulated (user_id, user, name, tag) stays intact
                Some(Flow::Add(AddStep::Phone { user_id, user, name, tag })),
                retry(format!("❌ Введіть телефон у форматі (+цифри) або -.\n{}", cmd)),
            ),
        },
    }
}

fn feed_view(step: ViewStep, input: StepInput<'_>, cmd: &str) -> (Option<Flow>, StepResult) {
    match step {
        ViewStep::Choice => match text_of(input).map(str::trim) {
            Some("1") => (
                Some(Flow::View(ViewStep::Value { by_user: true })),
                advance("Введіть user_name для перегляду записів:"),
            ),
            Some("2") => (
                Some(Flow::View(ViewStep::Value { by_user: false })),
                advance("Введіть name для перегляду записів:"),
            ),
            // Invalid choice abandons the flow; no re-arm
            _ => (None, StepResult::Abort { message: format!("❌ Невірний вибір.\n{}", cmd) }),
        },
        ViewStep::Value { by_user } => match text_of(input) {
            Some(text) => {
                let filter = if by_user {
                    RecordFilter::ByUser(text.trim().to_string())
                } else {
                    RecordFilter::ByName(text.trim().to_string())
                };
                (None, StepResult::Complete(FlowAction::ListFiltered(filter)))
            }
            None => (
                Some(Flow::View(ViewStep::Value { by_user })),
                retry(format!("❌ Надішліть текстове повідомлення.\n{}", cmd)),
            ),
        },
    }
}

fn feed_replace(
    field: RecordField,
    step: ReplaceStep,
    input: StepInput<'_>,
    cmd: &str,
    ctx: &dyn FlowContext,
) -> AppResult<(Option<Flow>, StepResult)> {
    match step {
        ReplaceStep::Id => match text_of(input).and_then(parse_digits) {
            Some(id) => {
                if ctx.record_exists(id)? {
                    Ok((
                        Some(Flow::Replace { field, step: ReplaceStep::Value { id } }),
                        advance(format!("Введіть новий {}:", field.column())),
                    ))
                } else {
                    // Terminal: the admin re-runs the command with a valid Number
                    Ok((None, StepResult::Abort { message: "❔ Такого Number немає.".to_string() }))
                }
            }
            None => Ok((
                Some(Flow::Replace { field, step: ReplaceStep::Id }),
                retry(format!("❌ Введіть Number у форматі (цифрами).\n{}", cmd)),
            )),
        },
        ReplaceStep::Value { id } => match text_of(input).map(str::trim) {
            Some(text) => {
                let value = match field {
                    RecordField::User => {
                        if !valid_handle(text) {
                            return Ok((
                                Some(Flow::Replace { field, step: ReplaceStep::Value { id } }),
                                retry(format!("❌ Введіть тег у форматі (@user_name).\n{}", cmd)),
                            ));
                        }
                        text.to_string()
                    }
                    RecordField::Tag => dash_to_empty(text),
                    RecordField::Name => text.to_string(),
                };
                Ok((None, StepResult::Complete(FlowAction::ReplaceField { id, field, value })))
            }
            None => Ok((
                Some(Flow::Replace { field, step: ReplaceStep::Value { id } }),
                retry(format!("❌ Надішліть текстове повідомлення.\n{}", cmd)),
            )),
        },
    }
}

fn feed_delete(input: StepInput<'_>, cmd: &str) -> (Option<Flow>, StepResult) {
    match text_of(input).and_then(parse_digits) {
        // The executor reports "deleted" or "not found" depending on the row
        Some(id) => (None, StepResult::Complete(FlowAction::DeleteRecord { id })),
        None => (
            Some(Flow::Delete),
            retry(format!("❌ Введіть числом Number.\n{}", cmd)),
        ),
    }
}

fn feed_send(
    kind: SendKind,
    step: SendStep,
    input: StepInput<'_>,
    cmd: &str,
) -> (Option<Flow>, StepResult) {
    match step {
        SendStep::Choice => match text_of(input).map(str::trim) {
            Some("1") => {
                let prompt = match kind {
                    SendKind::Message => "Введіть повідомлення яке хочете надіслати всім:",
                    SendKind::File => "Скиньте файл який хочете надіслати всім:",
                };
                (
                    Some(Flow::Send { kind, step: SendStep::Content { target: SendTarget::All } }),
                    advance(prompt),
                )
            }
            Some("2") => {
                let prompt = match kind {
                    SendKind::Message => "Введіть user ID кому хочете надіслати повідомлення:",
                    SendKind::File => "Введіть user ID кому хочете надіслати файл:",
                };
                (
                    Some(Flow::Send { kind, step: SendStep::RecipientId }),
                    StepResult::Advance { prompt: prompt.to_string(), show_records: true },
                )
            }
            // Invalid choice abandons the flow; no re-arm
            _ => (None, StepResult::Abort { message: format!("❌ Невірний вибір.\n{}", cmd) }),
        },
        SendStep::RecipientId => match text_of(input).and_then(parse_digits) {
            Some(user_id) => {
                let prompt = match kind {
                    SendKind::Message => "Введіть повідомлення яке хочете надіслати:",
                    SendKind::File => "Скиньте файл який хочете надіслати:",
                };
                (
                    Some(Flow::Send {
                        kind,
                        step: SendStep::Content { target: SendTarget::One(user_id) },
                    }),
                    advance(prompt),
                )
            }
            None => (
                Some(Flow::Send { kind, step: SendStep::RecipientId }),
                retry(format!("❌ Введіть user ID у форматі (цифрами).\n{}", cmd)),
            ),
        },
        SendStep::Content { target } => match (kind, input) {
            (SendKind::Message, StepInput::Text(text)) => (
                None,
                StepResult::Complete(FlowAction::SendText { target, text: text.to_string() }),
            ),
            (SendKind::Message, StepInput::Document(_)) => (
                Some(Flow::Send { kind, step: SendStep::Content { target } }),
                retry(format!("❌ Надішліть текстове повідомлення.\n{}", cmd)),
            ),
            (SendKind::File, StepInput::Document(file_id)) => (
                None,
                StepResult::Complete(FlowAction::SendDocument {
                    target,
                    file_id: file_id.to_string(),
                }),
            ),
            (SendKind::File, StepInput::Text(_)) => (
                Some(Flow::Send { kind, step: SendStep::Content { target } }),
                retry(format!("❌ Не отримано файл, скиньте файл.\n{}", cmd)),
            ),
        },
    }
}

fn text_of(input: StepInput<'_>) -> Option<&str> {
    match input {
        StepInput::Text(text) => Some(text),
        StepInput::Document(_) => None,
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Pending flows, one per chat.
///
/// The explicit `(chat → flow)` map replaces the original's implicit
/// "resume where the last message left off" callback registration; unrelated
/// chats get independent entries and never contend beyond the map lock.
pub struct FlowRegistry {
    flows: Mutex<HashMap<ChatId, Flow>>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self { flows: Mutex::new(HashMap::new()) }
    }

    /// Start a flow for a chat, replacing any pending one.
    pub async fn begin(&self, chat: ChatId, flow: Flow) {
        self.flows.lock().await.insert(chat, flow);
    }

    /// Remove and return the pending flow, if any. The caller feeds it and
    /// calls [`FlowRegistry::resume`] when the flow is still alive.
    pub async fn take(&self, chat: ChatId) -> Option<Flow> {
        self.flows.lock().await.remove(&chat)
    }

    /// Re-arm a flow after a non-terminal step.
    pub async fn resume(&self, chat: ChatId, flow: Flow) {
        self.flows.lock().await.insert(chat, flow);
    }

    /// Drop any pending flow for the chat.
    pub async fn cancel(&self, chat: ChatId) {
        self.flows.lock().await.remove(&chat);
    }
}

impl Default for FlowRegistry {
    fn default() -> Self {
        Self::new()
    }
}
