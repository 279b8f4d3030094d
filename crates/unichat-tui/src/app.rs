use std::path::PathBuf;

use ratatui::widgets::ListState;
use tokio::task::{JoinError, JoinHandle};
use unichat_core::{ChatError, ChatMessage, Config, Dispatcher, Phase, Session, Settings, Turn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// A request running on a background task, plus the turn it belongs to.
pub struct PendingReply {
    turn: Turn,
    task: JoinHandle<Result<String, ChatError>>,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Input box
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars

    // Chat log
    pub messages: Vec<ChatMessage>,
    pub chat_scroll: u16,
    pub chat_height: u16, // inner height of the chat pane, set during render
    pub chat_width: u16,  // inner width of the chat pane, set during render

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Model picker state
    pub show_model_picker: bool,
    pub models: Vec<String>,
    pub model_picker_state: ListState,

    // Conversation
    pub session: Session,
    pub dispatcher: Dispatcher,
    pub pending: Option<PendingReply>,

    /// Where the picked model is remembered; `None` disables saving.
    pub config_path: Option<PathBuf>,
}

impl App {
    pub fn new(settings: &Settings, config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            input: String::new(),
            cursor: 0,
            messages: vec![
                ChatMessage::notice("System online"),
                ChatMessage::notice(
                    "Select a model with 'm' (after Esc) and start chatting with your offline AI.",
                ),
            ],
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
            show_model_picker: false,
            models: settings.models.clone(),
            model_picker_state: ListState::default(),
            session: settings.session(),
            dispatcher: Dispatcher::new(settings.client()?),
            pending: None,
            config_path,
        })
    }

    pub fn phase(&self) -> Phase {
        if self.pending.is_some() {
            Phase::AwaitingResponse
        } else {
            Phase::Idle
        }
    }

    pub fn is_busy(&self) -> bool {
        self.phase() == Phase::AwaitingResponse
    }

    /// Send the input box contents. Blank input and input typed while a
    /// reply is outstanding are ignored. Returns whether a request started.
    pub fn submit(&mut self) -> bool {
        let text = self.input.trim().to_string();
        if text.is_empty() || self.is_busy() {
            return false;
        }

        self.messages.push(ChatMessage::user(text.clone()));
        self.input.clear();
        self.cursor = 0;

        let turn = self.session.start_turn(&text);
        let dispatcher = self.dispatcher.clone();
        let request = turn.clone();
        let task = tokio::spawn(async move { dispatcher.generate(&request).await });
        self.pending = Some(PendingReply { turn, task });

        self.animation_frame = 0;
        self.scroll_to_bottom();
        true
    }

    /// Collect the outstanding reply if its task has finished.
    pub async fn poll_pending(&mut self) {
        let finished = self
            .pending
            .as_ref()
            .map(|pending| pending.task.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }

        if let Some(pending) = self.pending.take() {
            let result = pending.task.await;
            self.finish_turn(&pending.turn, result);
        }
    }

    /// Wait for the outstanding reply, however long it takes.
    #[cfg(test)]
    pub async fn wait_for_reply(&mut self) {
        if let Some(pending) = self.pending.take() {
            let result = pending.task.await;
            self.finish_turn(&pending.turn, result);
        }
    }

    fn finish_turn(&mut self, turn: &Turn, result: Result<Result<String, ChatError>, JoinError>) {
        match result {
            Ok(Ok(reply)) => {
                if self.session.commit(turn, &reply) {
                    self.messages
                        .push(ChatMessage::assistant(turn.model.clone(), reply));
                }
            }
            Ok(Err(e)) => {
                self.messages.push(ChatMessage::error(e.to_string()));
            }
            Err(e) => {
                tracing::error!(error = %e, "generation task did not complete");
                self.messages
                    .push(ChatMessage::error(format!("Error: request task failed: {}", e)));
            }
        }
        self.scroll_to_bottom();
    }

    // Model picker methods
    pub fn open_model_picker(&mut self) {
        if self.is_busy() {
            self.messages.push(ChatMessage::notice(
                "Wait for the current reply before switching models.",
            ));
            self.scroll_to_bottom();
            return;
        }

        if self.models.is_empty() {
            return;
        }

        // Select current model if in list, otherwise first
        let current_idx = self
            .models
            .iter()
            .position(|m| m == self.session.model())
            .unwrap_or(0);
        self.model_picker_state.select(Some(current_idx));
        self.show_model_picker = true;
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = self.models.len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        let Some(model) = self
            .model_picker_state
            .selected()
            .and_then(|i| self.models.get(i))
            .cloned()
        else {
            return;
        };

        self.show_model_picker = false;
        self.switch_model(&model);
    }

    /// Point the session at `model`, discarding the conversation so far.
    pub fn switch_model(&mut self, model: &str) {
        if self.is_busy() {
            return;
        }

        self.session.reset(model);
        self.messages
            .push(ChatMessage::notice(format!("Switched model to: {}", model)));
        self.scroll_to_bottom();

        if let Some(path) = &self.config_path {
            if let Err(e) = Config::save_default_model(path, model) {
                tracing::warn!(error = %e, "could not save default model");
            }
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.content_lines().saturating_sub(self.visible_height());
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max);
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    /// Scroll chat so the newest message (or "Thinking...") is visible
    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.content_lines().saturating_sub(self.visible_height());
    }

    fn visible_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    /// Rendered line count of the chat log, including wrapping.
    fn content_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for msg in &self.messages {
            total_lines = total_lines.saturating_add(1); // label line
            for line in msg.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                let wrapped = if char_count == 0 {
                    1
                } else {
                    char_count.div_ceil(wrap_width)
                };
                total_lines = total_lines.saturating_add(wrapped as u16);
            }
            total_lines = total_lines.saturating_add(1); // blank line after message
        }

        if self.is_busy() {
            total_lines = total_lines.saturating_add(2); // "AI:" + "Thinking..."
        }
        total_lines
    }
}
