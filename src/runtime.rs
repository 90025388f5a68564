//! Per-session game runtime.
//!
//! Every live session is owned by exactly one task. All mutations for the
//! session flow through its command queue, which serializes client input,
//! disconnect handling, and internal timers without any further locking.
//! Events the task emits go out through the session's broadcast channel in
//! emission order.

use crate::awards;
use crate::hub::SessionHandle;
use crate::protocol::*;
use crate::store::{Store, StoreError};
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Pause between the last answer and the result reveal.
pub const REVEAL_DELAY: Duration = Duration::from_secs(2);
/// How long results stay on screen before the next question.
pub const RESULTS_DISPLAY: Duration = Duration::from_secs(5);
/// Resume countdown starts here and ticks once per second.
pub const COUNTDOWN_START: u8 = 3;
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);
/// Minimum spacing between accepted reactions per player.
pub const REACTION_COOLDOWN: Duration = Duration::from_millis(500);
/// Cadence of the stale-player sweep.
const HEARTBEAT_SWEEP: Duration = Duration::from_secs(5);
/// A connected player falls stale after this many silent seconds.
pub const STALE_AFTER_SECS: i64 = 15;

/// Identifies one attached client channel within a session.
pub type ConnId = u64;
/// Direct line back to a single client, for to-sender-only events.
pub type ReplyTx = mpsc::UnboundedSender<ServerEvent>;

/// Input queue of a session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// A client channel attached; `reply` receives its to-sender events.
    Attach { conn: ConnId, reply: ReplyTx },
    /// A decoded frame from an attached client.
    Message { conn: ConnId, message: ClientMessage },
    /// The client channel closed.
    Closed { conn: ConnId },
}

struct Conn {
    reply: ReplyTx,
    player_id: Option<PlayerId>,
}

/// What the next deadline means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    /// Reveal delay before `question_result`.
    Reveal,
    /// Results display before advancing.
    Results,
    /// Resume countdown; the value is the next count to emit, 0 completes.
    Countdown(u8),
}

pub struct SessionRuntime {
    store: Arc<Store>,
    session_id: SessionId,
    code: SessionCode,
    quiz: Quiz,
    events: tokio::sync::broadcast::Sender<ServerEvent>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    conns: HashMap<ConnId, Conn>,
    /// The question currently on screen, if any.
    current: Option<Question>,
    /// True only while the current question accepts answers.
    answers_open: bool,
    pending: Pending,
    deadline: Option<Instant>,
    /// Timer state parked by a pause, restored when the resume completes.
    stashed: Option<(Pending, Option<Duration>)>,
    last_reaction: HashMap<PlayerId, Instant>,
}

impl SessionRuntime {
    /// Spawn the session task and hand back its channel endpoints.
    pub fn spawn(store: Arc<Store>, session: &GameSession, quiz: Quiz) -> SessionHandle {
        let (handle, command_rx) = SessionHandle::new();
        let runtime = SessionRuntime {
            store,
            session_id: session.id.clone(),
            code: session.code.clone(),
            quiz,
            events: handle.events.clone(),
            commands: command_rx,
            conns: HashMap::new(),
            current: None,
            answers_open: false,
            pending: Pending::None,
            deadline: None,
            stashed: None,
            last_reaction: HashMap::new(),
        };
        tokio::spawn(runtime.run());
        handle
    }

    async fn run(mut self) {
        tracing::info!(code = %self.code, "session runtime started");
        let mut sweep = tokio::time::interval(HEARTBEAT_SWEEP);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    // The hub entry is gone; nothing can reach us anymore.
                    None => break,
                },
                _ = sweep.tick() => self.sweep_heartbeats().await,
                _ = tokio::time::sleep_until(self.deadline.unwrap_or_else(Instant::now)),
                    if self.deadline.is_some() =>
                {
                    self.deadline = None;
                    self.handle_deadline().await;
                }
            }
        }
        tracing::info!(code = %self.code, "session runtime stopped");
    }

    fn broadcast(&self, event: ServerEvent) {
        // No receivers connected is fine.
        let _ = self.events.send(event);
    }

    fn reply(&self, conn: ConnId, event: ServerEvent) {
        if let Some(c) = self.conns.get(&conn) {
            let _ = c.reply.send(event);
        }
    }

    fn reply_error(&self, conn: ConnId, kind: ErrorKind, message: impl Into<String>) {
        self.reply(conn, ServerEvent::error(kind, message));
    }

    fn player_of(&self, conn: ConnId) -> Option<PlayerId> {
        self.conns.get(&conn).and_then(|c| c.player_id.clone())
    }

    /// Current session row; a missing row mid-game is an invariant breach,
    /// reported to the sender and logged.
    async fn session_or_report(&self, conn: ConnId) -> Option<GameSession> {
        match self.store.session(&self.session_id).await {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::error!(code = %self.code, error = %e, "session row unavailable");
                self.reply_error(conn, ErrorKind::InternalError, "session state unavailable");
                None
            }
        }
    }

    /// Resolve the sender as the session's host, or refuse with
    /// `unauthorized`. Host authority is tied to the player row the session
    /// points at, so a reconnected host keeps it.
    async fn require_host(&self, conn: ConnId) -> Option<GameSession> {
        let session = self.session_or_report(conn).await?;
        let player_id = self.player_of(conn);
        if player_id.is_some() && session.host == player_id {
            Some(session)
        } else {
            self.reply_error(conn, ErrorKind::Unauthorized, "only the host can do that");
            None
        }
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Attach { conn, reply } => {
                self.conns.insert(
                    conn,
                    Conn {
                        reply,
                        player_id: None,
                    },
                );
                self.send_snapshot(conn).await;
            }
            SessionCommand::Message { conn, message } => self.handle_message(conn, message).await,
            SessionCommand::Closed { conn } => self.handle_closed(conn).await,
        }
    }

    async fn handle_message(&mut self, conn: ConnId, message: ClientMessage) {
        match message {
            ClientMessage::Join { player_name } => self.handle_join(conn, player_name).await,
            ClientMessage::BecomeHost {} => self.handle_become_host(conn).await,
            ClientMessage::StartGame {} => self.handle_start_game(conn).await,
            ClientMessage::PauseGame {} => self.handle_pause_game(conn).await,
            ClientMessage::ResumeGame {} => self.handle_resume_game(conn).await,
            ClientMessage::SkipQuestion {} => self.handle_skip_question(conn).await,
            ClientMessage::EndGame {} => self.handle_end_game(conn).await,
            ClientMessage::NextQuestion {} => self.handle_next_question(conn).await,
            ClientMessage::Answer {
                question_uuid,
                choice_id,
                time_taken,
            } => {
                self.handle_answer(conn, question_uuid, choice_id, time_taken)
                    .await
            }
            ClientMessage::Ping {} => self.handle_ping(conn).await,
            ClientMessage::Reaction { emoji } => self.handle_reaction(conn, emoji).await,
        }
    }

    async fn handle_join(&mut self, conn: ConnId, player_name: String) {
        let name = player_name.trim().to_string();
        if name.is_empty() {
            self.reply_error(conn, ErrorKind::MissingField, "player_name must not be empty");
            return;
        }

        let Some(session) = self.session_or_report(conn).await else {
            return;
        };
        if session.state == SessionState::Finished {
            self.reply_error(conn, ErrorKind::InvalidState, "session already finished");
            return;
        }

        let (player, created) = match self.store.get_or_create_player(&self.session_id, &name).await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(code = %self.code, error = %e, "join failed");
                self.reply_error(conn, ErrorKind::InternalError, "could not join session");
                return;
            }
        };

        if let Some(c) = self.conns.get_mut(&conn) {
            c.player_id = Some(player.id.clone());
        }
        tracing::info!(code = %self.code, player = %player.name, created, "player joined");

        self.reply(
            conn,
            ServerEvent::Joined {
                player: PlayerInfo::from(&player),
            },
        );
        self.broadcast(ServerEvent::PlayerJoined {
            player: PlayerInfo::from(&player),
        });

        // A client landing in a game already underway gets a fresh snapshot
        // to replace whatever it had.
        if matches!(session.state, SessionState::Running | SessionState::Paused) {
            self.send_snapshot(conn).await;
        }
    }

    async fn handle_become_host(&mut self, conn: ConnId) {
        let Some(player_id) = self.player_of(conn) else {
            self.reply_error(conn, ErrorKind::NotJoined, "join the session first");
            return;
        };

        match self.store.set_host(&player_id).await {
            Ok(player) => {
                tracing::info!(code = %self.code, player = %player.name, "host assigned");
                self.broadcast(ServerEvent::HostAssigned {
                    player: PlayerInfo::from(&player),
                });
            }
            Err(StoreError::AlreadyHasHost) => {
                self.reply_error(
                    conn,
                    ErrorKind::AlreadyHasHost,
                    "this session already has a host",
                );
            }
            Err(e) => {
                tracing::error!(code = %self.code, error = %e, "become_host failed");
                self.reply_error(conn, ErrorKind::InternalError, "could not assign host");
            }
        }
    }

    async fn handle_start_game(&mut self, conn: ConnId) {
        let Some(session) = self.require_host(conn).await else {
            return;
        };
        if session.state != SessionState::Waiting {
            self.reply_error(conn, ErrorKind::InvalidState, "game already started");
            return;
        }

        if self.set_state_or_report(conn, SessionState::Running).await.is_none() {
            return;
        }
        tracing::info!(code = %self.code, "game started");
        self.broadcast(ServerEvent::GameStarted {});
        self.begin_question().await;
    }

    async fn handle_pause_game(&mut self, conn: ConnId) {
        let Some(session) = self.require_host(conn).await else {
            return;
        };
        if session.state != SessionState::Running {
            self.reply_error(conn, ErrorKind::InvalidState, "game is not running");
            return;
        }

        self.park_timers();
        if self.set_state_or_report(conn, SessionState::Paused).await.is_none() {
            return;
        }
        tracing::info!(code = %self.code, "game paused");
        self.broadcast(ServerEvent::GamePaused {});
    }

    async fn handle_resume_game(&mut self, conn: ConnId) {
        let Some(session) = self.require_host(conn).await else {
            return;
        };
        if session.state != SessionState::Paused {
            self.reply_error(conn, ErrorKind::InvalidState, "game is not paused");
            return;
        }
        if matches!(self.pending, Pending::Countdown(_)) {
            self.reply_error(conn, ErrorKind::InvalidState, "resume already in progress");
            return;
        }

        // 3-2-1 at one-second intervals, then the game reopens.
        self.broadcast(ServerEvent::Countdown {
            count: COUNTDOWN_START,
        });
        self.pending = Pending::Countdown(COUNTDOWN_START - 1);
        self.deadline = Some(Instant::now() + COUNTDOWN_TICK);
    }

    async fn complete_resume(&mut self) {
        if self.store.set_state(&self.session_id, SessionState::Running).await.is_err() {
            tracing::error!(code = %self.code, "failed to record resume");
            return;
        }
        tracing::info!(code = %self.code, "game resumed");
        self.broadcast(ServerEvent::GameResumed {});

        // Restore whatever interval the pause interrupted.
        if let Some((pending, remaining)) = self.stashed.take() {
            self.pending = pending;
            self.deadline = remaining.map(|r| Instant::now() + r);
        } else {
            self.pending = Pending::None;
        }
    }

    async fn handle_skip_question(&mut self, conn: ConnId) {
        let Some(session) = self.require_host(conn).await else {
            return;
        };
        if session.state != SessionState::Running || !self.answers_open {
            self.reply_error(conn, ErrorKind::InvalidState, "no question to skip");
            return;
        }

        // Skip reveals immediately; players without an answer simply get
        // nothing for this question and keep their streaks.
        tracing::info!(code = %self.code, "question skipped by host");
        self.answers_open = false;
        self.emit_question_result().await;
        self.pending = Pending::Results;
        self.deadline = Some(Instant::now() + RESULTS_DISPLAY);
    }

    async fn handle_next_question(&mut self, conn: ConnId) {
        let Some(session) = self.require_host(conn).await else {
            return;
        };
        if session.state != SessionState::Running || self.pending != Pending::Results {
            self.reply_error(conn, ErrorKind::InvalidState, "no result display to cut short");
            return;
        }

        self.deadline = None;
        self.pending = Pending::None;
        self.advance().await;
    }

    async fn handle_end_game(&mut self, conn: ConnId) {
        let Some(session) = self.require_host(conn).await else {
            return;
        };
        if session.state != SessionState::Running {
            self.reply_error(conn, ErrorKind::InvalidState, "game is not running");
            return;
        }
        tracing::info!(code = %self.code, "game ended by host");
        self.finish_game().await;
    }

    async fn handle_answer(
        &mut self,
        conn: ConnId,
        question_uuid: QuestionUuid,
        choice_id: ChoiceId,
        time_taken: f64,
    ) {
        let Some(session) = self.session_or_report(conn).await else {
            return;
        };
        match session.state {
            SessionState::Paused => {
                self.reply_error(conn, ErrorKind::Paused, "game is paused");
                return;
            }
            SessionState::Running => {}
            _ => {
                self.reply_error(conn, ErrorKind::InvalidState, "no question is being played");
                return;
            }
        }

        let Some(player_id) = self.player_of(conn) else {
            self.reply_error(conn, ErrorKind::NotJoined, "join the session first");
            return;
        };

        let current_uuid = self.current.as_ref().map(|q| q.uuid.clone());
        if !self.answers_open || current_uuid.as_deref() != Some(question_uuid.as_str()) {
            self.reply_error(conn, ErrorKind::StaleQuestion, "that question is over");
            return;
        }

        let answer = match self
            .store
            .record_answer(&player_id, &question_uuid, &choice_id, time_taken)
            .await
        {
            Ok(answer) => answer,
            Err(StoreError::AlreadyAnswered) => {
                self.reply_error(
                    conn,
                    ErrorKind::AlreadyAnswered,
                    "you already answered this question",
                );
                return;
            }
            Err(StoreError::ChoiceNotFound) => {
                self.reply_error(conn, ErrorKind::MissingField, "unknown choice for this question");
                return;
            }
            Err(e) => {
                tracing::error!(code = %self.code, error = %e, "record_answer failed");
                self.reply_error(conn, ErrorKind::InternalError, "could not record answer");
                return;
            }
        };

        let reply_text = if answer.is_correct {
            format!("Correct! +{} points", answer.points_earned)
        } else {
            "Not this time".to_string()
        };
        self.reply(
            conn,
            ServerEvent::AnswerReceived {
                is_correct: answer.is_correct,
                points_earned: answer.points_earned,
                reply: reply_text,
            },
        );

        self.broadcast_answer_stats(&question_uuid).await;
        self.maybe_complete_question().await;
    }

    async fn handle_ping(&mut self, conn: ConnId) {
        if let Some(player_id) = self.player_of(conn) {
            if let Err(e) = self.store.heartbeat(&player_id).await {
                tracing::warn!(code = %self.code, error = %e, "heartbeat for unknown player");
            }
        }
        self.reply(conn, ServerEvent::Pong {});
    }

    async fn handle_reaction(&mut self, conn: ConnId, emoji: String) {
        let Some(session) = self.session_or_report(conn).await else {
            return;
        };
        if session.state == SessionState::Finished {
            self.reply_error(conn, ErrorKind::InvalidState, "game is over");
            return;
        }
        let Some(player_id) = self.player_of(conn) else {
            self.reply_error(conn, ErrorKind::NotJoined, "join the session first");
            return;
        };

        let now = Instant::now();
        if let Some(last) = self.last_reaction.get(&player_id) {
            if now.duration_since(*last) < REACTION_COOLDOWN {
                self.reply_error(conn, ErrorKind::RateLimited, "too many reactions");
                return;
            }
        }
        self.last_reaction.insert(player_id.clone(), now);

        let player = match self.store.player(&player_id).await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(code = %self.code, error = %e, "reaction from unknown player");
                self.reply_error(conn, ErrorKind::InternalError, "could not send reaction");
                return;
            }
        };
        self.broadcast(ServerEvent::PlayerReaction {
            player_id: player.id,
            player_name: player.name,
            emoji,
        });
    }

    async fn handle_closed(&mut self, conn: ConnId) {
        let Some(closed) = self.conns.remove(&conn) else {
            return;
        };
        let Some(player_id) = closed.player_id else {
            return;
        };
        // The same player may be attached through another channel.
        if self
            .conns
            .values()
            .any(|c| c.player_id.as_deref() == Some(player_id.as_str()))
        {
            return;
        }

        if let Err(e) = self.store.set_connected(&player_id, false).await {
            tracing::warn!(code = %self.code, error = %e, "disconnect for unknown player");
            return;
        }

        let Ok(session) = self.store.session(&self.session_id).await else {
            return;
        };

        let is_host = session.host.as_deref() == Some(player_id.as_str());
        if is_host && session.state == SessionState::Running {
            // The game cannot continue leaderless; park it until the host
            // returns. The host role itself is not vacated.
            self.park_timers();
            if self
                .store
                .set_state(&self.session_id, SessionState::Paused)
                .await
                .is_ok()
            {
                tracing::warn!(code = %self.code, "host disconnected, auto-pausing");
                self.broadcast(ServerEvent::HostDisconnected {
                    message: "The host disconnected. The game is paused until they return."
                        .to_string(),
                });
            }
            return;
        }
        if is_host && matches!(self.pending, Pending::Countdown(_)) {
            // Host vanished mid-countdown: stay paused instead of resuming
            // into a leaderless game.
            self.pending = Pending::None;
            self.deadline = None;
            self.broadcast(ServerEvent::HostDisconnected {
                message: "The host disconnected during the countdown. Still paused.".to_string(),
            });
            return;
        }

        // One player fewer may satisfy the all-answered predicate.
        self.maybe_complete_question().await;
    }

    async fn sweep_heartbeats(&mut self) {
        match self.store.sweep_stale(&self.session_id, STALE_AFTER_SECS).await {
            Ok(flipped) if !flipped.is_empty() => {
                tracing::debug!(code = %self.code, stale = flipped.len(), "marked stale players");
                self.maybe_complete_question().await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(code = %self.code, error = %e, "stale sweep failed");
            }
        }
    }

    /// Fires whenever the armed deadline elapses.
    async fn handle_deadline(&mut self) {
        match self.pending {
            Pending::None => {}
            Pending::Reveal => {
                self.emit_question_result().await;
                self.pending = Pending::Results;
                self.deadline = Some(Instant::now() + RESULTS_DISPLAY);
            }
            Pending::Results => {
                self.pending = Pending::None;
                self.advance().await;
            }
            Pending::Countdown(n) => {
                if n >= 1 {
                    self.broadcast(ServerEvent::Countdown { count: n });
                    self.pending = Pending::Countdown(n - 1);
                    self.deadline = Some(Instant::now() + COUNTDOWN_TICK);
                } else {
                    self.pending = Pending::None;
                    self.complete_resume().await;
                }
            }
        }
    }

    /// Park the reveal/results timer for the duration of a pause. Scoring is
    /// unaffected: clients freeze their own timers on the pause event.
    fn park_timers(&mut self) {
        if self.pending != Pending::None || self.deadline.is_some() {
            let remaining = self
                .deadline
                .take()
                .map(|d| d.saturating_duration_since(Instant::now()));
            self.stashed = Some((self.pending, remaining));
            self.pending = Pending::None;
        }
    }

    /// Put the question at the session cursor on screen, or finish the game
    /// when the cursor ran past the end.
    async fn begin_question(&mut self) {
        let session = match self.store.session(&self.session_id).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(code = %self.code, error = %e, "cannot read session");
                return;
            }
        };

        match self
            .store
            .question_by_index(&self.session_id, session.current_question)
            .await
        {
            Ok(Some(question)) => {
                let view = QuestionView::from_question(&question, self.quiz.time_per_question);
                tracing::info!(
                    code = %self.code,
                    order = question.order,
                    "question on screen"
                );
                self.current = Some(question);
                self.answers_open = true;
                self.pending = Pending::None;
                self.deadline = None;
                self.broadcast(ServerEvent::Question { question: view });
            }
            Ok(None) => self.finish_game().await,
            Err(e) => {
                tracing::error!(code = %self.code, error = %e, "cannot read question");
            }
        }
    }

    async fn broadcast_answer_stats(&self, question_uuid: &str) {
        let counts = self
            .store
            .count_answers_for_question(&self.session_id, question_uuid)
            .await;
        let connected = self.store.count_connected_players(&self.session_id).await;
        if let (Ok((answered, correct)), Ok(connected)) = (counts, connected) {
            self.broadcast(ServerEvent::AnswerStats {
                answered: format!("{}/{}", answered, connected),
                correct,
            });
        }
    }

    /// Close the question once every connected player has answered it, then
    /// give clients a moment before the reveal.
    async fn maybe_complete_question(&mut self) {
        if !self.answers_open {
            return;
        }
        let Some(uuid) = self.current.as_ref().map(|q| q.uuid.clone()) else {
            return;
        };
        let Ok(session) = self.store.session(&self.session_id).await else {
            return;
        };
        if session.state != SessionState::Running {
            return;
        }

        match self
            .store
            .all_connected_answered(&self.session_id, &uuid)
            .await
        {
            Ok(true) => {
                self.answers_open = false;
                self.pending = Pending::Reveal;
                self.deadline = Some(Instant::now() + REVEAL_DELAY);
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(code = %self.code, error = %e, "completion check failed");
            }
        }
    }

    async fn emit_question_result(&mut self) {
        let Some(question) = self.current.clone() else {
            return;
        };
        let Some(correct) = question.correct_choice() else {
            // Store invariants guarantee one correct choice; reaching this
            // is a bug, not a client error.
            tracing::error!(code = %self.code, uuid = %question.uuid, "question has no correct choice");
            return;
        };

        let leaderboard = self.leaderboard_entries().await;
        self.broadcast(ServerEvent::QuestionResult {
            question: QuestionResultView {
                question: QuestionView::from_question(&question, self.quiz.time_per_question),
                correct_choice: ChoiceView::from(correct),
                explanation: question.explanation.clone(),
            },
            leaderboard,
        });
    }

    async fn advance(&mut self) {
        self.current = None;
        self.answers_open = false;
        match self.store.advance_question(&self.session_id).await {
            Ok(_) => self.begin_question().await,
            Err(e) => {
                tracing::error!(code = %self.code, error = %e, "advance failed");
            }
        }
    }

    async fn finish_game(&mut self) {
        self.answers_open = false;
        self.current = None;
        self.pending = Pending::None;
        self.deadline = None;
        self.stashed = None;

        if self
            .store
            .set_state(&self.session_id, SessionState::Finished)
            .await
            .is_err()
        {
            tracing::error!(code = %self.code, "failed to record finish");
            return;
        }

        let leaderboard = self.leaderboard_entries().await;
        let awards = match self.store.award_inputs(&self.session_id).await {
            Ok(records) => awards::evaluate(&records),
            Err(e) => {
                tracing::error!(code = %self.code, error = %e, "award evaluation failed");
                std::collections::BTreeMap::new()
            }
        };

        tracing::info!(code = %self.code, "game over");
        self.broadcast(ServerEvent::GameOver {
            leaderboard,
            awards,
        });
    }

    async fn leaderboard_entries(&self) -> Vec<LeaderboardEntry> {
        match self.store.leaderboard(&self.session_id).await {
            Ok(players) => players.iter().map(LeaderboardEntry::from).collect(),
            Err(e) => {
                tracing::error!(code = %self.code, error = %e, "leaderboard unavailable");
                Vec::new()
            }
        }
    }

    async fn set_state_or_report(
        &self,
        conn: ConnId,
        state: SessionState,
    ) -> Option<GameSession> {
        match self.store.set_state(&self.session_id, state).await {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::error!(code = %self.code, error = %e, "state change failed");
                self.reply_error(conn, ErrorKind::InternalError, "could not change game state");
                None
            }
        }
    }

    /// Full state snapshot, sent to one client on connect, on join into a
    /// game already underway, and on reconnect.
    async fn send_snapshot(&self, conn: ConnId) {
        let Ok(session) = self.store.session(&self.session_id).await else {
            return;
        };
        let players = match self.store.session_players(&self.session_id).await {
            Ok(players) => players.iter().map(PlayerInfo::from).collect(),
            Err(_) => Vec::new(),
        };
        let leaderboard = self.leaderboard_entries().await;

        // The question rides along only while it can still be answered.
        let question = if self.answers_open {
            self.current
                .as_ref()
                .map(|q| QuestionView::from_question(q, self.quiz.time_per_question))
        } else {
            None
        };

        self.reply(
            conn,
            ServerEvent::SessionState {
                state: session.state,
                current_question: session.current_question,
                question_count: self.quiz.question_count,
                question,
                players,
                leaderboard,
            },
        );
    }
}
