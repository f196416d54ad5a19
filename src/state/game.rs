//! Authoritative state of one game room.
//!
//! [`Game`] is plain synchronous data owned by a single dispatcher task. Every
//! mutation goes through [`Game::handle`], [`Game::on_timeout`] or one of the
//! seat-management methods, each of which pushes a fresh snapshot to all
//! participants. Work the game cannot do by itself (timers, repository writes,
//! board reloads) is queued as [`Effect`]s and drained with [`Game::take_effects`].

use std::{
    collections::BTreeSet,
    sync::Arc,
    time::{Duration, SystemTime},
};

use indexmap::IndexMap;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::models::{
        AnalyticsAnswerEntity, AnalyticsCategoryEntity, AnalyticsQuestionEntity,
        AnalyticsRoundEntity, GameAnalyticsEntity,
    },
    dto::{
        format_system_time,
        game::{
            AnswerView, CategoryView, CellView, FinalQuestionView, GameSnapshot, QuestionView,
            RoomSummary,
        },
        ws::close_code,
    },
    services::matcher,
    state::{
        board::{Answer, Board, Category, Question, QuestionRef},
        game_config::{DISPUTE_SECS, FINAL_ANSWER_SECS, FINAL_WAGER_SECS, GameConfig},
        player::{Eligibility, Player, SideChannel, SocketSender},
        state_machine::{GamePhase, InvalidTransition, PhaseEvent, RoundState, next_phase},
    },
};

/// Answer text recorded when a player lets the answer timer run out.
pub const ANSWER_TIMEOUT: &str = "answer-timeout";

const OK: u16 = 200;

/// Countdown owners. Answer and wager timers are per player.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    Phase,
    Answer(String),
    Wager(String),
}

/// Side work requested by the game, executed by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ArmTimer { slot: TimerSlot, after: Duration },
    CancelTimer(TimerSlot),
    CancelAllTimers,
    AddAlternative { answer: String, alternative: String },
    AddIncorrect { clue: String, incorrect: String },
    SaveAnalytics(GameAnalyticsEntity),
    /// Everyone voted to play again; a new board is needed.
    Restart,
}

/// Player input decoded from a play frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Pick { cat: usize, val: usize },
    Buzz { is_pass: bool },
    Answer(String),
    Wager(i64),
    Vote { accept: bool },
    InitDispute,
    Protest { target: String },
    Pause,
    Resume,
}

/// Reasons a game refuses an input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("event tagged {got:?} received while in {expected:?}")]
    InvalidPhase { expected: GamePhase, got: GamePhase },
    #[error("player cannot {0}")]
    NotEligible(&'static str),
    #[error("game is paused")]
    Paused,
    #[error("{0}")]
    InvalidInput(String),
    #[error("player `{0}` not found")]
    NotFound(String),
    #[error("game is full")]
    Full,
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

impl GameError {
    /// Expected under reordering or double clicks; never answered.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            GameError::InvalidPhase { .. } | GameError::NotEligible(_) | GameError::Paused
        )
    }
}

struct PauseState {
    flags: Vec<(String, Eligibility)>,
}

struct DisputeState {
    disputer: String,
    fallback_picker: Option<String>,
    accepts: usize,
    declines: usize,
}

/// One game room.
pub struct Game {
    name: String,
    config: GameConfig,
    capacity: usize,
    intro: Duration,
    phase: GamePhase,
    round: RoundState,
    board: Board,
    cur: Option<QuestionRef>,
    stake: i64,
    players: IndexMap<String, Player>,
    last_picker: Option<String>,
    ans_correctness: bool,
    official_answer: Option<String>,
    guessed_wrong: Vec<String>,
    passed: Vec<String>,
    final_players: BTreeSet<String>,
    final_wagers: BTreeSet<String>,
    final_answers: BTreeSet<String>,
    pause: Option<PauseState>,
    paused_at: Option<SystemTime>,
    disconnected: bool,
    dispute: Option<DisputeState>,
    round_scores: [Option<i64>; 2],
    effects: Vec<Effect>,
}

impl Game {
    pub fn new(
        name: String,
        config: GameConfig,
        capacity: usize,
        board: Board,
        intro: Duration,
    ) -> Self {
        Self {
            name,
            config,
            capacity,
            intro,
            phase: GamePhase::PreGame,
            round: RoundState::First,
            board,
            cur: None,
            stake: 0,
            players: IndexMap::new(),
            last_picker: None,
            ans_correctness: false,
            official_answer: None,
            guessed_wrong: Vec::new(),
            passed: Vec::new(),
            final_players: BTreeSet::new(),
            final_wagers: BTreeSet::new(),
            final_answers: BTreeSet::new(),
            pause: None,
            paused_at: None,
            disconnected: false,
            dispute: None,
            round_scores: [None, None],
            effects: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn round(&self) -> RoundState {
        self.round
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_some()
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    pub fn player_ids(&self) -> Vec<String> {
        self.players.keys().cloned().collect()
    }

    /// Seats still free while the game has not started.
    pub fn has_open_seat(&self) -> bool {
        self.phase == GamePhase::PreGame && self.players.len() < self.capacity
    }

    pub fn summary(&self, private: bool) -> RoomSummary {
        RoomSummary {
            name: self.name.clone(),
            players: self.players.len(),
            capacity: self.capacity,
            state: self.phase,
            private,
        }
    }

    /// Drain the side work queued by the last mutations.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Seat a new player. Only allowed before the game starts.
    pub fn add_player(&mut self, player: Player) -> Result<(), GameError> {
        if self.phase != GamePhase::PreGame {
            return Err(GameError::InvalidPhase {
                expected: GamePhase::PreGame,
                got: self.phase,
            });
        }
        if self.players.len() >= self.capacity {
            return Err(GameError::Full);
        }
        if self.players.values().any(|seated| seated.name == player.name) {
            return Err(GameError::InvalidInput(format!(
                "Sorry, {} is already taken",
                player.name
            )));
        }
        let name = player.name.clone();
        self.players.insert(player.id.clone(), player);
        if !self.maybe_auto_start()? {
            self.broadcast(&format!("{name} joined the game"));
        }
        Ok(())
    }

    /// Attach the play socket of a seated human.
    pub fn connect(&mut self, player_id: &str, tx: SocketSender) -> Result<(), GameError> {
        let player = self.player_mut(player_id)?;
        if player.is_bot() {
            return Err(GameError::InvalidInput("bots have no sockets".into()));
        }
        player.attach_play(tx);
        let name = player.name.clone();

        if self.disconnected && self.all_humans_connected() {
            return self.resume(player_id);
        }
        if !self.maybe_auto_start()? {
            self.broadcast(&format!("{name} connected"));
        }
        Ok(())
    }

    pub fn attach_side_channel(
        &mut self,
        player_id: &str,
        channel: SideChannel,
        tx: SocketSender,
    ) -> Result<String, GameError> {
        let player = self.player_mut(player_id)?;
        player.attach_side_channel(channel, tx);
        Ok(player.name.clone())
    }

    /// Forget a dropped play socket. Frees the seat before the start and
    /// pauses a running game. Returns [`Game::remaining_humans`].
    pub fn disconnect(&mut self, player_id: &str, tx: &SocketSender) -> usize {
        let Some(player) = self.players.get_mut(player_id) else {
            return self.remaining_humans();
        };
        if !player.detach_play(tx) {
            return self.remaining_humans();
        }
        let name = player.name.clone();

        if self.phase == GamePhase::PreGame {
            self.players.shift_remove(player_id);
            self.broadcast(&format!("{name} left the game"));
        } else {
            self.lost_player(player_id, &name);
        }
        self.remaining_humans()
    }

    /// Leave the game. Before the start the seat is freed, afterwards the
    /// record stays and only the connections end.
    pub fn leave(&mut self, player_id: &str) -> Result<usize, GameError> {
        let player = self.player_mut(player_id)?;
        player.end_connections();
        let name = player.name.clone();

        if self.phase == GamePhase::PreGame {
            self.players.shift_remove(player_id);
            self.broadcast(&format!("{name} left the game"));
        } else {
            self.lost_player(player_id, &name);
        }
        Ok(self.remaining_humans())
    }

    /// Humans keeping the game alive: every seated one before the start,
    /// afterwards those with a play socket.
    pub fn remaining_humans(&self) -> usize {
        self.players
            .values()
            .filter(|player| !player.is_bot())
            .filter(|player| self.phase == GamePhase::PreGame || player.is_connected())
            .count()
    }

    /// Start with the seats filled so far.
    pub fn start(&mut self, player_id: &str) -> Result<(), GameError> {
        self.player(player_id)?;
        if self.phase != GamePhase::PreGame {
            return Err(GameError::InvalidPhase {
                expected: GamePhase::PreGame,
                got: self.phase,
            });
        }
        self.begin()
    }

    /// Post-game vote to play again.
    pub fn play_again(&mut self, player_id: &str) -> Result<(), GameError> {
        if self.phase != GamePhase::PostGame {
            return Err(GameError::InvalidPhase {
                expected: GamePhase::PostGame,
                got: self.phase,
            });
        }
        let player = self.player_mut(player_id)?;
        player.play_again = true;
        let name = player.name.clone();

        let everyone = self
            .players
            .values()
            .filter(|player| !player.is_bot() && player.is_connected())
            .all(|player| player.play_again);
        if everyone {
            self.effects.push(Effect::Restart);
            self.broadcast("Everyone wants to play again");
        } else {
            let waiting = format!("{name} wants to play again");
            self.broadcast_with(close_code::INFO, |player| {
                if player.id == player_id {
                    "Waiting for all other players to play again"
                } else {
                    waiting.as_str()
                }
            });
        }
        Ok(())
    }

    /// Reset every player onto `board` and run the intro again.
    pub fn restart(&mut self, board: Board) -> Result<(), GameError> {
        if self.phase != GamePhase::PostGame {
            return Ok(());
        }
        self.board = board;
        self.round = RoundState::First;
        self.cur = None;
        self.stake = 0;
        self.official_answer = None;
        self.ans_correctness = false;
        self.reset_guesses();
        self.final_players.clear();
        self.final_wagers.clear();
        self.final_answers.clear();
        self.dispute = None;
        self.round_scores = [None, None];
        for player in self.players.values_mut() {
            player.reset();
        }
        self.transition(PhaseEvent::Restart, None)?;
        self.begin()
    }

    /// Apply one player action tagged with the phase the client believed current.
    pub fn handle(
        &mut self,
        player_id: &str,
        tag: GamePhase,
        action: Action,
    ) -> Result<(), GameError> {
        self.player(player_id)?;
        if tag != self.phase {
            return Err(GameError::InvalidPhase {
                expected: self.phase,
                got: tag,
            });
        }
        if self.pause.is_some() {
            return match action {
                Action::Resume => self.resume(player_id),
                _ => Err(GameError::Paused),
            };
        }

        match action {
            Action::Pick { cat, val } => self.pick(player_id, cat, val),
            Action::Buzz { is_pass } => self.buzz(player_id, is_pass),
            Action::Answer(text) => self.answer(player_id, text),
            Action::Wager(amount) => self.wager(player_id, amount),
            Action::Vote { accept } => self.vote(player_id, accept),
            Action::InitDispute => self.init_dispute(player_id),
            Action::Protest { target } => self.protest(player_id, &target),
            Action::Pause => self.pause(player_id, false),
            Action::Resume => Err(GameError::InvalidInput("game is not paused".into())),
        }
    }

    /// Apply the default action of an expired countdown.
    pub fn on_timeout(&mut self, slot: TimerSlot) -> Result<(), GameError> {
        if self.pause.is_some() {
            return Ok(());
        }
        match (self.phase, slot) {
            (GamePhase::BoardIntro, TimerSlot::Phase) => {
                let picker = self.last_picker.clone();
                self.transition(PhaseEvent::IntroComplete, picker.as_deref())?;
                let name = picker
                    .as_deref()
                    .map(|id| self.name_of(id))
                    .unwrap_or_default();
                self.broadcast(&format!("{name} picks first"));
                Ok(())
            }
            (GamePhase::RecvPick, TimerSlot::Phase) => {
                let picker = self
                    .players
                    .values()
                    .find(|player| player.can.pick)
                    .map(|player| player.id.clone());
                match (picker, self.board.first_available(self.round)) {
                    (Some(picker), Some((cat, val))) => self.pick(&picker, cat, val),
                    _ => Ok(()),
                }
            }
            (GamePhase::RecvBuzz, TimerSlot::Phase) => self.skip_question(),
            (GamePhase::RecvAns, TimerSlot::Answer(player_id)) => {
                if self.player(&player_id)?.can.answer {
                    self.submit(&player_id, ANSWER_TIMEOUT.to_string(), false)
                } else {
                    Ok(())
                }
            }
            (GamePhase::RecvWager, TimerSlot::Wager(player_id)) => {
                if self.player(&player_id)?.can.wager {
                    self.wager(&player_id, self.round.min_wager())
                } else {
                    Ok(())
                }
            }
            (GamePhase::RecvDispute, TimerSlot::Phase) => self.resolve_dispute(false),
            (phase, slot) => {
                debug!(game = %self.name, ?phase, ?slot, "ignoring stale timeout");
                Ok(())
            }
        }
    }

    /// Reply to one player without touching the game.
    pub fn reply(&self, player_id: &str, code: u16, message: &str) {
        if let Some(player) = self.players.get(player_id) {
            player.send_notice(code, message);
        }
    }

    /// Close the sockets and bot channels of every player.
    pub fn close(&mut self) {
        for player in self.players.values_mut() {
            player.end_connections();
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        let reveal_final = self.phase == GamePhase::PostGame;
        let hide_clue = self.phase == GamePhase::RecvWager;
        // Final answers stay private until every one of them is in.
        let hide_answers = self.round == RoundState::Final && !reveal_final;
        GameSnapshot {
            name: self.name.clone(),
            state: self.phase,
            round: self.round,
            players: self
                .players
                .values()
                .map(|player| {
                    let mut view = player.view();
                    if !reveal_final {
                        view.final_wager = 0;
                        view.final_answer.clear();
                        view.final_correct = false;
                    }
                    view
                })
                .collect(),
            first_round: categories_view(&self.board.first),
            second_round: categories_view(&self.board.second),
            cur_question: self
                .cur
                .and_then(|at| self.board.question(at))
                .map(|question| question_view(question, hide_clue, hide_answers)),
            final_question: FinalQuestionView {
                category: self.board.final_question.category.clone(),
            },
            ans_correctness: self.ans_correctness,
            guessed_wrong: self.guessed_wrong.clone(),
            passed: self.passed.clone(),
            paused: self.pause.is_some(),
            paused_at: self.paused_at.map(format_system_time),
            disconnected: self.disconnected,
            official_answer: self.official_answer.clone(),
            penalty: self.config.penalty,
            config: self.config.clone(),
            last_picker: self.last_picker.clone(),
        }
    }

    /// Analytics document for a finished game, if it qualifies for saving.
    pub fn analytics(&self) -> Option<GameAnalyticsEntity> {
        if !self.config.penalty {
            return None;
        }
        let first = round_analytics(&self.board.first, self.round_scores[0]);
        if first.answers == 0 {
            return None;
        }
        let second = if self.config.full_game {
            let second = round_analytics(&self.board.second, self.round_scores[1]);
            if second.answers == 0 {
                return None;
            }
            Some(second)
        } else {
            None
        };
        Some(GameAnalyticsEntity {
            id: Uuid::new_v4(),
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
            first_round: first,
            second_round: second,
        })
    }

    fn player(&self, player_id: &str) -> Result<&Player, GameError> {
        self.players
            .get(player_id)
            .ok_or_else(|| GameError::NotFound(player_id.to_string()))
    }

    fn player_mut(&mut self, player_id: &str) -> Result<&mut Player, GameError> {
        self.players
            .get_mut(player_id)
            .ok_or_else(|| GameError::NotFound(player_id.to_string()))
    }

    fn name_of(&self, player_id: &str) -> String {
        self.players
            .get(player_id)
            .map(|player| player.name.clone())
            .unwrap_or_default()
    }

    fn all_humans_connected(&self) -> bool {
        self.players
            .values()
            .filter(|player| !player.is_bot())
            .all(Player::is_connected)
    }

    fn maybe_auto_start(&mut self) -> Result<bool, GameError> {
        if self.phase == GamePhase::PreGame
            && self.players.len() == self.capacity
            && self.all_humans_connected()
        {
            self.begin()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn begin(&mut self) -> Result<(), GameError> {
        self.last_picker = self.players.keys().next().cloned();
        self.round = RoundState::First;
        self.transition(PhaseEvent::Start, None)?;
        self.broadcast("We are ready to play");
        Ok(())
    }

    fn lost_player(&mut self, player_id: &str, name: &str) {
        if self.phase.is_active() {
            if self.pause.is_some() {
                self.disconnected = true;
                self.broadcast(&format!("{name} disconnected"));
            } else if let Err(err) = self.pause(player_id, true) {
                debug!(game = %self.name, error = %err, "could not pause after disconnect");
            }
        } else {
            self.broadcast(&format!("{name} disconnected"));
        }
    }

    fn broadcast(&self, message: &str) {
        self.broadcast_with(OK, |_| message);
    }

    fn broadcast_with<'m>(&self, code: u16, message: impl Fn(&Player) -> &'m str) {
        let snapshot = Arc::new(self.snapshot());
        let official = self
            .cur
            .and_then(|at| self.board.question(at))
            .map(|question| question.answer.clone());
        for player in self.players.values() {
            let hint = if player.is_bot() && player.can.answer {
                official.clone()
            } else {
                None
            };
            player.send_snapshot(code, message(player), &snapshot, hint);
        }
    }

    fn transition(&mut self, event: PhaseEvent, actor: Option<&str>) -> Result<(), GameError> {
        let next = next_phase(self.phase, event)?;
        debug!(game = %self.name, from = ?self.phase, to = ?next, ?event, "phase transition");
        self.set_phase(next, actor);
        Ok(())
    }

    fn set_phase(&mut self, phase: GamePhase, actor: Option<&str>) {
        self.effects.push(Effect::CancelAllTimers);
        self.phase = phase;
        let flags: Vec<Eligibility> = self
            .players
            .keys()
            .map(|id| self.eligibility_for(id, actor))
            .collect();
        for (player, can) in self.players.values_mut().zip(flags) {
            player.update_eligibility(can);
        }
        self.arm_for_phase();
    }

    fn eligibility_for(&self, id: &str, actor: Option<&str>) -> Eligibility {
        let is_actor = actor == Some(id);
        let is_final = self.round == RoundState::Final;
        match self.phase {
            GamePhase::RecvPick => Eligibility {
                pick: is_actor,
                ..Eligibility::default()
            },
            GamePhase::RecvBuzz => Eligibility {
                buzz: !self.guessed_wrong.iter().any(|wrong| wrong == id)
                    && !self.passed.iter().any(|passed| passed == id),
                ..Eligibility::default()
            },
            GamePhase::RecvWager => Eligibility {
                wager: if is_final {
                    self.final_players.contains(id) && !self.final_wagers.contains(id)
                } else {
                    is_actor
                },
                ..Eligibility::default()
            },
            GamePhase::RecvAns => Eligibility {
                answer: if is_final {
                    self.final_players.contains(id) && !self.final_answers.contains(id)
                } else {
                    is_actor
                },
                ..Eligibility::default()
            },
            GamePhase::RecvDispute => Eligibility {
                dispute: self
                    .dispute
                    .as_ref()
                    .is_some_and(|dispute| dispute.disputer != id),
                ..Eligibility::default()
            },
            GamePhase::PreGame | GamePhase::BoardIntro | GamePhase::PostGame => {
                Eligibility::default()
            }
        }
    }

    /// Arm the countdowns of the current phase from its full duration.
    fn arm_for_phase(&mut self) {
        let is_final = self.round == RoundState::Final;
        let phase_timer = match self.phase {
            GamePhase::BoardIntro => Some(self.intro),
            GamePhase::RecvPick => Some(self.config.pick()),
            GamePhase::RecvBuzz => Some(self.config.buzz()),
            GamePhase::RecvDispute => Some(Duration::from_secs(DISPUTE_SECS)),
            _ => None,
        };
        if let Some(after) = phase_timer {
            self.effects.push(Effect::ArmTimer {
                slot: TimerSlot::Phase,
                after,
            });
        }

        let per_player: Vec<TimerSlot> = match self.phase {
            GamePhase::RecvWager => self
                .players
                .values()
                .filter(|player| player.can.wager)
                .map(|player| TimerSlot::Wager(player.id.clone()))
                .collect(),
            GamePhase::RecvAns => self
                .players
                .values()
                .filter(|player| player.can.answer)
                .map(|player| TimerSlot::Answer(player.id.clone()))
                .collect(),
            _ => Vec::new(),
        };
        for slot in per_player {
            let after = match (&slot, is_final) {
                (TimerSlot::Wager(_), true) => Duration::from_secs(FINAL_WAGER_SECS),
                (TimerSlot::Wager(_), false) => self.config.wager(),
                (_, true) => Duration::from_secs(FINAL_ANSWER_SECS),
                (_, false) => self.config.answer(),
            };
            self.effects.push(Effect::ArmTimer { slot, after });
        }
    }

    fn reset_guesses(&mut self) {
        self.guessed_wrong.clear();
        self.passed.clear();
    }

    fn no_player_can_buzz(&self) -> bool {
        self.players.keys().all(|id| {
            self.guessed_wrong.iter().any(|wrong| wrong == id)
                || self.passed.iter().any(|passed| passed == id)
        })
    }

    fn current_question(&self) -> Option<&Question> {
        self.cur.and_then(|at| self.board.question(at))
    }

    fn pick(&mut self, player_id: &str, cat: usize, val: usize) -> Result<(), GameError> {
        if !self.player(player_id)?.can.pick {
            return Err(GameError::NotEligible("pick"));
        }
        let at = QuestionRef::Cell {
            round: self.round,
            cat,
            val,
        };
        let question = self
            .board
            .question(at)
            .filter(|question| question.can_choose)
            .ok_or_else(|| GameError::InvalidInput("invalid question pick".into()))?;
        let daily_double = question.daily_double;
        let value = question.value;

        self.cur = Some(at);
        self.stake = value;
        self.official_answer = None;
        self.ans_correctness = false;
        self.last_picker = Some(player_id.to_string());
        self.reset_guesses();

        if daily_double {
            self.transition(PhaseEvent::Pick { daily_double }, Some(player_id))?;
            self.broadcast("Daily Double");
        } else {
            self.transition(PhaseEvent::Pick { daily_double }, None)?;
            self.broadcast("New Question");
        }
        Ok(())
    }

    fn buzz(&mut self, player_id: &str, is_pass: bool) -> Result<(), GameError> {
        let player = self.player_mut(player_id)?;
        if !player.can.buzz {
            return Err(GameError::NotEligible("buzz"));
        }
        let name = player.name.clone();

        if is_pass {
            player.can.buzz = false;
            self.passed.push(player_id.to_string());
            if self.no_player_can_buzz() {
                return self.skip_question();
            }
            self.broadcast(&format!("{name} passed"));
            return Ok(());
        }

        self.transition(PhaseEvent::Buzz, Some(player_id))?;
        self.broadcast(&format!("{name} buzzed in"));
        Ok(())
    }

    fn answer(&mut self, player_id: &str, text: String) -> Result<(), GameError> {
        if !self.player(player_id)?.can.answer {
            return Err(GameError::NotEligible("answer"));
        }
        self.effects
            .push(Effect::CancelTimer(TimerSlot::Answer(player_id.to_string())));
        let (correct, clue) = {
            let question = self
                .current_question()
                .ok_or_else(|| GameError::InvalidInput("no active question".into()))?;
            (
                matcher::is_correct(&text, &question.answer, &question.alternatives),
                question.clue.clone(),
            )
        };
        if !correct {
            self.effects.push(Effect::AddIncorrect {
                clue,
                incorrect: text.clone(),
            });
        }
        self.submit(player_id, text, correct)
    }

    fn submit(&mut self, player_id: &str, text: String, correct: bool) -> Result<(), GameError> {
        let player = self.player(player_id)?;
        let bot = player.is_bot();
        let stake = if self.round == RoundState::Final {
            player.final_wager
        } else {
            self.stake
        };
        if let Some(question) = self.cur.and_then(|at| self.board.question_mut(at)) {
            question.record(Answer {
                player_id: player_id.to_string(),
                text: text.clone(),
                correct,
                has_disputed: false,
                overturned: false,
                bot,
                stake,
            });
        }

        if self.round == RoundState::Final {
            return self.final_answer(player_id, text, correct);
        }
        self.ans_correctness = correct;
        self.next_question(player_id, correct)
    }

    fn next_question(&mut self, player_id: &str, correct: bool) -> Result<(), GameError> {
        let stake = self.stake;
        let penalty = self.config.penalty;
        let player = self.player_mut(player_id)?;
        if correct {
            player.update_score(stake);
        } else if penalty {
            player.update_score(-stake);
        }
        let name = player.name.clone();
        if !correct {
            self.guessed_wrong.push(player_id.to_string());
        }

        let daily_double = self
            .current_question()
            .is_some_and(|question| question.daily_double);
        let all_out = self.no_player_can_buzz();
        if correct || daily_double || all_out {
            self.close_question();
        }
        if self.board.round_exhausted(self.round) {
            return self.end_round();
        }

        if all_out {
            let picker = self.last_picker.clone();
            self.reset_guesses();
            self.transition(PhaseEvent::QuestionClosed, picker.as_deref())?;
            self.broadcast("All players guessed wrong");
        } else if correct || daily_double {
            self.reset_guesses();
            self.transition(PhaseEvent::QuestionClosed, Some(player_id))?;
            let verdict = if correct { "correctly" } else { "incorrectly" };
            self.broadcast(&format!("{name} answered {verdict}"));
        } else {
            self.transition(PhaseEvent::WrongAnswer, None)?;
            self.broadcast(&format!("{name} answered incorrectly"));
        }
        Ok(())
    }

    fn close_question(&mut self) {
        if let Some(at) = self.cur {
            self.board.consume(at);
            self.official_answer = self.board.question(at).map(|q| q.answer.clone());
        }
    }

    fn skip_question(&mut self) -> Result<(), GameError> {
        self.close_question();
        if self.board.round_exhausted(self.round) {
            return self.end_round();
        }
        let picker = self.last_picker.clone();
        self.reset_guesses();
        self.transition(PhaseEvent::QuestionClosed, picker.as_deref())?;
        self.broadcast("Question unanswered");
        Ok(())
    }

    fn end_round(&mut self) -> Result<(), GameError> {
        let total = self.players.values().map(|player| player.score).sum();
        match self.round {
            RoundState::First => self.round_scores[0] = Some(total),
            RoundState::Second => self.round_scores[1] = Some(total),
            RoundState::Final => {}
        }

        if self.round == RoundState::First && self.config.full_game {
            self.round = RoundState::Second;
            self.reset_guesses();
            self.cur = None;
            self.official_answer = None;
            self.last_picker = self
                .players
                .values()
                .min_by_key(|player| player.score)
                .map(|player| player.id.clone());
            self.transition(PhaseEvent::NextRound, None)?;
            self.broadcast("First round ended");
            return Ok(());
        }
        self.start_final_round()
    }

    fn start_final_round(&mut self) -> Result<(), GameError> {
        self.round = RoundState::Final;
        self.reset_guesses();
        self.cur = Some(QuestionRef::Final);
        self.stake = 0;
        self.official_answer = None;
        self.final_players = self
            .players
            .values()
            .filter(|player| player.score > 0)
            .map(|player| player.id.clone())
            .collect();
        self.final_wagers.clear();
        self.final_answers.clear();

        let enough_wagerers = self.final_players.len() >= 2;
        self.transition(PhaseEvent::FinalRound { enough_wagerers }, None)?;
        if enough_wagerers {
            self.broadcast("Final round");
        } else {
            self.conclude();
            self.broadcast("Not enough players for the final round");
        }
        Ok(())
    }

    fn conclude(&mut self) {
        self.close_question();
        if let Some(analytics) = self.analytics() {
            self.effects.push(Effect::SaveAnalytics(analytics));
        }
    }

    fn wager_bounds(&self, score: i64) -> (i64, i64) {
        (
            self.round.min_wager(),
            score.max(self.round.max_wager()),
        )
    }

    fn wager(&mut self, player_id: &str, amount: i64) -> Result<(), GameError> {
        let player = self.player(player_id)?;
        if !player.can.wager {
            return Err(GameError::NotEligible("wager"));
        }
        let (min, max) = self.wager_bounds(player.score);
        let is_final = self.round == RoundState::Final;
        if amount < min || amount > max {
            let after = if is_final {
                Duration::from_secs(FINAL_WAGER_SECS)
            } else {
                self.config.wager()
            };
            self.effects.push(Effect::ArmTimer {
                slot: TimerSlot::Wager(player_id.to_string()),
                after,
            });
            return Err(GameError::InvalidInput(format!(
                "invalid wager, must be between {min} and {max}"
            )));
        }
        self.effects
            .push(Effect::CancelTimer(TimerSlot::Wager(player_id.to_string())));

        let player = self.player_mut(player_id)?;
        let name = player.name.clone();
        if is_final {
            player.final_wager = amount;
            player.can.wager = false;
            self.final_wagers.insert(player_id.to_string());
            if self.final_wagers.len() == self.final_players.len() {
                self.transition(PhaseEvent::WagersIn, None)?;
                self.broadcast("All wagers received");
            } else {
                self.broadcast(&format!("{name} wagered"));
            }
        } else {
            self.stake = amount;
            self.transition(PhaseEvent::WagersIn, Some(player_id))?;
            self.broadcast(&format!("{name} wagered {amount}"));
        }
        Ok(())
    }

    fn final_answer(&mut self, player_id: &str, text: String, correct: bool) -> Result<(), GameError> {
        let penalty = self.config.penalty;
        let player = self.player_mut(player_id)?;
        player.final_answer = text;
        player.final_correct = correct;
        player.can.answer = false;
        let wager = player.final_wager;
        if correct {
            player.update_score(wager);
        } else if penalty {
            player.update_score(-wager);
        }
        let name = player.name.clone();
        self.final_answers.insert(player_id.to_string());

        if self.final_answers.len() == self.final_players.len() {
            self.transition(PhaseEvent::FinalAnswersIn, None)?;
            self.conclude();
            self.broadcast("Final round ended");
        } else {
            self.broadcast(&format!("{name} answered"));
        }
        Ok(())
    }

    fn init_dispute(&mut self, player_id: &str) -> Result<(), GameError> {
        if self.phase != GamePhase::RecvPick {
            return Err(GameError::NotEligible("dispute"));
        }
        let Some(at) = self.cur.filter(|at| *at != QuestionRef::Final) else {
            return Err(GameError::NotEligible("dispute"));
        };
        let question = self
            .board
            .question_mut(at)
            .ok_or(GameError::NotEligible("dispute"))?;
        let idx = question
            .last_answer_of(player_id)
            .filter(|idx| {
                let answer = &question.answers[*idx];
                !answer.correct && !answer.has_disputed && answer.text != ANSWER_TIMEOUT
            })
            .ok_or(GameError::NotEligible("dispute"))?;
        question.answers[idx].has_disputed = true;
        question.cur_disputed = Some(idx);

        let fallback_picker = self
            .players
            .values()
            .find(|player| player.can.pick)
            .map(|player| player.id.clone());
        self.dispute = Some(DisputeState {
            disputer: player_id.to_string(),
            fallback_picker,
            accepts: 0,
            declines: 0,
        });
        self.transition(PhaseEvent::RaiseDispute, None)?;
        let name = self.name_of(player_id);
        self.broadcast(&format!("{name} disputed their answer"));
        Ok(())
    }

    fn vote(&mut self, player_id: &str, accept: bool) -> Result<(), GameError> {
        let player = self.player_mut(player_id)?;
        if !player.can.dispute {
            return Err(GameError::NotEligible("vote"));
        }
        player.can.dispute = false;
        let name = player.name.clone();

        let seated = self.players.len();
        let dispute = self
            .dispute
            .as_mut()
            .ok_or_else(|| GameError::InvalidInput("no dispute in progress".into()))?;
        if accept {
            dispute.accepts += 1;
        } else {
            dispute.declines += 1;
        }
        let accepted = dispute.accepts >= seated / 2 + 1;
        let declined = dispute.declines >= seated.div_ceil(2);

        if accepted {
            self.resolve_dispute(true)
        } else if declined || !self.players.values().any(|player| player.can.dispute) {
            self.resolve_dispute(false)
        } else {
            self.broadcast(&format!("{name} voted"));
            Ok(())
        }
    }

    fn resolve_dispute(&mut self, accepted: bool) -> Result<(), GameError> {
        let Some(dispute) = self.dispute.take() else {
            return Ok(());
        };
        let penalty = self.config.penalty;
        let disputed = self
            .cur
            .and_then(|at| self.board.question_mut(at))
            .and_then(|question| question.cur_disputed.take().map(|idx| (question, idx)));
        let Some((question, idx)) = disputed.filter(|_| accepted) else {
            self.transition(
                PhaseEvent::DisputeResolved,
                dispute.fallback_picker.as_deref(),
            )?;
            self.broadcast("Dispute declined");
            return Ok(());
        };

        let mut adjustments = Vec::new();
        let disputed = &mut question.answers[idx];
        disputed.correct = true;
        disputed.overturned = true;
        let credit = if penalty {
            2 * disputed.stake
        } else {
            disputed.stake
        };
        adjustments.push((disputed.player_id.clone(), credit));
        let alternative = disputed.text.clone();

        for later in &question.answers[idx + 1..] {
            if later.overturned {
                break;
            }
            if later.correct {
                adjustments.push((later.player_id.clone(), -later.stake));
            } else if penalty {
                adjustments.push((later.player_id.clone(), later.stake));
            }
        }
        if !question.alternatives.contains(&alternative) {
            question.alternatives.push(alternative.clone());
        }
        let official = question.answer.clone();

        for (player_id, delta) in adjustments {
            if let Some(player) = self.players.get_mut(&player_id) {
                player.update_score(delta);
            }
        }
        self.effects.push(Effect::AddAlternative {
            answer: official,
            alternative,
        });
        self.transition(PhaseEvent::DisputeResolved, Some(dispute.disputer.as_str()))?;
        self.broadcast("Dispute accepted");
        Ok(())
    }

    fn protest(&mut self, player_id: &str, target: &str) -> Result<(), GameError> {
        if self.phase != GamePhase::PostGame {
            return Err(GameError::NotEligible("protest"));
        }
        if !self.final_players.contains(target) {
            return Err(GameError::InvalidInput(
                "player did not play the final round".into(),
            ));
        }
        let seated = self.players.len();
        let penalty = self.config.penalty;
        let protester = self.name_of(player_id);
        let target_player = self.player_mut(target)?;
        if !target_player.final_protestors.insert(player_id.to_string()) {
            return Ok(());
        }

        if target_player.final_protestors.len() == seated / 2 + 1 {
            let factor = if penalty { 2 } else { 1 };
            let delta = factor * target_player.final_wager;
            if target_player.final_correct {
                target_player.update_score(-delta);
            } else {
                target_player.update_score(delta);
            }
            target_player.final_correct = !target_player.final_correct;
            let name = target_player.name.clone();
            self.broadcast(&format!("Final result for {name} changed"));
        } else {
            let name = target_player.name.clone();
            self.broadcast(&format!("{protester} protested for {name}"));
        }
        Ok(())
    }

    fn pause(&mut self, player_id: &str, disconnected: bool) -> Result<(), GameError> {
        if !self.phase.is_active() {
            return Err(GameError::NotEligible("pause"));
        }
        if self.pause.is_some() {
            return Ok(());
        }
        let flags = self
            .players
            .values_mut()
            .map(|player| {
                let flags = (player.id.clone(), player.can);
                player.update_eligibility(Eligibility::default());
                flags
            })
            .collect();
        self.pause = Some(PauseState { flags });
        self.paused_at = Some(SystemTime::now());
        self.disconnected = disconnected;
        self.effects.push(Effect::CancelAllTimers);

        let name = self.name_of(player_id);
        if disconnected {
            self.broadcast(&format!("{name} disconnected, game paused"));
        } else {
            self.broadcast(&format!("{name} paused the game"));
        }
        Ok(())
    }

    fn resume(&mut self, player_id: &str) -> Result<(), GameError> {
        let Some(state) = self.pause.take() else {
            return Err(GameError::InvalidInput("game is not paused".into()));
        };
        for (id, can) in state.flags {
            if let Some(player) = self.players.get_mut(&id) {
                player.update_eligibility(can);
            }
        }
        self.paused_at = None;
        self.disconnected = false;
        self.arm_for_phase();
        let name = self.name_of(player_id);
        self.broadcast(&format!("{name} resumed the game"));
        Ok(())
    }
}

fn categories_view(grid: &[Category]) -> Vec<CategoryView> {
    grid.iter()
        .map(|category| CategoryView {
            title: category.title.clone(),
            questions: category
                .questions
                .iter()
                .map(|question| CellView {
                    category: question.category.clone(),
                    value: question.value,
                    can_choose: question.can_choose,
                })
                .collect(),
        })
        .collect()
}

fn answer_view(answer: &Answer) -> AnswerView {
    AnswerView {
        player_id: answer.player_id.clone(),
        answer: answer.text.clone(),
        correct: answer.correct,
        has_disputed: answer.has_disputed,
        overturned: answer.overturned,
        bot: answer.bot,
    }
}

fn question_view(question: &Question, hide_clue: bool, hide_answers: bool) -> QuestionView {
    let pick = |idx: Option<usize>| {
        idx.filter(|_| !hide_answers)
            .and_then(|i| question.answers.get(i))
            .map(answer_view)
    };
    QuestionView {
        category: question.category.clone(),
        clue: if hide_clue {
            String::new()
        } else {
            question.clue.clone()
        },
        comments: question.comments.clone(),
        value: question.value,
        daily_double: question.daily_double,
        answers: if hide_answers {
            Vec::new()
        } else {
            question.answers.iter().map(answer_view).collect()
        },
        cur_ans: pick(question.cur_answer),
        cur_disputed: pick(question.cur_disputed),
    }
}

fn round_analytics(grid: &[Category], score: Option<i64>) -> AnalyticsRoundEntity {
    let mut answered = 0;
    let mut correct = 0;
    let categories = grid
        .iter()
        .map(|category| AnalyticsCategoryEntity {
            title: category.title.clone(),
            questions: category
                .questions
                .iter()
                .map(|question| {
                    let human = question.answers.iter().filter(|answer| !answer.bot);
                    if human.clone().next().is_some() {
                        answered += 1;
                    }
                    if human.clone().any(|answer| answer.correct) {
                        correct += 1;
                    }
                    AnalyticsQuestionEntity {
                        answers: question
                            .answers
                            .iter()
                            .map(|answer| AnalyticsAnswerEntity {
                                player_id: answer.player_id.clone(),
                                answer: answer.text.clone(),
                                correct: answer.correct,
                                has_disputed: answer.has_disputed,
                                overturned: answer.overturned,
                                bot: answer.bot,
                            })
                            .collect(),
                    }
                })
                .collect(),
        })
        .collect();
    AnalyticsRoundEntity {
        categories,
        answers: answered,
        correct,
        score: score.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    use super::*;
    use crate::state::board::{CATEGORIES_PER_ROUND, VALUES_PER_CATEGORY, fixtures};

    use GamePhase::*;

    struct Table {
        game: Game,
        sockets: Vec<mpsc::UnboundedReceiver<Message>>,
    }

    impl Table {
        fn act(&mut self, player: &str, action: Action) -> Result<(), GameError> {
            let phase = self.game.phase;
            let result = self.game.handle(player, phase, action);
            assert_flags_exclusive(&self.game);
            result
        }

        fn player(&self, id: &str) -> &Player {
            &self.game.players[id]
        }

        fn player_mut(&mut self, id: &str) -> &mut Player {
            self.game.players.get_mut(id).unwrap()
        }

        fn pick(&mut self, player: &str, cat: usize, val: usize) {
            self.act(player, Action::Pick { cat, val }).unwrap();
        }

        /// Consume every cell of `round` except `keep`.
        fn exhaust_except(&mut self, round: RoundState, keep: (usize, usize)) {
            for cat in 0..CATEGORIES_PER_ROUND {
                for val in 0..VALUES_PER_CATEGORY {
                    if (cat, val) != keep {
                        self.game
                            .board
                            .consume(QuestionRef::Cell { round, cat, val });
                    }
                }
            }
        }
    }

    fn assert_flags_exclusive(game: &Game) {
        for player in game.players.values() {
            assert!(player.can.count() <= 1, "{} holds several flags", player.id);
            if matches!(game.phase, PreGame | PostGame | BoardIntro) {
                assert_eq!(player.can.count(), 0);
            }
        }
    }

    fn table(config: GameConfig) -> Table {
        let mut game = Game::new(
            "quiet-otter".into(),
            config,
            3,
            fixtures::board(),
            Duration::from_secs(5),
        );
        let mut sockets = Vec::new();
        for (id, name) in [("a", "Ann"), ("b", "Ben"), ("c", "Cat")] {
            game.add_player(Player::human(id.into(), name.into()))
                .unwrap();
        }
        for id in ["a", "b", "c"] {
            let (tx, rx) = mpsc::unbounded_channel();
            game.connect(id, tx).unwrap();
            sockets.push(rx);
        }
        assert_eq!(game.phase, BoardIntro);
        game.on_timeout(TimerSlot::Phase).unwrap();
        assert_eq!(game.phase, RecvPick);
        game.take_effects();
        Table { game, sockets }
    }

    fn with_penalty() -> Table {
        table(GameConfig::default())
    }

    fn answer_of(table: &Table, cat: usize, val: usize) -> String {
        table.game.board.first[cat].questions[val].answer.clone()
    }

    #[test]
    fn game_starts_once_every_seat_is_connected() {
        let mut game = Game::new(
            "g".into(),
            GameConfig::default(),
            3,
            fixtures::board(),
            Duration::from_secs(5),
        );
        game.add_player(Player::human("a".into(), "Ann".into()))
            .unwrap();
        game.add_player(Player::human("b".into(), "Ben".into()))
            .unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        game.connect("a", tx).unwrap();
        assert_eq!(game.phase, PreGame);

        let err = game
            .add_player(Player::human("x".into(), "Ann".into()))
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidInput(_)));

        let (bot_tx, _bot_rx) = mpsc::unbounded_channel();
        game.add_player(Player::bot("c".into(), "Robo (bot)".into(), bot_tx))
            .unwrap();
        assert_eq!(game.phase, PreGame);
        assert_eq!(
            game.add_player(Player::human("d".into(), "Dee".into())),
            Err(GameError::Full)
        );

        let (tx, _rx) = mpsc::unbounded_channel();
        game.connect("b", tx).unwrap();
        assert_eq!(game.phase, BoardIntro);
        assert!(game.take_effects().contains(&Effect::ArmTimer {
            slot: TimerSlot::Phase,
            after: Duration::from_secs(5),
        }));
    }

    #[test]
    fn correct_answer_scores_and_passes_the_board() {
        let mut t = with_penalty();
        assert!(t.player("a").can.pick);

        t.pick("a", 0, 0);
        assert_eq!(t.game.phase, RecvBuzz);
        assert!(["a", "b", "c"].iter().all(|id| t.player(id).can.buzz));

        t.act("b", Action::Buzz { is_pass: false }).unwrap();
        assert_eq!(t.game.phase, RecvAns);
        assert!(t.player("b").can.answer);
        assert!(!t.player("a").can.answer);

        let official = answer_of(&t, 0, 0);
        t.act("b", Action::Answer(official)).unwrap();
        assert_eq!(t.player("b").score, 200);
        assert!(!t.game.board.first[0].questions[0].can_choose);
        assert_eq!(t.game.phase, RecvPick);
        assert!(t.player("b").can.pick);
        assert_eq!(
            t.game.snapshot().official_answer.as_deref(),
            Some("first0 answer 1")
        );
    }

    #[test]
    fn wrong_answers_with_penalty_return_board_to_picker() {
        let mut t = with_penalty();
        t.pick("a", 0, 0);
        t.act("a", Action::Buzz { is_pass: true }).unwrap();
        t.act("b", Action::Buzz { is_pass: false }).unwrap();
        t.act("b", Action::Answer("nonsense".into())).unwrap();

        assert_eq!(t.player("b").score, -200);
        assert_eq!(t.game.guessed_wrong, vec!["b".to_string()]);
        assert_eq!(t.game.phase, RecvBuzz);
        assert!(t.player("c").can.buzz);
        assert!(!t.player("a").can.buzz);
        assert!(!t.player("b").can.buzz);
        assert!(t.game.snapshot().official_answer.is_none());
        assert!(t.game.take_effects().contains(&Effect::AddIncorrect {
            clue: "first0 clue 1".into(),
            incorrect: "nonsense".into(),
        }));

        t.act("c", Action::Buzz { is_pass: true }).unwrap();
        assert!(!t.game.board.first[0].questions[0].can_choose);
        assert_eq!(t.game.phase, RecvPick);
        assert!(t.player("a").can.pick);
    }

    #[test]
    fn buzz_timeout_skips_the_question() {
        let mut t = with_penalty();
        t.pick("a", 2, 1);
        t.game.on_timeout(TimerSlot::Phase).unwrap();
        assert_eq!(t.game.phase, RecvPick);
        assert!(t.player("a").can.pick);
        assert!(!t.game.board.first[2].questions[1].can_choose);
    }

    #[test]
    fn pick_timeout_chooses_first_available_cell() {
        let mut t = with_penalty();
        t.game.board.consume(QuestionRef::Cell {
            round: RoundState::First,
            cat: 0,
            val: 0,
        });
        t.game.on_timeout(TimerSlot::Phase).unwrap();
        assert_eq!(t.game.phase, RecvBuzz);
        assert_eq!(
            t.game.cur,
            Some(QuestionRef::Cell {
                round: RoundState::First,
                cat: 1,
                val: 0
            })
        );
    }

    #[test]
    fn daily_double_uses_the_wager() {
        let mut t = with_penalty();
        t.game.board.first[0].questions[1].daily_double = true;
        t.player_mut("a").score = 100;

        t.pick("a", 0, 1);
        assert_eq!(t.game.phase, RecvWager);
        assert!(t.player("a").can.wager);
        assert!(!t.player("b").can.wager);

        t.act("a", Action::Wager(800)).unwrap();
        assert_eq!(t.game.phase, RecvAns);
        let official = answer_of(&t, 0, 1);
        t.act("a", Action::Answer(official)).unwrap();
        assert_eq!(t.player("a").score, 900);
        assert_eq!(t.game.phase, RecvPick);
        assert!(t.player("a").can.pick);
    }

    #[test]
    fn wager_bounds_in_first_round() {
        let mut t = with_penalty();
        t.game.board.first[3].questions[2].daily_double = true;
        t.player_mut("a").score = 300;
        t.pick("a", 3, 2);
        t.game.take_effects();

        for rejected in [4, 1001] {
            let err = t.act("a", Action::Wager(rejected)).unwrap_err();
            assert_eq!(
                err,
                GameError::InvalidInput("invalid wager, must be between 5 and 1000".into())
            );
            assert_eq!(t.game.phase, RecvWager);
            assert_eq!(
                t.game.take_effects(),
                vec![Effect::ArmTimer {
                    slot: TimerSlot::Wager("a".into()),
                    after: Duration::from_secs(30),
                }]
            );
        }
        t.act("a", Action::Wager(1000)).unwrap();
        assert_eq!(t.game.stake, 1000);

        let mut t = with_penalty();
        t.game.board.first[3].questions[2].daily_double = true;
        t.player_mut("a").score = 300;
        t.pick("a", 3, 2);
        t.act("a", Action::Wager(5)).unwrap();
        assert_eq!(t.game.phase, RecvAns);
    }

    #[test]
    fn wager_timeout_defaults_to_minimum() {
        let mut t = with_penalty();
        t.game.board.first[1].questions[0].daily_double = true;
        t.pick("a", 1, 0);
        t.game.on_timeout(TimerSlot::Wager("a".into())).unwrap();
        assert_eq!(t.game.phase, RecvAns);
        assert_eq!(t.game.stake, 5);
    }

    /// B answers "Mark Twain" (judged wrong), C then answers correctly.
    fn disputed_question(config: GameConfig) -> Table {
        let mut t = table(config);
        t.game.board.first[0].questions[0].answer = "Samuel Clemens".into();
        t.pick("a", 0, 0);
        t.act("b", Action::Buzz { is_pass: false }).unwrap();
        t.act("b", Action::Answer("Mark Twain".into())).unwrap();
        t.act("c", Action::Buzz { is_pass: false }).unwrap();
        t.act("c", Action::Answer("Samuel Clemens".into())).unwrap();
        assert_eq!(t.game.phase, RecvPick);
        assert!(t.player("c").can.pick);
        t.game.take_effects();
        t
    }

    #[test]
    fn accepted_dispute_reverses_ownership() {
        let mut t = disputed_question(GameConfig::default());
        assert_eq!(t.player("b").score, -200);
        assert_eq!(t.player("c").score, 200);

        t.act("b", Action::InitDispute).unwrap();
        assert_eq!(t.game.phase, RecvDispute);
        assert!(t.player("a").can.dispute);
        assert!(t.player("c").can.dispute);
        assert!(!t.player("b").can.dispute);

        t.act("a", Action::Vote { accept: true }).unwrap();
        assert_eq!(t.game.phase, RecvDispute);
        t.act("c", Action::Vote { accept: true }).unwrap();

        assert_eq!(t.game.phase, RecvPick);
        assert_eq!(t.player("b").score, 200);
        assert_eq!(t.player("c").score, 0);
        assert!(t.player("b").can.pick);
        let answer = &t.game.board.first[0].questions[0].answers[0];
        assert!(answer.correct && answer.overturned && answer.has_disputed);
        assert!(t.game.take_effects().contains(&Effect::AddAlternative {
            answer: "Samuel Clemens".into(),
            alternative: "Mark Twain".into(),
        }));
    }

    #[test]
    fn accepted_dispute_without_penalty_nets_to_zero() {
        let mut t = disputed_question(GameConfig {
            penalty: false,
            ..GameConfig::default()
        });
        let before: i64 = t.game.players.values().map(|p| p.score).sum();
        t.act("b", Action::InitDispute).unwrap();
        t.act("a", Action::Vote { accept: true }).unwrap();
        t.act("c", Action::Vote { accept: true }).unwrap();
        let after: i64 = t.game.players.values().map(|p| p.score).sum();
        assert_eq!(before, after);
        assert_eq!(t.player("b").score, 200);
    }

    #[test]
    fn earlier_dispute_stops_at_an_overturned_answer() {
        let mut t = with_penalty();
        t.game.board.first[0].questions[0].answer = "Samuel Clemens".into();
        t.pick("a", 0, 0);
        t.act("a", Action::Buzz { is_pass: false }).unwrap();
        t.act("a", Action::Answer("Mark Twain".into())).unwrap();
        t.act("b", Action::Buzz { is_pass: false }).unwrap();
        t.act("b", Action::Answer("Twain".into())).unwrap();
        t.act("c", Action::Buzz { is_pass: false }).unwrap();
        t.act("c", Action::Answer("Samuel Clemens".into())).unwrap();
        assert_eq!(t.game.phase, RecvPick);
        assert_eq!(
            [t.player("a").score, t.player("b").score, t.player("c").score],
            [-200, -200, 200]
        );

        // B's overturn takes C's points away.
        t.act("b", Action::InitDispute).unwrap();
        t.act("a", Action::Vote { accept: true }).unwrap();
        t.act("c", Action::Vote { accept: true }).unwrap();
        assert_eq!(t.game.phase, RecvPick);
        assert_eq!(
            [t.player("a").score, t.player("b").score, t.player("c").score],
            [-200, 200, 0]
        );

        // A's walk ends at B's overturned answer, so B and C keep their scores.
        t.act("a", Action::InitDispute).unwrap();
        t.act("b", Action::Vote { accept: true }).unwrap();
        t.act("c", Action::Vote { accept: true }).unwrap();
        assert_eq!(t.game.phase, RecvPick);
        assert_eq!(
            [t.player("a").score, t.player("b").score, t.player("c").score],
            [200, 200, 0]
        );
        assert!(t.player("a").can.pick);
        let answers = &t.game.board.first[0].questions[0].answers;
        assert!(answers[0].overturned && answers[1].overturned);
        assert!(answers[2].correct && !answers[2].overturned);
    }

    #[test]
    fn split_vote_declines_and_repeat_votes_are_ignored() {
        let mut t = disputed_question(GameConfig::default());
        t.act("b", Action::InitDispute).unwrap();

        t.act("a", Action::Vote { accept: false }).unwrap();
        assert_eq!(
            t.act("a", Action::Vote { accept: false }),
            Err(GameError::NotEligible("vote"))
        );
        assert_eq!(t.game.dispute.as_ref().unwrap().declines, 1);

        t.act("c", Action::Vote { accept: true }).unwrap();
        assert_eq!(t.game.phase, RecvPick);
        assert!(t.player("c").can.pick);
        assert_eq!(t.player("b").score, -200);

        assert_eq!(
            t.act("b", Action::InitDispute),
            Err(GameError::NotEligible("dispute"))
        );
    }

    #[test]
    fn dispute_timeout_declines() {
        let mut t = disputed_question(GameConfig::default());
        t.act("b", Action::InitDispute).unwrap();
        t.game.on_timeout(TimerSlot::Phase).unwrap();
        assert_eq!(t.game.phase, RecvPick);
        assert!(t.player("c").can.pick);
        assert!(t.game.dispute.is_none());
    }

    #[test]
    fn timed_out_answers_cannot_be_disputed() {
        let mut t = with_penalty();
        t.pick("a", 0, 0);
        t.act("b", Action::Buzz { is_pass: false }).unwrap();
        t.game.on_timeout(TimerSlot::Answer("b".into())).unwrap();
        assert_eq!(t.player("b").score, -200);
        t.act("a", Action::Buzz { is_pass: true }).unwrap();
        t.act("c", Action::Buzz { is_pass: true }).unwrap();
        assert_eq!(t.game.phase, RecvPick);

        assert_eq!(
            t.act("b", Action::InitDispute),
            Err(GameError::NotEligible("dispute"))
        );
    }

    #[test]
    fn stale_and_ineligible_events_are_rejected() {
        let mut t = with_penalty();
        let err = t
            .game
            .handle("a", RecvBuzz, Action::Buzz { is_pass: false })
            .unwrap_err();
        assert!(err.is_silent());
        assert_eq!(
            t.act("b", Action::Pick { cat: 0, val: 0 }),
            Err(GameError::NotEligible("pick"))
        );
        assert!(matches!(
            t.act("a", Action::Pick { cat: 9, val: 0 }),
            Err(GameError::InvalidInput(_))
        ));
        assert!(matches!(
            t.act("zed", Action::Pause),
            Err(GameError::NotFound(_))
        ));
    }

    #[test]
    fn pause_and_resume_restore_flags_and_rearm_timers() {
        let mut t = with_penalty();
        t.pick("a", 0, 0);
        t.act("a", Action::Buzz { is_pass: true }).unwrap();
        t.game.take_effects();
        let before: Vec<Eligibility> = t.game.players.values().map(|p| p.can).collect();

        t.act("b", Action::Pause).unwrap();
        assert!(t.game.is_paused());
        assert_eq!(t.game.take_effects(), vec![Effect::CancelAllTimers]);
        assert!(t.game.players.values().all(|p| p.can.count() == 0));
        assert_eq!(
            t.act("c", Action::Buzz { is_pass: false }),
            Err(GameError::Paused)
        );
        t.game.on_timeout(TimerSlot::Phase).unwrap();
        assert_eq!(t.game.phase, RecvBuzz);

        t.act("c", Action::Resume).unwrap();
        assert_eq!(t.game.phase, RecvBuzz);
        let after: Vec<Eligibility> = t.game.players.values().map(|p| p.can).collect();
        assert_eq!(before, after);
        assert_eq!(
            t.game.take_effects(),
            vec![Effect::ArmTimer {
                slot: TimerSlot::Phase,
                after: Duration::from_secs(30),
            }]
        );
    }

    #[test]
    fn disconnect_pauses_until_everyone_is_back() {
        let mut t = with_penalty();
        t.pick("a", 0, 0);
        let (stale, _stale_rx) = mpsc::unbounded_channel();
        let (current, _current_rx) = mpsc::unbounded_channel();
        t.game.connect("b", current.clone()).unwrap();
        assert_eq!(t.game.disconnect("b", &stale), 3);
        assert!(!t.game.is_paused());

        assert_eq!(t.game.disconnect("b", &current), 2);
        assert!(t.game.is_paused());
        assert!(t.game.snapshot().disconnected);

        let (tx, _rx) = mpsc::unbounded_channel();
        t.game.connect("b", tx).unwrap();
        assert!(!t.game.is_paused());
        assert!(t.player("c").can.buzz);
    }

    #[test]
    fn leaving_before_start_frees_the_seat() {
        let mut game = Game::new(
            "g".into(),
            GameConfig::default(),
            3,
            fixtures::board(),
            Duration::from_secs(5),
        );
        game.add_player(Player::human("a".into(), "Ann".into()))
            .unwrap();
        game.add_player(Player::human("b".into(), "Ben".into()))
            .unwrap();
        assert_eq!(game.leave("b"), Ok(1));
        assert!(!game.has_player("b"));
        assert!(game.has_open_seat());
        game.start("a").unwrap();
        assert_eq!(game.phase, BoardIntro);
    }

    #[test]
    fn dropping_out_of_the_lobby_frees_the_seat() {
        let mut game = Game::new(
            "g".into(),
            GameConfig::default(),
            3,
            fixtures::board(),
            Duration::from_secs(5),
        );
        game.add_player(Player::human("a".into(), "Ann".into()))
            .unwrap();
        game.add_player(Player::human("b".into(), "Ben".into()))
            .unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        game.connect("a", tx.clone()).unwrap();

        assert_eq!(game.disconnect("a", &tx), 1);
        assert!(!game.has_player("a"));
        assert_eq!(game.phase, PreGame);
    }

    /// Play one first-round clue, then the last second-round clue.
    fn reach_final(t: &mut Table) {
        t.exhaust_except(RoundState::First, (0, 0));
        t.pick("a", 0, 0);
        t.act("b", Action::Buzz { is_pass: false }).unwrap();
        let official = answer_of(t, 0, 0);
        t.act("b", Action::Answer(official)).unwrap();
        assert_eq!(t.game.phase, BoardIntro);
        assert_eq!(t.game.round, RoundState::Second);

        t.game.on_timeout(TimerSlot::Phase).unwrap();
        assert!(t.player("a").can.pick, "lowest score picks first");

        t.exhaust_except(RoundState::Second, (0, 0));
        t.player_mut("a").score = 1000;
        t.player_mut("b").score = 500;
        t.player_mut("c").score = -100;
        t.pick("a", 0, 0);
        t.act("b", Action::Buzz { is_pass: false }).unwrap();
        let official = t.game.board.second[0].questions[0].answer.clone();
        t.act("b", Action::Answer(official)).unwrap();
        assert_eq!(t.player("b").score, 900);
    }

    #[test]
    fn final_round_with_two_solvent_players() {
        let mut t = with_penalty();
        reach_final(&mut t);
        assert_eq!(t.game.round, RoundState::Final);
        assert_eq!(t.game.phase, RecvWager);
        assert!(t.player("a").can.wager && t.player("b").can.wager);
        assert!(!t.player("c").can.wager);
        assert!(t.game.snapshot().cur_question.unwrap().clue.is_empty());

        t.act("a", Action::Wager(1000)).unwrap();
        assert_eq!(t.game.phase, RecvWager);
        assert!(t.game.snapshot().players[0].final_wager == 0);
        t.act("b", Action::Wager(500)).unwrap();
        assert_eq!(t.game.phase, RecvAns);
        t.game.take_effects();

        t.act("a", Action::Answer("mark twain".into())).unwrap();
        t.act("b", Action::Answer("Hemingway".into())).unwrap();
        assert_eq!(t.game.phase, PostGame);
        assert_eq!(t.player("a").score, 2000);
        assert_eq!(t.player("b").score, 400);
        assert_eq!(t.game.snapshot().players[0].final_answer, "mark twain");

        let saved = t
            .game
            .take_effects()
            .into_iter()
            .find_map(|effect| match effect {
                Effect::SaveAnalytics(analytics) => Some(analytics),
                _ => None,
            })
            .expect("analytics saved");
        assert_eq!(saved.first_round.answers, 1);
        assert_eq!(saved.first_round.correct, 1);
        assert_eq!(saved.second_round.unwrap().answers, 1);
    }

    #[test]
    fn final_answers_stay_hidden_until_post_game() {
        let mut t = with_penalty();
        reach_final(&mut t);
        t.act("a", Action::Wager(1000)).unwrap();
        t.act("b", Action::Wager(500)).unwrap();
        t.act("a", Action::Answer("Mark Twain".into())).unwrap();
        assert_eq!(t.game.phase, RecvAns);

        let during = t.game.snapshot().cur_question.unwrap();
        assert!(during.answers.is_empty());
        assert!(during.cur_ans.is_none());
        assert!(!during.clue.is_empty());

        t.act("b", Action::Answer("Hemingway".into())).unwrap();
        assert_eq!(t.game.phase, PostGame);
        let after = t.game.snapshot().cur_question.unwrap();
        assert_eq!(after.answers.len(), 2);
    }

    #[test]
    fn final_answer_timeout_counts_as_wrong() {
        let mut t = with_penalty();
        reach_final(&mut t);
        t.act("a", Action::Wager(0)).unwrap();
        t.game.on_timeout(TimerSlot::Wager("b".into())).unwrap();
        assert_eq!(t.game.phase, RecvAns);
        t.game.on_timeout(TimerSlot::Answer("a".into())).unwrap();
        t.game.on_timeout(TimerSlot::Answer("b".into())).unwrap();
        assert_eq!(t.game.phase, PostGame);
        assert_eq!(t.player("a").final_answer, ANSWER_TIMEOUT);
        assert_eq!(t.player("a").score, 1000);
    }

    #[test]
    fn protest_flips_after_majority() {
        let mut t = with_penalty();
        reach_final(&mut t);
        t.act("a", Action::Wager(1000)).unwrap();
        t.act("b", Action::Wager(500)).unwrap();
        t.act("a", Action::Answer("Mark Twain".into())).unwrap();
        t.act("b", Action::Answer("Hemingway".into())).unwrap();
        assert_eq!(t.player("a").score, 2000);

        let target = Action::Protest { target: "a".into() };
        t.act("b", target.clone()).unwrap();
        t.act("b", target.clone()).unwrap();
        assert!(t.player("a").final_correct);
        assert_eq!(t.player("a").final_protestors.len(), 1);

        t.act("c", target).unwrap();
        assert!(!t.player("a").final_correct);
        assert_eq!(t.player("a").score, 0);

        assert!(matches!(
            t.act("a", Action::Protest { target: "c".into() }),
            Err(GameError::InvalidInput(_))
        ));
    }

    #[test]
    fn final_round_needs_two_wagerers() {
        let mut t = table(GameConfig {
            full_game: false,
            ..GameConfig::default()
        });
        t.exhaust_except(RoundState::First, (0, 0));
        t.pick("a", 0, 0);
        t.act("b", Action::Buzz { is_pass: false }).unwrap();
        let official = answer_of(&t, 0, 0);
        t.act("b", Action::Answer(official)).unwrap();
        assert_eq!(t.game.round, RoundState::Final);
        assert_eq!(t.game.phase, PostGame);
    }

    #[test]
    fn play_again_restarts_on_a_fresh_board() {
        let mut t = table(GameConfig {
            full_game: false,
            ..GameConfig::default()
        });
        t.exhaust_except(RoundState::First, (0, 0));
        t.pick("a", 0, 0);
        t.game.on_timeout(TimerSlot::Phase).unwrap();
        assert_eq!(t.game.phase, PostGame);
        t.game.take_effects();

        for rx in &mut t.sockets {
            while rx.try_recv().is_ok() {}
        }
        t.game.play_again("a").unwrap();
        let notices: Vec<serde_json::Value> = t
            .sockets
            .iter_mut()
            .map(|rx| {
                let Ok(Message::Text(text)) = rx.try_recv() else {
                    panic!("expected a notice");
                };
                serde_json::from_str(text.as_str()).unwrap()
            })
            .collect();
        assert!(notices.iter().all(|json| json["code"] == close_code::INFO));
        assert_eq!(
            notices[0]["message"],
            "Waiting for all other players to play again"
        );
        assert_eq!(notices[1]["message"], "Ann wants to play again");

        t.game.play_again("b").unwrap();
        assert!(t.game.take_effects().is_empty());
        t.game.play_again("c").unwrap();
        assert_eq!(t.game.take_effects(), vec![Effect::Restart]);

        t.game.restart(fixtures::board()).unwrap();
        assert_eq!(t.game.phase, BoardIntro);
        assert_eq!(t.game.round, RoundState::First);
        assert!(t.game.players.values().all(|p| p.score == 0 && !p.play_again));
        assert!(t.game.board.first_available(RoundState::First).is_some());
    }

    #[test]
    fn consumed_cells_stay_consumed() {
        let mut t = with_penalty();
        t.pick("a", 4, 4);
        t.game.on_timeout(TimerSlot::Phase).unwrap();
        assert!(matches!(
            t.act("a", Action::Pick { cat: 4, val: 4 }),
            Err(GameError::InvalidInput(_))
        ));
    }

    #[test]
    fn every_player_receives_the_snapshot() {
        let mut t = with_penalty();
        for rx in &mut t.sockets {
            while rx.try_recv().is_ok() {}
        }
        t.pick("a", 0, 0);
        for rx in &mut t.sockets {
            let Ok(Message::Text(text)) = rx.try_recv() else {
                panic!("expected a snapshot");
            };
            let json: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(json["message"], "New Question");
            assert_eq!(json["game"]["state"], 3);
            assert_eq!(json["game"]["curQuestion"]["clue"], "first0 clue 1");
        }
    }
}
