//! Computer-controlled players.
//!
//! A bot receives the same snapshots as a human through its own channel and
//! answers through the game's command channel after a short think time. Every
//! new snapshot aborts the pending decision and starts over from the latest
//! state.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::mpsc,
    task::{AbortHandle, JoinHandle},
    time::sleep,
};
use tracing::debug;

use crate::{
    dto::game::{CategoryView, GameSnapshot, PlayerView},
    services::dispatcher::GameCommand,
    state::{
        game::Action,
        state_machine::{GamePhase, RoundState},
    },
};

/// What a bot learns after every game mutation.
#[derive(Debug, Clone)]
pub struct BotUpdate {
    pub game: Arc<GameSnapshot>,
    pub me: PlayerView,
    /// Official answer of the active clue, only while the bot may answer.
    pub answer: Option<String>,
}

/// Run the decision loop of bot `player_id` until its update channel closes.
pub fn spawn(
    player_id: String,
    mut updates: mpsc::UnboundedReceiver<BotUpdate>,
    game: mpsc::WeakSender<GameCommand>,
    think: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut pending: Option<AbortHandle> = None;

        while let Some(update) = updates.recv().await {
            if let Some(task) = pending.take() {
                task.abort();
            }
            let Some((tag, action)) = decide(&update) else {
                continue;
            };

            let game = game.clone();
            let player_id = player_id.clone();
            pending = Some(
                tokio::spawn(async move {
                    sleep(think).await;
                    if let Some(tx) = game.upgrade() {
                        let _ = tx
                            .send(GameCommand::Frame {
                                player_id,
                                tag,
                                action,
                            })
                            .await;
                    }
                })
                .abort_handle(),
            );
        }

        if let Some(task) = pending {
            task.abort();
        }
        debug!(player = %player_id, "bot stopped");
    })
}

/// Choose the move for the phase in `update`, if the bot has one to make.
pub fn decide(update: &BotUpdate) -> Option<(GamePhase, Action)> {
    let game = update.game.as_ref();
    let me = &update.me;
    if game.paused {
        return None;
    }

    let action = match game.state {
        GamePhase::RecvPick if me.can_pick => {
            let grid = match game.round {
                RoundState::First => &game.first_round,
                RoundState::Second => &game.second_round,
                RoundState::Final => return None,
            };
            let (cat, val) = first_available(grid)?;
            Action::Pick { cat, val }
        }
        GamePhase::RecvBuzz if me.can_buzz => Action::Buzz { is_pass: false },
        GamePhase::RecvAns if me.can_answer => {
            Action::Answer(update.answer.clone().unwrap_or_default())
        }
        GamePhase::RecvWager if me.can_wager => {
            let best_other = game
                .players
                .iter()
                .filter(|player| player.id != me.id)
                .map(|player| player.score)
                .max()
                .unwrap_or_default();
            Action::Wager(pick_wager(me.score, best_other, game.round.max_wager()))
        }
        GamePhase::RecvDispute if me.can_dispute => Action::Vote { accept: true },
        _ => return None,
    };
    Some((game.state, action))
}

/// Wager enough to overtake (or stay clear of) the best opponent, within the legal range.
pub fn pick_wager(score: i64, best_other: i64, round_max: i64) -> i64 {
    let ceiling = score.max(round_max);
    (score - best_other).abs().max(round_max).min(ceiling)
}

fn first_available(grid: &[CategoryView]) -> Option<(usize, usize)> {
    let rows = grid
        .iter()
        .map(|category| category.questions.len())
        .max()
        .unwrap_or(0);
    (0..rows).find_map(|val| {
        grid.iter().enumerate().find_map(|(cat, category)| {
            category
                .questions
                .get(val)
                .filter(|cell| cell.can_choose)
                .map(|_| (cat, val))
        })
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        dto::game::{CellView, FinalQuestionView},
        state::game_config::GameConfig,
    };

    fn player(id: &str, score: i64) -> PlayerView {
        PlayerView {
            id: id.into(),
            name: id.into(),
            score,
            can_pick: false,
            can_buzz: false,
            can_answer: false,
            can_wager: false,
            can_dispute: false,
            final_wager: 0,
            final_answer: String::new(),
            final_correct: false,
            final_protestors: Vec::new(),
            play_again: false,
            bot: id == "bot",
            connected: true,
        }
    }

    fn snapshot(state: GamePhase, players: Vec<PlayerView>) -> GameSnapshot {
        let category = |title: &str, open: [bool; 2]| CategoryView {
            title: title.into(),
            questions: open
                .iter()
                .zip([200, 400])
                .map(|(can_choose, value)| CellView {
                    category: title.into(),
                    value,
                    can_choose: *can_choose,
                })
                .collect(),
        };
        GameSnapshot {
            name: "g".into(),
            state,
            round: RoundState::First,
            players,
            first_round: vec![category("a", [false, true]), category("b", [false, true])],
            second_round: Vec::new(),
            cur_question: None,
            final_question: FinalQuestionView {
                category: "Authors".into(),
            },
            ans_correctness: false,
            guessed_wrong: Vec::new(),
            passed: Vec::new(),
            paused: false,
            paused_at: None,
            disconnected: false,
            official_answer: None,
            penalty: true,
            config: GameConfig::default(),
            last_picker: None,
        }
    }

    fn update(state: GamePhase, me: PlayerView, answer: Option<&str>) -> BotUpdate {
        let players = vec![player("p1", 1000), player("p2", 200), me.clone()];
        BotUpdate {
            game: Arc::new(snapshot(state, players)),
            me,
            answer: answer.map(str::to_string),
        }
    }

    #[test]
    fn wager_follows_the_table() {
        // (first opponent, second opponent, bot score) -> wager
        let cases = [
            ((1000, 2000, 5000), 3000),
            ((1000, 4000, 5000), 1000),
            ((0, 100, 400), 1000),
            ((200, 400, 500), 1000),
            ((-1000, -2000, 5000), 5000),
            ((1000, 5000, 5000), 1000),
            ((1000, 5000, 2000), 2000),
            ((1000, 5000, 4000), 1000),
            ((100, 500, 400), 1000),
            ((100, 500, 200), 1000),
            ((5000, 5000, 5000), 1000),
            ((3000, 5000, 2000), 2000),
            ((4000, 5000, 3000), 2000),
            ((200, 500, 100), 1000),
            ((400, 500, 300), 1000),
        ];
        for ((first, second, score), expected) in cases {
            assert_eq!(
                pick_wager(score, first.max(second), 1000),
                expected,
                "scores {first}/{second}/{score}"
            );
        }
    }

    #[test]
    fn picks_the_first_open_cell_by_value() {
        let me = PlayerView {
            can_pick: true,
            ..player("bot", 0)
        };
        let (tag, action) = decide(&update(GamePhase::RecvPick, me, None)).unwrap();
        assert_eq!(tag, GamePhase::RecvPick);
        assert_eq!(action, Action::Pick { cat: 0, val: 1 });
    }

    #[test]
    fn answers_with_the_hint_and_accepts_disputes() {
        let me = PlayerView {
            can_answer: true,
            ..player("bot", 0)
        };
        let (_, action) = decide(&update(GamePhase::RecvAns, me, Some("Mark Twain"))).unwrap();
        assert_eq!(action, Action::Answer("Mark Twain".into()));

        let me = PlayerView {
            can_dispute: true,
            ..player("bot", 0)
        };
        let (_, action) = decide(&update(GamePhase::RecvDispute, me, None)).unwrap();
        assert_eq!(action, Action::Vote { accept: true });
    }

    #[test]
    fn stays_idle_without_a_flag_or_while_paused() {
        assert!(decide(&update(GamePhase::RecvBuzz, player("bot", 0), None)).is_none());

        let me = PlayerView {
            can_buzz: true,
            ..player("bot", 0)
        };
        let mut paused = update(GamePhase::RecvBuzz, me, None);
        Arc::make_mut(&mut paused.game).paused = true;
        assert!(decide(&paused).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_updates_replace_the_pending_decision() {
        let (game_tx, mut game_rx) = mpsc::channel(8);
        let (bot_tx, bot_rx) = mpsc::unbounded_channel();
        spawn("bot".into(), bot_rx, game_tx.downgrade(), Duration::from_secs(5));

        let buzzer = PlayerView {
            can_buzz: true,
            ..player("bot", 0)
        };
        bot_tx.send(update(GamePhase::RecvBuzz, buzzer, None)).unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        let answerer = PlayerView {
            can_answer: true,
            ..player("bot", 0)
        };
        bot_tx
            .send(update(GamePhase::RecvAns, answerer, Some("Paris")))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(game_rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(3)).await;
        let Some(GameCommand::Frame {
            player_id,
            tag,
            action,
        }) = game_rx.recv().await
        else {
            panic!("expected a frame");
        };
        assert_eq!(player_id, "bot");
        assert_eq!(tag, GamePhase::RecvAns);
        assert_eq!(action, Action::Answer("Paris".into()));
        assert!(game_rx.try_recv().is_err());
    }
}
