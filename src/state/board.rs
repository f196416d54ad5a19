use rand::Rng;

use crate::{
    dao::models::{CategoryEntity, FinalQuestionEntity, QuestionEntity},
    state::state_machine::RoundState,
};

/// Number of category columns on a regular board.
pub const CATEGORIES_PER_ROUND: usize = 6;
/// Number of value rows on a regular board.
pub const VALUES_PER_CATEGORY: usize = 5;

/// Cumulative daily-double row weights out of 10 000 for the first round.
const FIRST_ROUND_ROW_BOUNDS: [u32; 4] = [15, 1150, 3916, 7409];
/// Cumulative daily-double row weights out of 10 000 for the second round.
const SECOND_ROUND_ROW_BOUNDS: [u32; 4] = [15, 1524, 4682, 8220];

/// One submission recorded against a clue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Player that submitted the answer.
    pub player_id: String,
    /// Submitted text.
    pub text: String,
    /// Judgment after matching or after a successful dispute.
    pub correct: bool,
    /// Set once the submitter appealed this judgment.
    pub has_disputed: bool,
    /// Set when a dispute flipped the judgment to correct.
    pub overturned: bool,
    /// Whether a bot submitted it.
    pub bot: bool,
    /// Amount that was at stake when the answer was scored.
    pub stake: i64,
}

/// A clue on the board (or the final clue).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub category: String,
    pub clue: String,
    pub answer: String,
    pub comments: String,
    pub alternatives: Vec<String>,
    pub value: i64,
    pub can_choose: bool,
    pub daily_double: bool,
    /// Every answer submitted against this clue, in submission order.
    pub answers: Vec<Answer>,
    /// Index of the latest entry in `answers`.
    pub cur_answer: Option<usize>,
    /// Index of the answer currently under dispute.
    pub cur_disputed: Option<usize>,
}

impl Question {
    fn from_entity(category: &str, entity: QuestionEntity, value: i64) -> Self {
        Self {
            category: category.to_string(),
            clue: entity.clue,
            answer: entity.answer,
            comments: entity.comments,
            alternatives: entity.alternatives,
            value,
            can_choose: true,
            daily_double: false,
            answers: Vec::new(),
            cur_answer: None,
            cur_disputed: None,
        }
    }

    /// Two clues are the same cell when clue text and official answer agree.
    pub fn same_clue(&self, other: &Question) -> bool {
        self.clue == other.clue && self.answer == other.answer
    }

    /// Append a judged submission and make it the current answer.
    pub fn record(&mut self, answer: Answer) -> usize {
        self.answers.push(answer);
        let idx = self.answers.len() - 1;
        self.cur_answer = Some(idx);
        idx
    }

    /// Latest answer submitted by `player_id`, if any.
    pub fn last_answer_of(&self, player_id: &str) -> Option<usize> {
        self.answers
            .iter()
            .rposition(|answer| answer.player_id == player_id)
    }
}

/// A category column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub title: String,
    pub questions: Vec<Question>,
}

/// Location of the active clue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionRef {
    /// A board cell of the first or second round.
    Cell {
        round: RoundState,
        cat: usize,
        val: usize,
    },
    /// The final clue.
    Final,
}

/// Both round grids plus the final clue of a game.
#[derive(Debug, Clone)]
pub struct Board {
    pub first: Vec<Category>,
    pub second: Vec<Category>,
    pub final_question: Question,
}

impl Board {
    /// Build a board from repository rows. Daily doubles are not placed yet.
    pub fn from_entities(
        first: Vec<CategoryEntity>,
        second: Vec<CategoryEntity>,
        final_question: FinalQuestionEntity,
    ) -> Self {
        Self {
            first: build_round(first, 200),
            second: build_round(second, 400),
            final_question: Question::from_entity(
                &final_question.category,
                final_question.question,
                0,
            ),
        }
    }

    /// Hide one daily double in the first round and two distinct ones in the second.
    pub fn place_daily_doubles<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        place_daily_double(&mut self.first, &FIRST_ROUND_ROW_BOUNDS, rng);
        place_daily_double(&mut self.second, &SECOND_ROUND_ROW_BOUNDS, rng);
        place_daily_double(&mut self.second, &SECOND_ROUND_ROW_BOUNDS, rng);
    }

    /// Grid of a board round; the final round has none.
    pub fn round(&self, round: RoundState) -> &[Category] {
        match round {
            RoundState::First => &self.first,
            RoundState::Second => &self.second,
            RoundState::Final => &[],
        }
    }

    pub fn question(&self, at: QuestionRef) -> Option<&Question> {
        match at {
            QuestionRef::Cell { round, cat, val } => self
                .round(round)
                .get(cat)
                .and_then(|category| category.questions.get(val)),
            QuestionRef::Final => Some(&self.final_question),
        }
    }

    pub fn question_mut(&mut self, at: QuestionRef) -> Option<&mut Question> {
        match at {
            QuestionRef::Cell { round, cat, val } => {
                let grid = match round {
                    RoundState::First => &mut self.first,
                    RoundState::Second => &mut self.second,
                    RoundState::Final => return None,
                };
                grid.get_mut(cat)
                    .and_then(|category| category.questions.get_mut(val))
            }
            QuestionRef::Final => Some(&mut self.final_question),
        }
    }

    /// First choosable cell scanning by ascending value, then ascending category.
    pub fn first_available(&self, round: RoundState) -> Option<(usize, usize)> {
        let grid = self.round(round);
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
                    .filter(|question| question.can_choose)
                    .map(|_| (cat, val))
            })
        })
    }

    /// Mark every cell holding the same clue as `at` as no longer choosable.
    pub fn consume(&mut self, at: QuestionRef) {
        let Some(target) = self.question(at).cloned() else {
            return;
        };
        for question in self
            .first
            .iter_mut()
            .chain(self.second.iter_mut())
            .flat_map(|category| category.questions.iter_mut())
        {
            if question.same_clue(&target) {
                question.can_choose = false;
            }
        }
    }

    pub fn round_exhausted(&self, round: RoundState) -> bool {
        self.round(round)
            .iter()
            .flat_map(|category| category.questions.iter())
            .all(|question| !question.can_choose)
    }
}

fn build_round(categories: Vec<CategoryEntity>, step: i64) -> Vec<Category> {
    categories
        .into_iter()
        .map(|category| {
            let questions = category
                .questions
                .into_iter()
                .zip(1..)
                .map(|(entity, row)| Question::from_entity(&category.title, entity, step * row))
                .collect();
            Category {
                title: category.title,
                questions,
            }
        })
        .collect()
}

fn weighted_row(roll: u32, bounds: &[u32; 4]) -> usize {
    bounds
        .iter()
        .position(|bound| roll < *bound)
        .unwrap_or(bounds.len())
}

fn place_daily_double<R: Rng + ?Sized>(grid: &mut [Category], bounds: &[u32; 4], rng: &mut R) {
    let free = grid
        .iter()
        .flat_map(|category| category.questions.iter())
        .filter(|question| !question.daily_double)
        .count();
    if free == 0 {
        return;
    }
    loop {
        let cat = rng.random_range(0..grid.len());
        let val = weighted_row(rng.random_range(0..10_000), bounds);
        if let Some(question) = grid[cat].questions.get_mut(val) {
            if !question.daily_double {
                question.daily_double = true;
                return;
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn values_follow_round_steps() {
        let board = fixtures::board();
        let values: Vec<i64> = board.first[0].questions.iter().map(|q| q.value).collect();
        assert_eq!(values, vec![200, 400, 600, 800, 1000]);
        let values: Vec<i64> = board.second[3].questions.iter().map(|q| q.value).collect();
        assert_eq!(values, vec![400, 800, 1200, 1600, 2000]);
        assert_eq!(board.final_question.category, "Authors");
    }

    #[test]
    fn first_available_scans_rows_before_columns() {
        let mut board = fixtures::board();
        assert_eq!(board.first_available(RoundState::First), Some((0, 0)));

        for cat in 0..CATEGORIES_PER_ROUND {
            board.first[cat].questions[0].can_choose = false;
        }
        board.first[0].questions[1].can_choose = false;
        assert_eq!(board.first_available(RoundState::First), Some((1, 1)));
    }

    #[test]
    fn consume_matches_clue_and_answer() {
        let mut board = fixtures::board();
        let at = QuestionRef::Cell {
            round: RoundState::First,
            cat: 2,
            val: 3,
        };
        board.consume(at);
        assert!(!board.question(at).unwrap().can_choose);
        let still_open = board
            .first
            .iter()
            .flat_map(|c| c.questions.iter())
            .filter(|q| q.can_choose)
            .count();
        assert_eq!(still_open, CATEGORIES_PER_ROUND * VALUES_PER_CATEGORY - 1);
    }

    #[test]
    fn round_exhausts_once_every_cell_is_consumed() {
        let mut board = fixtures::board();
        for cat in 0..CATEGORIES_PER_ROUND {
            for val in 0..VALUES_PER_CATEGORY {
                assert!(!board.round_exhausted(RoundState::First));
                board.consume(QuestionRef::Cell {
                    round: RoundState::First,
                    cat,
                    val,
                });
            }
        }
        assert!(board.round_exhausted(RoundState::First));
        assert_eq!(board.first_available(RoundState::First), None);
        assert!(!board.round_exhausted(RoundState::Second));
    }

    #[test]
    fn daily_doubles_are_placed_once_and_twice() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut board = fixtures::board();
            board.place_daily_doubles(&mut rng);
            let count = |grid: &[Category]| {
                grid.iter()
                    .flat_map(|c| c.questions.iter())
                    .filter(|q| q.daily_double)
                    .count()
            };
            assert_eq!(count(&board.first), 1);
            assert_eq!(count(&board.second), 2);
        }
    }

    #[test]
    fn weighted_rows_follow_bounds() {
        assert_eq!(weighted_row(0, &FIRST_ROUND_ROW_BOUNDS), 0);
        assert_eq!(weighted_row(15, &FIRST_ROUND_ROW_BOUNDS), 1);
        assert_eq!(weighted_row(3915, &FIRST_ROUND_ROW_BOUNDS), 2);
        assert_eq!(weighted_row(7409, &FIRST_ROUND_ROW_BOUNDS), 4);
        assert_eq!(weighted_row(9999, &SECOND_ROUND_ROW_BOUNDS), 4);
    }

    #[test]
    fn last_answer_of_prefers_latest_entry() {
        let mut question = fixtures::board().first[0].questions[0].clone();
        let answer = |player: &str, text: &str| Answer {
            player_id: player.into(),
            text: text.into(),
            correct: false,
            has_disputed: false,
            overturned: false,
            bot: false,
            stake: 200,
        };
        question.record(answer("a", "one"));
        question.record(answer("b", "two"));
        question.record(answer("a", "three"));
        assert_eq!(question.last_answer_of("a"), Some(2));
        assert_eq!(question.last_answer_of("c"), None);
        assert_eq!(question.cur_answer, Some(2));
    }
}
